//! A streaming reader for HepMC ASCII event records.
//!
//! Both the HepMC3 `Asciiv3` and the HepMC2 `IO_GenEvent` listings are understood; the format
//! is detected from the listing header. Only the event topology and kinematics are kept
//! (particles, vertices, units, event offset). Weights, attributes, cross sections, and heavy
//! ion/PDF records are skipped.
//!
//! Vertex positions follow HepMC3: a vertex without a (non-zero) position inherits the position
//! of the production vertex of its first incoming particle, falling back to the event offset.
use fxhash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use super::error::HepMCError;

const ASCII3_START: &str = "HepMC::Asciiv3-START_EVENT_LISTING";
const IO_GENEVENT_START: &str = "HepMC::IO_GenEvent-START_EVENT_LISTING";
const LISTING_PREFIX: &str = "HepMC::";

/// Listing formats the reader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HepMCFormat {
    Ascii3,
    IoGenEvent2,
}

impl HepMCFormat {
    fn from_header(line: &str) -> Option<Self> {
        match line.trim() {
            ASCII3_START => Some(Self::Ascii3),
            IO_GENEVENT_START => Some(Self::IoGenEvent2),
            _ => None,
        }
    }
}

/// A Lorentz vector, used both for momenta (px, py, pz, e) and positions (x, y, z, t)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FourVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
}

impl FourVector {
    pub fn new(x: f64, y: f64, z: f64, t: f64) -> Self {
        Self { x, y, z, t }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0 && self.t == 0.0
    }

    /// Transverse component, sqrt(x^2 + y^2)
    pub fn perp(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Transverse momentum; same as perp for a momentum vector
    pub fn pt(&self) -> f64 {
        self.perp()
    }

    /// Magnitude of the spatial part
    pub fn p3mod(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn theta(&self) -> f64 {
        self.perp().atan2(self.z)
    }

    /// Pseudorapidity. Infinite along the beam axis.
    pub fn eta(&self) -> f64 {
        let p = self.p3mod();
        0.5 * ((p + self.z) / (p - self.z)).ln()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenParticle {
    pub id: i64,
    pub pid: i32,
    pub status: i32,
    pub momentum: FourVector,
    pub mass: f64,
    /// Index into the event's vertices
    pub production_vertex: Option<usize>,
    /// Index into the event's vertices
    pub end_vertex: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenVertex {
    pub id: i64,
    pub status: i32,
    /// As written in the file; zero when absent
    pub position: FourVector,
    /// Indices into the event's particles
    pub incoming: Vec<usize>,
    pub outgoing: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenEvent {
    pub number: i64,
    pub momentum_unit: String,
    pub length_unit: String,
    pub offset: FourVector,
    pub particles: Vec<GenParticle>,
    pub vertices: Vec<GenVertex>,
}

impl GenEvent {
    /// Resolved position of a vertex, following HepMC3 inheritance rules
    pub fn vertex_position(&self, vertex: usize) -> FourVector {
        let mut current = vertex;
        // Bounded walk; a malformed file could in principle contain a cycle
        for _ in 0..=self.vertices.len() {
            let v = &self.vertices[current];
            if !v.position.is_zero() {
                return v.position;
            }
            let parent = v
                .incoming
                .iter()
                .find_map(|p| self.particles[*p].production_vertex);
            match parent {
                Some(next) => current = next,
                None => break,
            }
        }
        self.offset
    }

    /// Position where a particle was produced, None if it has no production vertex
    pub fn production_position(&self, particle: &GenParticle) -> Option<FourVector> {
        particle
            .production_vertex
            .map(|vertex| self.vertex_position(vertex))
    }

    fn add_vertex(&mut self, id: i64, status: i32, position: FourVector) -> usize {
        self.vertices.push(GenVertex {
            id,
            status,
            position,
            incoming: vec![],
            outgoing: vec![],
        });
        self.vertices.len() - 1
    }

    fn attach_incoming(&mut self, particle: usize, vertex: usize) {
        self.particles[particle].end_vertex = Some(vertex);
        self.vertices[vertex].incoming.push(particle);
    }

    fn attach_outgoing(&mut self, particle: usize, vertex: usize) {
        self.particles[particle].production_vertex = Some(vertex);
        self.vertices[vertex].outgoing.push(particle);
    }
}

fn field<T: FromStr>(tokens: &[&str], idx: usize, line: usize) -> Result<T, HepMCError> {
    let token = tokens.get(idx).ok_or_else(|| {
        HepMCError::BadLine(
            line,
            format!("expected at least {} fields, found {}", idx + 1, tokens.len()),
        )
    })?;
    token
        .parse::<T>()
        .map_err(|_| HepMCError::BadNumber(line, token.to_string()))
}

fn four_vector(tokens: &[&str], start: usize, line: usize) -> Result<FourVector, HepMCError> {
    Ok(FourVector::new(
        field(tokens, start, line)?,
        field(tokens, start + 1, line)?,
        field(tokens, start + 2, line)?,
        field(tokens, start + 3, line)?,
    ))
}

/// Optional trailing "@ x y z t" position
fn trailing_position(tokens: &[&str], line: usize) -> Result<FourVector, HepMCError> {
    match tokens.iter().position(|t| *t == "@") {
        Some(at) => four_vector(tokens, at + 1, line),
        None => Ok(FourVector::default()),
    }
}

/// Builds one GenEvent line by line
struct EventParser {
    format: HepMCFormat,
    event: GenEvent,
    particle_index: FxHashMap<i64, usize>,
    vertex_index: FxHashMap<i64, usize>,
    // IO_GenEvent bookkeeping: particles follow their production vertex
    current_vertex: Option<usize>,
    orphans_remaining: usize,
    outgoing_remaining: usize,
    pending_end_vertices: Vec<(usize, i64)>,
    next_implicit_id: i64,
}

impl EventParser {
    fn new(format: HepMCFormat, line: usize, header: &str) -> Result<Self, HepMCError> {
        let tokens: Vec<&str> = header.split_whitespace().collect();
        let mut event = GenEvent {
            number: field(&tokens, 1, line)?,
            ..Default::default()
        };
        if format == HepMCFormat::Ascii3 {
            event.offset = trailing_position(&tokens, line)?;
        }
        Ok(Self {
            format,
            event,
            particle_index: FxHashMap::default(),
            vertex_index: FxHashMap::default(),
            current_vertex: None,
            orphans_remaining: 0,
            outgoing_remaining: 0,
            pending_end_vertices: vec![],
            next_implicit_id: 0,
        })
    }

    fn parse_line(&mut self, line: usize, text: &str) -> Result<(), HepMCError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        match (tokens.first().copied(), self.format) {
            (Some("U"), _) => {
                self.event.momentum_unit = tokens.get(1).unwrap_or(&"").to_string();
                self.event.length_unit = tokens.get(2).unwrap_or(&"").to_string();
                Ok(())
            }
            (Some("P"), HepMCFormat::Ascii3) => self.ascii3_particle(&tokens, line),
            (Some("V"), HepMCFormat::Ascii3) => self.ascii3_vertex(&tokens, line),
            (Some("P"), HepMCFormat::IoGenEvent2) => self.genevent2_particle(&tokens, line),
            (Some("V"), HepMCFormat::IoGenEvent2) => self.genevent2_vertex(&tokens, line),
            // Weights, attributes, tool info, cross sections, heavy ion, pdf, blank
            _ => Ok(()),
        }
    }

    fn push_particle(&mut self, particle: GenParticle) -> usize {
        self.particle_index
            .insert(particle.id, self.event.particles.len());
        self.event.particles.push(particle);
        self.event.particles.len() - 1
    }

    fn lookup_particle(&self, id: i64) -> Result<usize, HepMCError> {
        self.particle_index
            .get(&id)
            .copied()
            .ok_or(HepMCError::UnknownParticle(self.event.number, id))
    }

    fn lookup_vertex(&self, id: i64) -> Result<usize, HepMCError> {
        self.vertex_index
            .get(&id)
            .copied()
            .ok_or(HepMCError::UnknownVertex(self.event.number, id))
    }

    // P id mother pid px py pz e m status
    fn ascii3_particle(&mut self, tokens: &[&str], line: usize) -> Result<(), HepMCError> {
        let mother: i64 = field(tokens, 2, line)?;
        let particle = GenParticle {
            id: field(tokens, 1, line)?,
            pid: field(tokens, 3, line)?,
            momentum: four_vector(tokens, 4, line)?,
            mass: field(tokens, 8, line)?,
            status: field(tokens, 9, line)?,
            production_vertex: None,
            end_vertex: None,
        };

        let production = match mother {
            0 => None,
            m if m < 0 => Some(self.lookup_vertex(m)?),
            m => {
                // A positive mother is a particle; the vertex between them was not written
                let parent = self.lookup_particle(m)?;
                match self.event.particles[parent].end_vertex {
                    Some(v) => Some(v),
                    None => {
                        self.next_implicit_id -= 1;
                        let id = self.next_implicit_id;
                        let v = self.event.add_vertex(id, 0, FourVector::default());
                        self.event.attach_incoming(parent, v);
                        Some(v)
                    }
                }
            }
        };

        let idx = self.push_particle(particle);
        if let Some(v) = production {
            self.event.attach_outgoing(idx, v);
        }
        Ok(())
    }

    // V id status [in1,in2,...] @ x y z t
    fn ascii3_vertex(&mut self, tokens: &[&str], line: usize) -> Result<(), HepMCError> {
        let id: i64 = field(tokens, 1, line)?;
        let status: i32 = field(tokens, 2, line)?;
        let position = trailing_position(tokens, line)?;
        let v = self.event.add_vertex(id, status, position);
        self.vertex_index.insert(id, v);
        self.next_implicit_id = self.next_implicit_id.min(id);

        if let Some(list) = tokens.get(3).filter(|t| t.starts_with('[')) {
            let inner = list.trim_start_matches('[').trim_end_matches(']');
            for item in inner.split(',').filter(|s| !s.is_empty()) {
                let pid: i64 = item
                    .trim()
                    .parse()
                    .map_err(|_| HepMCError::BadNumber(line, item.to_string()))?;
                let p = self.lookup_particle(pid)?;
                self.event.attach_incoming(p, v);
            }
        }
        Ok(())
    }

    // V barcode id x y z ctau n_orphan_in n_out n_weights [weights...]
    fn genevent2_vertex(&mut self, tokens: &[&str], line: usize) -> Result<(), HepMCError> {
        let barcode: i64 = field(tokens, 1, line)?;
        let status: i32 = field(tokens, 2, line)?;
        let position = four_vector(tokens, 3, line)?;
        self.orphans_remaining = field(tokens, 7, line)?;
        self.outgoing_remaining = field(tokens, 8, line)?;
        let v = self.event.add_vertex(barcode, status, position);
        self.vertex_index.insert(barcode, v);
        self.current_vertex = Some(v);
        Ok(())
    }

    // P barcode pid px py pz e m status pol_theta pol_phi end_vertex n_flow [flows...]
    fn genevent2_particle(&mut self, tokens: &[&str], line: usize) -> Result<(), HepMCError> {
        let particle = GenParticle {
            id: field(tokens, 1, line)?,
            pid: field(tokens, 2, line)?,
            momentum: four_vector(tokens, 3, line)?,
            mass: field(tokens, 7, line)?,
            status: field(tokens, 8, line)?,
            production_vertex: None,
            end_vertex: None,
        };
        let end_vertex: i64 = field(tokens, 11, line)?;

        let idx = self.push_particle(particle);
        if self.orphans_remaining > 0 {
            self.orphans_remaining -= 1;
        } else if self.outgoing_remaining > 0 {
            self.outgoing_remaining -= 1;
            if let Some(v) = self.current_vertex {
                self.event.attach_outgoing(idx, v);
            }
        }
        if end_vertex != 0 {
            // The end vertex may not have been read yet
            self.pending_end_vertices.push((idx, end_vertex));
        }
        Ok(())
    }

    fn finish(mut self) -> Result<GenEvent, HepMCError> {
        for (particle, barcode) in std::mem::take(&mut self.pending_end_vertices) {
            let v = self.lookup_vertex(barcode)?;
            self.event.attach_incoming(particle, v);
        }
        Ok(self.event)
    }
}

/// Reads GenEvents one at a time from a HepMC ASCII stream
pub struct HepMCReader<R: BufRead> {
    source: R,
    format: HepMCFormat,
    line_number: usize,
    pending_header: Option<(usize, String)>,
    is_ended: bool,
}

impl HepMCReader<BufReader<File>> {
    /// Open a HepMC file on disk
    pub fn open(path: &Path) -> Result<Self, HepMCError> {
        if !path.exists() {
            return Err(HepMCError::BadFilePath(path.to_path_buf()));
        }
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: BufRead> HepMCReader<R> {
    /// Create a reader, consuming everything up to the listing header
    pub fn new(source: R) -> Result<Self, HepMCError> {
        let mut reader = Self {
            source,
            format: HepMCFormat::Ascii3,
            line_number: 0,
            pending_header: None,
            is_ended: false,
        };
        loop {
            match reader.next_line()? {
                None => return Err(HepMCError::UnknownFormat),
                Some((_, line)) => {
                    if let Some(format) = HepMCFormat::from_header(&line) {
                        reader.format = format;
                        return Ok(reader);
                    } else if line.trim().is_empty() || line.starts_with("HepMC::Version") {
                        continue;
                    } else {
                        return Err(HepMCError::UnknownFormat);
                    }
                }
            }
        }
    }

    pub fn format(&self) -> HepMCFormat {
        self.format
    }

    fn next_line(&mut self) -> Result<Option<(usize, String)>, HepMCError> {
        let mut buffer = String::new();
        if self.source.read_line(&mut buffer)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        let trimmed = buffer.trim_end_matches(['\n', '\r']).to_string();
        Ok(Some((self.line_number, trimmed)))
    }

    /// Get the next event in the stream
    ///
    /// Returns a `Result<Option<GenEvent>>`. The Option is None once the listing has no more
    /// events.
    pub fn get_next_event(&mut self) -> Result<Option<GenEvent>, HepMCError> {
        if self.is_ended {
            return Ok(None);
        }
        let (line_number, header) = match self.pending_header.take() {
            Some(header) => header,
            None => loop {
                match self.next_line()? {
                    None => {
                        self.is_ended = true;
                        return Ok(None);
                    }
                    Some((n, line)) if line.starts_with("E ") => break (n, line),
                    // Anything between events (end/start of listing, comments) is skipped
                    Some(_) => continue,
                }
            },
        };

        let mut parser = EventParser::new(self.format, line_number, &header)?;
        while let Some((n, line)) = self.next_line()? {
            if line.starts_with("E ") {
                self.pending_header = Some((n, line));
                break;
            }
            if line.starts_with(LISTING_PREFIX) {
                break;
            }
            parser.parse_line(n, &line)?;
        }
        let event = parser.finish()?;

        if !event.momentum_unit.is_empty()
            && (event.momentum_unit != "GEV" || event.length_unit != "MM")
        {
            log::warn!(
                "Event {} uses units {} {}; values are used as if GEV MM",
                event.number,
                event.momentum_unit,
                event.length_unit
            );
        }
        Ok(Some(event))
    }
}

impl<R: BufRead> Iterator for HepMCReader<R> {
    type Item = Result<GenEvent, HepMCError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.get_next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error rather than spinning on a broken stream
                self.is_ended = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    pub(crate) const ASCII3_SAMPLE: &str = "HepMC::Version 3.02.05
HepMC::Asciiv3-START_EVENT_LISTING
E 0 2 7
U GEV MM
W 1.0
A 0 GenCrossSection 1.0 0.1 -1 -1
P 1 0 2212 0.0 0.0 6500.0 6500.0 0.938 4
P 2 0 2212 0.0 0.0 -6500.0 6500.0 0.938 4
V -1 0 [1,2] @ 1.0 2.0 3.0 0.0
P 3 -1 211 1.0 0.0 1.0 1.414 0.139 1
P 4 -1 111 0.0 1.0 0.0 1.0 0.135 2
V -2 0 [4] @ 40.0 30.0 0.0 0.0
P 5 -2 22 0.5 0.0 0.0 0.5 0.0 1
P 6 4 22 -0.5 0.5 0.0 0.7 0.0 1
P 7 3 211 0.0 0.0 2.0 2.0 0.139 1
E 1 1 3
U GEV MM
P 1 0 2212 0.0 0.0 6500.0 6500.0 0.938 4
V -1 0 [1] @ 100.0 0.0 0.0 0.0
P 2 -1 211 1.0 1.0 0.0 1.5 0.139 1
P 3 -1 211 -1.0 1.0 0.0 1.5 0.139 1
HepMC::Asciiv3-END_EVENT_LISTING
";

    pub(crate) const GENEVENT2_SAMPLE: &str = "HepMC::Version 2.06.09
HepMC::IO_GenEvent-START_EVENT_LISTING
E 12 -1 -1.0 -1.0 -1.0 0 -1 2 1 2 0 1 1.0
U GEV MM
V -1 0 0 0 0 0 2 2 0
P 1 2212 0 0 6500 6500 0.938 4 0 0 -1 0
P 2 2212 0 0 -6500 6500 0.938 4 0 0 -1 0
P 3 211 1 0 1 1.414 0.139 1 0 0 0 0
P 4 111 0 1 0 1 0.135 2 0 0 -2 0
V -2 0 40 30 0 0 0 1 0
P 5 22 0.5 0 0 0.5 0 1 0 0 0 0
HepMC::IO_GenEvent-END_EVENT_LISTING
";

    fn read_all(text: &str) -> Vec<GenEvent> {
        HepMCReader::new(Cursor::new(text.to_string()))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_kinematics() {
        let p = FourVector::new(1.0, 0.0, 1.0, 2.0);
        assert!((p.p3mod() - 2.0_f64.sqrt()).abs() < 1e-12);
        assert!((p.theta() - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert_eq!(p.phi(), 0.0);
        assert!((p.eta() - (2.0_f64.sqrt() + 1.0).ln()).abs() < 1e-12);
        assert_eq!(p.pt(), 1.0);

        let beam = FourVector::new(0.0, 0.0, 6500.0, 6500.0);
        assert!(beam.eta().is_infinite());
    }

    #[test]
    fn test_ascii3_topology() {
        let events = read_all(ASCII3_SAMPLE);
        assert_eq!(events.len(), 2);
        let event = &events[0];
        assert_eq!(event.number, 0);
        assert_eq!(event.momentum_unit, "GEV");
        assert_eq!(event.particles.len(), 7);
        // two written vertices plus the implicit one between particles 3 and 7
        assert_eq!(event.vertices.len(), 3);

        let beam = &event.particles[0];
        assert_eq!(beam.production_vertex, None);
        assert_eq!(beam.end_vertex, Some(0));
        assert_eq!(event.production_position(beam), None);

        let pion = &event.particles[2];
        assert_eq!(pion.pid, 211);
        assert_eq!(
            event.production_position(pion),
            Some(FourVector::new(1.0, 2.0, 3.0, 0.0))
        );

        // mother given as particle 4, whose end vertex is V -2
        let photon = &event.particles[5];
        assert_eq!(
            event.production_position(photon),
            Some(FourVector::new(40.0, 30.0, 0.0, 0.0))
        );

        // implicit vertex has no position and inherits from particle 3's production vertex
        let late = &event.particles[6];
        assert_eq!(
            event.production_position(late),
            Some(FourVector::new(1.0, 2.0, 3.0, 0.0))
        );

        assert_eq!(events[1].number, 1);
        assert_eq!(events[1].particles.len(), 3);
    }

    #[test]
    fn test_genevent2_topology() {
        let mut reader = HepMCReader::new(Cursor::new(GENEVENT2_SAMPLE.to_string())).unwrap();
        assert_eq!(reader.format(), HepMCFormat::IoGenEvent2);
        let event = reader.get_next_event().unwrap().unwrap();
        assert!(reader.get_next_event().unwrap().is_none());

        assert_eq!(event.number, 12);
        assert_eq!(event.particles.len(), 5);
        assert_eq!(event.particles[0].production_vertex, None);
        assert_eq!(event.particles[0].end_vertex, Some(0));
        assert_eq!(event.particles[2].production_vertex, Some(0));
        assert_eq!(event.particles[3].end_vertex, Some(1));
        assert_eq!(
            event.production_position(&event.particles[4]),
            Some(FourVector::new(40.0, 30.0, 0.0, 0.0))
        );
        // V -1 sits at the origin and its incoming beams have no production vertex
        assert_eq!(
            event.production_position(&event.particles[2]),
            Some(FourVector::default())
        );
    }

    #[test]
    fn test_unknown_format() {
        let result = HepMCReader::new(Cursor::new(String::from("not a hepmc file\n")));
        assert!(matches!(result, Err(HepMCError::UnknownFormat)));
        let result = HepMCReader::new(Cursor::new(String::new()));
        assert!(matches!(result, Err(HepMCError::UnknownFormat)));
    }

    #[test]
    fn test_unknown_vertex() {
        let text = "HepMC::Asciiv3-START_EVENT_LISTING
E 3 0 1
P 1 -5 211 1.0 0.0 0.0 1.0 0.139 1
";
        let mut reader = HepMCReader::new(Cursor::new(text.to_string())).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(HepMCError::UnknownVertex(3, -5)))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_bad_number() {
        let text = "HepMC::Asciiv3-START_EVENT_LISTING
E 0 0 1
P 1 0 211 abc 0.0 0.0 1.0 0.139 1
";
        let mut reader = HepMCReader::new(Cursor::new(text.to_string())).unwrap();
        assert!(matches!(
            reader.get_next_event(),
            Err(HepMCError::BadNumber(3, _))
        ));
    }

    #[test]
    fn test_event_offset() {
        let text = "HepMC::Asciiv3-START_EVENT_LISTING
E 0 1 2 @ 0.0 0.0 10.0 0.0
P 1 0 2212 0.0 0.0 1.0 1.0 0.938 4
V -1 0 [1]
P 2 -1 211 1.0 0.0 0.0 1.0 0.139 1
";
        let events = read_all(text);
        let event = &events[0];
        assert_eq!(
            event.production_position(&event.particles[1]),
            Some(FourVector::new(0.0, 0.0, 10.0, 0.0))
        );
    }
}
