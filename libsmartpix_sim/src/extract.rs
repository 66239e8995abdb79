use std::path::Path;
use std::str::FromStr;

use super::delphes::{read_track_columns, DelphesTrack};
use super::error::{HepMCError, TrackListError};
use super::hepmc::{FourVector, GenEvent, GenParticle, HepMCReader};
use super::track::{TrackListWriter, TrackRecord};

/// |PID| of a charged pion
pub const CHARGED_PION_PID: i32 = 211;
/// HepMC status code of a final state particle
pub const FINAL_STATE_STATUS: i32 = 1;
/// Radial extent of the pixel detector (mm); particles must be produced inside it
pub const PIXEL_R_MIN: f64 = 30.0;
pub const PIXEL_R_MAX: f64 = 130.0;

/// Counters for one conversion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub events_read: usize,
    pub candidates: usize,
    pub tracks_accepted: usize,
    /// The particle cap stopped reading before the input was exhausted
    pub truncated: bool,
}

/// Converts Delphes reconstructed tracks into PixelAV track records
#[derive(Debug, Clone, Copy, Default)]
pub struct DelphesExtractor;

impl DelphesExtractor {
    /// Tracks are kept if they are charged pions
    pub fn accept(track: &DelphesTrack) -> bool {
        track.pid.abs() == CHARGED_PION_PID
    }

    /// Build the PixelAV record for a track.
    ///
    /// x and y are swapped to match the PixelAV sensor geometry.
    pub fn track_record(track: &DelphesTrack) -> TrackRecord {
        TrackRecord {
            cota: track.ctg_theta as f64,
            cotb: 1.0 / (track.phi as f64).tan(),
            p: track.p as f64,
            flp: 0,
            localx: track.y_outer as f64,
            localy: track.x_outer as f64,
            pt: track.pt as f64,
        }
    }

    /// Select and convert a set of tracks, preserving their order
    pub fn extract(&self, tracks: &[DelphesTrack]) -> (Vec<TrackRecord>, ExtractionSummary) {
        let records: Vec<TrackRecord> = tracks
            .iter()
            .filter(|t| Self::accept(t))
            .map(Self::track_record)
            .collect();
        let summary = ExtractionSummary {
            candidates: tracks.len(),
            tracks_accepted: records.len(),
            ..Default::default()
        };
        (records, summary)
    }

    /// Convert a Delphes ROOT file into a PixelAV track list
    pub fn convert_file(
        &self,
        input: &Path,
        output: &Path,
        precision: usize,
    ) -> Result<ExtractionSummary, TrackListError> {
        let columns = read_track_columns(input)?;
        let n_events = columns.n_events;
        let tracks = columns.into_tracks()?;
        let (records, mut summary) = self.extract(&tracks);
        summary.events_read = n_events;
        log::info!(
            "Selected {} of {} tracks",
            summary.tracks_accepted,
            summary.candidates
        );

        write_track_list(output, precision, &records)?;
        Ok(summary)
    }
}

/// Where a particle cap is allowed to cut the input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TruncationUnit {
    /// Stop as soon as the cap is reached, possibly in the middle of an event
    #[default]
    Particle,
    /// Finish the event in which the cap is reached, then stop
    Event,
}

impl FromStr for TruncationUnit {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "particle" => Ok(Self::Particle),
            "event" => Ok(Self::Event),
            _ => Err(format!(
                "unrecognized truncation unit {s:?}; expected particle or event"
            )),
        }
    }
}

/// Converts generator level HepMC events into PixelAV track records
#[derive(Debug, Clone, Copy, Default)]
pub struct HepMCExtractor {
    pub max_particles: Option<usize>,
    pub truncation: TruncationUnit,
}

impl HepMCExtractor {
    pub fn new(max_particles: Option<usize>, truncation: TruncationUnit) -> Self {
        Self {
            max_particles,
            truncation,
        }
    }

    /// Decide whether a particle is kept. Returns its production position if so.
    ///
    /// Kept particles are final state, have finite pseudorapidity, and were produced within the
    /// radial extent of the pixel detector.
    pub fn accept(event: &GenEvent, particle: &GenParticle) -> Option<FourVector> {
        if particle.status != FINAL_STATE_STATUS {
            return None;
        }
        if particle.momentum.eta().abs() == f64::INFINITY {
            return None;
        }
        let position = event.production_position(particle)?;
        let r = position.perp();
        if (PIXEL_R_MIN..=PIXEL_R_MAX).contains(&r) {
            Some(position)
        } else {
            None
        }
    }

    /// Build the PixelAV record for an accepted particle.
    ///
    /// Following the PixelAV conventions phi = alpha - pi and theta = beta - pi, so
    /// cot(alpha) = 1/tan(phi) and cot(beta) = 1/tan(theta).
    pub fn track_record(particle: &GenParticle, position: &FourVector) -> TrackRecord {
        let momentum = &particle.momentum;
        TrackRecord {
            cota: 1.0 / momentum.phi().tan(),
            cotb: 1.0 / momentum.theta().tan(),
            p: momentum.p3mod(),
            flp: 0,
            localx: position.x,
            localy: position.y,
            pt: momentum.pt(),
        }
    }

    fn is_full(&self, n_tracks: usize) -> bool {
        self.max_particles.is_some_and(|cap| n_tracks >= cap)
    }

    /// Walk events and particles in order, collecting records until the input ends or the cap
    /// is reached. `on_event` is called after every event.
    pub fn extract<I, F>(
        &self,
        events: I,
        mut on_event: F,
    ) -> Result<(Vec<TrackRecord>, ExtractionSummary), HepMCError>
    where
        I: IntoIterator<Item = Result<GenEvent, HepMCError>>,
        F: FnMut(&ExtractionSummary),
    {
        let mut records = vec![];
        let mut summary = ExtractionSummary::default();

        'events: for event in events {
            let event = event?;
            summary.events_read += 1;
            for particle in event.particles.iter() {
                if self.truncation == TruncationUnit::Particle && self.is_full(records.len()) {
                    summary.truncated = true;
                    break 'events;
                }
                summary.candidates += 1;
                if let Some(position) = Self::accept(&event, particle) {
                    records.push(Self::track_record(particle, &position));
                }
            }
            summary.tracks_accepted = records.len();
            on_event(&summary);
            if self.truncation == TruncationUnit::Event && self.is_full(records.len()) {
                summary.truncated = true;
                break;
            }
        }
        summary.tracks_accepted = records.len();
        Ok((records, summary))
    }

    /// Convert a HepMC file into a PixelAV track list
    pub fn convert_file<F>(
        &self,
        input: &Path,
        output: &Path,
        precision: usize,
        on_event: F,
    ) -> Result<ExtractionSummary, TrackListError>
    where
        F: FnMut(&ExtractionSummary),
    {
        let reader = HepMCReader::open(input)?;
        let (records, summary) = self.extract(reader, on_event)?;
        write_track_list(output, precision, &records)?;
        Ok(summary)
    }
}

/// Write every record to a new track list file, returning the number of lines written
pub fn write_track_list(
    output: &Path,
    precision: usize,
    records: &[TrackRecord],
) -> Result<usize, TrackListError> {
    let mut writer = TrackListWriter::create(output, precision)?;
    writer.write_tracks(records)?;
    let n_written = writer.n_written();
    writer.finish()?;
    Ok(n_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hepmc::tests::ASCII3_SAMPLE;
    use std::io::Cursor;

    fn sample_events() -> Vec<Result<GenEvent, HepMCError>> {
        HepMCReader::new(Cursor::new(ASCII3_SAMPLE.to_string()))
            .unwrap()
            .collect()
    }

    fn delphes_track(pid: i32) -> DelphesTrack {
        DelphesTrack {
            pid,
            pt: 1.5,
            p: 2.0,
            ctg_theta: 0.25,
            phi: std::f32::consts::FRAC_PI_4,
            x_outer: 12.0,
            y_outer: -7.0,
        }
    }

    #[test]
    fn test_delphes_selection_and_record() {
        let tracks = vec![
            delphes_track(211),
            delphes_track(13),
            delphes_track(-211),
            delphes_track(2212),
        ];
        let (records, summary) = DelphesExtractor.extract(&tracks);
        assert_eq!(records.len(), 2);
        assert_eq!(summary.candidates, 4);
        assert_eq!(summary.tracks_accepted, 2);

        let record = records[0];
        assert_eq!(record.cota, 0.25);
        assert!((record.cotb - 1.0).abs() < 1e-6);
        assert_eq!(record.localx, -7.0);
        assert_eq!(record.localy, 12.0);
        assert_eq!(record.flp, 0);
    }

    #[test]
    fn test_delphes_written_lines() {
        let tracks: Vec<DelphesTrack> = [211, -211, 11, 211, 22]
            .into_iter()
            .map(delphes_track)
            .collect();
        let (records, _) = DelphesExtractor.extract(&tracks);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.txt");
        assert_eq!(write_track_list(&path, 4, &records).unwrap(), 3);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        for line in text.lines() {
            let fields: Vec<&str> = line.split(' ').collect();
            assert_eq!(fields.len(), 7);
            assert_eq!(fields[3], "0");
            assert_eq!(fields[0], "0.2500");
        }
    }

    #[test]
    fn test_hepmc_all_particles() {
        let extractor = HepMCExtractor::new(None, TruncationUnit::Particle);
        let mut n_callbacks = 0;
        let (records, summary) = extractor
            .extract(sample_events(), |_| n_callbacks += 1)
            .unwrap();
        assert_eq!(n_callbacks, 2);
        assert_eq!(summary.events_read, 2);
        assert_eq!(summary.candidates, 10);
        assert_eq!(summary.tracks_accepted, 4);
        assert!(!summary.truncated);

        // particle 6 of the first event, produced at V -2 (40, 30)
        let record = records[1];
        assert_eq!(record.localx, 40.0);
        assert_eq!(record.localy, 30.0);
        assert!((record.cota + 1.0).abs() < 1e-12);
        assert!(record.cotb.abs() < 1e-12);
        assert!((record.p - 0.5_f64.sqrt()).abs() < 1e-12);
        assert!((record.pt - 0.5_f64.sqrt()).abs() < 1e-12);

        assert_eq!(records[2].localx, 100.0);
    }

    #[test]
    fn test_hepmc_particle_truncation() {
        for (cap, expected) in [(0, 0), (1, 1), (3, 3), (10, 4)] {
            let extractor = HepMCExtractor::new(Some(cap), TruncationUnit::Particle);
            let (records, summary) = extractor.extract(sample_events(), |_| ()).unwrap();
            assert_eq!(records.len(), expected);
            assert_eq!(summary.truncated, cap < 4);
        }
    }

    #[test]
    fn test_hepmc_event_truncation() {
        for (cap, expected) in [(1, 2), (2, 2), (3, 4), (10, 4)] {
            let extractor = HepMCExtractor::new(Some(cap), TruncationUnit::Event);
            let (records, _) = extractor.extract(sample_events(), |_| ()).unwrap();
            assert_eq!(records.len(), expected, "cap {cap}");
        }
    }

    #[test]
    fn test_hepmc_acceptance_edges() {
        let text = "HepMC::Asciiv3-START_EVENT_LISTING
E 0 3 6
P 1 0 2212 0.0 0.0 1.0 1.0 0.938 4
V -1 0 [1] @ 30.0 0.0 0.0 0.0
P 2 -1 211 1.0 0.0 0.5 1.2 0.139 1
P 3 -1 211 0.0 0.0 5.0 5.0 0.139 1
V -2 0 [2] @ 0.0 130.0 0.0 0.0
P 4 -2 211 0.0 1.0 0.0 1.0 0.139 1
V -3 0 [3] @ 0.0 130.5 0.0 0.0
P 5 -3 211 0.0 1.0 0.0 1.0 0.139 1
P 6 0 211 0.0 1.0 0.0 1.0 0.139 1
";
        let events: Vec<_> = HepMCReader::new(Cursor::new(text.to_string()))
            .unwrap()
            .collect();
        let (records, summary) = HepMCExtractor::default()
            .extract(events, |_| ())
            .unwrap();
        // particle 2 at r = 30, particle 4 at r = 130; particle 3 is along the beam axis,
        // particle 5 is outside, particle 6 has no production vertex
        assert_eq!(summary.tracks_accepted, 2);
        assert_eq!(records[0].localx, 30.0);
        assert_eq!(records[1].localy, 130.0);
    }

    #[test]
    fn test_truncation_unit_parse() {
        assert_eq!(
            "event".parse::<TruncationUnit>().unwrap(),
            TruncationUnit::Event
        );
        assert!("run".parse::<TruncationUnit>().is_err());
    }
}
