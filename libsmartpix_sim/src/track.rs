use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::error::TrackListError;

/// Default number of decimals for floating point fields
pub const DEFAULT_FLOAT_PRECISION: usize = 5;

/// One line of a PixelAV track list.
///
/// Angles follow the PixelAV convention: cota and cotb are the cotangents of the track's
/// alpha and beta angles w.r.t. the sensor. Positions are in mm, momenta in GeV.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackRecord {
    pub cota: f64,
    pub cotb: f64,
    pub p: f64,
    pub flp: i32,
    pub localx: f64,
    pub localy: f64,
    pub pt: f64,
}

impl TrackRecord {
    /// Render as a single line (without newline): cota cotb p flp localx localy pT
    pub fn format_line(&self, precision: usize) -> String {
        format!(
            "{:.prec$} {:.prec$} {:.prec$} {} {:.prec$} {:.prec$} {:.prec$}",
            self.cota,
            self.cotb,
            self.p,
            self.flp,
            self.localx,
            self.localy,
            self.pt,
            prec = precision
        )
    }
}

/// Writes TrackRecords as whitespace separated text, one per line
pub struct TrackListWriter<W: Write> {
    sink: W,
    precision: usize,
    n_written: usize,
}

impl TrackListWriter<BufWriter<File>> {
    /// Create (truncating) the track list file at path
    pub fn create(path: &Path, precision: usize) -> Result<Self, TrackListError> {
        Ok(Self::new(BufWriter::new(File::create(path)?), precision))
    }
}

impl<W: Write> TrackListWriter<W> {
    pub fn new(sink: W, precision: usize) -> Self {
        Self {
            sink,
            precision,
            n_written: 0,
        }
    }

    pub fn write_track(&mut self, track: &TrackRecord) -> Result<(), TrackListError> {
        writeln!(self.sink, "{}", track.format_line(self.precision))?;
        self.n_written += 1;
        Ok(())
    }

    pub fn write_tracks<'a, I>(&mut self, tracks: I) -> Result<(), TrackListError>
    where
        I: IntoIterator<Item = &'a TrackRecord>,
    {
        for track in tracks {
            self.write_track(track)?;
        }
        Ok(())
    }

    pub fn n_written(&self) -> usize {
        self.n_written
    }

    /// Flush and hand back the sink
    pub fn finish(mut self) -> Result<W, TrackListError> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}
