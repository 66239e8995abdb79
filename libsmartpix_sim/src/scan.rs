use fxhash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Lower edge of the default pTHat sweep (GeV)
pub const DEFAULT_SCAN_START: f64 = 0.0;
/// Upper edge of the default pTHat sweep (GeV)
pub const DEFAULT_SCAN_STOP: f64 = 2.0;
/// Number of points in the default partition; gives 20 bins
pub const DEFAULT_SCAN_POINTS: usize = 21;

// Edges are rounded to this many decimals to strip linspace noise (0.30000000000000004)
const EDGE_DECIMALS: i32 = 3;

/// One sub-interval [pt_hat_min, pt_hat_max) of the generator pTHat sweep.
///
/// Each bin drives exactly one job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanBin {
    pub index: usize,
    pub pt_hat_min: f64,
    pub pt_hat_max: f64,
}

impl ScanBin {
    /// The stem used for every output file produced for this bin
    pub fn file_stem(&self) -> String {
        format!("minbias_{:.2}_{:.2}_GeV", self.pt_hat_min, self.pt_hat_max)
    }
}

/// Evenly spaced points over [start, stop], inclusive of both ends
pub fn linspace(start: f64, stop: f64, n_points: usize) -> Vec<f64> {
    match n_points {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n_points - 1) as f64;
            let mut points: Vec<f64> = (0..n_points).map(|i| start + i as f64 * step).collect();
            points[n_points - 1] = stop;
            points
        }
    }
}

fn round_edge(value: f64) -> f64 {
    let scale = 10.0_f64.powi(EDGE_DECIMALS);
    (value * scale).round() / scale
}

/// Partition [start, stop] into n_points - 1 consecutive bins.
///
/// Every bin must keep min < max after rounding and produce its own file stem, otherwise jobs
/// would overwrite each other's outputs.
pub fn scan_bins(start: f64, stop: f64, n_points: usize) -> Result<Vec<ScanBin>, ConfigError> {
    if n_points < 2 {
        return Err(ConfigError::BadScanPoints(n_points));
    }
    if !start.is_finite() || !stop.is_finite() || start >= stop {
        return Err(ConfigError::BadScanRange(start, stop));
    }
    let points = linspace(start, stop, n_points);
    let bins: Vec<ScanBin> = points
        .windows(2)
        .enumerate()
        .map(|(index, edges)| ScanBin {
            index,
            pt_hat_min: round_edge(edges[0]),
            pt_hat_max: round_edge(edges[1]),
        })
        .collect();

    let mut stems = FxHashSet::default();
    for bin in bins.iter() {
        if bin.pt_hat_min >= bin.pt_hat_max {
            return Err(ConfigError::CollapsedScanBin(bin.index));
        }
        let stem = bin.file_stem();
        if !stems.insert(stem.clone()) {
            return Err(ConfigError::DuplicateScanStem(stem));
        }
    }
    Ok(bins)
}

/// The standard sweep used by the launcher
pub fn default_scan_bins() -> Vec<ScanBin> {
    // Constant arguments, always valid
    scan_bins(DEFAULT_SCAN_START, DEFAULT_SCAN_STOP, DEFAULT_SCAN_POINTS).unwrap_or_default()
}
