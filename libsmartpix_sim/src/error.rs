use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Invalid number of cores {0}; must be at least 1 or -1 for all available cores")]
    BadCoreCount(i32),
    #[error("Unrecognized execution mode {0:?}; expected local or slurm")]
    BadMode(String),
    #[error("Unrecognized stage {0:?}; expected one of placeholder, generator, detector_response, track_list, sensor_simulation")]
    BadStage(String),
    #[error("Configuration has an empty stage chain; at least one stage is required")]
    EmptyChain,
    #[error("Scan range needs at least 2 points to form a bin, got {0}")]
    BadScanPoints(usize),
    #[error("Scan range [{0}, {1}] is invalid; start must be finite and below stop")]
    BadScanRange(f64, f64),
    #[error("Scan bin {0} has no width once its edges are rounded; use fewer points")]
    CollapsedScanBin(usize),
    #[error("Scan bins share the output stem {0}; use fewer points")]
    DuplicateScanStem(String),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Batch mode requires a query file but none was given")]
    NotGiven,
    #[error("Could not locate batch query {0:?} as relative or absolute path")]
    BadFilePath(PathBuf),
    #[error("Batch query failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Batch query failed to parse: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Batch query must be a key/value mapping at the top level")]
    NotAMapping,
    #[error("Batch query key {0:?} is not a string")]
    BadKey(String),
    #[error("Batch query value for {0:?} must be a string, number, or boolean")]
    BadValue(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Command {0} could not be started: {1}")]
    SpawnFailed(String, std::io::Error),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Pool requires at least one worker")]
    NoWorkers,
    #[error("A pool worker panicked and could not be joined")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch executor failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Batch executor failed to serialize a job: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Batch submission of {0:?} failed: {1}")]
    SubmissionFailed(PathBuf, String),
    #[error("Batch submission returned an unreadable job id: {0:?}")]
    BadJobId(String),
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Launch failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Launch failed due to batch query error: {0}")]
    QueryError(#[from] QueryError),
    #[error("Launch failed due to pool error: {0}")]
    PoolError(#[from] PoolError),
    #[error("Launch failed due to batch error: {0}")]
    BatchError(#[from] BatchError),
    #[error("Launch failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HepMCError {
    #[error("HepMC reader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not open HepMC file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("HepMC input does not start with a recognized format header")]
    UnknownFormat,
    #[error("HepMC line {0}: {1}")]
    BadLine(usize, String),
    #[error("HepMC line {0}: failed to parse a number: {1}")]
    BadNumber(usize, String),
    #[error("HepMC event {0} references unknown vertex {1}")]
    UnknownVertex(i64, i64),
    #[error("HepMC event {0} references unknown particle {1}")]
    UnknownParticle(i64, i64),
}

#[derive(Debug, Error)]
pub enum DelphesError {
    #[error("Could not open Delphes file because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Failed to read ROOT file: {0}")]
    RootError(String),
    #[error("Delphes tree is missing field {0}")]
    MissingBranch(String),
    #[error("Delphes branch {0} has {1} entries but {2} has {3}")]
    BranchLengthMismatch(String, usize, String, usize),
}

#[derive(Debug, Error)]
pub enum TrackListError {
    #[error("Track list failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Track list failed due to HepMC error: {0}")]
    HepMCError(#[from] HepMCError),
    #[error("Track list failed due to Delphes error: {0}")]
    DelphesError(#[from] DelphesError),
}
