use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::ConfigError;
use super::scan::{DEFAULT_SCAN_POINTS, DEFAULT_SCAN_START, DEFAULT_SCAN_STOP};

/// The stages a job can chain together. Jobs always run them in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// `echo hi`, a stand-in useful for checking the launch machinery
    Placeholder,
    /// Pythia minimum bias generation into HepMC
    Generator,
    /// Delphes detector response, HepMC in and ROOT out
    DetectorResponse,
    /// Delphes ROOT to PixelAV track list conversion
    TrackList,
    /// PixelAV sensor simulation
    SensorSimulation,
}

impl FromStr for Stage {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placeholder" => Ok(Self::Placeholder),
            "generator" => Ok(Self::Generator),
            "detector_response" => Ok(Self::DetectorResponse),
            "track_list" => Ok(Self::TrackList),
            "sensor_simulation" => Ok(Self::SensorSimulation),
            _ => Err(ConfigError::BadStage(s.to_string())),
        }
    }
}

/// Where the jobs are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Local,
    Slurm,
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "slurm" => Ok(Self::Slurm),
            _ => Err(ConfigError::BadMode(s.to_string())),
        }
    }
}

impl Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Slurm => write!(f, "slurm"),
        }
    }
}

/// Structure representing the launcher configuration. Contains the sweep, stage paths, and
/// execution settings.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub out_dir: PathBuf,
    pub n_cpu: i32,
    pub max_events: u64,
    pub scan_start: f64,
    pub scan_stop: f64,
    pub scan_points: usize,
    pub stages: Vec<Stage>,
    pub generator_exe: PathBuf,
    pub delphes_exe: PathBuf,
    pub delphes_card: PathBuf,
    pub tracklist_exe: PathBuf,
    pub float_precision: usize,
    pub pixelav_dir: PathBuf,
    pub pixelav_exe: PathBuf,
    pub mode: ExecutionMode,
    pub query_path: Option<PathBuf>,
    pub results_dir: PathBuf,
    pub n_jobs: i32,
}

impl Default for LaunchConfig {
    /// Generate a new LaunchConfig with the standard sweep and install locations
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("./"),
            n_cpu: 4,
            max_events: 1000,
            scan_start: DEFAULT_SCAN_START,
            scan_stop: DEFAULT_SCAN_STOP,
            scan_points: DEFAULT_SCAN_POINTS,
            stages: vec![
                Stage::Generator,
                Stage::DetectorResponse,
                Stage::TrackList,
                Stage::SensorSimulation,
            ],
            generator_exe: PathBuf::from("./bin/minbias.exe"),
            delphes_exe: PathBuf::from("/opt/delphes/DelphesHepMC3"),
            delphes_card: PathBuf::from("./delphes_card_CMS_ABEdit.tcl"),
            tracklist_exe: PathBuf::from("smartpix_tracklist"),
            float_precision: 5,
            pixelav_dir: PathBuf::from("./pixelav/"),
            pixelav_exe: PathBuf::from("./bin/ppixelav2_list_trkpy_n_2f.exe"),
            mode: ExecutionMode::Local,
            query_path: None,
            results_dir: PathBuf::from("results"),
            n_jobs: -1,
        }
    }
}

impl LaunchConfig {
    /// Read the configuration in a YAML file
    /// Returns a LaunchConfig if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Resolve the number of local workers. -1 means every available core.
    pub fn resolve_n_workers(&self) -> Result<usize, ConfigError> {
        match self.n_cpu {
            -1 => Ok(std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)),
            n if n >= 1 => Ok(n as usize),
            n => Err(ConfigError::BadCoreCount(n)),
        }
    }

    /// The cap on submitted jobs. Any negative value means no cap.
    pub fn job_cap(&self) -> Option<usize> {
        if self.n_jobs < 0 {
            None
        } else {
            Some(self.n_jobs as usize)
        }
    }

    /// The active stage chain, deduplicated and in execution order
    pub fn active_stages(&self) -> Result<Vec<Stage>, ConfigError> {
        let mut stages = self.stages.clone();
        stages.sort();
        stages.dedup();
        if stages.is_empty() {
            return Err(ConfigError::EmptyChain);
        }
        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let config = LaunchConfig::default();
        config.write_config_file(&path).unwrap();
        let loaded = LaunchConfig::read_config_file(&path).unwrap();
        assert_eq!(loaded.stages, config.stages);
        assert_eq!(loaded.mode, ExecutionMode::Local);
        assert_eq!(loaded.n_jobs, -1);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: LaunchConfig =
            serde_yaml::from_str("n_cpu: 2\nstages: [placeholder, sensor_simulation]\n").unwrap();
        assert_eq!(config.n_cpu, 2);
        assert_eq!(config.max_events, 1000);
        assert_eq!(
            config.active_stages().unwrap(),
            vec![Stage::Placeholder, Stage::SensorSimulation]
        );
    }

    #[test]
    fn test_missing_file() {
        let result = LaunchConfig::read_config_file(Path::new("/does/not/exist.yml"));
        assert!(matches!(result, Err(ConfigError::BadFilePath(_))));
    }

    #[test]
    fn test_stage_order_and_dedup() {
        let config = LaunchConfig {
            stages: vec![
                Stage::SensorSimulation,
                Stage::Generator,
                Stage::SensorSimulation,
            ],
            ..Default::default()
        };
        assert_eq!(
            config.active_stages().unwrap(),
            vec![Stage::Generator, Stage::SensorSimulation]
        );

        let config = LaunchConfig {
            stages: vec![],
            ..Default::default()
        };
        assert!(matches!(config.active_stages(), Err(ConfigError::EmptyChain)));
    }

    #[test]
    fn test_worker_count() {
        let mut config = LaunchConfig::default();
        assert_eq!(config.resolve_n_workers().unwrap(), 4);
        config.n_cpu = -1;
        assert!(config.resolve_n_workers().unwrap() >= 1);
        config.n_cpu = 0;
        assert!(matches!(
            config.resolve_n_workers(),
            Err(ConfigError::BadCoreCount(0))
        ));
    }

    #[test]
    fn test_job_cap() {
        let mut config = LaunchConfig::default();
        assert_eq!(config.job_cap(), None);
        config.n_jobs = 3;
        assert_eq!(config.job_cap(), Some(3));
        config.n_jobs = 0;
        assert_eq!(config.job_cap(), Some(0));
    }

    #[test]
    fn test_parse_mode_and_stage() {
        assert_eq!(
            "slurm".parse::<ExecutionMode>().unwrap(),
            ExecutionMode::Slurm
        );
        assert!("condor".parse::<ExecutionMode>().is_err());
        assert_eq!("track_list".parse::<Stage>().unwrap(), Stage::TrackList);
        assert!("pixelav".parse::<Stage>().is_err());
    }
}
