use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::command::Command;
use super::config::{LaunchConfig, Stage};
use super::error::ConfigError;
use super::scan::{scan_bins, ScanBin};

/// The ordered list of commands run for one scan bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub bin: ScanBin,
    pub commands: Vec<Command>,
}

/// The output files produced for a single scan bin
#[derive(Debug, Clone, PartialEq)]
pub struct BinFiles {
    pub stem: PathBuf,
    pub hepmc: PathBuf,
    pub root: PathBuf,
    pub track_list: PathBuf,
    pub pixelav_out: PathBuf,
    pub pixelav_seed: PathBuf,
}

impl BinFiles {
    pub fn new(out_dir: &Path, bin: &ScanBin) -> Self {
        let stem = out_dir.join(bin.file_stem());
        let with_suffix = |suffix: &str| {
            let mut name = stem.clone().into_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            hepmc: with_suffix(".hepmc"),
            root: with_suffix(".root"),
            track_list: with_suffix(".txt"),
            pixelav_out: with_suffix(".out"),
            pixelav_seed: with_suffix("_seed"),
            stem,
        }
    }
}

/// Make a path absolute without touching the filesystem
fn resolve(path: &Path) -> Result<PathBuf, ConfigError> {
    Ok(std::path::absolute(path)?)
}

/// Bare program names are left alone so they are looked up on PATH
fn resolve_program(path: &Path) -> Result<PathBuf, ConfigError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => resolve(path),
        _ => Ok(path.to_path_buf()),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Materializes one JobSpec per scan bin from a LaunchConfig.
///
/// No executable is checked for existence here; a bad path shows up as a failed command when
/// the job runs.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    out_dir: PathBuf,
    stages: Vec<Stage>,
    max_events: u64,
    generator_exe: PathBuf,
    delphes_exe: PathBuf,
    delphes_card: PathBuf,
    tracklist_exe: PathBuf,
    float_precision: usize,
    pixelav_dir: PathBuf,
    pixelav_exe: PathBuf,
    bins: Vec<ScanBin>,
}

impl JobBuilder {
    pub fn new(config: &LaunchConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            out_dir: resolve(&config.out_dir)?,
            stages: config.active_stages()?,
            max_events: config.max_events,
            generator_exe: resolve_program(&config.generator_exe)?,
            delphes_exe: resolve_program(&config.delphes_exe)?,
            delphes_card: resolve(&config.delphes_card)?,
            tracklist_exe: resolve_program(&config.tracklist_exe)?,
            float_precision: config.float_precision,
            pixelav_dir: resolve(&config.pixelav_dir)?,
            pixelav_exe: config.pixelav_exe.clone(),
            bins: scan_bins(config.scan_start, config.scan_stop, config.scan_points)?,
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn bins(&self) -> &[ScanBin] {
        &self.bins
    }

    fn stage_command(&self, stage: Stage, bin: &ScanBin, files: &BinFiles) -> Command {
        match stage {
            Stage::Placeholder => Command::standard("echo", vec![String::from("hi")]),
            // ./minbias.exe <outFileName> <maxEvents> <pTHatMin> <pTHatMax>
            Stage::Generator => Command::standard(
                &self.generator_exe,
                vec![
                    path_arg(&files.stem),
                    self.max_events.to_string(),
                    bin.pt_hat_min.to_string(),
                    bin.pt_hat_max.to_string(),
                ],
            ),
            // DelphesHepMC3 <card> <output.root> <input.hepmc>
            Stage::DetectorResponse => Command::standard(
                &self.delphes_exe,
                vec![
                    path_arg(&self.delphes_card),
                    path_arg(&files.root),
                    path_arg(&files.hepmc),
                ],
            ),
            Stage::TrackList => Command::standard(
                &self.tracklist_exe,
                vec![
                    String::from("delphes"),
                    String::from("-i"),
                    path_arg(&files.root),
                    String::from("-o"),
                    path_arg(&files.track_list),
                    String::from("-p"),
                    self.float_precision.to_string(),
                ],
            ),
            Stage::SensorSimulation => Command::in_directory(
                &self.pixelav_dir,
                &self.pixelav_exe,
                vec![
                    String::from("1"),
                    path_arg(&files.track_list),
                    path_arg(&files.pixelav_out),
                    path_arg(&files.pixelav_seed),
                ],
            ),
        }
    }

    /// Assemble the job for a single bin
    pub fn build_job(&self, bin: &ScanBin) -> JobSpec {
        let files = BinFiles::new(&self.out_dir, bin);
        JobSpec {
            bin: *bin,
            commands: self
                .stages
                .iter()
                .map(|stage| self.stage_command(*stage, bin, &files))
                .collect(),
        }
    }

    /// Assemble the jobs for every bin in the sweep
    pub fn build_all(&self) -> Vec<JobSpec> {
        self.bins.iter().map(|bin| self.build_job(bin)).collect()
    }
}

/// Shortcut for building every job for a config
pub fn build_jobs(config: &LaunchConfig) -> Result<Vec<JobSpec>, ConfigError> {
    Ok(JobBuilder::new(config)?.build_all())
}
