use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use super::batch::{BatchExecutor, BatchQuery, SubmittedJob, Submitter};
use super::config::{ExecutionMode, LaunchConfig};
use super::error::{LaunchError, QueryError};
use super::job::{JobBuilder, JobSpec};
use super::pool::LocalPool;
use super::runner::JobReport;
use super::worker_status::WorkerStatus;

/// Where a launch sends its jobs
#[derive(Debug, Clone)]
pub enum Backend {
    Local(LocalPool),
    Batch {
        query: BatchQuery,
        cap: Option<usize>,
        results_dir: PathBuf,
    },
}

impl Backend {
    /// Pick the backend for a config. Reads the batch query in slurm mode, so a bad query path
    /// fails here before anything has been written or submitted.
    pub fn select(config: &LaunchConfig) -> Result<Self, LaunchError> {
        match config.mode {
            ExecutionMode::Local => Ok(Self::Local(LocalPool::new(config.resolve_n_workers()?)?)),
            ExecutionMode::Slurm => {
                let query_path = config.query_path.as_ref().ok_or(QueryError::NotGiven)?;
                let query = BatchQuery::read_query_file(query_path)?;
                Ok(Self::Batch {
                    query,
                    cap: config.job_cap(),
                    results_dir: config.results_dir.clone(),
                })
            }
        }
    }

    /// Number of local workers, None for batch launches. Only local workers send statuses.
    pub fn local_workers(&self) -> Option<usize> {
        match self {
            Self::Local(pool) => Some(pool.n_workers()),
            Self::Batch { .. } => None,
        }
    }
}

/// The result of dispatching a launch
#[derive(Debug)]
pub enum LaunchSummary {
    Local {
        reports: Vec<JobReport>,
    },
    Batch {
        folder: PathBuf,
        submitted: Vec<SubmittedJob>,
        skipped: usize,
    },
}

/// A validated launch: the backend and every job, ready to go.
///
/// Building a Launch has no side effects. Output directories are only created by
/// [`Launch::run`].
#[derive(Debug)]
pub struct Launch {
    pub backend: Backend,
    pub jobs: Vec<JobSpec>,
    pub out_dir: PathBuf,
}

impl Launch {
    pub fn new(config: &LaunchConfig) -> Result<Self, LaunchError> {
        let backend = Backend::select(config)?;
        let builder = JobBuilder::new(config)?;
        Ok(Self {
            backend,
            jobs: builder.build_all(),
            out_dir: builder.out_dir().to_path_buf(),
        })
    }

    /// Create the output directory and dispatch every job.
    ///
    /// `tx` receives worker statuses in local mode. `worker_exe` and `submitter` are only used
    /// in batch mode.
    pub fn run<S: Submitter>(
        self,
        tx: Option<Sender<WorkerStatus>>,
        worker_exe: &Path,
        submitter: S,
    ) -> Result<LaunchSummary, LaunchError> {
        if !self.out_dir.is_dir() {
            log::info!("Creating output directory {}", self.out_dir.display());
            std::fs::create_dir_all(&self.out_dir)?;
        }
        for job in self.jobs.iter() {
            log::debug!("Job for bin {}: {:?}", job.bin.index, job.commands);
        }

        match self.backend {
            Backend::Local(pool) => {
                log::info!(
                    "Running {} jobs locally on {} workers",
                    self.jobs.len(),
                    pool.n_workers()
                );
                let reports = pool.run_jobs(self.jobs, tx)?;
                let n_failed = reports.iter().filter(|r| !r.is_success()).count();
                if n_failed > 0 {
                    log::warn!("{} of {} jobs had failed commands", n_failed, reports.len());
                }
                Ok(LaunchSummary::Local { reports })
            }
            Backend::Batch {
                query,
                cap,
                results_dir,
            } => {
                let mut executor = BatchExecutor::new(&results_dir, query, worker_exe, submitter)?;
                log::info!("Batch run folder: {}", executor.folder().display());
                let submitted = executor.submit_all(&self.jobs, cap)?;
                Ok(LaunchSummary::Batch {
                    folder: executor.folder().to_path_buf(),
                    skipped: self.jobs.len() - submitted.len(),
                    submitted,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::RecordingSubmitter;
    use crate::config::Stage;
    use crate::error::ConfigError;

    fn config(root: &Path) -> LaunchConfig {
        LaunchConfig {
            out_dir: root.join("out"),
            results_dir: root.join("results"),
            stages: vec![Stage::Placeholder],
            n_cpu: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_query_aborts_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let config = LaunchConfig {
            mode: ExecutionMode::Slurm,
            query_path: Some(dir.path().join("missing.json")),
            ..config(dir.path())
        };
        let result = Launch::new(&config);
        assert!(matches!(
            result,
            Err(LaunchError::QueryError(QueryError::BadFilePath(_)))
        ));
        assert!(!dir.path().join("out").exists());
        assert!(!dir.path().join("results").exists());

        let config = LaunchConfig {
            query_path: None,
            ..config
        };
        assert!(matches!(
            Launch::new(&config),
            Err(LaunchError::QueryError(QueryError::NotGiven))
        ));
    }

    #[test]
    fn test_batch_respects_cap() {
        let dir = tempfile::tempdir().unwrap();
        let query_path = dir.path().join("query.json");
        std::fs::write(&query_path, r#"{"slurm_partition": "shared"}"#).unwrap();
        for (n_jobs, expected) in [(-1, 20), (0, 0), (5, 5), (40, 20)] {
            let config = LaunchConfig {
                mode: ExecutionMode::Slurm,
                query_path: Some(query_path.clone()),
                n_jobs,
                ..config(dir.path())
            };
            let launch = Launch::new(&config).unwrap();
            assert_eq!(launch.backend.local_workers(), None);
            let summary = launch
                .run(None, Path::new("smartpix_launch"), RecordingSubmitter::default())
                .unwrap();
            match summary {
                LaunchSummary::Batch {
                    submitted, skipped, ..
                } => {
                    assert_eq!(submitted.len(), expected);
                    assert_eq!(skipped, 20 - expected);
                }
                LaunchSummary::Local { .. } => panic!("expected a batch launch"),
            }
        }
        assert!(dir.path().join("out").is_dir());
    }

    #[test]
    fn test_bad_core_count() {
        let dir = tempfile::tempdir().unwrap();
        let config = LaunchConfig {
            n_cpu: -4,
            ..config(dir.path())
        };
        assert!(matches!(
            Launch::new(&config),
            Err(LaunchError::ConfigError(_))
        ));
    }

    #[test]
    fn test_bad_sweep_rejected_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let config = LaunchConfig {
            scan_start: 2.0,
            scan_stop: 0.0,
            ..config(dir.path())
        };
        assert!(matches!(
            Launch::new(&config),
            Err(LaunchError::ConfigError(ConfigError::BadScanRange(_, _)))
        ));
        assert!(!dir.path().join("out").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_local_runs_every_job() {
        let dir = tempfile::tempdir().unwrap();
        let launch = Launch::new(&config(dir.path())).unwrap();
        assert_eq!(launch.jobs.len(), 20);
        assert_eq!(launch.backend.local_workers(), Some(2));
        let summary = launch
            .run(None, Path::new("smartpix_launch"), RecordingSubmitter::default())
            .unwrap();
        match summary {
            LaunchSummary::Local { reports } => {
                assert_eq!(reports.len(), 20);
                assert!(reports.iter().all(|r| r.is_success()));
            }
            LaunchSummary::Batch { .. } => panic!("expected a local launch"),
        }
    }
}
