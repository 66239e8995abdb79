use rand::Rng;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

use super::error::{BatchError, QueryError};
use super::job::JobSpec;

// Top-level key holding the submission parameters in launcher query files
const SLURM_SECTION_KEY: &str = "slurm";
// Keys nested under these are passed straight through as sbatch options
const ADDITIONAL_PARAMETER_KEYS: [&str; 2] = ["slurm_additional_parameters", "additional_parameters"];

/// One `#SBATCH` line. A directive with no value is a bare flag (`--exclusive`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub value: Option<String>,
}

impl Directive {
    pub fn render(&self) -> String {
        match &self.value {
            Some(v) => format!("#SBATCH --{}={}", self.name, v),
            None => format!("#SBATCH --{}", self.name),
        }
    }
}

fn strip_slurm_prefix(key: &str) -> &str {
    key.strip_prefix("slurm_").unwrap_or(key)
}

/// Translate a submitit style parameter name into an sbatch option name
fn directive_name(key: &str) -> String {
    match strip_slurm_prefix(key) {
        "timeout_min" => String::from("time"),
        "mem_gb" => String::from("mem"),
        "name" | "job_name" => String::from("job-name"),
        "tasks_per_node" => String::from("ntasks-per-node"),
        key => key.replace('_', "-"),
    }
}

fn scalar_value(key: &str, value: &Value) -> Result<Option<Option<String>>, QueryError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(None)),
        Value::Number(n) => Ok(Some(Some(n.to_string()))),
        Value::String(s) => Ok(Some(Some(s.clone()))),
        _ => Err(QueryError::BadValue(key.to_string())),
    }
}

fn key_string(key: &Value) -> Result<String, QueryError> {
    match key {
        Value::String(s) => Ok(s.clone()),
        other => Err(QueryError::BadKey(format!("{other:?}"))),
    }
}

/// The user's batch submission parameters.
///
/// Read from a YAML (or JSON) document of key/value pairs and translated into `#SBATCH`
/// directives, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchQuery {
    directives: Vec<Directive>,
}

impl BatchQuery {
    /// Read the query file. A missing file is an error before anything else happens.
    pub fn read_query_file(path: &Path) -> Result<Self, QueryError> {
        if !path.exists() {
            return Err(QueryError::BadFilePath(path.to_path_buf()));
        }
        let query_str = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&query_str)
    }

    /// Parse a query document. If it has a top-level `slurm` mapping, only that section is used.
    pub fn from_yaml_str(query_str: &str) -> Result<Self, QueryError> {
        match serde_yaml::from_str::<Value>(query_str)? {
            Value::Mapping(map) => match map.get(SLURM_SECTION_KEY) {
                Some(Value::Mapping(section)) => Self::from_mapping(section),
                Some(Value::Null) => Ok(Self::default()),
                _ => Self::from_mapping(&map),
            },
            Value::Null => Ok(Self::default()),
            _ => Err(QueryError::NotAMapping),
        }
    }

    fn from_mapping(map: &Mapping) -> Result<Self, QueryError> {
        let mut directives = vec![];
        for (key, value) in map.iter() {
            let key = key_string(key)?;
            if ADDITIONAL_PARAMETER_KEYS.contains(&key.as_str()) {
                let Value::Mapping(extra) = value else {
                    return Err(QueryError::BadValue(key));
                };
                for (extra_key, extra_value) in extra.iter() {
                    let extra_key = key_string(extra_key)?;
                    if let Some(v) = scalar_value(&extra_key, extra_value)? {
                        directives.push(Directive {
                            name: extra_key.replace('_', "-"),
                            value: v,
                        });
                    }
                }
                continue;
            }

            if let Some(mut v) = scalar_value(&key, value)? {
                // mem_gb is a bare number of gigabytes; slurm_mem is passed as written
                if strip_slurm_prefix(&key) == "mem_gb" {
                    v = v.map(|gb| format!("{gb}G"));
                }
                let name = directive_name(&key);
                directives.push(Directive { name, value: v });
            }
        }
        Ok(Self { directives })
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }
}

/// Something that can hand a batch script to the queue and return the queue's job id
pub trait Submitter {
    fn submit(&mut self, script: &Path) -> Result<String, BatchError>;
}

/// Submits scripts to SLURM through `sbatch --parsable`
#[derive(Debug, Clone, Default)]
pub struct SbatchSubmitter;

impl Submitter for SbatchSubmitter {
    fn submit(&mut self, script: &Path) -> Result<String, BatchError> {
        let output = std::process::Command::new("sbatch")
            .arg("--parsable")
            .arg(script)
            .output()?;
        if !output.status.success() {
            return Err(BatchError::SubmissionFailed(
                script.to_path_buf(),
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        // --parsable prints "jobid" or "jobid;cluster"
        let stdout = String::from_utf8_lossy(&output.stdout);
        let job_id = stdout.trim().split(';').next().unwrap_or("").to_string();
        if job_id.is_empty() {
            return Err(BatchError::BadJobId(stdout.to_string()));
        }
        Ok(job_id)
    }
}

/// Record of a job handed to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub bin_index: usize,
    pub job_id: String,
    pub script: PathBuf,
}

/// Generate the randomized run folder name, temp-<8 hex chars>
pub fn random_folder_name() -> String {
    format!("temp-{:08x}", rand::thread_rng().gen::<u32>())
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Submits jobs to the batch queue, one script per job.
///
/// Every run gets its own randomized folder under the results directory. The folder holds the
/// serialized jobs, their scripts, and the queue's log files. Each script calls back into
/// `worker_exe run-job <job file>` on the batch node.
#[derive(Debug)]
pub struct BatchExecutor<S: Submitter> {
    folder: PathBuf,
    query: BatchQuery,
    worker_exe: PathBuf,
    submitter: S,
}

impl<S: Submitter> BatchExecutor<S> {
    /// Create the executor and its run folder
    pub fn new(
        results_dir: &Path,
        query: BatchQuery,
        worker_exe: &Path,
        submitter: S,
    ) -> Result<Self, BatchError> {
        let folder = std::path::absolute(results_dir.join(random_folder_name()))?;
        std::fs::create_dir_all(&folder)?;
        Ok(Self {
            folder,
            query,
            worker_exe: worker_exe.to_path_buf(),
            submitter,
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn submitter(&self) -> &S {
        &self.submitter
    }

    fn render_script(&self, job: &JobSpec, job_file: &Path) -> String {
        let mut lines = vec![
            String::from("#!/bin/bash"),
            format!("#SBATCH --job-name=smartpix_{}", job.bin.file_stem()),
            format!("#SBATCH --output={}/%j_log.out", self.folder.display()),
            format!("#SBATCH --error={}/%j_log.err", self.folder.display()),
        ];
        // Later directives win, so the user's query overrides the defaults above
        lines.extend(self.query.directives().iter().map(|d| d.render()));
        lines.push(String::new());
        lines.push(format!(
            "exec {} run-job {}",
            shell_quote(&self.worker_exe),
            shell_quote(job_file)
        ));
        lines.push(String::new());
        lines.join("\n")
    }

    /// Write the job and its script into the run folder, then submit it
    pub fn submit(&mut self, job: &JobSpec) -> Result<SubmittedJob, BatchError> {
        let job_file = self.folder.join(format!("job_{}.yml", job.bin.index));
        std::fs::write(&job_file, serde_yaml::to_string(job)?)?;

        let script = self.folder.join(format!("job_{}.sh", job.bin.index));
        std::fs::write(&script, self.render_script(job, &job_file))?;

        let job_id = self.submitter.submit(&script)?;
        log::info!(
            "Submitted bin {} ({}) as batch job {}",
            job.bin.index,
            job.bin.file_stem(),
            job_id
        );
        Ok(SubmittedJob {
            bin_index: job.bin.index,
            job_id,
            script,
        })
    }

    /// Submit the jobs in order. With a cap, only the first `cap` jobs are submitted and the
    /// rest are skipped.
    pub fn submit_all(
        &mut self,
        jobs: &[JobSpec],
        cap: Option<usize>,
    ) -> Result<Vec<SubmittedJob>, BatchError> {
        let n_submit = cap.map_or(jobs.len(), |c| c.min(jobs.len()));
        if n_submit < jobs.len() {
            log::info!(
                "Job cap is {}; skipping {} of {} jobs",
                n_submit,
                jobs.len() - n_submit,
                jobs.len()
            );
        }
        jobs[..n_submit]
            .iter()
            .map(|job| self.submit(job))
            .collect()
    }
}

/// Read back a job written by a batch executor
pub fn read_job_file(path: &Path) -> Result<JobSpec, BatchError> {
    let job_str = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str::<JobSpec>(&job_str)?)
}
