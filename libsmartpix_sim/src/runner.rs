use std::sync::mpsc::Sender;

use super::command::Command;
use super::error::CommandError;
use super::job::JobSpec;
use super::worker_status::{JobState, WorkerStatus};

/// What happened to a single command
#[derive(Debug)]
pub enum CommandOutcome {
    /// The command ran to completion. Code is None if the process was killed by a signal.
    Exited { code: Option<i32>, success: bool },
    /// The command never started
    NotStarted(CommandError),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited { success: true, .. })
    }
}

/// Per-command record of a job run
#[derive(Debug)]
pub struct JobReport {
    pub bin_index: usize,
    pub outcomes: Vec<(String, CommandOutcome)>,
}

impl JobReport {
    pub fn n_failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.n_failed() == 0
    }
}

/// Run one command to completion, with output going straight to the terminal
pub fn run_command(command: &Command) -> CommandOutcome {
    match command.to_process().status() {
        Ok(status) => CommandOutcome::Exited {
            code: status.code(),
            success: status.success(),
        },
        Err(e) => CommandOutcome::NotStarted(CommandError::SpawnFailed(command.to_string(), e)),
    }
}

/// Run every command of a job in order.
///
/// A failing command is logged and recorded, but the remaining commands still run. If a status
/// channel is given, progress is reported after each command; a closed channel is ignored.
pub fn run_job(job: &JobSpec, tx: Option<&Sender<WorkerStatus>>, worker_id: usize) -> JobReport {
    let n_commands = job.commands.len();
    let report_status = |progress: f32, state: JobState| {
        if let Some(tx) = tx {
            let _ = tx.send(WorkerStatus::new(progress, job.bin.index, worker_id, state));
        }
    };

    report_status(0.0, JobState::Running);
    let mut outcomes = Vec::with_capacity(n_commands);
    for (idx, command) in job.commands.iter().enumerate() {
        let line = command.to_string();
        log::info!("[bin {}] {}", job.bin.index, line);
        let outcome = run_command(command);
        match &outcome {
            CommandOutcome::Exited { success: true, .. } => (),
            CommandOutcome::Exited { code, .. } => log::warn!(
                "[bin {}] Command exited with status {}: {}",
                job.bin.index,
                code.map_or(String::from("signal"), |c| c.to_string()),
                line
            ),
            CommandOutcome::NotStarted(e) => log::error!("[bin {}] {}", job.bin.index, e),
        }
        outcomes.push((line, outcome));
        report_status((idx + 1) as f32 / n_commands as f32, JobState::Running);
    }

    let report = JobReport {
        bin_index: job.bin.index,
        outcomes,
    };
    let final_state = if report.is_success() {
        JobState::Finished
    } else {
        JobState::Failed
    };
    report_status(1.0, final_state);
    report
}
