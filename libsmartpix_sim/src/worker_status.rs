/// The state of a worker's current job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Finished,
    Failed,
}

/// Progress message sent from a pool worker to whoever is watching the launch.
///
/// Progress is the fraction of the job's commands that have completed.
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub bin_index: usize,
    pub worker_id: usize,
    pub state: JobState,
}

impl WorkerStatus {
    pub fn new(progress: f32, bin_index: usize, worker_id: usize, state: JobState) -> Self {
        Self {
            progress,
            bin_index,
            worker_id,
            state,
        }
    }
}
