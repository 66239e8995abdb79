use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use super::error::PoolError;
use super::job::JobSpec;
use super::runner::{run_job, JobReport};
use super::worker_status::WorkerStatus;

/// A fixed-size pool of worker threads for running jobs on the local machine.
///
/// Workers pull from a shared queue, so no more than `n_workers` jobs are ever in flight. The
/// pool only lives for one call to [`LocalPool::run`], which joins every worker before
/// returning.
#[derive(Debug, Clone)]
pub struct LocalPool {
    n_workers: usize,
}

impl LocalPool {
    pub fn new(n_workers: usize) -> Result<Self, PoolError> {
        if n_workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        Ok(Self { n_workers })
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Run `task` once per job, returning the results in job order.
    ///
    /// The task receives the job and the id of the worker running it. Only as many workers as
    /// there are jobs are spawned.
    pub fn run<F, T>(&self, jobs: Vec<JobSpec>, task: F) -> Result<Vec<T>, PoolError>
    where
        F: Fn(&JobSpec, usize) -> T + Send + Sync + 'static,
        T: Send + 'static,
    {
        let n_jobs = jobs.len();
        let queue: Arc<Mutex<VecDeque<(usize, JobSpec)>>> =
            Arc::new(Mutex::new(jobs.into_iter().enumerate().collect()));
        let task = Arc::new(task);

        let mut workers: Vec<JoinHandle<Vec<(usize, T)>>> = vec![];
        for worker_id in 0..self.n_workers.min(n_jobs) {
            let queue = queue.clone();
            let task = task.clone();
            workers.push(std::thread::spawn(move || {
                let mut results = vec![];
                loop {
                    // Release the lock before running the job
                    let next = match queue.lock() {
                        Ok(mut q) => q.pop_front(),
                        Err(_) => None,
                    };
                    match next {
                        Some((position, job)) => results.push((position, task(&job, worker_id))),
                        None => break,
                    }
                }
                results
            }));
        }

        let mut results: Vec<(usize, T)> = Vec::with_capacity(n_jobs);
        let mut panicked = false;
        for worker in workers {
            match worker.join() {
                Ok(r) => results.extend(r),
                Err(_) => panicked = true,
            }
        }
        if panicked {
            return Err(PoolError::WorkerPanicked);
        }
        results.sort_by_key(|(position, _)| *position);
        Ok(results.into_iter().map(|(_, r)| r).collect())
    }

    /// Run every job's commands, reporting worker progress on `tx` if given
    pub fn run_jobs(
        &self,
        jobs: Vec<JobSpec>,
        tx: Option<Sender<WorkerStatus>>,
    ) -> Result<Vec<JobReport>, PoolError> {
        self.run(jobs, move |job, worker_id| {
            run_job(job, tx.as_ref(), worker_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::default_scan_bins;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn empty_jobs() -> Vec<JobSpec> {
        default_scan_bins()
            .into_iter()
            .map(|bin| JobSpec {
                bin,
                commands: vec![],
            })
            .collect()
    }

    #[test]
    fn test_never_exceeds_pool_size() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());
        let pool = LocalPool::new(3).unwrap();
        let results = pool
            .run(empty_jobs(), move |job, worker_id| {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                a.fetch_sub(1, Ordering::SeqCst);
                (job.bin.index, worker_id)
            })
            .unwrap();

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
        for (idx, (bin_index, worker_id)) in results.iter().enumerate() {
            assert_eq!(*bin_index, idx);
            assert!(*worker_id < 3);
        }
    }

    #[test]
    fn test_more_workers_than_jobs() {
        let pool = LocalPool::new(64).unwrap();
        let jobs: Vec<JobSpec> = empty_jobs().into_iter().take(2).collect();
        let results = pool.run(jobs, |_, worker_id| worker_id).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|id| *id < 2));
    }

    #[test]
    fn test_zero_workers() {
        assert!(matches!(LocalPool::new(0), Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let pool = LocalPool::new(2).unwrap();
        let result = pool.run(empty_jobs(), |job, _| {
            if job.bin.index == 5 {
                panic!("boom");
            }
        });
        assert!(matches!(result, Err(PoolError::WorkerPanicked)));
    }

    #[test]
    fn test_run_jobs_reports() {
        let pool = LocalPool::new(4).unwrap();
        let reports = pool.run_jobs(empty_jobs(), None).unwrap();
        assert_eq!(reports.len(), 20);
        assert!(reports.iter().all(|r| r.is_success()));
    }
}
