use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info};

use crate::broadcast::JobProgressBroadcaster;
use crate::error::WorkerError;
use crate::pipeline::{BroadcastProgress, Pipeline};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Job ids that are queued or running. A job is claimed at enqueue and
/// released when its worker finishes, so one id never runs twice at once.
#[derive(Clone, Default)]
pub struct ActiveJobs {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl ActiveJobs {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Active job set lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Returns `false` when the job is already claimed.
    pub fn claim(&self, job_id: &str) -> bool {
        self.lock().insert(job_id.to_string())
    }

    pub fn release(&self, job_id: &str) {
        self.lock().remove(job_id);
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Fixed set of worker threads fed through a crossbeam channel. Stage work
/// runs on one multi-thread tokio runtime owned by the pool.
pub struct WorkerPool {
    job_sender: Sender<String>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        pipeline: Pipeline,
        broadcaster: JobProgressBroadcaster,
        worker_count: usize,
        active: ActiveJobs,
    ) -> Result<Self, WorkerError> {
        let worker_count = worker_count.max(1);
        let runtime = Arc::new(
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("dossier-rt")
                .build()
                .map_err(WorkerError::Runtime)?,
        );

        let (job_sender, job_receiver) = bounded::<String>(worker_count * 2);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                jobs: job_receiver.clone(),
                shutdown: Arc::clone(&shutdown),
                pipeline: pipeline.clone(),
                broadcaster: broadcaster.clone(),
                runtime: Arc::clone(&runtime),
                active: active.clone(),
            };

            let handle = thread::Builder::new()
                .name(format!("dossier-worker-{}", worker_id))
                .spawn(move || worker.run())
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            workers,
            shutdown,
        })
    }

    /// Queues a job the caller has already claimed in [`ActiveJobs`].
    pub fn submit(&self, job_id: &str) -> Result<(), WorkerError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed);
        }

        self.job_sender
            .send(job_id.to_string())
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Stops taking new jobs. Running attempts finish on their own budget.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn wait(self) {
        // Drop sender to signal workers to exit
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

struct Worker {
    id: usize,
    jobs: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    pipeline: Pipeline,
    broadcaster: JobProgressBroadcaster,
    runtime: Arc<tokio::runtime::Runtime>,
    active: ActiveJobs,
}

impl Worker {
    fn run(self) {
        debug!("Worker {} started", self.id);

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                debug!("Worker {} received shutdown signal", self.id);
                break;
            }

            match self.jobs.recv_timeout(POLL_INTERVAL) {
                Ok(job_id) => {
                    debug!("Worker {} processing job {}", self.id, job_id);

                    let progress = Arc::new(BroadcastProgress::new(self.broadcaster.track(&job_id)));
                    let result = self.runtime.block_on(self.pipeline.run(&job_id, progress));
                    self.active.release(&job_id);

                    info!(
                        "Job {} finished as {} in {} ms",
                        job_id, result.status, result.elapsed_ms
                    );
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    debug!("Worker {} job channel disconnected", self.id);
                    break;
                }
            }
        }

        debug!("Worker {} stopped", self.id);
    }
}
