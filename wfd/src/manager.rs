// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! Pipeline manager.
//!
//! Pipeline construction can block, so it runs on one background worker per
//! session instead of the thread issuing lifecycle commands. Producers append
//! [`Job`]s to a queue under a mutex and wake the worker with
//! [`PipelineManager::signal`]; the worker takes the whole queue as a snapshot
//! and runs the jobs one by one, in submission order.
//!
//! ```text
//! enqueue ─┐                       ┌─► handle(job 1)
//! enqueue ─┼─► [queue] ─signal─► worker ─► handle(job 2)
//! enqueue ─┘                       └─► Exit: clear queue, return
//! ```
//!
//! An [`Job::Exit`] replaces whatever is still queued. Once the worker has seen
//! it, no other job ever runs.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread::{self, JoinHandle, ThreadId},
};

use tracing::{debug, error, trace, warn};

use crate::{Error, Result};

/// A unit of asynchronous pipeline work.
///
/// Jobs carry no data; handlers read what they need from the session when
/// the job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    LinkAudioDecodeChain,
    LinkVideoDecodeChain,
    PrepareAudioPipeline,
    PrepareVideoPipeline,
    Exit,
}

/// Executes jobs on behalf of the worker.
pub trait JobHandler: Send + Sync + 'static {
    /// Runs one job. An error stops the worker.
    fn handle(&self, job: Job) -> Result<()>;

    /// Called on the worker thread after `handle` failed, before the worker
    /// exits.
    fn failed(&self, job: Job, error: &Error) {
        let _ = (job, error);
    }
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    /// A producer asked the worker to run what is queued.
    signalled: bool,
    /// The worker has observed an exit and returned.
    exited: bool,
}

#[derive(Default)]
struct Queue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl Queue {
    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state.lock().map_err(|e| Error::poisoned("job queue", e))
    }
}

struct Worker {
    handle: JoinHandle<()>,
    thread: ThreadId,
}

/// Serializes pipeline-construction jobs onto one background thread.
#[derive(Default)]
pub struct PipelineManager {
    queue: Arc<Queue>,
    worker: Mutex<Option<Worker>>,
}

impl PipelineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the worker thread. Returns immediately.
    ///
    /// # Errors
    ///
    /// Fails if the worker is already running or the thread cannot be spawned.
    pub fn start<H: JobHandler>(&self, name: &str, handler: H) -> Result<()> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|e| Error::poisoned("worker", e))?;
        if worker.is_some() {
            return Err(Error::Internal("pipeline worker already started".into()));
        }

        {
            let mut state = self.queue.lock()?;
            state.jobs.clear();
            state.signalled = false;
            state.exited = false;
        }

        let queue = self.queue.clone();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || run_worker(&queue, &handler))?;
        let thread = handle.thread().id();
        debug!(worker = name, "pipeline worker started");

        *worker = Some(Worker { handle, thread });
        Ok(())
    }

    /// Appends `job` to the queue without waking the worker.
    ///
    /// An [`Job::Exit`] first discards everything still queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManagerStopped`] once the worker has exited.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        let mut state = self.queue.lock()?;
        if state.exited {
            return Err(Error::ManagerStopped);
        }
        if job == Job::Exit && !state.jobs.is_empty() {
            debug!(discarded = state.jobs.len(), "exit supersedes queued jobs");
            state.jobs.clear();
        }
        trace!(?job, "job queued");
        state.jobs.push_back(job);
        Ok(())
    }

    /// Wakes the worker if there is anything queued.
    pub fn signal(&self) -> Result<()> {
        let mut state = self.queue.lock()?;
        if !state.jobs.is_empty() {
            state.signalled = true;
            self.queue.not_empty.notify_one();
        }
        Ok(())
    }

    /// Enqueues an exit, wakes the worker and waits for it to return.
    ///
    /// Calling this from the worker thread itself (for example from a
    /// notification callback) requests the exit without waiting. Stopping a
    /// manager that was never started, or twice, does nothing.
    pub fn stop(&self) {
        let worker = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(e) => {
                error!("worker mutex poisoned: {e}");
                return;
            }
        };
        let Some(worker) = worker else {
            return;
        };

        match self.enqueue(Job::Exit) {
            Ok(()) | Err(Error::ManagerStopped) => {}
            Err(e) => warn!("failed to queue exit: {e}"),
        }
        if let Err(e) = self.signal() {
            warn!("failed to signal exit: {e}");
        }

        if worker.thread == thread::current().id() {
            debug!("pipeline worker stop requested from the worker itself");
            return;
        }
        if worker.handle.join().is_err() {
            error!("pipeline worker panicked");
        }
        debug!("pipeline worker stopped");
    }

    /// Whether the worker has observed an exit and returned.
    pub fn has_exited(&self) -> bool {
        self.queue.lock().map(|state| state.exited).unwrap_or(true)
    }

    /// Number of jobs waiting for the worker.
    pub fn queued(&self) -> usize {
        self.queue.lock().map(|state| state.jobs.len()).unwrap_or(0)
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker<H: JobHandler>(queue: &Queue, handler: &H) {
    loop {
        let batch = {
            let Ok(mut state) = queue.lock() else {
                error!("job queue poisoned, pipeline worker exiting");
                return;
            };
            while state.jobs.is_empty() || !state.signalled {
                state = match queue.not_empty.wait(state) {
                    Ok(state) => state,
                    Err(_) => {
                        error!("job queue poisoned, pipeline worker exiting");
                        return;
                    }
                };
            }
            state.signalled = false;
            std::mem::take(&mut state.jobs)
        };

        let mut exit = false;
        for job in batch {
            if job == Job::Exit {
                exit = true;
                break;
            }
            trace!(?job, "running job");
            if let Err(e) = handler.handle(job) {
                error!(?job, "pipeline job failed, worker exiting: {e}");
                handler.failed(job, &e);
                exit = true;
                break;
            }
        }

        if exit {
            match queue.lock() {
                Ok(mut state) => {
                    state.jobs.clear();
                    state.exited = true;
                }
                Err(_) => error!("job queue poisoned while exiting"),
            }
            debug!("pipeline worker exited");
            return;
        }
    }
}
