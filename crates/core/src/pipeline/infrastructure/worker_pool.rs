use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};
use thiserror::Error;

/// A unit of work executed on a pool thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum WorkerPoolError {
    #[error("worker pool is shut down")]
    Closed,
    #[error("worker queue is full")]
    Full,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Fixed-size pool of named threads fed by a bounded channel.
///
/// A panicking job is caught and logged; the thread carries on with the
/// next job. Dropping the pool closes the queue and joins every worker.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, WorkerPoolError> {
        let size = size.max(1);
        let (tx, rx) = crossbeam_channel::bounded::<Job>(size);

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("facemood-worker-{id}"))
                .spawn(move || {
                    for job in rx {
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            log::error!("Worker {id} job panicked: {}", panic_message(&*payload));
                        }
                    }
                    log::trace!("Worker {id} exiting");
                })?;
            workers.push(handle);
        }

        log::debug!("Started worker pool with {size} threads");
        Ok(Self {
            tx: Some(tx),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` without blocking.
    ///
    /// On error the job is dropped, which releases anything it owns.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> Result<(), WorkerPoolError> {
        let tx = self.tx.as_ref().ok_or(WorkerPoolError::Closed)?;
        tx.try_send(Box::new(job)).map_err(|e| match e {
            TrySendError::Full(_) => WorkerPoolError::Full,
            TrySendError::Disconnected(_) => WorkerPoolError::Closed,
        })
    }

    /// Close the queue, let queued jobs finish, and join all workers.
    pub fn shutdown(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Worker thread terminated abnormally");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
