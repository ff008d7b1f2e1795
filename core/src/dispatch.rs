//! The designated "main" execution context.
//!
//! # Design
//! `main_queue()` returns a sending half (`MainQueue`), which any thread can
//! use to schedule work, and a `MainLoop` that the owning thread pumps. A UI
//! host would pump the loop from its event loop; tests pump it from the test
//! thread and then assert on where callbacks ran.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs on a particular execution context.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Cloneable handle that schedules jobs onto a `MainLoop`.
#[derive(Clone)]
pub struct MainQueue {
    tx: Sender<Job>,
}

impl Dispatcher for MainQueue {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("main loop is gone, dropping dispatched job");
        }
    }
}

/// Receiving end of the main queue.
pub struct MainLoop {
    rx: Receiver<Job>,
}

pub fn main_queue() -> (MainQueue, MainLoop) {
    let (tx, rx) = mpsc::channel();
    (MainQueue { tx }, MainLoop { rx })
}

impl MainLoop {
    /// Run jobs until every `MainQueue` handle has been dropped.
    pub fn run(self) {
        for job in self.rx.iter() {
            job();
        }
    }

    /// Run one job, waiting up to `timeout` for it. Returns whether a job ran.
    pub fn run_once(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Run every job that is already queued. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }
}
