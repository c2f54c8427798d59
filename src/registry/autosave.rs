//! Background worker that runs a task on a fixed period.

use crate::error::StorageError;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Periodic worker thread. The task returns false to end the loop.
pub struct Autosave {
    stop: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Autosave {
    pub fn start<F>(interval: Duration, mut task: F) -> Result<Self, StorageError>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop, signal) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("strata-autosave".to_string())
            .spawn(move || {
                debug!(interval_ms = interval.as_millis() as u64, "Autosave worker started");
                loop {
                    match signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if !task() {
                                break;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Autosave worker stopped");
            })
            .map_err(|e| StorageError::io("strata-autosave", e))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the worker and wait for it, unless called from the worker
    /// itself.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Autosave worker panicked");
            }
        }
    }
}

impl Drop for Autosave {
    fn drop(&mut self) {
        let _ = self.stop.send(());
    }
}
