//! PeriodicTask: a named background thread that runs a tick on a fixed
//! period until stopped.
//!
//! The wait between ticks is a `recv_timeout` on a stop channel, so `stop()`
//! wakes the thread immediately instead of waiting out the period.

use std::ops::ControlFlow;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use permstore_core::errors::PoolError;

pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn the task. `tick` runs once per `period`; returning
    /// `ControlFlow::Break` ends the task from the inside.
    pub fn start<F>(name: &str, period: Duration, mut tick: F) -> Result<Self, PoolError>
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if tick().is_break() {
                            tracing::debug!(task = %thread_name, "task finished");
                            return;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!(task = %thread_name, "task interrupted");
                        return;
                    }
                }
            })
            .map_err(|e| PoolError::TaskSpawn {
                task: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Interrupt the wait and join the thread. A tick already in progress is
    /// allowed to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender disconnects the channel and wakes the sleeper.
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!(task = %self.name, "task panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}
