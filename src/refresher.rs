//! Background refresher
//!
//! A named thread that runs a task on a fixed interval until stopped.
//!
//! ## Shutdown
//! - `stop()` drops the stop sender; the thread sees the channel disconnect
//!   in its `select!` and exits after the current tick (if any) finishes
//! - The thread is joined, so no tick runs after `stop()` returns

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::Result;

/// Handle to a running periodic task
pub struct Refresher {
    /// Dropping this disconnects the thread's stop receiver
    stop_tx: Option<Sender<()>>,

    handle: Option<JoinHandle<()>>,

    interval: Duration,
}

impl Refresher {
    /// Spawn a thread named `name` that calls `tick` every `interval`
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || run(interval, stop_rx, tick))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    /// Stop the task and wait for the thread to exit
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Refresher thread panicked");
            }
        }
    }

    /// Whether the thread is still owned by this handle
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Get the tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Thread body: wait for the next tick or a stop signal
fn run<F: FnMut()>(interval: Duration, stop_rx: Receiver<()>, mut tick: F) {
    tracing::debug!("Refresher started (interval {:?})", interval);

    loop {
        crossbeam::select! {
            recv(stop_rx) -> _ => break,
            recv(channel::after(interval)) -> _ => tick(),
        }
    }

    tracing::debug!("Refresher stopped");
}
