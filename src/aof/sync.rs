//! Background AOF sync
//!
//! A timer thread that fsyncs the log on a fixed period until it is told to
//! stop.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, select, Sender};
use tracing::{debug, error};

use super::Aof;
use crate::error::Result;

/// Handle to the running sync thread
///
/// Dropping the handle stops the thread and waits for it.
pub struct SyncTask {
    /// Dropping the sender wakes the thread and ends its loop
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncTask {
    /// Start syncing `aof` every `period`
    pub fn spawn(aof: Arc<Aof>, period: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("aof-sync".to_string())
            .spawn(move || {
                let ticker = channel::tick(period);
                debug!(period_ms = period.as_millis() as u64, "AOF sync task started");

                loop {
                    select! {
                        recv(ticker) -> _ => {
                            if let Err(e) = aof.sync() {
                                error!(error = %e, "AOF sync failed");
                            }
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }

                debug!("AOF sync task stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it to exit
    pub fn shutdown(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("AOF sync task panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}
