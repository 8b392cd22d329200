use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use super::store::Store;

/// Default sweep interval: 10 minutes.
pub const DEFAULT_SWEEP_INTERVAL_S: u64 = 10 * 60;

/// Background thread that periodically sweeps expired sessions out of a store.
///
/// Stops when [`Reaper::stop`] is called or the handle is dropped.
pub struct Reaper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Start sweeping `store` every `interval`. A zero interval is rejected.
    pub fn spawn(store: Arc<dyn Store>, interval: Duration) -> std::io::Result<Self> {
        if interval.is_zero() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "reaper interval must be non-zero",
            ));
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("session-reaper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match store.sweep() {
                        Ok(0) => {}
                        Ok(n) => debug!("Reaper removed {} expired session(s)", n),
                        Err(e) => warn!("Session sweep failed: {}", e),
                    },
                    // stop requested or handle dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread to exit and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Session reaper thread panicked");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
