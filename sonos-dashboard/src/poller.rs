//! Periodic topology polling on a dedicated thread

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sonos_topology::TopologySynchronizer;

/// Handle to the background poll thread
///
/// One synchronization pass runs at a time. A pass that overruns the
/// interval swallows the ticks it missed instead of running them back to
/// back. Dropping the handle stops the thread.
pub(crate) struct Poller {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub(crate) fn spawn(
        synchronizer: Arc<TopologySynchronizer>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("topology-poller".to_string())
            .spawn(move || {
                tracing::info!("Topology poller started, interval {:?}", interval);
                let mut next_tick = Instant::now() + interval;

                loop {
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match shutdown_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if let Err(e) = synchronizer.synchronize() {
                        tracing::warn!("Topology poll failed, keeping previous model: {}", e);
                    }

                    next_tick += interval;
                    let now = Instant::now();
                    let mut missed = 0u32;
                    while next_tick <= now {
                        next_tick += interval;
                        missed += 1;
                    }
                    if missed > 0 {
                        tracing::debug!("Topology poll overran, skipped {} tick(s)", missed);
                    }
                }

                tracing::info!("Topology poller stopped");
            })?;

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for the pass in flight to finish
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Topology poller thread panicked");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
