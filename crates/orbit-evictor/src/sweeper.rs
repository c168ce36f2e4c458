//! Background sweeper thread.
//!
//! Runs off the request path: each cycle flushes dirty entries (when the
//! persistence strategy defers writes) and runs an eviction sweep (when
//! the sweep trigger includes periodic). The tick doubles as the shutdown
//! signal so deactivation joins promptly instead of sleeping out the
//! interval.

use crate::evictor::{Activator, Shared};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

pub(crate) struct BackgroundSweeper {
    shutdown_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BackgroundSweeper {
    pub fn start<A: Activator>(
        shared: Arc<Shared<A>>,
        interval: Duration,
        flush: bool,
        evict: bool,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            info!("background sweeper started");
            loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                if flush {
                    shared.flush_dirty();
                }
                if evict {
                    shared.sweep();
                }
            }
            info!("background sweeper stopped");
        });
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread and join it.
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BackgroundSweeper {
    fn drop(&mut self) {
        self.join();
    }
}
