//! Background TTL sweep.

use super::UndoLedger;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Handle to a running sweeper thread. Dropping it stops the thread.
pub struct SweeperHandle {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub(super) fn spawn(ledger: &Arc<UndoLedger>, interval: Duration) -> Self {
        let (tx, rx) = bounded::<()>(1);
        let weak: Weak<UndoLedger> = Arc::downgrade(ledger);

        let thread = thread::Builder::new()
            .name("undo-sweeper".into())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        // Ledger dropped: nothing left to sweep.
                        let Some(ledger) = weak.upgrade() else { break };
                        match ledger.sweep() {
                            Ok(0) => {}
                            Ok(n) => debug!(evicted = n, "periodic undo sweep"),
                            Err(e) => warn!(error = %e, "periodic undo sweep failed"),
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .ok();

        if thread.is_none() {
            warn!("could not start undo sweeper thread");
        }

        Self {
            shutdown: Some(tx),
            thread,
        }
    }

    /// Stop the sweeper and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
