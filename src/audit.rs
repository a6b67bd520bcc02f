//! Fire-and-forget audit logging.
//!
//! Audit writes ride a channel to a background task so that a broken
//! audit trail can never fail or slow the operation being audited.
//! `record()` always succeeds from the caller's point of view; write
//! failures are logged and counted, never propagated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::Error;
use crate::store::{AuditEntry, AuditStore};

enum AuditMsg {
    Entry(AuditEntry),
    Flush(oneshot::Sender<()>),
}

/// Handle for submitting audit entries. Cheap to clone; all clones
/// feed the same background writer.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<AuditMsg>,
    dropped: Arc<AtomicU64>,
}

impl AuditLogger {
    /// Spawn the background writer and return its handle.
    pub fn spawn(store: AuditStore) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditMsg>();
        let dropped = Arc::new(AtomicU64::new(0));
        let dropped_writer = Arc::clone(&dropped);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    AuditMsg::Entry(entry) => {
                        if let Err(err) = store.insert(&entry) {
                            let err = Error::AuditWrite(err.to_string());
                            let total = dropped_writer.fetch_add(1, Ordering::Relaxed) + 1;
                            warn!(
                                action = %entry.action,
                                dropped_total = total,
                                "audit write failed: {}",
                                err.format_for_log()
                            );
                        }
                    }
                    AuditMsg::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("audit writer stopped");
        });

        Self { tx, dropped }
    }

    /// Submit an entry. Never fails; a closed channel counts as a
    /// dropped write.
    pub fn record(&self, entry: AuditEntry) {
        if self.tx.send(AuditMsg::Entry(entry)).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped_total = total, "audit channel closed, entry dropped");
        }
    }

    /// Wait until every entry submitted so far has been processed.
    /// Used at shutdown and in tests.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(AuditMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// How many audit writes have been lost since startup.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
