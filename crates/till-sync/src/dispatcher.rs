//! # Notification Dispatcher
//!
//! Background worker that delivers voucher redemptions after a sale has
//! committed.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Notification Dispatcher Flow                         │
//! │                                                                         │
//! │  settle() ── COMMIT ──► handle.enqueue(voucher_id)                     │
//! │                               │  try_send (never waits)                │
//! │                               │  queue full → warn, drop               │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  bounded mpsc (queue_capacity)                                  │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  NotificationDispatcher::run                                    │   │
//! │  │                                                                 │   │
//! │  │  loop select!                                                   │   │
//! │  │    voucher_id  → notifier.voucher_redeemed(id)                  │   │
//! │  │                  Err → warn!, continue                          │   │
//! │  │    shutdown    → drain what is queued, stop                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at most once. A failed call is logged and not retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::notifier::VoucherRedemptionNotifier;

/// Counters shared between the worker and its handles.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl DispatchStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Notifications discarded because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

pub struct NotificationDispatcher {
    notifier: Arc<dyn VoucherRedemptionNotifier>,
    queue_rx: mpsc::Receiver<String>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<DispatchStats>,
}

/// Cheap, cloneable sender side of the dispatcher.
#[derive(Clone)]
pub struct NotificationHandle {
    queue_tx: mpsc::Sender<String>,
    shutdown_tx: mpsc::Sender<()>,
    stats: Arc<DispatchStats>,
}

impl NotificationHandle {
    /// Queues a redemption without waiting.
    ///
    /// Returns `QueueFull` or `ShuttingDown` when the notification was
    /// dropped; callers on the sale path only log it.
    pub fn enqueue(&self, voucher_id: &str) -> SyncResult<()> {
        match self.queue_tx.try_send(voucher_id.to_string()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(voucher_id, "Notification queue full; dropping voucher redemption");
                Err(SyncError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(voucher_id, "Notification dispatcher stopped; dropping voucher redemption");
                Err(SyncError::ShuttingDown)
            }
        }
    }

    /// Asks the worker to finish what is queued and stop.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher with room for `capacity` pending notifications.
    pub fn new(
        notifier: Arc<dyn VoucherRedemptionNotifier>,
        capacity: usize,
    ) -> (Self, NotificationHandle) {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let stats = Arc::new(DispatchStats::default());

        let dispatcher = NotificationDispatcher {
            notifier,
            queue_rx,
            shutdown_rx,
            stats: stats.clone(),
        };
        let handle = NotificationHandle {
            queue_tx,
            shutdown_tx,
            stats,
        };

        (dispatcher, handle)
    }

    /// Runs the delivery loop. Spawn this as a background task.
    pub async fn run(mut self) {
        info!("Notification dispatcher starting");

        loop {
            tokio::select! {
                next = self.queue_rx.recv() => match next {
                    Some(voucher_id) => self.deliver(&voucher_id).await,
                    // every handle dropped
                    None => break,
                },

                _ = self.shutdown_rx.recv() => {
                    info!("Notification dispatcher shutting down");
                    self.queue_rx.close();
                    while let Some(voucher_id) = self.queue_rx.recv().await {
                        self.deliver(&voucher_id).await;
                    }
                    break;
                }
            }
        }

        info!(
            delivered = self.stats.delivered(),
            failed = self.stats.failed(),
            dropped = self.stats.dropped(),
            "Notification dispatcher stopped"
        );
    }

    async fn deliver(&self, voucher_id: &str) {
        match self.notifier.voucher_redeemed(voucher_id).await {
            Ok(()) => {
                self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(voucher_id, "Voucher redemption notified");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    voucher_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Voucher redemption notification failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::{Mutex, Notify};

    /// Records ids; fails for ids starting with `fail`.
    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VoucherRedemptionNotifier for RecordingNotifier {
        async fn voucher_redeemed(&self, voucher_id: &str) -> SyncResult<()> {
            self.seen.lock().await.push(voucher_id.to_string());
            if voucher_id.starts_with("fail") {
                return Err(SyncError::ExternalSyncFailure {
                    voucher_id: voucher_id.to_string(),
                    status: 500,
                });
            }
            Ok(())
        }
    }

    /// Blocks every call until released.
    struct GatedNotifier {
        gate: Notify,
    }

    #[async_trait]
    impl VoucherRedemptionNotifier for GatedNotifier {
        async fn voucher_redeemed(&self, _voucher_id: &str) -> SyncResult<()> {
            self.gate.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_worker() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (dispatcher, handle) = NotificationDispatcher::new(notifier.clone(), 8);
        let worker = tokio::spawn(dispatcher.run());

        handle.enqueue("v-1").unwrap();
        handle.enqueue("fail-2").unwrap();
        handle.enqueue("v-3").unwrap();
        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*notifier.seen.lock().await, vec!["v-1", "fail-2", "v-3"]);
        assert_eq!(handle.stats().delivered(), 2);
        assert_eq!(handle.stats().failed(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_waiting() {
        let notifier = Arc::new(GatedNotifier { gate: Notify::new() });
        let (dispatcher, handle) = NotificationDispatcher::new(notifier.clone(), 1);

        // worker not running yet: first fills the queue, second is dropped
        handle.enqueue("v-1").unwrap();
        assert!(matches!(handle.enqueue("v-2"), Err(SyncError::QueueFull)));
        assert_eq!(handle.stats().dropped(), 1);

        let worker = tokio::spawn(dispatcher.run());
        notifier.gate.notify_one();
        handle.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(handle.stats().delivered(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_is_dropped() {
        let (dispatcher, handle) =
            NotificationDispatcher::new(Arc::new(RecordingNotifier::default()), 4);
        drop(dispatcher);

        assert!(matches!(handle.enqueue("v-1"), Err(SyncError::ShuttingDown)));
        assert_eq!(handle.stats().dropped(), 1);
    }
}
