//! # till-sync: Loyalty-Cloud Notifier
//!
//! Reports voucher redemptions to the external loyalty cloud once a sale
//! has committed. Delivery happens on a background task; the sale never
//! waits for it and never fails because of it.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Notifier Architecture                            │
//! │                                                                         │
//! │  ┌──────────────┐   enqueue   ┌────────────────────┐                   │
//! │  │ till-server  │────────────►│ NotificationHandle │                   │
//! │  │ (settlement) │  try_send   └─────────┬──────────┘                   │
//! │  └──────────────┘                       │ bounded mpsc                  │
//! │                                         ▼                               │
//! │                          ┌────────────────────────────┐                │
//! │                          │ NotificationDispatcher     │                │
//! │                          │ (tokio task)               │                │
//! │                          └─────────────┬──────────────┘                │
//! │                                        ▼                                │
//! │                          ┌────────────────────────────┐                │
//! │                          │ dyn VoucherRedemption-     │                │
//! │                          │     Notifier               │                │
//! │                          │  • HttpLoyaltyCloudNotifier│                │
//! │                          │  • NoopNotifier            │                │
//! │                          └────────────────────────────┘                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Endpoint, timeout and queue settings
//! - [`dispatcher`] - Background delivery worker and its handle
//! - [`error`] - Sync error types
//! - [`notifier`] - The notifier trait and its implementations

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod notifier;

pub use config::{LoyaltyCloudSettings, SyncConfig};
pub use dispatcher::{DispatchStats, NotificationDispatcher, NotificationHandle};
pub use error::{SyncError, SyncResult};
pub use notifier::{
    notifier_from_config, HttpLoyaltyCloudNotifier, NoopNotifier, VoucherRedemptionNotifier,
};

use tokio::task::JoinHandle;
use tracing::info;

/// Builds the notifier for `config` and spawns its dispatcher.
pub fn spawn_notifier(config: &SyncConfig) -> SyncResult<(NotificationHandle, JoinHandle<()>)> {
    let notifier = notifier_from_config(config)?;
    let (dispatcher, handle) = NotificationDispatcher::new(notifier, config.loyalty_cloud.queue_capacity);

    info!(
        active = config.is_active(),
        endpoint = config.endpoint().unwrap_or("-"),
        "Loyalty-cloud notifier configured"
    );

    Ok((handle, tokio::spawn(dispatcher.run())))
}
