//! # till-server
//!
//! HTTP front of the settlement engine. One `POST /api/transactions`
//! settles a cart atomically; everything else reads or maintains what
//! settlements wrote.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Till Server                                    │
//! │                                                                         │
//! │  axum Router (api.rs)                                                   │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  TransactionWriter (settlement.rs)                                      │
//! │      │  pricing / vouchers / loyalty  ◄── till-core (pure)              │
//! │      │  one SQLite transaction        ◄── till-db                       │
//! │      │                                                                  │
//! │      └── after COMMIT ──► NotificationHandle ◄── till-sync              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`api`] - Routes and shared state
//! - [`config`] - Environment configuration
//! - [`error`] - Settlement and API errors
//! - [`settlement`] - The Transaction Writer

pub mod api;
pub mod config;
pub mod error;
pub mod settlement;

pub use api::{router, AppState};
pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ErrorCode, SettlementError, SettlementResult};
pub use settlement::{
    SettleItem, SettleRequest, Settlement, SettlementConfig, SettlementContext, SettlementStage,
    TransactionReceipt, TransactionWriter,
};
