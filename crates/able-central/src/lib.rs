//! Central-role orchestration for ABLE
//!
//! Wraps a callback-driven central radio in a request/response API:
//!
//! - [`manager`] - Radio state waits, scanning, connection lifecycle and the
//!   known/found/cached peripheral sets
//! - [`peripheral`] - Per-peripheral GATT operations with one pending slot per
//!   operation family
//! - [`request`] - Scan and connect parameters
//!
//! Every continuation is invoked at most once. Attempts with a deadline are
//! completed by whichever comes first, the transport event or the timer;
//! the loser finds nothing to complete.

pub mod manager;
pub mod peripheral;
pub mod request;
mod session;

// Public API exports
pub use manager::{CentralManager, CentralManagerBuilder, PendingAttempts, RestoredCentralState};
pub use peripheral::Peripheral;
pub use request::{ConnectRequest, DiscoveryCallback, ScanRequest};
pub use session::ValueCallback;
