//! Server-role orchestration for ABLE
//!
//! [`PeripheralManager`] publishes services and advertises on behalf of the
//! application. Add-service and advertising requests complete exactly once
//! from the transport's matching events; requests from remote centrals are
//! handed to application callbacks as they arrive.

pub mod manager;

// Public API exports
pub use manager::{PendingServerAttempts, PeripheralManager, PeripheralManagerBuilder};
