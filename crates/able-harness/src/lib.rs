//! Deterministic test doubles for the ABLE transport capability interfaces
//!
//! Each double records every call it receives and reports outcomes through a
//! `tokio::sync::mpsc` channel, optionally after a configurable delay, so tests
//! can drive managers under paused virtual time.
//!
//! - [`MockCentralTransport`] - central-role radio
//! - [`MockPeripheral`] - one remote peripheral's connection
//! - [`MockPeripheralManagerTransport`] - server-role radio

mod central;
mod peripheral;
mod server;

pub use central::{
    CentralCall, ConnectBehaviour, ConnectionEventBehaviour, DisconnectBehaviour,
    MockCentralTransport,
};
pub use peripheral::{
    DiscoverCharacteristicsBehaviour, DiscoverServicesBehaviour, MockPeripheral, OperationBehaviour,
    PeripheralCall, MOCK_MAXIMUM_WRITE_LENGTH, MOCK_RSSI,
};
pub use server::{AddServiceBehaviour, AdvertiseBehaviour, MockPeripheralManagerTransport, ServerCall};

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

/// Install a `tracing` subscriber for tests, honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ----------------------------------------------------------------------------
// Event Delivery
// ----------------------------------------------------------------------------

/// Send `event`, ignoring a receiver that has gone away
pub(crate) fn emit<E>(sender: &UnboundedSender<E>, event: E) {
    if sender.send(event).is_err() {
        trace!("event receiver dropped, discarding mock event");
    }
}

/// Run `action` now, or on the ambient runtime once `after` elapses
pub(crate) fn run_after<F>(after: Duration, action: F)
where
    F: FnOnce() + Send + 'static,
{
    if after.is_zero() {
        action();
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        action();
    });
}
