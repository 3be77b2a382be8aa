//! Parameters for scan and connect requests

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use able_core::{Completion, ConnectOptions, Result, ScanOptions};
use uuid::Uuid;

use crate::peripheral::Peripheral;

/// Live callback invoked for every discovery event while scanning
pub type DiscoveryCallback = Arc<dyn Fn(&Peripheral) + Send + Sync + 'static>;

// ----------------------------------------------------------------------------
// Scan Request
// ----------------------------------------------------------------------------

/// What to scan for and how long
#[derive(Default)]
pub struct ScanRequest {
    pub(crate) services: Option<Vec<Uuid>>,
    pub(crate) options: ScanOptions,
    pub(crate) on_discovery: Option<DiscoveryCallback>,
    pub(crate) timeout: Option<(Duration, Completion<Result<Vec<Peripheral>>>)>,
}

impl ScanRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only report peripherals advertising one of `services`
    pub fn with_services(mut self, services: Vec<Uuid>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop after `interval` and hand the found peripherals to `completion`
    ///
    /// When the radio is not powered on, `completion` receives
    /// `BluetoothNotAvailable` before the scan call returns.
    pub fn with_timeout<F>(mut self, interval: Duration, completion: F) -> Self
    where
        F: FnOnce(Result<Vec<Peripheral>>) + Send + 'static,
    {
        self.timeout = Some((interval, Box::new(completion)));
        self
    }

    pub fn on_discovery<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Peripheral) + Send + Sync + 'static,
    {
        self.on_discovery = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("services", &self.services)
            .field("options", &self.options)
            .field("timeout", &self.timeout.as_ref().map(|(interval, _)| interval))
            .field("on_discovery", &self.on_discovery.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Connect Request
// ----------------------------------------------------------------------------

/// Deadlines and transport options for a connect attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectRequest {
    pub options: ConnectOptions,
    /// Fail with `ConnectionTimeoutReached` if the radio has not connected by then
    pub attempt_timeout: Option<Duration>,
    /// Disconnect automatically once the connection has lasted this long
    pub connection_timeout: Option<Duration>,
}

impl ConnectRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }
}
