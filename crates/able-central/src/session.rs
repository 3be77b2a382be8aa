//! Per-connection attempt slots
//!
//! Every operation family on a connected peripheral has exactly one slot.
//! Issuing the operation again before the transport answers replaces the
//! stored continuation; the replaced one is dropped without being called.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use able_core::{AttemptRegistry, Characteristic, CharacteristicId, Completion, Result, Service};

/// Long-lived callback receiving every value update of one characteristic
pub type ValueCallback = Arc<dyn Fn(Result<Vec<u8>>) + Send + Sync + 'static>;

pub(crate) struct Session {
    pub discover_services: AttemptRegistry<(), Completion<Result<Vec<Service>>>>,
    pub discover_characteristics: AttemptRegistry<(), Completion<Result<Vec<Characteristic>>>>,
    pub read: AttemptRegistry<(), Completion<Result<Vec<u8>>>>,
    /// Only filled for writes with response
    pub write: AttemptRegistry<(), Completion<Result<()>>>,
    pub notify_state: AttemptRegistry<(), Completion<Result<()>>>,
    pub rssi: AttemptRegistry<(), Completion<Result<i16>>>,
    pub value_callbacks: HashMap<CharacteristicId, ValueCallback>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            discover_services: AttemptRegistry::new("discover-services"),
            discover_characteristics: AttemptRegistry::new("discover-characteristics"),
            read: AttemptRegistry::new("read"),
            write: AttemptRegistry::new("write"),
            notify_state: AttemptRegistry::new("notify-state"),
            rssi: AttemptRegistry::new("read-rssi"),
            value_callbacks: HashMap::new(),
        }
    }

    /// Number of operation families with a pending attempt
    pub fn pending(&self) -> usize {
        [
            self.discover_services.len(),
            self.discover_characteristics.len(),
            self.read.len(),
            self.write.len(),
            self.notify_state.len(),
            self.rssi.len(),
        ]
        .iter()
        .sum()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("discover_services", &self.discover_services)
            .field("discover_characteristics", &self.discover_characteristics)
            .field("read", &self.read)
            .field("write", &self.write)
            .field("notify_state", &self.notify_state)
            .field("rssi", &self.rssi)
            .field(
                "notifying",
                &self.value_callbacks.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
