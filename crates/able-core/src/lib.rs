//! Core building blocks for the ABLE Bluetooth Low Energy orchestration layer
//!
//! The radio stack reports outcomes through uncorrelated callbacks. This crate
//! provides what both roles need to turn those callbacks into exactly-once
//! request/response continuations with deadlines:
//!
//! - [`types`] - Radio state, advertisement and transport option types
//! - [`attribute`] - GATT service, characteristic and request types
//! - [`errors`] - Error taxonomy delivered to continuations
//! - [`timer`] - Deadline timers on the callback executor
//! - [`attempt`] - Per-family registries of pending attempts
//! - [`transport`] - Capability traits the radio stack implements, and its events
//! - [`store`] - Persistence of known peripheral identifiers
//! - [`config`] - Manager configuration
//!
//! ## Usage
//!
//! ```rust
//! use able_core::{AttemptRegistry, Completion, AbleError};
//!
//! let mut connects: AttemptRegistry<u32, Completion<Result<(), AbleError>>> =
//!     AttemptRegistry::new("connect");
//! connects.register(1, Box::new(|result| assert!(result.is_ok())), None);
//!
//! // A genuine completion event removes the attempt exactly once
//! if let Some(complete) = connects.resolve(&1) {
//!     complete(Ok(()));
//! }
//! assert!(connects.resolve(&1).is_none());
//! ```

pub mod attempt;
pub mod attribute;
pub mod config;
pub mod errors;
pub mod store;
pub mod timer;
pub mod transport;
pub mod types;

// Public API exports
pub use attempt::{completion_channel, lock, AttemptRegistry, Completion};
pub use attribute::{
    AttRequest, AttResult, AttributePermissions, Central, Characteristic, CharacteristicId,
    CharacteristicProperties, ConnectionLatency, Descriptor, MutableCharacteristic,
    MutableService, RestoredServerState, Service,
};
pub use config::{
    CentralManagerConfig, PeripheralManagerConfig, SessionConfig, DEFAULT_KNOWN_PERIPHERALS_KEY,
};
pub use errors::{AbleError, Result, TransportError};
pub use store::{JsonFileStore, KnownIdentifiers, KnownPeripheralStore, MemoryStore};
pub use timer::{Timer, TimerScheduler, Token};
pub use transport::{
    CentralEvent, CentralTransport, ManagerStateProvider, PeripheralEvent, PeripheralHandle,
    PeripheralManagerEvent, PeripheralManagerTransport, PeripheralTransport,
};
pub use types::{
    AdvertisementData, ConnectOptions, ConnectionEvent, ConnectionEventOptions,
    ManagerAuthorization, ManagerOptions, ManagerState, PeripheralState, ScanOptions,
    WriteType,
};
