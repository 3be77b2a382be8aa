//! Transport capability interfaces
//!
//! The radio stack is an external collaborator. It exposes synchronous
//! primitives that start work, and reports outcomes later as events. Events
//! carry no request identifiers; correlating them with the request that caused
//! them is the job of the managers built on top of these traits.
//!
//! A transport may deliver events from inside a primitive call (test doubles
//! commonly do). Callers must therefore never hold internal locks while
//! calling into a transport.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::attribute::{
    AttRequest, AttResult, Central, Characteristic, CharacteristicId, ConnectionLatency,
    MutableService, RestoredServerState, Service,
};
use crate::errors::TransportError;
use crate::types::{
    AdvertisementData, ConnectionEvent, ConnectionEventOptions, ConnectOptions,
    ManagerAuthorization, ManagerOptions, ManagerState, PeripheralState, ScanOptions,
    WriteType,
};

// ----------------------------------------------------------------------------
// Capability Traits
// ----------------------------------------------------------------------------

/// Synchronous reads of the radio state
pub trait ManagerStateProvider: Send + Sync {
    fn state(&self) -> ManagerState;

    fn authorization(&self) -> ManagerAuthorization;
}

/// Operations on one remote peripheral's connection
pub trait PeripheralTransport: Send + Sync + fmt::Debug {
    /// Stable identifier, unique per remote device
    fn identifier(&self) -> Uuid;

    fn name(&self) -> Option<String>;

    fn state(&self) -> PeripheralState;

    /// Live snapshot of every service discovered so far
    fn services(&self) -> Vec<Service>;

    fn discover_services(&self, filter: Option<&[Uuid]>);

    fn discover_characteristics(&self, filter: Option<&[Uuid]>, service: Uuid);

    fn read_value(&self, characteristic: &CharacteristicId);

    fn write_value(&self, data: &[u8], characteristic: &CharacteristicId, write_type: WriteType);

    fn set_notify_value(&self, enabled: bool, characteristic: &CharacteristicId);

    fn read_rssi(&self);

    fn maximum_write_length(&self, write_type: WriteType) -> usize;
}

/// Shared handle to a transport-level peripheral
pub type PeripheralHandle = Arc<dyn PeripheralTransport>;

/// Central-role operations
pub trait CentralTransport: ManagerStateProvider {
    /// Called once by the manager's builder before any other primitive
    fn initialize(&self, options: &ManagerOptions);

    fn scan_for_peripherals(&self, services: Option<&[Uuid]>, options: &ScanOptions);

    fn stop_scan(&self);

    fn connect(&self, peripheral: &PeripheralHandle, options: &ConnectOptions);

    fn cancel_connection(&self, peripheral: &PeripheralHandle);

    /// Resolve previously seen identifiers back into handles
    fn retrieve_peripherals(&self, identifiers: &[Uuid]) -> Vec<PeripheralHandle>;

    fn retrieve_connected_peripherals(&self, services: &[Uuid]) -> Vec<PeripheralHandle>;

    fn register_for_connection_events(&self, options: &ConnectionEventOptions);
}

/// Server-role operations
pub trait PeripheralManagerTransport: ManagerStateProvider {
    /// Called once by the manager's builder before any other primitive
    fn initialize(&self, options: &ManagerOptions);

    fn is_advertising(&self) -> bool;

    fn add_service(&self, service: &MutableService);

    fn remove_service(&self, service: Uuid);

    fn remove_all_services(&self);

    fn start_advertising(&self, advertisement: &AdvertisementData);

    fn stop_advertising(&self);

    /// Queue a notification; `false` means the transmit queue is full
    fn update_value(
        &self,
        value: &[u8],
        characteristic: &CharacteristicId,
        centrals: Option<&[Central]>,
    ) -> bool;

    fn respond(&self, request: &AttRequest, result: AttResult);

    fn set_desired_connection_latency(&self, latency: ConnectionLatency, central: &Central);
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Events delivered by a central transport
#[derive(Debug, Clone)]
pub enum CentralEvent {
    StateUpdated(ManagerState),
    Discovered {
        peripheral: PeripheralHandle,
        advertisement: AdvertisementData,
        rssi: i16,
    },
    Connected {
        identifier: Uuid,
    },
    FailedToConnect {
        identifier: Uuid,
        error: Option<TransportError>,
    },
    Disconnected {
        identifier: Uuid,
        error: Option<TransportError>,
    },
    ConnectionEvent {
        event: ConnectionEvent,
        peripheral: PeripheralHandle,
    },
    WillRestoreState {
        peripherals: Vec<PeripheralHandle>,
        scan_services: Vec<Uuid>,
    },
    /// Per-peripheral event routed through the central's ordered stream
    Peripheral {
        identifier: Uuid,
        event: PeripheralEvent,
    },
}

/// Events delivered for one connected peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    DiscoveredServices {
        error: Option<TransportError>,
    },
    DiscoveredCharacteristics {
        service: Uuid,
        error: Option<TransportError>,
    },
    /// Read response or notification; `characteristic.value` holds the data
    UpdatedValue {
        characteristic: Characteristic,
        error: Option<TransportError>,
    },
    WroteValue {
        characteristic: CharacteristicId,
        error: Option<TransportError>,
    },
    UpdatedNotificationState {
        characteristic: Characteristic,
        error: Option<TransportError>,
    },
    ReadRssi {
        rssi: i16,
        error: Option<TransportError>,
    },
    UpdatedName {
        name: Option<String>,
    },
    ModifiedServices {
        invalidated: Vec<Uuid>,
    },
    ReadyToSendWriteWithoutResponse,
}

/// Events delivered by a server-role transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralManagerEvent {
    StateUpdated(ManagerState),
    ServiceAdded {
        service: Service,
        error: Option<TransportError>,
    },
    AdvertisingStarted {
        error: Option<TransportError>,
    },
    ReadyToUpdateSubscribers,
    ReadRequest(AttRequest),
    WriteRequests(Vec<AttRequest>),
    Subscribed {
        central: Central,
        characteristic: CharacteristicId,
    },
    Unsubscribed {
        central: Central,
        characteristic: CharacteristicId,
    },
    WillRestoreState(RestoredServerState),
}
