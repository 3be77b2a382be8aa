//! Radio state, peripheral state and advertisement types

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Manager State
// ----------------------------------------------------------------------------

/// Radio power / authorization state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ManagerState {
    PoweredOff,
    PoweredOn,
    Resetting,
    Unauthorized,
    #[default]
    Unknown,
    Unsupported,
}

impl ManagerState {
    /// Whether the radio is usable for scanning, connecting and advertising
    pub fn is_powered_on(&self) -> bool {
        *self == ManagerState::PoweredOn
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerState::PoweredOff => write!(f, "poweredOff"),
            ManagerState::PoweredOn => write!(f, "poweredOn"),
            ManagerState::Resetting => write!(f, "resetting"),
            ManagerState::Unauthorized => write!(f, "unauthorized"),
            ManagerState::Unknown => write!(f, "unknown"),
            ManagerState::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Snapshot of the application's Bluetooth authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManagerAuthorization {
    AllowedAlways,
    Denied,
    NotDetermined,
    Restricted,
}

impl ManagerAuthorization {
    pub fn is_allowed(&self) -> bool {
        *self == ManagerAuthorization::AllowedAlways
    }
}

// ----------------------------------------------------------------------------
// Peripheral State
// ----------------------------------------------------------------------------

/// Connection state of a remote peripheral, as seen by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PeripheralState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralState::Disconnected => write!(f, "disconnected"),
            PeripheralState::Connecting => write!(f, "connecting"),
            PeripheralState::Connected => write!(f, "connected"),
            PeripheralState::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Write acknowledgement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
}

/// Connection events a central can register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionEvent {
    PeerDisconnected,
    PeerConnected,
}

// ----------------------------------------------------------------------------
// Advertisement Data
// ----------------------------------------------------------------------------

/// Typed view over an advertisement payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    pub manufacturer_data: Option<Vec<u8>>,
    pub tx_power_level: Option<i16>,
    pub is_connectable: Option<bool>,
    pub service_uuids: Vec<Uuid>,
    pub service_data: HashMap<Uuid, Vec<u8>>,
    pub overflow_service_uuids: Vec<Uuid>,
    pub solicited_service_uuids: Vec<Uuid>,
}

impl AdvertisementData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        self
    }

    pub fn with_manufacturer_data(mut self, data: Vec<u8>) -> Self {
        self.manufacturer_data = Some(data);
        self
    }

    pub fn with_tx_power_level(mut self, level: i16) -> Self {
        self.tx_power_level = Some(level);
        self
    }

    pub fn with_connectable(mut self, connectable: bool) -> Self {
        self.is_connectable = Some(connectable);
        self
    }

    pub fn with_service_uuids(mut self, uuids: Vec<Uuid>) -> Self {
        self.service_uuids = uuids;
        self
    }

    pub fn with_service_data(mut self, service: Uuid, data: Vec<u8>) -> Self {
        self.service_data.insert(service, data);
        self
    }

    /// Whether the payload advertises `service` in its primary or overflow list
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_uuids.contains(service) || self.overflow_service_uuids.contains(service)
    }

    /// Manufacturer data rendered as lowercase hex, for logging
    pub fn manufacturer_data_hex(&self) -> Option<String> {
        self.manufacturer_data.as_deref().map(hex::encode)
    }
}

// ----------------------------------------------------------------------------
// Transport Options
// ----------------------------------------------------------------------------

/// Initialization options handed to the transport when a manager is built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerOptions {
    /// Identifier the platform uses to restore this manager after relaunch
    pub restore_identifier: Option<String>,
    /// Ask the platform to alert the user when the radio is off
    pub show_power_alert: bool,
}

/// Options forwarded to the transport's scan primitive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Report every advertisement instead of coalescing duplicates
    pub allow_duplicates: bool,
    /// Also match peripherals soliciting these services
    pub solicited_service_uuids: Vec<Uuid>,
}

/// Options forwarded to the transport's connect primitive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    pub notify_on_connection: bool,
    pub notify_on_disconnection: bool,
    pub notify_on_notification: bool,
    /// Delay the transport should wait before initiating the connection
    pub start_delay: Option<Duration>,
}

/// Matching options for connection event registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEventOptions {
    pub peripheral_uuids: Vec<Uuid>,
    pub service_uuids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_unknown() {
        assert_eq!(ManagerState::default(), ManagerState::Unknown);
        assert!(!ManagerState::default().is_powered_on());
        assert!(ManagerState::PoweredOn.is_powered_on());
    }

    #[test]
    fn test_state_display_matches_transport_names() {
        assert_eq!(ManagerState::PoweredOff.to_string(), "poweredOff");
        assert_eq!(PeripheralState::Disconnecting.to_string(), "disconnecting");
    }

    #[test]
    fn test_advertisement_accessors() {
        let heart_rate = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
        let battery = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
        let mut advertisement = AdvertisementData::new()
            .with_local_name("Sensor")
            .with_manufacturer_data(vec![0x4c, 0x00, 0x02])
            .with_service_uuids(vec![heart_rate]);
        advertisement.overflow_service_uuids.push(battery);

        assert_eq!(advertisement.local_name.as_deref(), Some("Sensor"));
        assert_eq!(advertisement.manufacturer_data_hex().as_deref(), Some("4c0002"));
        assert!(advertisement.advertises(&heart_rate));
        assert!(advertisement.advertises(&battery));
        assert!(!advertisement.advertises(&Uuid::nil()));
    }
}
