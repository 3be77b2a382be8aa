//! GATT attribute containers: services, characteristics and descriptors
//!
//! Attribute identity is scoped: a characteristic is identified by its own
//! UUID together with the UUID of the service that owns it, and a service is
//! only unique within one device. Two peripherals exposing the same service
//! UUID yield two distinct [`Service`] values.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::AdvertisementData;

// ----------------------------------------------------------------------------
// Capability Flags
// ----------------------------------------------------------------------------

macro_rules! attribute_flags {
    (
        $(#[$meta:meta])*
        $name:ident($repr:ty) {
            $($(#[$flag_meta:meta])* $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            $($(#[$flag_meta])* pub const $flag: Self = Self($value);)*

            pub const fn empty() -> Self {
                Self(0)
            }

            pub const fn from_bits(bits: $repr) -> Self {
                Self(bits)
            }

            pub const fn bits(&self) -> $repr {
                self.0
            }

            pub const fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(&self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let names: Vec<&str> = [$((stringify!($flag), Self::$flag)),*]
                    .iter()
                    .filter(|(_, flag)| self.contains(*flag))
                    .map(|(name, _)| *name)
                    .collect();
                write!(f, "{}({})", stringify!($name), names.join(" | "))
            }
        }
    };
}

attribute_flags! {
    /// Characteristic capability flags, bit-compatible with the GATT property field
    CharacteristicProperties(u16) {
        BROADCAST = 0x0001;
        READ = 0x0002;
        WRITE_WITHOUT_RESPONSE = 0x0004;
        WRITE = 0x0008;
        NOTIFY = 0x0010;
        INDICATE = 0x0020;
        AUTHENTICATED_SIGNED_WRITES = 0x0040;
        EXTENDED_PROPERTIES = 0x0080;
        NOTIFY_ENCRYPTION_REQUIRED = 0x0100;
        INDICATE_ENCRYPTION_REQUIRED = 0x0200;
    }
}

attribute_flags! {
    /// Access permissions of a locally published attribute value
    AttributePermissions(u8) {
        READABLE = 0x01;
        WRITEABLE = 0x02;
        READ_ENCRYPTION_REQUIRED = 0x04;
        WRITE_ENCRYPTION_REQUIRED = 0x08;
    }
}

// ----------------------------------------------------------------------------
// Remote Attributes
// ----------------------------------------------------------------------------

/// Identity of a characteristic within one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacteristicId {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharacteristicId {
    pub fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.characteristic)
    }
}

/// Descriptor attached to a characteristic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub uuid: Uuid,
    pub value: Option<Vec<u8>>,
}

/// Snapshot of a remote characteristic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// Last value read or notified, if any
    pub value: Option<Vec<u8>>,
    /// Whether notifications or indications are currently enabled
    pub is_notifying: bool,
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn new(service_uuid: Uuid, uuid: Uuid, properties: CharacteristicProperties) -> Self {
        Self {
            uuid,
            service_uuid,
            properties,
            value: None,
            is_notifying: false,
            descriptors: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_notifying(mut self, notifying: bool) -> Self {
        self.is_notifying = notifying;
        self
    }

    pub fn id(&self) -> CharacteristicId {
        CharacteristicId::new(self.service_uuid, self.uuid)
    }
}

/// Snapshot of a remote (or registered) service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub uuid: Uuid,
    pub is_primary: bool,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: Uuid, is_primary: bool) -> Self {
        Self {
            uuid,
            is_primary,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn characteristic(&self, uuid: &Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

// ----------------------------------------------------------------------------
// Local (Server-Role) Attributes
// ----------------------------------------------------------------------------

/// Characteristic published by the local server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub permissions: AttributePermissions,
    /// Static value; `None` means requests are forwarded to the application
    pub value: Option<Vec<u8>>,
    pub descriptors: Vec<Descriptor>,
}

impl MutableCharacteristic {
    pub fn new(
        uuid: Uuid,
        properties: CharacteristicProperties,
        permissions: AttributePermissions,
    ) -> Self {
        Self {
            uuid,
            properties,
            permissions,
            value: None,
            descriptors: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }
}

/// Service published by the local server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableService {
    pub uuid: Uuid,
    pub is_primary: bool,
    pub characteristics: Vec<MutableCharacteristic>,
    pub included_services: Vec<Uuid>,
}

impl MutableService {
    pub fn new(uuid: Uuid, is_primary: bool) -> Self {
        Self {
            uuid,
            is_primary,
            characteristics: Vec::new(),
            included_services: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: MutableCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Read-only snapshot of this service as remote centrals see it
    pub fn snapshot(&self) -> Service {
        Service {
            uuid: self.uuid,
            is_primary: self.is_primary,
            characteristics: self
                .characteristics
                .iter()
                .map(|c| Characteristic {
                    uuid: c.uuid,
                    service_uuid: self.uuid,
                    properties: c.properties,
                    value: c.value.clone(),
                    is_notifying: false,
                    descriptors: c.descriptors.clone(),
                })
                .collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// Inbound Requests
// ----------------------------------------------------------------------------

/// Remote central talking to the local server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Central {
    pub identifier: Uuid,
    pub maximum_update_value_length: usize,
}

/// Read or write request received from a remote central
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttRequest {
    /// Transport-assigned request identifier, echoed back by `respond`
    pub id: u64,
    pub central: Central,
    pub characteristic: CharacteristicId,
    pub offset: usize,
    pub value: Option<Vec<u8>>,
}

/// ATT protocol result codes used to answer requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttResult {
    Success,
    InvalidHandle,
    ReadNotPermitted,
    WriteNotPermitted,
    InvalidPdu,
    InsufficientAuthentication,
    RequestNotSupported,
    InvalidOffset,
    InsufficientAuthorization,
    PrepareQueueFull,
    AttributeNotFound,
    AttributeNotLong,
    InsufficientEncryptionKeySize,
    InvalidAttributeValueLength,
    UnlikelyError,
    InsufficientEncryption,
    UnsupportedGroupType,
    InsufficientResources,
}

impl AttResult {
    /// Wire code as defined by the ATT protocol
    pub fn code(&self) -> u8 {
        match self {
            AttResult::Success => 0x00,
            AttResult::InvalidHandle => 0x01,
            AttResult::ReadNotPermitted => 0x02,
            AttResult::WriteNotPermitted => 0x03,
            AttResult::InvalidPdu => 0x04,
            AttResult::InsufficientAuthentication => 0x05,
            AttResult::RequestNotSupported => 0x06,
            AttResult::InvalidOffset => 0x07,
            AttResult::InsufficientAuthorization => 0x08,
            AttResult::PrepareQueueFull => 0x09,
            AttResult::AttributeNotFound => 0x0a,
            AttResult::AttributeNotLong => 0x0b,
            AttResult::InsufficientEncryptionKeySize => 0x0c,
            AttResult::InvalidAttributeValueLength => 0x0d,
            AttResult::UnlikelyError => 0x0e,
            AttResult::InsufficientEncryption => 0x0f,
            AttResult::UnsupportedGroupType => 0x10,
            AttResult::InsufficientResources => 0x11,
        }
    }
}

/// Desired connection latency for a subscribed central
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionLatency {
    Low,
    Medium,
    High,
}

/// State handed back by the transport when the server role is restored
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredServerState {
    pub services: Vec<Service>,
    pub advertisement: Option<AdvertisementData>,
}
