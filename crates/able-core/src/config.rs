//! Manager configuration

use std::time::Duration;

use crate::errors::{AbleError, Result};
use crate::types::ManagerOptions;

/// Store key under which known peripheral identifiers are persisted
pub const DEFAULT_KNOWN_PERIPHERALS_KEY: &str = "it.able.centralmanager.knownPeripheralKey";

/// Durations are written as whole milliseconds
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Defaults applied to per-peripheral operations
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for discover-services / discover-characteristics when the caller passes none
    #[serde(with = "duration_millis")]
    pub discovery_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: Duration::from_secs(3),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.discovery_timeout.is_zero() {
            return Err(invalid("Discovery timeout cannot be zero"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Central Manager Configuration
// ----------------------------------------------------------------------------

/// Configuration for the central-role connection manager
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CentralManagerConfig {
    /// Default deadline for state waits
    #[serde(with = "duration_millis")]
    pub state_wait_timeout: Duration,
    /// Store key for the persisted known-peripheral list
    pub known_peripherals_key: String,
    /// Identifier used by the transport for state restoration
    pub restore_identifier: Option<String>,
    /// Ask the platform to alert the user when the radio is off
    pub show_power_alert: bool,
    pub session: SessionConfig,
}

impl Default for CentralManagerConfig {
    fn default() -> Self {
        Self {
            state_wait_timeout: Duration::from_secs(3),
            known_peripherals_key: DEFAULT_KNOWN_PERIPHERALS_KEY.to_string(),
            restore_identifier: None,
            show_power_alert: false,
            session: SessionConfig::default(),
        }
    }
}

impl CentralManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_wait_timeout(mut self, timeout: Duration) -> Self {
        self.state_wait_timeout = timeout;
        self
    }

    pub fn with_known_peripherals_key(mut self, key: impl Into<String>) -> Self {
        self.known_peripherals_key = key.into();
        self
    }

    pub fn with_restore_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.restore_identifier = Some(identifier.into());
        self
    }

    pub fn with_show_power_alert(mut self, enabled: bool) -> Self {
        self.show_power_alert = enabled;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Options passed to [`crate::CentralTransport::initialize`]
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            restore_identifier: self.restore_identifier.clone(),
            show_power_alert: self.show_power_alert,
        }
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| AbleError::InvalidConfiguration {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_wait_timeout.is_zero() {
            return Err(invalid("State wait timeout cannot be zero"));
        }
        if self.known_peripherals_key.trim().is_empty() {
            return Err(invalid("Known peripherals key cannot be empty"));
        }
        self.session.validate()
    }
}

// ----------------------------------------------------------------------------
// Peripheral Manager Configuration
// ----------------------------------------------------------------------------

/// Configuration for the server-role manager
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PeripheralManagerConfig {
    #[serde(with = "duration_millis")]
    pub state_wait_timeout: Duration,
    pub restore_identifier: Option<String>,
    pub show_power_alert: bool,
}

impl Default for PeripheralManagerConfig {
    fn default() -> Self {
        Self {
            state_wait_timeout: Duration::from_secs(3),
            restore_identifier: None,
            show_power_alert: false,
        }
    }
}

impl PeripheralManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state_wait_timeout(mut self, timeout: Duration) -> Self {
        self.state_wait_timeout = timeout;
        self
    }

    pub fn with_restore_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.restore_identifier = Some(identifier.into());
        self
    }

    pub fn with_show_power_alert(mut self, enabled: bool) -> Self {
        self.show_power_alert = enabled;
        self
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            restore_identifier: self.restore_identifier.clone(),
            show_power_alert: self.show_power_alert,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| AbleError::InvalidConfiguration {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_wait_timeout.is_zero() {
            return Err(invalid("State wait timeout cannot be zero"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> AbleError {
    AbleError::InvalidConfiguration {
        reason: reason.to_string(),
    }
}
