//! Central-role view of a remote peripheral
//!
//! A [`Peripheral`] wraps the transport handle of one remote device together
//! with its session: one pending-attempt slot per operation family. Results
//! arrive through [`Peripheral::handle_event`], either called directly or
//! routed by the owning [`crate::CentralManager`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use able_core::{
    lock, AbleError, AdvertisementData, Characteristic, PeripheralEvent, PeripheralHandle,
    PeripheralState, Result, Service, SessionConfig, Timer, TimerScheduler, Token, WriteType,
};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::session::{Session, ValueCallback};

// ----------------------------------------------------------------------------
// Peripheral
// ----------------------------------------------------------------------------

/// Last values reported by discovery and RSSI reads
#[derive(Debug, Clone, Default)]
struct Snapshot {
    advertisement: AdvertisementData,
    rssi: i16,
}

struct PeripheralInner {
    identifier: Uuid,
    transport: PeripheralHandle,
    scheduler: TimerScheduler,
    config: SessionConfig,
    snapshot: Mutex<Snapshot>,
    session: Mutex<Session>,
}

/// Remote device; equality and hashing use the identifier only
///
/// Clones share the same session, so a continuation registered through one
/// clone is resolved by events delivered through any other.
#[derive(Clone)]
pub struct Peripheral {
    inner: Arc<PeripheralInner>,
}

impl Peripheral {
    pub fn new(transport: PeripheralHandle, scheduler: TimerScheduler, config: SessionConfig) -> Self {
        Self::with_snapshot(transport, scheduler, config, AdvertisementData::default(), 0)
    }

    pub(crate) fn with_snapshot(
        transport: PeripheralHandle,
        scheduler: TimerScheduler,
        config: SessionConfig,
        advertisement: AdvertisementData,
        rssi: i16,
    ) -> Self {
        Self {
            inner: Arc::new(PeripheralInner {
                identifier: transport.identifier(),
                transport,
                scheduler,
                config,
                snapshot: Mutex::new(Snapshot { advertisement, rssi }),
                session: Mutex::new(Session::new()),
            }),
        }
    }

    /// Record a fresh advertisement
    pub(crate) fn update_discovery(&self, advertisement: AdvertisementData, rssi: i16) {
        let mut snapshot = lock(&self.inner.snapshot);
        snapshot.advertisement = advertisement;
        snapshot.rssi = rssi;
    }

    pub fn identifier(&self) -> Uuid {
        self.inner.identifier
    }

    /// Underlying transport handle
    pub fn handle(&self) -> &PeripheralHandle {
        &self.inner.transport
    }

    pub fn name(&self) -> Option<String> {
        self.inner.transport.name()
    }

    pub fn state(&self) -> PeripheralState {
        self.inner.transport.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == PeripheralState::Connected
    }

    /// Last known signal strength
    pub fn rssi(&self) -> i16 {
        lock(&self.inner.snapshot).rssi
    }

    pub fn advertisement(&self) -> AdvertisementData {
        lock(&self.inner.snapshot).advertisement.clone()
    }

    /// Services discovered so far, read live from the transport
    pub fn services(&self) -> Vec<Service> {
        self.inner.transport.services()
    }

    pub fn service(&self, uuid: &Uuid) -> Option<Service> {
        self.services().into_iter().find(|service| service.uuid == *uuid)
    }

    pub fn characteristic(&self, uuid: &Uuid, service: &Service) -> Option<Characteristic> {
        service.characteristic(uuid).cloned()
    }

    pub fn maximum_write_length(&self, write_type: WriteType) -> usize {
        self.inner.transport.maximum_write_length(write_type)
    }

    /// Number of operation families awaiting a transport answer
    pub fn pending_operations(&self) -> usize {
        lock(&self.inner.session).pending()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Discover services, failing with `TimeoutReached` after `timeout`
    ///
    /// `None` uses the session's configured discovery timeout; a zero
    /// timeout disables the deadline.
    pub fn discover_services<F>(&self, filter: Option<&[Uuid]>, timeout: Option<Duration>, completion: F)
    where
        F: FnOnce(Result<Vec<Service>>) + Send + 'static,
    {
        let timeout = timeout.unwrap_or(self.inner.config.discovery_timeout);
        let superseded = {
            let mut session = lock(&self.inner.session);
            let timer = self.arm(timeout, |inner, token| {
                let timed_out = lock(&inner.session).discover_services.take_timed_out(token);
                if let Some(((), complete)) = timed_out {
                    debug!(peripheral = %inner.identifier, "service discovery timed out");
                    complete(Err(AbleError::TimeoutReached));
                }
            });
            session
                .discover_services
                .register((), Box::new(completion), timer)
        };
        drop(superseded);

        debug!(
            peripheral = %self.identifier(),
            timeout_ms = timeout.as_millis() as u64,
            "discovering services"
        );
        self.inner.transport.discover_services(filter);
    }

    /// Discover the characteristics of `service`
    pub fn discover_characteristics<F>(
        &self,
        filter: Option<&[Uuid]>,
        service: &Service,
        timeout: Option<Duration>,
        completion: F,
    ) where
        F: FnOnce(Result<Vec<Characteristic>>) + Send + 'static,
    {
        let timeout = timeout.unwrap_or(self.inner.config.discovery_timeout);
        let superseded = {
            let mut session = lock(&self.inner.session);
            let timer = self.arm(timeout, |inner, token| {
                let timed_out = lock(&inner.session)
                    .discover_characteristics
                    .take_timed_out(token);
                if let Some(((), complete)) = timed_out {
                    debug!(peripheral = %inner.identifier, "characteristic discovery timed out");
                    complete(Err(AbleError::TimeoutReached));
                }
            });
            session
                .discover_characteristics
                .register((), Box::new(completion), timer)
        };
        drop(superseded);

        debug!(
            peripheral = %self.identifier(),
            service = %service.uuid,
            timeout_ms = timeout.as_millis() as u64,
            "discovering characteristics"
        );
        self.inner
            .transport
            .discover_characteristics(filter, service.uuid);
    }

    /// Read `characteristic`; a second read before the answer replaces the first
    pub fn read_value<F>(&self, characteristic: &Characteristic, completion: F)
    where
        F: FnOnce(Result<Vec<u8>>) + Send + 'static,
    {
        let superseded = lock(&self.inner.session)
            .read
            .register((), Box::new(completion), None);
        drop(superseded);
        self.inner.transport.read_value(&characteristic.id());
    }

    /// Write `data`; `completion` is only ever called for [`WriteType::WithResponse`]
    pub fn write_value<F>(&self, data: &[u8], characteristic: &Characteristic, write_type: WriteType, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        if write_type == WriteType::WithResponse {
            let superseded = lock(&self.inner.session)
                .write
                .register((), Box::new(completion), None);
            drop(superseded);
        }
        trace!(
            peripheral = %self.identifier(),
            characteristic = %characteristic.id(),
            len = data.len(),
            ?write_type,
            "writing value"
        );
        self.inner
            .transport
            .write_value(data, &characteristic.id(), write_type);
    }

    /// Toggle notifications for `characteristic`
    ///
    /// `on_state` fires once with the outcome of this call. `on_value` fires
    /// for every value update of the characteristic until notifications are
    /// successfully disabled.
    pub fn set_notify_value<F, V>(&self, enabled: bool, characteristic: &Characteristic, on_state: F, on_value: V)
    where
        F: FnOnce(Result<()>) + Send + 'static,
        V: Fn(Result<Vec<u8>>) + Send + Sync + 'static,
    {
        let id = characteristic.id();
        let superseded = {
            let mut session = lock(&self.inner.session);
            let on_value: ValueCallback = Arc::new(on_value);
            session.value_callbacks.insert(id, on_value);
            session.notify_state.register((), Box::new(on_state), None)
        };
        drop(superseded);

        debug!(peripheral = %self.identifier(), characteristic = %id, enabled, "setting notify value");
        self.inner.transport.set_notify_value(enabled, &id);
    }

    pub fn read_rssi<F>(&self, completion: F)
    where
        F: FnOnce(Result<i16>) + Send + 'static,
    {
        let superseded = lock(&self.inner.session)
            .rssi
            .register((), Box::new(completion), None);
        drop(superseded);
        self.inner.transport.read_rssi();
    }

    // ------------------------------------------------------------------------
    // Event Dispatch
    // ------------------------------------------------------------------------

    /// Resolve the pending attempt matching a transport event
    pub fn handle_event(&self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::DiscoveredServices { error } => {
                let pending = lock(&self.inner.session).discover_services.resolve(&());
                let Some(complete) = pending else {
                    trace!(peripheral = %self.identifier(), "service discovery without pending attempt");
                    return;
                };
                match error {
                    Some(error) => {
                        warn!(peripheral = %self.identifier(), %error, "service discovery failed");
                        complete(Err(AbleError::Transport(error)));
                    }
                    None => complete(Ok(self.services())),
                }
            }
            PeripheralEvent::DiscoveredCharacteristics { service, error } => {
                let pending = lock(&self.inner.session)
                    .discover_characteristics
                    .resolve(&());
                let Some(complete) = pending else {
                    trace!(peripheral = %self.identifier(), "characteristic discovery without pending attempt");
                    return;
                };
                let outcome = match error {
                    Some(error) => {
                        warn!(peripheral = %self.identifier(), %error, "characteristic discovery failed");
                        Err(AbleError::Transport(error))
                    }
                    None => self
                        .service(&service)
                        .map(|service| service.characteristics)
                        .ok_or(AbleError::AttributeNotFound { uuid: service }),
                };
                complete(outcome);
            }
            PeripheralEvent::UpdatedValue {
                characteristic,
                error,
            } => {
                let (read, on_value) = {
                    let mut session = lock(&self.inner.session);
                    (
                        session.read.resolve(&()),
                        session.value_callbacks.get(&characteristic.id()).cloned(),
                    )
                };
                let outcome = match error {
                    Some(error) => Err(AbleError::Transport(error)),
                    None => Ok(characteristic.value.unwrap_or_default()),
                };
                if let Some(complete) = read {
                    complete(outcome.clone());
                }
                if let Some(on_value) = on_value {
                    on_value(outcome);
                }
            }
            PeripheralEvent::WroteValue {
                characteristic,
                error,
            } => {
                let pending = lock(&self.inner.session).write.resolve(&());
                match pending {
                    Some(complete) => complete(error.map_or(Ok(()), |e| Err(AbleError::Transport(e)))),
                    None => trace!(
                        peripheral = %self.identifier(),
                        %characteristic,
                        "write acknowledgement without pending attempt"
                    ),
                }
            }
            PeripheralEvent::UpdatedNotificationState {
                characteristic,
                error,
            } => {
                let pending = {
                    let mut session = lock(&self.inner.session);
                    if error.is_none() && !characteristic.is_notifying {
                        session.value_callbacks.remove(&characteristic.id());
                    }
                    session.notify_state.resolve(&())
                };
                if let Some(complete) = pending {
                    complete(error.map_or(Ok(()), |e| Err(AbleError::Transport(e))));
                }
            }
            PeripheralEvent::ReadRssi { rssi, error } => {
                if error.is_none() {
                    lock(&self.inner.snapshot).rssi = rssi;
                }
                let pending = lock(&self.inner.session).rssi.resolve(&());
                if let Some(complete) = pending {
                    complete(error.map_or(Ok(rssi), |e| Err(AbleError::Transport(e))));
                }
            }
            PeripheralEvent::UpdatedName { name } => {
                debug!(peripheral = %self.identifier(), ?name, "peripheral renamed");
            }
            PeripheralEvent::ModifiedServices { invalidated } => {
                debug!(peripheral = %self.identifier(), ?invalidated, "services invalidated");
            }
            PeripheralEvent::ReadyToSendWriteWithoutResponse => {
                trace!(peripheral = %self.identifier(), "ready to send write without response");
            }
        }
    }

    /// Arm a deadline that runs `on_fire` only while the peripheral is alive
    fn arm<F>(&self, after: Duration, on_fire: F) -> Option<Timer>
    where
        F: FnOnce(&PeripheralInner, Token) + Send + 'static,
    {
        let inner: Weak<PeripheralInner> = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .schedule_optional(Some(after), move |token| {
                if let Some(inner) = inner.upgrade() {
                    on_fire(&inner, token);
                }
            })
    }
}

impl PartialEq for Peripheral {
    fn eq(&self, other: &Self) -> bool {
        self.identifier() == other.identifier()
    }
}

impl Eq for Peripheral {}

impl Hash for Peripheral {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier().hash(state);
    }
}

impl fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripheral")
            .field("identifier", &self.inner.identifier)
            .field("rssi", &self.rssi())
            .finish()
    }
}
