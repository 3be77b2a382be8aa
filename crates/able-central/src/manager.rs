//! Central-role connection manager
//!
//! Owns the known/found/cached peripheral sets and one attempt registry per
//! operation family. Transport events are correlated with pending attempts
//! by the identity they carry: a peripheral identifier for connects and
//! disconnects, the timer token for state waits, nothing for "the" scan.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use able_core::{
    lock, AbleError, AttemptRegistry, CentralEvent, CentralManagerConfig, CentralTransport,
    Completion, ConnectionEvent, ConnectionEventOptions, KnownIdentifiers, KnownPeripheralStore,
    ManagerAuthorization, ManagerState, MemoryStore, PeripheralHandle, Result, Timer,
    TimerScheduler, Token, TransportError,
};
use smallvec::SmallVec;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::peripheral::Peripheral;
use crate::request::{ConnectRequest, DiscoveryCallback, ScanRequest};

type StateCallback = Arc<dyn Fn(ManagerState) + Send + Sync + 'static>;
type DisconnectCallback = Arc<dyn Fn(&Peripheral, Option<&TransportError>) + Send + Sync + 'static>;
type ConnectionEventCallback = Arc<dyn Fn(ConnectionEvent, &Peripheral) + Send + Sync + 'static>;
type RestoreCallback = Arc<dyn Fn(&RestoredCentralState) + Send + Sync + 'static>;

/// Peripherals and scan filter handed back when the transport restores state
#[derive(Debug, Clone)]
pub struct RestoredCentralState {
    pub peripherals: Vec<Peripheral>,
    pub scan_services: Vec<Uuid>,
}

/// Counts of pending attempts per family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingAttempts {
    pub state_waits: usize,
    pub scans: usize,
    pub connects: usize,
    pub disconnects: usize,
    /// Live connections tracked for lifetime expiry
    pub connections: usize,
    /// Deadline timers currently armed across all families
    pub armed_timers: usize,
}

// ----------------------------------------------------------------------------
// Attempt Payloads
// ----------------------------------------------------------------------------

struct StateWait {
    target: ManagerState,
    completion: Completion<ManagerState>,
}

struct ConnectAttempt {
    peripheral: Peripheral,
    completion: Completion<Result<Peripheral>>,
    connection_timeout: Option<Duration>,
}

struct DisconnectAttempt {
    peripheral: Peripheral,
    completion: Completion<Result<Peripheral>>,
}

// ----------------------------------------------------------------------------
// Manager State
// ----------------------------------------------------------------------------

struct CentralState {
    known: KnownIdentifiers,
    found: BTreeMap<Uuid, Peripheral>,
    cached: BTreeMap<Uuid, Peripheral>,
    is_scanning: bool,
    on_discovery: Option<DiscoveryCallback>,
    waits: AttemptRegistry<Token, StateWait>,
    scan: AttemptRegistry<(), Completion<Result<Vec<Peripheral>>>>,
    connects: AttemptRegistry<Uuid, ConnectAttempt>,
    disconnects: AttemptRegistry<Uuid, DisconnectAttempt>,
    /// Established connections; the timer (if any) is the lifetime deadline
    lifetimes: AttemptRegistry<Uuid, Peripheral>,
}

impl CentralState {
    /// Find the live instance for `identifier` wherever it is tracked
    fn lookup(&self, identifier: &Uuid) -> Option<Peripheral> {
        self.found
            .get(identifier)
            .or_else(|| self.cached.get(identifier))
            .or_else(|| self.lifetimes.get(identifier))
            .cloned()
            .or_else(|| {
                self.connects
                    .get(identifier)
                    .map(|attempt| attempt.peripheral.clone())
            })
    }
}

#[derive(Default)]
struct Callbacks {
    on_state_update: Option<StateCallback>,
    on_disconnect: Option<DisconnectCallback>,
    on_connection_event: Option<ConnectionEventCallback>,
    on_restore_state: Option<RestoreCallback>,
}

struct Inner {
    transport: Arc<dyn CentralTransport>,
    scheduler: TimerScheduler,
    config: CentralManagerConfig,
    state: Mutex<CentralState>,
    callbacks: Mutex<Callbacks>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Builder for [`CentralManager`]
pub struct CentralManagerBuilder {
    transport: Arc<dyn CentralTransport>,
    config: CentralManagerConfig,
    store: Option<Arc<dyn KnownPeripheralStore>>,
    runtime: Option<Handle>,
    events: Option<UnboundedReceiver<CentralEvent>>,
}

impl CentralManagerBuilder {
    pub fn new(transport: Arc<dyn CentralTransport>) -> Self {
        Self {
            transport,
            config: CentralManagerConfig::default(),
            store: None,
            runtime: None,
            events: None,
        }
    }

    pub fn with_config(mut self, config: CentralManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist known identifiers in `store` (defaults to an in-memory store)
    pub fn with_store(mut self, store: Arc<dyn KnownPeripheralStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run timers and event dispatch on `runtime` instead of the ambient one
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Consume transport events from `events` on a dispatch task
    pub fn with_events(mut self, events: UnboundedReceiver<CentralEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the manager, pre-populating `cached` from persisted identifiers
    pub fn build(self) -> Result<CentralManager> {
        self.config.validate()?;
        let scheduler = TimerScheduler::resolve(self.runtime)?;
        let options = self.config.manager_options();
        self.transport.initialize(&options);

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KnownPeripheralStore>);
        let known = KnownIdentifiers::load(store, self.config.known_peripherals_key.clone());

        let handles = if known.is_empty() {
            Vec::new()
        } else {
            self.transport.retrieve_peripherals(&known.to_vec())
        };
        let cached: BTreeMap<Uuid, Peripheral> = handles
            .into_iter()
            .map(|handle| {
                let peripheral = Peripheral::new(handle, scheduler.clone(), self.config.session.clone());
                (peripheral.identifier(), peripheral)
            })
            .collect();

        info!(
            known = known.len(),
            cached = cached.len(),
            restore_identifier = ?options.restore_identifier,
            show_power_alert = options.show_power_alert,
            "central manager ready"
        );

        let inner = Arc::new(Inner {
            transport: self.transport,
            scheduler,
            config: self.config,
            state: Mutex::new(CentralState {
                known,
                found: BTreeMap::new(),
                cached,
                is_scanning: false,
                on_discovery: None,
                waits: AttemptRegistry::new("wait-for-state"),
                scan: AttemptRegistry::new("scan"),
                connects: AttemptRegistry::new("connect"),
                disconnects: AttemptRegistry::new("disconnect"),
                lifetimes: AttemptRegistry::new("connection-lifetime"),
            }),
            callbacks: Mutex::new(Callbacks::default()),
            dispatch: Mutex::new(None),
        });

        if let Some(events) = self.events {
            let task = spawn_dispatch(&inner, events);
            *lock(&inner.dispatch) = Some(task);
        }

        Ok(CentralManager { inner })
    }
}

/// Process events FIFO until the stream closes or the manager is dropped
fn spawn_dispatch(inner: &Arc<Inner>, mut events: UnboundedReceiver<CentralEvent>) -> JoinHandle<()> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    inner.scheduler.spawn(async move {
        while let Some(event) = events.recv().await {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.handle_event(event);
        }
        debug!("central event dispatch finished");
    })
}

// ----------------------------------------------------------------------------
// Central Manager
// ----------------------------------------------------------------------------

/// Request/response facade over a callback-driven central radio
///
/// Every operation returns immediately; continuations run later on the
/// manager's runtime, exactly once, unless the attempt is superseded by a
/// newer one for the same identity (the superseded continuation is dropped).
pub struct CentralManager {
    inner: Arc<Inner>,
}

impl CentralManager {
    pub fn builder(transport: Arc<dyn CentralTransport>) -> CentralManagerBuilder {
        CentralManagerBuilder::new(transport)
    }

    /// Build with defaults on the ambient runtime
    pub fn new(transport: Arc<dyn CentralTransport>) -> Result<Self> {
        Self::builder(transport).build()
    }

    pub fn config(&self) -> &CentralManagerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ManagerState {
        self.inner.transport.state()
    }

    pub fn authorization(&self) -> ManagerAuthorization {
        self.inner.transport.authorization()
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.inner.state).is_scanning
    }

    /// Peripherals observed over the air
    pub fn found_peripherals(&self) -> Vec<Peripheral> {
        lock(&self.inner.state).found.values().cloned().collect()
    }

    /// Peripherals known from a previous session but not observed yet
    pub fn cached_peripherals(&self) -> Vec<Peripheral> {
        lock(&self.inner.state).cached.values().cloned().collect()
    }

    /// Found and cached peripherals
    pub fn all_peripherals(&self) -> Vec<Peripheral> {
        let state = lock(&self.inner.state);
        state
            .found
            .values()
            .chain(state.cached.values())
            .cloned()
            .collect()
    }

    pub fn known_identifiers(&self) -> Vec<Uuid> {
        lock(&self.inner.state).known.to_vec()
    }

    /// Look up a found or cached peripheral
    pub fn peripheral(&self, identifier: &Uuid) -> Option<Peripheral> {
        let state = lock(&self.inner.state);
        state
            .found
            .get(identifier)
            .or_else(|| state.cached.get(identifier))
            .cloned()
    }

    pub fn pending_attempts(&self) -> PendingAttempts {
        let state = lock(&self.inner.state);
        PendingAttempts {
            state_waits: state.waits.len(),
            scans: state.scan.len(),
            connects: state.connects.len(),
            disconnects: state.disconnects.len(),
            connections: state.lifetimes.len(),
            armed_timers: state.waits.armed_timers()
                + state.scan.armed_timers()
                + state.connects.armed_timers()
                + state.disconnects.armed_timers()
                + state.lifetimes.armed_timers(),
        }
    }

    // ------------------------------------------------------------------------
    // Application Callbacks
    // ------------------------------------------------------------------------

    pub fn on_state_update<F>(&self, callback: F)
    where
        F: Fn(ManagerState) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_state_update = Some(Arc::new(callback));
    }

    /// Called for every transport disconnect, solicited or not
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn(&Peripheral, Option<&TransportError>) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_disconnect = Some(Arc::new(callback));
    }

    pub fn on_connection_event<F>(&self, callback: F)
    where
        F: Fn(ConnectionEvent, &Peripheral) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_connection_event = Some(Arc::new(callback));
    }

    pub fn on_restore_state<F>(&self, callback: F)
    where
        F: Fn(&RestoredCentralState) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_restore_state = Some(Arc::new(callback));
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Wait until the radio reports `target`
    ///
    /// Completes before returning when the radio is already in `target`.
    /// Otherwise the continuation receives `target` on the matching state
    /// change, or the then-current state once `timeout` elapses (`None` uses
    /// the configured state wait timeout).
    pub fn wait_for_state<F>(&self, target: ManagerState, timeout: Option<Duration>, completion: F)
    where
        F: FnOnce(ManagerState) + Send + 'static,
    {
        self.inner.wait_for_state(target, timeout, Box::new(completion));
    }

    pub fn wait_for_powered_on<F>(&self, timeout: Option<Duration>, completion: F)
    where
        F: FnOnce(ManagerState) + Send + 'static,
    {
        self.wait_for_state(ManagerState::PoweredOn, timeout, completion);
    }

    /// Start scanning, replacing any scan in progress
    pub fn scan_for_peripherals(&self, request: ScanRequest) {
        self.inner.scan_for_peripherals(request);
    }

    /// Stop scanning; safe to call when no scan is running
    pub fn stop_scan(&self) {
        self.inner.stop_scan();
    }

    /// Connect to `peripheral`, replacing any pending connect to it
    pub fn connect<F>(&self, peripheral: &Peripheral, request: ConnectRequest, completion: F)
    where
        F: FnOnce(Result<Peripheral>) + Send + 'static,
    {
        self.inner.connect(peripheral, request, Box::new(completion));
    }

    /// Fire-and-forget disconnect
    pub fn disconnect(&self, peripheral: &Peripheral) {
        self.inner.disconnect(peripheral, None);
    }

    /// Disconnect and report once the transport confirms
    pub fn disconnect_with<F>(&self, peripheral: &Peripheral, completion: F)
    where
        F: FnOnce(Result<Peripheral>) + Send + 'static,
    {
        self.inner.disconnect(peripheral, Some(Box::new(completion)));
    }

    /// Disconnect every found and cached peripheral
    pub fn disconnect_all(&self) {
        self.inner.disconnect_all();
    }

    /// Evict `peripheral` from every set and drop its pending attempts
    pub fn forget(&self, peripheral: &Peripheral) {
        self.inner.forget(peripheral);
    }

    /// Peripherals the system already holds connections to
    pub fn retrieve_connected_peripherals(&self, services: &[Uuid]) -> Vec<Peripheral> {
        self.inner.retrieve_connected_peripherals(services)
    }

    pub fn register_for_connection_events(&self, options: &ConnectionEventOptions) {
        debug!(?options, "registering for connection events");
        self.inner.transport.register_for_connection_events(options);
    }

    /// Deliver a transport event directly
    pub fn handle_event(&self, event: CentralEvent) {
        self.inner.handle_event(event);
    }
}

impl Drop for CentralManager {
    fn drop(&mut self) {
        self.inner.disconnect_all();
        if let Some(task) = lock(&self.inner.dispatch).take() {
            task.abort();
        }
    }
}

impl fmt::Debug for CentralManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("CentralManager")
            .field("known", &state.known)
            .field("found", &state.found.keys().collect::<Vec<_>>())
            .field("cached", &state.cached.keys().collect::<Vec<_>>())
            .field("is_scanning", &state.is_scanning)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Attempt Handling
// ----------------------------------------------------------------------------

impl Inner {
    /// Arm a deadline that runs `on_fire` only while the manager is alive
    fn arm<F>(self: &Arc<Self>, after: Option<Duration>, on_fire: F) -> Option<Timer>
    where
        F: FnOnce(&Arc<Inner>, Token) + Send + 'static,
    {
        let inner = Arc::downgrade(self);
        self.scheduler.schedule_optional(after, move |token| {
            if let Some(inner) = inner.upgrade() {
                on_fire(&inner, token);
            }
        })
    }

    fn new_peripheral(&self, handle: PeripheralHandle) -> Peripheral {
        Peripheral::new(handle, self.scheduler.clone(), self.config.session.clone())
    }

    fn wait_for_state(
        self: &Arc<Self>,
        target: ManagerState,
        timeout: Option<Duration>,
        completion: Completion<ManagerState>,
    ) {
        let current = self.transport.state();
        if current == target {
            trace!(state = %current, "state wait satisfied immediately");
            completion(current);
            return;
        }

        let timeout = timeout.unwrap_or(self.config.state_wait_timeout);
        let mut state = lock(&self.state);
        let timer = self.arm(Some(timeout), |inner, token| {
            let timed_out = lock(&inner.state).waits.take_timed_out(token);
            if let Some((_, wait)) = timed_out {
                let current = inner.transport.state();
                debug!(target = %wait.target, state = %current, "state wait timed out");
                (wait.completion)(current);
            }
        });
        state
            .waits
            .register(Token::next(), StateWait { target, completion }, timer);
    }

    fn scan_for_peripherals(self: &Arc<Self>, request: ScanRequest) {
        let ScanRequest {
            services,
            options,
            on_discovery,
            timeout,
        } = request;

        let superseded = lock(&self.state).scan.resolve(&());
        drop(superseded);

        let current = self.transport.state();
        if !current.is_powered_on() {
            warn!(state = %current, "cannot scan, bluetooth not available");
            if let Some((_, completion)) = timeout {
                completion(Err(AbleError::BluetoothNotAvailable(current)));
            }
            return;
        }

        let previous_callback = {
            let mut state = lock(&self.state);
            if let Some((interval, completion)) = timeout {
                let timer = self.arm(Some(interval), |inner, token| inner.scan_timed_out(token));
                state.scan.register((), completion, timer);
            }
            state.is_scanning = true;
            std::mem::replace(&mut state.on_discovery, on_discovery)
        };
        drop(previous_callback);

        info!(?services, "scan started");
        self.transport.scan_for_peripherals(services.as_deref(), &options);
    }

    fn scan_timed_out(&self, token: Token) {
        let (completion, found, callback) = {
            let mut state = lock(&self.state);
            let Some(((), completion)) = state.scan.take_timed_out(token) else {
                return;
            };
            state.is_scanning = false;
            let found: Vec<Peripheral> = state.found.values().cloned().collect();
            (completion, found, state.on_discovery.take())
        };
        drop(callback);

        self.transport.stop_scan();
        info!(found = found.len(), "scan timeout reached");
        completion(Ok(found));
    }

    fn stop_scan(&self) {
        let (superseded, callback) = {
            let mut state = lock(&self.state);
            state.is_scanning = false;
            (state.scan.resolve(&()), state.on_discovery.take())
        };
        drop(superseded);
        drop(callback);

        self.transport.stop_scan();
        info!("scan stopped");
    }

    fn connect(
        self: &Arc<Self>,
        peripheral: &Peripheral,
        request: ConnectRequest,
        completion: Completion<Result<Peripheral>>,
    ) {
        let ConnectRequest {
            options,
            attempt_timeout,
            connection_timeout,
        } = request;
        let identifier = peripheral.identifier();

        let superseded = {
            let mut state = lock(&self.state);
            let timer = self.arm(attempt_timeout, |inner, token| inner.connect_timed_out(token));
            state.connects.register(
                identifier,
                ConnectAttempt {
                    peripheral: peripheral.clone(),
                    completion,
                    connection_timeout,
                },
                timer,
            )
        };
        drop(superseded);

        info!(
            peripheral = %identifier,
            attempt_timeout_ms = attempt_timeout.map(|t| t.as_millis() as u64),
            connection_timeout_ms = connection_timeout.map(|t| t.as_millis() as u64),
            "connecting"
        );
        self.transport.connect(peripheral.handle(), &options);
    }

    fn connect_timed_out(self: &Arc<Self>, token: Token) {
        let timed_out = lock(&self.state).connects.take_timed_out(token);
        let Some((identifier, attempt)) = timed_out else {
            return;
        };
        warn!(peripheral = %identifier, "connection attempt timed out");
        (attempt.completion)(Err(AbleError::ConnectionTimeoutReached));
        self.disconnect(&attempt.peripheral, None);
    }

    fn connection_lifetime_elapsed(&self, token: Token) {
        let expired = lock(&self.state).lifetimes.take_timed_out(token);
        if let Some((identifier, peripheral)) = expired {
            info!(peripheral = %identifier, "connection lifetime elapsed, disconnecting");
            self.disconnect(&peripheral, None);
        }
    }

    fn disconnect(&self, peripheral: &Peripheral, completion: Option<Completion<Result<Peripheral>>>) {
        let identifier = peripheral.identifier();
        let (connection, superseded) = {
            let mut state = lock(&self.state);
            let connection = state.lifetimes.resolve(&identifier);
            let superseded = completion.and_then(|completion| {
                state.disconnects.register(
                    identifier,
                    DisconnectAttempt {
                        peripheral: peripheral.clone(),
                        completion,
                    },
                    None,
                )
            });
            (connection, superseded)
        };
        drop(connection);
        drop(superseded);

        debug!(peripheral = %identifier, "disconnecting");
        self.transport.cancel_connection(peripheral.handle());
    }

    fn disconnect_all(&self) {
        let peripherals: SmallVec<[Peripheral; 8]> = {
            let state = lock(&self.state);
            state
                .found
                .values()
                .chain(state.cached.values())
                .cloned()
                .collect()
        };
        if !peripherals.is_empty() {
            debug!(count = peripherals.len(), "disconnecting from all peripherals");
        }
        for peripheral in &peripherals {
            self.disconnect(peripheral, None);
        }
    }

    fn forget(&self, peripheral: &Peripheral) {
        let identifier = peripheral.identifier();
        let dropped = {
            let mut state = lock(&self.state);
            state.found.remove(&identifier);
            state.cached.remove(&identifier);
            state.known.remove(&identifier);
            (
                state.connects.resolve(&identifier),
                state.disconnects.resolve(&identifier),
                state.lifetimes.resolve(&identifier),
            )
        };
        drop(dropped);
        info!(peripheral = %identifier, "peripheral forgotten");
    }

    fn retrieve_connected_peripherals(&self, services: &[Uuid]) -> Vec<Peripheral> {
        let handles = self.transport.retrieve_connected_peripherals(services);
        let mut state = lock(&self.state);
        handles
            .into_iter()
            .map(|handle| self.track_cached(&mut state, handle))
            .collect()
    }

    /// Existing instance for `handle`, or a new one inserted into `cached`
    fn track_cached(&self, state: &mut CentralState, handle: PeripheralHandle) -> Peripheral {
        let identifier = handle.identifier();
        if let Some(peripheral) = state.found.get(&identifier) {
            return peripheral.clone();
        }
        state
            .cached
            .entry(identifier)
            .or_insert_with(|| self.new_peripheral(handle))
            .clone()
    }

    // ------------------------------------------------------------------------
    // Event Dispatch
    // ------------------------------------------------------------------------

    fn handle_event(self: &Arc<Self>, event: CentralEvent) {
        match event {
            CentralEvent::StateUpdated(new_state) => self.state_updated(new_state),
            CentralEvent::Discovered {
                peripheral,
                advertisement,
                rssi,
            } => {
                let identifier = peripheral.identifier();
                let (discovered, callback) = {
                    let mut state = lock(&self.state);
                    state.known.insert(identifier);
                    let cached = state.cached.remove(&identifier);
                    let existing = state.found.get(&identifier).cloned().or(cached);
                    let discovered = match existing {
                        Some(existing) => {
                            existing.update_discovery(advertisement, rssi);
                            existing
                        }
                        None => Peripheral::with_snapshot(
                            peripheral,
                            self.scheduler.clone(),
                            self.config.session.clone(),
                            advertisement,
                            rssi,
                        ),
                    };
                    state.found.insert(identifier, discovered.clone());
                    (discovered, state.on_discovery.clone())
                };
                debug!(peripheral = %identifier, rssi, "discovered peripheral");
                if let Some(callback) = callback {
                    callback(&discovered);
                }
            }
            CentralEvent::Connected { identifier } => {
                let connected = {
                    let mut state = lock(&self.state);
                    let attempt = state.connects.resolve(&identifier);
                    if let Some(attempt) = &attempt {
                        let timer = self.arm(attempt.connection_timeout, |inner, token| {
                            inner.connection_lifetime_elapsed(token)
                        });
                        state
                            .lifetimes
                            .register(identifier, attempt.peripheral.clone(), timer);
                    }
                    attempt
                };
                match connected {
                    Some(attempt) => {
                        info!(peripheral = %identifier, "connected");
                        (attempt.completion)(Ok(attempt.peripheral));
                    }
                    None => debug!(peripheral = %identifier, "connected without pending attempt"),
                }
            }
            CentralEvent::FailedToConnect { identifier, error } => {
                let attempt = {
                    let mut state = lock(&self.state);
                    state.known.remove(&identifier);
                    state.connects.resolve(&identifier)
                };
                warn!(peripheral = %identifier, error = ?error, "failed to connect");
                if let Some(attempt) = attempt {
                    (attempt.completion)(Err(AbleError::ConnectionFailed(error)));
                }
            }
            CentralEvent::Disconnected { identifier, error } => {
                let (peripheral, pending) = {
                    let mut state = lock(&self.state);
                    let connection = state.lifetimes.resolve(&identifier);
                    let pending = state.disconnects.resolve(&identifier);
                    let peripheral = connection
                        .or_else(|| pending.as_ref().map(|attempt| attempt.peripheral.clone()))
                        .or_else(|| state.lookup(&identifier));
                    (peripheral, pending)
                };
                info!(peripheral = %identifier, error = ?error, "disconnected");

                if let Some(attempt) = pending {
                    let outcome = match &error {
                        Some(error) => Err(AbleError::Transport(error.clone())),
                        None => Ok(attempt.peripheral),
                    };
                    (attempt.completion)(outcome);
                }
                let callback = lock(&self.callbacks).on_disconnect.clone();
                if let (Some(callback), Some(peripheral)) = (callback, peripheral) {
                    callback(&peripheral, error.as_ref());
                }
            }
            CentralEvent::ConnectionEvent { event, peripheral } => {
                let identifier = peripheral.identifier();
                let tracked = lock(&self.state).lookup(&identifier);
                let peripheral = tracked.unwrap_or_else(|| self.new_peripheral(peripheral));
                debug!(peripheral = %identifier, ?event, "connection event");
                let callback = lock(&self.callbacks).on_connection_event.clone();
                if let Some(callback) = callback {
                    callback(event, &peripheral);
                }
            }
            CentralEvent::WillRestoreState {
                peripherals,
                scan_services,
            } => {
                let restored: Vec<Peripheral> = {
                    let mut state = lock(&self.state);
                    peripherals
                        .into_iter()
                        .map(|handle| self.track_cached(&mut state, handle))
                        .collect()
                };
                info!(count = restored.len(), "restoring central state");
                let callback = lock(&self.callbacks).on_restore_state.clone();
                if let Some(callback) = callback {
                    callback(&RestoredCentralState {
                        peripherals: restored,
                        scan_services,
                    });
                }
            }
            CentralEvent::Peripheral { identifier, event } => {
                let target = lock(&self.state).lookup(&identifier);
                match target {
                    Some(peripheral) => peripheral.handle_event(event),
                    None => debug!(peripheral = %identifier, "event for untracked peripheral"),
                }
            }
        }
    }

    fn state_updated(&self, new_state: ManagerState) {
        let matched = lock(&self.state)
            .waits
            .take_where(|_, wait| wait.target == new_state);
        info!(state = %new_state, resolved_waits = matched.len(), "bluetooth state updated");
        for (_, wait) in matched {
            (wait.completion)(new_state);
        }

        let callback = lock(&self.callbacks).on_state_update.clone();
        if let Some(callback) = callback {
            callback(new_state);
        }
    }
}
