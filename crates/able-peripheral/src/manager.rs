//! Server-role manager
//!
//! Correlates the server radio's add-service and advertising-started events
//! with the requests that caused them. Inbound requests from remote centrals
//! are not responses to anything local and go straight to the application.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use able_core::{
    lock, AbleError, AdvertisementData, AttRequest, AttResult, AttemptRegistry, Central,
    CharacteristicId, Completion, ConnectionLatency, ManagerAuthorization, ManagerState,
    MutableService, PeripheralManagerConfig, PeripheralManagerEvent, PeripheralManagerTransport,
    RestoredServerState, Result, Service, Timer, TimerScheduler, Token,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

type StateCallback = Arc<dyn Fn(ManagerState) + Send + Sync + 'static>;
type ReadRequestCallback = Arc<dyn Fn(&AttRequest) + Send + Sync + 'static>;
type WriteRequestsCallback = Arc<dyn Fn(&[AttRequest]) + Send + Sync + 'static>;
type SubscriptionCallback = Arc<dyn Fn(&Central, CharacteristicId) + Send + Sync + 'static>;
type RestoreCallback = Arc<dyn Fn(&RestoredServerState) + Send + Sync + 'static>;
type ReadyCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Counts of pending server-role attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingServerAttempts {
    pub state_waits: usize,
    pub add_service: usize,
    pub advertising: usize,
    pub armed_timers: usize,
}

// ----------------------------------------------------------------------------
// Manager State
// ----------------------------------------------------------------------------

struct StateWait {
    target: ManagerState,
    completion: Completion<ManagerState>,
}

struct AddServiceAttempt {
    service: Uuid,
    completion: Completion<Result<Service>>,
}

struct ServerState {
    waits: AttemptRegistry<Token, StateWait>,
    /// Keyed per request; events are matched back by service UUID
    add_service: AttemptRegistry<Token, AddServiceAttempt>,
    advertising: AttemptRegistry<(), Completion<Result<()>>>,
    ready_to_update: Option<ReadyCallback>,
}

#[derive(Default)]
struct Callbacks {
    on_state_update: Option<StateCallback>,
    on_read_request: Option<ReadRequestCallback>,
    on_write_requests: Option<WriteRequestsCallback>,
    on_subscribe: Option<SubscriptionCallback>,
    on_unsubscribe: Option<SubscriptionCallback>,
    on_restore_state: Option<RestoreCallback>,
}

struct Inner {
    transport: Arc<dyn PeripheralManagerTransport>,
    scheduler: TimerScheduler,
    config: PeripheralManagerConfig,
    state: Mutex<ServerState>,
    callbacks: Mutex<Callbacks>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

// ----------------------------------------------------------------------------
// Builder
// ----------------------------------------------------------------------------

/// Builder for [`PeripheralManager`]
pub struct PeripheralManagerBuilder {
    transport: Arc<dyn PeripheralManagerTransport>,
    config: PeripheralManagerConfig,
    runtime: Option<Handle>,
    events: Option<UnboundedReceiver<PeripheralManagerEvent>>,
}

impl PeripheralManagerBuilder {
    pub fn new(transport: Arc<dyn PeripheralManagerTransport>) -> Self {
        Self {
            transport,
            config: PeripheralManagerConfig::default(),
            runtime: None,
            events: None,
        }
    }

    pub fn with_config(mut self, config: PeripheralManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_events(mut self, events: UnboundedReceiver<PeripheralManagerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<PeripheralManager> {
        self.config.validate()?;
        let scheduler = TimerScheduler::resolve(self.runtime)?;
        let options = self.config.manager_options();
        self.transport.initialize(&options);

        info!(
            restore_identifier = ?options.restore_identifier,
            show_power_alert = options.show_power_alert,
            "peripheral manager ready"
        );

        let inner = Arc::new(Inner {
            transport: self.transport,
            scheduler,
            config: self.config,
            state: Mutex::new(ServerState {
                waits: AttemptRegistry::new("wait-for-state"),
                add_service: AttemptRegistry::new("add-service"),
                advertising: AttemptRegistry::new("start-advertising"),
                ready_to_update: None,
            }),
            callbacks: Mutex::new(Callbacks::default()),
            dispatch: Mutex::new(None),
        });

        if let Some(mut events) = self.events {
            let weak: Weak<Inner> = Arc::downgrade(&inner);
            let task = inner.scheduler.spawn(async move {
                while let Some(event) = events.recv().await {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    inner.handle_event(event);
                }
                debug!("peripheral manager event dispatch finished");
            });
            *lock(&inner.dispatch) = Some(task);
        }

        Ok(PeripheralManager { inner })
    }
}

// ----------------------------------------------------------------------------
// Peripheral Manager
// ----------------------------------------------------------------------------

/// Request/response facade over a callback-driven server radio
pub struct PeripheralManager {
    inner: Arc<Inner>,
}

impl PeripheralManager {
    pub fn builder(transport: Arc<dyn PeripheralManagerTransport>) -> PeripheralManagerBuilder {
        PeripheralManagerBuilder::new(transport)
    }

    pub fn new(transport: Arc<dyn PeripheralManagerTransport>) -> Result<Self> {
        Self::builder(transport).build()
    }

    pub fn config(&self) -> &PeripheralManagerConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ManagerState {
        self.inner.transport.state()
    }

    pub fn authorization(&self) -> ManagerAuthorization {
        self.inner.transport.authorization()
    }

    pub fn is_advertising(&self) -> bool {
        self.inner.transport.is_advertising()
    }

    pub fn pending_attempts(&self) -> PendingServerAttempts {
        let state = lock(&self.inner.state);
        PendingServerAttempts {
            state_waits: state.waits.len(),
            add_service: state.add_service.len(),
            advertising: state.advertising.len(),
            armed_timers: state.waits.armed_timers(),
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

    /// Receives read requests; answer each with [`PeripheralManager::respond`]
    pub fn on_read_request<F>(&self, callback: F)
    where
        F: Fn(&AttRequest) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_read_request = Some(Arc::new(callback));
    }

    /// Receives write batches; answer the first request of each batch
    pub fn on_write_requests<F>(&self, callback: F)
    where
        F: Fn(&[AttRequest]) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_write_requests = Some(Arc::new(callback));
    }

    pub fn on_subscribe<F>(&self, callback: F)
    where
        F: Fn(&Central, CharacteristicId) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_subscribe = Some(Arc::new(callback));
    }

    pub fn on_unsubscribe<F>(&self, callback: F)
    where
        F: Fn(&Central, CharacteristicId) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_unsubscribe = Some(Arc::new(callback));
    }

    pub fn on_restore_state<F>(&self, callback: F)
    where
        F: Fn(&RestoredServerState) + Send + Sync + 'static,
    {
        lock(&self.inner.callbacks).on_restore_state = Some(Arc::new(callback));
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Wait until the radio reports `target`; see the central manager's
    /// equivalent for timing semantics
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

    /// Publish `service`; completes with the registered service snapshot
    pub fn add_service<F>(&self, service: &MutableService, completion: F)
    where
        F: FnOnce(Result<Service>) + Send + 'static,
    {
        lock(&self.inner.state).add_service.register(
            Token::next(),
            AddServiceAttempt {
                service: service.uuid,
                completion: Box::new(completion),
            },
            None,
        );
        debug!(service = %service.uuid, "adding service");
        self.inner.transport.add_service(service);
    }

    pub fn remove_service(&self, service: &Uuid) {
        debug!(service = %service, "removing service");
        self.inner.transport.remove_service(*service);
    }

    pub fn remove_all_services(&self) {
        debug!("removing all services");
        self.inner.transport.remove_all_services();
    }

    /// Start advertising `advertisement`, replacing any pending start
    pub fn start_advertising<F>(&self, advertisement: &AdvertisementData, completion: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let superseded = lock(&self.inner.state)
            .advertising
            .register((), Box::new(completion), None);
        drop(superseded);

        info!(
            local_name = ?advertisement.local_name,
            services = advertisement.service_uuids.len(),
            manufacturer_data = ?advertisement.manufacturer_data_hex(),
            "starting advertising"
        );
        self.inner.transport.start_advertising(advertisement);
    }

    /// Advertise just a local name and service UUIDs
    pub fn start_advertising_with<F>(
        &self,
        local_name: Option<&str>,
        service_uuids: Option<Vec<Uuid>>,
        completion: F,
    ) where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let mut advertisement = AdvertisementData::new();
        if let Some(name) = local_name {
            advertisement = advertisement.with_local_name(name);
        }
        if let Some(uuids) = service_uuids {
            advertisement = advertisement.with_service_uuids(uuids);
        }
        self.start_advertising(&advertisement, completion);
    }

    pub fn stop_advertising(&self) {
        info!("stopping advertising");
        self.inner.transport.stop_advertising();
    }

    /// Send `value` to subscribers of `characteristic`
    ///
    /// Returns false when the transmit queue is full; `on_ready` then fires
    /// once the transport can accept updates again. Only the most recently
    /// supplied `on_ready` is kept.
    pub fn update_value<F>(
        &self,
        value: &[u8],
        characteristic: CharacteristicId,
        centrals: Option<&[Central]>,
        on_ready: F,
    ) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        let previous = lock(&self.inner.state)
            .ready_to_update
            .replace(Arc::new(on_ready));
        drop(previous);

        let sent = self
            .inner
            .transport
            .update_value(value, &characteristic, centrals);
        trace!(%characteristic, len = value.len(), sent, "updated value");
        sent
    }

    pub fn respond(&self, request: &AttRequest, result: AttResult) {
        trace!(request = request.id, ?result, "responding to request");
        self.inner.transport.respond(request, result);
    }

    pub fn set_desired_connection_latency(&self, latency: ConnectionLatency, central: &Central) {
        debug!(central = %central.identifier, ?latency, "setting desired connection latency");
        self.inner
            .transport
            .set_desired_connection_latency(latency, central);
    }

    /// Deliver a transport event directly
    pub fn handle_event(&self, event: PeripheralManagerEvent) {
        self.inner.handle_event(event);
    }
}

impl Drop for PeripheralManager {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.inner.dispatch).take() {
            task.abort();
        }
    }
}

impl fmt::Debug for PeripheralManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("PeripheralManager")
            .field("waits", &state.waits)
            .field("add_service", &state.add_service)
            .field("advertising", &state.advertising)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Event Dispatch
// ----------------------------------------------------------------------------

impl Inner {
    fn arm<F>(self: &Arc<Self>, after: Duration, on_fire: F) -> Option<Timer>
    where
        F: FnOnce(&Inner, Token) + Send + 'static,
    {
        let inner = Arc::downgrade(self);
        self.scheduler.schedule_optional(Some(after), move |token| {
            if let Some(inner) = inner.upgrade() {
                on_fire(&inner, token);
            }
        })
    }

    fn wait_for_state(
        self: &Arc<Self>,
        target: ManagerState,
        timeout: Option<Duration>,
        completion: Completion<ManagerState>,
    ) {
        let current = self.transport.state();
        if current == target {
            completion(current);
            return;
        }

        let timeout = timeout.unwrap_or(self.config.state_wait_timeout);
        let mut state = lock(&self.state);
        let timer = self.arm(timeout, |inner, token| {
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

    fn handle_event(&self, event: PeripheralManagerEvent) {
        match event {
            PeripheralManagerEvent::StateUpdated(new_state) => {
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
            PeripheralManagerEvent::ServiceAdded { service, error } => {
                let attempt = lock(&self.state)
                    .add_service
                    .take_first_where(|_, attempt| attempt.service == service.uuid);
                let Some((_, attempt)) = attempt else {
                    debug!(service = %service.uuid, "service added without pending attempt");
                    return;
                };
                match error {
                    Some(error) => {
                        warn!(service = %service.uuid, %error, "failed to add service");
                        (attempt.completion)(Err(AbleError::AddServiceFailed(error)));
                    }
                    None => {
                        info!(service = %service.uuid, "service added");
                        (attempt.completion)(Ok(service));
                    }
                }
            }
            PeripheralManagerEvent::AdvertisingStarted { error } => {
                let pending = lock(&self.state).advertising.resolve(&());
                let outcome = match error {
                    Some(error) => {
                        warn!(%error, "failed to start advertising");
                        Err(AbleError::StartAdvertisingFailed(error))
                    }
                    None => {
                        info!("advertising started");
                        Ok(())
                    }
                };
                if let Some(complete) = pending {
                    complete(outcome);
                }
            }
            PeripheralManagerEvent::ReadyToUpdateSubscribers => {
                let callback = lock(&self.state).ready_to_update.clone();
                if let Some(callback) = callback {
                    callback();
                }
            }
            PeripheralManagerEvent::ReadRequest(request) => {
                trace!(request = request.id, characteristic = %request.characteristic, "read request");
                let callback = lock(&self.callbacks).on_read_request.clone();
                if let Some(callback) = callback {
                    callback(&request);
                }
            }
            PeripheralManagerEvent::WriteRequests(requests) => {
                trace!(count = requests.len(), "write requests");
                let callback = lock(&self.callbacks).on_write_requests.clone();
                if let Some(callback) = callback {
                    callback(&requests);
                }
            }
            PeripheralManagerEvent::Subscribed {
                central,
                characteristic,
            } => {
                debug!(central = %central.identifier, %characteristic, "central subscribed");
                let callback = lock(&self.callbacks).on_subscribe.clone();
                if let Some(callback) = callback {
                    callback(&central, characteristic);
                }
            }
            PeripheralManagerEvent::Unsubscribed {
                central,
                characteristic,
            } => {
                debug!(central = %central.identifier, %characteristic, "central unsubscribed");
                let callback = lock(&self.callbacks).on_unsubscribe.clone();
                if let Some(callback) = callback {
                    callback(&central, characteristic);
                }
            }
            PeripheralManagerEvent::WillRestoreState(restored) => {
                info!(services = restored.services.len(), "restoring peripheral manager state");
                let callback = lock(&self.callbacks).on_restore_state.clone();
                if let Some(callback) = callback {
                    callback(&restored);
                }
            }
        }
    }
}
