//! Mock server-role radio

use std::fmt;
use std::sync::{Arc, Mutex};

use able_core::{
    lock, AdvertisementData, AttRequest, AttResult, Central, CharacteristicId, ConnectionLatency,
    ManagerAuthorization, ManagerOptions, ManagerState, ManagerStateProvider, MutableService,
    PeripheralManagerEvent, PeripheralManagerTransport, TransportError,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::emit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddServiceBehaviour {
    Success,
    Failure,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseBehaviour {
    Success,
    Failure,
    Silent,
}

/// Calls recorded by [`MockPeripheralManagerTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCall {
    AddService(Uuid),
    RemoveService(Uuid),
    RemoveAllServices,
    StartAdvertising(AdvertisementData),
    StopAdvertising,
    UpdateValue {
        value: Vec<u8>,
        characteristic: CharacteristicId,
        centrals: Option<Vec<Uuid>>,
    },
    Respond {
        request: u64,
        result: AttResult,
    },
    SetDesiredConnectionLatency {
        latency: ConnectionLatency,
        central: Uuid,
    },
}

struct MockServerState {
    manager_state: ManagerState,
    authorization: ManagerAuthorization,
    is_advertising: bool,
    add_service: AddServiceBehaviour,
    advertise: AdvertiseBehaviour,
    accepts_updates: bool,
    initializations: Vec<ManagerOptions>,
    calls: Vec<ServerCall>,
}

/// Scriptable server-role radio
///
/// Starts powered on and answers add-service and advertise requests
/// immediately with success.
pub struct MockPeripheralManagerTransport {
    events: UnboundedSender<PeripheralManagerEvent>,
    state: Mutex<MockServerState>,
}

impl MockPeripheralManagerTransport {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<PeripheralManagerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            events,
            state: Mutex::new(MockServerState {
                manager_state: ManagerState::PoweredOn,
                authorization: ManagerAuthorization::AllowedAlways,
                is_advertising: false,
                add_service: AddServiceBehaviour::Success,
                advertise: AdvertiseBehaviour::Success,
                accepts_updates: true,
                initializations: Vec::new(),
                calls: Vec::new(),
            }),
        });
        (transport, receiver)
    }

    pub fn set_state(&self, state: ManagerState) {
        lock(&self.state).manager_state = state;
    }

    /// Change the reported state and emit `StateUpdated`
    pub fn update_state(&self, state: ManagerState) {
        self.set_state(state);
        self.emit(PeripheralManagerEvent::StateUpdated(state));
    }

    pub fn set_add_service_behaviour(&self, behaviour: AddServiceBehaviour) {
        lock(&self.state).add_service = behaviour;
    }

    pub fn set_advertise_behaviour(&self, behaviour: AdvertiseBehaviour) {
        lock(&self.state).advertise = behaviour;
    }

    /// Whether `update_value` reports the transmit queue as accepting
    pub fn set_accepts_updates(&self, accepts: bool) {
        lock(&self.state).accepts_updates = accepts;
    }

    pub fn emit(&self, event: PeripheralManagerEvent) {
        emit(&self.events, event);
    }

    pub fn calls(&self) -> Vec<ServerCall> {
        lock(&self.state).calls.clone()
    }

    /// Options received through `initialize`
    pub fn initializations(&self) -> Vec<ManagerOptions> {
        lock(&self.state).initializations.clone()
    }

    fn record(&self, call: ServerCall) {
        lock(&self.state).calls.push(call);
    }
}

impl ManagerStateProvider for MockPeripheralManagerTransport {
    fn state(&self) -> ManagerState {
        lock(&self.state).manager_state
    }

    fn authorization(&self) -> ManagerAuthorization {
        lock(&self.state).authorization
    }
}

impl PeripheralManagerTransport for MockPeripheralManagerTransport {
    fn initialize(&self, options: &ManagerOptions) {
        lock(&self.state).initializations.push(options.clone());
    }

    fn is_advertising(&self) -> bool {
        lock(&self.state).is_advertising
    }

    fn add_service(&self, service: &MutableService) {
        self.record(ServerCall::AddService(service.uuid));
        let behaviour = lock(&self.state).add_service;
        let error = match behaviour {
            AddServiceBehaviour::Success => None,
            AddServiceBehaviour::Failure => Some(TransportError::new("add service failed")),
            AddServiceBehaviour::Silent => return,
        };
        self.emit(PeripheralManagerEvent::ServiceAdded {
            service: service.snapshot(),
            error,
        });
    }

    fn remove_service(&self, service: Uuid) {
        self.record(ServerCall::RemoveService(service));
    }

    fn remove_all_services(&self) {
        self.record(ServerCall::RemoveAllServices);
    }

    fn start_advertising(&self, advertisement: &AdvertisementData) {
        self.record(ServerCall::StartAdvertising(advertisement.clone()));
        let behaviour = lock(&self.state).advertise;
        let error = match behaviour {
            AdvertiseBehaviour::Success => {
                lock(&self.state).is_advertising = true;
                None
            }
            AdvertiseBehaviour::Failure => Some(TransportError::new("advertising failed")),
            AdvertiseBehaviour::Silent => return,
        };
        self.emit(PeripheralManagerEvent::AdvertisingStarted { error });
    }

    fn stop_advertising(&self) {
        self.record(ServerCall::StopAdvertising);
        lock(&self.state).is_advertising = false;
    }

    fn update_value(
        &self,
        value: &[u8],
        characteristic: &CharacteristicId,
        centrals: Option<&[Central]>,
    ) -> bool {
        self.record(ServerCall::UpdateValue {
            value: value.to_vec(),
            characteristic: *characteristic,
            centrals: centrals.map(|centrals| centrals.iter().map(|c| c.identifier).collect()),
        });
        lock(&self.state).accepts_updates
    }

    fn respond(&self, request: &AttRequest, result: AttResult) {
        self.record(ServerCall::Respond {
            request: request.id,
            result,
        });
    }

    fn set_desired_connection_latency(&self, latency: ConnectionLatency, central: &Central) {
        self.record(ServerCall::SetDesiredConnectionLatency {
            latency,
            central: central.identifier,
        });
    }
}

impl fmt::Debug for MockPeripheralManagerTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockPeripheralManagerTransport")
            .field("state", &state.manager_state)
            .field("is_advertising", &state.is_advertising)
            .finish()
    }
}
