//! Mock central-role radio

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use able_core::{
    lock, AdvertisementData, CentralEvent, CentralTransport, ConnectOptions, ConnectionEvent,
    ConnectionEventOptions, ManagerAuthorization, ManagerOptions, ManagerState,
    ManagerStateProvider, PeripheralHandle, PeripheralState, PeripheralTransport, ScanOptions,
    TransportError,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::peripheral::MockPeripheral;
use crate::{emit, run_after};

// ----------------------------------------------------------------------------
// Behaviours
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehaviour {
    /// Report `Connected` after `after`
    Success { after: Duration },
    /// Report `FailedToConnect` immediately
    Failure { error: Option<TransportError> },
    /// Never report back
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectBehaviour {
    /// Report `Disconnected` immediately
    Success,
    /// Report `Disconnected` after the given delay
    SuccessAfter(Duration),
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventBehaviour {
    /// Report `event` for a fresh peripheral after `after`
    Generate {
        event: ConnectionEvent,
        after: Duration,
    },
    Idle,
}

/// Calls recorded by [`MockCentralTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralCall {
    ScanForPeripherals {
        services: Option<Vec<Uuid>>,
        options: ScanOptions,
    },
    StopScan,
    Connect(Uuid),
    CancelConnection(Uuid),
    RetrievePeripherals(Vec<Uuid>),
    RetrieveConnectedPeripherals(Vec<Uuid>),
    RegisterForConnectionEvents(ConnectionEventOptions),
}

// ----------------------------------------------------------------------------
// Mock Central Transport
// ----------------------------------------------------------------------------

struct MockCentralState {
    manager_state: ManagerState,
    authorization: ManagerAuthorization,
    connect: ConnectBehaviour,
    disconnect: DisconnectBehaviour,
    connection_events: ConnectionEventBehaviour,
    /// Peripherals the radio can resolve by identifier
    peripherals: BTreeMap<Uuid, Arc<MockPeripheral>>,
    /// Peripherals reported on every scan start
    advertising: Vec<(Arc<MockPeripheral>, AdvertisementData, i16)>,
    initializations: Vec<ManagerOptions>,
    calls: Vec<CentralCall>,
}

/// Scriptable central radio
///
/// Starts powered on, connects immediately and disconnects immediately.
pub struct MockCentralTransport {
    events: UnboundedSender<CentralEvent>,
    state: Arc<Mutex<MockCentralState>>,
}

impl MockCentralTransport {
    /// Create the transport and the event stream a manager should consume
    pub fn new() -> (Arc<Self>, UnboundedReceiver<CentralEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            events,
            state: Arc::new(Mutex::new(MockCentralState {
                manager_state: ManagerState::PoweredOn,
                authorization: ManagerAuthorization::AllowedAlways,
                connect: ConnectBehaviour::Success {
                    after: Duration::ZERO,
                },
                disconnect: DisconnectBehaviour::Success,
                connection_events: ConnectionEventBehaviour::Idle,
                peripherals: BTreeMap::new(),
                advertising: Vec::new(),
                initializations: Vec::new(),
                calls: Vec::new(),
            })),
        });
        (transport, receiver)
    }

    /// Change the reported state without emitting an event
    pub fn set_state(&self, state: ManagerState) {
        lock(&self.state).manager_state = state;
    }

    /// Change the reported state and emit `StateUpdated`
    pub fn update_state(&self, state: ManagerState) {
        self.set_state(state);
        self.emit(CentralEvent::StateUpdated(state));
    }

    /// Power off now and power on (with an event) once `after` elapses
    pub fn power_on_after(&self, after: Duration) {
        self.set_state(ManagerState::PoweredOff);
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        run_after(after, move || {
            lock(&state).manager_state = ManagerState::PoweredOn;
            emit(&events, CentralEvent::StateUpdated(ManagerState::PoweredOn));
        });
    }

    pub fn set_authorization(&self, authorization: ManagerAuthorization) {
        lock(&self.state).authorization = authorization;
    }

    pub fn set_connect_behaviour(&self, behaviour: ConnectBehaviour) {
        lock(&self.state).connect = behaviour;
    }

    pub fn set_disconnect_behaviour(&self, behaviour: DisconnectBehaviour) {
        lock(&self.state).disconnect = behaviour;
    }

    pub fn set_connection_event_behaviour(&self, behaviour: ConnectionEventBehaviour) {
        lock(&self.state).connection_events = behaviour;
    }

    /// Make `peripheral` resolvable by identifier and route its events here
    pub fn add_peripheral(&self, peripheral: &Arc<MockPeripheral>) {
        peripheral.attach(self.events.clone());
        lock(&self.state)
            .peripherals
            .insert(peripheral.identifier(), Arc::clone(peripheral));
    }

    /// Report `peripheral` on every subsequent scan start
    pub fn advertise(&self, peripheral: &Arc<MockPeripheral>, advertisement: AdvertisementData, rssi: i16) {
        self.add_peripheral(peripheral);
        lock(&self.state)
            .advertising
            .push((Arc::clone(peripheral), advertisement, rssi));
    }

    /// Emit a single discovery event for `peripheral`
    pub fn discover(&self, peripheral: &Arc<MockPeripheral>, advertisement: AdvertisementData, rssi: i16) {
        self.add_peripheral(peripheral);
        let handle: PeripheralHandle = Arc::clone(peripheral) as PeripheralHandle;
        self.emit(CentralEvent::Discovered {
            peripheral: handle,
            advertisement,
            rssi,
        });
    }

    pub fn peripheral(&self, identifier: &Uuid) -> Option<Arc<MockPeripheral>> {
        lock(&self.state).peripherals.get(identifier).cloned()
    }

    /// Deliver an arbitrary event as if the radio reported it
    pub fn emit(&self, event: CentralEvent) {
        emit(&self.events, event);
    }

    pub fn calls(&self) -> Vec<CentralCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count_calls<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CentralCall) -> bool,
    {
        lock(&self.state).calls.iter().filter(|call| predicate(call)).count()
    }

    /// Options received through `initialize`, one entry per manager built
    pub fn initializations(&self) -> Vec<ManagerOptions> {
        lock(&self.state).initializations.clone()
    }

    fn record(&self, call: CentralCall) {
        lock(&self.state).calls.push(call);
    }
}

impl ManagerStateProvider for MockCentralTransport {
    fn state(&self) -> ManagerState {
        lock(&self.state).manager_state
    }

    fn authorization(&self) -> ManagerAuthorization {
        lock(&self.state).authorization
    }
}

impl CentralTransport for MockCentralTransport {
    fn initialize(&self, options: &ManagerOptions) {
        lock(&self.state).initializations.push(options.clone());
    }

    fn scan_for_peripherals(&self, services: Option<&[Uuid]>, options: &ScanOptions) {
        self.record(CentralCall::ScanForPeripherals {
            services: services.map(<[Uuid]>::to_vec),
            options: options.clone(),
        });
        let advertising = lock(&self.state).advertising.clone();
        for (peripheral, advertisement, rssi) in advertising {
            self.emit(CentralEvent::Discovered {
                peripheral: peripheral as PeripheralHandle,
                advertisement,
                rssi,
            });
        }
    }

    fn stop_scan(&self) {
        self.record(CentralCall::StopScan);
    }

    fn connect(&self, peripheral: &PeripheralHandle, _options: &ConnectOptions) {
        let identifier = peripheral.identifier();
        self.record(CentralCall::Connect(identifier));
        let (behaviour, mock) = {
            let state = lock(&self.state);
            (state.connect.clone(), state.peripherals.get(&identifier).cloned())
        };
        if let Some(mock) = &mock {
            mock.set_state(PeripheralState::Connecting);
        }
        let events = self.events.clone();
        match behaviour {
            ConnectBehaviour::Success { after } => run_after(after, move || {
                if let Some(mock) = mock {
                    mock.set_state(PeripheralState::Connected);
                }
                emit(&events, CentralEvent::Connected { identifier });
            }),
            ConnectBehaviour::Failure { error } => {
                if let Some(mock) = mock {
                    mock.set_state(PeripheralState::Disconnected);
                }
                emit(&events, CentralEvent::FailedToConnect { identifier, error });
            }
            ConnectBehaviour::Silent => {}
        }
    }

    fn cancel_connection(&self, peripheral: &PeripheralHandle) {
        let identifier = peripheral.identifier();
        self.record(CentralCall::CancelConnection(identifier));
        let (behaviour, mock) = {
            let state = lock(&self.state);
            (state.disconnect, state.peripherals.get(&identifier).cloned())
        };
        let after = match behaviour {
            DisconnectBehaviour::Success => Duration::ZERO,
            DisconnectBehaviour::SuccessAfter(after) => after,
            DisconnectBehaviour::Silent => return,
        };
        if let Some(mock) = &mock {
            mock.set_state(PeripheralState::Disconnecting);
        }
        let events = self.events.clone();
        run_after(after, move || {
            if let Some(mock) = mock {
                mock.set_state(PeripheralState::Disconnected);
            }
            emit(
                &events,
                CentralEvent::Disconnected {
                    identifier,
                    error: None,
                },
            );
        });
    }

    fn retrieve_peripherals(&self, identifiers: &[Uuid]) -> Vec<PeripheralHandle> {
        self.record(CentralCall::RetrievePeripherals(identifiers.to_vec()));
        let state = lock(&self.state);
        identifiers
            .iter()
            .filter_map(|identifier| state.peripherals.get(identifier))
            .map(|peripheral| Arc::clone(peripheral) as PeripheralHandle)
            .collect()
    }

    fn retrieve_connected_peripherals(&self, services: &[Uuid]) -> Vec<PeripheralHandle> {
        self.record(CentralCall::RetrieveConnectedPeripherals(services.to_vec()));
        let state = lock(&self.state);
        state
            .peripherals
            .values()
            .filter(|peripheral| peripheral.state() == PeripheralState::Connected)
            .filter(|peripheral| {
                services.is_empty()
                    || peripheral
                        .services()
                        .iter()
                        .any(|service| services.contains(&service.uuid))
            })
            .map(|peripheral| Arc::clone(peripheral) as PeripheralHandle)
            .collect()
    }

    fn register_for_connection_events(&self, options: &ConnectionEventOptions) {
        self.record(CentralCall::RegisterForConnectionEvents(options.clone()));
        let behaviour = lock(&self.state).connection_events;
        if let ConnectionEventBehaviour::Generate { event, after } = behaviour {
            let peripheral = MockPeripheral::new();
            peripheral.set_name("ConnectionEventTest");
            let events = self.events.clone();
            run_after(after, move || {
                emit(
                    &events,
                    CentralEvent::ConnectionEvent {
                        event,
                        peripheral: peripheral as PeripheralHandle,
                    },
                );
            });
        }
    }
}

impl fmt::Debug for MockCentralTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MockCentralTransport")
            .field("state", &state.manager_state)
            .field("peripherals", &state.peripherals.keys().collect::<Vec<_>>())
            .finish()
    }
}
