//! Mock remote peripheral

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use able_core::{
    lock, CentralEvent, Characteristic, CharacteristicId, CharacteristicProperties,
    PeripheralEvent, PeripheralState, PeripheralTransport, Service, TransportError, WriteType,
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::{emit, run_after};

/// Value reported by a successful `read_rssi`
pub const MOCK_RSSI: i16 = -30;

/// Value reported by `maximum_write_length` for either write type
pub const MOCK_MAXIMUM_WRITE_LENGTH: usize = 100;

// ----------------------------------------------------------------------------
// Behaviours
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum DiscoverServicesBehaviour {
    /// Expose `services` and report success after `after`
    Success { services: Vec<Service>, after: Duration },
    /// Report an error immediately
    Failure,
    /// Never report back
    Silent,
}

#[derive(Debug, Clone)]
pub enum DiscoverCharacteristicsBehaviour {
    /// Replace the exposed copy of `service` and report success after `after`
    Success { service: Service, after: Duration },
    Failure,
    Silent,
}

/// Outcome of read, write, notify and RSSI requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationBehaviour {
    Success,
    Failure,
    Silent,
}

/// Calls recorded by [`MockPeripheral`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralCall {
    DiscoverServices(Option<Vec<Uuid>>),
    DiscoverCharacteristics {
        filter: Option<Vec<Uuid>>,
        service: Uuid,
    },
    ReadValue(CharacteristicId),
    WriteValue {
        data: Vec<u8>,
        characteristic: CharacteristicId,
        write_type: WriteType,
    },
    SetNotifyValue {
        enabled: bool,
        characteristic: CharacteristicId,
    },
    ReadRssi,
}

// ----------------------------------------------------------------------------
// Mock Peripheral
// ----------------------------------------------------------------------------

struct MockPeripheralState {
    name: Option<String>,
    state: PeripheralState,
    services: Vec<Service>,
    values: HashMap<CharacteristicId, Vec<u8>>,
    discover_services: DiscoverServicesBehaviour,
    discover_characteristics: DiscoverCharacteristicsBehaviour,
    read: OperationBehaviour,
    write: OperationBehaviour,
    notify: OperationBehaviour,
    rssi: OperationBehaviour,
    calls: Vec<PeripheralCall>,
    sink: Option<UnboundedSender<CentralEvent>>,
}

/// Scriptable stand-in for a remote peripheral's connection
///
/// Events are wrapped in [`CentralEvent::Peripheral`] and sent to whichever
/// channel was attached last, usually by [`crate::MockCentralTransport`].
/// Delayed outcomes are spawned on the ambient tokio runtime.
pub struct MockPeripheral {
    identifier: Uuid,
    state: Arc<Mutex<MockPeripheralState>>,
}

impl MockPeripheral {
    pub fn new() -> Arc<Self> {
        Self::with_identifier(Uuid::new_v4())
    }

    pub fn with_identifier(identifier: Uuid) -> Arc<Self> {
        Arc::new(Self {
            identifier,
            state: Arc::new(Mutex::new(MockPeripheralState {
                name: None,
                state: PeripheralState::Disconnected,
                services: Vec::new(),
                values: HashMap::new(),
                discover_services: DiscoverServicesBehaviour::Success {
                    services: Vec::new(),
                    after: Duration::ZERO,
                },
                discover_characteristics: DiscoverCharacteristicsBehaviour::Failure,
                read: OperationBehaviour::Success,
                write: OperationBehaviour::Success,
                notify: OperationBehaviour::Success,
                rssi: OperationBehaviour::Success,
                calls: Vec::new(),
                sink: None,
            })),
        })
    }

    /// Route this peripheral's events into `sender`
    pub fn attach(&self, sender: UnboundedSender<CentralEvent>) {
        lock(&self.state).sink = Some(sender);
    }

    /// Attach a fresh channel and return its receiving end
    pub fn subscribe(&self) -> UnboundedReceiver<CentralEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.attach(sender);
        receiver
    }

    pub fn set_name(&self, name: impl Into<String>) {
        lock(&self.state).name = Some(name.into());
    }

    pub fn set_state(&self, state: PeripheralState) {
        lock(&self.state).state = state;
    }

    pub fn set_services(&self, services: Vec<Service>) {
        lock(&self.state).services = services;
    }

    /// Value returned by subsequent reads of `characteristic`
    pub fn set_value(&self, characteristic: CharacteristicId, value: Vec<u8>) {
        lock(&self.state).values.insert(characteristic, value);
    }

    pub fn set_discover_services_behaviour(&self, behaviour: DiscoverServicesBehaviour) {
        lock(&self.state).discover_services = behaviour;
    }

    pub fn set_discover_characteristics_behaviour(
        &self,
        behaviour: DiscoverCharacteristicsBehaviour,
    ) {
        lock(&self.state).discover_characteristics = behaviour;
    }

    pub fn set_read_behaviour(&self, behaviour: OperationBehaviour) {
        lock(&self.state).read = behaviour;
    }

    pub fn set_write_behaviour(&self, behaviour: OperationBehaviour) {
        lock(&self.state).write = behaviour;
    }

    pub fn set_notify_behaviour(&self, behaviour: OperationBehaviour) {
        lock(&self.state).notify = behaviour;
    }

    pub fn set_rssi_behaviour(&self, behaviour: OperationBehaviour) {
        lock(&self.state).rssi = behaviour;
    }

    pub fn calls(&self) -> Vec<PeripheralCall> {
        lock(&self.state).calls.clone()
    }

    /// Push an unsolicited notification for `characteristic`
    pub fn notify(&self, characteristic: CharacteristicId, value: Vec<u8>) {
        let characteristic = snapshot_of(characteristic, Some(value)).with_notifying(true);
        self.emit(PeripheralEvent::UpdatedValue {
            characteristic,
            error: None,
        });
    }

    /// Deliver an arbitrary event as if the radio reported it
    pub fn emit(&self, event: PeripheralEvent) {
        deliver(&self.state, self.identifier, event);
    }

    fn record(&self, call: PeripheralCall) {
        lock(&self.state).calls.push(call);
    }

    fn value_of(&self, characteristic: &CharacteristicId) -> Vec<u8> {
        lock(&self.state)
            .values
            .get(characteristic)
            .cloned()
            .unwrap_or_default()
    }
}

fn deliver(state: &Mutex<MockPeripheralState>, identifier: Uuid, event: PeripheralEvent) {
    let sink = lock(state).sink.clone();
    if let Some(sink) = sink {
        emit(&sink, CentralEvent::Peripheral { identifier, event });
    }
}

fn snapshot_of(id: CharacteristicId, value: Option<Vec<u8>>) -> Characteristic {
    let mut characteristic = Characteristic::new(
        id.service,
        id.characteristic,
        CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
    );
    characteristic.value = value;
    characteristic
}

fn mock_error(message: &str) -> Option<TransportError> {
    Some(TransportError::new(message))
}

impl PeripheralTransport for MockPeripheral {
    fn identifier(&self) -> Uuid {
        self.identifier
    }

    fn name(&self) -> Option<String> {
        lock(&self.state).name.clone()
    }

    fn state(&self) -> PeripheralState {
        lock(&self.state).state
    }

    fn services(&self) -> Vec<Service> {
        lock(&self.state).services.clone()
    }

    fn discover_services(&self, filter: Option<&[Uuid]>) {
        self.record(PeripheralCall::DiscoverServices(filter.map(<[Uuid]>::to_vec)));
        let behaviour = lock(&self.state).discover_services.clone();
        match behaviour {
            DiscoverServicesBehaviour::Success { services, after } => {
                let state = Arc::clone(&self.state);
                let identifier = self.identifier;
                run_after(after, move || {
                    lock(&state).services = services;
                    deliver(&state, identifier, PeripheralEvent::DiscoveredServices { error: None });
                });
            }
            DiscoverServicesBehaviour::Failure => self.emit(PeripheralEvent::DiscoveredServices {
                error: mock_error("discovery failed"),
            }),
            DiscoverServicesBehaviour::Silent => {}
        }
    }

    fn discover_characteristics(&self, filter: Option<&[Uuid]>, service: Uuid) {
        self.record(PeripheralCall::DiscoverCharacteristics {
            filter: filter.map(<[Uuid]>::to_vec),
            service,
        });
        let behaviour = lock(&self.state).discover_characteristics.clone();
        match behaviour {
            DiscoverCharacteristicsBehaviour::Success { service, after } => {
                let state = Arc::clone(&self.state);
                let identifier = self.identifier;
                run_after(after, move || {
                    let uuid = service.uuid;
                    {
                        let mut state = lock(&state);
                        state.services.retain(|existing| existing.uuid != uuid);
                        state.services.push(service);
                    }
                    deliver(
                        &state,
                        identifier,
                        PeripheralEvent::DiscoveredCharacteristics {
                            service: uuid,
                            error: None,
                        },
                    );
                });
            }
            DiscoverCharacteristicsBehaviour::Failure => {
                self.emit(PeripheralEvent::DiscoveredCharacteristics {
                    service,
                    error: mock_error("discovery failed"),
                })
            }
            DiscoverCharacteristicsBehaviour::Silent => {}
        }
    }

    fn read_value(&self, characteristic: &CharacteristicId) {
        self.record(PeripheralCall::ReadValue(*characteristic));
        let behaviour = lock(&self.state).read;
        let (value, error) = match behaviour {
            OperationBehaviour::Success => (Some(self.value_of(characteristic)), None),
            OperationBehaviour::Failure => (None, mock_error("read failed")),
            OperationBehaviour::Silent => return,
        };
        self.emit(PeripheralEvent::UpdatedValue {
            characteristic: snapshot_of(*characteristic, value),
            error,
        });
    }

    fn write_value(&self, data: &[u8], characteristic: &CharacteristicId, write_type: WriteType) {
        self.record(PeripheralCall::WriteValue {
            data: data.to_vec(),
            characteristic: *characteristic,
            write_type,
        });
        let behaviour = lock(&self.state).write;
        // Reported for both write types so tests can check unsolicited events are ignored
        let error = match behaviour {
            OperationBehaviour::Success => {
                lock(&self.state).values.insert(*characteristic, data.to_vec());
                None
            }
            OperationBehaviour::Failure => mock_error("write failed"),
            OperationBehaviour::Silent => return,
        };
        self.emit(PeripheralEvent::WroteValue {
            characteristic: *characteristic,
            error,
        });
    }

    fn set_notify_value(&self, enabled: bool, characteristic: &CharacteristicId) {
        self.record(PeripheralCall::SetNotifyValue {
            enabled,
            characteristic: *characteristic,
        });
        let behaviour = lock(&self.state).notify;
        match behaviour {
            OperationBehaviour::Success => {
                self.emit(PeripheralEvent::UpdatedNotificationState {
                    characteristic: snapshot_of(*characteristic, None).with_notifying(enabled),
                    error: None,
                });
                if enabled {
                    let value = self.value_of(characteristic);
                    self.notify(*characteristic, value);
                }
            }
            OperationBehaviour::Failure => {
                self.emit(PeripheralEvent::UpdatedNotificationState {
                    characteristic: snapshot_of(*characteristic, None),
                    error: mock_error("notification state update failed"),
                })
            }
            OperationBehaviour::Silent => {}
        }
    }

    fn read_rssi(&self) {
        self.record(PeripheralCall::ReadRssi);
        let behaviour = lock(&self.state).rssi;
        let event = match behaviour {
            OperationBehaviour::Success => PeripheralEvent::ReadRssi {
                rssi: MOCK_RSSI,
                error: None,
            },
            OperationBehaviour::Failure => PeripheralEvent::ReadRssi {
                rssi: 0,
                error: mock_error("rssi read failed"),
            },
            OperationBehaviour::Silent => return,
        };
        self.emit(event);
    }

    fn maximum_write_length(&self, _write_type: WriteType) -> usize {
        MOCK_MAXIMUM_WRITE_LENGTH
    }
}

impl fmt::Debug for MockPeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPeripheral")
            .field("identifier", &self.identifier)
            .finish()
    }
}
