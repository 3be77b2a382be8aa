//! Integration tests for the central-role manager
//!
//! Every test runs under paused virtual time. Deadlines are checked by
//! sleeping slightly past them so a timer and an assertion never race.


use std::sync::Arc;
use std::time::Duration;

use able_central::{ConnectRequest, Peripheral, ScanRequest};
use able_core::{
    AbleError, AdvertisementData, CentralEvent, CentralManagerConfig, ConnectionEvent,
    ConnectionEventOptions, KnownPeripheralStore, ManagerOptions, ManagerState, MemoryStore,
    PeripheralHandle, PeripheralState, PeripheralTransport, Result, TransportError,
};
use able_harness::{
    CentralCall, ConnectBehaviour, ConnectionEventBehaviour, DisconnectBehaviour,
    MockCentralTransport, MockPeripheral,
};
use test_utils::{fixture, fixture_on, fixture_with, settle, short_uuid, Outcomes};
use tokio_test::assert_ok;
use uuid::Uuid;

fn is_cancel(call: &CentralCall) -> bool {
    matches!(call, CentralCall::CancelConnection(_))
}

// ----------------------------------------------------------------------------
// State Wait Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_wait_for_matching_state_completes_synchronously() {
    let fx = fixture();
    let outcome: Outcomes<ManagerState> = Outcomes::new();

    fx.manager.wait_for_powered_on(None, outcome.sink());

    // Delivered before the call returned, without arming a timer
    assert_eq!(outcome.all(), vec![ManagerState::PoweredOn]);
    let pending = fx.manager.pending_attempts();
    assert_eq!(pending.state_waits, 0);
    assert_eq!(pending.armed_timers, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_state_times_out_with_current_state() {
    let fx = fixture();
    fx.transport.set_state(ManagerState::PoweredOff);
    let outcome: Outcomes<ManagerState> = Outcomes::new();

    fx.manager
        .wait_for_powered_on(Some(Duration::from_secs(1)), outcome.sink());
    assert_eq!(fx.manager.pending_attempts().state_waits, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(outcome.is_empty());

    tokio::time::sleep(Duration::from_millis(550)).await;
    assert_eq!(outcome.all(), vec![ManagerState::PoweredOff]);
    assert_eq!(fx.manager.pending_attempts().state_waits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_state_uses_configured_timeout() {
    let config = CentralManagerConfig::default().with_state_wait_timeout(Duration::from_secs(5));
    let fx = fixture_with(config, Arc::new(MemoryStore::new()));
    fx.transport.set_state(ManagerState::Resetting);
    let outcome: Outcomes<ManagerState> = Outcomes::new();

    fx.manager.wait_for_powered_on(None, outcome.sink());

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert!(outcome.is_empty());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(outcome.all(), vec![ManagerState::Resetting]);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_state_resolved_by_power_on() {
    let fx = fixture();
    let updates: Outcomes<ManagerState> = Outcomes::new();
    fx.manager.on_state_update(updates.callback());

    fx.transport.power_on_after(Duration::from_millis(500));
    let first: Outcomes<ManagerState> = Outcomes::new();
    let second: Outcomes<ManagerState> = Outcomes::new();
    fx.manager
        .wait_for_powered_on(Some(Duration::from_secs(3)), first.sink());
    fx.manager
        .wait_for_powered_on(Some(Duration::from_secs(3)), second.sink());
    assert_eq!(fx.manager.pending_attempts().state_waits, 2);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(first.all(), vec![ManagerState::PoweredOn]);
    assert_eq!(second.all(), vec![ManagerState::PoweredOn]);
    assert_eq!(updates.all(), vec![ManagerState::PoweredOn]);

    // The deadline passing later must not deliver a second outcome
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(fx.manager.pending_attempts().armed_timers, 0);
}

#[tokio::test(start_paused = true)]
async fn test_state_update_only_resolves_matching_waits() {
    let fx = fixture();
    fx.transport.set_state(ManagerState::Unknown);
    let powered_on: Outcomes<ManagerState> = Outcomes::new();
    let unauthorized: Outcomes<ManagerState> = Outcomes::new();
    fx.manager
        .wait_for_state(ManagerState::PoweredOn, Some(Duration::from_secs(2)), powered_on.sink());
    fx.manager.wait_for_state(
        ManagerState::Unauthorized,
        Some(Duration::from_secs(2)),
        unauthorized.sink(),
    );

    fx.transport.update_state(ManagerState::Unauthorized);
    settle().await;
    assert!(powered_on.is_empty());
    assert_eq!(unauthorized.all(), vec![ManagerState::Unauthorized]);

    tokio::time::sleep(Duration::from_millis(2_050)).await;
    assert_eq!(powered_on.all(), vec![ManagerState::Unauthorized]);
}

// ----------------------------------------------------------------------------
// Scan Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_scan_fails_fast_when_powered_off() {
    let fx = fixture();
    fx.transport.set_state(ManagerState::PoweredOff);
    let outcome: Outcomes<Result<Vec<Peripheral>>> = Outcomes::new();

    fx.manager.scan_for_peripherals(
        ScanRequest::new().with_timeout(Duration::from_secs(3), outcome.sink()),
    );

    assert_eq!(
        outcome.single().unwrap_err(),
        AbleError::BluetoothNotAvailable(ManagerState::PoweredOff)
    );
    assert!(!fx.manager.is_scanning());
    assert_eq!(
        fx.transport
            .count_calls(|call| matches!(call, CentralCall::ScanForPeripherals { .. })),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_scan_timeout_returns_empty_list() {
    let fx = fixture();
    let outcome: Outcomes<Result<Vec<Peripheral>>> = Outcomes::new();

    fx.manager.scan_for_peripherals(
        ScanRequest::new().with_timeout(Duration::from_secs(3), outcome.sink()),
    );
    assert!(fx.manager.is_scanning());

    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert!(outcome.is_empty());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(outcome.single().unwrap().is_empty());
    assert!(!fx.manager.is_scanning());
    assert_eq!(
        fx.transport
            .count_calls(|call| matches!(call, CentralCall::StopScan)),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_scan_reports_discoveries() {
    let fx = fixture();
    let service = short_uuid(0x180d);
    let mock = MockPeripheral::new();
    fx.transport.advertise(
        &mock,
        AdvertisementData::new()
            .with_local_name("HRM")
            .with_service_uuids(vec![service]),
        -42,
    );

    let discovered: Outcomes<Peripheral> = Outcomes::new();
    let sink = discovered.callback();
    let outcome: Outcomes<Result<Vec<Peripheral>>> = Outcomes::new();
    fx.manager.scan_for_peripherals(
        ScanRequest::new()
            .with_services(vec![service])
            .on_discovery(move |peripheral: &Peripheral| sink(peripheral.clone()))
            .with_timeout(Duration::from_secs(3), outcome.sink()),
    );
    settle().await;

    let peripheral = discovered.single();
    assert_eq!(peripheral.identifier(), mock.identifier());
    assert_eq!(peripheral.rssi(), -42);
    assert_eq!(peripheral.advertisement().local_name.as_deref(), Some("HRM"));
    assert!(fx.manager.known_identifiers().contains(&mock.identifier()));
    assert_eq!(
        fx.transport.calls()[0],
        CentralCall::ScanForPeripherals {
            services: Some(vec![service]),
            options: Default::default(),
        }
    );

    tokio::time::sleep(Duration::from_millis(3_050)).await;
    let found = outcome.single().unwrap();
    assert_eq!(found, vec![peripheral]);
}

#[tokio::test(start_paused = true)]
async fn test_rediscovery_reuses_instance_and_refreshes_snapshot() {
    let fx = fixture();
    let (mock, peripheral) = fx.discover().await;
    assert_eq!(peripheral.rssi(), -50);

    fx.transport.discover(&mock, AdvertisementData::new(), -70);
    settle().await;

    assert_eq!(fx.manager.found_peripherals().len(), 1);
    // Clones share state, so the earlier handle sees the refresh
    assert_eq!(peripheral.rssi(), -70);
}

#[tokio::test(start_paused = true)]
async fn test_new_scan_supersedes_previous_scan() {
    let fx = fixture();
    let first: Outcomes<Result<Vec<Peripheral>>> = Outcomes::new();
    let second: Outcomes<Result<Vec<Peripheral>>> = Outcomes::new();

    fx.manager.scan_for_peripherals(
        ScanRequest::new().with_timeout(Duration::from_secs(3), first.sink()),
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    fx.manager.scan_for_peripherals(
        ScanRequest::new().with_timeout(Duration::from_secs(3), second.sink()),
    );

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert!(first.is_empty());
    assert!(second.is_empty());

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(first.is_empty());
    assert_ok!(second.single());
}

#[tokio::test(start_paused = true)]
async fn test_stop_scan_discards_pending_timeout() {
    let fx = fixture();
    let outcome: Outcomes<Result<Vec<Peripheral>>> = Outcomes::new();
    fx.manager.scan_for_peripherals(
        ScanRequest::new().with_timeout(Duration::from_secs(3), outcome.sink()),
    );

    fx.manager.stop_scan();
    assert!(!fx.manager.is_scanning());
    assert_eq!(fx.manager.pending_attempts().scans, 0);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(outcome.is_empty());

    // Stopping again is harmless
    fx.manager.stop_scan();
}

#[tokio::test(start_paused = true)]
async fn test_discovery_after_stop_scan_skips_callback() {
    let fx = fixture();
    let discovered: Outcomes<Peripheral> = Outcomes::new();
    let sink = discovered.callback();
    fx.manager.scan_for_peripherals(
        ScanRequest::new().on_discovery(move |peripheral: &Peripheral| sink(peripheral.clone())),
    );
    fx.manager.stop_scan();

    let (_mock, _peripheral) = fx.discover().await;
    assert!(discovered.is_empty());
    assert_eq!(fx.manager.found_peripherals().len(), 1);
}

// ----------------------------------------------------------------------------
// Connect Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_connect_success_tracks_connection() {
    let fx = fixture();
    let (mock, peripheral) = fx.connected().await;

    assert!(peripheral.is_connected());
    assert_eq!(fx.manager.pending_attempts().connects, 0);
    assert_eq!(fx.manager.pending_attempts().connections, 1);
    assert!(fx
        .transport
        .calls()
        .contains(&CentralCall::Connect(mock.identifier())));
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_wins_over_late_success() {
    let fx = fixture();
    let (mock, peripheral) = fx.discover().await;
    fx.transport.set_connect_behaviour(ConnectBehaviour::Success {
        after: Duration::from_millis(1_500),
    });
    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();

    fx.manager.connect(
        &peripheral,
        ConnectRequest::new().with_attempt_timeout(Duration::from_secs(1)),
        outcome.sink(),
    );

    tokio::time::sleep(Duration::from_millis(1_050)).await;
    assert_eq!(
        outcome.single().unwrap_err(),
        AbleError::ConnectionTimeoutReached
    );
    assert_eq!(fx.transport.count_calls(is_cancel), 1);

    // The radio connects afterwards; nothing is pending so nothing is reported
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(outcome.len(), 1);
    assert_eq!(fx.manager.pending_attempts().connects, 0);
    assert_eq!(mock.state(), PeripheralState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_supersedes_first() {
    let fx = fixture();
    let (mock, peripheral) = fx.discover().await;
    fx.transport.set_connect_behaviour(ConnectBehaviour::Silent);
    let first: Outcomes<Result<Peripheral>> = Outcomes::new();
    let second: Outcomes<Result<Peripheral>> = Outcomes::new();

    fx.manager.connect(
        &peripheral,
        ConnectRequest::new().with_attempt_timeout(Duration::from_secs(1)),
        first.sink(),
    );
    fx.manager
        .connect(&peripheral, ConnectRequest::new(), second.sink());
    assert_eq!(fx.manager.pending_attempts().connects, 1);

    fx.transport.emit(CentralEvent::Connected {
        identifier: mock.identifier(),
    });
    settle().await;
    assert_eq!(second.single().unwrap(), peripheral);

    // The superseded attempt's deadline was invalidated with it
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(first.is_empty());
    assert_eq!(fx.transport.count_calls(is_cancel), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_forgets_identifier() {
    let fx = fixture();
    let (mock, peripheral) = fx.discover().await;
    assert!(fx.manager.known_identifiers().contains(&mock.identifier()));
    fx.transport.set_connect_behaviour(ConnectBehaviour::Failure {
        error: Some(TransportError::with_code(14, "peer removed pairing")),
    });
    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();

    fx.manager
        .connect(&peripheral, ConnectRequest::new(), outcome.sink());
    settle().await;

    match outcome.single() {
        Err(AbleError::ConnectionFailed(Some(error))) => assert_eq!(error.code, Some(14)),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!fx.manager.known_identifiers().contains(&mock.identifier()));
}

#[tokio::test(start_paused = true)]
async fn test_connection_lifetime_disconnects_automatically() {
    let fx = fixture();
    let (_mock, peripheral) = fx.discover().await;
    let disconnects: Outcomes<Peripheral> = Outcomes::new();
    let sink = disconnects.callback();
    fx.manager
        .on_disconnect(move |peripheral: &Peripheral, _error: Option<&TransportError>| {
            sink(peripheral.clone())
        });

    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();
    fx.manager.connect(
        &peripheral,
        ConnectRequest::new().with_connection_timeout(Duration::from_secs(2)),
        outcome.sink(),
    );
    settle().await;
    assert_ok!(outcome.single());
    assert_eq!(fx.manager.pending_attempts().armed_timers, 1);

    tokio::time::sleep(Duration::from_millis(1_900)).await;
    assert_eq!(fx.transport.count_calls(is_cancel), 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(fx.transport.count_calls(is_cancel), 1);
    assert_eq!(disconnects.all(), vec![peripheral]);
    assert_eq!(fx.manager.pending_attempts().connections, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_disconnect_drops_lifetime_record() {
    let fx = fixture();
    let (mock, peripheral) = fx.discover().await;
    let errors: Outcomes<Option<TransportError>> = Outcomes::new();
    let sink = errors.callback();
    fx.manager
        .on_disconnect(move |_peripheral: &Peripheral, error: Option<&TransportError>| {
            sink(error.cloned())
        });

    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();
    fx.manager.connect(
        &peripheral,
        ConnectRequest::new().with_connection_timeout(Duration::from_secs(5)),
        outcome.sink(),
    );
    settle().await;

    let error = TransportError::new("link supervision timeout");
    fx.transport.emit(CentralEvent::Disconnected {
        identifier: mock.identifier(),
        error: Some(error.clone()),
    });
    settle().await;

    assert_eq!(errors.all(), vec![Some(error)]);
    assert_eq!(fx.manager.pending_attempts().connections, 0);
    assert_eq!(fx.manager.pending_attempts().armed_timers, 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(fx.transport.count_calls(is_cancel), 0);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_disconnect_cancels_lifetime_timer() {
    let fx = fixture();
    fx.transport.set_disconnect_behaviour(DisconnectBehaviour::Silent);
    let (_mock, peripheral) = fx.discover().await;

    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();
    fx.manager.connect(
        &peripheral,
        ConnectRequest::new().with_connection_timeout(Duration::from_secs(2)),
        outcome.sink(),
    );
    settle().await;
    assert_ok!(outcome.single());
    assert_eq!(fx.manager.pending_attempts().armed_timers, 1);

    fx.manager.disconnect(&peripheral);
    assert_eq!(fx.manager.pending_attempts().connections, 0);
    assert_eq!(fx.manager.pending_attempts().armed_timers, 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(fx.transport.count_calls(is_cancel), 1);
}

// ----------------------------------------------------------------------------
// Disconnect Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_disconnect_with_reports_confirmation() {
    let fx = fixture();
    let (_mock, peripheral) = fx.connected().await;
    fx.transport
        .set_disconnect_behaviour(DisconnectBehaviour::SuccessAfter(Duration::from_millis(200)));
    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();

    fx.manager.disconnect_with(&peripheral, outcome.sink());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(outcome.is_empty());
    assert_eq!(fx.manager.pending_attempts().disconnects, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(outcome.single().unwrap(), peripheral);
    assert!(!peripheral.is_connected());
    assert_eq!(fx.manager.pending_attempts().disconnects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_with_reports_transport_error() {
    let fx = fixture();
    let (mock, peripheral) = fx.connected().await;
    fx.transport
        .set_disconnect_behaviour(DisconnectBehaviour::Silent);
    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();

    fx.manager.disconnect_with(&peripheral, outcome.sink());
    let error = TransportError::new("connection terminated locally");
    fx.transport.emit(CentralEvent::Disconnected {
        identifier: mock.identifier(),
        error: Some(error.clone()),
    });
    settle().await;

    assert_eq!(outcome.single().unwrap_err(), AbleError::Transport(error));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_all_cancels_every_tracked_peripheral() {
    let fx = fixture();
    fx.discover().await;
    fx.discover().await;
    fx.discover().await;

    fx.manager.disconnect_all();

    assert_eq!(fx.transport.count_calls(is_cancel), 3);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_disconnects_everything() {
    let fx = fixture();
    let (_mock, _peripheral) = fx.connected().await;
    let transport = Arc::clone(&fx.transport);

    drop(fx.manager);

    assert_eq!(transport.count_calls(is_cancel), 1);
}

// ----------------------------------------------------------------------------
// Known Peripheral Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_known_identifiers_survive_restart_as_cached() {
    let store = MemoryStore::new();
    let mock = MockPeripheral::new();

    {
        let fx = fixture_with(CentralManagerConfig::default(), Arc::new(store.clone()));
        fx.transport.discover(&mock, AdvertisementData::new(), -60);
        settle().await;
        assert_eq!(fx.manager.found_peripherals().len(), 1);
    }

    let (transport, events) = MockCentralTransport::new();
    transport.add_peripheral(&mock);
    let fx = fixture_on(
        transport,
        events,
        CentralManagerConfig::default(),
        Arc::new(store.clone()),
    );

    assert!(fx.manager.found_peripherals().is_empty());
    let cached = fx.manager.cached_peripherals();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].identifier(), mock.identifier());
    assert_eq!(
        fx.transport.calls()[0],
        CentralCall::RetrievePeripherals(vec![mock.identifier()])
    );

    // Rediscovery moves it from cached to found
    fx.transport.discover(&mock, AdvertisementData::new(), -55);
    settle().await;
    assert!(fx.manager.cached_peripherals().is_empty());
    assert_eq!(fx.manager.found_peripherals().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_known_peripherals_key() {
    let store = MemoryStore::new();
    let config = CentralManagerConfig::default().with_known_peripherals_key("tests.known");
    let fx = fixture_with(config, Arc::new(store.clone()));

    let (mock, _peripheral) = fx.discover().await;

    assert_eq!(
        store.load("tests.known").unwrap(),
        vec![mock.identifier().to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_forget_evicts_peripheral_and_pending_attempts() {
    let fx = fixture();
    let (mock, peripheral) = fx.discover().await;
    fx.transport.set_connect_behaviour(ConnectBehaviour::Silent);
    let outcome: Outcomes<Result<Peripheral>> = Outcomes::new();
    fx.manager.connect(
        &peripheral,
        ConnectRequest::new().with_attempt_timeout(Duration::from_secs(1)),
        outcome.sink(),
    );

    fx.manager.forget(&peripheral);

    assert!(fx.manager.peripheral(&mock.identifier()).is_none());
    assert!(fx.manager.known_identifiers().is_empty());
    assert_eq!(fx.manager.pending_attempts().connects, 0);

    fx.transport.emit(CentralEvent::Connected {
        identifier: mock.identifier(),
    });
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(outcome.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retrieve_connected_peripherals_tracks_cached() {
    let fx = fixture();
    let mock = MockPeripheral::new();
    mock.set_state(PeripheralState::Connected);
    fx.transport.add_peripheral(&mock);

    let connected = fx.manager.retrieve_connected_peripherals(&[]);

    assert_eq!(connected.len(), 1);
    assert_eq!(fx.manager.cached_peripherals(), connected);
    assert!(fx.manager.found_peripherals().is_empty());
}

// ----------------------------------------------------------------------------
// Restore and Connection Event Tests
// ----------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_restore_state_populates_cached() {
    let fx = fixture();
    let restored: Outcomes<(Vec<Uuid>, Vec<Uuid>)> = Outcomes::new();
    let sink = restored.callback();
    fx.manager.on_restore_state(move |state: &able_central::RestoredCentralState| {
        sink((
            state.peripherals.iter().map(Peripheral::identifier).collect(),
            state.scan_services.clone(),
        ))
    });

    let mock = MockPeripheral::new();
    fx.transport.add_peripheral(&mock);
    fx.transport.emit(CentralEvent::WillRestoreState {
        peripherals: vec![Arc::clone(&mock) as PeripheralHandle],
        scan_services: vec![short_uuid(0x180f)],
    });
    settle().await;

    assert_eq!(
        restored.single(),
        (vec![mock.identifier()], vec![short_uuid(0x180f)])
    );
    assert_eq!(fx.manager.cached_peripherals().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connection_events_reach_callback() {
    let fx = fixture();
    fx.transport
        .set_connection_event_behaviour(ConnectionEventBehaviour::Generate {
            event: ConnectionEvent::PeerConnected,
            after: Duration::from_millis(100),
        });
    let events: Outcomes<(ConnectionEvent, Option<String>)> = Outcomes::new();
    let sink = events.callback();
    fx.manager
        .on_connection_event(move |event: ConnectionEvent, peripheral: &Peripheral| {
            sink((event, peripheral.name()))
        });

    let options = ConnectionEventOptions {
        peripheral_uuids: Vec::new(),
        service_uuids: vec![short_uuid(0x180d)],
    };
    fx.manager.register_for_connection_events(&options);
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(
        events.single(),
        (
            ConnectionEvent::PeerConnected,
            Some("ConnectionEventTest".to_string())
        )
    );
    assert_eq!(
        fx.transport.calls(),
        vec![CentralCall::RegisterForConnectionEvents(options)]
    );
}

// ----------------------------------------------------------------------------
// Configuration Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_build_rejects_invalid_configuration() {
    let (transport, _events) = MockCentralTransport::new();
    let config = CentralManagerConfig::default().with_known_peripherals_key("  ");

    let result = able_central::CentralManager::builder(transport)
        .with_config(config)
        .build();

    assert!(matches!(
        result,
        Err(AbleError::InvalidConfiguration { .. })
    ));
}

#[tokio::test]
async fn test_build_initializes_transport_with_manager_options() {
    let (transport, events) = MockCentralTransport::new();
    let config = CentralManagerConfig::default()
        .with_restore_identifier("it.able.central")
        .with_show_power_alert(true);

    let fx = fixture_on(transport, events, config, Arc::new(MemoryStore::new()));

    assert_eq!(
        fx.transport.initializations(),
        vec![ManagerOptions {
            restore_identifier: Some("it.able.central".to_string()),
            show_power_alert: true,
        }]
    );
    assert!(fx.transport.calls().is_empty());
}

#[test]
fn test_build_requires_runtime() {
    let (transport, _events) = MockCentralTransport::new();

    let result = able_central::CentralManager::new(transport);

    assert!(matches!(result, Err(AbleError::RuntimeUnavailable)));
}
