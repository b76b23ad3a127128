// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection lifecycle through the manager and the stdio bridge.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{peer, Harness, MAS_PORT};
use mapm_manager::bridge::{BridgeInput, LinkCommand, TransportCommand};
use mapm_manager::config::ManagerConfig;
use mapm_manager::map::constants::server_flags;
use mapm_manager::map::types::{ConnectionStatus, ConnectionType};
use mapm_manager::map::ConnectionState;
use mapm_manager::{EventKind, MapError, TransportEvent};

fn server_session(harness: &mut Harness) -> u32 {
    harness
        .commands()
        .into_iter()
        .find_map(|c| match c {
            TransportCommand::OpenAccessServer { session_id, .. } => Some(session_id),
            _ => None,
        })
        .expect("server opened")
}

#[test]
fn test_register_server_requires_power() {
    let mut h = Harness::new();
    let err = h.manager.register_server(MAS_PORT, 0, 3, 0x0F, h.callback());
    assert!(matches!(err, Err(MapError::LocalDevicePoweredDown)));

    h.power_on();
    h.outputs();
    assert_eq!(h.manager.register_server(MAS_PORT, 0, 3, 0x0F, h.callback()).unwrap(), 3);
    assert!(matches!(
        h.commands().as_slice(),
        [TransportCommand::OpenAccessServer { port: MAS_PORT, .. }]
    ));

    let err = h.manager.register_server(MAS_PORT + 1, 0, 3, 0x0F, h.callback());
    assert!(matches!(err, Err(MapError::DuplicateInstanceId(3))));
}

#[test]
fn test_register_server_validates_parameters() {
    let h = Harness::powered();
    assert!(matches!(
        h.manager.register_server(0, 0, 1, 0x0F, h.callback()),
        Err(MapError::InvalidParameter(_))
    ));
    assert!(matches!(
        h.manager.register_server(MAS_PORT, 0, 256, 0x0F, h.callback()),
        Err(MapError::InvalidParameter(_))
    ));
}

#[test]
fn test_unregister_server_closes_session_and_record() {
    let mut h = Harness::powered();
    h.manager.register_server(MAS_PORT, 0, 1, 0x0F, h.callback()).unwrap();
    let session_id = server_session(&mut h);
    let handle = h.manager.register_service_record(1, "MAP MAS").unwrap();
    // Registering again keeps the existing record.
    assert_eq!(h.manager.register_service_record(1, "MAP MAS").unwrap(), handle);
    h.outputs();

    h.manager.unregister_server(1).unwrap();
    let commands = h.commands();
    assert!(commands.contains(&TransportCommand::UnregisterRecord {
        session_id,
        record_handle: handle,
    }));
    assert!(commands.contains(&TransportCommand::CloseServer { session_id }));
    assert!(matches!(h.manager.unregister_server(1), Err(MapError::InvalidServerInstance)));
}

#[test]
fn test_connect_requires_power() {
    let h = Harness::new();
    let err = h.manager.connect_remote_device(
        ConnectionType::MessageAccessClient,
        peer(),
        MAS_PORT,
        1,
        0,
        h.callback(),
    );
    assert!(matches!(err, Err(MapError::LocalDevicePoweredDown)));
    assert!(h.manager.channels().is_empty());
}

#[test]
fn test_connect_rejects_server_type() {
    let h = Harness::powered();
    let err = h.manager.connect_remote_device(
        ConnectionType::MessageAccessServer,
        peer(),
        MAS_PORT,
        1,
        0,
        h.callback(),
    );
    assert!(matches!(err, Err(MapError::InvalidParameter(_))));
}

#[test]
fn test_outgoing_connection_flow() {
    let mut h = Harness::powered();
    let id = h
        .manager
        .connect_remote_device(
            ConnectionType::MessageAccessClient,
            peer(),
            MAS_PORT,
            1,
            0,
            h.callback(),
        )
        .unwrap();

    assert_eq!(
        h.links(),
        vec![LinkCommand::Connect {
            address: peer(),
            authenticate: false,
            encrypt: false,
        }]
    );
    assert_eq!(h.manager.snapshot(id).unwrap().state, ConnectionState::ConnectingDevice);

    h.link_up(peer());
    let session_id = match h.commands().as_slice() {
        [TransportCommand::OpenRemoteAccessPort { session_id, port, .. }] => {
            assert_eq!(*port, MAS_PORT);
            *session_id
        }
        other => panic!("unexpected commands {:?}", other),
    };
    assert_eq!(h.manager.snapshot(id).unwrap().state, ConnectionState::Connecting);
    assert!(h.events().is_empty());

    h.transport(TransportEvent::OpenPortConfirmation {
        session_id,
        status: ConnectionStatus::Success,
    });
    let snapshot = h.manager.snapshot(id).unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.current_path, "");

    let events = h.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tracking_id, id);
    assert_eq!(events[0].remote_address, peer());
    assert_eq!(events[0].instance_id, 1);
    assert_eq!(
        events[0].kind,
        EventKind::ConnectionStatus {
            connection_type: ConnectionType::MessageAccessClient,
            status: ConnectionStatus::Success,
        }
    );
}

#[test]
fn test_security_flags_reach_link_manager() {
    let mut h = Harness::powered();
    let id = h
        .manager
        .connect_remote_device(
            ConnectionType::MessageAccessClient,
            peer(),
            MAS_PORT,
            1,
            0x3,
            h.callback(),
        )
        .unwrap();
    assert_eq!(
        h.links(),
        vec![LinkCommand::Connect {
            address: peer(),
            authenticate: true,
            encrypt: true,
        }]
    );
    assert_eq!(h.manager.snapshot(id).unwrap().state, ConnectionState::Encrypting);
}

#[test]
fn test_refused_open_deletes_channel() {
    let mut h = Harness::powered();
    let id = h
        .manager
        .connect_remote_device(
            ConnectionType::MessageAccessClient,
            peer(),
            MAS_PORT,
            1,
            0,
            h.callback(),
        )
        .unwrap();
    h.link_up(peer());
    let session_id = match h.commands().as_slice() {
        [TransportCommand::OpenRemoteAccessPort { session_id, .. }] => *session_id,
        other => panic!("unexpected commands {:?}", other),
    };

    h.transport(TransportEvent::OpenPortConfirmation {
        session_id,
        status: ConnectionStatus::FailureRefused,
    });
    assert!(h.manager.snapshot(id).is_none());
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::ConnectionStatus {
            connection_type: ConnectionType::MessageAccessClient,
            status: ConnectionStatus::FailureRefused,
        }]
    );
}

#[test]
fn test_duplicate_connect_is_rejected() {
    let mut h = Harness::powered();
    h.connect_client(1);
    let err = h.manager.connect_remote_device(
        ConnectionType::MessageAccessClient,
        peer(),
        MAS_PORT,
        1,
        0,
        h.callback(),
    );
    assert!(matches!(err, Err(MapError::DeviceAlreadyConnected)));

    h.manager
        .connect_remote_device(ConnectionType::MessageAccessClient, peer(), MAS_PORT, 2, 0, h.callback())
        .unwrap();
    let err = h.manager.connect_remote_device(
        ConnectionType::MessageAccessClient,
        peer(),
        MAS_PORT,
        2,
        0,
        h.callback(),
    );
    assert!(matches!(err, Err(MapError::ConnectionInProgress)));
}

#[test]
fn test_tracking_ids_are_unique() {
    let mut h = Harness::powered();
    let (first, _) = h.connect_client(1);
    let (second, _) = h.connect_client(2);
    h.manager.register_server(MAS_PORT + 1, 0, 3, 0x0F, h.callback()).unwrap();

    let ids: HashSet<_> = h.manager.channels().iter().map(|c| c.tracking_id).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&first));
    assert!(ids.contains(&second));
    assert!(ids.iter().all(|id| id.0 != 0));
}

#[test]
fn test_peer_close_reports_disconnect() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);

    h.transport(TransportEvent::ClosePortIndication { session_id });
    assert!(h.manager.snapshot(id).is_none());
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::DeviceDisconnected {
            connection_type: ConnectionType::MessageAccessClient,
        }]
    );
}

#[test]
fn test_local_disconnect_is_silent() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);

    h.manager
        .disconnect(ConnectionType::MessageAccessClient, peer(), 1)
        .unwrap();
    assert!(h.manager.snapshot(id).is_none());
    assert_eq!(h.commands(), vec![TransportCommand::CloseConnection { session_id }]);
    assert!(h.events().is_empty());

    assert!(matches!(
        h.manager.disconnect(ConnectionType::MessageAccessClient, peer(), 1),
        Err(MapError::DeviceNotConnected)
    ));
}

#[test]
fn test_authorization_raises_connection_request() {
    let mut h = Harness::powered();
    h.manager
        .register_server(MAS_PORT, server_flags::REQUIRE_AUTHORIZATION, 1, 0x0F, h.callback())
        .unwrap();
    let session_id = server_session(&mut h);

    h.transport(TransportEvent::OpenRequestIndication {
        session_id,
        address: peer(),
    });
    assert_eq!(h.event_kinds(), vec![EventKind::ConnectionRequest]);
    assert!(h.commands().is_empty());

    h.manager.connection_request_response(peer(), 1, true).unwrap();
    assert_eq!(
        h.commands(),
        vec![TransportCommand::OpenRequestResponse {
            session_id,
            accept: true,
        }]
    );

    h.transport(TransportEvent::OpenPortIndication {
        session_id,
        address: peer(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::DeviceConnected {
            connection_type: ConnectionType::MessageAccessServer,
        }]
    );
}

#[test]
fn test_rejected_request_returns_server_to_idle() {
    let mut h = Harness::powered();
    h.manager
        .register_server(MAS_PORT, server_flags::REQUIRE_AUTHORIZATION, 1, 0x0F, h.callback())
        .unwrap();
    let session_id = server_session(&mut h);
    h.transport(TransportEvent::OpenRequestIndication {
        session_id,
        address: peer(),
    });
    h.events();

    h.manager.connection_request_response(peer(), 1, false).unwrap();
    assert_eq!(
        h.commands(),
        vec![TransportCommand::OpenRequestResponse {
            session_id,
            accept: false,
        }]
    );
    let server = &h.manager.channels()[0];
    assert_eq!(server.state, ConnectionState::Idle);
    assert!(server.remote_address.is_null());

    // Nothing left to answer.
    assert!(h.manager.connection_request_response(peer(), 1, true).is_err());
}

#[test]
fn test_unrestricted_server_accepts_immediately() {
    let mut h = Harness::powered();
    h.manager.register_server(MAS_PORT, 0, 1, 0x0F, h.callback()).unwrap();
    let session_id = server_session(&mut h);

    h.transport(TransportEvent::OpenRequestIndication {
        session_id,
        address: peer(),
    });
    assert_eq!(
        h.commands(),
        vec![TransportCommand::OpenRequestResponse {
            session_id,
            accept: true,
        }]
    );
    assert!(h.events().is_empty());
}

#[test]
fn test_authenticated_server_waits_for_link() {
    let mut h = Harness::powered();
    h.manager
        .register_server(MAS_PORT, server_flags::REQUIRE_AUTHENTICATION, 1, 0x0F, h.callback())
        .unwrap();
    let session_id = server_session(&mut h);

    h.transport(TransportEvent::OpenRequestIndication {
        session_id,
        address: peer(),
    });
    assert_eq!(h.links(), vec![LinkCommand::Authenticate { address: peer() }]);

    h.input(BridgeInput::Device {
        event: mapm_manager::DeviceEvent::LinkStatus {
            address: peer(),
            procedure: mapm_manager::transport::LinkProcedure::Authentication,
            error: None,
        },
    });
    assert_eq!(
        h.commands(),
        vec![TransportCommand::OpenRequestResponse {
            session_id,
            accept: true,
        }]
    );
}

#[test]
fn test_power_off_disconnects_everything() {
    let mut h = Harness::powered();
    h.connect_client(1);
    h.serve_peer(2);

    h.power_off();
    assert!(!h.manager.is_powered());
    assert!(h.manager.channels().is_empty());

    let events = h.event_kinds();
    assert!(events.contains(&EventKind::DeviceDisconnected {
        connection_type: ConnectionType::MessageAccessClient,
    }));
    assert!(events.contains(&EventKind::DeviceDisconnected {
        connection_type: ConnectionType::MessageAccessServer,
    }));
}

#[tokio::test(start_paused = true)]
async fn test_busy_port_times_out() {
    let mut h = Harness::with_config(
        ManagerConfig {
            notification_port: common::NOTIFICATION_PORT,
            port_retry_delay_ms: 100,
            port_retry_attempts: 3,
            ..Default::default()
        },
        4096,
    );
    h.power_on();
    h.input(BridgeInput::PortBusy {
        address: peer(),
        port: MAS_PORT,
    });
    h.outputs();

    let id = h
        .manager
        .connect_remote_device(
            ConnectionType::MessageAccessClient,
            peer(),
            MAS_PORT,
            1,
            0,
            h.callback(),
        )
        .unwrap();
    let snapshot = h.manager.snapshot(id).unwrap();
    assert_eq!(snapshot.state, ConnectionState::ConnectingWaiting);
    assert!(snapshot.retry_pending);
    assert!(h.links().is_empty());

    tokio::time::sleep(Duration::from_millis(350)).await;

    assert!(h.manager.snapshot(id).is_none());
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::ConnectionStatus {
            connection_type: ConnectionType::MessageAccessClient,
            status: ConnectionStatus::FailureTimeout,
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_freed_port_resumes_connect() {
    let mut h = Harness::powered();
    h.input(BridgeInput::PortBusy {
        address: peer(),
        port: MAS_PORT,
    });
    let id = h
        .manager
        .connect_remote_device(
            ConnectionType::MessageAccessClient,
            peer(),
            MAS_PORT,
            1,
            0,
            h.callback(),
        )
        .unwrap();

    h.input(BridgeInput::PortFree {
        address: peer(),
        port: MAS_PORT,
    });
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(h.manager.snapshot(id).unwrap().state, ConnectionState::ConnectingDevice);
    assert!(h.links().contains(&LinkCommand::Connect {
        address: peer(),
        authenticate: false,
        encrypt: false,
    }));
}

#[tokio::test]
async fn test_blocking_connect_completes() {
    let mut h = Harness::powered();
    let manager = h.manager.clone();
    let callback = h.callback();
    let task = tokio::spawn(async move {
        manager
            .connect_remote_device_blocking(
                ConnectionType::MessageAccessClient,
                peer(),
                MAS_PORT,
                1,
                0,
                callback,
            )
            .await
    });
    while h.manager.channels().is_empty() {
        tokio::task::yield_now().await;
    }

    h.link_up(peer());
    let session_id = h
        .commands()
        .into_iter()
        .find_map(|c| match c {
            TransportCommand::OpenRemoteAccessPort { session_id, .. } => Some(session_id),
            _ => None,
        })
        .expect("remote port opened");
    h.transport(TransportEvent::OpenPortConfirmation {
        session_id,
        status: ConnectionStatus::Success,
    });

    assert_eq!(task.await.unwrap().unwrap(), ConnectionStatus::Success);
    // The waiter got the verdict instead of the callback.
    assert!(h.events().is_empty());
}

#[tokio::test]
async fn test_blocking_connect_woken_by_power_off() {
    let h = Harness::powered();
    let manager = h.manager.clone();
    let callback = h.callback();
    let task = tokio::spawn(async move {
        manager
            .connect_remote_device_blocking(
                ConnectionType::MessageAccessClient,
                peer(),
                MAS_PORT,
                1,
                0,
                callback,
            )
            .await
    });
    while h.manager.channels().is_empty() {
        tokio::task::yield_now().await;
    }

    h.power_off();
    assert_eq!(
        task.await.unwrap().unwrap(),
        ConnectionStatus::FailureDevicePowerOff
    );
    assert!(h.events().is_empty());
}
