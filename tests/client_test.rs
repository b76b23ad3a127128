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

//! Message client requests and their confirmations.

mod common;

use common::{peer, Harness};
use mapm_manager::bridge::TransportCommand;
use mapm_manager::config::ManagerConfig;
use mapm_manager::map::status::obex;
use mapm_manager::map::types::{CharSet, ConnectionType, FractionalType, SetFolderOption, StatusIndicator};
use mapm_manager::map::{Operation, ResponseStatus};
use mapm_manager::{EventKind, MapError, TransportEvent};

#[test]
fn test_requests_need_a_connection() {
    let h = Harness::powered();
    assert!(matches!(
        h.manager.get_folder_listing(peer(), 1, 10, 0),
        Err(MapError::DeviceNotConnected)
    ));
    assert!(matches!(
        h.manager.query_current_folder(peer(), 1),
        Err(MapError::DeviceNotConnected)
    ));
}

#[test]
fn test_single_operation_per_channel() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);

    h.manager.get_folder_listing(peer(), 1, 10, 0).unwrap();
    assert_eq!(
        h.commands(),
        vec![TransportCommand::GetFolderListing {
            session_id,
            max_list_count: 10,
            list_start_offset: 0,
        }]
    );
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::GetFolderListing);

    assert!(matches!(
        h.manager.get_folder_listing(peer(), 1, 10, 0),
        Err(MapError::InvalidOperation)
    ));
    assert!(matches!(
        h.manager.update_inbox(peer(), 1),
        Err(MapError::InvalidOperation)
    ));
    assert!(h.commands().is_empty());
}

#[test]
fn test_get_continues_until_final() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);
    h.manager.get_folder_listing(peer(), 1, 10, 0).unwrap();
    h.commands();

    h.transport(TransportEvent::GetFolderListingConfirmation {
        session_id,
        response_code: obex::CONTINUE,
        folder_count: 0,
        data: b"<folder-listing>".to_vec(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::GetFolderListingResponse {
            status: ResponseStatus::Success,
            is_final: false,
            data: b"<folder-listing>".to_vec(),
        }]
    );
    // The same request goes out again for the next part.
    assert_eq!(
        h.commands(),
        vec![TransportCommand::GetFolderListing {
            session_id,
            max_list_count: 10,
            list_start_offset: 0,
        }]
    );

    h.transport(TransportEvent::GetFolderListingConfirmation {
        session_id,
        response_code: obex::OK,
        folder_count: 0,
        data: b"</folder-listing>".to_vec(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::GetFolderListingResponse {
            status: ResponseStatus::Success,
            is_final: true,
            data: b"</folder-listing>".to_vec(),
        }]
    );
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::None);
}

#[test]
fn test_listing_size_request() {
    let mut h = Harness::powered();
    let (_, session_id) = h.connect_client(1);
    h.manager.get_folder_listing_size(peer(), 1).unwrap();
    assert_eq!(
        h.commands(),
        vec![TransportCommand::GetFolderListing {
            session_id,
            max_list_count: 0,
            list_start_offset: 0,
        }]
    );

    h.transport(TransportEvent::GetFolderListingConfirmation {
        session_id,
        response_code: obex::OK,
        folder_count: 4,
        data: Vec::new(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::GetFolderListingSizeResponse {
            status: ResponseStatus::Success,
            folder_count: 4,
        }]
    );
}

#[test]
fn test_get_message_validates_handle() {
    let mut h = Harness::powered();
    h.connect_client(1);
    let err = h.manager.get_message(
        peer(),
        1,
        "not-a-handle",
        false,
        CharSet::Utf8,
        FractionalType::Unfragmented,
    );
    assert!(matches!(err, Err(MapError::InvalidParameter(_))));

    h.manager
        .get_message(peer(), 1, "20000100001", false, CharSet::Utf8, FractionalType::First)
        .unwrap();
    assert!(matches!(
        h.commands().as_slice(),
        [TransportCommand::GetMessage {
            fractional_type: FractionalType::First,
            ..
        }]
    ));
}

#[test]
fn test_failed_get_reports_status() {
    let mut h = Harness::powered();
    let (_, session_id) = h.connect_client(1);
    h.manager
        .get_message(peer(), 1, "20000100001", true, CharSet::Native, FractionalType::Unfragmented)
        .unwrap();

    h.transport(TransportEvent::GetMessageConfirmation {
        session_id,
        response_code: obex::NOT_FOUND | obex::FINAL_BIT,
        fractional_type: FractionalType::Unfragmented,
        data: Vec::new(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::GetMessageResponse {
            status: ResponseStatus::NotFound,
            fractional_type: FractionalType::Unfragmented,
            is_final: true,
            data: Vec::new(),
        }]
    );
}

#[test]
fn test_set_folder_tracks_path() {
    let mut h = Harness::powered();
    let (_, session_id) = h.connect_client(1);

    assert!(matches!(
        h.manager.set_folder(peer(), 1, SetFolderOption::Down, None),
        Err(MapError::InvalidParameter(_))
    ));

    h.manager
        .set_folder(peer(), 1, SetFolderOption::Down, Some("telecom"))
        .unwrap();
    h.transport(TransportEvent::SetFolderConfirmation {
        session_id,
        response_code: obex::OK,
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::SetFolderResponse {
            status: ResponseStatus::Success,
            current_path: "telecom".to_string(),
        }]
    );
    assert_eq!(h.manager.query_current_folder(peer(), 1).unwrap(), "telecom");

    // A refused navigation leaves the path alone.
    h.manager
        .set_folder(peer(), 1, SetFolderOption::Down, Some("nowhere"))
        .unwrap();
    h.transport(TransportEvent::SetFolderConfirmation {
        session_id,
        response_code: obex::NOT_FOUND,
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::SetFolderResponse {
            status: ResponseStatus::NotFound,
            current_path: "telecom".to_string(),
        }]
    );

    h.manager.set_folder(peer(), 1, SetFolderOption::Up, None).unwrap();
    h.transport(TransportEvent::SetFolderConfirmation {
        session_id,
        response_code: obex::OK,
    });
    assert_eq!(h.manager.query_current_folder(peer(), 1).unwrap(), "");
}

#[test]
fn test_absolute_set_folder_walks_from_root() {
    let mut h = Harness::powered();
    let (_, session_id) = h.connect_client(1);
    h.manager.set_folder_absolute(peer(), 1, "telecom/msg").unwrap();

    let mut options = Vec::new();
    for _ in 0..3 {
        for command in h.commands() {
            if let TransportCommand::SetFolder { option, .. } = command {
                options.push(option);
            }
        }
        h.transport(TransportEvent::SetFolderConfirmation {
            session_id,
            response_code: obex::OK,
        });
    }

    assert_eq!(
        options,
        vec![SetFolderOption::Root, SetFolderOption::Down, SetFolderOption::Down]
    );
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::SetFolderResponse {
            status: ResponseStatus::Success,
            current_path: "telecom/msg".to_string(),
        }]
    );
    assert_eq!(h.manager.query_current_folder(peer(), 1).unwrap(), "telecom/msg");
}

#[test]
fn test_set_message_status_round_trip() {
    let mut h = Harness::powered();
    let (_, session_id) = h.connect_client(1);
    h.manager
        .set_message_status(peer(), 1, "20000100001", StatusIndicator::ReadStatus, true)
        .unwrap();
    assert_eq!(
        h.commands(),
        vec![TransportCommand::SetMessageStatus {
            session_id,
            message_handle: "20000100001".to_string(),
            status_indicator: StatusIndicator::ReadStatus,
            status_value: true,
        }]
    );

    h.transport(TransportEvent::SetMessageStatusConfirmation {
        session_id,
        response_code: obex::OK,
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::SetMessageStatusResponse {
            status: ResponseStatus::Success,
        }]
    );
}

#[test]
fn test_push_spans_packets() {
    let mut h = Harness::with_config(
        ManagerConfig {
            notification_port: common::NOTIFICATION_PORT,
            ..Default::default()
        },
        4,
    );
    h.power_on();
    h.outputs();
    let (id, session_id) = h.connect_client(1);

    h.manager
        .push_message(peer(), 1, Some("outbox"), false, false, CharSet::Utf8, b"BEGIN:BMSG".to_vec(), true)
        .unwrap();
    match h.commands().as_slice() {
        [TransportCommand::PushMessage { data, is_final, .. }] => {
            assert_eq!(data, b"BEGI");
            assert!(!is_final);
        }
        other => panic!("unexpected commands {:?}", other),
    }
    assert_eq!(h.manager.snapshot(id).unwrap().buffered_bytes, 6);

    // No new part while the buffered body is still going out.
    assert!(matches!(
        h.manager
            .push_message(peer(), 1, None, false, false, CharSet::Utf8, b"x".to_vec(), true),
        Err(MapError::InvalidOperation)
    ));

    h.transport(TransportEvent::PushMessageConfirmation {
        session_id,
        response_code: obex::CONTINUE,
        message_handle: None,
    });
    h.transport(TransportEvent::PushMessageConfirmation {
        session_id,
        response_code: obex::CONTINUE,
        message_handle: None,
    });
    let parts: Vec<Vec<u8>> = h
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            TransportCommand::PushMessage { data, .. } => Some(data),
            _ => None,
        })
        .collect();
    assert_eq!(parts, vec![b"N:BM".to_vec(), b"SG".to_vec()]);
    assert!(h.events().is_empty());

    h.transport(TransportEvent::PushMessageConfirmation {
        session_id,
        response_code: obex::OK,
        message_handle: Some("20000100002".to_string()),
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::PushMessageResponse {
            status: ResponseStatus::Success,
            message_handle: Some("20000100002".to_string()),
        }]
    );
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::None);
}

#[test]
fn test_abort_without_operation() {
    let mut h = Harness::powered();
    h.connect_client(1);
    assert!(matches!(
        h.manager.abort(ConnectionType::MessageAccessClient, peer(), 1),
        Err(MapError::NoOperationInProgress)
    ));
    assert!(matches!(
        h.manager.abort(ConnectionType::MessageAccessServer, peer(), 1),
        Err(MapError::InvalidOperation)
    ));
}

#[test]
fn test_abort_preempts_final_response() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);
    h.manager
        .get_message_listing(peer(), 1, Some("inbox"), 10, 0, None)
        .unwrap();
    h.commands();

    h.manager
        .abort(ConnectionType::MessageAccessClient, peer(), 1)
        .unwrap();
    assert!(matches!(
        h.manager.abort(ConnectionType::MessageAccessClient, peer(), 1),
        Err(MapError::AbortOperationInProgress)
    ));
    // Waiting for the outstanding response first.
    assert!(h.commands().is_empty());
    assert!(h.events().is_empty());

    h.transport(TransportEvent::GetMessageListingConfirmation {
        session_id,
        response_code: obex::OK,
        message_count: 2,
        new_message: true,
        mse_time: None,
        data: b"<MAP-msg-listing/>".to_vec(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::GetMessageListingResponse {
            status: ResponseStatus::OperationAborted,
            message_count: 0,
            new_message: false,
            mse_time: None,
            is_final: true,
            data: Vec::new(),
        }]
    );
    // The exchange was already over, so nothing is sent to the peer.
    assert!(h.commands().is_empty());
    let snapshot = h.manager.snapshot(id).unwrap();
    assert_eq!(snapshot.operation, Operation::None);
    assert!(!snapshot.pending_abort);
}

#[test]
fn test_abort_mid_transfer_sends_abort() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);
    h.manager.get_folder_listing(peer(), 1, 10, 0).unwrap();
    h.commands();
    h.manager
        .abort(ConnectionType::MessageAccessClient, peer(), 1)
        .unwrap();

    h.transport(TransportEvent::GetFolderListingConfirmation {
        session_id,
        response_code: obex::CONTINUE,
        folder_count: 0,
        data: b"<folder".to_vec(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![
            EventKind::GetFolderListingResponse {
                status: ResponseStatus::Success,
                is_final: false,
                data: b"<folder".to_vec(),
            },
            EventKind::GetFolderListingResponse {
                status: ResponseStatus::OperationAborted,
                is_final: true,
                data: Vec::new(),
            },
        ]
    );
    assert_eq!(h.commands(), vec![TransportCommand::Abort { session_id }]);
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::Abort);

    h.transport(TransportEvent::AbortConfirmation { session_id });
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::None);
    assert!(h.events().is_empty());
    h.manager.update_inbox(peer(), 1).unwrap();
}

#[test]
fn test_peer_close_ends_operation() {
    let mut h = Harness::powered();
    let (_, session_id) = h.connect_client(1);
    h.manager.update_inbox(peer(), 1).unwrap();

    h.transport(TransportEvent::ClosePortIndication { session_id });
    assert_eq!(
        h.event_kinds(),
        vec![
            EventKind::UpdateInboxResponse {
                status: ResponseStatus::ResourcesAborted,
            },
            EventKind::DeviceDisconnected {
                connection_type: ConnectionType::MessageAccessClient,
            },
        ]
    );
}

#[test]
fn test_power_off_ends_operation() {
    let mut h = Harness::powered();
    h.connect_client(1);
    h.manager.get_folder_listing(peer(), 1, 10, 0).unwrap();

    h.power_off();
    assert_eq!(
        h.event_kinds(),
        vec![
            EventKind::GetFolderListingResponse {
                status: ResponseStatus::DevicePoweredOff,
                is_final: true,
                data: Vec::new(),
            },
            EventKind::DeviceDisconnected {
                connection_type: ConnectionType::MessageAccessClient,
            },
        ]
    );
}

#[test]
fn test_failed_get_continuation_aborts() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);
    h.manager.get_folder_listing(peer(), 1, 10, 0).unwrap();
    h.commands();

    h.fail_next_submission();
    h.transport(TransportEvent::GetFolderListingConfirmation {
        session_id,
        response_code: obex::CONTINUE,
        folder_count: 0,
        data: b"<folder".to_vec(),
    });
    assert_eq!(
        h.event_kinds(),
        vec![
            EventKind::GetFolderListingResponse {
                status: ResponseStatus::Success,
                is_final: false,
                data: b"<folder".to_vec(),
            },
            EventKind::GetFolderListingResponse {
                status: ResponseStatus::UnableToSubmitRequest,
                is_final: true,
                data: Vec::new(),
            },
        ]
    );
    assert_eq!(h.commands(), vec![TransportCommand::Abort { session_id }]);
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::Abort);

    h.transport(TransportEvent::AbortConfirmation { session_id });
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::None);
    assert!(h.events().is_empty());
}

#[test]
fn test_failed_push_continuation_aborts() {
    let mut h = Harness::with_config(
        ManagerConfig {
            notification_port: common::NOTIFICATION_PORT,
            ..Default::default()
        },
        4,
    );
    h.power_on();
    h.outputs();
    let (id, session_id) = h.connect_client(1);

    h.manager
        .push_message(peer(), 1, Some("outbox"), false, false, CharSet::Utf8, b"BEGIN:BMSG".to_vec(), true)
        .unwrap();
    h.commands();

    h.fail_next_submission();
    h.transport(TransportEvent::PushMessageConfirmation {
        session_id,
        response_code: obex::CONTINUE,
        message_handle: None,
    });
    assert_eq!(
        h.event_kinds(),
        vec![EventKind::PushMessageResponse {
            status: ResponseStatus::UnableToSubmitRequest,
            message_handle: None,
        }]
    );
    assert_eq!(h.commands(), vec![TransportCommand::Abort { session_id }]);
    let snapshot = h.manager.snapshot(id).unwrap();
    assert_eq!(snapshot.buffered_bytes, 0);
    assert_eq!(snapshot.operation, Operation::Abort);

    h.transport(TransportEvent::AbortConfirmation { session_id });
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::None);
}

#[test]
fn test_failed_push_part_aborts() {
    let mut h = Harness::powered();
    let (id, session_id) = h.connect_client(1);
    h.manager
        .push_message(peer(), 1, None, false, false, CharSet::Utf8, b"BEGIN:".to_vec(), false)
        .unwrap();
    h.transport(TransportEvent::PushMessageConfirmation {
        session_id,
        response_code: obex::CONTINUE,
        message_handle: None,
    });
    h.commands();
    h.events();

    h.fail_next_submission();
    assert!(matches!(
        h.manager
            .push_message(peer(), 1, None, false, false, CharSet::Utf8, b"BMSG".to_vec(), true),
        Err(MapError::Transport(_))
    ));
    assert_eq!(h.commands(), vec![TransportCommand::Abort { session_id }]);
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::Abort);

    h.transport(TransportEvent::AbortConfirmation { session_id });
    assert_eq!(h.manager.snapshot(id).unwrap().operation, Operation::None);
}
