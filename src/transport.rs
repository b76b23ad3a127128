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

//! Collaborators the manager drives, and the events they report back.
//!
//! Every transport call is fire-and-forget: it returns once the request is
//! queued, and the outcome arrives later as a [`TransportEvent`]. Calls that
//! carry a body return how many bytes fit in the packet; when only part of
//! the body fit, the transport sends CONTINUE in place of the given code and
//! clears the final flag.

use serde::{Deserialize, Serialize};

use crate::address::BdAddr;
use crate::error::{DeviceError, TransportError};
use crate::map::sdp::SdpRecord;
use crate::map::types::{
    CharSet, ClientId, ConnectionStatus, FractionalType, MessageListingInfo, MseTime,
    SetFolderOption, StatusIndicator,
};

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Message access session primitives (OBEX over RFCOMM, plus SDP records).
pub trait MapTransport: Send + Sync {
    fn open_access_server(&self, port: u32) -> TransportResult<u32>;
    fn open_notification_server(&self, port: u32) -> TransportResult<u32>;
    fn close_server(&self, session_id: u32) -> TransportResult<()>;

    /// Accept or reject a pending inbound open on a server session.
    fn open_request_response(&self, session_id: u32, accept: bool) -> TransportResult<()>;

    fn register_access_record(
        &self,
        session_id: u32,
        service_name: &str,
        instance_id: u32,
        supported_message_types: u32,
    ) -> TransportResult<u32>;
    fn register_notification_record(&self, session_id: u32, service_name: &str) -> TransportResult<u32>;
    fn unregister_record(&self, session_id: u32, record_handle: u32) -> TransportResult<()>;

    fn open_remote_access_port(&self, address: BdAddr, port: u32) -> TransportResult<u32>;
    fn open_remote_notification_port(&self, address: BdAddr, port: u32) -> TransportResult<u32>;
    fn close_connection(&self, session_id: u32) -> TransportResult<()>;
    fn abort_request(&self, session_id: u32) -> TransportResult<()>;

    fn set_notification_registration(&self, session_id: u32, enabled: bool) -> TransportResult<()>;
    fn set_folder(
        &self,
        session_id: u32,
        option: SetFolderOption,
        name: Option<&[u16]>,
    ) -> TransportResult<()>;
    fn get_folder_listing(
        &self,
        session_id: u32,
        max_list_count: u16,
        list_start_offset: u16,
    ) -> TransportResult<()>;
    fn get_message_listing(
        &self,
        session_id: u32,
        folder: Option<&[u16]>,
        max_list_count: u16,
        list_start_offset: u16,
        info: Option<&MessageListingInfo>,
    ) -> TransportResult<()>;
    fn get_message(
        &self,
        session_id: u32,
        message_handle: &str,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    ) -> TransportResult<()>;
    fn set_message_status(
        &self,
        session_id: u32,
        message_handle: &str,
        indicator: StatusIndicator,
        value: bool,
    ) -> TransportResult<()>;
    #[allow(clippy::too_many_arguments)]
    fn push_message(
        &self,
        session_id: u32,
        folder: Option<&[u16]>,
        transparent: bool,
        retry: bool,
        charset: CharSet,
        data: &[u8],
        is_final: bool,
    ) -> TransportResult<usize>;
    fn update_inbox(&self, session_id: u32) -> TransportResult<()>;

    fn set_notification_registration_response(&self, session_id: u32, code: u8) -> TransportResult<()>;
    fn set_folder_response(&self, session_id: u32, code: u8) -> TransportResult<()>;
    fn folder_listing_response(&self, session_id: u32, code: u8, data: &[u8]) -> TransportResult<usize>;
    fn folder_listing_size_response(
        &self,
        session_id: u32,
        code: u8,
        folder_count: u16,
    ) -> TransportResult<()>;
    fn message_listing_response(
        &self,
        session_id: u32,
        code: u8,
        message_count: u16,
        new_message: bool,
        mse_time: Option<&MseTime>,
        data: &[u8],
    ) -> TransportResult<usize>;
    fn message_listing_size_response(
        &self,
        session_id: u32,
        code: u8,
        message_count: u16,
        new_message: bool,
        mse_time: Option<&MseTime>,
    ) -> TransportResult<()>;
    fn message_response(
        &self,
        session_id: u32,
        code: u8,
        fractional_type: FractionalType,
        data: &[u8],
    ) -> TransportResult<usize>;
    fn set_message_status_response(&self, session_id: u32, code: u8) -> TransportResult<()>;
    fn push_message_response(
        &self,
        session_id: u32,
        code: u8,
        message_handle: Option<&str>,
    ) -> TransportResult<()>;
    fn update_inbox_response(&self, session_id: u32, code: u8) -> TransportResult<()>;

    fn send_event_request(
        &self,
        session_id: u32,
        instance_id: u32,
        data: &[u8],
        is_final: bool,
    ) -> TransportResult<usize>;
    fn send_event_response(&self, session_id: u32, code: u8) -> TransportResult<()>;
}

/// Result of a link-manager request that may already be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// The request was started; a [`DeviceEvent`] will report the outcome.
    Pending,
    /// The link is already in the requested condition.
    Ready,
}

/// Security asked of an outgoing link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSecurity {
    pub authenticate: bool,
    pub encrypt: bool,
}

/// Local device and link management.
pub trait DeviceManager: Send + Sync {
    fn connect_with_remote_device(
        &self,
        address: BdAddr,
        security: LinkSecurity,
    ) -> Result<LinkStatus, DeviceError>;
    fn authenticate_remote_device(&self, address: BdAddr) -> Result<LinkStatus, DeviceError>;
    fn encrypt_remote_device(&self, address: BdAddr) -> Result<LinkStatus, DeviceError>;
    fn disconnect_remote_device(&self, address: BdAddr) -> Result<(), DeviceError>;

    /// Whether a previous connection to `port` on the device is still
    /// being torn down.
    fn remote_port_in_use(&self, address: BdAddr, port: u32) -> bool;

    fn find_free_server_port(&self) -> Option<u32>;

    /// Claim `port` with a listener that refuses every connection.
    fn reserve_port(&self, port: u32) -> Result<u32, DeviceError>;
    fn release_port_reservation(&self, reservation_id: u32);

    fn query_remote_service_data(&self, address: BdAddr) -> Option<Vec<SdpRecord>>;
}

/// Delivery of serialized messages to remote clients.
pub trait IpcSender: Send + Sync {
    fn send(&self, client: ClientId, message: String);
}

/// Sender for deployments with no remote clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemoteClients;

impl IpcSender for NoRemoteClients {
    fn send(&self, client: ClientId, _message: String) {
        tracing::warn!("Dropping message for {}: no IPC transport", client);
    }
}

/// Indications and confirmations raised by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    OpenRequestIndication {
        session_id: u32,
        address: BdAddr,
    },
    OpenPortIndication {
        session_id: u32,
        address: BdAddr,
    },
    OpenPortConfirmation {
        session_id: u32,
        status: ConnectionStatus,
    },
    ClosePortIndication {
        session_id: u32,
    },

    NotificationRegistrationIndication {
        session_id: u32,
        enabled: bool,
    },
    NotificationRegistrationConfirmation {
        session_id: u32,
        response_code: u8,
    },
    SetFolderIndication {
        session_id: u32,
        option: SetFolderOption,
        #[serde(default)]
        folder_name: Option<Vec<u16>>,
    },
    SetFolderConfirmation {
        session_id: u32,
        response_code: u8,
    },
    GetFolderListingIndication {
        session_id: u32,
        max_list_count: u16,
        list_start_offset: u16,
    },
    GetFolderListingConfirmation {
        session_id: u32,
        response_code: u8,
        #[serde(default)]
        folder_count: u16,
        #[serde(default, with = "crate::events::base64_bytes")]
        data: Vec<u8>,
    },
    GetMessageListingIndication {
        session_id: u32,
        #[serde(default)]
        folder_name: Option<Vec<u16>>,
        max_list_count: u16,
        list_start_offset: u16,
        #[serde(default)]
        listing_info: Option<MessageListingInfo>,
    },
    GetMessageListingConfirmation {
        session_id: u32,
        response_code: u8,
        #[serde(default)]
        message_count: u16,
        #[serde(default)]
        new_message: bool,
        #[serde(default)]
        mse_time: Option<MseTime>,
        #[serde(default, with = "crate::events::base64_bytes")]
        data: Vec<u8>,
    },
    GetMessageIndication {
        session_id: u32,
        message_handle: String,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    },
    GetMessageConfirmation {
        session_id: u32,
        response_code: u8,
        fractional_type: FractionalType,
        #[serde(default, with = "crate::events::base64_bytes")]
        data: Vec<u8>,
    },
    SetMessageStatusIndication {
        session_id: u32,
        message_handle: String,
        status_indicator: StatusIndicator,
        status_value: bool,
    },
    SetMessageStatusConfirmation {
        session_id: u32,
        response_code: u8,
    },
    PushMessageIndication {
        session_id: u32,
        #[serde(default)]
        folder_name: Option<Vec<u16>>,
        transparent: bool,
        retry: bool,
        charset: CharSet,
        is_final: bool,
        #[serde(default, with = "crate::events::base64_bytes")]
        data: Vec<u8>,
    },
    PushMessageConfirmation {
        session_id: u32,
        response_code: u8,
        #[serde(default)]
        message_handle: Option<String>,
    },
    UpdateInboxIndication {
        session_id: u32,
    },
    UpdateInboxConfirmation {
        session_id: u32,
        response_code: u8,
    },
    SendEventIndication {
        session_id: u32,
        mas_instance_id: u32,
        is_final: bool,
        #[serde(default, with = "crate::events::base64_bytes")]
        data: Vec<u8>,
    },
    SendEventConfirmation {
        session_id: u32,
        response_code: u8,
    },
    AbortIndication {
        session_id: u32,
    },
    AbortConfirmation {
        session_id: u32,
    },
}

impl TransportEvent {
    pub fn session_id(&self) -> u32 {
        use TransportEvent::*;
        match self {
            OpenRequestIndication { session_id, .. }
            | OpenPortIndication { session_id, .. }
            | OpenPortConfirmation { session_id, .. }
            | ClosePortIndication { session_id }
            | NotificationRegistrationIndication { session_id, .. }
            | NotificationRegistrationConfirmation { session_id, .. }
            | SetFolderIndication { session_id, .. }
            | SetFolderConfirmation { session_id, .. }
            | GetFolderListingIndication { session_id, .. }
            | GetFolderListingConfirmation { session_id, .. }
            | GetMessageListingIndication { session_id, .. }
            | GetMessageListingConfirmation { session_id, .. }
            | GetMessageIndication { session_id, .. }
            | GetMessageConfirmation { session_id, .. }
            | SetMessageStatusIndication { session_id, .. }
            | SetMessageStatusConfirmation { session_id, .. }
            | PushMessageIndication { session_id, .. }
            | PushMessageConfirmation { session_id, .. }
            | UpdateInboxIndication { session_id }
            | UpdateInboxConfirmation { session_id, .. }
            | SendEventIndication { session_id, .. }
            | SendEventConfirmation { session_id, .. }
            | AbortIndication { session_id }
            | AbortConfirmation { session_id } => *session_id,
        }
    }
}

/// Which link-manager procedure a status event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkProcedure {
    Authentication,
    Encryption,
    Connection,
}

/// Events raised by the local device manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    PoweredOn,
    PoweredOff,
    LinkStatus {
        address: BdAddr,
        procedure: LinkProcedure,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<DeviceError>,
    },
}
