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

//! Events delivered to the owner of a channel.
//!
//! Local owners receive a [`MapEvent`] through their callback; remote owners
//! receive the same value serialized to JSON.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::address::BdAddr;
use crate::map::channel::TrackingId;
use crate::map::status::ResponseStatus;
use crate::map::types::{
    CharSet, ConnectionStatus, ConnectionType, FractionalType, MessageListingInfo, MseTime,
    SetFolderOption, StatusIndicator,
};

/// Callback registered by an in-process owner.
pub type EventCallback = Arc<dyn Fn(&MapEvent) + Send + Sync>;

/// Numeric identifiers of the event messages.
pub mod function {
    pub const CONNECTION_REQUEST: u32 = 0x10001;
    pub const DEVICE_CONNECTED: u32 = 0x10002;
    pub const DEVICE_DISCONNECTED: u32 = 0x10003;
    pub const CONNECTION_STATUS: u32 = 0x10004;

    pub const ENABLE_NOTIFICATIONS_RESPONSE: u32 = 0x11001;
    pub const GET_FOLDER_LISTING_RESPONSE: u32 = 0x11002;
    pub const GET_FOLDER_LISTING_SIZE_RESPONSE: u32 = 0x11003;
    pub const GET_MESSAGE_LISTING_RESPONSE: u32 = 0x11004;
    pub const GET_MESSAGE_LISTING_SIZE_RESPONSE: u32 = 0x11005;
    pub const GET_MESSAGE_RESPONSE: u32 = 0x11006;
    pub const SET_MESSAGE_STATUS_RESPONSE: u32 = 0x11007;
    pub const PUSH_MESSAGE_RESPONSE: u32 = 0x11008;
    pub const UPDATE_INBOX_RESPONSE: u32 = 0x11009;
    pub const SET_FOLDER_RESPONSE: u32 = 0x1100A;

    pub const NOTIFICATION_INDICATION: u32 = 0x12001;

    pub const ENABLE_NOTIFICATIONS_REQUEST: u32 = 0x13001;
    pub const GET_FOLDER_LISTING_REQUEST: u32 = 0x13002;
    pub const GET_FOLDER_LISTING_SIZE_REQUEST: u32 = 0x13003;
    pub const GET_MESSAGE_LISTING_REQUEST: u32 = 0x13004;
    pub const GET_MESSAGE_LISTING_SIZE_REQUEST: u32 = 0x13005;
    pub const GET_MESSAGE_REQUEST: u32 = 0x13006;
    pub const SET_MESSAGE_STATUS_REQUEST: u32 = 0x13007;
    pub const PUSH_MESSAGE_REQUEST: u32 = 0x13008;
    pub const UPDATE_INBOX_REQUEST: u32 = 0x13009;
    pub const SET_FOLDER_REQUEST: u32 = 0x1300A;

    pub const NOTIFICATION_CONFIRMATION: u32 = 0x14001;
}

/// An event addressed to the owner of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEvent {
    pub tracking_id: TrackingId,
    pub remote_address: BdAddr,
    pub instance_id: u32,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl MapEvent {
    pub fn function(&self) -> u32 {
        self.kind.function()
    }

    /// Status carried by response and confirmation events, if any.
    pub fn status(&self) -> Option<ResponseStatus> {
        use EventKind::*;
        match &self.kind {
            EnableNotificationsResponse { status }
            | GetFolderListingResponse { status, .. }
            | GetFolderListingSizeResponse { status, .. }
            | GetMessageListingResponse { status, .. }
            | GetMessageListingSizeResponse { status, .. }
            | GetMessageResponse { status, .. }
            | SetMessageStatusResponse { status }
            | PushMessageResponse { status, .. }
            | UpdateInboxResponse { status }
            | SetFolderResponse { status, .. }
            | NotificationConfirmation { status } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    ConnectionRequest,
    DeviceConnected {
        connection_type: ConnectionType,
    },
    DeviceDisconnected {
        connection_type: ConnectionType,
    },
    ConnectionStatus {
        connection_type: ConnectionType,
        status: ConnectionStatus,
    },

    EnableNotificationsResponse {
        status: ResponseStatus,
    },
    GetFolderListingResponse {
        status: ResponseStatus,
        is_final: bool,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    GetFolderListingSizeResponse {
        status: ResponseStatus,
        folder_count: u16,
    },
    GetMessageListingResponse {
        status: ResponseStatus,
        message_count: u16,
        new_message: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mse_time: Option<MseTime>,
        is_final: bool,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    GetMessageListingSizeResponse {
        status: ResponseStatus,
        message_count: u16,
        new_message: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mse_time: Option<MseTime>,
    },
    GetMessageResponse {
        status: ResponseStatus,
        fractional_type: FractionalType,
        is_final: bool,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    SetMessageStatusResponse {
        status: ResponseStatus,
    },
    PushMessageResponse {
        status: ResponseStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_handle: Option<String>,
    },
    UpdateInboxResponse {
        status: ResponseStatus,
    },
    SetFolderResponse {
        status: ResponseStatus,
        current_path: String,
    },

    NotificationIndication {
        is_final: bool,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    EnableNotificationsRequest {
        enabled: bool,
    },
    GetFolderListingRequest {
        max_list_count: u16,
        list_start_offset: u16,
    },
    GetFolderListingSizeRequest,
    GetMessageListingRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<String>,
        max_list_count: u16,
        list_start_offset: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listing_info: Option<MessageListingInfo>,
    },
    GetMessageListingSizeRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listing_info: Option<MessageListingInfo>,
    },
    GetMessageRequest {
        message_handle: String,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    },
    SetMessageStatusRequest {
        message_handle: String,
        status_indicator: StatusIndicator,
        status_value: bool,
    },
    PushMessageRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<String>,
        transparent: bool,
        retry: bool,
        charset: CharSet,
        is_final: bool,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    UpdateInboxRequest,
    SetFolderRequest {
        option: SetFolderOption,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<String>,
        pending_path: String,
    },

    NotificationConfirmation {
        status: ResponseStatus,
    },
}

impl EventKind {
    pub fn function(&self) -> u32 {
        use EventKind::*;
        match self {
            ConnectionRequest => function::CONNECTION_REQUEST,
            DeviceConnected { .. } => function::DEVICE_CONNECTED,
            DeviceDisconnected { .. } => function::DEVICE_DISCONNECTED,
            ConnectionStatus { .. } => function::CONNECTION_STATUS,
            EnableNotificationsResponse { .. } => function::ENABLE_NOTIFICATIONS_RESPONSE,
            GetFolderListingResponse { .. } => function::GET_FOLDER_LISTING_RESPONSE,
            GetFolderListingSizeResponse { .. } => function::GET_FOLDER_LISTING_SIZE_RESPONSE,
            GetMessageListingResponse { .. } => function::GET_MESSAGE_LISTING_RESPONSE,
            GetMessageListingSizeResponse { .. } => function::GET_MESSAGE_LISTING_SIZE_RESPONSE,
            GetMessageResponse { .. } => function::GET_MESSAGE_RESPONSE,
            SetMessageStatusResponse { .. } => function::SET_MESSAGE_STATUS_RESPONSE,
            PushMessageResponse { .. } => function::PUSH_MESSAGE_RESPONSE,
            UpdateInboxResponse { .. } => function::UPDATE_INBOX_RESPONSE,
            SetFolderResponse { .. } => function::SET_FOLDER_RESPONSE,
            NotificationIndication { .. } => function::NOTIFICATION_INDICATION,
            EnableNotificationsRequest { .. } => function::ENABLE_NOTIFICATIONS_REQUEST,
            GetFolderListingRequest { .. } => function::GET_FOLDER_LISTING_REQUEST,
            GetFolderListingSizeRequest => function::GET_FOLDER_LISTING_SIZE_REQUEST,
            GetMessageListingRequest { .. } => function::GET_MESSAGE_LISTING_REQUEST,
            GetMessageListingSizeRequest { .. } => function::GET_MESSAGE_LISTING_SIZE_REQUEST,
            GetMessageRequest { .. } => function::GET_MESSAGE_REQUEST,
            SetMessageStatusRequest { .. } => function::SET_MESSAGE_STATUS_REQUEST,
            PushMessageRequest { .. } => function::PUSH_MESSAGE_REQUEST,
            UpdateInboxRequest => function::UPDATE_INBOX_REQUEST,
            SetFolderRequest { .. } => function::SET_FOLDER_REQUEST,
            NotificationConfirmation { .. } => function::NOTIFICATION_CONFIRMATION,
        }
    }
}

/// Serde adapter that carries binary payloads as base64 text.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}
