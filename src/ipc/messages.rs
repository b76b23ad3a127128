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

//! Message types exchanged with remote clients.

use serde::{Deserialize, Serialize};

use crate::address::BdAddr;
use crate::error::MapError;
use crate::events::{base64_bytes, MapEvent};
use crate::map::channel::TrackingId;
use crate::map::sdp::ServiceDetails;
use crate::map::status::ResponseStatus;
use crate::map::types::{
    CharSet, ConnectionType, FractionalType, MessageListingInfo, MseTime, SetFolderOption,
    StatusIndicator,
};

/// Numeric identifiers of the request messages.
pub mod function {
    pub const CONNECTION_REQUEST_RESPONSE: u32 = 0x1001;
    pub const REGISTER_SERVER: u32 = 0x1002;
    pub const UN_REGISTER_SERVER: u32 = 0x1003;
    pub const REGISTER_SERVICE_RECORD: u32 = 0x1004;
    pub const UN_REGISTER_SERVICE_RECORD: u32 = 0x1005;
    pub const PARSE_REMOTE_MESSAGE_ACCESS_SERVICES: u32 = 0x1006;
    pub const CONNECT_REMOTE_DEVICE: u32 = 0x1007;
    pub const DISCONNECT: u32 = 0x1008;
    pub const ABORT: u32 = 0x1009;

    pub const QUERY_CURRENT_FOLDER: u32 = 0x1101;
    pub const ENABLE_NOTIFICATIONS: u32 = 0x1102;
    pub const GET_FOLDER_LISTING: u32 = 0x1103;
    pub const GET_FOLDER_LISTING_SIZE: u32 = 0x1104;
    pub const GET_MESSAGE_LISTING: u32 = 0x1105;
    pub const GET_MESSAGE_LISTING_SIZE: u32 = 0x1106;
    pub const GET_MESSAGE: u32 = 0x1107;
    pub const SET_MESSAGE_STATUS: u32 = 0x1108;
    pub const PUSH_MESSAGE: u32 = 0x1109;
    pub const UPDATE_INBOX: u32 = 0x110A;
    pub const SET_FOLDER: u32 = 0x110B;
    pub const SET_FOLDER_ABSOLUTE: u32 = 0x110C;

    pub const ENABLE_NOTIFICATIONS_CONFIRMATION: u32 = 0x1201;
    pub const SEND_FOLDER_LISTING: u32 = 0x1202;
    pub const SEND_FOLDER_LISTING_SIZE: u32 = 0x1203;
    pub const SEND_MESSAGE_LISTING: u32 = 0x1204;
    pub const SEND_MESSAGE_LISTING_SIZE: u32 = 0x1205;
    pub const SEND_MESSAGE: u32 = 0x1206;
    pub const SET_MESSAGE_STATUS_CONFIRMATION: u32 = 0x1207;
    pub const PUSH_MESSAGE_CONFIRMATION: u32 = 0x1208;
    pub const UPDATE_INBOX_CONFIRMATION: u32 = 0x1209;
    pub const SET_FOLDER_CONFIRMATION: u32 = 0x120A;

    pub const SEND_NOTIFICATION: u32 = 0x1301;
}

/// A request from a remote client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function", rename_all = "snake_case")]
pub enum Request {
    ConnectionRequestResponse {
        remote_address: BdAddr,
        instance_id: u32,
        accept: bool,
    },
    RegisterServer {
        port: u32,
        #[serde(default)]
        flags: u32,
        instance_id: u32,
        supported_message_types: u32,
    },
    UnRegisterServer {
        instance_id: u32,
    },
    RegisterServiceRecord {
        instance_id: u32,
        service_name: String,
    },
    UnRegisterServiceRecord {
        instance_id: u32,
    },
    ParseRemoteMessageAccessServices {
        remote_address: BdAddr,
    },
    ConnectRemoteDevice {
        connection_type: ConnectionType,
        remote_address: BdAddr,
        port: u32,
        instance_id: u32,
        #[serde(default)]
        flags: u32,
    },
    Disconnect {
        connection_type: ConnectionType,
        remote_address: BdAddr,
        instance_id: u32,
    },
    Abort {
        connection_type: ConnectionType,
        remote_address: BdAddr,
        instance_id: u32,
    },

    QueryCurrentFolder {
        remote_address: BdAddr,
        instance_id: u32,
    },
    EnableNotifications {
        remote_address: BdAddr,
        instance_id: u32,
        enabled: bool,
    },
    GetFolderListing {
        remote_address: BdAddr,
        instance_id: u32,
        max_list_count: u16,
        #[serde(default)]
        list_start_offset: u16,
    },
    GetFolderListingSize {
        remote_address: BdAddr,
        instance_id: u32,
    },
    GetMessageListing {
        remote_address: BdAddr,
        instance_id: u32,
        #[serde(default)]
        folder_name: Option<String>,
        max_list_count: u16,
        #[serde(default)]
        list_start_offset: u16,
        #[serde(default)]
        listing_info: Option<MessageListingInfo>,
    },
    GetMessageListingSize {
        remote_address: BdAddr,
        instance_id: u32,
        #[serde(default)]
        folder_name: Option<String>,
        #[serde(default)]
        listing_info: Option<MessageListingInfo>,
    },
    GetMessage {
        remote_address: BdAddr,
        instance_id: u32,
        message_handle: String,
        #[serde(default)]
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    },
    SetMessageStatus {
        remote_address: BdAddr,
        instance_id: u32,
        message_handle: String,
        status_indicator: StatusIndicator,
        status_value: bool,
    },
    PushMessage {
        remote_address: BdAddr,
        instance_id: u32,
        #[serde(default)]
        folder_name: Option<String>,
        #[serde(default)]
        transparent: bool,
        #[serde(default)]
        retry: bool,
        charset: CharSet,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        is_final: bool,
    },
    UpdateInbox {
        remote_address: BdAddr,
        instance_id: u32,
    },
    SetFolder {
        remote_address: BdAddr,
        instance_id: u32,
        option: SetFolderOption,
        #[serde(default)]
        folder_name: Option<String>,
    },
    SetFolderAbsolute {
        remote_address: BdAddr,
        instance_id: u32,
        folder_name: String,
    },

    EnableNotificationsConfirmation {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    },
    SendFolderListing {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        #[serde(default, with = "base64_bytes")]
        data: Vec<u8>,
        is_final: bool,
    },
    SendFolderListingSize {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        folder_count: u16,
    },
    SendMessageListing {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        message_count: u16,
        new_message: bool,
        #[serde(default)]
        mse_time: Option<MseTime>,
        #[serde(default, with = "base64_bytes")]
        data: Vec<u8>,
        is_final: bool,
    },
    SendMessageListingSize {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        message_count: u16,
        new_message: bool,
        #[serde(default)]
        mse_time: Option<MseTime>,
    },
    SendMessage {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        fractional_type: FractionalType,
        #[serde(default, with = "base64_bytes")]
        data: Vec<u8>,
        is_final: bool,
    },
    SetMessageStatusConfirmation {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    },
    PushMessageConfirmation {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        #[serde(default)]
        message_handle: Option<String>,
    },
    UpdateInboxConfirmation {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    },
    SetFolderConfirmation {
        remote_address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    },

    SendNotification {
        remote_address: BdAddr,
        instance_id: u32,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        is_final: bool,
    },
}

impl Request {
    pub fn function_id(&self) -> u32 {
        use Request::*;
        match self {
            ConnectionRequestResponse { .. } => function::CONNECTION_REQUEST_RESPONSE,
            RegisterServer { .. } => function::REGISTER_SERVER,
            UnRegisterServer { .. } => function::UN_REGISTER_SERVER,
            RegisterServiceRecord { .. } => function::REGISTER_SERVICE_RECORD,
            UnRegisterServiceRecord { .. } => function::UN_REGISTER_SERVICE_RECORD,
            ParseRemoteMessageAccessServices { .. } => function::PARSE_REMOTE_MESSAGE_ACCESS_SERVICES,
            ConnectRemoteDevice { .. } => function::CONNECT_REMOTE_DEVICE,
            Disconnect { .. } => function::DISCONNECT,
            Abort { .. } => function::ABORT,
            QueryCurrentFolder { .. } => function::QUERY_CURRENT_FOLDER,
            EnableNotifications { .. } => function::ENABLE_NOTIFICATIONS,
            GetFolderListing { .. } => function::GET_FOLDER_LISTING,
            GetFolderListingSize { .. } => function::GET_FOLDER_LISTING_SIZE,
            GetMessageListing { .. } => function::GET_MESSAGE_LISTING,
            GetMessageListingSize { .. } => function::GET_MESSAGE_LISTING_SIZE,
            GetMessage { .. } => function::GET_MESSAGE,
            SetMessageStatus { .. } => function::SET_MESSAGE_STATUS,
            PushMessage { .. } => function::PUSH_MESSAGE,
            UpdateInbox { .. } => function::UPDATE_INBOX,
            SetFolder { .. } => function::SET_FOLDER,
            SetFolderAbsolute { .. } => function::SET_FOLDER_ABSOLUTE,
            EnableNotificationsConfirmation { .. } => function::ENABLE_NOTIFICATIONS_CONFIRMATION,
            SendFolderListing { .. } => function::SEND_FOLDER_LISTING,
            SendFolderListingSize { .. } => function::SEND_FOLDER_LISTING_SIZE,
            SendMessageListing { .. } => function::SEND_MESSAGE_LISTING,
            SendMessageListingSize { .. } => function::SEND_MESSAGE_LISTING_SIZE,
            SendMessage { .. } => function::SEND_MESSAGE,
            SetMessageStatusConfirmation { .. } => function::SET_MESSAGE_STATUS_CONFIRMATION,
            PushMessageConfirmation { .. } => function::PUSH_MESSAGE_CONFIRMATION,
            UpdateInboxConfirmation { .. } => function::UPDATE_INBOX_CONFIRMATION,
            SetFolderConfirmation { .. } => function::SET_FOLDER_CONFIRMATION,
            SendNotification { .. } => function::SEND_NOTIFICATION,
        }
    }
}

/// A request plus the id its response must echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub message_id: u32,
    #[serde(flatten)]
    pub request: Request,
}

/// Value returned by a successful request, for those that return one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    TrackingId(TrackingId),
    Server { instance_id: u32 },
    RecordHandle(u32),
    Services(Vec<ServiceDetails>),
    CurrentFolder(String),
}

/// The single answer to a [`RequestMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub message_id: u32,
    pub function: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ResponsePayload>,
}

impl ResponseMessage {
    pub fn success(message_id: u32, function: u32, payload: Option<ResponsePayload>) -> Self {
        Self {
            message_id,
            function,
            error: None,
            error_kind: None,
            payload,
        }
    }

    pub fn failure(message_id: u32, function: u32, error: &MapError) -> Self {
        Self {
            message_id,
            function,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            payload: None,
        }
    }

    /// Answer for a message that could not be parsed at all.
    pub fn malformed(message_id: u32, reason: String) -> Self {
        Self {
            message_id,
            function: 0,
            error: Some(reason),
            error_kind: Some("malformed_request".to_string()),
            payload: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// An event for a remote owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    pub function: u32,
    #[serde(flatten)]
    pub event: MapEvent,
}

/// Reduced event sent when the full event could not be serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventErrorMessage {
    pub function: u32,
    pub remote_address: BdAddr,
    pub instance_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
}

/// Everything the manager sends to a remote client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    Response(ResponseMessage),
    Event(EventMessage),
    EventError(EventErrorMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_maps_to_function_id() {
        let json = r#"{
            "message_id": 12,
            "function": "get_folder_listing",
            "remote_address": "00:11:22:33:44:55",
            "instance_id": 0,
            "max_list_count": 10
        }"#;
        let message: RequestMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.message_id, 12);
        assert_eq!(message.request.function_id(), 0x1103);
        assert!(matches!(
            message.request,
            Request::GetFolderListing {
                max_list_count: 10,
                list_start_offset: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_push_data_is_base64() {
        let json = r#"{
            "message_id": 1,
            "function": "push_message",
            "remote_address": "00:11:22:33:44:55",
            "instance_id": 2,
            "charset": "utf8",
            "data": "QkVHSU46Qk1TRwo=",
            "is_final": true
        }"#;
        let message: RequestMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.request.function_id(), function::PUSH_MESSAGE);
        match message.request {
            Request::PushMessage { data, folder_name, .. } => {
                assert_eq!(data, b"BEGIN:BMSG\n");
                assert_eq!(folder_name, None);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_unregister_names() {
        let request = Request::UnRegisterServer { instance_id: 3 };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["function"], "un_register_server");
        assert_eq!(request.function_id(), 0x1003);
    }

    #[test]
    fn test_response_shape() {
        let ok = ServerMessage::Response(ResponseMessage::success(
            4,
            function::REGISTER_SERVER,
            Some(ResponsePayload::Server { instance_id: 1 }),
        ));
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["kind"], "response");
        assert_eq!(value["message_id"], 4);
        assert_eq!(value["payload"]["server"]["instance_id"], 1);
        assert!(value.get("error").is_none());

        let failed = ResponseMessage::failure(5, function::ABORT, &MapError::NoOperationInProgress);
        assert!(!failed.is_success());
        assert_eq!(failed.error_kind.as_deref(), Some("no_operation_in_progress"));
    }
}
