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

//! Error types for the message access manager.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used by the manager API.
pub type Result<T> = std::result::Result<T, MapError>;

/// Errors returned synchronously by manager operations.
#[derive(Debug, Error)]
pub enum MapError {
    /// A caller-supplied value failed validation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// The caller does not own the addressed connection.
    #[error("connection is owned by a different client")]
    InvalidClient,

    /// The local Bluetooth device is not powered.
    #[error("local device is powered down")]
    LocalDevicePoweredDown,

    /// No connection matches the address and instance.
    #[error("device is not connected")]
    DeviceNotConnected,

    /// No registered server matches the instance.
    #[error("server instance is not registered")]
    InvalidServerInstance,

    /// A server with the same instance id is already registered.
    #[error("instance id {0} is already registered")]
    DuplicateInstanceId(u32),

    /// The connection is not in a state that allows the request.
    #[error("invalid connection state")]
    InvalidConnectionState,

    /// Another operation is already in flight.
    #[error("invalid operation")]
    InvalidOperation,

    #[error("no operation in progress")]
    NoOperationInProgress,

    #[error("abort operation already in progress")]
    AbortOperationInProgress,

    #[error("device is already connected")]
    DeviceAlreadyConnected,

    #[error("connection attempt already in progress")]
    ConnectionInProgress,

    #[error("unable to connect to device")]
    UnableToConnectToDevice,

    #[error("connection retries exceeded")]
    ConnectionRetriesExceeded,

    #[error("unable to add registry entry")]
    UnableToAddEntry,

    #[error("unable to allocate timer")]
    UnableToAllocateTimer,

    #[error("notification server is unavailable")]
    NotificationServerUnavailable,

    #[error("no service discovery data cached for device")]
    ServiceDataNotAvailable,

    #[error("service discovery data is malformed")]
    InvalidServiceData,

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl MapError {
    /// Stable identifier used in IPC responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::InvalidClient => "invalid_client",
            Self::LocalDevicePoweredDown => "local_device_powered_down",
            Self::DeviceNotConnected => "device_not_connected",
            Self::InvalidServerInstance => "invalid_server_instance",
            Self::DuplicateInstanceId(_) => "duplicate_instance_id",
            Self::InvalidConnectionState => "invalid_connection_state",
            Self::InvalidOperation => "invalid_operation",
            Self::NoOperationInProgress => "no_operation_in_progress",
            Self::AbortOperationInProgress => "abort_operation_in_progress",
            Self::DeviceAlreadyConnected => "device_already_connected",
            Self::ConnectionInProgress => "connection_in_progress",
            Self::UnableToConnectToDevice => "unable_to_connect_to_device",
            Self::ConnectionRetriesExceeded => "connection_retries_exceeded",
            Self::UnableToAddEntry => "unable_to_add_entry",
            Self::UnableToAllocateTimer => "unable_to_allocate_timer",
            Self::NotificationServerUnavailable => "notification_server_unavailable",
            Self::ServiceDataNotAvailable => "service_data_not_available",
            Self::InvalidServiceData => "invalid_service_data",
            Self::Device(_) => "device_error",
            Self::Transport(_) => "transport_error",
        }
    }
}

/// Failure reported by the link manager, either synchronously or in a
/// status event.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceError {
    #[error("local device is powered down")]
    PoweredDown,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("connection failed")]
    ConnectionFailed,
    #[error("connection retries exceeded")]
    ConnectionRetriesExceeded,
    #[error("link manager error: {0}")]
    Other(String),
}

/// Failure returned by the lower message access transport.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportError {
    #[error("unknown transport session")]
    InvalidSession,
    #[error("port {0} is already in use")]
    PortInUse(u32),
    #[error("transport is not ready")]
    NotReady,
    #[error("transport request failed: {0}")]
    Failed(String),
}
