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

//! Per-connection record and its two state machines.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::address::BdAddr;
use crate::error::{MapError, Result};
use crate::events::EventCallback;

use super::path::AbsoluteWalk;
use super::transfer::OutgoingTransfer;
use super::types::{
    CharSet, ClientId, ConnectionStatus, ConnectionType, FractionalType, MessageListingInfo,
    MseTime,
};

/// Process-unique channel identifier, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingId(pub u32);

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Link lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Authorizing,
    Authenticating,
    Encrypting,
    ConnectingWaiting,
    ConnectingDevice,
    Connecting,
    Connected,
}

/// The request currently in flight on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    None,
    Abort,
    EnableNotifications,
    SetFolder,
    SetFolderAbsolute,
    GetFolderListing,
    GetFolderListingSize,
    GetMessageListing,
    GetMessageListingSize,
    GetMessage,
    SetMessageStatus,
    PushMessage,
    UpdateInbox,
    SendEvent,
}

impl Operation {
    /// Operations that may be submitted again while already active, one
    /// part of a multi-part body at a time.
    pub fn is_reentrant(&self) -> bool {
        matches!(self, Self::PushMessage | Self::SendEvent)
    }
}

/// Parameters of the request in flight, kept so a CONTINUE can be
/// answered by resubmitting it or by sending the next body chunk.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LastRequest {
    FolderListing {
        max_list_count: u16,
        list_start_offset: u16,
    },
    MessageListing {
        folder: Option<Vec<u16>>,
        max_list_count: u16,
        list_start_offset: u16,
        info: Option<MessageListingInfo>,
    },
    Message {
        handle: String,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    },
    Push {
        folder: Option<Vec<u16>>,
        transparent: bool,
        retry: bool,
        charset: CharSet,
    },
    Registration {
        enabled: bool,
    },
}

/// Application parameters of an MSE response whose body is still being
/// sent, repeated on every continuation packet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResponseHeader {
    FolderListing,
    MessageListing {
        message_count: u16,
        new_message: bool,
        mse_time: Option<MseTime>,
    },
    Message {
        fractional_type: FractionalType,
    },
}

/// Pending port-availability poll.
pub(crate) struct RetryTimer {
    pub handle: JoinHandle<()>,
    pub generation: u64,
}

/// One registered server, client connection or notification channel.
pub struct Channel {
    pub(crate) tracking_id: TrackingId,
    pub(crate) session_id: Option<u32>,
    pub(crate) connection_type: ConnectionType,
    pub(crate) instance_id: u32,
    pub(crate) port: u32,
    pub(crate) owner: ClientId,
    pub(crate) callback: Option<EventCallback>,
    pub(crate) flags: u32,
    pub(crate) supported_message_types: u32,

    pub(crate) notifications_enabled: bool,
    pub(crate) pending_enable_notification: bool,
    pub(crate) pending_abort: bool,
    pub(crate) is_server: bool,

    pub(crate) remote_address: BdAddr,
    pub(crate) state: ConnectionState,
    pub(crate) operation: Operation,

    pub(crate) current_path: String,
    pub(crate) pending_path: String,
    pub(crate) walk: Option<AbsoluteWalk>,

    pub(crate) transfer: Option<OutgoingTransfer>,
    pub(crate) response_header: Option<ResponseHeader>,
    pub(crate) cached_push_handle: Option<String>,
    pub(crate) last_push_final: bool,
    pub(crate) last_request: Option<LastRequest>,
    /// A client request was submitted and its confirmation has not arrived.
    pub(crate) awaiting_response: bool,

    pub(crate) waiter: Option<oneshot::Sender<ConnectionStatus>>,
    pub(crate) retry_timer: Option<RetryTimer>,
    pub(crate) retry_attempts: u32,
    pub(crate) timer_generation: u64,

    pub(crate) sdp_record_handle: Option<u32>,
}

impl Channel {
    pub(crate) fn new(
        tracking_id: TrackingId,
        connection_type: ConnectionType,
        owner: ClientId,
        callback: Option<EventCallback>,
    ) -> Self {
        Self {
            tracking_id,
            session_id: None,
            connection_type,
            instance_id: 0,
            port: 0,
            owner,
            callback,
            flags: 0,
            supported_message_types: 0,
            notifications_enabled: false,
            pending_enable_notification: false,
            pending_abort: false,
            is_server: connection_type.is_server(),
            remote_address: BdAddr::NULL,
            state: ConnectionState::Idle,
            operation: Operation::None,
            current_path: String::new(),
            pending_path: String::new(),
            walk: None,
            transfer: None,
            response_header: None,
            cached_push_handle: None,
            last_push_final: true,
            last_request: None,
            awaiting_response: false,
            waiter: None,
            retry_timer: None,
            retry_attempts: 0,
            timer_generation: 0,
            sdp_record_handle: None,
        }
    }

    pub fn tracking_id(&self) -> TrackingId {
        self.tracking_id
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    pub fn remote_address(&self) -> BdAddr {
        self.remote_address
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub(crate) fn is_client(&self) -> bool {
        !self.is_server
    }

    pub(crate) fn session(&self) -> Result<u32> {
        self.session_id.ok_or(MapError::DeviceNotConnected)
    }

    /// Try to make `op` the active operation.
    pub(crate) fn begin_operation(&mut self, op: Operation) -> Result<()> {
        let allowed = self.operation == Operation::None
            || (op.is_reentrant() && self.operation == op && !self.pending_abort);
        if !allowed {
            return Err(MapError::InvalidOperation);
        }
        self.operation = op;
        Ok(())
    }

    /// Flag the active operation for abort at its next continuation point.
    pub(crate) fn request_abort(&mut self) -> Result<()> {
        if !self.is_client() {
            return Err(MapError::InvalidOperation);
        }
        if self.pending_abort {
            return Err(MapError::AbortOperationInProgress);
        }
        if self.operation == Operation::None {
            return Err(MapError::NoOperationInProgress);
        }
        self.pending_abort = true;
        Ok(())
    }

    /// Return to no active operation and drop any in-progress transfer.
    pub(crate) fn finish_operation(&mut self) {
        self.operation = Operation::None;
        self.awaiting_response = false;
        self.transfer = None;
        self.response_header = None;
        self.last_request = None;
        self.walk = None;
    }

    /// Cancel a pending port-retry poll, if any.
    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.handle.abort();
        }
    }

    /// Release every resource held by an unlinked channel.
    ///
    /// Must be called after [`Registry::remove`](super::registry::Registry::remove);
    /// unlinking alone releases nothing.
    pub(crate) fn cleanup(&mut self) {
        debug!("Cleaning up channel {}", self.tracking_id);
        self.cancel_timer();
        self.transfer = None;
        self.response_header = None;
        self.last_request = None;
        self.walk = None;
        self.waiter = None;
        self.cached_push_handle = None;
    }

    pub(crate) fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            tracking_id: self.tracking_id,
            connection_type: self.connection_type,
            session_id: self.session_id,
            instance_id: self.instance_id,
            port: self.port,
            owner: self.owner,
            remote_address: self.remote_address,
            state: self.state,
            operation: self.operation,
            current_path: self.current_path.clone(),
            notifications_enabled: self.notifications_enabled,
            pending_enable_notification: self.pending_enable_notification,
            pending_abort: self.pending_abort,
            buffered_bytes: self
                .transfer
                .as_ref()
                .map(|t| t.remaining().len())
                .unwrap_or(0),
            retry_pending: self.retry_timer.is_some(),
        }
    }
}

/// Read-only copy of a channel's public state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    pub tracking_id: TrackingId,
    pub connection_type: ConnectionType,
    pub session_id: Option<u32>,
    pub instance_id: u32,
    pub port: u32,
    pub owner: ClientId,
    pub remote_address: BdAddr,
    pub state: ConnectionState,
    pub operation: Operation,
    pub current_path: String,
    pub notifications_enabled: bool,
    pub pending_enable_notification: bool,
    pub pending_abort: bool,
    pub buffered_bytes: usize,
    pub retry_pending: bool,
}
