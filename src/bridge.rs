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

//! JSON-lines bridge between the manager and an external Bluetooth stack.
//!
//! Everything the manager asks of its transport, link manager or remote
//! clients becomes one [`BridgeOutput`] line. Everything the stack reports
//! arrives as one [`BridgeInput`] line.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::address::BdAddr;
use crate::error::{DeviceError, TransportError};
use crate::events::base64_bytes;
use crate::manager::MapManager;
use crate::map::sdp::SdpRecord;
use crate::map::status::obex;
use crate::map::types::{
    CharSet, ClientId, FractionalType, MessageListingInfo, MseTime, SetFolderOption,
    StatusIndicator,
};
use crate::transport::{
    DeviceEvent, DeviceManager, IpcSender, LinkSecurity, LinkStatus, MapTransport,
    TransportEvent, TransportResult,
};

/// Highest RFCOMM server channel.
const MAX_SERVER_PORT: u32 = 30;

/// One line read from the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum BridgeInput {
    /// A serialized request from a remote client.
    ClientRequest { client: ClientId, request: Value },
    /// A remote client went away.
    ClientGone { client: ClientId },
    Transport { event: TransportEvent },
    Device { event: DeviceEvent },
    /// A previous connection to `port` is still being torn down.
    PortBusy { address: BdAddr, port: u32 },
    PortFree { address: BdAddr, port: u32 },
    /// Service records discovered on a remote device.
    ServiceRecords {
        address: BdAddr,
        records: Vec<SdpRecord>,
    },
}

/// Requests for the message access transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TransportCommand {
    OpenAccessServer {
        session_id: u32,
        port: u32,
    },
    OpenNotificationServer {
        session_id: u32,
        port: u32,
    },
    CloseServer {
        session_id: u32,
    },
    OpenRequestResponse {
        session_id: u32,
        accept: bool,
    },
    RegisterAccessRecord {
        session_id: u32,
        record_handle: u32,
        service_name: String,
        instance_id: u32,
        supported_message_types: u32,
    },
    RegisterNotificationRecord {
        session_id: u32,
        record_handle: u32,
        service_name: String,
    },
    UnregisterRecord {
        session_id: u32,
        record_handle: u32,
    },
    OpenRemoteAccessPort {
        session_id: u32,
        address: BdAddr,
        port: u32,
    },
    OpenRemoteNotificationPort {
        session_id: u32,
        address: BdAddr,
        port: u32,
    },
    CloseConnection {
        session_id: u32,
    },
    Abort {
        session_id: u32,
    },

    SetNotificationRegistration {
        session_id: u32,
        enabled: bool,
    },
    SetFolder {
        session_id: u32,
        option: SetFolderOption,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<Vec<u16>>,
    },
    GetFolderListing {
        session_id: u32,
        max_list_count: u16,
        list_start_offset: u16,
    },
    GetMessageListing {
        session_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<Vec<u16>>,
        max_list_count: u16,
        list_start_offset: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        listing_info: Option<MessageListingInfo>,
    },
    GetMessage {
        session_id: u32,
        message_handle: String,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    },
    SetMessageStatus {
        session_id: u32,
        message_handle: String,
        status_indicator: StatusIndicator,
        status_value: bool,
    },
    PushMessage {
        session_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        folder_name: Option<Vec<u16>>,
        transparent: bool,
        retry: bool,
        charset: CharSet,
        is_final: bool,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    UpdateInbox {
        session_id: u32,
    },
    SendEvent {
        session_id: u32,
        instance_id: u32,
        is_final: bool,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },

    SetNotificationRegistrationResponse {
        session_id: u32,
        response_code: u8,
    },
    SetFolderResponse {
        session_id: u32,
        response_code: u8,
    },
    FolderListingResponse {
        session_id: u32,
        response_code: u8,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    FolderListingSizeResponse {
        session_id: u32,
        response_code: u8,
        folder_count: u16,
    },
    MessageListingResponse {
        session_id: u32,
        response_code: u8,
        message_count: u16,
        new_message: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mse_time: Option<MseTime>,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    MessageListingSizeResponse {
        session_id: u32,
        response_code: u8,
        message_count: u16,
        new_message: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mse_time: Option<MseTime>,
    },
    MessageResponse {
        session_id: u32,
        response_code: u8,
        fractional_type: FractionalType,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    SetMessageStatusResponse {
        session_id: u32,
        response_code: u8,
    },
    PushMessageResponse {
        session_id: u32,
        response_code: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_handle: Option<String>,
    },
    UpdateInboxResponse {
        session_id: u32,
        response_code: u8,
    },
    SendEventResponse {
        session_id: u32,
        response_code: u8,
    },
}

/// Requests for the link manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum LinkCommand {
    Connect {
        address: BdAddr,
        authenticate: bool,
        encrypt: bool,
    },
    Authenticate {
        address: BdAddr,
    },
    Encrypt {
        address: BdAddr,
    },
    Disconnect {
        address: BdAddr,
    },
    ReservePort {
        reservation_id: u32,
        port: u32,
    },
    ReleasePortReservation {
        reservation_id: u32,
    },
}

/// One line written to the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output", rename_all = "snake_case")]
pub enum BridgeOutput {
    Transport { command: TransportCommand },
    Link { command: LinkCommand },
    Ipc { client: ClientId, message: Value },
}

/// What the bridge knows about the local device and its peers.
#[derive(Debug, Default)]
struct DeviceTable {
    powered: bool,
    busy_ports: HashSet<(BdAddr, u32)>,
    service_records: HashMap<BdAddr, Vec<SdpRecord>>,
    /// Listening sessions by id, with their port.
    listeners: BTreeMap<u32, u32>,
    /// Port reservations by id.
    reservations: BTreeMap<u32, u32>,
}

impl DeviceTable {
    fn ports_taken(&self) -> BTreeSet<u32> {
        self.listeners
            .values()
            .chain(self.reservations.values())
            .copied()
            .collect()
    }
}

/// Transport, link manager and IPC sender backed by JSON lines.
pub struct StdioBridge {
    out: mpsc::UnboundedSender<BridgeOutput>,
    max_packet_size: usize,
    next_session: AtomicU32,
    next_handle: AtomicU32,
    table: Mutex<DeviceTable>,
}

impl StdioBridge {
    pub fn new(out: mpsc::UnboundedSender<BridgeOutput>, max_packet_size: usize) -> Self {
        Self {
            out,
            max_packet_size: max_packet_size.max(1),
            next_session: AtomicU32::new(1),
            next_handle: AtomicU32::new(0x10000),
            table: Mutex::new(DeviceTable::default()),
        }
    }

    fn emit(&self, output: BridgeOutput) -> TransportResult<()> {
        self.out
            .send(output)
            .map_err(|_| TransportError::Failed("bridge output closed".into()))
    }

    fn command(&self, command: TransportCommand) -> TransportResult<()> {
        self.emit(BridgeOutput::Transport { command })
    }

    fn link(&self, command: LinkCommand) -> Result<(), DeviceError> {
        self.out
            .send(BridgeOutput::Link { command })
            .map_err(|_| DeviceError::Other("bridge output closed".into()))
    }

    fn allocate_session(&self) -> u32 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    fn allocate_handle(&self) -> u32 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// The part of `data` that fits in one packet.
    fn fit<'d>(&self, data: &'d [u8]) -> &'d [u8] {
        &data[..data.len().min(self.max_packet_size)]
    }

    fn require_powered(&self) -> Result<(), DeviceError> {
        if self.table.lock().powered {
            Ok(())
        } else {
            Err(DeviceError::PoweredDown)
        }
    }

    fn open_server(&self, port: u32, notification: bool) -> TransportResult<u32> {
        let mut table = self.table.lock();
        if table.listeners.values().any(|p| *p == port) {
            return Err(TransportError::PortInUse(port));
        }
        let session_id = self.allocate_session();
        let command = if notification {
            TransportCommand::OpenNotificationServer { session_id, port }
        } else {
            TransportCommand::OpenAccessServer { session_id, port }
        };
        self.command(command)?;
        table.listeners.insert(session_id, port);
        Ok(session_id)
    }

    /// Apply one input line to the bridge state or the manager.
    pub fn handle_input(&self, manager: &MapManager, input: BridgeInput) {
        match input {
            BridgeInput::ClientRequest { client, request } => {
                manager.serve_client_request(client, &request.to_string())
            }
            BridgeInput::ClientGone { client } => {
                info!("Remote client {} went away", client);
                manager.unregister_client(client);
            }
            BridgeInput::Transport { event } => manager.handle_transport_event(event),
            BridgeInput::Device { event } => {
                match event {
                    DeviceEvent::PoweredOn => self.table.lock().powered = true,
                    DeviceEvent::PoweredOff => {
                        let mut table = self.table.lock();
                        table.powered = false;
                        table.listeners.clear();
                    }
                    DeviceEvent::LinkStatus { .. } => {}
                }
                manager.handle_device_event(event);
            }
            BridgeInput::PortBusy { address, port } => {
                self.table.lock().busy_ports.insert((address, port));
            }
            BridgeInput::PortFree { address, port } => {
                self.table.lock().busy_ports.remove(&(address, port));
            }
            BridgeInput::ServiceRecords { address, records } => {
                debug!("{} service records cached for {}", records.len(), address);
                self.table.lock().service_records.insert(address, records);
            }
        }
    }

    /// Feed input lines to the manager until `reader` ends.
    pub async fn run<R>(&self, manager: &MapManager, reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await.context("Failed to read bridge input")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<BridgeInput>(line) {
                Ok(input) => self.handle_input(manager, input),
                Err(e) => warn!("Ignoring malformed bridge input: {}", e),
            }
        }
        info!("Bridge input closed");
        Ok(())
    }
}

impl MapTransport for StdioBridge {
    fn open_access_server(&self, port: u32) -> TransportResult<u32> {
        self.open_server(port, false)
    }

    fn open_notification_server(&self, port: u32) -> TransportResult<u32> {
        self.open_server(port, true)
    }

    fn close_server(&self, session_id: u32) -> TransportResult<()> {
        self.table.lock().listeners.remove(&session_id);
        self.command(TransportCommand::CloseServer { session_id })
    }

    fn open_request_response(&self, session_id: u32, accept: bool) -> TransportResult<()> {
        self.command(TransportCommand::OpenRequestResponse { session_id, accept })
    }

    fn register_access_record(
        &self,
        session_id: u32,
        service_name: &str,
        instance_id: u32,
        supported_message_types: u32,
    ) -> TransportResult<u32> {
        let record_handle = self.allocate_handle();
        self.command(TransportCommand::RegisterAccessRecord {
            session_id,
            record_handle,
            service_name: service_name.to_string(),
            instance_id,
            supported_message_types,
        })?;
        Ok(record_handle)
    }

    fn register_notification_record(&self, session_id: u32, service_name: &str) -> TransportResult<u32> {
        let record_handle = self.allocate_handle();
        self.command(TransportCommand::RegisterNotificationRecord {
            session_id,
            record_handle,
            service_name: service_name.to_string(),
        })?;
        Ok(record_handle)
    }

    fn unregister_record(&self, session_id: u32, record_handle: u32) -> TransportResult<()> {
        self.command(TransportCommand::UnregisterRecord {
            session_id,
            record_handle,
        })
    }

    fn open_remote_access_port(&self, address: BdAddr, port: u32) -> TransportResult<u32> {
        let session_id = self.allocate_session();
        self.command(TransportCommand::OpenRemoteAccessPort {
            session_id,
            address,
            port,
        })?;
        Ok(session_id)
    }

    fn open_remote_notification_port(&self, address: BdAddr, port: u32) -> TransportResult<u32> {
        let session_id = self.allocate_session();
        self.command(TransportCommand::OpenRemoteNotificationPort {
            session_id,
            address,
            port,
        })?;
        Ok(session_id)
    }

    fn close_connection(&self, session_id: u32) -> TransportResult<()> {
        self.command(TransportCommand::CloseConnection { session_id })
    }

    fn abort_request(&self, session_id: u32) -> TransportResult<()> {
        self.command(TransportCommand::Abort { session_id })
    }

    fn set_notification_registration(&self, session_id: u32, enabled: bool) -> TransportResult<()> {
        self.command(TransportCommand::SetNotificationRegistration { session_id, enabled })
    }

    fn set_folder(
        &self,
        session_id: u32,
        option: SetFolderOption,
        name: Option<&[u16]>,
    ) -> TransportResult<()> {
        self.command(TransportCommand::SetFolder {
            session_id,
            option,
            folder_name: name.map(<[u16]>::to_vec),
        })
    }

    fn get_folder_listing(
        &self,
        session_id: u32,
        max_list_count: u16,
        list_start_offset: u16,
    ) -> TransportResult<()> {
        self.command(TransportCommand::GetFolderListing {
            session_id,
            max_list_count,
            list_start_offset,
        })
    }

    fn get_message_listing(
        &self,
        session_id: u32,
        folder: Option<&[u16]>,
        max_list_count: u16,
        list_start_offset: u16,
        info: Option<&MessageListingInfo>,
    ) -> TransportResult<()> {
        self.command(TransportCommand::GetMessageListing {
            session_id,
            folder_name: folder.map(<[u16]>::to_vec),
            max_list_count,
            list_start_offset,
            listing_info: info.cloned(),
        })
    }

    fn get_message(
        &self,
        session_id: u32,
        message_handle: &str,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    ) -> TransportResult<()> {
        self.command(TransportCommand::GetMessage {
            session_id,
            message_handle: message_handle.to_string(),
            attachment,
            charset,
            fractional_type,
        })
    }

    fn set_message_status(
        &self,
        session_id: u32,
        message_handle: &str,
        indicator: StatusIndicator,
        value: bool,
    ) -> TransportResult<()> {
        self.command(TransportCommand::SetMessageStatus {
            session_id,
            message_handle: message_handle.to_string(),
            status_indicator: indicator,
            status_value: value,
        })
    }

    fn push_message(
        &self,
        session_id: u32,
        folder: Option<&[u16]>,
        transparent: bool,
        retry: bool,
        charset: CharSet,
        data: &[u8],
        is_final: bool,
    ) -> TransportResult<usize> {
        let chunk = self.fit(data);
        self.command(TransportCommand::PushMessage {
            session_id,
            folder_name: folder.map(<[u16]>::to_vec),
            transparent,
            retry,
            charset,
            is_final: is_final && chunk.len() == data.len(),
            data: chunk.to_vec(),
        })?;
        Ok(chunk.len())
    }

    fn update_inbox(&self, session_id: u32) -> TransportResult<()> {
        self.command(TransportCommand::UpdateInbox { session_id })
    }

    fn set_notification_registration_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.command(TransportCommand::SetNotificationRegistrationResponse {
            session_id,
            response_code: code,
        })
    }

    fn set_folder_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.command(TransportCommand::SetFolderResponse {
            session_id,
            response_code: code,
        })
    }

    fn folder_listing_response(&self, session_id: u32, code: u8, data: &[u8]) -> TransportResult<usize> {
        let chunk = self.fit(data);
        self.command(TransportCommand::FolderListingResponse {
            session_id,
            response_code: body_code(code, chunk.len() < data.len()),
            data: chunk.to_vec(),
        })?;
        Ok(chunk.len())
    }

    fn folder_listing_size_response(
        &self,
        session_id: u32,
        code: u8,
        folder_count: u16,
    ) -> TransportResult<()> {
        self.command(TransportCommand::FolderListingSizeResponse {
            session_id,
            response_code: code,
            folder_count,
        })
    }

    fn message_listing_response(
        &self,
        session_id: u32,
        code: u8,
        message_count: u16,
        new_message: bool,
        mse_time: Option<&MseTime>,
        data: &[u8],
    ) -> TransportResult<usize> {
        let chunk = self.fit(data);
        self.command(TransportCommand::MessageListingResponse {
            session_id,
            response_code: body_code(code, chunk.len() < data.len()),
            message_count,
            new_message,
            mse_time: mse_time.cloned(),
            data: chunk.to_vec(),
        })?;
        Ok(chunk.len())
    }

    fn message_listing_size_response(
        &self,
        session_id: u32,
        code: u8,
        message_count: u16,
        new_message: bool,
        mse_time: Option<&MseTime>,
    ) -> TransportResult<()> {
        self.command(TransportCommand::MessageListingSizeResponse {
            session_id,
            response_code: code,
            message_count,
            new_message,
            mse_time: mse_time.cloned(),
        })
    }

    fn message_response(
        &self,
        session_id: u32,
        code: u8,
        fractional_type: FractionalType,
        data: &[u8],
    ) -> TransportResult<usize> {
        let chunk = self.fit(data);
        self.command(TransportCommand::MessageResponse {
            session_id,
            response_code: body_code(code, chunk.len() < data.len()),
            fractional_type,
            data: chunk.to_vec(),
        })?;
        Ok(chunk.len())
    }

    fn set_message_status_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.command(TransportCommand::SetMessageStatusResponse {
            session_id,
            response_code: code,
        })
    }

    fn push_message_response(
        &self,
        session_id: u32,
        code: u8,
        message_handle: Option<&str>,
    ) -> TransportResult<()> {
        self.command(TransportCommand::PushMessageResponse {
            session_id,
            response_code: code,
            message_handle: message_handle.map(str::to_string),
        })
    }

    fn update_inbox_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.command(TransportCommand::UpdateInboxResponse {
            session_id,
            response_code: code,
        })
    }

    fn send_event_request(
        &self,
        session_id: u32,
        instance_id: u32,
        data: &[u8],
        is_final: bool,
    ) -> TransportResult<usize> {
        let chunk = self.fit(data);
        self.command(TransportCommand::SendEvent {
            session_id,
            instance_id,
            is_final: is_final && chunk.len() == data.len(),
            data: chunk.to_vec(),
        })?;
        Ok(chunk.len())
    }

    fn send_event_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.command(TransportCommand::SendEventResponse {
            session_id,
            response_code: code,
        })
    }
}

/// A body that did not fit goes out as CONTINUE.
fn body_code(code: u8, truncated: bool) -> u8 {
    if truncated {
        obex::CONTINUE
    } else {
        code
    }
}

impl DeviceManager for StdioBridge {
    fn connect_with_remote_device(
        &self,
        address: BdAddr,
        security: LinkSecurity,
    ) -> Result<LinkStatus, DeviceError> {
        self.require_powered()?;
        self.link(LinkCommand::Connect {
            address,
            authenticate: security.authenticate,
            encrypt: security.encrypt,
        })?;
        Ok(LinkStatus::Pending)
    }

    fn authenticate_remote_device(&self, address: BdAddr) -> Result<LinkStatus, DeviceError> {
        self.require_powered()?;
        self.link(LinkCommand::Authenticate { address })?;
        Ok(LinkStatus::Pending)
    }

    fn encrypt_remote_device(&self, address: BdAddr) -> Result<LinkStatus, DeviceError> {
        self.require_powered()?;
        self.link(LinkCommand::Encrypt { address })?;
        Ok(LinkStatus::Pending)
    }

    fn disconnect_remote_device(&self, address: BdAddr) -> Result<(), DeviceError> {
        self.link(LinkCommand::Disconnect { address })
    }

    fn remote_port_in_use(&self, address: BdAddr, port: u32) -> bool {
        self.table.lock().busy_ports.contains(&(address, port))
    }

    fn find_free_server_port(&self) -> Option<u32> {
        let taken = self.table.lock().ports_taken();
        (1..=MAX_SERVER_PORT).find(|port| !taken.contains(port))
    }

    fn reserve_port(&self, port: u32) -> Result<u32, DeviceError> {
        let mut table = self.table.lock();
        if table.ports_taken().contains(&port) {
            return Err(DeviceError::Other(format!("port {} already claimed", port)));
        }
        let reservation_id = self.allocate_handle();
        self.link(LinkCommand::ReservePort { reservation_id, port })?;
        table.reservations.insert(reservation_id, port);
        Ok(reservation_id)
    }

    fn release_port_reservation(&self, reservation_id: u32) {
        if self.table.lock().reservations.remove(&reservation_id).is_none() {
            return;
        }
        if let Err(e) = self.link(LinkCommand::ReleasePortReservation { reservation_id }) {
            warn!("Failed to release reservation {}: {}", reservation_id, e);
        }
    }

    fn query_remote_service_data(&self, address: BdAddr) -> Option<Vec<SdpRecord>> {
        self.table.lock().service_records.get(&address).cloned()
    }
}

impl IpcSender for StdioBridge {
    fn send(&self, client: ClientId, message: String) {
        let message = serde_json::from_str(&message).unwrap_or(Value::String(message));
        if self.emit(BridgeOutput::Ipc { client, message }).is_err() {
            warn!("Dropping message for {}: bridge output closed", client);
        }
    }
}
