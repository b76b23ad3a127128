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

//! Test harness: a manager wired to a stdio bridge whose output is captured.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use mapm_manager::bridge::{BridgeInput, BridgeOutput, LinkCommand, StdioBridge, TransportCommand};
use mapm_manager::config::ManagerConfig;
use mapm_manager::map::types::{
    CharSet, ClientId, ConnectionStatus, ConnectionType, FractionalType, MessageListingInfo, MseTime,
    SetFolderOption, StatusIndicator,
};
use mapm_manager::map::TrackingId;
use mapm_manager::transport::{LinkProcedure, MapTransport, TransportResult};
use mapm_manager::{
    BdAddr, DeviceEvent, EventCallback, EventKind, MapEvent, MapManager, TransportError, TransportEvent,
};

pub const MAS_PORT: u32 = 5;
pub const NOTIFICATION_PORT: u32 = 17;

pub fn peer() -> BdAddr {
    BdAddr::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13])
}

pub fn other_peer() -> BdAddr {
    BdAddr::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x14])
}

/// Transport in front of the bridge that can be told to fail the next call.
pub struct FlakyTransport {
    bridge: Arc<StdioBridge>,
    fail_next: AtomicBool,
}

impl FlakyTransport {
    fn new(bridge: Arc<StdioBridge>) -> Self {
        Self {
            bridge,
            fail_next: AtomicBool::new(false),
        }
    }

    fn check(&self) -> TransportResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Failed("link dropped".to_string()));
        }
        Ok(())
    }
}

impl MapTransport for FlakyTransport {
    fn open_access_server(&self, port: u32) -> TransportResult<u32> {
        self.check()?;
        self.bridge.open_access_server(port)
    }

    fn open_notification_server(&self, port: u32) -> TransportResult<u32> {
        self.check()?;
        self.bridge.open_notification_server(port)
    }

    fn close_server(&self, session_id: u32) -> TransportResult<()> {
        self.check()?;
        self.bridge.close_server(session_id)
    }

    fn open_request_response(&self, session_id: u32, accept: bool) -> TransportResult<()> {
        self.check()?;
        self.bridge.open_request_response(session_id, accept)
    }

    fn register_access_record(
        &self,
        session_id: u32,
        service_name: &str,
        instance_id: u32,
        supported_message_types: u32,
    ) -> TransportResult<u32> {
        self.check()?;
        self.bridge
            .register_access_record(session_id, service_name, instance_id, supported_message_types)
    }

    fn register_notification_record(&self, session_id: u32, service_name: &str) -> TransportResult<u32> {
        self.check()?;
        self.bridge.register_notification_record(session_id, service_name)
    }

    fn unregister_record(&self, session_id: u32, record_handle: u32) -> TransportResult<()> {
        self.check()?;
        self.bridge.unregister_record(session_id, record_handle)
    }

    fn open_remote_access_port(&self, address: BdAddr, port: u32) -> TransportResult<u32> {
        self.check()?;
        self.bridge.open_remote_access_port(address, port)
    }

    fn open_remote_notification_port(&self, address: BdAddr, port: u32) -> TransportResult<u32> {
        self.check()?;
        self.bridge.open_remote_notification_port(address, port)
    }

    fn close_connection(&self, session_id: u32) -> TransportResult<()> {
        self.check()?;
        self.bridge.close_connection(session_id)
    }

    fn abort_request(&self, session_id: u32) -> TransportResult<()> {
        self.check()?;
        self.bridge.abort_request(session_id)
    }

    fn set_notification_registration(&self, session_id: u32, enabled: bool) -> TransportResult<()> {
        self.check()?;
        self.bridge.set_notification_registration(session_id, enabled)
    }

    fn set_folder(&self, session_id: u32, option: SetFolderOption, name: Option<&[u16]>) -> TransportResult<()> {
        self.check()?;
        self.bridge.set_folder(session_id, option, name)
    }

    fn get_folder_listing(&self, session_id: u32, max_list_count: u16, list_start_offset: u16) -> TransportResult<()> {
        self.check()?;
        self.bridge
            .get_folder_listing(session_id, max_list_count, list_start_offset)
    }

    fn get_message_listing(
        &self,
        session_id: u32,
        folder: Option<&[u16]>,
        max_list_count: u16,
        list_start_offset: u16,
        info: Option<&MessageListingInfo>,
    ) -> TransportResult<()> {
        self.check()?;
        self.bridge
            .get_message_listing(session_id, folder, max_list_count, list_start_offset, info)
    }

    fn get_message(
        &self,
        session_id: u32,
        message_handle: &str,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    ) -> TransportResult<()> {
        self.check()?;
        self.bridge
            .get_message(session_id, message_handle, attachment, charset, fractional_type)
    }

    fn set_message_status(
        &self,
        session_id: u32,
        message_handle: &str,
        indicator: StatusIndicator,
        value: bool,
    ) -> TransportResult<()> {
        self.check()?;
        self.bridge
            .set_message_status(session_id, message_handle, indicator, value)
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
        self.check()?;
        self.bridge
            .push_message(session_id, folder, transparent, retry, charset, data, is_final)
    }

    fn update_inbox(&self, session_id: u32) -> TransportResult<()> {
        self.check()?;
        self.bridge.update_inbox(session_id)
    }

    fn set_notification_registration_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.check()?;
        self.bridge.set_notification_registration_response(session_id, code)
    }

    fn set_folder_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.check()?;
        self.bridge.set_folder_response(session_id, code)
    }

    fn folder_listing_response(&self, session_id: u32, code: u8, data: &[u8]) -> TransportResult<usize> {
        self.check()?;
        self.bridge.folder_listing_response(session_id, code, data)
    }

    fn folder_listing_size_response(&self, session_id: u32, code: u8, folder_count: u16) -> TransportResult<()> {
        self.check()?;
        self.bridge
            .folder_listing_size_response(session_id, code, folder_count)
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
        self.check()?;
        self.bridge
            .message_listing_response(session_id, code, message_count, new_message, mse_time, data)
    }

    fn message_listing_size_response(
        &self,
        session_id: u32,
        code: u8,
        message_count: u16,
        new_message: bool,
        mse_time: Option<&MseTime>,
    ) -> TransportResult<()> {
        self.check()?;
        self.bridge
            .message_listing_size_response(session_id, code, message_count, new_message, mse_time)
    }

    fn message_response(
        &self,
        session_id: u32,
        code: u8,
        fractional_type: FractionalType,
        data: &[u8],
    ) -> TransportResult<usize> {
        self.check()?;
        self.bridge
            .message_response(session_id, code, fractional_type, data)
    }

    fn set_message_status_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.check()?;
        self.bridge.set_message_status_response(session_id, code)
    }

    fn push_message_response(&self, session_id: u32, code: u8, message_handle: Option<&str>) -> TransportResult<()> {
        self.check()?;
        self.bridge
            .push_message_response(session_id, code, message_handle)
    }

    fn update_inbox_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.check()?;
        self.bridge.update_inbox_response(session_id, code)
    }

    fn send_event_request(
        &self,
        session_id: u32,
        instance_id: u32,
        data: &[u8],
        is_final: bool,
    ) -> TransportResult<usize> {
        self.check()?;
        self.bridge
            .send_event_request(session_id, instance_id, data, is_final)
    }

    fn send_event_response(&self, session_id: u32, code: u8) -> TransportResult<()> {
        self.check()?;
        self.bridge.send_event_response(session_id, code)
    }
}

pub struct Harness {
    pub manager: MapManager,
    pub bridge: Arc<StdioBridge>,
    transport: Arc<FlakyTransport>,
    outputs: mpsc::UnboundedReceiver<BridgeOutput>,
    events: Arc<Mutex<Vec<MapEvent>>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(
            ManagerConfig {
                notification_port: NOTIFICATION_PORT,
                ..Default::default()
            },
            4096,
        )
    }

    pub fn with_config(config: ManagerConfig, max_packet_size: usize) -> Self {
        let (tx, outputs) = mpsc::unbounded_channel();
        let bridge = Arc::new(StdioBridge::new(tx, max_packet_size));
        let transport = Arc::new(FlakyTransport::new(bridge.clone()));
        let manager = MapManager::new(config, transport.clone(), bridge.clone(), bridge.clone());
        Self {
            manager,
            bridge,
            transport,
            outputs,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Powered harness with nothing registered yet.
    pub fn powered() -> Self {
        let mut harness = Self::new();
        harness.power_on();
        harness.outputs();
        harness
    }

    /// Make the next transport call fail.
    pub fn fail_next_submission(&self) {
        self.transport.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn callback(&self) -> EventCallback {
        let events = self.events.clone();
        Arc::new(move |event: &MapEvent| events.lock().push(event.clone()))
    }

    pub fn input(&self, input: BridgeInput) {
        self.bridge.handle_input(&self.manager, input);
    }

    pub fn power_on(&self) {
        self.input(BridgeInput::Device {
            event: DeviceEvent::PoweredOn,
        });
    }

    pub fn power_off(&self) {
        self.input(BridgeInput::Device {
            event: DeviceEvent::PoweredOff,
        });
    }

    pub fn transport(&self, event: TransportEvent) {
        self.input(BridgeInput::Transport { event });
    }

    pub fn link_up(&self, address: BdAddr) {
        self.input(BridgeInput::Device {
            event: DeviceEvent::LinkStatus {
                address,
                procedure: LinkProcedure::Connection,
                error: None,
            },
        });
    }

    /// Everything the bridge wrote since the last drain.
    pub fn outputs(&mut self) -> Vec<BridgeOutput> {
        let mut drained = Vec::new();
        while let Ok(output) = self.outputs.try_recv() {
            drained.push(output);
        }
        drained
    }

    /// Drain the output, keeping transport commands.
    pub fn commands(&mut self) -> Vec<TransportCommand> {
        self.outputs()
            .into_iter()
            .filter_map(|o| match o {
                BridgeOutput::Transport { command } => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Drain the output, keeping link manager commands.
    pub fn links(&mut self) -> Vec<LinkCommand> {
        self.outputs()
            .into_iter()
            .filter_map(|o| match o {
                BridgeOutput::Link { command } => Some(command),
                _ => None,
            })
            .collect()
    }

    /// Drain the output, keeping messages for remote clients.
    pub fn ipc(&mut self) -> Vec<(ClientId, Value)> {
        self.outputs()
            .into_iter()
            .filter_map(|o| match o {
                BridgeOutput::Ipc { client, message } => Some((client, message)),
                _ => None,
            })
            .collect()
    }

    /// Events delivered to local callbacks since the last call.
    pub fn events(&self) -> Vec<MapEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn event_kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }

    /// Run an outgoing message access connection to `peer()` through to
    /// Connected. Returns the tracking id and transport session.
    pub fn connect_client(&mut self, instance_id: u32) -> (TrackingId, u32) {
        let tracking_id = self
            .manager
            .connect_remote_device(
                ConnectionType::MessageAccessClient,
                peer(),
                MAS_PORT,
                instance_id,
                0,
                self.callback(),
            )
            .unwrap();
        self.link_up(peer());
        let session_id = self
            .commands()
            .into_iter()
            .find_map(|c| match c {
                TransportCommand::OpenRemoteAccessPort { session_id, .. } => Some(session_id),
                _ => None,
            })
            .expect("remote port opened");
        self.transport(TransportEvent::OpenPortConfirmation {
            session_id,
            status: ConnectionStatus::Success,
        });

        let events = self.event_kinds();
        assert_eq!(
            events,
            vec![EventKind::ConnectionStatus {
                connection_type: ConnectionType::MessageAccessClient,
                status: ConnectionStatus::Success,
            }]
        );
        (tracking_id, session_id)
    }

    /// Register a server without connection requirements and let `peer()`
    /// connect to it. Returns the server session.
    pub fn serve_peer(&mut self, instance_id: u32) -> u32 {
        self.manager
            .register_server(MAS_PORT, 0, instance_id, 0x0F, self.callback())
            .unwrap();
        let session_id = self
            .commands()
            .into_iter()
            .find_map(|c| match c {
                TransportCommand::OpenAccessServer { session_id, .. } => Some(session_id),
                _ => None,
            })
            .expect("server opened");
        self.transport(TransportEvent::OpenRequestIndication {
            session_id,
            address: peer(),
        });
        self.transport(TransportEvent::OpenPortIndication {
            session_id,
            address: peer(),
        });
        self.commands();
        self.events();
        session_id
    }
}
