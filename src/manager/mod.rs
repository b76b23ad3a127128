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

//! Message access session manager.
//!
//! [`MapManager`] owns every channel behind a single lock. Requests from
//! in-process callers and from remote clients run the same operations; the
//! only difference is the owner recorded on the channel and how events
//! reach it.

mod client_ops;
mod connection;
mod dispatch;
mod ipc_handler;
mod notification;
mod orchestrator;
mod server_ops;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::address::BdAddr;
use crate::config::ManagerConfig;
use crate::error::{MapError, Result};
use crate::events::EventCallback;
use crate::map::channel::{Channel, ChannelSnapshot, ConnectionState, TrackingId};
use crate::map::constants::limits;
use crate::map::registry::Registry;
use crate::map::sdp::ServiceDetails;
use crate::map::status::ResponseStatus;
use crate::map::types::{
    CharSet, ClientId, ConnectionStatus, ConnectionType, FractionalType, MessageListingInfo,
    MseTime, SetFolderOption, StatusIndicator,
};
use crate::transport::{DeviceEvent, DeviceManager, IpcSender, MapTransport, TransportEvent};

use dispatch::Outbox;
use notification::NotificationCoordinator;

/// Everything guarded by the manager lock.
pub(crate) struct ManagerState {
    pub powered: bool,
    pub registry: Registry,
    pub notification: NotificationCoordinator,
}

pub(crate) struct Shared {
    state: Mutex<ManagerState>,
    pub transport: Arc<dyn MapTransport>,
    pub devices: Arc<dyn DeviceManager>,
    pub ipc: Arc<dyn IpcSender>,
    pub config: ManagerConfig,
}

/// Application parameters of a message listing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListingHeader {
    pub message_count: u16,
    pub new_message: bool,
    pub mse_time: Option<MseTime>,
}

/// Locked state plus the outbox for one entry point.
pub(crate) struct Context<'a> {
    pub state: &'a mut ManagerState,
    pub shared: &'a Arc<Shared>,
    pub outbox: Outbox,
}

impl Shared {
    /// Run `f` under the lock, then deliver whatever it queued.
    pub(crate) fn with_context<R>(self: &Arc<Self>, f: impl FnOnce(&mut Context<'_>) -> R) -> R {
        let (result, outbox) = self.with_held_events(f);
        outbox.flush(self.ipc.as_ref());
        result
    }

    /// Run `f` under the lock and hand back what it queued, undelivered.
    pub(crate) fn with_held_events<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&mut Context<'_>) -> R,
    ) -> (R, Outbox) {
        let mut guard = self.state.lock();
        let mut ctx = Context {
            state: &mut *guard,
            shared: self,
            outbox: Outbox::default(),
        };
        let result = f(&mut ctx);
        (result, ctx.outbox)
    }
}

pub(crate) fn validate_address(address: BdAddr) -> Result<()> {
    if address.is_null() {
        return Err(MapError::InvalidParameter("remote address"));
    }
    Ok(())
}

pub(crate) fn validate_instance(instance_id: u32) -> Result<()> {
    if !limits::is_valid_instance(instance_id) {
        return Err(MapError::InvalidParameter("instance id"));
    }
    Ok(())
}

fn check_owner(channel: &Channel, owner: ClientId) -> Result<()> {
    if channel.owner != owner {
        return Err(MapError::InvalidClient);
    }
    Ok(())
}

/// Connected message access client owned by `owner`.
pub(crate) fn connected_client(
    registry: &mut Registry,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
) -> Result<&mut Channel> {
    validate_address(address)?;
    validate_instance(instance_id)?;
    let id = registry
        .access
        .search_by_connection(address, instance_id, false)
        .ok_or(MapError::DeviceNotConnected)?;
    let channel = registry.access.get_mut(id).ok_or(MapError::DeviceNotConnected)?;
    check_owner(channel, owner)?;
    if channel.state != ConnectionState::Connected {
        return Err(MapError::DeviceNotConnected);
    }
    Ok(channel)
}

/// Connected message access server owned by `owner`.
pub(crate) fn connected_server(
    registry: &mut Registry,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
) -> Result<&mut Channel> {
    validate_address(address)?;
    validate_instance(instance_id)?;
    let id = registry
        .access
        .search_by_connection(address, instance_id, true)
        .ok_or(MapError::DeviceNotConnected)?;
    let channel = registry.access.get_mut(id).ok_or(MapError::DeviceNotConnected)?;
    check_owner(channel, owner)?;
    if channel.state != ConnectionState::Connected {
        return Err(MapError::DeviceNotConnected);
    }
    Ok(channel)
}

/// Connected notification client owned by `owner`.
pub(crate) fn connected_notification_client(
    registry: &mut Registry,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
) -> Result<&mut Channel> {
    validate_address(address)?;
    validate_instance(instance_id)?;
    let id = registry
        .notification
        .search_by_connection(address, instance_id, false)
        .ok_or(MapError::DeviceNotConnected)?;
    let channel = registry
        .notification
        .get_mut(id)
        .ok_or(MapError::DeviceNotConnected)?;
    check_owner(channel, owner)?;
    if channel.state != ConnectionState::Connected {
        return Err(MapError::DeviceNotConnected);
    }
    Ok(channel)
}

/// Handle to the session manager. Cheap to clone.
#[derive(Clone)]
pub struct MapManager {
    shared: Arc<Shared>,
}

impl MapManager {
    /// Create a manager for a powered-down device.
    pub fn new(
        config: ManagerConfig,
        transport: Arc<dyn MapTransport>,
        devices: Arc<dyn DeviceManager>,
        ipc: Arc<dyn IpcSender>,
    ) -> Self {
        let notification = NotificationCoordinator::new(config.notification_port);
        let shared = Arc::new(Shared {
            state: Mutex::new(ManagerState {
                powered: false,
                registry: Registry::new(),
                notification,
            }),
            transport,
            devices,
            ipc,
            config,
        });
        Self { shared }
    }

    pub fn is_powered(&self) -> bool {
        self.shared.state.lock().powered
    }

    /// The local device became available.
    pub fn power_on(&self) {
        self.shared.with_context(orchestrator::power_on);
    }

    /// The local device went away. Every channel is destroyed.
    pub fn power_off(&self) {
        self.shared.with_context(|ctx| orchestrator::power_off(ctx, false));
    }

    /// Close every session and release every channel.
    pub fn shutdown(&self) {
        info!("Shutting down message access manager");
        self.shared.with_context(|ctx| orchestrator::power_off(ctx, true));
    }

    pub fn handle_device_event(&self, event: DeviceEvent) {
        debug!("Device event: {:?}", event);
        match event {
            DeviceEvent::PoweredOn => self.power_on(),
            DeviceEvent::PoweredOff => self.power_off(),
            DeviceEvent::LinkStatus {
                address,
                procedure,
                error,
            } => self.shared.with_context(|ctx| {
                orchestrator::on_link_status(ctx, address, procedure, error)
            }),
        }
    }

    pub fn handle_transport_event(&self, event: TransportEvent) {
        self.shared.with_context(|ctx| route_transport_event(ctx, event));
    }

    /// Remove every channel owned by a remote client that went away.
    pub fn unregister_client(&self, client: ClientId) {
        self.shared
            .with_context(|ctx| connection::unregister_client(ctx, client));
    }

    /// Handle one serialized request from a remote client and send its
    /// response.
    pub fn serve_client_request(&self, client: ClientId, raw: &str) {
        ipc_handler::serve_client_request(&self.shared, client, raw);
    }

    pub fn snapshot(&self, tracking_id: TrackingId) -> Option<ChannelSnapshot> {
        let state = self.shared.state.lock();
        state
            .registry
            .search_by_tracking_id(tracking_id)
            .map(Channel::snapshot)
    }

    pub fn channels(&self) -> Vec<ChannelSnapshot> {
        let state = self.shared.state.lock();
        state
            .registry
            .access
            .iter()
            .chain(state.registry.notification.iter())
            .map(Channel::snapshot)
            .collect()
    }

    /// Live references on the shared notification server.
    pub fn notification_ref_count(&self) -> u32 {
        self.shared.state.lock().notification.ref_count()
    }

    // Connection management

    pub fn connection_request_response(
        &self,
        address: BdAddr,
        instance_id: u32,
        accept: bool,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            connection::connection_request_response(ctx, ClientId::LOCAL, address, instance_id, accept)
        })
    }

    /// Register a message access server. Returns the instance id.
    pub fn register_server(
        &self,
        port: u32,
        flags: u32,
        instance_id: u32,
        supported_message_types: u32,
        callback: EventCallback,
    ) -> Result<u32> {
        self.shared.with_context(|ctx| {
            connection::register_server(
                ctx,
                ClientId::LOCAL,
                Some(callback),
                port,
                flags,
                instance_id,
                supported_message_types,
            )
        })
    }

    pub fn unregister_server(&self, instance_id: u32) -> Result<()> {
        self.shared
            .with_context(|ctx| connection::unregister_server(ctx, ClientId::LOCAL, instance_id))
    }

    /// Advertise a registered server. Returns the record handle.
    pub fn register_service_record(&self, instance_id: u32, service_name: &str) -> Result<u32> {
        self.shared.with_context(|ctx| {
            connection::register_service_record(ctx, ClientId::LOCAL, instance_id, service_name)
        })
    }

    pub fn unregister_service_record(&self, instance_id: u32) -> Result<()> {
        self.shared.with_context(|ctx| {
            connection::unregister_service_record(ctx, ClientId::LOCAL, instance_id)
        })
    }

    pub fn parse_remote_message_access_services(&self, address: BdAddr) -> Result<Vec<ServiceDetails>> {
        connection::parse_remote_services(&self.shared, address)
    }

    /// Start an outgoing connection. The outcome arrives as a
    /// `ConnectionStatus` event.
    pub fn connect_remote_device(
        &self,
        connection_type: ConnectionType,
        address: BdAddr,
        port: u32,
        instance_id: u32,
        flags: u32,
        callback: EventCallback,
    ) -> Result<TrackingId> {
        self.shared.with_context(|ctx| {
            connection::connect_remote_device(
                ctx,
                ClientId::LOCAL,
                Some(callback),
                connection::ConnectParams {
                    connection_type,
                    address,
                    port,
                    instance_id,
                    flags,
                },
                None,
            )
        })
    }

    /// Start an outgoing connection and wait for its outcome.
    pub async fn connect_remote_device_blocking(
        &self,
        connection_type: ConnectionType,
        address: BdAddr,
        port: u32,
        instance_id: u32,
        flags: u32,
        callback: EventCallback,
    ) -> Result<ConnectionStatus> {
        let (tx, rx) = oneshot::channel();
        let tracking_id = self.shared.with_context(|ctx| {
            connection::connect_remote_device(
                ctx,
                ClientId::LOCAL,
                Some(callback),
                connection::ConnectParams {
                    connection_type,
                    address,
                    port,
                    instance_id,
                    flags,
                },
                Some(tx),
            )
        })?;

        // A dropped waiter means the channel was torn down without a verdict.
        let status = rx.await.unwrap_or(ConnectionStatus::FailureUnknown);

        let state = self
            .shared
            .with_context(|ctx| ctx.state.registry.search_by_tracking_id(tracking_id).map(|c| c.state));
        match (status, state) {
            (ConnectionStatus::Success, Some(ConnectionState::Connected)) => Ok(status),
            (ConnectionStatus::Success, _) => {
                debug!("Channel {} gone after a successful connect", tracking_id);
                Ok(ConnectionStatus::FailureUnknown)
            }
            (failure, _) => Ok(failure),
        }
    }

    pub fn disconnect(&self, connection_type: ConnectionType, address: BdAddr, instance_id: u32) -> Result<()> {
        self.shared.with_context(|ctx| {
            connection::disconnect(ctx, ClientId::LOCAL, connection_type, address, instance_id)
        })
    }

    pub fn abort(&self, connection_type: ConnectionType, address: BdAddr, instance_id: u32) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::abort(ctx, ClientId::LOCAL, connection_type, address, instance_id)
        })
    }

    // Message client requests

    pub fn query_current_folder(&self, address: BdAddr, instance_id: u32) -> Result<String> {
        self.shared.with_context(|ctx| {
            client_ops::query_current_folder(ctx, ClientId::LOCAL, address, instance_id)
        })
    }

    pub fn enable_notifications(&self, address: BdAddr, instance_id: u32, enabled: bool) -> Result<()> {
        self.shared.with_context(|ctx| {
            notification::enable_notifications(ctx, ClientId::LOCAL, address, instance_id, enabled)
        })
    }

    pub fn get_folder_listing(
        &self,
        address: BdAddr,
        instance_id: u32,
        max_list_count: u16,
        list_start_offset: u16,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::get_folder_listing(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                max_list_count,
                list_start_offset,
            )
        })
    }

    pub fn get_folder_listing_size(&self, address: BdAddr, instance_id: u32) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::get_folder_listing_size(ctx, ClientId::LOCAL, address, instance_id)
        })
    }

    pub fn get_message_listing(
        &self,
        address: BdAddr,
        instance_id: u32,
        folder_name: Option<&str>,
        max_list_count: u16,
        list_start_offset: u16,
        listing_info: Option<MessageListingInfo>,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::get_message_listing(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                folder_name,
                max_list_count,
                list_start_offset,
                listing_info,
            )
        })
    }

    pub fn get_message_listing_size(
        &self,
        address: BdAddr,
        instance_id: u32,
        folder_name: Option<&str>,
        listing_info: Option<MessageListingInfo>,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::get_message_listing_size(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                folder_name,
                listing_info,
            )
        })
    }

    pub fn get_message(
        &self,
        address: BdAddr,
        instance_id: u32,
        message_handle: &str,
        attachment: bool,
        charset: CharSet,
        fractional_type: FractionalType,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::get_message(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                message_handle,
                attachment,
                charset,
                fractional_type,
            )
        })
    }

    pub fn set_message_status(
        &self,
        address: BdAddr,
        instance_id: u32,
        message_handle: &str,
        indicator: StatusIndicator,
        value: bool,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::set_message_status(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                message_handle,
                indicator,
                value,
            )
        })
    }

    /// Push one part of a message. With `is_final` false, further parts
    /// may follow once the response event arrives.
    #[allow(clippy::too_many_arguments)]
    pub fn push_message(
        &self,
        address: BdAddr,
        instance_id: u32,
        folder_name: Option<&str>,
        transparent: bool,
        retry: bool,
        charset: CharSet,
        data: Vec<u8>,
        is_final: bool,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::push_message(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                client_ops::PushParams {
                    folder_name,
                    transparent,
                    retry,
                    charset,
                },
                data,
                is_final,
            )
        })
    }

    pub fn update_inbox(&self, address: BdAddr, instance_id: u32) -> Result<()> {
        self.shared
            .with_context(|ctx| client_ops::update_inbox(ctx, ClientId::LOCAL, address, instance_id))
    }

    pub fn set_folder(
        &self,
        address: BdAddr,
        instance_id: u32,
        option: SetFolderOption,
        folder_name: Option<&str>,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::set_folder(ctx, ClientId::LOCAL, address, instance_id, option, folder_name)
        })
    }

    pub fn set_folder_absolute(&self, address: BdAddr, instance_id: u32, path: &str) -> Result<()> {
        self.shared.with_context(|ctx| {
            client_ops::set_folder_absolute(ctx, ClientId::LOCAL, address, instance_id, path)
        })
    }

    // Message server responses

    pub fn enable_notifications_confirmation(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::enable_notifications_confirmation(ctx, ClientId::LOCAL, address, instance_id, status)
        })
    }

    pub fn send_folder_listing(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        data: Vec<u8>,
        is_final: bool,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::send_folder_listing(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                status,
                data,
                is_final,
            )
        })
    }

    pub fn send_folder_listing_size(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        folder_count: u16,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::send_folder_listing_size(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                status,
                folder_count,
            )
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn send_message_listing(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        message_count: u16,
        new_message: bool,
        mse_time: Option<MseTime>,
        data: Vec<u8>,
        is_final: bool,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::send_message_listing(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                status,
                ListingHeader {
                    message_count,
                    new_message,
                    mse_time,
                },
                data,
                is_final,
            )
        })
    }

    pub fn send_message_listing_size(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        message_count: u16,
        new_message: bool,
        mse_time: Option<MseTime>,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::send_message_listing_size(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                status,
                ListingHeader {
                    message_count,
                    new_message,
                    mse_time,
                },
            )
        })
    }

    pub fn send_message(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        fractional_type: FractionalType,
        data: Vec<u8>,
        is_final: bool,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::send_message(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                status,
                fractional_type,
                data,
                is_final,
            )
        })
    }

    pub fn set_message_status_confirmation(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::set_message_status_confirmation(ctx, ClientId::LOCAL, address, instance_id, status)
        })
    }

    pub fn push_message_confirmation(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
        message_handle: Option<&str>,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::push_message_confirmation(
                ctx,
                ClientId::LOCAL,
                address,
                instance_id,
                status,
                message_handle,
            )
        })
    }

    pub fn update_inbox_confirmation(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::update_inbox_confirmation(ctx, ClientId::LOCAL, address, instance_id, status)
        })
    }

    pub fn set_folder_confirmation(
        &self,
        address: BdAddr,
        instance_id: u32,
        status: ResponseStatus,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::set_folder_confirmation(ctx, ClientId::LOCAL, address, instance_id, status)
        })
    }

    /// Send one part of an event report over a notification connection.
    pub fn send_notification(
        &self,
        address: BdAddr,
        instance_id: u32,
        data: Vec<u8>,
        is_final: bool,
    ) -> Result<()> {
        self.shared.with_context(|ctx| {
            server_ops::send_notification(ctx, ClientId::LOCAL, address, instance_id, data, is_final)
        })
    }
}

fn route_transport_event(ctx: &mut Context<'_>, event: TransportEvent) {
    use TransportEvent::*;

    debug!("Transport event on session {}", event.session_id());
    match event {
        OpenRequestIndication { session_id, address } => {
            connection::on_open_request(ctx, session_id, address)
        }
        OpenPortIndication { session_id, address } => {
            connection::on_open_port_indication(ctx, session_id, address)
        }
        OpenPortConfirmation { session_id, status } => {
            connection::on_open_port_confirmation(ctx, session_id, status)
        }
        ClosePortIndication { session_id } => connection::on_close_port(ctx, session_id),

        NotificationRegistrationConfirmation {
            session_id,
            response_code,
        } => notification::on_registration_confirmation(ctx, session_id, response_code),
        SetFolderConfirmation {
            session_id,
            response_code,
        } => client_ops::on_set_folder_confirmation(ctx, session_id, response_code),
        GetFolderListingConfirmation {
            session_id,
            response_code,
            folder_count,
            data,
        } => client_ops::on_folder_listing_confirmation(ctx, session_id, response_code, folder_count, data),
        GetMessageListingConfirmation {
            session_id,
            response_code,
            message_count,
            new_message,
            mse_time,
            data,
        } => client_ops::on_message_listing_confirmation(
            ctx,
            session_id,
            response_code,
            ListingHeader {
                message_count,
                new_message,
                mse_time,
            },
            data,
        ),
        GetMessageConfirmation {
            session_id,
            response_code,
            fractional_type,
            data,
        } => client_ops::on_message_confirmation(ctx, session_id, response_code, fractional_type, data),
        SetMessageStatusConfirmation {
            session_id,
            response_code,
        } => client_ops::on_set_message_status_confirmation(ctx, session_id, response_code),
        PushMessageConfirmation {
            session_id,
            response_code,
            message_handle,
        } => client_ops::on_push_message_confirmation(ctx, session_id, response_code, message_handle),
        UpdateInboxConfirmation {
            session_id,
            response_code,
        } => client_ops::on_update_inbox_confirmation(ctx, session_id, response_code),
        SendEventConfirmation {
            session_id,
            response_code,
        } => client_ops::on_send_event_confirmation(ctx, session_id, response_code),
        AbortConfirmation { session_id } => client_ops::on_abort_confirmation(ctx, session_id),

        NotificationRegistrationIndication { session_id, enabled } => {
            server_ops::on_notification_registration(ctx, session_id, enabled)
        }
        SetFolderIndication {
            session_id,
            option,
            folder_name,
        } => server_ops::on_set_folder(ctx, session_id, option, folder_name),
        GetFolderListingIndication {
            session_id,
            max_list_count,
            list_start_offset,
        } => server_ops::on_get_folder_listing(ctx, session_id, max_list_count, list_start_offset),
        GetMessageListingIndication {
            session_id,
            folder_name,
            max_list_count,
            list_start_offset,
            listing_info,
        } => server_ops::on_get_message_listing(
            ctx,
            session_id,
            folder_name,
            max_list_count,
            list_start_offset,
            listing_info,
        ),
        GetMessageIndication {
            session_id,
            message_handle,
            attachment,
            charset,
            fractional_type,
        } => server_ops::on_get_message(
            ctx,
            session_id,
            message_handle,
            attachment,
            charset,
            fractional_type,
        ),
        SetMessageStatusIndication {
            session_id,
            message_handle,
            status_indicator,
            status_value,
        } => server_ops::on_set_message_status(
            ctx,
            session_id,
            message_handle,
            status_indicator,
            status_value,
        ),
        PushMessageIndication {
            session_id,
            folder_name,
            transparent,
            retry,
            charset,
            is_final,
            data,
        } => server_ops::on_push_message(
            ctx,
            session_id,
            server_ops::PushIndication {
                folder_name,
                transparent,
                retry,
                charset,
                is_final,
                data,
            },
        ),
        UpdateInboxIndication { session_id } => server_ops::on_update_inbox(ctx, session_id),
        SendEventIndication {
            session_id,
            mas_instance_id,
            is_final,
            data,
        } => notification::on_send_event_indication(ctx, session_id, mas_instance_id, is_final, data),
        AbortIndication { session_id } => server_ops::on_abort_indication(ctx, session_id),
    }
}
