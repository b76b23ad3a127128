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

//! Connection lifecycle: server registration, outgoing connects, inbound
//! opens and teardown.

use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::address::BdAddr;
use crate::error::{DeviceError, MapError, Result};
use crate::events::{EventCallback, EventKind};
use crate::map::channel::{Channel, ConnectionState, TrackingId};
use crate::map::constants::{connect_flags, limits, server_flags};
use crate::map::sdp::{self, ServiceDetails};
use crate::map::status::ResponseStatus;
use crate::map::types::{ClientId, ConnectionStatus, ConnectionType};
use crate::transport::{LinkSecurity, LinkStatus, MapTransport};

use super::client_ops::terminal_response;
use super::{check_owner, notification, orchestrator, validate_address, validate_instance, Context, Shared};

/// Where and how to connect.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectParams {
    pub connection_type: ConnectionType,
    pub address: BdAddr,
    pub port: u32,
    pub instance_id: u32,
    pub flags: u32,
}

fn validate_port(port: u32) -> Result<()> {
    if !limits::is_valid_port(port) {
        return Err(MapError::InvalidParameter("port"));
    }
    Ok(())
}

pub(crate) fn register_server(
    ctx: &mut Context<'_>,
    owner: ClientId,
    callback: Option<EventCallback>,
    port: u32,
    flags: u32,
    instance_id: u32,
    supported_message_types: u32,
) -> Result<u32> {
    validate_port(port)?;
    validate_instance(instance_id)?;
    if !ctx.state.powered {
        return Err(MapError::LocalDevicePoweredDown);
    }
    if ctx.state.registry.access.search_server_by_instance(instance_id).is_some() {
        return Err(MapError::DuplicateInstanceId(instance_id));
    }

    let transport = &ctx.shared.transport;
    let session_id = transport.open_access_server(port)?;

    let tracking_id = ctx.state.registry.allocate_tracking_id();
    let mut channel = Channel::new(tracking_id, ConnectionType::MessageAccessServer, owner, callback);
    channel.session_id = Some(session_id);
    channel.port = port;
    channel.flags = flags;
    channel.instance_id = instance_id;
    channel.supported_message_types = supported_message_types;

    if let Err(e) = ctx.state.registry.add(channel) {
        let _ = transport.close_server(session_id);
        return Err(e);
    }

    info!(
        "Registered message access server {} (instance {}, port {})",
        tracking_id, instance_id, port
    );
    Ok(instance_id)
}

pub(crate) fn unregister_server(ctx: &mut Context<'_>, owner: ClientId, instance_id: u32) -> Result<()> {
    validate_instance(instance_id)?;
    let registry = &mut ctx.state.registry;
    let id = registry
        .access
        .search_server_by_instance(instance_id)
        .ok_or(MapError::InvalidServerInstance)?;
    if let Some(channel) = registry.access.get(id) {
        check_owner(channel, owner)?;
    }
    remove_server(ctx, id, true);
    Ok(())
}

/// Unlink a server, release its record and session.
fn remove_server(ctx: &mut Context<'_>, id: TrackingId, close_session: bool) {
    let Some(mut channel) = ctx.state.registry.remove(id) else {
        return;
    };
    let transport = &ctx.shared.transport;
    if let Some(session_id) = channel.session_id {
        if close_session {
            if let Some(handle) = channel.sdp_record_handle.take() {
                if let Err(e) = transport.unregister_record(session_id, handle) {
                    warn!("Failed to remove service record of {}: {}", id, e);
                }
            }
            if let Err(e) = transport.close_server(session_id) {
                warn!("Failed to close server {}: {}", id, e);
            }
        }
    }
    info!("Unregistered server {} (instance {})", id, channel.instance_id);
    channel.cleanup();
}

pub(crate) fn register_service_record(
    ctx: &mut Context<'_>,
    owner: ClientId,
    instance_id: u32,
    service_name: &str,
) -> Result<u32> {
    validate_instance(instance_id)?;
    let registry = &mut ctx.state.registry;
    let id = registry
        .access
        .search_server_by_instance(instance_id)
        .ok_or(MapError::InvalidServerInstance)?;
    let channel = registry.access.get_mut(id).ok_or(MapError::InvalidServerInstance)?;
    check_owner(channel, owner)?;

    if let Some(handle) = channel.sdp_record_handle {
        debug!("Server {} already advertised as record {}", id, handle);
        return Ok(handle);
    }

    let session_id = channel.session()?;
    let handle = ctx.shared.transport.register_access_record(
        session_id,
        service_name,
        channel.instance_id,
        channel.supported_message_types,
    )?;
    channel.sdp_record_handle = Some(handle);
    info!("Registered service record {} for server {}", handle, id);
    Ok(handle)
}

pub(crate) fn unregister_service_record(
    ctx: &mut Context<'_>,
    owner: ClientId,
    instance_id: u32,
) -> Result<()> {
    validate_instance(instance_id)?;
    let registry = &mut ctx.state.registry;
    let id = registry
        .access
        .search_server_by_instance(instance_id)
        .ok_or(MapError::InvalidServerInstance)?;
    let channel = registry.access.get_mut(id).ok_or(MapError::InvalidServerInstance)?;
    check_owner(channel, owner)?;

    let handle = channel
        .sdp_record_handle
        .ok_or(MapError::InvalidParameter("no service record registered"))?;
    ctx.shared
        .transport
        .unregister_record(channel.session()?, handle)?;
    channel.sdp_record_handle = None;
    Ok(())
}

/// Enumerate message access services from the cached SDP data of a device.
pub(crate) fn parse_remote_services(shared: &Arc<Shared>, address: BdAddr) -> Result<Vec<ServiceDetails>> {
    validate_address(address)?;
    let records = shared
        .devices
        .query_remote_service_data(address)
        .ok_or(MapError::ServiceDataNotAvailable)?;
    sdp::parse_remote_services(&records)
}

pub(crate) fn connect_remote_device(
    ctx: &mut Context<'_>,
    owner: ClientId,
    callback: Option<EventCallback>,
    params: ConnectParams,
    waiter: Option<oneshot::Sender<ConnectionStatus>>,
) -> Result<TrackingId> {
    validate_address(params.address)?;
    validate_port(params.port)?;
    validate_instance(params.instance_id)?;
    if params.connection_type.is_server() {
        return Err(MapError::InvalidParameter("connection type"));
    }
    if !ctx.state.powered {
        return Err(MapError::LocalDevicePoweredDown);
    }

    let list = if params.connection_type.is_notification() {
        &ctx.state.registry.notification
    } else {
        &ctx.state.registry.access
    };
    if let Some(existing) = list.search_by_connection(params.address, params.instance_id, false) {
        let connected = list
            .get(existing)
            .map(|c| c.state == ConnectionState::Connected)
            .unwrap_or(false);
        return Err(if connected {
            MapError::DeviceAlreadyConnected
        } else {
            MapError::ConnectionInProgress
        });
    }

    let tracking_id = ctx.state.registry.allocate_tracking_id();
    let mut channel = Channel::new(tracking_id, params.connection_type, owner, callback);
    channel.remote_address = params.address;
    channel.port = params.port;
    channel.instance_id = params.instance_id;
    channel.flags = params.flags;
    channel.waiter = waiter;
    ctx.state.registry.add(channel)?;

    info!(
        "Connecting {} {} to {} port {} (instance {})",
        params.connection_type.as_str(),
        tracking_id,
        params.address,
        params.port,
        params.instance_id
    );

    let started = if ctx.shared.devices.remote_port_in_use(params.address, params.port) {
        debug!("Remote port {} on {} still in use, waiting", params.port, params.address);
        if let Some(channel) = ctx.state.registry.get_mut(tracking_id) {
            channel.state = ConnectionState::ConnectingWaiting;
        }
        orchestrator::arm_retry_timer(ctx, tracking_id)
    } else {
        start_link(ctx, tracking_id)
    };

    if let Err(e) = started {
        if let Some(mut channel) = ctx.state.registry.remove(tracking_id) {
            // The caller gets the error directly, not through the waiter.
            channel.waiter = None;
            channel.cleanup();
        }
        return Err(e);
    }
    Ok(tracking_id)
}

/// Ask the link manager for a link with the security the channel needs.
pub(crate) fn start_link(ctx: &mut Context<'_>, id: TrackingId) -> Result<()> {
    let channel = ctx
        .state
        .registry
        .get_mut(id)
        .ok_or(MapError::DeviceNotConnected)?;

    let security = LinkSecurity {
        authenticate: channel.flags & connect_flags::REQUIRE_AUTHENTICATION != 0,
        encrypt: channel.flags & connect_flags::REQUIRE_ENCRYPTION != 0,
    };
    channel.state = if security.encrypt {
        ConnectionState::Encrypting
    } else if security.authenticate {
        ConnectionState::Authenticating
    } else {
        ConnectionState::ConnectingDevice
    };

    match ctx
        .shared
        .devices
        .connect_with_remote_device(channel.remote_address, security)
    {
        Ok(LinkStatus::Pending) => {
            debug!("Waiting for link to {} ({:?})", channel.remote_address, channel.state);
            Ok(())
        }
        Ok(LinkStatus::Ready) => open_transport(ctx.shared.transport.as_ref(), channel),
        Err(DeviceError::PoweredDown) => Err(MapError::LocalDevicePoweredDown),
        Err(e) => {
            warn!("Link manager refused connection to {}: {}", channel.remote_address, e);
            Err(MapError::UnableToConnectToDevice)
        }
    }
}

/// Open the transport session once the link is ready.
pub(crate) fn open_transport(transport: &dyn MapTransport, channel: &mut Channel) -> Result<()> {
    let session_id = match channel.connection_type {
        ConnectionType::NotificationClient => {
            transport.open_remote_notification_port(channel.remote_address, channel.port)?
        }
        _ => transport.open_remote_access_port(channel.remote_address, channel.port)?,
    };
    channel.session_id = Some(session_id);
    channel.state = ConnectionState::Connecting;
    debug!("Channel {} opening session {}", channel.tracking_id, session_id);
    Ok(())
}

/// Connection status reported for a synchronous failure.
pub(crate) fn status_for_error(error: &MapError) -> ConnectionStatus {
    match error {
        MapError::UnableToAllocateTimer | MapError::ConnectionRetriesExceeded => {
            ConnectionStatus::FailureTimeout
        }
        MapError::LocalDevicePoweredDown => ConnectionStatus::FailureDevicePowerOff,
        MapError::UnableToConnectToDevice | MapError::Device(_) | MapError::Transport(_) => {
            ConnectionStatus::FailureUnknown
        }
        _ => ConnectionStatus::FailureRefused,
    }
}

/// Delete an outgoing channel that could not connect and tell its owner.
pub(crate) fn fail_outbound(ctx: &mut Context<'_>, id: TrackingId, status: ConnectionStatus) {
    let Some(mut channel) = ctx.state.registry.remove(id) else {
        return;
    };
    info!(
        "Connection {} to {} failed: {:?}",
        id, channel.remote_address, status
    );

    match channel.waiter.take() {
        Some(waiter) => {
            let _ = waiter.send(status);
        }
        None => ctx.outbox.push(
            &channel,
            EventKind::ConnectionStatus {
                connection_type: channel.connection_type,
                status,
            },
        ),
    }

    finish_client_teardown(ctx, channel);
}

pub(crate) fn connection_request_response(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    accept: bool,
) -> Result<()> {
    validate_address(address)?;
    validate_instance(instance_id)?;
    let registry = &mut ctx.state.registry;
    let id = registry
        .access
        .search_by_connection(address, instance_id, true)
        .ok_or(MapError::DeviceNotConnected)?;
    let channel = registry.access.get_mut(id).ok_or(MapError::DeviceNotConnected)?;
    check_owner(channel, owner)?;
    if channel.state != ConnectionState::Authorizing {
        return Err(MapError::InvalidConnectionState);
    }

    if accept {
        info!("Connection from {} to server {} authorized", address, id);
        begin_inbound_security(ctx, id)
    } else {
        info!("Connection from {} to server {} rejected", address, id);
        let session_id = channel.session()?;
        reset_server(channel);
        ctx.shared.transport.open_request_response(session_id, false)?;
        Ok(())
    }
}

/// Run whatever link security the server requires, then accept.
fn begin_inbound_security(ctx: &mut Context<'_>, id: TrackingId) -> Result<()> {
    let channel = ctx
        .state
        .registry
        .get_mut(id)
        .ok_or(MapError::DeviceNotConnected)?;
    let devices = &ctx.shared.devices;
    let address = channel.remote_address;

    let pending = if channel.flags & server_flags::REQUIRE_ENCRYPTION != 0 {
        channel.state = ConnectionState::Encrypting;
        devices.encrypt_remote_device(address)
    } else if channel.flags & server_flags::REQUIRE_AUTHENTICATION != 0 {
        channel.state = ConnectionState::Authenticating;
        devices.authenticate_remote_device(address)
    } else {
        Ok(LinkStatus::Ready)
    };

    match pending {
        Ok(LinkStatus::Pending) => Ok(()),
        Ok(LinkStatus::Ready) => accept_inbound(ctx.shared.transport.as_ref(), channel),
        Err(e) => {
            warn!("Inbound security for {} failed: {}", address, e);
            reject_inbound(ctx.shared.transport.as_ref(), channel);
            Err(e.into())
        }
    }
}

pub(crate) fn accept_inbound(transport: &dyn MapTransport, channel: &mut Channel) -> Result<()> {
    let session_id = channel.session()?;
    if let Err(e) = transport.open_request_response(session_id, true) {
        reset_server(channel);
        return Err(e.into());
    }
    channel.state = ConnectionState::Connecting;
    Ok(())
}

pub(crate) fn reject_inbound(transport: &dyn MapTransport, channel: &mut Channel) {
    if let Some(session_id) = channel.session_id {
        if let Err(e) = transport.open_request_response(session_id, false) {
            warn!("Failed to reject open on {}: {}", channel.tracking_id, e);
        }
    }
    reset_server(channel);
}

/// Return a server to Idle, ready for the next connection.
fn reset_server(channel: &mut Channel) {
    channel.state = ConnectionState::Idle;
    channel.remote_address = BdAddr::NULL;
    channel.finish_operation();
    channel.pending_abort = false;
    channel.cached_push_handle = None;
    channel.last_push_final = true;
    channel.current_path.clear();
    channel.pending_path.clear();
}

pub(crate) fn on_open_request(ctx: &mut Context<'_>, session_id: u32, address: BdAddr) {
    let transport = ctx.shared.transport.clone();
    let Some(id) = ctx.state.registry.search_by_session_id(session_id) else {
        warn!("Open request on unknown session {}", session_id);
        let _ = transport.open_request_response(session_id, false);
        return;
    };
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };
    if !channel.is_server || channel.state != ConnectionState::Idle {
        warn!(
            "Rejecting open from {} on {} in state {:?}",
            address, id, channel.state
        );
        let _ = transport.open_request_response(session_id, false);
        return;
    }

    channel.remote_address = address;
    info!("Open request from {} on {}", address, id);

    if channel.connection_type == ConnectionType::NotificationServer {
        if let Err(e) = accept_inbound(transport.as_ref(), channel) {
            warn!("Failed to accept notification connection: {}", e);
        }
        return;
    }

    if channel.flags & server_flags::REQUIRE_AUTHORIZATION != 0 {
        channel.state = ConnectionState::Authorizing;
        ctx.outbox.push(channel, EventKind::ConnectionRequest);
        return;
    }

    if let Err(e) = begin_inbound_security(ctx, id) {
        debug!("Inbound open on {} not accepted: {}", id, e);
    }
}

pub(crate) fn on_open_port_indication(ctx: &mut Context<'_>, session_id: u32, address: BdAddr) {
    let Some(id) = ctx.state.registry.search_by_session_id(session_id) else {
        warn!("Open indication on unknown session {}", session_id);
        return;
    };
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };
    if !channel.is_server {
        return;
    }
    channel.state = ConnectionState::Connected;
    channel.remote_address = address;
    channel.current_path.clear();
    info!("{} connected to server {}", address, id);
    ctx.outbox.push(
        channel,
        EventKind::DeviceConnected {
            connection_type: channel.connection_type,
        },
    );
}

pub(crate) fn on_open_port_confirmation(ctx: &mut Context<'_>, session_id: u32, status: ConnectionStatus) {
    let Some(id) = ctx.state.registry.search_by_session_id(session_id) else {
        warn!("Open confirmation on unknown session {}", session_id);
        return;
    };
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };
    if channel.is_server || channel.state != ConnectionState::Connecting {
        warn!("Unexpected open confirmation on {} ({:?})", id, channel.state);
        return;
    }

    if !status.is_success() {
        fail_outbound(ctx, id, status);
        return;
    }

    channel.state = ConnectionState::Connected;
    channel.current_path.clear();
    info!("Connected {} to {}", id, channel.remote_address);
    match channel.waiter.take() {
        Some(waiter) => {
            let _ = waiter.send(ConnectionStatus::Success);
        }
        None => ctx.outbox.push(
            channel,
            EventKind::ConnectionStatus {
                connection_type: channel.connection_type,
                status: ConnectionStatus::Success,
            },
        ),
    }
}

pub(crate) fn on_close_port(ctx: &mut Context<'_>, session_id: u32) {
    let Some(id) = ctx.state.registry.search_by_session_id(session_id) else {
        debug!("Close on unknown session {}", session_id);
        return;
    };
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };

    if channel.is_server {
        if channel.state == ConnectionState::Connected {
            ctx.outbox.push(
                channel,
                EventKind::DeviceDisconnected {
                    connection_type: channel.connection_type,
                },
            );
        }
        info!("Server {} disconnected from {}", id, channel.remote_address);
        reset_server(channel);
        return;
    }

    if channel.state != ConnectionState::Connected {
        fail_outbound(ctx, id, ConnectionStatus::FailureUnknown);
        return;
    }

    let Some(mut channel) = ctx.state.registry.remove(id) else {
        return;
    };
    if let Some(kind) = terminal_response(&mut channel, ResponseStatus::ResourcesAborted) {
        ctx.outbox.push(&channel, kind);
    }
    ctx.outbox.push(
        &channel,
        EventKind::DeviceDisconnected {
            connection_type: channel.connection_type,
        },
    );
    info!("Connection {} to {} closed by peer", id, channel.remote_address);
    finish_client_teardown(ctx, channel);
}

/// Release an unlinked client channel and any notification reference it
/// held.
fn finish_client_teardown(ctx: &mut Context<'_>, mut channel: Channel) {
    let address = channel.remote_address;
    let held_notification = channel.connection_type == ConnectionType::MessageAccessClient
        && (channel.notifications_enabled || channel.pending_enable_notification);
    channel.cleanup();
    if held_notification {
        notification::release(ctx, address);
    }
}

pub(crate) fn disconnect(
    ctx: &mut Context<'_>,
    owner: ClientId,
    connection_type: ConnectionType,
    address: BdAddr,
    instance_id: u32,
) -> Result<()> {
    validate_instance(instance_id)?;
    let registry = &ctx.state.registry;

    let id = match connection_type {
        ConnectionType::MessageAccessServer => registry
            .access
            .search_server_by_instance(instance_id)
            .ok_or(MapError::InvalidServerInstance)?,
        ConnectionType::NotificationServer => {
            validate_address(address)?;
            registry
                .notification
                .iter()
                .find(|c| c.is_server && c.remote_address == address)
                .map(|c| c.tracking_id)
                .ok_or(MapError::DeviceNotConnected)?
        }
        ConnectionType::MessageAccessClient => {
            validate_address(address)?;
            registry
                .access
                .search_by_connection(address, instance_id, false)
                .ok_or(MapError::DeviceNotConnected)?
        }
        ConnectionType::NotificationClient => {
            validate_address(address)?;
            registry
                .notification
                .search_by_connection(address, instance_id, false)
                .ok_or(MapError::DeviceNotConnected)?
        }
    };

    if let Some(channel) = registry.search_by_tracking_id(id) {
        check_owner(channel, owner)?;
        if connection_type == ConnectionType::MessageAccessServer
            && !address.is_null()
            && channel.state != ConnectionState::Idle
            && channel.remote_address != address
        {
            return Err(MapError::DeviceNotConnected);
        }
    }

    if connection_type.is_server() {
        disconnect_server(ctx, id)
    } else {
        disconnect_client(ctx, id)
    }
}

fn disconnect_server(ctx: &mut Context<'_>, id: TrackingId) -> Result<()> {
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return Err(MapError::DeviceNotConnected);
    };
    let transport = ctx.shared.transport.as_ref();
    match channel.state {
        ConnectionState::Idle => Ok(()),
        ConnectionState::Authorizing | ConnectionState::Authenticating | ConnectionState::Encrypting => {
            reject_inbound(transport, channel);
            Ok(())
        }
        _ => {
            let session_id = channel.session()?;
            info!("Disconnecting {} from server {}", channel.remote_address, id);
            reset_server(channel);
            transport.close_connection(session_id)?;
            Ok(())
        }
    }
}

fn disconnect_client(ctx: &mut Context<'_>, id: TrackingId) -> Result<()> {
    let Some(channel) = ctx.state.registry.remove(id) else {
        return Err(MapError::DeviceNotConnected);
    };
    info!("Disconnecting {} from {}", id, channel.remote_address);

    let close = match channel.state {
        ConnectionState::Connecting | ConnectionState::Connected => channel.session_id,
        _ => None,
    };
    // Local disconnect: no event for the caller.
    finish_client_teardown(ctx, channel);

    if let Some(session_id) = close {
        ctx.shared.transport.close_connection(session_id)?;
    }
    Ok(())
}

/// Drop every channel owned by a client that went away.
pub(crate) fn unregister_client(ctx: &mut Context<'_>, client: ClientId) {
    if client.is_local() {
        warn!("Ignoring departure of the local client id");
        return;
    }
    let owned: Vec<(TrackingId, ConnectionType)> = ctx
        .state
        .registry
        .access
        .iter()
        .chain(ctx.state.registry.notification.iter())
        .filter(|c| c.owner == client)
        .map(|c| (c.tracking_id, c.connection_type))
        .collect();

    if owned.is_empty() {
        return;
    }
    info!("Client {} gone, releasing {} channels", client, owned.len());

    for (id, connection_type) in owned {
        match connection_type {
            ConnectionType::MessageAccessServer => remove_server(ctx, id, true),
            ConnectionType::MessageAccessClient | ConnectionType::NotificationClient => {
                if let Err(e) = disconnect_client(ctx, id) {
                    debug!("Teardown of {} reported: {}", id, e);
                }
            }
            // Released along with the last client that enabled it.
            ConnectionType::NotificationServer => {}
        }
    }
}
