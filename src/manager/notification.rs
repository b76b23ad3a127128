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

//! Shared notification server.
//!
//! Client channels that enable notifications toward the same device share
//! one local notification server. The server exists only while at least one
//! such channel holds a reference; while none does, a placeholder keeps the
//! port claimed and refuses every connection.

use tracing::{debug, info, warn};

use crate::address::BdAddr;
use crate::error::{MapError, Result};
use crate::events::EventKind;
use crate::map::channel::{Channel, ConnectionState, LastRequest, Operation, TrackingId};
use crate::map::registry::Registry;
use crate::map::status::{obex, ResponseStatus};
use crate::map::types::{ClientId, ConnectionType};
use crate::transport::{DeviceManager, MapTransport};

use super::client_ops::{confirmed_client, continue_request, settle};
use super::{connected_client, Context};

/// Port, placeholder and service record of the notification server.
pub(crate) struct NotificationCoordinator {
    configured_port: u32,
    port: u32,
    placeholder: Option<u32>,
    ref_count: u32,
    /// Session and handle of the advertised service record.
    record: Option<(u32, u32)>,
}

impl NotificationCoordinator {
    pub fn new(configured_port: u32) -> Self {
        Self {
            configured_port,
            port: configured_port,
            placeholder: None,
            ref_count: 0,
            record: None,
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    #[cfg(test)]
    pub fn port(&self) -> u32 {
        self.port
    }

    /// Pick the port for this power cycle and claim it.
    pub fn power_on(&mut self, devices: &dyn DeviceManager, registry: &Registry) {
        if self.configured_port == 0 {
            self.port = devices.find_free_server_port().unwrap_or(0);
        }
        if self.port == 0 {
            warn!("No port available for the notification server");
            return;
        }
        info!("Notification server port {}", self.port);
        self.arm_placeholder(devices, registry);
    }

    /// Claim the port while no real server runs on it.
    pub fn arm_placeholder(&mut self, devices: &dyn DeviceManager, registry: &Registry) {
        if self.port == 0 || self.placeholder.is_some() {
            return;
        }
        if registry.notification.iter().any(|c| c.is_server) {
            return;
        }
        match devices.reserve_port(self.port) {
            Ok(reservation) => {
                debug!("Placeholder {} holds port {}", reservation, self.port);
                self.placeholder = Some(reservation);
            }
            Err(e) => warn!("Failed to reserve notification port {}: {}", self.port, e),
        }
    }

    fn disarm(&mut self, devices: &dyn DeviceManager) {
        if let Some(reservation) = self.placeholder.take() {
            devices.release_port_reservation(reservation);
        }
    }

    /// Forget everything at power-off.
    pub fn reset(&mut self, devices: &dyn DeviceManager, transport: &dyn MapTransport, close_sessions: bool) {
        self.disarm(devices);
        if let Some((session_id, handle)) = self.record.take() {
            if close_sessions {
                if let Err(e) = transport.unregister_record(session_id, handle) {
                    debug!("Notification record teardown: {}", e);
                }
            }
        }
        self.ref_count = 0;
        self.port = self.configured_port;
    }
}

/// Whether some client channel other than `except` holds a notification
/// reference toward `address`.
fn holds_reference(registry: &Registry, address: BdAddr, except: Option<TrackingId>) -> bool {
    registry.access.iter().any(|c| {
        c.connection_type == ConnectionType::MessageAccessClient
            && c.remote_address == address
            && Some(c.tracking_id) != except
            && (c.notifications_enabled || c.pending_enable_notification)
    })
}

/// Take a notification reference on behalf of client channel `client`,
/// bringing up a server for its device if none serves it yet.
fn acquire(ctx: &mut Context<'_>, client: TrackingId) -> Result<()> {
    let (address, owner, callback) = {
        let channel = ctx
            .state
            .registry
            .search_by_tracking_id(client)
            .ok_or(MapError::DeviceNotConnected)?;
        (channel.remote_address, channel.owner, channel.callback.clone())
    };

    if holds_reference(&ctx.state.registry, address, Some(client)) {
        ctx.state.notification.ref_count += 1;
        debug!(
            "Notification server for {} shared, {} references",
            address, ctx.state.notification.ref_count
        );
        return Ok(());
    }

    let coordinator = &mut ctx.state.notification;
    let registry = &mut ctx.state.registry;
    let transport = ctx.shared.transport.as_ref();
    let devices = ctx.shared.devices.as_ref();

    if coordinator.port == 0 {
        return Err(MapError::NotificationServerUnavailable);
    }
    let port = coordinator.port;
    coordinator.disarm(devices);

    let session_id = match transport.open_notification_server(port) {
        Ok(session_id) => session_id,
        Err(e) => {
            coordinator.arm_placeholder(devices, registry);
            return Err(e.into());
        }
    };

    let mut new_record = false;
    if coordinator.record.is_none() {
        match transport.register_notification_record(session_id, &ctx.shared.config.notification_service_name) {
            Ok(handle) => {
                coordinator.record = Some((session_id, handle));
                new_record = true;
            }
            Err(e) => {
                let _ = transport.close_server(session_id);
                coordinator.arm_placeholder(devices, registry);
                return Err(e.into());
            }
        }
    }

    let tracking_id = registry.allocate_tracking_id();
    let mut server = Channel::new(tracking_id, ConnectionType::NotificationServer, owner, callback);
    server.session_id = Some(session_id);
    server.port = port;

    if let Err(e) = registry.add(server) {
        if new_record {
            if let Some((record_session, handle)) = coordinator.record.take() {
                let _ = transport.unregister_record(record_session, handle);
            }
        }
        let _ = transport.close_server(session_id);
        coordinator.arm_placeholder(devices, registry);
        return Err(e);
    }

    coordinator.ref_count += 1;
    info!(
        "Notification server {} up on port {} for {}",
        tracking_id, port, address
    );
    Ok(())
}

/// Drop one notification reference toward `address`. The caller must have
/// already cleared the releasing channel's enabled and pending flags, or
/// unlinked it.
pub(crate) fn release(ctx: &mut Context<'_>, address: BdAddr) {
    let coordinator = &mut ctx.state.notification;
    let registry = &mut ctx.state.registry;
    let transport = ctx.shared.transport.as_ref();

    if coordinator.ref_count == 0 {
        warn!("Notification reference released with none held");
        return;
    }
    coordinator.ref_count -= 1;

    if holds_reference(registry, address, None) {
        debug!(
            "Notification server for {} still referenced ({} total)",
            address, coordinator.ref_count
        );
        return;
    }

    // A server mid-connection has no address yet.
    let server = registry
        .notification
        .iter()
        .find(|c| c.is_server && c.remote_address == address)
        .or_else(|| {
            registry
                .notification
                .iter()
                .find(|c| c.is_server && c.remote_address.is_null())
        })
        .map(|c| c.tracking_id);

    if coordinator.ref_count == 0 {
        if let Some((session_id, handle)) = coordinator.record.take() {
            if let Err(e) = transport.unregister_record(session_id, handle) {
                warn!("Failed to remove notification record: {}", e);
            }
        }
    }

    if let Some(mut channel) = server.and_then(|id| registry.remove(id)) {
        if let Some(session_id) = channel.session_id {
            if let Err(e) = transport.close_server(session_id) {
                warn!("Failed to close notification server: {}", e);
            }
        }
        info!("Notification server {} for {} released", channel.tracking_id, address);
        channel.cleanup();
    }

    if coordinator.ref_count == 0 && ctx.state.powered {
        coordinator.arm_placeholder(ctx.shared.devices.as_ref(), registry);
    }
}

pub(crate) fn enable_notifications(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    enabled: bool,
) -> Result<()> {
    let channel = connected_client(&mut ctx.state.registry, owner, address, instance_id)?;
    if channel.operation != Operation::None {
        return Err(MapError::InvalidOperation);
    }
    let id = channel.tracking_id;
    let needs_reference =
        enabled && !(channel.notifications_enabled || channel.pending_enable_notification);

    if needs_reference {
        acquire(ctx, id)?;
    }

    let channel = ctx
        .state
        .registry
        .get_mut(id)
        .ok_or(MapError::DeviceNotConnected)?;
    channel.begin_operation(Operation::EnableNotifications)?;
    channel.last_request = Some(LastRequest::Registration { enabled });
    channel.pending_enable_notification |= needs_reference;

    if let Err(e) = continue_request(ctx.shared.transport.as_ref(), channel) {
        channel.finish_operation();
        if needs_reference {
            channel.pending_enable_notification = false;
            release(ctx, address);
        }
        return Err(e.into());
    }
    channel.awaiting_response = true;
    debug!(
        "Notification registration ({}) sent on {}",
        if enabled { "on" } else { "off" },
        id
    );
    Ok(())
}

pub(crate) fn on_registration_confirmation(ctx: &mut Context<'_>, session_id: u32, code: u8) {
    let Some(channel) = confirmed_client(
        &mut ctx.state.registry,
        session_id,
        &[Operation::EnableNotifications],
    ) else {
        return;
    };
    let status = ResponseStatus::from_obex(code);
    let address = channel.remote_address;
    let requested = match channel.last_request {
        Some(LastRequest::Registration { enabled }) => enabled,
        _ => channel.pending_enable_notification,
    };

    let mut released = false;
    if channel.pending_enable_notification {
        channel.pending_enable_notification = false;
        if status.is_success() {
            channel.notifications_enabled = true;
        } else {
            released = true;
        }
    } else if status.is_success() && !requested && channel.notifications_enabled {
        channel.notifications_enabled = false;
        released = true;
    }

    settle(
        ctx.shared.transport.as_ref(),
        &mut ctx.outbox,
        channel,
        EventKind::EnableNotificationsResponse { status },
    );

    if released {
        release(ctx, address);
    }
}

/// An event report arrived on a notification server. It goes to the client
/// connected to the reporting server instance.
pub(crate) fn on_send_event_indication(
    ctx: &mut Context<'_>,
    session_id: u32,
    mas_instance_id: u32,
    is_final: bool,
    data: Vec<u8>,
) {
    let transport = ctx.shared.transport.as_ref();
    let registry = &ctx.state.registry;

    let server = registry
        .search_by_session_id(session_id)
        .and_then(|id| registry.search_by_tracking_id(id))
        .filter(|c| c.connection_type == ConnectionType::NotificationServer);
    let Some(server) = server else {
        warn!("Event report on unknown session {}", session_id);
        let _ = transport.send_event_response(session_id, obex::BAD_REQUEST);
        return;
    };

    let client = registry
        .access
        .search_by_connection(server.remote_address, mas_instance_id, false)
        .and_then(|id| registry.access.get(id))
        .filter(|c| c.state == ConnectionState::Connected);

    let code = match client {
        Some(client) => {
            ctx.outbox
                .push(client, EventKind::NotificationIndication { is_final, data });
            if is_final {
                obex::OK
            } else {
                obex::CONTINUE
            }
        }
        None => {
            debug!(
                "No client for instance {} on {}",
                mas_instance_id, server.remote_address
            );
            obex::SERVICE_UNAVAILABLE
        }
    };

    if let Err(e) = transport.send_event_response(session_id, code) {
        warn!("Failed to answer event report: {}", e);
    }
}
