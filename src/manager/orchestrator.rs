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

//! Device power, link-manager status and the port-retry timer.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::BdAddr;
use crate::error::{DeviceError, MapError, Result};
use crate::events::EventKind;
use crate::map::channel::{ConnectionState, RetryTimer, TrackingId};
use crate::map::status::ResponseStatus;
use crate::map::types::ConnectionStatus;
use crate::transport::LinkProcedure;

use super::client_ops::terminal_response;
use super::connection::{self, status_for_error};
use super::Context;

pub(crate) fn power_on(ctx: &mut Context<'_>) {
    if ctx.state.powered {
        debug!("Already powered on");
        return;
    }
    ctx.state.powered = true;
    info!("Local device powered on");

    ctx.state
        .notification
        .power_on(ctx.shared.devices.as_ref(), &ctx.state.registry);
}

/// Tear down every channel. With `close_sessions` the transport sessions
/// and records are closed too; after a real power loss they are already
/// gone.
pub(crate) fn power_off(ctx: &mut Context<'_>, close_sessions: bool) {
    if !ctx.state.powered && ctx.state.registry.all_ids().is_empty() {
        return;
    }
    ctx.state.powered = false;
    info!("Local device powered off");

    let transport = ctx.shared.transport.clone();
    ctx.state
        .notification
        .reset(ctx.shared.devices.as_ref(), transport.as_ref(), close_sessions);

    for mut channel in ctx.state.registry.drain() {
        if channel.is_client() {
            if let Some(waiter) = channel.waiter.take() {
                let _ = waiter.send(ConnectionStatus::FailureDevicePowerOff);
            } else if channel.state == ConnectionState::Connected {
                if let Some(kind) = terminal_response(&mut channel, ResponseStatus::DevicePoweredOff) {
                    ctx.outbox.push(&channel, kind);
                }
                ctx.outbox.push(
                    &channel,
                    EventKind::DeviceDisconnected {
                        connection_type: channel.connection_type,
                    },
                );
            } else {
                ctx.outbox.push(
                    &channel,
                    EventKind::ConnectionStatus {
                        connection_type: channel.connection_type,
                        status: ConnectionStatus::FailureDevicePowerOff,
                    },
                );
            }
        } else if channel.state == ConnectionState::Connected {
            ctx.outbox.push(
                &channel,
                EventKind::DeviceDisconnected {
                    connection_type: channel.connection_type,
                },
            );
        }

        if close_sessions {
            if let Some(session_id) = channel.session_id {
                if let Some(handle) = channel.sdp_record_handle.take() {
                    let _ = transport.unregister_record(session_id, handle);
                }
                let closed = if channel.is_server {
                    transport.close_server(session_id)
                } else {
                    transport.close_connection(session_id)
                };
                if let Err(e) = closed {
                    debug!("Closing session {} on shutdown: {}", session_id, e);
                }
            }
        }
        channel.cleanup();
    }
}

/// Schedule a port-availability check for an outgoing channel.
pub(crate) fn arm_retry_timer(ctx: &mut Context<'_>, id: TrackingId) -> Result<()> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| MapError::UnableToAllocateTimer)?;
    let channel = ctx
        .state
        .registry
        .get_mut(id)
        .ok_or(MapError::DeviceNotConnected)?;

    channel.cancel_timer();
    channel.timer_generation += 1;
    let generation = channel.timer_generation;
    let delay = ctx.shared.config.port_retry_delay();
    let shared = Arc::downgrade(ctx.shared);

    let handle = runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(shared) = shared.upgrade() {
            shared.with_context(|ctx| on_retry_timer(ctx, id, generation));
        }
    });
    channel.retry_timer = Some(RetryTimer { handle, generation });
    debug!("Retry {} armed for {} in {:?}", generation, id, delay);
    Ok(())
}

fn on_retry_timer(ctx: &mut Context<'_>, id: TrackingId, generation: u64) {
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };
    let current = channel
        .retry_timer
        .as_ref()
        .map(|t| t.generation == generation)
        .unwrap_or(false);
    if !current || channel.state != ConnectionState::ConnectingWaiting {
        debug!("Stale retry timer for {}", id);
        return;
    }

    // Running inside the timer task, so detach rather than abort.
    channel.retry_timer = None;
    channel.retry_attempts += 1;
    let attempts = channel.retry_attempts;
    let address = channel.remote_address;
    let port = channel.port;

    if !ctx.shared.devices.remote_port_in_use(address, port) {
        debug!("Port {} on {} free after {} checks", port, address, attempts);
        if let Err(e) = connection::start_link(ctx, id) {
            connection::fail_outbound(ctx, id, status_for_error(&e));
        }
        return;
    }

    if attempts >= ctx.shared.config.port_retry_attempts {
        warn!(
            "Port {} on {} still busy after {} checks, giving up",
            port, address, attempts
        );
        connection::fail_outbound(ctx, id, status_for_error(&MapError::ConnectionRetriesExceeded));
        return;
    }

    if let Err(e) = arm_retry_timer(ctx, id) {
        connection::fail_outbound(ctx, id, status_for_error(&e));
    }
}

fn waiting_on(procedure: LinkProcedure, success: bool, state: ConnectionState) -> bool {
    use ConnectionState::*;
    match (procedure, success) {
        (LinkProcedure::Connection, true) => state == ConnectingDevice,
        (LinkProcedure::Connection, false) => matches!(state, ConnectingDevice | Authenticating | Encrypting),
        (LinkProcedure::Authentication, true) => state == Authenticating,
        (LinkProcedure::Authentication, false) => matches!(state, Authenticating | Encrypting),
        (LinkProcedure::Encryption, _) => state == Encrypting,
    }
}

fn link_failure_status(error: &DeviceError) -> ConnectionStatus {
    match error {
        DeviceError::AuthenticationFailed | DeviceError::EncryptionFailed => ConnectionStatus::FailureRefused,
        DeviceError::ConnectionFailed | DeviceError::ConnectionRetriesExceeded => {
            ConnectionStatus::FailureTimeout
        }
        DeviceError::PoweredDown => ConnectionStatus::FailureDevicePowerOff,
        DeviceError::Other(_) => ConnectionStatus::FailureUnknown,
    }
}

/// Apply a link-manager verdict to every channel waiting on it.
pub(crate) fn on_link_status(
    ctx: &mut Context<'_>,
    address: BdAddr,
    procedure: LinkProcedure,
    error: Option<DeviceError>,
) {
    let success = error.is_none();
    let waiting: Vec<(TrackingId, bool)> = ctx
        .state
        .registry
        .access
        .iter()
        .chain(ctx.state.registry.notification.iter())
        .filter(|c| c.remote_address == address && waiting_on(procedure, success, c.state))
        .map(|c| (c.tracking_id, c.is_server))
        .collect();

    if waiting.is_empty() {
        debug!("{:?} status for {} matched no channel", procedure, address);
        return;
    }

    for (id, is_server) in waiting {
        match (&error, is_server) {
            (None, false) => outbound_link_ready(ctx, id),
            (Some(e), false) => {
                info!("Link to {} failed during {:?}: {}", address, procedure, e);
                if let Err(e) = ctx.shared.devices.disconnect_remote_device(address) {
                    debug!("Link teardown for {}: {}", address, e);
                }
                connection::fail_outbound(ctx, id, link_failure_status(e));
            }
            (None, true) => {
                let Some(channel) = ctx.state.registry.get_mut(id) else {
                    continue;
                };
                if let Err(e) = connection::accept_inbound(ctx.shared.transport.as_ref(), channel) {
                    warn!("Failed to accept {} on {}: {}", address, id, e);
                }
            }
            (Some(e), true) => {
                info!("Inbound security for {} failed: {}", address, e);
                if let Some(channel) = ctx.state.registry.get_mut(id) {
                    connection::reject_inbound(ctx.shared.transport.as_ref(), channel);
                }
            }
        }
    }
}

fn outbound_link_ready(ctx: &mut Context<'_>, id: TrackingId) {
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };
    let address = channel.remote_address;
    if let Err(e) = connection::open_transport(ctx.shared.transport.as_ref(), channel) {
        warn!("Failed to open session to {}: {}", address, e);
        if let Err(e) = ctx.shared.devices.disconnect_remote_device(address) {
            debug!("Link teardown for {}: {}", address, e);
        }
        connection::fail_outbound(ctx, id, ConnectionStatus::FailureUnknown);
    }
}
