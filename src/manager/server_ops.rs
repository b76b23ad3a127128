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

//! Message server (MSE) side: requests from the peer become events for the
//! owner, and the owner's answers go back as responses.

use tracing::{debug, warn};

use crate::address::BdAddr;
use crate::error::{MapError, Result, TransportError};
use crate::events::EventKind;
use crate::map::channel::{Channel, ConnectionState, Operation, ResponseHeader};
use crate::map::constants::limits;
use crate::map::path;
use crate::map::registry::Registry;
use crate::map::status::{obex, ResponseStatus};
use crate::map::transfer::remainder_after;
use crate::map::types::{
    CharSet, ClientId, ConnectionType, FractionalType, MessageListingInfo, SetFolderOption,
    StatusIndicator,
};
use crate::map::unicode;
use crate::transport::{MapTransport, TransportResult};

use super::client_ops::force_abort;
use super::{connected_notification_client, connected_server, Context, ListingHeader};

/// A pushed message part as received from the peer.
#[derive(Debug, Clone)]
pub(crate) struct PushIndication {
    pub folder_name: Option<Vec<u16>>,
    pub transparent: bool,
    pub retry: bool,
    pub charset: CharSet,
    pub is_final: bool,
    pub data: Vec<u8>,
}

/// Answer a request of kind `op` with a bare status code.
fn respond_error(transport: &dyn MapTransport, op: Operation, session_id: u32, code: u8) {
    let result = match op {
        Operation::EnableNotifications => transport.set_notification_registration_response(session_id, code),
        Operation::SetFolder => transport.set_folder_response(session_id, code),
        Operation::GetFolderListing => transport.folder_listing_response(session_id, code, &[]).map(drop),
        Operation::GetFolderListingSize => transport.folder_listing_size_response(session_id, code, 0),
        Operation::GetMessageListing => transport
            .message_listing_response(session_id, code, 0, false, None, &[])
            .map(drop),
        Operation::GetMessageListingSize => {
            transport.message_listing_size_response(session_id, code, 0, false, None)
        }
        Operation::GetMessage => transport
            .message_response(session_id, code, FractionalType::Unfragmented, &[])
            .map(drop),
        Operation::SetMessageStatus => transport.set_message_status_response(session_id, code),
        Operation::PushMessage => transport.push_message_response(session_id, code, None),
        Operation::UpdateInbox => transport.update_inbox_response(session_id, code),
        Operation::None | Operation::Abort | Operation::SetFolderAbsolute | Operation::SendEvent => {
            return
        }
    };
    if let Err(e) = result {
        warn!("Failed to reject {:?} on session {}: {}", op, session_id, e);
    }
}

/// Requests the peer sends again for each packet of a multi-packet exchange.
fn spans_packets(op: Operation) -> bool {
    matches!(
        op,
        Operation::GetFolderListing
            | Operation::GetMessageListing
            | Operation::GetMessage
            | Operation::PushMessage
    )
}

/// Connected message access server on `session_id` that can take an `op`
/// request. Anything else is answered on the wire and `None` returned.
///
/// The flag is true when the request continues the active operation.
fn accept_request<'r>(
    registry: &'r mut Registry,
    transport: &dyn MapTransport,
    session_id: u32,
    op: Operation,
) -> Option<(&'r mut Channel, bool)> {
    let Some(id) = registry.search_by_session_id(session_id) else {
        warn!("{:?} request on unknown session {}", op, session_id);
        respond_error(transport, op, session_id, obex::BAD_REQUEST);
        return None;
    };
    let channel = registry.get_mut(id)?;
    if channel.connection_type != ConnectionType::MessageAccessServer
        || channel.state != ConnectionState::Connected
    {
        warn!("{:?} request on {} in state {:?}", op, id, channel.state);
        respond_error(transport, op, session_id, obex::BAD_REQUEST);
        return None;
    }

    if channel.operation == op && spans_packets(op) {
        return Some((channel, true));
    }
    if channel.operation != Operation::None {
        debug!(
            "Rejecting {:?} on {}: {:?} in progress",
            op, id, channel.operation
        );
        respond_error(transport, op, session_id, obex::NOT_ACCEPTABLE);
        return None;
    }
    channel.operation = op;
    Some((channel, false))
}

fn write_body(
    transport: &dyn MapTransport,
    session_id: u32,
    code: u8,
    header: &ResponseHeader,
    data: &[u8],
) -> TransportResult<usize> {
    match header {
        ResponseHeader::FolderListing => transport.folder_listing_response(session_id, code, data),
        ResponseHeader::MessageListing {
            message_count,
            new_message,
            mse_time,
        } => transport.message_listing_response(
            session_id,
            code,
            *message_count,
            *new_message,
            mse_time.as_ref(),
            data,
        ),
        ResponseHeader::Message { fractional_type } => {
            transport.message_response(session_id, code, *fractional_type, data)
        }
    }
}

/// Send the next buffered chunk of a response body.
fn continue_response(transport: &dyn MapTransport, channel: &mut Channel) -> TransportResult<()> {
    let session_id = channel.session_id.ok_or(TransportError::InvalidSession)?;
    let (Some(transfer), Some(header)) = (channel.transfer.as_mut(), channel.response_header.as_ref())
    else {
        return Err(TransportError::Failed("no response body buffered".into()));
    };

    let code = if transfer.is_final() { obex::OK } else { obex::CONTINUE };
    let accepted = write_body(transport, session_id, code, header, transfer.remaining())?;
    transfer.advance(accepted);

    if transfer.is_complete() {
        let is_final = transfer.is_final();
        channel.transfer = None;
        channel.response_header = None;
        if is_final {
            channel.finish_operation();
        }
    }
    Ok(())
}

/// Send one part of a response body from the owner.
fn send_body(
    transport: &dyn MapTransport,
    channel: &mut Channel,
    status: ResponseStatus,
    header: ResponseHeader,
    data: Vec<u8>,
    is_final: bool,
) -> Result<()> {
    let code = status.to_obex()?;
    let session_id = channel.session()?;
    if channel.transfer.is_some() {
        return Err(MapError::InvalidOperation);
    }

    if !status.is_success() {
        let sent = write_body(transport, session_id, code, &header, &[]);
        channel.finish_operation();
        return sent.map(drop).map_err(Into::into);
    }

    let code = if is_final { code } else { obex::CONTINUE };
    match write_body(transport, session_id, code, &header, &data) {
        Ok(accepted) => {
            channel.transfer = remainder_after(data, accepted, is_final);
            if channel.transfer.is_some() {
                channel.response_header = Some(header);
            } else if is_final {
                channel.finish_operation();
            }
            Ok(())
        }
        Err(e) => {
            respond_error(transport, channel.operation, session_id, obex::SERVER_ERROR);
            channel.finish_operation();
            Err(e.into())
        }
    }
}

fn expect_operation(channel: &Channel, op: Operation) -> Result<()> {
    match channel.operation {
        Operation::None => Err(MapError::NoOperationInProgress),
        active if active == op => Ok(()),
        _ => Err(MapError::InvalidOperation),
    }
}

/// Send a body-less response and end the operation.
fn respond(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    op: Operation,
    status: ResponseStatus,
    send: impl FnOnce(&dyn MapTransport, u32, u8) -> TransportResult<()>,
) -> Result<()> {
    let code = status.to_obex()?;
    let channel = connected_server(&mut ctx.state.registry, owner, address, instance_id)?;
    expect_operation(channel, op)?;
    let session_id = channel.session()?;

    let sent = send(ctx.shared.transport.as_ref(), session_id, code);
    if op == Operation::SetFolder && status.is_success() && sent.is_ok() {
        channel.current_path = std::mem::take(&mut channel.pending_path);
    }
    channel.finish_operation();
    sent.map_err(Into::into)
}

// Indications

pub(crate) fn on_notification_registration(ctx: &mut Context<'_>, session_id: u32, enabled: bool) {
    let transport = ctx.shared.transport.as_ref();
    let Some((channel, _)) = accept_request(
        &mut ctx.state.registry,
        transport,
        session_id,
        Operation::EnableNotifications,
    ) else {
        return;
    };
    ctx.outbox
        .push(channel, EventKind::EnableNotificationsRequest { enabled });
}

pub(crate) fn on_set_folder(
    ctx: &mut Context<'_>,
    session_id: u32,
    option: SetFolderOption,
    folder_name: Option<Vec<u16>>,
) {
    let transport = ctx.shared.transport.as_ref();
    let name = match folder_name.as_deref().map(unicode::decode_name) {
        None => None,
        Some(Some(name)) => Some(name).filter(|n| !n.is_empty()),
        Some(None) => {
            warn!("Undecodable folder name on session {}", session_id);
            respond_error(transport, Operation::SetFolder, session_id, obex::BAD_REQUEST);
            return;
        }
    };

    let Some((channel, _)) = accept_request(&mut ctx.state.registry, transport, session_id, Operation::SetFolder)
    else {
        return;
    };
    let pending_path = path::build_pending_path(option, name.as_deref(), &channel.current_path);
    channel.pending_path = pending_path.clone();
    ctx.outbox.push(
        channel,
        EventKind::SetFolderRequest {
            option,
            folder_name: name,
            pending_path,
        },
    );
}

/// Common path for GET indications: a continuation with a buffered body
/// is answered directly, anything else goes to the owner.
fn on_get(ctx: &mut Context<'_>, session_id: u32, op: Operation, request: EventKind) {
    let transport = ctx.shared.transport.as_ref();
    let Some((channel, continuing)) = accept_request(&mut ctx.state.registry, transport, session_id, op) else {
        return;
    };

    if continuing && channel.transfer.is_some() {
        if let Err(e) = continue_response(transport, channel) {
            warn!("Failed to continue {:?} on {}: {}", op, channel.tracking_id, e);
            respond_error(transport, op, session_id, obex::SERVER_ERROR);
            channel.finish_operation();
        }
        return;
    }
    ctx.outbox.push(channel, request);
}

pub(crate) fn on_get_folder_listing(
    ctx: &mut Context<'_>,
    session_id: u32,
    max_list_count: u16,
    list_start_offset: u16,
) {
    if max_list_count == 0 {
        on_get(
            ctx,
            session_id,
            Operation::GetFolderListingSize,
            EventKind::GetFolderListingSizeRequest,
        );
    } else {
        on_get(
            ctx,
            session_id,
            Operation::GetFolderListing,
            EventKind::GetFolderListingRequest {
                max_list_count,
                list_start_offset,
            },
        );
    }
}

pub(crate) fn on_get_message_listing(
    ctx: &mut Context<'_>,
    session_id: u32,
    folder_name: Option<Vec<u16>>,
    max_list_count: u16,
    list_start_offset: u16,
    listing_info: Option<MessageListingInfo>,
) {
    let op = if max_list_count == 0 {
        Operation::GetMessageListingSize
    } else {
        Operation::GetMessageListing
    };
    let folder_name = match folder_name.as_deref().map(unicode::decode_name) {
        None => None,
        Some(Some(name)) => Some(name).filter(|n| !n.is_empty()),
        Some(None) => {
            respond_error(ctx.shared.transport.as_ref(), op, session_id, obex::BAD_REQUEST);
            return;
        }
    };

    let request = if max_list_count == 0 {
        EventKind::GetMessageListingSizeRequest {
            folder_name,
            listing_info,
        }
    } else {
        EventKind::GetMessageListingRequest {
            folder_name,
            max_list_count,
            list_start_offset,
            listing_info,
        }
    };
    on_get(ctx, session_id, op, request);
}

pub(crate) fn on_get_message(
    ctx: &mut Context<'_>,
    session_id: u32,
    message_handle: String,
    attachment: bool,
    charset: CharSet,
    fractional_type: FractionalType,
) {
    if !limits::is_valid_message_handle(&message_handle) {
        respond_error(
            ctx.shared.transport.as_ref(),
            Operation::GetMessage,
            session_id,
            obex::BAD_REQUEST,
        );
        return;
    }
    on_get(
        ctx,
        session_id,
        Operation::GetMessage,
        EventKind::GetMessageRequest {
            message_handle,
            attachment,
            charset,
            fractional_type,
        },
    );
}

pub(crate) fn on_set_message_status(
    ctx: &mut Context<'_>,
    session_id: u32,
    message_handle: String,
    status_indicator: StatusIndicator,
    status_value: bool,
) {
    let transport = ctx.shared.transport.as_ref();
    if !limits::is_valid_message_handle(&message_handle) {
        respond_error(transport, Operation::SetMessageStatus, session_id, obex::BAD_REQUEST);
        return;
    }
    let Some((channel, _)) = accept_request(
        &mut ctx.state.registry,
        transport,
        session_id,
        Operation::SetMessageStatus,
    ) else {
        return;
    };
    ctx.outbox.push(
        channel,
        EventKind::SetMessageStatusRequest {
            message_handle,
            status_indicator,
            status_value,
        },
    );
}

pub(crate) fn on_push_message(ctx: &mut Context<'_>, session_id: u32, part: PushIndication) {
    let transport = ctx.shared.transport.as_ref();
    let folder_name = match part.folder_name.as_deref().map(unicode::decode_name) {
        None => None,
        Some(Some(name)) => Some(name).filter(|n| !n.is_empty()),
        Some(None) => {
            respond_error(transport, Operation::PushMessage, session_id, obex::BAD_REQUEST);
            return;
        }
    };

    let Some((channel, continuing)) =
        accept_request(&mut ctx.state.registry, transport, session_id, Operation::PushMessage)
    else {
        return;
    };
    if !continuing {
        channel.cached_push_handle = None;
    }
    channel.last_push_final = part.is_final;
    ctx.outbox.push(
        channel,
        EventKind::PushMessageRequest {
            folder_name,
            transparent: part.transparent,
            retry: part.retry,
            charset: part.charset,
            is_final: part.is_final,
            data: part.data,
        },
    );
}

pub(crate) fn on_update_inbox(ctx: &mut Context<'_>, session_id: u32) {
    let transport = ctx.shared.transport.as_ref();
    let Some((channel, _)) = accept_request(&mut ctx.state.registry, transport, session_id, Operation::UpdateInbox)
    else {
        return;
    };
    ctx.outbox.push(channel, EventKind::UpdateInboxRequest);
}

/// The peer abandoned its request. Only local bookkeeping changes.
pub(crate) fn on_abort_indication(ctx: &mut Context<'_>, session_id: u32) {
    let Some(id) = ctx.state.registry.search_by_session_id(session_id) else {
        return;
    };
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };
    if !channel.is_server {
        return;
    }
    debug!("Peer aborted {:?} on {}", channel.operation, id);
    channel.finish_operation();
    channel.cached_push_handle = None;
    channel.last_push_final = true;
    channel.pending_abort = false;
}

// Owner responses

pub(crate) fn enable_notifications_confirmation(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
) -> Result<()> {
    respond(
        ctx,
        owner,
        address,
        instance_id,
        Operation::EnableNotifications,
        status,
        |t, s, code| t.set_notification_registration_response(s, code),
    )
}

pub(crate) fn send_folder_listing(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
    data: Vec<u8>,
    is_final: bool,
) -> Result<()> {
    let channel = connected_server(&mut ctx.state.registry, owner, address, instance_id)?;
    expect_operation(channel, Operation::GetFolderListing)?;
    send_body(
        ctx.shared.transport.as_ref(),
        channel,
        status,
        ResponseHeader::FolderListing,
        data,
        is_final,
    )
}

pub(crate) fn send_folder_listing_size(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
    folder_count: u16,
) -> Result<()> {
    respond(
        ctx,
        owner,
        address,
        instance_id,
        Operation::GetFolderListingSize,
        status,
        |t, s, code| t.folder_listing_size_response(s, code, folder_count),
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn send_message_listing(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
    header: ListingHeader,
    data: Vec<u8>,
    is_final: bool,
) -> Result<()> {
    let channel = connected_server(&mut ctx.state.registry, owner, address, instance_id)?;
    expect_operation(channel, Operation::GetMessageListing)?;
    send_body(
        ctx.shared.transport.as_ref(),
        channel,
        status,
        ResponseHeader::MessageListing {
            message_count: header.message_count,
            new_message: header.new_message,
            mse_time: header.mse_time,
        },
        data,
        is_final,
    )
}

pub(crate) fn send_message_listing_size(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
    header: ListingHeader,
) -> Result<()> {
    respond(
        ctx,
        owner,
        address,
        instance_id,
        Operation::GetMessageListingSize,
        status,
        |t, s, code| {
            t.message_listing_size_response(
                s,
                code,
                header.message_count,
                header.new_message,
                header.mse_time.as_ref(),
            )
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn send_message(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
    fractional_type: FractionalType,
    data: Vec<u8>,
    is_final: bool,
) -> Result<()> {
    let channel = connected_server(&mut ctx.state.registry, owner, address, instance_id)?;
    expect_operation(channel, Operation::GetMessage)?;
    send_body(
        ctx.shared.transport.as_ref(),
        channel,
        status,
        ResponseHeader::Message { fractional_type },
        data,
        is_final,
    )
}

pub(crate) fn set_message_status_confirmation(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
) -> Result<()> {
    respond(
        ctx,
        owner,
        address,
        instance_id,
        Operation::SetMessageStatus,
        status,
        |t, s, code| t.set_message_status_response(s, code),
    )
}

pub(crate) fn update_inbox_confirmation(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
) -> Result<()> {
    respond(
        ctx,
        owner,
        address,
        instance_id,
        Operation::UpdateInbox,
        status,
        |t, s, code| t.update_inbox_response(s, code),
    )
}

pub(crate) fn set_folder_confirmation(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
) -> Result<()> {
    respond(
        ctx,
        owner,
        address,
        instance_id,
        Operation::SetFolder,
        status,
        |t, s, code| t.set_folder_response(s, code),
    )
}

/// Answer one pushed part. Parts before the last are acknowledged with
/// CONTINUE; a handle given early is kept for the final response.
pub(crate) fn push_message_confirmation(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    status: ResponseStatus,
    message_handle: Option<&str>,
) -> Result<()> {
    let code = status.to_obex()?;
    if let Some(handle) = message_handle {
        if !limits::is_valid_message_handle(handle) {
            return Err(MapError::InvalidParameter("message handle"));
        }
    }

    let channel = connected_server(&mut ctx.state.registry, owner, address, instance_id)?;
    expect_operation(channel, Operation::PushMessage)?;
    let session_id = channel.session()?;
    let transport = ctx.shared.transport.as_ref();

    if status.is_success() && !channel.last_push_final {
        if let Some(handle) = message_handle {
            channel.cached_push_handle = Some(handle.to_string());
        }
        return transport
            .push_message_response(session_id, obex::CONTINUE, None)
            .map_err(|e| {
                channel.finish_operation();
                channel.cached_push_handle = None;
                e.into()
            });
    }

    let handle = message_handle
        .map(str::to_string)
        .or_else(|| channel.cached_push_handle.take());
    let sent = transport.push_message_response(session_id, code, handle.as_deref());
    channel.finish_operation();
    channel.cached_push_handle = None;
    channel.last_push_final = true;
    sent.map_err(Into::into)
}

/// Send one part of an event report to a peer's notification server.
pub(crate) fn send_notification(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    data: Vec<u8>,
    is_final: bool,
) -> Result<()> {
    let channel = connected_notification_client(&mut ctx.state.registry, owner, address, instance_id)?;
    if channel.operation == Operation::SendEvent
        && (channel.transfer.is_some() || channel.awaiting_response)
    {
        return Err(MapError::InvalidOperation);
    }
    let session_id = channel.session()?;
    let first_part = channel.operation == Operation::None;
    channel.begin_operation(Operation::SendEvent)?;

    let transport = ctx.shared.transport.as_ref();
    match transport.send_event_request(session_id, channel.instance_id, &data, is_final) {
        Ok(accepted) => {
            channel.transfer = remainder_after(data, accepted, is_final);
            channel.awaiting_response = true;
            Ok(())
        }
        Err(e) => {
            if first_part {
                channel.finish_operation();
            } else {
                force_abort(transport, channel);
            }
            Err(e.into())
        }
    }
}
