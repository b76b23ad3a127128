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

//! Message client (MCE) requests and their confirmations.
//!
//! Every request starts an operation on a connected client channel. The
//! matching confirmation either completes it, or, on CONTINUE, is a
//! continuation point: the next body chunk or the same GET is sent again,
//! unless an abort is pending, in which case the abort is issued instead.

use tracing::{debug, warn};

use crate::address::BdAddr;
use crate::error::{MapError, Result, TransportError};
use crate::events::EventKind;
use crate::map::channel::{Channel, LastRequest, Operation};
use crate::map::constants::limits;
use crate::map::path::{self, AbsoluteWalk, SEPARATOR};
use crate::map::registry::Registry;
use crate::map::status::{self, ResponseStatus};
use crate::map::transfer::remainder_after;
use crate::map::types::{
    CharSet, ClientId, ConnectionType, FractionalType, MessageListingInfo, SetFolderOption,
    StatusIndicator,
};
use crate::map::unicode;
use crate::transport::{MapTransport, TransportResult};

use super::dispatch::Outbox;
use super::{connected_client, connected_notification_client, Context, ListingHeader};

/// Headers of a pushed message.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PushParams<'a> {
    pub folder_name: Option<&'a str>,
    pub transparent: bool,
    pub retry: bool,
    pub charset: CharSet,
}

pub(crate) fn encode_folder(name: Option<&str>) -> Result<Option<Vec<u16>>> {
    name.filter(|n| !n.is_empty())
        .map(unicode::encode_name)
        .transpose()
}

fn validate_handle(handle: &str) -> Result<()> {
    if !limits::is_valid_message_handle(handle) {
        return Err(MapError::InvalidParameter("message handle"));
    }
    Ok(())
}

/// Send the next piece of the active request: the next body chunk when one
/// is buffered, otherwise the request itself again.
pub(crate) fn continue_request(transport: &dyn MapTransport, channel: &mut Channel) -> TransportResult<()> {
    let session_id = channel.session_id.ok_or(TransportError::InvalidSession)?;

    if let Some(transfer) = channel.transfer.as_mut() {
        let is_final = transfer.is_final();
        let accepted = match (&channel.last_request, channel.operation) {
            (_, Operation::SendEvent) => transport.send_event_request(
                session_id,
                channel.instance_id,
                transfer.remaining(),
                is_final,
            )?,
            (
                Some(LastRequest::Push {
                    folder,
                    transparent,
                    retry,
                    charset,
                }),
                _,
            ) => transport.push_message(
                session_id,
                folder.as_deref(),
                *transparent,
                *retry,
                *charset,
                transfer.remaining(),
                is_final,
            )?,
            _ => return Err(TransportError::Failed("buffered body without a request".into())),
        };
        transfer.advance(accepted);
        if transfer.is_complete() {
            channel.transfer = None;
        }
        return Ok(());
    }

    match &channel.last_request {
        Some(LastRequest::FolderListing {
            max_list_count,
            list_start_offset,
        }) => transport.get_folder_listing(session_id, *max_list_count, *list_start_offset),
        Some(LastRequest::MessageListing {
            folder,
            max_list_count,
            list_start_offset,
            info,
        }) => transport.get_message_listing(
            session_id,
            folder.as_deref(),
            *max_list_count,
            *list_start_offset,
            info.as_ref(),
        ),
        Some(LastRequest::Message {
            handle,
            attachment,
            charset,
            fractional_type,
        }) => transport.get_message(session_id, handle, *attachment, *charset, *fractional_type),
        Some(LastRequest::Registration { enabled }) => {
            transport.set_notification_registration(session_id, *enabled)
        }
        Some(LastRequest::Push { .. }) | None => {
            Err(TransportError::Failed("no request to resubmit".into()))
        }
    }
}

/// End the active operation with `status` and no data, returning the
/// response its owner should get.
///
/// An interrupted absolute set-folder settles on the last folder reached.
pub(crate) fn terminal_response(channel: &mut Channel, status: ResponseStatus) -> Option<EventKind> {
    let kind = match channel.operation {
        Operation::None | Operation::Abort => None,
        Operation::EnableNotifications => Some(EventKind::EnableNotificationsResponse { status }),
        Operation::SetFolder => Some(EventKind::SetFolderResponse {
            status,
            current_path: channel.current_path.clone(),
        }),
        Operation::SetFolderAbsolute => {
            if let Some(walk) = channel.walk.as_ref().filter(|w| w.is_rooted()) {
                channel.current_path = walk.reached().to_string();
            }
            Some(EventKind::SetFolderResponse {
                status,
                current_path: channel.current_path.clone(),
            })
        }
        Operation::GetFolderListing => Some(EventKind::GetFolderListingResponse {
            status,
            is_final: true,
            data: Vec::new(),
        }),
        Operation::GetFolderListingSize => Some(EventKind::GetFolderListingSizeResponse {
            status,
            folder_count: 0,
        }),
        Operation::GetMessageListing => Some(EventKind::GetMessageListingResponse {
            status,
            message_count: 0,
            new_message: false,
            mse_time: None,
            is_final: true,
            data: Vec::new(),
        }),
        Operation::GetMessageListingSize => Some(EventKind::GetMessageListingSizeResponse {
            status,
            message_count: 0,
            new_message: false,
            mse_time: None,
        }),
        Operation::GetMessage => {
            let fractional_type = match &channel.last_request {
                Some(LastRequest::Message { fractional_type, .. }) => *fractional_type,
                _ => FractionalType::Unfragmented,
            };
            Some(EventKind::GetMessageResponse {
                status,
                fractional_type,
                is_final: true,
                data: Vec::new(),
            })
        }
        Operation::SetMessageStatus => Some(EventKind::SetMessageStatusResponse { status }),
        Operation::PushMessage => Some(EventKind::PushMessageResponse {
            status,
            message_handle: None,
        }),
        Operation::UpdateInbox => Some(EventKind::UpdateInboxResponse { status }),
        Operation::SendEvent => Some(EventKind::NotificationConfirmation { status }),
    };
    channel.finish_operation();
    kind
}

/// Honor a pending abort. With the exchange still open an ABORT goes to
/// the peer; either way the owner gets an aborted response now.
pub(crate) fn take_pending_abort(
    transport: &dyn MapTransport,
    outbox: &mut Outbox,
    channel: &mut Channel,
    exchange_open: bool,
) {
    debug!("Aborting {:?} on {}", channel.operation, channel.tracking_id);
    let kind = terminal_response(channel, ResponseStatus::OperationAborted);

    if exchange_open {
        match channel.session_id.map(|s| transport.abort_request(s)) {
            Some(Ok(())) => {
                channel.operation = Operation::Abort;
                channel.awaiting_response = true;
            }
            Some(Err(e)) => {
                warn!("Failed to send abort on {}: {}", channel.tracking_id, e);
                channel.pending_abort = false;
            }
            None => channel.pending_abort = false,
        }
    } else {
        channel.pending_abort = false;
    }

    if let Some(kind) = kind {
        outbox.push(channel, kind);
    }
}

/// Bring peer and channel back to idle after a failed submission.
pub(crate) fn force_abort(transport: &dyn MapTransport, channel: &mut Channel) {
    if channel.pending_abort && channel.operation == Operation::Abort {
        return;
    }
    channel.finish_operation();
    let Some(session_id) = channel.session_id else {
        channel.pending_abort = false;
        return;
    };
    match transport.abort_request(session_id) {
        Ok(()) => {
            channel.pending_abort = true;
            channel.operation = Operation::Abort;
            channel.awaiting_response = true;
        }
        Err(e) => {
            warn!("Forced abort on {} failed: {}", channel.tracking_id, e);
            channel.pending_abort = false;
        }
    }
}

/// A continuation could not be sent. The owner is told and the exchange is
/// aborted.
fn fail_submission(transport: &dyn MapTransport, outbox: &mut Outbox, channel: &mut Channel, error: TransportError) {
    warn!(
        "Continuation of {:?} on {} failed: {}",
        channel.operation, channel.tracking_id, error
    );
    if let Some(kind) = terminal_response(channel, ResponseStatus::UnableToSubmitRequest) {
        outbox.push(channel, kind);
    }
    force_abort(transport, channel);
}

/// Complete the active operation with `kind`, unless an abort is pending.
pub(crate) fn settle(transport: &dyn MapTransport, outbox: &mut Outbox, channel: &mut Channel, kind: EventKind) {
    if channel.pending_abort {
        take_pending_abort(transport, outbox, channel, false);
        return;
    }
    channel.finish_operation();
    outbox.push(channel, kind);
}

/// Client channel on `session_id` whose active operation is one of `ops`.
pub(crate) fn confirmed_client<'r>(
    registry: &'r mut Registry,
    session_id: u32,
    ops: &[Operation],
) -> Option<&'r mut Channel> {
    let Some(id) = registry.search_by_session_id(session_id) else {
        warn!("Confirmation on unknown session {}", session_id);
        return None;
    };
    let channel = registry.get_mut(id)?;
    if channel.is_server || !ops.contains(&channel.operation) {
        debug!(
            "Ignoring confirmation for {:?} on {} (expected {:?})",
            channel.operation, id, ops
        );
        return None;
    }
    channel.awaiting_response = false;
    Some(channel)
}

/// Deliver a GET response part. On CONTINUE the request is sent again.
fn deliver_get(
    transport: &dyn MapTransport,
    outbox: &mut Outbox,
    channel: &mut Channel,
    code: u8,
    make: impl FnOnce(bool) -> EventKind,
) {
    if !status::is_continue(code) {
        settle(transport, outbox, channel, make(true));
        return;
    }

    outbox.push(channel, make(false));
    if channel.pending_abort {
        take_pending_abort(transport, outbox, channel, true);
        return;
    }
    match continue_request(transport, channel) {
        Ok(()) => channel.awaiting_response = true,
        Err(e) => fail_submission(transport, outbox, channel, e),
    }
}

/// Confirmation of one part of a pushed body (message or event report).
fn confirm_body_part(
    transport: &dyn MapTransport,
    outbox: &mut Outbox,
    channel: &mut Channel,
    code: u8,
    make: impl FnOnce(ResponseStatus, bool) -> EventKind,
) {
    let status = ResponseStatus::from_obex(code);
    let more = status::is_continue(code);

    if channel.pending_abort {
        take_pending_abort(transport, outbox, channel, more);
        return;
    }

    if !status.is_success() || !more {
        channel.finish_operation();
        outbox.push(channel, make(status, true));
        return;
    }

    if channel.transfer.is_some() {
        match continue_request(transport, channel) {
            Ok(()) => channel.awaiting_response = true,
            Err(e) => fail_submission(transport, outbox, channel, e),
        }
        return;
    }

    // Part accepted; the owner submits the next one.
    outbox.push(channel, make(status, false));
}

/// Start `op` on a connected client and send `request`.
fn submit(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    op: Operation,
    request: LastRequest,
) -> Result<()> {
    let channel = connected_client(&mut ctx.state.registry, owner, address, instance_id)?;
    channel.begin_operation(op)?;
    channel.last_request = Some(request);
    if let Err(e) = continue_request(ctx.shared.transport.as_ref(), channel) {
        channel.finish_operation();
        return Err(e.into());
    }
    channel.awaiting_response = true;
    debug!("{:?} submitted on {}", op, channel.tracking_id);
    Ok(())
}

/// Start `op` on a connected client with a request that is never resent.
fn submit_once(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    op: Operation,
    send: impl FnOnce(&dyn MapTransport, u32) -> TransportResult<()>,
) -> Result<()> {
    let channel = connected_client(&mut ctx.state.registry, owner, address, instance_id)?;
    let session_id = channel.session()?;
    channel.begin_operation(op)?;
    if let Err(e) = send(ctx.shared.transport.as_ref(), session_id) {
        channel.finish_operation();
        return Err(e.into());
    }
    channel.awaiting_response = true;
    debug!("{:?} submitted on {}", op, channel.tracking_id);
    Ok(())
}

pub(crate) fn abort(
    ctx: &mut Context<'_>,
    owner: ClientId,
    connection_type: ConnectionType,
    address: BdAddr,
    instance_id: u32,
) -> Result<()> {
    let registry = &mut ctx.state.registry;
    let channel = match connection_type {
        ConnectionType::MessageAccessClient => connected_client(registry, owner, address, instance_id)?,
        ConnectionType::NotificationClient => {
            connected_notification_client(registry, owner, address, instance_id)?
        }
        ConnectionType::MessageAccessServer | ConnectionType::NotificationServer => {
            return Err(MapError::InvalidOperation)
        }
    };

    channel.request_abort()?;
    debug!("Abort requested for {:?} on {}", channel.operation, channel.tracking_id);

    // With a request outstanding the abort waits for its confirmation.
    if !channel.awaiting_response {
        take_pending_abort(ctx.shared.transport.as_ref(), &mut ctx.outbox, channel, true);
    }
    Ok(())
}

pub(crate) fn query_current_folder(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
) -> Result<String> {
    let channel = connected_client(&mut ctx.state.registry, owner, address, instance_id)?;
    Ok(channel.current_path.clone())
}

pub(crate) fn get_folder_listing(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    max_list_count: u16,
    list_start_offset: u16,
) -> Result<()> {
    submit(
        ctx,
        owner,
        address,
        instance_id,
        Operation::GetFolderListing,
        LastRequest::FolderListing {
            max_list_count,
            list_start_offset,
        },
    )
}

pub(crate) fn get_folder_listing_size(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
) -> Result<()> {
    submit(
        ctx,
        owner,
        address,
        instance_id,
        Operation::GetFolderListingSize,
        LastRequest::FolderListing {
            max_list_count: 0,
            list_start_offset: 0,
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn get_message_listing(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    folder_name: Option<&str>,
    max_list_count: u16,
    list_start_offset: u16,
    listing_info: Option<MessageListingInfo>,
) -> Result<()> {
    let folder = encode_folder(folder_name)?;
    submit(
        ctx,
        owner,
        address,
        instance_id,
        Operation::GetMessageListing,
        LastRequest::MessageListing {
            folder,
            max_list_count,
            list_start_offset,
            info: listing_info,
        },
    )
}

pub(crate) fn get_message_listing_size(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    folder_name: Option<&str>,
    listing_info: Option<MessageListingInfo>,
) -> Result<()> {
    let folder = encode_folder(folder_name)?;
    submit(
        ctx,
        owner,
        address,
        instance_id,
        Operation::GetMessageListingSize,
        LastRequest::MessageListing {
            folder,
            max_list_count: 0,
            list_start_offset: 0,
            info: listing_info,
        },
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn get_message(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    message_handle: &str,
    attachment: bool,
    charset: CharSet,
    fractional_type: FractionalType,
) -> Result<()> {
    validate_handle(message_handle)?;
    submit(
        ctx,
        owner,
        address,
        instance_id,
        Operation::GetMessage,
        LastRequest::Message {
            handle: message_handle.to_string(),
            attachment,
            charset,
            fractional_type,
        },
    )
}

pub(crate) fn set_message_status(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    message_handle: &str,
    indicator: StatusIndicator,
    value: bool,
) -> Result<()> {
    validate_handle(message_handle)?;
    submit_once(ctx, owner, address, instance_id, Operation::SetMessageStatus, |t, s| {
        t.set_message_status(s, message_handle, indicator, value)
    })
}

pub(crate) fn update_inbox(ctx: &mut Context<'_>, owner: ClientId, address: BdAddr, instance_id: u32) -> Result<()> {
    submit_once(ctx, owner, address, instance_id, Operation::UpdateInbox, |t, s| {
        t.update_inbox(s)
    })
}

pub(crate) fn push_message(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    params: PushParams<'_>,
    data: Vec<u8>,
    is_final: bool,
) -> Result<()> {
    let folder = encode_folder(params.folder_name)?;
    let channel = connected_client(&mut ctx.state.registry, owner, address, instance_id)?;

    // The next part may only follow once the previous one is confirmed.
    if channel.operation == Operation::PushMessage
        && (channel.transfer.is_some() || channel.awaiting_response)
    {
        return Err(MapError::InvalidOperation);
    }
    let session_id = channel.session()?;
    let first_part = channel.operation == Operation::None;
    channel.begin_operation(Operation::PushMessage)?;

    let transport = ctx.shared.transport.as_ref();
    match transport.push_message(
        session_id,
        folder.as_deref(),
        params.transparent,
        params.retry,
        params.charset,
        &data,
        is_final,
    ) {
        Ok(accepted) => {
            debug!(
                "Push part on {}: {}/{} bytes in first packet",
                channel.tracking_id,
                accepted.min(data.len()),
                data.len()
            );
            channel.transfer = remainder_after(data, accepted, is_final);
            channel.last_request = Some(LastRequest::Push {
                folder,
                transparent: params.transparent,
                retry: params.retry,
                charset: params.charset,
            });
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

pub(crate) fn set_folder(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    option: SetFolderOption,
    folder_name: Option<&str>,
) -> Result<()> {
    let folder_name = match option {
        SetFolderOption::Root => None,
        _ => folder_name.filter(|n| !n.is_empty()),
    };
    if option == SetFolderOption::Down && folder_name.is_none() {
        return Err(MapError::InvalidParameter("folder name"));
    }
    let name = encode_folder(folder_name)?;

    let channel = connected_client(&mut ctx.state.registry, owner, address, instance_id)?;
    let session_id = channel.session()?;
    channel.begin_operation(Operation::SetFolder)?;
    let pending = path::build_pending_path(option, folder_name, &channel.current_path);

    if let Err(e) = ctx
        .shared
        .transport
        .set_folder(session_id, option, name.as_deref())
    {
        channel.finish_operation();
        return Err(e.into());
    }
    channel.pending_path = pending;
    channel.awaiting_response = true;
    Ok(())
}

pub(crate) fn set_folder_absolute(
    ctx: &mut Context<'_>,
    owner: ClientId,
    address: BdAddr,
    instance_id: u32,
    target: &str,
) -> Result<()> {
    if target
        .split(SEPARATOR)
        .any(|segment| segment.chars().count() > limits::MAXIMUM_FOLDER_NAME_LENGTH)
    {
        return Err(MapError::InvalidParameter("folder name too long"));
    }

    let channel = connected_client(&mut ctx.state.registry, owner, address, instance_id)?;
    let session_id = channel.session()?;
    channel.begin_operation(Operation::SetFolderAbsolute)?;
    channel.walk = Some(AbsoluteWalk::new(target));

    if let Err(e) = ctx
        .shared
        .transport
        .set_folder(session_id, SetFolderOption::Root, None)
    {
        channel.finish_operation();
        return Err(e.into());
    }
    channel.awaiting_response = true;
    Ok(())
}

pub(crate) fn on_set_folder_confirmation(ctx: &mut Context<'_>, session_id: u32, code: u8) {
    let Some(channel) = confirmed_client(
        &mut ctx.state.registry,
        session_id,
        &[Operation::SetFolder, Operation::SetFolderAbsolute],
    ) else {
        return;
    };
    let transport = ctx.shared.transport.as_ref();
    let outbox = &mut ctx.outbox;
    let status = ResponseStatus::from_obex(code);

    if channel.operation == Operation::SetFolder {
        if status.is_success() {
            channel.current_path = std::mem::take(&mut channel.pending_path);
        }
        let kind = EventKind::SetFolderResponse {
            status,
            current_path: channel.current_path.clone(),
        };
        settle(transport, outbox, channel, kind);
        return;
    }

    if channel.pending_abort {
        take_pending_abort(transport, outbox, channel, false);
        return;
    }
    if !status.is_success() {
        debug!("Absolute set-folder stopped on {}: {:?}", channel.tracking_id, status);
        if let Some(kind) = terminal_response(channel, status) {
            outbox.push(channel, kind);
        }
        return;
    }

    let Some(walk) = channel.walk.as_mut() else {
        let kind = EventKind::SetFolderResponse {
            status,
            current_path: channel.current_path.clone(),
        };
        settle(transport, outbox, channel, kind);
        return;
    };
    if walk.is_rooted() {
        walk.advance();
    } else {
        walk.mark_rooted();
    }
    let next = walk.next_segment().map(unicode::encode_name);

    match next {
        None => {
            if let Some(kind) = terminal_response(channel, ResponseStatus::Success) {
                outbox.push(channel, kind);
            }
        }
        Some(Ok(name)) => {
            let sent = channel
                .session()
                .map_err(|_| TransportError::InvalidSession)
                .and_then(|s| transport.set_folder(s, SetFolderOption::Down, Some(name.as_slice())));
            match sent {
                Ok(()) => channel.awaiting_response = true,
                Err(e) => {
                    warn!("Absolute set-folder step failed on {}: {}", channel.tracking_id, e);
                    if let Some(kind) = terminal_response(channel, ResponseStatus::UnableToSubmitRequest) {
                        outbox.push(channel, kind);
                    }
                }
            }
        }
        Some(Err(e)) => {
            warn!("Absolute set-folder segment rejected: {}", e);
            if let Some(kind) = terminal_response(channel, ResponseStatus::BadRequest) {
                outbox.push(channel, kind);
            }
        }
    }
}

pub(crate) fn on_folder_listing_confirmation(
    ctx: &mut Context<'_>,
    session_id: u32,
    code: u8,
    folder_count: u16,
    data: Vec<u8>,
) {
    let Some(channel) = confirmed_client(
        &mut ctx.state.registry,
        session_id,
        &[Operation::GetFolderListing, Operation::GetFolderListingSize],
    ) else {
        return;
    };
    let transport = ctx.shared.transport.as_ref();
    let status = ResponseStatus::from_obex(code);

    if channel.operation == Operation::GetFolderListingSize {
        let kind = EventKind::GetFolderListingSizeResponse { status, folder_count };
        settle(transport, &mut ctx.outbox, channel, kind);
        return;
    }
    deliver_get(transport, &mut ctx.outbox, channel, code, |is_final| {
        EventKind::GetFolderListingResponse {
            status,
            is_final,
            data,
        }
    });
}

pub(crate) fn on_message_listing_confirmation(
    ctx: &mut Context<'_>,
    session_id: u32,
    code: u8,
    header: ListingHeader,
    data: Vec<u8>,
) {
    let Some(channel) = confirmed_client(
        &mut ctx.state.registry,
        session_id,
        &[Operation::GetMessageListing, Operation::GetMessageListingSize],
    ) else {
        return;
    };
    let transport = ctx.shared.transport.as_ref();
    let status = ResponseStatus::from_obex(code);

    if channel.operation == Operation::GetMessageListingSize {
        let kind = EventKind::GetMessageListingSizeResponse {
            status,
            message_count: header.message_count,
            new_message: header.new_message,
            mse_time: header.mse_time,
        };
        settle(transport, &mut ctx.outbox, channel, kind);
        return;
    }
    deliver_get(transport, &mut ctx.outbox, channel, code, |is_final| {
        EventKind::GetMessageListingResponse {
            status,
            message_count: header.message_count,
            new_message: header.new_message,
            mse_time: header.mse_time,
            is_final,
            data,
        }
    });
}

pub(crate) fn on_message_confirmation(
    ctx: &mut Context<'_>,
    session_id: u32,
    code: u8,
    fractional_type: FractionalType,
    data: Vec<u8>,
) {
    let Some(channel) = confirmed_client(&mut ctx.state.registry, session_id, &[Operation::GetMessage]) else {
        return;
    };
    let status = ResponseStatus::from_obex(code);
    deliver_get(ctx.shared.transport.as_ref(), &mut ctx.outbox, channel, code, |is_final| {
        EventKind::GetMessageResponse {
            status,
            fractional_type,
            is_final,
            data,
        }
    });
}

pub(crate) fn on_set_message_status_confirmation(ctx: &mut Context<'_>, session_id: u32, code: u8) {
    let Some(channel) = confirmed_client(
        &mut ctx.state.registry,
        session_id,
        &[Operation::SetMessageStatus],
    ) else {
        return;
    };
    let status = ResponseStatus::from_obex(code);
    settle(
        ctx.shared.transport.as_ref(),
        &mut ctx.outbox,
        channel,
        EventKind::SetMessageStatusResponse { status },
    );
}

pub(crate) fn on_update_inbox_confirmation(ctx: &mut Context<'_>, session_id: u32, code: u8) {
    let Some(channel) = confirmed_client(&mut ctx.state.registry, session_id, &[Operation::UpdateInbox]) else {
        return;
    };
    let status = ResponseStatus::from_obex(code);
    settle(
        ctx.shared.transport.as_ref(),
        &mut ctx.outbox,
        channel,
        EventKind::UpdateInboxResponse { status },
    );
}

pub(crate) fn on_push_message_confirmation(
    ctx: &mut Context<'_>,
    session_id: u32,
    code: u8,
    message_handle: Option<String>,
) {
    let Some(channel) = confirmed_client(&mut ctx.state.registry, session_id, &[Operation::PushMessage]) else {
        return;
    };
    confirm_body_part(
        ctx.shared.transport.as_ref(),
        &mut ctx.outbox,
        channel,
        code,
        |status, done| EventKind::PushMessageResponse {
            status,
            message_handle: if done { message_handle } else { None },
        },
    );
}

pub(crate) fn on_send_event_confirmation(ctx: &mut Context<'_>, session_id: u32, code: u8) {
    let Some(channel) = confirmed_client(&mut ctx.state.registry, session_id, &[Operation::SendEvent]) else {
        return;
    };
    confirm_body_part(
        ctx.shared.transport.as_ref(),
        &mut ctx.outbox,
        channel,
        code,
        |status, _| EventKind::NotificationConfirmation { status },
    );
}

/// The peer acknowledged an ABORT. Only local bookkeeping changes; the
/// owner already got its aborted response.
pub(crate) fn on_abort_confirmation(ctx: &mut Context<'_>, session_id: u32) {
    let Some(id) = ctx.state.registry.search_by_session_id(session_id) else {
        return;
    };
    let Some(channel) = ctx.state.registry.get_mut(id) else {
        return;
    };
    if channel.is_server {
        return;
    }
    channel.pending_abort = false;
    channel.awaiting_response = false;
    if channel.operation == Operation::Abort {
        channel.finish_operation();
    }
    debug!("Abort confirmed on {}", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::channel::TrackingId;

    fn client() -> Channel {
        Channel::new(
            TrackingId(1),
            ConnectionType::MessageAccessClient,
            ClientId::LOCAL,
            None,
        )
    }

    #[test]
    fn test_terminal_response_settles_walk_on_last_reached() {
        let mut channel = client();
        channel.current_path = "old/place".to_string();
        channel.operation = Operation::SetFolderAbsolute;
        let mut walk = AbsoluteWalk::new("telecom/msg/inbox");
        walk.mark_rooted();
        walk.advance();
        channel.walk = Some(walk);

        let kind = terminal_response(&mut channel, ResponseStatus::NotFound).unwrap();
        assert_eq!(
            kind,
            EventKind::SetFolderResponse {
                status: ResponseStatus::NotFound,
                current_path: "telecom".to_string(),
            }
        );
        assert_eq!(channel.operation, Operation::None);
        assert!(channel.walk.is_none());
    }

    #[test]
    fn test_terminal_response_before_root_keeps_path() {
        let mut channel = client();
        channel.current_path = "telecom".to_string();
        channel.operation = Operation::SetFolderAbsolute;
        channel.walk = Some(AbsoluteWalk::new("a/b"));

        terminal_response(&mut channel, ResponseStatus::ResourcesAborted);
        assert_eq!(channel.current_path, "telecom");
    }

    #[test]
    fn test_terminal_response_keeps_fractional_type() {
        let mut channel = client();
        channel.operation = Operation::GetMessage;
        channel.last_request = Some(LastRequest::Message {
            handle: "20000100001".into(),
            attachment: false,
            charset: CharSet::Utf8,
            fractional_type: FractionalType::First,
        });

        match terminal_response(&mut channel, ResponseStatus::OperationAborted) {
            Some(EventKind::GetMessageResponse {
                fractional_type,
                is_final,
                ..
            }) => {
                assert_eq!(fractional_type, FractionalType::First);
                assert!(is_final);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(channel.last_request.is_none());
    }

    #[test]
    fn test_idle_channel_has_no_terminal_response() {
        let mut channel = client();
        assert!(terminal_response(&mut channel, ResponseStatus::DevicePoweredOff).is_none());
    }

    #[test]
    fn test_encode_folder() {
        assert_eq!(encode_folder(None).unwrap(), None);
        assert_eq!(encode_folder(Some("")).unwrap(), None);
        assert_eq!(encode_folder(Some("in")).unwrap(), Some(vec![105, 110, 0]));
    }
}
