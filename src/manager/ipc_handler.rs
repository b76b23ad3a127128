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

//! Requests from remote clients.
//!
//! Each request runs the same operation an in-process caller would, with the
//! client recorded as owner. Exactly one response goes back per request, and
//! it goes out before any event the request itself produced.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::error::{MapError, Result};
use crate::ipc::{Request, RequestMessage, ResponseMessage, ResponsePayload, ServerMessage};
use crate::map::types::ClientId;

use super::dispatch::Outbox;
use super::{client_ops, connection, notification, server_ops, ListingHeader, Shared};

pub(crate) fn serve_client_request(shared: &Arc<Shared>, client: ClientId, raw: &str) {
    let (response, outbox) = match serde_json::from_str::<RequestMessage>(raw) {
        Ok(message) => {
            let function = message.request.function_id();
            debug!("Request {:#x} from {} (message {})", function, client, message.message_id);
            let (result, outbox) = if client.is_local() {
                warn!("Request {:#x} from a remote client using the local id", function);
                (Err(MapError::InvalidClient), Outbox::default())
            } else {
                execute(shared, client, message.request)
            };
            let response = match result {
                Ok(payload) => ResponseMessage::success(message.message_id, function, payload),
                Err(e) => {
                    debug!("Request {:#x} from {} failed: {}", function, client, e);
                    ResponseMessage::failure(message.message_id, function, &e)
                }
            };
            (response, outbox)
        }
        Err(e) => {
            warn!("Malformed request from {}: {}", client, e);
            (
                ResponseMessage::malformed(salvage_message_id(raw), e.to_string()),
                Outbox::default(),
            )
        }
    };
    send_response(shared, client, response);
    outbox.flush(shared.ipc.as_ref());
}

/// Best-effort message id from a request that failed to parse.
fn salvage_message_id(raw: &str) -> u32 {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get("message_id").and_then(Value::as_u64))
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(0)
}

fn send_response(shared: &Arc<Shared>, client: ClientId, response: ResponseMessage) {
    let message_id = response.message_id;
    match encode_or_reduce(&ServerMessage::Response(response), message_id) {
        Ok(text) => shared.ipc.send(client, text),
        Err(e) => error!("Dropping response {} for {}: {}", message_id, client, e),
    }
}

/// Serialize `message`, or a bare failure response if it cannot be encoded.
fn encode_or_reduce<T: Serialize>(message: &T, message_id: u32) -> serde_json::Result<String> {
    serde_json::to_string(message).or_else(|e| {
        warn!("Failed to serialize response {}: {}", message_id, e);
        let reduced = ResponseMessage::malformed(message_id, "response could not be encoded".into());
        serde_json::to_string(&ServerMessage::Response(reduced))
    })
}

fn execute(
    shared: &Arc<Shared>,
    client: ClientId,
    request: Request,
) -> (Result<Option<ResponsePayload>>, Outbox) {
    use Request::*;

    if let ParseRemoteMessageAccessServices { remote_address } = request {
        let services = connection::parse_remote_services(shared, remote_address)
            .map(|services| Some(ResponsePayload::Services(services)));
        return (services, Outbox::default());
    }

    shared.with_held_events(|ctx| match request {
        ConnectionRequestResponse {
            remote_address,
            instance_id,
            accept,
        } => connection::connection_request_response(ctx, client, remote_address, instance_id, accept)
            .map(|_| None),
        RegisterServer {
            port,
            flags,
            instance_id,
            supported_message_types,
        } => connection::register_server(
            ctx,
            client,
            None,
            port,
            flags,
            instance_id,
            supported_message_types,
        )
        .map(|instance_id| Some(ResponsePayload::Server { instance_id })),
        UnRegisterServer { instance_id } => {
            connection::unregister_server(ctx, client, instance_id).map(|_| None)
        }
        RegisterServiceRecord {
            instance_id,
            service_name,
        } => connection::register_service_record(ctx, client, instance_id, &service_name)
            .map(|handle| Some(ResponsePayload::RecordHandle(handle))),
        UnRegisterServiceRecord { instance_id } => {
            connection::unregister_service_record(ctx, client, instance_id).map(|_| None)
        }
        ParseRemoteMessageAccessServices { .. } => Ok(None),
        ConnectRemoteDevice {
            connection_type,
            remote_address,
            port,
            instance_id,
            flags,
        } => connection::connect_remote_device(
            ctx,
            client,
            None,
            connection::ConnectParams {
                connection_type,
                address: remote_address,
                port,
                instance_id,
                flags,
            },
            None,
        )
        .map(|id| Some(ResponsePayload::TrackingId(id))),
        Disconnect {
            connection_type,
            remote_address,
            instance_id,
        } => connection::disconnect(ctx, client, connection_type, remote_address, instance_id).map(|_| None),
        Abort {
            connection_type,
            remote_address,
            instance_id,
        } => client_ops::abort(ctx, client, connection_type, remote_address, instance_id).map(|_| None),

        QueryCurrentFolder {
            remote_address,
            instance_id,
        } => client_ops::query_current_folder(ctx, client, remote_address, instance_id)
            .map(|path| Some(ResponsePayload::CurrentFolder(path))),
        EnableNotifications {
            remote_address,
            instance_id,
            enabled,
        } => notification::enable_notifications(ctx, client, remote_address, instance_id, enabled).map(|_| None),
        GetFolderListing {
            remote_address,
            instance_id,
            max_list_count,
            list_start_offset,
        } => client_ops::get_folder_listing(
            ctx,
            client,
            remote_address,
            instance_id,
            max_list_count,
            list_start_offset,
        )
        .map(|_| None),
        GetFolderListingSize {
            remote_address,
            instance_id,
        } => client_ops::get_folder_listing_size(ctx, client, remote_address, instance_id).map(|_| None),
        GetMessageListing {
            remote_address,
            instance_id,
            folder_name,
            max_list_count,
            list_start_offset,
            listing_info,
        } => client_ops::get_message_listing(
            ctx,
            client,
            remote_address,
            instance_id,
            folder_name.as_deref(),
            max_list_count,
            list_start_offset,
            listing_info,
        )
        .map(|_| None),
        GetMessageListingSize {
            remote_address,
            instance_id,
            folder_name,
            listing_info,
        } => client_ops::get_message_listing_size(
            ctx,
            client,
            remote_address,
            instance_id,
            folder_name.as_deref(),
            listing_info,
        )
        .map(|_| None),
        GetMessage {
            remote_address,
            instance_id,
            message_handle,
            attachment,
            charset,
            fractional_type,
        } => client_ops::get_message(
            ctx,
            client,
            remote_address,
            instance_id,
            &message_handle,
            attachment,
            charset,
            fractional_type,
        )
        .map(|_| None),
        SetMessageStatus {
            remote_address,
            instance_id,
            message_handle,
            status_indicator,
            status_value,
        } => client_ops::set_message_status(
            ctx,
            client,
            remote_address,
            instance_id,
            &message_handle,
            status_indicator,
            status_value,
        )
        .map(|_| None),
        PushMessage {
            remote_address,
            instance_id,
            folder_name,
            transparent,
            retry,
            charset,
            data,
            is_final,
        } => client_ops::push_message(
            ctx,
            client,
            remote_address,
            instance_id,
            client_ops::PushParams {
                folder_name: folder_name.as_deref(),
                transparent,
                retry,
                charset,
            },
            data,
            is_final,
        )
        .map(|_| None),
        UpdateInbox {
            remote_address,
            instance_id,
        } => client_ops::update_inbox(ctx, client, remote_address, instance_id).map(|_| None),
        SetFolder {
            remote_address,
            instance_id,
            option,
            folder_name,
        } => client_ops::set_folder(
            ctx,
            client,
            remote_address,
            instance_id,
            option,
            folder_name.as_deref(),
        )
        .map(|_| None),
        SetFolderAbsolute {
            remote_address,
            instance_id,
            folder_name,
        } => client_ops::set_folder_absolute(ctx, client, remote_address, instance_id, &folder_name).map(|_| None),

        EnableNotificationsConfirmation {
            remote_address,
            instance_id,
            status,
        } => server_ops::enable_notifications_confirmation(ctx, client, remote_address, instance_id, status)
            .map(|_| None),
        SendFolderListing {
            remote_address,
            instance_id,
            status,
            data,
            is_final,
        } => server_ops::send_folder_listing(ctx, client, remote_address, instance_id, status, data, is_final)
            .map(|_| None),
        SendFolderListingSize {
            remote_address,
            instance_id,
            status,
            folder_count,
        } => server_ops::send_folder_listing_size(ctx, client, remote_address, instance_id, status, folder_count)
            .map(|_| None),
        SendMessageListing {
            remote_address,
            instance_id,
            status,
            message_count,
            new_message,
            mse_time,
            data,
            is_final,
        } => server_ops::send_message_listing(
            ctx,
            client,
            remote_address,
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
        .map(|_| None),
        SendMessageListingSize {
            remote_address,
            instance_id,
            status,
            message_count,
            new_message,
            mse_time,
        } => server_ops::send_message_listing_size(
            ctx,
            client,
            remote_address,
            instance_id,
            status,
            ListingHeader {
                message_count,
                new_message,
                mse_time,
            },
        )
        .map(|_| None),
        SendMessage {
            remote_address,
            instance_id,
            status,
            fractional_type,
            data,
            is_final,
        } => server_ops::send_message(
            ctx,
            client,
            remote_address,
            instance_id,
            status,
            fractional_type,
            data,
            is_final,
        )
        .map(|_| None),
        SetMessageStatusConfirmation {
            remote_address,
            instance_id,
            status,
        } => server_ops::set_message_status_confirmation(ctx, client, remote_address, instance_id, status)
            .map(|_| None),
        PushMessageConfirmation {
            remote_address,
            instance_id,
            status,
            message_handle,
        } => server_ops::push_message_confirmation(
            ctx,
            client,
            remote_address,
            instance_id,
            status,
            message_handle.as_deref(),
        )
        .map(|_| None),
        UpdateInboxConfirmation {
            remote_address,
            instance_id,
            status,
        } => server_ops::update_inbox_confirmation(ctx, client, remote_address, instance_id, status).map(|_| None),
        SetFolderConfirmation {
            remote_address,
            instance_id,
            status,
        } => server_ops::set_folder_confirmation(ctx, client, remote_address, instance_id, status).map(|_| None),

        SendNotification {
            remote_address,
            instance_id,
            data,
            is_final,
        } => server_ops::send_notification(ctx, client, remote_address, instance_id, data, is_final).map(|_| None),
    })
}
