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

//! Event delivery.
//!
//! Handlers queue events in an [`Outbox`] while the manager lock is held.
//! The outbox is flushed after the lock is released, so owner callbacks
//! may call straight back into the manager.

use tracing::{debug, error, warn};

use crate::events::{EventCallback, EventKind, MapEvent};
use crate::ipc::{EventErrorMessage, EventMessage, ServerMessage};
use crate::map::channel::Channel;
use crate::map::types::ClientId;
use crate::transport::IpcSender;

/// Where a queued event goes.
pub(crate) enum EventTarget {
    Local(EventCallback),
    Remote(ClientId),
}

pub(crate) struct Delivery {
    pub target: EventTarget,
    pub event: MapEvent,
}

/// Events collected under the lock, delivered after it.
#[derive(Default)]
pub(crate) struct Outbox {
    deliveries: Vec<Delivery>,
}

impl Outbox {
    /// Queue `kind` for the owner of `channel`.
    pub fn push(&mut self, channel: &Channel, kind: EventKind) {
        let event = MapEvent {
            tracking_id: channel.tracking_id,
            remote_address: channel.remote_address,
            instance_id: channel.instance_id,
            kind,
        };

        let target = match (&channel.callback, channel.owner.is_local()) {
            (Some(callback), true) => EventTarget::Local(callback.clone()),
            (None, true) => {
                debug!(
                    "Channel {} has no callback, dropping event 0x{:05X}",
                    channel.tracking_id,
                    event.function()
                );
                return;
            }
            (_, false) => EventTarget::Remote(channel.owner),
        };

        self.deliveries.push(Delivery { target, event });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Deliver everything queued, in order.
    pub fn flush(self, ipc: &dyn IpcSender) {
        for delivery in self.deliveries {
            match delivery.target {
                EventTarget::Local(callback) => callback(&delivery.event),
                EventTarget::Remote(client) => send_remote(ipc, client, delivery.event),
            }
        }
    }
}

fn send_remote(ipc: &dyn IpcSender, client: ClientId, event: MapEvent) {
    let function = event.function();
    let message = ServerMessage::Event(EventMessage {
        function,
        event: event.clone(),
    });

    match serde_json::to_string(&message) {
        Ok(json) => ipc.send(client, json),
        Err(e) => {
            warn!("Failed to serialize event 0x{:05X} for {}: {}", function, client, e);
            let reduced = ServerMessage::EventError(EventErrorMessage {
                function,
                remote_address: event.remote_address,
                instance_id: event.instance_id,
                status: event.status(),
            });
            match serde_json::to_string(&reduced) {
                Ok(json) => ipc.send(client, json),
                Err(e) => error!("Dropping event 0x{:05X} for {}: {}", function, client, e),
            }
        }
    }
}
