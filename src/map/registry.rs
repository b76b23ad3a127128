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

//! Channel storage.
//!
//! Channels live in one of two collections: message-access (servers and
//! client connections) or notification (notification servers and
//! notification client connections). Removal only unlinks; the caller
//! owns the returned channel and must call `cleanup` on it.

use std::collections::BTreeMap;
use tracing::warn;

use crate::address::BdAddr;
use crate::error::{MapError, Result};

use super::channel::{Channel, TrackingId};

/// Ids at or above this bit are reserved.
const TRACKING_ID_LIMIT: u32 = 0x8000_0000;

/// One keyed collection of channels.
#[derive(Default)]
pub struct ChannelList {
    entries: BTreeMap<TrackingId, Channel>,
}

impl ChannelList {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: TrackingId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: TrackingId) -> Option<&Channel> {
        if id.0 == 0 {
            return None;
        }
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackingId) -> Option<&mut Channel> {
        if id.0 == 0 {
            return None;
        }
        self.entries.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.entries.values_mut()
    }

    pub fn ids(&self) -> Vec<TrackingId> {
        self.entries.keys().copied().collect()
    }

    /// Channel connected to (address, instance) in the given role.
    pub fn search_by_connection(
        &self,
        address: BdAddr,
        instance_id: u32,
        is_server: bool,
    ) -> Option<TrackingId> {
        if address.is_null() {
            return None;
        }
        self.entries
            .values()
            .find(|c| {
                c.remote_address == address && c.instance_id == instance_id && c.is_server == is_server
            })
            .map(|c| c.tracking_id)
    }

    /// Registered server with the given instance id.
    pub fn search_server_by_instance(&self, instance_id: u32) -> Option<TrackingId> {
        self.entries
            .values()
            .find(|c| c.is_server && c.instance_id == instance_id)
            .map(|c| c.tracking_id)
    }

    pub fn search_by_session_id(&self, session_id: u32) -> Option<TrackingId> {
        if session_id == 0 {
            return None;
        }
        self.entries
            .values()
            .find(|c| c.session_id == Some(session_id))
            .map(|c| c.tracking_id)
    }

    fn insert(&mut self, channel: Channel) -> Result<TrackingId> {
        let id = channel.tracking_id;
        if id.0 == 0 || self.entries.contains_key(&id) {
            warn!("Rejecting duplicate channel {}", id);
            return Err(MapError::UnableToAddEntry);
        }
        self.entries.insert(id, channel);
        Ok(id)
    }

    fn remove(&mut self, id: TrackingId) -> Option<Channel> {
        self.entries.remove(&id)
    }

    fn drain(&mut self) -> Vec<Channel> {
        std::mem::take(&mut self.entries).into_values().collect()
    }
}

/// Both channel collections plus the tracking id generator.
pub struct Registry {
    pub access: ChannelList,
    pub notification: ChannelList,
    next_id: u32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            access: ChannelList::default(),
            notification: ChannelList::default(),
            next_id: 1,
        }
    }

    /// Hand out the next unused tracking id.
    pub fn allocate_tracking_id(&mut self) -> TrackingId {
        loop {
            if self.next_id == 0 || self.next_id >= TRACKING_ID_LIMIT {
                self.next_id = 1;
            }
            let candidate = TrackingId(self.next_id);
            self.next_id += 1;
            if !self.contains(candidate) {
                return candidate;
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_next_id(&mut self, next: u32) {
        self.next_id = next;
    }

    pub fn contains(&self, id: TrackingId) -> bool {
        self.access.contains(id) || self.notification.contains(id)
    }

    fn list_for(&mut self, channel: &Channel) -> &mut ChannelList {
        if channel.connection_type.is_notification() {
            &mut self.notification
        } else {
            &mut self.access
        }
    }

    /// Link a channel into the collection matching its role.
    pub fn add(&mut self, channel: Channel) -> Result<TrackingId> {
        if self.contains(channel.tracking_id) {
            warn!("Tracking id {} already in use", channel.tracking_id);
            return Err(MapError::UnableToAddEntry);
        }
        self.list_for(&channel).insert(channel)
    }

    pub fn search_by_tracking_id(&self, id: TrackingId) -> Option<&Channel> {
        self.access.get(id).or_else(|| self.notification.get(id))
    }

    pub fn get_mut(&mut self, id: TrackingId) -> Option<&mut Channel> {
        if self.access.contains(id) {
            self.access.get_mut(id)
        } else {
            self.notification.get_mut(id)
        }
    }

    pub fn search_by_session_id(&self, session_id: u32) -> Option<TrackingId> {
        self.access
            .search_by_session_id(session_id)
            .or_else(|| self.notification.search_by_session_id(session_id))
    }

    /// Unlink a channel. Nothing is released until the caller runs
    /// `cleanup` on the returned value.
    pub fn remove(&mut self, id: TrackingId) -> Option<Channel> {
        if id.0 == 0 {
            return None;
        }
        self.access.remove(id).or_else(|| self.notification.remove(id))
    }

    /// Unlink every channel from both collections.
    pub fn drain(&mut self) -> Vec<Channel> {
        let mut all = self.access.drain();
        all.extend(self.notification.drain());
        all
    }

    pub fn all_ids(&self) -> Vec<TrackingId> {
        let mut ids = self.access.ids();
        ids.extend(self.notification.ids());
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::types::{ClientId, ConnectionType};
    use std::collections::HashSet;

    fn channel(registry: &mut Registry, kind: ConnectionType) -> Channel {
        let id = registry.allocate_tracking_id();
        Channel::new(id, kind, ClientId::LOCAL, None)
    }

    #[test]
    fn test_ids_unique_and_nonzero() {
        let mut registry = Registry::new();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let c = channel(&mut registry, ConnectionType::MessageAccessClient);
            let id = registry.add(c).unwrap();
            assert_ne!(id.0, 0);
            assert!(seen.insert(id));
        }
        assert_eq!(registry.access.len(), 100);
    }

    #[test]
    fn test_wrap_skips_live_ids() {
        let mut registry = Registry::new();
        let first = channel(&mut registry, ConnectionType::MessageAccessServer);
        let first_id = registry.add(first).unwrap();
        assert_eq!(first_id, TrackingId(1));

        registry.set_next_id(TRACKING_ID_LIMIT - 1);
        let last = registry.allocate_tracking_id();
        assert_eq!(last, TrackingId(TRACKING_ID_LIMIT - 1));

        // Wraps to 1, which is live, so 2 is handed out.
        assert_eq!(registry.allocate_tracking_id(), TrackingId(2));
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = Registry::new();
        let a = Channel::new(TrackingId(5), ConnectionType::MessageAccessClient, ClientId::LOCAL, None);
        let b = Channel::new(TrackingId(5), ConnectionType::NotificationServer, ClientId::LOCAL, None);
        registry.add(a).unwrap();
        assert!(matches!(registry.add(b), Err(MapError::UnableToAddEntry)));
        assert!(registry.notification.is_empty());
    }

    #[test]
    fn test_collections_follow_role() {
        let mut registry = Registry::new();
        let mns = channel(&mut registry, ConnectionType::NotificationServer);
        let mas = channel(&mut registry, ConnectionType::MessageAccessClient);
        let mns_id = registry.add(mns).unwrap();
        let mas_id = registry.add(mas).unwrap();
        assert!(registry.notification.contains(mns_id));
        assert!(registry.access.contains(mas_id));
    }

    #[test]
    fn test_searches() {
        let mut registry = Registry::new();
        let addr: BdAddr = "00:11:22:33:44:55".parse().unwrap();

        let mut server = channel(&mut registry, ConnectionType::MessageAccessServer);
        server.instance_id = 3;
        let server_id = registry.add(server).unwrap();

        let mut client = channel(&mut registry, ConnectionType::MessageAccessClient);
        client.remote_address = addr;
        client.instance_id = 3;
        client.session_id = Some(42);
        let client_id = registry.add(client).unwrap();

        assert_eq!(registry.access.search_server_by_instance(3), Some(server_id));
        assert_eq!(registry.access.search_by_connection(addr, 3, false), Some(client_id));
        assert_eq!(registry.access.search_by_connection(addr, 3, true), None);
        assert_eq!(registry.access.search_by_connection(BdAddr::NULL, 0, true), None);
        assert_eq!(registry.search_by_session_id(42), Some(client_id));
        assert_eq!(registry.search_by_session_id(0), None);
        assert!(registry.search_by_tracking_id(TrackingId(0)).is_none());
    }

    #[test]
    fn test_remove_only_unlinks() {
        let mut registry = Registry::new();
        let c = channel(&mut registry, ConnectionType::MessageAccessClient);
        let id = registry.add(c).unwrap();
        let mut removed = registry.remove(id).unwrap();
        assert!(!registry.contains(id));
        assert_eq!(removed.tracking_id(), id);
        removed.cleanup();
        assert!(registry.remove(id).is_none());
    }
}
