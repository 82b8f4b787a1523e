//! Authoritative `user_id -> OnlineUser` merge.
//!
//! `sync` replaces everything; `join`/`leave` patch. Writes are
//! last-write-wins by arrival order. Timestamps are not compared since
//! clocks across clients are not assumed to agree.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::broadcast;
use tracing::debug;

use crate::protocol::{OnlineUser, PresenceRecord};

/// Notification sent to store observers after each mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Synced { count: usize },
    Joined { user_id: String },
    Left { user_id: String },
    Cleared,
}

pub struct PresenceStateStore {
    users: HashMap<String, OnlineUser>,
    /// room_id -> user ids, kept in step with `users`.
    rooms: HashMap<String, BTreeSet<String>>,
    changes: broadcast::Sender<StoreChange>,
}

impl PresenceStateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            users: HashMap::new(),
            rooms: HashMap::new(),
            changes,
        }
    }

    /// Replace the whole map with a full snapshot.
    pub fn apply_sync(&mut self, records: impl IntoIterator<Item = PresenceRecord>) {
        self.users.clear();
        self.rooms.clear();
        for record in records {
            let user_id = record.user_id.clone();
            self.insert(user_id, record);
        }
        debug!(users = self.users.len(), "presence synced");
        self.notify(StoreChange::Synced {
            count: self.users.len(),
        });
    }

    /// Insert or overwrite one user.
    pub fn apply_join(&mut self, user_id: &str, record: PresenceRecord) {
        self.insert(user_id.to_string(), record);
        self.notify(StoreChange::Joined {
            user_id: user_id.to_string(),
        });
    }

    /// Remove one user. Returns false if the user was not known.
    pub fn apply_leave(&mut self, user_id: &str) -> bool {
        let Some(user) = self.users.remove(user_id) else {
            return false;
        };
        if let Some(room) = &user.room_id {
            self.unindex(room, user_id);
        }
        self.notify(StoreChange::Left {
            user_id: user_id.to_string(),
        });
        true
    }

    pub fn clear(&mut self) {
        self.users.clear();
        self.rooms.clear();
        self.notify(StoreChange::Cleared);
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn user(&self, user_id: &str) -> Option<OnlineUser> {
        self.users.get(user_id).cloned()
    }

    /// Users whose current room is `room_id`, ordered by user id.
    /// Users without a room never appear here.
    pub fn users_in_room(&self, room_id: &str) -> Vec<OnlineUser> {
        self.rooms
            .get(room_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.users.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every online user, ordered by user id.
    pub fn online_users(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self.users.values().cloned().collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn global_count(&self) -> usize {
        self.users.len()
    }

    /// Occupancy per room.
    pub fn room_counts(&self) -> BTreeMap<String, usize> {
        self.rooms
            .iter()
            .map(|(room, ids)| (room.clone(), ids.len()))
            .collect()
    }

    /// Observe mutations. Receivers never see the map itself.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn insert(&mut self, user_id: String, record: PresenceRecord) {
        let mut user = OnlineUser::from(record);
        user.user_id = user_id.clone();

        let old_room = self.users.get(&user_id).and_then(|u| u.room_id.clone());
        if old_room != user.room_id {
            if let Some(old_room) = old_room {
                self.unindex(&old_room, &user_id);
            }
        }
        if let Some(room) = &user.room_id {
            self.rooms
                .entry(room.clone())
                .or_default()
                .insert(user_id.clone());
        }
        self.users.insert(user_id, user);
    }

    fn unindex(&mut self, room: &str, user_id: &str) {
        if let Some(ids) = self.rooms.get_mut(room) {
            ids.remove(user_id);
            if ids.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }
}

impl Default for PresenceStateStore {
    fn default() -> Self {
        Self::new()
    }
}
