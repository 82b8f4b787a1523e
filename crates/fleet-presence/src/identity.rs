use serde::{Deserialize, Serialize};

use crate::protocol::PresenceRecord;

/// The local user, as supplied by the host's session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            display_name: display_name.into(),
            avatar_ref: None,
        }
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    /// A fresh presence announcement for this user in `room_id`.
    pub fn to_record(&self, room_id: Option<String>) -> PresenceRecord {
        PresenceRecord::new(
            self.user_id.clone(),
            self.username.clone(),
            self.display_name.clone(),
            self.avatar_ref.clone(),
            room_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_carries_identity_fields() {
        let identity = Identity::new("u1", "jdoe", "Jane Doe").with_avatar("avatars/u1.png");
        let record = identity.to_record(Some("r1".into()));
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.username, "jdoe");
        assert_eq!(record.display_name, "Jane Doe");
        assert_eq!(record.avatar_ref.as_deref(), Some("avatars/u1.png"));
        assert_eq!(record.room_id.as_deref(), Some("r1"));
        assert!(record.timestamp > 0);
    }
}
