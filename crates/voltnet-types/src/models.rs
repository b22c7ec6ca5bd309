use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public identity used when rendering counterparts and notification actors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// A two-party conversation. The participant pair is unordered; storage
/// canonicalizes it so at most one conversation exists per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    /// The other participant, from `user_id`'s point of view.
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_a == user_id {
            Some(self.participant_b)
        } else if self.participant_b == user_id {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

/// Messages transition unread -> read exactly once; `read_at` is set on that
/// transition and never changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Event categories produced by the post/like/comment surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "NEW_POST")]
    NewPost,
    #[serde(rename = "POST_LIKED")]
    PostLiked,
    #[serde(rename = "POST_COMMENTED")]
    PostCommented,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewPost => "NEW_POST",
            NotificationKind::PostLiked => "POST_LIKED",
            NotificationKind::PostCommented => "POST_COMMENTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW_POST" => Some(NotificationKind::NewPost),
            "POST_LIKED" => Some(NotificationKind::PostLiked),
            "POST_COMMENTED" => Some(NotificationKind::PostCommented),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub recipient_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub target_type: Option<String>,
    pub target_id: Option<Uuid>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_kind_tags_round_trip() {
        for kind in [
            NotificationKind::NewPost,
            NotificationKind::PostLiked,
            NotificationKind::PostCommented,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::parse("POST_SHARED"), None);
    }

    #[test]
    fn counterpart_resolution() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = Conversation {
            id: Uuid::new_v4(),
            participant_a: a,
            participant_b: b,
            created_at: chrono::Utc::now(),
        };

        assert_eq!(conv.counterpart_of(a), Some(b));
        assert_eq!(conv.counterpart_of(b), Some(a));
        assert_eq!(conv.counterpart_of(Uuid::new_v4()), None);
        assert!(conv.has_participant(a) && !conv.has_participant(Uuid::new_v4()));
    }
}
