pub mod giveaway_event;

use giveaway_sdk::objects::EventStatus as SdkEventStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub use giveaway_event::{
    EventMutator, EventUpdate, GiveawayEvent, NewGiveawayEvent, mutate, status_only,
};

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Postgres has no unsigned 64-bit integer; snowflakes are stored
            /// bit-for-bit in a `BIGINT`.
            pub(crate) fn to_db(self) -> i64 {
                self.0 as i64
            }

            pub(crate) fn from_db(value: i64) -> Self {
                Self(value as u64)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake_id!(
    /// A community (Discord guild) that owns giveaways.
    TenantId
);
snowflake_id!(ChannelId);
snowflake_id!(MessageId);
snowflake_id!(
    /// A member account, either an entrant or the host.
    UserId
);
snowflake_id!(RoleId);

/// Giveaway identifier, time ordered (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EventId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Location of the message users react to in order to enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnouncementRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

impl fmt::Display for AnnouncementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel_id, self.message_id)
    }
}

/// Who may win a giveaway. Checked when entrants are resolved, not when they react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "role_id", rename_all = "snake_case")]
pub enum Eligibility {
    #[default]
    Anyone,
    RequiredRole(RoleId),
}

impl Eligibility {
    pub fn required_role(&self) -> Option<RoleId> {
        match self {
            Eligibility::Anyone => None,
            Eligibility::RequiredRole(role) => Some(*role),
        }
    }

    pub fn from_required_role(role: Option<RoleId>) -> Self {
        role.map_or(Eligibility::Anyone, Eligibility::RequiredRole)
    }
}

/// Event status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `giveaway_sdk::objects::EventStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase", type_name = "giveaway_status")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Completing,
    Ended,
    Cancelled,
    Errored,
}

impl EventStatus {
    /// `Ended`, `Cancelled` and `Errored` are never left again
    /// (a reroll stays within `Ended`).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventStatus::Ended | EventStatus::Cancelled | EventStatus::Errored
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&SdkEventStatus::from(*self), f)
    }
}

impl From<EventStatus> for SdkEventStatus {
    fn from(value: EventStatus) -> Self {
        match value {
            EventStatus::Active => SdkEventStatus::Active,
            EventStatus::Completing => SdkEventStatus::Completing,
            EventStatus::Ended => SdkEventStatus::Ended,
            EventStatus::Cancelled => SdkEventStatus::Cancelled,
            EventStatus::Errored => SdkEventStatus::Errored,
        }
    }
}

impl From<SdkEventStatus> for EventStatus {
    fn from(value: SdkEventStatus) -> Self {
        match value {
            SdkEventStatus::Active => EventStatus::Active,
            SdkEventStatus::Completing => EventStatus::Completing,
            SdkEventStatus::Ended => EventStatus::Ended,
            SdkEventStatus::Cancelled => EventStatus::Cancelled,
            SdkEventStatus::Errored => EventStatus::Errored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_db_conversion_is_lossless() {
        let id = UserId(u64::MAX - 5);
        assert!(id.to_db() < 0);
        assert_eq!(UserId::from_db(id.to_db()), id);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!EventStatus::Active.is_terminal());
        assert!(!EventStatus::Completing.is_terminal());
        assert!(EventStatus::Ended.is_terminal());
        assert!(EventStatus::Cancelled.is_terminal());
        assert!(EventStatus::Errored.is_terminal());
    }

    #[test]
    fn test_eligibility_roundtrip_through_role() {
        assert_eq!(Eligibility::from_required_role(None), Eligibility::Anyone);
        let gated = Eligibility::from_required_role(Some(RoleId(9)));
        assert_eq!(gated.required_role(), Some(RoleId(9)));
    }
}
