//! Identifier newtypes
//!
//! All persisted entities are keyed by `i64` ids handed out by the store.
//! `0` marks a value that has not been persisted yet.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Placeholder for values not yet persisted
            pub const TRANSIENT: Self = Self(0);

            /// Whether the store has assigned a durable id
            pub fn is_persisted(self) -> bool {
                self.0 != 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Campaign identifier
    CampaignId
);
entity_id!(
    /// Procedure identifier
    ProcedureId
);
entity_id!(
    /// Target event (course group) identifier
    EventId
);
entity_id!(
    /// Participant or initiator identifier
    ParticipantId
);
entity_id!(
    /// Priority list identifier
    PriorityListId
);
