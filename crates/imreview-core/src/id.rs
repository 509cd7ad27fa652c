//! Typed identifiers for workflow entities

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ReviewError};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an ID from a UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse an ID from a string
            pub fn parse(s: &str) -> Result<Self> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    ReviewError::Validation(format!("invalid {} id '{}': {}", $label, s, e))
                })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a manuscript
    ManuscriptId,
    "manuscript"
);
define_id!(
    /// Unique identifier for a review (or pending assignment)
    ReviewId,
    "review"
);
define_id!(
    /// Unique identifier for a user
    UserId,
    "user"
);
define_id!(
    /// Journal reference; journal metadata lives outside this crate
    JournalId,
    "journal"
);
