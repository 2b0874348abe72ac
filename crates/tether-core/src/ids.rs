//! Branded ID newtypes for type safety.
//!
//! The channel juggles two distinct identifier spaces: the client-minted
//! [`LogicalSessionId`] naming one UI conversation instance, and the
//! backend-assigned [`RemoteSessionId`] naming a conversation on the server.
//! Newtypes keep them from being swapped at a call site.
//!
//! Logical ids are UUID v7 (time-ordered) generated via
//! [`uuid::Uuid::now_v7`]. Remote ids come off the wire verbatim; matching
//! against stored state is done on the lowercased form via
//! [`RemoteSessionId::normalized`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Client-minted identifier for one UI conversation instance.
    LogicalSessionId
}

branded_id! {
    /// Backend-assigned conversation key.
    RemoteSessionId
}

impl LogicalSessionId {
    /// Mint a new random logical session id (UUID v7, time-ordered).
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl RemoteSessionId {
    /// Lowercased form used for all store matching.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0.to_lowercase()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
