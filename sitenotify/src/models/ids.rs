//! Type-safe ID wrappers.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Wire form of an identifier: servers send both strings and integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new ID from a string.
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Check if this ID is blank.
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| $name(raw.into()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_owned())
            }
        }

        impl From<&String> for $name {
            fn from(s: &String) -> Self {
                $name(s.clone())
            }
        }

        impl From<i64> for $name {
            fn from(n: i64) -> Self {
                $name(n.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(NotificationId, "A notification identifier.");
define_id!(UserId, "A user identifier.");

impl NotificationId {
    /// Generate a client-side id for a pushed notification the server sent without one.
    pub fn local() -> Self {
        NotificationId(format!("local-{}", uuid::Uuid::new_v4()))
    }

    /// Check if this id was generated on the client.
    pub fn is_local(&self) -> bool {
        self.0.starts_with("local-")
    }
}
