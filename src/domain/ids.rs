//! Branded identifier types
//!
//! Every record kind gets its own newtype so a patient id can never be passed
//! where a session id is expected. Ids are only built through `parse`, which
//! validates the UUID shape the backend hands out, or through `temporary`,
//! which the cache uses for placeholder records.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TEMP_PREFIX: &str = "temp-";

/// Errors raised when an identifier fails validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("{kind} id is empty")]
    Empty { kind: &'static str },

    #[error("{kind} id is not a valid UUID: {value}")]
    Malformed { kind: &'static str, value: String },
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a raw identifier
            pub fn parse(raw: impl AsRef<str>) -> Result<Self, IdError> {
                let raw = raw.as_ref().trim();
                if raw.is_empty() {
                    return Err(IdError::Empty { kind: $kind });
                }
                let uuid = Uuid::parse_str(raw).map_err(|_| IdError::Malformed {
                    kind: $kind,
                    value: raw.to_string(),
                })?;
                Ok(Self(uuid.hyphenated().to_string()))
            }

            /// Mint a placeholder id for a record the server has not created yet
            pub fn temporary() -> Self {
                Self(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()))
            }

            pub fn is_temporary(&self) -> bool {
                self.0.starts_with(TEMP_PREFIX)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First eight characters, for compact listings
            pub fn short(&self) -> &str {
                let start = if self.is_temporary() { TEMP_PREFIX.len() } else { 0 };
                let end = (start + 8).min(self.0.len());
                &self.0[start..end]
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

branded_id!(
    /// Identifier of a user account (therapist, patient or admin)
    UserId,
    "user"
);

branded_id!(
    /// Identifier of a patient record
    PatientId,
    "patient"
);

branded_id!(
    /// Identifier of a therapy session
    SessionId,
    "session"
);
