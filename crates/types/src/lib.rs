//! Validated primitive types shared across careflow crates.
//!
//! Identifiers handed to the engine from outside (REST payloads, CLI arguments) arrive as raw
//! integers. Wrapping them here means the engine only ever sees positive identifiers.

use std::num::NonZeroU64;

/// Errors that can occur when validating raw identifiers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesError {
    /// An identifier was zero or negative
    #[error("{kind} must be > 0, found to be {value}")]
    InvalidId { kind: &'static str, value: i64 },
}

macro_rules! positive_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU64);

        impl $name {
            /// Validates a raw identifier. Zero and negative values are rejected.
            pub fn new(raw: i64) -> Result<Self, TypesError> {
                u64::try_from(raw)
                    .ok()
                    .and_then(NonZeroU64::new)
                    .map(Self)
                    .ok_or(TypesError::InvalidId {
                        kind: $kind,
                        value: raw,
                    })
            }

            pub const fn from_non_zero(value: NonZeroU64) -> Self {
                Self(value)
            }

            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<i64> for $name {
            type Error = TypesError;

            fn try_from(raw: i64) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_u64(self.0.get())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = i64::deserialize(deserializer)?;
                $name::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

positive_id!(
    /// Identifier of an activity envelope.
    ActivityId,
    "activity_id"
);
positive_id!(
    /// Identifier of a typed record held by the record store.
    RecordId,
    "record_id"
);
positive_id!(
    /// Identifier of a system user.
    UserId,
    "user_id"
);
positive_id!(
    /// Identifier of a hospital location (ward, bay, bed).
    LocationId,
    "location_id"
);
