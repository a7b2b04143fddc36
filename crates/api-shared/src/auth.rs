//! Header-based identification of API callers.

use careflow_types::{TypesError, UserId};

/// Header naming the user an operation is performed as.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the shared API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing x-user-id header")]
    MissingUser,
    #[error("x-user-id header must be an integer, found to be '{0}'")]
    MalformedUser(String),
    #[error(transparent)]
    InvalidUser(#[from] TypesError),
    #[error("invalid API key")]
    InvalidApiKey,
}

/// Parses the acting user from the raw `x-user-id` header value.
///
/// # Errors
///
/// Returns an [`AuthError`] if the header is absent, not an integer, or not a positive id.
pub fn parse_user_id(header: Option<&str>) -> Result<UserId, AuthError> {
    let raw = header.map(str::trim).ok_or(AuthError::MissingUser)?;
    let value: i64 = raw
        .parse()
        .map_err(|_| AuthError::MalformedUser(raw.to_owned()))?;
    Ok(UserId::new(value)?)
}

/// Validates the provided API key against the expected one.
///
/// No expected key means the API is open.
pub fn validate_api_key(provided: Option<&str>, expected: Option<&str>) -> Result<(), AuthError> {
    match expected {
        None => Ok(()),
        Some(expected) if provided == Some(expected) => Ok(()),
        Some(_) => Err(AuthError::InvalidApiKey),
    }
}
