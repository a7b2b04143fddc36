use crate::activity::{Action, ActivityState};

/// Errors raised by the activity engine and its collaborators.
///
/// Every variant renders with a short category label followed by a message that names the
/// offending action, type, state or field.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Unknown Type Error: data_model '{0}' does not exist in the type registry")]
    UnknownType(String),

    #[error(
        "Transition Error: event '{action}' on activity type '{data_model}' can not be executed from state '{state}'"
    )]
    Transition {
        action: Action,
        data_model: String,
        state: ActivityState,
    },

    #[error("Conflict Error: {0}")]
    Conflict(String),

    #[error("Not Found Error: {0}")]
    NotFound(String),

    #[error("Format Error: expected date formatted string, found '{0}'")]
    DateFormat(String),

    #[error("Store Error: {0}")]
    Store(String),

    #[error("invalid identifier: {0}")]
    InvalidId(#[from] careflow_types::TypesError),

    #[error("failed to read config file: {0}")]
    ConfigRead(std::io::Error),

    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
}

impl CoreError {
    /// Short category label, suitable for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) | CoreError::InvalidId(_) => "validation",
            CoreError::UnknownType(_) => "unknown_type",
            CoreError::Transition { .. } => "transition",
            CoreError::Conflict(_) => "conflict",
            CoreError::NotFound(_) => "not_found",
            CoreError::DateFormat(_) => "format",
            CoreError::Store(_) => "store",
            CoreError::ConfigRead(_) | CoreError::YamlDeserialization(_) => "config",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
