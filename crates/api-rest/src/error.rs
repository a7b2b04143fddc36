use api_shared::{auth::AuthError, ErrorRes};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use careflow_core::{CoreError, TypesError};

/// An error returned by a REST handler, rendered as an [`ErrorRes`] body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::UnknownType(_) | CoreError::DateFormat(_) | CoreError::InvalidId(_) => {
                StatusCode::BAD_REQUEST
            }
            CoreError::Transition { .. } | CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Store(_) | CoreError::ConfigRead(_) | CoreError::YamlDeserialization(_) => {
                tracing::error!("Engine error: {:?}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = match err {
            AuthError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            kind: "auth",
            message: err.to_string(),
        }
    }
}

impl From<TypesError> for ApiError {
    fn from(err: TypesError) -> Self {
        CoreError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorRes {
            kind: self.kind.into(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
