use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use thirdlogin_api::ApiError;

use crate::handshake::HandshakeError;
use crate::login::CallbackError;

/// Unified API error type.
///
/// Produces `{"error": "<message>"}` JSON responses.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
}

impl ApiErr {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    /// Build a closure that logs an internal error and returns `500 Internal Server Error`.
    pub fn from_db<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("{context}: {e}");
            Self::internal("internal server error")
        }
    }
}

impl From<HandshakeError> for ApiErr {
    fn from(e: HandshakeError) -> Self {
        Self::from_db("handshake store")(e)
    }
}

impl From<CallbackError> for ApiErr {
    fn from(e: CallbackError) -> Self {
        match e {
            CallbackError::EmptyCode(_) | CallbackError::MissingAuthcode => {
                Self::bad_request(e.to_string())
            }
            CallbackError::UnknownProvider(_) => Self::not_found(e.to_string()),
            CallbackError::Store(inner) => inner.into(),
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiError {
                error: self.message,
            }),
        )
            .into_response()
    }
}
