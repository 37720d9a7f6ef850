//! # Dispatch Errors
//!
//! Every failure that can surface to a client is a [`DispatchError`]. Handlers,
//! interceptors and storage collaborators all return it, so an error raised deep
//! inside a storage call travels unchanged through the interceptor chain and the
//! `ON_ERROR` stage before the transport turns it into a status code.
//!
//! Startup failures (bad path templates, bad configuration) have their own types
//! because they never reach a client.

use http::StatusCode;
use serde_json::{json, Map, Value};

/// Errors produced while serving a request.
///
/// Each variant carries a human-readable message. The HTTP status is derived
/// from the variant, see [`DispatchError::status`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Malformed body or parameters, invalid path shape, restricted-field violation.
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Missing or invalid credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Valid credentials without the required permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Missing item or file.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Resource type does not accept the command.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
    /// Duplicate unique key at application level.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Storage or transport failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The human-readable message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::MethodNotAllowed(m)
            | Self::Conflict(m)
            | Self::Internal(m) => m,
        }
    }

    /// The `{"code": .., "message": ..}` envelope sent for unrecovered errors.
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("code".into(), json!(self.status().as_u16()));
        body.insert("message".into(), json!(self.message()));
        body
    }
}

/// Errors raised while building a [`Registry`](crate::registry::Registry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Invalid method '{0}'")]
    InvalidMethod(String),
}
