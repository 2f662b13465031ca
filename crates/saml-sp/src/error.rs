use crate::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// How a failed phase is reported to the application layer. Local validation
/// failures and protocol-engine failures both collapse into `InvalidTicket`,
/// the single failure signal the surrounding auth stack expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    InvalidTicket,
    BadRequest,
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InvalidTicket => "invalid_ticket",
            FailureKind::BadRequest => "bad_request",
            FailureKind::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed inbound message detected before any engine work.
    #[error("invalid SAML message: {0}")]
    InvalidRequest(String),
    /// Protocol-level failure detected by this crate: missing message, empty
    /// principal, unresolvable fingerprint, logout subject mismatch.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Failure raised by the delegated cryptographic/XML validation.
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::InvalidRequest(_) => FailureKind::BadRequest,
            Error::Validation(_) | Error::Engine(_) => FailureKind::InvalidTicket,
            Error::Internal(_) => FailureKind::Internal,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Validation(_) | Error::Engine(_) => StatusCode::UNAUTHORIZED,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!(kind = self.kind().as_str(), error = %self, "SAML phase failed");
        (status, self.kind().as_str().to_string()).into_response()
    }
}
