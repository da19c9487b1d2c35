use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use strata_cas::CasError;
use strata_catalog::CatalogError;
use strata_ledger::LedgerError;
use thiserror::Error;

/// Stable error codes distinguished at the API boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Invalid,
    NotFound,
    Conflict,
    Integrity,
    Unavailable,
}

impl ErrorCode {
    const fn status(self) -> StatusCode {
        match self {
            Self::Invalid => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Invalid, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();
        let body = Json(ErrorBody {
            code: self.code,
            message: self.message,
        });
        (status, body).into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let code = match &err {
            CatalogError::NotFound(_) => ErrorCode::NotFound,
            CatalogError::MalformedPayload { .. } | CatalogError::KindScopeMismatch { .. } => {
                ErrorCode::Invalid
            }
            CatalogError::CorruptState(_) => ErrorCode::Integrity,
            CatalogError::Store(_) => ErrorCode::Unavailable,
            _ => ErrorCode::Unavailable,
        };
        Self::new(code, err.to_string())
    }
}

impl From<CasError> for ApiError {
    fn from(err: CasError) -> Self {
        let code = if err.is_integrity() {
            ErrorCode::Integrity
        } else {
            match &err {
                CasError::ObjectNotFound(_) => ErrorCode::NotFound,
                CasError::EmptyObject => ErrorCode::Invalid,
                _ => ErrorCode::Unavailable,
            }
        };
        Self::new(code, err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let code = match &err {
            LedgerError::BadSignature
            | LedgerError::UnknownOrigin(_)
            | LedgerError::MalformedPayload
            | LedgerError::StaleRotation { .. } => ErrorCode::Invalid,
            LedgerError::DuplicateTx(_) | LedgerError::SnapshotAlreadyRegistered(..) => {
                ErrorCode::Conflict
            }
            LedgerError::BlockNotFound(_) | LedgerError::TxNotCommitted(_) => ErrorCode::NotFound,
            LedgerError::CorruptSegment(_) => ErrorCode::Integrity,
            _ => ErrorCode::Unavailable,
        };
        Self::new(code, err.to_string())
    }
}
