//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tally_core::LedgerError;
use tally_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Sender and receiver are the same user.
    #[error("cannot transfer to yourself")]
    SelfTransfer,

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient balance.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Score would leave its allowed range.
    #[error("score out of range: {score}")]
    ScoreOutOfRange {
        /// The rejected score.
        score: i64,
    },

    /// A balance sum would leave the `i64` range.
    #[error("balance arithmetic overflow")]
    BalanceOverflow,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InvalidAmount(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_amount",
                msg.clone(),
                None,
            ),
            Self::SelfTransfer => (
                StatusCode::BAD_REQUEST,
                "self_transfer",
                self.to_string(),
                None,
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientBalance { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_balance",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::ScoreOutOfRange { score } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "score_out_of_range",
                self.to_string(),
                Some(serde_json::json!({
                    "score": score,
                    "max": tally_core::MAX_SCORE
                })),
            ),
            Self::BalanceOverflow => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "balance_overflow",
                self.to_string(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            LedgerError::InvalidAmount(msg) => Self::InvalidAmount(msg),
            LedgerError::SelfTransfer => Self::SelfTransfer,
            LedgerError::ScoreOutOfRange { score } => Self::ScoreOutOfRange { score },
            LedgerError::BalanceOverflow => Self::BalanceOverflow,
            LedgerError::InvalidId(e) => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            StoreError::AlreadyExists { entity, id } => {
                Self::Conflict(format!("{entity} already exists: {id}"))
            }
            StoreError::Ledger(e) => e.into(),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (
                ApiError::from(StoreError::Ledger(LedgerError::SelfTransfer)),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(LedgerError::InsufficientBalance {
                    balance: 1,
                    required: 2,
                }),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                ApiError::from(LedgerError::ScoreOutOfRange { score: -1 }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(StoreError::Ledger(LedgerError::BalanceOverflow)),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::from(StoreError::AlreadyExists {
                    entity: "account",
                    id: "x".into(),
                }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(StoreError::Database("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
