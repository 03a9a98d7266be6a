//! Transfer handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{TransferRecord, UserId};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Transfer request.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Receiving user ID.
    pub receiver: String,
    /// Amount in minor units.
    pub amount: i64,
}

/// Transfer response.
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    /// Transfer ID.
    pub id: String,
    /// The sender's `transfer_sent` transaction.
    pub sender_transaction: String,
    /// The receiver's `transfer_received` transaction.
    pub receiver_transaction: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&TransferRecord> for TransferResponse {
    fn from(record: &TransferRecord) -> Self {
        Self {
            id: record.id.to_string(),
            sender_transaction: record.sender_transaction.to_string(),
            receiver_transaction: record.receiver_transaction.to_string(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Send funds from the caller to another user.
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    let receiver: UserId = body
        .receiver
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid receiver: {}", body.receiver)))?;

    let record = state
        .ledger
        .transfer(&auth.user_id, &receiver, body.amount)
        .await?;

    Ok((StatusCode::CREATED, Json(TransferResponse::from(&record))))
}
