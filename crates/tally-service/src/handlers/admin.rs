//! Back-office handlers, guarded by the service API key.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{BalanceReportEntry, SnapshotRun, TransactionId, TransferId, UserId};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::snapshots::SnapshotResponse;
use crate::handlers::transactions::ArchivedTransactionResponse;
use crate::handlers::transfers::TransferResponse;
use crate::state::AppState;

/// One row of the balance report.
#[derive(Debug, Serialize)]
pub struct ReportEntryResponse {
    /// User ID.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Number of live transactions.
    pub transaction_count: u64,
    /// Current balance.
    pub balance: i64,
}

impl From<&BalanceReportEntry> for ReportEntryResponse {
    fn from(entry: &BalanceReportEntry) -> Self {
        Self {
            user_id: entry.user_id.to_string(),
            username: entry.username.clone(),
            transaction_count: entry.transaction_count,
            balance: entry.balance,
        }
    }
}

/// Balance report response.
#[derive(Debug, Serialize)]
pub struct BalanceReportResponse {
    /// One entry per registered user, ordered by user ID.
    pub entries: Vec<ReportEntryResponse>,
    /// Sum of all balances.
    pub total_balance: i64,
}

/// Per-user balances across the whole ledger.
pub async fn balance_report(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
) -> Result<Json<BalanceReportResponse>, ApiError> {
    let report = state.ledger.balance_report().await?;

    tracing::debug!(
        service = %service.service_name,
        users = report.len(),
        "Balance report generated"
    );

    Ok(Json(BalanceReportResponse {
        total_balance: tally_core::total_balance(&report)?,
        entries: report.iter().map(ReportEntryResponse::from).collect(),
    }))
}

/// Total balance response.
#[derive(Debug, Serialize)]
pub struct TotalBalanceResponse {
    /// Sum of all balances.
    pub total_balance: i64,
}

/// Sum of every user's balance.
pub async fn total_balance(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
) -> Result<Json<TotalBalanceResponse>, ApiError> {
    Ok(Json(TotalBalanceResponse {
        total_balance: state.ledger.total_balance().await?,
    }))
}

/// Failed snapshot entry.
#[derive(Debug, Serialize)]
pub struct SnapshotFailureResponse {
    /// User ID.
    pub user_id: String,
    /// Error message.
    pub error: String,
}

/// Snapshot run response.
#[derive(Debug, Serialize)]
pub struct SnapshotRunResponse {
    /// Snapshots written.
    pub recorded: Vec<SnapshotResponse>,
    /// Users whose snapshot failed.
    pub failed: Vec<SnapshotFailureResponse>,
}

impl From<&SnapshotRun> for SnapshotRunResponse {
    fn from(run: &SnapshotRun) -> Self {
        Self {
            recorded: run.recorded.iter().map(SnapshotResponse::from).collect(),
            failed: run
                .failed
                .iter()
                .map(|f| SnapshotFailureResponse {
                    user_id: f.user_id.to_string(),
                    error: f.error.clone(),
                })
                .collect(),
        }
    }
}

/// Snapshot every registered user's balance.
pub async fn record_all_snapshots(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
) -> Result<Json<SnapshotRunResponse>, ApiError> {
    tracing::info!(service = %service.service_name, "Snapshot run requested");

    let run = state.ledger.record_all_snapshots().await?;
    Ok(Json(SnapshotRunResponse::from(&run)))
}

/// Change score request.
#[derive(Debug, Deserialize)]
pub struct ChangeScoreRequest {
    /// Amount to add (negative to subtract).
    pub delta: i64,
}

/// Change score response.
#[derive(Debug, Serialize)]
pub struct ChangeScoreResponse {
    /// User ID.
    pub user_id: String,
    /// Score after the change.
    pub score: i64,
}

/// Adjust a user's score.
pub async fn change_score(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Path(user_id): Path<String>,
    Json(body): Json<ChangeScoreRequest>,
) -> Result<Json<ChangeScoreResponse>, ApiError> {
    let user_id: UserId = user_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user ID: {user_id}")))?;

    let score = state.ledger.change_score(&user_id, body.delta).await?;

    tracing::info!(
        service = %service.service_name,
        user_id = %user_id,
        delta = body.delta,
        score,
        "Score changed"
    );

    Ok(Json(ChangeScoreResponse {
        user_id: user_id.to_string(),
        score,
    }))
}

/// Copy a transaction into the archive tier.
pub async fn archive_transaction(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
    Path(transaction_id): Path<String>,
) -> Result<Json<ArchivedTransactionResponse>, ApiError> {
    let transaction_id: TransactionId = transaction_id.parse().map_err(|_| {
        ApiError::BadRequest(format!("Invalid transaction ID: {transaction_id}"))
    })?;

    let archived = state.ledger.archive_transaction(&transaction_id).await?;
    Ok(Json(ArchivedTransactionResponse::from(&archived)))
}

/// Look up a transfer record.
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    _service: ServiceAuth,
    Path(transfer_id): Path<String>,
) -> Result<Json<TransferResponse>, ApiError> {
    let transfer_id: TransferId = transfer_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid transfer ID: {transfer_id}")))?;

    let record = state.ledger.get_transfer(&transfer_id).await?;
    Ok(Json(TransferResponse::from(&record)))
}
