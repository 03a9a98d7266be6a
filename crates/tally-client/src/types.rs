//! Request and response types for the tally client.

use serde::{Deserialize, Serialize};

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// User ID.
    pub user_id: String,
    /// Balance in minor units.
    pub balance: i64,
}

/// Transfer request.
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    /// Receiving user ID.
    pub receiver: String,
    /// Amount in minor units.
    pub amount: i64,
}

/// A completed transfer.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferResponse {
    /// Transfer ID.
    pub id: String,
    /// The sender's `transfer_sent` transaction ID.
    pub sender_transaction: String,
    /// The receiver's `transfer_received` transaction ID.
    pub receiver_transaction: String,
    /// Timestamp (RFC 3339).
    pub created_at: String,
}

/// One row of the balance report.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportEntry {
    /// User ID.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Number of live transactions.
    pub transaction_count: u64,
    /// Current balance.
    pub balance: i64,
}

/// Balance report response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceReportResponse {
    /// One entry per registered user.
    pub entries: Vec<ReportEntry>,
    /// Sum of all balances.
    pub total_balance: i64,
}

/// Total balance response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TotalBalanceResponse {
    pub total_balance: i64,
}

/// A balance snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    /// Snapshot ID.
    pub id: String,
    /// User ID.
    pub user_id: String,
    /// Balance at the time of the snapshot.
    pub balance: i64,
    /// Timestamp (RFC 3339).
    pub created_at: String,
}

/// A user whose snapshot failed during a run.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotFailure {
    /// User ID.
    pub user_id: String,
    /// Error message.
    pub error: String,
}

/// Result of a snapshot run.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRunResponse {
    /// Snapshots written.
    pub recorded: Vec<SnapshotResponse>,
    /// Users whose snapshot failed.
    pub failed: Vec<SnapshotFailure>,
}

/// Change score request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChangeScoreRequest {
    pub delta: i64,
}

/// Change score response.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreResponse {
    /// User ID.
    pub user_id: String,
    /// Score after the change.
    pub score: i64,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}
