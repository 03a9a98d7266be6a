//! Transaction log handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{ArchivedTransaction, Transaction, TransactionKind};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Largest page a client may request.
const MAX_PAGE_SIZE: usize = 100;

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Transaction kind.
    pub kind: TransactionKind,
    /// Amount in minor units (always positive).
    pub amount: i64,
    /// Effect on the balance (negative for debits).
    pub signed_amount: i64,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            kind: tx.kind,
            amount: tx.amount,
            signed_amount: tx.signed_amount(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List the caller's transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(MAX_PAGE_SIZE);
    let transactions = state
        .ledger
        .list_transactions(&auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = transactions.len() > limit;
    let transactions = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Amount request for charges and purchases.
#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    /// Amount in minor units.
    pub amount: i64,
}

/// Top up the caller's account.
pub async fn charge(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AmountRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let tx = state.ledger.charge(&auth.user_id, body.amount).await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&tx))))
}

/// Spend from the caller's balance.
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AmountRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let tx = state.ledger.purchase(&auth.user_id, body.amount).await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&tx))))
}

/// Archived transaction response.
#[derive(Debug, Serialize)]
pub struct ArchivedTransactionResponse {
    /// The archived transaction.
    #[serde(flatten)]
    pub transaction: TransactionResponse,
    /// When it was archived.
    pub archived_at: String,
}

impl From<&ArchivedTransaction> for ArchivedTransactionResponse {
    fn from(archived: &ArchivedTransaction) -> Self {
        Self {
            transaction: TransactionResponse::from(&archived.transaction),
            archived_at: archived.archived_at.to_rfc3339(),
        }
    }
}

/// List archive response.
#[derive(Debug, Serialize)]
pub struct ListArchivedResponse {
    /// Archived transactions (newest first).
    pub transactions: Vec<ArchivedTransactionResponse>,
}

/// List the caller's archived transactions.
pub async fn list_archived(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListArchivedResponse>, ApiError> {
    let archived = state.ledger.list_archived(&auth.user_id).await?;

    Ok(Json(ListArchivedResponse {
        transactions: archived
            .iter()
            .map(ArchivedTransactionResponse::from)
            .collect(),
    }))
}
