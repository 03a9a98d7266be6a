//! Balance snapshot handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use tally_core::BalanceSnapshot;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Snapshot response.
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    /// Snapshot ID.
    pub id: String,
    /// User ID.
    pub user_id: String,
    /// Balance at the time of the snapshot.
    pub balance: i64,
    /// Timestamp.
    pub created_at: String,
}

impl From<&BalanceSnapshot> for SnapshotResponse {
    fn from(snapshot: &BalanceSnapshot) -> Self {
        Self {
            id: snapshot.id.to_string(),
            user_id: snapshot.user_id.to_string(),
            balance: snapshot.balance,
            created_at: snapshot.created_at.to_rfc3339(),
        }
    }
}

/// List snapshots response.
#[derive(Debug, Serialize)]
pub struct ListSnapshotsResponse {
    /// Snapshots (newest first).
    pub snapshots: Vec<SnapshotResponse>,
}

/// List the caller's snapshots.
pub async fn list_snapshots(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListSnapshotsResponse>, ApiError> {
    let snapshots = state.ledger.list_snapshots(&auth.user_id).await?;

    Ok(Json(ListSnapshotsResponse {
        snapshots: snapshots.iter().map(SnapshotResponse::from).collect(),
    }))
}

/// Snapshot the caller's current balance.
pub async fn record_snapshot(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<(StatusCode, Json<SnapshotResponse>), ApiError> {
    let snapshot = state.ledger.record_snapshot(&auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(SnapshotResponse::from(&snapshot))))
}
