//! Score handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Score response.
#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    /// User ID.
    pub user_id: String,
    /// Current score.
    pub score: i64,
}

/// Get the caller's score.
pub async fn get_score(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ScoreResponse>, ApiError> {
    let score = state.ledger.get_score(&auth.user_id).await?;

    Ok(Json(ScoreResponse {
        user_id: auth.user_id.to_string(),
        score,
    }))
}
