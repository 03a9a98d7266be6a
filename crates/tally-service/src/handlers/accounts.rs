//! Account registration handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::Account;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Longest accepted username.
const MAX_USERNAME_LEN: usize = 150;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Display name.
    pub username: String,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            username: account.username.clone(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Display name.
    pub username: String,
}

/// Register the caller.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("Username must not be empty".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "Username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }

    let account = state.ledger.open_account(auth.user_id, username).await?;

    Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
}

/// Get the caller's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.ledger.get_account(&auth.user_id).await?;
    Ok(Json(AccountResponse::from(&account)))
}
