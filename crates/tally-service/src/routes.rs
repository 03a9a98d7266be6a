//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    accounts, admin, balance, health, scores, snapshots, transactions, transfers,
};
use crate::state::AppState;

/// Maximum concurrent requests for user API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent requests for admin endpoints.
/// Reports and snapshot runs scan the whole ledger.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 4;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## User (JWT bearer auth)
/// - `POST /v1/accounts` - Register account
/// - `GET /v1/accounts/me` - Get current user's account
/// - `GET /v1/balance` - Current balance
/// - `GET /v1/transactions` - Transaction history
/// - `POST /v1/transactions/charge` - Top up
/// - `POST /v1/transactions/purchase` - Spend
/// - `GET /v1/archive` - Archived transactions
/// - `POST /v1/transfers` - Send funds to another user
/// - `GET /v1/snapshots` - List balance snapshots
/// - `POST /v1/snapshots` - Snapshot current balance
/// - `GET /v1/scores/me` - Current score
///
/// ## Admin (Service API Key auth)
/// - `GET /v1/admin/report` - Per-user balance report
/// - `GET /v1/admin/total-balance` - Sum of all balances
/// - `POST /v1/admin/snapshots` - Snapshot every user
/// - `POST /v1/admin/scores/:user_id` - Change a user's score
/// - `POST /v1/admin/archive/:transaction_id` - Archive a transaction
/// - `GET /v1/admin/transfers/:transfer_id` - Look up a transfer
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/report", get(admin::balance_report))
        .route("/total-balance", get(admin::total_balance))
        .route("/snapshots", post(admin::record_all_snapshots))
        .route("/scores/:user_id", post(admin::change_score))
        .route("/archive/:transaction_id", post(admin::archive_transaction))
        .route("/transfers/:transfer_id", get(admin::get_transfer))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/me", get(accounts::get_account))
        // Balance and transactions
        .route("/balance", get(balance::get_balance))
        .route("/transactions", get(transactions::list_transactions))
        .route("/transactions/charge", post(transactions::charge))
        .route("/transactions/purchase", post(transactions::purchase))
        .route("/archive", get(transactions::list_archived))
        // Transfers
        .route("/transfers", post(transfers::create_transfer))
        // Snapshots
        .route(
            "/snapshots",
            get(snapshots::list_snapshots).post(snapshots::record_snapshot),
        )
        // Scores
        .route("/scores/me", get(scores::get_score))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/admin", admin_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
