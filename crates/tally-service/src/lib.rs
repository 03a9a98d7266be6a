//! Tally HTTP API Service.
//!
//! This crate provides the HTTP API for the tally ledger, including:
//!
//! - Account registration
//! - Balances, transaction history and the archive tier
//! - Transfers between users
//! - Balance snapshots (on demand and periodic)
//! - Score counters and admin reports
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **HS256 JWT bearer tokens** - For end-user requests
//! 2. **Service API keys** - For back-office and service-to-service requests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Health handler needs async for routing

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod routes;
pub mod state;

pub use config::{ServiceConfig, StoreBackend};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
