//! Tally Client SDK.
//!
//! This crate provides a client library for back-office tools and services that talk
//! to the tally API.
//!
//! # Example
//!
//! ```no_run
//! use tally_client::TallyClient;
//!
//! # async fn example() -> Result<(), tally_client::ClientError> {
//! let client = TallyClient::new("http://tally.ledger.svc:8080", "your-service-api-key");
//!
//! // Snapshot every balance and report the total
//! let run = client.record_all_snapshots().await?;
//! println!("{} snapshots, {} failures", run.recorded.len(), run.failed.len());
//!
//! let total = client.total_balance().await?;
//! println!("Ledger total: {total}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, TallyClient};
pub use error::ClientError;
pub use types::*;
