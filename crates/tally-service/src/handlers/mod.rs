//! API handlers.

pub mod accounts;
pub mod admin;
pub mod balance;
pub mod health;
pub mod scores;
pub mod snapshots;
pub mod transactions;
pub mod transfers;
