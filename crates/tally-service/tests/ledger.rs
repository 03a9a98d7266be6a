//! Balance, transaction, transfer, snapshot and score integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use tally_core::UserId;

// ============================================================================
// Balance and transactions
// ============================================================================

#[tokio::test]
async fn new_account_has_zero_balance() {
    let harness = TestHarness::new();
    harness.funded_user(0).await;

    assert_eq!(harness.balance_of(&harness.test_user_id).await, 0);
}

#[tokio::test]
async fn balance_without_account_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn charge_and_purchase_update_balance() {
    let harness = TestHarness::new();
    harness.funded_user(500).await;

    let response = harness
        .server
        .post("/v1/transactions/purchase")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": 200 }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["kind"], "purchase");
    assert_eq!(body["signed_amount"], -200);

    assert_eq!(harness.balance_of(&harness.test_user_id).await, 300);
}

#[tokio::test]
async fn purchase_over_balance_is_payment_required() {
    let harness = TestHarness::new();
    harness.funded_user(50).await;

    let response = harness
        .server
        .post("/v1/transactions/purchase")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": 80 }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_balance");
    assert_eq!(body["error"]["details"]["balance"], 50);
    assert_eq!(body["error"]["details"]["required"], 80);
}

#[tokio::test]
async fn zero_charge_is_bad_request() {
    let harness = TestHarness::new();
    harness.funded_user(0).await;

    let response = harness
        .server
        .post("/v1/transactions/charge")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": 0 }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_amount");
}

#[tokio::test]
async fn charge_past_i64_range_is_unprocessable() {
    let harness = TestHarness::new();
    harness.funded_user(i64::MAX).await;

    let response = harness
        .server
        .post("/v1/transactions/charge")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount": 1 }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "balance_overflow");
    assert_eq!(harness.balance_of(&harness.test_user_id).await, i64::MAX);
}

#[tokio::test]
async fn transactions_paginate_newest_first() {
    let harness = TestHarness::new();
    harness.funded_user(100).await;

    for amount in [10, 20] {
        harness
            .server
            .post("/v1/transactions/purchase")
            .add_header("authorization", harness.user_auth_header())
            .json(&json!({ "amount": amount }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = harness
        .server
        .get("/v1/transactions?limit=2&offset=0")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(body["has_more"], true);

    assert_eq!(transactions[0]["amount"], 20);
    assert_eq!(transactions[1]["amount"], 10);

    let response = harness
        .server
        .get("/v1/transactions?limit=2&offset=2")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(body["transactions"][0]["kind"], "charge");
    assert_eq!(body["has_more"], false);
}

// ============================================================================
// Transfers
// ============================================================================

#[tokio::test]
async fn transfer_moves_funds() {
    let harness = TestHarness::new();
    harness.funded_user(300).await;
    let receiver = UserId::generate();
    harness.register(&receiver, "receiver").await;

    let response = harness
        .server
        .post("/v1/transfers")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "receiver": receiver.to_string(), "amount": 120 }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = response.json();
    let transfer_id = body["id"].as_str().unwrap().to_string();

    assert_eq!(harness.balance_of(&harness.test_user_id).await, 180);
    assert_eq!(harness.balance_of(&receiver).await, 120);

    let response = harness
        .server
        .get(&format!("/v1/admin/transfers/{transfer_id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status_ok();
    let fetched: serde_json::Value = response.json();
    assert_eq!(fetched["sender_transaction"], body["sender_transaction"]);
    assert_eq!(fetched["receiver_transaction"], body["receiver_transaction"]);
}

#[tokio::test]
async fn insufficient_transfer_changes_nothing() {
    let harness = TestHarness::new();
    harness.funded_user(50).await;
    let receiver = UserId::generate();
    harness.register(&receiver, "receiver").await;

    let response = harness
        .server
        .post("/v1/transfers")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "receiver": receiver.to_string(), "amount": 100 }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    assert_eq!(harness.balance_of(&harness.test_user_id).await, 50);
    assert_eq!(harness.balance_of(&receiver).await, 0);
}

#[tokio::test]
async fn self_transfer_is_bad_request() {
    let harness = TestHarness::new();
    harness.funded_user(100).await;

    let response = harness
        .server
        .post("/v1/transfers")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "receiver": harness.test_user_id.to_string(), "amount": 10 }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "self_transfer");
}

#[tokio::test]
async fn transfer_to_unknown_user_is_not_found() {
    let harness = TestHarness::new();
    harness.funded_user(100).await;

    let response = harness
        .server
        .post("/v1/transfers")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "receiver": UserId::generate().to_string(), "amount": 10 }))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn malformed_receiver_is_bad_request() {
    let harness = TestHarness::new();
    harness.funded_user(100).await;

    let response = harness
        .server
        .post("/v1/transfers")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "receiver": "not-a-uuid", "amount": 10 }))
        .await;

    response.assert_status_bad_request();
}

// ============================================================================
// Snapshots and scores
// ============================================================================

#[tokio::test]
async fn snapshots_accumulate() {
    let harness = TestHarness::new();
    harness.funded_user(70).await;

    for _ in 0..2 {
        harness
            .server
            .post("/v1/snapshots")
            .add_header("authorization", harness.user_auth_header())
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = harness
        .server
        .get("/v1/snapshots")
        .add_header("authorization", harness.user_auth_header())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let snapshots = body["snapshots"].as_array().unwrap();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|s| s["balance"] == 70));
}

#[tokio::test]
async fn score_defaults_to_zero() {
    let harness = TestHarness::new();
    harness.funded_user(0).await;

    let response = harness
        .server
        .get("/v1/scores/me")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["score"], 0);
}
