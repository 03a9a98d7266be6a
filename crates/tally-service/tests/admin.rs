//! Admin endpoint integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use tally_core::UserId;

#[tokio::test]
async fn admin_routes_require_api_key() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/admin/report")
        .await
        .assert_status_unauthorized();

    harness
        .server
        .get("/v1/admin/report")
        .add_header("x-api-key", "wrong-key")
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn user_token_does_not_grant_admin() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/admin/total-balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn report_lists_every_account() {
    let harness = TestHarness::new();
    harness.funded_user(200).await;
    let idle = UserId::generate();
    harness.register(&idle, "idle").await;

    let response = harness
        .server
        .get("/v1/admin/report")
        .add_header("x-api-key", &harness.service_api_key)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(body["total_balance"], 200);

    let idle_entry = entries
        .iter()
        .find(|e| e["user_id"] == idle.to_string())
        .unwrap();
    assert_eq!(idle_entry["transaction_count"], 0);
    assert_eq!(idle_entry["balance"], 0);

    let response = harness
        .server
        .get("/v1/admin/total-balance")
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["total_balance"], 200);
}

#[tokio::test]
async fn snapshot_run_covers_all_users() {
    let harness = TestHarness::new();
    harness.funded_user(40).await;
    harness.register(&UserId::generate(), "other").await;

    let response = harness
        .server
        .post("/v1/admin/snapshots")
        .add_header("x-api-key", &harness.service_api_key)
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["recorded"].as_array().unwrap().len(), 2);
    assert!(body["failed"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn change_score_applies_delta_and_bounds() {
    let harness = TestHarness::new();
    harness.funded_user(0).await;
    let path = format!("/v1/admin/scores/{}", harness.test_user_id);

    let response = harness
        .server
        .post(&path)
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({ "delta": 15 }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["score"], 15);

    let response = harness
        .server
        .post(&path)
        .add_header("x-api-key", &harness.service_api_key)
        .json(&json!({ "delta": -16 }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "score_out_of_range");

    let response = harness
        .server
        .get("/v1/scores/me")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["score"], 15);
}

#[tokio::test]
async fn archive_copies_transaction() {
    let harness = TestHarness::new();
    harness.funded_user(90).await;

    let response = harness
        .server
        .get("/v1/transactions")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    let tx_id = body["transactions"][0]["id"].as_str().unwrap().to_string();

    let response = harness
        .server
        .post(&format!("/v1/admin/archive/{tx_id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .await;
    response.assert_status_ok();

    harness
        .server
        .post(&format!("/v1/admin/archive/{tx_id}"))
        .add_header("x-api-key", &harness.service_api_key)
        .await
        .assert_status(StatusCode::CONFLICT);

    let response = harness
        .server
        .get("/v1/archive")
        .add_header("authorization", harness.user_auth_header())
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["transactions"][0]["id"], tx_id);
    assert_eq!(harness.balance_of(&harness.test_user_id).await, 90);
}

#[tokio::test]
async fn unknown_transfer_is_not_found() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/admin/transfers/01HZZZZZZZZZZZZZZZZZZZZZZZ")
        .add_header("x-api-key", &harness.service_api_key)
        .await
        .assert_status_not_found();

    harness
        .server
        .get("/v1/admin/transfers/not-a-ulid")
        .add_header("x-api-key", &harness.service_api_key)
        .await
        .assert_status_bad_request();
}
