//! Common test utilities for tally integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

use tally_core::UserId;
use tally_service::auth::JwtClaims;
use tally_service::{create_router, AppState, ServiceConfig};
use tally_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_API_KEY: &str = "test-service-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for admin requests.
    pub service_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: Some(JWT_SECRET.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::new(MemoryStore::new()), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            test_user_id: UserId::generate(),
            service_api_key: SERVICE_API_KEY.to_string(),
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Mint a valid bearer header for any user.
    pub fn auth_header_for(user_id: &UserId) -> String {
        format!("Bearer {}", mint_token(user_id, "tally", JWT_SECRET))
    }

    /// Register `user_id` through the API.
    pub async fn register(&self, user_id: &UserId, username: &str) {
        self.server
            .post("/v1/accounts")
            .add_header("authorization", Self::auth_header_for(user_id))
            .json(&json!({ "username": username }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    /// Register the test user and top it up with `amount`.
    pub async fn funded_user(&self, amount: i64) {
        self.register(&self.test_user_id, "tester").await;
        if amount > 0 {
            self.server
                .post("/v1/transactions/charge")
                .add_header("authorization", self.user_auth_header())
                .json(&json!({ "amount": amount }))
                .await
                .assert_status(axum::http::StatusCode::CREATED);
        }
    }

    /// Current balance of `user_id` as reported by the API.
    pub async fn balance_of(&self, user_id: &UserId) -> i64 {
        let response = self
            .server
            .get("/v1/balance")
            .add_header("authorization", Self::auth_header_for(user_id))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        body["balance"].as_i64().expect("balance is an integer")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign an HS256 token for `user_id`.
pub fn mint_token(user_id: &UserId, audience: &str, secret: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        sub: user_id.to_string(),
        aud: audience.to_string(),
        exp: now + 3600,
        iat: Some(now),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}
