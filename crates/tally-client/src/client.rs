//! Tally HTTP client implementation.

use reqwest::{Client, RequestBuilder};
use std::time::Duration;

use tally_core::UserId;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, BalanceReportResponse, BalanceResponse, ChangeScoreRequest, ScoreResponse,
    SnapshotRunResponse, TotalBalanceResponse, TransferRequest, TransferResponse,
};

/// Tally API client.
///
/// Admin calls authenticate with the service API key. User calls take the user's
/// bearer token per request.
#[derive(Debug, Clone)]
pub struct TallyClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl TallyClient {
    /// Create a new tally client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the tally service (e.g., `"http://tally:8080"`)
    /// * `api_key` - Service API key for admin routes
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new tally client with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with default settings).
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
    }

    // =========================================================================
    // User calls
    // =========================================================================

    /// Get the current balance of the token's user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the user has no account, or another error if
    /// the request fails.
    pub async fn get_balance(&self, user_jwt: &str) -> Result<BalanceResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/v1/balance"))
            .bearer_auth(user_jwt)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Transfer `amount` from the token's user to `receiver`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InsufficientBalance` if the sender cannot cover `amount`,
    /// or another error if the request fails.
    pub async fn transfer(
        &self,
        user_jwt: &str,
        receiver: &UserId,
        amount: i64,
    ) -> Result<TransferResponse, ClientError> {
        let request = TransferRequest {
            receiver: receiver.to_string(),
            amount,
        };

        let response = self
            .client
            .post(self.url("/v1/transfers"))
            .bearer_auth(user_jwt)
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =========================================================================
    // Admin calls
    // =========================================================================

    /// Fetch the per-user balance report.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn balance_report(&self) -> Result<BalanceReportResponse, ClientError> {
        let response = self
            .admin(self.client.get(self.url("/v1/admin/report")))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Sum of every user's balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn total_balance(&self) -> Result<i64, ClientError> {
        let response = self
            .admin(self.client.get(self.url("/v1/admin/total-balance")))
            .send()
            .await?;

        let body: TotalBalanceResponse = self.handle_response(response).await?;
        Ok(body.total_balance)
    }

    /// Snapshot every registered user's balance.
    ///
    /// Per-user failures are reported in the response, not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn record_all_snapshots(&self) -> Result<SnapshotRunResponse, ClientError> {
        let response = self
            .admin(self.client.post(self.url("/v1/admin/snapshots")))
            .send()
            .await?;

        let run: SnapshotRunResponse = self.handle_response(response).await?;
        if !run.failed.is_empty() {
            tracing::warn!(
                failed = run.failed.len(),
                "Snapshot run reported per-user failures"
            );
        }
        Ok(run)
    }

    /// Add `delta` to a user's score and return the new score.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` with code `score_out_of_range` if the result would
    /// leave the allowed range, or another error if the request fails.
    pub async fn change_score(&self, user_id: &UserId, delta: i64) -> Result<i64, ClientError> {
        let response = self
            .admin(
                self.client
                    .post(self.url(&format!("/v1/admin/scores/{user_id}"))),
            )
            .json(&ChangeScoreRequest { delta })
            .send()
            .await?;

        let body: ScoreResponse = self.handle_response(response).await?;
        Ok(body.score)
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;

                // Map specific error codes to typed errors
                match code {
                    "insufficient_balance" => {
                        let detail = |key: &str| {
                            api_error
                                .error
                                .details
                                .as_ref()
                                .and_then(|d| d.get(key))
                                .and_then(serde_json::Value::as_i64)
                                .unwrap_or(0)
                        };

                        Err(ClientError::InsufficientBalance {
                            balance: detail("balance"),
                            required: detail("required"),
                        })
                    }
                    "not_found" => Err(ClientError::NotFound { message }),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in admin requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
