use anyhow::{Context, Result};
use reqwest::{Client, Request, Response};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::SessionManager;
use crate::error::ApiError;

/// HTTP client for the provider's REST API with retry logic
pub struct ProviderHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Session manager, consulted when the provider rejects the bearer token
    session: Arc<SessionManager>,

    /// Maximum number of retries
    max_retries: u32,

    /// Base delay for exponential backoff (milliseconds)
    base_delay_ms: u64,
}

impl ProviderHttpClient {
    /// Create a new HTTP client
    pub fn new(
        session: Arc<SessionManager>,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            session,
            max_retries,
            base_delay_ms: 1000,
        })
    }

    /// Execute a request with retry logic
    /// Automatically handles:
    /// - 401: refreshes the session and retries
    /// - 429: exponential backoff
    /// - 5xx: exponential backoff
    pub async fn request_with_retry(&self, mut request: Request) -> Result<Response, ApiError> {
        let mut attempt = 0;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(
            method = %method,
            url = %url,
            "Sending provider request"
        );

        loop {
            // Clone the request for this attempt
            let req = request.try_clone().ok_or_else(|| {
                ApiError::Internal(anyhow::anyhow!("Request body is not cloneable"))
            })?;

            let result = self.client.execute(req).await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        tracing::debug!(status = %status, "Provider request successful");
                        return Ok(response);
                    }

                    tracing::warn!(
                        status = %status,
                        url = %url,
                        "Provider returned error response"
                    );

                    match status.as_u16() {
                        // 401: refresh the session and retry with the new token
                        401 => {
                            if attempt < self.max_retries {
                                tracing::warn!("Received 401, refreshing session and retrying...");

                                let token = self.session.refresh_session().await?;
                                request.headers_mut().insert(
                                    "Authorization",
                                    format!("Bearer {}", token).parse().map_err(|e| {
                                        ApiError::Internal(anyhow::anyhow!(
                                            "Invalid refreshed token: {}",
                                            e
                                        ))
                                    })?,
                                );

                                attempt += 1;
                                continue;
                            }
                        }

                        // 429 or 5xx: exponential backoff
                        429 | 500..=599 => {
                            if attempt < self.max_retries {
                                let delay = self.calculate_backoff_delay(attempt);
                                tracing::warn!(
                                    "Received {}, retrying after {}ms (attempt {}/{})",
                                    status,
                                    delay,
                                    attempt + 1,
                                    self.max_retries
                                );

                                tokio::time::sleep(Duration::from_millis(delay)).await;
                                attempt += 1;
                                continue;
                            }
                        }

                        _ => {}
                    }

                    // Non-retryable error or max retries exceeded
                    let error_text = response.text().await.unwrap_or_default();
                    tracing::error!(
                        status = status.as_u16(),
                        url = %url,
                        response_body = %error_text,
                        attempt = attempt + 1,
                        "Provider request failed with error response"
                    );
                    return Err(ApiError::Provider {
                        status: status.as_u16(),
                        message: error_text,
                    });
                }

                Err(e) => {
                    let error_kind = if e.is_timeout() {
                        "timeout"
                    } else if e.is_connect() {
                        "connection_failed"
                    } else if e.is_request() {
                        "request_error"
                    } else if e.is_decode() {
                        "decode_error"
                    } else {
                        "unknown"
                    };

                    // Network error - retry with backoff
                    if attempt < self.max_retries {
                        let delay = self.calculate_backoff_delay(attempt);
                        tracing::warn!(
                            "Request failed: {}, retrying after {}ms (attempt {}/{})",
                            e,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );

                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }

                    tracing::error!(
                        error_kind = error_kind,
                        error = %e,
                        url = %url,
                        total_attempts = attempt + 1,
                        "Provider request failed after all retries"
                    );

                    return Err(ApiError::Internal(anyhow::anyhow!(
                        "Provider request failed: {} (kind: {})",
                        e,
                        error_kind
                    )));
                }
            }
        }
    }

    /// Calculate exponential backoff delay
    fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        // Exponential backoff: base_delay * 2^attempt, with jitter
        let delay = self.base_delay_ms * 2_u64.pow(attempt);
        let jitter = (delay as f64 * 0.1 * rand::random()) as u64;
        delay + jitter
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

// Simple random number generation for jitter
mod rand {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hash, Hasher};

    pub fn random() -> f64 {
        let state = RandomState::new();
        let mut hasher = state.build_hasher();
        std::time::SystemTime::now().hash(&mut hasher);
        (hasher.finish() % 1000) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SupabaseAuthClient;

    fn test_session_manager() -> Arc<SessionManager> {
        let provider = Arc::new(SupabaseAuthClient::new("http://127.0.0.1:9", "anon", 5).unwrap());
        Arc::new(SessionManager::new(provider, None))
    }

    #[test]
    fn test_backoff_calculation() {
        let client = ProviderHttpClient::new(test_session_manager(), 20, 10, 30, 3).unwrap();

        let delay0 = client.calculate_backoff_delay(0);
        let delay1 = client.calculate_backoff_delay(1);
        let delay2 = client.calculate_backoff_delay(2);

        // Each delay should be roughly double the previous (with jitter)
        assert!(delay0 >= 1000 && delay0 <= 1200);
        assert!(delay1 >= 2000 && delay1 <= 2400);
        assert!(delay2 >= 4000 && delay2 <= 4800);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/clients")
            .with_status(400)
            .with_body(r#"{"message": "invalid filter"}"#)
            .create_async()
            .await;

        let client = ProviderHttpClient::new(test_session_manager(), 20, 10, 30, 3).unwrap();
        let request = client
            .client()
            .get(format!("{}/rest/v1/clients", server.url()))
            .build()
            .unwrap();

        let err = client.request_with_retry(request).await.unwrap_err();
        match err {
            ApiError::Provider { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("invalid filter"));
            }
            other => panic!("Expected provider error, got {:?}", other),
        }
    }
}
