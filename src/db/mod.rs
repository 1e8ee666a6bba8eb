// Database client
//
// Thin PostgREST layer: every dashboard table goes through the same four
// verbs, authenticated with the project apikey plus the live session's
// bearer token so the provider's row-level security applies.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::SessionManager;
use crate::error::ApiError;
use crate::http_client::ProviderHttpClient;

pub struct Database {
    http: Arc<ProviderHttpClient>,
    session: Arc<SessionManager>,
    base_url: String,
    anon_key: String,
}

impl Database {
    pub fn new(
        http: Arc<ProviderHttpClient>,
        session: Arc<SessionManager>,
        base_url: &str,
        anon_key: &str,
    ) -> Self {
        Self {
            http,
            session,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.session
            .access_token()
            .ok_or_else(|| ApiError::Auth("Not signed in".to_string()))
    }

    /// Fetch all rows of a table, newest first
    pub async fn list<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, ApiError> {
        self.select(table, &[("select", "*"), ("order", "created_at.desc")])
            .await
    }

    /// Fetch rows matching explicit PostgREST query parameters
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ApiError> {
        let token = self.bearer()?;

        let request = self
            .http
            .client()
            .get(self.rest_url(table))
            .query(query)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(request).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to parse {} rows: {}", table, e)))
    }

    /// Insert one row and return the stored representation
    pub async fn insert<T: DeserializeOwned, P: Serialize>(
        &self,
        table: &str,
        payload: &P,
    ) -> Result<T, ApiError> {
        let token = self.bearer()?;

        let request = self
            .http
            .client()
            .post(self.rest_url(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(payload)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(request).await?;
        let mut rows: Vec<T> = response.json().await.map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("Failed to parse inserted {} row: {}", table, e))
        })?;

        rows.pop().ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("Provider returned no representation for insert"))
        })
    }

    /// Update a row by id and return the stored representation
    pub async fn update<T: DeserializeOwned, P: Serialize>(
        &self,
        table: &str,
        id: Uuid,
        patch: &P,
    ) -> Result<T, ApiError> {
        let token = self.bearer()?;

        let request = self
            .http
            .client()
            .patch(self.rest_url(table))
            .query(&[("id", format!("eq.{}", id).as_str())])
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=representation")
            .json(patch)
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(request).await?;
        let mut rows: Vec<T> = response.json().await.map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("Failed to parse updated {} row: {}", table, e))
        })?;

        rows.pop()
            .ok_or_else(|| ApiError::NotFound(format!("{} {}", table, id)))
    }

    /// Delete a row by id
    pub async fn delete(&self, table: &str, id: Uuid) -> Result<(), ApiError> {
        let token = self.bearer()?;

        let request = self
            .http
            .client()
            .delete(self.rest_url(table))
            .query(&[("id", format!("eq.{}", id).as_str())])
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))?;

        let response = self.http.request_with_retry(request).await?;
        let rows: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("Failed to parse delete response: {}", e))
        })?;

        if rows.is_empty() {
            return Err(ApiError::NotFound(format!("{} {}", table, id)));
        }
        Ok(())
    }
}
