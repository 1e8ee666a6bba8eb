// Advert idea generation
//
// Single request/response call to an OpenRouter-compatible chat-completions
// endpoint. The model is instructed to answer with strict JSON; a brace
// extraction fallback handles models that wrap the JSON in prose anyway.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::models::records::AdvertFormat;

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

static JSON_BLOB: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertIdeaRequest {
    pub campaign_name: String,
    pub client_name: Option<String>,
    pub campaign_description: Option<String>,
    pub format: AdvertFormat,
    pub language: Option<IdeaLanguage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaLanguage {
    Tr,
    En,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvertIdea {
    pub title: String,
    pub description: String,
}

/// Client for the generative-text helper
pub struct IdeaGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl IdeaGenerator {
    pub fn new(api_key: Option<String>, model: &str, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            endpoint: OPENROUTER_URL.to_string(),
        })
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Generate an advert idea for a campaign.
    ///
    /// Missing credential, a failed call and a malformed answer all surface
    /// as the same error kind; the caller only sees one way to fail.
    pub async fn generate_idea(&self, req: &AdvertIdeaRequest) -> Result<AdvertIdea, ApiError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ApiError::Ai("OpenRouter API key is not configured".to_string()))?;

        let prompt = build_prompt(req);

        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "Return only valid JSON. Do not add any text outside the JSON."
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": 0.7
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .header("X-Title", "Agency Manager")
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Ai(format!("Idea request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ApiError::Ai(format!(
                "Idea endpoint returned {}: {}",
                status, text
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Ai(format!("Idea response was not JSON: {}", e)))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();

        parse_idea(content).ok_or_else(|| {
            tracing::error!(raw = %content, "Model output was not valid JSON");
            ApiError::Ai("Model did not return valid JSON".to_string())
        })
    }
}

fn build_prompt(req: &AdvertIdeaRequest) -> String {
    let language_hint = match req.language {
        Some(IdeaLanguage::Tr) => "Write the idea in Turkish.",
        Some(IdeaLanguage::Both) => "Write the idea in Turkish and English.",
        Some(IdeaLanguage::En) | None => "Write the idea in English.",
    };

    format!(
        r#"You are a senior creative director at an advertising agency.
Produce one advert idea from the brief below:

CLIENT: {client}
CAMPAIGN: {campaign}
DESCRIPTION: {description}
FORMAT: {format}

{language_hint}

Answer with REAL valid JSON in exactly this shape:

{{
  "title": "Title",
  "description": "Description"
}}

Do not add any other explanation. JSON only."#,
        client = req.client_name.as_deref().unwrap_or("Unknown"),
        campaign = req.campaign_name,
        description = req.campaign_description.as_deref().unwrap_or("None"),
        format = req.format.as_str(),
        language_hint = language_hint,
    )
}

/// Parse the model's answer: the raw content first, then whatever sits
/// between the outermost braces
fn parse_idea(content: &str) -> Option<AdvertIdea> {
    if let Ok(idea) = serde_json::from_str::<AdvertIdea>(content) {
        return Some(idea);
    }

    let blob = JSON_BLOB.find(content)?;
    serde_json::from_str(blob.as_str()).ok()
}
