//! Google Gemini text generation over HTTPS

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use redops_common::{RedopsError, RedopsResult, TextGenerator};

pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> RedopsResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RedopsError::Config("API_KEY is not defined".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RedopsError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key,
        })
    }

    /// Build a client from `GEMINI_API_KEY`, falling back to `API_KEY`.
    pub fn from_env() -> RedopsResult<Self> {
        let api_key = KEY_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| RedopsError::Config("API_KEY is not defined".to_string()))?;
        Self::new(api_key, DEFAULT_MODEL)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

/// Concatenated text of the first candidate.
fn extract_text(body: &str) -> RedopsResult<String> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| RedopsError::Generation(format!("malformed response: {}", e)))?;

    if let Some(usage) = &response.usage_metadata {
        info!(
            "Gemini usage - prompt: {:?} tokens, response: {:?} tokens",
            usage.prompt_token_count, usage.candidates_token_count
        );
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RedopsError::Generation("no candidates in response".to_string()))?;
    let text: String = candidate
        .content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();
    if text.is_empty() {
        return Err(RedopsError::Generation("empty candidate".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> RedopsResult<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };
        debug!("Sending request to {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| RedopsError::Generation(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RedopsError::Generation(format!("reading response: {}", e.without_url())))?;
        if !status.is_success() {
            error!("Gemini API error: {}", status);
            return Err(RedopsError::Generation(format!("HTTP {}: {}", status, text)));
        }
        extract_text(&text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_keys() {
        assert!(matches!(
            GeminiClient::new("  ", DEFAULT_MODEL),
            Err(RedopsError::Config(_))
        ));
    }

    #[test]
    fn endpoint_includes_model() {
        let client = GeminiClient::new("k", "gemini-test")
            .unwrap()
            .with_base_url("http://localhost:9000/models/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:9000/models/gemini-test:generateContent"
        );
        assert_eq!(client.name(), "gemini-test");
    }

    #[test]
    fn request_body_matches_api_shape() {
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: "hello" }],
            }],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"contents":[{"parts":[{"text":"hello"}]}]}"#
        );
    }

    #[test]
    fn extracts_first_candidate_text() {
        let body = r##"{
            "candidates": [
                {"content": {"parts": [{"text": "# Report"}, {"text": "\nbody"}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 40}
        }"##;
        assert_eq!(extract_text(body).unwrap(), "# Report\nbody");
    }

    #[test]
    fn empty_or_malformed_responses_are_generation_errors() {
        assert!(matches!(
            extract_text(r#"{"candidates": []}"#),
            Err(RedopsError::Generation(_))
        ));
        assert!(matches!(
            extract_text(r#"{"candidates": [{"content": {"parts": []}}]}"#),
            Err(RedopsError::Generation(_))
        ));
        assert!(matches!(extract_text("not json"), Err(RedopsError::Generation(_))));
    }
}
