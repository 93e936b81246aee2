use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::config::{Config, AI_TIMEOUT_SECS};
use crate::error::{AppError, Result};

/// Client for the Gemini generateContent endpoint. One-shot text in, free
/// text out; latency is unbounded upstream so every request carries the
/// client timeout, and a timeout is treated like any other failure by the
/// caller.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(AI_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.gemini_api_url.clone(),
            api_key: cfg.gemini_api_key.clone(),
            model: cfg.gemini_model.clone(),
        })
    }

    /// Send one prompt and return the model's text. The output is untrusted
    /// free text — no schema validation happens here.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let payload = json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        debug!("Gemini request: {} prompt chars", prompt.len());
        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Ai(format!("Gemini returned {status}: {body}")));
        }

        let body: serde_json::Value = response.json().await?;
        extract_text(&body)
    }
}

/// Pull the generated text out of a generateContent response body:
/// `candidates[0].content.parts[*].text`, concatenated.
fn extract_text(body: &serde_json::Value) -> Result<String> {
    let parts = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| AppError::Ai("response missing candidates[0].content.parts".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        return Err(AppError::Ai("response contained no text parts".to_string()));
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_well_formed_response() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        {"text": "Coffee prices "},
                        {"text": "look stable."}
                    ],
                    "role": "model"
                },
                "finishReason": "STOP"
            }]
        });
        assert_eq!(
            extract_text(&body).unwrap(),
            "Coffee prices look stable."
        );
    }

    #[test]
    fn missing_candidates_is_an_ai_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = extract_text(&body).unwrap_err();
        assert!(matches!(err, AppError::Ai(_)));
    }

    #[test]
    fn empty_parts_is_an_ai_error() {
        let body = json!({
            "candidates": [{"content": {"parts": [], "role": "model"}}]
        });
        assert!(extract_text(&body).is_err());
    }
}
