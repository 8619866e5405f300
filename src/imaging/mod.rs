use std::env;

use anyhow::{Context, Result, anyhow, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-image-1";
const IMAGE_SIZE: &str = "1024x1024";

/// Client for the external image-generation API used to illustrate strains
/// that ship without artwork.
#[derive(Clone)]
pub struct ImageClient {
    http: Client,
    config: ImageConfig,
}

#[derive(Clone)]
struct ImageConfig {
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl ImageClient {
    /// Build a client using environment variables. A missing API key is not
    /// an error here; generation requests fail with a clear message instead,
    /// so the rest of the service keeps working without the key.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").ok();
        let base_url =
            env::var("IMAGE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("IMAGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            http: Client::new(),
            config: ImageConfig {
                api_key,
                base_url,
                model,
            },
        })
    }

    /// Generate one image for the prompt and return the raw PNG bytes.
    pub async fn generate(&self, prompt: &str) -> Result<Vec<u8>> {
        let Some(api_key) = self.config.api_key.as_ref() else {
            bail!("OPENAI_API_KEY is not configured but required for image generation");
        };

        let payload = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "n": 1,
            "size": IMAGE_SIZE,
        });

        let response = self
            .http
            .post(format!("{}/images/generations", self.config.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("failed to read image API response body")?;
        let body: serde_json::Value = serde_json::from_str(&response_text).with_context(|| {
            format!(
                "failed to parse image API response as JSON. Response body: {}",
                truncate_preview(&response_text, 500)
            )
        })?;
        if !status.is_success() {
            bail!("image generation failed with status {}: {}", status, body);
        }

        let payload: ImagesPayload = serde_json::from_value(body.clone())
            .map_err(|_| anyhow!("unexpected image API response payload: {}", body))?;

        let datum = payload
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("image API returned no image data"))?;

        if let Some(b64) = datum.b64_json {
            return BASE64
                .decode(b64.trim())
                .context("failed to decode base64 image payload");
        }

        if let Some(url) = datum.url {
            let bytes = self
                .http
                .get(&url)
                .send()
                .await
                .context("failed to download generated image")?
                .error_for_status()
                .context("image download returned an error status")?
                .bytes()
                .await
                .context("failed to read generated image bytes")?;
            return Ok(bytes.to_vec());
        }

        Err(anyhow!("image API response carried neither b64 nor url"))
    }
}

/// Cuts an error-message preview at a char boundary, since API error bodies
/// may contain multi-byte text.
fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(max_chars).collect();
    preview.push_str("...");
    preview
}

/// Prompt used for strain artwork. Kept neutral and botanical so results stay
/// consistent across the catalog.
pub fn build_strain_prompt(name: &str, strain_type: &str) -> String {
    format!(
        "Professional product photograph of a cannabis flower bud of the {strain_type} strain \
         \"{name}\", studio lighting, neutral dark background, high detail, no text, no people"
    )
}

#[derive(Deserialize)]
struct ImagesPayload {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_name_and_type() {
        let prompt = build_strain_prompt("Northern Lights", "Indica");
        assert!(prompt.contains("Northern Lights"));
        assert!(prompt.contains("Indica"));
    }

    #[test]
    fn preview_truncation_respects_char_boundaries() {
        let umlauts = "ä".repeat(600);
        let preview = truncate_preview(&umlauts, 500);
        assert_eq!(preview.chars().count(), 503);
        assert!(preview.ends_with("..."));

        assert_eq!(truncate_preview("kurz", 500), "kurz");
    }

    #[test]
    fn payload_parses_b64_variant() {
        let raw = serde_json::json!({
            "created": 1700000000,
            "data": [{ "b64_json": "aGVsbG8=" }]
        });
        let payload: ImagesPayload = serde_json::from_value(raw).unwrap();
        let datum = &payload.data[0];
        assert_eq!(datum.b64_json.as_deref(), Some("aGVsbG8="));
        assert!(datum.url.is_none());
    }

    #[test]
    fn payload_parses_url_variant() {
        let raw = serde_json::json!({
            "data": [{ "url": "https://example.com/img.png" }]
        });
        let payload: ImagesPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(
            payload.data[0].url.as_deref(),
            Some("https://example.com/img.png")
        );
    }
}
