use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

use super::{VisionProvider, VisionRequest};
use crate::error::truncate_text;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// Sent as a header so the credential never appears in a request URL or in
// the error text built from one.
const API_KEY_HEADER: &str = "x-goog-api-key";

const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

/// `generateContent` transport. One request per question, no retries, and
/// no client-side timeout: latency is whatever the service takes.
pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder().timeout(None::<Duration>).build()?;
        Ok(Self {
            api_base: api_base.into().trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &VisionRequest<'_>) -> Result<Value> {
        let jpeg = request.image.to_jpeg_bytes()?;
        Ok(json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.prompt },
                    {
                        "inlineData": {
                            "mimeType": "image/jpeg",
                            "data": BASE64.encode(jpeg),
                        }
                    },
                ],
            }],
            "generationConfig": {
                "temperature": round_hundredths(request.params.temperature()),
                "topK": request.params.top_k(),
                "maxOutputTokens": request.params.max_output_tokens(),
            },
        }))
    }

    fn extract_answer(response_payload: &Value) -> Result<Option<String>> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let Some(candidate) = candidates.first() else {
            if let Some(reason) = response_payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
            {
                bail!("Gemini blocked the prompt ({reason})");
            }
            return Ok(None);
        };

        let text = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let finish_reason = candidate
                .get("finishReason")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if BLOCKING_FINISH_REASONS.contains(&finish_reason) {
                bail!("Gemini stopped without text (finish reason {finish_reason})");
            }
            return Ok(None);
        }
        Ok(Some(text))
    }
}

impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn invoke(&self, request: &VisionRequest<'_>) -> Result<Option<String>> {
        let endpoint = self.endpoint_for_model(request.model);
        let payload = Self::build_payload(request)?;
        tracing::debug!(
            endpoint = %endpoint,
            temperature = request.params.temperature(),
            top_k = request.params.top_k(),
            "sending Gemini request"
        );
        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&payload)
            .send()
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let response_payload = response_json_or_error("Gemini", response)?;
        Self::extract_answer(&response_payload)
    }
}

fn round_hundredths(value: f32) -> f64 {
    (f64::from(value) * 100.0).round() / 100.0
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use glimpse_contracts::params::GenerationParameters;
    use image::{Rgb, RgbImage};
    use serde_json::json;

    use super::*;
    use crate::ingest::ingest;

    fn provider(base: &str) -> GeminiProvider {
        GeminiProvider::new("test-key", base).unwrap()
    }

    #[test]
    fn endpoint_normalizes_base_and_model_prefix() {
        let gemini = provider("https://example.test/v1beta/ ");
        assert_eq!(
            gemini.endpoint_for_model("gemini-2.0-flash-exp"),
            "https://example.test/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
        assert_eq!(
            gemini.endpoint_for_model("models/gemini-1.5-pro"),
            "https://example.test/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn payload_carries_prompt_image_and_generation_config() -> anyhow::Result<()> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]))
            .write_to(&mut bytes, image::ImageFormat::Png)?;
        let bytes = bytes.into_inner();
        let image = ingest(&bytes, bytes.len() as u64)?;
        let params = GenerationParameters::new(0.5, 12)?;
        let request = VisionRequest {
            model: "gemini-2.0-flash-exp",
            prompt: "System.\n\nUser Question: What color?",
            image: &image,
            params,
        };

        let payload = GeminiProvider::build_payload(&request)?;
        let parts = &payload["contents"][0]["parts"];
        assert_eq!(payload["contents"][0]["role"], json!("user"));
        assert_eq!(parts[0]["text"], json!("System.\n\nUser Question: What color?"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/jpeg"));
        let data = parts[1]["inlineData"]["data"].as_str().unwrap_or_default();
        let decoded = BASE64.decode(data)?;
        assert_eq!(image::guess_format(&decoded)?, image::ImageFormat::Jpeg);
        assert_eq!(payload["generationConfig"]["temperature"], json!(0.5));
        assert_eq!(payload["generationConfig"]["topK"], json!(12));
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], json!(1024));
        Ok(())
    }

    #[test]
    fn extract_answer_joins_text_parts() -> anyhow::Result<()> {
        let payload = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "The image " }, { "text": "is red." }] },
                "finishReason": "STOP",
            }]
        });
        assert_eq!(
            GeminiProvider::extract_answer(&payload)?.as_deref(),
            Some("The image is red.")
        );
        Ok(())
    }

    #[test]
    fn extract_answer_without_text_is_none() -> anyhow::Result<()> {
        assert_eq!(GeminiProvider::extract_answer(&json!({}))?, None);
        let payload = json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "MAX_TOKENS" }]
        });
        assert_eq!(GeminiProvider::extract_answer(&payload)?, None);
        Ok(())
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let payload = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        let err = GeminiProvider::extract_answer(&payload).unwrap_err();
        assert!(err.to_string().contains("blocked the prompt (SAFETY)"));

        let payload = json!({
            "candidates": [{ "finishReason": "PROHIBITED_CONTENT" }]
        });
        assert!(GeminiProvider::extract_answer(&payload).is_err());
    }

    #[test]
    fn unreachable_endpoint_fails_instead_of_retrying() -> anyhow::Result<()> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        RgbImage::new(1, 1).write_to(&mut bytes, image::ImageFormat::Png)?;
        let bytes = bytes.into_inner();
        let image = ingest(&bytes, bytes.len() as u64)?;
        let gemini = provider("http://127.0.0.1:9");
        let request = VisionRequest {
            model: "gemini-2.0-flash-exp",
            prompt: "q",
            image: &image,
            params: GenerationParameters::default(),
        };
        let err = gemini.invoke(&request).unwrap_err();
        assert!(err.to_string().starts_with("Gemini request failed"));
        Ok(())
    }

    #[test]
    fn failed_request_does_not_leak_api_key() -> anyhow::Result<()> {
        use crate::error::QueryError;
        use crate::executor::QueryExecutor;

        let mut bytes = std::io::Cursor::new(Vec::new());
        RgbImage::new(1, 1).write_to(&mut bytes, image::ImageFormat::Png)?;
        let bytes = bytes.into_inner();
        let image = ingest(&bytes, bytes.len() as u64)?;
        let gemini = GeminiProvider::new("SECRET-KEY-123", "http://127.0.0.1:9")?;
        let executor = QueryExecutor::new(&gemini, "gemini-2.0-flash-exp");

        let err = executor
            .ask("What is this?", Some(&image), GenerationParameters::default())
            .unwrap_err();
        let QueryError::RemoteCallFailed(message) = &err else {
            anyhow::bail!("expected RemoteCallFailed, got {err:?}");
        };
        assert!(message.contains("Gemini request failed"));
        assert!(!message.contains("SECRET-KEY-123"));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
        Ok(())
    }
}
