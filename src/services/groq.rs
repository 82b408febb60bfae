use anyhow::Result;
use reqwest::StatusCode;
use std::time::Duration;

use super::ai_service::VisionService;
use super::image_prep::encode_payload;
use crate::config::Config;
use crate::models::{AnalysisOutcome, AnalysisRequest, ChatResponse, PreparedImage};

/// Token budget for every analysis.
pub const MAX_TOKENS: u32 = 700;

pub const IMAGE_TOO_LARGE_ADVISORY: &str =
    "⚠️ The image is still too large. Try uploading a smaller image.";

/// Groq chat-completions client for image analysis.
pub struct GroqVisionService {
    api_key: String,
    api_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl GroqVisionService {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            timeout: config.request_timeout,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one request and fold whatever happens into an outcome.
    pub async fn analyze_food_image(
        &self,
        prompt: &str,
        image: &PreparedImage,
        temperature: f64,
    ) -> AnalysisOutcome {
        match self.dispatch(prompt, image, temperature).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("❌ Groq request failed: {}", e);
                AnalysisOutcome::Error(format!(
                    "⚠️ Error communicating with Groq API: {}",
                    self.describe_failure(&e)
                ))
            }
        }
    }

    async fn dispatch(
        &self,
        prompt: &str,
        image: &PreparedImage,
        temperature: f64,
    ) -> Result<AnalysisOutcome> {
        let payload = encode_payload(image)?;
        let request = AnalysisRequest::new(&self.model, prompt, &payload, MAX_TOKENS, temperature);

        log::info!(
            "🤖 Sending request to Groq with model: {} (temperature {})",
            self.model,
            temperature
        );
        log::debug!("📤 Image payload: {} base64 chars", payload.as_base64().len());

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        log::debug!("📥 Groq response status: {}", status);

        if status == StatusCode::PAYLOAD_TOO_LARGE {
            log::warn!("⚠️ Groq rejected the payload as too large");
            return Ok(AnalysisOutcome::Advisory(IMAGE_TOO_LARGE_ADVISORY.to_string()));
        }

        if !status.is_success() {
            let http_error = response.error_for_status_ref().err();
            let error_text = response.text().await?;
            log::error!("❌ Groq API error response ({}): {}", status, error_text);

            return match serde_json::from_str::<serde_json::Value>(&error_text) {
                Ok(error_body) => Ok(AnalysisOutcome::Error(format!(
                    "⚠️ API error {}: {}",
                    status.as_u16(),
                    error_body
                ))),
                Err(_) => match http_error {
                    Some(e) => Err(e.into()),
                    None => anyhow::bail!("unexpected HTTP status {}", status),
                },
            };
        }

        let response_text = response.text().await?;
        log::debug!("📄 Raw Groq response size: {} bytes", response_text.len());

        let chat_response: ChatResponse = serde_json::from_str(&response_text)?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("response contained no choices"))?;

        log::info!("✅ Received analysis ({} chars)", content.len());
        Ok(AnalysisOutcome::Success(content))
    }

    fn describe_failure(&self, err: &anyhow::Error) -> String {
        match err.downcast_ref::<reqwest::Error>() {
            Some(e) if e.is_timeout() => format!(
                "request timed out after {}s ({})",
                self.timeout.as_secs_f64(),
                e
            ),
            _ => err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl VisionService for GroqVisionService {
    async fn analyze_food_image(
        &self,
        prompt: &str,
        image: &PreparedImage,
        temperature: f64,
    ) -> AnalysisOutcome {
        GroqVisionService::analyze_food_image(self, prompt, image, temperature).await
    }
}
