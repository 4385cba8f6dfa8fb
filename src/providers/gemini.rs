//! Gemini REST client for chat and image generation

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::GenaiConfig;
use crate::error::{Result, StudymateError};
use crate::providers::base::{
    ChatModel, ChatSession, ImageConfig, ImageModel, ImagePayload,
};

/// HTTP client for the hosted model service
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content,
    contents: &'a [Content],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

impl GeminiClient {
    /// Create a client for `api_base` authenticated with `api_key`
    ///
    /// # Examples
    ///
    /// ```
    /// use studymate::providers::GeminiClient;
    ///
    /// let client = GeminiClient::new("key", "https://generativelanguage.googleapis.com/");
    /// assert!(client.is_ok());
    /// ```
    pub fn new(api_key: &str, api_base: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("studymate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StudymateError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Client for the configured service
    pub fn from_config(config: &GenaiConfig) -> Result<Self> {
        Self::new(&config.api_key, &config.api_base)
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.api_base, model, method)
    }

    async fn post<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Model request failed: {}", e);
                StudymateError::Provider(format!("Model request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Model service returned error {}: {}", status, error_text);
            return Err(crate::error::http_status_error(
                "Model service",
                status,
                &error_text,
                StudymateError::Provider,
            )
            .into());
        }

        response.json().await.map_err(|e| {
            tracing::error!("Failed to parse model response: {}", e);
            StudymateError::Provider(format!("Failed to parse model response: {}", e)).into()
        })
    }
}

impl ChatModel for GeminiClient {
    fn start_chat(&self, model: &str, system_instruction: &str) -> Result<Box<dyn ChatSession>> {
        if model.trim().is_empty() {
            return Err(StudymateError::Config("chat model is not set".to_string()).into());
        }
        tracing::debug!(model, "Starting chat session");
        Ok(Box::new(GeminiChatSession {
            client: self.clone(),
            model: model.to_string(),
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(system_instruction.to_string()),
                }],
            },
            history: Vec::new(),
        }))
    }
}

/// Chat session keeping the turn history client-side
struct GeminiChatSession {
    client: GeminiClient,
    model: String,
    system_instruction: Content,
    history: Vec<Content>,
}

#[async_trait]
impl ChatSession for GeminiChatSession {
    async fn send(&mut self, prompt: &str) -> Result<String> {
        self.history.push(Content::text("user", prompt));
        let request = GenerateContentRequest {
            system_instruction: self.system_instruction.clone(),
            contents: &self.history,
        };

        tracing::debug!(model = %self.model, turns = self.history.len(), "Sending chat turn");
        let url = self.client.model_url(&self.model, "generateContent");
        let outcome = self
            .client
            .post::<_, GenerateContentResponse>(&url, &request)
            .await
            .and_then(extract_text);

        match outcome {
            Ok(text) => {
                self.history.push(Content::text("model", &text));
                Ok(text)
            }
            Err(e) => {
                // Keep user/model turns paired for the next attempt.
                self.history.pop();
                Err(e)
            }
        }
    }
}

fn extract_text(response: GenerateContentResponse) -> Result<String> {
    let candidate = match response.candidates.into_iter().next() {
        Some(candidate) => candidate,
        None => {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(StudymateError::Provider(format!("Model returned no reply: {}", reason)).into());
        }
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "empty reply".to_string());
        return Err(StudymateError::Provider(format!("Model returned no text: {}", reason)).into());
    }
    Ok(text)
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate_images(
        &self,
        model: &str,
        prompt: &str,
        config: &ImageConfig,
    ) -> Result<Vec<ImagePayload>> {
        let body = serde_json::json!({
            "instances": [{ "prompt": prompt }],
            "parameters": {
                "sampleCount": config.number_of_images,
                "aspectRatio": config.aspect_ratio.as_str(),
                "outputOptions": { "mimeType": config.output_mime_type },
            }
        });

        tracing::debug!(model, aspect_ratio = %config.aspect_ratio, "Requesting image");
        let response: PredictResponse = self.post(&self.model_url(model, "predict"), &body).await?;

        Ok(response
            .predictions
            .into_iter()
            .filter_map(|p| {
                p.bytes_base64_encoded.map(|data| ImagePayload {
                    mime_type: p
                        .mime_type
                        .unwrap_or_else(|| config.output_mime_type.clone()),
                    data,
                })
            })
            .collect())
    }
}
