//! Gemini `generateContent` REST client.

use super::{ChatClient, ServiceError, SynthesisClient};
use crate::config::GeminiConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const API_KEY_HEADER: &str = "x-goog-api-key";
const INVALID_KEY_MARKERS: [&str; 2] = ["API key not valid", "API_KEY_INVALID"];

#[derive(Clone, Copy, Debug)]
enum Purpose {
    Chat,
    Speech,
}

impl Purpose {
    fn failure(self, message: impl Into<String>) -> ServiceError {
        match self {
            Purpose::Chat => ServiceError::ChatFailure(message.into()),
            Purpose::Speech => ServiceError::SynthesisFailure(message.into()),
        }
    }
}

// Gemini API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Content {
            role: role.map(|r| r.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
        credential: &str,
        purpose: Purpose,
    ) -> Result<GenerateContentResponse, ServiceError> {
        if credential.is_empty() {
            return Err(ServiceError::MissingCredential);
        }

        let body = serde_json::to_vec(request)
            .map_err(|e| purpose.failure(format!("Failed to encode request: {e}")))?;

        let response = self
            .client
            .post(self.url(model))
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, credential)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Error calling Gemini API for {purpose:?}: {e}");
                purpose.failure(format!("Request failed: {e}"))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| purpose.failure(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            error!("Gemini API returned {status} for {purpose:?}: {text}");

            if INVALID_KEY_MARKERS.iter().any(|marker| text.contains(marker)) {
                return Err(ServiceError::InvalidCredential);
            }

            let message = match serde_json::from_str::<ErrorResponse>(&text) {
                Ok(error_response) => error_response.error.message,
                Err(_) => format!("HTTP {status}"),
            };
            return Err(purpose.failure(message));
        }

        serde_json::from_str(&text)
            .map_err(|e| purpose.failure(format!("Failed to parse response: {e}")))
    }
}

/// Concatenated text parts of the first candidate
fn reply_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Inline audio data of the first part of the first candidate
fn audio_payload(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let data = content.parts.into_iter().next()?.inline_data?.data;

    if data.is_empty() {
        None
    } else {
        Some(data)
    }
}

#[async_trait]
impl ChatClient for GeminiClient {
    async fn get_reply(&self, text: &str, credential: &str) -> Result<String, ServiceError> {
        let request = GenerateContentRequest {
            contents: vec![Content::text(Some("user"), text)],
            system_instruction: Some(Content::text(None, &self.config.system_instruction)),
            generation_config: None,
        };

        let response = self
            .generate(&self.config.chat_model, &request, credential, Purpose::Chat)
            .await?;

        reply_text(response).ok_or_else(|| ServiceError::ChatFailure("Empty reply".to_string()))
    }
}

#[async_trait]
impl SynthesisClient for GeminiClient {
    async fn synthesize(&self, text: &str, credential: &str) -> Result<String, ServiceError> {
        let request = GenerateContentRequest {
            contents: vec![Content::text(None, text)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.config.voice_name.clone(),
                        },
                    },
                },
            }),
        };

        let response = self
            .generate(&self.config.tts_model, &request, credential, Purpose::Speech)
            .await?;

        audio_payload(response).ok_or_else(|| {
            ServiceError::SynthesisFailure("No audio data received from the API".to_string())
        })
    }
}
