//! OpenAI text-to-speech (`POST /v1/audio/speech`).

use super::{api_error, http_client, request_error, SpeechBackend, SpeechRequest, Voice};
use crate::config::BackendConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

const NAME: &str = "openai";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com";

/// The six voices OpenAI exposes; the API has no listing endpoint.
const VOICES: &[(&str, &str)] = &[
    ("alloy", "Neutral and balanced"),
    ("echo", "Warm and rounded"),
    ("fable", "Expressive, British-accented"),
    ("onyx", "Deep and authoritative"),
    ("nova", "Bright and energetic"),
    ("shimmer", "Soft and clear"),
];

#[derive(Serialize)]
struct SpeechBody<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    config: BackendConfig,
    endpoint: String,
}

impl OpenAiBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client(NAME, config.timeout_secs)?,
            config,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Point at an OpenAI-compatible server instead of api.openai.com.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    fn model(&self) -> &str {
        self.config.model.as_deref().unwrap_or("tts-1-hd")
    }
}

#[async_trait]
impl SpeechBackend for OpenAiBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn default_voice(&self) -> &str {
        &self.config.default_voice
    }

    fn language(&self) -> &str {
        &self.config.language
    }

    fn requests_per_minute(&self) -> usize {
        self.config.requests_per_minute
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError> {
        if !self.validate_config() {
            return Err(BackendError::NotConfigured {
                backend: NAME.into(),
                hint: "set OPENAI_API_KEY".into(),
            });
        }

        let body = SpeechBody {
            model: self.model(),
            input: &request.text,
            voice: &request.voice,
            speed: request.speed.clamp(0.25, 4.0),
            response_format: "mp3",
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.endpoint))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(api_error(NAME, response).await);
        }

        let bytes = response.bytes().await.map_err(|e| request_error(NAME, e))?;
        if bytes.is_empty() {
            return Err(BackendError::EmptyAudio {
                backend: NAME.into(),
            });
        }
        debug!(
            "openai: {} chars → {} bytes ({})",
            request.text.chars().count(),
            bytes.len(),
            request.voice
        );
        Ok(bytes.to_vec())
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, BackendError> {
        Ok(VOICES
            .iter()
            .map(|(name, description)| Voice {
                name: (*name).to_string(),
                description: (*description).to_string(),
                language: "multilingual".to_string(),
                gender: None,
            })
            .collect())
    }

    fn validate_config(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_the_six_voices() {
        let backend = OpenAiBackend::new(BackendConfig::openai("sk-test")).unwrap();
        let voices = backend.list_voices().await.unwrap();
        let names: Vec<&str> = voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["alloy", "echo", "fable", "onyx", "nova", "shimmer"]);
    }

    #[test]
    fn defaults() {
        let backend = OpenAiBackend::new(BackendConfig::openai("sk-test")).unwrap();
        assert_eq!(backend.name(), "openai");
        assert_eq!(backend.default_voice(), "alloy");
        assert_eq!(backend.requests_per_minute(), 50);
        assert_eq!(backend.model(), "tts-1-hd");
        assert!(backend.validate_config());
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let backend = OpenAiBackend::new(BackendConfig::openai("  ")).unwrap();
        assert!(!backend.validate_config());
        let err = backend
            .synthesize(&SpeechRequest {
                text: "hello".into(),
                voice: "alloy".into(),
                speed: 1.0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured { .. }));
    }

    #[test]
    fn request_body_shape() {
        let body = SpeechBody {
            model: "tts-1-hd",
            input: "Hello.",
            voice: "nova",
            speed: 1.25,
            response_format: "mp3",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "tts-1-hd");
        assert_eq!(json["voice"], "nova");
        assert_eq!(json["response_format"], "mp3");
        assert_eq!(json["speed"], 1.25);
    }
}
