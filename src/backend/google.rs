//! Google Cloud Text-to-Speech (`v1/text:synthesize`), API-key auth.

use super::{api_error, http_client, request_error, SpeechBackend, SpeechRequest, Voice};
use crate::config::BackendConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

const NAME: &str = "google";
const DEFAULT_ENDPOINT: &str = "https://texttospeech.googleapis.com";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeBody<'a> {
    input: TextInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Serialize)]
struct TextInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: Option<String>,
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<GoogleVoice>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleVoice {
    name: String,
    #[serde(default)]
    language_codes: Vec<String>,
    ssml_gender: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GoogleBackend {
    client: reqwest::Client,
    config: BackendConfig,
    endpoint: String,
}

impl GoogleBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: http_client(NAME, config.timeout_secs)?,
            config,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Voice names embed their locale (`en-GB-Wavenet-A`); prefer that
    /// over the configured language so foreign voices still resolve.
    fn language_for<'a>(&'a self, voice: &'a str) -> &'a str {
        let mut parts = voice.splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(lang), Some(region), Some(_))
                if lang.len() == 2
                    && region.len() == 2
                    && lang.chars().all(|c| c.is_ascii_lowercase())
                    && region.chars().all(|c| c.is_ascii_uppercase()) =>
            {
                &voice[..5]
            }
            _ => &self.config.language,
        }
    }

    fn decode_error(detail: impl Into<String>) -> BackendError {
        BackendError::Decode {
            backend: NAME.into(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl SpeechBackend for GoogleBackend {
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
                hint: "set GOOGLE_TTS_API_KEY".into(),
            });
        }

        let body = SynthesizeBody {
            input: TextInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: self.language_for(&request.voice),
                name: &request.voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: request.speed.clamp(0.25, 4.0),
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/text:synthesize", self.endpoint))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(api_error(NAME, response).await);
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| Self::decode_error(e.to_string()))?;
        let encoded = parsed.audio_content.unwrap_or_default();
        if encoded.is_empty() {
            return Err(BackendError::EmptyAudio {
                backend: NAME.into(),
            });
        }
        let audio = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| Self::decode_error(format!("audioContent is not base64: {e}")))?;

        debug!(
            "google: {} chars → {} bytes ({})",
            request.text.chars().count(),
            audio.len(),
            request.voice
        );
        Ok(audio)
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, BackendError> {
        let response = self
            .client
            .get(format!("{}/v1/voices", self.endpoint))
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| request_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(api_error(NAME, response).await);
        }

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| Self::decode_error(e.to_string()))?;
        Ok(english_voices(parsed.voices))
    }

    fn validate_config(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }
}

fn english_voices(voices: Vec<GoogleVoice>) -> Vec<Voice> {
    voices
        .into_iter()
        .filter_map(|v| {
            let language = v
                .language_codes
                .iter()
                .find(|code| code.starts_with("en"))?
                .clone();
            Some(Voice {
                description: format!("{} ({})", v.name, language),
                name: v.name,
                language,
                gender: v.ssml_gender,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> GoogleBackend {
        GoogleBackend::new(BackendConfig::google("key")).unwrap()
    }

    #[test]
    fn defaults() {
        let b = backend();
        assert_eq!(b.default_voice(), "en-US-Wavenet-D");
        assert_eq!(b.language(), "en-US");
        assert_eq!(b.requests_per_minute(), 100);
    }

    #[test]
    fn language_follows_voice_locale() {
        let b = backend();
        assert_eq!(b.language_for("en-GB-Neural2-A"), "en-GB");
        assert_eq!(b.language_for("narrator"), "en-US");
    }

    #[test]
    fn voice_listing_keeps_english_only() {
        let raw: VoicesResponse = serde_json::from_str(
            r#"{"voices":[
                {"name":"en-US-Wavenet-D","languageCodes":["en-US"],"ssmlGender":"MALE"},
                {"name":"de-DE-Wavenet-A","languageCodes":["de-DE"],"ssmlGender":"FEMALE"},
                {"name":"en-AU-Standard-B","languageCodes":["en-AU"]}
            ]}"#,
        )
        .unwrap();
        let voices = english_voices(raw.voices);
        let names: Vec<&str> = voices.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["en-US-Wavenet-D", "en-AU-Standard-B"]);
        assert_eq!(voices[0].gender.as_deref(), Some("MALE"));
        assert_eq!(voices[1].language, "en-AU");
    }

    #[test]
    fn request_body_shape() {
        let body = SynthesizeBody {
            input: TextInput { text: "Hi." },
            voice: VoiceSelection {
                language_code: "en-US",
                name: "en-US-Wavenet-D",
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: 1.0,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["input"]["text"], "Hi.");
        assert_eq!(json["voice"]["languageCode"], "en-US");
        assert_eq!(json["audioConfig"]["audioEncoding"], "MP3");
        assert_eq!(json["audioConfig"]["speakingRate"], 1.0);
    }

    #[test]
    fn response_without_audio_parses() {
        let parsed: SynthesizeResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.audio_content.is_none());
    }
}
