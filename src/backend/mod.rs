//! Speech-synthesis backends.
//!
//! Each service implements [`SpeechBackend`]. The [`BackendRegistry`] maps a
//! name to a backend plus the [`RateLimiter`] shared by every job that uses
//! it; callers look backends up by name and never branch on the concrete
//! type.
//!
//! - [`openai`]: OpenAI `/v1/audio/speech`
//! - [`google`]: Google Cloud Text-to-Speech

pub mod google;
pub mod openai;
pub mod rate_limit;

pub use google::GoogleBackend;
pub use openai::OpenAiBackend;
pub use rate_limit::RateLimiter;

use crate::config::BackendConfig;
use crate::error::{BackendError, Pdf2AudioError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{info, warn};

/// One synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub speed: f32,
}

/// A voice offered by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub description: String,
    pub language: String,
    pub gender: Option<String>,
}

/// Common interface for text-to-speech services.
#[async_trait]
pub trait SpeechBackend: Send + Sync + Debug {
    /// Registry key, e.g. `"openai"`.
    fn name(&self) -> &str;

    fn default_voice(&self) -> &str;

    fn language(&self) -> &str;

    /// Service quota used to size the shared rate limiter.
    fn requests_per_minute(&self) -> usize;

    /// Synthesize `request.text`, returning encoded audio bytes.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError>;

    async fn list_voices(&self) -> Result<Vec<Voice>, BackendError>;

    /// Cheap local check that credentials are present.
    fn validate_config(&self) -> bool;
}

/// A backend and its shared limiter.
#[derive(Debug, Clone)]
pub struct RegisteredBackend {
    pub backend: Arc<dyn SpeechBackend>,
    pub limiter: Arc<RateLimiter>,
}

/// Name → backend lookup with a default.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, RegisteredBackend>,
    order: Vec<String>,
    default: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend with a limiter sized from its quota.
    ///
    /// The first backend registered becomes the default.
    pub fn register(&mut self, backend: Arc<dyn SpeechBackend>) -> &mut Self {
        let limiter = Arc::new(RateLimiter::per_minute(backend.requests_per_minute()));
        self.register_with_limiter(backend, limiter)
    }

    /// Register with an explicit limiter.
    pub fn register_with_limiter(
        &mut self,
        backend: Arc<dyn SpeechBackend>,
        limiter: Arc<RateLimiter>,
    ) -> &mut Self {
        let name = backend.name().to_string();
        if !self.backends.contains_key(&name) {
            self.order.push(name.clone());
        }
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.backends
            .insert(name, RegisteredBackend { backend, limiter });
        self
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), Pdf2AudioError> {
        if !self.backends.contains_key(name) {
            return Err(self.not_found(name));
        }
        self.default = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Look up `name`, or the default when `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<RegisteredBackend, Pdf2AudioError> {
        let name = match name.or(self.default.as_deref()) {
            Some(n) => n,
            None => return Err(self.not_found("<default>")),
        };
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    /// `validate_config` for every backend, keyed by name.
    pub fn validate_all(&self) -> BTreeMap<String, bool> {
        self.backends
            .iter()
            .map(|(name, entry)| (name.clone(), entry.backend.validate_config()))
            .collect()
    }

    /// Register every backend whose credentials are in the environment.
    ///
    /// `PDF2AUDIO_BACKEND` picks the default; otherwise OpenAI wins when
    /// both are configured.
    pub fn from_env() -> Result<Self, Pdf2AudioError> {
        let mut registry = Self::new();

        if let Some(cfg) = BackendConfig::openai_from_env() {
            registry.register(Arc::new(OpenAiBackend::new(cfg).map_err(backend_init)?));
        }
        if let Some(cfg) = BackendConfig::google_from_env() {
            registry.register(Arc::new(GoogleBackend::new(cfg).map_err(backend_init)?));
        }

        if registry.is_empty() {
            return Err(Pdf2AudioError::BackendNotFound {
                name: "auto".into(),
                available: "none; set OPENAI_API_KEY or GOOGLE_TTS_API_KEY".into(),
            });
        }

        if let Ok(choice) = std::env::var("PDF2AUDIO_BACKEND") {
            if !choice.is_empty() {
                registry.set_default(&choice)?;
            }
        }

        for (name, ok) in registry.validate_all() {
            if ok {
                info!("Speech backend '{}' ready", name);
            } else {
                warn!("Speech backend '{}' registered but not configured", name);
            }
        }

        Ok(registry)
    }

    fn not_found(&self, name: &str) -> Pdf2AudioError {
        Pdf2AudioError::BackendNotFound {
            name: name.to_string(),
            available: if self.order.is_empty() {
                "none".to_string()
            } else {
                self.order.join(", ")
            },
        }
    }
}

fn backend_init(e: BackendError) -> Pdf2AudioError {
    Pdf2AudioError::Internal(format!("backend initialisation failed: {e}"))
}

// ── Shared HTTP helpers ──────────────────────────────────────────────────

fn http_client(backend: &str, timeout_secs: u64) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BackendError::Request {
            backend: backend.to_string(),
            detail: e.to_string(),
        })
}

fn request_error(backend: &str, e: reqwest::Error) -> BackendError {
    let detail = if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    BackendError::Request {
        backend: backend.to_string(),
        detail,
    }
}

/// Turn a non-success response into [`BackendError::Api`].
async fn api_error(backend: &str, response: reqwest::Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = if body.chars().count() > 300 {
        format!("{}…", body.chars().take(300).collect::<String>())
    } else {
        body
    };
    BackendError::Api {
        backend: backend.to_string(),
        status,
        message,
    }
}
