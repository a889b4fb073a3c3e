//! Configuration types for PDF-to-audiobook conversion.
//!
//! Process-wide knobs live in [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. What a single request asks for (which
//! backend, which voice, which filters) lives in [`ConversionSettings`] and
//! travels with the job. Credentials for each speech service live in
//! [`BackendConfig`].

use crate::error::Pdf2AudioError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by every conversion run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2audio::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .max_chunk_size(3000)
///     .chapter_pause_secs(1.5)
///     .bitrate("128k")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Upper bound on characters per synthesis request. Default: 4000.
    ///
    /// Speech APIs cap input length (OpenAI at 4096 characters); staying a
    /// little under keeps every request valid.
    pub max_chunk_size: usize,

    /// Silence inserted between chapters, in seconds. Default: 2.0.
    pub chapter_pause_secs: f64,

    /// MP3 bitrate passed to the encoder. Default: "192k".
    pub bitrate: String,

    /// Genre tag on exported files. Default: "Audiobook".
    pub genre: String,

    /// Also write one file per chapter. Default: false.
    pub split_chapters: bool,

    /// Directory receiving exported audio. Default: "output".
    pub output_dir: PathBuf,

    /// Chunks synthesized concurrently within one job. Default: 3.
    pub synthesis_concurrency: usize,

    /// Per-chunk retry budget.
    pub chunk_retry: ChunkRetryPolicy,

    /// Whole-pipeline retry budget.
    pub job_retry: JobRetryPolicy,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Receives job progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 4000,
            chapter_pause_secs: 2.0,
            bitrate: "192k".to_string(),
            genre: "Audiobook".to_string(),
            split_chapters: false,
            output_dir: PathBuf::from("output"),
            synthesis_concurrency: 3,
            chunk_retry: ChunkRetryPolicy::default(),
            job_retry: JobRetryPolicy::default(),
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_chunk_size", &self.max_chunk_size)
            .field("chapter_pause_secs", &self.chapter_pause_secs)
            .field("bitrate", &self.bitrate)
            .field("genre", &self.genre)
            .field("split_chapters", &self.split_chapters)
            .field("output_dir", &self.output_dir)
            .field("synthesis_concurrency", &self.synthesis_concurrency)
            .field("chunk_retry", &self.chunk_retry)
            .field("job_retry", &self.job_retry)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn JobProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_chunk_size(mut self, n: usize) -> Self {
        self.config.max_chunk_size = n;
        self
    }

    pub fn chapter_pause_secs(mut self, secs: f64) -> Self {
        self.config.chapter_pause_secs = secs.max(0.0);
        self
    }

    pub fn bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.config.bitrate = bitrate.into();
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.config.genre = genre.into();
        self
    }

    pub fn split_chapters(mut self, v: bool) -> Self {
        self.config.split_chapters = v;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn synthesis_concurrency(mut self, n: usize) -> Self {
        self.config.synthesis_concurrency = n.max(1);
        self
    }

    pub fn chunk_retry(mut self, policy: ChunkRetryPolicy) -> Self {
        self.config.chunk_retry = policy;
        self
    }

    pub fn job_retry(mut self, policy: JobRetryPolicy) -> Self {
        self.config.job_retry = policy;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2AudioError> {
        let c = &self.config;
        if c.max_chunk_size < 100 {
            return Err(Pdf2AudioError::InvalidConfig(format!(
                "max_chunk_size must be ≥ 100 characters, got {}",
                c.max_chunk_size
            )));
        }
        if !c.chapter_pause_secs.is_finite() {
            return Err(Pdf2AudioError::InvalidConfig(
                "chapter_pause_secs must be a finite number".into(),
            ));
        }
        if !is_valid_bitrate(&c.bitrate) {
            return Err(Pdf2AudioError::InvalidConfig(format!(
                "bitrate must look like '192k', got '{}'",
                c.bitrate
            )));
        }
        if c.chunk_retry.max_attempts == 0 || c.job_retry.max_attempts == 0 {
            return Err(Pdf2AudioError::InvalidConfig(
                "retry policies need at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

fn is_valid_bitrate(s: &str) -> bool {
    match s.strip_suffix('k') {
        Some(num) => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

// ── Retry policies ───────────────────────────────────────────────────────

/// Retry budget for a single chunk.
///
/// With the defaults the waits are 2 s after the first failure and 4 s
/// after the second; the third failure is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ChunkRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl ChunkRetryPolicy {
    /// Wait after failed attempt `attempt` (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Retry budget for a whole pipeline run.
///
/// Waits grow linearly: 5 s, then 10 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobRetryPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl Default for JobRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            step: Duration::from_secs(5),
        }
    }
}

impl JobRetryPolicy {
    /// Wait after failed attempt `attempt` (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

// ── Per-request settings ─────────────────────────────────────────────────

/// Which kinds of boilerplate to strip before narration. All on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub skip_copyright: bool,
    pub skip_acknowledgments: bool,
    pub skip_toc: bool,
    pub skip_index: bool,
    pub skip_promotional: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            skip_copyright: true,
            skip_acknowledgments: true,
            skip_toc: true,
            skip_index: true,
            skip_promotional: true,
        }
    }
}

impl FilterConfig {
    /// Keep everything the classifier would otherwise drop by category.
    pub fn keep_all() -> Self {
        Self {
            skip_copyright: false,
            skip_acknowledgments: false,
            skip_toc: false,
            skip_index: false,
            skip_promotional: false,
        }
    }
}

/// What one conversion request asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Backend name; `None` uses the registry default.
    pub backend: Option<String>,
    /// Voice name; `None` uses the backend default.
    pub voice: Option<String>,
    /// Speaking rate, 0.25–4.0.
    pub speed: f32,
    pub filters: FilterConfig,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            backend: None,
            voice: None,
            speed: 1.0,
            filters: FilterConfig::default(),
        }
    }
}

impl ConversionSettings {
    pub fn with_backend(mut self, name: impl Into<String>) -> Self {
        self.backend = Some(name.into());
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.clamp(0.25, 4.0);
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }
}

// ── Backend credentials ──────────────────────────────────────────────────

/// Connection settings for one speech service.
#[derive(Clone)]
pub struct BackendConfig {
    pub api_key: String,
    /// Model identifier, where the service has one.
    pub model: Option<String>,
    pub default_voice: String,
    pub language: String,
    pub requests_per_minute: usize,
    pub timeout_secs: u64,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("default_voice", &self.default_voice)
            .field("language", &self.language)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl BackendConfig {
    /// OpenAI defaults: `tts-1-hd`, voice `alloy`, 50 requests/minute.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: Some("tts-1-hd".to_string()),
            default_voice: "alloy".to_string(),
            language: "en-US".to_string(),
            requests_per_minute: 50,
            timeout_secs: 120,
        }
    }

    /// Google Cloud TTS defaults: voice `en-US-Wavenet-D`, 100 requests/minute.
    pub fn google(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            default_voice: "en-US-Wavenet-D".to_string(),
            language: "en-US".to_string(),
            requests_per_minute: 100,
            timeout_secs: 120,
        }
    }

    /// `OPENAI_API_KEY`, with optional `OPENAI_TTS_MODEL` / `OPENAI_TTS_VOICE`.
    pub fn openai_from_env() -> Option<Self> {
        let key = non_empty_env("OPENAI_API_KEY")?;
        let mut cfg = Self::openai(key);
        if let Some(model) = non_empty_env("OPENAI_TTS_MODEL") {
            cfg.model = Some(model);
        }
        if let Some(voice) = non_empty_env("OPENAI_TTS_VOICE") {
            cfg.default_voice = voice;
        }
        Some(cfg)
    }

    /// `GOOGLE_TTS_API_KEY`, with optional `GOOGLE_TTS_VOICE` / `GOOGLE_TTS_LANGUAGE`.
    pub fn google_from_env() -> Option<Self> {
        let key = non_empty_env("GOOGLE_TTS_API_KEY")?;
        let mut cfg = Self::google(key);
        if let Some(voice) = non_empty_env("GOOGLE_TTS_VOICE") {
            cfg.default_voice = voice;
        }
        if let Some(lang) = non_empty_env("GOOGLE_TTS_LANGUAGE") {
            cfg.language = lang;
        }
        Some(cfg)
    }

    pub fn with_requests_per_minute(mut self, n: usize) -> Self {
        self.requests_per_minute = n.max(1);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert_eq!(c.max_chunk_size, 4000);
        assert_eq!(c.chapter_pause_secs, 2.0);
        assert_eq!(c.bitrate, "192k");
        assert_eq!(c.synthesis_concurrency, 3);
        assert_eq!(c.chunk_retry.max_attempts, 3);
        assert_eq!(c.job_retry.max_attempts, 3);
    }

    #[test]
    fn builder_rejects_bad_bitrate() {
        let err = ConversionConfig::builder().bitrate("loud").build();
        assert!(matches!(err, Err(Pdf2AudioError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_tiny_chunks() {
        let err = ConversionConfig::builder().max_chunk_size(10).build();
        assert!(matches!(err, Err(Pdf2AudioError::InvalidConfig(_))));
    }

    #[test]
    fn chunk_retry_waits_double() {
        let p = ChunkRetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_secs(2));
        assert_eq!(p.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn job_retry_waits_grow_linearly() {
        let p = JobRetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_secs(5));
        assert_eq!(p.delay_after(2), Duration::from_secs(10));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = BackendConfig::openai("sk-very-secret");
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("sk-very-secret"));

        let conv = ConversionConfig::builder().password("hunter2").build().unwrap();
        assert!(!format!("{conv:?}").contains("hunter2"));
    }

    #[test]
    fn settings_clamp_speed() {
        let s = ConversionSettings::default().with_speed(10.0);
        assert_eq!(s.speed, 4.0);
    }

    #[test]
    fn settings_deserialise_with_defaults() {
        let s: ConversionSettings =
            serde_json::from_str(r#"{"voice":"nova","filters":{"skip_toc":false}}"#).unwrap();
        assert_eq!(s.voice.as_deref(), Some("nova"));
        assert_eq!(s.speed, 1.0);
        assert!(!s.filters.skip_toc);
        assert!(s.filters.skip_copyright);
    }
}
