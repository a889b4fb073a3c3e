//! # edgequake-pdf2audio
//!
//! Turn PDF books into narrated audiobooks.
//!
//! Extract the text of every page, strip what nobody wants read aloud
//! (copyright pages, tables of contents, acknowledgments, indices, blurbs),
//! find the chapters, and send bounded chunks to a speech service. The
//! returned audio is stitched together with a pause between chapters and
//! exported as one tagged MP3, optionally plus one file per chapter.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract     per-page text + metadata via pdfium (spawn_blocking)
//!  ├─ 2. Classify    drop boilerplate pages (keyword / layout scores)
//!  ├─ 3. Segment     chapter headings → sections, then drop stub sections
//!  ├─ 4. Chunk       sentence-aligned pieces under max_chunk_size chars
//!  ├─ 5. Synthesize  rate-limited, retried TTS calls, order preserved
//!  └─ 6. Assemble    decode → PCM, chapter pauses, MP3 + ID3 tags
//! ```
//!
//! Jobs wrap the pipeline with a lifecycle
//! (`created → uploaded → processing → completed | failed | cancelled`),
//! progress reporting, cooperative cancellation and a whole-run retry; see
//! [`job`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2audio::{convert, BackendRegistry, ConversionConfig, ConversionSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Registers OpenAI and/or Google from OPENAI_API_KEY / GOOGLE_TTS_API_KEY
//!     let backends = BackendRegistry::from_env()?;
//!     let config = ConversionConfig::builder().split_chapters(true).build()?;
//!     let output = convert("novel.pdf", &ConversionSettings::default(), &config, &backends).await?;
//!     println!("{} — {} chapters, {:.0} min",
//!         output.audio_path.display(),
//!         output.chapters.len(),
//!         output.duration_secs / 60.0);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2audio` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2audio = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime Requirements
//!
//! | Tool | Needed for | Override |
//! |------|-----------|----------|
//! | libpdfium | text extraction | `PDFIUM_LIB_PATH` |
//! | ffmpeg (with libmp3lame) | MP3 decode/encode | `FFMPEG_PATH` |
//!
//! [`WavCodec`] needs neither ffmpeg nor any other external tool.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod codec;
pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendRegistry, GoogleBackend, OpenAiBackend, RateLimiter, SpeechBackend, SpeechRequest, Voice};
pub use codec::{AudioCodec, FfmpegCodec, PcmAudio, WavCodec};
pub use config::{
    BackendConfig, ChunkRetryPolicy, ConversionConfig, ConversionConfigBuilder, ConversionSettings, FilterConfig,
    JobRetryPolicy,
};
pub use convert::{convert, convert_bytes, inspect, ConversionOutput, ConversionStats, Inspection, RunOutcome};
pub use error::{BackendError, Pdf2AudioError};
pub use job::{Job, JobId, JobRegistry, JobState, JobSupervisor, JobUpdate};
pub use model::{AudioChunk, AudioMetadata, ChapterMarker, DocumentMetadata, Page, Section, SectionKind, TextChunk};
pub use pipeline::extract::{Extractor, PdfiumExtractor, PreparedExtractor};
pub use pipeline::{CancelSignal, StageOutcome};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{ChannelProgress, JobEvent, JobEventStream};
