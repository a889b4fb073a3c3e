//! One pass of the pipeline over one document.
//!
//! [`run_pipeline`] is what the job supervisor calls once per attempt. It
//! reports stage progress through a plain closure and checks the cancel
//! flag between stages; a raised flag ends the run with
//! [`RunOutcome::Cancelled`], never an error.
//!
//! [`convert`] wraps it for callers who just want a file: pdfium, ffmpeg,
//! no job bookkeeping. [`inspect`] runs only the text stages.

use crate::backend::{BackendRegistry, RegisteredBackend};
use crate::codec::{AudioCodec, FfmpegCodec};
use crate::config::{ConversionConfig, ConversionSettings, FilterConfig};
use crate::error::Pdf2AudioError;
use crate::model::{AudioMetadata, ChapterMarker, DocumentMetadata, SectionKind};
use crate::pipeline::assemble::{self, estimate_duration_secs};
use crate::pipeline::chunk::{chunk_sections, chunk_text};
use crate::pipeline::classify::{self, PageDecision};
use crate::pipeline::extract::{preflight, Extractor, PdfiumExtractor};
use crate::pipeline::segment;
use crate::pipeline::synthesize::{SynthesisEvent, SynthesisOrchestrator};
use crate::pipeline::{CancelSignal, StageOutcome};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Receives `(fraction, message)` as a run advances.
pub type ProgressFn<'a> = &'a (dyn Fn(f64, &str) + Send + Sync);

/// Files and timings of a finished conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub audio_path: PathBuf,
    /// Per-chapter files, empty unless splitting was enabled.
    pub chapter_files: Vec<PathBuf>,
    pub chapters: Vec<ChapterMarker>,
    pub duration_secs: f64,
    pub tags: AudioMetadata,
    pub stats: ConversionStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub kept_pages: usize,
    pub sections: usize,
    pub chunks: usize,
    pub characters: usize,
    pub backend: String,
    pub voice: String,
    pub synthesis_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// How a single run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(ConversionOutput),
    Cancelled,
}

/// Where a run writes its files.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTarget {
    pub audio_path: PathBuf,
    pub chapter_dir: PathBuf,
    /// Prefix for `{base}_chapter_{NN}` files.
    pub chapter_base: String,
}

impl OutputTarget {
    /// `{dir}/{prefix}_{stem}.{ext}`, or `{dir}/{stem}.{ext}` without a prefix.
    pub fn for_document(dir: &Path, document: &Path, prefix: Option<&str>, extension: &str) -> Self {
        let stem = document
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "audiobook".to_string());
        let file = match prefix {
            Some(p) => format!("{p}_{stem}.{extension}"),
            None => format!("{stem}.{extension}"),
        };
        Self {
            audio_path: dir.join(file),
            chapter_dir: dir.to_path_buf(),
            chapter_base: stem,
        }
    }
}

/// Collaborators for one run.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub extractor: &'a dyn Extractor,
    pub backend: &'a RegisteredBackend,
    pub codec: &'a dyn AudioCodec,
    pub config: &'a ConversionConfig,
}

/// Run every stage once.
///
/// # Errors
/// Any stage error, unchanged. A book with nothing left to narrate after
/// filtering is not an error: it completes with zero chunks and a
/// zero-length export.
pub async fn run_pipeline(
    ctx: PipelineContext<'_>,
    document: &Path,
    settings: &ConversionSettings,
    target: &OutputTarget,
    progress: ProgressFn<'_>,
    cancel: &CancelSignal,
) -> Result<RunOutcome, Pdf2AudioError> {
    let total_start = Instant::now();
    let config = ctx.config;
    info!("Starting conversion: {}", document.display());

    // ── Step 1: Extract text ─────────────────────────────────────────────
    let doc = ctx.extractor.extract(document).await?;
    progress(0.1, &format!("Extracted {} pages", doc.pages.len()));
    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    // ── Step 2: Drop boilerplate pages ───────────────────────────────────
    let pages = classify::filter_pages(&doc.pages, &settings.filters);
    if pages.is_empty() {
        warn!("All {} pages were filtered out", doc.pages.len());
    }
    progress(0.2, &format!("Kept {} of {} pages", pages.len(), doc.pages.len()));
    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    // ── Step 3: Segment into chapters ────────────────────────────────────
    let sections = classify::filter_sections(segment::segment(&pages), &settings.filters);
    if sections.is_empty() && !pages.is_empty() {
        warn!("No chapter headings found in {} kept pages", pages.len());
    }
    progress(0.3, &format!("Found {} chapters", sections.len()));

    // ── Step 4: Chunk ────────────────────────────────────────────────────
    let chunks = chunk_sections(&sections, config.max_chunk_size);
    if chunks.is_empty() {
        warn!("Nothing to narrate in {}; exporting silence", document.display());
    }
    let characters: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
    progress(0.4, &format!("Prepared {} chunks", chunks.len()));
    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    // ── Step 5: Synthesize ───────────────────────────────────────────────
    let total = chunks.len();
    let finished = AtomicUsize::new(0);
    let synthesis_fraction = |done: usize| 0.5 + 0.3 * done as f64 / total as f64;
    let observer = |event: SynthesisEvent| match event {
        SynthesisEvent::ChunkFinished { total, .. } => {
            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
            progress(synthesis_fraction(done), &format!("Synthesized chunk {done}/{total}"));
        }
        SynthesisEvent::Retrying {
            index,
            attempt,
            max_attempts,
            wait,
            ..
        } => {
            let done = finished.load(Ordering::SeqCst);
            progress(
                synthesis_fraction(done),
                &format!(
                    "Chunk {} failed, retrying in {}s (attempt {}/{})",
                    index + 1,
                    wait.as_secs(),
                    attempt + 1,
                    max_attempts
                ),
            );
        }
        SynthesisEvent::ChunkStarted { .. } => {}
    };

    progress(0.5, &format!("Synthesizing {total} chunks"));
    let synth_start = Instant::now();
    let orchestrator = SynthesisOrchestrator::new(config.synthesis_concurrency, config.chunk_retry);
    let mut audio = match orchestrator
        .synthesize_all(&chunks, ctx.backend, settings, &observer, cancel)
        .await?
    {
        StageOutcome::Done(audio) => audio,
        StageOutcome::Cancelled => return Ok(RunOutcome::Cancelled),
    };
    let synthesis_duration_ms = synth_start.elapsed().as_millis() as u64;
    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    // ── Step 6: Combine ──────────────────────────────────────────────────
    let assembled = assemble::combine(ctx.codec, &mut audio, config.chapter_pause_secs).await?;
    progress(0.8, &format!("Combined {:.0}s of audio", assembled.duration_secs()));
    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    // ── Step 7: Export ───────────────────────────────────────────────────
    let tags = AudioMetadata::from_document(&doc.metadata, &config.genre);
    assemble::export(ctx.codec, &assembled.pcm, &target.audio_path, &tags, &config.bitrate).await?;
    let chapter_files = if config.split_chapters {
        assemble::split_by_chapters(
            ctx.codec,
            &assembled.pcm,
            &assembled.chapters,
            &target.chapter_dir,
            &target.chapter_base,
            &tags,
            &config.bitrate,
        )
        .await?
    } else {
        Vec::new()
    };
    progress(0.95, &format!("Exported {}", target.audio_path.display()));

    let stats = ConversionStats {
        total_pages: doc.pages.len(),
        kept_pages: pages.len(),
        sections: sections.len(),
        chunks: total,
        characters,
        backend: ctx.backend.backend.name().to_string(),
        voice: settings
            .voice
            .clone()
            .unwrap_or_else(|| ctx.backend.backend.default_voice().to_string()),
        synthesis_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Conversion complete: {} chunks, {:.1}s audio, {}ms total",
        stats.chunks,
        assembled.duration_secs(),
        stats.total_duration_ms
    );
    progress(1.0, "Conversion complete");

    Ok(RunOutcome::Completed(ConversionOutput {
        audio_path: target.audio_path.clone(),
        chapter_files,
        duration_secs: assembled.duration_secs(),
        chapters: assembled.chapters,
        tags,
        stats,
    }))
}

/// Convert a PDF to an MP3 in `config.output_dir`.
///
/// Uses pdfium for text and ffmpeg for audio. Runs a single attempt with no
/// job-level retry; use [`crate::job::JobSupervisor`] for that.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2audio::{convert, BackendRegistry, ConversionConfig, ConversionSettings};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backends = BackendRegistry::from_env()?;
/// let config = ConversionConfig::default();
/// let output = convert("novel.pdf", &ConversionSettings::default(), &config, &backends).await?;
/// println!("{} ({:.0}s)", output.audio_path.display(), output.duration_secs);
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    document: impl AsRef<Path>,
    settings: &ConversionSettings,
    config: &ConversionConfig,
    backends: &BackendRegistry,
) -> Result<ConversionOutput, Pdf2AudioError> {
    let document = document.as_ref();
    let backend = backends.resolve(settings.backend.as_deref())?;
    let extractor = PdfiumExtractor::new(config.password.clone());
    let codec = FfmpegCodec::new();
    let target = OutputTarget::for_document(&config.output_dir, document, None, codec.extension());
    let ctx = PipelineContext {
        extractor: &extractor,
        backend: &backend,
        codec: &codec,
        config,
    };
    let quiet = |_: f64, _: &str| {};
    match run_pipeline(ctx, document, settings, &target, &quiet, &CancelSignal::never()).await? {
        RunOutcome::Completed(output) => Ok(output),
        RunOutcome::Cancelled => Err(Pdf2AudioError::Internal(
            "conversion cancelled without a cancel source".into(),
        )),
    }
}

/// Convert PDF bytes held in memory.
///
/// The bytes are written to a managed temporary directory as
/// `{name}.pdf`, so output files are named after `name`. The directory is
/// removed when the call returns.
pub async fn convert_bytes(
    bytes: &[u8],
    name: &str,
    settings: &ConversionSettings,
    config: &ConversionConfig,
    backends: &BackendRegistry,
) -> Result<ConversionOutput, Pdf2AudioError> {
    let dir = tempfile::tempdir().map_err(|e| Pdf2AudioError::Internal(format!("tempdir: {e}")))?;
    let path = dir.path().join(format!("{name}.pdf"));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| Pdf2AudioError::Internal(format!("tempfile write: {e}")))?;
    preflight(&path)?;
    // `dir` is dropped (and the file deleted) when `convert` returns
    convert(&path, settings, config, backends).await
}

// ── Inspection ───────────────────────────────────────────────────────────

/// How the classifier treated one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub number: usize,
    pub word_count: usize,
    pub decision: PageDecision,
}

/// A chapter that would be narrated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    pub title: String,
    pub kind: SectionKind,
    pub start_page: usize,
    pub end_page: usize,
    pub word_count: usize,
    pub chunks: usize,
    pub estimated_secs: f64,
}

/// What a conversion would narrate, without synthesizing anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspection {
    pub metadata: DocumentMetadata,
    pub pages: Vec<PageReport>,
    pub sections: Vec<SectionReport>,
    pub total_chunks: usize,
    pub estimated_duration_secs: f64,
}

/// Run extraction, classification, segmentation and chunking only.
///
/// Needs no speech backend or API key.
pub async fn inspect(
    extractor: &dyn Extractor,
    document: &Path,
    filters: &FilterConfig,
    max_chunk_size: usize,
) -> Result<Inspection, Pdf2AudioError> {
    let doc = extractor.extract(document).await?;

    let pages: Vec<PageReport> = doc
        .pages
        .iter()
        .map(|p| PageReport {
            number: p.number,
            word_count: p.word_count,
            decision: classify::analyze_page(p, filters),
        })
        .collect();

    let kept = classify::filter_pages(&doc.pages, filters);
    let sections: Vec<SectionReport> = classify::filter_sections(segment::segment(&kept), filters)
        .into_iter()
        .map(|s| SectionReport {
            chunks: chunk_text(&s.content, max_chunk_size).len(),
            estimated_secs: estimate_duration_secs(&s.content),
            word_count: s.word_count(),
            title: s.title,
            kind: s.kind,
            start_page: s.start_page,
            end_page: s.end_page,
        })
        .collect();

    Ok(Inspection {
        metadata: doc.metadata,
        total_chunks: sections.iter().map(|s| s.chunks).sum(),
        estimated_duration_secs: sections.iter().map(|s| s.estimated_secs).sum(),
        pages,
        sections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::PreparedExtractor;

    fn prose(words: usize) -> String {
        (0..words)
            .map(|i| if i % 12 == 11 { "story." } else { "story" })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn output_target_names() {
        let t = OutputTarget::for_document(Path::new("out"), Path::new("/in/My Book.pdf"), Some("abc"), "mp3");
        assert_eq!(t.audio_path, PathBuf::from("out/abc_My Book.mp3"));
        assert_eq!(t.chapter_base, "My Book");
        let plain = OutputTarget::for_document(Path::new("out"), Path::new("novel.pdf"), None, "wav");
        assert_eq!(plain.audio_path, PathBuf::from("out/novel.wav"));
    }

    #[tokio::test]
    async fn inspect_reports_pages_and_chapters() {
        let extractor = PreparedExtractor::from_texts(
            DocumentMetadata::default(),
            [
                format!("Chapter 1\nBeginnings\n{}", prose(200)),
                "Too short".to_string(),
                format!("Chapter 2\nEndings\n{}", prose(200)),
            ],
        );
        let report = inspect(&extractor, Path::new("book.pdf"), &FilterConfig::default(), 4000)
            .await
            .unwrap();

        assert_eq!(report.pages.len(), 3);
        assert!(report.pages[0].decision.is_keep());
        assert!(!report.pages[1].decision.is_keep());
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].title, "Chapter 1 Beginnings");
        assert_eq!(report.total_chunks, 2);
        assert!(report.estimated_duration_secs > 0.0);
    }

    #[tokio::test]
    async fn convert_bytes_rejects_non_pdf_before_any_work() {
        let err = convert_bytes(
            b"PK\x03\x04 zip archive",
            "notes",
            &ConversionSettings::default(),
            &ConversionConfig::default(),
            &BackendRegistry::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::NotAPdf { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn inspect_without_headings_finds_nothing() {
        let extractor = PreparedExtractor::from_texts(DocumentMetadata::default(), [prose(300)]);
        let report = inspect(&extractor, Path::new("book.pdf"), &FilterConfig::default(), 4000)
            .await
            .unwrap();
        assert!(report.sections.is_empty());
        assert_eq!(report.total_chunks, 0);
    }
}
