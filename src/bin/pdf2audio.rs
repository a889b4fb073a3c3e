//! CLI binary for edgequake-pdf2audio.
//!
//! A thin shim over the library crate: maps flags to `ConversionConfig` and
//! `ConversionSettings`, runs one job through the supervisor and prints the
//! result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2audio::convert::{Inspection, PageReport};
use edgequake_pdf2audio::pipeline::classify::PageDecision;
use edgequake_pdf2audio::{
    inspect, BackendRegistry, ConversionConfig, ConversionOutput, ConversionSettings, FilterConfig, JobId,
    JobProgressCallback, JobRegistry, JobState, JobSupervisor, PdfiumExtractor, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders job progress as a percentage bar; retry notices are printed
/// above it so they stay in the scrollback.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Narrating");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl JobProgressCallback for CliProgress {
    fn on_progress(&self, _job: JobId, fraction: f64, message: &str) {
        if message.contains("retrying") || message.starts_with("Retrying") {
            self.bar.println(format!("  {} {}", yellow("↻"), message));
        }
        self.bar.set_position((fraction * 100.0).round() as u64);
        self.bar.set_message(message.to_string());
    }

    fn on_completed(&self, _job: JobId, _output: &ConversionOutput) {
        self.bar.finish_and_clear();
    }

    fn on_failed(&self, _job: JobId, _error: &str) {
        // main() reports the error itself
        self.bar.abandon();
    }

    fn on_cancelled(&self, _job: JobId) {
        self.bar.abandon_with_message(yellow("cancelled"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Narrate a book with the default backend
  pdf2audio novel.pdf

  # One file per chapter, different voice, slightly faster
  pdf2audio --split-chapters --voice nova --speed 1.1 novel.pdf -o audiobooks/

  # Use Google Cloud TTS
  pdf2audio --backend google --voice en-GB-Wavenet-B novel.pdf

  # See what would be narrated (no API key needed)
  pdf2audio --inspect-only novel.pdf

  # Keep the table of contents and the index
  pdf2audio --keep-toc --keep-index reference.pdf

  # List voices of the configured backend
  pdf2audio --list-voices

BACKENDS:
  Name     Default voice      Quota       Credentials
  ───────  ─────────────────  ──────────  ───────────────────
  openai   alloy (tts-1-hd)   50 req/min  OPENAI_API_KEY
  google   en-US-Wavenet-D    100 req/min GOOGLE_TTS_API_KEY

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY        OpenAI API key
  OPENAI_TTS_MODEL      OpenAI speech model (default tts-1-hd)
  OPENAI_TTS_VOICE      OpenAI default voice
  GOOGLE_TTS_API_KEY    Google Cloud Text-to-Speech API key
  GOOGLE_TTS_VOICE      Google default voice
  GOOGLE_TTS_LANGUAGE   Google language code
  PDF2AUDIO_BACKEND     Default backend when several are configured
  PDFIUM_LIB_PATH       Path to libpdfium
  FFMPEG_PATH           Path to the ffmpeg binary

REQUIREMENTS:
  libpdfium for text extraction and ffmpeg (with libmp3lame) for MP3 output.
"#;

/// Turn PDF books into narrated audiobooks.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2audio",
    version,
    about = "Turn PDF books into narrated, chapter-tagged audiobooks",
    long_about = "Extract the text of a PDF book, strip boilerplate pages, split it into chapters \
and narrate it with a text-to-speech service (OpenAI or Google Cloud). Produces one tagged MP3, \
optionally plus one file per chapter.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to narrate.
    #[arg(required_unless_present = "list_voices")]
    input: Option<PathBuf>,

    /// Directory receiving the audio files.
    #[arg(short, long, env = "PDF2AUDIO_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Speech backend: openai or google.
    #[arg(long, env = "PDF2AUDIO_BACKEND")]
    backend: Option<String>,

    /// Voice name (backend-specific).
    #[arg(long, env = "PDF2AUDIO_VOICE")]
    voice: Option<String>,

    /// Speaking rate (0.25–4.0).
    #[arg(long, env = "PDF2AUDIO_SPEED", default_value_t = 1.0)]
    speed: f32,

    /// Maximum characters per synthesis request.
    #[arg(long, env = "PDF2AUDIO_MAX_CHUNK_SIZE", default_value_t = 4000)]
    max_chunk_size: usize,

    /// Silence between chapters, in seconds.
    #[arg(long, env = "PDF2AUDIO_CHAPTER_PAUSE", default_value_t = 2.0)]
    chapter_pause: f64,

    /// MP3 bitrate, e.g. 128k or 192k.
    #[arg(long, env = "PDF2AUDIO_BITRATE", default_value = "192k")]
    bitrate: String,

    /// Genre tag written into the audio files.
    #[arg(long, env = "PDF2AUDIO_GENRE", default_value = "Audiobook")]
    genre: String,

    /// Also write one file per chapter.
    #[arg(long, env = "PDF2AUDIO_SPLIT_CHAPTERS")]
    split_chapters: bool,

    /// Chunks synthesized in parallel.
    #[arg(short, long, env = "PDF2AUDIO_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2AUDIO_PASSWORD")]
    password: Option<String>,

    /// Narrate copyright and publication pages.
    #[arg(long)]
    keep_copyright: bool,

    /// Narrate acknowledgments and dedications.
    #[arg(long)]
    keep_acknowledgments: bool,

    /// Narrate the table of contents.
    #[arg(long)]
    keep_toc: bool,

    /// Narrate indices and bibliographies.
    #[arg(long)]
    keep_index: bool,

    /// Narrate promotional pages ("Praise for…", "Also by…").
    #[arg(long)]
    keep_promotional: bool,

    /// Show pages, chapters and estimated length; synthesize nothing.
    #[arg(long)]
    inspect_only: bool,

    /// List the voices of the selected backend and exit.
    #[arg(long)]
    list_voices: bool,

    /// Print results as JSON.
    #[arg(long, env = "PDF2AUDIO_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2AUDIO_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2AUDIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2AUDIO_QUIET")]
    quiet: bool,
}

impl Cli {
    fn filters(&self) -> FilterConfig {
        FilterConfig {
            skip_copyright: !self.keep_copyright,
            skip_acknowledgments: !self.keep_acknowledgments,
            skip_toc: !self.keep_toc,
            skip_index: !self.keep_index,
            skip_promotional: !self.keep_promotional,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose mode always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only && !cli.list_voices;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── List voices ──────────────────────────────────────────────────────
    if cli.list_voices {
        let backends = BackendRegistry::from_env().context("No speech backend configured")?;
        let entry = backends.resolve(cli.backend.as_deref())?;
        let voices = entry
            .backend
            .list_voices()
            .await
            .with_context(|| format!("Failed to list {} voices", entry.backend.name()))?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&voices)?);
        } else {
            for v in &voices {
                println!(
                    "{:<28} {:<8} {}",
                    v.name,
                    v.language,
                    dim(&v.description)
                );
            }
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input PDF is required")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let extractor = PdfiumExtractor::new(cli.password.clone());
        let report = inspect(&extractor, &input, &cli.filters(), cli.max_chunk_size)
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize inspection")?
            );
        } else {
            print_inspection(&input, &report);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn JobProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let mut settings = ConversionSettings::default()
        .with_speed(cli.speed)
        .with_filters(cli.filters());
    if let Some(ref b) = cli.backend {
        settings = settings.with_backend(b.clone());
    }
    if let Some(ref v) = cli.voice {
        settings = settings.with_voice(v.clone());
    }

    let backends = Arc::new(BackendRegistry::from_env().context("No speech backend configured")?);
    let registry = Arc::new(JobRegistry::new());
    let supervisor = Arc::new(JobSupervisor::new(Arc::clone(&registry), backends, config));

    // ── Run conversion ───────────────────────────────────────────────────
    let id = supervisor
        .enqueue(&input, settings)
        .await
        .context("Failed to open PDF")?;
    let mut task = supervisor.spawn(id);

    let job = tokio::select! {
        res = &mut task => res.context("Conversion task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            // Ctrl-C: raise the flag and let the job wind down.
            let _ = supervisor.cancel(id);
            task.await.context("Conversion task panicked")??
        }
    };

    match job.state {
        JobState::Completed => {
            let output = job.output.context("Completed job has no output")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if !cli.quiet {
                print_summary(&output);
            }
            Ok(())
        }
        JobState::Cancelled => anyhow::bail!("Conversion cancelled"),
        _ => anyhow::bail!(
            "Conversion failed: {}",
            job.error.unwrap_or_else(|| job.message.clone())
        ),
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_chunk_size(cli.max_chunk_size)
        .chapter_pause_secs(cli.chapter_pause)
        .bitrate(cli.bitrate.clone())
        .genre(cli.genre.clone())
        .split_chapters(cli.split_chapters)
        .output_dir(cli.output_dir.clone())
        .synthesis_concurrency(cli.concurrency);
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn print_summary(output: &ConversionOutput) {
    let minutes = output.duration_secs / 60.0;
    eprintln!(
        "{}  {:.1} min  {} chapters  {}ms  →  {}",
        green("✔"),
        minutes,
        output.chapters.len(),
        output.stats.total_duration_ms,
        bold(&output.audio_path.display().to_string()),
    );
    for file in &output.chapter_files {
        eprintln!("   {}", dim(&file.display().to_string()));
    }
    eprintln!(
        "   {} pages kept of {}  /  {} characters via {} ({})",
        output.stats.kept_pages,
        output.stats.total_pages,
        output.stats.characters,
        output.stats.backend,
        output.stats.voice,
    );
}

fn print_inspection(input: &std::path::Path, report: &Inspection) {
    let meta = &report.metadata;
    println!("File:         {}", input.display());
    if let Some(ref t) = meta.title {
        println!("Title:        {}", t);
    }
    if let Some(ref a) = meta.author {
        println!("Author:       {}", a);
    }
    if let Some(year) = meta.year() {
        println!("Year:         {}", year);
    }
    println!("Pages:        {}", meta.page_count);
    println!();

    let dropped: Vec<&PageReport> = report.pages.iter().filter(|p| !p.decision.is_keep()).collect();
    println!("Skipped pages ({}):", dropped.len());
    for p in dropped {
        if let PageDecision::Drop { reason, confidence } = &p.decision {
            println!("  {:>4}  {:<28} {}", p.number, reason, dim(&format!("{confidence:.2}")));
        }
    }
    println!();

    println!("Chapters ({}):", report.sections.len());
    for s in &report.sections {
        println!(
            "  {:<40} pp. {:>3}–{:<3}  {:>6} words  {:>3} chunks  ~{:.0} min",
            s.title,
            s.start_page,
            s.end_page,
            s.word_count,
            s.chunks,
            s.estimated_secs / 60.0
        );
    }
    println!();
    println!(
        "Estimated length: ~{:.0} min in {} chunks",
        report.estimated_duration_secs / 60.0,
        report.total_chunks
    );
}
