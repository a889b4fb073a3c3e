//! Audio assembly: decode chunk audio, join it, and export files.
//!
//! Chunks are decoded to PCM through the active [`AudioCodec`], concatenated
//! in order, and separated by `chapter_pause_secs` of silence wherever the
//! chapter label changes. Chapter markers are computed on the same timeline,
//! so splitting by marker reproduces each chapter exactly.

use crate::codec::{AudioCodec, PcmAudio};
use crate::error::Pdf2AudioError;
use crate::model::{AudioChunk, AudioMetadata, ChapterMarker};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Narration rate used for estimates when audio has not been measured.
pub const WORDS_PER_MINUTE: f64 = 150.0;

/// Format of the audio produced when there was nothing to combine.
pub const EMPTY_SAMPLE_RATE: u32 = 24_000;

/// The combined book audio and where each chapter sits in it.
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    pub pcm: PcmAudio,
    /// One marker per run of chunks sharing a chapter label. Pauses belong
    /// to the gap between markers.
    pub chapters: Vec<ChapterMarker>,
    /// Decoded length of each chunk, in input order.
    pub chunk_durations: Vec<f64>,
}

impl AssembledAudio {
    pub fn duration_secs(&self) -> f64 {
        self.pcm.duration_secs()
    }
}

/// Rough narration length of `text` at [`WORDS_PER_MINUTE`].
pub fn estimate_duration_secs(text: &str) -> f64 {
    crate::model::count_words(text) as f64 / WORDS_PER_MINUTE * 60.0
}

/// Decode and concatenate `chunks`, inserting a pause at chapter changes.
///
/// Fills in each chunk's `duration_secs` from its decoded audio. No chunks
/// gives zero-length audio at [`EMPTY_SAMPLE_RATE`] and no chapters.
pub async fn combine(
    codec: &dyn AudioCodec,
    chunks: &mut [AudioChunk],
    pause_secs: f64,
) -> Result<AssembledAudio, Pdf2AudioError> {
    let mut pcm: Option<PcmAudio> = None;
    let mut chapters: Vec<ChapterMarker> = Vec::new();
    let mut chunk_durations = Vec::with_capacity(chunks.len());

    for i in 0..chunks.len() {
        let decoded = codec.decode(&chunks[i].audio).await?;
        let secs = decoded.duration_secs();
        chunks[i].duration_secs = Some(secs);
        chunk_durations.push(secs);

        let out = pcm.get_or_insert_with(|| PcmAudio::empty(decoded.sample_rate, decoded.channels));
        let start = out.duration_secs();
        out.append(&decoded)?;
        let end = out.duration_secs();

        let continues = i > 0 && chunks[i - 1].chapter == chunks[i].chapter;
        match chapters.last_mut() {
            Some(marker) if continues => marker.end_secs = end,
            _ => chapters.push(ChapterMarker {
                title: chunks[i].chapter.clone(),
                start_secs: start,
                end_secs: end,
            }),
        }

        let boundary = chunks
            .get(i + 1)
            .is_some_and(|next| next.chapter != chunks[i].chapter);
        if boundary && pause_secs > 0.0 {
            out.append(&PcmAudio::silence(out.sample_rate, out.channels, pause_secs))?;
        }
    }

    let pcm = pcm.unwrap_or_else(|| PcmAudio::empty(EMPTY_SAMPLE_RATE, 1));
    info!(
        "Combined {} chunks into {:.1}s across {} chapters",
        chunks.len(),
        pcm.duration_secs(),
        chapters.len()
    );
    Ok(AssembledAudio {
        pcm,
        chapters,
        chunk_durations,
    })
}

/// Encode `pcm` to `path` with `tags`, creating parent directories.
pub async fn export(
    codec: &dyn AudioCodec,
    pcm: &PcmAudio,
    path: &Path,
    tags: &AudioMetadata,
    bitrate: &str,
) -> Result<(), Pdf2AudioError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Pdf2AudioError::ExportFailed {
                path: path.to_path_buf(),
                detail: format!("cannot create {}: {e}", parent.display()),
            })?;
    }
    codec.encode(pcm, path, bitrate, tags).await?;
    info!("Exported {}", path.display());
    Ok(())
}

/// File name for chapter `number` (1-based) of `base`.
pub fn chapter_file_name(base: &str, number: usize, extension: &str) -> String {
    format!("{base}_chapter_{number:02}.{extension}")
}

/// Write one file per chapter marker into `dir`.
///
/// Each file carries the book tags with the chapter title and a
/// `track/total` number.
pub async fn split_by_chapters(
    codec: &dyn AudioCodec,
    pcm: &PcmAudio,
    chapters: &[ChapterMarker],
    dir: &Path,
    base: &str,
    tags: &AudioMetadata,
    bitrate: &str,
) -> Result<Vec<PathBuf>, Pdf2AudioError> {
    let total = chapters.len();
    let mut files = Vec::with_capacity(total);
    for (i, marker) in chapters.iter().enumerate() {
        let path = dir.join(chapter_file_name(base, i + 1, codec.extension()));
        let slice = pcm.slice_secs(marker.start_secs, marker.end_secs);
        debug!(
            "Chapter {}/{} '{}': {:.1}s",
            i + 1,
            total,
            marker.title,
            slice.duration_secs()
        );
        export(codec, &slice, &path, &tags.for_chapter(&marker.title, i + 1, total), bitrate).await?;
        files.push(path);
    }
    Ok(files)
}
