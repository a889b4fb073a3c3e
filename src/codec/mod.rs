//! Audio codecs: decode backend output to PCM, encode PCM to files.
//!
//! Assembly works on raw 16-bit PCM so concatenation, silence and chapter
//! slicing are exact sample arithmetic. Codecs sit at the two edges:
//!
//! ```text
//! backend bytes ──decode──▶ PcmAudio ──combine/slice──▶ PcmAudio ──encode──▶ file
//! ```
//!
//! - [`FfmpegCodec`]: any input ffmpeg understands → MP3 with ID3 tags
//! - [`WavCodec`]: WAV in, WAV out, pure Rust via `hound`

pub mod ffmpeg;
pub mod wav;

pub use ffmpeg::FfmpegCodec;
pub use wav::WavCodec;

use crate::error::Pdf2AudioError;
use crate::model::AudioMetadata;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Interleaved signed 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl PcmAudio {
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            samples: Vec::new(),
        }
    }

    /// `secs` of digital silence, rounded to whole frames.
    pub fn silence(sample_rate: u32, channels: u16, secs: f64) -> Self {
        let frames = (secs.max(0.0) * sample_rate as f64).round() as usize;
        Self {
            sample_rate,
            channels,
            samples: vec![0; frames * channels.max(1) as usize],
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn same_format(&self, other: &PcmAudio) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Append `other`; formats must match.
    pub fn append(&mut self, other: &PcmAudio) -> Result<(), Pdf2AudioError> {
        if !self.same_format(other) {
            return Err(Pdf2AudioError::AssemblyFailed(format!(
                "format mismatch: {} Hz/{} ch vs {} Hz/{} ch",
                self.sample_rate, self.channels, other.sample_rate, other.channels
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Frame-aligned copy of `[start, end)` seconds, clamped to the buffer.
    pub fn slice_secs(&self, start: f64, end: f64) -> PcmAudio {
        let ch = self.channels.max(1) as usize;
        let to_frame = |t: f64| ((t.max(0.0) * self.sample_rate as f64).round() as usize).min(self.frames());
        let (a, b) = (to_frame(start), to_frame(end));
        let samples = if a < b {
            self.samples[a * ch..b * ch].to_vec()
        } else {
            Vec::new()
        };
        PcmAudio {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples,
        }
    }
}

/// Converts between backend/container bytes and PCM.
#[async_trait]
pub trait AudioCodec: Send + Sync + Debug {
    /// File extension for encoded output, without the dot.
    fn extension(&self) -> &str;

    async fn decode(&self, bytes: &[u8]) -> Result<PcmAudio, Pdf2AudioError>;

    /// Encode to `path`. Implementations write atomically.
    async fn encode(
        &self,
        pcm: &PcmAudio,
        path: &Path,
        bitrate: &str,
        tags: &AudioMetadata,
    ) -> Result<(), Pdf2AudioError>;
}

/// Sibling temp path used for atomic writes.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

pub(crate) fn export_error(path: &Path, detail: impl std::fmt::Display) -> Pdf2AudioError {
    Pdf2AudioError::ExportFailed {
        path: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Rename a finished temp file into place, removing it on failure.
pub(crate) async fn commit(tmp: &Path, path: &Path) -> Result<(), Pdf2AudioError> {
    if let Err(e) = tokio::fs::rename(tmp, path).await {
        let _ = tokio::fs::remove_file(tmp).await;
        return Err(export_error(path, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_length_is_exact() {
        let s = PcmAudio::silence(8000, 2, 1.5);
        assert_eq!(s.frames(), 12000);
        assert_eq!(s.samples.len(), 24000);
        assert_eq!(s.duration_secs(), 1.5);
    }

    #[test]
    fn append_rejects_format_mismatch() {
        let mut a = PcmAudio::silence(8000, 1, 1.0);
        let b = PcmAudio::silence(16000, 1, 1.0);
        assert!(matches!(a.append(&b), Err(Pdf2AudioError::AssemblyFailed(_))));
    }

    #[test]
    fn append_adds_durations() {
        let mut a = PcmAudio::silence(8000, 1, 1.0);
        a.append(&PcmAudio::silence(8000, 1, 0.25)).unwrap();
        assert_eq!(a.duration_secs(), 1.25);
    }

    #[test]
    fn slice_is_frame_aligned_and_clamped() {
        let pcm = PcmAudio {
            sample_rate: 4,
            channels: 2,
            samples: (0..16).collect(),
        };
        let s = pcm.slice_secs(0.5, 1.0);
        assert_eq!(s.samples, vec![4, 5, 6, 7]);
        let tail = pcm.slice_secs(1.5, 99.0);
        assert_eq!(tail.samples, vec![12, 13, 14, 15]);
        assert!(pcm.slice_secs(3.0, 1.0).is_empty());
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let p = temp_path_for(Path::new("/out/book.mp3"));
        assert_eq!(p, PathBuf::from("/out/book.mp3.part"));
    }
}
