//! WAV codec backed by `hound`.
//!
//! Needs no external tools. WAV has no standard slot for ID3-style tags, so
//! metadata is not written.

use super::{commit, export_error, temp_path_for, AudioCodec, PcmAudio};
use crate::error::Pdf2AudioError;
use crate::model::AudioMetadata;
use async_trait::async_trait;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct WavCodec;

impl WavCodec {
    /// Encode PCM into an in-memory WAV file.
    pub fn to_bytes(pcm: &PcmAudio) -> Result<Vec<u8>, Pdf2AudioError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec_for(pcm))
                .map_err(|e| Pdf2AudioError::Internal(format!("wav header: {e}")))?;
            for s in &pcm.samples {
                writer
                    .write_sample(*s)
                    .map_err(|e| Pdf2AudioError::Internal(format!("wav write: {e}")))?;
            }
            writer
                .finalize()
                .map_err(|e| Pdf2AudioError::Internal(format!("wav finalize: {e}")))?;
        }
        Ok(cursor.into_inner())
    }

    fn read(bytes: &[u8]) -> Result<PcmAudio, hound::Error> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, bits) if bits <= 16 => {
                reader.into_samples::<i16>().collect::<Result<_, _>>()?
            }
            (hound::SampleFormat::Int, bits) => {
                let shift = bits.saturating_sub(16);
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<Result<_, _>>()?
            }
            (hound::SampleFormat::Float, _) => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>()?,
        };
        Ok(PcmAudio {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

fn spec_for(pcm: &PcmAudio) -> hound::WavSpec {
    hound::WavSpec {
        channels: pcm.channels,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

#[async_trait]
impl AudioCodec for WavCodec {
    fn extension(&self) -> &str {
        "wav"
    }

    async fn decode(&self, bytes: &[u8]) -> Result<PcmAudio, Pdf2AudioError> {
        Self::read(bytes).map_err(|e| Pdf2AudioError::AssemblyFailed(format!("invalid WAV data: {e}")))
    }

    async fn encode(
        &self,
        pcm: &PcmAudio,
        path: &Path,
        _bitrate: &str,
        tags: &AudioMetadata,
    ) -> Result<(), Pdf2AudioError> {
        debug!("Writing WAV '{}' ({:.1}s)", tags.title, pcm.duration_secs());
        let bytes = Self::to_bytes(pcm).map_err(|e| export_error(path, e))?;
        let tmp = temp_path_for(path);
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| export_error(path, e))?;
        commit(&tmp, path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(rate: u32, channels: u16, frames: usize) -> PcmAudio {
        PcmAudio {
            sample_rate: rate,
            channels,
            samples: (0..frames * channels as usize)
                .map(|i| ((i % 200) as i16 - 100) * 50)
                .collect(),
        }
    }

    #[tokio::test]
    async fn decode_reads_what_to_bytes_wrote() {
        let pcm = tone(22050, 1, 2205);
        let bytes = WavCodec::to_bytes(&pcm).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        let back = WavCodec.decode(&bytes).await.unwrap();
        assert_eq!(back, pcm);
    }

    #[tokio::test]
    async fn decode_rejects_garbage() {
        let err = WavCodec.decode(b"ID3\x03 definitely mp3").await.unwrap_err();
        assert!(matches!(err, Pdf2AudioError::AssemblyFailed(_)));
    }

    #[tokio::test]
    async fn encode_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.wav");
        let tags = AudioMetadata {
            title: "Book".into(),
            author: "A".into(),
            album: "Book".into(),
            year: None,
            genre: "Audiobook".into(),
            track_number: None,
            total_tracks: None,
            description: None,
        };
        WavCodec
            .encode(&tone(8000, 2, 800), &path, "192k", &tags)
            .await
            .unwrap();
        assert!(path.exists());
        assert!(!temp_path_for(&path).exists());
        let back = WavCodec.decode(&std::fs::read(&path).unwrap()).await.unwrap();
        assert_eq!(back.duration_secs(), 0.1);
    }
}
