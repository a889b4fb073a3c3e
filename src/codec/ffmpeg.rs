//! MP3 codec driving the `ffmpeg` binary.
//!
//! Decoding pipes backend bytes through ffmpeg to fixed-format s16le PCM, so
//! every chunk comes back at the same rate and channel count whatever the
//! backend produced. Encoding pipes PCM back in and writes MP3 via
//! `libmp3lame`, carrying ID3 tags as `-metadata` pairs.
//!
//! The binary is `$FFMPEG_PATH` if set, otherwise `ffmpeg` on `PATH`.

use super::{commit, export_error, temp_path_for, AudioCodec, PcmAudio};
use crate::error::Pdf2AudioError;
use crate::model::AudioMetadata;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// 24 kHz mono matches what the speech services return.
const DEFAULT_SAMPLE_RATE: u32 = 24_000;
const DEFAULT_CHANNELS: u16 = 1;

#[derive(Debug, Clone)]
pub struct FfmpegCodec {
    binary: String,
    sample_rate: u32,
    channels: u16,
}

impl Default for FfmpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCodec {
    pub fn new() -> Self {
        let binary = std::env::var("FFMPEG_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "ffmpeg".to_string());
        Self {
            binary,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
        }
    }

    /// PCM layout every decoded chunk is resampled to.
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels.max(1);
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Whether the ffmpeg binary can be executed.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Run ffmpeg with `input` on stdin, returning stdout.
    async fn pipe(&self, args: &[String], input: Vec<u8>) -> Result<Vec<u8>, String> {
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("could not start '{}': {e}", self.binary))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| "ffmpeg stdin unavailable".to_string())?;
        // Feed stdin concurrently so a full stdout pipe cannot deadlock us.
        let writer = tokio::spawn(async move {
            let res = stdin.write_all(&input).await;
            drop(stdin);
            res
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("ffmpeg did not finish: {e}"))?;
        let written = writer
            .await
            .map_err(|e| format!("stdin task panicked: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("ffmpeg exited with {}: {}", output.status, stderr.trim()));
        }
        written.map_err(|e| format!("writing to ffmpeg failed: {e}"))?;
        Ok(output.stdout)
    }

    fn decode_args(&self) -> Vec<String> {
        let rate = self.sample_rate.to_string();
        let channels = self.channels.to_string();
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-i",
            "pipe:0",
            "-f",
            "s16le",
            "-acodec",
            "pcm_s16le",
            "-ar",
            rate.as_str(),
            "-ac",
            channels.as_str(),
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn encode_args(pcm: &PcmAudio, out: &Path, bitrate: &str, tags: &AudioMetadata) -> Vec<String> {
        let rate = pcm.sample_rate.to_string();
        let channels = pcm.channels.to_string();
        let mut args: Vec<String> = [
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "s16le",
            "-ar",
            rate.as_str(),
            "-ac",
            channels.as_str(),
            "-i",
            "pipe:0",
            "-codec:a",
            "libmp3lame",
            "-b:a",
            bitrate,
            "-id3v2_version",
            "3",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for (key, value) in metadata_pairs(tags) {
            args.push("-metadata".into());
            args.push(format!("{key}={value}"));
        }

        args.push("-f".into());
        args.push("mp3".into());
        args.push(out.to_string_lossy().into_owned());
        args
    }
}

/// Tag pairs in the order ffmpeg receives them.
fn metadata_pairs(tags: &AudioMetadata) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("title", tags.title.clone()),
        ("artist", tags.author.clone()),
        ("album", tags.album.clone()),
        ("genre", tags.genre.clone()),
    ];
    if let Some(year) = &tags.year {
        pairs.push(("date", year.clone()));
    }
    match (tags.track_number, tags.total_tracks) {
        (Some(n), Some(total)) => pairs.push(("track", format!("{n}/{total}"))),
        (Some(n), None) => pairs.push(("track", n.to_string())),
        _ => {}
    }
    if let Some(desc) = &tags.description {
        pairs.push(("comment", desc.clone()));
    }
    pairs
}

fn samples_from_le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn samples_to_le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[async_trait]
impl AudioCodec for FfmpegCodec {
    fn extension(&self) -> &str {
        "mp3"
    }

    async fn decode(&self, bytes: &[u8]) -> Result<PcmAudio, Pdf2AudioError> {
        let raw = self
            .pipe(&self.decode_args(), bytes.to_vec())
            .await
            .map_err(|e| Pdf2AudioError::AssemblyFailed(format!("decode: {e}")))?;
        let pcm = PcmAudio {
            sample_rate: self.sample_rate,
            channels: self.channels,
            samples: samples_from_le(&raw),
        };
        debug!("Decoded {} bytes → {:.2}s PCM", bytes.len(), pcm.duration_secs());
        Ok(pcm)
    }

    async fn encode(
        &self,
        pcm: &PcmAudio,
        path: &Path,
        bitrate: &str,
        tags: &AudioMetadata,
    ) -> Result<(), Pdf2AudioError> {
        let tmp = temp_path_for(path);
        let args = Self::encode_args(pcm, &tmp, bitrate, tags);
        if let Err(e) = self.pipe(&args, samples_to_le(&pcm.samples)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(export_error(path, e));
        }
        commit(&tmp, path).await?;
        debug!("Encoded {:.1}s → {}", pcm.duration_secs(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> AudioMetadata {
        AudioMetadata {
            title: "Chapter 2".into(),
            author: "Ann Author".into(),
            album: "The Book".into(),
            year: Some("2019".into()),
            genre: "Audiobook".into(),
            track_number: Some(2),
            total_tracks: Some(9),
            description: Some("A story".into()),
        }
    }

    #[test]
    fn metadata_pairs_include_track_of_total() {
        let pairs = metadata_pairs(&tags());
        assert!(pairs.contains(&("track", "2/9".to_string())));
        assert!(pairs.contains(&("date", "2019".to_string())));
        assert!(pairs.contains(&("artist", "Ann Author".to_string())));
        assert!(pairs.contains(&("comment", "A story".to_string())));
    }

    #[test]
    fn metadata_pairs_skip_missing_fields() {
        let mut t = tags();
        t.year = None;
        t.track_number = None;
        t.description = None;
        let keys: Vec<&str> = metadata_pairs(&t).iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["title", "artist", "album", "genre"]);
    }

    #[test]
    fn encode_args_force_mp3_container() {
        let pcm = PcmAudio::silence(24_000, 1, 0.1);
        let args = FfmpegCodec::encode_args(&pcm, Path::new("/tmp/x.mp3.part"), "128k", &tags());
        let joined = args.join(" ");
        assert!(joined.contains("-b:a 128k"));
        assert!(joined.contains("-codec:a libmp3lame"));
        assert!(joined.ends_with("-f mp3 /tmp/x.mp3.part"));
        assert!(args.contains(&"title=Chapter 2".to_string()));
    }

    #[test]
    fn decode_args_pin_output_format() {
        let codec = FfmpegCodec::new().with_format(16_000, 2);
        let joined = codec.decode_args().join(" ");
        assert!(joined.contains("-ar 16000"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.ends_with("pipe:1"));
    }

    #[test]
    fn pcm_byte_conversion_is_little_endian() {
        let samples = vec![1i16, -2, i16::MAX];
        let bytes = samples_to_le(&samples);
        assert_eq!(&bytes[..2], &[1, 0]);
        assert_eq!(samples_from_le(&bytes), samples);
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let codec = FfmpegCodec::new().with_binary("/nonexistent/ffmpeg-binary");
        assert!(!codec.is_available().await);
        let err = codec.decode(b"whatever").await.unwrap_err();
        assert!(err.to_string().contains("could not start"));
    }
}
