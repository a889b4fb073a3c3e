//! Shared fixtures: a scripted speech backend and book builders.

#![allow(dead_code)]

use async_trait::async_trait;
use edgequake_pdf2audio::{
    BackendError, BackendRegistry, DocumentMetadata, PcmAudio, PreparedExtractor, SpeechBackend, SpeechRequest,
    Voice, WavCodec,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const RATE: u32 = 8000;

/// Backend that answers every request with `clip_secs` of silence.
///
/// Requests whose text contains `fail_when` fail that many times first;
/// `always_fail` makes every request fail.
#[derive(Debug, Default)]
pub struct Scripted {
    pub clip_secs: f64,
    pub fail_when: Option<(String, u32)>,
    pub always_fail: bool,
    pub delay: Option<Duration>,
    pub requests: Mutex<Vec<SpeechRequest>>,
    failed: Mutex<u32>,
}

impl Scripted {
    pub fn new(clip_secs: f64) -> Self {
        Self {
            clip_secs,
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, needle: &str, times: u32) -> Self {
        self.fail_when = Some((needle.to_string(), times));
        self
    }

    pub fn broken(mut self) -> Self {
        self.always_fail = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn unavailable(&self) -> BackendError {
        BackendError::Api {
            backend: "scripted".into(),
            status: 503,
            message: "service unavailable".into(),
        }
    }
}

#[async_trait]
impl SpeechBackend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_voice(&self) -> &str {
        "narrator"
    }

    fn language(&self) -> &str {
        "en-US"
    }

    fn requests_per_minute(&self) -> usize {
        1000
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError> {
        self.requests.lock().push(request.clone());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.always_fail {
            return Err(self.unavailable());
        }
        if let Some((needle, times)) = &self.fail_when {
            if request.text.contains(needle.as_str()) {
                let mut failed = self.failed.lock();
                if *failed < *times {
                    *failed += 1;
                    return Err(self.unavailable());
                }
            }
        }
        WavCodec::to_bytes(&PcmAudio::silence(RATE, 1, self.clip_secs)).map_err(|e| BackendError::Decode {
            backend: "scripted".into(),
            detail: e.to_string(),
        })
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, BackendError> {
        Ok(vec![Voice {
            name: "narrator".into(),
            description: "Scripted narrator".into(),
            language: "en-US".into(),
            gender: None,
        }])
    }

    fn validate_config(&self) -> bool {
        true
    }
}

pub fn registry_with(backend: Arc<Scripted>) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(backend);
    registry
}

/// `words` words of sentence-punctuated filler.
pub fn prose(words: usize) -> String {
    (0..words)
        .map(|i| if i % 12 == 11 { "story." } else { "story" })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn chapter_page(number: usize, title: &str, words: usize) -> String {
    format!("Chapter {number}\n{title}\n{}", prose(words))
}

pub fn copyright_page() -> String {
    format!(
        "Copyright 2024 Jane Doe. All rights reserved. ISBN 978-0-00-000000-0. \
         First published in 2024 by Example Press.\n{}",
        prose(50)
    )
}

/// Thirty words of thanks under an acknowledgments heading.
pub fn acknowledgments_page() -> String {
    "Acknowledgments\nI owe thanks to everyone who helped along the way, my editor, my family, \
     my friends, and the readers who waited so patiently for this book to finally arrive."
        .to_string()
}

/// Narrative pages with no chapter heading anywhere.
pub fn headingless_book() -> PreparedExtractor {
    PreparedExtractor::from_texts(book_metadata(), [prose(300), prose(300)])
}

pub fn book_metadata() -> DocumentMetadata {
    DocumentMetadata {
        title: Some("The Long Road".into()),
        author: Some("Jane Doe".into()),
        creation_date: Some("D:20240101000000".into()),
        ..Default::default()
    }
}

/// Two chapters with a short filler page between them.
pub fn two_chapter_book() -> PreparedExtractor {
    PreparedExtractor::from_texts(
        book_metadata(),
        [
            chapter_page(1, "Beginnings", 200),
            "Page two is short".to_string(),
            chapter_page(2, "Endings", 200),
        ],
    )
}
