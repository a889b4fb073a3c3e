//! Data carried between pipeline stages.
//!
//! Every value here flows forward only: pages become sections, sections
//! become chunks, chunks become audio. No stage reaches back to mutate an
//! earlier stage's output.

use serde::{Deserialize, Serialize};

/// Document-level metadata read from the PDF info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    /// Raw PDF date string, e.g. `D:20200131120000Z`.
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
}

impl DocumentMetadata {
    /// Four-digit year from the creation date, if it has one.
    ///
    /// Accepts both the PDF form (`D:2020…`) and plain ISO dates (`2020-…`).
    pub fn year(&self) -> Option<String> {
        let raw = self.creation_date.as_deref()?.trim();
        let raw = raw.strip_prefix("D:").unwrap_or(raw);
        let year: String = raw.chars().take(4).collect();
        if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
            Some(year)
        } else {
            None
        }
    }
}

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub number: usize,
    pub text: String,
    pub word_count: usize,
    pub has_images: bool,
    /// Distinct font sizes seen on the page, ascending.
    pub font_sizes: Vec<f32>,
}

impl Page {
    /// Build a text-only page; `word_count` is derived from `text`.
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let word_count = count_words(&text);
        Self {
            number,
            text,
            word_count,
            has_images: false,
            font_sizes: Vec::new(),
        }
    }
}

/// Whitespace-delimited token count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Where a section sits in the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    #[default]
    Chapter,
    FrontMatter,
    BackMatter,
}

/// A contiguous page range under one heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    /// First page, inclusive.
    pub start_page: usize,
    /// Last page, inclusive.
    pub end_page: usize,
    pub content: String,
    pub kind: SectionKind,
}

impl Section {
    pub fn word_count(&self) -> usize {
        count_words(&self.content)
    }
}

/// A bounded piece of narration text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    /// Title of the section this chunk belongs to.
    pub chapter: String,
    /// Global position across the whole book.
    pub index: usize,
}

/// Synthesized audio for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Encoded bytes as returned by the speech backend.
    pub audio: Vec<u8>,
    pub text: String,
    pub chapter: String,
    pub index: usize,
    /// Measured length, filled in once the chunk has been decoded.
    pub duration_secs: Option<f64>,
}

/// Tags written into exported audio files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub title: String,
    pub author: String,
    pub album: String,
    pub year: Option<String>,
    pub genre: String,
    pub track_number: Option<usize>,
    pub total_tracks: Option<usize>,
    pub description: Option<String>,
}

impl AudioMetadata {
    /// Tags for a whole-book file.
    pub fn from_document(doc: &DocumentMetadata, genre: &str) -> Self {
        let title = doc
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Unknown Title".to_string());
        let author = doc
            .author
            .clone()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| "Unknown Author".to_string());
        Self {
            album: title.clone(),
            title,
            author,
            year: doc.year(),
            genre: genre.to_string(),
            track_number: None,
            total_tracks: None,
            description: doc.subject.clone(),
        }
    }

    /// Tags for one chapter file out of `total`.
    pub fn for_chapter(&self, title: &str, track: usize, total: usize) -> Self {
        Self {
            title: title.to_string(),
            track_number: Some(track),
            total_tracks: Some(total),
            ..self.clone()
        }
    }
}

/// Where a chapter lives inside the assembled audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterMarker {
    pub title: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl ChapterMarker {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}
