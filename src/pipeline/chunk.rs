//! Text chunking: split section text into pieces a speech API accepts.
//!
//! Packing is greedy. Whole sentences are preferred; a sentence that cannot
//! fit in any chunk is packed word by word, and a single word longer than
//! the limit becomes a chunk of its own. Lengths are counted in characters,
//! not bytes, because that is what speech APIs limit.

use crate::model::{Section, TextChunk};

/// Split into sentences. A sentence ends at a word whose last character is
/// `.`, `!` or `?`; the terminator stays with its sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        current.push(word);
        if word.ends_with(['.', '!', '?']) {
            sentences.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        sentences.push(current.join(" "));
    }
    sentences
}

struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    /// Append `piece` if the chunk stays within bounds.
    fn try_push(&mut self, piece: &str, len: usize) -> bool {
        let needed = if self.current_len == 0 {
            len
        } else {
            self.current_len + 1 + len
        };
        if needed > self.max {
            return false;
        }
        if self.current_len > 0 {
            self.current.push(' ');
        }
        self.current.push_str(piece);
        self.current_len = needed;
        true
    }

    fn flush(&mut self) {
        if self.current_len > 0 {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current_len = 0;
        }
    }

    fn push_words(&mut self, sentence: &str) {
        for word in sentence.split(' ') {
            let len = word.chars().count();
            if self.try_push(word, len) {
                continue;
            }
            self.flush();
            if !self.try_push(word, len) {
                self.chunks.push(word.to_string());
            }
        }
    }
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// The only chunks that may exceed the bound are single words longer than
/// it. Joining the chunks with single spaces reproduces the input with its
/// whitespace normalised.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    let mut packer = Packer::new(max);

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if packer.try_push(&sentence, len) {
            continue;
        }
        packer.flush();
        if len <= max {
            packer.try_push(&sentence, len);
        } else {
            packer.push_words(&sentence);
        }
    }

    packer.flush();
    packer.chunks
}

/// Chunk every section, numbering chunks across the whole book.
pub fn chunk_sections(sections: &[Section], max_chars: usize) -> Vec<TextChunk> {
    let mut out = Vec::new();
    for section in sections {
        for text in chunk_text(&section.content, max_chars) {
            out.push(TextChunk {
                index: out.len(),
                chapter: section.title.clone(),
                text,
            });
        }
    }
    out
}
