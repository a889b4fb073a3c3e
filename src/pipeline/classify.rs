//! Content classification: decide which pages and sections get narrated.
//!
//! Books open and close with material nobody wants read aloud: copyright
//! notices, dedications, tables of contents, indices, blurbs. Each category
//! is recognised by keyword density or line-pattern density; the first rule
//! that fires decides the page.
//!
//! The classifier is total. Any page it cannot score is kept.

use crate::config::FilterConfig;
use crate::model::{count_words, Page, Section};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of classifying one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PageDecision {
    Keep,
    Drop { reason: String, confidence: f64 },
}

impl PageDecision {
    pub fn is_keep(&self) -> bool {
        matches!(self, PageDecision::Keep)
    }

    fn drop(reason: &str, confidence: f64) -> Self {
        PageDecision::Drop {
            reason: reason.to_string(),
            confidence,
        }
    }
}

/// Pages shorter than this carry no narration.
const MIN_PAGE_WORDS: usize = 50;
/// Sections shorter than this are stubs.
const MIN_SECTION_WORDS: usize = 100;
/// Positional rule applies to the first pages only.
const FRONT_PAGES: usize = 5;

const COPYRIGHT_KEYWORDS: &[&str] = &[
    "copyright",
    "published",
    "isbn",
    "edition",
    "printing",
    "publisher",
    "all rights reserved",
    "no part of this publication",
    "library of congress",
    "cataloging-in-publication",
    "printed in",
    "first published",
];

const ACKNOWLEDGMENT_KEYWORDS: &[&str] = &[
    "acknowledgment",
    "acknowledgement",
    "thanks to",
    "grateful to",
    "dedication",
    "dedicated to",
    "in memory of",
    "special thanks",
    "would like to thank",
    "gratitude",
    "appreciation",
];

const INDEX_KEYWORDS: &[&str] = &[
    "index",
    "bibliography",
    "references",
    "works cited",
    "further reading",
    "suggested reading",
    "notes",
    "endnotes",
    "footnotes",
];

const PROMOTIONAL_KEYWORDS: &[&str] = &[
    "praise for",
    "reviews",
    "also by",
    "about the author",
    "other books",
    "from the reviews",
    "acclaim for",
    "what readers are saying",
    "testimonials",
    "endorsements",
];

const FRONT_MATTER_KEYWORDS: &[&str] = &["copyright", "published", "isbn", "edition"];

fn keyword_regexes(keywords: &[&str]) -> Vec<Regex> {
    keywords
        .iter()
        .map(|kw| Regex::new(&format!(r"\b{}\b", regex::escape(kw))).unwrap())
        .collect()
}

static RE_COPYRIGHT: Lazy<Vec<Regex>> = Lazy::new(|| keyword_regexes(COPYRIGHT_KEYWORDS));
static RE_ACKNOWLEDGMENT: Lazy<Vec<Regex>> = Lazy::new(|| keyword_regexes(ACKNOWLEDGMENT_KEYWORDS));
static RE_INDEX: Lazy<Vec<Regex>> = Lazy::new(|| keyword_regexes(INDEX_KEYWORDS));
static RE_PROMOTIONAL: Lazy<Vec<Regex>> = Lazy::new(|| keyword_regexes(PROMOTIONAL_KEYWORDS));
static RE_FRONT_MATTER: Lazy<Vec<Regex>> = Lazy::new(|| keyword_regexes(FRONT_MATTER_KEYWORDS));

static RE_TOC_LINES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)chapter\s+\d+.*\d+$",
        r"(?i)part\s+[ivx]+.*\d+$",
        r"(?i)^\d+\s+[a-z].*\d+$",
        r"\.{3,}",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Keyword density in `[0, 1]`: matches per hundred words, capped.
///
/// Matching is whole-word and case-insensitive; phrases count once per
/// occurrence. Empty text scores zero.
pub fn keyword_score(text: &str, keywords: &[Regex]) -> f64 {
    let words = count_words(text);
    if words == 0 {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let matches: usize = keywords.iter().map(|re| re.find_iter(&lower).count()).sum();
    (matches as f64 / (words as f64 / 100.0)).min(1.0)
}

/// Share of lines shaped like table-of-contents entries, doubled, capped at 1.
pub fn toc_score(text: &str) -> f64 {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.is_empty() {
        return 0.0;
    }
    let hits = lines
        .iter()
        .filter(|line| RE_TOC_LINES.iter().any(|re| re.is_match(line)))
        .count();
    (hits as f64 / lines.len() as f64 * 2.0).min(1.0)
}

pub fn copyright_score(text: &str) -> f64 {
    keyword_score(text, &RE_COPYRIGHT)
}

pub fn acknowledgment_score(text: &str) -> f64 {
    keyword_score(text, &RE_ACKNOWLEDGMENT)
}

pub fn index_score(text: &str) -> f64 {
    keyword_score(text, &RE_INDEX)
}

pub fn promotional_score(text: &str) -> f64 {
    keyword_score(text, &RE_PROMOTIONAL)
}

/// Classify one page. Rules are tried in order; the first that fires wins.
pub fn analyze_page(page: &Page, filters: &FilterConfig) -> PageDecision {
    let text = page.text.as_str();

    // ── Rule 1: too short to narrate ─────────────────────────────────────
    if page.word_count < MIN_PAGE_WORDS {
        return PageDecision::drop("Too few words", 0.9);
    }

    // ── Rule 2: copyright / publication info ─────────────────────────────
    if filters.skip_copyright {
        let score = copyright_score(text);
        if score > 0.3 {
            return PageDecision::drop("Copyright/publication page", score);
        }
    }

    // ── Rule 3: acknowledgments / dedication ─────────────────────────────
    if filters.skip_acknowledgments {
        let score = acknowledgment_score(text);
        if score > 0.2 {
            return PageDecision::drop("Acknowledgments/dedication", score);
        }
    }

    // ── Rule 4: table of contents ────────────────────────────────────────
    if filters.skip_toc {
        let score = toc_score(text);
        if score > 0.4 {
            return PageDecision::drop("Table of contents", score);
        }
    }

    // ── Rule 5: index / bibliography ─────────────────────────────────────
    if filters.skip_index {
        let score = index_score(text);
        if score > 0.3 {
            return PageDecision::drop("Index/bibliography", score);
        }
    }

    // ── Rule 6: promotional ──────────────────────────────────────────────
    if filters.skip_promotional {
        let score = promotional_score(text);
        if score > 0.3 {
            return PageDecision::drop("Promotional content", score);
        }
    }

    // ── Rule 7: metadata-ish page near the front ─────────────────────────
    if page.number <= FRONT_PAGES {
        let score = (keyword_score(text, &RE_FRONT_MATTER) * 2.0).min(1.0);
        if score > 0.7 {
            return PageDecision::drop("Likely metadata page", score);
        }
    }

    PageDecision::Keep
}

/// Keep the narratable pages, in order.
pub fn filter_pages(pages: &[Page], filters: &FilterConfig) -> Vec<Page> {
    let mut kept = Vec::with_capacity(pages.len());
    for page in pages {
        match analyze_page(page, filters) {
            PageDecision::Keep => kept.push(page.clone()),
            PageDecision::Drop { reason, confidence } => {
                info!(
                    "Skipping page {}: {} (confidence {:.2})",
                    page.number, reason, confidence
                );
            }
        }
    }
    info!("Kept {}/{} pages", kept.len(), pages.len());
    kept
}

/// Whether a whole section should be narrated.
pub fn should_keep_section(section: &Section, filters: &FilterConfig) -> bool {
    let title = section.title.to_lowercase();

    let mut banned: Vec<&str> = Vec::new();
    if filters.skip_acknowledgments {
        banned.extend(["acknowledgment", "dedication", "thanks"]);
    }
    if filters.skip_toc {
        banned.extend(["contents", "table of contents"]);
    }
    if filters.skip_index {
        banned.extend(["index", "bibliography", "references"]);
    }

    if let Some(hit) = banned.iter().find(|b| title.contains(*b)) {
        debug!("Dropping section '{}': title matches '{}'", section.title, hit);
        return false;
    }

    let words = section.word_count();
    if words < MIN_SECTION_WORDS {
        debug!("Dropping section '{}': only {} words", section.title, words);
        return false;
    }

    true
}

/// Keep narratable sections and clean their text.
pub fn filter_sections(sections: Vec<Section>, filters: &FilterConfig) -> Vec<Section> {
    let total = sections.len();
    let kept: Vec<Section> = sections
        .into_iter()
        .filter(|s| should_keep_section(s, filters))
        .map(|mut s| {
            s.content = clean_section_text(&s.content);
            s
        })
        .collect();
    info!("Kept {}/{} sections", kept.len(), total);
    kept
}

// ── Section text cleanup ─────────────────────────────────────────────────

static RE_PAGE_NUMBER_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+[ \t]*$").unwrap());
static RE_BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]").unwrap());
static RE_PAGE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(page \d+\)").unwrap());
static RE_REPEATED_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])\s*[.!?]+").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Strip layout noise so the text reads naturally aloud.
///
/// Removes standalone page numbers, `[bracketed]` asides and `(page N)`
/// references, reduces runs of terminal punctuation to the first mark, and
/// collapses whitespace.
pub fn clean_section_text(text: &str) -> String {
    let s = RE_PAGE_NUMBER_LINE.replace_all(text, "");
    let s = RE_BRACKETED.replace_all(&s, "");
    let s = RE_PAGE_REF.replace_all(&s, "");
    let s = RE_REPEATED_PUNCT.replace_all(&s, "$1");
    let s = RE_WHITESPACE.replace_all(&s, " ");
    s.trim().to_string()
}
