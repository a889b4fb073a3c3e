//! Chapter segmentation: group kept pages into titled sections.
//!
//! A page opens a new section when its text contains a heading line. Pages
//! before the first heading belong to no section and are not narrated. A
//! document without any recognisable heading yields no sections at all.

use crate::model::{Page, Section, SectionKind};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

const UNTITLED: &str = "Untitled Chapter";

/// Heading patterns in priority order. The first pattern that matches
/// anywhere on the page decides the heading.
static HEADINGS: Lazy<Vec<(Regex, SectionKind)>> = Lazy::new(|| {
    [
        (
            r"(?im)^chapter\s+(?:\d+|[ivxlc]+\b|(?:one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b)",
            SectionKind::Chapter,
        ),
        (r"(?im)^part\s+[ivx]+\b", SectionKind::Chapter),
        (r"(?im)^\d+\.\s+[a-z]", SectionKind::Chapter),
        (
            r"(?im)^[ \t]*(?:prologue|preface|foreword|introduction)[ \t]*$",
            SectionKind::FrontMatter,
        ),
        (
            r"(?im)^[ \t]*(?:epilogue|afterword|appendix(?:[ \t]+[a-z0-9]+)?)[ \t]*$",
            SectionKind::BackMatter,
        ),
    ]
    .into_iter()
    .map(|(p, kind)| (Regex::new(p).unwrap(), kind))
    .collect()
});

/// A heading found on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub title: String,
    pub kind: SectionKind,
}

/// Look for a section heading on one page.
pub fn detect_heading(text: &str) -> Option<Heading> {
    HEADINGS.iter().find_map(|(re, kind)| {
        re.find(text).map(|m| Heading {
            title: heading_title(&text[m.start()..]),
            kind: *kind,
        })
    })
}

/// Up to two meaningful lines from the first three after the heading start.
fn heading_title(from_heading: &str) -> String {
    let parts: Vec<&str> = from_heading
        .lines()
        .take(3)
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.chars().all(|c| c.is_ascii_digit()))
        .take(2)
        .collect();
    if parts.is_empty() {
        UNTITLED.to_string()
    } else {
        parts.join(" ")
    }
}

enum State {
    NoSection,
    InSection(Section),
}

/// Incremental segmenter. Feed pages in ascending order, then `finish`.
pub struct Segmenter {
    state: State,
    done: Vec<Section>,
    last_page: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            state: State::NoSection,
            done: Vec::new(),
            last_page: 0,
        }
    }

    pub fn feed(&mut self, page: &Page) {
        self.last_page = page.number;

        if let Some(heading) = detect_heading(&page.text) {
            if let State::InSection(mut open) =
                std::mem::replace(&mut self.state, State::NoSection)
            {
                open.end_page = page.number.saturating_sub(1).max(open.start_page);
                self.done.push(open);
            }
            debug!("Page {}: new section '{}'", page.number, heading.title);
            self.state = State::InSection(Section {
                title: heading.title,
                start_page: page.number,
                end_page: page.number,
                content: String::new(),
                kind: heading.kind,
            });
        }

        if let State::InSection(open) = &mut self.state {
            open.content.push_str(&page.text);
            open.content.push('\n');
        }
    }

    pub fn finish(mut self) -> Vec<Section> {
        if let State::InSection(mut open) = self.state {
            open.end_page = self.last_page;
            self.done.push(open);
        }
        self.done
    }
}

/// Split kept pages into sections.
pub fn segment(pages: &[Page]) -> Vec<Section> {
    let mut segmenter = Segmenter::new();
    for page in pages {
        segmenter.feed(page);
    }
    let sections = segmenter.finish();
    debug!("Segmented {} pages into {} sections", pages.len(), sections.len());
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_numbered_chapter() {
        let h = detect_heading("Chapter 3\nThe Storm\nIt rained.").unwrap();
        assert_eq!(h.title, "Chapter 3 The Storm");
        assert_eq!(h.kind, SectionKind::Chapter);
    }

    #[test]
    fn detects_spelled_and_roman_chapters() {
        assert!(detect_heading("CHAPTER ONE\nArrival").is_some());
        assert!(detect_heading("Chapter XII\nDeparture").is_some());
        assert!(detect_heading("Chapter in which nothing happens").is_none());
    }

    #[test]
    fn detects_part_and_numbered_headings() {
        assert_eq!(detect_heading("Part IV\nThe Return").unwrap().title, "Part IV The Return");
        assert_eq!(
            detect_heading("some text\n2. Methods of Travel\nbody").unwrap().title,
            "2. Methods of Travel body"
        );
    }

    #[test]
    fn heading_must_start_a_line() {
        assert!(detect_heading("as we saw in chapter 2, things changed").is_none());
    }

    #[test]
    fn front_and_back_matter() {
        assert_eq!(detect_heading("Prologue\nBefore").unwrap().kind, SectionKind::FrontMatter);
        assert_eq!(detect_heading("Appendix B\nTables").unwrap().kind, SectionKind::BackMatter);
        assert!(detect_heading("The introduction of steam changed everything").is_none());
    }

    #[test]
    fn title_skips_page_numbers_and_blanks() {
        assert_eq!(heading_title("Chapter 7\n\n112\nlater"), "Chapter 7");
        assert_eq!(heading_title("Chapter 7\n   \nThe End\nmore"), "Chapter 7 The End");
    }

    #[test]
    fn sections_close_before_next_heading() {
        let pages = vec![
            Page::new(1, "Chapter 1\nStart\nwords"),
            Page::new(2, "more words"),
            Page::new(3, "Chapter 2\nMiddle\nwords"),
            Page::new(4, "even more"),
        ];
        let sections = segment(&pages);
        assert_eq!(sections.len(), 2);
        assert_eq!((sections[0].start_page, sections[0].end_page), (1, 2));
        assert_eq!((sections[1].start_page, sections[1].end_page), (3, 4));
        assert!(sections[0].content.contains("more words"));
        assert!(!sections[0].content.contains("Middle"));
    }

    #[test]
    fn pages_before_first_heading_are_skipped() {
        let pages = vec![
            Page::new(1, "front matter nobody reads"),
            Page::new(2, "Chapter 1\nGo\ntext"),
        ];
        let sections = segment(&pages);
        assert_eq!(sections.len(), 1);
        assert!(!sections[0].content.contains("nobody"));
    }

    #[test]
    fn no_headings_means_no_sections() {
        let pages = vec![Page::new(1, "just prose"), Page::new(2, "more prose")];
        assert!(segment(&pages).is_empty());
    }

    #[test]
    fn ranges_ascend_without_overlap() {
        let pages: Vec<Page> = (1..=12)
            .map(|n| {
                if n % 3 == 1 {
                    Page::new(n, format!("Chapter {n}\nTitle {n}\nbody"))
                } else {
                    Page::new(n, "body")
                }
            })
            .collect();
        let sections = segment(&pages);
        assert_eq!(sections.len(), 4);
        for pair in sections.windows(2) {
            assert!(pair[0].start_page <= pair[0].end_page);
            assert!(pair[0].end_page < pair[1].start_page);
        }
        assert_eq!(sections.last().unwrap().end_page, 12);
    }
}
