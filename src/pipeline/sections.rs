//! Heuristic section segmentation of extracted document text.
//!
//! Lines are trimmed and blank lines dropped. A line opens a new section when
//! it is an all-caps heading (`INTRODUCTION`, `TERMS OF USE`) or ends with a
//! colon (`Payment schedule:`); every other line is appended to the section
//! currently open. Text before the first heading lands in `Introduction`.
//!
//! Rules are applied in a fixed order and the output depends only on the
//! input text, so the same document always yields the same summary.

use crate::output::Summary;
use crate::prompts::truncate_chars;
use once_cell::sync::Lazy;
use regex::Regex;

/// Name of the section open before any heading is seen.
pub const INITIAL_SECTION: &str = "Introduction";

/// All-caps line: a capital followed by at least three capitals or spaces.
static RE_CAPS_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z\s]{3,}$").unwrap());

/// Line ending in a colon.
static RE_COLON_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r":\s*$").unwrap());

/// Trailing colons and whitespace stripped from heading names.
static RE_NAME_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:\s]+$").unwrap());

/// A named run of body lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub lines: Vec<String>,
}

impl Section {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
        }
    }

    /// First `max_lines` lines joined by single spaces.
    pub fn excerpt(&self, max_lines: usize) -> String {
        self.lines
            .iter()
            .take(max_lines)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `true` when a trimmed line opens a new section.
pub fn is_heading(line: &str) -> bool {
    RE_CAPS_HEADING.is_match(line) || RE_COLON_HEADING.is_match(line)
}

/// Section name for a heading line, capped at `max_chars` characters.
pub fn heading_name(line: &str, max_chars: usize) -> String {
    let name = RE_NAME_SUFFIX.replace(line, "");
    truncate_chars(&name, max_chars).to_string()
}

/// Split `text` into sections, in the order headings appear.
///
/// The first element is always the [`INITIAL_SECTION`], even when empty.
/// Repeated heading names produce repeated sections here; [`summarize`]
/// resolves them.
pub fn segment(text: &str, max_name_chars: usize) -> Vec<Section> {
    let mut sections = vec![Section::new(INITIAL_SECTION)];

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_heading(line) {
            sections.push(Section::new(heading_name(line, max_name_chars)));
        } else if let Some(current) = sections.last_mut() {
            current.lines.push(line.to_string());
        }
    }
    sections
}

/// Build the ordered summary from segmented sections.
///
/// A heading that repeats an earlier name starts that section over: the later
/// excerpt replaces the earlier one at the earlier position.
pub fn summarize(sections: &[Section], max_lines: usize) -> Summary {
    sections
        .iter()
        .map(|s| (s.name.clone(), s.excerpt(max_lines)))
        .collect()
}

/// [`segment`] followed by [`summarize`].
pub fn summarize_text(text: &str, max_name_chars: usize, max_lines: usize) -> Summary {
    summarize(&segment(text, max_name_chars), max_lines)
}

/// Estimated page count: one page per `chars_per_page` characters, at least 1.
pub fn page_count(text: &str, chars_per_page: usize) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(chars_per_page.max(1)).max(1)
}
