//! Line grammar for rulebook text.
//!
//! Each trimmed line is classified once, in precedence order, as a Part marker, a
//! Chapter marker, a section header or body text. The classified lines are folded
//! through [`ParserState`], which owns the open chapter/section drafts and emits a
//! finished [`ParsedChapter`] whenever a Part marker, a Chapter marker or the end of
//! input closes one.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::keywords::extract_keywords;
use crate::monsters::parse_monsters;
use crate::slug::slugify;
use crate::spells::parse_spells;
use grimoire_store::{MonsterStats, SpellDefinition};

static PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Part\s+(\d+|[IVXLC]+)\s*:\s*(.+)$").unwrap());

static CHAPTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Ch\.\s*(\S+?)\s*:\s*(.+)$").unwrap());

/// Dot leaders and a trailing page number, as found in tables of contents.
static LEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\s*\.{2,}\s*\d*|\s+\d+)\s*$").unwrap());

/// A chapter as produced by [`parse_rules`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedChapter {
    pub slug: String,
    pub chapter_number: i32,
    pub title: String,
    /// Title of the most recent Part marker, if any.
    pub part: Option<String>,
    pub order_index: i32,
    /// Text between the chapter marker and its first section header.
    pub body: String,
    pub keywords: Vec<String>,
    pub sections: Vec<ParsedSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSection {
    pub title: String,
    pub order_index: i32,
    pub body: String,
    pub keywords: Vec<String>,
}

/// Everything extracted from one rulebook text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedRulebook {
    pub chapters: Vec<ParsedChapter>,
    pub spells: Vec<SpellDefinition>,
    pub monsters: Vec<MonsterStats>,
}

/// One classified input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line<'a> {
    Blank,
    Part { title: &'a str },
    Chapter { number: i32, title: String },
    Header(&'a str),
    Body(&'a str),
}

/// Classify a raw line. Markers that fail to parse fall through to lower precedence.
pub fn classify(raw: &str) -> Line<'_> {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Blank;
    }
    if let Some(title) = part_title(line) {
        return Line::Part { title };
    }
    if let Some((number, title)) = chapter_marker(line) {
        return Line::Chapter { number, title };
    }
    if is_header(line) {
        return Line::Header(line);
    }
    Line::Body(line)
}

fn part_title(line: &str) -> Option<&str> {
    let caps = PART_RE.captures(line)?;
    let title = caps.get(2)?.as_str().trim();
    (!title.is_empty()).then_some(title)
}

/// `Ch. <N>: <title>` with a numeric chapter number and a non-empty title.
pub fn chapter_marker(line: &str) -> Option<(i32, String)> {
    let caps = CHAPTER_RE.captures(line)?;
    let number: i32 = caps.get(1)?.as_str().trim_end_matches('.').parse().ok()?;
    let title = LEADER_RE.replace(caps.get(2)?.as_str(), "");
    let title = title.trim();
    (!title.is_empty()).then(|| (number, title.to_string()))
}

/// Part or Chapter marker: both end any open spell or monster block.
pub(crate) fn is_structural_marker(line: &str) -> bool {
    let line = line.trim();
    part_title(line).is_some() || chapter_marker(line).is_some()
}

/// A short, capitalized, punctuation-free standalone line.
fn is_header(line: &str) -> bool {
    let len = line.chars().count();
    if !(3..=59).contains(&len) {
        return false;
    }
    let Some(first) = line.chars().next() else {
        return false;
    };
    first.is_uppercase()
        && line.chars().any(char::is_alphabetic)
        && line
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ')
}

/// Accumulates lines into paragraphs. Lines of one paragraph are joined with a space;
/// runs of blank lines become a single `"\n\n"` break.
#[derive(Debug, Clone, Default)]
pub(crate) struct TextBuffer {
    text: String,
    pending_break: bool,
}

impl TextBuffer {
    pub(crate) fn push_line(&mut self, line: &str) {
        if !self.text.is_empty() {
            self.text.push_str(if self.pending_break { "\n\n" } else { " " });
        }
        self.text.push_str(line);
        self.pending_break = false;
    }

    pub(crate) fn push_break(&mut self) {
        if !self.text.is_empty() {
            self.pending_break = true;
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub(crate) fn into_string(self) -> String {
        self.text
    }
}

#[derive(Debug)]
struct ChapterDraft {
    number: i32,
    title: String,
    part: Option<String>,
    body: TextBuffer,
    sections: Vec<ParsedSection>,
}

#[derive(Debug)]
struct SectionDraft {
    title: String,
    body: TextBuffer,
}

/// Fold state for [`parse_rules`].
#[derive(Debug)]
pub struct ParserState {
    source: String,
    part: Option<String>,
    chapter: Option<ChapterDraft>,
    section: Option<SectionDraft>,
    chapters: Vec<ParsedChapter>,
    slug_counts: HashMap<String, usize>,
    dropped_lines: usize,
}

impl ParserState {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            part: None,
            chapter: None,
            section: None,
            chapters: Vec::new(),
            slug_counts: HashMap::new(),
            dropped_lines: 0,
        }
    }

    /// Apply one classified line.
    pub fn step(mut self, line: Line<'_>) -> Self {
        match line {
            Line::Blank => {
                if let Some(section) = self.section.as_mut() {
                    section.body.push_break();
                } else if let Some(chapter) = self.chapter.as_mut() {
                    chapter.body.push_break();
                }
            }
            Line::Part { title } => {
                self.close_chapter();
                self.part = Some(title.to_string());
            }
            Line::Chapter { number, title } => {
                self.close_chapter();
                self.chapter = Some(ChapterDraft {
                    number,
                    title,
                    part: self.part.clone(),
                    body: TextBuffer::default(),
                    sections: Vec::new(),
                });
            }
            Line::Header(title) => {
                if self.chapter.is_some() {
                    self.close_section();
                    self.section = Some(SectionDraft {
                        title: title.to_string(),
                        body: TextBuffer::default(),
                    });
                } else {
                    self.dropped_lines += 1;
                }
            }
            Line::Body(text) => {
                if let Some(section) = self.section.as_mut() {
                    section.body.push_line(text);
                } else if let Some(chapter) = self.chapter.as_mut() {
                    chapter.body.push_line(text);
                } else {
                    self.dropped_lines += 1;
                }
            }
        }
        self
    }

    /// Close any open units and return the chapters in document order.
    pub fn finish(mut self) -> Vec<ParsedChapter> {
        self.close_chapter();
        if self.dropped_lines > 0 {
            debug!(
                "Dropped {} lines outside any chapter ({})",
                self.dropped_lines, self.source
            );
        }
        self.chapters
    }

    fn close_section(&mut self) {
        let (Some(section), Some(chapter)) = (self.section.take(), self.chapter.as_mut()) else {
            return;
        };
        let body = section.body.into_string();
        let keywords = extract_keywords(&format!("{} {}", section.title, body));
        chapter.sections.push(ParsedSection {
            title: section.title,
            order_index: chapter.sections.len() as i32,
            body,
            keywords,
        });
    }

    fn close_chapter(&mut self) {
        self.close_section();
        let Some(draft) = self.chapter.take() else {
            return;
        };
        let body = draft.body.into_string();

        let mut corpus = format!("{} {}", draft.title, body);
        for section in &draft.sections {
            corpus.push(' ');
            corpus.push_str(&section.title);
            corpus.push(' ');
            corpus.push_str(&section.body);
        }

        let slug = self.unique_slug(slugify(&format!(
            "{}-ch{}-{}",
            self.source, draft.number, draft.title
        )));

        self.chapters.push(ParsedChapter {
            slug,
            chapter_number: draft.number,
            title: draft.title,
            part: draft.part,
            order_index: self.chapters.len() as i32,
            body,
            keywords: extract_keywords(&corpus),
            sections: draft.sections,
        });
    }

    /// First use of a slug keeps it; repeats get `-2`, `-3`, ...
    fn unique_slug(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        let mut n = self.slug_counts.get(&base).copied().unwrap_or(0);
        while self.slug_counts.contains_key(&candidate) {
            n += 1;
            candidate = format!("{}-{}", base, n);
        }
        self.slug_counts.insert(base, n.max(1));
        self.slug_counts.insert(candidate.clone(), 1);
        candidate
    }
}

/// Parse rulebook text into chapters and their sections. Never fails; unrecognized or
/// malformed lines become body text.
pub fn parse_rules(text: &str, source: &str) -> Vec<ParsedChapter> {
    text.lines()
        .map(classify)
        .fold(ParserState::new(source), ParserState::step)
        .finish()
}

/// Run the chapter grammar and both record extractors over the same text.
pub fn parse_rulebook(text: &str, source: &str) -> ParsedRulebook {
    ParsedRulebook {
        chapters: parse_rules(text, source),
        spells: parse_spells(text, source),
        monsters: parse_monsters(text, source),
    }
}
