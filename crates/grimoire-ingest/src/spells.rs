//! Spell block extraction from the "Spell Descriptions" part of a rulebook.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::fields::SpellField;
use crate::parser::{is_structural_marker, TextBuffer};
use grimoire_store::SpellDefinition;

static LEVELED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\d+)(?:st|nd|rd|th)-level\s+([a-z]+)(\s+\(ritual\))?$").unwrap()
});

static CANTRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^([a-z]+)\s+cantrip$").unwrap());

const HIGHER_LEVELS: &str = "At Higher Levels";

/// Words allowed in lower case inside a Title-Case spell name.
const MINOR_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "of", "on", "or", "the",
    "to", "upon", "with",
];

/// Level and school parsed from the line after a spell name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpellLevel {
    pub level: u8,
    pub school: String,
    pub ritual: bool,
}

/// `3rd-level evocation`, `1st-level divination (ritual)` or `Evocation cantrip`.
pub fn parse_level_line(line: &str) -> Option<SpellLevel> {
    let line = line.trim();
    if let Some(caps) = LEVELED_RE.captures(line) {
        return Some(SpellLevel {
            level: caps[1].parse().ok()?,
            school: caps[2].to_lowercase(),
            ritual: caps.get(3).is_some(),
        });
    }
    let caps = CANTRIP_RE.captures(line)?;
    Some(SpellLevel {
        level: 0,
        school: caps[1].to_lowercase(),
        ritual: false,
    })
}

/// A short line whose words are capitalized, apart from minor words after the first.
fn is_spell_name(line: &str) -> bool {
    let len = line.chars().count();
    if !(3..=50).contains(&len) || line.starts_with("At Higher") {
        return false;
    }
    if !line
        .chars()
        .all(|c| c.is_alphabetic() || c == ' ' || c == '\'' || c == '-' || c == '/')
    {
        return false;
    }
    line.split_whitespace().enumerate().all(|(i, word)| {
        let capitalized = word.chars().next().is_some_and(char::is_uppercase);
        capitalized || (i > 0 && MINOR_WORDS.contains(&word))
    })
}

fn is_spell_section(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("Spell Descriptions")
}

#[derive(Debug)]
struct SpellDraft {
    name: String,
    level: SpellLevel,
    casting_time: Option<String>,
    range: Option<String>,
    components: Option<String>,
    duration: Option<String>,
    description: TextBuffer,
}

impl SpellDraft {
    fn new(name: &str, level: SpellLevel) -> Self {
        Self {
            name: name.to_string(),
            level,
            casting_time: None,
            range: None,
            components: None,
            duration: None,
            description: TextBuffer::default(),
        }
    }

    fn apply(&mut self, field: SpellField) {
        match field {
            SpellField::CastingTime(v) => self.casting_time = Some(v),
            SpellField::Range(v) => self.range = Some(v),
            SpellField::Components(v) => self.components = Some(v),
            SpellField::Duration(v) => self.duration = Some(v),
        }
    }

    fn finish(self, source: &str) -> SpellDefinition {
        let text = self.description.into_string();
        let (description, higher_levels) = match text.find(HIGHER_LEVELS) {
            Some(at) => (
                text[..at].trim().to_string(),
                Some(text[at..].trim().to_string()),
            ),
            None => (text.trim().to_string(), None),
        };
        SpellDefinition {
            name: self.name,
            source: source.to_string(),
            level: self.level.level,
            school: self.level.school,
            ritual: self.level.ritual,
            casting_time: self.casting_time,
            range: self.range,
            components: self.components,
            duration: self.duration,
            description,
            higher_levels,
        }
    }
}

/// Extract spells. Nothing is collected before a "Spell Descriptions" line, and a Part or
/// Chapter marker ends the block.
pub fn parse_spells(text: &str, source: &str) -> Vec<SpellDefinition> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut spells = Vec::new();
    let mut in_block = false;
    let mut current: Option<SpellDraft> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if is_spell_section(line) {
            in_block = true;
            continue;
        }
        if !in_block {
            continue;
        }
        if is_structural_marker(line) {
            spells.extend(current.take().map(|d| d.finish(source)));
            in_block = false;
            continue;
        }
        if line.is_empty() {
            if let Some(draft) = current.as_mut() {
                draft.description.push_break();
            }
            continue;
        }

        if is_spell_name(line) {
            let next = lines[i..].iter().position(|l| !l.is_empty()).map(|p| i + p);
            if let Some(level) = next.and_then(|n| parse_level_line(lines[n])) {
                spells.extend(current.take().map(|d| d.finish(source)));
                current = Some(SpellDraft::new(line, level));
                i = next.map_or(i, |n| n + 1);
                continue;
            }
        }

        if let Some(draft) = current.as_mut() {
            match SpellField::match_line(line) {
                Some(field) => draft.apply(field),
                None => draft.description.push_line(line),
            }
        }
    }

    spells.extend(current.map(|d| d.finish(source)));
    spells
}
