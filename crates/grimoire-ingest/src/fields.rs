//! Labeled property lines of spell and monster blocks.
//!
//! Each enum lists its recognized fields; `match_line` tries them in declaration order
//! and returns the first tagged value, or `None` for lines that carry no field.

use once_cell::sync::Lazy;
use regex::Regex;

use grimoire_store::AbilityScores;

/// A property line of a spell block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpellField {
    CastingTime(String),
    Range(String),
    Components(String),
    Duration(String),
}

impl SpellField {
    const LABELS: [&'static str; 4] = ["Casting Time", "Range", "Components", "Duration"];

    pub fn match_line(line: &str) -> Option<Self> {
        let line = line.trim();
        Self::LABELS.iter().find_map(|label| {
            let value = labeled_value(line, label, ':')?;
            Some(match *label {
                "Casting Time" => Self::CastingTime(value),
                "Range" => Self::Range(value),
                "Components" => Self::Components(value),
                _ => Self::Duration(value),
            })
        })
    }
}

/// The value after `label` and `separator`, matched case-insensitively.
fn labeled_value(line: &str, label: &str, separator: char) -> Option<String> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = line[label.len()..].trim_start();
    let value = if separator == ' ' {
        // The label must be a whole word.
        if rest.len() == line.len() - label.len() {
            return None;
        }
        rest
    } else {
        rest.strip_prefix(separator)?.trim()
    };
    (!value.is_empty()).then(|| value.to_string())
}

static ARMOR_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Armor Class\s+(\d+)\s*(?:\((.+)\))?").unwrap());

static HIT_POINTS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Hit Points\s+(\d+)\s*(?:\(([^)]+)\))?").unwrap());

/// `10 (+0)`: a score followed by its modifier. Accepts ASCII and typographic minus signs.
static ABILITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*\(\s*[+\-−–]?\s*\d+\s*\)").unwrap());

/// A recognized line of a monster stat block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonsterField {
    ArmorClass { value: i32, note: Option<String> },
    HitPoints { value: i32, dice: Option<String> },
    Speed(String),
    Abilities(AbilityScores),
    Senses(String),
    Languages(String),
    Challenge(String),
}

impl MonsterField {
    pub fn match_line(line: &str) -> Option<Self> {
        let line = line.trim();
        Self::armor_class(line)
            .or_else(|| Self::hit_points(line))
            .or_else(|| labeled_value(line, "Speed", ' ').map(Self::Speed))
            .or_else(|| Self::abilities(line))
            .or_else(|| labeled_value(line, "Senses", ' ').map(Self::Senses))
            .or_else(|| labeled_value(line, "Languages", ' ').map(Self::Languages))
            .or_else(|| labeled_value(line, "Challenge", ' ').map(Self::Challenge))
    }

    fn armor_class(line: &str) -> Option<Self> {
        let caps = ARMOR_CLASS_RE.captures(line)?;
        Some(Self::ArmorClass {
            value: caps[1].parse().ok()?,
            note: caps.get(2).map(|m| m.as_str().trim().to_string()),
        })
    }

    fn hit_points(line: &str) -> Option<Self> {
        let caps = HIT_POINTS_RE.captures(line)?;
        Some(Self::HitPoints {
            value: caps[1].parse().ok()?,
            dice: caps.get(2).map(|m| m.as_str().trim().to_string()),
        })
    }

    /// Exactly six `score (modifier)` groups, in STR DEX CON INT WIS CHA order.
    fn abilities(line: &str) -> Option<Self> {
        let scores: Vec<u8> = ABILITY_RE
            .captures_iter(line)
            .filter_map(|c| c[1].parse().ok())
            .collect();
        let [strength, dexterity, constitution, intelligence, wisdom, charisma] =
            <[u8; 6]>::try_from(scores).ok()?;
        Some(Self::Abilities(AbilityScores {
            strength,
            dexterity,
            constitution,
            intelligence,
            wisdom,
            charisma,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spell_fields() {
        assert_eq!(
            SpellField::match_line("Casting Time: 1 action"),
            Some(SpellField::CastingTime("1 action".into()))
        );
        assert_eq!(
            SpellField::match_line("range: 150 feet"),
            Some(SpellField::Range("150 feet".into()))
        );
        assert_eq!(
            SpellField::match_line("Components: V, S, M (a tiny ball of bat guano)"),
            Some(SpellField::Components("V, S, M (a tiny ball of bat guano)".into()))
        );
        assert_eq!(SpellField::match_line("Rangers are hunters."), None);
        assert_eq!(SpellField::match_line("Duration:"), None);
    }

    #[test]
    fn test_monster_armor_and_hit_points() {
        assert_eq!(
            MonsterField::match_line("Armor Class 15 (leather armor, shield)"),
            Some(MonsterField::ArmorClass {
                value: 15,
                note: Some("leather armor, shield".into())
            })
        );
        assert_eq!(
            MonsterField::match_line("Hit Points 7 (2d6)"),
            Some(MonsterField::HitPoints {
                value: 7,
                dice: Some("2d6".into())
            })
        );
        assert_eq!(
            MonsterField::match_line("Armor Class 12"),
            Some(MonsterField::ArmorClass {
                value: 12,
                note: None
            })
        );
    }

    #[test]
    fn test_monster_labels_are_whole_words() {
        assert_eq!(
            MonsterField::match_line("Speed 30 ft., climb 30 ft."),
            Some(MonsterField::Speed("30 ft., climb 30 ft.".into()))
        );
        assert_eq!(MonsterField::match_line("Speedy creatures flee."), None);
        assert_eq!(
            MonsterField::match_line("Challenge 1/4 (50 XP)"),
            Some(MonsterField::Challenge("1/4 (50 XP)".into()))
        );
    }

    #[test]
    fn test_ability_line() {
        let field = MonsterField::match_line("8 (−1) 14 (+2) 10 (+0) 10 (+0) 8 (−1) 8 (−1)");
        assert_eq!(
            field,
            Some(MonsterField::Abilities(AbilityScores {
                strength: 8,
                dexterity: 14,
                constitution: 10,
                intelligence: 10,
                wisdom: 8,
                charisma: 8,
            }))
        );
        assert_eq!(MonsterField::match_line("10 (+0) 12 (+1)"), None);
    }
}
