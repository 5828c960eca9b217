//! Monster stat block extraction.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::fields::MonsterField;
use crate::parser::is_structural_marker;
use grimoire_store::{AbilityScores, MonsterStats};

static SIZE_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(Tiny|Small|Medium|Large|Huge|Gargantuan)\s+([^,]+?)\s*(?:,\s*(.+))?$")
        .unwrap()
});

/// An all-caps line under 40 characters, e.g. `GIANT SPIDER`.
fn is_monster_name(line: &str) -> bool {
    line.chars().count() < 40
        && line.chars().any(char::is_alphabetic)
        && !line.chars().any(char::is_lowercase)
        && line
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '\'' || c == '-' || c == ',')
}

/// `GIANT SPIDER` → `Giant Spider`.
fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[derive(Debug)]
struct MonsterDraft {
    name: String,
    size: String,
    monster_type: String,
    alignment: Option<String>,
    armor_class: Option<(i32, Option<String>)>,
    hit_points: Option<(i32, Option<String>)>,
    speed: Option<String>,
    abilities: Option<AbilityScores>,
    challenge: Option<String>,
    senses: Option<String>,
    languages: Option<String>,
}

impl MonsterDraft {
    fn new(name: &str, size: &str, monster_type: &str, alignment: Option<&str>) -> Self {
        Self {
            name: title_case(name),
            size: title_case(size),
            monster_type: monster_type.trim().to_string(),
            alignment: alignment.map(|a| a.trim().to_string()),
            armor_class: None,
            hit_points: None,
            speed: None,
            abilities: None,
            challenge: None,
            senses: None,
            languages: None,
        }
    }

    fn apply(&mut self, field: MonsterField) {
        match field {
            MonsterField::ArmorClass { value, note } => self.armor_class = Some((value, note)),
            MonsterField::HitPoints { value, dice } => self.hit_points = Some((value, dice)),
            MonsterField::Speed(v) => self.speed = Some(v),
            MonsterField::Abilities(a) => self.abilities = Some(a),
            MonsterField::Senses(v) => self.senses = Some(v),
            MonsterField::Languages(v) => self.languages = Some(v),
            MonsterField::Challenge(v) => self.challenge = Some(v),
        }
    }

    /// `None` unless both a name and an armor class were found.
    fn finish(self, source: &str) -> Option<MonsterStats> {
        if self.name.is_empty() {
            return None;
        }
        let (armor_class, armor_note) = self.armor_class?;
        let (hit_points, hit_dice) = match self.hit_points {
            Some((value, dice)) => (Some(value), dice),
            None => (None, None),
        };
        Some(MonsterStats {
            name: self.name,
            source: source.to_string(),
            size: self.size,
            monster_type: self.monster_type,
            alignment: self.alignment,
            armor_class,
            armor_note,
            hit_points,
            hit_dice,
            speed: self.speed,
            abilities: self.abilities,
            challenge: self.challenge,
            senses: self.senses,
            languages: self.languages,
        })
    }
}

/// Extract monster stat blocks. A block opens on an all-caps name followed by a size and
/// type line; lines without a recognized label are skipped.
pub fn parse_monsters(text: &str, source: &str) -> Vec<MonsterStats> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let mut monsters = Vec::new();
    let mut current: Option<MonsterDraft> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if is_structural_marker(line) {
            monsters.extend(current.take().and_then(|d| d.finish(source)));
            continue;
        }

        if is_monster_name(line) {
            let header = lines.get(i).and_then(|next| SIZE_TYPE_RE.captures(next));
            if let Some(caps) = header {
                monsters.extend(current.take().and_then(|d| d.finish(source)));
                current = Some(MonsterDraft::new(
                    line,
                    &caps[1],
                    &caps[2],
                    caps.get(3).map(|m| m.as_str()),
                ));
                i += 1;
                continue;
            }
        }

        if let Some(draft) = current.as_mut() {
            if let Some(field) = MonsterField::match_line(line) {
                draft.apply(field);
            }
        }
    }

    monsters.extend(current.and_then(|d| d.finish(source)));
    monsters
}

#[cfg(test)]
mod tests {
    use super::*;

    const BESTIARY: &str = "\
GOBLIN
Small humanoid (goblinoid), neutral evil
Armor Class 15 (leather armor, shield)
Hit Points 7 (2d6)
Speed 30 ft.
STR DEX CON INT WIS CHA
8 (−1) 14 (+2) 10 (+0) 10 (+0) 8 (−1) 8 (−1)
Skills Stealth +6
Senses darkvision 60 ft., passive Perception 9
Languages Common, Goblin
Challenge 1/4 (50 XP)
Nimble Escape. The goblin can take the Disengage or Hide action.

GIANT SPIDER
Large beast, unaligned
Hit Points 26 (4d10 + 4)
Speed 30 ft., climb 30 ft.

ZOMBIE
Medium undead, neutral evil
Armor Class 8
";

    #[test]
    fn test_goblin() {
        let monsters = parse_monsters(BESTIARY, "srd");
        let goblin = &monsters[0];
        assert_eq!(goblin.name, "Goblin");
        assert_eq!(goblin.size, "Small");
        assert_eq!(goblin.monster_type, "humanoid (goblinoid)");
        assert_eq!(goblin.alignment.as_deref(), Some("neutral evil"));
        assert_eq!(goblin.armor_class, 15);
        assert_eq!(goblin.armor_note.as_deref(), Some("leather armor, shield"));
        assert_eq!(goblin.hit_points, Some(7));
        assert_eq!(goblin.hit_dice.as_deref(), Some("2d6"));
        assert_eq!(goblin.abilities.map(|a| a.dexterity), Some(14));
        assert_eq!(goblin.challenge.as_deref(), Some("1/4 (50 XP)"));
        assert_eq!(goblin.languages.as_deref(), Some("Common, Goblin"));
    }

    #[test]
    fn test_monster_without_armor_class_is_skipped() {
        let names: Vec<String> = parse_monsters(BESTIARY, "srd")
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Goblin", "Zombie"]);
    }

    #[test]
    fn test_name_needs_size_line() {
        assert!(parse_monsters("GOBLIN\nArmor Class 15", "srd").is_empty());
        assert!(parse_monsters("STR DEX CON INT WIS CHA\n10 (+0)", "srd").is_empty());
    }

    #[test]
    fn test_chapter_marker_ends_block() {
        let text = "ZOMBIE\nMedium undead\nCh. 2: Races\nArmor Class 8";
        assert!(parse_monsters(text, "srd").is_empty());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("GIANT SPIDER"), "Giant Spider");
    }
}
