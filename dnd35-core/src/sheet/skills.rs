//! Skill modifiers: ranks, the key ability modifier, and `SKILL` and
//! `ABILITY_SKILLS` changes.
//!
//! The SRD skill list is built in. A compendium may add `skill` entities or
//! replace a built-in one by id. A skill with a `parentSkill` is a
//! specialization such as Craft (Alchemy): changes to the parent apply to
//! it, and it is a class skill whenever the parent is.

use super::Calculation;
use crate::bonus::{combine_sources, Source, SourceValue};
use crate::changes::ChangeTarget;
use crate::stats::Ability;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillDefinition {
    pub unique_id: String,
    pub name: String,
    pub ability: Ability,
    #[serde(default)]
    pub trained_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_skill: Option<String>,
}

fn srd(unique_id: &str, name: &str, ability: Ability, trained_only: bool) -> SkillDefinition {
    SkillDefinition {
        unique_id: unique_id.to_string(),
        name: name.to_string(),
        ability,
        trained_only,
        parent_skill: None,
    }
}

lazy_static::lazy_static! {
    pub static ref SRD_SKILLS: Vec<SkillDefinition> = {
        use Ability::*;
        vec![
            srd("appraise", "Appraise", Intelligence, false),
            srd("autohypnosis", "Autohypnosis", Wisdom, true),
            srd("balance", "Balance", Dexterity, false),
            srd("bluff", "Bluff", Charisma, false),
            srd("climb", "Climb", Strength, false),
            srd("concentration", "Concentration", Constitution, false),
            srd("craft", "Craft", Intelligence, false),
            srd("decipherScript", "Decipher Script", Intelligence, true),
            srd("diplomacy", "Diplomacy", Charisma, false),
            srd("disableDevice", "Disable Device", Intelligence, true),
            srd("disguise", "Disguise", Charisma, false),
            srd("escapeArtist", "Escape Artist", Dexterity, false),
            srd("forgery", "Forgery", Intelligence, false),
            srd("gatherInformation", "Gather Information", Charisma, false),
            srd("handleAnimal", "Handle Animal", Charisma, true),
            srd("heal", "Heal", Wisdom, false),
            srd("hide", "Hide", Dexterity, false),
            srd("intimidate", "Intimidate", Charisma, false),
            srd("jump", "Jump", Strength, false),
            srd("knowledgeArcana", "Knowledge (Arcana)", Intelligence, true),
            srd("knowledgeArchitecture", "Knowledge (Architecture)", Intelligence, true),
            srd("knowledgeDungeoneering", "Knowledge (Dungeoneering)", Intelligence, true),
            srd("knowledgeGeography", "Knowledge (Geography)", Intelligence, true),
            srd("knowledgeHistory", "Knowledge (History)", Intelligence, true),
            srd("knowledgeLocal", "Knowledge (Local)", Intelligence, true),
            srd("knowledgeNature", "Knowledge (Nature)", Intelligence, true),
            srd("knowledgeNobility", "Knowledge (Nobility)", Intelligence, true),
            srd("knowledgeReligion", "Knowledge (Religion)", Intelligence, true),
            srd("knowledgeThePlanes", "Knowledge (The Planes)", Intelligence, true),
            srd("listen", "Listen", Wisdom, false),
            srd("moveSilently", "Move Silently", Dexterity, false),
            srd("openLock", "Open Lock", Dexterity, true),
            srd("perform", "Perform", Charisma, true),
            srd("profession", "Profession", Wisdom, true),
            srd("psicraft", "Psicraft", Intelligence, true),
            srd("ride", "Ride", Dexterity, false),
            srd("search", "Search", Intelligence, false),
            srd("senseMotive", "Sense Motive", Wisdom, false),
            srd("sleightOfHand", "Sleight of Hand", Dexterity, true),
            srd("spellcraft", "Spellcraft", Intelligence, true),
            srd("spot", "Spot", Wisdom, false),
            srd("survival", "Survival", Wisdom, false),
            srd("swim", "Swim", Strength, false),
            srd("tumble", "Tumble", Dexterity, true),
            srd("useMagicDevice", "Use Magic Device", Charisma, true),
            srd("usePsionicDevice", "Use Psionic Device", Charisma, true),
            srd("useRope", "Use Rope", Dexterity, false),
        ]
    };
}

/// Fields of a `skill` entity. Unset values come from the parent skill.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SkillEntityData {
    ability: Option<Ability>,
    trained_only: Option<bool>,
    parent_skill: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedSkill {
    pub unique_id: String,
    pub name: String,
    pub ability: Ability,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_skill: Option<String>,
    pub trained_only: bool,
    pub class_skill: bool,
    pub ranks: i32,
    pub total_bonus: i32,
    pub sources: Vec<Source>,
    pub source_values: Vec<SourceValue>,
}

impl CalculatedSkill {
    /// Trained-only skills need at least one rank.
    pub fn usable(&self) -> bool {
        !self.trained_only || self.ranks > 0
    }
}

fn skill_definitions(calc: &Calculation<'_>) -> Vec<SkillDefinition> {
    let mut skills = SRD_SKILLS.clone();
    for entity in calc.ctx.compendium.entities_of_type("skill") {
        let data: SkillEntityData = entity.typed().unwrap_or_default();
        let parent = data
            .parent_skill
            .as_ref()
            .and_then(|id| skills.iter().find(|s| s.unique_id == *id));
        let Some(ability) = data.ability.or(parent.map(|p| p.ability)) else {
            tracing::debug!(skill = %entity.id, "skill entity without a key ability");
            continue;
        };
        let definition = SkillDefinition {
            unique_id: entity.id.clone(),
            name: entity.name.clone(),
            ability,
            trained_only: data
                .trained_only
                .or(parent.map(|p| p.trained_only))
                .unwrap_or(false),
            parent_skill: data.parent_skill,
        };
        match skills.iter_mut().find(|s| s.unique_id == definition.unique_id) {
            Some(existing) => *existing = definition,
            None => skills.push(definition),
        }
    }
    skills
}

pub(crate) fn calculate_skills(calc: &mut Calculation<'_>) -> BTreeMap<String, CalculatedSkill> {
    let class_skills: Vec<String> = calc
        .classes
        .iter()
        .flat_map(|class| class.data.class_skills.iter().cloned())
        .collect();

    let mut skills = BTreeMap::new();
    for definition in skill_definitions(calc) {
        let SkillDefinition {
            unique_id,
            name,
            ability,
            trained_only,
            parent_skill,
        } = definition;
        let ranks = calc
            .base
            .skill_data
            .get(&unique_id)
            .copied()
            .unwrap_or_default()
            .total();

        let mut sources = vec![
            Source::base(format!("{} modifier", ability.name()), calc.ability_modifier(ability)),
            Source::base("Ranks", ranks),
        ];
        sources.extend(calc.sources(|target| match target {
            ChangeTarget::Skill { skill } => *skill == unique_id || parent_skill.as_ref() == Some(skill),
            ChangeTarget::AbilitySkills { ability: a } => *a == ability,
            _ => false,
        }));
        let combined = combine_sources(&sources);

        calc.index.set(format!("skills.{unique_id}.total"), combined.total);
        calc.index.set(format!("skills.{unique_id}.ranks"), ranks);

        let class_skill = class_skills.contains(&unique_id)
            || parent_skill.as_ref().is_some_and(|parent| class_skills.contains(parent));
        skills.insert(
            unique_id.clone(),
            CalculatedSkill {
                unique_id,
                name,
                ability,
                parent_skill,
                trained_only,
                class_skill,
                ranks,
                total_bonus: combined.total,
                sources,
                source_values: combined.source_values,
            },
        );
    }
    tracing::debug!(skills = skills.len(), "skills");
    skills
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_srd_skill_ids_are_unique() {
        let ids: HashSet<&str> = SRD_SKILLS.iter().map(|s| s.unique_id.as_str()).collect();
        assert_eq!(ids.len(), SRD_SKILLS.len());
        assert_eq!(SRD_SKILLS.len(), 47);
    }

    #[test]
    fn test_srd_key_abilities() {
        let ability = |id: &str| SRD_SKILLS.iter().find(|s| s.unique_id == id).map(|s| s.ability);
        assert_eq!(ability("climb"), Some(Ability::Strength));
        assert_eq!(ability("concentration"), Some(Ability::Constitution));
        assert_eq!(ability("useMagicDevice"), Some(Ability::Charisma));
        assert!(SRD_SKILLS.iter().filter(|s| s.unique_id.starts_with("knowledge")).all(|s| s.trained_only));
    }

    #[test]
    fn test_usable_untrained() {
        let skill = CalculatedSkill {
            unique_id: "tumble".into(),
            name: "Tumble".into(),
            ability: Ability::Dexterity,
            parent_skill: None,
            trained_only: true,
            class_skill: false,
            ranks: 0,
            total_bonus: 2,
            sources: Vec::new(),
            source_values: Vec::new(),
        };
        assert!(!skill.usable());
        assert!(CalculatedSkill { ranks: 1, ..skill.clone() }.usable());
        assert!(CalculatedSkill { trained_only: false, ..skill }.usable());
    }
}
