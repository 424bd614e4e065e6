//! Character base data and typed views of the entities it references.
//!
//! [`CharacterBaseData`] is what gets persisted. Every field is defaulted so
//! older and newer saves both load.

use crate::ability_generation::AbilityMethod;
use crate::cge::{apply_selection, remove_selection, EntityProvider, SelectionError, SelectionStatus, Selections};
use crate::compendium::deserialize_entity_listing;
use crate::entity::StandardEntity;
use crate::formula::Formula;
use crate::stats::{Ability, AttackType, SavingThrow, SizeCategory, SpeedKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityInput {
    #[serde(default = "default_score")]
    pub base_score: i32,
    #[serde(default)]
    pub drain: i32,
    #[serde(default)]
    pub damage: i32,
    #[serde(default)]
    pub penalty: i32,
}

fn default_score() -> i32 {
    10
}

impl AbilityInput {
    pub fn score(base_score: i32) -> Self {
        Self {
            base_score,
            drain: 0,
            damage: 0,
            penalty: 0,
        }
    }
}

impl Default for AbilityInput {
    fn default() -> Self {
        Self::score(default_score())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseAbilities {
    pub strength: AbilityInput,
    pub dexterity: AbilityInput,
    pub constitution: AbilityInput,
    pub intelligence: AbilityInput,
    pub wisdom: AbilityInput,
    pub charisma: AbilityInput,
}

impl BaseAbilities {
    pub fn get(&self, ability: Ability) -> &AbilityInput {
        match ability {
            Ability::Strength => &self.strength,
            Ability::Dexterity => &self.dexterity,
            Ability::Constitution => &self.constitution,
            Ability::Intelligence => &self.intelligence,
            Ability::Wisdom => &self.wisdom,
            Ability::Charisma => &self.charisma,
        }
    }

    pub fn get_mut(&mut self, ability: Ability) -> &mut AbilityInput {
        match ability {
            Ability::Strength => &mut self.strength,
            Ability::Dexterity => &mut self.dexterity,
            Ability::Constitution => &mut self.constitution,
            Ability::Intelligence => &mut self.intelligence,
            Ability::Wisdom => &mut self.wisdom,
            Ability::Charisma => &mut self.charisma,
        }
    }

    /// Scores in [`Ability::all`] order.
    pub fn from_scores(scores: [i32; 6]) -> Self {
        let mut abilities = Self::default();
        for (ability, score) in Ability::all().into_iter().zip(scores) {
            abilities.get_mut(ability).base_score = score;
        }
        abilities
    }
}

/// One character level. Index 0 is level 1.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSlot {
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub hp_roll: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentInstance {
    pub instance_id: String,
    pub item_id: String,
    #[serde(default = "default_true")]
    pub equipped: bool,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuffInstance {
    pub instance_id: String,
    pub buff_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

fn default_quantity() -> u32 {
    1
}

/// Ranks bought in one skill. Cross-class ranks are bought as half ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillRanks {
    pub ranks: i32,
    pub half_ranks: i32,
}

impl SkillRanks {
    pub fn total(&self) -> i32 {
        self.ranks + self.half_ranks.div_euclid(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub current_value: i32,
}

/// A processed level: which class it went to and at what class level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLevelEntry {
    pub class_id: String,
    pub class_level: usize,
    pub character_level: usize,
    pub hp_roll: Option<i32>,
}

/// Everything the player owns about a character.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CharacterBaseData {
    pub id: CharacterId,
    pub name: String,
    pub ability_method: AbilityMethod,
    #[serde(alias = "baseAbilityData")]
    pub base_abilities: BaseAbilities,
    /// Race entity id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    /// Overrides the race's size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeCategory>,
    pub level_slots: Vec<LevelSlot>,
    /// Caps how many level slots are processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<usize>,
    /// Id of the entity holding per-character-level providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_levels: Option<String>,
    pub equipment: Vec<EquipmentInstance>,
    pub buffs: Vec<BuffInstance>,
    pub selections: Selections,
    #[serde(deserialize_with = "deserialize_entity_listing")]
    pub custom_entities: Vec<StandardEntity>,
    pub current_damage: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_current_hp: Option<i32>,
    pub temporary_hp: i32,
    /// Keyed by skill id.
    pub skill_data: BTreeMap<String, SkillRanks>,
    /// Keyed by resource id. Resources without an entry start at their initial value.
    pub resource_current_values: BTreeMap<String, ResourceState>,
}

impl CharacterBaseData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_ability(mut self, ability: Ability, score: i32) -> Self {
        self.base_abilities.get_mut(ability).base_score = score;
        self
    }

    pub fn with_race(mut self, race_id: impl Into<String>) -> Self {
        self.race = Some(race_id.into());
        self
    }

    pub fn with_levels(mut self, class_id: &str, count: usize, hp_roll: i32) -> Self {
        for _ in 0..count {
            self.add_level(class_id, Some(hp_roll));
        }
        self
    }

    pub fn with_item(mut self, item_id: &str) -> Self {
        self.add_item(item_id);
        self
    }

    pub fn with_buff(mut self, buff_id: &str) -> Self {
        self.add_buff(buff_id);
        self
    }

    pub fn with_selection(mut self, key: impl Into<String>, entity_ids: &[&str]) -> Self {
        self.selections
            .insert(key.into(), entity_ids.iter().map(|id| id.to_string()).collect());
        self
    }

    pub fn with_skill_ranks(mut self, skill_id: &str, ranks: i32) -> Self {
        self.skill_data.entry(skill_id.to_string()).or_default().ranks = ranks;
        self
    }

    pub fn with_custom_entity(mut self, entity: StandardEntity) -> Self {
        self.custom_entities.push(entity);
        self
    }

    /// Number of level slots that count.
    pub fn character_level(&self) -> usize {
        self.level
            .map_or(self.level_slots.len(), |cap| cap.min(self.level_slots.len()))
    }

    /// Processed slots with a class, numbered per class.
    pub fn class_levels(&self) -> Vec<ClassLevelEntry> {
        let mut per_class: BTreeMap<&str, usize> = BTreeMap::new();
        let mut entries = Vec::new();
        for (index, slot) in self.level_slots.iter().take(self.character_level()).enumerate() {
            let Some(class_id) = &slot.class_id else {
                continue;
            };
            let class_level = per_class.entry(class_id.as_str()).or_insert(0);
            *class_level += 1;
            entries.push(ClassLevelEntry {
                class_id: class_id.clone(),
                class_level: *class_level,
                character_level: index + 1,
                hp_roll: slot.hp_roll,
            });
        }
        entries
    }

    /// Levels held in each class, in first-taken order.
    pub fn levels_by_class(&self) -> Vec<(String, usize)> {
        let mut totals: Vec<(String, usize)> = Vec::new();
        for entry in self.class_levels() {
            match totals.iter_mut().find(|(id, _)| *id == entry.class_id) {
                Some((_, levels)) => *levels = entry.class_level,
                None => totals.push((entry.class_id, entry.class_level)),
            }
        }
        totals
    }

    // ========================================================================
    // Updates
    // ========================================================================

    pub fn add_level(&mut self, class_id: &str, hp_roll: Option<i32>) {
        self.level_slots.push(LevelSlot {
            class_id: Some(class_id.to_string()),
            hp_roll,
        });
        if let Some(cap) = self.level.as_mut() {
            *cap += 1;
        }
    }

    pub fn remove_last_level(&mut self) -> Option<LevelSlot> {
        let slot = self.level_slots.pop()?;
        if let Some(cap) = self.level.as_mut() {
            *cap = (*cap).min(self.level_slots.len());
        }
        Some(slot)
    }

    fn next_instance_id(&self, base: &str, taken: impl Fn(&str) -> bool) -> String {
        (1..)
            .map(|n| format!("{base}-{n}"))
            .find(|id| !taken(id))
            .unwrap_or_else(|| base.to_string())
    }

    /// Add an equipped item and return its instance id.
    pub fn add_item(&mut self, item_id: &str) -> String {
        let instance_id = self.next_instance_id(item_id, |id| self.equipment.iter().any(|e| e.instance_id == id));
        self.equipment.push(EquipmentInstance {
            instance_id: instance_id.clone(),
            item_id: item_id.to_string(),
            equipped: true,
            quantity: 1,
        });
        instance_id
    }

    pub fn remove_item(&mut self, instance_id: &str) -> Option<EquipmentInstance> {
        let index = self.equipment.iter().position(|e| e.instance_id == instance_id)?;
        Some(self.equipment.remove(index))
    }

    /// Returns false when no such instance exists.
    pub fn set_equipped(&mut self, instance_id: &str, equipped: bool) -> bool {
        match self.equipment.iter_mut().find(|e| e.instance_id == instance_id) {
            Some(item) => {
                item.equipped = equipped;
                true
            }
            None => false,
        }
    }

    /// Add an active buff and return its instance id.
    pub fn add_buff(&mut self, buff_id: &str) -> String {
        let instance_id = self.next_instance_id(buff_id, |id| self.buffs.iter().any(|b| b.instance_id == id));
        self.buffs.push(BuffInstance {
            instance_id: instance_id.clone(),
            buff_id: buff_id.to_string(),
            active: true,
        });
        instance_id
    }

    pub fn remove_buff(&mut self, instance_id: &str) -> Option<BuffInstance> {
        let index = self.buffs.iter().position(|b| b.instance_id == instance_id)?;
        Some(self.buffs.remove(index))
    }

    pub fn set_buff_active(&mut self, instance_id: &str, active: bool) -> bool {
        match self.buffs.iter_mut().find(|b| b.instance_id == instance_id) {
            Some(buff) => {
                buff.active = active;
                true
            }
            None => false,
        }
    }

    /// Stored as-is; the sheet reports it unclamped.
    pub fn set_resource_current(&mut self, resource_id: &str, current_value: i32) {
        self.resource_current_values
            .insert(resource_id.to_string(), ResourceState { current_value });
    }

    pub fn select(&mut self, status: &SelectionStatus, entity_id: &str) -> Result<(), SelectionError> {
        apply_selection(&mut self.selections, status, entity_id)
    }

    pub fn deselect(&mut self, key: &str, entity_id: &str) -> Result<(), SelectionError> {
        remove_selection(&mut self.selections, key, entity_id)
    }
}

// ============================================================================
// Typed entity views
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BabProgression {
    Full,
    Medium,
    #[default]
    Poor,
}

impl BabProgression {
    pub fn base_attack_bonus(&self, level: usize) -> i32 {
        let level = level as i32;
        match self {
            BabProgression::Full => level,
            BabProgression::Medium => level * 3 / 4,
            BabProgression::Poor => level / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveProgression {
    Good,
    #[default]
    Poor,
}

impl SaveProgression {
    pub fn base_save(&self, level: usize) -> i32 {
        let level = level as i32;
        match self {
            _ if level == 0 => 0,
            SaveProgression::Good => 2 + level / 2,
            SaveProgression::Poor => level / 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveProgressions {
    pub fortitude: SaveProgression,
    pub reflex: SaveProgression,
    pub will: SaveProgression,
}

impl SaveProgressions {
    pub fn get(&self, save: SavingThrow) -> SaveProgression {
        match save {
            SavingThrow::Fortitude => self.fortitude,
            SavingThrow::Reflex => self.reflex,
            SavingThrow::Will => self.will,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelRow {
    pub providers: Vec<EntityProvider>,
}

/// Per-level provider table keyed by level number.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelTable(pub BTreeMap<String, LevelRow>);

impl LevelTable {
    pub fn providers_at(&self, level: usize) -> &[EntityProvider] {
        self.0
            .get(&level.to_string())
            .map(|row| row.providers.as_slice())
            .unwrap_or_default()
    }
}

/// Fields of a `class` entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassData {
    pub hit_die: u32,
    pub bab_progression: BabProgression,
    pub saves: SaveProgressions,
    pub levels: LevelTable,
    /// Skill ids, or parent skill ids such as `craft`.
    pub class_skills: Vec<String>,
}

impl Default for ClassData {
    fn default() -> Self {
        Self {
            hit_die: 8,
            bab_progression: BabProgression::default(),
            saves: SaveProgressions::default(),
            levels: LevelTable::default(),
            class_skills: Vec::new(),
        }
    }
}

/// Fields of the system levels entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemLevelsData {
    pub levels: LevelTable,
}

/// Fields of a `race` entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RaceData {
    pub size: SizeCategory,
    pub base_speed: i32,
    pub speeds: BTreeMap<SpeedKind, i32>,
}

impl Default for RaceData {
    fn default() -> Self {
        Self {
            size: SizeCategory::Medium,
            base_speed: 30,
            speeds: BTreeMap::new(),
        }
    }
}

/// One entry of the `resources` list any entity may carry, e.g. daily
/// bardic music uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_value_formula: Formula,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value_formula: Option<Formula>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_charges_per_use_formula: Option<Formula>,
    /// Defaults to the maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recharge_formula: Option<Formula>,
    /// Defaults to the maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value_formula: Option<Formula>,
}

/// Fields of a `weapon` entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeaponData {
    #[serde(alias = "damage")]
    pub damage_dice: String,
    pub critical_range: u32,
    pub critical_multiplier: u32,
    #[serde(alias = "weaponType")]
    pub attack_type: AttackType,
    pub finesse: bool,
    pub two_handed: bool,
    /// Ranged weapons add strength only when this is set.
    pub strength_to_damage: Option<bool>,
    pub enhancement_bonus: i32,
    pub masterwork: bool,
}

impl Default for WeaponData {
    fn default() -> Self {
        Self {
            damage_dice: "1d3".to_string(),
            critical_range: 20,
            critical_multiplier: 2,
            attack_type: AttackType::Melee,
            finesse: false,
            two_handed: false,
            strength_to_damage: None,
            enhancement_bonus: 0,
            masterwork: false,
        }
    }
}

impl WeaponData {
    /// Enhancement to attack rolls; masterwork counts as +1 without magic.
    pub fn attack_enhancement(&self) -> i32 {
        if self.enhancement_bonus == 0 && self.masterwork {
            1
        } else {
            self.enhancement_bonus
        }
    }
}

/// Fields of an `armor` or `shield` entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArmorData {
    #[serde(alias = "shieldBonus")]
    pub armor_bonus: i32,
    pub enhancement_bonus: i32,
    pub max_dex_bonus: Option<i32>,
}

impl ArmorData {
    pub fn total_bonus(&self) -> i32 {
        self.armor_bonus + self.enhancement_bonus
    }
}
