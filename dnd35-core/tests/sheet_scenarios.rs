//! Character sheet calculation against the test compendium.
//!
//! Each test builds a character the way a player would (race, levels,
//! equipment, buffs, choices) and checks the derived numbers.

mod common;

use common::{context, fighter, human, sheet};
use dnd35_core::changes::{Change, ChangeTarget};
use dnd35_core::character::SkillRanks;
use dnd35_core::stats::{Ability, SaveTarget, SavingThrow, SizeCategory, SpeedKind};
use dnd35_core::sheet::recharge_all_resources;
use dnd35_core::{
    calculate_character_sheet, consume_resource, recalculate_attack, AttackContextState, BonusType, CharacterBaseData,
    DiagnosticKind, StandardEntity,
};
use serde_json::json;

fn custom_variable(unique_id: &str, formula: &str) -> Change {
    Change::new(
        ChangeTarget::CustomVariable {
            unique_id: unique_id.to_string(),
        },
        formula,
        BonusType::Untyped,
    )
}

// ============================================================================
// Ability scores
// ============================================================================

#[test]
fn test_enhancement_bonuses_do_not_stack() {
    let base = human("Kyra")
        .with_ability(Ability::Strength, 14)
        .with_item("belt-of-giant-strength")
        .with_buff("bulls-strength");
    let sheet = sheet(&base);

    let strength = sheet.ability(Ability::Strength).unwrap();
    assert_eq!(strength.base_score, 14);
    assert_eq!(strength.total_score, 18);
    assert_eq!(strength.modifier, 4);

    let belt = strength
        .source_values
        .iter()
        .find(|v| v.name == "Belt of Giant Strength +2")
        .unwrap();
    assert!(!belt.relevant);
    let bulls = strength.source_values.iter().find(|v| v.name == "Bull's Strength").unwrap();
    assert!(bulls.relevant);
    assert_eq!(sheet.substitution_values.number("ability.strength.modifier"), Some(4.0));
}

#[test]
fn test_ability_damage_and_drain() {
    let mut base = human("Drained").with_ability(Ability::Constitution, 14);
    base.base_abilities.constitution.drain = 2;
    base.base_abilities.constitution.damage = 1;
    let sheet = sheet(&base);

    let con = sheet.ability(Ability::Constitution).unwrap();
    assert_eq!(con.total_score, 11);
    assert_eq!(con.modifier, 0);
}

#[test]
fn test_racial_modifiers_and_size() {
    let base = CharacterBaseData::new("Lem")
        .with_race("halfling")
        .with_ability(Ability::Strength, 10)
        .with_ability(Ability::Dexterity, 14);
    let sheet = sheet(&base);

    assert_eq!(sheet.ability(Ability::Strength).unwrap().total_score, 8);
    assert_eq!(sheet.ability(Ability::Dexterity).unwrap().total_score, 16);
    assert_eq!(sheet.size.current_size, SizeCategory::Small);
    assert_eq!(sheet.size.modifier, 1);
    assert_eq!(sheet.speed(SpeedKind::Land).unwrap().total_value, 20);

    // Halfling luck: +1 racial to every save.
    assert_eq!(sheet.saving_throw(SavingThrow::Fortitude).unwrap().total_value, 1);
    assert_eq!(sheet.saving_throw(SavingThrow::Reflex).unwrap().total_value, 4);
    assert_eq!(sheet.saving_throw(SavingThrow::Will).unwrap().total_value, 1);
    assert_eq!(sheet.initiative.total_value, 3);
}

// ============================================================================
// Armor class
// ============================================================================

#[test]
fn test_dodge_stacks_deflection_does_not() {
    let base = fighter(1)
        .with_ability(Ability::Dexterity, 12)
        .with_selection("class:fighter:1#bonus-feat", &["dodge"])
        .with_buff("haste")
        .with_item("ring-of-protection")
        .with_buff("shield-of-faith");
    let sheet = sheet(&base);
    let ac = &sheet.armor_class;

    // 10 + 1 dex + 1 dodge + 1 dodge + 2 deflection
    assert_eq!(ac.total_ac.total_value, 15);
    assert_eq!(ac.touch_ac.total_value, 15);
    // Dexterity and dodge are lost when flat-footed.
    assert_eq!(ac.flat_footed_ac.total_value, 12);

    let ring = ac
        .total_ac
        .source_values
        .iter()
        .find(|v| v.name == "Ring of Protection +1")
        .unwrap();
    assert!(!ring.relevant);
}

#[test]
fn test_armor_caps_dexterity() {
    let base = CharacterBaseData::new("Lem")
        .with_race("halfling")
        .with_ability(Ability::Dexterity, 18)
        .with_item("chain-shirt");
    let sheet = sheet(&base);
    let ac = &sheet.armor_class;

    assert_eq!(sheet.ability(Ability::Dexterity).unwrap().modifier, 5);
    assert_eq!(ac.max_dex_bonus, Some(4));
    // 10 + 4 dex + 1 size + 4 armor
    assert_eq!(ac.total_ac.total_value, 19);
    assert_eq!(ac.touch_ac.total_value, 15);
    assert_eq!(ac.flat_footed_ac.total_value, 15);
}

#[test]
fn test_lowest_max_dex_wins_and_shield_adds() {
    let base = human("Tank")
        .with_ability(Ability::Dexterity, 14)
        .with_item("full-plate")
        .with_item("heavy-steel-shield")
        .with_item("amulet-of-natural-armor");
    let sheet = sheet(&base);
    let ac = &sheet.armor_class;

    assert_eq!(ac.max_dex_bonus, Some(1));
    assert_eq!(ac.natural_ac.total_value, 1);
    // 10 + 1 dex + 8 armor + 2 shield + 1 natural
    assert_eq!(ac.total_ac.total_value, 22);
    assert_eq!(ac.touch_ac.total_value, 11);
    assert_eq!(ac.flat_footed_ac.total_value, 21);
    assert_eq!(sheet.substitution_values.number("ac.total"), Some(22.0));
}

#[test]
fn test_size_change_shifts_modifiers() {
    let base = fighter(1).with_buff("enlarge-person").with_item("longsword");
    let sheet = sheet(&base);

    assert_eq!(sheet.size.base_size, SizeCategory::Medium);
    assert_eq!(sheet.size.current_size, SizeCategory::Large);
    assert_eq!(sheet.size.modifier, -1);
    assert_eq!(sheet.ability(Ability::Strength).unwrap().total_score, 18);
    assert_eq!(sheet.ability(Ability::Dexterity).unwrap().modifier, -1);
    // 10 - 1 dex - 1 size
    assert_eq!(sheet.armor_class.total_ac.total_value, 8);
    // 1 bab + 4 str - 1 size
    assert_eq!(sheet.attack_data.attacks[0].attack_bonus.total_value, 4);
}

#[test]
fn test_size_override_beats_race() {
    let mut base = human("Odd");
    base.size = Some(SizeCategory::Small);
    let sheet = sheet(&base);
    assert_eq!(sheet.size.base_size, SizeCategory::Small);
    assert_eq!(sheet.armor_class.total_ac.total_value, 11);
}

// ============================================================================
// Class progression
// ============================================================================

#[test]
fn test_fighter_progression() {
    let sheet = sheet(&fighter(3));

    assert_eq!(sheet.level, 3);
    assert_eq!(sheet.classes.len(), 1);
    assert_eq!(sheet.classes[0].level, 3);
    assert_eq!(sheet.base_attack_bonus.base_value, 3);
    assert_eq!(sheet.base_attack_bonus.total_value, 3);
    assert_eq!(sheet.base_attack_bonus.multiple_base_attack_bonuses, vec![3]);

    // Good fortitude plus constitution, poor reflex and will.
    let fortitude = sheet.saving_throw(SavingThrow::Fortitude).unwrap();
    assert_eq!(fortitude.base_value, 3);
    assert_eq!(fortitude.total_value, 5);
    assert_eq!(sheet.saving_throw(SavingThrow::Reflex).unwrap().total_value, 1);
    assert_eq!(sheet.saving_throw(SavingThrow::Will).unwrap().total_value, 1);

    // Three rolls of 10 plus +2 constitution per level.
    assert_eq!(sheet.hit_points.max_hp, 36);
    assert_eq!(sheet.hit_points.current_hp, 36);
}

#[test]
fn test_iterative_attacks_from_bab() {
    let sheet = sheet(&fighter(11));
    assert_eq!(sheet.base_attack_bonus.multiple_base_attack_bonuses, vec![11, 6, 1]);
}

#[test]
fn test_multiclass_sums_progressions() {
    let base = human("Gish")
        .with_levels("fighter", 2, 10)
        .with_levels("wizard", 2, 4);
    let sheet = sheet(&base);

    assert_eq!(sheet.classes.len(), 2);
    // Full 2 + poor 1
    assert_eq!(sheet.base_attack_bonus.total_value, 3);
    // Good 3 + poor 0
    assert_eq!(sheet.saving_throw(SavingThrow::Fortitude).unwrap().total_value, 3);
    // Poor 0 + good 3
    assert_eq!(sheet.saving_throw(SavingThrow::Will).unwrap().total_value, 3);
    assert_eq!(sheet.hit_points.max_hp, 28);
}

#[test]
fn test_damage_temporary_and_custom_hit_points() {
    let mut base = fighter(3);
    base.current_damage = 5;
    base.temporary_hp = 4;
    let hp = sheet(&base).hit_points;
    assert_eq!(hp.max_hp, 36);
    assert_eq!(hp.current_hp, 31);
    assert_eq!(hp.temporary_hp, 4);

    base.custom_current_hp = Some(50);
    assert_eq!(sheet(&base).hit_points.current_hp, 36);
}

#[test]
fn test_level_cap_ignores_extra_slots() {
    let mut base = fighter(4);
    base.level = Some(2);
    let sheet = sheet(&base);
    assert_eq!(sheet.level, 2);
    assert_eq!(sheet.base_attack_bonus.total_value, 2);
    assert_eq!(sheet.hit_points.max_hp, 24);
}

// ============================================================================
// Speeds
// ============================================================================

#[test]
fn test_speed_enhancements_do_not_stack() {
    let base = human("Runner").with_item("boots-of-striding").with_buff("haste");
    let sheet = sheet(&base);

    let land = sheet.speed(SpeedKind::Land).unwrap();
    assert_eq!(land.total_value, 60);
    assert!(sheet.speed(SpeedKind::Fly).is_none());
    assert_eq!(sheet.substitution_values.number("speed.land.total"), Some(60.0));
}

#[test]
fn test_change_can_grant_new_speed() {
    let wings = StandardEntity::new("wings", "buff", "Wings").with_change(Change::new(
        ChangeTarget::Speed { speed: SpeedKind::Fly },
        "60",
        BonusType::Untyped,
    ));
    let base = human("Flyer").with_custom_entity(wings);
    let sheet = sheet(&base);
    assert_eq!(sheet.speed(SpeedKind::Fly).unwrap().total_value, 60);
    assert_eq!(sheet.speed(SpeedKind::Land).unwrap().total_value, 30);
}

// ============================================================================
// Attacks
// ============================================================================

#[test]
fn test_longsword_attack() {
    let base = fighter(3).with_ability(Ability::Strength, 18).with_item("longsword");
    let sheet = sheet(&base);

    assert_eq!(sheet.attack_data.attacks.len(), 1);
    let attack = &sheet.attack_data.attacks[0];
    assert_eq!(attack.instance_id, "item:longsword-1");
    assert_eq!(attack.weapon_id, "longsword");
    assert_eq!(attack.attack_bonus.total_value, 7);
    assert_eq!(attack.full_attack, vec![7]);
    assert_eq!(attack.damage.formula, "1d8 + 4");
    assert_eq!(attack.damage.critical_formula, "2d8 + 8");
    assert_eq!(attack.critical_confirmation.total_value, 7);
    assert!(attack.applied_contextual_changes.is_empty());
}

#[test]
fn test_two_handed_and_ranged_strength() {
    let base = fighter(3)
        .with_ability(Ability::Strength, 18)
        .with_ability(Ability::Dexterity, 14)
        .with_item("greatsword")
        .with_item("longbow");
    let sheet = sheet(&base);

    let greatsword = sheet.attack_data.attacks.iter().find(|a| a.weapon_id == "greatsword").unwrap();
    assert_eq!(greatsword.damage.formula, "2d6 + 6");
    assert_eq!(greatsword.damage.critical_formula, "4d6 + 12");

    let longbow = sheet.attack_data.attacks.iter().find(|a| a.weapon_id == "longbow").unwrap();
    // 3 bab + 2 dex + 1 masterwork
    assert_eq!(longbow.attack_bonus.total_value, 6);
    assert_eq!(longbow.damage.formula, "1d8");
    assert_eq!(longbow.damage.critical_formula, "3d8");
}

#[test]
fn test_extra_damage_dice_are_not_multiplied() {
    let base = fighter(3).with_ability(Ability::Strength, 18).with_item("flaming-longsword");
    let sheet = sheet(&base);

    let attack = &sheet.attack_data.attacks[0];
    assert_eq!(attack.attack_bonus.total_value, 8);
    assert_eq!(attack.damage.extra_dice, vec!["1d6"]);
    assert_eq!(attack.damage.formula, "1d8 + 1d6 + 5");
    assert_eq!(attack.damage.critical_formula, "2d8 + 1d6 + 10");
}

#[test]
fn test_feat_and_buff_attack_bonuses() {
    let base = fighter(1)
        .with_selection("class:fighter:1#bonus-feat", &["weapon-focus"])
        .with_buff("haste")
        .with_item("longsword");
    let sheet = sheet(&base);
    // 1 bab + 3 str + 1 weapon focus + 1 haste
    assert_eq!(sheet.attack_data.attacks[0].attack_bonus.total_value, 6);
}

#[test]
fn test_unequipped_weapon_has_no_attack() {
    let mut base = fighter(1);
    let instance = base.add_item("longsword");
    base.set_equipped(&instance, false);
    assert!(sheet(&base).attack_data.attacks.is_empty());
}

#[test]
fn test_recalculate_with_flanking() {
    let ctx = context();
    let base = fighter(3).with_ability(Ability::Strength, 18).with_item("longsword");
    let sheet = calculate_character_sheet(&base, &ctx);

    let names: Vec<&str> = sheet
        .attack_data
        .attack_context_changes
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert!(names.contains(&"Flanking"));

    let state = AttackContextState::new().with_change("Flanking");
    let attack = recalculate_attack(&sheet, 0, &state, &ctx).unwrap();
    assert_eq!(attack.attack_bonus.total_value, 9);
    assert_eq!(attack.applied_contextual_changes, vec!["Flanking"]);
    let flanking = attack.attack_bonus.sources.iter().find(|s| s.name == "Flanking").unwrap();
    assert_eq!(flanking.origin.as_ref().unwrap().origin_type, "contextualChange");

    // The stored sheet is untouched.
    assert_eq!(sheet.attack_data.attacks[0].attack_bonus.total_value, 7);
    assert!(recalculate_attack(&sheet, 5, &state, &ctx).is_none());
}

#[test]
fn test_melee_modifiers_skip_ranged_attacks() {
    let ctx = context();
    let base = fighter(3).with_item("longbow");
    let sheet = calculate_character_sheet(&base, &ctx);
    let before = sheet.attack_data.attacks[0].attack_bonus.total_value;

    let state = AttackContextState::new().with_change("Flanking").with_change("High Ground");
    let attack = recalculate_attack(&sheet, 0, &state, &ctx).unwrap();
    assert_eq!(attack.attack_bonus.total_value, before + 1);
    assert_eq!(attack.applied_contextual_changes, vec!["High Ground"]);
}

#[test]
fn test_power_attack_variable_is_clamped() {
    let ctx = context();
    let base = fighter(1)
        .with_selection("class:fighter:1#bonus-feat", &["power-attack"])
        .with_item("longsword");
    let sheet = calculate_character_sheet(&base, &ctx);

    let attack = &sheet.attack_data.attacks[0];
    assert_eq!(attack.attack_bonus.total_value, 4);
    assert_eq!(attack.damage.formula, "1d8 + 3");
    assert!(sheet
        .attack_data
        .attack_context_changes
        .iter()
        .any(|c| c.name == "Power Attack"));

    // Switched on without a value: the slider minimum applies.
    let state = AttackContextState::new().with_change("Power Attack");
    let attack = recalculate_attack(&sheet, 0, &state, &ctx).unwrap();
    assert_eq!(attack.attack_bonus.total_value, 3);
    assert_eq!(attack.damage.formula, "1d8 + 4");

    let state = AttackContextState::new().with_variable("Power Attack", "powerAttackPoints", 5.0);
    let attack = recalculate_attack(&sheet, 0, &state, &ctx).unwrap();
    assert_eq!(attack.attack_bonus.total_value, 1);
    assert_eq!(attack.damage.formula, "1d8 + 6");
}

// ============================================================================
// Skills
// ============================================================================

#[test]
fn test_skill_combines_ranks_ability_and_changes() {
    let base = fighter(1).with_skill_ranks("climb", 4).with_item("cloak-of-elvenkind");
    let sheet = sheet(&base);

    let climb = sheet.skill("climb").unwrap();
    // 4 ranks + 3 strength
    assert_eq!(climb.total_bonus, 7);
    assert_eq!(climb.ranks, 4);
    assert!(climb.class_skill);
    assert_eq!(sheet.substitution_values.number("skills.climb.total"), Some(7.0));
    assert_eq!(sheet.substitution_values.number("skills.climb.ranks"), Some(4.0));

    let hide = sheet.skill("hide").unwrap();
    assert_eq!(hide.total_bonus, 5);
    assert!(!hide.class_skill);
    assert!(hide.source_values.iter().any(|v| v.name == "Cloak of Elvenkind" && v.relevant));

    let perform = sheet.skill("perform").unwrap();
    assert!(!perform.usable());
}

#[test]
fn test_half_ranks_and_ability_wide_changes() {
    let mut base = fighter(1).with_custom_entity(
        StandardEntity::new("tinkerer", "feat", "Tinkerer")
            .with_change(Change::new(ChangeTarget::AbilitySkills { ability: Ability::Dexterity }, "-1", BonusType::Untyped))
            .with_change(Change::new(ChangeTarget::Skill { skill: "craft".into() }, "2", BonusType::Competence)),
    );
    base.skill_data.insert("tumble".into(), SkillRanks { ranks: 0, half_ranks: 5 });
    let sheet = sheet(&base);

    let tumble = sheet.skill("tumble").unwrap();
    assert_eq!(tumble.ranks, 2);
    assert_eq!(tumble.total_bonus, 1);
    assert_eq!(sheet.skill("hide").unwrap().total_bonus, -1);

    // Craft (Alchemy) comes from the compendium and inherits from Craft.
    let alchemy = sheet.skill("craftAlchemy").unwrap();
    assert_eq!(alchemy.parent_skill.as_deref(), Some("craft"));
    assert_eq!(alchemy.ability, Ability::Intelligence);
    assert_eq!(alchemy.total_bonus, 2);
    assert!(alchemy.class_skill);
}

#[test]
fn test_custom_variable_reads_skill_totals() {
    let feature = StandardEntity::new("scout", "classFeature", "Scout")
        .with_change(custom_variable("ambush", "@skills.hide.total + 2"));
    let sheet = sheet(&human("Scout").with_item("cloak-of-elvenkind").with_custom_entity(feature));
    assert_eq!(sheet.custom_variable("ambush").unwrap().total_value, 7);
}

// ============================================================================
// Resources
// ============================================================================

#[test]
fn test_class_resource_scales_with_level() {
    let sheet = sheet(&human("Lyra").with_levels("bard", 3, 6));

    let music = sheet.resource("bardic_music_uses").unwrap();
    assert_eq!(music.name, "Bardic Music Uses");
    assert_eq!(music.max.total_value, 3);
    assert_eq!(music.min.total_value, 0);
    assert_eq!(music.current_value, 3);
    assert_eq!(music.default_charges_per_use.total_value, 1);
    assert_eq!(music.recharge_amount.total_value, 3);

    let values = &sheet.substitution_values;
    assert_eq!(values.number("resources.bardic_music_uses.max"), Some(3.0));
    assert_eq!(values.number("resources.bardic_music_uses.current"), Some(3.0));
    assert_eq!(sheet.custom_variable("resources.bardic_music_uses.current").unwrap().total_value, 3);
}

#[test]
fn test_custom_variable_changes_raise_resource_max() {
    let feat = StandardEntity::new("extra-music", "feat", "Extra Music")
        .with_change(custom_variable("resources.bardic_music_uses.max", "4"));
    let sheet = sheet(&human("Lyra").with_levels("bard", 2, 6).with_custom_entity(feat));

    let music = sheet.resource("bardic_music_uses").unwrap();
    assert_eq!(music.max.total_value, 6);
    assert_eq!(music.current_value, 6);
    assert_eq!(
        sheet
            .custom_variables
            .iter()
            .filter(|v| v.unique_id == "resources.bardic_music_uses.max")
            .count(),
        1
    );
}

#[test]
fn test_resource_usage_is_stored_on_the_character() {
    let ctx = context();
    let mut base = human("Lyra").with_levels("bard", 3, 6);
    let sheet = calculate_character_sheet(&base, &ctx);
    let music = sheet.resource("bardic_music_uses").unwrap();
    assert_eq!(consume_resource(&mut base, music, Some(2)), 1);

    let sheet = calculate_character_sheet(&base, &ctx);
    assert_eq!(sheet.resource("bardic_music_uses").unwrap().current_value, 1);
    assert_eq!(sheet.substitution_values.number("resources.bardic_music_uses.current"), Some(1.0));

    // Stored values are reported as-is, even below the minimum.
    base.set_resource_current("bardic_music_uses", -2);
    let sheet = calculate_character_sheet(&base, &ctx);
    assert_eq!(sheet.resource("bardic_music_uses").unwrap().current_value, -2);

    recharge_all_resources(&mut base, &sheet);
    let sheet = calculate_character_sheet(&base, &ctx);
    assert_eq!(sheet.resource("bardic_music_uses").unwrap().current_value, 1);
}

#[test]
fn test_resource_defined_on_custom_entity() {
    let training = StandardEntity::new("ki-training", "classFeature", "Ki Training").with_field(
        "resources",
        json!([{
            "resourceId": "ki",
            "name": "Ki",
            "maxValueFormula": "@ability.wisdom.modifier + 2",
            "initialValueFormula": { "expression": "1" }
        }]),
    );
    let broken = StandardEntity::new("broken-pool", "classFeature", "Broken Pool")
        .with_field("resources", json!("lots"));
    let base = human("Ember")
        .with_ability(Ability::Wisdom, 14)
        .with_custom_entity(training)
        .with_custom_entity(broken);
    let sheet = sheet(&base);

    let ki = sheet.resource("ki").unwrap();
    assert_eq!(ki.max.total_value, 4);
    assert_eq!(ki.current_value, 1);
    assert_eq!(ki.recharge_amount.total_value, 4);
    assert_eq!(sheet.resources.len(), 1);
    assert!(sheet.diagnostics.has(DiagnosticKind::SchemaViolation));
}

// ============================================================================
// Custom variables and entity variables
// ============================================================================

#[test]
fn test_custom_variables_evaluate_in_dependency_order() {
    let talent = StandardEntity::new("sneaky", "classFeature", "Sneaky")
        .with_change(custom_variable("sneakAttackDamage", "@customVariable.sneakAttackDice * 2"))
        .with_change(custom_variable("sneakAttackDice", "@level - 1"));
    let sheet = sheet(&fighter(3).with_custom_entity(talent));

    let ids: Vec<&str> = sheet.custom_variables.iter().map(|v| v.unique_id.as_str()).collect();
    assert_eq!(ids, vec!["sneakAttackDamage", "sneakAttackDice"]);
    assert_eq!(sheet.custom_variable("sneakAttackDice").unwrap().total_value, 2);
    assert_eq!(sheet.custom_variable("sneakAttackDamage").unwrap().total_value, 4);
    assert_eq!(sheet.substitution_values.number("customVariable.sneakAttackDamage"), Some(4.0));
}

#[test]
fn test_custom_variable_cycle_is_reported() {
    let broken = StandardEntity::new("broken", "classFeature", "Broken")
        .with_change(custom_variable("a", "@customVariable.b + 1"))
        .with_change(custom_variable("b", "@customVariable.a"))
        .with_change(custom_variable("c", "3"));
    let sheet = sheet(&human("Loop").with_custom_entity(broken));

    assert_eq!(sheet.custom_variable("a").unwrap().total_value, 0);
    assert_eq!(sheet.custom_variable("b").unwrap().total_value, 0);
    assert_eq!(sheet.custom_variable("c").unwrap().total_value, 3);
    assert!(sheet.diagnostics.has(DiagnosticKind::CustomVariableCycle));
}

#[test]
fn test_change_reads_its_own_entity_fields() {
    let charm = StandardEntity::new("lucky-charm", "item", "Lucky Charm")
        .with_field("luckBonus", json!(2))
        .with_change(Change::new(
            ChangeTarget::SavingThrow { save: SaveTarget::All },
            "@entity.luckBonus",
            BonusType::Luck,
        ));
    let sheet = sheet(&human("Lucky").with_custom_entity(charm));
    for save in SavingThrow::all() {
        assert_eq!(sheet.saving_throw(save).unwrap().total_value, 2);
    }
}

#[test]
fn test_formula_reads_earlier_stats() {
    let feature = StandardEntity::new("mighty", "classFeature", "Mighty").with_change(Change::new(
        ChangeTarget::Hp,
        "@ability.strength.modifier * 2",
        BonusType::Untyped,
    ));
    let sheet = sheet(&fighter(1).with_custom_entity(feature));
    // 10 rolled + 2 con + 6 from strength
    assert_eq!(sheet.hit_points.max_hp, 18);
}

// ============================================================================
// Missing content and baselines
// ============================================================================

#[test]
fn test_missing_content_is_diagnosed_not_fatal() {
    let base = human("Lost")
        .with_item("vorpal-blade")
        .with_buff("wish")
        .with_levels("psion", 2, 6);
    let sheet = sheet(&base);

    assert!(sheet.diagnostics.has(DiagnosticKind::EntityNotFound));
    assert_eq!(sheet.diagnostics.of_kind(DiagnosticKind::ClassNotFound).count(), 1);
    assert_eq!(sheet.level, 2);
    assert_eq!(sheet.base_attack_bonus.total_value, 0);
    assert!(sheet.attack_data.attacks.is_empty());
}

#[test]
fn test_empty_character_baseline() {
    let sheet = sheet(&CharacterBaseData::new("Nobody"));

    assert_eq!(sheet.level, 0);
    assert!(sheet.classes.is_empty());
    for ability in Ability::all() {
        let score = sheet.ability(ability).unwrap();
        assert_eq!((score.total_score, score.modifier), (10, 0));
    }
    assert_eq!(sheet.armor_class.total_ac.total_value, 10);
    assert_eq!(sheet.hit_points.max_hp, 0);
    assert_eq!(sheet.base_attack_bonus.multiple_base_attack_bonuses, vec![0]);
    assert_eq!(sheet.speeds.len(), 1);
    assert_eq!(sheet.speed(SpeedKind::Land).unwrap().total_value, 30);
    assert!(sheet.attack_data.attacks.is_empty());
    assert_eq!(sheet.attack_data.attack_context_changes.len(), 5);
    assert!(sheet.diagnostics.is_empty());
}

#[test]
fn test_calculation_is_deterministic() {
    let ctx = context();
    let base = fighter(3)
        .with_selection("class:fighter:1#bonus-feat", &["power-attack"])
        .with_item("longsword")
        .with_buff("haste");
    let first = calculate_character_sheet(&base, &ctx);
    let second = calculate_character_sheet(&base, &ctx);
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}
