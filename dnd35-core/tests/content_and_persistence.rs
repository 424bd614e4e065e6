//! Compendium loading, schema checks surfaced on the sheet, and the JSON
//! shapes characters and sheets are stored and shipped in.

mod common;

use common::{compendium, context, fighter, SRD_JSON};
use dnd35_core::ability_generation::{validate_point_buy, AbilityGenerationError, DEFAULT_POINT_BUY_BUDGET};
use dnd35_core::character::BaseAbilities;
use dnd35_core::compendium::EntityQuery;
use dnd35_core::filter::{apply_filter_config, initial_filter_state};
use dnd35_core::stats::Ability;
use dnd35_core::{
    calculate_character_sheet, AbilityMethod, CalculationContext, CharacterBaseData, Compendium, CompendiumDataPort,
    CompendiumError, DiagnosticKind, InMemoryCompendiumPort,
};
use serde_json::{json, Value};

fn with_extra_weapon(weapon: Value) -> String {
    let mut raw: Value = serde_json::from_str(SRD_JSON).unwrap();
    raw["entities"]["weapon"].as_array_mut().unwrap().push(weapon);
    raw.to_string()
}

// ============================================================================
// Compendium content
// ============================================================================

#[test]
fn test_fixture_passes_strict_loading() {
    let compendium = Compendium::from_json_strict(SRD_JSON).unwrap();
    assert!(compendium.violations().is_empty());
    assert!(compendium.entity_types().contains(&"classFeature"));
    assert_eq!(compendium.entities_of_type("feat").count(), 9);
}

#[test]
fn test_feat_browser_filters() {
    let ctx = context();
    let config = ctx.filter_registry.get("feat").unwrap();
    let feats: Vec<_> = ctx.compendium.entities_of_type("feat").cloned().collect();

    let mut state = initial_filter_state(config);
    assert!(state.values().all(Value::is_null));
    assert_eq!(apply_filter_config(&feats, config, &state).len(), 9);

    state.insert("category".into(), json!("general"));
    let general = apply_filter_config(&feats, config, &state);
    assert_eq!(general.len(), 1);
    assert_eq!(general[0].id, "iron-will");

    state.insert("category".into(), Value::Null);
    state.insert("tags".into(), json!(["fighter"]));
    let ids: Vec<&str> = apply_filter_config(&feats, config, &state)
        .iter()
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(ids, vec!["power-attack", "weapon-focus", "great-cleave"]);
}

#[test]
fn test_data_port_pages_entities() {
    let port = InMemoryCompendiumPort::new().with_compendium(compendium());
    let query = EntityQuery {
        limit: Some(4),
        ..EntityQuery::default()
    };
    let page = port.entities("srd-test", "feat", &query);
    assert_eq!(page.total, 9);
    assert_eq!(page.entities.len(), 4);
    assert!(page.has_more);

    assert!(port.entity_by_id("srd-test", "feat", "dodge").is_some());
    assert!(port.entity_by_id("srd-test", "weapon", "dodge").is_none());
    assert!(matches!(port.load_compendium("homebrew"), Err(CompendiumError::NotFound(_))));
}

#[test]
fn test_schema_violations_reach_the_sheet() {
    let json = with_extra_weapon(json!({
        "id": "rusty-blade",
        "entityType": "weapon",
        "name": "Rusty Blade",
        "criticalMultiplier": "lots"
    }));
    assert!(matches!(
        Compendium::from_json_strict(&json),
        Err(CompendiumError::SchemaViolations(v)) if v.len() == 2
    ));

    let ctx = CalculationContext::new(Compendium::from_json(&json).unwrap());
    let base = fighter(1).with_item("rusty-blade");
    let sheet = calculate_character_sheet(&base, &ctx);

    let violations: Vec<_> = sheet.diagnostics.of_kind(DiagnosticKind::SchemaViolation).collect();
    assert_eq!(violations.len(), 2);
    assert!(violations
        .iter()
        .all(|d| d.context.as_deref() == Some("item:rusty-blade-1")));
    // The weapon still attacks with its defaults.
    assert_eq!(sheet.attack_data.attacks.len(), 1);

    // Violations of content the character does not use stay quiet.
    let bystander = calculate_character_sheet(&fighter(1), &ctx);
    assert!(!bystander.diagnostics.has(DiagnosticKind::SchemaViolation));
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let json = with_extra_weapon(json!({
        "id": "longsword",
        "entityType": "weapon",
        "name": "Another Longsword",
        "damageDice": "1d8"
    }));
    assert!(matches!(
        Compendium::from_json(&json),
        Err(CompendiumError::DuplicateId(id)) if id == "longsword"
    ));
}

// ============================================================================
// Stored characters
// ============================================================================

#[test]
fn test_stored_character_loads_and_calculates() {
    let stored = json!({
        "name": "Valeros",
        "race": "human",
        "baseAbilityData": { "strength": { "baseScore": 16 }, "constitution": { "baseScore": 12 } },
        "levelSlots": [{ "classId": "fighter", "hpRoll": 10 }],
        "equipment": [{ "instanceId": "sword", "itemId": "longsword" }],
        "buffs": [{ "instanceId": "b1", "buffId": "haste", "active": false }],
        "selections": { "class:fighter:1#bonus-feat": ["weapon-focus"] },
        "uiTheme": "dark"
    });
    let base: CharacterBaseData = serde_json::from_value(stored).unwrap();
    let sheet = calculate_character_sheet(&base, &context());

    assert_eq!(sheet.hit_points.max_hp, 11);
    let attack = &sheet.attack_data.attacks[0];
    assert_eq!(attack.instance_id, "item:sword");
    // 1 bab + 3 str + 1 weapon focus; haste is switched off
    assert_eq!(attack.attack_bonus.total_value, 5);
    assert!(sheet.diagnostics.is_empty());
}

#[test]
fn test_character_survives_save_and_load() {
    let mut base = fighter(2)
        .with_selection("class:fighter:1#bonus-feat", &["dodge"])
        .with_item("longsword")
        .with_buff("haste")
        .with_skill_ranks("climb", 5);
    base.current_damage = 3;
    base.set_resource_current("bardic_music_uses", 2);
    let saved = serde_json::to_string(&base).unwrap();
    let loaded: CharacterBaseData = serde_json::from_str(&saved).unwrap();
    assert_eq!(loaded, base);

    let raw: Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(raw["skillData"]["climb"]["ranks"], json!(5));
    assert_eq!(raw["resourceCurrentValues"]["bardic_music_uses"]["currentValue"], json!(2));
}

#[test]
fn test_point_buy_character() {
    assert_eq!(
        validate_point_buy(&[16, 14, 14, 10, 10, 8], DEFAULT_POINT_BUY_BUDGET),
        Err(AbilityGenerationError::BudgetExceeded { spent: 26, budget: 25 })
    );
    // 10 + 6 + 4 + 2 + 2 + 0
    let scores = [16u8, 14, 12, 10, 10, 8];
    let spent = validate_point_buy(&scores, DEFAULT_POINT_BUY_BUDGET).unwrap();
    assert_eq!(spent, 24);

    let mut base = CharacterBaseData::new("Bought").with_race("human");
    base.ability_method = AbilityMethod::PointBuy;
    base.base_abilities = BaseAbilities::from_scores(scores.map(i32::from));
    let sheet = calculate_character_sheet(&base, &context());
    assert_eq!(sheet.ability(Ability::Strength).unwrap().modifier, 3);
    assert_eq!(sheet.ability(Ability::Charisma).unwrap().modifier, -1);
}

// ============================================================================
// Sheet JSON
// ============================================================================

#[test]
fn test_sheet_json_shape() {
    let base = fighter(1).with_item("longsword");
    let sheet = calculate_character_sheet(&base, &context());
    let value = serde_json::to_value(&sheet).unwrap();

    assert_eq!(value["abilityScores"]["strength"]["totalScore"], json!(16));
    assert_eq!(value["savingThrows"]["fortitude"]["totalValue"], json!(4));
    assert_eq!(value["armorClass"]["totalAc"]["totalValue"], json!(10));
    assert_eq!(value["hitPoints"]["maxHp"], json!(12));
    assert_eq!(value["speeds"]["land"]["totalValue"], json!(30));
    assert_eq!(value["attackData"]["attacks"][0]["damage"]["formula"], json!("1d8 + 3"));
    assert_eq!(value["substitutionValues"]["bab.total"], json!(1.0));
    assert!(value.get("changes").is_none());

    let class = value["computedEntities"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["id"] == json!("fighter"))
        .unwrap();
    assert_eq!(class["_meta"]["instanceId"], json!("class:fighter:1"));
    assert_eq!(class["_meta"]["source"]["originType"], json!("classLevel"));
}
