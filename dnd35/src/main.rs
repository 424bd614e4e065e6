//! Headless D&D 3.5 character sheet calculator.
//!
//! Loads a compendium and a character from JSON, calculates the sheet and
//! prints it as JSON:
//!
//! ```bash
//! cargo run -p dnd35 -- --compendium srd.json --character thorin.json --pretty
//! ```

mod cli;

use cli::{print_help, CliConfig, CliError};
use dnd35_core::{
    calculate_character_sheet, recalculate_attack, AttackContextState, CalculationContext, CharacterBaseData,
    Compendium,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let config = match CliConfig::from_args(std::env::args().skip(1), |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    if config.help {
        print_help();
        return;
    }

    if let Err(e) = run(&config) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(config: &CliConfig) -> Result<(), CliError> {
    if config.roll_abilities {
        let rolls = dnd35_core::ability_generation::generate_ability_score_set();
        return print_json(&rolls, config.pretty);
    }

    let compendium = Compendium::from_json(&read(config.compendium_path()?)?)?;
    tracing::info!(entities = compendium.len(), "loaded compendium");
    let character: CharacterBaseData =
        serde_json::from_str(&read(config.character_path()?)?).map_err(CliError::Character)?;

    let ctx = CalculationContext::new(compendium);
    let mut sheet = calculate_character_sheet(&character, &ctx);

    if !config.contextual.is_empty() {
        let state = config
            .contextual
            .iter()
            .fold(AttackContextState::new(), |state, name| state.with_change(name.clone()));
        let recalculated: Vec<_> = (0..sheet.attack_data.attacks.len())
            .filter_map(|i| recalculate_attack(&sheet, i, &state, &ctx))
            .collect();
        sheet.attack_data.attacks = recalculated;
    }

    if !sheet.diagnostics.is_empty() {
        eprintln!("{} diagnostic(s):", sheet.diagnostics.len());
        for diagnostic in sheet.diagnostics.iter() {
            eprintln!("  {diagnostic}");
        }
    }
    print_json(&sheet, config.pretty)
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(CliError::Output)?;
    println!("{json}");
    Ok(())
}
