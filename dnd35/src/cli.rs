//! Command line configuration.

use std::path::PathBuf;
use thiserror::Error;

pub const COMPENDIUM_ENV: &str = "DND35_COMPENDIUM";
pub const CHARACTER_ENV: &str = "DND35_CHARACTER";

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid compendium: {0}")]
    Compendium(#[from] dnd35_core::CompendiumError),
    #[error("Invalid character data: {0}")]
    Character(#[source] serde_json::Error),
    #[error("Failed to encode output: {0}")]
    Output(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliConfig {
    pub compendium: Option<PathBuf>,
    pub character: Option<PathBuf>,
    pub pretty: bool,
    /// Contextual changes to switch on for every attack.
    pub contextual: Vec<String>,
    pub roll_abilities: bool,
    pub help: bool,
}

impl CliConfig {
    /// Parse arguments (without the program name), falling back to the
    /// environment for file paths.
    pub fn from_args<I>(args: I, env: impl Fn(&str) -> Option<String>) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = CliConfig::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => config.help = true,
                "--pretty" => config.pretty = true,
                "--roll-abilities" => config.roll_abilities = true,
                "--compendium" => config.compendium = Some(PathBuf::from(value_for(&arg, args.next())?)),
                "--character" => config.character = Some(PathBuf::from(value_for(&arg, args.next())?)),
                "--contextual" => config.contextual.push(value_for(&arg, args.next())?),
                other => return Err(CliError::Usage(format!("Unknown argument '{other}'. Try --help."))),
            }
        }
        if config.compendium.is_none() {
            config.compendium = env(COMPENDIUM_ENV).map(PathBuf::from);
        }
        if config.character.is_none() {
            config.character = env(CHARACTER_ENV).map(PathBuf::from);
        }
        Ok(config)
    }

    pub fn compendium_path(&self) -> Result<&PathBuf, CliError> {
        self.compendium
            .as_ref()
            .ok_or_else(|| CliError::Usage(format!("No compendium given. Pass --compendium or set {COMPENDIUM_ENV}.")))
    }

    pub fn character_path(&self) -> Result<&PathBuf, CliError> {
        self.character
            .as_ref()
            .ok_or_else(|| CliError::Usage(format!("No character given. Pass --character or set {CHARACTER_ENV}.")))
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, CliError> {
    value.ok_or_else(|| CliError::Usage(format!("{flag} expects a value")))
}

pub fn print_help() {
    println!("dnd35 - D&D 3.5 character sheet calculator");
    println!();
    println!("USAGE:");
    println!("  dnd35 [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help              Show this help message");
    println!("  --compendium <PATH>     Compendium JSON (default: ${COMPENDIUM_ENV})");
    println!("  --character <PATH>      Character JSON (default: ${CHARACTER_ENV})");
    println!("  --contextual <NAME>     Apply a contextual change to attacks (repeatable)");
    println!("  --pretty                Pretty-print the sheet");
    println!("  --roll-abilities        Roll six ability scores (4d6 drop lowest) and exit");
    println!();
    println!("Logging is controlled with RUST_LOG (default: warn).");
    println!();
    println!("EXAMPLES:");
    println!("  dnd35 --compendium srd.json --character thorin.json --pretty");
    println!("  dnd35 --character thorin.json --contextual Flanking");
    println!("  dnd35 --roll-abilities");
}
