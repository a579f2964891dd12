//! `gitdock settings get|set|unset|list`

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use gitdock_core::settings::{self, KNOWN_KEYS};

use super::home;

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    Get { key: String },
    Set { key: String, value: String },
    Unset { key: String },
    /// Print every stored setting as `key = value`.
    List,
}

pub fn run(cmd: SettingsCommand) -> Result<()> {
    let home = home()?;
    match cmd {
        SettingsCommand::Get { key } => {
            match settings::get_setting_at(&home, &key).context("failed to load settings")? {
                Some(value) => println!("{value}"),
                None => println!("{key} is not set"),
            }
        }
        SettingsCommand::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                bail!("unknown setting '{key}'; known: {}", KNOWN_KEYS.join(", "));
            }
            settings::set_setting_at(&home, &key, &value).context("failed to save settings")?;
            println!("✓ {key} = {value}");
        }
        SettingsCommand::Unset { key } => {
            if settings::unset_setting_at(&home, &key).context("failed to save settings")? {
                println!("✓ {key} unset");
            } else {
                println!("{key} is not set");
            }
        }
        SettingsCommand::List => {
            let current = settings::load_settings_at(&home).context("failed to load settings")?;
            for (key, value) in current.iter() {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}
