//! `gitdock key set|generate|show|clear`

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};

use gitdock_core::settings::load_settings_at;
use gitdock_core::store;
use gitdock_core::types::SigningKeyRecord;
use gitdock_sync::{generate_key_pair, SyncConfig};

use super::{block_on, home};

#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Store an existing key pair as the active key.
    Set(SetArgs),

    /// Generate a new ed25519 key pair and make it active.
    Generate {
        /// Label for the key; becomes the key comment.
        #[arg(default_value = "default")]
        name: String,
    },

    /// Print the active key's name, fingerprint and public half.
    Show,

    /// Remove the active key.
    Clear,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Private key file (OpenSSH format).
    #[arg(long)]
    pub private: PathBuf,

    /// Public key file.
    #[arg(long)]
    pub public: PathBuf,

    #[arg(long, default_value = "default")]
    pub name: String,
}

pub fn run(cmd: KeyCommand) -> Result<()> {
    let home = home()?;
    match cmd {
        KeyCommand::Set(args) => {
            let private_key = fs::read_to_string(&args.private)
                .with_context(|| format!("read {}", args.private.display()))?;
            let public_key = fs::read_to_string(&args.public)
                .with_context(|| format!("read {}", args.public.display()))?;
            if !private_key.contains("PRIVATE KEY") {
                bail!("{} does not look like a private key", args.private.display());
            }
            let key = SigningKeyRecord {
                name: args.name,
                private_key,
                public_key: public_key.trim().to_string(),
                created_at: Utc::now(),
            };
            store::save_active_key_at(&home, &key).context("failed to store key")?;
            println!("✓ Active key '{}' ({})", key.name, key.fingerprint());
        }
        KeyCommand::Generate { name } => {
            let settings = load_settings_at(&home).context("failed to load settings")?;
            let config = SyncConfig::from_settings(&settings);
            let key = block_on(generate_key_pair(
                &home,
                &config.ssh_keygen_path,
                &name,
                config.git_timeout,
            ))?
            .context("key generation failed")?;
            store::save_active_key_at(&home, &key).context("failed to store key")?;
            println!("✓ Generated key '{}' ({})", key.name, key.fingerprint());
            println!("{}", key.public_key);
        }
        KeyCommand::Show => match store::load_active_key_at(&home).context("failed to load key")? {
            Some(key) => {
                println!("name:        {}", key.name);
                println!("fingerprint: {}", key.fingerprint());
                println!("created:     {}", key.created_at.to_rfc3339());
                println!("{}", key.public_key);
            }
            None => println!("No active key."),
        },
        KeyCommand::Clear => {
            if store::clear_active_key_at(&home).context("failed to clear key")? {
                println!("✓ Active key removed");
            } else {
                println!("No active key.");
            }
        }
    }
    Ok(())
}
