use clap::Subcommand;
use syncbox_core::config::SyncConfig;

use super::Globals;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Create ~/.syncbox/ with a default config and an empty database
    Init,
    /// Show current configuration
    Show,
}

pub fn run(action: ConfigAction, globals: &Globals) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let home = SyncConfig::init()?;
            println!("Syncbox initialized at {}", home.display());
            if let Some(path) = &globals.config {
                if !path.exists() {
                    SyncConfig::default().save_to(path)?;
                    println!("Config written to {}", path.display());
                }
            }

            let db_path = SyncConfig::db_path()?;
            let _store = globals.open_store()?;
            println!("Database created at {}", db_path.display());

            Ok(())
        }
        ConfigAction::Show => {
            let config = globals.load_config()?;
            if globals.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
            Ok(())
        }
    }
}
