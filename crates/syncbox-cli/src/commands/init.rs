use clap::Args;
use syncbox_core::config::SyncConfig;
use syncbox_core::error::SyncError;
use syncbox_core::models::project::Project;
use syncbox_db::ops;

use super::Globals;

#[derive(Args)]
pub struct InitArgs {
    /// Project name (defaults to the current directory's name)
    name: Option<String>,
}

pub fn run(args: InitArgs, globals: &Globals) -> anyhow::Result<()> {
    let home = SyncConfig::init()?;
    if let Some(path) = &globals.config {
        if !path.exists() {
            SyncConfig::default().save_to(path)?;
        }
    }
    let store = globals.open_store()?;

    let name = match args.name {
        Some(name) => name,
        None => std::env::current_dir()?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("cannot derive a project name here, pass one"))?,
    };

    let project = store.with(|conn| {
        if ops::get_project_by_name(conn, &name)?.is_some() {
            return Err(SyncError::ProjectAlreadyExists { name: name.clone() }.into());
        }
        let project = Project::new(name.clone());
        ops::insert_project(conn, &project)?;
        Ok(project)
    })?;
    tracing::info!(project = %project.id, name = %project.name, "created project");

    if globals.json {
        println!("{}", serde_json::to_string(&project)?);
    } else {
        println!("Syncbox home at {}", home.display());
        println!("Created project '{}' ({})", project.name, project.id);
        println!("Add files with: syncbox add <paths>");
    }
    Ok(())
}
