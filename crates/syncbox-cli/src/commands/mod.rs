pub mod add;
pub mod config;
pub mod files;
pub mod gc;
pub mod init;
pub mod project;
pub mod push;
pub mod retry;
pub mod rm;
pub mod status;

use clap::Subcommand;
use std::path::PathBuf;
use syncbox_core::config::SyncConfig;
use syncbox_core::models::project::Project;
use syncbox_db::{ops, ContentStore};

/// Flags accepted by every command.
pub struct Globals {
    pub json: bool,
    pub project: Option<String>,
    pub config: Option<PathBuf>,
}

impl Globals {
    pub fn load_config(&self) -> anyhow::Result<SyncConfig> {
        let config = match &self.config {
            Some(path) => SyncConfig::load_from(path)?,
            None => SyncConfig::load()?,
        };
        Ok(config)
    }

    pub fn open_store(&self) -> anyhow::Result<ContentStore> {
        ContentStore::open(&SyncConfig::db_path()?)
    }

    /// The project named by `--project`, or the only one when there is
    /// exactly one.
    pub fn project(&self, store: &ContentStore) -> anyhow::Result<Project> {
        resolve_project(store, self.project.as_deref())
    }
}

fn resolve_project(store: &ContentStore, name: Option<&str>) -> anyhow::Result<Project> {
    store.with(|conn| {
        if let Some(name) = name {
            return ops::get_project_by_name(conn, name)?
                .ok_or_else(|| anyhow::anyhow!("project '{}' not found", name));
        }
        let mut projects = ops::list_projects(conn)?;
        match projects.len() {
            1 => Ok(projects.remove(0)),
            0 => anyhow::bail!("no projects yet. Create one with: syncbox init <name>"),
            n => anyhow::bail!("{} projects exist, pick one with --project <name>", n),
        }
    })
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize syncbox and create a project
    Init(init::InitArgs),
    /// Walk files and folders into the project
    Add(add::AddArgs),
    /// Upload pending files
    Push(push::PushArgs),
    /// Reset failed files and upload them again
    Retry,
    /// Show project sync status
    Status,
    /// List tracked files
    Files(files::FilesArgs),
    /// Stop tracking one file
    Rm(rm::RmArgs),
    /// Delete completed batches past the retention window
    Gc(gc::GcArgs),
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: project::ProjectAction,
    },
    /// Initialize or show syncbox configuration
    Config {
        #[command(subcommand)]
        action: config::ConfigAction,
    },
}

pub fn run(cmd: Command, globals: &Globals) -> anyhow::Result<()> {
    match cmd {
        Command::Init(args) => init::run(args, globals),
        Command::Add(args) => add::run(args, globals),
        Command::Push(args) => push::run(args, globals),
        Command::Retry => retry::run(globals),
        Command::Status => status::run(globals),
        Command::Files(args) => files::run(args, globals),
        Command::Rm(args) => rm::run(args, globals),
        Command::Gc(args) => gc::run(args, globals),
        Command::Project { action } => project::run(action, globals),
        Command::Config { action } => config::run(action, globals),
    }
}
