use clap::Subcommand;
use syncbox_core::error::SyncError;
use syncbox_db::ops;

use super::Globals;

#[derive(Subcommand)]
pub enum ProjectAction {
    /// List all projects
    List,
    /// Delete a project with all of its files, chunks, queue items and batches
    Delete {
        /// Project name
        name: String,
    },
}

pub fn run(action: ProjectAction, globals: &Globals) -> anyhow::Result<()> {
    let store = globals.open_store()?;
    match action {
        ProjectAction::List => {
            let projects = store.with(|conn| ops::list_projects(conn))?;
            if globals.json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                println!("No projects found. Create one with: syncbox init <name>");
            } else {
                for p in &projects {
                    println!(
                        "{:<24} {:<8} modified {}",
                        p.name,
                        p.status.to_string(),
                        p.last_modified.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            Ok(())
        }
        ProjectAction::Delete { name } => {
            let (project, summary) = store.with(|conn| {
                let project = ops::get_project_by_name(conn, &name)?
                    .ok_or_else(|| SyncError::ProjectNotFound { id: name.clone() })?;
                let summary = ops::delete_project(conn, &project.id)?;
                Ok((project, summary))
            })?;

            if globals.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "deleted": project.name,
                        "files": summary.files,
                        "chunks": summary.chunks,
                        "queue_items": summary.queue_items,
                        "batches": summary.batches,
                    })
                );
            } else {
                println!("Deleted project '{}'", project.name);
                println!(
                    "  {} files, {} chunks, {} queue items, {} batches removed",
                    summary.files, summary.chunks, summary.queue_items, summary.batches
                );
            }
            Ok(())
        }
    }
}
