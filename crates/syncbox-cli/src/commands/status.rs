use console::style;
use indicatif::HumanBytes;
use syncbox_core::models::batch::BatchStatus;
use syncbox_core::models::project::{Project, ProjectStatus};
use syncbox_db::ops;

use super::Globals;

pub fn run(globals: &Globals) -> anyhow::Result<()> {
    let store = globals.open_store()?;
    let projects: Vec<Project> = match globals.project {
        Some(_) => vec![globals.project(&store)?],
        None => store.with(|conn| ops::list_projects(conn))?,
    };

    for project in &projects {
        let (counts, files, batches) = store.with(|conn| {
            Ok((
                ops::count_files_by_status(conn, &project.id)?,
                ops::list_files(conn, &project.id, None)?,
                ops::list_batches(conn, &project.id, None)?,
            ))
        })?;
        let total_size: u64 = files.iter().map(|f| f.size).sum();
        let failed_batches = batches
            .iter()
            .filter(|b| b.status == BatchStatus::Failed)
            .count();

        if globals.json {
            let counts: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(status, n)| (status.to_string(), (*n).into()))
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "project": project.name,
                    "status": project.status,
                    "last_modified": project.last_modified,
                    "files": counts,
                    "total_size": total_size,
                    "batches": batches.len(),
                    "failed_batches": failed_batches,
                })
            );
            continue;
        }

        let status = match project.status {
            ProjectStatus::Local => style(project.status.to_string()).dim(),
            ProjectStatus::Syncing => style(project.status.to_string()).cyan(),
            ProjectStatus::Synced => style(project.status.to_string()).green(),
            ProjectStatus::Error => style(project.status.to_string()).red(),
        };
        println!("Project: {}", project.name);
        println!("  Status:   {}", status);
        println!("  Modified: {}", project.last_modified.format("%Y-%m-%d %H:%M:%S"));
        println!("  Files:    {} ({})", files.len(), HumanBytes(total_size));
        for (file_status, n) in &counts {
            println!("    {:<10} {}", file_status.as_str(), n);
        }
        println!(
            "  Batches:  {} recorded, {} failed",
            batches.len(),
            failed_batches
        );
        println!();
    }

    if projects.is_empty() && !globals.json {
        println!("No projects found. Create one with: syncbox init <name>");
    }

    Ok(())
}
