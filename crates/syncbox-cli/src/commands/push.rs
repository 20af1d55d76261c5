use clap::Args;
use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::sync::Arc;
use syncbox_core::config::SyncConfig;
use syncbox_core::models::file_meta::FileStatus;
use syncbox_core::models::project::Project;
use syncbox_db::{ops, ContentStore};
use syncbox_upload::events::{ErrorInfo, FileProgressStatus, ProgressEvent};
use syncbox_upload::partition::partition;
use syncbox_upload::{BatchUploader, HttpTransport, UploadObserver, UploadStats};

use super::Globals;

#[derive(Args)]
pub struct PushArgs {
    /// Show how pending files would be batched without uploading
    #[arg(long)]
    dry_run: bool,

    /// Mark uploaded files committed once the run ends
    #[arg(long)]
    commit: bool,
}

/// Draws upload progress on a terminal bar.
pub struct BarObserver {
    pb: Option<ProgressBar>,
}

impl BarObserver {
    pub fn new(show: bool) -> anyhow::Result<Self> {
        if !show {
            return Ok(Self { pb: None });
        }
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} files ({eta}) {msg}")?
                .progress_chars("#>-"),
        );
        Ok(Self { pb: Some(pb) })
    }

    pub fn finish(&self) {
        if let Some(ref pb) = self.pb {
            pb.finish_and_clear();
        }
    }
}

impl UploadObserver for BarObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        let Some(ref pb) = self.pb else { return };
        match event.status {
            FileProgressStatus::Uploading => pb.set_message(event.file_path.clone()),
            FileProgressStatus::Uploaded => {}
            FileProgressStatus::Error => {
                pb.println(format!("  {} {}", style("failed").red(), event.file_path));
            }
        }
    }

    fn on_error(&self, info: &ErrorInfo) {
        if let Some(ref pb) = self.pb {
            pb.println(format!("  {} {}", style("error").red().bold(), info.message));
        }
    }

    fn on_stats(&self, stats: &UploadStats) {
        if let Some(ref pb) = self.pb {
            pb.set_length(stats.total_files);
            pb.set_position(stats.processed_files());
        }
    }
}

pub fn uploader(
    store: &ContentStore,
    config: &SyncConfig,
    observer: Arc<BarObserver>,
) -> anyhow::Result<BatchUploader> {
    let transport = HttpTransport::new(&config.upload.endpoint_base_url)?;
    Ok(BatchUploader::new(
        store.clone(),
        Arc::new(transport),
        config.upload.clone(),
        observer,
    ))
}

pub fn run(args: PushArgs, globals: &Globals) -> anyhow::Result<()> {
    let config = globals.load_config()?;
    let store = globals.open_store()?;
    let project = globals.project(&store)?;

    if args.dry_run {
        return plan(&store, &config, &project, globals.json);
    }

    let observer = Arc::new(BarObserver::new(!globals.json)?);
    let uploader = uploader(&store, &config, Arc::clone(&observer))?;

    let (interrupted, _) = uploader.recover_interrupted(&project.id)?;
    if interrupted > 0 && !globals.json {
        println!(
            "{} files were interrupted by an earlier run, upload them with: syncbox retry",
            interrupted
        );
    }

    if !globals.json {
        println!("Uploading '{}' to {}...", project.name, config.upload.endpoint_base_url);
    }
    uploader.start_upload(&project.id)?;
    let result = uploader.wait();
    observer.finish();
    let stats = result?;

    let committed = if args.commit {
        store.with(|conn| ops::commit_uploaded(conn, &project.id))?
    } else {
        0
    };
    report(&store, &project, &stats, committed, globals.json)
}

fn plan(store: &ContentStore, config: &SyncConfig, project: &Project, json: bool) -> anyhow::Result<()> {
    let pending = store.with(|conn| ops::list_files(conn, &project.id, Some(FileStatus::Pending)))?;
    let batches = partition(
        &pending,
        config.upload.max_files_per_batch,
        config.upload.max_size_per_batch,
    );

    if json {
        let batches: Vec<_> = batches
            .iter()
            .map(|b| {
                serde_json::json!({
                    "files": b.iter().map(|f| f.path.as_str()).collect::<Vec<_>>(),
                    "size": b.iter().map(|f| f.size).sum::<u64>(),
                })
            })
            .collect();
        println!("{}", serde_json::json!({ "dry_run": true, "batches": batches }));
        return Ok(());
    }

    println!("  [DRY RUN]");
    if batches.is_empty() {
        println!("Nothing pending in '{}'.", project.name);
        return Ok(());
    }
    for (i, batch) in batches.iter().enumerate() {
        let size: u64 = batch.iter().map(|f| f.size).sum();
        println!("Batch {}: {} files, {}", i + 1, batch.len(), HumanBytes(size));
        for f in batch {
            let mode = if f.size >= config.upload.chunk_size {
                " (chunked)"
            } else {
                ""
            };
            println!("    {} {}{}", HumanBytes(f.size), f.path, mode);
        }
    }
    Ok(())
}

/// Print the outcome of an upload run, with the reason for each failed file.
pub fn report(
    store: &ContentStore,
    project: &Project,
    stats: &UploadStats,
    committed: usize,
    json: bool,
) -> anyhow::Result<()> {
    let failed = store.with(|conn| ops::list_files(conn, &project.id, Some(FileStatus::Error)))?;
    let status = store
        .with(|conn| ops::get_project(conn, &project.id))?
        .map(|p| p.status)
        .unwrap_or(project.status);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "project": project.name,
                "status": status,
                "stats": stats,
                "committed": committed,
                "failed": failed
                    .iter()
                    .map(|f| serde_json::json!({ "path": f.path, "error": f.error_message }))
                    .collect::<Vec<_>>(),
            })
        );
        return Ok(());
    }

    println!("\nUpload finished:");
    println!("  Status:   {}", status);
    println!(
        "  Files:    {} uploaded, {} failed",
        stats.uploaded_files, stats.failed_files
    );
    println!(
        "  Bytes:    {} of {}",
        HumanBytes(stats.uploaded_size),
        HumanBytes(stats.total_size)
    );
    if committed > 0 {
        println!("  Committed: {}", committed);
    }
    if !failed.is_empty() {
        println!("  Errors:   {}", failed.len());
        for f in &failed {
            println!(
                "    - {}: {}",
                f.path,
                f.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        println!("Retry them with: syncbox retry");
    }
    Ok(())
}
