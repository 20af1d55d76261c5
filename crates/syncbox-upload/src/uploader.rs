//! The batch scheduler.
//!
//! One scheduler thread per uploader. Each pass lists pending files,
//! partitions them, claims up to `max_concurrent_batches` batches in the
//! store and hands them to a fixed pool of worker threads. The pass waits for
//! every launched batch before looking for more work, so no more than
//! `max_concurrent_batches` batches are ever `uploading` at once.

use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use syncbox_core::config::UploadConfig;
use syncbox_core::error::SyncError;
use syncbox_core::models::batch::{Batch, BatchId};
use syncbox_core::models::file_meta::FileStatus;
use syncbox_core::models::project::{ProjectId, ProjectStatus};
use syncbox_db::{ops, ContentStore};
use syncbox_walk::hasher::paths_fingerprint;

use crate::events::{ErrorInfo, UploadObserver};
use crate::partition::partition;
use crate::stats::UploadStats;
use crate::transport::{CancelToken, Transport};
use crate::worker::{BatchJob, BatchOutcome, WorkerContext};

type ActiveBatches = Arc<Mutex<HashMap<BatchId, CancelToken>>>;

struct BatchReport {
    batch_id: BatchId,
    result: anyhow::Result<BatchOutcome>,
}

/// One `start_upload` call. The flag and the cancel tokens belong to this run
/// only, so stopping it never reaches a run started afterwards.
struct Run {
    running: Arc<AtomicBool>,
    active: ActiveBatches,
    handle: Option<JoinHandle<anyhow::Result<UploadStats>>>,
}

/// Uploads a project's pending files in bounded, concurrent batches.
pub struct BatchUploader {
    ctx: Arc<WorkerContext>,
    run: Mutex<Option<Run>>,
}

impl BatchUploader {
    pub fn new(
        store: ContentStore,
        transport: Arc<dyn Transport>,
        config: UploadConfig,
        observer: Arc<dyn UploadObserver>,
    ) -> Self {
        Self {
            ctx: Arc::new(WorkerContext {
                store,
                transport,
                config,
                observer,
                stats: Arc::new(Mutex::new(UploadStats::default())),
            }),
            run: Mutex::new(None),
        }
    }

    fn lock_run(&self) -> anyhow::Result<MutexGuard<'_, Option<Run>>> {
        self.run
            .lock()
            .map_err(|_| anyhow::anyhow!("scheduler state lock poisoned"))
    }

    /// Start uploading `project_id` in the background.
    ///
    /// Does nothing while a run is already in progress. A stopped run that is
    /// still finishing its cancelled requests is joined first.
    pub fn start_upload(&self, project_id: &ProjectId) -> anyhow::Result<()> {
        let mut slot = self.lock_run()?;
        if slot.as_ref().is_some_and(|run| run.running.load(Ordering::SeqCst)) {
            tracing::debug!(project = %project_id, "upload already running");
            return Ok(());
        }
        // A stopped or finished run nobody waited for.
        if let Some(handle) = slot.take().and_then(|run| run.handle) {
            let _ = handle.join();
        }

        self.ctx.store.with(|conn| {
            if ops::get_project(conn, project_id)?.is_none() {
                return Err(SyncError::ProjectNotFound {
                    id: project_id.to_string(),
                }
                .into());
            }
            ops::update_project_status(conn, project_id, ProjectStatus::Syncing)
        })?;

        let stats = UploadStats::started_now();
        if let Ok(mut current) = self.ctx.stats.lock() {
            *current = stats.clone();
        }
        self.ctx.observer.on_stats(&stats);

        let running = Arc::new(AtomicBool::new(true));
        let active: ActiveBatches = Arc::new(Mutex::new(HashMap::new()));
        let handle = {
            let ctx = Arc::clone(&self.ctx);
            let running = Arc::clone(&running);
            let active = Arc::clone(&active);
            let project_id = project_id.clone();
            thread::Builder::new()
                .name("upload-scheduler".into())
                .spawn(move || {
                    let result = schedule(&ctx, &project_id, &running, &active);
                    running.store(false, Ordering::SeqCst);
                    result
                })?
        };
        *slot = Some(Run {
            running,
            active,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Block until the current run ends and return its final stats.
    pub fn wait(&self) -> anyhow::Result<UploadStats> {
        let handle = self.lock_run()?.as_mut().and_then(|run| run.handle.take());
        match handle {
            Some(handle) => handle.join().map_err(|_| {
                anyhow::Error::from(SyncError::Scheduling {
                    message: "scheduler thread panicked".into(),
                })
            })?,
            None => Ok(self.get_stats()),
        }
    }

    /// Cancel every in-flight batch and stop scheduling new ones.
    ///
    /// Files already claimed stay `uploading`; `retry_failed` recovers them.
    pub fn stop_upload(&self) {
        let Ok(slot) = self.run.lock() else { return };
        let Some(run) = slot.as_ref() else { return };
        run.running.store(false, Ordering::SeqCst);
        if let Ok(mut active) = run.active.lock() {
            for (batch_id, token) in active.drain() {
                tracing::info!(batch = %batch_id, "cancelling batch");
                token.cancel();
            }
        };
    }

    /// Join a run that was stopped but may still be finishing a cancelled
    /// request, so its workers no longer touch the store.
    fn settle_stopped_run(&self) -> anyhow::Result<()> {
        let handle = {
            let mut slot = self.lock_run()?;
            match slot.as_mut() {
                Some(run) if !run.running.load(Ordering::SeqCst) => run.handle.take(),
                _ => None,
            }
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        Ok(())
    }

    /// Move stranded work back onto the retry path: `uploading` files become
    /// `error` and `uploading` batches become `failed`.
    ///
    /// Only meaningful while no run is active; returns `(files, batches)`.
    pub fn recover_interrupted(&self, project_id: &ProjectId) -> anyhow::Result<(usize, usize)> {
        if self.is_uploading() {
            return Ok((0, 0));
        }
        self.settle_stopped_run()?;
        let recovered = self.ctx.store.with(|conn| {
            let tx = conn.transaction()?;
            let files = ops::mark_interrupted(&tx, project_id)?;
            let batches = ops::fail_orphaned_batches(&tx, project_id)?;
            tx.commit()?;
            Ok((files, batches))
        })?;
        if recovered != (0, 0) {
            tracing::info!(
                project = %project_id,
                files = recovered.0,
                batches = recovered.1,
                "recovered interrupted uploads"
            );
        }
        Ok(recovered)
    }

    /// Reset every `error` file to `pending` and start uploading again.
    ///
    /// Returns how many files were reset. With none, nothing happens.
    pub fn retry_failed(&self, project_id: &ProjectId) -> anyhow::Result<usize> {
        self.recover_interrupted(project_id)?;
        let reset = self
            .ctx
            .store
            .with(|conn| ops::reset_error_files(conn, project_id))?;
        if reset == 0 {
            return Ok(0);
        }
        tracing::info!(project = %project_id, files = reset, "retrying failed files");
        self.start_upload(project_id)?;
        Ok(reset)
    }

    pub fn get_stats(&self) -> UploadStats {
        self.ctx
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn is_uploading(&self) -> bool {
        self.run
            .lock()
            .map(|slot| {
                slot.as_ref()
                    .is_some_and(|run| run.running.load(Ordering::SeqCst))
            })
            .unwrap_or(false)
    }

    /// Stop and wait for the scheduler thread to exit.
    pub fn destroy(&self) {
        self.stop_upload();
        if let Err(e) = self.wait() {
            tracing::warn!(error = %e, "upload run ended with an error");
        }
    }
}

impl Drop for BatchUploader {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn schedule(
    ctx: &Arc<WorkerContext>,
    project_id: &ProjectId,
    running: &AtomicBool,
    active: &ActiveBatches,
) -> anyhow::Result<UploadStats> {
    let workers = ctx.config.max_concurrent_batches.max(1);
    let (job_tx, job_rx) = crossbeam_channel::bounded::<BatchJob>(workers);
    let (report_tx, report_rx) = crossbeam_channel::unbounded::<BatchReport>();

    tracing::info!(project = %project_id, workers, "upload started");

    let outcome = thread::scope(|scope| -> anyhow::Result<()> {
        for id in 0..workers {
            let job_rx = job_rx.clone();
            let report_tx = report_tx.clone();
            let ctx = Arc::clone(ctx);
            thread::Builder::new()
                .name(format!("upload-worker-{id}"))
                .spawn_scoped(scope, move || worker_loop(&ctx, job_rx, report_tx))?;
        }
        // Only workers hold senders now, so a dead pool shows up as a closed channel.
        drop(report_tx);

        let result = run_passes(ctx, project_id, running, active, &job_tx, &report_rx);
        drop(job_tx);
        result
    });

    let final_status = ctx.store.with(|conn| {
        let counts = ops::count_files_by_status(conn, project_id)?;
        let count = |status: FileStatus| {
            counts
                .iter()
                .find(|(s, _)| *s == status)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };
        let status = if outcome.is_err() || count(FileStatus::Error) > 0 {
            ProjectStatus::Error
        } else if count(FileStatus::Pending) + count(FileStatus::Uploading) > 0 {
            ProjectStatus::Local
        } else {
            ProjectStatus::Synced
        };
        ops::update_project_status(conn, project_id, status)?;
        Ok(status)
    });

    let stats = ctx.stats.lock().map(|s| s.clone()).unwrap_or_default();
    match (&outcome, &final_status) {
        (Ok(()), Ok(status)) => tracing::info!(
            project = %project_id,
            status = %status,
            uploaded = stats.uploaded_files,
            failed = stats.failed_files,
            "upload finished"
        ),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(project = %project_id, error = %e, "upload stopped");
        }
    }

    outcome.map_err(|e| {
        let message = format!("{e:#}");
        ctx.observer.on_error(&ErrorInfo {
            batch_id: None,
            message: message.clone(),
        });
        anyhow::Error::from(SyncError::Scheduling { message })
    })?;
    final_status?;
    Ok(stats)
}

fn run_passes(
    ctx: &WorkerContext,
    project_id: &ProjectId,
    running: &AtomicBool,
    active: &ActiveBatches,
    job_tx: &Sender<BatchJob>,
    report_rx: &Receiver<BatchReport>,
) -> anyhow::Result<()> {
    let config = &ctx.config;
    while running.load(Ordering::SeqCst) {
        let pending = ctx
            .store
            .with(|conn| ops::list_files(conn, project_id, Some(FileStatus::Pending)))?;
        if pending.is_empty() {
            break;
        }
        if let Ok(mut stats) = ctx.stats.lock() {
            stats.plan_pass(pending.len() as u64, pending.iter().map(|f| f.size).sum());
            ctx.observer.on_stats(&stats);
        }

        let groups = partition(&pending, config.max_files_per_batch, config.max_size_per_batch);
        let mut launched = 0usize;
        for group in groups.into_iter().take(config.max_concurrent_batches.max(1)) {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            let hash = paths_fingerprint(group.iter().map(|f| f.path.as_str()));
            let mut batch = Batch::from_files(project_id.clone(), &group, hash);
            let files = ctx
                .store
                .with(|conn| ops::claim_batch(conn, &mut batch, &group))?;
            if files.is_empty() {
                continue;
            }

            let cancel = CancelToken::new();
            if let Ok(mut active) = active.lock() {
                active.insert(batch.id.clone(), cancel.clone());
            }
            job_tx
                .send(BatchJob { batch, files, cancel })
                .map_err(|_| anyhow::anyhow!("upload worker pool is gone"))?;
            launched += 1;
        }
        if launched == 0 {
            break;
        }

        let mut failures = Vec::new();
        for _ in 0..launched {
            let report = report_rx
                .recv()
                .map_err(|_| anyhow::anyhow!("upload worker pool is gone"))?;
            if let Ok(mut active) = active.lock() {
                active.remove(&report.batch_id);
            }
            if let Err(e) = report.result {
                failures.push(format!("batch {}: {e:#}", report.batch_id));
            }
        }
        if !failures.is_empty() {
            anyhow::bail!(failures.join("; "));
        }
    }
    Ok(())
}

fn worker_loop(ctx: &WorkerContext, jobs: Receiver<BatchJob>, reports: Sender<BatchReport>) {
    for job in jobs {
        let batch_id = job.batch.id.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| ctx.run_batch(&job)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("batch worker panicked")));
        if reports.send(BatchReport { batch_id, result }).is_err() {
            break;
        }
    }
}
