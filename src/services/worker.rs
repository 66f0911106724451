use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::AppConfig;
use crate::services::indexing::{IndexingClient, IndexingError, TaskStatus, wait_for_done};
use crate::services::media_probe::DurationProbe;
use crate::services::staging::StagingStore;

/// Signal asking the worker to run one pass over the staging directory
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Staged file that caused the request, for logging
    pub trigger: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue full: an already pending scan will pick the file up
    Coalesced,
    /// Worker is gone; the file stays staged until the next run
    Closed,
}

/// Cloneable producer side of the scan queue, held by the gateway
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<ScanRequest>,
}

impl WorkerHandle {
    pub fn try_enqueue(&self, request: ScanRequest) -> EnqueueOutcome {
        match self.tx.try_send(request) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => EnqueueOutcome::Coalesced,
            Err(mpsc::error::TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }
}

pub fn scan_queue(capacity: usize) -> (WorkerHandle, mpsc::Receiver<ScanRequest>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (WorkerHandle { tx }, rx)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Indexed {
        task_id: String,
        video_id: Option<String>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub duration_secs: Option<f64>,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Outcomes of one pass over the staging directory
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    pub fn indexed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Indexed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn outcome_for(&self, file_name: &str) -> Option<&FileOutcome> {
        self.files
            .iter()
            .find(|f| f.file.file_name().is_some_and(|n| n == file_name))
            .map(|f| &f.outcome)
    }
}

/// Drains the staging directory into the remote indexing service.
/// Single consumer of the scan queue, so passes never overlap.
pub struct UploadWorker {
    staging: StagingStore,
    probe: Arc<dyn DurationProbe>,
    client: Option<Arc<dyn IndexingClient>>,
    config: AppConfig,
    shutdown: watch::Receiver<bool>,
}

impl UploadWorker {
    pub fn new(
        staging: StagingStore,
        probe: Arc<dyn DurationProbe>,
        client: Option<Arc<dyn IndexingClient>>,
        config: AppConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            staging,
            probe,
            client,
            config,
            shutdown,
        }
    }

    pub async fn run(mut self, mut requests: mpsc::Receiver<ScanRequest>) {
        tracing::info!("🚀 Upload worker started");

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("🛑 Upload worker shutting down");
                        break;
                    }
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        tracing::info!("🛑 Scan queue closed, upload worker exiting");
                        break;
                    };

                    // Everything queued so far is covered by this pass
                    let mut coalesced = 0;
                    while requests.try_recv().is_ok() {
                        coalesced += 1;
                    }
                    tracing::info!(
                        "📂 Scan triggered by {} ({} more requests coalesced)",
                        request.trigger,
                        coalesced
                    );

                    self.process_staging().await;
                }
            }
        }
    }

    /// One pass over a snapshot of the staging directory
    pub async fn process_staging(&self) -> BatchReport {
        let started_at = Utc::now();
        let mut files = Vec::new();

        let snapshot = match self.staging.snapshot().await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!("Failed to scan staging directory: {}", e);
                Vec::new()
            }
        };

        if snapshot.is_empty() {
            tracing::info!("No files found in staging directory");
        } else if self.client.is_none() {
            tracing::error!("{}", IndexingError::NotConfigured);
        }

        let mut shutdown = self.shutdown.clone();
        for path in snapshot {
            if *shutdown.borrow() {
                tracing::info!("Shutdown requested, stopping pass before {}", path.display());
                break;
            }

            let report = self.process_file(&path, &mut shutdown).await;
            match &report.outcome {
                FileOutcome::Indexed { task_id, video_id } => tracing::info!(
                    "✅ Indexed {} (task {}, video {})",
                    path.display(),
                    task_id,
                    video_id.as_deref().unwrap_or("unknown")
                ),
                FileOutcome::Skipped { reason } => {
                    tracing::warn!("⏭️  Skipping {}: {}", path.display(), reason)
                }
                FileOutcome::Failed { error } => {
                    tracing::error!("❌ Failed to process {}: {}", path.display(), error)
                }
            }
            files.push(report);
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            files,
        };
        tracing::info!(
            "Pass finished: {} indexed, {} skipped, {} failed",
            report.indexed(),
            report.skipped(),
            report.failed()
        );
        report
    }

    async fn process_file(&self, path: &Path, shutdown: &mut watch::Receiver<bool>) -> FileReport {
        let report = |duration_secs: Option<f64>, outcome: FileOutcome| FileReport {
            file: path.to_path_buf(),
            duration_secs,
            outcome,
        };

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return report(
                None,
                FileOutcome::Skipped {
                    reason: "file no longer present".to_string(),
                },
            );
        }

        let duration = match self.probe.duration(path).await {
            Ok(d) => d,
            Err(e) => {
                return report(
                    None,
                    FileOutcome::Skipped {
                        reason: format!("duration unavailable: {}", e),
                    },
                );
            }
        };

        if !self.config.accepts_duration(duration) {
            return report(
                Some(duration),
                FileOutcome::Skipped {
                    reason: format!(
                        "duration {:.2}s is outside allowed range ({}s to {}s)",
                        duration, self.config.min_duration_secs, self.config.max_duration_secs
                    ),
                },
            );
        }

        let outcome = match self.submit(path, shutdown).await {
            Ok(outcome) => outcome,
            Err(e) => FileOutcome::Failed {
                error: e.to_string(),
            },
        };

        if matches!(outcome, FileOutcome::Indexed { .. }) && self.config.delete_after_index {
            if let Err(e) = self.staging.remove(path).await {
                tracing::warn!("Failed to remove indexed file {}: {}", path.display(), e);
            }
        }

        report(Some(duration), outcome)
    }

    async fn submit(
        &self,
        path: &Path,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<FileOutcome, IndexingError> {
        let client = self.client.as_deref().ok_or(IndexingError::NotConfigured)?;

        let task_id = client.create_task(path).await?;
        tracing::info!("Created indexing task {} for {}", task_id, path.display());

        let task = wait_for_done(
            client,
            &task_id,
            self.config.indexing.poll_interval,
            self.config.indexing.poll_timeout,
            shutdown,
        )
        .await?;

        if task.status != TaskStatus::Ready {
            return Err(IndexingError::TaskFailed(task.status));
        }

        Ok(FileOutcome::Indexed {
            task_id,
            video_id: task.video_id,
        })
    }
}
