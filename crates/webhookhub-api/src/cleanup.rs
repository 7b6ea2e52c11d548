use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use webhookhub_db::Database;

/// How often the background loop checks the retention settings.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    /// `false` when a scheduled sweep found retention disabled.
    pub ran: bool,
    pub deleted: usize,
    pub days: u32,
    pub cutoff: Option<DateTime<Utc>>,
    pub ran_at: DateTime<Utc>,
}

/// Oldest timestamp kept by a sweep at `now`. Saturates at chrono's minimum
/// date instead of overflowing.
fn retention_cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_signed(chrono::Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Deletes webhooks older than the configured retention window.
///
/// Settings are read from the store on every sweep, and sweeps never overlap:
/// a manual run waits for a scheduled one in progress and vice versa.
#[derive(Clone)]
pub struct Sweeper {
    db: Arc<Database>,
    running: Arc<Mutex<()>>,
}

impl Sweeper {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Sweeps only if `cleanup_enabled` is set.
    pub async fn run_scheduled(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        self.sweep(now, false).await
    }

    /// Manual trigger: sweeps regardless of `cleanup_enabled`.
    pub async fn run_now(&self, now: DateTime<Utc>) -> anyhow::Result<SweepReport> {
        self.sweep(now, true).await
    }

    async fn sweep(&self, now: DateTime<Utc>, force: bool) -> anyhow::Result<SweepReport> {
        let _guard = self.running.lock().await;
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<SweepReport> {
            let retention = db.retention_settings()?;
            if !force && !retention.enabled {
                return Ok(SweepReport {
                    ran: false,
                    deleted: 0,
                    days: retention.days,
                    cutoff: None,
                    ran_at: now,
                });
            }

            let cutoff = retention_cutoff(now, retention.days);
            let deleted = db.delete_older_than(cutoff)?;
            db.record_sweep(now, deleted)?;

            Ok(SweepReport {
                ran: true,
                deleted,
                days: retention.days,
                cutoff: Some(cutoff),
                ran_at: now,
            })
        })
        .await?
    }

    /// Starts the periodic loop. The first tick fires immediately; cancelling
    /// `shutdown` ends the task.
    pub fn spawn(&self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Retention sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        match sweeper.run_scheduled(Utc::now()).await {
                            Ok(report) if report.deleted > 0 => {
                                info!("Cleanup: pruned {} webhooks older than {} days", report.deleted, report.days);
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Cleanup error: {}", e),
                        }
                    }
                }
            }
        })
    }
}
