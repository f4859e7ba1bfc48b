//! In-process daily job: runs once at startup and again at every local
//! midnight of the site time zone.

use chrono::{FixedOffset, Utc};
use sqlx::PgPool;
use std::{future::Future, sync::Arc};
use tokio::{sync::oneshot, task::JoinHandle};

use crate::calendar;

/// Handle to a running daily task.
pub struct DailyTask {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DailyTask {
    /// Spawns `job` now and then at each local midnight for `offset`.
    /// Failures are logged by the job itself; there is no retry.
    pub fn spawn<F, Fut>(name: &'static str, offset: FixedOffset, job: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            tracing::info!(task = name, "Starting daily task");
            job().await;

            loop {
                let wait = calendar::until_next_midnight(Utc::now(), offset);
                tracing::debug!(task = name, wait_secs = wait.as_secs(), "next daily run scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => job().await,
                    _ = &mut shutdown_rx => {
                        tracing::info!(task = name, "Daily task shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(task = self.name, "daily task ended abnormally: {}", e);
            }
        }
    }
}

/// Starts the job that marks each day active in the activity calendar.
pub fn start_daily_marker(pool: Arc<PgPool>, offset: FixedOffset) -> DailyTask {
    DailyTask::spawn("daily-marker", offset, move || {
        let pool = pool.clone();
        async move {
            let today = calendar::today(offset);
            match crate::db::mark_active(pool.as_ref(), today).await {
                Ok(()) => tracing::info!(date = %today, "daily marker: day marked active"),
                Err(e) => tracing::error!(date = %today, "daily marker failed: {}", e),
            }
        }
    })
}
