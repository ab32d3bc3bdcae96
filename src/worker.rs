//! Internal dispatch cron using apalis
//!
//! Optional alternative to the external trigger: fires a dispatch run on
//! a fixed interval.

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use apalis_sql::postgres::PostgresStorage;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{error, info};

use crate::dispatch::{self, DispatchContext};

/// Job input - marker for a scheduled run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}

impl From<chrono::DateTime<chrono::Utc>> for DispatchJob {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        DispatchJob { scheduled_at: dt }
    }
}

/// Job handler - runs one dispatch pass
/// Always returns Ok - per-post failures are recorded on the posts themselves
async fn process_dispatch_job(_job: DispatchJob, ctx: Data<DispatchContext>) -> Result<(), Error> {
    match dispatch::run(&ctx).await {
        Ok(summary) => {
            if summary.selected > 0 {
                info!(
                    selected = summary.selected,
                    posted = summary.posted,
                    failed = summary.failed,
                    halted = summary.halted,
                    "dispatch run complete"
                );
            }
        }
        Err(e) => {
            error!("dispatch run error (will retry next tick): {}", e);
        }
    }
    Ok(())
}

/// Start the dispatch worker
pub async fn run_dispatch_worker(ctx: DispatchContext, cron_seconds: u64) {
    let schedule_expr = format!("*/{} * * * * *", cron_seconds);

    // Run apalis migrations
    PostgresStorage::setup(&ctx.db)
        .await
        .expect("Failed to set up apalis storage");

    let storage: PostgresStorage<DispatchJob> = PostgresStorage::new(ctx.db.clone());
    let schedule = Schedule::from_str(&schedule_expr).expect("Invalid dispatch worker schedule");
    let cron = CronStream::new(schedule);
    let backend = cron.pipe_to_storage(storage);

    info!(cron_seconds, "dispatch worker starting");

    let worker = WorkerBuilder::new("dispatch-worker")
        .data(ctx)
        .backend(backend)
        .build_fn(process_dispatch_job);

    Monitor::new()
        .register(worker)
        .run()
        .await
        .expect("Dispatch worker monitor failed");
}
