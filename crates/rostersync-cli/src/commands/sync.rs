use rostersync_core::sync::sync_all;
use rostersync_core::SyncReport;
use serde::Serialize;

use crate::commands::common::{collect_targets, Context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct SyncSummary {
    pub targets: usize,
    pub failed: usize,
    pub pushed: usize,
    pub push_failed: usize,
    pub pulled: usize,
    pub applied: usize,
    pub removed: usize,
    pub skipped_guarded: usize,
}

impl SyncSummary {
    pub const fn new(targets: usize, failed: usize, report: SyncReport) -> Self {
        Self {
            targets,
            failed,
            pushed: report.pushed,
            push_failed: report.push_failed,
            pulled: report.pulled,
            applied: report.applied,
            removed: report.removed,
            skipped_guarded: report.skipped_guarded,
        }
    }
}

pub async fn run_sync(context: &Context, as_json: bool) -> Result<(), CliError> {
    let session = context.open_session()?;
    let targets = collect_targets(&session).await?;
    let (report, failed) = sync_all(&targets).await;
    let summary = SyncSummary::new(targets.len(), failed, report);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Synced {} collections: {report}", summary.targets);
    }

    if failed > 0 {
        return Err(CliError::SyncFailed(failed));
    }
    Ok(())
}
