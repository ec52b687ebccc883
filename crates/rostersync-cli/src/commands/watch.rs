use rostersync_core::util::now_millis;
use rostersync_core::SyncState;

use crate::commands::common::{collect_targets, format_timestamp, Context};
use crate::error::CliError;

pub async fn run_watch(context: &Context, interval: Option<u64>) -> Result<(), CliError> {
    let mut config = context.config.clone();
    if let Some(secs) = interval {
        config.sync_interval_secs = Some(secs);
        config = config.validate()?;
    }

    let session = context.open_session_with(&config)?;
    let targets = collect_targets(&session).await?;
    let scheduler = session
        .start_scheduler(targets)
        .ok_or_else(|| CliError::Config("automatic sync is disabled".to_string()))?;
    let mut state = scheduler.subscribe();
    println!("Watching for changes, press Ctrl-C to stop");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("[{}] {}", format_timestamp(now_millis()), describe_state(current));
            }
        }
    }

    scheduler.shutdown().await;
    println!("Stopped");
    Ok(())
}

pub const fn describe_state(state: SyncState) -> &'static str {
    match state {
        SyncState::Offline => "waiting",
        SyncState::Syncing => "syncing",
        SyncState::Synced => "up to date",
        SyncState::Error => "sync failed, will retry",
    }
}
