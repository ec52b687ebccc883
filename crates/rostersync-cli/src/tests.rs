use std::path::PathBuf;

use clap::Parser;
use rostersync_core::db::CURRENT_VERSION;
use rostersync_core::models::Team;
use rostersync_core::sync::{LocalStore, Syncable};
use rostersync_core::{ClientConfig, SyncState};

use crate::cli::{Cli, Commands};
use crate::commands::common::{collect_targets, format_timestamp, resolve_db_path, Context};
use crate::commands::migrate::migrate;
use crate::commands::status::{collect_status, format_status_lines};
use crate::commands::watch::describe_state;
use crate::error::CliError;

fn temp_context(dir: &tempfile::TempDir) -> Context {
    Context {
        config: ClientConfig::default(),
        db_path: dir.path().join("data").join("rostersync.db"),
    }
}

#[test]
fn resolve_db_path_prefers_cli_then_env_then_config() {
    let cli = Some(PathBuf::from("/cli.db"));
    let env = Some(PathBuf::from("/env.db"));
    let config = Some(PathBuf::from("/config.db"));

    assert_eq!(
        resolve_db_path(cli, env.clone(), config.clone()),
        PathBuf::from("/cli.db")
    );
    assert_eq!(
        resolve_db_path(None, env, config.clone()),
        PathBuf::from("/env.db")
    );
    assert_eq!(resolve_db_path(None, None, config), PathBuf::from("/config.db"));
    assert!(resolve_db_path(None, None, None).ends_with("rostersync/rostersync.db"));
}

#[test]
fn cli_parses_global_flags_after_subcommand() {
    let cli = Cli::parse_from(["rostersync", "migrate", "--to", "2", "--db-path", "/tmp/x.db"]);
    assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/x.db")));
    assert!(matches!(cli.command, Commands::Migrate { to: Some(2) }));
}

#[test]
fn format_timestamp_is_utc() {
    assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn describe_state_covers_every_state() {
    assert_eq!(describe_state(SyncState::Synced), "up to date");
    assert_eq!(describe_state(SyncState::Error), "sync failed, will retry");
}

#[tokio::test(flavor = "multi_thread")]
async fn migrate_stops_at_requested_version_then_upgrades() {
    let dir = tempfile::tempdir().unwrap();
    let context = temp_context(&dir);

    assert_eq!(migrate(&context, Some(1)).await.unwrap(), 1);
    assert_eq!(migrate(&context, None).await.unwrap(), CURRENT_VERSION);
    assert!(matches!(
        migrate(&context, Some(CURRENT_VERSION + 1)).await,
        Err(CliError::Config(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reports_counts_per_table() {
    let dir = tempfile::tempdir().unwrap();
    let context = temp_context(&dir);
    {
        let session = context.open_session().unwrap();
        let mut team = Team::new("Falcons", "football");
        team.meta.stained_at = Some(1);
        session.local::<Team>().upsert(&team).await.unwrap();
    }

    let report = collect_status(&context).await.unwrap();
    assert_eq!(report.schema_version, CURRENT_VERSION);
    assert!(!report.foreign_keys);
    assert_eq!(report.remote, None);
    let teams = report
        .tables
        .iter()
        .find(|table| table.table == "teams")
        .unwrap();
    assert_eq!((teams.rows, teams.staged, teams.stashed), (1, 1, 0));

    let lines = format_status_lines(&report);
    assert!(lines.iter().any(|line| line.starts_with("Remote:   not configured")));
    assert!(lines.iter().any(|line| line.starts_with("teams")));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_requires_remote_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let context = temp_context(&dir);
    let session = context.open_session().unwrap();
    assert!(matches!(
        collect_targets(&session).await,
        Err(CliError::SyncNotConfigured)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_targets_include_known_broadcasts() {
    use rostersync_core::models::Broadcast;
    use rostersync_core::RecordId;

    let dir = tempfile::tempdir().unwrap();
    let mut context = temp_context(&dir);
    context.config = ClientConfig {
        remote_base_url: Some("https://api.example.com".into()),
        auth_token: Some("token".into()),
        ..ClientConfig::default()
    };
    let session = context.open_session().unwrap();
    session
        .local::<Broadcast>()
        .upsert(&Broadcast::new(RecordId::from("t1"), "Kit", "Bring both kits"))
        .await
        .unwrap();

    let targets = collect_targets(&session).await.unwrap();
    assert_eq!(targets.len(), 9);
    assert_eq!(targets[8].label(), "broadcast_statuses");
}
