use rostersync_core::db::{TableStats, CURRENT_VERSION};
use serde::Serialize;

use crate::commands::common::{display_path, Context};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub schema_version: u32,
    pub latest_version: u32,
    pub foreign_keys: bool,
    pub remote: Option<String>,
    pub tables: Vec<TableItem>,
}

#[derive(Debug, Serialize)]
pub struct TableItem {
    pub table: String,
    pub rows: i64,
    pub staged: i64,
    pub stashed: i64,
}

impl From<TableStats> for TableItem {
    fn from(stats: TableStats) -> Self {
        Self {
            table: stats.table.to_string(),
            rows: stats.rows,
            staged: stats.staged,
            stashed: stats.stashed,
        }
    }
}

pub async fn run_status(context: &Context, as_json: bool) -> Result<(), CliError> {
    let report = collect_status(context).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for line in format_status_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub async fn collect_status(context: &Context) -> Result<StatusReport, CliError> {
    let session = context.open_session()?;
    let db = session.database();
    Ok(StatusReport {
        database: display_path(&context.db_path),
        schema_version: db.schema_version().await?,
        latest_version: CURRENT_VERSION,
        foreign_keys: db.foreign_keys_enforced().await?,
        remote: session.sync_config().url.clone(),
        tables: db
            .table_stats()
            .await?
            .into_iter()
            .map(TableItem::from)
            .collect(),
    })
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!("Database: {}", report.database),
        format!(
            "Schema:   v{} (latest v{})",
            report.schema_version, report.latest_version
        ),
        format!(
            "Foreign keys: {}",
            if report.foreign_keys { "enforced" } else { "off" }
        ),
        format!(
            "Remote:   {}",
            report.remote.as_deref().unwrap_or("not configured")
        ),
        String::new(),
        format!("{:<20} {:>8} {:>8} {:>8}", "TABLE", "ROWS", "STAGED", "STASHED"),
    ];
    lines.extend(report.tables.iter().map(|table| {
        format!(
            "{:<20} {:>8} {:>8} {:>8}",
            table.table, table.rows, table.staged, table.stashed
        )
    }));
    lines
}
