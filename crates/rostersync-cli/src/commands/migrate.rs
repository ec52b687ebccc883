use rostersync_core::db::CURRENT_VERSION;
use rostersync_core::Database;

use crate::commands::common::{display_path, Context};
use crate::error::CliError;

pub async fn run_migrate(context: &Context, to: Option<u32>) -> Result<(), CliError> {
    let version = migrate(context, to).await?;
    println!(
        "{} is at schema v{version} (latest v{CURRENT_VERSION})",
        display_path(&context.db_path)
    );
    Ok(())
}

pub async fn migrate(context: &Context, to: Option<u32>) -> Result<u32, CliError> {
    let mut options = context.config.store_options();
    if let Some(target) = to {
        if target == 0 || target > CURRENT_VERSION {
            return Err(CliError::Config(format!(
                "target version must be between 1 and {CURRENT_VERSION}"
            )));
        }
        options = options.at_version(target);
    }

    let db = Database::open_with(&context.db_path, options)?;
    Ok(db.schema_version().await?)
}
