use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory with:
/// - an initial `config.json` with default settings
/// - an empty SQLite database at its latest schema version
///
/// The calendar catalog is not created; it is produced externally and copied in afterwards.
///
/// # Errors
/// - Returns an error if any file operations fail or if the directory was already initialized.
pub async fn init(budget_home: &Path) -> Result<Out<()>> {
    let config = Config::create(budget_home)
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    Ok(format!(
        "Successfully created the budget directory at {}. Place the calendar catalog at {}",
        config.root().display(),
        config.catalog_path().display()
    )
    .into())
}
