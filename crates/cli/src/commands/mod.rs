//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_shipper;
pub use validate::run_validate;

use anyhow::{Context, Result};
use std::path::Path;

use config_loader::{ConfigLoader, ShipperBlueprint};

use crate::error::CliError;

/// Load a blueprint, failing early with a clear message when the file is missing
fn load_blueprint(path: &Path) -> Result<ShipperBlueprint> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()).into());
    }

    ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}
