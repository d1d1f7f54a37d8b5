//! Configuration loading.
//!
//! Precedence, lowest first: built-in defaults, the optional TOML file,
//! `PLEDGEHUB__SECTION__KEY` environment variables. CLI flags are applied
//! on top by the caller.

use anyhow::{Context, Result};
use pledgehub_common::Config;
use std::path::Path;

/// Prefix for environment overrides, e.g. `PLEDGEHUB__SYNC__SCOPED=true`
pub const ENV_PREFIX: &str = "PLEDGEHUB";

/// Load configuration from `path` (if given and present) and the environment.
///
/// # Errors
/// Fails if the file exists but cannot be parsed, or a value has the wrong
/// type.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .context("failed to read configuration")?
        .try_deserialize()
        .context("invalid configuration")
}
