//! CLI subcommand implementations.

use anyhow::{Context, Result};

use crate::Config;

pub mod check_url;
pub mod run;
pub mod status;

/// Builds the collector client from configuration.
pub(crate) fn build_client(config: &Config) -> Result<wt_client::Client> {
    let token = config
        .auth_token
        .as_deref()
        .context("auth token not configured; set auth_token in config.toml or WT_AUTH_TOKEN")?;
    wt_client::Client::new(&config.api_base_url, token).context("failed to build collector client")
}
