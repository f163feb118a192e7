//! Alice Skill - Main entry point.

use alice_common::config::Config;
use alice_common::logging::init_logging;
use alice_skill::start_server;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Alice skill v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;

    // Start the HTTP server
    start_server(&config).await
}
