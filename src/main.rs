//! TherapyBridge - client, optimistic cache and CLI for the therapy session manager

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "therapybridge=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Starting TherapyBridge v{}", env!("CARGO_PKG_VERSION"));

    // Run CLI
    therapybridge::cli::run()?;

    Ok(())
}
