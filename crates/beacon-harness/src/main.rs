//! # Beacon
//!
//! Runs a scene of scripted components through the dispatcher and reports
//! which handlers fired.
//!
//! ## Usage
//!
//! ```bash
//! # Run a scene file
//! beacon scenes/menu.toml
//!
//! # Use the scene named in beacon.toml
//! beacon
//!
//! # Override the tracking marker
//! BEACON_MARKER=listening beacon scenes/menu.toml
//! ```

mod config;
mod scene;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=info,tenvis_beacon_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;
    tenvis_beacon_core::metrics::describe();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| config.scene.clone())
        .context("No scene given: pass a scene file or set `scene` in beacon.toml")?;

    tracing::info!("Running scene {}", path.display());
    let scene = scene::Scene::from_file(&path)?;
    let report = scene.run(&config.dispatch).await?;
    print!("{report}");

    Ok(())
}
