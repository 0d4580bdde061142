//! Loads SQL schema scripts into the configured database.
//!
//! Usage: `pooldb <script.sql> [more.sql ...]`
//! Configuration comes from the environment (see the `config` module); a
//! `.env` file is honored if present.

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let scripts: Vec<String> = std::env::args().skip(1).collect();
    if scripts.is_empty() {
        bail!("usage: pooldb <script.sql> [more.sql ...]");
    }

    let cfg = pooldb::config::load()?;
    let manager = pooldb::DatabaseManager::new(cfg)?;

    for path in &scripts {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path))?;
        let applied = manager.load_script(&script)?;
        info!(path = path.as_str(), applied, "loaded script");
    }

    let status = manager.pool_status();
    info!(
        size = status.size,
        free = status.free,
        max = status.max,
        "done"
    );
    Ok(())
}
