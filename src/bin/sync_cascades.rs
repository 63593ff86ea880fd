use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use resale_catalog::config;
use resale_catalog::outbox;
use resale_catalog::store::{self, CatalogStore, SqliteStore};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Retry pending lot-sale cascades and exit when none are due"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Stop after this many consecutive failures
    #[arg(long, default_value = "5")]
    max_failures: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = store::init_pool(&cfg.database_url()).await?;
    store::run_migrations(&pool).await?;
    let store = SqliteStore::new(pool, cfg.app.user_id.clone());
    let max_backoff = cfg.app.max_backoff_seconds as i64;

    let mut processed = 0_u32;
    let mut failures = 0_u32;
    loop {
        match outbox::process_next_cascade(&store, max_backoff).await {
            Ok(true) => {
                processed += 1;
                failures = 0;
            }
            Ok(false) => break,
            Err(err) => {
                failures += 1;
                error!(?err, failures, "cascade worker error");
                if failures >= args.max_failures {
                    warn!(failures, "giving up after repeated errors");
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    if let Some(next) = store.next_due_cascade().await? {
        warn!(id = next.id, lot_id = %next.lot_id, "cascade still due");
    }
    info!(processed, "cascade sync finished");
    Ok(())
}
