//! PledgeHub Server
//!
//! Serves the donation collections over REST and mirrors every successful
//! write into the sharded on-disk layout.

use anyhow::Result;
use clap::Parser;
use pledgehub_common::Config;
use pledgehub_server::{router, settings};
use pledgehub_store::{CollectionStore, DataLayout, Reconciler, SyncScheduler, loader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pledgehub-server")]
#[command(about = "PledgeHub REST server")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Root directory holding db.json and the data directory
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Narrow feedback/admin writes to a flat-only sync
    #[arg(long, default_value_t = false)]
    scoped_sync: bool,

    /// Quiet period before a pending sync runs (milliseconds)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Merge CLI args over the loaded config (CLI takes precedence)
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.listen_host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(root) = self.root {
            config.storage.root = root;
        }
        if self.scoped_sync {
            config.sync.scoped = true;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.sync.debounce_ms = debounce_ms;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PledgeHub server");

    let mut config = settings::load(args.config.as_deref())?;
    args.apply(&mut config);

    let layout = DataLayout::from_config(&config.storage);
    info!("Data root: {}", layout.root().display());
    info!("Data directory: {}", layout.data_dir().display());

    // Load whatever is on disk; missing or broken files start empty
    let store = CollectionStore::new(loader::load(&layout));

    let scheduler = SyncScheduler::spawn(
        store.clone(),
        Reconciler::new(layout),
        Duration::from_millis(config.sync.debounce_ms),
    );

    // Bring the tree in line with the loaded state before serving
    match scheduler.flush().await {
        Ok(report) => info!(
            "Initial sync complete: {} projects, {} unassigned donations",
            report.projects, report.unassigned
        ),
        Err(e) => error!("Initial sync failed: {}", e),
    }

    if config.sync.scoped {
        info!("Scoped sync enabled for feedback and admin writes");
    }

    let app = router(store, Arc::new(scheduler), config.sync.scoped);

    let addr = config.server.listen_addr();
    info!("Starting REST server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}
