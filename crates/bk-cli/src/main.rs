//! bk entry point.
//!
//! Drives a [`BillingSession`] against the deterministic paper provider so
//! the whole purchase/acknowledge flow can be exercised end-to-end from a
//! terminal. The platform's real billing module lives in the host app, not
//! here.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use bk_log::{FileLogSink, LogSink, MemoryLogSink};
use bk_provider_paper::PaperBilling;
use bk_schemas::{PurchaseRecord, PurchaseState};
use bk_session::{BillingSession, SessionConfig};

#[derive(Parser)]
#[command(name = "bk")]
#[command(about = "BillingKit demo CLI (paper billing provider)", long_about = None)]
struct Cli {
    /// JSON session config (product ids, product type)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append the billing log to this file instead of printing it
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scripted end-to-end run: connect, buy, query, fetch history, disconnect
    Demo,

    /// Query current purchases and reconcile them
    Query,

    /// Fetch purchase history and reconcile it
    History,

    /// Launch one purchase flow
    Buy {
        /// Product id (defaults to the first configured product)
        #[arg(long)]
        product: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    let billing = Arc::new(PaperBilling::new());
    if matches!(cli.cmd, Commands::Demo) {
        // Seed one settled and one pending purchase so the demo log shows
        // every outcome kind.
        billing.seed_history(PurchaseRecord::new(
            "HT-000001",
            "com.example.starter",
            PurchaseState::Purchased,
            true,
        ));
        billing.seed_purchase(PurchaseRecord::new(
            "QT-000001",
            "com.example.gems",
            PurchaseState::Pending,
            false,
        ));
    }

    match &cli.log_file {
        Some(path) => {
            let sink = FileLogSink::new(path)?;
            let mut session = BillingSession::new(Arc::clone(&billing), sink, config);
            run_command(&cli.cmd, &mut session).await;
            info!("billing log appended to {:?}", path);
        }
        None => {
            let sink = MemoryLogSink::new();
            let mut session = BillingSession::new(Arc::clone(&billing), sink, config);
            run_command(&cli.cmd, &mut session).await;
            println!("{}", session.sink().contents());
        }
    }

    Ok(())
}

async fn run_command<S: LogSink>(cmd: &Commands, session: &mut BillingSession<PaperBilling, S>) {
    let mut rx = session.subscribe();
    session.connect().await;
    session.pump_events(&mut rx).await;

    match cmd {
        Commands::Demo => {
            session.buy_first_configured().await;
            session.pump_events(&mut rx).await;
            session.query_purchases().await;
            session.fetch_purchase_history().await;
            session.disconnect().await;
        }
        Commands::Query => {
            session.query_purchases().await;
        }
        Commands::History => {
            session.fetch_purchase_history().await;
        }
        Commands::Buy { product } => {
            match product {
                Some(product_id) => session.buy(product_id).await,
                None => session.buy_first_configured().await,
            };
            session.pump_events(&mut rx).await;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
