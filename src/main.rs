//! Multi-chain arbitrage engine entry point.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chainarb::api::{create_router, AppState};
use chainarb::chain::{ChainClient, RpcClient};
use chainarb::config::Config;
use chainarb::coordinator::ChainCoordinator;
use chainarb::metrics;
use chainarb::oracle::{NoopOracle, PriceOracle, StaticOracle};
use chainarb::registry::discover_pools;
use chainarb::signing::address_from_private_key;
use chainarb::utils::shutdown_signal;

/// Seconds granted to in-flight work at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Multi-chain AMM cyclic-arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "chainarb")]
#[command(about = "Detects and executes cyclic AMM arbitrage across EVM chains")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Run in dry-run mode (no transactions are sent).
    #[arg(long)]
    dry_run: Option<bool>,

    /// HTTP server port for the operator API.
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine (default).
    Run {
        /// Run in dry-run mode (no transactions are sent).
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for the operator API.
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Enumerate pools for each enabled chain and exit.
    DiscoverPools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("chainarb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::DiscoverPools) => cmd_discover_pools().await,
        Some(Command::Run { dry_run, port }) => cmd_run(dry_run, port).await,
        None => cmd_run(args.dry_run, args.port).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("CHAINARB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {e}");
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {e}");
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Checking wallet key... ");
    match address_from_private_key(&config.wallet_key) {
        Ok(address) => {
            println!("OK");
            println!("  Wallet address: {address}");
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {e}");
            return Err(anyhow::anyhow!("Wallet key invalid"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    let chains = config.chains()?;
    for chain in &chains {
        println!(
            "  Chain {}: {} tokens, {} dexes, {} extra pools, private mempool: {}",
            chain.chain_id,
            chain.tokens.len(),
            chain.dexes.len(),
            chain.extra_pools.len(),
            chain.private_mempool && chain.private_submit_url.is_some(),
        );
    }
    println!("  Min Profit: ${}", config.min_profit_usd);
    println!("  Max Gas Price: {} gwei", config.max_gas_price_gwei);
    println!("  Max Slippage: {} bps", config.max_slippage_bps);
    println!("  Simulate First: {}", config.simulate_before_execute);
    println!("  Dry Run: {}", config.dry_run);
    println!("  Cooldown: {}ms", config.cooldown_ms);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Enumerate pools for each enabled chain.
async fn cmd_discover_pools() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    println!("======================================================================");
    println!("CHAINARB - POOL DISCOVERY");
    println!("======================================================================");

    for settings in config.chains()? {
        println!("\nChain {}:", settings.chain_id);
        let client = RpcClient::new(
            settings.chain_id,
            settings.rpc_url.clone(),
            settings.private_submit_url.clone(),
            config.http_timeout_ms,
        );

        match discover_pools(&client, &settings).await {
            Ok(registry) => {
                println!("  Tokens: {}", registry.tokens().count());
                println!("  Pools: {}", registry.pool_count());
                for pool in registry.pools() {
                    println!(
                        "  - {:#x} [{}] {} ({} bps)",
                        pool.address,
                        pool.family.as_str(),
                        pool.dex,
                        pool.fee_bps,
                    );
                }
            }
            Err(e) => {
                println!("  Discovery failed: {e}");
            }
        }
    }

    println!("======================================================================");
    Ok(())
}

/// Run the engine.
async fn cmd_run(dry_run_override: Option<bool>, port: u16) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {e}"));
    }

    info!("Configuration loaded successfully");
    info!(
        "Mode: {}",
        if config.dry_run { "DRY RUN" } else { "LIVE TRADING" }
    );
    info!("Min profit: ${}", config.min_profit_usd);
    info!("Max gas price: {} gwei", config.max_gas_price_gwei);

    let oracle: Arc<dyn PriceOracle> = {
        let table = config.static_price_table()?;
        if table.is_empty() {
            info!("No price oracle configured, USD filters are no-ops");
            Arc::new(NoopOracle)
        } else {
            info!("Static price oracle with {} entries", table.len());
            Arc::new(StaticOracle::new(table))
        }
    };

    // Build one coordinator per enabled chain.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = HashMap::new();
    let mut tasks = Vec::new();

    for settings in config.chains()? {
        let chain_id = settings.chain_id;
        info!(chain = chain_id, "Building chain coordinator...");

        let client: Arc<dyn ChainClient> = Arc::new(RpcClient::new(
            chain_id,
            settings.rpc_url.clone(),
            settings.private_submit_url.clone(),
            config.http_timeout_ms,
        ));

        match ChainCoordinator::build(&config, settings, client, oracle.clone()).await {
            Ok((coordinator, handle)) => {
                handles.insert(chain_id, handle);
                let shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(coordinator.run(shutdown)));
                info!(chain = chain_id, "Chain coordinator started");
            }
            Err(e) => {
                error!(chain = chain_id, error = %e, "Chain startup failed, skipping");
            }
        }
    }

    if handles.is_empty() {
        return Err(anyhow::anyhow!("no chain started successfully"));
    }

    // Operator API.
    let app_state = AppState::new(handles);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Operator API listening on {}", addr);

    let router = create_router(app_state.clone());
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    app_state.set_ready(true);
    info!("========================================");
    info!("CHAINARB STARTED");
    info!("========================================");

    // Wait for shutdown, then give in-flight work a bounded grace period.
    shutdown_signal().await;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    let drain = futures::future::join_all(tasks);
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("in-flight work did not finish within grace period");
    }
    server_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
