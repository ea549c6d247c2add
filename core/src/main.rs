//! crank: scheduled nft minting against the router + vault index.
//!
//! init -> wire -> run until ctrl+c

use std::process;
use std::sync::Arc;

use crank_content::HttpGateway;
use crank_core::{CrankConfig, CrankCycle, CycleConfig, RetryPolicy, Scheduler};
use crank_ledger::{load_keypair, AllocatorConfig, RpcLedger, SubmitterConfig};
use crank_record::{JsonFileRecordStore, MemoryRecordStore, RecordStore};
use crank_server::{RpcServer, ServerConfig};
use crank_traits::CycleTrigger;
use solana_sdk::signature::Signer;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match CrankConfig::from_env() {
        Ok(config) => config,
        Err(e) => fatal(format_args!("config: {}", e)),
    };

    tracing::info!(
        rpc = %config.ledger.rpc_url,
        ws = %config.ledger.ws_url,
        http = %config.http_addr,
        router_program = %config.program.router_program,
        vault_program = %config.program.vault_program,
        images = %config.assets.images_folder.display(),
        items_available = config.assets.items_available,
        "starting"
    );
    if let Some(path) = &config.program.router_idl_path {
        tracing::debug!(path = %path.display(), "router idl");
    }
    if let Some(path) = &config.program.vault_idl_path {
        tracing::debug!(path = %path.display(), "vault idl");
    }

    // key files: payer + router authority, and the router account
    let payer = match load_keypair(&config.keys.wallet) {
        Ok(key) => key,
        Err(e) => fatal(format_args!("program wallet: {}", e)),
    };
    let router_account = match load_keypair(&config.keys.router) {
        Ok(key) => key.pubkey(),
        Err(e) => fatal(format_args!("router secret: {}", e)),
    };
    tracing::info!(payer = %payer.pubkey(), router = %router_account, "keys loaded");

    let ledger = Arc::new(RpcLedger::new(&config.ledger));

    let gateway = match HttpGateway::new(config.content.clone()) {
        Ok(gateway) => gateway,
        Err(e) => fatal(format_args!("content gateway: {}", e)),
    };

    let records: Arc<dyn RecordStore> = match &config.records_path {
        Some(path) => match JsonFileRecordStore::open(path).await {
            Ok(store) => Arc::new(store),
            Err(e) => fatal(format_args!("record store: {}", e)),
        },
        None => {
            tracing::warn!("RECORDS_PATH not set, records are kept in memory only");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let cycle_config = CycleConfig {
        allocator: AllocatorConfig {
            router_program: config.program.router_program,
            router_account,
            authority: payer.pubkey(),
            capacity: config.program.capacity,
        },
        submitter: SubmitterConfig::from(&config.ledger),
        images_folder: config.assets.images_folder.clone(),
        items_available: config.assets.items_available,
        max_supply: config.assets.max_supply,
        mint_policy: RetryPolicy::mint(),
    };
    let cycle = CrankCycle::new(ledger, payer, gateway, records, cycle_config);
    let scheduler = Arc::new(Scheduler::new(cycle, config.schedule));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = match RpcServer::new(ServerConfig::new().with_bind_addr(config.http_addr)) {
        Ok(server) => server,
        Err(e) => fatal(format_args!("trigger server: {}", e)),
    };
    let trigger: Arc<dyn CycleTrigger> = scheduler.clone();
    let server_task = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move {
            if let Err(e) = server.run(trigger, shutdown).await {
                tracing::error!("trigger server stopped: {}", e);
            }
        }
    });

    let timer_task = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run(shutdown_rx).await }
    });

    // wait for ctrl+c
    tokio::signal::ctrl_c().await.ok();

    tracing::info!("shutting down, waiting for the current cycle");
    shutdown_tx.send(true).ok();
    let _ = tokio::join!(server_task, timer_task);
    tracing::info!("done");
}

fn fatal(message: std::fmt::Arguments<'_>) -> ! {
    tracing::error!("{}", message);
    process::exit(1);
}
