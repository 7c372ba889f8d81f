//! CCMP relayer daemon.
//!
//! Reads a TOML configuration, connects to every configured chain with the
//! relayer key from the environment and relays routed messages until Ctrl-C
//! or SIGTERM.
//!
//! Run with: `ccmp-relayer --config relayer.toml --env-file .env`

use alloy_network::{Ethereum, EthereumWallet};
use alloy_provider::ProviderBuilder;
use alloy_signer_local::PrivateKeySigner;
use ccmp_relayer::config::RelayerConfig;
use ccmp_relayer::providers::{
    AlloyChainClient, AxelarscanApi, GuardianRestApi, MailboxDeliveryOracle, TokioClock,
};
use ccmp_relayer::traits::{ChainClient, DeliveryOracle};
use ccmp_relayer::transport::{AxelarFetcher, DeliveryOracles, HyperlaneFetcher, WormholeFetcher};
use ccmp_relayer::{
    CancelToken, ChainHandle, ChainRegistry, EncodeOptions, InMemoryNonceStore,
    JsonFileNonceStore, MessageCodec, NonceStore, RelayError, RelayOrchestrator, RelayService,
    TransportRegistry,
};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "ccmp-relayer", version, about = "Relay CCMP cross-chain messages")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CCMP_RELAYER_CONFIG", default_value = "relayer.toml")]
    config: PathBuf,

    /// Load environment variables from this file instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                RelayError::InvalidConfig(format!("cannot load {}: {e}", path.display()))
            })?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    init_logging();

    let config = RelayerConfig::load(&args.config)?;
    info!(config = ?config, event = "config_loaded");

    let signer: PrivateKeySigner = config
        .private_key()?
        .parse()
        .map_err(|e| RelayError::InvalidConfig(format!("invalid relayer private key: {e}")))?;
    info!(relayer = %signer.address(), event = "relayer_key_loaded");
    let wallet = EthereumWallet::from(signer);

    let clock = TokioClock::new();
    let mut handles = Vec::with_capacity(config.chains.len());
    let mut oracles = DeliveryOracles::new();
    let mut subscriptions = HashMap::new();

    for chain in &config.chains {
        let provider = ProviderBuilder::new()
            .wallet(wallet.clone())
            .connect_http(chain.rpc_url.clone());
        let client = AlloyChainClient::<Ethereum, _>::connect(provider.clone()).await?;
        if client.chain_id() != chain.chain_id {
            return Err(RelayError::InvalidConfig(format!(
                "RPC endpoint of chain {} reports chain id {}",
                chain.chain_id,
                client.chain_id()
            )));
        }

        if let Some(hyperlane) = &chain.hyperlane {
            let oracle: Arc<dyn DeliveryOracle> =
                Arc::new(MailboxDeliveryOracle::new(hyperlane.mailbox, provider));
            oracles.insert(chain.chain_id, oracle);
        }

        subscriptions.insert(chain.chain_id, chain.subscription_config());
        let handle = ChainHandle::builder()
            .client(Arc::new(client))
            .gateway(chain.gateway)
            .confirmations(chain.confirmations)
            .maybe_gas_limit(chain.gas_limit)
            .maybe_gas_price(chain.gas_price)
            .workers(config.relayer.workers_per_destination)
            .build();
        info!(
            chain = %handle.name(),
            gateway = %handle.gateway,
            confirmations = handle.confirmations,
            event = "chain_connected"
        );
        handles.push(handle);
    }

    let mut transports = TransportRegistry::new();
    if let Some(wormhole) = &config.transports.wormhole {
        transports.register(Arc::new(
            WormholeFetcher::builder()
                .guardian(Arc::new(GuardianRestApi::new(wormhole.guardian_url.as_str())))
                .clock(clock)
                .polling(wormhole.polling)
                .chain_ids(config.wormhole_chain_ids())
                .core_bridges(config.wormhole_core_bridges())
                .build(),
        ));
    }
    if let Some(axelar) = &config.transports.axelar {
        transports.register(Arc::new(
            AxelarFetcher::builder()
                .api(Arc::new(AxelarscanApi::new(axelar.api_url.as_str())))
                .clock(clock)
                .polling(axelar.polling)
                .build(),
        ));
    }
    if let Some(hyperlane) = &config.transports.hyperlane {
        transports.register(Arc::new(
            HyperlaneFetcher::builder()
                .oracles(oracles)
                .mailboxes(config.hyperlane_mailboxes())
                .clock(clock)
                .polling(hyperlane.polling)
                .build(),
        ));
    }
    info!(transports = ?transports, event = "transports_registered");

    let store: Arc<dyn NonceStore> = match &config.relayer.store_path {
        Some(path) => Arc::new(JsonFileNonceStore::open(path.clone()).await?),
        None => {
            warn!(event = "nonce_store_in_memory");
            Arc::new(InMemoryNonceStore::new())
        }
    };

    let orchestrator = RelayOrchestrator::builder()
        .chains(Arc::new(ChainRegistry::new(handles)))
        .transports(transports.cached())
        .store(store)
        .clock(clock)
        .codec(MessageCodec::new(config.topic_registry()))
        .retry(config.relayer.retry)
        .maybe_job_timeout(config.relayer.job_timeout())
        .confirmation_poll_interval(config.relayer.confirmation_poll_interval())
        .encode_options(EncodeOptions {
            allow_partial_execution: config.relayer.allow_partial_execution,
        })
        .build();

    let service = RelayService::builder()
        .orchestrator(Arc::new(orchestrator))
        .clock(clock)
        .subscriptions(subscriptions)
        .build();

    let cancel = CancelToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown.cancel();
    });

    let report = service.run(&cancel).await?;
    info!(
        confirmed = report.confirmed,
        duplicates = report.duplicates,
        failed = report.failed,
        dropped = report.dropped,
        event = "relayer_exited"
    );
    Ok(())
}

/// Initialize tracing with `RUST_LOG`, defaulting to debug output for this crate.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ccmp_relayer=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Wait for Ctrl-C, or SIGTERM on unix.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, event = "signal_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, event = "signal_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "ctrl_c", event = "shutdown_requested"),
        _ = terminate => info!(signal = "sigterm", event = "shutdown_requested"),
    }
}
