//! Predeposit Guarantee Service
//!
//! REST API, actor host and state-root oracle.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use cl_proof::{Address, ClProofVerifier, GindexCalculator, ProofConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use pdg_service::{
    actor, api, ApiContext, AppState, Dispatcher, LoggingTransport, Oracle, OracleConfig,
};
use predeposit_guarantee::PredepositGuarantee;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pdg-service")]
#[command(about = "Predeposit guarantee escrow and consensus-layer proof verifier")]
struct Args {
    /// Owner of the verifier and admin of the escrow
    #[arg(long, env = "PDG_OWNER")]
    owner: Address,

    /// Identity allowed to publish state roots
    #[arg(long, env = "PDG_ORACLE")]
    oracle: Address,

    /// Identity allowed to prove validators valid or invalid
    #[arg(long, env = "PDG_PROOF_AUTHORITY")]
    proof_authority: Address,

    /// Gindex of validator 0 (defaults to the beacon-state layout)
    #[arg(long, env = "FIRST_VALIDATOR_GINDEX")]
    first_validator_gindex: Option<u64>,

    /// Depth of the validator layer; must be the depth of the gindex
    #[arg(long, env = "FIRST_VALIDATOR_DEPTH")]
    first_validator_depth: Option<u32>,

    /// Beacon node URL; enables the state-root oracle
    #[arg(long, env = "BEACON_URL")]
    beacon_url: Option<String>,

    /// Oracle polling interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 12)]
    poll_interval_secs: u64,

    /// Slots per epoch of the followed chain
    #[arg(long, env = "SLOTS_PER_EPOCH", default_value_t = 32)]
    slots_per_epoch: u64,

    /// API listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Metrics listen address
    #[arg(long, default_value = "0.0.0.0:9090")]
    metrics_listen: SocketAddr,
}

impl Args {
    /// Layer defaults to the beacon-state validators; a depth must match its gindex
    fn proof_config(&self) -> Result<ProofConfig> {
        let defaults = ProofConfig::beacon_state(self.oracle);
        let gindex = self
            .first_validator_gindex
            .unwrap_or(defaults.first_validator_gindex);
        ensure!(gindex != 0, "first validator gindex must be non-zero");
        let expected = GindexCalculator::gindex_depth(gindex);
        let depth = self.first_validator_depth.unwrap_or(expected);
        ensure!(
            depth == expected,
            "first validator depth {depth} does not match gindex {gindex} (depth {expected})"
        );
        Ok(ProofConfig {
            oracle: self.oracle,
            first_validator_gindex: gindex,
            first_validator_depth: depth,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    tracing::info!("Starting predeposit guarantee service");
    tracing::info!(listen = %args.listen, "API server");

    PrometheusBuilder::new()
        .with_http_listener(args.metrics_listen)
        .install()
        .context("failed to install metrics exporter")?;
    tracing::info!(listen = %args.metrics_listen, "Metrics exporter");

    let config = args.proof_config()?;
    tracing::info!(
        gindex = config.first_validator_gindex,
        depth = config.first_validator_depth,
        oracle = %config.oracle,
        "Proof configuration"
    );

    // Initialize application state and actors
    let app_state = AppState::new();
    let dispatcher = Dispatcher::new(Arc::new(LoggingTransport), app_state.clone());

    let verifier =
        ClProofVerifier::new(args.owner, config).context("invalid proof configuration")?;
    let (verifier, _verifier_task) =
        actor::spawn(verifier, dispatcher.clone(), app_state.clone());
    let (guarantee, _guarantee_task) = actor::spawn(
        PredepositGuarantee::new(args.owner, args.proof_authority),
        dispatcher,
        app_state.clone(),
    );

    if let Some(beacon_url) = args.beacon_url.clone() {
        tracing::info!(beacon_url = %beacon_url, "Beacon node");
        let oracle = Oracle::new(
            OracleConfig {
                beacon_url,
                poll_interval: Duration::from_secs(args.poll_interval_secs),
                slots_per_epoch: args.slots_per_epoch,
            },
            args.oracle,
            verifier.clone(),
            app_state.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = oracle.run().await {
                tracing::error!(error = %e, "Oracle stopped");
            }
        });
    } else {
        tracing::info!("No beacon node configured, oracle disabled");
    }

    // Start API server
    let ctx = ApiContext {
        state: app_state,
        verifier,
        guarantee,
    };
    let api_handle = tokio::spawn(api::run_server(args.listen.clone(), ctx));

    // Wait for shutdown
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "API server error"),
                Err(e) => tracing::error!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
        }
    }

    Ok(())
}
