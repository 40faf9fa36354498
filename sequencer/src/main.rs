// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use app_core::ContractAddresses;
use tracing_subscriber::EnvFilter;

use sequencer::api::AppState;
use sequencer::ledger::{RpcLedger, RpcLedgerConfig, SharedLedger};
use sequencer::onboarding::Onboarding;
use sequencer::signer_lane::{RetryPolicy, SignerLane, SignerLaneConfig, SignerLaneError};

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_CHAIN_ID: u64 = 1337;
const DEFAULT_TOKEN_DECIMALS: u8 = 6;
const DEFAULT_QUEUE_CAP: usize = 1024;
const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 100;
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_STALE_NONCE_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_STALE_NONCE_BACKOFF: Duration = Duration::from_millis(250);
const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_LANE_METRICS_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let ledger = RpcLedger::connect(&config.ledger).await?;
    let signer = ledger.signer_address();
    tracing::info!(
        rpc_url = %config.ledger.rpc_url,
        chain_id = config.ledger.chain_id,
        %signer,
        "connected to ledger"
    );
    let ledger: SharedLedger = Arc::new(ledger);

    let (signer_lane, lane_handle) = SignerLane::new(ledger.clone(), signer, config.lane);
    let (mut signer_lane_handle, signer_lane_stop) = signer_lane.spawn();

    let state = Arc::new(AppState {
        onboarding: Onboarding::new(lane_handle, ledger, config.contracts),
        chain_id: config.ledger.chain_id,
        token_decimals: config.token_decimals,
    });

    let app = sequencer::api::router(state, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;

    tracing::info!(address = %config.http_addr, "listening");
    tokio::select! {
        server_result = axum::serve(listener, app) => {
            signer_lane_stop.request_shutdown();
            let lane_result = signer_lane_handle.await;
            match lane_result {
                Ok(SignerLaneError::ShutdownRequested) => {}
                Ok(err) => return Err(format!("signer lane exited during shutdown: {err}").into()),
                Err(join_err) => {
                    return Err(format!("signer lane join error during shutdown: {join_err}").into())
                }
            }
            server_result?;
        }
        lane_result = &mut signer_lane_handle => {
            match lane_result {
                Ok(err) => return Err(format!("signer lane exited: {err}").into()),
                Err(join_err) => {
                    return Err(format!("signer lane join error: {join_err}").into())
                }
            }
        }
    }

    Ok(())
}

struct Config {
    http_addr: String,
    max_body_bytes: usize,
    token_decimals: u8,
    ledger: RpcLedgerConfig,
    contracts: ContractAddresses,
    lane: SignerLaneConfig,
}

impl Config {
    fn from_env() -> Result<Self, String> {
        Ok(Self {
            http_addr: env_string("SEQ_HTTP_ADDR", DEFAULT_HTTP_ADDR),
            max_body_bytes: env_usize("SEQ_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
            token_decimals: env_u64("SEQ_TOKEN_DECIMALS", u64::from(DEFAULT_TOKEN_DECIMALS))
                .try_into()
                .map_err(|_| "SEQ_TOKEN_DECIMALS must fit in u8".to_string())?,
            ledger: Config::ledger_from_env()?,
            contracts: Config::contracts_from_env()?,
            lane: Config::lane_from_env(),
        })
    }

    /// The administrator key is required; everything else has a local-node default.
    fn ledger_from_env() -> Result<RpcLedgerConfig, String> {
        let private_key = std::env::var("SEQ_ADMIN_PRIVATE_KEY")
            .map_err(|_| "SEQ_ADMIN_PRIVATE_KEY is required".to_string())?;
        Ok(RpcLedgerConfig {
            rpc_url: env_string("SEQ_RPC_URL", DEFAULT_RPC_URL),
            chain_id: env_u64("SEQ_CHAIN_ID", DEFAULT_CHAIN_ID),
            private_key,
            confirmation_poll_interval: Duration::from_millis(
                env_u64(
                    "SEQ_RECEIPT_POLL_INTERVAL_MS",
                    DEFAULT_RECEIPT_POLL_INTERVAL.as_millis() as u64,
                )
                .max(1),
            ),
        })
    }

    fn contracts_from_env() -> Result<ContractAddresses, String> {
        Ok(ContractAddresses {
            identity_registry: required_address("SEQ_IDENTITY_REGISTRY_ADDRESS")?,
            role_registry: required_address("SEQ_ROLE_REGISTRY_ADDRESS")?,
            token: required_address("SEQ_TOKEN_ADDRESS")?,
        })
    }

    fn lane_from_env() -> SignerLaneConfig {
        SignerLaneConfig {
            queue_capacity: env_usize("SEQ_QUEUE_CAP", DEFAULT_QUEUE_CAP).max(1),
            queue_timeout: Duration::from_millis(env_u64(
                "SEQ_QUEUE_TIMEOUT_MS",
                DEFAULT_QUEUE_TIMEOUT_MS,
            )),
            operation_timeout: Duration::from_millis(
                env_u64(
                    "SEQ_OPERATION_TIMEOUT_MS",
                    DEFAULT_OPERATION_TIMEOUT.as_millis() as u64,
                )
                .max(1),
            ),
            retry: RetryPolicy {
                max_attempts: env_u64(
                    "SEQ_STALE_NONCE_MAX_ATTEMPTS",
                    u64::from(DEFAULT_STALE_NONCE_MAX_ATTEMPTS),
                )
                .clamp(1, u64::from(u32::MAX)) as u32,
                backoff: Duration::from_millis(env_u64(
                    "SEQ_STALE_NONCE_BACKOFF_MS",
                    DEFAULT_STALE_NONCE_BACKOFF.as_millis() as u64,
                )),
            },
            metrics_enabled: env_bool("SEQ_LANE_METRICS", false),
            metrics_log_interval: Duration::from_millis(
                env_u64(
                    "SEQ_LANE_METRICS_INTERVAL_MS",
                    DEFAULT_LANE_METRICS_INTERVAL.as_millis() as u64,
                )
                .max(1),
            ),
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn required_address(key: &str) -> Result<Address, String> {
    let value = std::env::var(key).map_err(|_| format!("{key} is required"))?;
    parse_address(&value).map_err(|err| format!("{key}: {err}"))
}

fn parse_address(value: &str) -> Result<Address, String> {
    if !value.starts_with("0x") {
        return Err("address must be 0x-prefixed hex".to_string());
    }
    let bytes =
        alloy_primitives::hex::decode(value).map_err(|e| format!("invalid address hex: {e}"))?;
    if bytes.len() != 20 {
        return Err("address must be 20 bytes".to_string());
    }
    Ok(Address::from_slice(&bytes))
}
