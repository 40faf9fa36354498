// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::{RpcError, TransportError};
use alloy_primitives::{Address, B256, Bytes, U256};
use app_core::{LedgerCall, ReadCall};
use async_trait::async_trait;
use tracing::{debug, trace};

use super::{
    Confirmation, Ledger, LedgerError, STALE_NONCE_ERROR_CODES, error_message_matches_codes,
};

#[derive(Debug, Clone)]
pub struct RpcLedgerConfig {
    /// JSON-RPC URL of the node (e.g. a local Hardhat or Anvil instance).
    pub rpc_url: String,
    /// Chain id the node must report; transactions are signed for it.
    pub chain_id: u64,
    /// Administrator key, 0x-prefixed hex.
    pub private_key: String,
    /// Delay between receipt polls while awaiting confirmation.
    pub confirmation_poll_interval: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcLedgerError {
    #[error("invalid administrator private key: {0}")]
    InvalidPrivateKey(String),
    #[error("provider/transport: {0}")]
    Provider(String),
    #[error("chain id mismatch: configured {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },
}

/// [`Ledger`] backed by an alloy provider with the administrator key as
/// wallet. Nonces are always supplied explicitly, so the provider's nonce
/// filler never picks one.
pub struct RpcLedger {
    provider: DynProvider,
    signer: Address,
    chain_id: u64,
    confirmation_poll_interval: Duration,
}

impl RpcLedger {
    pub async fn connect(config: &RpcLedgerConfig) -> Result<Self, RpcLedgerError> {
        let signer: PrivateKeySigner = config
            .private_key
            .trim()
            .parse()
            .map_err(|e| RpcLedgerError::InvalidPrivateKey(format!("{e}")))?;
        let signer_address = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(config.rpc_url.as_str())
            .await
            .map_err(|e| RpcLedgerError::Provider(e.to_string()))?
            .erased();

        let actual = provider
            .get_chain_id()
            .await
            .map_err(|e| RpcLedgerError::Provider(e.to_string()))?;
        if actual != config.chain_id {
            return Err(RpcLedgerError::ChainIdMismatch {
                expected: config.chain_id,
                actual,
            });
        }

        Ok(Self {
            provider,
            signer: signer_address,
            chain_id: config.chain_id,
            confirmation_poll_interval: config.confirmation_poll_interval,
        })
    }

    /// Address of the administrator account whose nonces are sequenced.
    pub fn signer_address(&self) -> Address {
        self.signer
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|err| classify_transport_error(err, None))
    }

    async fn transaction_count(&self, account: Address) -> Result<u64, LedgerError> {
        self.provider
            .get_transaction_count(account)
            .pending()
            .await
            .map_err(|err| classify_transport_error(err, None))
    }

    async fn submit(&self, call: &LedgerCall, nonce: u64) -> Result<B256, LedgerError> {
        let tx = TransactionRequest::default()
            .with_to(call.to)
            .with_value(call.value)
            .with_input(call.input.clone())
            .with_nonce(nonce)
            .with_chain_id(self.chain_id);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|err| classify_transport_error(err, Some(nonce)))?;
        let tx_hash = *pending.tx_hash();
        debug!(%tx_hash, nonce, kind = %call.kind, "transaction broadcast");
        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: B256) -> Result<Confirmation, LedgerError> {
        let mut highest = self.block_height().await?;
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|err| classify_transport_error(err, None))?;
            if let Some(receipt) = receipt {
                return Ok(Confirmation {
                    success: receipt.status(),
                    block_number: receipt.block_number,
                });
            }

            // A restarted node forgets the transaction; the receipt would never arrive.
            let height = self.block_height().await?;
            if height < highest {
                return Err(LedgerError::HeightRegressed {
                    from: highest,
                    to: height,
                });
            }
            highest = height;
            trace!(%tx_hash, height, "receipt not available yet");
            tokio::time::sleep(self.confirmation_poll_interval).await;
        }
    }

    async fn native_balance(&self, account: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_balance(account)
            .await
            .map_err(|err| classify_transport_error(err, None))
    }

    async fn read(&self, call: &ReadCall) -> Result<Bytes, LedgerError> {
        let tx = TransactionRequest::default()
            .with_to(call.to)
            .with_input(call.input.clone());
        self.provider
            .call(tx)
            .await
            .map_err(|err| classify_transport_error(err, None))
    }
}

/// Maps node error responses to stale-nonce or rejection; anything that never
/// reached the node counts as unavailability.
fn classify_transport_error(err: TransportError, nonce: Option<u64>) -> LedgerError {
    match &err {
        RpcError::ErrorResp(payload) => match nonce {
            Some(nonce)
                if error_message_matches_codes(
                    payload.message.as_ref(),
                    STALE_NONCE_ERROR_CODES,
                ) =>
            {
                LedgerError::StaleNonce {
                    nonce,
                    reason: payload.message.to_string(),
                }
            }
            _ => LedgerError::Rejected(err.to_string()),
        },
        _ => LedgerError::Unavailable(err.to_string()),
    }
}
