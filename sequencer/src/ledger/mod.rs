// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Boundary to the remote ledger. The sequencer only needs heights, account
//! transaction counts, submission with an explicit nonce and receipts.

mod mock;
mod rpc;

use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256};
use app_core::{LedgerCall, ReadCall};
use async_trait::async_trait;
use thiserror::Error;

pub use mock::{MockLedger, MockLedgerEvent};
pub use rpc::{RpcLedger, RpcLedgerConfig, RpcLedgerError};

pub type SharedLedger = Arc<dyn Ledger>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub success: bool,
    pub block_number: Option<u64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("nonce {nonce} rejected as stale: {reason}")]
    StaleNonce { nonce: u64, reason: String },
    #[error("ledger height regressed from {from} to {to} while waiting for receipt")]
    HeightRegressed { from: u64, to: u64 },
    #[error("ledger rejected transaction: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// Pending transaction count of `account`, i.e. the next usable nonce.
    async fn transaction_count(&self, account: Address) -> Result<u64, LedgerError>;

    /// Signs `call` with the administrator key using `nonce` and broadcasts it.
    async fn submit(&self, call: &LedgerCall, nonce: u64) -> Result<B256, LedgerError>;

    /// Resolves once the transaction is included. Does not time out on its own.
    async fn await_confirmation(&self, tx_hash: B256) -> Result<Confirmation, LedgerError>;

    async fn native_balance(&self, account: Address) -> Result<U256, LedgerError>;

    async fn read(&self, call: &ReadCall) -> Result<Bytes, LedgerError>;
}

/// RPC error fragments that mean the nonce was already used or is out of
/// sequence. Matched case-insensitively.
pub const STALE_NONCE_ERROR_CODES: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "nonce has already been used",
    "already known",
    "replacement transaction underpriced",
    "invalid nonce",
];

/// Pure predicate: true if `error_message` contains any of `codes`.
pub(crate) fn error_message_matches_codes(error_message: &str, codes: &[&str]) -> bool {
    let lowered = error_message.to_ascii_lowercase();
    codes.iter().any(|code| lowered.contains(code))
}
