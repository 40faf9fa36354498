// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;
use std::time::{Duration, Instant};

use alloy_primitives::B256;
use futures_util::future::BoxFuture;
use thiserror::Error;

use super::slot::SignerSlot;
use crate::ledger::LedgerError;

/// Immutable record of a confirmed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: B256,
    pub sequence_number: u64,
    /// False when the transaction was mined but its execution reverted.
    pub confirmed: bool,
    pub block_number: Option<u64>,
    /// Signer state generation the nonce was issued in.
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Fail with [`SequencerError::RestartedLedgerMidOperation`] instead of
    /// submitting if the signer state was reset since this generation.
    /// Used by steps that depend on earlier committed steps.
    pub expected_generation: Option<u64>,
}

impl SubmitOptions {
    pub fn after(generation: u64) -> Self {
        Self {
            expected_generation: Some(generation),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

pub(super) type LaneOperation =
    Box<dyn for<'a> FnOnce(&'a mut SignerSlot) -> BoxFuture<'a, OperationOutcome> + Send>;

pub struct QueuedOperation {
    pub(super) operation: LaneOperation,
    pub enqueued_at: Instant,
}

impl fmt::Debug for QueuedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedOperation")
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum SignerLaneInput {
    Operation(QueuedOperation),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("sequence number {nonce} still stale after {attempts} attempt(s)")]
    StaleSequenceNumber { attempts: u32, nonce: u64 },
    #[error("ledger restarted while the operation was in flight (height now {current_height})")]
    RestartedLedgerMidOperation { current_height: u64 },
    #[error("ledger rejected transaction: {0}")]
    Rejected(String),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },
    #[error("transaction {tx_hash} was broadcast but its outcome is unknown: {reason}")]
    Unconfirmed { tx_hash: B256, reason: String },
    /// `tx_hash` is set when the operation broadcast a transaction before
    /// the deadline and never saw its receipt.
    #[error("operation timed out after {timeout:?}")]
    OperationTimedOut {
        timeout: Duration,
        tx_hash: Option<B256>,
    },
    #[error("signer queue full")]
    QueueFull,
    #[error("signer lane unavailable")]
    LaneUnavailable,
}

impl SequencerError {
    /// True when the ledger never accepted a transaction for the failed
    /// operation, or the ledger that did was discarded by a restart. Running
    /// the operation again cannot apply its effect twice.
    ///
    /// A broadcast transaction without a receipt is never retryable: it may
    /// still be mined.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LedgerUnavailable(_)
                | Self::StaleSequenceNumber { .. }
                | Self::RestartedLedgerMidOperation { .. }
                | Self::OperationTimedOut { tx_hash: None, .. }
                | Self::QueueFull
        )
    }

    /// Hash of a transaction the operation broadcast whose outcome is unknown.
    pub fn unconfirmed_tx_hash(&self) -> Option<B256> {
        match self {
            Self::Unconfirmed { tx_hash, .. } => Some(*tx_hash),
            Self::OperationTimedOut { tx_hash, .. } => *tx_hash,
            _ => None,
        }
    }
}

impl From<LedgerError> for SequencerError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Unavailable(message) => Self::LedgerUnavailable(message),
            LedgerError::StaleNonce { nonce, .. } => {
                Self::StaleSequenceNumber { attempts: 1, nonce }
            }
            LedgerError::HeightRegressed { to, .. } => {
                Self::RestartedLedgerMidOperation { current_height: to }
            }
            LedgerError::Rejected(message) => Self::Rejected(message),
        }
    }
}
