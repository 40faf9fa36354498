// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy_primitives::{Address, B256};
use app_core::LedgerCall;
use tracing::{info, warn};

use super::allocator::{Allocation, SequenceAllocator};
use super::restart::RestartCheck;
use super::state::SignerState;
use super::{SequencerError, SubmitOptions, TransactionReceipt};
use crate::ledger::{LedgerError, SharedLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total submissions tried for one operation when the ledger keeps
    /// reporting a stale nonce.
    pub max_attempts: u32,
    /// Linear backoff unit: attempt `n` waits `n * backoff` before retrying.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Exclusive execution context handed to one queued operation at a time.
pub struct SignerSlot {
    ledger: SharedLedger,
    allocator: SequenceAllocator,
    retry: RetryPolicy,
    /// Broadcast by the running `submit` and still waiting for a receipt.
    unconfirmed: Option<B256>,
}

impl SignerSlot {
    pub fn new(ledger: SharedLedger, signer: Address, retry: RetryPolicy) -> Self {
        let allocator = SequenceAllocator::new(ledger.clone(), signer);
        Self {
            ledger,
            allocator,
            retry,
            unconfirmed: None,
        }
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn signer(&self) -> Address {
        self.allocator.signer()
    }

    pub fn state(&self) -> &SignerState {
        self.allocator.state()
    }

    pub fn generation(&self) -> u64 {
        self.allocator.state().generation()
    }

    pub async fn check_and_maybe_reset(&mut self) -> Result<RestartCheck, SequencerError> {
        self.allocator.check_and_maybe_reset().await
    }

    pub async fn next_sequence_number(&mut self) -> Result<Allocation, SequencerError> {
        self.allocator.next_sequence_number().await
    }

    pub fn invalidate_sequence_number(&mut self) {
        self.allocator.invalidate();
    }

    /// Hash left behind by a `submit` that was dropped between broadcast and
    /// receipt.
    pub(super) fn take_unconfirmed(&mut self) -> Option<B256> {
        self.unconfirmed.take()
    }

    /// Submits `call` with the next nonce and waits for its receipt.
    ///
    /// Stale nonces are retried with a fresh ledger count up to
    /// `RetryPolicy::max_attempts`. Any other failure before the transaction
    /// is accepted also drops the cached nonce, since it was never consumed.
    ///
    /// Once a receipt is in hand it is returned even if the follow-up height
    /// check fails or finds a restart. The reset still happens, so steps
    /// submitted with [`SubmitOptions::after`] this receipt's generation are
    /// refused.
    pub async fn submit(
        &mut self,
        call: &LedgerCall,
        options: SubmitOptions,
    ) -> Result<TransactionReceipt, SequencerError> {
        self.unconfirmed = None;
        let result = self.submit_and_confirm(call, options).await;
        self.unconfirmed = None;
        result
    }

    async fn submit_and_confirm(
        &mut self,
        call: &LedgerCall,
        options: SubmitOptions,
    ) -> Result<TransactionReceipt, SequencerError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0_u32;

        let (tx_hash, allocation) = loop {
            attempt = attempt.saturating_add(1);
            let allocation = self.allocator.next_sequence_number().await?;
            self.ensure_generation(&allocation, options)?;

            match self.ledger.submit(call, allocation.sequence_number).await {
                Ok(tx_hash) => break (tx_hash, allocation),
                Err(LedgerError::StaleNonce { nonce, reason }) => {
                    self.allocator.invalidate();
                    if attempt >= max_attempts {
                        return Err(SequencerError::StaleSequenceNumber {
                            attempts: attempt,
                            nonce,
                        });
                    }
                    warn!(
                        nonce,
                        attempt,
                        max_attempts,
                        %reason,
                        "stale nonce, retrying with fresh count"
                    );
                    tokio::time::sleep(self.retry.delay_after(attempt)).await;
                }
                Err(err) => {
                    self.allocator.invalidate();
                    return Err(err.into());
                }
            }
        };

        self.unconfirmed = Some(tx_hash);

        let confirmation = match self.ledger.await_confirmation(tx_hash).await {
            Ok(confirmation) => confirmation,
            Err(LedgerError::HeightRegressed { to, .. }) => {
                let current_height = match self.allocator.check_and_maybe_reset().await {
                    Ok(check) if check.restarted => check.current_height.min(to),
                    Ok(check) => {
                        self.allocator.invalidate();
                        check.current_height.min(to)
                    }
                    Err(_) => {
                        self.allocator.invalidate();
                        to
                    }
                };
                return Err(SequencerError::RestartedLedgerMidOperation { current_height });
            }
            Err(err) => {
                // The nonce may or may not be consumed; recount next time.
                self.allocator.invalidate();
                return Err(SequencerError::Unconfirmed {
                    tx_hash,
                    reason: err.to_string(),
                });
            }
        };

        match self.allocator.check_and_maybe_reset().await {
            Ok(check) if check.restarted => warn!(
                %tx_hash,
                current_height = check.current_height,
                "ledger restarted after receipt, dependent steps will be refused"
            ),
            Ok(_) => {}
            Err(err) => warn!(%tx_hash, error = %err, "height check after receipt failed"),
        }

        info!(
            %tx_hash,
            nonce = allocation.sequence_number,
            kind = %call.kind,
            subject = %call.subject,
            success = confirmation.success,
            "transaction confirmed"
        );

        Ok(TransactionReceipt {
            tx_hash,
            sequence_number: allocation.sequence_number,
            confirmed: confirmation.success,
            block_number: confirmation.block_number,
            generation: allocation.generation,
        })
    }

    fn ensure_generation(
        &mut self,
        allocation: &Allocation,
        options: SubmitOptions,
    ) -> Result<(), SequencerError> {
        match options.expected_generation {
            Some(expected) if expected != allocation.generation => {
                self.allocator.invalidate();
                Err(SequencerError::RestartedLedgerMidOperation {
                    current_height: self.allocator.state().last_known_block_height(),
                })
            }
            _ => Ok(()),
        }
    }
}
