// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_primitives::Address;
use tracing::debug;

use super::SequencerError;
use super::restart::{self, RestartCheck};
use super::state::SignerState;
use crate::ledger::SharedLedger;

/// A nonce handed out by the allocator, together with the restart check
/// that preceded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub sequence_number: u64,
    pub generation: u64,
    pub restart: Option<RestartCheck>,
}

/// Nonce tracker for the administrator account.
///
/// The cache is filled from the ledger's pending transaction count on first
/// use after startup or a reset, then incremented locally.
pub struct SequenceAllocator {
    ledger: SharedLedger,
    signer: Address,
    state: SignerState,
}

impl SequenceAllocator {
    pub fn new(ledger: SharedLedger, signer: Address) -> Self {
        Self {
            ledger,
            signer,
            state: SignerState::default(),
        }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub fn state(&self) -> &SignerState {
        &self.state
    }

    pub async fn check_and_maybe_reset(&mut self) -> Result<RestartCheck, SequencerError> {
        restart::check_and_maybe_reset(self.ledger.as_ref(), &mut self.state).await
    }

    /// Runs the restart check, then issues the next nonce.
    pub async fn next_sequence_number(&mut self) -> Result<Allocation, SequencerError> {
        let check = self.check_and_maybe_reset().await?;

        let sequence_number = match self.state.cached_sequence_number {
            Some(cached) => cached.saturating_add(1),
            None => {
                let fetched = self.ledger.transaction_count(self.signer).await?;
                debug!(
                    signer = %self.signer,
                    nonce = fetched,
                    height = self.state.last_known_block_height,
                    "nonce fetched from ledger"
                );
                fetched
            }
        };
        self.state.cached_sequence_number = Some(sequence_number);

        Ok(Allocation {
            sequence_number,
            generation: self.state.generation,
            restart: check.restarted.then_some(check),
        })
    }

    /// Forgets the cached nonce; the next allocation re-queries the ledger.
    pub fn invalidate(&mut self) {
        if let Some(nonce) = self.state.cached_sequence_number.take() {
            debug!(signer = %self.signer, nonce, "nonce cache invalidated");
        }
    }
}
