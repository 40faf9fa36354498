// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

/// Sequencing state of the administrator account.
///
/// Owned by the [`super::SequenceAllocator`] and only reachable through the
/// lane slot. A restart replaces the whole state and bumps `generation`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignerState {
    pub(super) last_known_block_height: u64,
    pub(super) cached_sequence_number: Option<u64>,
    pub(super) generation: u64,
}

impl SignerState {
    pub fn last_known_block_height(&self) -> u64 {
        self.last_known_block_height
    }

    pub fn cached_sequence_number(&self) -> Option<u64> {
        self.cached_sequence_number
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(super) fn reset(&mut self, block_height: u64) {
        *self = Self {
            last_known_block_height: block_height,
            cached_sequence_number: None,
            generation: self.generation.saturating_add(1),
        };
    }
}
