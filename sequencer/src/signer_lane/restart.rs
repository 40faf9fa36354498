// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use tracing::warn;

use super::SequencerError;
use super::state::SignerState;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartCheck {
    pub restarted: bool,
    pub previous_height: u64,
    pub current_height: u64,
}

/// Reads the ledger height and resets `state` if it went backwards.
///
/// A failed height query leaves `state` untouched.
pub(super) async fn check_and_maybe_reset(
    ledger: &dyn Ledger,
    state: &mut SignerState,
) -> Result<RestartCheck, SequencerError> {
    let current_height = ledger.block_height().await?;
    Ok(observe_height(state, current_height))
}

/// Pure part of the restart check.
pub(super) fn observe_height(state: &mut SignerState, current_height: u64) -> RestartCheck {
    let previous_height = state.last_known_block_height;
    if current_height < previous_height {
        warn!(
            previous_height,
            current_height,
            generation = state.generation,
            "ledger restart detected, resetting signer state"
        );
        state.reset(current_height);
        return RestartCheck {
            restarted: true,
            previous_height,
            current_height,
        };
    }

    state.last_known_block_height = current_height;
    RestartCheck {
        restarted: false,
        previous_height,
        current_height,
    }
}
