// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use thiserror::Error;

/// Why the lane task stopped. The lane never stops on operation failures.
#[derive(Debug, Error)]
pub enum SignerLaneError {
    #[error("signer lane input channel closed")]
    ChannelClosed,
    #[error("signer lane shutdown requested")]
    ShutdownRequested,
}
