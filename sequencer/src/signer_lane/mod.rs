// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! The signer lane: the single writer that owns the administrator nonce.
//!
//! Callers enqueue operations through a [`SignerHandle`]; one task drains the
//! queue in FIFO order and runs each operation with exclusive access to the
//! [`SignerSlot`], so at most one submission is ever in flight.

mod allocator;
mod error;
mod lane;
mod profiling;
mod restart;
mod slot;
mod state;
mod types;

pub use allocator::{Allocation, SequenceAllocator};
pub use error::SignerLaneError;
pub use lane::{SignerHandle, SignerLane, SignerLaneConfig, SignerLaneStop};
pub use restart::RestartCheck;
pub use slot::{RetryPolicy, SignerSlot};
pub use state::SignerState;
pub use types::{
    OperationOutcome, QueuedOperation, SequencerError, SignerLaneInput, SubmitOptions,
    TransactionReceipt,
};
