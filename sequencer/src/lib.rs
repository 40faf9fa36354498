// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Single-signer sequencer for participant onboarding.
//!
//! Flow: API -> onboarding workflow -> signer lane -> ledger.
//! The signer lane is the single writer that owns the administrator nonce;
//! reads go to the ledger directly.
pub mod api;
pub mod ledger;
pub mod onboarding;
pub mod signer_lane;
