// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Onboarding vocabulary shared by the sequencer and its callers.
//!
//! Roles, DIDs and funding legs describe *what* a participant receives;
//! [`ledger_call`] turns them into the calls the administrator signs, and
//! decodes the registry reads into [`registry`] records.
pub mod did;
pub mod funding;
pub mod ledger_call;
pub mod registry;
pub mod role;

pub use did::{Did, DidDocument, DidError, VerificationMethod};
pub use funding::{Currency, FundingError, FundingLeg};
pub use ledger_call::{CallKind, ContractAddresses, LedgerCall, ReadCall};
pub use registry::{CredentialRecord, IdentityRecord};
pub use role::{AccessRole, RoleType};
