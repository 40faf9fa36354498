// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Participant onboarding: register, grant role, fund.
//!
//! Every step is a separate lane submission enqueued only after the previous
//! step's receipt arrived. A failure stops the workflow and reports what was
//! already committed; nothing is rolled back.

mod orchestrator;

use std::fmt;

use alloy_primitives::{Address, B256};
use app_core::{Currency, FundingLeg, RoleType};
use serde::Serialize;
use thiserror::Error;

use crate::signer_lane::SequencerError;

pub use orchestrator::Onboarding;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRequest {
    pub target_address: Address,
    pub role: RoleType,
    /// Defaults to the checksummed target address.
    pub public_key: Option<String>,
    pub funding: Vec<FundingLeg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingReceipt {
    pub registration_tx_hash: B256,
    pub role_grant_tx_hash: B256,
    pub funding_tx_hashes: Vec<B256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    Registration,
    RoleGrant,
    Funding { leg_index: usize, currency: Currency },
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration => f.write_str("registration"),
            Self::RoleGrant => f.write_str("role_grant"),
            Self::Funding {
                leg_index,
                currency,
            } => write!(f, "funding[{leg_index}]:{currency}"),
        }
    }
}

/// Transaction hashes committed before a workflow stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartialCompletion {
    pub registration_tx_hash: Option<B256>,
    pub role_grant_tx_hash: Option<B256>,
    pub funding_tx_hashes: Vec<B256>,
    /// Broadcast by the failed step without a receipt. It may still be
    /// mined, so check it before running that step again.
    pub unconfirmed_tx_hash: Option<B256>,
}

impl PartialCompletion {
    pub fn is_empty(&self) -> bool {
        self.registration_tx_hash.is_none()
            && self.role_grant_tx_hash.is_none()
            && self.funding_tx_hashes.is_empty()
            && self.unconfirmed_tx_hash.is_none()
    }

    fn committed_steps(&self) -> usize {
        usize::from(self.registration_tx_hash.is_some())
            + usize::from(self.role_grant_tx_hash.is_some())
            + self.funding_tx_hashes.len()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("invalid onboarding request: {0}")]
    InvalidRequest(String),
    #[error("onboarding step {step} failed: {source}")]
    StepFailed {
        step: WorkflowStep,
        #[source]
        source: SequencerError,
        committed: PartialCompletion,
    },
}

#[cfg(test)]
mod tests {
    use super::{PartialCompletion, WorkflowStep};
    use alloy_primitives::B256;
    use app_core::Currency;

    #[test]
    fn step_names_are_stable() {
        assert_eq!(WorkflowStep::Registration.to_string(), "registration");
        assert_eq!(WorkflowStep::RoleGrant.to_string(), "role_grant");
        assert_eq!(
            WorkflowStep::Funding {
                leg_index: 1,
                currency: Currency::Token
            }
            .to_string(),
            "funding[1]:token"
        );
    }

    #[test]
    fn partial_completion_emptiness() {
        let mut committed = PartialCompletion::default();
        assert!(committed.is_empty());
        committed.registration_tx_hash = Some(B256::repeat_byte(1));
        assert!(!committed.is_empty());

        let pending_only = PartialCompletion {
            unconfirmed_tx_hash: Some(B256::repeat_byte(2)),
            ..PartialCompletion::default()
        };
        assert!(!pending_only.is_empty());
        assert_eq!(pending_only.committed_steps(), 0);
    }
}
