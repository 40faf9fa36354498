// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_primitives::{Address, Bytes, U256};
use app_core::ledger_call::{
    decode_bool_return, decode_credential, decode_credential_ids, decode_identity_controllers,
    decode_identity_record,
};
use app_core::{ContractAddresses, CredentialRecord, FundingLeg, IdentityRecord, ReadCall, RoleType};
use futures_util::future::try_join_all;
use tracing::{info, warn};

use super::{OnboardingReceipt, PartialCompletion, WorkflowError, WorkflowRequest, WorkflowStep};
use crate::ledger::SharedLedger;
use crate::signer_lane::{SequencerError, SignerHandle, SubmitOptions, TransactionReceipt};

/// Runs onboarding workflows through the signer lane.
///
/// Cheap to clone; every clone feeds the same lane.
#[derive(Clone)]
pub struct Onboarding {
    lane: SignerHandle,
    ledger: SharedLedger,
    contracts: ContractAddresses,
}

impl Onboarding {
    pub fn new(lane: SignerHandle, ledger: SharedLedger, contracts: ContractAddresses) -> Self {
        Self {
            lane,
            ledger,
            contracts,
        }
    }

    pub fn contracts(&self) -> &ContractAddresses {
        &self.contracts
    }

    pub fn lane(&self) -> &SignerHandle {
        &self.lane
    }

    /// Registers, grants the mapped role, then funds each leg in order.
    ///
    /// Does not check for an existing registration; callers that need
    /// idempotence call [`Self::is_registered`] first.
    pub async fn onboard_participant(
        &self,
        request: WorkflowRequest,
    ) -> Result<OnboardingReceipt, WorkflowError> {
        if request.target_address.is_zero() {
            return Err(WorkflowError::InvalidRequest(
                "target address must not be zero".to_string(),
            ));
        }
        let WorkflowRequest {
            target_address,
            role,
            public_key,
            funding,
        } = request;
        let mut committed = PartialCompletion::default();

        let registration = self
            .register_identity(target_address, public_key.as_deref(), &role)
            .await
            .map_err(|source| step_failed(WorkflowStep::Registration, source, &committed))?;
        committed.registration_tx_hash = Some(registration.tx_hash);
        let dependent = SubmitOptions::after(registration.generation);

        let grant = self
            .submit_step(self.contracts.grant_role(target_address, role.access_role()), dependent)
            .await
            .map_err(|source| step_failed(WorkflowStep::RoleGrant, source, &committed))?;
        committed.role_grant_tx_hash = Some(grant.tx_hash);

        for (leg_index, leg) in funding.iter().enumerate() {
            let step = WorkflowStep::Funding {
                leg_index,
                currency: leg.currency,
            };
            let receipt = self
                .submit_step(self.contracts.fund(target_address, leg), dependent)
                .await
                .map_err(|source| step_failed(step, source, &committed))?;
            committed.funding_tx_hashes.push(receipt.tx_hash);
        }

        info!(
            participant = %target_address,
            role = %role,
            funding_legs = committed.funding_tx_hashes.len(),
            "participant onboarded"
        );

        Ok(OnboardingReceipt {
            registration_tx_hash: registration.tx_hash,
            role_grant_tx_hash: grant.tx_hash,
            funding_tx_hashes: committed.funding_tx_hashes,
        })
    }

    pub async fn register_identity(
        &self,
        target_address: Address,
        public_key: Option<&str>,
        role: &RoleType,
    ) -> Result<TransactionReceipt, SequencerError> {
        let public_key = match public_key {
            Some(key) if !key.trim().is_empty() => key.to_string(),
            _ => target_address.to_checksum(None),
        };
        let call = self.contracts.register_identity(target_address, &public_key, role);
        self.submit_step(call, SubmitOptions::default()).await
    }

    pub async fn grant_role(
        &self,
        target_address: Address,
        role: &RoleType,
    ) -> Result<TransactionReceipt, SequencerError> {
        let call = self.contracts.grant_role(target_address, role.access_role());
        self.submit_step(call, SubmitOptions::default()).await
    }

    pub async fn fund(
        &self,
        target_address: Address,
        leg: &FundingLeg,
    ) -> Result<TransactionReceipt, SequencerError> {
        let call = self.contracts.fund(target_address, leg);
        self.submit_step(call, SubmitOptions::default()).await
    }

    /// Reads the identity registry directly; does not go through the lane.
    pub async fn is_registered(&self, account: Address) -> Result<bool, SequencerError> {
        let output = self.read(self.contracts.has_identity(account)).await?;
        decode_bool_return(&output).map_err(|err| malformed("hasDID", err))
    }

    pub async fn identity(
        &self,
        account: Address,
    ) -> Result<Option<IdentityRecord>, SequencerError> {
        let output = self.read(self.contracts.identity_record(account)).await?;
        decode_identity_record(account, &output).map_err(|err| malformed("getDID", err))
    }

    /// Every registered DID, in registration order.
    pub async fn registrations(&self) -> Result<Vec<IdentityRecord>, SequencerError> {
        let output = self.read(self.contracts.identity_controllers()).await?;
        let controllers = decode_identity_controllers(&output)
            .map_err(|err| malformed("getAllDIDControllers", err))?;
        let lookups = controllers.into_iter().map(|controller| self.identity(controller));
        let records = try_join_all(lookups).await?;
        Ok(records.into_iter().flatten().collect())
    }

    pub async fn credentials(
        &self,
        subject: Address,
    ) -> Result<Vec<CredentialRecord>, SequencerError> {
        let output = self.read(self.contracts.credential_ids(subject)).await?;
        let ids = decode_credential_ids(&output).map_err(|err| malformed("getSubjectVCs", err))?;
        try_join_all(ids.into_iter().map(|id| async move {
            let output = self.read(self.contracts.credential(id)).await?;
            decode_credential(&output).map_err(|err| malformed("getCredential", err))
        }))
        .await
    }

    pub async fn native_balance(&self, account: Address) -> Result<U256, SequencerError> {
        Ok(self.ledger.native_balance(account).await?)
    }

    async fn read(&self, call: ReadCall) -> Result<Bytes, SequencerError> {
        Ok(self.ledger.read(&call).await?)
    }

    async fn submit_step(
        &self,
        call: app_core::LedgerCall,
        options: SubmitOptions,
    ) -> Result<TransactionReceipt, SequencerError> {
        let receipt = self.lane.submit(call, options).await?;
        if !receipt.confirmed {
            return Err(SequencerError::Reverted {
                tx_hash: receipt.tx_hash,
            });
        }
        Ok(receipt)
    }
}

fn malformed(function: &str, err: alloy_sol_types::Error) -> SequencerError {
    SequencerError::Rejected(format!("malformed {function} result: {err}"))
}

fn step_failed(
    step: WorkflowStep,
    source: SequencerError,
    committed: &PartialCompletion,
) -> WorkflowError {
    let committed = PartialCompletion {
        unconfirmed_tx_hash: source.unconfirmed_tx_hash(),
        ..committed.clone()
    };
    warn!(
        %step,
        error = %source,
        committed_steps = committed.committed_steps(),
        unconfirmed_tx_hash = ?committed.unconfirmed_tx_hash,
        "onboarding step failed"
    );
    WorkflowError::StepFailed {
        step,
        source,
        committed,
    }
}

#[cfg(test)]
mod tests {
    use super::Onboarding;
    use crate::ledger::{MockLedger, SharedLedger};
    use crate::onboarding::{WorkflowError, WorkflowRequest, WorkflowStep};
    use crate::signer_lane::{SequencerError, SignerLane, SignerLaneConfig};
    use alloy_primitives::{Address, U256};
    use app_core::{CallKind, ContractAddresses, Currency, FundingLeg, RoleType};
    use std::sync::Arc;

    fn contracts() -> ContractAddresses {
        ContractAddresses {
            identity_registry: Address::repeat_byte(0x01),
            role_registry: Address::repeat_byte(0x02),
            token: Address::repeat_byte(0x03),
        }
    }

    fn onboarding_with(ledger: &Arc<MockLedger>) -> Onboarding {
        let shared: SharedLedger = ledger.clone();
        let (lane, handle) =
            SignerLane::new(shared.clone(), ledger.admin(), SignerLaneConfig::default());
        let _ = lane.spawn();
        Onboarding::new(handle, shared, contracts())
    }

    #[tokio::test]
    async fn registration_is_visible_through_reads() {
        let ledger = Arc::new(MockLedger::new(Address::repeat_byte(0xad)));
        let onboarding = onboarding_with(&ledger);
        let participant = Address::repeat_byte(0x44);

        assert!(!onboarding.is_registered(participant).await.unwrap());
        let receipt = onboarding
            .onboard_participant(WorkflowRequest {
                target_address: participant,
                role: RoleType::Certifier,
                public_key: None,
                funding: vec![FundingLeg {
                    currency: Currency::Native,
                    amount: U256::from(5_u64),
                }],
            })
            .await
            .unwrap();

        assert_eq!(receipt.funding_tx_hashes.len(), 1);
        assert!(onboarding.is_registered(participant).await.unwrap());
        assert_eq!(
            onboarding.native_balance(participant).await.unwrap(),
            U256::from(5_u64)
        );

        let identity = onboarding.identity(participant).await.unwrap().unwrap();
        assert_eq!(identity.did_type, "certifier");
        assert_eq!(identity.public_key, participant.to_checksum(None));
        assert_eq!(identity.identifier, format!("did:ethr:{participant}"));
        assert_eq!(onboarding.registrations().await.unwrap(), vec![identity]);
        assert_eq!(onboarding.identity(Address::repeat_byte(0x45)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn credentials_are_listed_per_subject() {
        let ledger = Arc::new(MockLedger::new(Address::repeat_byte(0xad)));
        let onboarding = onboarding_with(&ledger);
        let participant = Address::repeat_byte(0x44);
        let issuer = Address::repeat_byte(0x0c);
        ledger.issue_credential(issuer, participant, "OrganicCertificate", r#"{"lot":1}"#);
        ledger.issue_credential(issuer, Address::repeat_byte(0x45), "Transport", "{}");
        ledger.issue_credential(issuer, participant, "FairTrade", "{}");

        let credentials = onboarding.credentials(participant).await.unwrap();
        let types: Vec<&str> = credentials
            .iter()
            .map(|vc| vc.credential_type.as_str())
            .collect();
        assert_eq!(types, vec!["OrganicCertificate", "FairTrade"]);
        assert!(credentials.iter().all(|vc| vc.issuer == issuer && !vc.revoked));
        assert!(onboarding.credentials(issuer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_address_is_rejected_before_enqueueing() {
        let ledger = Arc::new(MockLedger::new(Address::repeat_byte(0xad)));
        let onboarding = onboarding_with(&ledger);

        let err = onboarding
            .onboard_participant(WorkflowRequest {
                target_address: Address::ZERO,
                role: RoleType::Farmer,
                public_key: None,
                funding: Vec::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidRequest(_)));
        assert!(ledger.submitted_nonces().is_empty());
    }

    #[tokio::test]
    async fn reverted_grant_stops_workflow() {
        let ledger = Arc::new(MockLedger::new(Address::repeat_byte(0xad)));
        ledger.revert_calls_of(CallKind::GrantRole);
        let onboarding = onboarding_with(&ledger);

        let err = onboarding
            .onboard_participant(WorkflowRequest {
                target_address: Address::repeat_byte(0x44),
                role: RoleType::Farmer,
                public_key: None,
                funding: vec![FundingLeg {
                    currency: Currency::Token,
                    amount: U256::from(1_u64),
                }],
            })
            .await
            .unwrap_err();

        let WorkflowError::StepFailed {
            step,
            source,
            committed,
        } = err
        else {
            panic!("expected step failure");
        };
        assert_eq!(step, WorkflowStep::RoleGrant);
        assert!(matches!(source, SequencerError::Reverted { .. }));
        assert!(committed.registration_tx_hash.is_some());
        assert!(committed.role_grant_tx_hash.is_none());
        let kinds: Vec<_> = ledger.submitted_kinds().into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![CallKind::RegisterIdentity, CallKind::GrantRole]);
    }
}
