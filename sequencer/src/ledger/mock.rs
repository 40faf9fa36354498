// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! In-memory ledger with scripted faults, used by the sequencer tests.
//!
//! Behaves like an automining dev node: every accepted submission is mined
//! immediately in its own block, and the administrator nonce must match the
//! account's transaction count exactly.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::SolCall;
use app_core::ledger_call::{
    encode_bool_return, encode_credential, encode_credential_ids, encode_identity_controllers,
    encode_identity_record, encode_missing_identity, getAllDIDControllersCall, getCredentialCall,
    getDIDCall, getSubjectVCsCall, hasDIDCall, registerDIDCall,
};
use app_core::{CallKind, CredentialRecord, Did, IdentityRecord, LedgerCall, ReadCall};
use async_trait::async_trait;

use super::{Confirmation, Ledger, LedgerError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockLedgerEvent {
    Submitted {
        kind: CallKind,
        subject: Address,
        nonce: u64,
        tx_hash: B256,
    },
    Confirmed {
        tx_hash: B256,
        success: bool,
    },
    StaleRejected {
        nonce: u64,
    },
    Restarted {
        height: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct MinedTransaction {
    success: bool,
    block_number: u64,
}

#[derive(Debug, Default)]
struct MockState {
    block_height: u64,
    nonces: HashMap<Address, u64>,
    mined: HashMap<B256, MinedTransaction>,
    identities: HashMap<Address, IdentityRecord>,
    /// Registration order, as the registry reports it.
    controllers: Vec<Address>,
    credentials: Vec<CredentialRecord>,
    balances: HashMap<Address, U256>,
    events: Vec<MockLedgerEvent>,
    submissions: u64,
    transaction_count_queries: u64,
    forced_stale: u32,
    healthy_height_queries: u32,
    unavailable_height_queries: u32,
    unavailable_confirmations: u32,
    failing: HashSet<CallKind>,
    reverting: HashSet<CallKind>,
    restart_during_confirmation: Option<u64>,
    restart_after_confirmation: Option<u64>,
    height_before_last_restart: Option<u64>,
    confirmation_delay: Duration,
    stall_confirmations: bool,
}

#[derive(Debug)]
pub struct MockLedger {
    admin: Address,
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new(admin: Address) -> Self {
        Self {
            admin,
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn with_block_height(self, height: u64) -> Self {
        self.lock().block_height = height;
        self
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn set_block_height(&self, height: u64) {
        self.lock().block_height = height;
    }

    /// Simulates transactions sent by the administrator key outside the sequencer.
    pub fn bump_transaction_count(&self, by: u64) {
        let mut state = self.lock();
        let entry = state.nonces.entry(self.admin).or_default();
        *entry = entry.saturating_add(by);
    }

    /// Relaunches the node: height drops to `height` and all state is wiped.
    pub fn restart(&self, height: u64) {
        self.lock().restart(height);
    }

    /// Rejects the next `count` submissions as stale without touching the nonce.
    pub fn reject_next_submissions_as_stale(&self, count: u32) {
        self.lock().forced_stale = count;
    }

    pub fn fail_next_height_queries(&self, count: u32) {
        self.fail_height_queries_after(0, count);
    }

    /// Answers `skip` height queries, then fails the following `count`.
    pub fn fail_height_queries_after(&self, skip: u32, count: u32) {
        let mut state = self.lock();
        state.healthy_height_queries = skip;
        state.unavailable_height_queries = count;
    }

    /// The next `count` receipt waits fail after the transaction was mined.
    pub fn fail_next_confirmations(&self, count: u32) {
        self.lock().unavailable_confirmations = count;
    }

    /// Records a credential the way an external issuer would; returns its id.
    pub fn issue_credential(
        &self,
        issuer: Address,
        subject: Address,
        credential_type: &str,
        data: &str,
    ) -> U256 {
        let mut state = self.lock();
        let id = U256::from(state.credentials.len() + 1);
        let issued_at = state.block_height;
        state.credentials.push(CredentialRecord {
            id,
            issuer,
            subject,
            credential_type: credential_type.to_string(),
            data: data.to_string(),
            issued_at,
            expires_at: 0,
            revoked: false,
        });
        id
    }

    /// Submissions of `kind` fail as if the node were unreachable.
    pub fn fail_submissions_of(&self, kind: CallKind) {
        self.lock().failing.insert(kind);
    }

    /// Submissions of `kind` are mined with a failed status.
    pub fn revert_calls_of(&self, kind: CallKind) {
        self.lock().reverting.insert(kind);
    }

    /// The next receipt wait observes a node restart to `height` and never
    /// sees its transaction again.
    pub fn restart_during_next_confirmation(&self, height: u64) {
        self.lock().restart_during_confirmation = Some(height);
    }

    /// The next receipt is delivered, then the node restarts to `height`.
    pub fn restart_after_next_confirmation(&self, height: u64) {
        self.lock().restart_after_confirmation = Some(height);
    }

    pub fn set_confirmation_delay(&self, delay: Duration) {
        self.lock().confirmation_delay = delay;
    }

    pub fn stall_confirmations(&self, stalled: bool) {
        self.lock().stall_confirmations = stalled;
    }

    pub fn events(&self) -> Vec<MockLedgerEvent> {
        self.lock().events.clone()
    }

    /// Nonces of accepted submissions, in acceptance order.
    pub fn submitted_nonces(&self) -> Vec<u64> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockLedgerEvent::Submitted { nonce, .. } => Some(*nonce),
                _ => None,
            })
            .collect()
    }

    pub fn submitted_kinds(&self) -> Vec<(CallKind, Address)> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MockLedgerEvent::Submitted { kind, subject, .. } => Some((*kind, *subject)),
                _ => None,
            })
            .collect()
    }

    pub fn transaction_count_queries(&self) -> u64 {
        self.lock().transaction_count_queries
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock ledger mutex poisoned")
    }
}

impl MockState {
    fn restart(&mut self, height: u64) {
        self.height_before_last_restart = Some(self.block_height);
        self.block_height = height;
        self.nonces.clear();
        self.mined.clear();
        self.identities.clear();
        self.controllers.clear();
        self.credentials.clear();
        self.balances.clear();
        self.events.push(MockLedgerEvent::Restarted { height });
    }

    fn apply(&mut self, call: &LedgerCall) {
        match call.kind {
            CallKind::RegisterIdentity => {
                let Ok(registration) = registerDIDCall::abi_decode(&call.input) else {
                    return;
                };
                let controller = registration.controller;
                if !self.identities.contains_key(&controller) {
                    self.controllers.push(controller);
                }
                // Block timestamps are block numbers on this ledger.
                self.identities.insert(
                    controller,
                    IdentityRecord {
                        controller,
                        identifier: Did::from_address(controller).to_string(),
                        public_key: registration.publicKey,
                        did_type: registration.didType,
                        registered_at: self.block_height,
                        active: true,
                    },
                );
            }
            CallKind::TransferNative => {
                let balance = self.balances.entry(call.subject).or_default();
                *balance = balance.saturating_add(call.value);
            }
            CallKind::GrantRole | CallKind::MintToken => {}
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn block_height(&self) -> Result<u64, LedgerError> {
        let mut state = self.lock();
        if state.healthy_height_queries > 0 {
            state.healthy_height_queries -= 1;
        } else if state.unavailable_height_queries > 0 {
            state.unavailable_height_queries -= 1;
            return Err(LedgerError::Unavailable("connection refused".to_string()));
        }
        Ok(state.block_height)
    }

    async fn transaction_count(&self, account: Address) -> Result<u64, LedgerError> {
        let mut state = self.lock();
        state.transaction_count_queries = state.transaction_count_queries.saturating_add(1);
        Ok(state.nonces.get(&account).copied().unwrap_or(0))
    }

    async fn submit(&self, call: &LedgerCall, nonce: u64) -> Result<B256, LedgerError> {
        let mut state = self.lock();
        if state.failing.contains(&call.kind) {
            return Err(LedgerError::Unavailable(format!(
                "connection reset while submitting {}",
                call.kind
            )));
        }
        if state.forced_stale > 0 {
            state.forced_stale -= 1;
            state.events.push(MockLedgerEvent::StaleRejected { nonce });
            return Err(LedgerError::StaleNonce {
                nonce,
                reason: "nonce has already been used".to_string(),
            });
        }

        let expected = state.nonces.get(&self.admin).copied().unwrap_or(0);
        if nonce != expected {
            state.events.push(MockLedgerEvent::StaleRejected { nonce });
            let direction = if nonce < expected { "low" } else { "high" };
            return Err(LedgerError::StaleNonce {
                nonce,
                reason: format!("nonce too {direction}: expected {expected}, got {nonce}"),
            });
        }

        state.submissions = state.submissions.saturating_add(1);
        state.nonces.insert(self.admin, expected + 1);
        state.block_height = state.block_height.saturating_add(1);

        let mut preimage = Vec::with_capacity(32);
        preimage.extend_from_slice(&state.submissions.to_be_bytes());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(call.to.as_slice());
        preimage.extend_from_slice(call.input.as_ref());
        let tx_hash = keccak256(preimage);

        let success = !state.reverting.contains(&call.kind);
        if success {
            state.apply(call);
        }
        let block_number = state.block_height;
        state.mined.insert(
            tx_hash,
            MinedTransaction {
                success,
                block_number,
            },
        );
        state.events.push(MockLedgerEvent::Submitted {
            kind: call.kind,
            subject: call.subject,
            nonce,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn await_confirmation(&self, tx_hash: B256) -> Result<Confirmation, LedgerError> {
        let (delay, stalled) = {
            let state = self.lock();
            (state.confirmation_delay, state.stall_confirmations)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.unavailable_confirmations > 0 {
            state.unavailable_confirmations -= 1;
            return Err(LedgerError::Unavailable(
                "connection reset while polling receipt".to_string(),
            ));
        }
        if let Some(height) = state.restart_during_confirmation.take() {
            let from = state.block_height;
            state.restart(height);
            return Err(LedgerError::HeightRegressed { from, to: height });
        }

        let Some(mined) = state.mined.get(&tx_hash).copied() else {
            // Wiped by a restart while the caller was waiting.
            return Err(match state.height_before_last_restart {
                Some(from) => LedgerError::HeightRegressed {
                    from,
                    to: state.block_height,
                },
                None => LedgerError::Unavailable(format!("unknown transaction {tx_hash}")),
            });
        };
        state.events.push(MockLedgerEvent::Confirmed {
            tx_hash,
            success: mined.success,
        });
        if let Some(height) = state.restart_after_confirmation.take() {
            state.restart(height);
        }
        Ok(Confirmation {
            success: mined.success,
            block_number: Some(mined.block_number),
        })
    }

    async fn native_balance(&self, account: Address) -> Result<U256, LedgerError> {
        Ok(self
            .lock()
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    async fn read(&self, call: &ReadCall) -> Result<Bytes, LedgerError> {
        let input = call.input.as_ref();
        let state = self.lock();
        if let Ok(query) = hasDIDCall::abi_decode(input) {
            return Ok(encode_bool_return(state.identities.contains_key(&query.account)));
        }
        if let Ok(query) = getDIDCall::abi_decode(input) {
            return Ok(match state.identities.get(&query.account) {
                Some(record) => encode_identity_record(record),
                None => encode_missing_identity(),
            });
        }
        if getAllDIDControllersCall::abi_decode(input).is_ok() {
            return Ok(encode_identity_controllers(&state.controllers));
        }
        if let Ok(query) = getSubjectVCsCall::abi_decode(input) {
            let ids: Vec<U256> = state
                .credentials
                .iter()
                .filter(|vc| vc.subject == query.subject)
                .map(|vc| vc.id)
                .collect();
            return Ok(encode_credential_ids(&ids));
        }
        if let Ok(query) = getCredentialCall::abi_decode(input) {
            return state
                .credentials
                .iter()
                .find(|vc| vc.id == query.vcId)
                .map(encode_credential)
                .ok_or_else(|| {
                    LedgerError::Rejected("execution reverted: credential not found".to_string())
                });
        }
        Err(LedgerError::Rejected("execution reverted: unknown selector".to_string()))
    }
}
