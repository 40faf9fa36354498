// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, SolType, sol, sol_data};

use crate::funding::{Currency, FundingLeg};
use crate::registry::{CredentialRecord, IdentityRecord};
use crate::role::{AccessRole, RoleType};

sol! {
    function registerDID(address controller, string publicKey, string didType);
    function hasDID(address account) view returns (bool);
    function getDID(address account) view returns (
        string identifier,
        string publicKey,
        string didType,
        uint256 registered,
        bool active
    );
    function getAllDIDControllers() view returns (address[] controllers);
    function getSubjectVCs(address subject) view returns (uint256[] ids);
    function getCredential(uint256 vcId) view returns (
        uint256 id,
        address issuer,
        address subject,
        string credentialType,
        string data,
        uint256 issuedAt,
        uint256 expiresAt,
        bool revoked
    );
    function grantRole(bytes32 role, address account);
    function mint(address to, uint256 amount);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    RegisterIdentity,
    GrantRole,
    TransferNative,
    MintToken,
}

/// A state-changing call signed by the administrator account.
///
/// `subject` is the participant the call is about; it is not part of the
/// encoding and only serves logs and test doubles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCall {
    pub kind: CallKind,
    pub subject: Address,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

/// A read-only `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCall {
    pub to: Address,
    pub input: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub identity_registry: Address,
    pub role_registry: Address,
    pub token: Address,
}

impl ContractAddresses {
    pub fn register_identity(
        &self,
        controller: Address,
        public_key: &str,
        role: &RoleType,
    ) -> LedgerCall {
        let call = registerDIDCall {
            controller,
            publicKey: public_key.to_string(),
            didType: role.as_str().to_string(),
        };
        LedgerCall {
            kind: CallKind::RegisterIdentity,
            subject: controller,
            to: self.identity_registry,
            value: U256::ZERO,
            input: call.abi_encode().into(),
        }
    }

    pub fn grant_role(&self, account: Address, role: AccessRole) -> LedgerCall {
        let call = grantRoleCall {
            role: role.id(),
            account,
        };
        LedgerCall {
            kind: CallKind::GrantRole,
            subject: account,
            to: self.role_registry,
            value: U256::ZERO,
            input: call.abi_encode().into(),
        }
    }

    pub fn fund(&self, recipient: Address, leg: &FundingLeg) -> LedgerCall {
        match leg.currency {
            Currency::Native => LedgerCall {
                kind: CallKind::TransferNative,
                subject: recipient,
                to: recipient,
                value: leg.amount,
                input: Bytes::new(),
            },
            Currency::Token => {
                let call = mintCall {
                    to: recipient,
                    amount: leg.amount,
                };
                LedgerCall {
                    kind: CallKind::MintToken,
                    subject: recipient,
                    to: self.token,
                    value: U256::ZERO,
                    input: call.abi_encode().into(),
                }
            }
        }
    }

    pub fn has_identity(&self, account: Address) -> ReadCall {
        self.registry_read(hasDIDCall { account })
    }

    pub fn identity_record(&self, account: Address) -> ReadCall {
        self.registry_read(getDIDCall { account })
    }

    pub fn identity_controllers(&self) -> ReadCall {
        self.registry_read(getAllDIDControllersCall {})
    }

    pub fn credential_ids(&self, subject: Address) -> ReadCall {
        self.registry_read(getSubjectVCsCall { subject })
    }

    pub fn credential(&self, id: U256) -> ReadCall {
        self.registry_read(getCredentialCall { vcId: id })
    }

    fn registry_read(&self, call: impl SolCall) -> ReadCall {
        ReadCall {
            to: self.identity_registry,
            input: call.abi_encode().into(),
        }
    }
}

/// `None` when the registry holds no DID for `controller`.
pub fn decode_identity_record(
    controller: Address,
    data: &[u8],
) -> Result<Option<IdentityRecord>, alloy_sol_types::Error> {
    let record = getDIDCall::abi_decode_returns(data)?;
    if record.identifier.is_empty() {
        return Ok(None);
    }
    Ok(Some(IdentityRecord {
        controller,
        identifier: record.identifier,
        public_key: record.publicKey,
        did_type: record.didType,
        registered_at: record.registered.saturating_to(),
        active: record.active,
    }))
}

pub fn decode_identity_controllers(data: &[u8]) -> Result<Vec<Address>, alloy_sol_types::Error> {
    getAllDIDControllersCall::abi_decode_returns(data)
}

pub fn decode_credential_ids(data: &[u8]) -> Result<Vec<U256>, alloy_sol_types::Error> {
    getSubjectVCsCall::abi_decode_returns(data)
}

pub fn decode_credential(data: &[u8]) -> Result<CredentialRecord, alloy_sol_types::Error> {
    let vc = getCredentialCall::abi_decode_returns(data)?;
    Ok(CredentialRecord {
        id: vc.id,
        issuer: vc.issuer,
        subject: vc.subject,
        credential_type: vc.credentialType,
        data: vc.data,
        issued_at: vc.issuedAt.saturating_to(),
        expires_at: vc.expiresAt.saturating_to(),
        revoked: vc.revoked,
    })
}

pub fn encode_identity_record(record: &IdentityRecord) -> Bytes {
    getDIDCall::abi_encode_returns(&getDIDReturn {
        identifier: record.identifier.clone(),
        publicKey: record.public_key.clone(),
        didType: record.did_type.clone(),
        registered: U256::from(record.registered_at),
        active: record.active,
    })
    .into()
}

/// What the registry answers for an account without a DID.
pub fn encode_missing_identity() -> Bytes {
    getDIDCall::abi_encode_returns(&getDIDReturn {
        identifier: String::new(),
        publicKey: String::new(),
        didType: String::new(),
        registered: U256::ZERO,
        active: false,
    })
    .into()
}

pub fn encode_identity_controllers(controllers: &[Address]) -> Bytes {
    getAllDIDControllersCall::abi_encode_returns(&controllers.to_vec()).into()
}

pub fn encode_credential_ids(ids: &[U256]) -> Bytes {
    getSubjectVCsCall::abi_encode_returns(&ids.to_vec()).into()
}

pub fn encode_credential(vc: &CredentialRecord) -> Bytes {
    getCredentialCall::abi_encode_returns(&getCredentialReturn {
        id: vc.id,
        issuer: vc.issuer,
        subject: vc.subject,
        credentialType: vc.credential_type.clone(),
        data: vc.data.clone(),
        issuedAt: U256::from(vc.issued_at),
        expiresAt: U256::from(vc.expires_at),
        revoked: vc.revoked,
    })
    .into()
}

pub fn decode_bool_return(data: &[u8]) -> Result<bool, alloy_sol_types::Error> {
    <sol_data::Bool as SolType>::abi_decode(data)
}

pub fn encode_bool_return(value: bool) -> Bytes {
    <sol_data::Bool as SolType>::abi_encode(&value).into()
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterIdentity => f.write_str("register_identity"),
            Self::GrantRole => f.write_str("grant_role"),
            Self::TransferNative => f.write_str("transfer_native"),
            Self::MintToken => f.write_str("mint_token"),
        }
    }
}
