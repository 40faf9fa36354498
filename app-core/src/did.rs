// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use serde::Serialize;
use thiserror::Error;

const DID_ETHR_PREFIX: &str = "did:ethr:";
const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
const VERIFICATION_KEY_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// `did:ethr:<address>` identifier of an onboarded participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Did {
    address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DidError {
    #[error("DID must start with {DID_ETHR_PREFIX}")]
    UnsupportedMethod,
    #[error("DID address must be 0x-prefixed 20-byte hex")]
    InvalidAddress,
}

impl Did {
    pub const fn from_address(address: Address) -> Self {
        Self { address }
    }

    pub const fn address(&self) -> Address {
        self.address
    }

    /// CAIP-10 account id used in DID documents, e.g. `eip155:1337:0x...`.
    pub fn blockchain_account_id(&self, chain_id: u64) -> String {
        format!("eip155:{chain_id}:{}", self.address)
    }
}

/// W3C DID document for a registered `did:ethr` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    #[serde(rename = "verificationMethod")]
    pub verification_method: Vec<VerificationMethod>,
    pub authentication: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub controller: String,
    #[serde(rename = "blockchainAccountId")]
    pub blockchain_account_id: String,
}

impl DidDocument {
    /// Single-key document; `identifier` is the DID as stored on chain.
    pub fn new(identifier: &str, account: &Did, chain_id: u64) -> Self {
        let key_id = format!("{identifier}#key-1");
        Self {
            context: DID_CONTEXT.to_string(),
            id: identifier.to_string(),
            verification_method: vec![VerificationMethod {
                id: key_id.clone(),
                kind: VERIFICATION_KEY_TYPE.to_string(),
                controller: identifier.to_string(),
                blockchain_account_id: account.blockchain_account_id(chain_id),
            }],
            authentication: vec![key_id],
        }
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value
            .strip_prefix(DID_ETHR_PREFIX)
            .ok_or(DidError::UnsupportedMethod)?;
        if !hex.starts_with("0x") || hex.len() != 42 {
            return Err(DidError::InvalidAddress);
        }
        let address = Address::from_str(hex).map_err(|_| DidError::InvalidAddress)?;
        Ok(Self { address })
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DID_ETHR_PREFIX}{}", self.address)
    }
}
