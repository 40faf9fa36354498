// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_primitives::{Address, U256};
use serde::Serialize;

/// On-chain DID registered for `controller`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub controller: Address,
    pub identifier: String,
    pub public_key: String,
    pub did_type: String,
    /// Block timestamp of the registration, in seconds.
    pub registered_at: u64,
    pub active: bool,
}

impl IdentityRecord {
    /// Case-insensitive match used by registration search: substring of the
    /// identifier, public key or DID type, or the exact controller address.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_ascii_lowercase();
        if query.is_empty() {
            return true;
        }
        self.identifier.to_ascii_lowercase().contains(&query)
            || self.public_key.to_ascii_lowercase().contains(&query)
            || self.did_type.to_ascii_lowercase().contains(&query)
            || self.controller.to_string().to_ascii_lowercase() == query
    }
}

/// Verifiable credential issued to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialRecord {
    pub id: U256,
    pub issuer: Address,
    pub subject: Address,
    pub credential_type: String,
    /// Issuer-defined payload, usually JSON.
    pub data: String,
    pub issued_at: u64,
    /// Zero when the credential never expires.
    pub expires_at: u64,
    pub revoked: bool,
}
