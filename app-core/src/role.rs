// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Participant role recorded as the DID type in the identity registry.
///
/// `factory` and `processing` are accepted on input as legacy spellings of
/// `cooperative` and `transporter`; they are never produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoleType {
    Farmer,
    Transporter,
    Certifier,
    Cooperative,
    Custom(String),
}

/// Access role granted in the role registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessRole {
    Farmer,
    Transporter,
    Certifier,
    Factory,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("role must not be empty")]
pub struct EmptyRole;

impl RoleType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Farmer => "farmer",
            Self::Transporter => "transporter",
            Self::Certifier => "certifier",
            Self::Cooperative => "cooperative",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Custom roles fall back to the farmer grant, which is the least
    /// privileged role the marketplace knows.
    pub fn access_role(&self) -> AccessRole {
        match self {
            Self::Farmer | Self::Custom(_) => AccessRole::Farmer,
            Self::Transporter => AccessRole::Transporter,
            Self::Certifier => AccessRole::Certifier,
            Self::Cooperative => AccessRole::Factory,
        }
    }
}

impl FromStr for RoleType {
    type Err = EmptyRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(EmptyRole);
        }
        let role = match trimmed.to_ascii_lowercase().as_str() {
            "farmer" => Self::Farmer,
            "transporter" | "processing" => Self::Transporter,
            "certifier" => Self::Certifier,
            "cooperative" | "factory" => Self::Cooperative,
            _ => Self::Custom(trimmed.to_string()),
        };
        Ok(role)
    }
}

impl TryFrom<String> for RoleType {
    type Error = EmptyRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoleType> for String {
    fn from(value: RoleType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AccessRole {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Farmer => "FARMER_ROLE",
            Self::Transporter => "TRANSPORTER_ROLE",
            Self::Certifier => "CERTIFIER_ROLE",
            Self::Factory => "FACTORY_ROLE",
        }
    }

    /// `keccak256(name)`, the role identifier checked by the role registry.
    pub fn id(&self) -> B256 {
        keccak256(self.name().as_bytes())
    }
}

impl fmt::Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
