// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;

use alloy_primitives::U256;
use alloy_primitives::utils::parse_units;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Plain value transfer from the administrator account.
    Native,
    /// Mint of the stablecoin contract configured for the deployment.
    Token,
}

/// One funding transfer, amount in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingLeg {
    pub currency: Currency,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FundingError {
    #[error("funding amount must be positive")]
    NotPositive,
    #[error("invalid funding amount {amount:?}: {reason}")]
    InvalidAmount { amount: String, reason: String },
}

impl FundingLeg {
    /// Parses a human amount such as `"1000"` or `"0.5"` using the decimals of
    /// `currency`.
    pub fn parse(
        currency: Currency,
        amount: &str,
        token_decimals: u8,
    ) -> Result<Self, FundingError> {
        let trimmed = amount.trim();
        if trimmed.starts_with('-') {
            return Err(FundingError::NotPositive);
        }
        let decimals = match currency {
            Currency::Native => NATIVE_DECIMALS,
            Currency::Token => token_decimals,
        };
        let amount = parse_units(trimmed, decimals)
            .map_err(|err| FundingError::InvalidAmount {
                amount: trimmed.to_string(),
                reason: err.to_string(),
            })?
            .get_absolute();
        if amount.is_zero() {
            return Err(FundingError::NotPositive);
        }
        Ok(Self { currency, amount })
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Token => f.write_str("token"),
        }
    }
}
