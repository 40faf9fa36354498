// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use alloy_primitives::Address;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::onboarding::{PartialCompletion, WorkflowError, WorkflowStep};
use crate::signer_lane::SequencerError;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("participant {0} is already registered")]
    AlreadyRegistered(Address),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Sequencer(SequencerError),
    #[error("step {step} failed: {source}")]
    StepFailed {
        step: WorkflowStep,
        source: SequencerError,
        committed: PartialCompletion,
    },
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    committed: Option<PartialCompletion>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyRegistered(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Sequencer(err) | Self::StepFailed { source: err, .. } => sequencer_status(err),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Sequencer(err) | Self::StepFailed { source: err, .. } => sequencer_code(err),
        }
    }
}

fn sequencer_status(err: &SequencerError) -> StatusCode {
    match err {
        SequencerError::LedgerUnavailable(_)
        | SequencerError::StaleSequenceNumber { .. }
        | SequencerError::RestartedLedgerMidOperation { .. }
        | SequencerError::LaneUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        SequencerError::Rejected(_) | SequencerError::Reverted { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SequencerError::Unconfirmed { .. } | SequencerError::OperationTimedOut { .. } => {
            StatusCode::GATEWAY_TIMEOUT
        }
        SequencerError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
    }
}

fn sequencer_code(err: &SequencerError) -> &'static str {
    match err {
        SequencerError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
        SequencerError::StaleSequenceNumber { .. } => "STALE_SEQUENCE_NUMBER",
        SequencerError::RestartedLedgerMidOperation { .. } => "LEDGER_RESTARTED",
        SequencerError::Rejected(_) => "EXECUTION_REJECTED",
        SequencerError::Reverted { .. } => "REVERTED",
        SequencerError::Unconfirmed { .. } => "OUTCOME_UNKNOWN",
        SequencerError::OperationTimedOut { .. } => "OPERATION_TIMED_OUT",
        SequencerError::QueueFull => "OVERLOADED",
        SequencerError::LaneUnavailable => "LANE_UNAVAILABLE",
    }
}

impl From<SequencerError> for ApiError {
    fn from(value: SequencerError) -> Self {
        Self::Sequencer(value)
    }
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::InvalidRequest(message) => Self::BadRequest(message),
            WorkflowError::StepFailed {
                step,
                source,
                committed,
            } => Self::StepFailed {
                step,
                source,
                committed,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (step, committed) = match &self {
            Self::StepFailed {
                step, committed, ..
            } => (Some(step.to_string()), Some(committed.clone())),
            _ => (None, None),
        };
        let body = ErrorResponse {
            ok: false,
            code: self.code(),
            message: self.to_string(),
            step,
            committed,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use crate::onboarding::{PartialCompletion, WorkflowError, WorkflowStep};
    use crate::signer_lane::SequencerError;
    use alloy_primitives::{Address, B256};
    use axum::http::StatusCode;
    use std::time::Duration;

    #[test]
    fn sequencer_errors_map_to_statuses() {
        let cases = [
            (SequencerError::QueueFull, StatusCode::TOO_MANY_REQUESTS, "OVERLOADED"),
            (
                SequencerError::OperationTimedOut {
                    timeout: Duration::from_secs(1),
                    tx_hash: None,
                },
                StatusCode::GATEWAY_TIMEOUT,
                "OPERATION_TIMED_OUT",
            ),
            (
                SequencerError::Unconfirmed {
                    tx_hash: B256::repeat_byte(2),
                    reason: "receipt poll failed".to_string(),
                },
                StatusCode::GATEWAY_TIMEOUT,
                "OUTCOME_UNKNOWN",
            ),
            (
                SequencerError::RestartedLedgerMidOperation { current_height: 0 },
                StatusCode::SERVICE_UNAVAILABLE,
                "LEDGER_RESTARTED",
            ),
            (
                SequencerError::Reverted {
                    tx_hash: B256::ZERO,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
                "REVERTED",
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.code(), code);
        }
    }

    #[test]
    fn step_failure_keeps_underlying_status() {
        let api = ApiError::from(WorkflowError::StepFailed {
            step: WorkflowStep::RoleGrant,
            source: SequencerError::LedgerUnavailable("down".to_string()),
            committed: PartialCompletion {
                registration_tx_hash: Some(B256::repeat_byte(1)),
                ..PartialCompletion::default()
            },
        });
        assert_eq!(api.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api.code(), "LEDGER_UNAVAILABLE");
        assert_eq!(
            ApiError::AlreadyRegistered(Address::ZERO).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::NotFound("did:ethr:0x0".to_string()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
