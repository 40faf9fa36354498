// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod error;

use std::sync::Arc;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use alloy_primitives::{Address, B256};
use app_core::{CredentialRecord, Currency, Did, DidDocument, FundingLeg, IdentityRecord, RoleType};

use crate::onboarding::{Onboarding, WorkflowRequest};

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub onboarding: Onboarding,
    pub chain_id: u64,
    pub token_decimals: u8,
}

#[derive(Debug, Deserialize)]
struct OnboardRequest {
    address: String,
    role: String,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    funding: Vec<FundingRequest>,
}

#[derive(Debug, Deserialize)]
struct FundingRequest {
    currency: Currency,
    /// Human units, e.g. `"0.5"` ether or `"1000"` tokens.
    amount: String,
}

#[derive(Debug, Serialize)]
struct OnboardResponse {
    ok: bool,
    did: String,
    role: String,
    registration_tx_hash: String,
    role_grant_tx_hash: String,
    funding_tx_hashes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ParticipantResponse {
    ok: bool,
    address: String,
    did: String,
    blockchain_account_id: String,
    registered: bool,
    native_balance: String,
    identity: Option<IdentityRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct RegistrationsQuery {
    /// Case-insensitive search over identifier, public key, DID type and
    /// controller address.
    #[serde(default)]
    q: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegistrationsResponse {
    ok: bool,
    registrations: Vec<IdentityRecord>,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    ok: bool,
    did: String,
    address: String,
    native_balance: String,
    did_document: DidDocument,
    registration: IdentityRecord,
}

#[derive(Debug, Serialize)]
struct CredentialsResponse {
    ok: bool,
    address: String,
    credentials: Vec<CredentialRecord>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    queue_depth: usize,
}

pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/onboard", post(onboard))
        .route("/participants/{address}", get(participant))
        .route("/participants/{address}/credentials", get(credentials))
        .route("/registrations", get(registrations))
        .route("/dids/{did}", get(resolve_did))
        .route("/health", get(health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

async fn onboard(
    State(state): State<Arc<AppState>>,
    req: Result<Json<OnboardRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<OnboardResponse>, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;

    let target_address = parse_address(&req.address).map_err(ApiError::bad_request)?;
    let role: RoleType = req
        .role
        .parse()
        .map_err(|err| ApiError::bad_request(format!("invalid role: {err}")))?;
    let funding = req
        .funding
        .iter()
        .map(|leg| FundingLeg::parse(leg.currency, &leg.amount, state.token_decimals))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    if state.onboarding.is_registered(target_address).await? {
        return Err(ApiError::AlreadyRegistered(target_address));
    }

    let receipt = state
        .onboarding
        .onboard_participant(WorkflowRequest {
            target_address,
            role: role.clone(),
            public_key: req.public_key,
            funding,
        })
        .await?;

    let did = Did::from_address(target_address);
    info!(%did, role = %role, "onboard request completed");

    Ok(Json(OnboardResponse {
        ok: true,
        did: did.to_string(),
        role: role.to_string(),
        registration_tx_hash: encode_hex(&receipt.registration_tx_hash),
        role_grant_tx_hash: encode_hex(&receipt.role_grant_tx_hash),
        funding_tx_hashes: receipt.funding_tx_hashes.iter().map(encode_hex).collect(),
    }))
}

async fn participant(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let account = parse_account(&address)?;
    let (registered, balance, identity) = tokio::try_join!(
        state.onboarding.is_registered(account),
        state.onboarding.native_balance(account),
        state.onboarding.identity(account),
    )?;
    let did = Did::from_address(account);

    Ok(Json(ParticipantResponse {
        ok: true,
        address: account.to_checksum(None),
        blockchain_account_id: did.blockchain_account_id(state.chain_id),
        did: did.to_string(),
        registered,
        native_balance: balance.to_string(),
        identity,
    }))
}

async fn credentials(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Result<Json<CredentialsResponse>, ApiError> {
    let account = parse_account(&address)?;
    let credentials = state.onboarding.credentials(account).await?;
    Ok(Json(CredentialsResponse {
        ok: true,
        address: account.to_checksum(None),
        credentials,
    }))
}

async fn registrations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RegistrationsQuery>,
) -> Result<Json<RegistrationsResponse>, ApiError> {
    let mut registrations = state.onboarding.registrations().await?;
    if let Some(q) = query.q.as_deref() {
        registrations.retain(|record| record.matches(q));
    }
    Ok(Json(RegistrationsResponse {
        ok: true,
        registrations,
    }))
}

async fn resolve_did(
    State(state): State<Arc<AppState>>,
    Path(did): Path<String>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let did: Did = did
        .parse()
        .map_err(|err| ApiError::bad_request(format!("invalid DID: {err}")))?;
    let account = did.address();
    let (identity, balance) = tokio::try_join!(
        state.onboarding.identity(account),
        state.onboarding.native_balance(account),
    )?;
    let registration =
        identity.ok_or_else(|| ApiError::NotFound(format!("{did} is not registered")))?;

    Ok(Json(ResolveResponse {
        ok: true,
        did_document: DidDocument::new(&registration.identifier, &did, state.chain_id),
        did: did.to_string(),
        address: account.to_checksum(None),
        native_balance: balance.to_string(),
        registration,
    }))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        queue_depth: state.onboarding.lane().queue_depth(),
    })
}

fn decode_hex_0x(value: &str) -> Result<Vec<u8>, String> {
    if !value.starts_with("0x") {
        return Err("hex string must start with 0x".to_string());
    }
    alloy_primitives::hex::decode(value).map_err(|err| format!("invalid hex: {err}"))
}

/// Accepts either a `did:ethr:` identifier or a bare address.
fn parse_account(value: &str) -> Result<Address, ApiError> {
    match value.parse::<Did>() {
        Ok(did) => Ok(did.address()),
        Err(_) => parse_address(value).map_err(ApiError::bad_request),
    }
}

fn parse_address(value: &str) -> Result<Address, String> {
    let bytes = decode_hex_0x(value.trim())?;
    if bytes.len() != 20 {
        return Err("address must be 20 bytes".to_string());
    }
    Ok(Address::from_slice(&bytes))
}

fn encode_hex(value: &B256) -> String {
    alloy_primitives::hex::encode_prefixed(value.as_slice())
}

#[cfg(test)]
mod tests {
    use super::parse_address;
    use alloy_primitives::Address;

    #[test]
    fn addresses_require_prefix_and_length() {
        assert_eq!(
            parse_address("0x4444444444444444444444444444444444444444"),
            Ok(Address::repeat_byte(0x44))
        );
        assert!(parse_address("4444444444444444444444444444444444444444").is_err());
        assert!(parse_address("0x4444").is_err());
    }
}
