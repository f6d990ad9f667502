use std::time::Duration;

use anyhow::{Context, Result};
use jsonrpsee::core::ClientError;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use tracing::debug;

use crate::models::{UserRecord, WalletAuth};
use crate::session::{IdentityBackend, SessionError, WalletProvider};

/// JSON-RPC error code the wallet agent returns when the user rejects the
/// signing prompt (EIP-1193 user-rejected code, which Freighter-compatible
/// agents reuse).
pub const USER_DECLINED_CODE: i32 = 4001;

/// JSON-RPC error code the identity service returns for a username
/// uniqueness conflict.
pub const USERNAME_TAKEN_CODE: i32 = 4090;

/// Client for the local wallet agent that fronts the user's Freighter-style
/// signer.
#[derive(Clone)]
pub struct WalletAgentClient {
    inner: HttpClient,
    timeout: Duration,
}

impl WalletAgentClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "Wallet agent endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build wallet agent client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        assert!(
            self.timeout >= Duration::from_millis(100),
            "Timeout invariant broken"
        );
        self.timeout
    }
}

impl WalletProvider for WalletAgentClient {
    async fn is_available(&self) -> bool {
        match self
            .inner
            .request::<WalletStatusResponse, _>("wallet_status", rpc_params![])
            .await
        {
            Ok(status) => status.available,
            Err(err) => {
                debug!("Wallet agent probe failed: {err}");
                false
            }
        }
    }

    async fn authenticate(&self) -> Result<WalletAuth, SessionError> {
        let auth: WalletAuth = self
            .inner
            .request("wallet_authenticate", rpc_params![])
            .await
            .map_err(map_wallet_error)?;
        if auth.address.is_empty() {
            return Err(SessionError::Provider(
                "agent returned an empty address".to_string(),
            ));
        }
        if auth.proof.is_empty() {
            return Err(SessionError::Provider(
                "agent returned an empty proof".to_string(),
            ));
        }
        Ok(auth)
    }
}

/// Client for the Skills identity service.
#[derive(Clone)]
pub struct IdentityApiClient {
    inner: HttpClient,
}

impl IdentityApiClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(
            !endpoint.is_empty(),
            "Identity backend endpoint must be provided"
        );
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build identity backend client for {endpoint}"))?;

        Ok(Self { inner: client })
    }
}

impl IdentityBackend for IdentityApiClient {
    async fn upsert_by_address(
        &self,
        address: &str,
        proof: &str,
    ) -> Result<(UserRecord, bool), SessionError> {
        let mut params = ObjectParams::new();
        params
            .insert("wallet_address", address)
            .map_err(encode_error)?;
        params.insert("proof", proof).map_err(encode_error)?;

        let response: UpsertResponse = self
            .inner
            .request("identity_upsertByAddress", params)
            .await
            .map_err(map_backend_error)?;
        if response.user.wallet_address != address {
            return Err(SessionError::Backend(
                "backend returned a record for a different address".to_string(),
            ));
        }
        Ok((response.user, response.is_new_user))
    }

    async fn update_username(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<UserRecord, SessionError> {
        let mut params = ObjectParams::new();
        params.insert("user_id", user_id).map_err(encode_error)?;
        params.insert("username", username).map_err(encode_error)?;

        let response: UpdateUsernameResponse = self
            .inner
            .request("identity_updateUsername", params)
            .await
            .map_err(map_backend_error)?;
        Ok(response.user)
    }
}

fn map_wallet_error(err: ClientError) -> SessionError {
    match &err {
        ClientError::Call(call) if call.code() == USER_DECLINED_CODE => SessionError::UserDeclined,
        _ => SessionError::Provider(err.to_string()),
    }
}

fn map_backend_error(err: ClientError) -> SessionError {
    match &err {
        ClientError::Call(call) if call.code() == USERNAME_TAKEN_CODE => {
            SessionError::UsernameTaken
        }
        _ => SessionError::Backend(err.to_string()),
    }
}

fn encode_error(err: serde_json::Error) -> SessionError {
    SessionError::Backend(format!("failed to encode request parameter: {err}"))
}

#[derive(Debug, Deserialize)]
struct WalletStatusResponse {
    available: bool,
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    user: UserRecord,
    is_new_user: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateUsernameResponse {
    user: UserRecord,
}
