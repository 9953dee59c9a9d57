// packages/engine/src/platform/http_client.rs
//! `reqwest` implementation of [`PlatformApi`]

use crate::identity::{Balances, TokenPair};
use crate::platform::api::{
    PlatformApi, VerifyRequest, VerifyResponse, WithdrawalRequest, WithdrawalResponse,
};
use crate::utils::config::EndpointConfig;
use crate::utils::errors::{RemoteCallError, Result, WorkerError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ORIGIN, REFERER};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Bearer-style header carrying the access token
const AUTHORIZATION_HEADER: &str = "x-authorization";

/// Header carrying the platform session descriptor during verification
const SESSION_HEADER: &str = "x-tg-data";

/// Largest error body kept in a [`RemoteCallError`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct NonceResponse {
    msg: String,
}

/// HTTP client for the platform endpoints
#[derive(Clone)]
pub struct HttpPlatformClient {
    client: Client,
    endpoints: EndpointConfig,
}

impl HttpPlatformClient {
    /// Create a client with the platform's browser-like default headers
    pub fn new(endpoints: EndpointConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let origin = HeaderValue::from_str(&endpoints.origin)
            .map_err(|e| WorkerError::Config(format!("invalid origin: {}", e)))?;
        let referer =
            HeaderValue::from_str(&format!("{}/", endpoints.origin.trim_end_matches('/')))
                .map_err(|e| WorkerError::Config(format!("invalid origin: {}", e)))?;
        headers.insert(ORIGIN, origin);
        headers.insert(REFERER, referer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(endpoints.request_timeout())
            .build()
            .map_err(|e| WorkerError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoints })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.auth_base.trim_end_matches('/'), path)
    }

    fn game_url(&self, path: &str) -> String {
        format!("{}{}", self.endpoints.game_base.trim_end_matches('/'), path)
    }
}

/// Map a transport-level failure
fn network(endpoint: &'static str) -> impl FnOnce(reqwest::Error) -> RemoteCallError {
    move |e| RemoteCallError::Network {
        endpoint,
        message: e.to_string(),
    }
}

/// Fail on non-success statuses, keeping a bounded excerpt of the body
async fn ensure_success(
    endpoint: &'static str,
    response: Response,
) -> Result<Response, RemoteCallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    Err(RemoteCallError::Status {
        endpoint,
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, RemoteCallError> {
    let bytes = response.bytes().await.map_err(network(endpoint))?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteCallError::Malformed {
        endpoint,
        message: e.to_string(),
    })
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn fetch_nonce(&self, address: &str, chain_id: &str) -> Result<String, RemoteCallError> {
        const ENDPOINT: &str = "nonce";

        let response = self
            .client
            .get(self.auth_url("/web3/utils/nonce"))
            .query(&[("address", address), ("chainId", chain_id)])
            .send()
            .await
            .map_err(network(ENDPOINT))?;

        let response = ensure_success(ENDPOINT, response).await?;
        let nonce: NonceResponse = decode(ENDPOINT, response).await?;
        Ok(nonce.msg)
    }

    async fn verify_wallet(
        &self,
        request: &VerifyRequest,
        session_header: &str,
    ) -> Result<TokenPair, RemoteCallError> {
        const ENDPOINT: &str = "verify";

        let response = self
            .client
            .post(self.auth_url("/authenticate/web3-wallet-and-telegram"))
            .header(SESSION_HEADER, session_header)
            .json(request)
            .send()
            .await
            .map_err(network(ENDPOINT))?;

        let response = ensure_success(ENDPOINT, response).await?;
        let verified: VerifyResponse = decode(ENDPOINT, response).await?;
        Ok(verified.into_tokens())
    }

    async fn fetch_balance(&self, access_token: &str) -> Result<Balances, RemoteCallError> {
        const ENDPOINT: &str = "balance";

        let response = self
            .client
            .get(self.game_url("/user/wallet/balance/virtual"))
            .header(AUTHORIZATION_HEADER, access_token)
            .send()
            .await
            .map_err(network(ENDPOINT))?;

        let response = ensure_success(ENDPOINT, response).await?;
        decode(ENDPOINT, response).await
    }

    async fn withdraw(
        &self,
        access_token: &str,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalResponse, RemoteCallError> {
        const ENDPOINT: &str = "withdrawal";

        let response = self
            .client
            .post(self.game_url("/user/wallet/withdrawal/mpx"))
            .header(AUTHORIZATION_HEADER, access_token)
            .json(request)
            .send()
            .await
            .map_err(network(ENDPOINT))?;

        // Rejections carry a structured body, so every status is read here
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network(ENDPOINT))?;
        debug!("Withdrawal response {}: {}", status, body);

        Ok(WithdrawalResponse::classify(status, &body))
    }

    async fn bind_referral(&self, access_token: &str, code: &str) -> Result<(), RemoteCallError> {
        const ENDPOINT: &str = "referral";

        let response = self
            .client
            .post(self.game_url("/user/referral/bind-referrer"))
            .header(AUTHORIZATION_HEADER, access_token)
            .json(&serde_json::json!({ "referralCode": code }))
            .send()
            .await
            .map_err(network(ENDPOINT))?;

        ensure_success(ENDPOINT, response).await?;
        Ok(())
    }
}
