//! Bearer-token check in front of `/hangup-reason`, the one authenticated
//! endpoint. The actual user-directory lookup is out of scope here - this
//! only owns the shape of the check: pull the token out of the
//! `Authorization` header and hand it to a pluggable `UpstreamVerifier`.
//!
//! Grounded on `original_source/api/authentication.py`'s
//! `VoipgridAuthentication`, which calls an external API with the bearer
//! token and maps its status code: 200 -> authenticated, 401/403 ->
//! rejected, anything else -> treat the upstream as unavailable rather than
//! as a hard failure.

use crate::error::Error;
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

#[async_trait]
pub trait UpstreamVerifier: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Result<bool, Error>;
}

/// Verifier that calls a configured upstream URL, mirroring
/// `VoipgridAuthentication.authenticate`'s status-code mapping.
pub struct HttpUpstreamVerifier {
    client: reqwest::Client,
    verify_url: String,
}

impl HttpUpstreamVerifier {
    pub fn new(verify_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_url,
        }
    }
}

#[async_trait]
impl UpstreamVerifier for HttpUpstreamVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<bool, Error> {
        let response = self
            .client
            .get(&self.verify_url)
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(e.to_string()))?;

        match response.status().as_u16() {
            200 => Ok(true),
            401 | 403 => Ok(false),
            other => Err(Error::UpstreamUnavailable(format!(
                "unexpected upstream status {other}"
            ))),
        }
    }
}

/// A verifier that accepts any non-empty token. Used when
/// `UPSTREAM_AUTH_URL` is unset, e.g. local development and the integration
/// tests - never wired in when the config names a real upstream.
pub struct AllowAllVerifier;

#[async_trait]
impl UpstreamVerifier for AllowAllVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<bool, Error> {
        Ok(!bearer_token.is_empty())
    }
}

fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn upstream_auth_middleware(
    State(verifier): State<std::sync::Arc<dyn UpstreamVerifier>>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let token = extract_bearer_token(&request).ok_or(Error::Unauthenticated)?;

    if verifier.verify(token).await? {
        Ok(next.run(request).await)
    } else {
        Err(Error::Forbidden)
    }
}
