//! Legacy GCM push transport. Grounded on
//! `original_source/app/push.py`'s `send_gcm_message` - same HTTP shape as
//! FCM but with a `collapse_key` and its own auth header, kept deliberately
//! small since it's a deprecated path even in the original.

use super::{CallPushPayload, DispatchOutcome, PushTransport};
use crate::config::Config;
use async_trait::async_trait;
use serde_json::json;

const GCM_SEND_URL: &str = "https://android.googleapis.com/gcm/send";

pub struct GcmTransport {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl GcmTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.gcm_api_key.clone(),
        }
    }
}

#[async_trait]
impl PushTransport for GcmTransport {
    async fn send(&self, token: &str, _sandbox: bool, payload: &CallPushPayload) -> DispatchOutcome {
        let Some(api_key) = self.api_key.as_ref() else {
            tracing::error!(call_id = %payload.unique_key, "GCM_API_KEY not configured");
            return DispatchOutcome::AuthFail;
        };

        let collapse_key = format!("{}-cycle.key", payload.attempt);
        let body = json!({
            "registration_ids": [token],
            "collapse_key": collapse_key,
            "priority": "high",
            "data": payload,
        });

        let response = self
            .client
            .post(GCM_SEND_URL)
            .header("Authorization", format!("key={api_key}"))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                tracing::error!(call_id = %payload.unique_key, "GCM API key rejected");
                DispatchOutcome::AuthFail
            }
            Ok(resp) if resp.status().is_success() => DispatchOutcome::Delivered,
            Ok(resp) => {
                tracing::warn!(call_id = %payload.unique_key, status = %resp.status(), "GCM server error");
                DispatchOutcome::Transient
            }
            Err(e) => {
                tracing::warn!(call_id = %payload.unique_key, error = %e, "GCM request failed");
                DispatchOutcome::Transient
            }
        }
    }
}
