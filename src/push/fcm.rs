//! FCM push transport: a `reqwest` JSON POST against the legacy FCM HTTP
//! endpoint, API-key authenticated. Grounded on
//! `original_source/app/push.py`'s `send_fcm_message` (which wrapped `pyfcm`)
//! and the teacher's `reqwest` dependency.

use super::{CallPushPayload, DispatchOutcome, PushTransport};
use crate::config::Config;
use async_trait::async_trait;
use serde_json::json;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

pub struct FcmTransport {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl FcmTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.fcm_api_key.clone(),
        }
    }
}

#[async_trait]
impl PushTransport for FcmTransport {
    async fn send(&self, token: &str, _sandbox: bool, payload: &CallPushPayload) -> DispatchOutcome {
        let Some(api_key) = self.api_key.as_ref() else {
            tracing::error!(call_id = %payload.unique_key, "FCM_API_KEY not configured");
            return DispatchOutcome::AuthFail;
        };

        let body = json!({
            "to": token,
            "priority": "high",
            "data": payload,
        });

        let response = self
            .client
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={api_key}"))
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                tracing::error!(call_id = %payload.unique_key, "FCM API key rejected");
                DispatchOutcome::AuthFail
            }
            Ok(resp) if resp.status().is_success() => match resp.json::<serde_json::Value>().await {
                Ok(body) if body.get("failure").and_then(|f| f.as_i64()) == Some(1) => {
                    tracing::warn!(call_id = %payload.unique_key, ?body, "FCM reported delivery failure");
                    DispatchOutcome::InvalidToken
                }
                Ok(_) => DispatchOutcome::Delivered,
                Err(e) => {
                    tracing::warn!(call_id = %payload.unique_key, error = %e, "FCM response was not valid JSON");
                    DispatchOutcome::Transient
                }
            },
            Ok(resp) => {
                tracing::warn!(call_id = %payload.unique_key, status = %resp.status(), "FCM server error");
                DispatchOutcome::Transient
            }
            Err(e) => {
                tracing::warn!(call_id = %payload.unique_key, error = %e, "FCM request failed");
                DispatchOutcome::Transient
            }
        }
    }
}
