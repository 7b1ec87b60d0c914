//! The Push Dispatcher: a platform-agnostic facade that hands a call push
//! off to the right `PushTransport` and classifies the result.

mod apns;
mod fcm;
mod gcm;

pub use apns::ApnsTransport;
pub use fcm::FcmTransport;
pub use gcm::GcmTransport;

use crate::config::Config;
use crate::models::{Device, Platform};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Fixed record sent to the device.
#[derive(Debug, Clone, Serialize)]
pub struct CallPushPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub unique_key: String,
    pub phonenumber: String,
    pub caller_id: String,
    pub response_api_url: String,
    pub message_start_time: f64,
    pub attempt: u32,
}

impl CallPushPayload {
    pub fn new(
        call_id: &str,
        phonenumber: &str,
        caller_id: &str,
        response_api_url: &str,
        attempt: u32,
    ) -> Self {
        Self {
            kind: "call",
            unique_key: call_id.to_string(),
            phonenumber: phonenumber.to_string(),
            caller_id: caller_id.to_string(),
            response_api_url: response_api_url.to_string(),
            message_start_time: now_as_secs_f64(),
            attempt,
        }
    }
}

fn now_as_secs_f64() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Classification of one push attempt's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    InvalidToken,
    Transient,
    AuthFail,
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, token: &str, sandbox: bool, payload: &CallPushPayload) -> DispatchOutcome;

    /// Release any held resources (e.g. a long-lived connection) on shutdown.
    async fn release_resources(&self) {}
}

/// Facade used by the Coordinator: selects a transport by `Device::platform`
/// and hides per-platform wiring.
pub struct PushDispatcher {
    apns: Arc<ApnsTransport>,
    fcm: Arc<FcmTransport>,
    gcm: Arc<GcmTransport>,
    app_api_url: String,
}

impl PushDispatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            apns: Arc::new(ApnsTransport::new(config)),
            fcm: Arc::new(FcmTransport::new(config)),
            gcm: Arc::new(GcmTransport::new(config)),
            app_api_url: config.app_api_url.clone(),
        }
    }

    /// Dispatch one call push attempt. Fire-and-forget from the Coordinator's
    /// perspective: the returned future is cheap to await, but callers should
    /// `tokio::spawn` it so a slow transport never blocks the wait loop.
    pub async fn send_call_push(
        &self,
        device: &Device,
        call_id: &str,
        phonenumber: &str,
        caller_id: &str,
        attempt: u32,
        apns_v2: bool,
    ) -> DispatchOutcome {
        let payload = CallPushPayload::new(call_id, phonenumber, caller_id, &self.app_api_url, attempt);

        let outcome = match device.platform() {
            Platform::Apns => {
                self.apns
                    .send_versioned(&device.push_token, device.sandbox, &payload, apns_v2)
                    .await
            }
            Platform::Fcm => self.fcm.send(&device.push_token, device.sandbox, &payload).await,
            Platform::Gcm => self.gcm.send(&device.push_token, device.sandbox, &payload).await,
            Platform::Unknown => {
                tracing::warn!(
                    call_id = %call_id,
                    sip_user_id = %device.sip_user_id,
                    "trying to send call push to unknown platform device"
                );
                DispatchOutcome::InvalidToken
            }
        };

        match outcome {
            DispatchOutcome::Delivered => {
                metrics::counter!("push_notification_sent_total", 1);
            }
            DispatchOutcome::InvalidToken => {
                tracing::warn!(call_id = %call_id, token = %mask_token(&device.push_token), "push token is permanently invalid");
                metrics::counter!("push_notification_failed_total", 1, "reason" => "invalid-token");
            }
            DispatchOutcome::Transient => {
                metrics::counter!("push_notification_failed_total", 1, "reason" => "transient");
            }
            DispatchOutcome::AuthFail => {
                tracing::error!(call_id = %call_id, "push transport auth failure");
                metrics::counter!("push_notification_failed_total", 1, "reason" => "auth-fail");
            }
        }

        outcome
    }
}

fn mask_token(token: &str) -> String {
    if token.len() <= 8 {
        return "***".to_string();
    }
    format!("{}...{}", &token[..4], &token[token.len() - 4..])
}
