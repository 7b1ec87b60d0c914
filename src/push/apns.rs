//! APNs push transport.
//!
//! Grounded on `notifications/mod.rs`'s `ApnsClient`: a long-lived `a2::Client`
//! built once from a token-auth key file, reused across calls. Generalized
//! here along two axes the original didn't need: per-device sandbox vs.
//! production gateway selection, and a v1/v2 sub-transport opt-in
//! (`APNS2_DEVICES`). The `a2` crate only speaks the modern HTTP/2 protocol,
//! so "legacy" is modeled as a second, independently-configured client slot
//! rather than a binary-protocol implementation (see DESIGN.md).

use super::{CallPushPayload, DispatchOutcome, PushTransport};
use crate::config::Config;
use a2::{
    Client, ClientConfig, DefaultNotificationBuilder, Endpoint, NotificationBuilder,
    NotificationOptions, Priority, PushType,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientKey {
    v2: bool,
    sandbox: bool,
}

struct ApnsConfig {
    key_path: Option<String>,
    key_id: Option<String>,
    team_id: Option<String>,
    topic: Option<String>,
}

/// Process-global handle over lazily-initialized, health-checked APNs
/// connections - one per (sub-transport, sandbox) combination actually used.
pub struct ApnsTransport {
    config: ApnsConfig,
    clients: DashMap<ClientKey, Arc<Client>>,
    init_lock: Mutex<()>,
}

impl ApnsTransport {
    pub fn new(config: &Config) -> Self {
        Self {
            config: ApnsConfig {
                key_path: config.apns_key_path.clone(),
                key_id: config.apns_key_id.clone(),
                team_id: config.apns_team_id.clone(),
                topic: config.apns_topic.clone(),
            },
            clients: DashMap::new(),
            init_lock: Mutex::new(()),
        }
    }

    async fn client_for(&self, key: ClientKey) -> Result<Arc<Client>, String> {
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        // Serialize initialization so concurrent callers don't race to open
        // duplicate connections for the same (sub-transport, sandbox) pair.
        let _guard = self.init_lock.lock().await;
        if let Some(client) = self.clients.get(&key) {
            return Ok(client.clone());
        }

        let key_path = self.config.key_path.as_ref().ok_or("APNS_KEY_PATH not configured")?;
        let key_id = self.config.key_id.as_ref().ok_or("APNS_KEY_ID not configured")?;
        let team_id = self.config.team_id.as_ref().ok_or("APNS_TEAM_ID not configured")?;

        let endpoint = if key.sandbox {
            Endpoint::Sandbox
        } else {
            Endpoint::Production
        };
        let client_config = ClientConfig::new(endpoint);

        let file = std::fs::File::open(key_path).map_err(|e| e.to_string())?;
        let client = Client::token(file, key_id, team_id, client_config).map_err(|e| e.to_string())?;
        let client = Arc::new(client);
        self.clients.insert(key, client.clone());
        Ok(client)
    }

    /// Drop a client so the next call transparently reopens it - the
    /// "reconnect on error" half of the process-singleton contract.
    fn invalidate(&self, key: ClientKey) {
        self.clients.remove(&key);
    }

    pub async fn send_versioned(
        &self,
        token: &str,
        sandbox: bool,
        payload: &CallPushPayload,
        v2: bool,
    ) -> DispatchOutcome {
        let key = ClientKey { v2, sandbox };

        let client = match self.client_for(key).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "failed to initialize APNs client");
                return DispatchOutcome::AuthFail;
            }
        };

        let topic = self.config.topic.as_deref();

        let mut notification = DefaultNotificationBuilder::new()
            .set_title("Incoming call")
            .set_body("Decrypting...")
            .set_mutable_content()
            .set_sound("ringtone.caf")
            .build(
                token,
                NotificationOptions {
                    apns_topic: topic,
                    apns_priority: Some(Priority::High),
                    apns_collapse_id: None,
                    apns_expiration: None,
                    apns_push_type: Some(PushType::Alert),
                    apns_id: None,
                },
            );

        if notification.add_custom_data("type", &payload.kind).is_err()
            || notification.add_custom_data("unique_key", &payload.unique_key).is_err()
            || notification.add_custom_data("phonenumber", &payload.phonenumber).is_err()
            || notification.add_custom_data("caller_id", &payload.caller_id).is_err()
            || notification
                .add_custom_data("response_api_url", &payload.response_api_url)
                .is_err()
            || notification.add_custom_data("attempt", &payload.attempt).is_err()
        {
            tracing::error!(call_id = %payload.unique_key, "failed to encode APNs custom payload");
            return DispatchOutcome::Transient;
        }

        match client.send(notification).await {
            Ok(response) if (200..300).contains(&response.code) => DispatchOutcome::Delivered,
            Ok(response) => {
                tracing::warn!(
                    call_id = %payload.unique_key,
                    status = response.code,
                    "APNs rejected call push"
                );
                if response.code == 410 || response.code == 400 {
                    DispatchOutcome::InvalidToken
                } else if response.code == 403 {
                    self.invalidate(key);
                    DispatchOutcome::AuthFail
                } else {
                    DispatchOutcome::Transient
                }
            }
            Err(e) => {
                tracing::warn!(call_id = %payload.unique_key, error = %e, "APNs send failed, invalidating connection");
                self.invalidate(key);
                DispatchOutcome::Transient
            }
        }
    }
}

#[async_trait]
impl PushTransport for ApnsTransport {
    async fn send(&self, token: &str, sandbox: bool, payload: &CallPushPayload) -> DispatchOutcome {
        self.send_versioned(token, sandbox, payload, false).await
    }

    async fn release_resources(&self) {
        self.clients.clear();
    }
}
