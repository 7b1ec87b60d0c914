//! The Call-Wakeup Coordinator: seeds a rendezvous entry, dispatches the
//! initial push, then polls the store until either a device responds or the
//! round-trip deadline `W` passes, resending at most `max_attempts()` times
//! along the way.
//!
//! Grounded on `original_source/api/views.py`'s `IncomingCallView.post`: the
//! `while time.time() < wait_until` poll loop, the `next_resend_time`
//! bookkeeping, and the `available == 'True'/'False'` string check against
//! the same slot the push placeholder was seeded into.

use crate::config::Config;
use crate::device::DeviceRepository;
use crate::metrics;
use crate::models::{generate_call_id, Verdict};
use crate::push::PushDispatcher;
use crate::store::{rendezvous_key, RendezvousStore};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Value written into the rendezvous slot once the device acknowledges.
const AVAILABLE_TRUE: &str = "True";
const AVAILABLE_FALSE: &str = "False";

/// Poll interval for the wait loop: roughly every 10ms.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Coordinator {
    devices: DeviceRepository,
    store: Arc<dyn RendezvousStore>,
    dispatcher: Arc<PushDispatcher>,
    config: Config,
}

/// Result of one full incoming-call rendezvous, handed back to the HTTP
/// handler for it to render a response.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub call_id: String,
    pub verdict: Verdict,
}

impl Coordinator {
    pub fn new(
        devices: DeviceRepository,
        store: Arc<dyn RendezvousStore>,
        dispatcher: Arc<PushDispatcher>,
        config: Config,
    ) -> Self {
        Self {
            devices,
            store,
            dispatcher,
            config,
        }
    }

    /// Run the full rendezvous for one incoming call. `call_id` is the
    /// switch-supplied `unique_key`, or `None` to mint a fresh one.
    ///
    /// A rendezvous-store outage, whether on the initial seed or on any poll
    /// read during the wait, is never allowed to surface as an error to the
    /// switch: it's logged at error severity, counted, and folded into the
    /// same NAK the switch would see from a plain timeout.
    pub async fn handle_incoming_call(
        &self,
        sip_user_id: &str,
        caller_id: &str,
        phonenumber: &str,
        call_id: Option<String>,
    ) -> crate::error::Result<CallOutcome> {
        let call_id = call_id.unwrap_or_else(generate_call_id);

        let device = match self.devices.find_by_sip_user_id(sip_user_id).await? {
            Some(d) => d,
            None => {
                tracing::info!(call_id = %call_id, sip_user_id, "no registered device for call");
                metrics::record_incoming_call_failed("no sip_user_id");
                return Ok(CallOutcome {
                    call_id,
                    verdict: Verdict::NoDevice,
                });
            }
        };

        let key = rendezvous_key(&call_id);
        let total_wait = self.config.push_roundtrip_wait;

        // Seed the slot with the platform placeholder before dispatching any
        // push, so a response that beats the first push send still has
        // somewhere to land. A store outage here is logged and folded into
        // the same NAK a plain timeout would produce, rather than bailing
        // out of the call with an error.
        let mut store_unavailable = false;
        if let Err(e) = self.store.put(&key, device.platform().as_store_str(), total_wait).await {
            tracing::error!(call_id = %call_id, sip_user_id, error = %e, "rendezvous store unavailable while seeding call");
            store_unavailable = true;
        }

        let apns_v2 = device.uses_apns_v2(&self.config.apns2_sip_user_ids);
        self.dispatch_push(&device, &call_id, phonenumber, caller_id, 1, apns_v2);

        let max_attempts = self.config.max_attempts();
        let resend_interval = self.config.push_resend_interval;
        let deadline = Instant::now() + total_wait;
        let mut next_resend_at = Instant::now() + resend_interval;
        let mut attempts_sent: u32 = 1;

        let verdict = loop {
            match self.store.get(&key).await {
                Ok(Some(value)) if value == AVAILABLE_TRUE => break Verdict::Available,
                Ok(Some(value)) if value == AVAILABLE_FALSE => break Verdict::Unavailable,
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(call_id = %call_id, sip_user_id, error = %e, "rendezvous store unavailable while polling for a response");
                    store_unavailable = true;
                    break Verdict::Timeout;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break Verdict::Timeout;
            }

            if now >= next_resend_at && attempts_sent < max_attempts {
                attempts_sent += 1;
                self.dispatch_push(&device, &call_id, phonenumber, caller_id, attempts_sent, apns_v2);
                next_resend_at = now + resend_interval;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        };

        tracing::info!(call_id = %call_id, sip_user_id, attempts_sent, verdict = ?verdict, "incoming call resolved");
        if store_unavailable {
            metrics::record_incoming_call_failed("rendezvous store unavailable");
        } else {
            match verdict {
                Verdict::Available => metrics::record_incoming_call_succeeded(),
                Verdict::Unavailable => metrics::record_incoming_call_failed("Device not available"),
                Verdict::Timeout => metrics::record_incoming_call_failed("Unable to get response from phone"),
                Verdict::NoDevice | Verdict::Pending => {}
            }
        }

        Ok(CallOutcome { call_id, verdict })
    }

    /// Fire-and-forget push dispatch: a slow transport must never stall the
    /// wait loop that's polling the rendezvous store.
    fn dispatch_push(
        &self,
        device: &crate::models::Device,
        call_id: &str,
        phonenumber: &str,
        caller_id: &str,
        attempt: u32,
        apns_v2: bool,
    ) {
        let dispatcher = self.dispatcher.clone();
        let device = device.clone();
        let call_id = call_id.to_string();
        let phonenumber = phonenumber.to_string();
        let caller_id = caller_id.to_string();

        tokio::spawn(async move {
            dispatcher
                .send_call_push(&device, &call_id, &phonenumber, &caller_id, attempt, apns_v2)
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Device, PlatformColumn, Platform};
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    fn test_config(wait_ms: u64, resend_ms: u64) -> Config {
        Config {
            push_roundtrip_wait: Duration::from_millis(wait_ms),
            push_resend_interval: Duration::from_millis(resend_ms),
            app_api_url: "http://localhost/".to_string(),
            cert_dir: String::new(),
            redis_server_list: vec![],
            apns2_sip_user_ids: HashSet::new(),
            server_port: 8080,
            database_url: String::new(),
            apns_key_path: None,
            apns_key_id: None,
            apns_team_id: None,
            apns_topic: None,
            apns_production: false,
            fcm_api_key: None,
            gcm_api_key: None,
            enable_metrics: false,
            upstream_auth_url: None,
        }
    }

    fn fcm_device() -> Device {
        Device {
            sip_user_id: "100000001".to_string(),
            push_token: "tok".to_string(),
            platform: PlatformColumn(Platform::Fcm),
            sandbox: true,
            app_push_credential_ref: None,
        }
    }

    #[tokio::test]
    async fn timeout_when_device_never_responds() {
        let store: Arc<dyn RendezvousStore> = Arc::new(MemoryStore::new());
        let config = test_config(50, 20);
        let key = rendezvous_key("fixed-call-id");
        store
            .put(&key, fcm_device().platform().as_store_str(), config.push_roundtrip_wait)
            .await
            .unwrap();

        let deadline = Instant::now() + config.push_roundtrip_wait;
        loop {
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        let value = store.get(&key).await.unwrap();
        assert_eq!(value.as_deref(), Some("android"));
    }

    #[tokio::test]
    async fn resolves_available_once_store_flips_true() {
        let store: Arc<dyn RendezvousStore> = Arc::new(MemoryStore::new());
        let key = rendezvous_key("call-ack");
        store.put(&key, "android", Duration::from_millis(500)).await.unwrap();
        store.put(&key, AVAILABLE_TRUE, Duration::from_millis(500)).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(AVAILABLE_TRUE));
    }
}
