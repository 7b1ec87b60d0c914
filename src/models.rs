//! Core data types: `Device` (external, read-only to the rendezvous engine)
//! and `CallAttempt` (ephemeral, one per inbound call notice).

use serde::{Deserialize, Serialize};

/// Which push transport serves a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Apns,
    Fcm,
    /// Legacy GCM, kept for old installs.
    Gcm,
    Unknown,
}

impl Platform {
    /// The placeholder string stored in the rendezvous entry while a call is
    /// live - carries which transport served it, for the intake's metrics.
    pub fn as_store_str(self) -> &'static str {
        match self {
            Platform::Apns => "apns",
            Platform::Fcm => "android",
            Platform::Gcm => "gcm",
            Platform::Unknown => "unknown",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "apns" => Platform::Apns,
            "android" | "fcm" => Platform::Fcm,
            "gcm" => Platform::Gcm,
            _ => Platform::Unknown,
        }
    }
}

/// A registered mobile device, read-only from the rendezvous engine's
/// perspective (registration/deletion is a thin upsert, see `device.rs`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Device {
    pub sip_user_id: String,
    pub push_token: String,
    #[sqlx(try_from = "String")]
    pub platform: PlatformColumn,
    pub sandbox: bool,
    pub app_push_credential_ref: Option<String>,
}

/// Newtype so `Platform` (which has no natural SQL representation) can be
/// read out of a `TEXT` column via `sqlx::FromRow`'s `try_from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformColumn(pub Platform);

impl TryFrom<String> for PlatformColumn {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(PlatformColumn(Platform::from_db_str(&value)))
    }
}

impl Device {
    pub fn platform(&self) -> Platform {
        self.platform.0
    }

    /// Whether this device opted into the APNs v2 sub-transport, per
    /// `APNS2_DEVICES`.
    pub fn uses_apns_v2(&self, apns2_sip_user_ids: &std::collections::HashSet<String>) -> bool {
        apns2_sip_user_ids.contains(&self.sip_user_id)
    }
}

/// Outcome of one call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Pending,
    Available,
    Unavailable,
    Timeout,
    NoDevice,
}

impl Verdict {
    /// The plain-text body returned to the switch.
    pub fn as_status_body(self) -> &'static str {
        match self {
            Verdict::Available => "status=ACK",
            _ => "status=NAK",
        }
    }
}

/// One in-flight call attempt, ephemeral and core-owned - never persisted
/// beyond the rendezvous store's TTL.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    pub call_id: String,
    pub sip_user_id: String,
    pub caller_id: String,
    pub phonenumber: String,
    pub started_at: std::time::Instant,
    pub attempts_sent: u32,
    pub verdict: Verdict,
}

impl CallAttempt {
    pub fn new(call_id: String, sip_user_id: String, caller_id: String, phonenumber: String) -> Self {
        Self {
            call_id,
            sip_user_id,
            caller_id,
            phonenumber,
            started_at: std::time::Instant::now(),
            attempts_sent: 0,
            verdict: Verdict::Pending,
        }
    }
}

/// Generate a fresh 128-bit random call identifier, 32 lowercase hex chars -
/// used when the switch doesn't supply its own `call_id`.
pub fn generate_call_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_call_id_is_32_hex_chars() {
        let id = generate_call_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn platform_round_trips_through_store_placeholder() {
        for p in [Platform::Apns, Platform::Fcm, Platform::Gcm] {
            assert_eq!(Platform::from_db_str(p.as_store_str()), p);
        }
    }
}
