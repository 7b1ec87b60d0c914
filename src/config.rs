//! Process configuration, read once at startup from the environment.

use std::{collections::HashSet, time::Duration};

/// Runtime configuration for the rendezvous engine and its collaborators.
///
/// Mirrors the env-var surface from the original middleware: every field
/// here has a 1:1 env var in its doc comment.
#[derive(Debug, Clone)]
pub struct Config {
    /// `APP_PUSH_ROUNDTRIP_WAIT` (ms) - total round-trip wait budget `W`.
    pub push_roundtrip_wait: Duration,
    /// `APP_PUSH_RESEND_INTERVAL` (ms) - retry spacing `R`.
    pub push_resend_interval: Duration,
    /// `APP_API_URL` - base URL injected into the push payload as `response_api_url`.
    pub app_api_url: String,
    /// `CERT_DIR` - directory holding push credentials.
    pub cert_dir: String,
    /// `REDIS_SERVER_LIST` - comma separated `host:port` list for the shared cache.
    pub redis_server_list: Vec<String>,
    /// `APNS2_DEVICES` - sip_user_ids opted into the APNs v2 sub-transport.
    pub apns2_sip_user_ids: HashSet<String>,
    /// `SERVER_PORT`
    pub server_port: u16,
    /// `DATABASE_URL`
    pub database_url: String,
    /// `APNS_KEY_PATH`
    pub apns_key_path: Option<String>,
    /// `APNS_KEY_ID`
    pub apns_key_id: Option<String>,
    /// `APNS_TEAM_ID`
    pub apns_team_id: Option<String>,
    /// `APNS_TOPIC`
    pub apns_topic: Option<String>,
    /// `APNS_PRODUCTION`
    pub apns_production: bool,
    /// `FCM_API_KEY`
    pub fcm_api_key: Option<String>,
    /// `GCM_API_KEY`
    pub gcm_api_key: Option<String>,
    /// `ENABLE_METRICS`
    pub enable_metrics: bool,
    /// `UPSTREAM_AUTH_URL` - external user-directory API consulted for bearer auth.
    pub upstream_auth_url: Option<String>,
}

fn env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "True" | "TRUE"))
        .unwrap_or(default)
}

impl Config {
    /// Maximum number of pushes dispatched for a single call: `⌊W / R⌋ − 1`.
    /// The subtraction avoids scheduling a retry so close to the deadline
    /// that it can't usefully arrive.
    pub fn max_attempts(&self) -> u32 {
        let w = self.push_roundtrip_wait.as_millis() as u64;
        let r = self.push_resend_interval.as_millis().max(1) as u64;
        ((w / r) as i64 - 1).max(0) as u32
    }

    pub fn from_env() -> Self {
        let redis_server_list = std::env::var("REDIS_SERVER_LIST")
            .unwrap_or_default()
            .replace(' ', "")
            .split(',')
            .filter(|s| s.contains(':'))
            .map(|s| s.to_string())
            .collect();

        let apns2_sip_user_ids = std::env::var("APNS2_DEVICES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            push_roundtrip_wait: env_ms("APP_PUSH_ROUNDTRIP_WAIT", 6000),
            push_resend_interval: env_ms("APP_PUSH_RESEND_INTERVAL", 2000),
            app_api_url: std::env::var("APP_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/".to_string()),
            cert_dir: std::env::var("CERT_DIR").unwrap_or_else(|_| ".".to_string()),
            redis_server_list,
            apns2_sip_user_ids,
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/callwake".to_string()),
            apns_key_path: std::env::var("APNS_KEY_PATH").ok(),
            apns_key_id: std::env::var("APNS_KEY_ID").ok(),
            apns_team_id: std::env::var("APNS_TEAM_ID").ok(),
            apns_topic: std::env::var("APNS_TOPIC").ok(),
            apns_production: env_bool("APNS_PRODUCTION", false),
            fcm_api_key: std::env::var("FCM_API_KEY").ok(),
            gcm_api_key: std::env::var("GCM_API_KEY").ok(),
            enable_metrics: env_bool("ENABLE_METRICS", false),
            upstream_auth_url: std::env::var("UPSTREAM_AUTH_URL").ok(),
        }
    }
}
