use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("mfn-labels/", env!("CARGO_PKG_VERSION"), " (Language=Rust)");

/// Shared reqwest client for LWA and SP-API calls. Timeouts come from
/// `HTTP_TIMEOUT_SECS` and `HTTP_CONNECT_TIMEOUT_SECS`.
pub fn build_client() -> Client {
    let timeout = env_secs("HTTP_TIMEOUT_SECS", 30);
    let connect = env_secs("HTTP_CONNECT_TIMEOUT_SECS", 5);
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn env_secs(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
