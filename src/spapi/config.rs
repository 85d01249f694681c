use once_cell::sync::Lazy;
use std::env;

pub static ROOT: Lazy<String> = Lazy::new(|| {
    env::var("SP_API_ENDPOINT")
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| "https://sellingpartnerapi-na.amazon.com".to_string())
});

pub static LWA_TOKEN_URL: Lazy<String> = Lazy::new(|| {
    env::var("LWA_TOKEN_URL").unwrap_or_else(|_| "https://api.amazon.com/auth/o2/token".to_string())
});

pub static LWA_CLIENT_ID: Lazy<String> =
    Lazy::new(|| env::var("LWA_CLIENT_ID").unwrap_or_default());

pub static LWA_CLIENT_SECRET: Lazy<String> =
    Lazy::new(|| env::var("LWA_CLIENT_SECRET").unwrap_or_default());

pub static LWA_REFRESH_TOKEN: Lazy<String> =
    Lazy::new(|| env::var("LWA_REFRESH_TOKEN").unwrap_or_default());
