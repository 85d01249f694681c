use crate::http::build_client;
use crate::spapi::config::{LWA_CLIENT_ID, LWA_CLIENT_SECRET, LWA_REFRESH_TOKEN, LWA_TOKEN_URL};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LwaAuthError {
    #[error("missing LWA credentials in env")]
    MissingCredentials,
    #[error("token request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone)]
pub struct LwaCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl LwaCredentials {
    pub fn from_env() -> Result<Self, LwaAuthError> {
        if LWA_CLIENT_ID.is_empty() || LWA_CLIENT_SECRET.is_empty() || LWA_REFRESH_TOKEN.is_empty()
        {
            return Err(LwaAuthError::MissingCredentials);
        }
        Ok(Self {
            token_url: LWA_TOKEN_URL.clone(),
            client_id: LWA_CLIENT_ID.clone(),
            client_secret: LWA_CLIENT_SECRET.clone(),
            refresh_token: LWA_REFRESH_TOKEN.clone(),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange the seller's refresh token for a short-lived access token.
pub async fn get_access_token_from_refresh(
    credentials: &LwaCredentials,
) -> Result<String, LwaAuthError> {
    let body = [
        ("grant_type", "refresh_token"),
        ("refresh_token", credentials.refresh_token.as_str()),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];
    let client = build_client();
    let response = client
        .post(credentials.token_url.as_str())
        .form(&body)
        .send()
        .await
        .map_err(|err| LwaAuthError::Request(err.to_string()))?;

    if !response.status().is_success() {
        return Err(LwaAuthError::Request(format!(
            "HTTP {}",
            response.status()
        )));
    }

    let payload: TokenResponse = response
        .json()
        .await
        .map_err(|err| LwaAuthError::Request(err.to_string()))?;
    Ok(payload.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiny_http::{Response, Server, StatusCode};

    #[tokio::test]
    async fn exchanges_refresh_token_for_access_token() {
        let server = Server::http("127.0.0.1:0").expect("server");
        let url = format!("http://{}/auth/o2/token", server.server_addr());
        let handle = std::thread::spawn(move || {
            let mut req = server.recv().expect("request");
            let mut body = String::new();
            req.as_reader().read_to_string(&mut body).unwrap();
            req.respond(Response::from_string(r#"{"access_token":"Atza|abc","expires_in":3600}"#))
                .unwrap();
            body
        });

        let credentials = LwaCredentials {
            token_url: url,
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: "Atzr|refresh".into(),
        };
        let token = get_access_token_from_refresh(&credentials).await.unwrap();
        assert_eq!(token, "Atza|abc");

        let body = handle.join().unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("client_id=cid"));
    }

    #[tokio::test]
    async fn rejected_exchange_surfaces_status() {
        let server = Server::http("127.0.0.1:0").expect("server");
        let url = format!("http://{}/token", server.server_addr());
        std::thread::spawn(move || {
            let req = server.recv().expect("request");
            req.respond(Response::from_string("{}").with_status_code(StatusCode(401)))
                .unwrap();
        });
        let credentials = LwaCredentials {
            token_url: url,
            client_id: "cid".into(),
            client_secret: "secret".into(),
            refresh_token: "bad".into(),
        };
        let err = get_access_token_from_refresh(&credentials).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
