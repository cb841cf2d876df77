//! OAuth2 Authorization Code flow for the desktop CLI.
//!
//! 1. Opens the browser to the authorization URL
//! 2. Starts a tiny localhost HTTP server to receive the callback
//! 3. Exchanges the code for an access token (+ refresh token)
//! 4. Stores tokens in the OS keyring

use std::io::{Read, Write};
use std::net::TcpListener;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::keyring_store;
use crate::error::CalendarError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>, // Unix timestamp
    pub token_type: String,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub service_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub redirect_port: u16,
}

impl OAuthConfig {
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.redirect_port)
    }

    pub fn auth_url_full(&self) -> String {
        let scopes = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri()),
            urlencoding::encode(&scopes),
        )
    }
}

/// Run the full OAuth2 flow: open browser -> listen for callback -> exchange code.
pub async fn authorize(config: &OAuthConfig) -> Result<OAuthTokens, CalendarError> {
    let auth_url = config.auth_url_full();
    open::that(&auth_url).map_err(|e| CalendarError::OAuth(format!("cannot open browser: {e}")))?;

    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.redirect_port))
        .map_err(|e| CalendarError::OAuth(format!("cannot bind callback port: {e}")))?;

    let (mut stream, _) = listener
        .accept()
        .map_err(|e| CalendarError::OAuth(format!("callback accept failed: {e}")))?;
    let mut buf = [0u8; 4096];
    let n = stream
        .read(&mut buf)
        .map_err(|e| CalendarError::OAuth(format!("callback read failed: {e}")))?;
    let request = String::from_utf8_lossy(&buf[..n]);

    // GET /callback?code=XXX&...
    let code = extract_code(&request)
        .ok_or_else(|| CalendarError::OAuth("no code in callback".to_string()))?;

    let response = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n<html><body><h2>Authentication successful!</h2><p>You can close this tab.</p><script>window.close()</script></body></html>";
    let _ = stream.write_all(response.as_bytes());
    drop(stream);
    drop(listener);

    let tokens = exchange_code(config, &code).await?;
    store_tokens(&config.service_name, &tokens)?;
    Ok(tokens)
}

/// Exchange an authorization code for tokens.
async fn exchange_code(config: &OAuthConfig, code: &str) -> Result<OAuthTokens, CalendarError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("code", code),
        ("grant_type", "authorization_code"),
        ("redirect_uri", &config.redirect_uri()),
    ];
    let resp = Client::new()
        .post(&config.token_url)
        .form(&params)
        .send()
        .await?;
    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| CalendarError::InvalidResponse(e.to_string()))?;
    parse_token_response(&body, None)
}

/// Refresh an access token using a refresh token, persisting the result.
pub async fn refresh_token(
    config: &OAuthConfig,
    refresh: &str,
) -> Result<OAuthTokens, CalendarError> {
    let params = [
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];
    let resp = Client::new()
        .post(&config.token_url)
        .form(&params)
        .send()
        .await?;
    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| CalendarError::InvalidResponse(e.to_string()))?;

    let tokens = parse_token_response(&body, Some(refresh))?;
    store_tokens(&config.service_name, &tokens)?;
    Ok(tokens)
}

fn parse_token_response(
    body: &serde_json::Value,
    fallback_refresh: Option<&str>,
) -> Result<OAuthTokens, CalendarError> {
    if let Some(error) = body.get("error") {
        return Err(CalendarError::OAuth(error.to_string()));
    }

    let access_token = body
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CalendarError::InvalidResponse("missing access_token".to_string()))?
        .to_string();
    let expires_at = body
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .map(|ei| chrono::Utc::now().timestamp() + ei);

    Ok(OAuthTokens {
        access_token,
        refresh_token: body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| fallback_refresh.map(String::from)),
        expires_at,
        token_type: body
            .get("token_type")
            .and_then(|v| v.as_str())
            .unwrap_or("Bearer")
            .to_string(),
        scope: body.get("scope").and_then(|v| v.as_str()).map(String::from),
    })
}

fn store_tokens(service_name: &str, tokens: &OAuthTokens) -> Result<(), CalendarError> {
    let json = serde_json::to_string(tokens)
        .map_err(|e| CalendarError::OAuth(format!("cannot serialize tokens: {e}")))?;
    keyring_store::set(service_name, &json)
        .map_err(|e| CalendarError::OAuth(format!("keyring write failed: {e}")))
}

/// Load stored tokens from the keyring.
pub fn load_tokens(service_name: &str) -> Option<OAuthTokens> {
    keyring_store::get(service_name)
        .ok()
        .flatten()
        .and_then(|json| serde_json::from_str(&json).ok())
}

/// Whether stored tokens are expired (with a 60s buffer).
pub fn is_expired(tokens: &OAuthTokens) -> bool {
    match tokens.expires_at {
        Some(exp) => chrono::Utc::now().timestamp() > exp - 60,
        None => false,
    }
}

fn extract_code(request: &str) -> Option<String> {
    let first_line = request.lines().next()?;
    let path = first_line.split_whitespace().nth(1)?;
    let url = url::Url::parse(&format!("http://localhost{path}")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
}

// Simple urlencoding helper
mod urlencoding {
    pub fn encode(s: &str) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_key_only(s)
            .finish()
    }
}
