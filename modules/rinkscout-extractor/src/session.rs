//! Authenticated site session.
//!
//! One `Session` is established at startup and borrowed by every
//! fetch for the rest of the run. Login exchanges credentials for the
//! `ep_next_token`/`streamToken` cookies; without credentials a
//! pre-baked cookie header from the environment is used as-is.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use rinkscout_common::Config;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Classified fetch failure, driving the retry policies downstream.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Transport-level failures and throttling/server statuses are
    /// worth another attempt; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connect(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
            FetchError::Other(_) => false,
        }
    }
}

pub struct Session {
    client: reqwest::Client,
    cookie_header: String,
}

impl Session {
    /// Log in (or fall back to `EP_COOKIE_HEADER`) and build the
    /// client used for every page fetch in this run.
    pub async fn establish(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .cookie_store(true)
            .build()
            .context("building HTTP client")?;

        let mut cookie_header = String::new();

        if let Some(login) = &config.login {
            match login_for_tokens(&client, &config.base_url, &login.email, &login.password).await {
                Ok((token, stream_token)) => {
                    if let Some(t) = token {
                        cookie_header.push_str(&format!("ep_next_token={t}; "));
                    }
                    if let Some(t) = stream_token {
                        cookie_header.push_str(&format!("streamToken={t}; "));
                    }
                    info!("Authenticated via API login");
                }
                Err(e) => {
                    warn!("API login failed: {e}. Falling back to EP_COOKIE_HEADER");
                }
            }
        }

        if cookie_header.is_empty() {
            match &config.cookie_header {
                Some(header) => {
                    cookie_header = header.clone();
                    info!("Using cookie header from environment");
                }
                None => {
                    // Anonymous: rely on the client's cookie store picking
                    // up whatever the first fetch sets.
                    warn!("No credentials available, proceeding anonymously");
                }
            }
        }

        Ok(Self {
            client,
            cookie_header,
        })
    }

    /// Fetch a page and return its body as HTML text.
    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let mut request = self.client.get(url);
        if !self.cookie_header.is_empty() {
            request = request.header("cookie", self.cookie_header.as_str());
        }
        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| FetchError::Other(e.to_string()))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

fn classify_transport(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Other(e.to_string())
    }
}

/// POST the login endpoint and pull the session tokens out of the
/// response body.
async fn login_for_tokens(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &str,
) -> Result<(Option<String>, Option<String>)> {
    let url = format!("{base_url}/api/next/auth/login");
    let body = json!({
        "email": email,
        "password": password,
        "originSite": "web",
    });
    let response = client
        .post(&url)
        .header("accept", "application/json, text/plain, */*")
        .json(&body)
        .send()
        .await
        .context("sending login request")?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("login failed: HTTP {status} - {text}");
    }
    let payload: Value = response.json().await.context("parsing login response")?;
    let token = payload
        .get("token")
        .and_then(Value::as_str)
        .map(str::to_string);
    let stream_token = payload
        .get("streamToken")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((token, stream_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Connect("refused".into()).is_retryable());
        assert!(FetchError::Status(429).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Other("bad body".into()).is_retryable());
    }
}
