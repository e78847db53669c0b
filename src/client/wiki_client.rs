// HTTP client for the wiki's login endpoint
use async_trait::async_trait;
use reqwest::header::SET_COOKIE;
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use super::{AuthRequest, AuthResponse, RemoteAuthClient, TransportError};
use crate::config::ServerConfig;

/// Cookies the wiki only sets for an authenticated user. A session cookie
/// alone is also handed to anonymous visitors of the login page.
const AUTH_COOKIES: [&str; 3] = ["username", "password", "validation"];

fn is_auth_cookie(pair: &str) -> bool {
    pair.split_once('=')
        .map(|(name, _)| AUTH_COOKIES.iter().any(|auth| *auth == name.trim()))
        .unwrap_or(false)
}

pub struct WikiClient {
    base_url: String,
    login_path: String,
    client: Client,
}

/// Base URLs always end with `/` so relative paths join cleanly.
pub fn normalize_base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

impl WikiClient {
    pub fn new(base_url: &str, login_path: &str, timeout: Duration) -> Result<Self, TransportError> {
        // The login endpoint sets the session cookie on its redirect response
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Unreachable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: normalize_base_url(base_url),
            login_path: login_path.trim_start_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.url,
            &config.login_path,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url, self.login_path)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() || err.is_request() {
        TransportError::Unreachable(err.to_string())
    } else {
        TransportError::Malformed(err.to_string())
    }
}

#[async_trait]
impl RemoteAuthClient for WikiClient {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResponse, TransportError> {
        let url = self.login_url();
        debug!("Logging in '{}' at {}", request.username, url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&request.username, Some(&request.secret))
            .query(&[("tokenType", request.token_type.as_str())])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(AuthResponse::Rejected {
                reason: format!("Wrong username or password ({})", status.as_u16()),
            });
        }
        if !(status.is_success() || status.is_redirection()) {
            warn!("Login at {} answered {}", url, status);
            return Err(TransportError::Malformed(format!("unexpected status {}", status)));
        }

        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|cookie| cookie.split(';').next())
            .map(|pair| pair.trim().to_string())
            .filter(|pair| !pair.is_empty())
            .collect();

        if cookies.is_empty() {
            return Err(TransportError::Malformed(
                "login succeeded without a session cookie".to_string(),
            ));
        }
        if !cookies.iter().any(|pair| is_auth_cookie(pair)) {
            debug!("Login at {} answered {} without authentication cookies", url, status);
            return Ok(AuthResponse::Rejected {
                reason: "Wrong username or password".to_string(),
            });
        }

        Ok(AuthResponse::Granted {
            token: cookies.join("; "),
            account_name: request.username.clone(),
        })
    }
}
