//! Authentication module for Docker Hub access

use crate::cli::config::AuthConfig;
use crate::common::RetryPolicy;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{MirrorError, Result};
use crate::logging::Logger;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug)]
pub struct Auth {
    client: Client,
    login_url: Url,
    retry: RetryPolicy,
}

impl Auth {
    pub fn new(hub_url: &str, timeout: u64, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| MirrorError::Config(format!("Failed to create auth client: {}", e)))?;

        let mut base = hub_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let login_url = Url::parse(&base)?.join("v2/users/login")?;

        Ok(Self {
            client,
            login_url,
            retry,
        })
    }

    /// Exchange credentials for a session token. Every failure here is fatal to the run.
    pub async fn login(&self, auth_config: &AuthConfig, output: &Logger) -> Result<String> {
        output.verbose(&format!(
            "Attempting authentication for user: {}",
            auth_config.username
        ));

        let token = self
            .retry
            .run(output, "login", MirrorError::is_transient, || {
                self.request_token(auth_config)
            })
            .await
            .map_err(|e| match e {
                MirrorError::Auth(_) | MirrorError::RateLimited(_) => e,
                other => MirrorError::Auth(format!("Could not obtain session token: {}", other)),
            })?;

        output.success("Authentication token obtained successfully");
        output.detail(&format!("Token obtained (length: {} chars)", token.len()));
        Ok(token)
    }

    async fn request_token(&self, auth_config: &AuthConfig) -> Result<String> {
        let response = self
            .client
            .post(self.login_url.clone())
            .json(&LoginRequest {
                username: &auth_config.username,
                password: &auth_config.password,
            })
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "login"))?;

        let status = response.status();
        if status.is_server_error() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_registry_error(status, &error_text, "login"));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_auth_error(status, &error_text));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| MirrorError::Auth(format!("Failed to parse token response: {}", e)))?;

        token_response
            .token
            .or(token_response.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MirrorError::Auth("Login response did not contain a token".to_string()))
    }
}
