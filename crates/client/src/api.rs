//! HTTP transport and identity endpoint calls

use crate::error::ClientError;
use keyway_core::{EndpointConfig, SessionConfig, User};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("keyway-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Successful login exchange
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Successful refresh exchange; `refresh_token` is set when the server rotated it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
}

/// Client for the API and its identity endpoint
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    endpoints: EndpointConfig,
    authorization_scheme: Option<String>,
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Build a client from session configuration
    pub fn from_config(config: &SessionConfig) -> Result<Self, ClientError> {
        let mut builder = Self::builder()
            .base_url(config.base_url.clone())
            .endpoints(config.endpoints.clone());
        if let Some(scheme) = &config.authorization_scheme {
            builder = builder.authorization_scheme(scheme.clone());
        }
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder.build()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    /// Create a request builder without credentials
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, url)
    }

    /// Value of the `Authorization` header for `token`
    pub fn authorization_value(&self, token: &str) -> String {
        match &self.authorization_scheme {
            Some(scheme) => format!("{scheme} {token}"),
            None => token.to_string(),
        }
    }

    /// Attach `token` as the request's authorization credential
    pub fn authorize(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request.header(header::AUTHORIZATION, self.authorization_value(token))
    }

    /// Execute a request and handle common errors
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request.send().await?;
        Self::decode(response).await
    }

    /// Decode a success body or map the status to an error
    pub async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }

    /// Exchange user credentials for a token pair
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse, ClientError> {
        let request = self
            .request(Method::POST, &self.endpoints.login)
            .json(&LoginRequest {
                email: identifier,
                password: secret,
            });
        self.execute(request).await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        let request = self
            .request(Method::POST, &self.endpoints.refresh)
            .json(&RefreshRequest { refresh_token });
        self.execute(request).await
    }

    /// Ask the server to invalidate a refresh token. Any 2xx counts as success.
    pub async fn logout(
        &self,
        refresh_token: &str,
        access_token: Option<&str>,
    ) -> Result<(), ClientError> {
        let mut request = self
            .request(Method::POST, &self.endpoints.logout)
            .json(&LogoutRequest { refresh_token });
        if let Some(token) = access_token {
            request = self.authorize(request, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("endpoints", &self.endpoints)
            .field("authorization_scheme", &self.authorization_scheme)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`]
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    endpoints: Option<EndpointConfig>,
    authorization_scheme: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl ApiClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the identity endpoint paths
    pub fn endpoints(mut self, endpoints: EndpointConfig) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Send `"<scheme> <token>"` instead of the raw token
    pub fn authorization_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.authorization_scheme = Some(scheme.into());
        self
    }

    /// Set the request timeout (ignored on wasm32)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        #[cfg(target_arch = "wasm32")]
        let _ = self.timeout; // Timeouts not supported on WASM

        client_builder = client_builder.user_agent(
            self.user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        );

        let client = client_builder.build()?;

        Ok(ApiClient {
            client,
            base_url,
            endpoints: self.endpoints.unwrap_or_default(),
            authorization_scheme: self.authorization_scheme,
        })
    }
}
