//! Authenticated request pipeline
//!
//! Every authenticated call goes through [`RequestPipeline::send`]. The
//! pipeline attaches the current access token, and when the server answers
//! `401 Unauthorized` it renews the token through the
//! [`RefreshCoordinator`] and replays the request once.

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::refresh::RefreshCoordinator;
use keyway_core::CredentialStore;
use reqwest::header::{self, HeaderName, HeaderValue};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// Description of a call, replayable after a token refresh
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Option<serde_json::Value>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header. An `Authorization` header is ignored; the pipeline owns it.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push((name, value));
        self
    }

    /// Set a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A descriptor suspended while its token is renewed
struct PendingRequest {
    descriptor: RequestDescriptor,
    retried: bool,
}

/// Sends requests with the current credentials and replays them once after a refresh
pub struct RequestPipeline {
    api: ApiClient,
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
}

impl RequestPipeline {
    pub(crate) fn new(
        api: ApiClient,
        store: Arc<CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            api,
            store,
            refresher,
        }
    }

    /// Send a request on behalf of the logged-in user
    ///
    /// Returns the server response for any status other than 401, untouched.
    /// A 401 triggers one token renewal and one replay; a 401 on the replay
    /// is reported as [`ClientError::RetryExhausted`], and a failed renewal as
    /// [`ClientError::SessionExpired`].
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<Response, ClientError> {
        let mut pending = PendingRequest {
            descriptor,
            retried: false,
        };
        let mut token = self.store.access_token();

        loop {
            let response = self.dispatch(&pending.descriptor, token.as_deref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if pending.retried {
                warn!(
                    "{} {} rejected again after token refresh",
                    pending.descriptor.method, pending.descriptor.path
                );
                return Err(ClientError::RetryExhausted);
            }

            debug!(
                "{} {} unauthorized, renewing access token",
                pending.descriptor.method, pending.descriptor.path
            );
            let fresh = self.refresher.renew_after(token.as_deref()).await?;
            pending.retried = true;
            token = Some(fresh);
        }
    }

    /// Send a request and decode a JSON success body
    ///
    /// Non-success statuses are mapped with [`ClientError::from_status`].
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ClientError> {
        let response = self.send(descriptor).await?;
        ApiClient::decode(response).await
    }

    async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<Response, ClientError> {
        let mut request = self.api.request(descriptor.method.clone(), &descriptor.path);
        if !descriptor.query.is_empty() {
            request = request.query(&descriptor.query);
        }
        for (name, value) in &descriptor.headers {
            if *name == header::AUTHORIZATION {
                continue;
            }
            request = request.header(name.clone(), value.clone());
        }
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }
        if let Some(token) = token {
            request = self.api.authorize(request, token);
        }

        debug!("Dispatching {} {}", descriptor.method, descriptor.path);
        Ok(request.send().await?)
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}
