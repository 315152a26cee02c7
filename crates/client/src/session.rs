//! Consumer-facing session handle
//!
//! [`Session`] wires the credential store, state holder, refresh coordinator,
//! request pipeline and auth operations together. It is cheap to clone and
//! every clone drives the same session; separate `Session` values are fully
//! isolated from each other.

use crate::api::{ApiClient, ApiClientBuilder};
use crate::auth::AuthOperations;
use crate::error::ClientError;
use crate::pipeline::{RequestDescriptor, RequestPipeline};
use crate::refresh::RefreshCoordinator;
use crate::state::{ListenerId, SessionStateHolder};
use keyway_core::{
    CredentialStore, Credentials, EndpointConfig, KeyValueStorage, SessionConfig, SessionState,
    StorageKeys, User,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Client session
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Arc<CredentialStore>,
    state: Arc<SessionStateHolder>,
    refresher: Arc<RefreshCoordinator>,
    pipeline: RequestPipeline,
    auth: AuthOperations,
}

impl Session {
    /// Create a new session builder
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Build a session from configuration
    pub fn from_config(
        config: &SessionConfig,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self, ClientError> {
        config
            .validate()
            .map_err(|err| ClientError::Configuration(err.to_string()))?;
        let api = ApiClient::from_config(config)?;
        Ok(Self::assemble(api, storage, config.storage.clone()))
    }

    fn assemble(api: ApiClient, storage: Arc<dyn KeyValueStorage>, keys: StorageKeys) -> Self {
        let store = Arc::new(CredentialStore::with_keys(storage, keys));

        let persisted = store.load();
        let initial = SessionState::from_credentials(&persisted);
        match &initial {
            SessionState::Authenticated(user) => info!("Restored session for {}", user.username),
            _ if !persisted.is_empty() => {
                warn!("Discarding incomplete stored credentials");
                if let Err(err) = store.clear() {
                    warn!("Failed to clear incomplete credentials: {}", err);
                }
            }
            _ => {}
        }

        let state = Arc::new(SessionStateHolder::new(initial));
        let refresher = Arc::new(RefreshCoordinator::new(
            api.clone(),
            Arc::clone(&store),
            Arc::clone(&state),
        ));
        let pipeline = RequestPipeline::new(api.clone(), Arc::clone(&store), Arc::clone(&refresher));
        let auth = AuthOperations::new(api, Arc::clone(&store), Arc::clone(&state));

        Self {
            inner: Arc::new(SessionInner {
                store,
                state,
                refresher,
                pipeline,
                auth,
            }),
        }
    }

    /// Current authentication state
    pub fn state(&self) -> SessionState {
        self.inner.state.current()
    }

    /// The logged-in user, if any
    pub fn user(&self) -> Option<User> {
        self.state().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    /// Register a callback invoked after every state transition
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.inner.state.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.state.unsubscribe(id)
    }

    /// Receiver that yields every state change
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.state.watch()
    }

    /// Log in; see [`AuthOperations::login`]
    pub async fn login(&self, identifier: &str, secret: &str) -> bool {
        self.inner.auth.login(identifier, secret).await
    }

    /// Log out; see [`AuthOperations::logout`]
    pub async fn logout(&self) {
        self.inner.auth.logout().await;
    }

    /// Send an authenticated request; see [`RequestPipeline::send`]
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<reqwest::Response, ClientError> {
        self.inner.pipeline.send(descriptor).await
    }

    /// Send an authenticated request and decode the JSON response
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ClientError> {
        self.inner.pipeline.send_json(descriptor).await
    }

    /// Force a token renewal, joining one already in flight
    pub async fn refresh(&self) -> Result<String, ClientError> {
        Ok(self.inner.refresher.ensure_fresh_token().await?)
    }

    /// Snapshot of the persisted credentials
    pub fn credentials(&self) -> Credentials {
        self.inner.store.load()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("refresher", &self.inner.refresher)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    api: ApiClientBuilder,
    storage: Option<Arc<dyn KeyValueStorage>>,
    keys: Option<StorageKeys>,
}

impl SessionBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.api = self.api.base_url(url);
        self
    }

    /// Override the identity endpoint paths
    pub fn endpoints(mut self, endpoints: EndpointConfig) -> Self {
        self.api = self.api.endpoints(endpoints);
        self
    }

    /// Send `"<scheme> <token>"` instead of the raw token
    pub fn authorization_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.api = self.api.authorization_scheme(scheme);
        self
    }

    /// Set the request timeout (ignored on wasm32)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.api = self.api.timeout(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.api = self.api.user_agent(agent);
        self
    }

    /// Backend for persisted credentials
    pub fn storage(mut self, storage: impl KeyValueStorage + 'static) -> Self {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(storage);
        self.storage = Some(storage);
        self
    }

    /// Storage key names for persisted credentials
    pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Build the session, restoring any persisted credentials
    pub fn build(self) -> Result<Session, ClientError> {
        let storage = self
            .storage
            .ok_or_else(|| ClientError::Configuration("storage is required".into()))?;
        let api = self.api.build()?;
        Ok(Session::assemble(api, storage, self.keys.unwrap_or_default()))
    }
}
