//! Login and logout

use crate::api::ApiClient;
use crate::state::SessionStateHolder;
use keyway_core::{CredentialStore, Credentials, SessionState};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Holds the login slot until the login settles or is dropped
struct LoginClaim<'a> {
    flag: &'a AtomicBool,
}

impl<'a> LoginClaim<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for LoginClaim<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Credential exchange with the identity endpoint
pub struct AuthOperations {
    api: ApiClient,
    store: Arc<CredentialStore>,
    state: Arc<SessionStateHolder>,
    login_in_progress: AtomicBool,
}

impl AuthOperations {
    pub(crate) fn new(
        api: ApiClient,
        store: Arc<CredentialStore>,
        state: Arc<SessionStateHolder>,
    ) -> Self {
        Self {
            api,
            store,
            state,
            login_in_progress: AtomicBool::new(false),
        }
    }

    /// Log in and persist the resulting session
    ///
    /// Never fails: any error (bad credentials, network, storage) is logged,
    /// leaves the session unauthenticated and yields `false`. Only one login
    /// runs at a time; an overlapping call returns `false` immediately.
    pub async fn login(&self, identifier: &str, secret: &str) -> bool {
        let Some(_claim) = LoginClaim::acquire(&self.login_in_progress) else {
            warn!("Login rejected: another login is in progress");
            return false;
        };

        match self.state.current() {
            SessionState::Authenticating => {
                // Left behind by a login whose future was dropped
                warn!("Resetting session abandoned while authenticating");
                self.state.mark_unauthenticated();
            }
            SessionState::Authenticated(user) => {
                info!("Ending session for {} before logging in again", user.username);
                self.logout().await;
            }
            SessionState::Unauthenticated => {}
        }

        let generation = self.store.generation();
        self.state.mark_authenticating();

        let response = match self.api.login(identifier, secret).await {
            Ok(response) => response,
            Err(err) => {
                warn!("Login failed: {}", err);
                self.state.mark_unauthenticated();
                return false;
            }
        };

        let credentials = Credentials::new(
            response.access_token,
            Some(response.refresh_token),
            response.user.clone(),
        );
        match self.store.commit_if(generation, &credentials) {
            Ok(true) => {
                info!("Logged in as {}", response.user.username);
                self.state.mark_authenticated(response.user);
                true
            }
            Ok(false) => {
                info!("Discarding login result: session was ended while logging in");
                self.state.mark_unauthenticated();
                false
            }
            Err(err) => {
                error!("Failed to persist credentials after login: {}", err);
                self.state.mark_unauthenticated();
                false
            }
        }
    }

    /// End the session
    ///
    /// Local credentials are cleared first, then the server is asked to
    /// invalidate the refresh token. Failure of that notification is logged
    /// only. Without a session this does nothing.
    pub async fn logout(&self) {
        let credentials = self.store.load();
        if credentials.is_empty() && self.state.current() == SessionState::Unauthenticated {
            debug!("Logout requested without a session");
            return;
        }

        if let Err(err) = self.store.clear() {
            error!("Failed to clear stored credentials during logout: {}", err);
        }
        self.state.mark_unauthenticated();
        info!("Logged out");

        let Some(refresh_token) = credentials.refresh_token else {
            return;
        };
        if let Err(err) = self
            .api
            .logout(&refresh_token, credentials.access_token.as_deref())
            .await
        {
            warn!("Server logout notification failed: {}", err);
        }
    }
}

impl std::fmt::Debug for AuthOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOperations")
            .field("api", &self.api)
            .finish_non_exhaustive()
    }
}
