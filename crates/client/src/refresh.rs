//! Single-flight access token renewal
//!
//! The first caller that needs a new access token becomes the leader: it
//! publishes a ticket, performs the refresh exchange and settles the ticket.
//! Every caller that arrives while the ticket is outstanding waits on it and
//! receives the leader's outcome, so N concurrent authorization failures cost
//! exactly one refresh call.

use crate::api::ApiClient;
use crate::error::RefreshError;
use crate::state::SessionStateHolder;
use keyway_core::{CredentialStore, SessionState};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type Outcome = Result<String, RefreshError>;

/// Handle on a refresh in flight; `None` until the leader settles it
type Ticket = watch::Receiver<Option<Outcome>>;

enum Role {
    Leader(watch::Sender<Option<Outcome>>),
    Waiter(Ticket),
}

/// Removes the published ticket when the leader finishes or is dropped
struct TicketGuard<'a> {
    slot: &'a Mutex<Option<Ticket>>,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Coordinates access token renewal across concurrent requests
pub struct RefreshCoordinator {
    api: ApiClient,
    store: Arc<CredentialStore>,
    state: Arc<SessionStateHolder>,
    ticket: Mutex<Option<Ticket>>,
}

impl RefreshCoordinator {
    pub(crate) fn new(
        api: ApiClient,
        store: Arc<CredentialStore>,
        state: Arc<SessionStateHolder>,
    ) -> Self {
        Self {
            api,
            store,
            state,
            ticket: Mutex::new(None),
        }
    }

    /// True while a refresh exchange is outstanding
    pub fn in_flight(&self) -> bool {
        self.lock_ticket().is_some()
    }

    /// Obtain a renewed access token
    ///
    /// Joins the refresh already in flight if there is one. On failure the
    /// credential store has been cleared and the session is unauthenticated.
    pub async fn ensure_fresh_token(&self) -> Result<String, RefreshError> {
        let role = {
            let mut slot = self.lock_ticket();
            match slot.as_ref() {
                Some(ticket) => Role::Waiter(ticket.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Waiter(ticket) => {
                debug!("Joining in-flight token refresh");
                Self::wait(ticket).await
            }
            Role::Leader(tx) => {
                let guard = TicketGuard { slot: &self.ticket };
                let outcome = self.refresh().await;
                // Discard the ticket before waking waiters so a later failure starts a new refresh
                drop(guard);
                tx.send_replace(Some(outcome.clone()));
                outcome
            }
        }
    }

    /// Renew after a request was rejected while presenting `stale`
    ///
    /// If no refresh is in flight and the stored token already differs from
    /// `stale`, another request renewed it in the meantime and that token is
    /// returned without a new exchange.
    pub(crate) async fn renew_after(&self, stale: Option<&str>) -> Result<String, RefreshError> {
        if !self.in_flight() {
            if let Some(current) = self.store.access_token() {
                if Some(current.as_str()) != stale {
                    debug!("Access token already renewed by another request");
                    return Ok(current);
                }
            }
        }
        self.ensure_fresh_token().await
    }

    async fn wait(mut ticket: Ticket) -> Outcome {
        match ticket.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Err(RefreshError::Abandoned)),
            Err(_) => {
                warn!("Token refresh was dropped before it settled");
                Err(RefreshError::Abandoned)
            }
        }
    }

    async fn refresh(&self) -> Outcome {
        let generation = self.store.generation();
        let Some(refresh_token) = self.store.load().refresh_token else {
            return Err(self.fail(generation, RefreshError::MissingRefreshToken));
        };

        debug!("Refreshing access token");
        let response = match self.api.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(generation, RefreshError::from(err))),
        };

        let rotated = response.refresh_token.is_some();
        match self.store.update_tokens_if(
            generation,
            &response.access_token,
            response.refresh_token.as_deref(),
        ) {
            Ok(true) => {
                info!("Access token refreshed (refresh token rotated: {})", rotated);
                Ok(response.access_token)
            }
            Ok(false) => {
                info!("Discarding refreshed token: session ended during refresh");
                Err(RefreshError::Superseded)
            }
            Err(err) => {
                // The store cleared itself after the failed write
                self.state.mark_unauthenticated();
                Err(RefreshError::Storage(err.to_string()))
            }
        }
    }

    /// End the session the refresh was started for
    fn fail(&self, generation: u64, err: RefreshError) -> RefreshError {
        warn!("Token refresh failed: {}", err);

        if self.state.current() == SessionState::Authenticating {
            debug!("Login in progress; leaving credentials to it");
            return err;
        }

        match self.store.clear_if(generation) {
            Ok(true) => self.state.mark_unauthenticated(),
            Ok(false) => debug!("Session changed during refresh; not clearing it"),
            Err(storage_err) => {
                error!("Failed to clear credentials after refresh failure: {}", storage_err);
                self.state.mark_unauthenticated();
            }
        }
        err
    }

    fn lock_ticket(&self) -> MutexGuard<'_, Option<Ticket>> {
        self.ticket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}
