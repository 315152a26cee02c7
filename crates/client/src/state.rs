//! Observable session state
//!
//! Transitions follow a fixed state machine:
//!
//! ```text
//! Unauthenticated --login start--> Authenticating --success--> Authenticated(user)
//!        ^                              |                            |
//!        +-----------failure------------+                            |
//!        +-----------------logout / refresh failure------------------+
//! ```
//!
//! Anything else is a programming error.

use keyway_core::{SessionState, User};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error};

/// Handle returned by [`SessionStateHolder::subscribe`]
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&SessionState) + Send + Sync>;

/// Holder of the current [`SessionState`]
///
/// Readers use [`current`](Self::current), [`watch`](Self::watch) or
/// [`subscribe`](Self::subscribe). Only auth operations and the refresh
/// coordinator can change it.
pub struct SessionStateHolder {
    tx: watch::Sender<SessionState>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl SessionStateHolder {
    pub(crate) fn new(initial: SessionState) -> Self {
        debug_assert!(
            initial != SessionState::Authenticating,
            "session cannot start while authenticating"
        );
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Snapshot of the current state
    pub fn current(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    /// Receiver that yields every state change
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Register a callback invoked after every transition
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub(crate) fn mark_authenticating(&self) {
        self.transition(SessionState::Authenticating);
    }

    pub(crate) fn mark_authenticated(&self, user: User) {
        self.transition(SessionState::Authenticated(user));
    }

    /// Already unauthenticated is a no-op
    pub(crate) fn mark_unauthenticated(&self) {
        self.transition(SessionState::Unauthenticated);
    }

    fn transition(&self, next: SessionState) {
        let mut rejected = None;
        let changed = self.tx.send_if_modified(|current| {
            if *current == SessionState::Unauthenticated && next == SessionState::Unauthenticated {
                return false;
            }
            if !is_legal(current, &next) {
                rejected = Some(current.clone());
                return false;
            }
            *current = next.clone();
            true
        });

        if let Some(from) = rejected {
            error!("Illegal session transition from {:?} to {:?}", from, next);
            debug_assert!(false, "illegal session transition from {from:?} to {next:?}");
            return;
        }

        if changed {
            debug!("Session state changed to {:?}", next);
            self.notify(&next);
        }
    }

    fn notify(&self, state: &SessionState) {
        // Snapshot so listeners may subscribe or unsubscribe from inside the callback
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(state);
        }
    }
}

fn is_legal(from: &SessionState, to: &SessionState) -> bool {
    use SessionState::{Authenticated, Authenticating, Unauthenticated};

    matches!(
        (from, to),
        (Unauthenticated, Authenticating)
            | (Authenticating, Authenticated(_))
            | (Authenticating, Unauthenticated)
            | (Authenticated(_), Unauthenticated)
    )
}

impl std::fmt::Debug for SessionStateHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateHolder")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}
