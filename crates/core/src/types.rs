use serde::{Deserialize, Serialize};

/// Profile of the logged-in user as returned by the identity endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Persisted credential set
///
/// After any successful commit `access_token` and `user` are either both present
/// or both absent. `refresh_token` may outlive a cleared access token only while
/// a refresh is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

impl Credentials {
    /// Credentials for a freshly established session
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user: User,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            user: Some(user),
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }

    /// The access token and user, only when both are present
    pub fn session(&self) -> Option<(&str, &User)> {
        match (&self.access_token, &self.user) {
            (Some(token), Some(user)) => Some((token.as_str(), user)),
            _ => None,
        }
    }
}

/// Authentication state observed by the rest of the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "user", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(User),
}

impl SessionState {
    /// Initial state derived from persisted credentials. Never `Authenticating`.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        match credentials.session() {
            Some((_, user)) => Self::Authenticated(user.clone()),
            None => Self::Unauthenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The logged-in user, if any
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}
