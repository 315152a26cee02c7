//! Client session manager
//!
//! Keeps an access/refresh token pair for the logged-in user and makes expiry
//! invisible to callers: requests rejected with `401 Unauthorized` are replayed
//! once after a single, shared token refresh.
//!
//! ```no_run
//! use keyway_client::{RequestDescriptor, Session};
//! use keyway_core::MemoryStorage;
//!
//! # async fn run() -> Result<(), keyway_client::ClientError> {
//! let session = Session::builder()
//!     .base_url("https://dashboard.example.com/api")
//!     .storage(MemoryStorage::new())
//!     .build()?;
//!
//! if session.login("ada@example.com", "secret").await {
//!     let alerts: serde_json::Value = session
//!         .send_json(RequestDescriptor::get("/alerts"))
//!         .await?;
//!     println!("{alerts}");
//! }
//! session.logout().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod error;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod state;

pub use api::{ApiClient, ApiClientBuilder, LoginResponse, RefreshResponse};
pub use auth::AuthOperations;
pub use error::{ClientError, RefreshError};
pub use keyway_core::{Credentials, SessionState, User};
pub use pipeline::{RequestDescriptor, RequestPipeline};
pub use refresh::RefreshCoordinator;
pub use session::{Session, SessionBuilder};
pub use state::{ListenerId, SessionStateHolder};
