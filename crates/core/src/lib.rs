//! keyway core types and credential persistence
//!
//! Everything in this crate is free of network access. The client crate builds
//! the refresh protocol on top of the [`CredentialStore`] defined here.

pub mod config;
pub mod credentials;
pub mod error;
pub mod storage;
pub mod tracing;
pub mod types;

pub use config::{EndpointConfig, SessionConfig};
pub use credentials::{CredentialStore, StorageKeys};
pub use error::{CoreError, CoreResult, StorageError};
#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStorage;
pub use storage::{KeyValueStorage, MemoryStorage};
pub use types::{Credentials, SessionState, User};
