//! Browser glue for keyway sessions
//!
//! Provides Web Storage credential backends, console logging setup and a
//! helper that builds a [`Session`] against the page's own origin.

mod storage;

pub use storage::{BrowserStorage, StorageArea};

use keyway_client::{ClientError, Session};
use tracing::info;

/// Route `log` records to the browser console
pub fn init_logging() {
    wasm_logger::init(wasm_logger::Config::default());
}

/// Origin of the current page, or an empty string outside a browser
pub fn base_url_from_window() -> String {
    if let Some(window) = web_sys::window() {
        if let Ok(origin) = window.location().origin() {
            return origin;
        }
    }

    // Default to relative URLs
    String::new()
}

/// Session talking to the page origin and persisting credentials in `area`
pub fn browser_session(area: StorageArea) -> Result<Session, ClientError> {
    let base_url = base_url_from_window();
    if base_url.is_empty() {
        return Err(ClientError::Configuration(
            "page origin is not available".into(),
        ));
    }

    info!("Creating session for {} with {:?} storage", base_url, area);
    Session::builder()
        .base_url(base_url)
        .storage(BrowserStorage::new(area))
        .build()
}
