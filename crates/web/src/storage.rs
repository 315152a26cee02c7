//! `localStorage` / `sessionStorage` backends

use keyway_core::{KeyValueStorage, StorageError};
use wasm_bindgen::JsValue;
use web_sys::Storage;

/// Which browser storage area holds the credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Survives browser restarts and is shared between tabs
    Local,
    /// Scoped to the tab and dropped when it closes
    Session,
}

impl StorageArea {
    fn open(self) -> Result<Storage, StorageError> {
        let window = web_sys::window()
            .ok_or_else(|| StorageError::Unavailable("no window object".to_string()))?;
        let storage = match self {
            Self::Local => window.local_storage(),
            Self::Session => window.session_storage(),
        };
        storage
            .map_err(backend_error)?
            .ok_or_else(|| StorageError::Unavailable(format!("{self:?} storage is disabled")))
    }
}

/// Web Storage backed [`KeyValueStorage`]
///
/// The storage object is looked up on every call rather than held, so the
/// backend stays `Send + Sync` and tolerates the area becoming unavailable.
#[derive(Debug, Clone, Copy)]
pub struct BrowserStorage {
    area: StorageArea,
}

impl BrowserStorage {
    pub fn new(area: StorageArea) -> Self {
        Self { area }
    }

    /// Backend over `window.localStorage`
    pub fn local() -> Self {
        Self::new(StorageArea::Local)
    }

    /// Backend over `window.sessionStorage`
    pub fn session() -> Self {
        Self::new(StorageArea::Session)
    }

    pub fn area(&self) -> StorageArea {
        self.area
    }

    /// True when the storage area can be opened
    pub fn is_available(&self) -> bool {
        self.area.open().is_ok()
    }
}

impl KeyValueStorage for BrowserStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.area.open()?.get_item(key).map_err(backend_error)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Quota errors surface here
        self.area.open()?.set_item(key, value).map_err(backend_error)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.area.open()?.remove_item(key).map_err(backend_error)
    }
}

fn backend_error(err: JsValue) -> StorageError {
    StorageError::Backend(format!("{err:?}"))
}
