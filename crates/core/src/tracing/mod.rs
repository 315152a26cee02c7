//! Logging setup shared by keyway clients
//!
//! Library code only emits `tracing` events. Native applications can install
//! a subscriber with [`init_tracing`]; browser builds use `keyway-web`.

pub mod config;
#[cfg(all(feature = "tracing-init", not(target_arch = "wasm32")))]
pub mod init;

pub use config::LoggingConfig;
#[cfg(all(feature = "tracing-init", not(target_arch = "wasm32")))]
pub use init::init_tracing;
