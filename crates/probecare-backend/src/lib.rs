//! ProbeCare Backend - REST adapter for the hosted auth and data service
//!
//! Provides:
//! - [`RestBackend`], an implementation of the session layer's `AuthProvider`
//!   and `ProfileStore` over HTTP
//! - Session persistence between runs
//! - Client directory and file upload calls
//!
//! # Example
//!
//! ```rust,ignore
//! use probecare_backend::{BackendConfig, RestBackend};
//! use probecare_session::{SessionSynchronizer, SyncConfig};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(RestBackend::new(BackendConfig::from_env()?)?);
//! let sync = SessionSynchronizer::start(backend.clone(), SyncConfig::new());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod directory;
pub mod error;
pub mod persist;
pub mod rest;
pub mod storage;
mod wire;

pub use config::BackendConfig;
pub use directory::{ClientRecord, NewClient, RecordId};
pub use error::DataError;
pub use persist::SessionFile;
pub use rest::RestBackend;
pub use storage::object_name;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
