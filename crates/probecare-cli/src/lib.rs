//! ProbeCare CLI - command-line front-end over the session synchronizer
//!
//! - [`config::AppConfig`] reads the `[backend]` and `[session]` tables
//! - [`commands`] holds one function per subcommand

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;
pub mod config;

pub use config::AppConfig;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
