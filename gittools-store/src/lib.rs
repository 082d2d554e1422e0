// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # gittools Store
//!
//! Token state for gittools.
//!
//! This crate provides:
//!
//! - **Storage backends**: [`EnvStorage`] and [`MemoryStorage`], both
//!   implementing [`gittools_core::TokenStorage`]
//! - **TokenManager**: expiry headroom checks, bounded-retry refresh and
//!   per-key background monitors
//! - **Settings**: the JSON settings file
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use gittools_store::{EnvStorage, RefreshConfig, TokenManager};
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = Arc::new(TokenManager::new(
//!     Arc::new(EnvStorage::new()),
//!     Arc::new(MyRefreshHandler),
//!     RefreshConfig::default(),
//! ));
//!
//! let shutdown = CancellationToken::new();
//! manager.start_monitoring(&shutdown, "GITHUB");
//! ```

pub mod config;
pub mod error;
pub mod refresh;
pub mod storage;

pub use config::{RefreshSettings, Settings};
pub use error::{RefreshError, StoreError};
pub use refresh::{ProgressCallback, RefreshConfig, TokenManager, MIN_REFRESH_INTERVAL};
pub use storage::{format_env_key, EnvStorage, MemoryStorage, ENV_PREFIX};

#[cfg(test)]
mod refresh_tests;
