//! Token storage backends.
//!
//! - [`EnvStorage`] - One process environment variable per token
//! - [`MemoryStorage`] - Lock-guarded map, for tests and short sessions
//!
//! Both implement [`gittools_core::TokenStorage`] and are interchangeable.

mod env;
mod memory;

pub use env::{format_env_key, EnvStorage, ENV_PREFIX};
pub use memory::MemoryStorage;
