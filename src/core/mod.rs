//! Core types: configuration, constants, and error taxonomy.

pub mod config;
pub mod constants;
pub mod error;

pub use config::ServerConfig;
pub use constants::*;
pub use error::{CryptoError, EngineError, ServerError, StoreError, WireError};
