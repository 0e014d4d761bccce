//! TherapyBridge configuration module
//! Handles the config file and persisted client state

pub mod config;
pub mod storage;

pub use config::{ApiConfig, CacheConfig, Config};
pub use storage::LocalStore;
