// PopContext
// copyright zipxing@hotmail.com 2022～2025

//! Context configuration.
//!
//! Defaults for new contexts come from a process-wide `ContextConfig`,
//! initialized once at startup (usually from a TOML file):
//! ```ignore
//! let cfg = ContextConfig::load("pop.toml")?;
//! init_context_config(cfg);
//! let ctx = ContextData::new("popnet1");
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::OnceLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// upper bound consulted by `allow_birth`
    pub max_particles: i64,
    /// PRNG seed used until the first `reset`
    pub seed: u64,
    /// time increment of a cook when none can be derived
    pub time_inc: f32,
    /// first value returned by `next_id` after a reset
    pub first_id: i32,
    /// frames kept by `PopCache`
    pub cache_size: usize,
    pub log_level: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_particles: 100_000,
            seed: 0,
            time_inc: 1.0 / 24.0,
            first_id: 1,
            cache_size: 8,
            log_level: "info".to_string(),
        }
    }
}

impl ContextConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

/// Global context configuration
pub static CONTEXT_CONFIG: OnceLock<ContextConfig> = OnceLock::new();

/// Initialize the global context configuration.
///
/// Only the first call takes effect; returns false when it was already set.
pub fn init_context_config(cfg: ContextConfig) -> bool {
    CONTEXT_CONFIG.set(cfg).is_ok()
}

/// Global configuration, or the defaults if never initialized.
pub fn get_context_config() -> &'static ContextConfig {
    CONTEXT_CONFIG.get_or_init(ContextConfig::default)
}
