//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cap (in bytes) on rows held by the buffer manager across all tuple sources.
    pub buffer_mem_cap_bytes: usize,

    /// Rows a query processor pulls through the plan per processing step.
    pub processor_batch_size: usize,

    /// Maximum rows returned to the user per result set; 0 means unlimited.
    pub user_row_limit: u64,

    /// Fail (rather than silently truncate) when the row limit is passed.
    pub exception_on_row_limit: bool,

    /// Ceiling on optimizer rule executions for one plan.
    pub optimizer_max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_mem_cap_bytes: 256 * 1024 * 1024, // 256 MiB default
            processor_batch_size: 256,
            user_row_limit: 0,
            exception_on_row_limit: false,
            optimizer_max_iterations: 1_000,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `FEDQ_BUFFER_MEM_CAP_BYTES`: buffer cap in bytes
    /// - `FEDQ_PROCESSOR_BATCH_SIZE`: rows per processing step
    /// - `FEDQ_USER_ROW_LIMIT`: result row limit (0 = none)
    /// - `FEDQ_EXCEPTION_ON_ROW_LIMIT`: `true`/`false`
    /// - `FEDQ_OPTIMIZER_MAX_ITERATIONS`: rule execution ceiling
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("FEDQ_BUFFER_MEM_CAP_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.buffer_mem_cap_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("FEDQ_PROCESSOR_BATCH_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.processor_batch_size = v;
            }
        }

        if let Ok(s) = std::env::var("FEDQ_USER_ROW_LIMIT") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.user_row_limit = v;
            }
        }

        if let Ok(s) = std::env::var("FEDQ_EXCEPTION_ON_ROW_LIMIT") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.exception_on_row_limit = v;
            }
        }

        if let Ok(s) = std::env::var("FEDQ_OPTIMIZER_MAX_ITERATIONS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.optimizer_max_iterations = v;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.processor_batch_size == 0 {
            return Err(Error::Config("processor_batch_size must be > 0".into()));
        }
        if self.optimizer_max_iterations == 0 {
            return Err(Error::Config("optimizer_max_iterations must be > 0".into()));
        }
        if self.buffer_mem_cap_bytes == 0 {
            return Err(Error::Config("buffer_mem_cap_bytes must be > 0".into()));
        }
        Ok(())
    }
}
