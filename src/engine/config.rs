//! Runtime configuration.
//!
//! All sizing knobs of the runtime live in [`EcsConfig`]. Values are loaded
//! once at startup, either from defaults or from a TOML document:
//!
//! ```toml
//! max_entities = 65536
//! initial_pool_capacity = 256
//! worker_threads = 6
//! chunk_size = 512
//! scratch_low_water = 0.25
//! max_dependency_depth = 64
//! ```
//!
//! Missing keys fall back to the defaults below.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::engine::error::{ECSError, ECSResult};

const DEFAULT_MAX_ENTITIES: u32 = 8192;
const DEFAULT_INITIAL_POOL_CAPACITY: usize = 64;
const DEFAULT_CHUNK_SIZE: usize = 512;
const DEFAULT_SCRATCH_LOW_WATER: f32 = 0.25;
const DEFAULT_MAX_DEPENDENCY_DEPTH: usize = 64;

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Sizing and scheduling parameters for a world and its system manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Size of the per-entity tables. One id is reserved for the null
    /// sentinel, so at most `max_entities - 1` entities are live at once.
    pub max_entities: u32,
    /// Initial element capacity of each component pool.
    pub initial_pool_capacity: usize,
    /// Number of worker threads (the main thread is not counted).
    pub worker_threads: usize,
    /// Entities per job chunk.
    pub chunk_size: usize,
    /// Utilization below which a scratch array releases memory.
    pub scratch_low_water: f32,
    /// Recursion limit of the stage assignment walk.
    pub max_dependency_depth: usize,
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            max_entities: DEFAULT_MAX_ENTITIES,
            initial_pool_capacity: DEFAULT_INITIAL_POOL_CAPACITY,
            worker_threads: default_worker_threads(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            scratch_low_water: DEFAULT_SCRATCH_LOW_WATER,
            max_dependency_depth: DEFAULT_MAX_DEPENDENCY_DEPTH,
        }
    }
}

impl EcsConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> ECSResult<Self> {
        let config: EcsConfig = toml::from_str(text)
            .map_err(|e| ECSError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> ECSResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ECSError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        info!("loaded ECS configuration from {}", path.display());
        Ok(config)
    }

    /// Serializes the configuration back to TOML.
    pub fn to_toml_string(&self) -> ECSResult<String> {
        toml::to_string(self).map_err(|e| ECSError::Config(e.to_string()))
    }

    /// Checks value ranges.
    pub fn validate(&self) -> ECSResult<()> {
        if self.max_entities < 2 {
            return Err(ECSError::Config("max_entities must be at least 2".into()));
        }
        if self.max_entities == u32::MAX {
            return Err(ECSError::Config("max_entities must leave room for the null id".into()));
        }
        if self.chunk_size == 0 {
            return Err(ECSError::Config("chunk_size must be non-zero".into()));
        }
        if self.worker_threads == 0 {
            return Err(ECSError::Config("worker_threads must be non-zero".into()));
        }
        if !(0.0..1.0).contains(&self.scratch_low_water) {
            return Err(ECSError::Config("scratch_low_water must be in [0, 1)".into()));
        }
        if self.max_dependency_depth == 0 {
            return Err(ECSError::Config("max_dependency_depth must be non-zero".into()));
        }
        Ok(())
    }

    /// Usable entity capacity.
    #[inline]
    pub fn entity_capacity(&self) -> u32 {
        self.max_entities - 1
    }
}
