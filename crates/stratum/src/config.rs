//! # World Configuration
//!
//! Flat record consumed by [`World::init`](crate::World::init). Every field
//! has a default, so a TOML file only lists what it changes:
//!
//! ```toml
//! memory_budget_bytes = 134217728
//! chunk_side_length = 32
//! mesh_size = 32
//! seed = 1234
//!
//! [extraction]
//! opaque_vertex_factor = 24
//!
//! [pathfinding]
//! connectivity = "six"
//!
//! [context]
//! water_height = 30
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stratum_meshing::{default_worker_count, ExtractionConfig, SchedulerConfig, MAX_MESH_DIMENSION};
use stratum_volume::{side_shift, WorldContext, MAX_CHUNK_SHIFT};

use crate::error::{WorldError, WorldResult};
use crate::pathfinder::PathfindingConfig;

/// Everything `World` needs to start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Paged chunk memory before eviction starts.
    pub memory_budget_bytes: usize,
    /// Storage chunk side, a power of two.
    pub chunk_side_length: u32,
    /// Horizontal size of a mesh region.
    pub mesh_size: u32,
    /// Vertical size of a mesh region.
    pub mesh_height: u32,
    /// The volume spans `0 <= y < max_height`.
    pub max_height: u32,
    /// Initial world seed.
    pub seed: u64,
    /// Extraction workers; half the logical cores when absent.
    pub worker_threads: Option<usize>,
    /// Finished meshes held before workers block.
    pub output_queue_capacity: usize,
    /// Per-pass extraction settings.
    pub extraction: ExtractionConfig,
    /// Path search settings.
    pub pathfinding: PathfindingConfig,
    /// Directory for chunk files. Chunks are not persisted when absent.
    pub persistence_dir: Option<PathBuf>,
    /// Generation parameters.
    pub context: WorldContext,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: 256 * 1024 * 1024,
            chunk_side_length: 32,
            mesh_size: 32,
            mesh_height: 128,
            max_height: 128,
            seed: 0,
            worker_threads: None,
            output_queue_capacity: 256,
            extraction: ExtractionConfig::default(),
            pathfinding: PathfindingConfig::default(),
            persistence_dir: None,
            context: WorldContext::default(),
        }
    }
}

impl WorldConfig {
    /// Parses and validates a configuration.
    ///
    /// # Errors
    ///
    /// `WorldError::ConfigParse` for malformed TOML, otherwise whatever
    /// [`validate`](Self::validate) reports.
    pub fn from_toml_str(text: &str) -> WorldResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| WorldError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// `WorldError::ConfigIo` if the file cannot be read, otherwise the
    /// errors of [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> WorldResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| WorldError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks every value range.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> WorldResult<()> {
        if self.memory_budget_bytes == 0 {
            return Err(invalid("memory_budget_bytes", "must be positive"));
        }
        if side_shift(self.chunk_side_length).is_none() || self.chunk_side_length < 2 {
            return Err(invalid(
                "chunk_side_length",
                format!(
                    "{} is not a power of two in 2..={}",
                    self.chunk_side_length,
                    1u32 << MAX_CHUNK_SHIFT
                ),
            ));
        }
        for (field, value) in [("mesh_size", self.mesh_size), ("mesh_height", self.mesh_height)] {
            if !(1..=MAX_MESH_DIMENSION).contains(&value) {
                return Err(invalid(
                    field,
                    format!("{value} is outside 1..={MAX_MESH_DIMENSION}"),
                ));
            }
        }
        if self.max_height == 0 || self.max_height > i32::MAX as u32 {
            return Err(invalid("max_height", "must be in 1..=i32::MAX"));
        }
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "at least one worker is required"));
        }
        if self.output_queue_capacity == 0 {
            return Err(invalid("output_queue_capacity", "must be positive"));
        }
        let weight = self.pathfinding.heuristic_weight;
        if !weight.is_finite() || weight < 0.0 {
            return Err(invalid("pathfinding.heuristic_weight", "must be finite and not negative"));
        }
        if self.pathfinding.max_iterations == 0 {
            return Err(invalid("pathfinding.max_iterations", "must be positive"));
        }
        self.context.validate()?;
        Ok(())
    }

    /// Region size as (width, height, depth).
    #[must_use]
    pub const fn mesh_dimensions(&self) -> [u32; 3] {
        [self.mesh_size, self.mesh_height, self.mesh_size]
    }

    /// Scheduler settings derived from this configuration.
    #[must_use]
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.worker_threads.unwrap_or_else(default_worker_count),
            output_capacity: self.output_queue_capacity,
            mesh_size: self.mesh_dimensions(),
            extraction: self.extraction.clone(),
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> WorldError {
    WorldError::Config {
        field,
        reason: reason.into(),
    }
}
