//! # World Context
//!
//! Immutable generation parameters. A context is fixed for the lifetime of
//! a world session; changing it means resetting the world.
//!
//! ## Example
//!
//! ```toml
//! landscape_octaves = 4
//! landscape_frequency = 0.004
//! landscape_amplitude = 48.0
//! base_height = 48
//! water_height = 40
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Generation parameters consumed by the generation collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldContext {
    /// Octave count for the landscape heightmap.
    pub landscape_octaves: u32,
    /// Amplitude decay per octave.
    pub landscape_persistence: f64,
    /// Frequency increase per octave.
    pub landscape_lacunarity: f64,
    /// Base frequency of the landscape noise.
    pub landscape_frequency: f64,
    /// Height variation in voxels around `base_height`.
    pub landscape_amplitude: f64,
    /// Octave count for the mountain mask.
    pub mountain_octaves: u32,
    /// Base frequency of the mountain mask.
    pub mountain_frequency: f64,
    /// Extra height added on top of mountains.
    pub mountain_amplitude: f64,
    /// Average terrain height.
    pub base_height: i32,
    /// Columns lower than this get water up to it.
    pub water_height: i32,
    /// Depth of the dirt layer under the surface.
    pub dirt_depth: u32,
}

impl Default for WorldContext {
    fn default() -> Self {
        Self {
            landscape_octaves: 4,
            landscape_persistence: 0.5,
            landscape_lacunarity: 2.0,
            landscape_frequency: 0.004,
            landscape_amplitude: 24.0,
            mountain_octaves: 2,
            mountain_frequency: 0.0015,
            mountain_amplitude: 40.0,
            base_height: 48,
            water_height: 40,
            dirt_depth: 3,
        }
    }
}

impl WorldContext {
    /// Parses a context from TOML. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Parse` for malformed TOML and
    /// `ContextError::Invalid` if a parameter is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self, ContextError> {
        let ctx: Self = toml::from_str(text).map_err(|e| ContextError::Parse(e.to_string()))?;
        ctx.validate()?;
        Ok(ctx)
    }

    /// Checks every parameter range.
    ///
    /// # Errors
    ///
    /// Returns the first parameter found out of range.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.landscape_octaves == 0 {
            return Err(invalid("landscape_octaves", "must be at least 1"));
        }
        if self.landscape_octaves > 16 || self.mountain_octaves > 16 {
            return Err(invalid("landscape_octaves", "more than 16 octaves"));
        }
        if !(self.landscape_persistence > 0.0 && self.landscape_persistence <= 1.0) {
            return Err(invalid("landscape_persistence", "must be in (0, 1]"));
        }
        if !(self.landscape_lacunarity >= 1.0) {
            return Err(invalid("landscape_lacunarity", "must be >= 1"));
        }
        if !(self.landscape_frequency > 0.0) || !(self.mountain_frequency > 0.0) {
            return Err(invalid("landscape_frequency", "must be positive"));
        }
        if self.landscape_amplitude < 0.0 || self.mountain_amplitude < 0.0 {
            return Err(invalid("landscape_amplitude", "must not be negative"));
        }
        if self.base_height < 0 {
            return Err(invalid("base_height", "must not be negative"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ContextError {
    ContextError::Invalid {
        name,
        reason: reason.to_owned(),
    }
}
