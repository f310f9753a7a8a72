//! Tunables for building and tessellating a [`crate::RoamMesh`].

use nebula_config::TerrainConfig;
use tracing::debug;

use crate::error::RoamError;
use crate::pool::NEW_POOL_SIZE;

/// Terrain mesh settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RoamSettings {
    /// Cells per patch edge; a power of two.
    pub patch_size: u32,
    /// Variance tables store nodes `0..(1 << variance_depth)`.
    pub variance_depth: u32,
    /// World units per cell.
    pub square_size: f32,
    /// Nodes per render pass, spread over all workers.
    pub initial_pool_size: usize,
    /// Ceiling for pool growth after exhaustion.
    pub max_pool_size: usize,
    /// LOD falloff: larger radii keep detail further from the camera.
    pub view_radius: f32,
    /// Camera travel (world units) that triggers a new tessellation.
    pub retessellate_distance: f32,
    /// Tessellation workers; 0 uses one per logical CPU.
    pub worker_threads: usize,
    /// Keep separate trees and pools for the shadow pass.
    pub shadow_pass: bool,
}

impl Default for RoamSettings {
    fn default() -> Self {
        Self {
            patch_size: 128,
            variance_depth: 12,
            square_size: 8.0,
            initial_pool_size: NEW_POOL_SIZE,
            max_pool_size: NEW_POOL_SIZE * 8,
            view_radius: 300.0,
            retessellate_distance: 64.0,
            worker_threads: 0,
            shadow_pass: true,
        }
    }
}

impl From<&TerrainConfig> for RoamSettings {
    /// The variance depth is clamped to what `config.patch_size` supports, so
    /// shrinking the patch size alone keeps the settings valid.
    fn from(config: &TerrainConfig) -> Self {
        let max_depth = Self::max_variance_depth(config.patch_size);
        if config.variance_depth > max_depth && config.patch_size.is_power_of_two() {
            debug!(
                patch_size = config.patch_size,
                requested = config.variance_depth,
                max_depth,
                "clamping variance depth to patch size"
            );
        }
        Self {
            patch_size: config.patch_size,
            variance_depth: config.variance_depth.min(max_depth),
            square_size: config.square_size,
            initial_pool_size: config.initial_pool_size,
            max_pool_size: config.max_pool_size,
            view_radius: config.view_radius,
            retessellate_distance: config.retessellate_distance,
            worker_threads: config.worker_threads,
            shadow_pass: config.shadow_pass,
        }
    }
}

impl RoamSettings {
    /// Deepest variance table that the variance recursion fills completely
    /// for `patch_size`. Deeper entries would stay zero and block splitting.
    pub fn max_variance_depth(patch_size: u32) -> u32 {
        (2 * patch_size.trailing_zeros()).saturating_sub(1)
    }

    pub fn validate(&self) -> Result<(), RoamError> {
        if !self.patch_size.is_power_of_two() || self.patch_size < 4 {
            return Err(RoamError::InvalidPatchSize(self.patch_size));
        }
        let max = Self::max_variance_depth(self.patch_size);
        if self.variance_depth == 0 || self.variance_depth > max {
            return Err(RoamError::InvalidVarianceDepth {
                depth: self.variance_depth,
                max,
            });
        }
        if self.initial_pool_size < 2 {
            return Err(RoamError::InvalidPoolSize(self.initial_pool_size));
        }
        if !self.view_radius.is_finite() || self.view_radius <= 0.0 {
            return Err(RoamError::InvalidViewRadius(self.view_radius));
        }
        Ok(())
    }

    /// Number of tessellation workers, and so of node pools per pass.
    pub fn worker_count(&self) -> usize {
        match self.worker_threads {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}
