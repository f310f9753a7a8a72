//! Multi-octave fractal Brownian motion (fBm) height field.
//!
//! Heights are centered on zero so the generated terrain crosses sea level,
//! which exercises the shoreline variance boost.

use nebula_roam::{HeightMap, Rect};
use noise::{NoiseFn, Simplex};

/// Parameters for the fBm height field.
#[derive(Clone, Debug)]
pub struct HeightFieldParams {
    pub seed: u32,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per grid cell.
    pub base_frequency: f64,
    /// Amplitude of the first octave in world units.
    pub amplitude: f64,
}

impl Default for HeightFieldParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.0 / 256.0,
            amplitude: 120.0,
        }
    }
}

/// Simplex fBm sampler over grid corners.
pub struct HeightFieldSampler {
    noise: Simplex,
    params: HeightFieldParams,
}

impl HeightFieldSampler {
    pub fn new(params: HeightFieldParams) -> Self {
        let noise = Simplex::new(params.seed);
        Self { noise, params }
    }

    /// Height at grid corner `(x, z)`.
    pub fn sample(&self, x: u32, z: u32) -> f32 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            total += self.noise.get([x as f64 * frequency, z as f64 * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total as f32
    }

    /// Height map of `width × height` cells.
    pub fn build(&self, width: u32, height: u32) -> HeightMap {
        HeightMap::from_fn(width, height, |x, z| self.sample(x, z))
    }
}

/// Carve a bowl of `depth` and `radius` cells centered on `(cx, cz)`.
///
/// Returns the rectangle of corners that changed, clipped to the map.
pub fn carve_crater(map: &mut HeightMap, cx: u32, cz: u32, radius: u32, depth: f32) -> Rect {
    let rect = Rect::new(
        cx.saturating_sub(radius),
        cz.saturating_sub(radius),
        (cx + radius).min(map.width()),
        (cz + radius).min(map.height()),
    );

    for z in rect.z1..=rect.z2 {
        for x in rect.x1..=rect.x2 {
            let dx = x as f32 - cx as f32;
            let dz = z as f32 - cz as f32;
            let falloff = 1.0 - (dx * dx + dz * dz).sqrt() / radius as f32;
            if falloff > 0.0 {
                map.set(x, z, map.get(x, z) - depth * falloff);
            }
        }
    }
    map.recompute_bounds();
    rect
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampler_is_deterministic() {
        let a = HeightFieldSampler::new(HeightFieldParams::default());
        let b = HeightFieldSampler::new(HeightFieldParams::default());
        for (x, z) in [(0, 0), (17, 300), (1023, 5)] {
            assert_eq!(a.sample(x, z), b.sample(x, z));
        }
    }

    #[test]
    fn test_height_field_crosses_sea_level() {
        let map = HeightFieldSampler::new(HeightFieldParams::default()).build(512, 512);
        assert!(map.min_height() < 0.0, "min {}", map.min_height());
        assert!(map.max_height() > 0.0, "max {}", map.max_height());
    }

    #[test]
    fn test_crater_lowers_center_only() {
        let mut map = HeightMap::flat(64, 64, 10.0);
        let rect = carve_crater(&mut map, 32, 32, 8, 20.0);

        assert_eq!(rect, Rect::new(24, 24, 40, 40));
        assert_eq!(map.get(32, 32), -10.0);
        assert_eq!(map.get(24, 32), 10.0);
        assert_eq!(map.get(0, 0), 10.0);
        assert_eq!(map.min_height(), -10.0);
    }

    #[test]
    fn test_crater_is_clipped_at_map_edge() {
        let mut map = HeightMap::flat(16, 16, 0.0);
        let rect = carve_crater(&mut map, 15, 1, 4, 1.0);
        assert_eq!(rect, Rect::new(11, 0, 16, 5));
    }
}
