//! Corner height fields sampled by patches.

/// Read access to terrain heights at grid corners.
///
/// Implementations must return stable values for the duration of one
/// variance or tessellation pass.
pub trait HeightSource {
    /// Height at global corner `(x, z)`.
    fn height_at(&self, x: u32, z: u32) -> f32;
}

impl<F> HeightSource for F
where
    F: Fn(u32, u32) -> f32,
{
    fn height_at(&self, x: u32, z: u32) -> f32 {
        self(x, z)
    }
}

/// Inclusive rectangle of grid corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x1: u32,
    pub z1: u32,
    pub x2: u32,
    pub z2: u32,
}

impl Rect {
    pub fn new(x1: u32, z1: u32, x2: u32, z2: u32) -> Self {
        Self {
            x1: x1.min(x2),
            z1: z1.min(z2),
            x2: x1.max(x2),
            z2: z1.max(z2),
        }
    }

    /// Overlap with `other`, or `None` if they are disjoint.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x1.max(other.x1);
        let z1 = self.z1.max(other.z1);
        let x2 = self.x2.min(other.x2);
        let z2 = self.z2.min(other.z2);
        (x1 <= x2 && z1 <= z2).then_some(Rect { x1, z1, x2, z2 })
    }

    /// Shift the rectangle so that `(x, z)` becomes the origin.
    ///
    /// The rectangle must lie at or beyond `(x, z)` on both axes.
    pub fn relative_to(&self, x: u32, z: u32) -> Rect {
        Rect {
            x1: self.x1 - x,
            z1: self.z1 - z,
            x2: self.x2 - x,
            z2: self.z2 - z,
        }
    }
}

/// Owned grid of `(width + 1) * (height + 1)` corner heights.
///
/// `width` and `height` count cells. Min and max are kept as conservative
/// bounds while editing; [`HeightMap::recompute_bounds`] tightens them.
#[derive(Clone, Debug)]
pub struct HeightMap {
    width: u32,
    height: u32,
    heights: Vec<f32>,
    min: f32,
    max: f32,
    sum: f64,
}

impl HeightMap {
    /// A map with every corner at height `h`.
    pub fn flat(width: u32, height: u32, h: f32) -> Self {
        Self::from_fn(width, height, |_, _| h)
    }

    /// Build a map by sampling `f(x, z)` at every corner.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut heights = Vec::with_capacity(((width + 1) * (height + 1)) as usize);
        for z in 0..=height {
            for x in 0..=width {
                heights.push(f(x, z));
            }
        }
        let mut map = Self {
            width,
            height,
            heights,
            min: 0.0,
            max: 0.0,
            sum: 0.0,
        };
        map.recompute_bounds();
        map
    }

    /// Number of cells along x.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of cells along z.
    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, z: u32) -> usize {
        debug_assert!(x <= self.width && z <= self.height);
        (z * (self.width + 1) + x) as usize
    }

    pub fn get(&self, x: u32, z: u32) -> f32 {
        self.heights[self.index(x, z)]
    }

    /// Overwrite one corner height.
    pub fn set(&mut self, x: u32, z: u32, h: f32) {
        let index = self.index(x, z);
        let old = std::mem::replace(&mut self.heights[index], h);
        self.sum += f64::from(h) - f64::from(old);
        self.min = self.min.min(h);
        self.max = self.max.max(h);
    }

    /// Recompute exact min, max and mean from every sample.
    pub fn recompute_bounds(&mut self) {
        let (min, max, sum) = self.heights.iter().fold(
            (f32::MAX, f32::MIN, 0.0f64),
            |(min, max, sum), &h| (min.min(h), max.max(h), sum + f64::from(h)),
        );
        self.min = min;
        self.max = max;
        self.sum = sum;
    }

    pub fn min_height(&self) -> f32 {
        self.min
    }

    pub fn max_height(&self) -> f32 {
        self.max
    }

    pub fn mean_height(&self) -> f32 {
        (self.sum / self.heights.len() as f64) as f32
    }

    /// Rectangle covering every corner of the map.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }
}

impl HeightSource for HeightMap {
    fn height_at(&self, x: u32, z: u32) -> f32 {
        self.get(x, z)
    }
}
