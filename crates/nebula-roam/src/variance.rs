//! Per-patch variance tables: cached worst-case height error per tree node.
//!
//! Nodes are numbered in level order starting at 1 for the base triangle;
//! the children of node `n` are `2n` and `2n + 1`. Only nodes below
//! `1 << depth` are stored.

use glam::IVec2;

use crate::node::TriShape;

/// Smallest variance ever stored, so comparisons never see an exact zero.
pub const MIN_VARIANCE: f32 = 0.001;

/// Variance floor for triangles whose corners straddle sea level.
pub const SHORELINE_VARIANCE: f32 = 20.0;

/// Hypotenuse span below which the recursion stops refining.
const MIN_REFINED_SPAN: i32 = 4;

/// Variances for every stored node of one base triangle.
#[derive(Clone, Debug)]
pub struct VarianceTable {
    values: Vec<f32>,
}

impl VarianceTable {
    /// An all-zero table for nodes `0..(1 << depth)`.
    pub fn new(depth: u32) -> Self {
        Self {
            values: vec![0.0; 1 << depth],
        }
    }

    /// Number of addressable node indices.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored variance of `node`, or `None` beyond the table depth.
    pub fn get(&self, node: usize) -> Option<f32> {
        self.values.get(node).copied()
    }

    /// Recompute the table for a base triangle of `shape`, reading heights
    /// through `height`.
    pub fn compute(&mut self, shape: TriShape, height: impl Fn(IVec2) -> f32) {
        let corners = CornerHeights {
            left: height(shape.left),
            right: height(shape.right),
            apex: height(shape.apex),
        };
        self.recurse(shape, corners, 1, &height);
    }

    fn recurse(
        &mut self,
        shape: TriShape,
        corners: CornerHeights,
        node: usize,
        height: &impl Fn(IVec2) -> f32,
    ) -> f32 {
        let center = shape.center();
        let center_height = height(center);

        let mut variance = midpoint_variance(corners.left, corners.right, center_height);

        let span = shape.span();
        if span.x >= MIN_REFINED_SPAN || span.y >= MIN_REFINED_SPAN {
            let (left_shape, right_shape) = shape.children();
            let left_corners = CornerHeights {
                left: corners.apex,
                right: corners.left,
                apex: center_height,
            };
            let right_corners = CornerHeights {
                left: corners.right,
                right: corners.apex,
                apex: center_height,
            };

            let left = self.recurse(left_shape, left_corners, node << 1, height);
            let right = self.recurse(right_shape, right_corners, (node << 1) + 1, height);
            variance = variance.max(left).max(right);
        }

        let variance = variance.max(MIN_VARIANCE);
        if let Some(slot) = self.values.get_mut(node) {
            *slot = variance;
        }
        variance
    }
}

#[derive(Clone, Copy, Debug)]
struct CornerHeights {
    left: f32,
    right: f32,
    apex: f32,
}

/// Error of linearly interpolating the hypotenuse instead of sampling its
/// midpoint, boosted where the triangle crosses sea level.
pub fn midpoint_variance(left: f32, right: f32, center: f32) -> f32 {
    let variance = (center - (left + right) * 0.5).abs();
    if left * right < 0.0 || left * center < 0.0 || right * center < 0.0 {
        (variance * 1.5).max(SHORELINE_VARIANCE)
    } else {
        variance
    }
}
