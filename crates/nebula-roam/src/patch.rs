//! A square terrain patch: its vertex grid, two binary triangle trees,
//! variance tables, and the index and skirt geometry generated from them.
//!
//! The trees' interior nodes live in a [`NodePool`] owned by the worker that
//! tessellates the patch; the patch only keeps its two base triangles. Every
//! call that walks the trees must therefore be given the same pool that was
//! used by the preceding [`Patch::tessellate`], and the patch must be
//! [`Patch::reset`] before that pool is rewound.

use glam::{IVec2, Vec3};

use crate::height::{HeightSource, Rect};
use crate::node::{NodeId, TriNode, TriShape};
use crate::pool::NodePool;
use crate::render::{BorderVertex, PatchRenderer};
use crate::tree::{TriTree, node_ref};
use crate::variance::VarianceTable;
use crate::visibility::{CameraKind, TileCoord, VisibilityStamps};

/// Height of the plane border skirts drop down to.
pub const SKIRT_DEPTH: f32 = -400.0;

/// Variance assumed for nodes deeper than the variance table; above the
/// split threshold so such nodes always subdivide.
const UNTRACKED_VARIANCE: f32 = 10.0;

/// Split threshold on the distance-weighted variance.
const SPLIT_THRESHOLD: f32 = 1.0;

/// Camera distance at which the LOD factor starts to fall off, relative to
/// the view radius.
const LOD_DISTANCE_SCALE: f32 = 300.0;

/// Fraction of the view radius that caps any single node's variance.
const VARIANCE_LIMIT_SCALE: f32 = 0.35;

/// Camera inputs for one tessellation pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodParams {
    pub camera_position: Vec3,
    pub view_radius: f32,
    /// Height assumed for every patch's center when measuring camera distance.
    pub mean_height: f32,
}

impl LodParams {
    /// Factor that shrinks variances with camera distance: 1.0 up to a
    /// distance of `view_radius / 300` world units, falling off as `1/d`
    /// beyond.
    pub fn distance_factor(&self, center: Vec3) -> f32 {
        let scaled = center.distance(self.camera_position) * (LOD_DISTANCE_SCALE / self.view_radius);
        1.0 / scaled.max(1.0)
    }

    /// Upper bound on any stored variance during this pass.
    pub fn variance_limit(&self) -> f32 {
        self.view_radius * VARIANCE_LIMIT_SCALE
    }
}

/// Buffers changed since they were last handed to a renderer.
#[derive(Clone, Copy, Debug, Default)]
struct PendingUploads {
    vertices: bool,
    indices: bool,
    border: bool,
}

/// One tile of the terrain.
#[derive(Debug)]
pub struct Patch {
    tile: TileCoord,
    /// Global corner coordinate of the patch's `(0, 0)` vertex.
    origin: IVec2,
    patch_size: i32,
    square_size: f32,

    roots: [TriNode; 2],
    variance: [VarianceTable; 2],

    /// `x, y, z` for each of the `(patch_size + 1)^2` grid corners.
    vertices: Vec<f32>,
    indices: Vec<u32>,
    border_vertices: Vec<BorderVertex>,

    variance_limit: f32,
    distance_factor: f32,
    is_dirty: bool,
    is_tessellated: bool,
    visibility: VisibilityStamps,
    pending: PendingUploads,
}

impl Patch {
    /// Lay out the vertex grid of `tile`, sample its heights and compute its
    /// variance tables.
    pub fn new(
        tile: TileCoord,
        patch_size: u32,
        variance_depth: u32,
        square_size: f32,
        source: &impl HeightSource,
    ) -> Self {
        let size = patch_size as i32;
        let origin = IVec2::new(tile.x as i32 * size, tile.z as i32 * size);

        let side = (patch_size + 1) as usize;
        let mut vertices = Vec::with_capacity(side * side * 3);
        for z in origin.y..=origin.y + size {
            for x in origin.x..=origin.x + size {
                vertices.extend_from_slice(&[x as f32 * square_size, 0.0, z as f32 * square_size]);
            }
        }

        let mut patch = Self {
            tile,
            origin,
            patch_size: size,
            square_size,
            roots: [TriNode::default(); 2],
            variance: [
                VarianceTable::new(variance_depth),
                VarianceTable::new(variance_depth),
            ],
            vertices,
            indices: Vec::new(),
            border_vertices: Vec::new(),
            variance_limit: f32::MAX,
            distance_factor: 1.0,
            is_dirty: true,
            is_tessellated: false,
            visibility: VisibilityStamps::default(),
            pending: PendingUploads::default(),
        };
        patch.reset();
        patch.update_height_map(source, patch.local_bounds());
        patch.compute_variance();
        patch
    }

    pub fn tile(&self) -> TileCoord {
        self.tile
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size as u32
    }

    /// Rectangle of every local corner.
    pub fn local_bounds(&self) -> Rect {
        let size = self.patch_size as u32;
        Rect::new(0, 0, size, size)
    }

    /// Rectangle of global corners covered by this patch.
    pub fn global_bounds(&self) -> Rect {
        let (x, z) = (self.origin.x as u32, self.origin.y as u32);
        let size = self.patch_size as u32;
        Rect::new(x, z, x + size, z + size)
    }

    /// World-space center of the patch at height `y`.
    pub fn center(&self, y: f32) -> Vec3 {
        let half = self.patch_size / 2;
        Vec3::new(
            (self.origin.x + half) as f32 * self.square_size,
            y,
            (self.origin.y + half) as f32 * self.square_size,
        )
    }

    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn border_vertices(&self) -> &[BorderVertex] {
        &self.border_vertices
    }

    pub fn variance(&self, root: NodeId) -> &VarianceTable {
        &self.variance[if root == NodeId::BASE_LEFT { 0 } else { 1 }]
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Distance factor applied during the last tessellation.
    pub fn distance_factor(&self) -> f32 {
        self.distance_factor
    }

    /// Variance ceiling applied during the last tessellation.
    pub fn variance_limit(&self) -> f32 {
        self.variance_limit
    }

    /// Base triangle or pooled node `id`, resolved against `pool`.
    pub fn node<'a>(&'a self, pool: &'a NodePool, id: NodeId) -> &'a TriNode {
        node_ref(&self.roots, pool, id)
    }

    fn local_index(&self, pos: IVec2) -> usize {
        (pos.y * (self.patch_size + 1) + pos.x) as usize
    }

    fn local_vertex(&self, pos: IVec2) -> [f32; 3] {
        let i = self.local_index(pos) * 3;
        [self.vertices[i], self.vertices[i + 1], self.vertices[i + 2]]
    }

    /// Merge the patch back to its two base triangles.
    pub fn reset(&mut self) {
        self.roots = [TriNode::default(); 2];
        self.roots[0].base_neighbor = Some(NodeId::BASE_RIGHT);
        self.roots[1].base_neighbor = Some(NodeId::BASE_LEFT);
    }

    /// Re-read the heights of the local corners inside `rect` (inclusive) and
    /// flag the variances for recomputation.
    pub fn update_height_map(&mut self, source: &impl HeightSource, rect: Rect) {
        let size = self.patch_size as u32;
        for z in rect.z1..=rect.z2.min(size) {
            for x in rect.x1..=rect.x2.min(size) {
                let index = self.local_index(IVec2::new(x as i32, z as i32));
                self.vertices[index * 3 + 1] = source.height_at(
                    self.origin.x as u32 + x,
                    self.origin.y as u32 + z,
                );
            }
        }
        self.pending.vertices = true;
        self.is_dirty = true;
    }

    /// Rebuild both variance tables from the current vertex heights.
    pub fn compute_variance(&mut self) {
        let size = self.patch_size;
        let [left, right] = &mut self.variance;
        let vertices = &self.vertices;
        let side = size + 1;
        let height = |pos: IVec2| vertices[((pos.y * side + pos.x) * 3 + 1) as usize];

        left.compute(TriShape::base_left(size), height);
        right.compute(TriShape::base_right(size), height);
        self.is_dirty = false;
    }

    /// Split `tri`, allocating children from `pool`.
    ///
    /// Returns `false` if the pool is exhausted.
    pub fn split(&mut self, pool: &mut NodePool, tri: NodeId) -> bool {
        TriTree::new(&mut self.roots, pool).split(tri)
    }

    /// Refine both trees for the camera in `lod`, drawing nodes from `pool`.
    ///
    /// Returns `false` if `pool` ran out of nodes, in which case the mesh is
    /// valid but coarser than requested.
    pub fn tessellate(&mut self, pool: &mut NodePool, lod: &LodParams) -> bool {
        self.is_tessellated = true;
        self.distance_factor = lod.distance_factor(self.center(lod.mean_height));
        self.variance_limit = lod.variance_limit();

        let pass = TessellationPass {
            patch_size: self.patch_size as f32,
            distance_factor: self.distance_factor,
            variance_limit: self.variance_limit,
        };
        let size = self.patch_size;
        let mut tree = TriTree::new(&mut self.roots, pool);
        pass.recurse(
            &mut tree,
            &self.variance[0],
            NodeId::BASE_LEFT,
            TriShape::base_left(size),
            1,
        );
        pass.recurse(
            &mut tree,
            &self.variance[1],
            NodeId::BASE_RIGHT,
            TriShape::base_right(size),
            1,
        );

        !pool.out_of_nodes()
    }

    /// Rebuild the index list: one `(apex, left, right)` triangle per leaf.
    pub fn generate_indices(&mut self, pool: &NodePool) {
        let mut indices = std::mem::take(&mut self.indices);
        indices.clear();
        let size = self.patch_size;
        self.collect_indices(pool, NodeId::BASE_LEFT, TriShape::base_left(size), &mut indices);
        self.collect_indices(pool, NodeId::BASE_RIGHT, TriShape::base_right(size), &mut indices);
        self.indices = indices;
        self.pending.indices = true;
    }

    fn collect_indices(&self, pool: &NodePool, tri: NodeId, shape: TriShape, out: &mut Vec<u32>) {
        match self.node(pool, tri).children() {
            None => out.extend(
                [shape.apex, shape.left, shape.right].map(|p| self.local_index(p) as u32),
            ),
            Some((left, right)) => {
                let (left_shape, right_shape) = shape.children();
                self.collect_indices(pool, left, left_shape, out);
                self.collect_indices(pool, right, right_shape, out);
            }
        }
    }

    /// Rebuild the skirt hanging from every patch edge that has no neighbor.
    ///
    /// Does nothing unless the patch was tessellated since the last call.
    pub fn generate_border_vertices(&mut self, pool: &NodePool) {
        if !self.is_tessellated {
            return;
        }
        self.is_tessellated = false;

        let mut border = std::mem::take(&mut self.border_vertices);
        border.clear();
        border.reserve((self.patch_size as usize + 1) * 12);

        let size = self.patch_size;
        let left_shape = TriShape::base_left(size);
        let right_shape = TriShape::base_right(size);
        let [base_left, base_right] = self.roots;

        let edges = [
            (base_left.left_neighbor, NodeId::BASE_LEFT, left_shape, true),
            (base_left.right_neighbor, NodeId::BASE_LEFT, left_shape, false),
            (base_right.right_neighbor, NodeId::BASE_RIGHT, right_shape, false),
            (base_right.left_neighbor, NodeId::BASE_RIGHT, right_shape, true),
        ];
        for (neighbor, root, shape, left_edge) in edges {
            if neighbor.is_none() {
                self.collect_border(pool, root, shape, EdgeWalk::root(left_edge), &mut border);
            }
        }

        self.border_vertices = border;
        self.pending.border = true;
    }

    fn collect_border(
        &self,
        pool: &NodePool,
        tri: NodeId,
        shape: TriShape,
        walk: EdgeWalk,
        out: &mut Vec<BorderVertex>,
    ) {
        let Some((left, right)) = self.node(pool, tri).children() else {
            // Base-level triangles lie on the edge with their hypotenuse-facing
            // leg; deeper ones with the leg picked by the walk.
            let (top_a, top_b) = match (walk.depth % 2 == 0, walk.left_edge) {
                (true, _) => (shape.left, shape.right),
                (false, true) => (shape.apex, shape.left),
                (false, false) => (shape.right, shape.apex),
            };
            self.push_skirt(top_a, top_b, out);
            return;
        };

        let (left_shape, right_shape) = shape.children();
        if walk.depth % 2 == 0 {
            // Both children touch the edge.
            self.collect_border(pool, left, left_shape, walk.descend(!walk.left_edge), out);
            self.collect_border(pool, right, right_shape, walk.descend(walk.left_edge), out);
        } else if walk.left_edge {
            self.collect_border(pool, left, left_shape, walk.descend(true), out);
        } else {
            self.collect_border(pool, right, right_shape, walk.descend(true), out);
        }
    }

    /// Two triangles dropping the edge `a`-`b` down to [`SKIRT_DEPTH`].
    fn push_skirt(&self, a: IVec2, b: IVec2, out: &mut Vec<BorderVertex>) {
        let top_a = self.local_vertex(a);
        let top_b = self.local_vertex(b);
        let low_a = [top_a[0], SKIRT_DEPTH, top_a[2]];
        let low_b = [top_b[0], SKIRT_DEPTH, top_b[2]];

        out.extend([
            BorderVertex::new(top_a, BorderVertex::OPAQUE),
            BorderVertex::new(low_a, BorderVertex::TRANSPARENT),
            BorderVertex::new(top_b, BorderVertex::OPAQUE),
            BorderVertex::new(low_a, BorderVertex::TRANSPARENT),
            BorderVertex::new(low_b, BorderVertex::TRANSPARENT),
            BorderVertex::new(top_b, BorderVertex::OPAQUE),
        ]);
    }

    /// Push every buffer changed since the last upload.
    pub fn upload(&mut self, renderer: &mut dyn PatchRenderer) {
        if std::mem::take(&mut self.pending.vertices) {
            renderer.upload_vertices(self.tile, &self.vertices);
        }
        if std::mem::take(&mut self.pending.indices) {
            renderer.upload_indices(self.tile, &self.indices);
        }
        if std::mem::take(&mut self.pending.border) {
            renderer.upload_border(self.tile, &self.border_vertices);
        }
    }

    pub fn draw(&self, renderer: &mut dyn PatchRenderer) {
        renderer.draw_patch(self.tile, self.vertex_count(), self.indices.len());
    }

    pub fn draw_border(&self, renderer: &mut dyn PatchRenderer) {
        if !self.border_vertices.is_empty() {
            renderer.draw_border(self.tile, self.border_vertices.len());
        }
    }

    pub fn stamp_visible(&mut self, kind: CameraKind, frame: u64) {
        self.visibility.stamp(kind, frame);
    }

    pub fn is_visible(&self, kind: CameraKind, frame: u64) -> bool {
        self.visibility.is_visible(kind, frame)
    }

    pub fn visibility(&self) -> &VisibilityStamps {
        &self.visibility
    }
}

/// Recursion state while walking one patch edge for skirt generation.
#[derive(Clone, Copy, Debug)]
struct EdgeWalk {
    depth: u32,
    /// At odd depths, which child lies on the edge.
    left_edge: bool,
}

impl EdgeWalk {
    fn root(left_edge: bool) -> Self {
        Self {
            depth: 1,
            left_edge,
        }
    }

    fn descend(self, left_edge: bool) -> Self {
        Self {
            depth: self.depth + 1,
            left_edge,
        }
    }
}

/// Constants of one [`Patch::tessellate`] call.
struct TessellationPass {
    patch_size: f32,
    distance_factor: f32,
    variance_limit: f32,
}

impl TessellationPass {
    fn recurse(
        &self,
        tree: &mut TriTree<'_>,
        table: &VarianceTable,
        tri: NodeId,
        shape: TriShape,
        node: usize,
    ) {
        if shape.is_indivisible() {
            return;
        }

        let variance = match table.get(node) {
            // Large cliffs would otherwise split at any distance.
            Some(stored) => {
                stored.min(self.variance_limit)
                    * self.patch_size
                    * shape.size() as f32
                    * self.distance_factor
            }
            None => UNTRACKED_VARIANCE,
        };
        if variance <= SPLIT_THRESHOLD {
            return;
        }

        tree.split(tri);

        if let Some((left, right)) = tree.node(tri).children() {
            let (left_shape, right_shape) = shape.children();
            self.recurse(tree, table, left, left_shape, node << 1);
            self.recurse(tree, table, right, right_shape, (node << 1) + 1);
        }
    }
}
