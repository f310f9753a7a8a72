//! Boundary between patches and whatever uploads and draws their geometry.
//!
//! A renderer sees three buffers per patch: static grid vertices (re-sent
//! after height edits), a dynamic index list (re-sent after each
//! tessellation) and the border skirt. Uploads for a patch always precede its
//! draw calls within a frame.

use crate::visibility::TileCoord;

/// Vertex of a border skirt: position plus RGBA color whose alpha fades
/// the skirt out towards its bottom edge.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BorderVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

static_assertions::assert_eq_size!(BorderVertex, [u8; 16]);

impl BorderVertex {
    pub const OPAQUE: [u8; 4] = [255, 255, 255, 255];
    pub const TRANSPARENT: [u8; 4] = [255, 255, 255, 0];

    pub fn new(position: [f32; 3], color: [u8; 4]) -> Self {
        Self { position, color }
    }
}

/// Upload and draw surface for patch geometry.
pub trait PatchRenderer {
    /// Replace the patch's static vertex buffer (`x, y, z` triples).
    fn upload_vertices(&mut self, tile: TileCoord, vertices: &[f32]);

    /// Replace the patch's triangle index buffer.
    fn upload_indices(&mut self, tile: TileCoord, indices: &[u32]);

    /// Replace the patch's border skirt vertices (a triangle list).
    fn upload_border(&mut self, tile: TileCoord, vertices: &[BorderVertex]);

    /// Draw the patch's indexed triangles.
    fn draw_patch(&mut self, tile: TileCoord, vertex_count: usize, index_count: usize);

    /// Draw the patch's border skirt.
    fn draw_border(&mut self, tile: TileCoord, vertex_count: usize);
}

/// One call received by a [`RecordingRenderer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderCall {
    UploadVertices { tile: TileCoord, bytes: usize },
    UploadIndices { tile: TileCoord, bytes: usize },
    UploadBorder { tile: TileCoord, bytes: usize },
    DrawPatch { tile: TileCoord, index_count: usize },
    DrawBorder { tile: TileCoord, vertex_count: usize },
}

impl RenderCall {
    pub fn tile(&self) -> TileCoord {
        match *self {
            RenderCall::UploadVertices { tile, .. }
            | RenderCall::UploadIndices { tile, .. }
            | RenderCall::UploadBorder { tile, .. }
            | RenderCall::DrawPatch { tile, .. }
            | RenderCall::DrawBorder { tile, .. } => tile,
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            RenderCall::DrawPatch { .. } | RenderCall::DrawBorder { .. }
        )
    }
}

/// Headless renderer that records every call and counts uploaded bytes.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    calls: Vec<RenderCall>,
    uploaded_bytes: usize,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[RenderCall] {
        &self.calls
    }

    pub fn uploaded_bytes(&self) -> usize {
        self.uploaded_bytes
    }

    pub fn draw_count(&self) -> usize {
        self.calls.iter().filter(|call| call.is_draw()).count()
    }

    /// Forget recorded calls, keeping the byte total.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn record_upload(&mut self, bytes: usize, call: RenderCall) {
        self.uploaded_bytes += bytes;
        self.calls.push(call);
    }
}

impl PatchRenderer for RecordingRenderer {
    fn upload_vertices(&mut self, tile: TileCoord, vertices: &[f32]) {
        let bytes = bytemuck::cast_slice::<f32, u8>(vertices).len();
        self.record_upload(bytes, RenderCall::UploadVertices { tile, bytes });
    }

    fn upload_indices(&mut self, tile: TileCoord, indices: &[u32]) {
        let bytes = bytemuck::cast_slice::<u32, u8>(indices).len();
        self.record_upload(bytes, RenderCall::UploadIndices { tile, bytes });
    }

    fn upload_border(&mut self, tile: TileCoord, vertices: &[BorderVertex]) {
        let bytes = bytemuck::cast_slice::<BorderVertex, u8>(vertices).len();
        self.record_upload(bytes, RenderCall::UploadBorder { tile, bytes });
    }

    fn draw_patch(&mut self, tile: TileCoord, _vertex_count: usize, index_count: usize) {
        self.calls.push(RenderCall::DrawPatch { tile, index_count });
    }

    fn draw_border(&mut self, tile: TileCoord, vertex_count: usize) {
        self.calls.push(RenderCall::DrawBorder { tile, vertex_count });
    }
}
