use crate::state::DRAW_BUFFER_SLOT_COUNT;
use sgpu_math::{Vec2, Vec3, Vec4};

/// The post-vertex-shader attribute record. Carried through clipping,
/// projection and interpolation; every field interpolates linearly in
/// barycentric coordinates and perspective-correctly in screen space.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Varying {
    /// Homogeneous clip-space position written by the vertex shader.
    pub clip_coord: Vec4,
    /// Normalized device coordinates, filled in by the perspective divide.
    pub ndc: Vec3,
    /// Screen-space position + depth, filled in by the viewport transform.
    pub viewport_coord: Vec3,
    pub world_pos: Vec3,
    pub view_pos: Vec3,
    pub normal: Vec3,
    /// xyz interpolates; w carries handedness and is flat-shaded.
    pub tangent: Vec4,
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub color0: Vec4,
    pub color1: Vec4,
}

impl Varying {
    /// Barycentric interpolation between two varyings. `bary` is `(1-t, t)`
    /// as produced by the clipper; the result lives in clip space and is not
    /// perspective corrected.
    pub fn lerp(a: &Varying, b: &Varying, bary: Vec2) -> Varying {
        Varying {
            clip_coord: a.clip_coord * bary.x + b.clip_coord * bary.y,
            ndc: a.ndc * bary.x + b.ndc * bary.y,
            viewport_coord: a.viewport_coord * bary.x + b.viewport_coord * bary.y,
            world_pos: a.world_pos * bary.x + b.world_pos * bary.y,
            view_pos: a.view_pos * bary.x + b.view_pos * bary.y,
            normal: a.normal * bary.x + b.normal * bary.y,
            tangent: a.tangent * bary.x + b.tangent * bary.y,
            uv0: a.uv0 * bary.x + b.uv0 * bary.y,
            uv1: a.uv1 * bary.x + b.uv1 * bary.y,
            color0: a.color0 * bary.x + b.color0 * bary.y,
            color1: a.color1 * bary.x + b.color1 * bary.y,
        }
    }
}

/// One candidate pixel, pre-output-merger.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Fragment {
    /// Pixel center, i.e. integer coordinates + 0.5.
    pub screen_coord: Vec2,
    /// Normalized [0, 1] depth.
    pub depth: f32,
    /// `max(|dz/dx|, |dz/dy|)` of the producing triangle; 0 for points and
    /// lines. Feeds the polygon offset.
    pub depth_slope: f32,
    pub world_pos: Vec3,
    pub view_pos: Vec3,
    pub normal: Vec3,
    pub tangent: Vec4,
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub color0: Vec4,
    pub color1: Vec4,
    pub is_front: bool,
}

/// Color outputs of one fragment shader invocation, one slot per draw
/// buffer. Slots the shader does not write are dropped by the output merger.
#[derive(Debug, Copy, Clone)]
pub struct FragmentOutputs {
    values: [Vec4; DRAW_BUFFER_SLOT_COUNT],
    written: u16,
}

impl FragmentOutputs {
    pub fn new() -> Self {
        Self {
            values: [Vec4::ZERO; DRAW_BUFFER_SLOT_COUNT],
            written: 0,
        }
    }

    /// Writes `color` to `slot`. Out-of-range slots are ignored.
    #[inline]
    pub fn set(&mut self, slot: usize, color: Vec4) {
        if slot < DRAW_BUFFER_SLOT_COUNT {
            self.values[slot] = color;
            self.written |= 1 << slot;
        }
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<Vec4> {
        if slot < DRAW_BUFFER_SLOT_COUNT && self.written & (1 << slot) != 0 {
            Some(self.values[slot])
        } else {
            None
        }
    }

    /// Forgets all written slots, keeping the allocation-free buffer for the
    /// next invocation.
    #[inline]
    pub fn reset(&mut self) {
        self.written = 0;
    }

    /// Iterates `(slot, color)` over the written slots in slot order.
    pub fn iter_written(&self) -> impl Iterator<Item = (usize, Vec4)> + '_ {
        (0..DRAW_BUFFER_SLOT_COUNT)
            .filter(move |slot| self.written & (1 << slot) != 0)
            .map(move |slot| (slot, self.values[slot]))
    }
}

impl Default for FragmentOutputs {
    fn default() -> Self {
        Self::new()
    }
}

/// The vertex stage seam: one invocation per vertex index, no shared mutable
/// capture.
pub trait VertexShader: Sync {
    fn main(&self, vertex_index: u32) -> Varying;
}

impl<F> VertexShader for F
where
    F: Fn(u32) -> Varying + Sync,
{
    #[inline]
    fn main(&self, vertex_index: u32) -> Varying {
        self(vertex_index)
    }
}

/// The fragment stage seam: one invocation per surviving fragment.
pub trait FragmentShader: Sync {
    fn main(&self, fragment: &Fragment, outputs: &mut FragmentOutputs);
}

impl<F> FragmentShader for F
where
    F: Fn(&Fragment, &mut FragmentOutputs) + Sync,
{
    #[inline]
    fn main(&self, fragment: &Fragment, outputs: &mut FragmentOutputs) {
        self(fragment, outputs)
    }
}
