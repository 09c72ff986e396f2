use crate::framebuffer::FrameBuffer;
use crate::state::{BlendFactor, PipelineState, PolygonMode, DEPTH_BITS};
use crate::tile::TileLockGrid;
use sgpu_formats::format::PixelFormat;
use sgpu_formats::pixel;
use sgpu_math::Vec4;

/// Per-pixel operations of the output merger, shared read-only by every
/// wave-2 worker. All attachment mutation goes through the tile locks.
pub struct PixelOps<'a> {
    pub state: &'a PipelineState,
    pub target: &'a FrameBuffer,
    pub locks: &'a TileLockGrid,
}

impl PixelOps<'_> {
    /// When scissoring is enabled, the pixel containing `(x, y)` must lie in
    /// both the viewport and the scissor rectangle. Always passes otherwise.
    pub fn scissor_test(&self, x: f32, y: f32) -> bool {
        if !self.state.scissor_test_enabled {
            return true;
        }
        let px = x.floor() as i32;
        let py = y.floor() as i32;
        self.state.viewport.contains(px, py) && self.state.scissor.contains(px, py)
    }

    /// Polygon offset: `depth + slope * factor + r * units`, clamped to
    /// [0, 1], gated by the offset enable matching the rasterization mode.
    fn apply_depth_offset(&self, depth: f32, depth_slope: f32, mode: PolygonMode) -> f32 {
        let enabled = match mode {
            PolygonMode::Fill => self.state.fill_offset_enabled,
            PolygonMode::Line => self.state.line_offset_enabled,
            PolygonMode::Point => self.state.point_offset_enabled,
        };
        if !enabled {
            return depth;
        }

        let r = 1.0 / (1u32 << DEPTH_BITS) as f32;
        let bias = depth_slope * self.state.depth_factor + r * self.state.depth_unit;
        (depth + bias).clamp(0.0, 1.0)
    }

    /// Depth/stencil test and update for the pixel containing `(x, y)`.
    ///
    /// The packed pixel is read, tested and written back in one critical
    /// section of the depth tile lock, so concurrent workers observe a
    /// serializable history per pixel. Returns whether the fragment
    /// survives. Without a depth-stencil attachment every fragment passes;
    /// on depth-only attachments the stencil test is a no-op pass.
    pub fn depth_stencil_test(
        &self,
        x: f32,
        y: f32,
        depth: f32,
        depth_slope: f32,
        mode: PolygonMode,
        is_front: bool,
    ) -> bool {
        let Some(attachment) = &self.target.depth_stencil else {
            return true;
        };

        let px = x.floor() as i32;
        let py = y.floor() as i32;
        if !attachment.contains(px, py) {
            return false;
        }
        let (px, py) = (px as u32, py as u32);

        let has_stencil = attachment.format() == PixelFormat::DepthStencil;
        let stencil_enabled = self.state.stencil_test_enabled && has_stencil;
        if !self.state.depth_test_enabled && !stencil_enabled {
            return true;
        }

        let depth = self.apply_depth_offset(depth, depth_slope, mode);
        let face = &self.state.stencil[if is_front { 0 } else { 1 }];

        let _guard = self.locks.depth_lock(px, py).lock();
        // Safe under the lock: the depth table serializes every accessor of
        // this pixel.
        let bytes = unsafe { attachment.pixel_slice_unchecked(px, py) };

        let (old_depth, old_stencil) = if has_stencil {
            pixel::decode_depth_stencil(bytes)
        } else {
            (pixel::decode_depth(bytes, attachment.channel_type()), 0)
        };

        let stencil_pass = if stencil_enabled {
            let reference = face.reference & face.func_mask;
            let value = old_stencil & face.func_mask;
            face.func.compare(reference, value)
        } else {
            true
        };

        // A stencil failure skips the depth compare outright.
        let depth_pass = if !stencil_pass {
            false
        } else if self.state.depth_test_enabled {
            self.state.depth_func.compare(depth, old_depth)
        } else {
            true
        };

        let mut new_stencil = old_stencil;
        if stencil_enabled && face.write_mask != 0 {
            let op = if !stencil_pass {
                face.sfail_op
            } else if !depth_pass {
                face.dpfail_op
            } else {
                face.dppass_op
            };
            let result = op.apply(old_stencil, face.reference);
            new_stencil = (old_stencil & !face.write_mask) | (result & face.write_mask);
        }

        let new_depth =
            if self.state.depth_test_enabled && depth_pass && self.state.depth_write_enabled {
                depth
            } else {
                old_depth
            };

        if has_stencil {
            pixel::encode_depth_stencil(bytes, new_depth, new_stencil);
        } else {
            pixel::encode_depth(bytes, new_depth, attachment.channel_type());
        }

        stencil_pass && depth_pass
    }

    /// Blends and writes one shaded color into the attachment the draw slot
    /// maps to. Fragments targeting an unmapped slot or landing outside the
    /// attachment are silently dropped.
    pub fn write_color(&self, x: f32, y: f32, color: Vec4, slot: usize) {
        let Some((attachment_index, attachment)) = self.target.draw_attachment(slot) else {
            return;
        };

        let px = x.floor() as i32;
        let py = y.floor() as i32;
        if !attachment.contains(px, py) {
            return;
        }
        let (px, py) = (px as u32, py as u32);

        let draw_buffer = &self.state.draw_buffers[slot];

        let _guard = self.locks.color_lock(attachment_index, px, py).lock();
        // Safe under the lock: the attachment's color table serializes every
        // accessor of this pixel.
        let bytes = unsafe { attachment.pixel_slice_unchecked(px, py) };

        let dst = pixel::decode_color(bytes, attachment.format(), attachment.channel_type());

        let final_color = if draw_buffer.blend_enabled {
            self.blend(color, dst)
        } else {
            color
        };

        pixel::encode_color_masked(
            bytes,
            final_color,
            attachment.format(),
            attachment.channel_type(),
            draw_buffer.color_mask,
        );
    }

    /// The full factor/equation matrix. The result is not clamped; the
    /// attachment's channel type dictates truncation on encode.
    fn blend(&self, src: Vec4, dst: Vec4) -> Vec4 {
        let mut out = Vec4::ZERO;
        for c in 0..3 {
            let sf = self.blend_factor(self.state.blend_src_rgb, c, src, dst);
            let df = self.blend_factor(self.state.blend_dst_rgb, c, src, dst);
            out[c] = self.state.blend_op_rgb.apply(src[c] * sf, dst[c] * df);
        }

        let sf = self.blend_factor(self.state.blend_src_alpha, 3, src, dst);
        let df = self.blend_factor(self.state.blend_dst_alpha, 3, src, dst);
        out.w = self.state.blend_op_alpha.apply(src.w * sf, dst.w * df);

        out
    }

    fn blend_factor(&self, factor: BlendFactor, channel: usize, src: Vec4, dst: Vec4) -> f32 {
        let constant = self.state.blend_constant;
        match factor {
            BlendFactor::Zero => 0.0,
            BlendFactor::One => 1.0,
            BlendFactor::SrcColor => src[channel],
            BlendFactor::OneMinusSrcColor => 1.0 - src[channel],
            BlendFactor::DstColor => dst[channel],
            BlendFactor::OneMinusDstColor => 1.0 - dst[channel],
            BlendFactor::SrcAlpha => src.w,
            BlendFactor::OneMinusSrcAlpha => 1.0 - src.w,
            BlendFactor::DstAlpha => dst.w,
            BlendFactor::OneMinusDstAlpha => 1.0 - dst.w,
            BlendFactor::ConstantColor => constant[channel],
            BlendFactor::OneMinusConstantColor => 1.0 - constant[channel],
            BlendFactor::ConstantAlpha => constant.w,
            BlendFactor::OneMinusConstantAlpha => 1.0 - constant.w,
            BlendFactor::SrcAlphaSaturate => {
                if channel == 3 {
                    1.0
                } else {
                    src.w.min(1.0 - dst.w)
                }
            }
        }
    }
}
