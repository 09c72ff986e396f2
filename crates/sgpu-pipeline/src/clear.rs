use crate::framebuffer::FrameBuffer;
use crate::state::PipelineState;
use sgpu_formats::format::PixelFormat;
use sgpu_math::Vec4;

/// Pixels covered by viewport ∩ scissor (when enabled), clamped to the
/// attachment extent. `None` when the region is empty.
fn clear_region(
    state: &PipelineState,
    width: u32,
    height: u32,
) -> Option<(u32, u32, u32, u32)> {
    let w = width as i32;
    let h = height as i32;

    let mut x0 = state.viewport.x.clamp(0, w);
    let mut y0 = state.viewport.y.clamp(0, h);
    let mut x1 = (state.viewport.x + state.viewport.width).clamp(0, w);
    let mut y1 = (state.viewport.y + state.viewport.height).clamp(0, h);

    if state.scissor_test_enabled {
        x0 = x0.max(state.scissor.x.clamp(0, w));
        y0 = y0.max(state.scissor.y.clamp(0, h));
        x1 = x1.min((state.scissor.x + state.scissor.width).clamp(0, w));
        y1 = y1.min((state.scissor.y + state.scissor.height).clamp(0, h));
    }

    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

/// Clears the color attachment a draw buffer slot maps to, honoring the
/// slot's color mask. Unmapped or detached slots are ignored.
pub fn clear_color_attachment(
    target: &mut FrameBuffer,
    state: &PipelineState,
    slot: usize,
    color: Vec4,
) {
    let Some(index) = target.draw_slots.get(slot).copied().flatten() else {
        return;
    };
    let Some(attachment) = target.color_attachments[index].as_mut() else {
        return;
    };
    let Some((x0, y0, x1, y1)) = clear_region(state, attachment.width(), attachment.height())
    else {
        return;
    };

    let mask = state.draw_buffers[slot].color_mask;
    for y in y0..y1 {
        for x in x0..x1 {
            attachment.write_color_masked(x, y, color, mask);
        }
    }
}

/// Clears the depth half of the depth-stencil attachment, or the whole pixel
/// on depth-only attachments.
pub fn clear_depth_attachment(target: &mut FrameBuffer, state: &PipelineState, depth: f32) {
    let is_packed = matches!(
        target.depth_stencil.as_ref().map(|a| a.format()),
        Some(PixelFormat::DepthStencil)
    );
    if is_packed {
        clear_depth_stencil_attachment(target, state, true, false, depth, 0);
        return;
    }

    let Some(attachment) = target.depth_stencil.as_mut() else {
        return;
    };
    let Some((x0, y0, x1, y1)) = clear_region(state, attachment.width(), attachment.height())
    else {
        return;
    };

    for y in y0..y1 {
        for x in x0..x1 {
            attachment.write_depth_stencil(x, y, depth, 0);
        }
    }
}

/// Clears either or both halves of a packed depth-stencil attachment.
/// Depth-only clears preserve the stencil byte and vice versa, and stencil
/// clears are filtered through the front stencil write mask (clears are not
/// face-aware).
pub fn clear_depth_stencil_attachment(
    target: &mut FrameBuffer,
    state: &PipelineState,
    clear_depth: bool,
    clear_stencil: bool,
    depth: f32,
    stencil: u8,
) {
    let stencil_mask = state.stencil[0].write_mask;

    let Some(attachment) = target.depth_stencil.as_mut() else {
        return;
    };
    if attachment.format() != PixelFormat::DepthStencil {
        return;
    }
    let Some((x0, y0, x1, y1)) = clear_region(state, attachment.width(), attachment.height())
    else {
        return;
    };

    for y in y0..y1 {
        for x in x0..x1 {
            let (old_depth, old_stencil) = attachment.read_depth_stencil(x, y);
            let new_depth = if clear_depth { depth } else { old_depth };
            let new_stencil = if clear_stencil {
                (old_stencil & !stencil_mask) | (stencil & stencil_mask)
            } else {
                old_stencil
            };
            attachment.write_depth_stencil(x, y, new_depth, new_stencil);
        }
    }
}
