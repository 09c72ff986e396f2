use crate::device::{Capability, Device, DeviceCreateInfo, DEFAULT_FRAMEBUFFER};
use crate::error::DeviceCreateError;
use sgpu_formats::attachment::AttachmentCreateError;
use sgpu_formats::format::{ChannelType, PixelFormat};
use sgpu_math::{vec4, Vec4};
use sgpu_pipeline::assemble::IndexSlice;
use sgpu_pipeline::state::{
    BlendFactor, ClearFlags, CompareOp, ErrorCode, PolygonMode, PrimitiveTopology, StencilFaces,
    StencilOp,
};
use sgpu_pipeline::varying::{Fragment, FragmentOutputs, Varying};

fn rgba8_device(width: u32, height: u32) -> Device {
    // Idempotent; whichever test runs first installs the logger.
    sgpu_log::init(sgpu_log::LevelFilter::Warn);
    Device::new(DeviceCreateInfo::new(
        width,
        height,
        PixelFormat::Rgba,
        ChannelType::UNorm8,
    ))
    .unwrap()
}

fn rgba32f_device(width: u32, height: u32) -> Device {
    sgpu_log::init(sgpu_log::LevelFilter::Warn);
    Device::new(DeviceCreateInfo::new(
        width,
        height,
        PixelFormat::Rgba,
        ChannelType::F32,
    ))
    .unwrap()
}

/// Clip-space position that lands on screen coordinate `(x, y)` with the
/// given depth, assuming a full-target viewport and the default depth range.
fn clip_at(x: f32, y: f32, depth: f32, width: u32, height: u32) -> Vec4 {
    let ndc_x = x / width as f32 * 2.0 - 1.0;
    let ndc_y = -(y / height as f32 * 2.0 - 1.0);
    let ndc_z = depth * 2.0 - 1.0;
    vec4(ndc_x, ndc_y, ndc_z, 1.0)
}

fn positions_shader(positions: Vec<Vec4>) -> impl Fn(u32) -> Varying + Sync {
    move |index: u32| -> Varying {
        let mut v = Varying::default();
        v.clip_coord = positions[index as usize];
        v
    }
}

fn flat_color_shader(color: Vec4) -> impl Fn(&Fragment, &mut FragmentOutputs) + Sync {
    move |_: &Fragment, out: &mut FragmentOutputs| {
        out.set(0, color);
    }
}

fn painted_pixels(device: &Device, background: Vec4) -> Vec<(u32, u32, Vec4)> {
    let mut painted = Vec::new();
    for y in 0..device.height() {
        for x in 0..device.width() {
            let color = device.read_color(x, y).unwrap();
            if color != background {
                painted.push((x, y, color));
            }
        }
    }
    painted
}

// ======================================================
// Initialization
// ======================================================

#[test]
fn create_rejects_bad_dimensions() {
    let result = Device::new(DeviceCreateInfo::new(
        0,
        64,
        PixelFormat::Rgba,
        ChannelType::UNorm8,
    ));
    assert!(matches!(
        result,
        Err(DeviceCreateError::Attachment(
            AttachmentCreateError::InvalidDimensions(0, 64)
        ))
    ));
}

#[test]
fn create_rejects_non_color_format() {
    let result = Device::new(DeviceCreateInfo::new(
        64,
        64,
        PixelFormat::DepthStencil,
        ChannelType::UNorm8,
    ));
    assert!(matches!(
        result,
        Err(DeviceCreateError::InvalidColorFormat(
            PixelFormat::DepthStencil
        ))
    ));
}

#[test]
fn initial_state_follows_gl_defaults() {
    let device = rgba8_device(32, 16);
    let state = device.state();
    assert_eq!(state.viewport.width, 32);
    assert_eq!(state.viewport.height, 16);
    assert!(!state.depth_test_enabled);
    assert!(state.depth_write_enabled);
    assert_eq!(state.depth_func, CompareOp::Less);
    assert!(!state.scissor_test_enabled);
    assert!(!state.stencil_test_enabled);
    assert!(!state.cull_enabled);
    assert_eq!(state.clear_depth, 1.0);
    assert_eq!(state.error, ErrorCode::NoError);
    // The internally allocated depth-stencil attachment starts zero-filled.
    assert_eq!(device.read_depth_stencil(0, 0), Some((0.0, 0)));
}

// ======================================================
// Sticky errors
// ======================================================

#[test]
fn sticky_error_suppresses_until_taken() {
    let mut device = rgba8_device(8, 8);

    device.set_viewport(0, 0, -1, 8);
    assert_eq!(device.error(), ErrorCode::InvalidValue);

    // Suppressed while the error is pending.
    device.set_clear_color(Vec4::ONE);
    assert_eq!(device.state().clear_color, Vec4::ZERO);
    device.clear(ClearFlags::COLOR);
    assert_eq!(device.read_color(0, 0), Some(Vec4::ZERO));

    assert_eq!(device.take_error(), ErrorCode::InvalidValue);
    assert_eq!(device.error(), ErrorCode::NoError);

    // Re-armed.
    device.set_clear_color(Vec4::ONE);
    assert_eq!(device.state().clear_color, Vec4::ONE);
}

#[test]
fn first_error_wins() {
    let mut device = rgba8_device(8, 8);
    device.set_viewport(0, 0, -1, 8);
    device.set_line_width(0.0);
    assert_eq!(device.take_error(), ErrorCode::InvalidValue);
    device.set_line_width(0.0);
    assert_eq!(device.error(), ErrorCode::InvalidValue);
}

// ======================================================
// Clears
// ======================================================

#[test]
fn full_screen_red_clear() {
    let mut device = rgba8_device(128, 64);
    device.set_clear_color(vec4(1.0, 0.0, 0.0, 1.0));
    device.clear(ClearFlags::COLOR);

    for y in 0..64 {
        for x in 0..128 {
            assert_eq!(device.read_color(x, y), Some(vec4(1.0, 0.0, 0.0, 1.0)));
        }
    }
}

#[test]
fn scissored_clear_touches_intersection_only() {
    let mut device = rgba8_device(8, 8);
    device.set_viewport(1, 1, 6, 6);
    device.enable(Capability::ScissorTest);
    device.set_scissor(3, 3, 4, 4);
    device.set_clear_color(vec4(0.0, 0.0, 1.0, 1.0));
    device.clear(ClearFlags::COLOR);

    for y in 0..8 {
        for x in 0..8 {
            let expected = if (3..7).contains(&x) && (3..7).contains(&y) {
                vec4(0.0, 0.0, 1.0, 1.0)
            } else {
                Vec4::ZERO
            };
            assert_eq!(device.read_color(x, y), Some(expected), "pixel ({x}, {y})");
        }
    }
}

#[test]
fn stencil_clear_on_depth_only_attachment_is_an_error() {
    let mut device = rgba8_device(8, 8);
    let fb = device.create_framebuffer();
    device.bind_framebuffer(fb);
    device.attach_color(0, 8, 8, PixelFormat::Rgba, ChannelType::UNorm8);
    device.attach_depth(8, 8);
    device.set_draw_buffers(&[Some(0)]);

    device.clear(ClearFlags::DEPTH);
    assert_eq!(device.error(), ErrorCode::NoError);

    device.clear(ClearFlags::STENCIL);
    assert_eq!(device.take_error(), ErrorCode::InvalidOperation);
}

// ======================================================
// Triangle scenarios
// ======================================================

#[test]
fn ccw_front_triangle_renders_front_fragments() {
    let mut device = rgba32f_device(64, 64);
    device.enable(Capability::CullFace);
    device.enable(Capability::DepthTest);
    device.set_depth_func(CompareOp::Always);

    let positions = vec![
        clip_at(10.0, 10.0, 0.2, 64, 64),
        clip_at(22.0, 45.0, 0.5, 64, 64),
        clip_at(50.0, 14.0, 0.8, 64, 64),
    ];
    let vs = positions_shader(positions);
    let fs = |fragment: &Fragment, out: &mut FragmentOutputs| {
        // Encode facing into the output so it is observable.
        let color = if fragment.is_front {
            vec4(0.0, 1.0, 0.0, 1.0)
        } else {
            vec4(1.0, 0.0, 0.0, 1.0)
        };
        out.set(0, color);
    };
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 3, &vs, &fs);
    assert_eq!(device.error(), ErrorCode::NoError);

    let painted = painted_pixels(&device, Vec4::ZERO);
    assert!(painted.len() >= 20);
    for &(x, y, color) in &painted {
        assert_eq!(color, vec4(0.0, 1.0, 0.0, 1.0), "pixel ({x}, {y})");
        assert!((10..=50).contains(&x));
        assert!((10..=45).contains(&y));

        let (depth, _) = device.read_depth_stencil(x, y).unwrap();
        assert!(depth >= 0.2 - 1e-4 && depth <= 0.8 + 1e-4);
    }
}

#[test]
fn cw_triangle_is_back_culled() {
    let mut device = rgba32f_device(64, 64);
    device.enable(Capability::CullFace);

    let positions = vec![
        clip_at(10.0, 10.0, 0.2, 64, 64),
        clip_at(50.0, 14.0, 0.8, 64, 64),
        clip_at(22.0, 45.0, 0.5, 64, 64),
    ];
    let vs = positions_shader(positions);
    let fs = flat_color_shader(Vec4::ONE);
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 3, &vs, &fs);

    assert!(painted_pixels(&device, Vec4::ZERO).is_empty());
}

#[test]
fn triangle_outside_frustum_is_clipped_away() {
    let mut device = rgba32f_device(32, 32);
    let positions = vec![
        vec4(2.0, 0.0, 0.0, 1.0),
        vec4(3.0, 0.0, 0.0, 1.0),
        vec4(2.5, 1.0, 0.0, 1.0),
    ];
    let vs = positions_shader(positions);
    let fs = flat_color_shader(Vec4::ONE);
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 3, &vs, &fs);

    assert_eq!(device.error(), ErrorCode::NoError);
    assert!(painted_pixels(&device, Vec4::ZERO).is_empty());
}

#[test]
fn polygon_mode_line_draws_the_outline_only() {
    let mut device = rgba32f_device(64, 64);
    device.set_polygon_mode(PolygonMode::Fill);

    let positions = vec![
        clip_at(8.0, 8.0, 0.5, 64, 64),
        clip_at(8.0, 40.0, 0.5, 64, 64),
        clip_at(40.0, 8.0, 0.5, 64, 64),
    ];
    let vs = positions_shader(positions.clone());
    let fs = flat_color_shader(Vec4::ONE);
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 3, &vs, &fs);
    let filled = painted_pixels(&device, Vec4::ZERO).len();

    let mut device = rgba32f_device(64, 64);
    device.set_polygon_mode(PolygonMode::Line);
    let vs = positions_shader(positions);
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 3, &vs, &fs);
    let outlined = painted_pixels(&device, Vec4::ZERO).len();

    assert!(outlined > 0);
    assert!(outlined < filled);
}

#[test]
fn polygon_mode_point_draws_the_vertices_only() {
    let mut device = rgba32f_device(64, 64);
    device.set_polygon_mode(PolygonMode::Point);
    // The point variant of the polygon offset must gate these fragments.
    device.enable(Capability::DepthTest);
    device.set_depth_func(CompareOp::Always);
    device.enable(Capability::PolygonOffsetPoint);
    device.set_polygon_offset(0.0, 4_194_304.0); // 2^22 units = 0.25 bias

    let positions = vec![
        clip_at(8.0, 8.0, 0.5, 64, 64),
        clip_at(8.0, 40.0, 0.5, 64, 64),
        clip_at(40.0, 8.0, 0.5, 64, 64),
    ];
    let vs = positions_shader(positions);
    let fs = flat_color_shader(Vec4::ONE);
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 3, &vs, &fs);
    assert_eq!(device.error(), ErrorCode::NoError);

    let painted = painted_pixels(&device, Vec4::ZERO);
    let pixels: Vec<(u32, u32)> = painted.iter().map(|&(x, y, _)| (x, y)).collect();
    // Exactly the three vertices, nothing in between (row-major read order).
    assert_eq!(pixels, vec![(8, 8), (40, 8), (8, 40)]);

    for &(x, y) in &pixels {
        let (depth, _) = device.read_depth_stencil(x, y).unwrap();
        assert!((depth - 0.75).abs() < 1e-5, "pixel ({x}, {y}): {depth}");
    }
}

// ======================================================
// Depth & stencil scenarios
// ======================================================

fn draw_point_at_depth(device: &mut Device, depth: f32) {
    let width = device.width();
    let height = device.height();
    let vs = move |_: u32| -> Varying {
        let mut v = Varying::default();
        v.clip_coord = clip_at(0.0, 0.0, depth, width, height);
        v
    };
    let fs = flat_color_shader(Vec4::ONE);
    device.draw_arrays(PrimitiveTopology::PointList, 0, 1, &vs, &fs);
}

#[test]
fn depth_test_less_keeps_the_nearest_write() {
    let mut device = rgba8_device(1, 1);
    device.enable(Capability::DepthTest);
    device.set_clear_depth(0.6);
    device.clear(ClearFlags::DEPTH);

    draw_point_at_depth(&mut device, 0.2);
    let (depth, _) = device.read_depth_stencil(0, 0).unwrap();
    assert!((depth - 0.2).abs() < 1e-6);

    draw_point_at_depth(&mut device, 0.8);
    let (depth, _) = device.read_depth_stencil(0, 0).unwrap();
    assert!((depth - 0.2).abs() < 1e-6);
}

#[test]
fn stencil_replace_applies_on_depth_fail() {
    let mut device = rgba8_device(1, 1);
    device.enable(Capability::DepthTest);
    device.enable(Capability::StencilTest);
    device.set_stencil_func(StencilFaces::FrontAndBack, CompareOp::Always, 0xAB, 0xFF);
    device.set_stencil_op(
        StencilFaces::FrontAndBack,
        StencilOp::Keep,
        StencilOp::Replace,
        StencilOp::Keep,
    );
    device.set_clear_depth(0.8);
    device.set_clear_stencil(0x10);
    device.clear(ClearFlags::DEPTH | ClearFlags::STENCIL);

    draw_point_at_depth(&mut device, 0.9);

    let (depth, stencil) = device.read_depth_stencil(0, 0).unwrap();
    assert_eq!(stencil, 0xAB);
    assert!((depth - 0.8).abs() < 1e-6);
    // The failed fragment never reached the color buffer.
    assert_eq!(device.read_color(0, 0), Some(Vec4::ZERO));
}

// ======================================================
// Blending scenarios
// ======================================================

#[test]
fn blend_one_zero_is_source_overwrite() {
    let mut device = rgba32f_device(4, 4);
    device.enable(Capability::Blend);
    device.set_clear_color(vec4(0.9, 0.8, 0.7, 0.6));
    device.clear(ClearFlags::COLOR);

    let positions = vec![
        clip_at(0.0, 0.0, 0.5, 4, 4),
        clip_at(0.0, 4.0, 0.5, 4, 4),
        clip_at(4.0, 0.0, 0.5, 4, 4),
    ];
    let vs = positions_shader(positions);
    let fs = flat_color_shader(vec4(0.2, 0.3, 0.4, 0.5));
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 3, &vs, &fs);

    assert_eq!(device.read_color(0, 0), Some(vec4(0.2, 0.3, 0.4, 0.5)));
}

#[test]
fn additive_blend_is_order_independent_across_workers() {
    // Eight coincident triangles in one draw: wave-2 tasks race on the same
    // pixels, but the tile locks serialize each pixel and One/One-Add makes
    // every interleaving sum to the same value.
    let mut device = rgba32f_device(32, 32);
    device.enable(Capability::Blend);
    device.set_blend_func(BlendFactor::One, BlendFactor::One);

    let corner = [
        clip_at(0.0, 0.0, 0.5, 32, 32),
        clip_at(0.0, 32.0, 0.5, 32, 32),
        clip_at(32.0, 0.0, 0.5, 32, 32),
    ];
    let positions: Vec<Vec4> = corner.iter().cycle().take(24).copied().collect();
    let vs = positions_shader(positions);
    let fs = flat_color_shader(Vec4::splat(0.125));
    device.draw_arrays(PrimitiveTopology::TriangleList, 0, 24, &vs, &fs);

    assert_eq!(device.read_color(0, 0), Some(Vec4::ONE));
    assert_eq!(device.read_color(15, 15), Some(Vec4::ONE));
    assert_eq!(device.read_color(31, 31), Some(Vec4::ZERO));
}

// ======================================================
// Indexed draws
// ======================================================

#[test]
fn indexed_quad_covers_its_area() {
    let mut device = rgba32f_device(32, 32);
    let positions = vec![
        clip_at(8.0, 8.0, 0.5, 32, 32),
        clip_at(24.0, 8.0, 0.5, 32, 32),
        clip_at(24.0, 24.0, 0.5, 32, 32),
        clip_at(8.0, 24.0, 0.5, 32, 32),
    ];
    let vs = positions_shader(positions);
    let fs = flat_color_shader(Vec4::ONE);
    let indices = [0u32, 1, 2, 0, 2, 3];
    device.draw_elements(
        PrimitiveTopology::TriangleList,
        IndexSlice::U32(&indices),
        4,
        &vs,
        &fs,
    );

    assert_eq!(device.error(), ErrorCode::NoError);
    // 16x16 pixel quad, each pixel covered exactly once.
    assert_eq!(painted_pixels(&device, Vec4::ZERO).len(), 256);
}

#[test]
fn index_overflow_fails_the_draw() {
    let mut device = rgba32f_device(8, 8);
    let positions = vec![Vec4::ZERO; 3];
    let vs = positions_shader(positions);
    let fs = flat_color_shader(Vec4::ONE);
    let indices = [0u16, 1, 9];
    device.draw_elements(
        PrimitiveTopology::TriangleList,
        IndexSlice::U16(&indices),
        3,
        &vs,
        &fs,
    );

    assert_eq!(device.take_error(), ErrorCode::InvalidOperation);
    assert!(painted_pixels(&device, Vec4::ZERO).is_empty());
}

// ======================================================
// Framebuffer objects
// ======================================================

#[test]
fn offscreen_framebuffer_round_trip() {
    let mut device = rgba8_device(8, 8);

    let fb = device.create_framebuffer();
    assert_ne!(fb, DEFAULT_FRAMEBUFFER);
    device.bind_framebuffer(fb);
    device.attach_color(0, 16, 16, PixelFormat::Rgba, ChannelType::F32);
    device.attach_depth_stencil(16, 16);
    device.set_draw_buffers(&[Some(0)]);
    device.set_read_buffer(Some(0));
    device.set_viewport(0, 0, 16, 16);

    device.set_clear_color(vec4(0.0, 1.0, 0.0, 1.0));
    device.clear(ClearFlags::COLOR);
    assert_eq!(device.error(), ErrorCode::NoError);
    assert_eq!(device.read_color(15, 15), Some(vec4(0.0, 1.0, 0.0, 1.0)));

    // The default framebuffer is untouched.
    device.bind_framebuffer(DEFAULT_FRAMEBUFFER);
    assert_eq!(device.read_color(0, 0), Some(Vec4::ZERO));

    // Deleting the offscreen framebuffer while bound falls back to the
    // default one.
    device.bind_framebuffer(fb);
    device.delete_framebuffer(fb);
    assert_eq!(device.error(), ErrorCode::NoError);
    assert_eq!(device.read_color(0, 0), Some(Vec4::ZERO));
}

#[test]
fn default_framebuffer_attachments_are_fixed() {
    let mut device = rgba8_device(8, 8);
    device.attach_color(0, 8, 8, PixelFormat::Rgba, ChannelType::UNorm8);
    assert_eq!(device.take_error(), ErrorCode::InvalidOperation);
}

#[test]
fn binding_an_unknown_framebuffer_is_an_error() {
    let mut device = rgba8_device(8, 8);
    device.bind_framebuffer(42);
    assert_eq!(device.take_error(), ErrorCode::InvalidOperation);
}

#[test]
fn deleting_the_default_framebuffer_is_an_error() {
    let mut device = rgba8_device(8, 8);
    device.delete_framebuffer(DEFAULT_FRAMEBUFFER);
    assert_eq!(device.take_error(), ErrorCode::InvalidOperation);
}

// ======================================================
// Lines and strips
// ======================================================

#[test]
fn line_strip_connects_the_vertices() {
    let mut device = rgba32f_device(16, 16);
    let positions = vec![
        clip_at(1.0, 1.0, 0.5, 16, 16),
        clip_at(9.0, 1.0, 0.5, 16, 16),
        clip_at(9.0, 9.0, 0.5, 16, 16),
    ];
    let vs = positions_shader(positions);
    let fs = flat_color_shader(Vec4::ONE);
    device.draw_arrays(PrimitiveTopology::LineStrip, 0, 3, &vs, &fs);

    let painted = painted_pixels(&device, Vec4::ZERO);
    // Two 9-pixel runs sharing the corner pixel.
    assert_eq!(painted.len(), 17);
    assert!(painted.iter().any(|&(x, y, _)| (x, y) == (1, 1)));
    assert!(painted.iter().any(|&(x, y, _)| (x, y) == (9, 1)));
    assert!(painted.iter().any(|&(x, y, _)| (x, y) == (9, 9)));
}
