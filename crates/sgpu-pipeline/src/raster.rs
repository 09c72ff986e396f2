use crate::merge::PixelOps;
use crate::state::{CullMode, FrontFace, PolygonMode};
use crate::varying::{Fragment, Varying};
use sgpu_math::{is_equal_approx, is_zero_approx, vec2, Vec2, Vec3, Vec4};
use std::ops::{Add, AddAssign, Mul, Sub};

/// The interpolated attribute set of a fragment, as one value so the
/// incremental accumulators stay readable. Tangent drops to xyz here; the
/// flat handedness is reattached from the provoking vertex on emit.
#[derive(Debug, Default, Copy, Clone)]
struct Attributes {
    world_pos: Vec3,
    view_pos: Vec3,
    normal: Vec3,
    tangent: Vec3,
    uv0: Vec2,
    uv1: Vec2,
    color0: Vec4,
    color1: Vec4,
}

impl Attributes {
    fn of(v: &Varying) -> Self {
        Self {
            world_pos: v.world_pos,
            view_pos: v.view_pos,
            normal: v.normal,
            tangent: v.tangent.truncate(),
            uv0: v.uv0,
            uv1: v.uv1,
            color0: v.color0,
            color1: v.color1,
        }
    }
}

impl Add for Attributes {
    type Output = Attributes;

    fn add(self, o: Attributes) -> Attributes {
        Attributes {
            world_pos: self.world_pos + o.world_pos,
            view_pos: self.view_pos + o.view_pos,
            normal: self.normal + o.normal,
            tangent: self.tangent + o.tangent,
            uv0: self.uv0 + o.uv0,
            uv1: self.uv1 + o.uv1,
            color0: self.color0 + o.color0,
            color1: self.color1 + o.color1,
        }
    }
}

impl Sub for Attributes {
    type Output = Attributes;

    fn sub(self, o: Attributes) -> Attributes {
        Attributes {
            world_pos: self.world_pos - o.world_pos,
            view_pos: self.view_pos - o.view_pos,
            normal: self.normal - o.normal,
            tangent: self.tangent - o.tangent,
            uv0: self.uv0 - o.uv0,
            uv1: self.uv1 - o.uv1,
            color0: self.color0 - o.color0,
            color1: self.color1 - o.color1,
        }
    }
}

impl Mul<f32> for Attributes {
    type Output = Attributes;

    fn mul(self, s: f32) -> Attributes {
        Attributes {
            world_pos: self.world_pos * s,
            view_pos: self.view_pos * s,
            normal: self.normal * s,
            tangent: self.tangent * s,
            uv0: self.uv0 * s,
            uv1: self.uv1 * s,
            color0: self.color0 * s,
            color1: self.color1 * s,
        }
    }
}

impl AddAssign for Attributes {
    fn add_assign(&mut self, o: Attributes) {
        *self = *self + o;
    }
}

impl Attributes {
    /// Reconstructs world-space attributes from an `A/w` accumulator and
    /// builds the fragment record.
    fn emit(
        &self,
        w: f32,
        screen_coord: Vec2,
        depth: f32,
        depth_slope: f32,
        tangent_w: f32,
        is_front: bool,
    ) -> Fragment {
        let a = *self * w;
        Fragment {
            screen_coord,
            depth,
            depth_slope,
            world_pos: a.world_pos,
            view_pos: a.view_pos,
            normal: a.normal.normalize_or_zero(),
            tangent: a.tangent.extend(tangent_w),
            uv0: a.uv0,
            uv1: a.uv1,
            color0: a.color0,
            color1: a.color1,
            is_front,
        }
    }
}

/// An edge function as an affine functional of the pixel center, with
/// constant per-pixel and per-row gradients.
struct EdgeFunction {
    dx: f32,
    dy: f32,
    initial_value: f32,
}

impl EdgeFunction {
    fn new(start: Vec2, end: Vec2, initial: Vec2) -> Self {
        let dx = end.y - start.y;
        let dy = start.x - end.x;
        Self {
            dx,
            dy,
            initial_value: dx * initial.x + dy * initial.y + (end.x * start.y - start.x * end.y),
        }
    }
}

/// Top-left ownership in the y-down screen space: the edge is "top" when it
/// runs toward smaller y, "left" when horizontal and running toward larger x.
fn is_top_left(start: Vec2, end: Vec2) -> bool {
    end.y < start.y || (is_equal_approx(end.y, start.y) && end.x > start.x)
}

/// `max(|dz/dx|, |dz/dy|)` over the triangle's screen-space plane; feeds the
/// polygon offset. Zero for degenerate triangles.
fn depth_slope(v0: Vec3, v1: Vec3, v2: Vec3) -> f32 {
    let denom = (v1.x - v0.x) * (v2.y - v0.y) - (v2.x - v0.x) * (v1.y - v0.y);
    if is_zero_approx(denom) {
        return 0.0;
    }

    let dzdx = ((v1.z - v0.z) * (v2.y - v0.y) - (v2.z - v0.z) * (v1.y - v0.y)) / denom;
    let dzdy = ((v2.z - v0.z) * (v1.x - v0.x) - (v1.z - v0.z) * (v2.x - v0.x)) / denom;

    dzdx.abs().max(dzdy.abs())
}

/// Emits the single fragment of a point primitive at the pixel center
/// containing the viewport position.
pub fn rasterize_point(v: &Varying, ops: &PixelOps, out: &mut Vec<Fragment>) {
    let screen_coord = vec2(
        v.viewport_coord.x.floor() + 0.5,
        v.viewport_coord.y.floor() + 0.5,
    );
    let depth = v.viewport_coord.z;

    if ops.scissor_test(screen_coord.x, screen_coord.y)
        && ops.depth_stencil_test(
            screen_coord.x,
            screen_coord.y,
            depth,
            0.0,
            PolygonMode::Point,
            true,
        )
    {
        // Attributes copy directly; no interpolation happens for a point.
        out.push(Fragment {
            screen_coord,
            depth,
            depth_slope: 0.0,
            world_pos: v.world_pos,
            view_pos: v.view_pos,
            normal: v.normal,
            tangent: v.tangent,
            uv0: v.uv0,
            uv1: v.uv1,
            color0: v.color0,
            color1: v.color1,
            is_front: true,
        });
    }
}

/// Bresenham line walk with incremental perspective-correct interpolation.
/// A zero-length line emits nothing.
pub fn rasterize_line(v1: &Varying, v2: &Varying, ops: &PixelOps, out: &mut Vec<Fragment>) {
    let x0 = v1.viewport_coord.x.floor() as i32;
    let y0 = v1.viewport_coord.y.floor() as i32;
    let x1 = v2.viewport_coord.x.floor() as i32;
    let y1 = v2.viewport_coord.y.floor() as i32;

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;

    if dx == 0 && dy == 0 {
        return;
    }

    out.reserve((dx + dy + 1) as usize);

    // Projection of a unit step onto the line, for the per-step gradients.
    let big_dx = (x1 - x0) as f32;
    let big_dy = (y1 - y0) as f32;
    let dd = big_dx * big_dx + big_dy * big_dy;
    let gx = big_dx / dd * sx as f32;
    let gy = big_dy / dd * sy as f32;

    let inv_w1 = 1.0 / v1.clip_coord.w;
    let inv_w2 = 1.0 / v2.clip_coord.w;

    let mut inv_w = inv_w1;
    let inv_w_dx = (inv_w2 - inv_w1) * gx;
    let inv_w_dy = (inv_w2 - inv_w1) * gy;

    let mut depth_pw = v1.viewport_coord.z * inv_w1;
    let depth_pw_end = v2.viewport_coord.z * inv_w2;
    let depth_pw_dx = (depth_pw_end - depth_pw) * gx;
    let depth_pw_dy = (depth_pw_end - depth_pw) * gy;

    let mut attr_pw = Attributes::of(v1) * inv_w1;
    let attr_pw_end = Attributes::of(v2) * inv_w2;
    let attr_pw_dx = (attr_pw_end - attr_pw) * gx;
    let attr_pw_dy = (attr_pw_end - attr_pw) * gy;

    let mut x = x0;
    let mut y = y0;

    loop {
        let screen_coord = vec2(x as f32 + 0.5, y as f32 + 0.5);
        let w = 1.0 / inv_w;
        let depth = depth_pw * w;

        if ops.scissor_test(screen_coord.x, screen_coord.y)
            && ops.depth_stencil_test(
                screen_coord.x,
                screen_coord.y,
                depth,
                0.0,
                PolygonMode::Line,
                true,
            )
        {
            out.push(attr_pw.emit(w, screen_coord, depth, 0.0, v1.tangent.w, true));
        }

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
            inv_w += inv_w_dx;
            depth_pw += depth_pw_dx;
            attr_pw += attr_pw_dx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
            inv_w += inv_w_dy;
            depth_pw += depth_pw_dy;
            attr_pw += attr_pw_dy;
        }
    }
}

/// Edge-function triangle fill with the top-left rule and incremental
/// row/column accumulators for 1/w, z/w and every attribute.
pub fn rasterize_triangle(
    v1: &Varying,
    v2: &Varying,
    v3: &Varying,
    ops: &PixelOps,
    out: &mut Vec<Fragment>,
) {
    let p1 = v1.viewport_coord.truncate();
    let p2 = v2.viewport_coord.truncate();
    let p3 = v3.viewport_coord.truncate();

    let area = (p2.x - p1.x) * (p3.y - p1.y) - (p2.y - p1.y) * (p3.x - p1.x);
    if is_zero_approx(area) {
        // Degenerate, including on-plane zero-area survivors of clipping.
        return;
    }

    // Signed area is y-down, so counter-clockwise front faces are negative.
    let is_front = match ops.state.front_face {
        FrontFace::CounterClockwise => area < 0.0,
        FrontFace::Clockwise => area > 0.0,
    };
    if ops.state.cull_enabled {
        match ops.state.cull_mode {
            CullMode::Back => {
                if !is_front {
                    return;
                }
            }
            CullMode::Front => {
                if is_front {
                    return;
                }
            }
            CullMode::FrontAndBack => return,
        }
    }

    // Edge functions of a positive-area winding come out negative inside;
    // orienting the inside test by the area sign rasterizes both windings.
    let inside_sign = if area < 0.0 { 1.0 } else { -1.0 };

    let bb_min = p1.min(p2).min(p3);
    let bb_max = p1.max(p2).max(p3);

    // First pixel center inside the bounding box.
    let p0 = vec2(
        (bb_min.x - 0.5).ceil() + 0.5,
        (bb_min.y - 0.5).ceil() + 0.5,
    );

    let e12 = EdgeFunction::new(p1, p2, p0);
    let e23 = EdgeFunction::new(p2, p3, p0);
    let e31 = EdgeFunction::new(p3, p1, p0);
    let e12_top_left = is_top_left(p1, p2);
    let e23_top_left = is_top_left(p2, p3);
    let e31_top_left = is_top_left(p3, p1);

    let slope = depth_slope(v1.viewport_coord, v2.viewport_coord, v3.viewport_coord);

    let inv_area = 1.0 / area;

    let iw1 = 1.0 / v1.clip_coord.w;
    let iw2 = 1.0 / v2.clip_coord.w;
    let iw3 = 1.0 / v3.clip_coord.w;

    let zpw1 = v1.viewport_coord.z * iw1;
    let zpw2 = v2.viewport_coord.z * iw2;
    let zpw3 = v3.viewport_coord.z * iw3;

    let a1 = Attributes::of(v1) * iw1;
    let a2 = Attributes::of(v2) * iw2;
    let a3 = Attributes::of(v3) * iw3;

    // Gradient of a perspective-divided quantity: weight each vertex value
    // by the gradient of the edge function opposite it.
    let invw_dx = (e23.dx * iw1 + e31.dx * iw2 + e12.dx * iw3) * inv_area;
    let invw_dy = (e23.dy * iw1 + e31.dy * iw2 + e12.dy * iw3) * inv_area;

    let zpw_dx = (e23.dx * zpw1 + e31.dx * zpw2 + e12.dx * zpw3) * inv_area;
    let zpw_dy = (e23.dy * zpw1 + e31.dy * zpw2 + e12.dy * zpw3) * inv_area;

    let attr_dx = (a1 * e23.dx + a2 * e31.dx + a3 * e12.dx) * inv_area;
    let attr_dy = (a1 * e23.dy + a2 * e31.dy + a3 * e12.dy) * inv_area;

    let mut f12_row = e12.initial_value;
    let mut f23_row = e23.initial_value;
    let mut f31_row = e31.initial_value;

    let mut invw_row = (f23_row * iw1 + f31_row * iw2 + f12_row * iw3) * inv_area;
    let mut zpw_row = (f23_row * zpw1 + f31_row * zpw2 + f12_row * zpw3) * inv_area;
    let mut attr_row = (a1 * f23_row + a2 * f31_row + a3 * f12_row) * inv_area;

    // Pixel centers covered by the bounding box; max is exclusive.
    let x_min = (bb_min.x - 0.5).ceil() as i32;
    let x_max = (bb_max.x - 0.5).floor() as i32 + 1;
    let y_min = (bb_min.y - 0.5).ceil() as i32;
    let y_max = (bb_max.y - 0.5).floor() as i32 + 1;

    out.reserve(((x_max - x_min).max(0) as usize * (y_max - y_min).max(0) as usize) / 2);

    for y in y_min..y_max {
        let mut f12 = f12_row;
        let mut f23 = f23_row;
        let mut f31 = f31_row;

        let mut invw = invw_row;
        let mut zpw = zpw_row;
        let mut attr = attr_row;

        for x in x_min..x_max {
            let inside12 = f12 * inside_sign > 0.0 || (e12_top_left && is_zero_approx(f12));
            let inside23 = f23 * inside_sign > 0.0 || (e23_top_left && is_zero_approx(f23));
            let inside31 = f31 * inside_sign > 0.0 || (e31_top_left && is_zero_approx(f31));

            if inside12 && inside23 && inside31 {
                let screen_coord = vec2(x as f32 + 0.5, y as f32 + 0.5);
                let w = 1.0 / invw;
                let depth = zpw * w;

                if ops.scissor_test(screen_coord.x, screen_coord.y)
                    && ops.depth_stencil_test(
                        screen_coord.x,
                        screen_coord.y,
                        depth,
                        slope,
                        PolygonMode::Fill,
                        is_front,
                    )
                {
                    out.push(attr.emit(w, screen_coord, depth, slope, v1.tangent.w, is_front));
                }
            }

            f12 += e12.dx;
            f23 += e23.dx;
            f31 += e31.dx;
            invw += invw_dx;
            zpw += zpw_dx;
            attr += attr_dx;
        }

        f12_row += e12.dy;
        f23_row += e23.dy;
        f31_row += e31.dy;
        invw_row += invw_dy;
        zpw_row += zpw_dy;
        attr_row += attr_dy;
    }
}

/// Rasterizes one clipped, viewport-transformed polygon. Polygons with three
/// or more vertices honor the polygon mode: `Fill` fan-triangulates from the
/// first vertex, `Line` walks the closed outline, `Point` emits each vertex.
pub fn rasterize_polygon(
    poly: &[Varying],
    polygon_mode: PolygonMode,
    ops: &PixelOps,
    out: &mut Vec<Fragment>,
) {
    match poly.len() {
        0 => {}
        1 => rasterize_point(&poly[0], ops, out),
        2 => rasterize_line(&poly[0], &poly[1], ops, out),
        _ => match polygon_mode {
            PolygonMode::Point => {
                for v in poly {
                    rasterize_point(v, ops, out);
                }
            }
            PolygonMode::Line => {
                for i in 0..poly.len() {
                    rasterize_line(&poly[i], &poly[(i + 1) % poly.len()], ops, out);
                }
            }
            PolygonMode::Fill => {
                for i in 1..poly.len() - 1 {
                    rasterize_triangle(&poly[0], &poly[i], &poly[i + 1], ops, out);
                }
            }
        },
    }
}
