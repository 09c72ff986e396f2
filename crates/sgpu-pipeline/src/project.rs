use crate::state::Rect;
use crate::varying::Varying;
use sgpu_math::Vec3;

/// Computes `ndc = clip.xyz / clip.w`.
///
/// `w == 0` produces infinities per IEEE-754; the clipper's `w`-relative
/// planes are expected to have removed such vertices beforehand.
#[inline]
pub fn perspective_divide(v: &mut Varying) {
    v.ndc = v.clip_coord.truncate() / v.clip_coord.w;
}

/// Maps NDC into the viewport rectangle (y-down) and the depth range.
pub fn viewport_transform(v: &mut Varying, viewport: &Rect, min_depth: f32, max_depth: f32) {
    let half_width = viewport.width as f32 * 0.5;
    let x = v.ndc.x * half_width + half_width + viewport.x as f32;

    let half_height = viewport.height as f32 * 0.5;
    let y = -(v.ndc.y * half_height) + half_height + viewport.y as f32;

    let z = (v.ndc.z * (max_depth - min_depth) + (max_depth + min_depth)) * 0.5;

    v.viewport_coord = Vec3::new(x, y, z);
}
