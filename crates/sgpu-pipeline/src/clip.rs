use crate::varying::Varying;
use sgpu_math::{is_zero_approx, vec2, Vec2, Vec4};
use smallvec::SmallVec;

/// Vertices with `|f(clip)| <= ON_PLANE_EPSILON` count as lying on the plane
/// and as inside.
pub const ON_PLANE_EPSILON: f32 = 1e-6;

/// A convex polygon in clip space. Clipping a triangle against six planes
/// yields at most nine vertices, so the inline capacity covers the common
/// case.
pub type ClipPolygon = SmallVec<[Varying; 9]>;

/// The seven half-space predicates of the clip volume.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrustumPlane {
    Left,
    Right,
    Bottom,
    Top,
    Near,
    Far,
    /// `w > 0`. Not part of the default clip walk; available to reject
    /// behind-camera polygons.
    Projection,
}

/// Plane order of the Sutherland-Hodgman walk.
pub const CLIP_PLANES: [FrustumPlane; 6] = [
    FrustumPlane::Left,
    FrustumPlane::Right,
    FrustumPlane::Bottom,
    FrustumPlane::Top,
    FrustumPlane::Near,
    FrustumPlane::Far,
];

impl FrustumPlane {
    /// Signed distance-like predicate; `>= -ON_PLANE_EPSILON` means inside.
    #[inline]
    pub fn eval(self, clip: Vec4) -> f32 {
        match self {
            FrustumPlane::Left => clip.w + clip.x,
            FrustumPlane::Right => clip.w - clip.x,
            FrustumPlane::Bottom => clip.w + clip.y,
            FrustumPlane::Top => clip.w - clip.y,
            FrustumPlane::Near => clip.w + clip.z,
            FrustumPlane::Far => clip.w - clip.z,
            FrustumPlane::Projection => clip.w,
        }
    }

    #[inline]
    pub fn is_inside(self, clip: Vec4) -> bool {
        self.eval(clip) > -ON_PLANE_EPSILON
    }
}

/// Barycentric weights `(1-t, t)` of the intersection of edge `c1 -> c2`
/// with `plane`, clamped to [0, 1]. `None` when the edge is parallel to or
/// degenerate on the plane, in which case no intersection vertex is emitted.
pub fn clip_barycentric(c1: Vec4, c2: Vec4, plane: FrustumPlane) -> Option<Vec2> {
    let e1 = plane.eval(c1);
    let e2 = plane.eval(c2);
    let denom = e1 - e2;
    if is_zero_approx(denom) {
        return None;
    }
    let t = (e1 / denom).clamp(0.0, 1.0);
    Some(vec2(1.0 - t, t))
}

/// One Sutherland-Hodgman pass against a single plane.
pub fn clip_against_plane(polygon: &[Varying], plane: FrustumPlane) -> ClipPolygon {
    let mut out = ClipPolygon::new();
    if polygon.is_empty() {
        return out;
    }

    let count = polygon.len();
    for i in 0..count {
        let prev = &polygon[(i + count - 1) % count];
        let curr = &polygon[i];

        let prev_in = plane.is_inside(prev.clip_coord);
        let curr_in = plane.is_inside(curr.clip_coord);

        if prev_in && curr_in {
            out.push(*curr);
        } else if prev_in != curr_in {
            if let Some(bary) = clip_barycentric(prev.clip_coord, curr.clip_coord, plane) {
                out.push(Varying::lerp(prev, curr, bary));
            }
            if curr_in {
                out.push(*curr);
            }
        }
        // out to out: nothing to emit
    }

    out
}

/// Clips a convex polygon against the six frustum planes. Every vertex of
/// the result satisfies every plane predicate; an empty result means the
/// polygon lies entirely outside the clip volume.
///
/// A single vertex degenerates to the point-inside test, and a polygon lying
/// entirely on one plane passes through unchanged because the on-plane
/// tolerance classifies its edges as inside/inside.
pub fn clip_polygon(polygon: ClipPolygon) -> ClipPolygon {
    let mut out = polygon;
    for plane in CLIP_PLANES {
        out = clip_against_plane(&out, plane);
        if out.is_empty() {
            break;
        }
    }
    out
}
