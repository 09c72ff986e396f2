use crate::state::{ErrorCode, PrimitiveTopology};
use arrayvec::ArrayVec;

/// Indices of one assembled primitive into the varying buffer: 1 vertex for
/// points, 2 for lines, 3 for triangles.
pub type Primitive = ArrayVec<u32, 3>;

impl PrimitiveTopology {
    /// `(vertices per primitive, index stride between primitives)`.
    #[inline]
    pub fn layout(self) -> (usize, usize) {
        match self {
            PrimitiveTopology::PointList => (1, 1),
            PrimitiveTopology::LineList => (2, 2),
            PrimitiveTopology::LineStrip => (2, 1),
            PrimitiveTopology::TriangleList => (3, 3),
            PrimitiveTopology::TriangleStrip => (3, 1),
        }
    }
}

/// A borrowed element buffer in one of the three index widths.
#[derive(Debug, Copy, Clone)]
pub enum IndexSlice<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexSlice<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            IndexSlice::U8(s) => s.len(),
            IndexSlice::U16(s) => s.len(),
            IndexSlice::U32(s) => s.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, i: usize) -> u32 {
        match self {
            IndexSlice::U8(s) => s[i] as u32,
            IndexSlice::U16(s) => s[i] as u32,
            IndexSlice::U32(s) => s[i],
        }
    }
}

fn flip_strip_winding(topology: PrimitiveTopology, ordinal: usize, prim: &mut Primitive) {
    // Triangle strips alternate winding; flipping odd primitives keeps the
    // face sign consistent across the strip.
    if topology == PrimitiveTopology::TriangleStrip && ordinal % 2 == 1 {
        prim.swap(1, 2);
    }
}

/// Assembles primitives over a dense vertex range `0..count`.
pub fn assemble(topology: PrimitiveTopology, count: usize) -> Vec<Primitive> {
    let (arity, stride) = topology.layout();
    let mut out = Vec::new();
    if count < arity {
        return out;
    }

    let mut ordinal = 0;
    let mut i = 0;
    while i + arity <= count {
        let mut prim: Primitive = (i..i + arity).map(|v| v as u32).collect();
        flip_strip_winding(topology, ordinal, &mut prim);
        out.push(prim);
        i += stride;
        ordinal += 1;
    }
    out
}

/// Assembles primitives through an element buffer. Fails with
/// `InvalidOperation` when an index reaches past the varying buffer.
pub fn assemble_indexed(
    topology: PrimitiveTopology,
    indices: &IndexSlice,
    vertex_count: u32,
) -> Result<Vec<Primitive>, ErrorCode> {
    let (arity, stride) = topology.layout();
    let count = indices.len();
    let mut out = Vec::new();
    if count < arity {
        return Ok(out);
    }

    let mut ordinal = 0;
    let mut i = 0;
    while i + arity <= count {
        let mut prim = Primitive::new();
        for j in i..i + arity {
            let index = indices.get(j);
            if index >= vertex_count {
                return Err(ErrorCode::InvalidOperation);
            }
            prim.push(index);
        }
        flip_strip_winding(topology, ordinal, &mut prim);
        out.push(prim);
        i += stride;
        ordinal += 1;
    }
    Ok(out)
}
