use crate::assemble::Primitive;
use crate::clip::{self, ClipPolygon};
use crate::merge::PixelOps;
use crate::project;
use crate::raster;
use crate::varying::{FragmentOutputs, FragmentShader, Varying, VertexShader};
use rayon::prelude::*;

/// Vertex-shader invocations per wave-1 task.
pub const VERTEX_BATCH_SIZE: usize = 100;

/// Worker threads unless the device asks for a different pool size.
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// The fixed worker pool both draw waves run on. Constructed once with the
/// device; the threads are truly parallel and live for the pool's lifetime.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("sgpu-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Wave 1: runs the vertex shader over `first..first + varyings.len()`
    /// in batches of [`VERTEX_BATCH_SIZE`] consecutive indices. Each batch
    /// writes its own disjoint slice, so the wave needs no synchronization
    /// beyond the join. Blocks until every batch completes.
    pub fn run_vertex_wave(&self, shader: &dyn VertexShader, first: u32, varyings: &mut [Varying]) {
        self.pool.install(|| {
            varyings
                .par_chunks_mut(VERTEX_BATCH_SIZE)
                .enumerate()
                .for_each(|(batch, chunk)| {
                    let base = first + (batch * VERTEX_BATCH_SIZE) as u32;
                    for (i, out) in chunk.iter_mut().enumerate() {
                        *out = shader.main(base + i as u32);
                    }
                });
        });
    }

    /// Wave 2: one task per assembled primitive, each running clipping,
    /// projection, rasterization, fragment shading and output merging end to
    /// end. Tasks may touch the same pixels; the tile locks serialize them.
    /// Blocks until every primitive completes.
    pub fn run_primitive_wave(
        &self,
        primitives: &[Primitive],
        varyings: &[Varying],
        shader: &dyn FragmentShader,
        ops: &PixelOps,
    ) {
        self.pool.install(|| {
            primitives
                .par_iter()
                .for_each(|primitive| render_primitive(primitive, varyings, shader, ops));
        });
    }
}

/// The post-vertex pipeline for one primitive.
fn render_primitive(
    primitive: &Primitive,
    varyings: &[Varying],
    shader: &dyn FragmentShader,
    ops: &PixelOps,
) {
    let polygon: ClipPolygon = primitive.iter().map(|&i| varyings[i as usize]).collect();

    let mut polygon = clip::clip_polygon(polygon);
    if polygon.is_empty() {
        return;
    }

    for v in polygon.iter_mut() {
        project::perspective_divide(v);
        project::viewport_transform(v, &ops.state.viewport, ops.state.min_depth, ops.state.max_depth);
    }

    let mut fragments = Vec::new();
    raster::rasterize_polygon(&polygon, ops.state.polygon_mode, ops, &mut fragments);
    if fragments.is_empty() {
        return;
    }

    let mut outputs = FragmentOutputs::new();
    for fragment in &fragments {
        outputs.reset();
        shader.main(fragment, &mut outputs);
        for (slot, color) in outputs.iter_written() {
            ops.write_color(fragment.screen_coord.x, fragment.screen_coord.y, color, slot);
        }
    }
}
