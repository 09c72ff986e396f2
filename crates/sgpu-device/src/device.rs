use crate::error::DeviceCreateError;
use rustc_hash::FxHashMap;
use sgpu_formats::attachment::{Attachment, AttachmentCreateError};
use sgpu_formats::format::{ChannelType, ColorComponents, PixelFormat};
use sgpu_log::info;
use sgpu_math::Vec4;
use sgpu_pipeline::assemble::{assemble, assemble_indexed, IndexSlice};
use sgpu_pipeline::clear;
use sgpu_pipeline::dispatch::{WorkerPool, DEFAULT_WORKER_COUNT};
use sgpu_pipeline::framebuffer::FrameBuffer;
use sgpu_pipeline::merge::PixelOps;
use sgpu_pipeline::state::{
    BlendFactor, BlendOp, ClearFlags, CompareOp, CullMode, ErrorCode, FrontFace, PipelineState,
    PolygonMode, PrimitiveTopology, Rect, StencilFaces, StencilOp, DRAW_BUFFER_SLOT_COUNT,
    MAX_COLOR_ATTACHMENTS,
};
use sgpu_pipeline::tile::TileLockGrid;
use sgpu_pipeline::varying::{FragmentShader, Varying, VertexShader};
use std::ptr::NonNull;

/// Handle of the framebuffer created at initialization around the caller's
/// color buffer.
pub const DEFAULT_FRAMEBUFFER: u32 = 0;

/// Fixed-function toggles addressed by [`Device::enable`] and
/// [`Device::disable`]. `Blend` switches every draw buffer slot at once; the
/// per-slot switch is [`Device::set_blend_enabled`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    StencilTest,
    ScissorTest,
    CullFace,
    Blend,
    PolygonOffsetFill,
    PolygonOffsetLine,
    PolygonOffsetPoint,
}

/// Parameters of [`Device::new`] and [`Device::with_external_color`].
#[derive(Debug, Copy, Clone)]
pub struct DeviceCreateInfo {
    pub width: u32,
    pub height: u32,
    pub color_format: PixelFormat,
    pub channel_type: ChannelType,
    /// Size of the fixed worker pool both draw waves run on.
    pub worker_count: usize,
}

impl DeviceCreateInfo {
    pub fn new(width: u32, height: u32, color_format: PixelFormat, ty: ChannelType) -> Self {
        Self {
            width,
            height,
            color_format,
            channel_type: ty,
            worker_count: DEFAULT_WORKER_COUNT,
        }
    }
}

/// The software rasterization device.
///
/// Owns the pipeline state, the framebuffer pool and the process-lifetime
/// tile lock grid. The state is only ever written between draw calls;
/// workers read it through shared references while the wave runs.
///
/// Configuration mistakes do not panic and do not return results: they set
/// the sticky [`ErrorCode`] and every state-mutating call becomes a no-op
/// until [`Device::take_error`] consumes it.
pub struct Device {
    state: PipelineState,
    framebuffers: FxHashMap<u32, FrameBuffer>,
    bound_framebuffer: u32,
    next_handle: u32,
    locks: TileLockGrid,
    workers: WorkerPool,
    width: u32,
    height: u32,
}

impl Device {
    /// Creates a device that owns its default color buffer. Initial pipeline
    /// state follows the OpenGL 3.3 defaults; the default framebuffer wraps
    /// the color attachment plus an internally allocated packed
    /// depth-stencil attachment of the same size.
    pub fn new(info: DeviceCreateInfo) -> Result<Self, DeviceCreateError> {
        if !info.color_format.is_color_renderable() {
            return Err(DeviceCreateError::InvalidColorFormat(info.color_format));
        }
        let color = Attachment::new(info.width, info.height, info.color_format, info.channel_type)?;
        Self::build(info, color)
    }

    /// Creates a device whose default color attachment aliases
    /// caller-provided memory.
    ///
    /// # Safety
    ///
    /// `color_buffer` must stay valid for `len` bytes for the device's
    /// lifetime, and the caller must not access it while a draw or clear is
    /// in flight.
    pub unsafe fn with_external_color(
        info: DeviceCreateInfo,
        color_buffer: NonNull<u8>,
        len: usize,
    ) -> Result<Self, DeviceCreateError> {
        if !info.color_format.is_color_renderable() {
            return Err(DeviceCreateError::InvalidColorFormat(info.color_format));
        }
        let color = Attachment::with_external(
            color_buffer,
            len,
            info.width,
            info.height,
            info.color_format,
            info.channel_type,
        )?;
        Self::build(info, color)
    }

    fn build(info: DeviceCreateInfo, color: Attachment) -> Result<Self, DeviceCreateError> {
        let depth_stencil = Attachment::new(
            info.width,
            info.height,
            PixelFormat::DepthStencil,
            ChannelType::UNorm32,
        )?;

        let mut default_fb = FrameBuffer::new();
        default_fb.color_attachments[0] = Some(color);
        default_fb.depth_stencil = Some(depth_stencil);
        default_fb.draw_slots[0] = Some(0);
        default_fb.read_slot = Some(0);

        let mut framebuffers = FxHashMap::default();
        framebuffers.insert(DEFAULT_FRAMEBUFFER, default_fb);

        let workers = WorkerPool::new(info.worker_count.max(1))?;

        info!(
            "device initialized: {}x{} {:?}/{:?}, {} workers",
            info.width,
            info.height,
            info.color_format,
            info.channel_type,
            workers.worker_count()
        );

        Ok(Self {
            state: PipelineState::new(info.width as i32, info.height as i32),
            framebuffers,
            bound_framebuffer: DEFAULT_FRAMEBUFFER,
            next_handle: DEFAULT_FRAMEBUFFER,
            locks: TileLockGrid::new(),
            workers,
            width: info.width,
            height: info.height,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    // ======================================================
    // Error model
    // ======================================================

    #[inline]
    fn ready(&self) -> bool {
        !self.state.error.is_error()
    }

    fn set_error(&mut self, code: ErrorCode) {
        if !self.state.error.is_error() {
            self.state.error = code;
        }
    }

    /// The current sticky error, without consuming it.
    #[inline]
    pub fn error(&self) -> ErrorCode {
        self.state.error
    }

    /// Consumes and returns the sticky error, re-arming the device.
    pub fn take_error(&mut self) -> ErrorCode {
        std::mem::replace(&mut self.state.error, ErrorCode::NoError)
    }

    // ======================================================
    // Pipeline state
    // ======================================================

    pub fn enable(&mut self, cap: Capability) {
        self.set_capability(cap, true)
    }

    pub fn disable(&mut self, cap: Capability) {
        self.set_capability(cap, false)
    }

    fn set_capability(&mut self, cap: Capability, enabled: bool) {
        if !self.ready() {
            return;
        }
        match cap {
            Capability::DepthTest => self.state.depth_test_enabled = enabled,
            Capability::StencilTest => self.state.stencil_test_enabled = enabled,
            Capability::ScissorTest => self.state.scissor_test_enabled = enabled,
            Capability::CullFace => self.state.cull_enabled = enabled,
            Capability::Blend => {
                for slot in self.state.draw_buffers.iter_mut() {
                    slot.blend_enabled = enabled;
                }
            }
            Capability::PolygonOffsetFill => self.state.fill_offset_enabled = enabled,
            Capability::PolygonOffsetLine => self.state.line_offset_enabled = enabled,
            Capability::PolygonOffsetPoint => self.state.point_offset_enabled = enabled,
        }
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if !self.ready() {
            return;
        }
        if width < 0 || height < 0 {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        self.state.viewport = Rect::new(x, y, width, height);
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if !self.ready() {
            return;
        }
        if width < 0 || height < 0 {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        self.state.scissor = Rect::new(x, y, width, height);
    }

    pub fn set_depth_range(&mut self, min_depth: f32, max_depth: f32) {
        if !self.ready() {
            return;
        }
        self.state.min_depth = min_depth;
        self.state.max_depth = max_depth;
    }

    pub fn set_depth_func(&mut self, func: CompareOp) {
        if !self.ready() {
            return;
        }
        self.state.depth_func = func;
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        if !self.ready() {
            return;
        }
        self.state.depth_write_enabled = enabled;
    }

    pub fn set_clear_color(&mut self, color: Vec4) {
        if !self.ready() {
            return;
        }
        self.state.clear_color = color;
    }

    pub fn set_clear_depth(&mut self, depth: f32) {
        if !self.ready() {
            return;
        }
        self.state.clear_depth = depth;
    }

    pub fn set_clear_stencil(&mut self, stencil: u8) {
        if !self.ready() {
            return;
        }
        self.state.clear_stencil = stencil;
    }

    pub fn set_stencil_func(
        &mut self,
        faces: StencilFaces,
        func: CompareOp,
        reference: u8,
        mask: u8,
    ) {
        if !self.ready() {
            return;
        }
        for &i in faces.indices() {
            let face = &mut self.state.stencil[i];
            face.func = func;
            face.reference = reference;
            face.func_mask = mask;
        }
    }

    pub fn set_stencil_op(
        &mut self,
        faces: StencilFaces,
        sfail: StencilOp,
        dpfail: StencilOp,
        dppass: StencilOp,
    ) {
        if !self.ready() {
            return;
        }
        for &i in faces.indices() {
            let face = &mut self.state.stencil[i];
            face.sfail_op = sfail;
            face.dpfail_op = dpfail;
            face.dppass_op = dppass;
        }
    }

    pub fn set_stencil_write_mask(&mut self, faces: StencilFaces, mask: u8) {
        if !self.ready() {
            return;
        }
        for &i in faces.indices() {
            self.state.stencil[i].write_mask = mask;
        }
    }

    pub fn set_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.set_blend_func_separate(src, dst, src, dst)
    }

    pub fn set_blend_func_separate(
        &mut self,
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        if !self.ready() {
            return;
        }
        // Saturate is defined for the source side only.
        if dst_rgb == BlendFactor::SrcAlphaSaturate || dst_alpha == BlendFactor::SrcAlphaSaturate {
            self.set_error(ErrorCode::InvalidEnum);
            return;
        }
        self.state.blend_src_rgb = src_rgb;
        self.state.blend_dst_rgb = dst_rgb;
        self.state.blend_src_alpha = src_alpha;
        self.state.blend_dst_alpha = dst_alpha;
    }

    pub fn set_blend_equation(&mut self, op: BlendOp) {
        self.set_blend_equation_separate(op, op)
    }

    pub fn set_blend_equation_separate(&mut self, rgb: BlendOp, alpha: BlendOp) {
        if !self.ready() {
            return;
        }
        self.state.blend_op_rgb = rgb;
        self.state.blend_op_alpha = alpha;
    }

    pub fn set_blend_constant(&mut self, color: Vec4) {
        if !self.ready() {
            return;
        }
        self.state.blend_constant = color;
    }

    pub fn set_blend_enabled(&mut self, slot: usize, enabled: bool) {
        if !self.ready() {
            return;
        }
        if slot >= DRAW_BUFFER_SLOT_COUNT {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        self.state.draw_buffers[slot].blend_enabled = enabled;
    }

    /// Sets the color mask of every draw buffer slot.
    pub fn set_color_mask(&mut self, mask: ColorComponents) {
        if !self.ready() {
            return;
        }
        for slot in self.state.draw_buffers.iter_mut() {
            slot.color_mask = mask;
        }
    }

    pub fn set_color_mask_for(&mut self, slot: usize, mask: ColorComponents) {
        if !self.ready() {
            return;
        }
        if slot >= DRAW_BUFFER_SLOT_COUNT {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        self.state.draw_buffers[slot].color_mask = mask;
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        if !self.ready() {
            return;
        }
        self.state.cull_mode = mode;
    }

    pub fn set_front_face(&mut self, winding: FrontFace) {
        if !self.ready() {
            return;
        }
        self.state.front_face = winding;
    }

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) {
        if !self.ready() {
            return;
        }
        self.state.polygon_mode = mode;
    }

    pub fn set_polygon_offset(&mut self, factor: f32, units: f32) {
        if !self.ready() {
            return;
        }
        self.state.depth_factor = factor;
        self.state.depth_unit = units;
    }

    pub fn set_line_width(&mut self, width: f32) {
        if !self.ready() {
            return;
        }
        if width <= 0.0 {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        self.state.line_width = width;
    }

    // ======================================================
    // Framebuffers
    // ======================================================

    /// Creates an empty framebuffer and returns its handle. Returns the
    /// default handle without creating anything while an error is pending.
    pub fn create_framebuffer(&mut self) -> u32 {
        if !self.ready() {
            return DEFAULT_FRAMEBUFFER;
        }
        self.next_handle += 1;
        let handle = self.next_handle;
        self.framebuffers.insert(handle, FrameBuffer::new());
        handle
    }

    /// Binds a framebuffer for both drawing and read-back.
    pub fn bind_framebuffer(&mut self, handle: u32) {
        if !self.ready() {
            return;
        }
        if !self.framebuffers.contains_key(&handle) {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }
        self.bound_framebuffer = handle;
    }

    /// Deletes a framebuffer and its pool-owned attachments. The default
    /// framebuffer cannot be deleted; deleting the bound framebuffer falls
    /// back to the default one.
    pub fn delete_framebuffer(&mut self, handle: u32) {
        if !self.ready() {
            return;
        }
        if handle == DEFAULT_FRAMEBUFFER || self.framebuffers.remove(&handle).is_none() {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }
        if self.bound_framebuffer == handle {
            self.bound_framebuffer = DEFAULT_FRAMEBUFFER;
        }
    }

    /// Allocates a color attachment into the bound framebuffer. The default
    /// framebuffer's attachments are fixed at initialization.
    pub fn attach_color(
        &mut self,
        index: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
        ty: ChannelType,
    ) {
        if !self.ready() {
            return;
        }
        if self.bound_framebuffer == DEFAULT_FRAMEBUFFER {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }
        if index >= MAX_COLOR_ATTACHMENTS {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        if !format.is_color_renderable() {
            self.set_error(ErrorCode::InvalidEnum);
            return;
        }
        match Attachment::new(width, height, format, ty) {
            Ok(attachment) => {
                let fb = self
                    .framebuffers
                    .get_mut(&self.bound_framebuffer)
                    .expect("bound framebuffer must exist");
                fb.color_attachments[index] = Some(attachment);
            }
            Err(err) => self.set_error(attachment_error_code(err)),
        }
    }

    /// Allocates a packed depth-stencil attachment into the bound
    /// framebuffer.
    pub fn attach_depth_stencil(&mut self, width: u32, height: u32) {
        self.attach_depth_internal(width, height, PixelFormat::DepthStencil, ChannelType::UNorm32)
    }

    /// Allocates a depth-only (no stencil) attachment into the bound
    /// framebuffer.
    pub fn attach_depth(&mut self, width: u32, height: u32) {
        self.attach_depth_internal(width, height, PixelFormat::DepthComponent, ChannelType::F32)
    }

    fn attach_depth_internal(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
        ty: ChannelType,
    ) {
        if !self.ready() {
            return;
        }
        if self.bound_framebuffer == DEFAULT_FRAMEBUFFER {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }
        match Attachment::new(width, height, format, ty) {
            Ok(attachment) => {
                let fb = self
                    .framebuffers
                    .get_mut(&self.bound_framebuffer)
                    .expect("bound framebuffer must exist");
                fb.depth_stencil = Some(attachment);
            }
            Err(err) => self.set_error(attachment_error_code(err)),
        }
    }

    /// Maps draw buffer slots to color attachment indices on the bound
    /// framebuffer; slots past the given mapping become disabled.
    pub fn set_draw_buffers(&mut self, mapping: &[Option<usize>]) {
        if !self.ready() {
            return;
        }
        if mapping.len() > DRAW_BUFFER_SLOT_COUNT
            || mapping
                .iter()
                .flatten()
                .any(|&index| index >= MAX_COLOR_ATTACHMENTS)
        {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        let fb = self
            .framebuffers
            .get_mut(&self.bound_framebuffer)
            .expect("bound framebuffer must exist");
        fb.draw_slots = [None; DRAW_BUFFER_SLOT_COUNT];
        fb.draw_slots[..mapping.len()].copy_from_slice(mapping);
    }

    /// Selects the color attachment index read-back goes through on the
    /// bound framebuffer.
    pub fn set_read_buffer(&mut self, index: Option<usize>) {
        if !self.ready() {
            return;
        }
        if matches!(index, Some(i) if i >= MAX_COLOR_ATTACHMENTS) {
            self.set_error(ErrorCode::InvalidValue);
            return;
        }
        let fb = self
            .framebuffers
            .get_mut(&self.bound_framebuffer)
            .expect("bound framebuffer must exist");
        fb.read_slot = index;
    }

    // ======================================================
    // Clears
    // ======================================================

    /// Clears the selected buffers of the bound framebuffer with the current
    /// clear values, under viewport ∩ scissor.
    pub fn clear(&mut self, flags: ClearFlags) {
        if !self.ready() {
            return;
        }

        let Some(fb) = self.framebuffers.get(&self.bound_framebuffer) else {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        };

        let depth_stencil_format = fb.depth_stencil.as_ref().map(|a| a.format());
        let wants_depth = flags.contains(ClearFlags::DEPTH);
        let wants_stencil = flags.contains(ClearFlags::STENCIL);

        if (wants_depth || wants_stencil) && depth_stencil_format.is_none() {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }
        if wants_stencil && depth_stencil_format == Some(PixelFormat::DepthComponent) {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }

        let state = &self.state;
        let fb = self
            .framebuffers
            .get_mut(&self.bound_framebuffer)
            .expect("bound framebuffer must exist");

        if flags.contains(ClearFlags::COLOR) {
            for slot in 0..DRAW_BUFFER_SLOT_COUNT {
                clear::clear_color_attachment(fb, state, slot, state.clear_color);
            }
        }

        match depth_stencil_format {
            Some(PixelFormat::DepthStencil) if wants_depth || wants_stencil => {
                clear::clear_depth_stencil_attachment(
                    fb,
                    state,
                    wants_depth,
                    wants_stencil,
                    state.clear_depth,
                    state.clear_stencil,
                );
            }
            Some(PixelFormat::DepthComponent) if wants_depth => {
                clear::clear_depth_attachment(fb, state, state.clear_depth);
            }
            _ => {}
        }
    }

    // ======================================================
    // Draws
    // ======================================================

    /// Renders `count` vertices starting at `first` with the given shaders
    /// and the current pipeline state. Blocks until every fragment is
    /// retired.
    pub fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        first: u32,
        count: u32,
        vs: &dyn VertexShader,
        fs: &dyn FragmentShader,
    ) {
        if !self.ready() {
            return;
        }
        if !self.framebuffers.contains_key(&self.bound_framebuffer) {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }
        if count == 0 {
            return;
        }

        let primitives = assemble(topology, count as usize);

        let Some(mut varyings) = self.alloc_varyings(count as usize) else {
            return;
        };
        self.workers.run_vertex_wave(vs, first, &mut varyings);

        if primitives.is_empty() {
            return;
        }
        let ops = PixelOps {
            state: &self.state,
            target: &self.framebuffers[&self.bound_framebuffer],
            locks: &self.locks,
        };
        self.workers
            .run_primitive_wave(&primitives, &varyings, fs, &ops);
    }

    /// Renders primitives fetched through an element buffer. The vertex
    /// shader runs over `0..vertex_count`; indices at or past `vertex_count`
    /// fail the draw with `InvalidOperation` before any work is submitted.
    pub fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        indices: IndexSlice,
        vertex_count: u32,
        vs: &dyn VertexShader,
        fs: &dyn FragmentShader,
    ) {
        if !self.ready() {
            return;
        }
        if !self.framebuffers.contains_key(&self.bound_framebuffer) {
            self.set_error(ErrorCode::InvalidOperation);
            return;
        }
        if vertex_count == 0 || indices.is_empty() {
            return;
        }

        let primitives = match assemble_indexed(topology, &indices, vertex_count) {
            Ok(primitives) => primitives,
            Err(code) => {
                self.set_error(code);
                return;
            }
        };

        let Some(mut varyings) = self.alloc_varyings(vertex_count as usize) else {
            return;
        };
        self.workers.run_vertex_wave(vs, 0, &mut varyings);

        if primitives.is_empty() {
            return;
        }
        let ops = PixelOps {
            state: &self.state,
            target: &self.framebuffers[&self.bound_framebuffer],
            locks: &self.locks,
        };
        self.workers
            .run_primitive_wave(&primitives, &varyings, fs, &ops);
    }

    /// Varying buffer allocation is the one render-time capacity failure the
    /// error model reports instead of panicking.
    fn alloc_varyings(&mut self, count: usize) -> Option<Vec<Varying>> {
        let mut varyings = Vec::new();
        if varyings.try_reserve_exact(count).is_err() {
            self.set_error(ErrorCode::OutOfMemory);
            return None;
        }
        varyings.resize(count, Varying::default());
        Some(varyings)
    }

    // ======================================================
    // Read-back
    // ======================================================

    /// Decodes the pixel at `(x, y)` of the attachment the bound
    /// framebuffer's read slot maps to.
    pub fn read_color(&self, x: u32, y: u32) -> Option<Vec4> {
        let fb = self.framebuffers.get(&self.bound_framebuffer)?;
        let attachment = fb.read_attachment()?;
        if x >= attachment.width() || y >= attachment.height() {
            return None;
        }
        Some(attachment.read_color(x, y))
    }

    /// Decodes the depth-stencil pixel at `(x, y)` of the bound
    /// framebuffer.
    pub fn read_depth_stencil(&self, x: u32, y: u32) -> Option<(f32, u8)> {
        let fb = self.framebuffers.get(&self.bound_framebuffer)?;
        let attachment = fb.depth_stencil.as_ref()?;
        if x >= attachment.width() || y >= attachment.height() {
            return None;
        }
        Some(attachment.read_depth_stencil(x, y))
    }
}

fn attachment_error_code(err: AttachmentCreateError) -> ErrorCode {
    match err {
        AttachmentCreateError::InvalidDimensions(..) => ErrorCode::InvalidValue,
        AttachmentCreateError::InvalidFormat(_) => ErrorCode::InvalidEnum,
        AttachmentCreateError::OutOfMemory(_) => ErrorCode::OutOfMemory,
        AttachmentCreateError::ExternalTooSmall { .. } => ErrorCode::InvalidValue,
    }
}
