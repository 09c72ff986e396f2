use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use sgpu_formats::format::ColorComponents;
use sgpu_math::Vec4;

/// Color attachment slots per framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 32;

/// Draw buffer slots addressable by a fragment shader.
pub const DRAW_BUFFER_SLOT_COUNT: usize = 16;

/// Precision of the packed depth channel.
pub const DEPTH_BITS: u32 = 24;

/// Sticky error codes. Once set, state-mutating calls are suppressed until
/// the error is consumed.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    NoError,
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    OutOfMemory,
}

impl ErrorCode {
    #[inline]
    pub fn is_error(self) -> bool {
        self != ErrorCode::NoError
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolygonMode {
    Point,
    Line,
    Fill,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CullMode {
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    /// Evaluates the comparison with the incoming value on the left, as both
    /// the depth and stencil tests do.
    #[inline]
    pub fn compare<T: PartialOrd>(self, incoming: T, stored: T) -> bool {
        match self {
            CompareOp::Never => false,
            CompareOp::Less => incoming < stored,
            CompareOp::Equal => incoming == stored,
            CompareOp::LessOrEqual => incoming <= stored,
            CompareOp::Greater => incoming > stored,
            CompareOp::NotEqual => incoming != stored,
            CompareOp::GreaterOrEqual => incoming >= stored,
            CompareOp::Always => true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

impl StencilOp {
    /// Applies the operation to an 8-bit stencil value.
    #[inline]
    pub fn apply(self, stored: u8, reference: u8) -> u8 {
        match self {
            StencilOp::Keep => stored,
            StencilOp::Zero => 0,
            StencilOp::Replace => reference,
            StencilOp::IncrementAndClamp => stored.saturating_add(1),
            StencilOp::DecrementAndClamp => stored.saturating_sub(1),
            StencilOp::Invert => !stored,
            StencilOp::IncrementAndWrap => stored.wrapping_add(1),
            StencilOp::DecrementAndWrap => stored.wrapping_sub(1),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlendOp {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendOp {
    #[inline]
    pub fn apply(self, src_term: f32, dst_term: f32) -> f32 {
        match self {
            BlendOp::Add => src_term + dst_term,
            BlendOp::Subtract => src_term - dst_term,
            BlendOp::ReverseSubtract => dst_term - src_term,
            BlendOp::Min => src_term.min(dst_term),
            BlendOp::Max => src_term.max(dst_term),
        }
    }
}

/// Face selector for the stencil state setters.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StencilFaces {
    Front,
    Back,
    FrontAndBack,
}

impl StencilFaces {
    /// Indices into the per-face stencil arrays (0 = front, 1 = back).
    #[inline]
    pub fn indices(self) -> &'static [usize] {
        match self {
            StencilFaces::Front => &[0],
            StencilFaces::Back => &[1],
            StencilFaces::FrontAndBack => &[0, 1],
        }
    }
}

bitflags! {
    /// Buffer selection mask for [`clear`](crate::clear).
    #[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[serde(transparent)]
    pub struct ClearFlags: u32 {
        const COLOR   = 0b001;
        const DEPTH   = 0b010;
        const STENCIL = 0b100;
    }
}

/// An axis-aligned pixel rectangle, half-open on the upper bound.
#[derive(Debug, Serialize, Deserialize, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Stencil test and update state for one face.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq)]
pub struct StencilFaceState {
    pub func: CompareOp,
    pub reference: u8,
    pub func_mask: u8,
    pub write_mask: u8,
    pub sfail_op: StencilOp,
    pub dpfail_op: StencilOp,
    pub dppass_op: StencilOp,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            func: CompareOp::Always,
            reference: 0,
            func_mask: 0xFF,
            write_mask: 0xFF,
            sfail_op: StencilOp::Keep,
            dpfail_op: StencilOp::Keep,
            dppass_op: StencilOp::Keep,
        }
    }
}

/// Blend enable and color mask for one draw buffer slot.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq)]
pub struct DrawBufferState {
    pub blend_enabled: bool,
    pub color_mask: ColorComponents,
}

impl Default for DrawBufferState {
    fn default() -> Self {
        Self {
            blend_enabled: false,
            color_mask: ColorComponents::ALL,
        }
    }
}

/// Every fixed-function toggle of the pipeline, reset to the OpenGL 3.3
/// initial values on device creation.
///
/// The state is written only between draw calls and read-only inside workers;
/// the wave barriers provide the synchronization.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PipelineState {
    pub viewport: Rect,

    pub scissor_test_enabled: bool,
    pub scissor: Rect,

    pub clear_color: Vec4,
    pub clear_depth: f32,
    pub clear_stencil: u8,

    pub depth_test_enabled: bool,
    pub depth_write_enabled: bool,
    pub depth_func: CompareOp,
    pub min_depth: f32,
    pub max_depth: f32,
    pub depth_factor: f32,
    pub depth_unit: f32,

    pub stencil_test_enabled: bool,
    /// Indexed by face: 0 = front, 1 = back.
    pub stencil: [StencilFaceState; 2],

    pub blend_src_rgb: BlendFactor,
    pub blend_dst_rgb: BlendFactor,
    pub blend_op_rgb: BlendOp,
    pub blend_src_alpha: BlendFactor,
    pub blend_dst_alpha: BlendFactor,
    pub blend_op_alpha: BlendOp,
    pub blend_constant: Vec4,

    pub draw_buffers: [DrawBufferState; DRAW_BUFFER_SLOT_COUNT],

    pub cull_enabled: bool,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,

    pub fill_offset_enabled: bool,
    pub line_offset_enabled: bool,
    pub point_offset_enabled: bool,

    pub polygon_mode: PolygonMode,
    pub line_width: f32,

    pub error: ErrorCode,
}

impl PipelineState {
    /// The OpenGL 3.3 initial state for a `width` x `height` default
    /// framebuffer: viewport and scissor cover the whole target, depth test
    /// off with `Less` and write enabled, stencil off with `Always`/`Keep`,
    /// blending off with `One`/`Zero` + `Add`, cull off with `Back` +
    /// counter-clockwise front faces.
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            viewport: Rect::new(0, 0, width, height),
            scissor_test_enabled: false,
            scissor: Rect::new(0, 0, width, height),
            clear_color: Vec4::ZERO,
            clear_depth: 1.0,
            clear_stencil: 0,
            depth_test_enabled: false,
            depth_write_enabled: true,
            depth_func: CompareOp::Less,
            min_depth: 0.0,
            max_depth: 1.0,
            depth_factor: 0.0,
            depth_unit: 0.0,
            stencil_test_enabled: false,
            stencil: [StencilFaceState::default(); 2],
            blend_src_rgb: BlendFactor::One,
            blend_dst_rgb: BlendFactor::Zero,
            blend_op_rgb: BlendOp::Add,
            blend_src_alpha: BlendFactor::One,
            blend_dst_alpha: BlendFactor::Zero,
            blend_op_alpha: BlendOp::Add,
            blend_constant: Vec4::ZERO,
            draw_buffers: [DrawBufferState::default(); DRAW_BUFFER_SLOT_COUNT],
            cull_enabled: false,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            fill_offset_enabled: false,
            line_offset_enabled: false,
            point_offset_enabled: false,
            polygon_mode: PolygonMode::Fill,
            line_width: 1.0,
            error: ErrorCode::NoError,
        }
    }
}
