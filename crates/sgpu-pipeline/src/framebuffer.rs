use crate::state::{DRAW_BUFFER_SLOT_COUNT, MAX_COLOR_ATTACHMENTS};
use sgpu_formats::attachment::Attachment;

/// A render target: up to 32 color attachments, an optional depth-stencil
/// attachment, and the draw/read slot mappings the output merger resolves
/// through.
pub struct FrameBuffer {
    pub color_attachments: [Option<Attachment>; MAX_COLOR_ATTACHMENTS],
    pub depth_stencil: Option<Attachment>,
    /// Draw buffer slot -> color attachment index; `None` drops fragments
    /// targeting the slot.
    pub draw_slots: [Option<usize>; DRAW_BUFFER_SLOT_COUNT],
    /// Color attachment index read-back goes through.
    pub read_slot: Option<usize>,
}

impl FrameBuffer {
    /// An empty framebuffer with every slot detached and unmapped.
    pub fn new() -> Self {
        Self {
            color_attachments: std::array::from_fn(|_| None),
            depth_stencil: None,
            draw_slots: [None; DRAW_BUFFER_SLOT_COUNT],
            read_slot: None,
        }
    }

    /// The color attachment a draw buffer slot currently maps to, along with
    /// its attachment index.
    #[inline]
    pub fn draw_attachment(&self, slot: usize) -> Option<(usize, &Attachment)> {
        let index = self.draw_slots.get(slot).copied().flatten()?;
        self.color_attachments[index]
            .as_ref()
            .map(|attachment| (index, attachment))
    }

    /// The color attachment the read slot maps to.
    #[inline]
    pub fn read_attachment(&self) -> Option<&Attachment> {
        self.color_attachments[self.read_slot?].as_ref()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
