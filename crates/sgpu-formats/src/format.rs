use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Channel layout of a stored pixel.
///
/// `Bgr`/`Bgra` are upload/read-back orderings only: the red and blue channel
/// positions are swapped at encode and decode, but attachments are never
/// stored that way.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgb,
    Rgba,
    Bgr,
    Bgra,
    DepthComponent,
    DepthStencil,
}

impl PixelFormat {
    /// Number of channels stored per pixel.
    #[inline]
    pub fn channel_count(self) -> usize {
        match self {
            PixelFormat::Red | PixelFormat::DepthComponent => 1,
            PixelFormat::Rg | PixelFormat::DepthStencil => 2,
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
        }
    }

    /// `true` for the formats that can back a color attachment.
    #[inline]
    pub fn is_color_renderable(self) -> bool {
        matches!(
            self,
            PixelFormat::Red | PixelFormat::Rg | PixelFormat::Rgb | PixelFormat::Rgba
        )
    }

    /// `true` for every color ordering, including the swapped ones.
    #[inline]
    pub fn is_color(self) -> bool {
        !matches!(self, PixelFormat::DepthComponent | PixelFormat::DepthStencil)
    }

    /// Byte offset of semantic (RGBA-order) channel `c` within a pixel,
    /// in units of channels. `Bgr`/`Bgra` swap the red and blue positions.
    #[inline]
    pub(crate) fn channel_position(self, c: usize) -> usize {
        match self {
            PixelFormat::Bgr | PixelFormat::Bgra => match c {
                0 => 2,
                2 => 0,
                other => other,
            },
            _ => c,
        }
    }
}

/// Scalar type of one pixel channel.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelType {
    UNorm8,
    SNorm8,
    UNorm16,
    SNorm16,
    UNorm32,
    SNorm32,
    F16,
    F32,
}

impl ChannelType {
    /// Storage size of one channel in bytes.
    #[inline]
    pub fn size(self) -> usize {
        match self {
            ChannelType::UNorm8 | ChannelType::SNorm8 => 1,
            ChannelType::UNorm16 | ChannelType::SNorm16 | ChannelType::F16 => 2,
            ChannelType::UNorm32 | ChannelType::SNorm32 | ChannelType::F32 => 4,
        }
    }
}

/// Storage size in bytes of one pixel of the given format and channel type.
///
/// Depth-stencil pixels are always the packed stencil8 + depth24 layout,
/// regardless of channel type.
#[inline]
pub fn pixel_size(format: PixelFormat, ty: ChannelType) -> usize {
    match format {
        PixelFormat::DepthStencil => 4,
        _ => format.channel_count() * ty.size(),
    }
}

bitflags! {
    /// Per-channel write mask for a color attachment.
    #[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[serde(transparent)]
    pub struct ColorComponents: u32 {
        const R = 0b0001;
        const G = 0b0010;
        const B = 0b0100;
        const A = 0b1000;
        const ALL = 0b1111;
    }
}

impl ColorComponents {
    /// Whether semantic channel `c` (RGBA order) is writable.
    #[inline]
    pub fn channel(self, c: usize) -> bool {
        match c {
            0 => self.contains(ColorComponents::R),
            1 => self.contains(ColorComponents::G),
            2 => self.contains(ColorComponents::B),
            3 => self.contains(ColorComponents::A),
            _ => false,
        }
    }
}

impl Default for ColorComponents {
    fn default() -> Self {
        ColorComponents::ALL
    }
}
