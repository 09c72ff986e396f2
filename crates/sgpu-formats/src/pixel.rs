use crate::format::{ChannelType, ColorComponents, PixelFormat};
use bytemuck::pod_read_unaligned;
use half::f16;
use sgpu_math::Vec4;
use static_assertions::const_assert_eq;

/// Largest value representable by the 24-bit normalized depth channel.
pub const DEPTH24_MAX: f32 = 16_777_215.0;

/// Packed depth-stencil pixels are stencil in byte 0 and a little-endian
/// 24-bit depth in bytes 1..4.
pub const DEPTH_STENCIL_PIXEL_SIZE: usize = 4;

const_assert_eq!(std::mem::size_of::<f16>(), 2);
const_assert_eq!(std::mem::size_of::<f32>(), 4);

fn encode_channel(dst: &mut [u8], ty: ChannelType, value: f32) {
    match ty {
        ChannelType::UNorm8 => {
            dst[0] = (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        }
        ChannelType::SNorm8 => {
            let value = value.clamp(-1.0, 1.0);
            let q = if value == -1.0 {
                i8::MIN
            } else {
                let q = value * 127.0;
                (q + if q >= 0.0 { 0.5 } else { -0.5 }) as i8
            };
            dst[0] = q as u8;
        }
        ChannelType::UNorm16 => {
            let q = (value.clamp(0.0, 1.0) * 65_535.0 + 0.5) as u16;
            dst[..2].copy_from_slice(&q.to_le_bytes());
        }
        ChannelType::SNorm16 => {
            let value = value.clamp(-1.0, 1.0);
            let q = if value == -1.0 {
                i16::MIN
            } else {
                let q = value * 32_767.0;
                (q + if q >= 0.0 { 0.5 } else { -0.5 }) as i16
            };
            dst[..2].copy_from_slice(&q.to_le_bytes());
        }
        ChannelType::UNorm32 => {
            let q = (value.clamp(0.0, 1.0) as f64 * 4_294_967_295.0 + 0.5) as u32;
            dst[..4].copy_from_slice(&q.to_le_bytes());
        }
        ChannelType::SNorm32 => {
            let value = value.clamp(-1.0, 1.0);
            let q = if value == -1.0 {
                i32::MIN
            } else {
                let q = value as f64 * 2_147_483_647.0;
                (q + if q >= 0.0 { 0.5 } else { -0.5 }) as i32
            };
            dst[..4].copy_from_slice(&q.to_le_bytes());
        }
        ChannelType::F16 => {
            dst[..2].copy_from_slice(&f16::from_f32(value).to_le_bytes());
        }
        ChannelType::F32 => {
            dst[..4].copy_from_slice(&value.to_le_bytes());
        }
    }
}

fn decode_channel(src: &[u8], ty: ChannelType) -> f32 {
    match ty {
        ChannelType::UNorm8 => src[0] as f32 / 255.0,
        ChannelType::SNorm8 => (src[0] as i8) as f32 / 127.0,
        ChannelType::UNorm16 => pod_read_unaligned::<u16>(&src[..2]) as f32 / 65_535.0,
        ChannelType::SNorm16 => pod_read_unaligned::<i16>(&src[..2]) as f32 / 32_767.0,
        ChannelType::UNorm32 => {
            (pod_read_unaligned::<u32>(&src[..4]) as f64 / 4_294_967_295.0) as f32
        }
        ChannelType::SNorm32 => {
            (pod_read_unaligned::<i32>(&src[..4]) as f64 / 2_147_483_647.0) as f32
        }
        ChannelType::F16 => pod_read_unaligned::<f16>(&src[..2]).to_f32(),
        ChannelType::F32 => pod_read_unaligned::<f32>(&src[..4]),
    }
}

/// Encodes a linear RGBA color into one stored pixel of the given color
/// format. Channels the format does not store are dropped.
pub fn encode_color(dst: &mut [u8], color: Vec4, format: PixelFormat, ty: ChannelType) {
    encode_color_masked(dst, color, format, ty, ColorComponents::ALL)
}

/// Same as [`encode_color`], but leaves the stored bytes of masked-out
/// channels untouched.
pub fn encode_color_masked(
    dst: &mut [u8],
    color: Vec4,
    format: PixelFormat,
    ty: ChannelType,
    mask: ColorComponents,
) {
    debug_assert!(format.is_color());
    let channel_size = ty.size();
    for c in 0..format.channel_count() {
        if !mask.channel(c) {
            continue;
        }
        let offset = format.channel_position(c) * channel_size;
        encode_channel(&mut dst[offset..offset + channel_size], ty, color[c]);
    }
}

/// Decodes one stored pixel into a linear RGBA color. Channels the format
/// does not store default to `(0, 0, 0, 1)`.
pub fn decode_color(src: &[u8], format: PixelFormat, ty: ChannelType) -> Vec4 {
    debug_assert!(format.is_color());
    let channel_size = ty.size();
    let mut out = Vec4::new(0.0, 0.0, 0.0, 1.0);
    for c in 0..format.channel_count() {
        let offset = format.channel_position(c) * channel_size;
        out[c] = decode_channel(&src[offset..offset + channel_size], ty);
    }
    out
}

/// Packs a depth-stencil pixel: stencil in byte 0, then depth quantized to
/// 24 bits, little endian.
pub fn encode_depth_stencil(dst: &mut [u8], depth: f32, stencil: u8) {
    let qd = (depth.clamp(0.0, 1.0) * DEPTH24_MAX).round() as u32;
    dst[0] = stencil;
    dst[1] = qd as u8;
    dst[2] = (qd >> 8) as u8;
    dst[3] = (qd >> 16) as u8;
}

/// Inverse of [`encode_depth_stencil`].
pub fn decode_depth_stencil(src: &[u8]) -> (f32, u8) {
    let stencil = src[0];
    let qd = src[1] as u32 | (src[2] as u32) << 8 | (src[3] as u32) << 16;
    (qd as f32 / DEPTH24_MAX, stencil)
}

/// Encodes a depth value for a depth-only attachment.
pub fn encode_depth(dst: &mut [u8], depth: f32, ty: ChannelType) {
    encode_channel(dst, ty, depth)
}

/// Decodes a depth value from a depth-only attachment.
pub fn decode_depth(src: &[u8], ty: ChannelType) -> f32 {
    decode_channel(src, ty)
}
