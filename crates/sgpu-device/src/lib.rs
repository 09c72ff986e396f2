//! The validating façade over the rendering pipeline: device initialization,
//! the sticky error model, the framebuffer pool, and the clear and draw entry
//! points.

pub mod device;
pub mod error;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use crate::device::{Capability, Device, DeviceCreateInfo, DEFAULT_FRAMEBUFFER};
    pub use crate::error::DeviceCreateError;
    pub use sgpu_pipeline::prelude::*;
}
