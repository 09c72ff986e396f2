use sgpu_formats::attachment::AttachmentCreateError;
use sgpu_formats::format::PixelFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceCreateError {
    #[error("{0:?} is not a color-renderable format")]
    InvalidColorFormat(PixelFormat),
    #[error(transparent)]
    Attachment(#[from] AttachmentCreateError),
    #[error("worker pool construction failed: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
