use thiserror::Error;

pub type Result<T> = std::result::Result<T, HdaError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HdaError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("codec {codec} did not answer after {retries} polls")]
    Timeout { codec: u8, retries: u32 },

    #[error("stream {stream} already holds tag {tag}")]
    AlreadyStarted { stream: usize, tag: u8 },

    #[error("not ready: {0}")]
    NotReady(&'static str),

    #[error("out of resources: {0}")]
    OutOfResources(&'static str),

    #[error("device error: {0}")]
    DeviceError(&'static str),

    #[error("not found: {0}")]
    NotFound(&'static str),
}

/// Failures reported by the platform collaborator (MMIO window, DMA allocator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("register access at offset {offset:#x} ({size} bytes) failed")]
    Io { offset: u32, size: usize },

    #[error("out of DMA memory allocating {len} bytes")]
    OutOfMemory { len: usize },
}

impl From<PlatformError> for HdaError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Io { .. } => HdaError::DeviceError("register access failed"),
            PlatformError::OutOfMemory { .. } => {
                HdaError::OutOfResources("DMA buffer allocation failed")
            }
        }
    }
}
