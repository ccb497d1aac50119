// Error taxonomy
//
// `GpuError` is what a GPU provider reports. `ShellError` is what the frame
// loop and the batching renderer surface to their caller. Presentation
// staleness is not in here: it travels as `AcquireStatus` / `PresentStatus`.

use thiserror::Error;

/// Failure reported by a GPU device or presentation provider.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("device lost")]
    DeviceLost,

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("wait timed out")]
    Timeout,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("shader: {0}")]
    Shader(String),

    #[error("{0}")]
    Driver(String),
}

pub type GpuResult<T> = std::result::Result<T, GpuError>;

/// Fault surfaced by the application shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No adapter, no surface, no device. Startup cannot continue.
    #[error("initialization failed: {0}")]
    Init(String),

    /// A fence wait or acquire failed outside the recoverable set.
    #[error("synchronization failed: {0}")]
    Sync(#[source] GpuError),

    #[error("GPU failure: {0}")]
    Gpu(#[from] GpuError),

    #[error("virtual texture table is full ({capacity} entries); optimize before registering more")]
    CapacityExceeded { capacity: u32 },

    #[error("layer requested a deferred task while not attached to an application")]
    LayerDetached,

    #[error("misuse: {0}")]
    Misuse(&'static str),

    #[error("platform: {0}")]
    Platform(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ShellError>;

impl ShellError {
    pub fn sync(err: GpuError) -> Self {
        ShellError::Sync(err)
    }
}
