// Crate-wide error type.
//
// Fatal conditions (device loss, pool/descriptor exhaustion, shader ABI
// mismatch) are represented here and propagated through `CysealResult`.
// Programming-error invariant breaks (an out-of-range index passed by
// code inside this crate) still panic; see the module docs on each
// offending call site.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CysealError {
    #[error("no suitable {0} adapter was found")]
    AdapterNotFound(&'static str),

    #[error("device was removed or lost")]
    DeviceLost,

    #[error("required feature tier not supported: {0}")]
    MissingFeatureTier(&'static str),

    #[error("pool '{name}' is out of space: requested {requested} bytes, {remaining} remain")]
    PoolExhausted {
        name: &'static str,
        requested: u64,
        remaining: u64,
    },

    #[error("descriptor heap '{name}' overflowed: {used}/{capacity} slots in use")]
    DescriptorHeapOverflow {
        name: &'static str,
        used: u32,
        capacity: u32,
    },

    #[error("command allocator {0} reset while its frame is still in flight")]
    AllocatorInFlight(u32),

    #[error("shader parameter table is missing a binding for '{0}'")]
    MissingShaderParameter(&'static str),

    #[error("swap chain is out of date and must be recreated")]
    SwapchainOutOfDate,

    #[cfg(feature = "vulkan")]
    #[error(transparent)]
    Vulkan(#[from] ash::vk::Result),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CysealResult<T> = Result<T, CysealError>;
