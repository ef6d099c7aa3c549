use thiserror::Error;

/// The closed set of tagged error kinds this allocator can raise.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("system heap refused to provide memory")]
    OutOfMemory,

    #[error("page cap reached: no more pages may be created")]
    NoPages,

    #[error("address {0:#x} was already released")]
    MultipleFree(usize),

    #[error("address {0:#x} does not fall on a slot boundary")]
    BadBoundary(usize),

    #[error("padding around address {0:#x} is corrupted")]
    CorruptedBlock(usize),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

pub type PoolResult<T> = Result<T, PoolError>;
