use thiserror::Error;

/// The single error enumeration propagated by every fallible operation in
/// this crate.
///
/// `InvalidStorage` and `InvalidIndex` are kept as numerically distinct
/// variants even though the C original assigns them the same value; see
/// DESIGN.md.
#[derive(Error, Debug)]
pub enum CatervaError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("invalid storage configuration: {0}")]
    InvalidStorage(String),

    #[error("required input was null/absent: {0}")]
    NullPointer(String),

    #[error("codec container operation failed: {0}")]
    CodecFailed(String),

    #[error("container is filled and accepts no more chunks")]
    ContainerFilled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatervaError>;
