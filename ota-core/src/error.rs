use std::io;

use thiserror::Error;

/// Boxed error reported by a flash or HTTP capability.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a single update attempt ended without restarting the device.
///
/// Every variant is terminal for the current attempt; nothing in the engine
/// retries.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("update target is invalid")]
    InvalidTarget(#[from] TargetError),

    #[error("connection to {host}:{port} failed")]
    ConnectionFailure {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("no response within {0} ms")]
    Timeout(u64),

    #[error("server answered with status {0:?} instead of 200")]
    NonOkStatus(Option<u16>),

    #[error("response carried no usable content (length {content_length}, octet-stream: {content_type_valid})")]
    NoUsableContent {
        content_length: usize,
        content_type_valid: bool,
    },

    #[error("response ended or failed before the header block was complete")]
    MalformedResponse(#[source] io::Error),

    #[error("not enough space to begin the update")]
    InsufficientStorage(#[source] BoxError),

    #[error("written only {written}/{declared} bytes")]
    ShortWrite { written: usize, declared: usize },

    #[error("finalizing the update failed")]
    FinalizeFailure(#[source] BoxError),

    #[error("update finalized but the target reports it is not finished")]
    IncompleteAfterFinalize,

    #[error("flash writer already used (state {0:?})")]
    InvalidState(crate::flash::TxState),
}

/// Rejected update target field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("host is {len} bytes, at most {max} allowed")]
    HostTooLong { len: usize, max: usize },

    #[error("path is {len} bytes, at most {max} allowed")]
    PathTooLong { len: usize, max: usize },

    #[error("path {0:?} must start with '/'")]
    RelativePath(String),
}

/// Why a manifest check could not produce a decision.
#[derive(Debug, Error)]
pub enum CheckFailure {
    #[error("manifest URL {url:?} is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("manifest request failed")]
    Network(#[source] BoxError),

    #[error("manifest request returned status {0}")]
    Status(u16),

    #[error("manifest body is not valid")]
    Malformed(#[source] serde_json::Error),

    #[error("manifest names an unusable target")]
    InvalidTarget(#[source] TargetError),
}
