//! Error taxonomy for the adapter core (spec §7).
//!
//! These are classifications, not a single exception hierarchy: each
//! kind is converted to a failed DAP response (or, for transport/framing
//! failures, to connection teardown) at the point named in spec §7.

use thiserror::Error;

/// Errors raised by the text and binary framing codecs (spec §4.1).
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("missing Content-Length header")]
    ContentLengthMissing,
    #[error("malformed Content-Length value: {0:?}")]
    MalformedContentLength(String),
    #[error("short read: connection closed mid-frame")]
    ShortRead,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("bad magic bytes in binary frame header")]
    BadMagic,
    #[error("unsupported binary frame version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown binary frame kind {0}")]
    UnknownKind(u8),
    #[error("I/O error while framing: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while binding or connecting a [`crate::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport family unsupported on this platform: {0}")]
    Unsupported(&'static str),
    #[error("I/O error on transport: {0}")]
    Io(#[from] std::io::Error),
}

/// Bad `launch`/`attach` arguments (spec §7 `ConfigurationError`).
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failure reported by the debuggee (spec §7 `BackendError`).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable")]
    Unavailable,
    #[error("{0}")]
    Reported(String),
}

/// The command correlator timed out awaiting a response (spec §4.4, §5).
#[derive(Debug, Error)]
#[error("Command '{command}' timed out after {seconds}s")]
pub struct TimeoutError {
    pub command: String,
    pub seconds: f64,
}

/// An invalid lifecycle transition was attempted (spec §4.5).
///
/// This is a programming error: it is logged and re-raised, and must
/// never escape to the IDE as a DAP response (spec §7).
#[derive(Debug, Error)]
#[error("invalid lifecycle transition: {from:?} -> {to:?}")]
pub struct LifecycleTransitionError {
    pub from: crate::lifecycle::State,
    pub to: crate::lifecycle::State,
}

/// The top-level error type threaded through request handlers.
///
/// Every variant maps to a `success=false` DAP response carrying a
/// stable, human-readable `message` prefix (spec §7), except
/// [`DispatchError::Lifecycle`], which never reaches the wire.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unsupported command: {0}")]
    UnknownCommand(String),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleTransitionError),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
