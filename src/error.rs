use thiserror::Error;

/// Errors returned by channel and transport operations.
///
/// Every variant is reported to the caller of the offending operation.
/// Failures raised by handlers during dispatch never show up here; they are
/// reported as [`HandlerFailure`](crate::HandlerFailure) values instead.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The transport lacks one or more of the capabilities required to
    /// carry channels (subscribe, send, unsubscribe).
    #[error("invalid transport target: missing {0}")]
    InvalidTarget(String),

    /// An empty channel name was supplied.
    #[error("channel name must not be empty")]
    InvalidChannel,

    /// `emit` was called on a channel with no local registrations.
    #[error("no handlers registered for channel: {0}")]
    UnregisteredChannel(String),

    /// The instance was disposed and no longer accepts operations.
    #[error("channels instance has been disposed")]
    Disposed,

    /// JSON serialization of a payload failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The transport rejected an operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// A required builder field was not provided.
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Builder options that cannot be combined were used together.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
