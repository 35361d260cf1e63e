use crate::types::DeviceErrorPayload;
use thiserror::Error;

/// Result type for Yeego operations
pub type Result<T> = std::result::Result<T, YeegoError>;

/// Errors that can occur while discovering or controlling lights
#[derive(Error, Debug)]
pub enum YeegoError {
    /// Malformed client input, rejected before any I/O
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No light with this id is known
    #[error("light not found: {0}")]
    NotFound(String),

    /// The command could not be handed to the device
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with a structured failure
    #[error("device error {}: {}", .0.code, .0.message)]
    Device(DeviceErrorPayload),

    /// No reply arrived within the command timeout
    #[error("timeout waiting for reply")]
    Timeout,

    /// The discovery scan itself failed
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Opening a connection to a device failed
    #[error("connect error: {0}")]
    Connect(String),

    /// Connection was closed while a reply was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// The event channel has no senders left
    #[error("event channel closed")]
    ChannelClosed,

    /// An event receiver fell behind and missed messages
    #[error("event receiver lagged by {0} messages")]
    Lagged(u64),

    /// A device sent something that is not a valid message
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
