//! Error types for ilbridge.

use thiserror::Error;

/// Result type alias using ilbridge's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bridge operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No buffer slot was available to satisfy a send.
    ///
    /// The port's queue was empty or disabled. Send never waits; the caller
    /// decides whether to retry or treat this as fatal.
    #[error("no buffer slot available")]
    NoBufferAvailable,

    /// The component reported a fault. The session is in its terminal error
    /// state and every pending waiter has been woken.
    #[error("component fault {code:#010x}: {message}")]
    Component {
        /// Vendor error code as reported by the component.
        code: u32,
        /// Human-readable fault description.
        message: String,
    },

    /// An operation was invoked against the protocol: wrong port direction,
    /// a command issued while another is pending, or use before init.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// A blocking wait was terminated because the session failed.
    #[error("wait aborted by session failure")]
    Aborted,

    /// A port definition could not be applied.
    #[error("invalid port definition: {0}")]
    InvalidDefinition(String),
}
