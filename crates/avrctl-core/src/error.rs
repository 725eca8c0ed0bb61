//! Error types for avrctl.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-level and protocol-level
//! failures are all captured here.
//!
//! Note that decode mismatches are *not* errors: the AVR control protocol
//! has no negative-acknowledgment concept, so payloads that match no known
//! shape and lines whose prefix matches no registered command are silently
//! dropped by the decoders rather than surfaced through this type.

/// The error type for all avrctl operations.
///
/// Variants cover the failure modes encountered when talking to a network
/// receiver: connection establishment, writes on a dead socket, and
/// invalid parameters passed to the typed setters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP connect refused, socket failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out while establishing the connection.
    ///
    /// Receivers accept exactly one control connection; a timeout usually
    /// means the unit is powered down, unreachable, or already claimed by
    /// another controller.
    #[error("timeout connecting to receiver")]
    Timeout,

    /// An invalid parameter was passed to a command builder or setter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the receiver has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the receiver was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
