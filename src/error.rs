//! Unified error kinds for the LwM2M client firmware.
//!
//! Every data-model callback and socket operation returns [`ErrorKind`].
//! Port-level errors (storage, PWM, modem, Wi-Fi) convert into it through
//! `From`, so `?` works across the adapter boundary. All variants are `Copy`
//! so they travel through the transaction runtime without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A peripheral could not be configured while creating an object.
    HardwareInit,
    /// Unexpected internal failure (hardware write, interface query,
    /// misuse of the transaction protocol).
    Internal,
    /// The request carried a malformed or out-of-range value.
    BadRequest,
    /// The addressed instance does not exist.
    NotFound,
    /// The resource does not support the requested operation.
    MethodNotAllowed,
    /// Modem or socket I/O failed.
    Io,
    /// A bounded wait elapsed.
    Timeout,
    /// Host name resolution failed.
    AddressNotAvailable,
    /// The remote end refused or the modem could not open the connection.
    ConnectionRefused,
    /// A datagram may have been truncated by the caller's buffer.
    MessageTooLarge,
    /// A numeric value does not fit its target range.
    Overflow,
    /// An allocation or fixed-capacity buffer was exhausted.
    OutOfMemory,
    /// The socket option cannot be used in this direction.
    NotSupported,
}

impl ErrorKind {
    /// CoAP response code (class << 5 | detail) reported to the server when
    /// this error terminates a data-model operation.
    pub const fn coap_code(self) -> u8 {
        match self {
            Self::BadRequest | Self::Overflow => coap(4, 0),
            Self::NotFound => coap(4, 4),
            Self::MethodNotAllowed => coap(4, 5),
            Self::MessageTooLarge => coap(4, 13),
            Self::NotSupported => coap(5, 1),
            Self::Timeout => coap(5, 4),
            Self::HardwareInit
            | Self::Internal
            | Self::Io
            | Self::AddressNotAvailable
            | Self::ConnectionRefused
            | Self::OutOfMemory => coap(5, 0),
        }
    }
}

const fn coap(class: u8, detail: u8) -> u8 {
    (class << 5) | detail
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardwareInit => write!(f, "hardware initialisation failed"),
            Self::Internal => write!(f, "internal error"),
            Self::BadRequest => write!(f, "bad request"),
            Self::NotFound => write!(f, "not found"),
            Self::MethodNotAllowed => write!(f, "method not allowed"),
            Self::Io => write!(f, "I/O error"),
            Self::Timeout => write!(f, "timed out"),
            Self::AddressNotAvailable => write!(f, "address not available"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::MessageTooLarge => write!(f, "message too large"),
            Self::Overflow => write!(f, "value overflow"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::NotSupported => write!(f, "operation not supported"),
        }
    }
}

impl std::error::Error for ErrorKind {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ErrorKind>;
