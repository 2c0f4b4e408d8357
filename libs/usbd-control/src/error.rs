use core::fmt;

use usb_device::UsbError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// bRequest or descriptor type that this device does not implement
    UnsupportedRequest,
    /// wValue/wIndex/wLength outside of what the request allows
    InvalidRequest,
    /// request is not legal in the current device state
    InvalidState,
    /// endpoint index out of range, or endpoint 0 where it is not allowed
    InvalidEndpoint,
    /// the class callback declined the request
    ClassRejected,
    /// the hardware driver could not perform the operation
    Driver(UsbError),
}

impl Error {
    /// Protocol errors are answered with a STALL and never leave the core.
    pub fn is_protocol(&self) -> bool { !matches!(self, Error::Driver(_)) }

    /// The driver asked to be called again later; the endpoint-0 session is left intact so
    /// that [`crate::UsbDeviceCore::rearm`] can re-issue the pending packet.
    pub fn is_retryable(&self) -> bool { matches!(self, Error::Driver(UsbError::WouldBlock)) }
}

impl From<UsbError> for Error {
    fn from(e: UsbError) -> Self { Error::Driver(e) }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedRequest => f.write_str("unsupported request"),
            Error::InvalidRequest => f.write_str("malformed request"),
            Error::InvalidState => f.write_str("request not allowed in current device state"),
            Error::InvalidEndpoint => f.write_str("invalid endpoint"),
            Error::ClassRejected => f.write_str("class callback rejected request"),
            Error::Driver(e) => write!(f, "driver error: {:?}", e),
        }
    }
}
