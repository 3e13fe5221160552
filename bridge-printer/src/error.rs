//! Error types for the transport library

use thiserror::Error;

/// Printer transport error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// TCP connect did not complete within the timeout
    #[error("connect timeout: {0}")]
    ConnectTimeout(String),

    /// TCP connect was actively refused
    #[error("connection refused: {0}")]
    ConnectRefused(String),

    /// The supplied address does not parse as an IP
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// IO error while talking to the printer
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No usable IPv4 address on any local interface
    #[error("no local ipv4 address")]
    NoLocalIpv4,

    /// The OS spooler rejected the job; carries captured diagnostics
    #[error("os print error: {0}")]
    Spooler(String),

    /// Printing is not supported on this platform
    #[error("printing is not supported on this platform")]
    Unsupported,

    /// The USB library could not be initialized
    #[error("libusb unavailable: {0}")]
    LibusbUnavailable(String),

    /// No attached device matches the requested VID/PID (and bus/address)
    #[error("usb device not found")]
    DeviceNotFound,

    /// The device or interface is held by another driver
    #[error("usb device busy")]
    DeviceBusy,

    /// Any other libusb failure
    #[error("usb error: {0}")]
    Usb(#[from] rusb::Error),

    /// Claiming the target interface failed
    #[error("usb claim failed: {0}")]
    ClaimFailed(String),

    /// The bulk-OUT transfer itself failed
    #[error("bulk transfer failed: {0}")]
    BulkTransfer(rusb::Error),

    /// The transfer completed but moved fewer bytes than submitted
    #[error("partial transfer: wrote {written} of {total} bytes")]
    PartialTransfer { written: usize, total: usize },
}

impl PrintError {
    /// True when retrying the same operation cannot succeed without
    /// outside intervention (platform missing, device gone, bad input).
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PrintError::Unsupported | PrintError::InvalidAddress(_) | PrintError::DeviceNotFound
        )
    }
}

/// Result type for transport operations
pub type PrintResult<T> = Result<T, PrintError>;
