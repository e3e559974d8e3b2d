//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error (refused, reset, unreachable)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Socket closed before any byte reached the printer
    #[error("Connection closed without sending data")]
    NothingSent,

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// USB device with the requested ids is not on the bus
    #[error("USB printer not found ({vendor_id:04x}:{product_id:04x})")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// No USB printer candidates on the bus
    #[error("No USB thermal printer found")]
    NoPrinters,

    /// Interface 0 has no bulk OUT endpoint
    #[error("USB printer has no bulk OUT endpoint")]
    NoOutEndpoint,

    /// Write attempted before connecting
    #[error("USB printer not connected")]
    NotConnected,

    /// libusb failure (busy, access denied, kernel driver, pipe error)
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// Bulk transfer accepted fewer bytes than sent
    #[error("Incomplete write: {written} of {expected} bytes")]
    IncompleteWrite { written: usize, expected: usize },

    /// Blocking USB task panicked or was cancelled
    #[error("USB task failed: {0}")]
    Task(String),
}

/// Broad failure class, used to decide who has to act
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient network/hardware trouble; a reprint may succeed
    Connectivity,
    /// Device or driver needs operator attention (replug, close other app)
    Device,
    /// Bad configuration
    Config,
}

impl PrintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PrintError::Connection(_)
            | PrintError::Io(_)
            | PrintError::Timeout(_)
            | PrintError::NothingSent => ErrorKind::Connectivity,
            PrintError::InvalidConfig(_) => ErrorKind::Config,
            PrintError::Usb(rusb::Error::Timeout) => ErrorKind::Connectivity,
            PrintError::DeviceNotFound { .. }
            | PrintError::NoPrinters
            | PrintError::NoOutEndpoint
            | PrintError::NotConnected
            | PrintError::Usb(_)
            | PrintError::IncompleteWrite { .. }
            | PrintError::Task(_) => ErrorKind::Device,
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
