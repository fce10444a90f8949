//! Command transport capability.
//!
//! The DFU engine never touches USB or I2C directly; it issues read and
//! write commands against the DFU control resource through the
//! [`CommandTransport`] trait. USB and I2C implementations are selected
//! at runtime, and tests inject a [`mock::MockTransport`].

#[cfg(target_os = "linux")]
mod i2c;
#[cfg(any(test, feature = "test"))]
pub mod mock;
mod usb;

#[cfg(target_os = "linux")]
pub use i2c::I2cTransport;
pub use usb::UsbTransport;

use thiserror::Error;

use crate::protocol::DfuCommand;

/// Errors raised by a command transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("USB communication error")]
    Usb(#[from] rusb::Error),
    #[error("I2C communication error")]
    I2c(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("no device found with vendor ID 0x{vendor:04X}, product ID 0x{product:04X}")]
    DeviceNotFound { vendor: u16, product: u16 },
    #[error("short read: expected {expected} bytes, received {received}")]
    NotEnoughBytesRead { expected: usize, received: usize },
    #[error("short write: expected {expected} bytes, wrote {written}")]
    NotEnoughBytesWritten { expected: usize, written: usize },
}

/// A connection to the device control interface, able to issue read and
/// write commands against the DFU resource.
///
/// One in-flight operation owns the transport exclusively; the device has
/// a single DFU state, so concurrent upgrades are meaningless.
pub trait CommandTransport {
    /// Issue a read command and return exactly `len` response bytes.
    fn read_command(&mut self, command: DfuCommand, len: usize)
        -> Result<Vec<u8>, TransportError>;

    /// Issue a write command carrying `payload`, which may be empty.
    fn write_command(&mut self, command: DfuCommand, payload: &[u8])
        -> Result<(), TransportError>;
}

impl<T: CommandTransport + ?Sized> CommandTransport for Box<T> {
    fn read_command(
        &mut self,
        command: DfuCommand,
        len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read_command(command, len)
    }

    fn write_command(&mut self, command: DfuCommand, payload: &[u8]) -> Result<(), TransportError> {
        (**self).write_command(command, payload)
    }
}
