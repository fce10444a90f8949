//! I2C implementation of the command transport, Linux only.
//!
//! Commands are framed as a four byte header over the raw I2C stream:
//! resource ID, command opcode, payload length as a little-endian u16
//! (a DNLOAD payload with its block header exceeds one byte's range). A
//! write command appends the payload to the header in one transaction; a
//! read command writes the header and then reads the response bytes back.

use std::path::Path;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;

use crate::device::DeviceId;
use crate::protocol::{DfuCommand, RESOURCE_ID};
use crate::transport::{CommandTransport, TransportError};

/// Command transport over a Linux `/dev/i2c-*` bus.
pub struct I2cTransport {
    dev: LinuxI2CDevice,
}

impl I2cTransport {
    /// Open the I2C bus at `path` and address the device's control
    /// interface.
    pub fn open(path: impl AsRef<Path>, id: &DeviceId) -> Result<I2cTransport, TransportError> {
        let dev = LinuxI2CDevice::new(path, u16::from(id.transport_address))
            .map_err(|e| TransportError::I2c(Box::new(e)))?;

        tracing::info!("I2C connected (slave address 0x{:X})", id.transport_address);

        Ok(I2cTransport { dev })
    }

    fn header(command: DfuCommand, len: usize) -> [u8; 4] {
        let len = (len as u16).to_le_bytes();
        [RESOURCE_ID, command.code(), len[0], len[1]]
    }
}

impl CommandTransport for I2cTransport {
    fn read_command(
        &mut self,
        command: DfuCommand,
        len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        self.dev
            .write(&Self::header(command, len))
            .map_err(|e| TransportError::I2c(Box::new(e)))?;

        let mut response = vec![0u8; len];
        self.dev
            .read(&mut response)
            .map_err(|e| TransportError::I2c(Box::new(e)))?;

        Ok(response)
    }

    fn write_command(&mut self, command: DfuCommand, payload: &[u8]) -> Result<(), TransportError> {
        let mut message = Vec::with_capacity(4 + payload.len());
        message.extend_from_slice(&Self::header(command, payload.len()));
        message.extend_from_slice(payload);

        self.dev
            .write(&message)
            .map_err(|e| TransportError::I2c(Box::new(e)))
    }
}
