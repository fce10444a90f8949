//! USB implementation of the command transport.
//!
//! Commands travel as vendor control transfers against the device: the
//! command opcode goes in `bRequest`, the control resource ID in
//! `wIndex`, and the payload in the data stage. Reads use an IN transfer
//! of the expected response length.

use std::time::Duration;

use rusb::{DeviceHandle, Direction, GlobalContext, Recipient, RequestType};

use crate::device::DeviceId;
use crate::protocol::{DfuCommand, RESOURCE_ID};
use crate::transport::{CommandTransport, TransportError};

/// Interface number of the control interface on XVF devices.
const CONTROL_INTERFACE: u8 = 3;

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(1);

/// Command transport over USB vendor control transfers.
pub struct UsbTransport {
    handle: DeviceHandle<GlobalContext>,
}

impl UsbTransport {
    /// Find the device by vendor and product ID and claim its control
    /// interface.
    pub fn open(id: &DeviceId) -> Result<UsbTransport, TransportError> {
        let mut handle = rusb::open_device_with_vid_pid(id.vendor, id.product).ok_or(
            TransportError::DeviceNotFound {
                vendor: id.vendor,
                product: id.product,
            },
        )?;

        handle.claim_interface(CONTROL_INTERFACE)?;

        tracing::info!(
            "USB connected (vendor ID 0x{:04X}, product ID 0x{:04X})",
            id.vendor,
            id.product
        );

        Ok(UsbTransport { handle })
    }
}

impl CommandTransport for UsbTransport {
    fn read_command(
        &mut self,
        command: DfuCommand,
        len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        let mut response = vec![0u8; len];

        let received = self.handle.read_control(
            request_type,
            command.code(),
            0,
            u16::from(RESOURCE_ID),
            &mut response,
            TRANSFER_TIMEOUT,
        )?;

        if received != len {
            return Err(TransportError::NotEnoughBytesRead {
                expected: len,
                received,
            });
        }

        Ok(response)
    }

    fn write_command(&mut self, command: DfuCommand, payload: &[u8]) -> Result<(), TransportError> {
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);

        let written = self.handle.write_control(
            request_type,
            command.code(),
            0,
            u16::from(RESOURCE_ID),
            payload,
            TRANSFER_TIMEOUT,
        )?;

        if written != payload.len() {
            return Err(TransportError::NotEnoughBytesWritten {
                expected: payload.len(),
                written,
            });
        }

        Ok(())
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        // best effort, the device may already be rebooting
        let _ = self.handle.release_interface(CONTROL_INTERFACE);
    }
}
