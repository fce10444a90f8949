//! The transfer orchestrator.
//!
//! [`Dfu`] drives a firmware upgrade from start to finish: DETACH and
//! bus reset out of application mode, chunked DNLOAD with busy polling,
//! and the final zero-length block that triggers manifestation. The
//! device is authoritative over its own state machine; before every
//! protocol step the orchestrator reads the state back and aborts on
//! anything it did not expect.
//!
//! Everything here is synchronous and blocking. The only suspension is
//! the sleep between GETSTATUS polls, whose duration the device dictates
//! through `poll_timeout_msec`.

use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::{
    self, dnload_payload, DfuCommand, DfuState, DfuStatus, GetStatus, ProtocolError,
    DATA_IMAGE_MARKER, MAX_BLOCK_COUNT, MAX_BLOCK_SIZE,
};
use crate::transport::{CommandTransport, TransportError};

/// Errors raised while driving an upgrade.
///
/// All of these are fatal to the operation that observed them; the
/// orchestrator never retries a whole image. Where the device reported a
/// fault, the error carries whatever diagnostics could be fetched
/// best-effort before a single CLRSTATUS left the device recoverable.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transport error")]
    Transport(#[from] TransportError),
    #[error("malformed device response")]
    Protocol(#[from] ProtocolError),
    #[error("device state is {observed}, expected {expected}")]
    UnexpectedState {
        expected: DfuState,
        observed: DfuState,
    },
    #[error("device in dfuERROR state")]
    DeviceInError {
        /// Status fetched after the error state was observed, if the
        /// read succeeded.
        status: Option<DfuStatus>,
        /// Device-specific error detail, if the read succeeded.
        error_info: Option<u32>,
    },
    #[error("device status was {status} when OK expected (state {state})")]
    DeviceStatus {
        status: DfuStatus,
        state: DfuState,
        error_info: Option<u32>,
    },
    #[error("image of {length} bytes exceeds maximum {max_length} for block size {block_size}")]
    ImageTooLarge {
        length: usize,
        block_size: usize,
        max_length: usize,
    },
    #[error("block size {0} is not in 1..={MAX_BLOCK_SIZE}")]
    InvalidBlockSize(usize),
}

/// Drives DFU operations over an exclusively owned command transport.
pub struct Dfu<T: CommandTransport> {
    transport: T,
}

impl<T: CommandTransport> Dfu<T> {
    pub fn new(transport: T) -> Dfu<T> {
        Dfu { transport }
    }

    /// Give the transport back, consuming the engine.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn read(&mut self, command: DfuCommand, len: usize) -> Result<Vec<u8>, TransportError> {
        tracing::debug!("read command {command} ({len} bytes)");
        self.transport.read_command(command, len)
    }

    fn write(&mut self, command: DfuCommand, payload: &[u8]) -> Result<(), TransportError> {
        tracing::debug!("write command {command} ({} bytes)", payload.len());
        self.transport.write_command(command, payload)
    }

    /// Best-effort GET_ERROR_INFO; never masks the originating failure.
    fn read_error_info(&mut self) -> Option<u32> {
        let bytes = self.read(DfuCommand::GetErrorInfo, 4).ok()?;
        let info = u32::from_le_bytes(bytes.get(0..4)?.try_into().ok()?);
        tracing::warn!("info code {info}");
        Some(info)
    }

    /// Best-effort CLRSTATUS to leave the device recoverable.
    fn clear_status(&mut self) {
        tracing::warn!("send CLRSTATUS to attempt recovery");
        if let Err(error) = self.write(DfuCommand::ClrStatus, &[]) {
            tracing::warn!("CLRSTATUS failed: {error}");
        }
    }

    /// Read the interface state and require it to be `expected`.
    ///
    /// A device sitting in dfuERROR gets its status and error info read
    /// for diagnostics and one CLRSTATUS, then the operation fails.
    fn check_state(&mut self, expected: DfuState) -> Result<(), TransferError> {
        let bytes = self.read(DfuCommand::GetState, 4)?;
        let state = protocol::parse_state(&bytes)?;

        if state == DfuState::DfuError {
            tracing::warn!("device in dfuERROR state");

            let status = match self
                .read(DfuCommand::GetStatus, GetStatus::WIRE_LENGTH)
                .ok()
                .and_then(|bytes| GetStatus::parse(&bytes).ok())
            {
                Some(getstatus) => {
                    tracing::warn!("status {}", getstatus.status);
                    Some(getstatus.status)
                }
                None => None,
            };

            let error_info = self.read_error_info();
            self.clear_status();
            return Err(TransferError::DeviceInError { status, error_info });
        }

        if state != expected {
            tracing::error!("device state is {state}, expected {expected}");
            return Err(TransferError::UnexpectedState {
                expected,
                observed: state,
            });
        }

        Ok(())
    }

    /// Read GETSTATUS and require an OK status code.
    fn check_status(&mut self) -> Result<GetStatus, TransferError> {
        let bytes = self.read(DfuCommand::GetStatus, GetStatus::WIRE_LENGTH)?;
        let getstatus = GetStatus::parse(&bytes)?;

        if getstatus.status != DfuStatus::Ok {
            tracing::error!(
                "status was {} when {} expected (state {})",
                getstatus.status,
                DfuStatus::Ok,
                getstatus.state
            );
            let error_info = self.read_error_info();
            self.clear_status();
            return Err(TransferError::DeviceStatus {
                status: getstatus.status,
                state: getstatus.state,
                error_info,
            });
        }

        tracing::debug!("poll timeout {} msec", getstatus.poll_timeout_msec);
        Ok(getstatus)
    }

    /// Poll GETSTATUS until the device leaves `busy_state`, honoring the
    /// device-dictated poll interval. This is where the device does its
    /// flash work, hidden behind GETSTATUS.
    fn poll_while(&mut self, busy_state: DfuState) -> Result<(), TransferError> {
        loop {
            let getstatus = self.check_status()?;
            thread::sleep(Duration::from_millis(u64::from(getstatus.poll_timeout_msec)));
            if getstatus.state != busy_state {
                return Ok(());
            }
        }
    }

    /// Switch the device from application mode into DFU mode.
    pub fn detach_and_bus_reset(&mut self) -> Result<(), TransferError> {
        tracing::info!("detach and bus reset");

        self.check_state(DfuState::AppIdle)?;
        self.write(DfuCommand::Detach, &[])?;
        self.check_state(DfuState::AppDetach)?;
        self.write(DfuCommand::BusReset, &[])?;
        self.check_state(DfuState::DfuIdle)?;

        tracing::info!("detach and bus reset successful");
        Ok(())
    }

    /// Download one image into the half of the block-number space chosen
    /// by `marker` (0 for the boot image, [`DATA_IMAGE_MARKER`] for the
    /// data image).
    ///
    /// The image is rejected before any wire traffic if it does not fit
    /// the 15 bit block count.
    pub fn download_image(
        &mut self,
        bytes: &[u8],
        block_size: usize,
        marker: u16,
    ) -> Result<(), TransferError> {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(TransferError::InvalidBlockSize(block_size));
        }
        check_image_fits(bytes.len(), block_size)?;

        tracing::info!(
            "start download of {} bytes, block size {block_size}, marker 0x{marker:X}",
            bytes.len()
        );

        for (index, chunk) in bytes.chunks(block_size).enumerate() {
            tracing::info!("download block {index}, {} bytes", chunk.len());

            let block_num = marker | index as u16;
            self.write(DfuCommand::Dnload, &dnload_payload(block_num, chunk))?;

            self.poll_while(DfuState::DfuDnBusy)?;
            self.check_state(DfuState::DfuDnloadIdle)?;
        }

        // zero-length block signals end of image and starts the
        // device-internal manifest step
        self.write(DfuCommand::Dnload, &dnload_payload(marker, &[]))?;
        self.poll_while(DfuState::DfuManifest)?;
        self.check_state(DfuState::DfuIdle)?;

        Ok(())
    }

    /// Perform a full upgrade: detach, then download the data image
    /// followed by the boot image.
    ///
    /// The data image goes first so a cycle that fails partway leaves
    /// the fallback boot image untouched; the device tolerates stale or
    /// absent data, but not a corrupted boot image with no fallback.
    pub fn write_upgrade(
        &mut self,
        boot: Option<&[u8]>,
        data: Option<&[u8]>,
        block_size: usize,
        skip_boot_image: bool,
        skip_data_image: bool,
    ) -> Result<(), TransferError> {
        let boot = if skip_boot_image { None } else { boot };
        let data = if skip_data_image { None } else { data };

        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(TransferError::InvalidBlockSize(block_size));
        }
        // both images must fit before anything is sent
        if let Some(bytes) = boot {
            check_image_fits(bytes.len(), block_size)?;
        }
        if let Some(bytes) = data {
            check_image_fits(bytes.len(), block_size)?;
        }

        tracing::info!(
            "write upgrade, {} boot bytes and {} data bytes",
            boot.map_or(0, <[u8]>::len),
            data.map_or(0, <[u8]>::len)
        );

        self.detach_and_bus_reset()?;

        if let Some(bytes) = data {
            self.download_image(bytes, block_size, DATA_IMAGE_MARKER)?;
        }
        if let Some(bytes) = boot {
            self.download_image(bytes, block_size, 0)?;
        }

        tracing::info!("write upgrade successful");
        Ok(())
    }

    /// Replace the flash SPI specification the device uses. A single
    /// write, no state machine involvement.
    pub fn override_spispec(&mut self, bytes: &[u8]) -> Result<(), TransferError> {
        tracing::info!("override spispec ({} bytes)", bytes.len());
        self.write(DfuCommand::OverrideSpispec, bytes)?;
        Ok(())
    }

    /// Reboot the device, typically after a successful upgrade.
    pub fn reboot(&mut self) -> Result<(), TransferError> {
        tracing::info!("reboot");
        self.write(DfuCommand::Reboot, &[])?;
        Ok(())
    }
}

fn check_image_fits(length: usize, block_size: usize) -> Result<(), TransferError> {
    let max_length = MAX_BLOCK_COUNT * block_size;
    if length > max_length {
        return Err(TransferError::ImageTooLarge {
            length,
            block_size,
            max_length,
        });
    }
    Ok(())
}
