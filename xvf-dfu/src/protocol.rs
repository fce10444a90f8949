//! The DFU command set and the device-side interface state machine.
//!
//! The device owns its state; the host only reads it back via GETSTATE
//! and GETSTATUS and asserts it matches the step it is about to take.
//! All wire values are little-endian u32 and decode through exhaustive
//! matches; an unknown code surfaces as a [`ProtocolError`] instead of
//! aliasing to some default state.

use std::fmt;

use scroll::{Pread, LE};
use thiserror::Error;

/// Control resource ID the DFU commands are addressed to.
pub const RESOURCE_ID: u8 = 0xD0;

/// Largest DNLOAD payload the device accepts, excluding the block header.
pub const MAX_BLOCK_SIZE: usize = 512;

/// Top bit of the block number selects the data-image half of the
/// block-number space. With the bit clear, blocks address the boot image.
///
/// This creates a gap in the block number sequence when a boot image is
/// followed by a data image (for instance 0..8000 then a jump to 32768).
/// Not yet verified against third-party DFU tooling, so the resulting
/// 32768-block ceiling per image is treated as a hard limit.
pub const DATA_IMAGE_MARKER: u16 = 0x8000;

/// Maximum blocks per image, 15 bits of block number.
pub const MAX_BLOCK_COUNT: usize = 32768;

/// The DFU command set carried over the device control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DfuCommand {
    Detach,
    BusReset,
    Dnload,
    ClrStatus,
    Reboot,
    GetState,
    GetStatus,
    GetErrorInfo,
    OverrideSpispec,
}

impl DfuCommand {
    /// Command opcode within the DFU resource.
    pub fn code(self) -> u8 {
        match self {
            DfuCommand::Detach => 1,
            DfuCommand::BusReset => 2,
            DfuCommand::Dnload => 3,
            DfuCommand::ClrStatus => 4,
            DfuCommand::Reboot => 5,
            DfuCommand::GetState => 6,
            DfuCommand::GetStatus => 7,
            DfuCommand::GetErrorInfo => 8,
            DfuCommand::OverrideSpispec => 9,
        }
    }
}

impl fmt::Display for DfuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DfuCommand::Detach => "DETACH",
            DfuCommand::BusReset => "BUS_RESET",
            DfuCommand::Dnload => "DNLOAD",
            DfuCommand::ClrStatus => "CLRSTATUS",
            DfuCommand::Reboot => "REBOOT",
            DfuCommand::GetState => "GETSTATE",
            DfuCommand::GetStatus => "GETSTATUS",
            DfuCommand::GetErrorInfo => "GET_ERROR_INFO",
            DfuCommand::OverrideSpispec => "OVERRIDE_SPISPEC",
        };
        f.write_str(label)
    }
}

/// A malformed or unrecognised device response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("device reported unknown interface state code {0}")]
    UnknownState(u32),
    #[error("device reported unknown status code {0}")]
    UnknownStatus(u32),
    #[error("short response to {command}: expected {expected} bytes, received {received}")]
    ShortResponse {
        command: DfuCommand,
        expected: usize,
        received: usize,
    },
}

/// Interface state of the DFU state machine on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuState {
    AppIdle,
    AppDetach,
    DfuIdle,
    DfuDnloadSync,
    DfuDnBusy,
    DfuDnloadIdle,
    DfuManifestSync,
    DfuManifest,
    DfuManifestWaitReset,
    DfuUploadIdle,
    DfuError,
}

impl DfuState {
    /// Decode a state from its wire code.
    pub fn from_wire(code: u32) -> Result<DfuState, ProtocolError> {
        let state = match code {
            0 => DfuState::AppIdle,
            1 => DfuState::AppDetach,
            2 => DfuState::DfuIdle,
            3 => DfuState::DfuDnloadSync,
            4 => DfuState::DfuDnBusy,
            5 => DfuState::DfuDnloadIdle,
            6 => DfuState::DfuManifestSync,
            7 => DfuState::DfuManifest,
            8 => DfuState::DfuManifestWaitReset,
            9 => DfuState::DfuUploadIdle,
            10 => DfuState::DfuError,
            other => return Err(ProtocolError::UnknownState(other)),
        };
        Ok(state)
    }

    /// Wire code of this state.
    pub fn to_wire(self) -> u32 {
        match self {
            DfuState::AppIdle => 0,
            DfuState::AppDetach => 1,
            DfuState::DfuIdle => 2,
            DfuState::DfuDnloadSync => 3,
            DfuState::DfuDnBusy => 4,
            DfuState::DfuDnloadIdle => 5,
            DfuState::DfuManifestSync => 6,
            DfuState::DfuManifest => 7,
            DfuState::DfuManifestWaitReset => 8,
            DfuState::DfuUploadIdle => 9,
            DfuState::DfuError => 10,
        }
    }
}

impl fmt::Display for DfuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DfuState::AppIdle => "appIDLE",
            DfuState::AppDetach => "appDETACH",
            DfuState::DfuIdle => "dfuIDLE",
            DfuState::DfuDnloadSync => "dfuDNLOAD-SYNC",
            DfuState::DfuDnBusy => "dfuDNBUSY",
            DfuState::DfuDnloadIdle => "dfuDNLOAD-IDLE",
            DfuState::DfuManifestSync => "dfuMANIFEST-SYNC",
            DfuState::DfuManifest => "dfuMANIFEST",
            DfuState::DfuManifestWaitReset => "dfuMANIFEST-WAIT-RESET",
            DfuState::DfuUploadIdle => "dfuUPLOAD-IDLE",
            DfuState::DfuError => "dfuERROR",
        };
        f.write_str(label)
    }
}

/// Status code reported by GETSTATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfuStatus {
    Ok,
    ErrTarget,
    ErrFile,
    ErrWrite,
    ErrErase,
    ErrCheckErased,
    ErrProg,
    ErrVerify,
    ErrAddress,
    ErrNotDone,
    ErrFirmware,
    ErrVendor,
    ErrUsbR,
    ErrPor,
    ErrUnknown,
    ErrStalledPkt,
}

impl DfuStatus {
    /// Decode a status from its wire code.
    pub fn from_wire(code: u32) -> Result<DfuStatus, ProtocolError> {
        let status = match code {
            0 => DfuStatus::Ok,
            1 => DfuStatus::ErrTarget,
            2 => DfuStatus::ErrFile,
            3 => DfuStatus::ErrWrite,
            4 => DfuStatus::ErrErase,
            5 => DfuStatus::ErrCheckErased,
            6 => DfuStatus::ErrProg,
            7 => DfuStatus::ErrVerify,
            8 => DfuStatus::ErrAddress,
            9 => DfuStatus::ErrNotDone,
            10 => DfuStatus::ErrFirmware,
            11 => DfuStatus::ErrVendor,
            12 => DfuStatus::ErrUsbR,
            13 => DfuStatus::ErrPor,
            14 => DfuStatus::ErrUnknown,
            15 => DfuStatus::ErrStalledPkt,
            other => return Err(ProtocolError::UnknownStatus(other)),
        };
        Ok(status)
    }

    /// Wire code of this status.
    pub fn to_wire(self) -> u32 {
        match self {
            DfuStatus::Ok => 0,
            DfuStatus::ErrTarget => 1,
            DfuStatus::ErrFile => 2,
            DfuStatus::ErrWrite => 3,
            DfuStatus::ErrErase => 4,
            DfuStatus::ErrCheckErased => 5,
            DfuStatus::ErrProg => 6,
            DfuStatus::ErrVerify => 7,
            DfuStatus::ErrAddress => 8,
            DfuStatus::ErrNotDone => 9,
            DfuStatus::ErrFirmware => 10,
            DfuStatus::ErrVendor => 11,
            DfuStatus::ErrUsbR => 12,
            DfuStatus::ErrPor => 13,
            DfuStatus::ErrUnknown => 14,
            DfuStatus::ErrStalledPkt => 15,
        }
    }
}

impl fmt::Display for DfuStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DfuStatus::Ok => "OK",
            DfuStatus::ErrTarget => "errTARGET",
            DfuStatus::ErrFile => "errFILE",
            DfuStatus::ErrWrite => "errWRITE",
            DfuStatus::ErrErase => "errERASE",
            DfuStatus::ErrCheckErased => "errCHECK_ERASED",
            DfuStatus::ErrProg => "errPROG",
            DfuStatus::ErrVerify => "errVERIFY",
            DfuStatus::ErrAddress => "errADDRESS",
            DfuStatus::ErrNotDone => "errNOTDONE",
            DfuStatus::ErrFirmware => "errFIRMWARE",
            DfuStatus::ErrVendor => "errVENDOR",
            DfuStatus::ErrUsbR => "errUSBR",
            DfuStatus::ErrPor => "errPOR",
            DfuStatus::ErrUnknown => "errUNKNOWN",
            DfuStatus::ErrStalledPkt => "errSTALLEDPKT",
        };
        f.write_str(label)
    }
}

/// Decoded GETSTATUS response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetStatus {
    /// Status of the last operation.
    pub status: DfuStatus,
    /// Interface state after the request.
    pub state: DfuState,
    /// How long the host must wait before polling status again. The
    /// device dictates this; flash work happens behind it.
    pub poll_timeout_msec: u32,
}

impl GetStatus {
    /// Response size on the wire: three little-endian u32 words.
    pub const WIRE_LENGTH: usize = 12;

    /// Decode the 12 byte GETSTATUS response.
    pub fn parse(bytes: &[u8]) -> Result<GetStatus, ProtocolError> {
        if bytes.len() < Self::WIRE_LENGTH {
            return Err(ProtocolError::ShortResponse {
                command: DfuCommand::GetStatus,
                expected: Self::WIRE_LENGTH,
                received: bytes.len(),
            });
        }

        // length checked above, the reads cannot fail
        let status: u32 = bytes.pread_with(0, LE).unwrap_or_default();
        let state: u32 = bytes.pread_with(4, LE).unwrap_or_default();
        let poll_timeout_msec: u32 = bytes.pread_with(8, LE).unwrap_or_default();

        Ok(GetStatus {
            status: DfuStatus::from_wire(status)?,
            state: DfuState::from_wire(state)?,
            poll_timeout_msec,
        })
    }
}

/// Decode the 4 byte GETSTATE response.
pub fn parse_state(bytes: &[u8]) -> Result<DfuState, ProtocolError> {
    if bytes.len() < 4 {
        return Err(ProtocolError::ShortResponse {
            command: DfuCommand::GetState,
            expected: 4,
            received: bytes.len(),
        });
    }
    let code: u32 = bytes.pread_with(0, LE).unwrap_or_default();
    DfuState::from_wire(code)
}

/// Header prepended to every DNLOAD payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Partition marker in the top bit, block index in the low 15 bits.
    pub block_num: u16,
    /// Reserved, zero.
    pub pad: u16,
}

impl BlockHeader {
    /// Encoded size of the header.
    pub const LENGTH: usize = 4;

    /// Little-endian encoding of the header.
    pub fn to_le_bytes(self) -> [u8; Self::LENGTH] {
        let mut bytes = [0u8; Self::LENGTH];
        bytes[0..2].copy_from_slice(&self.block_num.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.pad.to_le_bytes());
        bytes
    }
}

/// Build a DNLOAD payload: block header followed by the chunk bytes.
pub fn dnload_payload(block_num: u16, chunk: &[u8]) -> Vec<u8> {
    let header = BlockHeader { block_num, pad: 0 };
    let mut payload = Vec::with_capacity(BlockHeader::LENGTH + chunk.len());
    payload.extend_from_slice(&header.to_le_bytes());
    payload.extend_from_slice(chunk);
    payload
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn state_wire_mapping_is_bidirectional() {
        for code in 0..11 {
            let state = DfuState::from_wire(code).unwrap();
            assert_eq!(state.to_wire(), code);
        }
        assert_eq!(
            DfuState::from_wire(11),
            Err(ProtocolError::UnknownState(11))
        );
    }

    #[test]
    fn status_wire_mapping_is_bidirectional() {
        for code in 0..16 {
            let status = DfuStatus::from_wire(code).unwrap();
            assert_eq!(status.to_wire(), code);
        }
        assert_eq!(
            DfuStatus::from_wire(16),
            Err(ProtocolError::UnknownStatus(16))
        );
    }

    #[test]
    fn state_labels() {
        assert_eq!(DfuState::AppIdle.to_string(), "appIDLE");
        assert_eq!(DfuState::DfuDnloadIdle.to_string(), "dfuDNLOAD-IDLE");
        assert_eq!(
            DfuState::DfuManifestWaitReset.to_string(),
            "dfuMANIFEST-WAIT-RESET"
        );
        assert_eq!(DfuState::DfuError.to_string(), "dfuERROR");
    }

    #[test]
    fn status_labels() {
        assert_eq!(DfuStatus::Ok.to_string(), "OK");
        assert_eq!(DfuStatus::ErrErase.to_string(), "errERASE");
        assert_eq!(DfuStatus::ErrStalledPkt.to_string(), "errSTALLEDPKT");
    }

    #[test]
    fn getstatus_parse() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u32.to_le_bytes()); // OK
        bytes.extend_from_slice(&4u32.to_le_bytes()); // dfuDNBUSY
        bytes.extend_from_slice(&250u32.to_le_bytes());

        assert_eq!(
            GetStatus::parse(&bytes),
            Ok(GetStatus {
                status: DfuStatus::Ok,
                state: DfuState::DfuDnBusy,
                poll_timeout_msec: 250,
            })
        );
    }

    #[test]
    fn getstatus_short_response() {
        assert_eq!(
            GetStatus::parse(&[0u8; 8]),
            Err(ProtocolError::ShortResponse {
                command: DfuCommand::GetStatus,
                expected: 12,
                received: 8,
            })
        );
    }

    #[test]
    fn getstatus_unknown_status_code() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&99u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            GetStatus::parse(&bytes),
            Err(ProtocolError::UnknownStatus(99))
        );
    }

    #[test]
    fn block_header_encoding() {
        let header = BlockHeader {
            block_num: 0x8003,
            pad: 0,
        };
        assert_eq!(header.to_le_bytes(), [0x03, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn dnload_payload_prepends_header() {
        let payload = dnload_payload(7, &[0xAA, 0xBB]);
        assert_eq!(payload, vec![0x07, 0x00, 0x00, 0x00, 0xAA, 0xBB]);
    }

    #[test]
    fn command_codes() {
        assert_eq!(DfuCommand::Detach.code(), 1);
        assert_eq!(DfuCommand::OverrideSpispec.code(), 9);
    }
}
