//! DFU file suffix codec.
//!
//! An upgrade image carries a 16 byte trailer with a CRC32 of the payload
//! and the identity of the device it is meant for. The trailer is written
//! to disk in reverse byte order: byte `i` of [`DfuSuffix`] sits at file
//! offset `len - 1 - i`, with multi-byte fields little-endian before the
//! reversal. Both directions of that framing live here and nowhere else.

use thiserror::Error;

use crate::crc;
use crate::device::DeviceId;

/// The three magic bytes, "DFU" read backwards from the end of the file.
pub const DFU_SIGNATURE: [u8; 3] = [0x44, 0x46, 0x55];

/// DFU specification release the suffix layout follows.
pub const DFU_BCD: u16 = 0x0110;

/// On-disk size of the suffix.
pub const SUFFIX_LENGTH: usize = 16;

/// Identity value that disables the check for its field.
pub const WILDCARD_ID: u16 = 0xFFFF;

/// Decoded DFU file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfuSuffix {
    /// CRC32 of the file excluding the suffix. Note that this differs
    /// from the USB DFU specification, which includes the suffix bytes
    /// up to the CRC field itself.
    pub crc: u32,
    /// Length of the suffix, always 16.
    pub suffix_length: u8,
    /// Magic bytes, [`DFU_SIGNATURE`].
    pub signature: [u8; 3],
    /// DFU specification release, [`DFU_BCD`].
    pub bcd_dfu: u16,
    /// Vendor ID the image is built for, or [`WILDCARD_ID`].
    pub vendor_id: u16,
    /// Product ID the image is built for, or [`WILDCARD_ID`].
    pub product_id: u16,
    /// Device release the image is built for, or [`WILDCARD_ID`].
    pub bcd_device: u16,
}

/// The ways suffix verification can reject a file.
///
/// Each variant carries the on-disk and expected values so callers can
/// report or match on them without parsing messages. [`SuffixError::code`]
/// is stable and used as a process exit code by the CLI.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SuffixError {
    #[error("file of {length} bytes is too small (need at least suffix length {SUFFIX_LENGTH})")]
    TooSmall { length: usize },
    #[error("checksum mismatch: suffix 0x{suffix:08X} computed 0x{computed:08X}")]
    ChecksumMismatch { suffix: u32, computed: u32 },
    #[error("suffix length field: suffix 0x{suffix:02X} should be 0x{SUFFIX_LENGTH:02X}")]
    BadSuffixLength { suffix: u8 },
    #[error("signature field: is {suffix:02X?} should be {DFU_SIGNATURE:02X?}")]
    BadSignature { suffix: [u8; 3] },
    #[error("bcdDFU field: suffix 0x{suffix:04X} should be 0x{DFU_BCD:04X}")]
    BadSpecVersion { suffix: u16 },
    #[error("vendor ID mismatch: suffix 0x{suffix:04X} expected 0x{expected:04X}")]
    VendorIdMismatch { suffix: u16, expected: u16 },
    #[error("product ID mismatch: suffix 0x{suffix:04X} expected 0x{expected:04X}")]
    ProductIdMismatch { suffix: u16, expected: u16 },
    #[error("bcdDevice mismatch: suffix 0x{suffix:04X} expected 0x{expected:04X}")]
    BcdDeviceMismatch { suffix: u16, expected: u16 },
}

impl SuffixError {
    /// Stable numeric failure code, 1 through 8.
    pub fn code(&self) -> u8 {
        match self {
            SuffixError::TooSmall { .. } => 1,
            SuffixError::ChecksumMismatch { .. } => 2,
            SuffixError::BadSuffixLength { .. } => 3,
            SuffixError::BadSignature { .. } => 4,
            SuffixError::BadSpecVersion { .. } => 5,
            SuffixError::VendorIdMismatch { .. } => 6,
            SuffixError::ProductIdMismatch { .. } => 7,
            SuffixError::BcdDeviceMismatch { .. } => 8,
        }
    }
}

impl DfuSuffix {
    /// Decode from the suffix bytes in struct order (after the on-disk
    /// reversal has been undone).
    fn from_raw(raw: &[u8; SUFFIX_LENGTH]) -> DfuSuffix {
        DfuSuffix {
            crc: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            suffix_length: raw[4],
            signature: [raw[5], raw[6], raw[7]],
            bcd_dfu: u16::from_le_bytes([raw[8], raw[9]]),
            vendor_id: u16::from_le_bytes([raw[10], raw[11]]),
            product_id: u16::from_le_bytes([raw[12], raw[13]]),
            bcd_device: u16::from_le_bytes([raw[14], raw[15]]),
        }
    }

    /// Encode into struct order, little-endian fields.
    fn to_raw(self) -> [u8; SUFFIX_LENGTH] {
        let mut raw = [0u8; SUFFIX_LENGTH];
        raw[0..4].copy_from_slice(&self.crc.to_le_bytes());
        raw[4] = self.suffix_length;
        raw[5..8].copy_from_slice(&self.signature);
        raw[8..10].copy_from_slice(&self.bcd_dfu.to_le_bytes());
        raw[10..12].copy_from_slice(&self.vendor_id.to_le_bytes());
        raw[12..14].copy_from_slice(&self.product_id.to_le_bytes());
        raw[14..16].copy_from_slice(&self.bcd_device.to_le_bytes());
        raw
    }
}

fn id_mismatch(suffix: u16, expected: u16) -> bool {
    suffix != WILDCARD_ID && expected != WILDCARD_ID && suffix != expected
}

/// Verify the suffix of `file` against `expected` and return the payload
/// length with the suffix stripped.
///
/// The vendor/product/bcdDevice checks are skipped when either side is
/// [`WILDCARD_ID`].
pub fn verify(file: &[u8], expected: &DeviceId) -> Result<usize, SuffixError> {
    if file.len() < SUFFIX_LENGTH {
        return Err(SuffixError::TooSmall { length: file.len() });
    }

    // undo the reversed on-disk order of the trailer
    let trailer = &file[file.len() - SUFFIX_LENGTH..];
    let mut raw = [0u8; SUFFIX_LENGTH];
    for (i, byte) in raw.iter_mut().enumerate() {
        *byte = trailer[SUFFIX_LENGTH - 1 - i];
    }
    let suffix = DfuSuffix::from_raw(&raw);

    let payload = &file[..file.len() - SUFFIX_LENGTH];
    let computed = crc::checksum(payload);
    if suffix.crc != computed {
        return Err(SuffixError::ChecksumMismatch {
            suffix: suffix.crc,
            computed,
        });
    }

    if usize::from(suffix.suffix_length) != SUFFIX_LENGTH {
        return Err(SuffixError::BadSuffixLength {
            suffix: suffix.suffix_length,
        });
    }

    if suffix.signature != DFU_SIGNATURE {
        return Err(SuffixError::BadSignature {
            suffix: suffix.signature,
        });
    }

    if suffix.bcd_dfu != DFU_BCD {
        return Err(SuffixError::BadSpecVersion {
            suffix: suffix.bcd_dfu,
        });
    }

    if id_mismatch(suffix.vendor_id, expected.vendor) {
        return Err(SuffixError::VendorIdMismatch {
            suffix: suffix.vendor_id,
            expected: expected.vendor,
        });
    }

    if id_mismatch(suffix.product_id, expected.product) {
        return Err(SuffixError::ProductIdMismatch {
            suffix: suffix.product_id,
            expected: expected.product,
        });
    }

    if id_mismatch(suffix.bcd_device, expected.bcddevice) {
        return Err(SuffixError::BcdDeviceMismatch {
            suffix: suffix.bcd_device,
            expected: expected.bcddevice,
        });
    }

    Ok(payload.len())
}

/// Build the 16 suffix bytes to append to `payload` for device `id`.
///
/// Identity fields should be real IDs or [`WILDCARD_ID`]; zero is never a
/// legal value for generation.
pub fn generate(payload: &[u8], id: &DeviceId) -> [u8; SUFFIX_LENGTH] {
    let suffix = DfuSuffix {
        crc: crc::checksum(payload),
        suffix_length: SUFFIX_LENGTH as u8,
        signature: DFU_SIGNATURE,
        bcd_dfu: DFU_BCD,
        vendor_id: id.vendor,
        product_id: id.product,
        bcd_device: id.bcddevice,
    };

    let raw = suffix.to_raw();
    let mut reversed = [0u8; SUFFIX_LENGTH];
    for (i, byte) in reversed.iter_mut().enumerate() {
        *byte = raw[SUFFIX_LENGTH - 1 - i];
    }
    reversed
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn id(vendor: u16, product: u16, bcddevice: u16) -> DeviceId {
        DeviceId {
            vendor,
            product,
            bcddevice,
            transport_address: DeviceId::DEFAULT_TRANSPORT_ADDRESS,
        }
    }

    fn suffixed(payload: &[u8], id: &DeviceId) -> Vec<u8> {
        let mut file = payload.to_vec();
        file.extend_from_slice(&generate(payload, id));
        file
    }

    #[test]
    fn round_trip() {
        for payload in [&b"\x00"[..], b"firmware image", &[0xFF; 1000]] {
            let id = id(0x20B1, 0x0014, 0x0102);
            let file = suffixed(payload, &id);
            assert_eq!(verify(&file, &id), Ok(payload.len()));
        }
    }

    #[test]
    fn round_trip_empty_payload() {
        let id = id(0x20B1, 0x0014, WILDCARD_ID);
        let file = suffixed(&[], &id);
        assert_eq!(verify(&file, &id), Ok(0));
    }

    #[test]
    fn too_small() {
        let id = id(0x20B1, 0x0014, WILDCARD_ID);
        assert_eq!(
            verify(&[0u8; 15], &id),
            Err(SuffixError::TooSmall { length: 15 })
        );
    }

    #[test]
    fn wildcard_on_either_side() {
        let payload = b"payload";

        // wildcard in the suffix, real ID expected
        let file = suffixed(payload, &id(WILDCARD_ID, WILDCARD_ID, WILDCARD_ID));
        assert!(verify(&file, &id(0x20B1, 0x0014, 0x0300)).is_ok());

        // real IDs in the suffix, wildcard expected
        let file = suffixed(payload, &id(0x20B1, 0x0014, 0x0300));
        assert!(verify(&file, &id(WILDCARD_ID, WILDCARD_ID, WILDCARD_ID)).is_ok());
    }

    #[test]
    fn identity_mismatches() {
        let payload = b"payload";
        let file = suffixed(payload, &id(0x20B1, 0x0014, 0x0300));

        assert_eq!(
            verify(&file, &id(0x1234, 0x0014, 0x0300)),
            Err(SuffixError::VendorIdMismatch {
                suffix: 0x20B1,
                expected: 0x1234
            })
        );
        assert_eq!(
            verify(&file, &id(0x20B1, 0x0015, 0x0300)),
            Err(SuffixError::ProductIdMismatch {
                suffix: 0x0014,
                expected: 0x0015
            })
        );
        assert_eq!(
            verify(&file, &id(0x20B1, 0x0014, 0x0301)),
            Err(SuffixError::BcdDeviceMismatch {
                suffix: 0x0300,
                expected: 0x0301
            })
        );
    }

    #[test]
    fn corruption_is_detected() {
        let payload = b"a short firmware image";
        let id = id(0x20B1, 0x0014, WILDCARD_ID);
        let file = suffixed(payload, &id);

        for i in 0..payload.len() {
            let mut corrupted = file.clone();
            corrupted[i] ^= 0x01;
            match verify(&corrupted, &id) {
                Err(SuffixError::ChecksumMismatch { .. }) => {}
                other => panic!("byte {i}: expected checksum mismatch, got {other:?}"),
            }
        }
    }

    #[test]
    fn bad_signature() {
        let payload = b"payload";
        let id = id(0x20B1, 0x0014, WILDCARD_ID);
        let mut file = suffixed(payload, &id);

        // struct offset 5 is the first signature byte; the CRC does not
        // cover the suffix, so no recompute needed
        let len = file.len();
        file[len - 1 - 5] = b'X';
        assert!(matches!(
            verify(&file, &id),
            Err(SuffixError::BadSignature { .. })
        ));
    }

    #[test]
    fn bad_suffix_length_field() {
        let payload = b"payload";
        let id = id(0x20B1, 0x0014, WILDCARD_ID);
        let mut file = suffixed(payload, &id);
        let len = file.len();
        file[len - 1 - 4] = 20;
        assert_eq!(
            verify(&file, &id),
            Err(SuffixError::BadSuffixLength { suffix: 20 })
        );
    }

    #[test]
    fn bad_spec_version() {
        let payload = b"payload";
        let id = id(0x20B1, 0x0014, WILDCARD_ID);
        let mut file = suffixed(payload, &id);
        let len = file.len();
        // low byte of bcd_dfu, struct offset 8
        file[len - 1 - 8] = 0x11;
        assert_eq!(
            verify(&file, &id),
            Err(SuffixError::BadSpecVersion { suffix: 0x0111 })
        );
    }

    #[test]
    fn stable_failure_codes() {
        assert_eq!(SuffixError::TooSmall { length: 0 }.code(), 1);
        assert_eq!(
            SuffixError::ChecksumMismatch {
                suffix: 0,
                computed: 1
            }
            .code(),
            2
        );
        assert_eq!(
            SuffixError::BcdDeviceMismatch {
                suffix: 1,
                expected: 2
            }
            .code(),
            8
        );
    }

    #[test]
    fn trailer_is_byte_reversed_on_disk() {
        let payload = b"p";
        let suffix = generate(payload, &id(0x20B1, 0x0014, WILDCARD_ID));

        // last byte of the file is byte 0 of the struct, the low CRC byte
        let crc = crc::checksum(payload);
        assert_eq!(suffix[SUFFIX_LENGTH - 1], crc.to_le_bytes()[0]);
        // suffix_length (struct offset 4) at reversed offset 11
        assert_eq!(suffix[SUFFIX_LENGTH - 1 - 4], 16);
        // signature at struct offsets 5..8
        assert_eq!(suffix[SUFFIX_LENGTH - 1 - 5], 0x44);
        assert_eq!(suffix[SUFFIX_LENGTH - 1 - 6], 0x46);
        assert_eq!(suffix[SUFFIX_LENGTH - 1 - 7], 0x55);
    }
}
