//! Streaming CRC32 (reflected, polynomial 0xEDB88320).
//!
//! This is the checksum used by the DFU file suffix. The state is plain
//! `u32` so a caller can stream a file through [`step`] without holding
//! the whole buffer.

const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Initial CRC state.
pub fn init() -> u32 {
    0xFFFF_FFFF
}

/// Feed one byte into the CRC state.
pub fn step(state: u32, byte: u8) -> u32 {
    let mut crc = state ^ u32::from(byte);
    for _ in 0..8 {
        let xor_bit = crc & 1 == 1;
        crc >>= 1;
        if xor_bit {
            crc ^= POLYNOMIAL;
        }
    }
    crc
}

/// Complement the state to produce the final checksum.
pub fn finish(state: u32) -> u32 {
    !state
}

/// CRC32 of a whole buffer.
pub fn checksum(bytes: &[u8]) -> u32 {
    finish(bytes.iter().fold(init(), |state, byte| step(state, *byte)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(checksum(&[]), 0x0000_0000);
    }

    #[test]
    fn check_value() {
        // CRC-32/ISO-HDLC check value
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn streaming_matches_whole_buffer() {
        let bytes = b"the quick brown fox jumps over the lazy dog";
        let mut state = init();
        for byte in bytes {
            state = step(state, *byte);
        }
        assert_eq!(finish(state), checksum(bytes));
    }

    #[test]
    fn ascii_vector() {
        assert_eq!(checksum(b"hello world"), 0x0D4A_1185);
    }
}
