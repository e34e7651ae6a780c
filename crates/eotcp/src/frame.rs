//! Frame codec.
//!
//! Every frame on the wire is a 4-byte big-endian length followed by that
//! many payload bytes:
//!
//! ```text
//! +--------+--------+--------+--------+-----------------------+
//! |            length (u32 BE)        |  payload (length B)   |
//! +--------+--------+--------+--------+-----------------------+
//! ```
//!
//! There is no handshake and no version field.

use crate::error::{Error, Result};

/// Largest frame we forward, in bytes.
///
/// Standard Ethernet MTU plus L2 header with some headroom.
pub const MAX_FRAME: usize = 1600;

/// Length of the frame header.
pub const HEADER_LEN: usize = 4;

/// Encode a frame length as a header.
///
/// The caller guarantees `length <= MAX_FRAME`.
#[inline]
pub fn encode_header(length: u32) -> [u8; HEADER_LEN] {
    length.to_be_bytes()
}

/// Decode a header into the announced frame length.
///
/// The value is not range-checked; see [`check_len`].
#[inline]
pub fn decode_header(header: [u8; HEADER_LEN]) -> u32 {
    u32::from_be_bytes(header)
}

/// Validate an announced length against [`MAX_FRAME`].
pub fn check_len(len: u32) -> Result<usize> {
    let n = len as usize;
    if n > MAX_FRAME {
        return Err(Error::FrameTooLarge {
            len,
            max: MAX_FRAME,
        });
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_big_endian() {
        assert_eq!(encode_header(0), [0, 0, 0, 0]);
        assert_eq!(encode_header(1514), [0x00, 0x00, 0x05, 0xea]);
        assert_eq!(encode_header(0x0102_0304), [1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_inverts_encode() {
        for len in [0u32, 1, 60, 1500, 1514, MAX_FRAME as u32, u32::MAX] {
            assert_eq!(decode_header(encode_header(len)), len);
        }
    }

    #[test]
    fn test_check_len() {
        assert_eq!(check_len(0).unwrap(), 0);
        assert_eq!(check_len(MAX_FRAME as u32).unwrap(), MAX_FRAME);

        match check_len(MAX_FRAME as u32 + 1) {
            Err(Error::FrameTooLarge { len, max }) => {
                assert_eq!(len, 1601);
                assert_eq!(max, MAX_FRAME);
            }
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
    }
}
