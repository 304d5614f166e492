//! Variable-byte integers: 7 bits per byte, high bit set on the last byte.

use crate::error::{Result, StrataError};

/// Append the vbyte encoding of `value` to `output`
pub fn encode_vbyte(value: u64, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80);
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode a vbyte integer starting at `*pos`, advancing `pos`
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        let Some(&byte) = input.get(*pos) else {
            return Err(StrataError::OutOfRange {
                position: *pos as u64,
                length: input.len() as u64,
            });
        };
        *pos += 1;

        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 63 {
            return Err(StrataError::corrupt("vbyte value too large"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vbyte_widths() {
        for (value, width) in [(0u64, 1usize), (127, 1), (128, 2), (16_383, 2), (u64::MAX, 10)] {
            let mut out = Vec::new();
            encode_vbyte(value, &mut out);
            assert_eq!(out.len(), width, "width of {}", value);

            let mut pos = 0;
            assert_eq!(decode_vbyte(&out, &mut pos).unwrap(), value);
            assert_eq!(pos, width);
        }
    }

    #[test]
    fn test_truncated_vbyte() {
        let mut pos = 0;
        assert!(matches!(
            decode_vbyte(&[0x01, 0x02], &mut pos),
            Err(StrataError::OutOfRange { .. })
        ));
    }
}
