//! The variable-length size encoding shared by all string, container, and
//! blob size fields.
//!
//! Sizes up to 250 take a single byte. Larger sizes are a `253` marker byte
//! followed by the size as a little-endian unsigned 64-bit integer. The
//! remaining marker values are reserved for list headers: `254` marks a
//! closed stream and `255` an open stream; `251` and `252` are unassigned.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Largest size that fits in the single-byte form.
pub(crate) const SMALL_MAX: u64 = 250;
/// Marker for the 8-byte wide form.
pub(crate) const WIDE: u8 = 253;
/// List-header marker for a closed stream.
pub(crate) const CLOSED_STREAM: u8 = 254;
/// List-header marker for an open stream.
pub(crate) const OPEN_STREAM: u8 = 255;

/// Write a size in the shortest form.
pub(crate) fn write_len<W: Write>(w: &mut W, n: u64) -> Result<()> {
    if n <= SMALL_MAX {
        w.write_u8(n as u8)?;
    } else {
        w.write_u8(WIDE)?;
        w.write_u64::<LittleEndian>(n)?;
    }
    Ok(())
}

/// Write a size in the wide form regardless of magnitude. Blob headers use
/// this so that sizes can be rewritten in place without shifting data.
pub(crate) fn write_len_wide<W: Write>(w: &mut W, n: u64) -> Result<()> {
    w.write_u8(WIDE)?;
    w.write_u64::<LittleEndian>(n)?;
    Ok(())
}

/// Read a size in either form. Stream markers are not valid here.
pub(crate) fn read_len<R: Read>(r: &mut R) -> Result<u64> {
    let n = r.read_u8()?;
    match n {
        0..=250 => Ok(n as u64),
        253 => Ok(r.read_u64::<LittleEndian>()?),
        _ => Err(Error::Format(format!("unknown size marker {}", n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(n: u64) -> (u64, usize) {
        let mut buf = Vec::new();
        write_len(&mut buf, n).unwrap();
        let width = buf.len();
        let out = read_len(&mut &buf[..]).unwrap();
        (out, width)
    }

    #[test]
    fn widths() {
        for n in [0u64, 1, 250] {
            assert_eq!(roundtrip(n), (n, 1), "small sizes take one byte");
        }
        for n in [251u64, 255, 256, 1 << 32, 1 << 53] {
            assert_eq!(roundtrip(n), (n, 9), "large sizes take nine bytes");
        }
    }

    #[test]
    fn wide_form_decodes() {
        let mut buf = Vec::new();
        write_len_wide(&mut buf, 7).unwrap();
        assert_eq!(buf.len(), 9);
        assert_eq!(read_len(&mut &buf[..]).unwrap(), 7);
    }

    #[test]
    fn reserved_markers_rejected() {
        for marker in [251u8, 252, 254, 255] {
            let buf = [marker, 0, 0, 0, 0, 0, 0, 0, 0];
            assert!(matches!(read_len(&mut &buf[..]), Err(Error::Format(_))));
        }
    }
}
