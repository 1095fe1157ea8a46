//! Byte-order aware primitives shared by the decoder and the encoder.
//!
//! Every integer in a pak header is 32 bits wide; the byte order is fixed per
//! platform and picked once, when the reader or writer is set up. Nothing here
//! checks that the byte order matches the data: a wrong choice only shows up
//! later as nonsense offsets.

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Byte order of the header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn read_u32<R: Read>(self, r: &mut R) -> io::Result<u32> {
        match self {
            Endian::Little => r.read_u32::<LittleEndian>(),
            Endian::Big => r.read_u32::<BigEndian>(),
        }
    }

    pub fn read_i32<R: Read>(self, r: &mut R) -> io::Result<i32> {
        match self {
            Endian::Little => r.read_i32::<LittleEndian>(),
            Endian::Big => r.read_i32::<BigEndian>(),
        }
    }

    pub fn write_u32<W: Write>(self, w: &mut W, value: u32) -> io::Result<()> {
        match self {
            Endian::Little => w.write_u32::<LittleEndian>(value),
            Endian::Big => w.write_u32::<BigEndian>(value),
        }
    }

    pub fn write_i32<W: Write>(self, w: &mut W, value: i32) -> io::Result<()> {
        match self {
            Endian::Little => w.write_i32::<LittleEndian>(value),
            Endian::Big => w.write_i32::<BigEndian>(value),
        }
    }

    /// Read a `u32` at an absolute position, `None` when it does not fit.
    pub fn u32_at(self, buf: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = buf.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }
}

/// Read a null-terminated string starting at `start`, looking at no more than
/// `max` bytes. Stops early at the end of `buf`.
///
/// Bytes are taken as Latin-1, one `char` each, so no stored byte is lost.
pub fn read_cstr(buf: &[u8], start: usize, max: usize) -> String {
    let tail = buf.get(start..).unwrap_or_default();
    let window = &tail[..tail.len().min(max)];
    window
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

/// Write `s` into a field of exactly `width` bytes, padding with nulls.
pub fn write_padded_str<W: Write>(w: &mut W, s: &str, width: usize) -> io::Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > width {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("string of {} bytes does not fit {width}", bytes.len()),
        ));
    }
    w.write_all(bytes)?;
    w.write_all(&vec![0u8; width - bytes.len()])
}

/// Pad `buf` with zeros up to the next multiple of `align`.
pub fn pad_to(buf: &mut Vec<u8>, align: usize) {
    let rem = buf.len() % align;
    if rem != 0 {
        buf.resize(buf.len() + (align - rem), 0);
    }
}
