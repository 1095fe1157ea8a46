//! Whole-buffer decompression for pak files.
//!
//! Two schemes exist and a buffer uses at most one of them:
//!
//! - **CHNK**: later titles split the pak into chunks, each with a small
//!   big-endian header followed by raw DEFLATE data. The `CHNK` magic at the
//!   start of the file is the only signature this module can detect.
//! - **Legacy**: an earlier title stored the whole pak as one zlib stream.
//!   Nothing in the pak says so; the decoder only finds out when the header
//!   table makes no sense, and then calls [`decompress_legacy`].
//!
//! ## CHNK chunk header
//!
//! | offset | field                                           |
//! |--------|-------------------------------------------------|
//! | 0x00   | magic `CHNK`                                    |
//! | 0x04   | offset of the compressed data from chunk start  |
//! | 0x08   | compressed size                                 |
//! | 0x0C   | offset of the next chunk from this chunk start, |
//! |        | `0xFFFFFFFF` on the last chunk                  |
//! | 0x10   | decompressed size                               |
//! | 0x14   | offset of this chunk in the decompressed output |

use byteorder::{BigEndian, ReadBytesExt};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::{Cursor, Read};
use tracing::{debug, trace};

use crate::error::{PakError, PakResult};

pub const CHUNK_MAGIC: &[u8; 4] = b"CHNK";

/// Size of the fixed part of a chunk header.
pub const CHUNK_HEADER_SIZE: usize = 0x18;

const LAST_CHUNK: u32 = 0xFFFF_FFFF;

/// Upper bound on one chunk's decompressed size, and on how far past the
/// bytes already produced a chunk may be placed.
pub const MAX_CHUNK_SIZE: usize = 0x100_0000;

/// Check for the `CHNK` signature.
pub fn is_chunk_compressed(data: &[u8]) -> bool {
    data.starts_with(CHUNK_MAGIC)
}

/// Reassemble a `CHNK` compressed buffer.
pub fn decompress_chunked(data: &[u8]) -> PakResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk_start = 0usize;
    let mut chunk_index = 0usize;

    loop {
        let header = data
            .get(chunk_start..chunk_start + CHUNK_HEADER_SIZE)
            .ok_or_else(|| {
                PakError::Decompress(format!("chunk {chunk_index} header is truncated"))
            })?;
        if &header[..4] != CHUNK_MAGIC {
            return Err(PakError::Decompress(format!(
                "chunk {chunk_index} at {chunk_start:#x} has no CHNK magic"
            )));
        }

        let mut cursor = Cursor::new(&header[4..]);
        let data_offset = cursor.read_u32::<BigEndian>()? as usize;
        let compressed_size = cursor.read_u32::<BigEndian>()? as usize;
        let next_chunk = cursor.read_u32::<BigEndian>()?;
        let decompressed_size = cursor.read_u32::<BigEndian>()? as usize;
        let decompressed_offset = cursor.read_u32::<BigEndian>()? as usize;

        let start = chunk_start + data_offset;
        let compressed = data.get(start..start + compressed_size).ok_or_else(|| {
            PakError::Decompress(format!("chunk {chunk_index} data runs past the buffer"))
        })?;

        if decompressed_size > MAX_CHUNK_SIZE {
            return Err(PakError::Decompress(format!(
                "chunk {chunk_index} claims {decompressed_size:#x} bytes, limit is {MAX_CHUNK_SIZE:#x}"
            )));
        }
        if decompressed_offset > out.len() + MAX_CHUNK_SIZE {
            return Err(PakError::Decompress(format!(
                "chunk {chunk_index} is placed at {decompressed_offset:#x}, \
                 far past the {:#x} bytes produced so far",
                out.len()
            )));
        }

        let mut inflated = Vec::with_capacity(decompressed_size);
        DeflateDecoder::new(compressed)
            .take(decompressed_size as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(|e| PakError::Decompress(format!("chunk {chunk_index}: {e}")))?;
        if inflated.len() != decompressed_size {
            return Err(PakError::Decompress(format!(
                "chunk {chunk_index} inflated to {} bytes, header says {decompressed_size}",
                inflated.len()
            )));
        }

        let end = decompressed_offset + decompressed_size;
        if out.len() < end {
            out.resize(end, 0);
        }
        out[decompressed_offset..end].copy_from_slice(&inflated);

        trace!(
            "CHNK {}: {} -> {} bytes at {:#x}",
            chunk_index, compressed_size, decompressed_size, decompressed_offset
        );

        if next_chunk == LAST_CHUNK || next_chunk == 0 {
            break;
        }
        chunk_start += next_chunk as usize;
        chunk_index += 1;
        if chunk_start >= data.len() {
            break;
        }
    }

    debug!(
        "CHNK: {} chunks, {} bytes -> {} bytes",
        chunk_index + 1,
        data.len(),
        out.len()
    );
    Ok(out)
}

/// Inflate a whole-buffer zlib stream.
pub fn decompress_legacy(data: &[u8]) -> PakResult<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| PakError::Decompress(format!("legacy stream: {e}")))?;

    debug!("legacy: {} bytes -> {} bytes", data.len(), out.len());
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{chunk_compress, legacy_compress};
    use super::*;

    fn sample() -> Vec<u8> {
        (0..5000u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
    }

    #[test]
    fn detects_chunk_signature() {
        assert!(is_chunk_compressed(b"CHNK\0\0\0\x18"));
        assert!(!is_chunk_compressed(b"CHN"));
        assert!(!is_chunk_compressed(&legacy_compress(b"hello")));
    }

    #[test]
    fn chunked_reassembles_every_chunk() {
        let data = sample();
        let packed = chunk_compress(&data, 4096);
        assert!(is_chunk_compressed(&packed));
        assert_eq!(decompress_chunked(&packed).unwrap(), data);
    }

    #[test]
    fn chunked_rejects_truncated_data() {
        let packed = chunk_compress(&sample(), 4096);
        let cut = &packed[..packed.len() - 10];
        assert!(matches!(
            decompress_chunked(cut),
            Err(PakError::Decompress(_))
        ));
    }

    #[test]
    fn chunked_rejects_implausible_sizes() {
        let mut packed = chunk_compress(b"small", 4096);
        packed[0x10..0x14].copy_from_slice(&0xFFFF_FFF0u32.to_be_bytes());
        assert!(matches!(
            decompress_chunked(&packed),
            Err(PakError::Decompress(_))
        ));

        let mut packed = chunk_compress(b"small", 4096);
        packed[0x14..0x18].copy_from_slice(&0xF000_0000u32.to_be_bytes());
        assert!(matches!(
            decompress_chunked(&packed),
            Err(PakError::Decompress(_))
        ));
    }

    #[test]
    fn legacy_round_trips() {
        let data = sample();
        assert_eq!(decompress_legacy(&legacy_compress(&data)).unwrap(), data);
    }

    #[test]
    fn legacy_rejects_plain_data() {
        assert!(matches!(
            decompress_legacy(b"definitely not zlib"),
            Err(PakError::Decompress(_))
        ));
    }
}
