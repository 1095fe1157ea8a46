//! Pak header table parser.
//!
//! This module turns a primary pak buffer (and its optional pab overflow
//! buffer) into the ordered list of entries it contains.
//!
//! ## Parsing Strategy
//!
//! Pak files carry no format tag, so the parser works by trying:
//! 1. A `CHNK` signature means the primary file is chunk compressed; it is
//!    inflated before anything else.
//! 2. With a pab file, the relative offset of the first record doubles as the
//!    attach offset: the pab bytes are placed there in one logical buffer.
//! 3. Records are read from offset 0 until an extension key names the
//!    terminator.
//! 4. If a record or payload falls outside the logical buffer, the primary
//!    file was most likely legacy compressed. All entries are dropped and the
//!    whole decode runs once more on the inflated primary.

use std::borrow::Cow;
use std::io::Cursor;
use tracing::{debug, trace, warn};

use crate::codec::{Endian, read_cstr};
use crate::compression::{decompress_chunked, decompress_legacy, is_chunk_compressed};
use crate::error::{PakError, PakResult};
use crate::symbols::{SymbolTable, ZERO_PLACEHOLDER, is_placeholder};

use super::structures::*;

/// Largest gap tolerated between the end of the primary file and the pab
/// attach offset. A bigger gap means the header was misread.
///
/// The format itself puts no bound on the gap, which is zero-filled. This
/// limit is an addition: a gap past it is reported as an offset failure and
/// takes the legacy retry instead.
const MAX_ATTACH_GAP: usize = 0x100_0000;

/// Header table parser.
///
/// Holds the byte order of the archive and the dictionary used to name
/// entries. Both are read-only, so one parser can decode any number of
/// archives.
///
/// ## Example
///
/// ```
/// use ghpak::{Endian, PakParser, SymbolTable};
///
/// let symbols = SymbolTable::new();
/// let parser = PakParser::new(Endian::Big, &symbols);
/// // A lone terminator record: no entries.
/// let mut pak = vec![0x2c, 0xb3, 0xef, 0x3b];
/// pak.resize(48, 0);
/// assert!(parser.decode(&pak, None)?.is_empty());
/// # Ok::<(), ghpak::PakError>(())
/// ```
pub struct PakParser<'a> {
    endian: Endian,
    symbols: &'a SymbolTable,
}

impl<'a> PakParser<'a> {
    /// Create a parser for archives of the given byte order.
    ///
    /// # Arguments
    ///
    /// * `endian` - Byte order of the header fields
    /// * `symbols` - Dictionary used to turn keys back into names
    pub fn new(endian: Endian, symbols: &'a SymbolTable) -> Self {
        Self { endian, symbols }
    }

    /// Decode a pak, falling back to legacy decompression once.
    ///
    /// # Arguments
    ///
    /// * `primary` - Contents of the `.pak` file
    /// * `overflow` - Contents of the matching `.pab` file, if there is one
    ///
    /// # Returns
    ///
    /// The entries in header order. The terminator is not included.
    ///
    /// # Errors
    ///
    /// [`PakError::Format`] when neither the buffer as given nor its legacy
    /// inflated form holds a readable table, [`PakError::UnsupportedLayout`]
    /// when the pab attach offset is zero.
    pub fn decode(&self, primary: &[u8], overflow: Option<&[u8]>) -> PakResult<Vec<Entry>> {
        match self.decode_once(primary, overflow) {
            Err(PakError::Offset { offset, size, len }) => {
                warn!(
                    "could not find the last entry ({offset:#x}+{size:#x} past {len:#x}), \
                     trying legacy compression"
                );
                let inflated = decompress_legacy(primary).map_err(|e| {
                    PakError::Format(format!("could not extract pak file: {e}"))
                })?;
                match self.decode_once(&inflated, overflow) {
                    Err(PakError::Offset { offset, size, len }) => Err(PakError::Format(format!(
                        "could not extract pak file: {offset:#x}+{size:#x} is past {len:#x} \
                         after legacy decompression"
                    ))),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Decode without the legacy retry.
    ///
    /// Fails with [`PakError::Offset`] as soon as anything falls outside the
    /// logical buffer; [`decode`](Self::decode) uses that to trigger the retry.
    pub fn decode_once(&self, primary: &[u8], overflow: Option<&[u8]>) -> PakResult<Vec<Entry>> {
        let primary: Cow<'_, [u8]> = if is_chunk_compressed(primary) {
            debug!("primary buffer is CHNK compressed");
            Cow::Owned(decompress_chunked(primary)?)
        } else {
            Cow::Borrowed(primary)
        };

        let logical = self.splice(primary, overflow)?;
        let (entries, consumed) = self.read_table(&logical)?;
        debug!(
            "read {} entries from {consumed:#x} header bytes",
            entries.len()
        );
        Ok(entries)
    }

    /// Place the pab buffer at the attach offset read from the primary one.
    ///
    /// # Returns
    ///
    /// The logical buffer all record offsets point into.
    ///
    /// # Errors
    ///
    /// [`PakError::UnsupportedLayout`] for a zero attach offset,
    /// [`PakError::Offset`] when the offset cannot be read or is implausible.
    pub fn splice<'b>(
        &self,
        primary: Cow<'b, [u8]>,
        overflow: Option<&[u8]>,
    ) -> PakResult<Cow<'b, [u8]>> {
        let Some(overflow) = overflow else {
            return Ok(primary);
        };

        let attach = self
            .endian
            .u32_at(&primary, ATTACH_OFFSET_POS)
            .ok_or(PakError::Offset {
                offset: ATTACH_OFFSET_POS as u64,
                size: 4,
                len: primary.len(),
            })? as usize;

        if attach == 0 {
            return Err(PakError::UnsupportedLayout);
        }
        if attach < primary.len() {
            debug!(
                "pab attach offset {attach:#x} is inside the pak ({:#x} bytes), ignoring pab",
                primary.len()
            );
            return Ok(primary);
        }
        if attach - primary.len() > MAX_ATTACH_GAP {
            return Err(PakError::Offset {
                offset: attach as u64,
                size: overflow.len() as u64,
                len: primary.len(),
            });
        }

        let mut logical = vec![0u8; attach + overflow.len()];
        logical[..primary.len()].copy_from_slice(&primary);
        logical[attach..].copy_from_slice(overflow);
        debug!(
            "attached {:#x} pab bytes at {attach:#x} after {:#x} pak bytes",
            overflow.len(),
            primary.len()
        );
        Ok(Cow::Owned(logical))
    }

    /// Scan header records until the terminator.
    ///
    /// # Arguments
    ///
    /// * `logical` - The spliced buffer; payload offsets point into it
    ///
    /// # Returns
    ///
    /// The entries and the number of header bytes read, terminator record
    /// included.
    pub fn read_table(&self, logical: &[u8]) -> PakResult<(Vec<Entry>, usize)> {
        let mut entries = Vec::new();
        let mut pos = 0usize;

        loop {
            let record_bytes = logical.get(pos..pos + HEADER_SIZE).ok_or(PakError::Offset {
                offset: pos as u64,
                size: HEADER_SIZE as u64,
                len: logical.len(),
            })?;
            let record = RecordHeader::read(self.endian, &mut Cursor::new(record_bytes))?;
            let record_pos = pos;
            pos += HEADER_SIZE;

            if record.is_terminator() {
                trace!("terminator at {record_pos:#x}");
                break;
            }

            let (entry, extra) = self.read_entry(logical, record_pos, &record)?;
            pos += extra;
            entries.push(entry);
        }

        Ok((entries, pos))
    }

    /// Build one entry from its record.
    ///
    /// # Returns
    ///
    /// The entry and the number of bytes used after the 32-byte record.
    fn read_entry(
        &self,
        logical: &[u8],
        record_pos: usize,
        record: &RecordHeader,
    ) -> PakResult<(Entry, usize)> {
        let mut extension = self.symbols.resolve(record.extension);
        if !extension.starts_with('.') {
            extension.insert(0, '.');
        }

        let start = u64::from(record.relative_offset) + record_pos as u64;
        let end = start + u64::from(record.file_size);
        let out_of_bounds = PakError::Offset {
            offset: start,
            size: u64::from(record.file_size),
            len: logical.len(),
        };
        let start_offset = u32::try_from(start).map_err(|_| out_of_bounds)?;

        let asset_context = self.symbols.resolve(record.asset_context);
        let name_no_ext = self.symbols.resolve(record.name);
        let mut full_name = self.symbols.resolve(record.full_name);
        if full_name == ZERO_PLACEHOLDER && name_no_ext == ZERO_PLACEHOLDER {
            full_name = asset_context.clone();
        } else if is_placeholder(&full_name) {
            full_name = format!("{full_name}.{name_no_ext}");
        }

        let mut extra = 0;
        let extra_path = if record.flags & flags::EXTRA_PATH != 0 {
            let stored = read_cstr(logical, record_pos + HEADER_SIZE, EXTRA_PATH_SIZE);
            extra = EXTRA_PATH_SIZE;
            let path = repair_path(stored);
            full_name = path.clone();
            Some(path)
        } else {
            None
        };

        if end > logical.len() as u64 {
            return Err(PakError::Offset {
                offset: start,
                size: u64::from(record.file_size),
                len: logical.len(),
            });
        }
        let payload = logical[start as usize..end as usize].to_vec();

        if !full_name
            .to_lowercase()
            .ends_with(&extension.to_lowercase())
        {
            full_name.push_str(&extension);
        }

        trace!(
            "{full_name}: {:#x} bytes at {start:#x}, flags {:#x}",
            record.file_size, record.flags
        );

        let entry = Entry::new(EntryParts {
            extension,
            start_offset,
            asset_context,
            full_name,
            name_no_ext,
            parent_id: record.parent_id,
            flags: record.flags,
            extra_path,
            payload,
        })?;
        Ok((entry, extra))
    }
}

/// Decode a pak buffer pair in one call.
///
/// See [`PakParser::decode`].
pub fn decode(
    primary: &[u8],
    overflow: Option<&[u8]>,
    endian: Endian,
    symbols: &SymbolTable,
) -> PakResult<Vec<Entry>> {
    PakParser::new(endian, symbols).decode(primary, overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::fixtures::{chunk_compress, legacy_compress};
    use crate::symbols::qb_key;

    /// Hand-built pak: records are written by the test, payloads are placed
    /// at explicit offsets.
    struct Fixture {
        endian: Endian,
        records: Vec<(RecordHeader, Option<Vec<u8>>)>,
        payloads: Vec<(usize, Vec<u8>)>,
        len: usize,
    }

    impl Fixture {
        fn new(endian: Endian, len: usize) -> Self {
            Self {
                endian,
                records: Vec::new(),
                payloads: Vec::new(),
                len,
            }
        }

        /// Add a record whose payload sits at absolute offset `at`.
        fn entry(&mut self, name: &str, ext: &str, at: usize, data: &[u8]) -> &mut Self {
            let record_pos: usize = self.records.iter().map(|(_, p)| record_len(p)).sum();
            self.records.push((
                RecordHeader {
                    extension: qb_key(ext),
                    relative_offset: (at - record_pos) as u32,
                    file_size: data.len() as u32,
                    full_name: qb_key(name),
                    name: qb_key(crate::pak::path::strip_extensions(name)),
                    ..Default::default()
                },
                None,
            ));
            self.payloads.push((at, data.to_vec()));
            self
        }

        fn entry_with_path(&mut self, path: &str, ext: &str, at: usize, data: &[u8]) -> &mut Self {
            self.entry_with_raw_path(path.as_bytes(), ext, at, data)
        }

        /// Like `entry_with_path`, with the stored field bytes given as-is.
        fn entry_with_raw_path(
            &mut self,
            path: &[u8],
            ext: &str,
            at: usize,
            data: &[u8],
        ) -> &mut Self {
            assert!(path.len() <= EXTRA_PATH_SIZE);
            self.entry("0x0", ext, at, data);
            let last = self.records.last_mut().unwrap();
            last.0.flags = flags::EXTRA_PATH;
            last.1 = Some(path.to_vec());
            self
        }

        fn terminator(&mut self) -> &mut Self {
            self.records.push((
                RecordHeader {
                    extension: TERMINATOR_KEYS[0],
                    ..Default::default()
                },
                None,
            ));
            self
        }

        fn header_len(&self) -> usize {
            self.records.iter().map(|(_, p)| record_len(p)).sum()
        }

        fn build(&self) -> Vec<u8> {
            let mut out = Vec::new();
            for (record, path) in &self.records {
                record.write(self.endian, &mut out).unwrap();
                if let Some(path) = path {
                    let field_end = out.len() + EXTRA_PATH_SIZE;
                    out.extend_from_slice(path);
                    out.resize(field_end, 0);
                }
            }
            out.resize(self.len.max(out.len()), 0);
            for (at, data) in &self.payloads {
                out[*at..*at + data.len()].copy_from_slice(data);
            }
            out
        }
    }

    fn record_len(path: &Option<Vec<u8>>) -> usize {
        HEADER_SIZE + if path.is_some() { EXTRA_PATH_SIZE } else { 0 }
    }

    fn symbols() -> SymbolTable {
        SymbolTable::from_names(["a.qb", "b.img", ".qb", ".img", ".sqb", "ctx\\a.qb"])
    }

    #[test]
    fn stops_at_terminator() {
        let mut fx = Fixture::new(Endian::Big, 0x200);
        fx.entry("a.qb", ".qb", 0x100, b"first")
            .entry("b.img", ".img", 0x110, b"second")
            .entry("a.qb", ".qb", 0x120, b"third")
            .terminator();
        let pak = fx.build();

        let table = symbols();
        let parser = PakParser::new(Endian::Big, &table);
        let (entries, consumed) = parser.read_table(&pak).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(consumed, 4 * HEADER_SIZE);
        assert_eq!(consumed, fx.header_len());

        assert_eq!(entries[0].full_name(), "a.qb");
        assert_eq!(entries[0].payload(), b"first");
        assert_eq!(entries[1].full_name(), "b.img");
        assert_eq!(entries[1].extension(), ".img");
        assert_eq!(entries[2].payload(), b"third");
        assert_eq!(entries[2].start_offset(), 0x120);
        for entry in &entries {
            assert!(entry.end_offset() <= pak.len() as u64);
        }
    }

    #[test]
    fn both_terminator_keys_end_the_table() {
        for key in TERMINATOR_KEYS {
            let mut pak = Vec::new();
            RecordHeader {
                extension: key,
                ..Default::default()
            }
            .write(Endian::Little, &mut pak)
            .unwrap();
            let table = SymbolTable::new();
            let entries = decode(&pak, None, Endian::Little, &table).unwrap();
            assert!(entries.is_empty());
        }
    }

    #[test]
    fn extra_path_is_repaired_and_skipped() {
        let mut fx = Fixture::new(Endian::Little, 0x400);
        fx.entry_with_path("cripts\\foo.sqb", ".sqb", 0x300, b"script")
            .entry("a.qb", ".qb", 0x310, b"after")
            .terminator();
        let pak = fx.build();

        let table = symbols();
        let (entries, consumed) = PakParser::new(Endian::Little, &table)
            .read_table(&pak)
            .unwrap();
        assert_eq!(consumed, 3 * HEADER_SIZE + EXTRA_PATH_SIZE);
        assert_eq!(entries[0].full_name(), "scripts\\foo.sqb");
        assert_eq!(entries[0].extra_path(), Some("scripts\\foo.sqb"));
        assert_eq!(entries[0].extension(), ".sqb");
        assert_eq!(entries[1].full_name(), "a.qb");
        assert_eq!(entries[1].payload(), b"after");
    }

    #[test]
    fn full_width_path_survives_repair() {
        let stored = format!("cripts\\{}", "a".repeat(EXTRA_PATH_SIZE - 7));
        assert_eq!(stored.len(), EXTRA_PATH_SIZE);
        let mut fx = Fixture::new(Endian::Little, 0x400);
        fx.entry_with_path(&stored, ".sqb", 0x300, b"x").terminator();

        let table = symbols();
        let entries = decode(&fx.build(), None, Endian::Little, &table).unwrap();
        let path = entries[0].extra_path().unwrap();
        assert_eq!(path.len(), EXTRA_PATH_SIZE + 1);
        assert_eq!(path, format!("s{stored}"));
        assert_eq!(entries[0].payload(), b"x");
    }

    #[test]
    fn non_ascii_path_bytes_are_kept() {
        let mut stored = b"songs\\".to_vec();
        stored.extend_from_slice(&[0xE9; 60]);
        stored.extend_from_slice(b".qb");
        let mut fx = Fixture::new(Endian::Little, 0x400);
        fx.entry_with_raw_path(&stored, ".qb", 0x300, b"y").terminator();

        let table = symbols();
        let entries = decode(&fx.build(), None, Endian::Little, &table).unwrap();
        let expected = format!("songs\\{}.qb", "\u{e9}".repeat(60));
        assert_eq!(entries[0].extra_path(), Some(expected.as_str()));
        assert_eq!(entries[0].full_name(), expected);
        assert_eq!(entries[0].payload(), b"y");
    }

    #[test]
    fn extension_match_ignores_case() {
        let mut fx = Fixture::new(Endian::Big, 0x100);
        fx.entry("A.QB", ".qb", 0x80, b"z").terminator();
        let table = SymbolTable::from_names(["A.QB", ".qb"]);
        let entries = decode(&fx.build(), None, Endian::Big, &table).unwrap();
        assert_eq!(entries[0].full_name(), "A.QB");
        assert_eq!(entries[0].extension(), ".qb");
    }

    #[test]
    fn unresolved_names_fall_back_to_asset_context() {
        let mut pak = Vec::new();
        RecordHeader {
            extension: qb_key(".qb"),
            relative_offset: 0x40,
            file_size: 2,
            asset_context: qb_key("ctx\\a.qb"),
            ..Default::default()
        }
        .write(Endian::Big, &mut pak)
        .unwrap();
        RecordHeader {
            extension: TERMINATOR_KEYS[1],
            ..Default::default()
        }
        .write(Endian::Big, &mut pak)
        .unwrap();
        pak.extend_from_slice(b"hi");

        let table = symbols();
        let entries = decode(&pak, None, Endian::Big, &table).unwrap();
        assert_eq!(entries[0].full_name(), "ctx\\a.qb");
        assert_eq!(entries[0].payload(), b"hi");
    }

    #[test]
    fn unknown_names_keep_both_keys() {
        let mut fx = Fixture::new(Endian::Big, 0x100);
        fx.entry("mystery.bin", "bin", 0x80, b"x").terminator();
        let table = SymbolTable::new();
        let entries = decode(&fx.build(), None, Endian::Big, &table).unwrap();
        let expected = format!(
            "0x{:08x}.0x{:08x}.0x{:08x}",
            qb_key("mystery.bin"),
            qb_key("mystery"),
            qb_key("bin")
        );
        assert_eq!(entries[0].full_name(), expected);
        assert!(entries[0].extension().starts_with('.'));
    }

    #[test]
    fn pab_is_attached_at_the_first_offset() {
        // Header only in the pak: the first payload starts right after it.
        let mut fx = Fixture::new(Endian::Big, 0);
        fx.entry("a.qb", ".qb", 0x40, b"").terminator();
        let mut pak = fx.build();
        pak.truncate(0x40);
        // Point the first record at the pab and give it a real size.
        pak[8..12].copy_from_slice(&5u32.to_be_bytes());

        let table = symbols();
        let entries = decode(&pak, Some(b"hello"), Endian::Big, &table).unwrap();
        assert_eq!(entries[0].payload(), b"hello");
        assert_eq!(entries[0].start_offset(), 0x40);
    }

    #[test]
    fn attach_inside_the_pak_ignores_the_pab() {
        let mut fx = Fixture::new(Endian::Big, 0x100);
        fx.entry("a.qb", ".qb", 0x80, b"inside").terminator();
        let pak = fx.build();
        assert_eq!(Endian::Big.u32_at(&pak, ATTACH_OFFSET_POS), Some(0x80));

        let table = symbols();
        let with_pab = decode(&pak, Some(b"overflow bytes"), Endian::Big, &table).unwrap();
        let alone = decode(&pak, None, Endian::Big, &table).unwrap();
        assert_eq!(with_pab, alone);
        assert_eq!(with_pab[0].payload(), b"inside");
    }

    #[test]
    fn pab_gap_is_zero_filled() {
        let mut fx = Fixture::new(Endian::Big, 0);
        fx.entry("a.qb", ".qb", 0x50, b"").terminator();
        let mut pak = fx.build();
        pak.truncate(0x40);
        pak[8..12].copy_from_slice(&3u32.to_be_bytes());

        let table = symbols();
        let parser = PakParser::new(Endian::Big, &table);
        let logical = parser.splice(Cow::Borrowed(&pak[..]), Some(b"abc")).unwrap();
        assert_eq!(logical.len(), 0x53);
        assert!(logical[0x40..0x50].iter().all(|&b| b == 0));
        assert_eq!(parser.decode(&pak, Some(b"abc")).unwrap()[0].payload(), b"abc");
    }

    #[test]
    fn zero_attach_offset_is_unsupported() {
        let mut pak = vec![0u8; 0x40];
        pak[..4].copy_from_slice(&qb_key(".qb").to_be_bytes());
        let table = SymbolTable::new();
        assert!(matches!(
            decode(&pak, Some(b"data"), Endian::Big, &table),
            Err(PakError::UnsupportedLayout)
        ));
    }

    #[test]
    fn chunked_primary_is_inflated_first() {
        let mut fx = Fixture::new(Endian::Big, 0x100);
        fx.entry("a.qb", ".qb", 0x80, b"chunked payload").terminator();
        let packed = chunk_compress(&fx.build(), 0x40);

        let table = symbols();
        let entries = decode(&packed, None, Endian::Big, &table).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].payload(), b"chunked payload");
    }

    #[test]
    fn legacy_compression_is_retried_once() {
        let mut fx = Fixture::new(Endian::Big, 0x1000);
        fx.entry("a.qb", ".qb", 0xf00, &[7u8; 0x100])
            .entry("b.img", ".img", 0x800, &[9u8; 0x200])
            .terminator();
        let packed = legacy_compress(&fx.build());

        let table = symbols();
        let parser = PakParser::new(Endian::Big, &table);
        assert!(matches!(
            parser.decode_once(&packed, None),
            Err(PakError::Offset { .. })
        ));
        let entries = parser.decode(&packed, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload(), &[7u8; 0x100][..]);
        assert_eq!(entries[1].payload(), &[9u8; 0x200][..]);
    }

    #[test]
    fn second_failure_is_a_format_error() {
        let mut fx = Fixture::new(Endian::Big, 0x80);
        fx.entry("a.qb", ".qb", 0x40, b"x").terminator();
        let mut pak = fx.build();
        // Claim a payload that runs past the end of the buffer.
        pak[8..12].copy_from_slice(&0x100u32.to_be_bytes());
        let table = symbols();

        // Plain buffer, and not zlib either.
        assert!(matches!(
            decode(&pak, None, Endian::Big, &table),
            Err(PakError::Format(_))
        ));
        // Legacy compressed, still broken after inflating.
        let packed = legacy_compress(&pak);
        assert!(matches!(
            decode(&packed, None, Endian::Big, &table),
            Err(PakError::Format(_))
        ));
    }

    #[test]
    fn missing_terminator_is_a_format_error() {
        let mut fx = Fixture::new(Endian::Little, 0x80);
        fx.entry("a.qb", ".qb", 0x40, b"x");
        let table = symbols();
        assert!(matches!(
            decode(&fx.build(), None, Endian::Little, &table),
            Err(PakError::Format(_))
        ));
    }
}
