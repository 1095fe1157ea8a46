use clap::ValueEnum;
use std::io::{self, Read, Write};

use crate::codec::Endian;
use crate::error::{PakError, PakResult};

/// Size of one fixed header record.
pub const HEADER_SIZE: usize = 32;

/// Size of the optional path field that follows a record with [`flags::EXTRA_PATH`].
pub const EXTRA_PATH_SIZE: usize = 160;

/// Zero bytes written after the terminator record.
pub const TRAILER_SIZE: usize = 16;

/// Payloads start on this alignment in the payload stream.
pub const PAYLOAD_ALIGN: usize = 16;

/// Position of the pab attach offset inside the primary file. It is the
/// relative offset field of the first record.
pub const ATTACH_OFFSET_POS: usize = 4;

/// Extension keys that end the header table: `.last` and `last`.
pub const TERMINATOR_KEYS: [u32; 2] = [0x2cb3ef3b, 0xb524565f];

/// Payload carried by the terminator record.
pub const TERMINATOR_PAYLOAD: [u8; 4] = [0xAB; 4];

/// Suffixes naming the platform a file was built for.
pub const PLATFORM_SUFFIXES: [&str; 4] = [".ngc", ".ps2", ".ps3", ".xen"];

/// Known truncated path prefixes and what they should read. Only the first
/// match applies.
pub const PATH_REPAIRS: [(&str, &str); 6] = [
    ("ones\\", "zones\\"),
    ("cripts\\", "scripts\\"),
    ("kies\\", "skies\\"),
    ("ongs\\", "songs\\"),
    ("odels\\", "models\\"),
    ("ak\\", "pak\\"),
];

pub mod flags {
    /// A 160-byte path field follows the record.
    pub const EXTRA_PATH: u32 = 0x20;
    /// Name carries the `_sfx` marker.
    pub const SFX: u32 = 0x02;
    /// Name carries the `_gfx` marker.
    pub const GFX: u32 = 0x04;
}

/// Restore a path stored with its first character missing.
pub fn repair_path(path: String) -> String {
    for (broken, fixed) in PATH_REPAIRS {
        if let Some(rest) = path.strip_prefix(broken) {
            return format!("{fixed}{rest}");
        }
    }
    path
}

/// Console family a pak was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Little endian, entries keep their full relative path.
    Ps2,
    /// Big endian, entries are flattened to their file name.
    Xbox,
}

impl Platform {
    /// `.ps2` selects the PS2 layout, anything else the Xbox one.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.');
        if ext.eq_ignore_ascii_case("ps2") {
            Platform::Ps2
        } else {
            Platform::Xbox
        }
    }

    pub fn endian(self) -> Endian {
        match self {
            Platform::Ps2 => Endian::Little,
            Platform::Xbox => Endian::Big,
        }
    }

    /// Extension given to extracted and compiled files.
    pub fn suffix(self) -> &'static str {
        match self {
            Platform::Ps2 => ".ps2",
            Platform::Xbox => ".xen",
        }
    }

    pub fn keeps_full_path(self) -> bool {
        self == Platform::Ps2
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Ps2 => write!(f, "PS2"),
            Platform::Xbox => write!(f, "Xbox 360"),
        }
    }
}

/// Title a pak is compiled for. Only affects the terminator record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Game {
    Gh3,
    Gha,
    #[default]
    Ghwt,
    Gh5,
    Ghwor,
}

/// One 32-byte header record as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    pub extension: u32,
    /// Offset of the payload relative to the start of this record.
    pub relative_offset: u32,
    pub file_size: u32,
    pub asset_context: u32,
    pub full_name: u32,
    pub name: u32,
    pub parent_id: u32,
    pub flags: u32,
}

impl RecordHeader {
    pub fn read<R: Read>(endian: Endian, r: &mut R) -> io::Result<Self> {
        Ok(Self {
            extension: endian.read_u32(r)?,
            relative_offset: endian.read_u32(r)?,
            file_size: endian.read_u32(r)?,
            asset_context: endian.read_u32(r)?,
            full_name: endian.read_u32(r)?,
            name: endian.read_u32(r)?,
            parent_id: endian.read_u32(r)?,
            flags: endian.read_u32(r)?,
        })
    }

    pub fn write<W: Write>(&self, endian: Endian, w: &mut W) -> io::Result<()> {
        for field in [
            self.extension,
            self.relative_offset,
            self.file_size,
            self.asset_context,
            self.full_name,
            self.name,
            self.parent_id,
            self.flags,
        ] {
            endian.write_u32(w, field)?;
        }
        Ok(())
    }

    pub fn is_terminator(&self) -> bool {
        TERMINATOR_KEYS.contains(&self.extension)
    }
}

/// Everything needed to build an [`Entry`].
#[derive(Debug, Clone, Default)]
pub struct EntryParts {
    pub extension: String,
    /// Absolute offset of the payload in the logical buffer.
    pub start_offset: u32,
    pub asset_context: String,
    pub full_name: String,
    pub name_no_ext: String,
    pub parent_id: u32,
    pub flags: u32,
    pub extra_path: Option<String>,
    pub payload: Vec<u8>,
}

impl EntryParts {
    /// Bytes this entry occupies in the header stream.
    pub fn header_len(&self) -> usize {
        if self.flags & flags::EXTRA_PATH != 0 {
            HEADER_SIZE + EXTRA_PATH_SIZE
        } else {
            HEADER_SIZE
        }
    }
}

/// A fully populated archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    extension: String,
    start_offset: u32,
    file_size: u32,
    asset_context: String,
    full_name: String,
    name_no_ext: String,
    parent_id: u32,
    flags: u32,
    extra_path: Option<String>,
    payload: Vec<u8>,
    header_len: usize,
}

impl Entry {
    /// Validate `parts` and freeze them into an entry.
    pub fn new(parts: EntryParts) -> PakResult<Self> {
        let has_flag = parts.flags & flags::EXTRA_PATH != 0;
        match (&parts.extra_path, has_flag) {
            (Some(_), false) => {
                return Err(PakError::InvalidEntry(format!(
                    "{}: extra path without flag {:#x}",
                    parts.full_name,
                    flags::EXTRA_PATH
                )));
            }
            (None, true) => {
                return Err(PakError::InvalidEntry(format!(
                    "{}: flag {:#x} without extra path",
                    parts.full_name,
                    flags::EXTRA_PATH
                )));
            }
            _ => {}
        }

        let file_size = u32::try_from(parts.payload.len()).map_err(|_| {
            PakError::InvalidEntry(format!("{}: payload over 4 GiB", parts.full_name))
        })?;
        if parts.start_offset.checked_add(file_size).is_none() {
            return Err(PakError::InvalidEntry(format!(
                "{}: payload end overflows 32 bits",
                parts.full_name
            )));
        }

        let header_len = parts.header_len();
        Ok(Self {
            extension: parts.extension,
            start_offset: parts.start_offset,
            file_size,
            asset_context: parts.asset_context,
            full_name: parts.full_name,
            name_no_ext: parts.name_no_ext,
            parent_id: parts.parent_id,
            flags: parts.flags,
            extra_path: parts.extra_path,
            payload: parts.payload,
            header_len,
        })
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn start_offset(&self) -> u32 {
        self.start_offset
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// One past the last payload byte.
    pub fn end_offset(&self) -> u64 {
        u64::from(self.start_offset) + u64::from(self.file_size)
    }

    pub fn asset_context(&self) -> &str {
        &self.asset_context
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn name_no_ext(&self) -> &str {
        &self.name_no_ext
    }

    /// Original key of the parent entry. Never looked up.
    pub fn parent_id(&self) -> u32 {
        self.parent_id
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn extra_path(&self) -> Option<&str> {
        self.extra_path.as_deref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }
}
