//! Pak archive decoding and compiling.
//!
//! This module reads and writes the `.pak`/`.pab` containers used by
//! Neversoft console titles, on both the little-endian PS2 layout and the
//! big-endian Xbox 360 layout.
//!
//! ## Architecture
//!
//! - [`structures`]: on-disk records, constants and the [`Entry`] type
//! - [`parser`]: header table scan, pab splicing, compression fallback
//! - [`builder`]: directory tree to header and payload streams
//! - [`extractor`]: locating pak/pab pairs and writing entries to disk
//!
//! ## Pak Format Overview
//!
//! A pak starts with a table of 32-byte records, one per entry, closed by a
//! record whose extension key is `.last` or `last`. Each record holds QB keys
//! for the extension and names, the payload size, a parent key, flag bits and
//! the payload offset relative to the record itself. Records flagged `0x20`
//! are followed by a 160-byte path. Payloads follow the table, either in the
//! pak itself or in a separate pab file attached at a fixed offset.
//!
//! ## Limitations
//!
//! - No format tag: compression is detected by signature (CHNK) or by
//!   failure (legacy zlib)
//! - Parent keys are carried but never resolved

pub mod builder;
pub mod extractor;
pub mod parser;
pub mod path;
pub mod structures;

pub use builder::{EncodeOptions, EncodedPak, PakBuilder, ScriptCompiler, encode};
pub use extractor::{PakExtractor, PakFiles};
pub use parser::{PakParser, decode};
pub use structures::*;
