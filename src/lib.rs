//! # ghpak
//!
//! Extract and compile the `.pak`/`.pab` archives used by Neversoft console
//! titles.
//!
//! A pak bundles many named assets (scripts, audio, models) with per-entry
//! metadata: QB keys in place of names, parent links and flag bits. Payloads
//! may live in a second `.pab` file. The format has no version tag, so
//! variants are told apart by byte order (chosen from the file extension) and
//! by trial: chunk compressed, plain, or legacy zlib compressed.
//!
//! ## Features
//!
//! - Decode PS2 (little endian) and Xbox 360 (big endian) paks
//! - Splice a `.pab` overflow file into the pak's offset space
//! - CHNK chunk decompression and a one-shot legacy zlib fallback
//! - Compile a folder back into a pak/pab pair that decodes to the same entries
//!
//! ## Example
//!
//! ```no_run
//! use ghpak::{EncodeOptions, SymbolTable, decode, encode};
//! use std::path::Path;
//!
//! let built = encode(Path::new("qb"), EncodeOptions::default(), None)?;
//! let symbols = SymbolTable::from_names(["songs\\intro.mid.qb"]);
//! let entries = decode(
//!     &built.header,
//!     Some(&built.payload),
//!     built.platform.endian(),
//!     &symbols,
//! )?;
//! for entry in &entries {
//!     println!("{} ({} bytes)", entry.full_name(), entry.file_size());
//! }
//! # Ok::<(), ghpak::PakError>(())
//! ```

pub mod cli;
pub mod codec;
pub mod compression;
pub mod error;
pub mod pak;
pub mod symbols;

pub use cli::Cli;
pub use codec::Endian;
pub use error::{PakError, PakResult};
pub use pak::{
    EncodeOptions, EncodedPak, Entry, Game, PakBuilder, PakExtractor, PakFiles, PakParser,
    Platform, ScriptCompiler, decode, encode,
};
pub use symbols::{SymbolTable, qb_key};
