//! Pak compiler: turns a directory tree back into a header stream and a
//! payload stream.
//!
//! Layout of the output, once the two streams are put back to back:
//!
//! - header stream: one 32-byte record per file (plus a 160-byte path field
//!   when flagged), the terminator record, 16 zero bytes
//! - payload stream: each payload, padded to 16 bytes
//!
//! Every record stores its payload offset relative to the record itself, so
//! each offset is computed on its own as
//! `header_len - record_pos + payload_pos`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::codec::{pad_to, write_padded_str};
use crate::error::{PakError, PakResult};
use crate::symbols::{ZERO_PLACEHOLDER, qb_key};

use super::path::{
    archive_rel_path, extension_of, file_name_part, platform_suffix, strip_extensions,
    strip_platform_suffix,
};
use super::structures::*;

/// Script source extension compiled before packing.
pub const SCRIPT_SOURCE_EXT: &str = ".q";

/// Turns script source text into its binary form.
pub trait ScriptCompiler {
    /// Compile `source`; `archive_name` is the name the result is packed as.
    fn compile(
        &self,
        source: &str,
        archive_name: &str,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Knobs for [`PakBuilder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    pub game: Game,
    /// Building `qb.pak`: PS2 `.qb` files keep their extension.
    pub is_qb: bool,
    /// Accepted for compatibility, has no effect on the output.
    pub split: bool,
}

/// Output of [`PakBuilder::encode`].
#[derive(Debug, Clone)]
pub struct EncodedPak {
    /// Contents of the `.pak` file.
    pub header: Vec<u8>,
    /// Contents of the `.pab` file.
    pub payload: Vec<u8>,
    pub platform: Platform,
}

impl EncodedPak {
    /// Header and payload back to back: a single-file pak.
    pub fn concatenated(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header.len() + self.payload.len());
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Pak compiler.
pub struct PakBuilder<'a> {
    options: EncodeOptions,
    compiler: Option<&'a dyn ScriptCompiler>,
}

impl<'a> PakBuilder<'a> {
    pub fn new(options: EncodeOptions) -> Self {
        Self {
            options,
            compiler: None,
        }
    }

    /// Use `compiler` for `.q` sources. Without one, a `.q` file fails the
    /// build.
    pub fn with_compiler(mut self, compiler: &'a dyn ScriptCompiler) -> Self {
        self.compiler = Some(compiler);
        self
    }

    /// Compile every regular file below `root`.
    pub fn encode(&self, root: &Path) -> PakResult<EncodedPak> {
        if !root.is_dir() {
            return Err(PakError::Input(format!(
                "{} is not a folder",
                root.display()
            )));
        }
        if self.options.split {
            debug!("split requested; output layout is the same");
        }

        let files = collect_files(root)?;
        let first = files
            .first()
            .ok_or_else(|| PakError::Input(format!("{} holds no files", root.display())))?;
        let platform = detect_platform(first)?;
        info!("compiling {platform} pak from {}", root.display());

        let mut parts = Vec::with_capacity(files.len() + 1);
        for file in &files {
            parts.push(self.classify(root, file, platform)?);
        }
        parts.push(terminator(platform, self.options.game));

        let (header, payload) = serialize(parts, platform)?;
        Ok(EncodedPak {
            header,
            payload,
            platform,
        })
    }

    /// Work out names, flags and payload for one source file.
    fn classify(&self, root: &Path, file: &Path, platform: Platform) -> PakResult<EntryParts> {
        let rel = archive_rel_path(root, file)?;
        let is_script_source = extension_of(&rel) == Some(SCRIPT_SOURCE_EXT);

        let mut archive_name = if platform.keeps_full_path() {
            rel.clone()
        } else {
            strip_platform_suffix(file_name_part(&rel)).to_string()
        };

        let payload = if is_script_source {
            let source = fs::read_to_string(file)?;
            archive_name.push('b');
            let compiled = self.compile(&source, &archive_name, &rel)?;
            if platform == Platform::Ps2 {
                archive_name.push_str(platform.suffix());
            }
            compiled
        } else {
            fs::read(file)?
        };

        let extension = classify_extension(&archive_name, platform, self.options.is_qb)
            .ok_or_else(|| PakError::UnsupportedExtension {
                path: rel.clone(),
                extension: String::new(),
            })?;
        let name_no_ext = strip_extensions(file_name_part(&archive_name)).to_string();

        // Xbox records carry no flag bits.
        let mut flag_bits = 0;
        if platform == Platform::Ps2 {
            match extension.as_str() {
                ".qb" | ".mqb" | ".sqb" => flag_bits |= flags::EXTRA_PATH,
                _ => {
                    return Err(PakError::UnsupportedExtension {
                        path: rel,
                        extension,
                    });
                }
            }
            if name_no_ext.contains("_sfx") {
                flag_bits |= flags::SFX;
            } else if name_no_ext.contains("_gfx") {
                flag_bits |= flags::GFX;
            }
        }

        let (asset_context, full_name, extra_path) = if flag_bits & flags::EXTRA_PATH != 0 {
            if archive_name.len() > EXTRA_PATH_SIZE {
                return Err(PakError::PathTooLong { path: archive_name });
            }
            let context = match platform_suffix(&archive_name) {
                Some(suffix) if !self.options.is_qb && suffix == ".ps2" => {
                    archive_name[..archive_name.len() - suffix.len()].to_string()
                }
                _ => archive_name.clone(),
            };
            (context, ZERO_PLACEHOLDER.to_string(), Some(archive_name))
        } else {
            (ZERO_PLACEHOLDER.to_string(), archive_name, None)
        };

        debug!(
            "{rel}: extension {extension}, name {name_no_ext}, flags {flag_bits:#x}, {} bytes",
            payload.len()
        );
        Ok(EntryParts {
            extension,
            start_offset: 0,
            asset_context,
            full_name,
            name_no_ext,
            parent_id: 0,
            flags: flag_bits,
            extra_path,
            payload,
        })
    }

    fn compile(&self, source: &str, archive_name: &str, rel: &str) -> PakResult<Vec<u8>> {
        let compiler = self.compiler.ok_or_else(|| PakError::Script {
            path: rel.to_string(),
            message: "no script compiler configured".into(),
        })?;
        compiler
            .compile(source, archive_name)
            .map_err(|e| PakError::Script {
                path: rel.to_string(),
                message: e.to_string(),
            })
    }
}

/// Compile `root` in one call. See [`PakBuilder::encode`].
pub fn encode(
    root: &Path,
    options: EncodeOptions,
    compiler: Option<&dyn ScriptCompiler>,
) -> PakResult<EncodedPak> {
    let mut builder = PakBuilder::new(options);
    if let Some(compiler) = compiler {
        builder = builder.with_compiler(compiler);
    }
    builder.encode(root)
}

/// Regular files below `root`, depth first, names sorted.
fn collect_files(root: &Path) -> PakResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Platform named by the extension of the first file.
fn detect_platform(first: &Path) -> PakResult<Platform> {
    let ext = first
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .ok_or_else(|| {
            PakError::Input(format!(
                "cannot tell the platform from {}, it has no extension",
                first.display()
            ))
        })?;
    Ok(Platform::from_extension(&ext))
}

/// Extension stored for `archive_name`, skipping a platform suffix.
///
/// On PS2, outside of `qb.pak`, `.qb` becomes `.sqb` for files under a
/// `_scripts` folder (other than `song_scripts`) and `.mqb` otherwise.
pub fn classify_extension(archive_name: &str, platform: Platform, is_qb: bool) -> Option<String> {
    let name = match platform_suffix(archive_name) {
        Some(_) => strip_platform_suffix(archive_name),
        None => archive_name,
    };
    let extension = extension_of(name)?.to_lowercase();

    if platform == Platform::Ps2 && extension == ".qb" && !is_qb {
        let sqb = archive_name.contains("_scripts") && !archive_name.contains("song_scripts");
        return Some(if sqb { ".sqb" } else { ".mqb" }.to_string());
    }
    Some(extension)
}

/// The record closing the header table.
fn terminator(platform: Platform, game: Game) -> EntryParts {
    let extension = if platform == Platform::Ps2 && game == Game::Gh3 {
        "last"
    } else {
        ".last"
    };
    EntryParts {
        extension: extension.to_string(),
        asset_context: ZERO_PLACEHOLDER.to_string(),
        full_name: ZERO_PLACEHOLDER.to_string(),
        name_no_ext: ZERO_PLACEHOLDER.to_string(),
        payload: TERMINATOR_PAYLOAD.to_vec(),
        ..Default::default()
    }
}

/// Lay out the header and payload streams.
fn serialize(parts: Vec<EntryParts>, platform: Platform) -> PakResult<(Vec<u8>, Vec<u8>)> {
    let endian = platform.endian();
    let header_len: usize = parts.iter().map(EntryParts::header_len).sum::<usize>() + TRAILER_SIZE;

    let mut header = Vec::with_capacity(header_len);
    let mut payload = Vec::new();

    for mut part in parts {
        let record_pos = header.len();
        let start = header_len + payload.len();
        part.start_offset = u32::try_from(start).map_err(|_| {
            PakError::InvalidEntry(format!("{}: offset past 4 GiB", part.full_name))
        })?;
        let entry = Entry::new(part)?;

        let record = RecordHeader {
            extension: qb_key(entry.extension()),
            relative_offset: (start - record_pos) as u32,
            file_size: entry.file_size(),
            asset_context: qb_key(entry.asset_context()),
            full_name: qb_key(entry.full_name()),
            name: qb_key(entry.name_no_ext()),
            parent_id: entry.parent_id(),
            flags: entry.flags(),
        };
        record.write(endian, &mut header)?;
        if let Some(path) = entry.extra_path() {
            write_padded_str(&mut header, path, EXTRA_PATH_SIZE)?;
        }

        payload.extend_from_slice(entry.payload());
        pad_to(&mut payload, PAYLOAD_ALIGN);

        debug!(
            "{} at {:#x} ({:#x} bytes)",
            entry.full_name(),
            entry.start_offset(),
            entry.file_size()
        );
    }

    header.extend_from_slice(&[0u8; TRAILER_SIZE]);
    debug_assert_eq!(header.len(), header_len);
    Ok((header, payload))
}
