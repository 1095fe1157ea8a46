use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PakError, PakResult};
use crate::symbols::SymbolTable;

use super::parser::PakParser;
use super::structures::{Entry, Platform};

/// File collecting `0x` lines from debug paks.
pub const MASTER_LIST: &str = "master.txt";

/// The files making up one pak on disk.
#[derive(Debug, Clone)]
pub struct PakFiles {
    pub pak: PathBuf,
    pub pab: Option<PathBuf>,
    /// File name up to `.pak`.
    pub base_name: String,
    pub platform: Platform,
    /// `dbg.pak` files hold debug name lists.
    pub is_debug: bool,
}

impl PakFiles {
    /// Work out the pak/pab pair for `path`.
    ///
    /// Returns `Ok(None)` for a `.pab` file, which is read together with its
    /// pak instead.
    pub fn locate(path: &Path) -> PakResult<Option<Self>> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| PakError::Input(format!("{} is not a file", path.display())))?;
        let lower = file_name.to_lowercase();

        if lower.contains(".pab") {
            return Ok(None);
        }
        let Some(pak_at) = lower.find(".pak") else {
            return Err(PakError::Input(format!("{file_name} is not a pak file")));
        };

        let base_name = file_name[..pak_at].to_string();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let pab = dir.join(format!("{base_name}.pab{ext}"));

        Ok(Some(Self {
            pak: path.to_path_buf(),
            pab: pab.is_file().then_some(pab),
            platform: Platform::from_extension(&ext),
            is_debug: file_name.contains("dbg.pak"),
            base_name,
        }))
    }

    /// Default output folder: next to the pak, named after it.
    pub fn default_output(&self) -> PathBuf {
        self.pak
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.base_name)
    }
}

/// Decoded pak ready to be written out.
pub struct PakExtractor {
    entries: Vec<Entry>,
    platform: Platform,
}

impl PakExtractor {
    /// Read and decode both files of a pak.
    pub fn open(files: &PakFiles, symbols: &SymbolTable) -> PakResult<Self> {
        let pak = fs::read(&files.pak)?;
        let pab = files.pab.as_deref().map(fs::read).transpose()?;
        info!(
            "extracting {} ({}{})",
            files.base_name,
            files.platform,
            if pab.is_some() { ", with pab" } else { "" }
        );

        let parser = PakParser::new(files.platform.endian(), symbols);
        let entries = parser.decode(&pak, pab.as_deref())?;
        Ok(Self::from_entries(entries, files.platform))
    }

    pub fn from_entries(entries: Vec<Entry>, platform: Platform) -> Self {
        Self { entries, platform }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Name of the file written for `entry`: its full name with the platform
    /// extension added when missing.
    pub fn output_name(&self, entry: &Entry) -> String {
        let suffix = self.platform.suffix();
        let name = entry.full_name();
        if name.to_lowercase().ends_with(suffix) {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        }
    }

    /// Write one entry below `out_dir`, creating folders as needed.
    pub fn extract_to_file(&self, entry: &Entry, out_dir: &Path) -> PakResult<PathBuf> {
        let output_path = out_dir.join(safe_relative(&self.output_name(entry)));
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&output_path, entry.payload())?;
        debug!("wrote {}", output_path.display());
        Ok(output_path)
    }

    /// Write every entry below `out_dir`. With `collect_debug_keys`, lines
    /// starting with `0x` are also appended to [`MASTER_LIST`].
    pub fn extract_all(&self, out_dir: &Path, collect_debug_keys: bool) -> PakResult<Vec<PathBuf>> {
        fs::create_dir_all(out_dir)?;
        let mut written = Vec::with_capacity(self.entries.len());
        let mut master = if collect_debug_keys {
            Some(
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(out_dir.join(MASTER_LIST))?,
            )
        } else {
            None
        };

        for entry in &self.entries {
            written.push(self.extract_to_file(entry, out_dir)?);

            if let Some(file) = master.as_mut() {
                for line in debug_key_lines(entry.payload()) {
                    writeln!(file, "{line}")?;
                }
            }
        }
        Ok(written)
    }
}

/// Lines of a text payload that start with `0x`.
pub fn debug_key_lines(payload: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(payload)
        .lines()
        .filter(|l| l.starts_with("0x"))
        .map(str::to_string)
        .collect()
}

/// Turn an archive name into a relative path that stays inside the output
/// folder.
fn safe_relative(name: &str) -> PathBuf {
    Path::new(&name.replace('\\', "/"))
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}
