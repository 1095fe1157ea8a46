use std::path::Path;

use crate::error::{PakError, PakResult};

use super::structures::PLATFORM_SUFFIXES;

/// Path of `file_path` below `root`, with `\` between components as the
/// archives store it.
pub fn archive_rel_path(root: &Path, file_path: &Path) -> PakResult<String> {
    let rel = file_path.strip_prefix(root).map_err(|_| {
        PakError::Input(format!(
            "{} is outside {}",
            file_path.display(),
            root.display()
        ))
    })?;

    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let out = parts.join("\\");
    if out.is_empty() {
        return Err(PakError::Input("empty relative path".into()));
    }
    Ok(out)
}

/// Last component of an archive path.
pub fn file_name_part(path: &str) -> &str {
    path.rsplit(|c: char| c == '\\' || c == '/').next().unwrap_or(path)
}

/// Extension of the last component, dot included. A leading dot alone
/// (`.hidden`) is not an extension.
pub fn extension_of(path: &str) -> Option<&str> {
    let name = file_name_part(path);
    match name.rfind('.') {
        Some(i) if i > 0 => Some(&name[i..]),
        _ => None,
    }
}

/// Remove one extension from the last component.
pub fn strip_extension(name: &str) -> &str {
    match extension_of(name) {
        Some(ext) => &name[..name.len() - ext.len()],
        None => name,
    }
}

/// Strip extensions until nothing changes: `a.b.c` becomes `a`.
pub fn strip_extensions(name: &str) -> &str {
    let mut current = name;
    loop {
        let next = strip_extension(current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Platform suffix (`.xen`, `.ps2`, ...) ending `path`, if any.
pub fn platform_suffix(path: &str) -> Option<&str> {
    let ext = extension_of(path)?;
    PLATFORM_SUFFIXES
        .iter()
        .any(|s| ext.eq_ignore_ascii_case(s))
        .then_some(ext)
}

/// Drop a trailing platform suffix, leaving other extensions alone.
pub fn strip_platform_suffix(path: &str) -> &str {
    match platform_suffix(path) {
        Some(ext) => &path[..path.len() - ext.len()],
        None => path,
    }
}
