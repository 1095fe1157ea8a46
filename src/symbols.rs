//! QB key hashing and hash-to-name lookup.
//!
//! Every name in a pak header is stored as a 32-bit QB key: a CRC-32 over the
//! lowercased name, with `/` treated as `\`, without the final XOR. Turning a
//! key back into a name needs a dictionary built from outside knowledge (debug
//! name lists); keys missing from it are shown as `0x` plus eight hex digits.

use std::collections::HashMap;

/// Placeholder produced for the key `0`.
pub const ZERO_PLACEHOLDER: &str = "0x00000000";

/// Compute the QB key of `name`.
///
/// Names that are already hexadecimal literals (`0x1234abcd`) encode to that
/// literal value rather than being hashed.
pub fn qb_key(name: &str) -> u32 {
    if let Some(hex) = name.strip_prefix("0x")
        && let Ok(value) = u32::from_str_radix(hex, 16)
    {
        return value;
    }
    let normalized = name.to_lowercase().replace('/', "\\");
    !crc32fast::hash(normalized.as_bytes())
}

/// Render a key the way unresolved names are shown.
pub fn placeholder(key: u32) -> String {
    format!("0x{key:08x}")
}

/// True when `name` is an unresolved placeholder rather than a real name.
pub fn is_placeholder(name: &str) -> bool {
    name.len() == 10
        && name.starts_with("0x")
        && name[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Read-only map from QB key to name.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    names: HashMap<u32, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table by hashing each name.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(Into::into)
            .map(|name| (qb_key(&name), name))
            .collect();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve `key` to its name, or to its placeholder when unknown.
    pub fn resolve(&self, key: u32) -> String {
        match self.names.get(&key) {
            Some(name) => name.clone(),
            None => placeholder(key),
        }
    }
}

impl From<HashMap<u32, String>> for SymbolTable {
    fn from(names: HashMap<u32, String>) -> Self {
        Self { names }
    }
}
