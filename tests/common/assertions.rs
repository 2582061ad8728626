//! Assertions over the on-disk store and ledger

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Final files in the store (staging files excluded), sorted
pub fn stored_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            !p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".part"))
        })
        .collect();
    files.sort();
    files
}

/// Non-empty lines of the ledger file
pub fn ledger_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Assert every ledger line is `<64 hex>|<url>` and return the URLs
pub fn assert_ledger_well_formed(path: &Path) -> Vec<String> {
    ledger_lines(path)
        .into_iter()
        .map(|line| {
            let (hash, url) = line
                .split_once('|')
                .unwrap_or_else(|| panic!("ledger line without separator: {line}"));
            assert_eq!(hash.len(), 64, "digest length in {line}");
            assert!(
                hash.chars().all(|c| c.is_ascii_hexdigit()),
                "digest not hex in {line}"
            );
            assert!(url.starts_with("http"), "url in {line}");
            url.to_string()
        })
        .collect()
}
