//! # Manifest Checksums
//!
//! CRC32 over a unit manifest, excluding its own `checksum:` line, so a
//! manifest edited after it was authored is rejected at load time.

use crc32fast::Hasher;

const PREFIX: &str = "crc32:";

/// Checksum of raw content, formatted `crc32:XXXXXXXX`
pub fn compute_checksum(content: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content.as_bytes());
    format!("{}{:08X}", PREFIX, hasher.finalize())
}

/// Checksum of a manifest with its `checksum:` line removed
pub fn manifest_checksum(content: &str) -> String {
    let body = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("checksum:"))
        .collect::<Vec<_>>()
        .join("\n");

    compute_checksum(&body)
}

/// Whether `recorded` matches the manifest content
///
/// Comparison is case-insensitive on the hex digits.
pub fn verify_manifest(content: &str, recorded: &str) -> bool {
    parse_checksum(recorded)
        .zip(parse_checksum(&manifest_checksum(content)))
        .map(|(a, b)| a == b)
        .unwrap_or(false)
}

/// Parse `crc32:XXXXXXXX` into its value
pub fn parse_checksum(formatted: &str) -> Option<u32> {
    let hex = formatted.trim().strip_prefix(PREFIX)?;
    u32::from_str_radix(hex, 16).ok()
}
