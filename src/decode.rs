//! Text decoding with a single explicit fallback.
//!
//! Lookup tables published over the years are mostly UTF-8, but older ones are
//! Latin-1. Decoding tries UTF-8 first and retries once with the configured
//! fallback encoding; anything else is a typed failure.

use crate::error::{GeocodeError, Result};
use encoding_rs::{Encoding, UTF_8};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub encoding: &'static Encoding,
    pub used_fallback: bool,
}

pub fn decode_with_fallback(path: &Path, bytes: &[u8], fallback: &'static Encoding) -> Result<Decoded> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(body) {
        return Ok(Decoded {
            text: text.into_owned(),
            encoding: UTF_8,
            used_fallback: false,
        });
    }

    match fallback.decode_without_bom_handling_and_without_replacement(body) {
        Some(text) => {
            tracing::debug!("Decoded {} as {} after UTF-8 failed", path.display(), fallback.name());
            Ok(Decoded {
                text: text.into_owned(),
                encoding: fallback,
                used_fallback: true,
            })
        }
        None => Err(GeocodeError::Decode {
            path: path.to_path_buf(),
            fallback: fallback.name().to_string(),
        }),
    }
}

/// Read a file fully and decode it.
pub fn read_text(path: &Path, fallback: &'static Encoding) -> Result<Decoded> {
    let bytes = std::fs::read(path)?;
    decode_with_fallback(path, &bytes, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn test_utf8_needs_no_fallback() {
        let decoded = decode_with_fallback(Path::new("a.csv"), "LAD22NM\nYnys Môn\n".as_bytes(), WINDOWS_1252).unwrap();
        assert!(!decoded.used_fallback);
        assert_eq!(decoded.encoding, UTF_8);
        assert!(decoded.text.contains("Ynys Môn"));
    }

    #[test]
    fn test_bom_is_stripped() {
        let decoded = decode_with_fallback(Path::new("a.csv"), b"\xEF\xBB\xBFLAD22CD", WINDOWS_1252).unwrap();
        assert_eq!(decoded.text, "LAD22CD");
    }

    #[test]
    fn test_latin1_falls_back() {
        let bytes = b"LAD22NM\nYnys M\xF4n\n";
        let decoded = decode_with_fallback(Path::new("a.csv"), bytes, WINDOWS_1252).unwrap();
        assert!(decoded.used_fallback);
        assert_eq!(decoded.encoding, WINDOWS_1252);
        assert!(decoded.text.contains("Ynys Môn"));
    }

    #[test]
    fn test_bom_is_stripped_before_fallback() {
        let decoded = decode_with_fallback(Path::new("a.csv"), b"\xEF\xBB\xBFLSOA21CD,LAD22NM\nE01,Ynys M\xF4n\n", WINDOWS_1252).unwrap();
        assert!(decoded.used_fallback);
        assert!(decoded.text.starts_with("LSOA21CD,"));
        assert!(decoded.text.contains("Ynys Môn"));
    }

    #[test]
    fn test_failed_fallback_is_decode_error() {
        let err = decode_with_fallback(Path::new("bad.csv"), b"LAD\xF4", UTF_8).unwrap_err();
        assert!(matches!(err, GeocodeError::Decode { .. }));
    }
}
