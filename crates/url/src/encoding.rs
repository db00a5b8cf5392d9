//! Text decoding for object bodies

use std::fmt;
use std::str::FromStr;

use s3url_core::{Error, Result};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encoding used by `read_text` and `read_json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextEncoding {
    /// UTF-8, a leading byte-order mark is dropped
    #[default]
    Utf8Sig,
    /// Strict UTF-8, a byte-order mark is kept as U+FEFF
    Utf8,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8Sig => "utf-8-sig",
            TextEncoding::Utf8 => "utf-8",
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        let bytes = match self {
            TextEncoding::Utf8Sig => bytes.strip_prefix(BOM).unwrap_or(bytes),
            TextEncoding::Utf8 => bytes,
        };

        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| Error::Decode(format!("invalid {} content: {e}", self.as_str())))
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "utf-8-sig" | "utf8-sig" => Ok(TextEncoding::Utf8Sig),
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            _ => Err(Error::Decode(format!("Unsupported text encoding: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_handling() {
        let body = b"\xEF\xBB\xBF{\"a\":1}";
        assert_eq!(TextEncoding::Utf8Sig.decode(body).unwrap(), "{\"a\":1}");
        assert_eq!(
            TextEncoding::Utf8.decode(body).unwrap(),
            "\u{feff}{\"a\":1}"
        );
        assert_eq!(TextEncoding::default().decode(b"plain").unwrap(), "plain");
    }

    #[test]
    fn test_invalid_utf8() {
        let err = TextEncoding::Utf8Sig.decode(&[0x66, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "UTF_8_SIG".parse::<TextEncoding>().unwrap(),
            TextEncoding::Utf8Sig
        );
        assert_eq!("utf8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert!(matches!(
            "latin-1".parse::<TextEncoding>(),
            Err(Error::Decode(message)) if message.contains("latin-1")
        ));
    }
}
