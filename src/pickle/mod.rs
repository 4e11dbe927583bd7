/// Pickle codec: value model, decoder, encoder and numpy array support.
///
/// Architecture:
/// ```text
///   .pkl bytes
///        │
///        ▼
///   ┌───────────┐   legacy str ──► Encoding (latin1 / ascii / utf-8 / bytes)
///   │ Unpickler  │   numpy globals ──► DType / NdArray
///   └───────────┘
///        │
///        ▼
///     Value  ──► Display (Python repr, numpy-style arrays)
///        │
///        ▼
///   ┌───────────┐
///   │  Pickler   │  protocol 2, Python 2 layout
///   └───────────┘
/// ```

mod arrayprint;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod ndarray;
pub mod op;
pub mod value;

use std::fmt;
use std::str::FromStr;

pub use decoder::{from_reader, from_slice, Unpickler};
pub use encoder::{to_vec, to_writer, Pickler};
pub use error::{PickleError, Result};
pub use ndarray::{ByteOrder, DType, DTypeKind, NdArray, Scalar};
pub use value::{Object, Value};

// ---------------------------------------------------------------------------
// Encoding – how Python 2 `str` payloads become values
// ---------------------------------------------------------------------------

/// Text encoding applied to Python 2 `str` payloads (STRING, BINSTRING,
/// SHORT_BINSTRING).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// 7-bit ASCII; the Python 3 default.
    Ascii,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    #[default]
    Latin1,
    Utf8,
    /// Keep the payload as raw bytes.
    Bytes,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "ascii",
            Encoding::Latin1 => "latin1",
            Encoding::Utf8 => "utf-8",
            Encoding::Bytes => "bytes",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "ascii" | "us-ascii" => Ok(Encoding::Ascii),
            "latin1" | "latin-1" | "iso-8859-1" | "iso8859-1" | "l1" => Ok(Encoding::Latin1),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "bytes" => Ok(Encoding::Bytes),
            other => Err(format!(
                "unknown encoding '{other}' (expected latin1, ascii, utf-8 or bytes)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// DecodeOptions
// ---------------------------------------------------------------------------

/// Options for [`Unpickler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub encoding: Encoding,
    /// Map Python 2 module names (`__builtin__`, `copy_reg`) to Python 3 ones.
    pub fix_imports: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Latin1,
            fix_imports: true,
        }
    }
}

impl DecodeOptions {
    pub fn with_encoding(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Self::default()
        }
    }
}

/// Text → bytes under latin-1. Fails on the first code point above U+00FF.
pub fn latin1_encode(text: &str) -> std::result::Result<Vec<u8>, char> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| c))
        .collect()
}

/// Bytes → text under latin-1. Never fails.
pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_encoding_aliases() {
        assert_eq!("latin-1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!("ISO-8859-1".parse::<Encoding>().unwrap(), Encoding::Latin1);
        assert_eq!("utf_8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("bytes".parse::<Encoding>().unwrap(), Encoding::Bytes);
        assert!("koi8-r".parse::<Encoding>().is_err());
    }

    #[test]
    fn latin1_is_lossless_for_every_byte() {
        let all: Vec<u8> = (0..=255u8).collect();
        let text = latin1_decode(&all);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(latin1_encode(&text).unwrap(), all);
    }

    #[test]
    fn latin1_encode_rejects_wide_chars() {
        assert_eq!(latin1_encode("a€"), Err('€'));
    }
}
