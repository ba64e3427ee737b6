//! Byte-to-text decoding with encoding fallback.

use encoding_rs::WINDOWS_1252;
use strum::Display;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encodings tried when reading a file, in order.
pub const DEFAULT_ENCODINGS: [TextEncoding; 3] = [
    TextEncoding::Utf8,
    TextEncoding::Latin1,
    TextEncoding::Windows1252,
];

/// A text encoding a file may be decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TextEncoding {
    /// UTF-8, with a leading BOM stripped.
    #[strum(to_string = "utf-8")]
    Utf8,
    /// ISO-8859-1. Every byte maps to the code point of the same value.
    #[strum(to_string = "latin-1")]
    Latin1,
    /// Windows-1252. Fails on the five bytes it leaves undefined.
    #[strum(to_string = "windows-1252")]
    Windows1252,
}

impl TextEncoding {
    /// Decode `bytes`, or `None` if they are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                std::str::from_utf8(body).ok().map(str::to_string)
            }
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Windows1252 => WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
        }
    }
}

/// Text decoded from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// The decoded text.
    pub text: String,
    /// Encoding that succeeded. Lossy results report UTF-8.
    pub encoding: TextEncoding,
    /// No encoding applied cleanly; invalid sequences were replaced.
    pub lossy: bool,
}

/// Decode bytes with [`DEFAULT_ENCODINGS`].
///
/// Latin-1 accepts any byte sequence, so with the default order the
/// result is never lossy.
pub fn decode_bytes(bytes: &[u8]) -> Decoded {
    decode_with(bytes, &DEFAULT_ENCODINGS)
}

/// Decode bytes with the first encoding in `encodings` that succeeds,
/// falling back to lossy UTF-8.
pub fn decode_with(bytes: &[u8], encodings: &[TextEncoding]) -> Decoded {
    for &encoding in encodings {
        if let Some(text) = encoding.decode(bytes) {
            return Decoded {
                text,
                encoding,
                lossy: false,
            };
        }
    }
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    Decoded {
        text: String::from_utf8_lossy(body).into_owned(),
        encoding: TextEncoding::Utf8,
        lossy: true,
    }
}
