#![warn(missing_docs)]

/*!

Decoders for the compressed resource files shipped with the Stunts /
4-D Sports Driving series of games.

The PC releases pack most of their assets in a header-less container that
chains up to two decompression passes (run-length and canonical Huffman
coding); the Amiga release additionally uses the `RPck` archive format.
This crate detects which of the formats a buffer uses and reconstructs the
original bytes. It is a pure decoder: the whole compressed buffer must be
in memory, and there is no encoder.

# Example

```rust
use unstunts::{Context, Format};

// A single-pass run-length resource: 8 output bytes, one escape code.
let packed = vec![
    0x01, 0x08, 0x00, 0x00, // pass type + output length
    0x09, 0x00, 0x00, 0x00, // payload length + reserved byte
    0x81, 0xFF,             // escape control + escape codes
    b'A', b'B', b'C', b'D', b'E', b'F', b'G', b'H',
];

let mut ctx = Context::new(Format::Auto, 0, None);
ctx.set_source(packed);
ctx.decompress().unwrap();
assert_eq!(ctx.output(), b"ABCDEFGH");
```

*/

use std::fmt;
use std::str::FromStr;

pub use self::context::{Buffer, Context, Event, EventSink};

mod context;
mod huff;
mod rle;
mod rpck;
mod stunts;

/// Bit-stream dialect of the Stunts Huffman coder.
///
/// Resources from Brøderbund Stunts 1.0 store the Huffman bit stream with
/// every byte bit-reversed; Stunts 1.1 and 4-D Sports Driving use the
/// natural bit order. `Auto` starts with the 1.1 order and falls back to
/// 1.0 when the decoded data fails validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StuntsVersion {
    /// Pick the dialect heuristically.
    Auto,
    /// Brøderbund Stunts 1.0 (bit-reversed bytes).
    V1_0,
    /// Stunts 1.1 / 4-D Sports Driving (natural bit order).
    V1_1,
}

impl fmt::Display for StuntsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StuntsVersion::Auto => "auto",
            StuntsVersion::V1_0 => "stunts1.0",
            StuntsVersion::V1_1 => "stunts1.1",
        })
    }
}

impl FromStr for StuntsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(StuntsVersion::Auto)
        } else if s.eq_ignore_ascii_case("stunts1.0") {
            Ok(StuntsVersion::V1_0)
        } else if s.eq_ignore_ascii_case("stunts1.1") {
            Ok(StuntsVersion::V1_1)
        } else {
            Err(format!("invalid Stunts version \"{}\"", s))
        }
    }
}

/// Container format of a compressed resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Detect the format from the buffer contents.
    Auto,
    /// The Stunts / 4-D Sports Driving PC container (run-length and
    /// Huffman passes, no magic bytes).
    Stunts {
        /// Huffman bit-stream dialect.
        version: StuntsVersion,
        /// Stop after this many passes; 0 decodes every pass.
        max_passes: u8,
    },
    /// EA compression library by Frank Barchard, used by the Amiga and
    /// PC-98 ports. Recognized but not decoded.
    Eac,
    /// Amiga RPck archive, used for 3-d shapes.
    Rpck,
    /// None of the known formats.
    Unknown,
}

impl Format {
    /// The Stunts format with automatic dialect detection and no pass
    /// limit.
    pub fn stunts() -> Format {
        Format::Stunts {
            version: StuntsVersion::Auto,
            max_passes: 0,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Auto => "auto",
            Format::Stunts { .. } => "stunts",
            Format::Eac => "eac",
            Format::Rpck => "rpck",
            Format::Unknown => "unknown",
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(Format::Auto)
        } else if s.eq_ignore_ascii_case("stunts") {
            Ok(Format::stunts())
        } else if s.eq_ignore_ascii_case("eac") {
            Ok(Format::Eac)
        } else if s.eq_ignore_ascii_case("rpck") {
            Ok(Format::Rpck)
        } else {
            Err(format!("invalid format type \"{}\"", s))
        }
    }
}

/// Failure modes of the decoder pipeline.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The buffer matches none of the decodable formats.
    #[error("unknown or unsupported file format")]
    UnknownFormat,
    /// A header field lies past the end of the source buffer.
    #[error("reached end of source buffer while parsing header")]
    TruncatedHeader,
    /// The per-pass type byte is neither run-length nor Huffman.
    #[error("expected pass type 1 (run-length) or 2 (Huffman), got {0:#04X}")]
    BadPassType(u8),
    /// The run-length header declares more than ten escape codes.
    #[error("escape code count greater than 10, got {0}")]
    EscapeTableTooLong(u8),
    /// A sequence run was opened but its closing escape never appeared.
    #[error("reached end of source buffer before finding sequence end escape code {0:#04X}")]
    UnterminatedSequence(u8),
    /// The Huffman header declares more than sixteen tree levels.
    #[error("Huffman tree levels greater than 16, got {0}")]
    TooManyLevels(u8),
    /// The Huffman level counts add up to more than 256 symbols.
    #[error("alphabet longer than 256, got {0}")]
    AlphabetTooLong(usize),
    /// A prefix slot for a wide code holds something other than the
    /// wide-code marker.
    #[error("invalid wide-code marker, got width {0:#04X}")]
    BadWideCodeMarker(u8),
    /// The offset-table walk ran past the deepest tree level.
    #[error("offset table out of bounds")]
    CodeOutOfBounds,
    /// A translated Huffman code does not map into the alphabet.
    #[error("alphabet index out of bounds ({0:#06X})")]
    AlphabetIndexOutOfBounds(u16),
    /// The payload ran out of source bytes mid-decode.
    #[error("reached unexpected end of source buffer")]
    SourceOverrun,
    /// The payload decodes to more bytes than the declared output length.
    #[error("reached end of destination buffer while writing")]
    DestinationOverrun,
    /// The RPck magic bytes are missing.
    #[error("invalid RPck magic bytes")]
    BadMagic,
    /// Decoding finished with unread source bytes left over. Advisory:
    /// the container driver downgrades this to success once its dialect
    /// heuristic has seen it.
    #[error("decoding finished with {0} byte(s) left in source buffer")]
    DataLeft(usize),
}
