//! The SWF container boundary.
//!
//! This is deliberately minimal: `spec.md` treats SWF container framing and
//! compression codecs as an external collaborator, "specified only at its
//! boundary" — the core VM only ever sees a `DoAbc` tag's body. This module
//! exists to make that boundary concrete and testable (see `spec.md` §8
//! scenario 1), not to be a complete SWF reader.

use bitflags::bitflags;
use bitstream_io::{BigEndian, BitRead, BitReader};
use thiserror::Error;

use crate::error::ReadError;
use crate::reader::Reader;

#[derive(Debug, Error)]
pub enum SwfError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("not an SWF file: bad signature byte {0:#04x}")]
    BadSignature(u8),

    #[error("unsupported compression (LZMA codec is out of scope)")]
    UnsupportedCompression,

    #[cfg(not(feature = "flate2"))]
    #[error("ZLIB-compressed SWF but the `flate2` feature is disabled")]
    ZlibDisabled,

    #[cfg(feature = "flate2")]
    #[error("failed to inflate ZLIB-compressed SWF body: {0}")]
    Inflate(String),
}

/// How the body following the SWF header is compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Uncompressed,
    Zlib,
    Lzma,
}

impl Signature {
    fn from_first_byte(b: u8) -> Result<Self, SwfError> {
        match b {
            b'F' => Ok(Signature::Uncompressed),
            b'C' => Ok(Signature::Zlib),
            b'Z' => Ok(Signature::Lzma),
            _ => Err(SwfError::BadSignature(b)),
        }
    }
}

/// A decoded SWF header: signature, version, and uncompressed file length.
#[derive(Debug, Clone, Copy)]
pub struct SwfHeader {
    pub signature: Signature,
    pub version: u8,
    pub file_length: u32,
}

/// A single SWF tag: its numeric code and the raw bytes of its body.
#[derive(Debug, Clone, Copy)]
pub struct Tag<'a> {
    pub code: u16,
    pub data: &'a [u8],
}

pub const TAG_CODE_END: u16 = 0;
pub const TAG_CODE_DO_ABC: u16 = 82;

bitflags! {
    /// Flags on a `DoAbc` tag.
    pub struct DoAbcFlag: u32 {
        const LAZY_INITIALIZE = 0x1;
    }
}

/// The decoded fields of a `DoAbc` tag body: `u32` flags, a NUL-terminated
/// name, and the remaining bytes (the ABC module itself).
#[derive(Debug, Clone, Copy)]
pub struct DoAbc<'a> {
    pub flags: DoAbcFlag,
    pub name: &'a str,
    pub data: &'a [u8],
}

impl<'a> DoAbc<'a> {
    /// Parse a `DoAbc` tag body per `spec.md` §6.
    pub fn parse(body: &'a [u8]) -> Result<Self, SwfError> {
        let mut reader = Reader::new(body);
        let flags = DoAbcFlag::from_bits_truncate(reader.read_u32()?);
        let name = reader.read_cstring()?;
        let data = reader.read_remaining();
        Ok(DoAbc { flags, name, data })
    }
}

/// Parse an SWF file's header and return an iterator of its tags.
///
/// Handles the `FWS`/`CWS` signatures (uncompressed and ZLIB-compressed
/// bodies); `ZWS` (LZMA) is recognized but rejected, since LZMA decoding is
/// out of scope (`spec.md` §1).
pub fn decode_tags(bytes: &[u8]) -> Result<(SwfHeader, Vec<Tag<'_>>), SwfError> {
    let mut reader = Reader::new(bytes);
    let sig_byte = reader.read_u8()?;
    let signature = Signature::from_first_byte(sig_byte)?;
    // The remaining two signature bytes are always "WS".
    reader.skip(2)?;
    let version = reader.read_u8()?;
    let file_length = reader.read_u32()?;

    let header = SwfHeader {
        signature,
        version,
        file_length,
    };

    let body = decompress(&mut reader, signature)?;
    let mut body_reader = Reader::new(&body);
    skip_rect(&mut body_reader)?;
    body_reader.skip(4)?; // frame rate (u16, 8.8 fixed) + frame count (u16)

    let tags = read_tags(body_reader, &body)?;
    Ok((header, tags))
}

/// Decompress the remainder of the file per its signature. Uncompressed SWFs
/// are returned as-is (no copy); compressed SWFs are inflated into an owned
/// buffer since the decompressed body doesn't exist in the input slice.
fn decompress(reader: &mut Reader<'_>, signature: Signature) -> Result<Vec<u8>, SwfError> {
    match signature {
        Signature::Uncompressed => Ok(reader.read_remaining().to_vec()),
        Signature::Lzma => Err(SwfError::UnsupportedCompression),
        Signature::Zlib => inflate(reader.read_remaining()),
    }
}

#[cfg(feature = "flate2")]
fn inflate(data: &[u8]) -> Result<Vec<u8>, SwfError> {
    use std::io::Read;
    let mut out = Vec::new();
    flate2::read::ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| SwfError::Inflate(e.to_string()))?;
    Ok(out)
}

#[cfg(not(feature = "flate2"))]
fn inflate(_data: &[u8]) -> Result<Vec<u8>, SwfError> {
    Err(SwfError::ZlibDisabled)
}

/// Skip the bit-packed stage `RECT`: a 5-bit `nbits` field followed by four
/// `nbits`-wide signed fields, the whole thing byte-aligned afterwards.
/// RECT packs bits MSB-first, so `bitstream_io::BigEndian` is the bit order
/// (distinct from the container's own little-endian byte order).
fn skip_rect(reader: &mut Reader<'_>) -> Result<(), ReadError> {
    let offset = reader.position();
    let mut bits = BitReader::endian(&reader.buffer()[offset..], BigEndian);
    let eof = || ReadError::EndOfBuffer { offset };

    let nbits: u32 = bits.read(5).map_err(|_| eof())?;
    if nbits > 0 {
        for _ in 0..4 {
            let _: i32 = bits.read_signed(nbits).map_err(|_| eof())?;
        }
    }

    let total_bits = 5 + 4 * nbits as usize;
    reader.skip((total_bits + 7) / 8)
}

fn read_tags<'a>(mut reader: Reader<'a>, _body: &'a [u8]) -> Result<Vec<Tag<'a>>, SwfError> {
    let mut tags = Vec::new();
    loop {
        let code_and_length = reader.read_u16()?;
        let code = code_and_length >> 6;
        let mut length = (code_and_length & 0x3F) as u32;
        if length == 0x3F {
            length = reader.read_u32()?;
        }
        let data = reader.read_slice(length as usize)?;
        tags.push(Tag { code, data });
        if code == TAG_CODE_END {
            break;
        }
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The canonical tiny SWF from `spec.md` §8 scenario 1.
    const TINY_SWF: &[u8] = &[
        0x46, 0x57, 0x53, 0x03, 0x4F, 0x00, 0x00, 0x00, 0x78, 0x00, 0x05, 0x5F, 0x00, 0x00, 0x0F,
        0xA0, 0x00, 0x00, 0x0C, 0x01, 0x00, 0x43, 0x02, 0xFF, 0xFF, 0xFF, 0xBF, 0x00, 0x23, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x70, 0xFB, 0x49, 0x97, 0x0D, 0x0C, 0x7D, 0x50, 0x00, 0x01, 0x14,
        0x00, 0x00, 0x00, 0x00, 0x01, 0x25, 0xC9, 0x92, 0x0D, 0x21, 0xED, 0x48, 0x87, 0x65, 0x30,
        0x3B, 0x6D, 0xE1, 0xD8, 0xB4, 0x00, 0x00, 0x86, 0x06, 0x06, 0x01, 0x00, 0x01, 0x00, 0x00,
        0x40, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn decodes_five_tags_ending_in_end() {
        let (header, tags) = decode_tags(TINY_SWF).unwrap();
        assert_eq!(header.signature, Signature::Uncompressed);
        assert_eq!(tags.len(), 5);
        assert_eq!(tags.last().unwrap().code, TAG_CODE_END);
    }

    #[test]
    fn do_abc_tag_fields() {
        let mut flags = DoAbcFlag::LAZY_INITIALIZE.bits().to_le_bytes().to_vec();
        flags.extend_from_slice(b"merged\0");
        flags.extend_from_slice(&[1, 2, 3]);

        let do_abc = DoAbc::parse(&flags).unwrap();
        assert!(do_abc.flags.contains(DoAbcFlag::LAZY_INITIALIZE));
        assert_eq!(do_abc.name, "merged");
        assert_eq!(do_abc.data, &[1, 2, 3]);
    }

    #[test]
    fn rejects_lzma_compression() {
        let mut bytes = vec![b'Z', b'W', b'S', 10, 0, 0, 0, 0];
        bytes.extend_from_slice(&[0; 20]);
        let err = decode_tags(&bytes).unwrap_err();
        assert!(matches!(err, SwfError::UnsupportedCompression));
    }
}
