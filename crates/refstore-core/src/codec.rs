//! Record value codec.
//!
//! Values are zlib-compressed at a configurable level. Decoding falls back to
//! returning the input unchanged when decompression fails, so stores written
//! before compression was introduced stay readable without a format tag. The
//! fallback cannot tell genuinely corrupt compressed data apart from legacy
//! uncompressed data; that ambiguity is accepted.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::config::CompressionLevel;
use crate::error::Result;

/// Compress raw value bytes at the given level.
pub fn encode(raw: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level.to_flate2());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

/// Decompress stored value bytes.
///
/// Input that is not valid zlib data is returned unchanged.
pub fn decode(stored: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    match ZlibDecoder::new(stored).read_to_end(&mut decoded) {
        Ok(_) => decoded,
        Err(_) => stored.to_vec(),
    }
}
