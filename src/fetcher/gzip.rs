//! Gzip-or-plain payload normalization
//!
//! Segment payloads arrive either gzip-wrapped or as plain text. Each gzip
//! member header (RFC 1952) is parsed here and the raw deflate body is
//! inflated with [`flate2::read::DeflateDecoder`]. Concatenated members are
//! inflated in turn. Anything that does not start with the gzip magic passes
//! through untouched.

use bytes::Bytes;
use flate2::read::DeflateDecoder;
use flate2::Crc;
use std::io::Read;
use tracing::{debug, warn};

/// Gzip magic number (ID1, ID2)
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const FIXED_HEADER_LEN: usize = 10;
const TRAILER_LEN: usize = 8;
const METHOD_DEFLATE: u8 = 8;

const FLAG_HCRC: u8 = 0x02;
const FLAG_EXTRA: u8 = 0x04;
const FLAG_NAME: u8 = 0x08;
const FLAG_COMMENT: u8 = 0x10;
const FLAG_RESERVED: u8 = 0xe0;

/// Reasons a gzip member could not be inflated
#[derive(Debug, thiserror::Error)]
pub enum GzipError {
    /// Header ends before all flagged fields are present
    #[error("truncated gzip header")]
    TruncatedHeader,

    /// Compression method other than deflate
    #[error("unsupported gzip compression method {0}")]
    UnsupportedMethod(u8),

    /// Reserved flag bits are set
    #[error("reserved gzip flag bits set: {0:#04x}")]
    ReservedFlags(u8),

    /// Deflate stream error
    #[error("deflate stream error: {0}")]
    Inflate(#[from] std::io::Error),

    /// Payload ends before the member's CRC32/ISIZE trailer
    #[error("gzip member truncated at byte {0}")]
    TruncatedMember(usize),

    /// CRC32 or ISIZE in the trailer disagrees with the inflated data
    #[error("gzip trailer mismatch: expected crc {expected_crc:#010x} size {expected_size}, got crc {actual_crc:#010x} size {actual_size}")]
    TrailerMismatch {
        /// CRC32 stored in the trailer
        expected_crc: u32,
        /// ISIZE stored in the trailer
        expected_size: u32,
        /// CRC32 of the inflated member
        actual_crc: u32,
        /// Inflated member length modulo 2^32
        actual_size: u32,
    },
}

/// Whether the payload starts with the gzip magic number.
///
/// Empty and single-byte payloads are never gzip.
pub fn is_gzip(payload: &[u8]) -> bool {
    payload.len() >= 2 && payload[..2] == GZIP_MAGIC
}

/// Offset of the raw deflate stream inside a gzip member.
pub fn deflate_offset(data: &[u8]) -> Result<usize, GzipError> {
    if data.len() < FIXED_HEADER_LEN {
        return Err(GzipError::TruncatedHeader);
    }
    if data[2] != METHOD_DEFLATE {
        return Err(GzipError::UnsupportedMethod(data[2]));
    }

    let flags = data[3];
    if flags & FLAG_RESERVED != 0 {
        return Err(GzipError::ReservedFlags(flags & FLAG_RESERVED));
    }

    // MTIME(4) XFL(1) OS(1) follow the flags; nothing in them affects parsing.
    let mut pos = FIXED_HEADER_LEN;

    if flags & FLAG_EXTRA != 0 {
        let len_bytes = data.get(pos..pos + 2).ok_or(GzipError::TruncatedHeader)?;
        let xlen = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        pos += 2 + xlen;
    }
    if flags & FLAG_NAME != 0 {
        pos = skip_zero_terminated(data, pos)?;
    }
    if flags & FLAG_COMMENT != 0 {
        pos = skip_zero_terminated(data, pos)?;
    }
    if flags & FLAG_HCRC != 0 {
        pos += 2;
    }

    if pos > data.len() {
        return Err(GzipError::TruncatedHeader);
    }
    Ok(pos)
}

fn skip_zero_terminated(data: &[u8], start: usize) -> Result<usize, GzipError> {
    let rest = data.get(start..).ok_or(GzipError::TruncatedHeader)?;
    let terminator = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(GzipError::TruncatedHeader)?;
    Ok(start + terminator + 1)
}

/// Inflate every gzip member in `data`, concatenating their output.
///
/// Each member's CRC32/ISIZE trailer is checked. Bytes after the last member
/// that do not start a new member (zero padding, for instance) are ignored.
pub fn inflate_gzip(data: &[u8]) -> Result<Vec<u8>, GzipError> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    let mut start = 0;

    loop {
        let member = &data[start..];
        let offset = deflate_offset(member)?;
        let before = out.len();

        let mut decoder = DeflateDecoder::new(&member[offset..]);
        decoder.read_to_end(&mut out)?;
        let body_end = offset + decoder.total_in() as usize;

        let trailer = member
            .get(body_end..body_end + TRAILER_LEN)
            .ok_or(GzipError::TruncatedMember(data.len()))?;
        check_trailer(trailer, &out[before..])?;

        start += body_end + TRAILER_LEN;
        if !is_gzip(&data[start..]) {
            if start < data.len() {
                debug!(
                    trailing = data.len() - start,
                    "Ignoring bytes after last gzip member"
                );
            }
            return Ok(out);
        }
    }
}

fn check_trailer(trailer: &[u8], inflated: &[u8]) -> Result<(), GzipError> {
    let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let expected_size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    let mut crc = Crc::new();
    crc.update(inflated);
    let (actual_crc, actual_size) = (crc.sum(), crc.amount());

    if actual_crc != expected_crc || actual_size != expected_size {
        return Err(GzipError::TrailerMismatch {
            expected_crc,
            expected_size,
            actual_crc,
            actual_size,
        });
    }
    Ok(())
}

/// Decode a payload: gzip is inflated, anything else is returned as-is.
pub fn try_decompress(payload: Bytes) -> Result<Bytes, GzipError> {
    if !is_gzip(&payload) {
        return Ok(payload);
    }

    let inflated = inflate_gzip(&payload)?;
    debug!(
        compressed = payload.len(),
        inflated = inflated.len(),
        "Inflated gzip payload"
    );
    Ok(Bytes::from(inflated))
}

/// Return the decompressed payload if it is gzip, otherwise the payload itself.
///
/// A gzip payload that fails to inflate is returned unchanged (degraded
/// fallback) so one bad segment does not abort the batch.
pub fn decompress_if_gzip(payload: Bytes) -> Bytes {
    match try_decompress(payload.clone()) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "Gzip payload could not be inflated, keeping raw bytes");
            payload
        }
    }
}
