//! Gzip detection and decoding of segment payloads

use bytes::Bytes;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc, GzBuilder};
use std::io::Write;

use report_segment_downloader::fetcher::gzip::{
    decompress_if_gzip, inflate_gzip, is_gzip, try_decompress,
};

use crate::support::gzip;

fn sample(len: usize) -> Vec<u8> {
    // mildly compressible, covers every byte value
    (0..len).map(|i| ((i * 31) % 251) as u8).collect()
}

#[test]
fn test_round_trip_various_sizes() {
    for len in [0, 1, 2, 17, 4096, 200_000] {
        let data = sample(len);
        let decoded = decompress_if_gzip(Bytes::from(gzip(&data)));
        assert_eq!(decoded.as_ref(), data.as_slice(), "len {len}");
    }
}

#[test]
fn test_round_trip_with_optional_header_fields() {
    let data = b"id,value\n1,2\n".to_vec();
    let mut encoder = GzBuilder::new()
        .filename("segment-001.csv")
        .comment("exported")
        .extra(vec![1, 2, 3, 4])
        .write(Vec::new(), Compression::best());
    encoder.write_all(&data).unwrap();
    let compressed = encoder.finish().unwrap();

    assert_eq!(inflate_gzip(&compressed).unwrap(), data);
}

#[test]
fn test_header_crc_flag_is_skipped() {
    let data = b"a,b\n1,2\n".to_vec();
    let mut deflater = DeflateEncoder::new(Vec::new(), Compression::default());
    deflater.write_all(&data).unwrap();
    let body = deflater.finish().unwrap();

    let mut crc = Crc::new();
    crc.update(&data);

    // ID1 ID2 CM FLG(FHCRC|FNAME) MTIME(4) XFL OS, name, CRC16, body, CRC32, ISIZE
    let mut payload = vec![0x1f, 0x8b, 8, 0x02 | 0x08, 0, 0, 0, 0, 0, 255];
    payload.extend_from_slice(b"x.csv\0");
    payload.extend_from_slice(&[0xaa, 0xbb]);
    payload.extend_from_slice(&body);
    payload.extend_from_slice(&crc.sum().to_le_bytes());
    payload.extend_from_slice(&crc.amount().to_le_bytes());

    let decoded = decompress_if_gzip(Bytes::from(payload));
    assert_eq!(decoded.as_ref(), data.as_slice());
}

#[test]
fn test_concatenated_members_are_joined() {
    let mut payload = gzip(b"a,b\n1,2\n");
    payload.extend_from_slice(&gzip(b"3,4\n"));

    let decoded = decompress_if_gzip(Bytes::from(payload));
    assert_eq!(decoded.as_ref(), b"a,b\n1,2\n3,4\n");
}

#[test]
fn test_many_members_with_header_fields() {
    let chunks: Vec<Vec<u8>> = (0..5).map(|i| sample(1_000 + i * 977)).collect();
    let mut payload = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let mut encoder = GzBuilder::new()
            .filename(format!("part-{i}"))
            .write(Vec::new(), Compression::fast());
        encoder.write_all(chunk).unwrap();
        payload.extend_from_slice(&encoder.finish().unwrap());
    }

    assert_eq!(inflate_gzip(&payload).unwrap(), chunks.concat());
}

#[test]
fn test_truncated_payload_is_an_error() {
    let mut payload = gzip(&sample(200_000));
    payload.truncate(payload.len() / 2);
    assert!(try_decompress(Bytes::from(payload)).is_err());
}

#[test]
fn test_non_gzip_and_tiny_inputs_pass_through() {
    for input in [&b""[..], &b"\x1f"[..], &b"a,b\n1,2\n"[..], &b"\x1f\x8a rest"[..]] {
        let out = decompress_if_gzip(Bytes::copy_from_slice(input));
        assert_eq!(out.as_ref(), input);
    }
    assert!(!is_gzip(b"\x1f"));
}

#[test]
fn test_corrupt_stream_falls_back_to_original_bytes() {
    let mut payload = gzip(b"some,data\n1,2\n");
    let len = payload.len();
    // clobber the deflate body, keep the header
    for byte in &mut payload[10..len - 8] {
        *byte = 0xff;
    }
    let original = payload.clone();

    let out = decompress_if_gzip(Bytes::from(payload));
    assert_eq!(out.as_ref(), original.as_slice());
}
