//! On-disk record framing for the simulation container.
//!
//! A container file is a flat sequence of records. Each record is:
//!
//! ```text
//! marker       4 bytes   b"PAS1"
//! kind         1 byte    0 = array, 1 = metadata
//! category     1 byte    see [`crate::store::Category::id`]
//! wavelength   4 bytes   u32 LE, nanometres (0 = wavelength-independent)
//! ndim         1 byte    2 or 3 for arrays, 0 for metadata
//! dims         ndim x 8  u64 LE each
//! payload_len  8 bytes   u64 LE
//! payload      payload_len bytes (f64 LE for arrays, JSON for metadata)
//! checksum     4 bytes   u32 LE over everything after the marker
//! ```
//!
//! All integers are little-endian. The checksum is a wrapping sum of the
//! covered bytes taken as little-endian u32 words, the trailing partial
//! word zero-padded.

use thiserror::Error;

pub(crate) const RECORD_MARKER: [u8; 4] = *b"PAS1";

/// Marker + kind + category + wavelength + ndim.
const FIXED_HEAD: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind {
    Array = 0,
    Meta = 1,
}

impl RecordKind {
    fn from_byte(byte: u8) -> Option<RecordKind> {
        match byte {
            0 => Some(RecordKind::Array),
            1 => Some(RecordKind::Meta),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub kind: RecordKind,
    pub category_id: u8,
    pub wavelength_nm: u32,
    pub dims: Vec<usize>,
    pub payload: Vec<u8>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum FormatError {
    #[error("bad record marker")]
    BadMarker,
    #[error("unknown record kind {0}")]
    UnknownKind(u8),
    #[error("record kind does not allow {0} dimensions")]
    BadDimCount(u8),
    #[error("payload length {got} does not match dimensions ({expected} expected)")]
    PayloadLength { expected: u64, got: u64 },
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
}

/// Wrapping sum of little-endian u32 words, zero-padded tail.
pub(crate) fn checksum(bytes: &[u8]) -> u32 {
    let mut words = bytes.chunks_exact(4);
    let mut sum = words.by_ref().fold(0u32, |acc, w| {
        acc.wrapping_add(u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
    });
    let tail = words.remainder();
    if !tail.is_empty() {
        let mut word = [0u8; 4];
        word[..tail.len()].copy_from_slice(tail);
        sum = sum.wrapping_add(u32::from_le_bytes(word));
    }
    sum
}

pub(crate) fn encode_record(record: &Record) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        FIXED_HEAD + record.dims.len() * 8 + 8 + record.payload.len() + 4,
    );
    out.extend_from_slice(&RECORD_MARKER);
    out.push(record.kind as u8);
    out.push(record.category_id);
    out.extend_from_slice(&record.wavelength_nm.to_le_bytes());
    out.push(record.dims.len() as u8);
    for dim in &record.dims {
        out.extend_from_slice(&(*dim as u64).to_le_bytes());
    }
    out.extend_from_slice(&(record.payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&record.payload);
    let sum = checksum(&out[4..]);
    out.extend_from_slice(&sum.to_le_bytes());
    out
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

/// Offset of a record's payload relative to the record start.
pub(crate) fn payload_offset(ndim: usize) -> usize {
    FIXED_HEAD + ndim * 8 + 8
}

/// Decode the record at the start of `buf`.
///
/// `Ok(None)` means the buffer ends inside the record (a torn tail after an
/// interrupted write); the caller truncates the file there. Any structural
/// violation in fully present bytes is corruption and yields an error.
pub(crate) fn decode_record(buf: &[u8]) -> Result<Option<(Record, usize)>, FormatError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    if buf[..4] != RECORD_MARKER {
        return Err(FormatError::BadMarker);
    }
    if buf.len() < FIXED_HEAD {
        return Ok(None);
    }

    let kind = RecordKind::from_byte(buf[4]).ok_or(FormatError::UnknownKind(buf[4]))?;
    let category_id = buf[5];
    let wavelength_nm = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
    let ndim = buf[10] as usize;
    let dims_ok = match kind {
        RecordKind::Array => (2..=3).contains(&ndim),
        RecordKind::Meta => ndim == 0,
    };
    if !dims_ok {
        return Err(FormatError::BadDimCount(ndim as u8));
    }

    let dims_end = FIXED_HEAD + ndim * 8;
    if buf.len() < dims_end + 8 {
        return Ok(None);
    }
    let mut dims = Vec::with_capacity(ndim);
    for i in 0..ndim {
        dims.push(read_u64(buf, FIXED_HEAD + i * 8) as usize);
    }
    let payload_len = read_u64(buf, dims_end);
    if kind == RecordKind::Array {
        let expected = dims
            .iter()
            .map(|d| *d as u64)
            .product::<u64>()
            .saturating_mul(8);
        if expected != payload_len {
            return Err(FormatError::PayloadLength {
                expected,
                got: payload_len,
            });
        }
    }

    let body_start = dims_end + 8;
    if ((buf.len() - body_start) as u64) < payload_len.saturating_add(4) {
        return Ok(None);
    }
    let payload_end = body_start + payload_len as usize;
    let stored = u32::from_le_bytes([
        buf[payload_end],
        buf[payload_end + 1],
        buf[payload_end + 2],
        buf[payload_end + 3],
    ]);
    let computed = checksum(&buf[4..payload_end]);
    if stored != computed {
        return Err(FormatError::Checksum { stored, computed });
    }

    let record = Record {
        kind,
        category_id,
        wavelength_nm,
        dims,
        payload: buf[body_start..payload_end].to_vec(),
    };
    Ok(Some((record, payload_end + 4)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            kind: RecordKind::Array,
            category_id: 3,
            wavelength_nm: 800,
            dims: vec![2, 1, 2],
            payload: [1.0f64, 2.0, 3.0, 4.0]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect(),
        }
    }

    #[test]
    fn test_checksum_known_value() {
        // 0x04030201 + 0x0605 (zero-padded tail)
        assert_eq!(checksum(&[1, 2, 3, 4, 5, 6]), 0x0403_0201 + 0x0605);
    }

    #[test]
    fn test_checksum_wraps() {
        let bytes = [0xff; 8];
        assert_eq!(
            checksum(&bytes),
            0xffff_ffffu32.wrapping_add(0xffff_ffff)
        );
    }

    #[test]
    fn test_round_trip() {
        let record = sample_record();
        let bytes = encode_record(&record);
        let (decoded, consumed) = decode_record(&bytes).unwrap().unwrap();
        assert_eq!(decoded, record);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_truncated_buffer_is_torn_not_corrupt() {
        let bytes = encode_record(&sample_record());
        // Every proper prefix must scan as a torn tail.
        for cut in [0, 3, 8, FIXED_HEAD, FIXED_HEAD + 20, bytes.len() - 1] {
            assert_eq!(decode_record(&bytes[..cut]), Ok(None), "cut at {cut}");
        }
    }

    #[test]
    fn test_bad_marker_is_corrupt() {
        let mut bytes = encode_record(&sample_record());
        bytes[0] = b'X';
        assert_eq!(decode_record(&bytes), Err(FormatError::BadMarker));
    }

    #[test]
    fn test_flipped_payload_byte_fails_checksum() {
        let mut bytes = encode_record(&sample_record());
        let payload_at = payload_offset(3);
        bytes[payload_at] ^= 0x40;
        assert!(matches!(
            decode_record(&bytes),
            Err(FormatError::Checksum { .. })
        ));
    }

    #[test]
    fn test_payload_must_match_dims() {
        let mut record = sample_record();
        record.payload.truncate(16);
        let bytes = encode_record(&record);
        assert!(matches!(
            decode_record(&bytes),
            Err(FormatError::PayloadLength {
                expected: 32,
                got: 16
            })
        ));
    }

    #[test]
    fn test_two_records_back_to_back() {
        let mut bytes = encode_record(&sample_record());
        let second = Record {
            kind: RecordKind::Meta,
            category_id: 10,
            wavelength_nm: 0,
            dims: vec![],
            payload: br#"{"sample_count":128}"#.to_vec(),
        };
        let first_len = bytes.len();
        bytes.extend_from_slice(&encode_record(&second));

        let (_, consumed) = decode_record(&bytes).unwrap().unwrap();
        assert_eq!(consumed, first_len);
        let (decoded, _) = decode_record(&bytes[consumed..]).unwrap().unwrap();
        assert_eq!(decoded, second);
    }
}
