//! Fixed-width index record format.
//!
//! One ASCII line per entry:
//!
//! ```text
//! v1 <hex id> <size, 20 cols right-justified> <unix nanos, 20 cols right-justified>\n
//! ```
//!
//! Records are exactly [`ENTRY_SIZE`] bytes. Anything else — wrong header,
//! wrong separators, non-decimal numerics, a different id, short, long, or
//! empty — classifies the entry as missing.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use depot_hash::{BlobId, ID_SIZE};

use crate::cache::Entry;

pub(crate) const HEX_SIZE: usize = ID_SIZE * 2;

/// Exact byte length of an index record, including the trailing newline.
pub const ENTRY_SIZE: usize = 2 + 1 + HEX_SIZE + 1 + 20 + 1 + 20 + 1;

pub(crate) fn format_record(id: BlobId, size: u64, time: SystemTime) -> String {
    let nanos = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    format!("v1 {} {:>20} {:>20}\n", id.to_hex(), size, nanos)
}

/// Parse and validate a record read for `id`. `buf` must contain everything
/// the file held, up to `ENTRY_SIZE + 1` bytes so oversized files are caught.
pub(crate) fn parse_record(id: BlobId, buf: &[u8]) -> Result<Entry, String> {
    if buf.is_empty() {
        return Err("file is empty".into());
    }
    if buf.len() > ENTRY_SIZE {
        return Err("too long".into());
    }
    if buf.len() < ENTRY_SIZE {
        return Err("entry file incomplete".into());
    }
    if &buf[..3] != b"v1 "
        || buf[3 + HEX_SIZE] != b' '
        || buf[3 + HEX_SIZE + 1 + 20] != b' '
        || buf[ENTRY_SIZE - 1] != b'\n'
    {
        return Err("invalid header".into());
    }

    let hex_field = &buf[3..3 + HEX_SIZE];
    let size_field = &buf[3 + HEX_SIZE + 1..3 + HEX_SIZE + 1 + 20];
    let time_field = &buf[3 + HEX_SIZE + 1 + 20 + 1..ENTRY_SIZE - 1];

    let hex = std::str::from_utf8(hex_field).map_err(|_| "id is not hex".to_string())?;
    let recorded = BlobId::from_hex(hex).map_err(|e| format!("decoding id: {e}"))?;
    if recorded != id {
        return Err("mismatched id".into());
    }

    let size = parse_padded(size_field).map_err(|e| format!("parsing size: {e}"))?;
    let nanos = parse_padded(time_field).map_err(|e| format!("parsing timestamp: {e}"))?;

    Ok(Entry {
        size,
        time: UNIX_EPOCH + Duration::from_nanos(nanos),
    })
}

/// Parse a space-padded right-justified decimal. Unsigned, so a leading `-`
/// (a negative value) fails the parse and the record counts as malformed.
fn parse_padded(field: &[u8]) -> Result<u64, String> {
    let s = std::str::from_utf8(field).map_err(|_| "not ascii".to_string())?;
    s.trim_start_matches(' ')
        .parse::<u64>()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn test_id() -> BlobId {
        BlobId::from_bytes([0x5a; ID_SIZE])
    }

    #[test]
    fn record_has_exact_length() {
        let record = format_record(test_id(), 12345, UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert_eq!(record.len(), ENTRY_SIZE);
        assert!(record.ends_with('\n'));
    }

    #[test]
    fn round_trip() {
        let time = UNIX_EPOCH + Duration::from_nanos(1_700_000_000_123_456_789);
        let record = format_record(test_id(), 42, time);
        let entry = parse_record(test_id(), record.as_bytes()).unwrap();
        assert_eq!(entry.size, 42);
        assert_eq!(entry.time, time);
    }

    #[test]
    fn max_u64_size_fits_the_columns() {
        let record = format_record(test_id(), u64::MAX, UNIX_EPOCH);
        assert_eq!(record.len(), ENTRY_SIZE);
        let entry = parse_record(test_id(), record.as_bytes()).unwrap();
        assert_eq!(entry.size, u64::MAX);
    }

    #[rstest]
    #[case::empty(&b""[..], "file is empty")]
    #[case::short(&b"v1 abc"[..], "entry file incomplete")]
    fn truncated_records_are_missing(#[case] buf: &[u8], #[case] want: &str) {
        let err = parse_record(test_id(), buf).unwrap_err();
        assert_eq!(err, want);
    }

    #[test]
    fn oversized_record_is_missing() {
        let mut record = format_record(test_id(), 42, UNIX_EPOCH).into_bytes();
        record.push(b'x');
        let err = parse_record(test_id(), &record).unwrap_err();
        assert_eq!(err, "too long");
    }

    #[test]
    fn wrong_version_is_missing() {
        let mut record = format_record(test_id(), 42, UNIX_EPOCH).into_bytes();
        record[1] = b'2';
        let err = parse_record(test_id(), &record).unwrap_err();
        assert_eq!(err, "invalid header");
    }

    #[test]
    fn missing_newline_is_missing() {
        let mut record = format_record(test_id(), 42, UNIX_EPOCH).into_bytes();
        let last = record.len() - 1;
        record[last] = b' ';
        let err = parse_record(test_id(), &record).unwrap_err();
        assert_eq!(err, "invalid header");
    }

    #[test]
    fn mismatched_id_is_missing() {
        let other = BlobId::from_bytes([0x11; ID_SIZE]);
        let record = format_record(other, 42, UNIX_EPOCH);
        let err = parse_record(test_id(), record.as_bytes()).unwrap_err();
        assert_eq!(err, "mismatched id");
    }

    #[test]
    fn garbled_id_is_missing() {
        let mut record = format_record(test_id(), 42, UNIX_EPOCH).into_bytes();
        record[4] = b'!';
        let err = parse_record(test_id(), &record).unwrap_err();
        assert!(err.starts_with("decoding id"), "{err}");
    }

    #[test]
    fn negative_size_is_missing() {
        let record = format!(
            "v1 {} {:>20} {:>20}\n",
            test_id().to_hex(),
            "-1",
            "1700000000000000000"
        );
        assert_eq!(record.len(), ENTRY_SIZE);
        let err = parse_record(test_id(), record.as_bytes()).unwrap_err();
        assert!(err.starts_with("parsing size"), "{err}");
    }

    #[test]
    fn non_decimal_timestamp_is_missing() {
        let record = format!(
            "v1 {} {:>20} {:>20}\n",
            test_id().to_hex(),
            "42",
            "not-a-number"
        );
        assert_eq!(record.len(), ENTRY_SIZE);
        let err = parse_record(test_id(), record.as_bytes()).unwrap_err();
        assert!(err.starts_with("parsing timestamp"), "{err}");
    }
}
