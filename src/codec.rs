//! Packed bucket record codec.
//!
//! Implements a big-endian, self-describing record format:
//!
//! ```text
//! count:i32, then count times:
//!   keyLen:i32, key:bytes[keyLen], valueLen:i32, value:bytes[valueLen]
//! ```
//!
//! Grounded on the length-prefixed record encoding a hybrid log facade uses
//! to frame each log record as a header plus length-prefixed key/value;
//! this module applies the same framing to a whole bucket at once instead
//! of a single record.

use crate::error::{Result, StoreError};

const HEADER_LEN: usize = 4;

fn read_i32(buf: &[u8], offset: usize) -> Result<(i32, usize)> {
    let end = offset + HEADER_LEN;
    if end > buf.len() {
        return Err(StoreError::codec(format!(
            "truncated length prefix at offset {offset} (record is {} bytes)",
            buf.len()
        )));
    }
    let value = i32::from_be_bytes(buf[offset..end].try_into().unwrap());
    Ok((value, end))
}

fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// One decoded `(key, value)` entry plus the byte range it occupies within
/// the record it was decoded from. The range lets callers (notably the
/// split algorithm) splice entries out without re-encoding the whole
/// record.
pub struct DecodedEntry<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
    /// Byte range of this entry within the record, header and payload
    /// inclusive, spanning from its `keyLen` prefix to the end of `value`.
    pub span: std::ops::Range<usize>,
}

/// Decode a packed record into a count plus an iterator-friendly vector of
/// entries. Returns a codec error if the record is malformed: negative
/// count, a length prefix that runs past the end of the buffer, or
/// trailing bytes after the last declared entry.
pub fn decode(record: &[u8]) -> Result<Vec<DecodedEntry<'_>>> {
    let (count, mut pos) = read_i32(record, 0)?;
    if count < 0 {
        return Err(StoreError::codec(format!("negative entry count {count}")));
    }
    let mut entries = Vec::with_capacity(count as usize);

    for _ in 0..count {
        let entry_start = pos;
        let (key_len, after_key_len) = read_i32(record, pos)?;
        if key_len < 0 {
            return Err(StoreError::codec(format!("negative key length {key_len}")));
        }
        let key_end = after_key_len + key_len as usize;
        if key_end > record.len() {
            return Err(StoreError::codec("key bytes run past end of record"));
        }
        let key = &record[after_key_len..key_end];

        let (value_len, after_value_len) = read_i32(record, key_end)?;
        if value_len < 0 {
            return Err(StoreError::codec(format!(
                "negative value length {value_len}"
            )));
        }
        let value_end = after_value_len + value_len as usize;
        if value_end > record.len() {
            return Err(StoreError::codec("value bytes run past end of record"));
        }
        let value = &record[after_value_len..value_end];

        entries.push(DecodedEntry {
            key,
            value,
            span: entry_start..value_end,
        });
        pos = value_end;
    }

    if pos != record.len() {
        return Err(StoreError::codec(format!(
            "{} trailing bytes after {count} declared entries",
            record.len() - pos
        )));
    }

    Ok(entries)
}

/// `extractByKey(k, R) -> value | absent`.
pub fn extract_by_key(key: &[u8], record: &[u8]) -> Result<Option<Vec<u8>>> {
    for entry in decode(record)? {
        if entry.key == key {
            return Ok(Some(entry.value.to_vec()));
        }
    }
    Ok(None)
}

fn encode_entry(out: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    write_i32(out, key.len() as i32);
    out.extend_from_slice(key);
    write_i32(out, value.len() as i32);
    out.extend_from_slice(value);
}

/// `assemble(k, v) -> R'`: a fresh single-entry record.
pub fn assemble_new(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN * 3 + key.len() + value.len());
    write_i32(&mut out, 1);
    encode_entry(&mut out, key, value);
    out
}

/// `assemble(k, v, R) -> R'`: insert-or-replace against an existing record.
pub fn assemble_merge(key: &[u8], value: &[u8], record: &[u8]) -> Result<Vec<u8>> {
    let entries = decode(record)?;
    let mut out = Vec::with_capacity(record.len() + HEADER_LEN * 2 + key.len() + value.len());

    let replacing = entries.iter().any(|e| e.key == key);
    let count = if replacing {
        entries.len()
    } else {
        entries.len() + 1
    };
    write_i32(&mut out, count as i32);

    let mut appended = false;
    for entry in &entries {
        if entry.key == key {
            encode_entry(&mut out, entry.key, value);
            appended = true;
        } else {
            encode_entry(&mut out, entry.key, entry.value);
        }
    }
    if !appended {
        encode_entry(&mut out, key, value);
    }

    Ok(out)
}

/// `removeByKey(k, R) -> newLen | 0`.
///
/// Rewrites `record` in place, shifting the tail left over the removed
/// entry and decrementing the stored count. Returns the new byte length,
/// or `record.len()` unchanged if `key` was not present, or `0` if the
/// removed entry was the bucket's last one (caller deletes the bucket).
pub fn remove_by_key(key: &[u8], record: &mut Vec<u8>) -> Result<usize> {
    let (count, _) = read_i32(record, 0)?;
    let entries = decode(record)?;

    let Some(target) = entries.iter().find(|e| e.key == key) else {
        return Ok(record.len());
    };
    let span = target.span.clone();
    let new_count = count - 1;

    record.drain(span);
    record[0..HEADER_LEN].copy_from_slice(&new_count.to_be_bytes());

    if new_count == 0 {
        Ok(0)
    } else {
        Ok(record.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_new_round_trips() {
        let record = assemble_new(b"k1", b"v1");
        assert_eq!(extract_by_key(b"k1", &record).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(extract_by_key(b"nope", &record).unwrap(), None);
    }

    #[test]
    fn assemble_merge_appends_and_replaces() {
        let record = assemble_new(b"k1", b"v1");
        let record = assemble_merge(b"k2", b"v2", &record).unwrap();
        assert_eq!(decode(&record).unwrap().len(), 2);
        assert_eq!(extract_by_key(b"k1", &record).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(extract_by_key(b"k2", &record).unwrap(), Some(b"v2".to_vec()));

        let record = assemble_merge(b"k1", b"v1-updated", &record).unwrap();
        assert_eq!(decode(&record).unwrap().len(), 2);
        assert_eq!(
            extract_by_key(b"k1", &record).unwrap(),
            Some(b"v1-updated".to_vec())
        );
    }

    #[test]
    fn remove_by_key_shrinks_and_signals_empty() {
        let record = assemble_new(b"k1", b"v1");
        let mut record = assemble_merge(b"k2", b"v2", &record).unwrap();

        let new_len = remove_by_key(b"k1", &mut record).unwrap();
        assert_eq!(new_len, record.len());
        assert_eq!(decode(&record).unwrap().len(), 1);
        assert_eq!(extract_by_key(b"k1", &record).unwrap(), None);

        let new_len = remove_by_key(b"k2", &mut record).unwrap();
        assert_eq!(new_len, 0);
    }

    #[test]
    fn remove_by_key_missing_key_is_noop() {
        let mut record = assemble_new(b"k1", b"v1");
        let before = record.len();
        let new_len = remove_by_key(b"missing", &mut record).unwrap();
        assert_eq!(new_len, before);
    }

    #[test]
    fn decode_rejects_truncated_record() {
        let mut record = assemble_new(b"k1", b"v1");
        record.truncate(record.len() - 2);
        assert!(decode(&record).is_err());
    }

    #[test]
    fn decode_rejects_trailing_garbage() {
        let mut record = assemble_new(b"k1", b"v1");
        record.push(0xff);
        assert!(decode(&record).is_err());
    }
}
