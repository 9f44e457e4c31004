//! TLV blocks carried in a ZIP entry's extra-field area.
//!
//! Every block is `header id (u16 LE) | payload length (u16 LE) | payload`, so
//! our blocks can sit next to blocks written by other tools. Layouts:
//!
//! | block      | id       | len | payload                                        |
//! |------------|----------|-----|------------------------------------------------|
//! | times      | `0x5449` | 24  | modified, accessed, created: i64 LE millis     |
//! | permission | `0x504D` | 4   | POSIX mode: u32 LE                             |
//! | digest     | `0x4D44` | 32  | lowercase hex MD5 of the entry content (ASCII) |
//!
//! Pure functions only: no I/O happens here.

pub const TIME_BLOCK_ID: u16 = 0x5449;
pub const TIME_BLOCK_LEN: usize = 24;
pub const PERMISSION_BLOCK_ID: u16 = 0x504D;
pub const PERMISSION_BLOCK_LEN: usize = 4;
pub const DIGEST_BLOCK_ID: u16 = 0x4D44;
pub const DIGEST_BLOCK_LEN: usize = 32;

const HEADER_LEN: usize = 4;

/// The three file timestamps, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    pub modified_ms: i64,
    pub accessed_ms: i64,
    pub created_ms: i64,
}

impl FileTimes {
    /// All three stamps set to the same instant; used when only one is known.
    pub fn uniform(ms: i64) -> Self {
        Self {
            modified_ms: ms,
            accessed_ms: ms,
            created_ms: ms,
        }
    }
}

pub fn time_payload(times: &FileTimes) -> [u8; TIME_BLOCK_LEN] {
    let mut out = [0u8; TIME_BLOCK_LEN];
    out[0..8].copy_from_slice(&times.modified_ms.to_le_bytes());
    out[8..16].copy_from_slice(&times.accessed_ms.to_le_bytes());
    out[16..24].copy_from_slice(&times.created_ms.to_le_bytes());
    out
}

pub fn permission_payload(mode: u32) -> [u8; PERMISSION_BLOCK_LEN] {
    mode.to_le_bytes()
}

/// Returns `None` unless `hex` is exactly 32 ASCII hex digits.
pub fn digest_payload(hex: &str) -> Option<[u8; DIGEST_BLOCK_LEN]> {
    let bytes = hex.as_bytes();
    if bytes.len() != DIGEST_BLOCK_LEN || !bytes.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let mut out = [0u8; DIGEST_BLOCK_LEN];
    out.copy_from_slice(bytes);
    Some(out)
}

/// Frame a payload as a complete block (header + payload).
pub fn encode_block(header_id: u16, payload: &[u8]) -> Vec<u8> {
    let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
    let body = &payload[..usize::from(len)];
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&header_id.to_le_bytes());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(body);
    out
}

pub fn encode_times(times: &FileTimes) -> Vec<u8> {
    encode_block(TIME_BLOCK_ID, &time_payload(times))
}

pub fn encode_permissions(mode: u32) -> Vec<u8> {
    encode_block(PERMISSION_BLOCK_ID, &permission_payload(mode))
}

/// Locate the payload of the first block with `header_id`.
///
/// Foreign blocks are skipped by their declared length. A block whose declared
/// length runs past the end of `extra` ends the scan.
pub fn find_block(extra: &[u8], header_id: u16) -> Option<&[u8]> {
    let mut pos = 0usize;
    while pos + HEADER_LEN <= extra.len() {
        let id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let len = usize::from(u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]));
        let start = pos + HEADER_LEN;
        let end = start + len;
        if end > extra.len() {
            return None;
        }
        if id == header_id {
            return Some(&extra[start..end]);
        }
        pos = end;
    }
    None
}

pub fn decode_times(extra: &[u8]) -> Option<FileTimes> {
    let payload = find_block(extra, TIME_BLOCK_ID)?;
    if payload.len() < TIME_BLOCK_LEN {
        return None;
    }
    let read = |at: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&payload[at..at + 8]);
        i64::from_le_bytes(raw)
    };
    Some(FileTimes {
        modified_ms: read(0),
        accessed_ms: read(8),
        created_ms: read(16),
    })
}

/// Decode the time block, falling back to the entry's single last-modified
/// stamp when the block is absent or truncated.
pub fn decode_times_or(extra: &[u8], fallback_modified_ms: i64) -> FileTimes {
    decode_times(extra).unwrap_or_else(|| FileTimes::uniform(fallback_modified_ms))
}

pub fn decode_permissions(extra: &[u8]) -> Option<u32> {
    let payload = find_block(extra, PERMISSION_BLOCK_ID)?;
    let raw: [u8; PERMISSION_BLOCK_LEN] = payload.get(..PERMISSION_BLOCK_LEN)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

pub fn decode_digest(extra: &[u8]) -> Option<String> {
    let payload = find_block(extra, DIGEST_BLOCK_ID)?;
    if payload.len() != DIGEST_BLOCK_LEN || !payload.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    std::str::from_utf8(payload)
        .ok()
        .map(|s| s.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_times() -> FileTimes {
        FileTimes {
            modified_ms: 1_700_000_000_123,
            accessed_ms: 1_700_000_500_456,
            created_ms: 1_600_000_000_789,
        }
    }

    #[test]
    fn time_block_layout_is_byte_exact() {
        let block = encode_times(&sample_times());
        assert_eq!(block.len(), 4 + 24);
        assert_eq!(&block[0..2], &[0x49, 0x54]);
        assert_eq!(&block[2..4], &[24, 0]);
        assert_eq!(&block[4..12], &1_700_000_000_123i64.to_le_bytes());
        assert_eq!(&block[20..28], &1_600_000_000_789i64.to_le_bytes());
    }

    #[test]
    fn permission_block_layout_is_byte_exact() {
        let block = encode_permissions(0o100755);
        assert_eq!(block, vec![0x4D, 0x50, 4, 0, 0xED, 0x81, 0, 0]);
        assert_eq!(decode_permissions(&block), Some(0o100755));
    }

    #[test]
    fn decode_skips_foreign_blocks() {
        let mut extra = encode_block(0x5455, &[1, 2, 3, 4, 5]);
        extra.extend(encode_permissions(0o644));
        extra.extend(encode_block(0xCAFE, &[]));
        extra.extend(encode_times(&sample_times()));

        assert_eq!(decode_times(&extra), Some(sample_times()));
        assert_eq!(decode_permissions(&extra), Some(0o644));
    }

    #[test]
    fn truncated_time_block_falls_back() {
        let block = encode_times(&sample_times());
        let cut = &block[..block.len() - 3];
        assert_eq!(decode_times(cut), None);
        assert_eq!(decode_times_or(cut, 42), FileTimes::uniform(42));
        assert_eq!(decode_times_or(&[], 7), FileTimes::uniform(7));
    }

    #[test]
    fn short_declared_length_is_rejected() {
        let short = encode_block(TIME_BLOCK_ID, &[0u8; 8]);
        assert_eq!(decode_times(&short), None);
        let short_mode = encode_block(PERMISSION_BLOCK_ID, &[1, 2]);
        assert_eq!(decode_permissions(&short_mode), None);
    }

    #[test]
    fn dangling_header_byte_is_tolerated() {
        let mut extra = encode_permissions(0o600);
        extra.push(0x49);
        assert_eq!(decode_permissions(&extra), Some(0o600));
        assert_eq!(decode_times(&extra), None);
    }

    #[test]
    fn digest_block_only_accepts_hex() {
        let hex = "900150983cd24fb0d6963f7d28e17f72";
        let payload = digest_payload(hex).unwrap();
        let block = encode_block(DIGEST_BLOCK_ID, &payload);
        assert_eq!(decode_digest(&block).as_deref(), Some(hex));

        assert!(digest_payload("xyz").is_none());
        assert!(digest_payload(&"g".repeat(32)).is_none());
    }

    #[test]
    fn negative_timestamps_survive() {
        let times = FileTimes {
            modified_ms: -1,
            accessed_ms: i64::MIN,
            created_ms: 0,
        };
        assert_eq!(decode_times(&encode_times(&times)), Some(times));
    }
}
