//! On-disk log format.
//!
//! Every mutation of the queue is appended as one framed entry:
//!
//! ```text
//! | magic "LXQL" (4) | version u16 (2) | kind u8 (1) | len u32 (4) | payload (len) | crc32 (4) |
//! ```
//!
//! Integers are little-endian. The payload is CBOR. The CRC covers
//! everything before it. Replaying the entries in order, last writer wins,
//! rebuilds the queue.

use crate::error::{QueueError, QueueResult};
use crate::record::PendingRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Magic bytes opening every entry.
pub const LOG_MAGIC: [u8; 4] = *b"LXQL";

/// Current log format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Kind byte of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    /// Full snapshot of a record after a mutation.
    Put = 1,
    /// A record was pruned.
    Remove = 2,
}

impl EntryKind {
    /// Converts a byte to an entry kind.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Put),
            2 => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Key of a pruned record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    /// Entity class.
    pub entity_class: String,
    /// Record id.
    pub id: String,
}

/// A decoded log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    /// Record snapshot.
    Put(PendingRecord),
    /// Record removal.
    Remove(RecordKey),
}

impl LogEntry {
    /// Returns the entry kind.
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        match self {
            LogEntry::Put(_) => EntryKind::Put,
            LogEntry::Remove(_) => EntryKind::Remove,
        }
    }

    /// Encodes the entry into a complete frame.
    ///
    /// # Errors
    ///
    /// Returns an error if CBOR encoding fails or the payload exceeds the
    /// 4-byte length field.
    pub fn encode(&self) -> QueueResult<Vec<u8>> {
        let mut payload = Vec::new();
        let encoded = match self {
            LogEntry::Put(record) => ciborium::into_writer(record, &mut payload),
            LogEntry::Remove(key) => ciborium::into_writer(key, &mut payload),
        };
        encoded.map_err(|e| QueueError::Codec(e.to_string()))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| QueueError::PayloadTooLarge { len: payload.len() })?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&LOG_MAGIC);
        frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
        frame.push(self.kind() as u8);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);
        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }

    fn decode(kind: EntryKind, payload: &[u8], offset: u64) -> QueueResult<Self> {
        let codec_err = |e: ciborium::de::Error<std::io::Error>| QueueError::Corrupted {
            offset,
            message: format!("undecodable entry payload: {e}"),
        };
        match kind {
            EntryKind::Put => ciborium::from_reader(payload)
                .map(LogEntry::Put)
                .map_err(codec_err),
            EntryKind::Remove => ciborium::from_reader(payload)
                .map(LogEntry::Remove)
                .map_err(codec_err),
        }
    }
}

/// Problem found at the end of a scan.
#[derive(Debug)]
pub enum LogIssue {
    /// The final entry is incomplete, typically a write cut short by a crash.
    /// Everything from `offset` on can be dropped safely.
    TornTail {
        /// Offset where the incomplete entry starts.
        offset: u64,
    },
    /// An entry in the middle of the log is damaged.
    Corrupted(QueueError),
}

/// Result of walking a log.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Valid entries with their offsets, in log order.
    pub entries: Vec<(u64, LogEntry)>,
    /// Length of the valid prefix.
    pub valid_len: u64,
    /// Problem that stopped the scan, if any.
    pub issue: Option<LogIssue>,
}

/// Walks every entry in `bytes`.
///
/// A short header, a short payload, or a checksum failure on the very last
/// entry is reported as [`LogIssue::TornTail`]. Bad magic, an unknown
/// version or kind, or a checksum failure followed by more data is
/// [`LogIssue::Corrupted`].
#[must_use]
pub fn scan(bytes: &[u8]) -> LogScan {
    let mut result = LogScan::default();
    let total = bytes.len();
    let mut pos = 0usize;

    while pos < total {
        let offset = pos as u64;
        if total - pos < HEADER_SIZE {
            result.issue = Some(LogIssue::TornTail { offset });
            break;
        }

        let header = &bytes[pos..pos + HEADER_SIZE];
        if header[0..4] != LOG_MAGIC {
            result.issue = Some(LogIssue::Corrupted(QueueError::Corrupted {
                offset,
                message: format!("bad magic {:?}", &header[0..4]),
            }));
            break;
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != LOG_VERSION {
            result.issue = Some(LogIssue::Corrupted(QueueError::Corrupted {
                offset,
                message: format!("unsupported log version {version}"),
            }));
            break;
        }

        let Some(kind) = EntryKind::from_byte(header[6]) else {
            result.issue = Some(LogIssue::Corrupted(QueueError::Corrupted {
                offset,
                message: format!("unknown entry kind {}", header[6]),
            }));
            break;
        };

        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
        let frame_end = pos + HEADER_SIZE + len + CRC_SIZE;
        if frame_end > total {
            result.issue = Some(LogIssue::TornTail { offset });
            break;
        }

        let body_end = pos + HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        let computed = compute_crc32(&bytes[pos..body_end]);
        if stored != computed {
            result.issue = Some(if frame_end == total {
                LogIssue::TornTail { offset }
            } else {
                LogIssue::Corrupted(QueueError::ChecksumMismatch {
                    offset,
                    expected: stored,
                    actual: computed,
                })
            });
            break;
        }

        match LogEntry::decode(kind, &bytes[pos + HEADER_SIZE..body_end], offset) {
            Ok(entry) => result.entries.push((offset, entry)),
            Err(e) => {
                result.issue = Some(LogIssue::Corrupted(e));
                break;
            }
        }

        pos = frame_end;
        result.valid_len = pos as u64;
    }

    result
}

/// Live records rebuilt from a log.
#[derive(Debug, Default)]
pub struct Replayed {
    /// Latest snapshot of every record not removed, by class then id.
    pub records: BTreeMap<String, HashMap<String, PendingRecord>>,
    /// One past the highest sequence seen, removed records included.
    pub next_sequence: u64,
}

/// Folds entries in log order; the last entry for a key wins.
pub fn replay(entries: impl IntoIterator<Item = LogEntry>) -> Replayed {
    let mut replayed = Replayed {
        records: BTreeMap::new(),
        next_sequence: 1,
    };
    for entry in entries {
        match entry {
            LogEntry::Put(record) => {
                replayed.next_sequence = replayed.next_sequence.max(record.sequence + 1);
                replayed
                    .records
                    .entry(record.entity_class.clone())
                    .or_default()
                    .insert(record.id.clone(), record);
            }
            LogEntry::Remove(key) => {
                if let Some(class) = replayed.records.get_mut(&key.entity_class) {
                    class.remove(&key.id);
                }
            }
        }
    }
    replayed.records.retain(|_, class| !class.is_empty());
    replayed
}

/// CRC-32 (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put(id: &str, seq: u64) -> LogEntry {
        LogEntry::Put(PendingRecord::new(
            "accountingEntries",
            id,
            json!({"amount": 120.5, "currency": "EUR"}),
            seq,
        ))
    }

    fn log_of(entries: &[LogEntry]) -> Vec<u8> {
        entries.iter().flat_map(|e| e.encode().unwrap()).collect()
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn scan_reads_back_entries_in_order() {
        let entries = vec![
            put("a", 1),
            LogEntry::Remove(RecordKey {
                entity_class: "accountingEntries".into(),
                id: "a".into(),
            }),
            put("b", 2),
        ];
        let bytes = log_of(&entries);

        let scan = scan(&bytes);
        assert!(scan.issue.is_none());
        assert_eq!(scan.valid_len, bytes.len() as u64);
        let decoded: Vec<LogEntry> = scan.entries.into_iter().map(|(_, e)| e).collect();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn short_tail_is_torn_not_corrupt() {
        let mut bytes = log_of(&[put("a", 1), put("b", 2)]);
        let first_len = put("a", 1).encode().unwrap().len();
        bytes.truncate(bytes.len() - 3);

        let scan = scan(&bytes);
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.valid_len, first_len as u64);
        assert!(matches!(scan.issue, Some(LogIssue::TornTail { offset }) if offset == first_len as u64));
    }

    #[test]
    fn flipped_byte_mid_log_is_corruption() {
        let mut bytes = log_of(&[put("a", 1), put("b", 2)]);
        bytes[HEADER_SIZE + 2] ^= 0xFF;

        let scan = scan(&bytes);
        assert!(scan.entries.is_empty());
        assert!(matches!(
            scan.issue,
            Some(LogIssue::Corrupted(QueueError::ChecksumMismatch { offset: 0, .. }))
        ));
    }

    #[test]
    fn flipped_byte_in_last_entry_is_torn() {
        let mut bytes = log_of(&[put("a", 1), put("b", 2)]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let scan = scan(&bytes);
        assert_eq!(scan.entries.len(), 1);
        assert!(matches!(scan.issue, Some(LogIssue::TornTail { .. })));
    }

    #[test]
    fn garbage_is_bad_magic() {
        let scan = scan(&[0u8; 32]);
        assert!(matches!(
            scan.issue,
            Some(LogIssue::Corrupted(QueueError::Corrupted { offset: 0, .. }))
        ));
    }

    #[test]
    fn replay_keeps_last_snapshot_and_drops_removed() {
        let mut updated = PendingRecord::new("accountingEntries", "a", json!({"amount": 1}), 1);
        updated.attempts = 2;
        let entries = vec![
            put("a", 1),
            put("b", 2),
            LogEntry::Put(updated.clone()),
            LogEntry::Remove(RecordKey {
                entity_class: "accountingEntries".into(),
                id: "b".into(),
            }),
        ];

        let replayed = replay(entries);
        let class = &replayed.records["accountingEntries"];
        assert_eq!(class.len(), 1);
        assert_eq!(class["a"], updated);
        assert_eq!(replayed.next_sequence, 3);
    }
}
