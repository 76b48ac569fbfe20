//! Verify command implementation.

use super::read_log;
use lexsync_queue::log::{LogEntry, LogIssue};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of entries that decoded and passed their checksum.
    pub valid_entries: usize,
    /// Length of the valid prefix.
    pub valid_len: u64,
    /// Log size in bytes.
    pub log_size: u64,
    /// Offset of an incomplete final entry.
    pub torn_tail: Option<u64>,
    /// Errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Checks every entry of the log at `path`.
pub fn check(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let (log_size, scan) = read_log(path)?;
    let mut result = VerifyResult {
        valid_entries: scan.entries.len(),
        valid_len: scan.valid_len,
        log_size,
        ..Default::default()
    };

    for (offset, entry) in &scan.entries {
        if let LogEntry::Put(record) = entry {
            if record.id.is_empty() || record.entity_class.is_empty() {
                result
                    .errors
                    .push(format!("Record at offset {} has an empty key", offset));
            }
        }
    }

    match scan.issue {
        Some(LogIssue::TornTail { offset }) => result.torn_tail = Some(offset),
        Some(LogIssue::Corrupted(err)) => result
            .errors
            .push(format!("Corrupted entry after offset {}: {}", scan.valid_len, err)),
        None => {}
    }

    Ok(result)
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying queue log at {:?}", path);
    println!();

    let result = check(path)?;
    println!("  Entries checked: {}", result.valid_entries);
    println!("  Valid bytes:     {} / {}", result.valid_len, result.log_size);
    if let Some(offset) = result.torn_tail {
        println!(
            "  Incomplete final entry at offset {} (dropped on next open)",
            offset
        );
    }
    for error in &result.errors {
        println!("  ✗ {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Queue log verification passed");
        Ok(())
    } else {
        println!("✗ Queue log verification failed");
        Err("Verification failed".into())
    }
}
