//! Inspect command implementation.

use super::{load_records, read_log};
use lexsync_queue::log::LogEntry;
use lexsync_queue::StateCounts;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Queue log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log size in bytes.
    pub log_size: u64,
    /// Number of valid log entries.
    pub entry_count: usize,
    /// Number of removal entries.
    pub removal_count: usize,
    /// Number of live records.
    pub record_count: usize,
    /// Bytes after the last valid entry.
    pub trailing_bytes: u64,
    /// Record counts per entity class.
    pub classes: BTreeMap<String, StateCounts>,
}

/// Collects statistics for the log at `path`.
pub fn collect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let (log_size, scan) = read_log(path)?;
    let entry_count = scan.entries.len();
    let removal_count = scan
        .entries
        .iter()
        .filter(|(_, entry)| matches!(entry, LogEntry::Remove(_)))
        .count();
    let trailing_bytes = log_size - scan.valid_len;

    let replayed = load_records(path)?;
    let mut classes = BTreeMap::new();
    let mut record_count = 0;
    for (class, records) in &replayed.records {
        let counts: &mut StateCounts = classes.entry(class.clone()).or_default();
        for record in records.values() {
            counts.add(record);
            record_count += 1;
        }
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size,
        entry_count,
        removal_count,
        record_count,
        trailing_bytes,
        classes,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = collect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Queue Log: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Log size:       {}", format_bytes(result.log_size));
    println!("  Entries:        {}", result.entry_count);
    println!("  Removals:       {}", result.removal_count);
    if result.trailing_bytes > 0 {
        println!(
            "  Trailing bytes: {} (dropped on next open)",
            result.trailing_bytes
        );
    }
    println!();
    println!("Records: {}", result.record_count);

    if result.classes.is_empty() {
        return;
    }

    println!();
    println!(
        "  {:<24} {:>8} {:>8} {:>8} {:>8} {:>10}",
        "Class", "Pending", "Syncing", "Synced", "Failed", "Permanent"
    );
    for (class, counts) in &result.classes {
        println!(
            "  {:<24} {:>8} {:>8} {:>8} {:>8} {:>10}",
            class,
            counts.pending,
            counts.syncing,
            counts.synced,
            counts.failed,
            counts.failed_permanent
        );
    }
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_queue::{QueueConfig, QueueStore};
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn counts_records_per_class() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.log");

        let store = QueueStore::open_path(&path, QueueConfig::new()).unwrap();
        store.save("lawFirmCases", "c1", json!({"t": 1})).unwrap();
        store.save("lawFirmCases", "c2", json!({"t": 2})).unwrap();
        store.mark_syncing("lawFirmCases", "c1").unwrap();
        store.mark_synced("lawFirmCases", "c1").unwrap();
        store.save("calendarEvents", "e1", json!({})).unwrap();
        store.mark_syncing("calendarEvents", "e1").unwrap();
        store.mark_synced("calendarEvents", "e1").unwrap();
        assert!(store.prune("calendarEvents", "e1").unwrap());
        store.close().unwrap();
        drop(store);

        let result = collect(&path).unwrap();
        assert_eq!(result.record_count, 2);
        assert_eq!(result.removal_count, 1);
        assert_eq!(result.trailing_bytes, 0);
        let cases = result.classes["lawFirmCases"];
        assert_eq!(cases.pending, 1);
        assert_eq!(cases.synced, 1);
        assert!(!result.classes.contains_key("calendarEvents"));
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(collect(&dir.path().join("absent.log")).is_err());
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
