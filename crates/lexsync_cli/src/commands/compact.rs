//! Compact command implementation.

use super::inspect::format_bytes;
use super::load_records;
use lexsync_queue::log::LogEntry;
use lexsync_queue::{now_millis, CompactionStats, QueueConfig, QueueStore, RetentionPolicy};
use std::path::Path;
use std::time::Duration;

/// Maps the command-line flags to a retention policy.
///
/// `--older-than-secs` takes precedence over `--prune-synced`.
pub fn policy_from_flags(prune_synced: bool, older_than_secs: Option<u64>) -> RetentionPolicy {
    match older_than_secs {
        Some(secs) => RetentionPolicy::PruneSyncedOlderThan(Duration::from_secs(secs)),
        None if prune_synced => RetentionPolicy::PruneSynced,
        None => RetentionPolicy::KeepAll,
    }
}

/// Computes what compaction would do without touching the log.
pub fn plan(path: &Path, policy: RetentionPolicy) -> Result<CompactionStats, Box<dyn std::error::Error>> {
    let bytes_before = std::fs::metadata(path)?.len();
    let replayed = load_records(path)?;
    let now = now_millis();

    let mut stats = CompactionStats {
        bytes_before,
        ..Default::default()
    };
    for record in replayed.records.values().flat_map(|class| class.values()) {
        if policy.should_prune(record, now) {
            stats.records_pruned += 1;
        } else {
            stats.records_kept += 1;
            stats.bytes_after += LogEntry::Put(record.clone()).encode()?.len() as u64;
        }
    }
    Ok(stats)
}

/// Runs the compact command.
pub fn run(
    path: &Path,
    policy: RetentionPolicy,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Queue log not found at {:?}", path).into());
    }

    println!("Compacting queue log at {:?}", path);
    println!("  Retention: {:?}", policy);
    if dry_run {
        println!("  (dry run - no changes will be made)");
    }
    println!();

    let stats = if dry_run {
        plan(path, policy)?
    } else {
        let store = QueueStore::open_path(path, QueueConfig::new())?;
        let stats = store.compact(policy)?;
        store.close()?;
        stats
    };

    println!("  Records kept:   {}", stats.records_kept);
    println!("  Records pruned: {}", stats.records_pruned);
    println!("  Size before:    {}", format_bytes(stats.bytes_before));
    println!("  Size after:     {}", format_bytes(stats.bytes_after));

    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    if stats.bytes_before > 0 {
        let percent = saved as f64 / stats.bytes_before as f64 * 100.0;
        println!("  Reclaimed:      {} ({:.1}%)", format_bytes(saved), percent);
    }

    println!();
    if dry_run {
        println!("✓ Dry run complete");
    } else {
        println!("✓ Compaction complete");
    }

    Ok(())
}
