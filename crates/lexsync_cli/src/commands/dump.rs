//! Dump command implementation.

use super::load_records;
use lexsync_queue::PendingRecord;
use std::path::Path;

/// Returns the live records of the log at `path` in FIFO order.
pub fn records(
    path: &Path,
    class: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<PendingRecord>, Box<dyn std::error::Error>> {
    let replayed = load_records(path)?;
    let mut records: Vec<PendingRecord> = replayed
        .records
        .into_iter()
        .filter(|(name, _)| class.map_or(true, |c| c == name.as_str()))
        .flat_map(|(_, records)| records.into_values())
        .collect();
    records.sort_by_key(PendingRecord::fifo_key);
    if let Some(limit) = limit {
        records.truncate(limit);
    }
    Ok(records)
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    class: Option<&str>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = records(path, class, limit)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("Queue log: {:?}", path);
    println!("Records: {}", records.len());
    println!();

    for record in &records {
        println!(
            "{:>6}  {:<20} {:<36} {:<8} attempts={}",
            record.sequence,
            record.entity_class,
            record.id,
            record.sync_state.as_str(),
            record.attempts
        );
        if let Some(error) = &record.last_error {
            let permanent = if record.retryable { "" } else { " (permanent)" };
            println!("        last error{}: {}", permanent, error);
        }
    }

    Ok(())
}
