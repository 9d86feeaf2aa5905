//! Status command - show the queue saved in a snapshot file

use crate::cli::style::{Stylize, check};
use anstream::println;
use mergequeue::error::Result;
use mergequeue::queue::SnapshotStore;
use mergequeue::types::MergeStatus;
use std::path::Path;

/// Run the status command
pub fn run_status(snapshot: &Path) -> Result<()> {
    let store = SnapshotStore::new(snapshot);
    let entries = store.load()?;

    println!(
        "{} {}",
        "Merge queue".emphasis(),
        format!("({})", snapshot.display()).muted()
    );

    if entries.is_empty() {
        println!("  {} {}", check(), "Queue is empty".muted());
        return Ok(());
    }

    for (index, entry) in entries.iter().enumerate() {
        let status = match entry.status {
            MergeStatus::InProgress => entry.status.to_string().warn(),
            _ => entry.status.to_string().muted(),
        };
        println!(
            "  {}. {} {} → {}  {}  {}",
            index + 1,
            entry.id.to_string().accent(),
            entry.source_ref,
            entry.target_ref,
            format!("@{}", entry.requester).muted(),
            status
        );
        println!(
            "     {}",
            format!("queued {}", entry.arrived_at.format("%Y-%m-%d %H:%M:%S UTC")).muted()
        );
    }

    Ok(())
}
