use crate::models::{CarListing, HEADERS};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Write all records to a CSV file, replacing any previous contents.
///
/// After every export the file holds exactly the fixed header row followed by
/// one row per record, so the tabular range always spans header through last
/// data row.
pub fn export_to_csv(records: &[CarListing], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to open output file {}", path.display()))?;

    if records.is_empty() {
        // serialize() emits the header row lazily, so an empty export needs it
        // written explicitly.
        writer
            .write_record(HEADERS)
            .context("failed to write header row")?;
    }
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("failed to write record for {}", record.link))?;
    }
    writer.flush().context("failed to flush output file")?;

    info!("Exported {} records to {}", records.len(), path.display());
    Ok(())
}
