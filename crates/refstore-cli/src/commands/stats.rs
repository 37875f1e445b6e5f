//! Stats command implementation.

use std::path::Path;

use anyhow::Result;
use refstore_core::{Store, StoreError};

/// Print store statistics.
pub fn run(db_dir: &Path) -> Result<()> {
    let store = Store::open(db_dir, refstore_core::config::DEFAULT_MAX_STORE_SIZE_GB)?;
    let reader = store.reader();

    println!("Records:    {}", reader.len()?);
    println!("Disk usage: {} bytes", store.disk_space());

    match reader.most_recent_watermark() {
        Ok(watermark) => println!("Watermark:  {watermark}"),
        Err(refstore_core::Error::Store(StoreError::WatermarkMissing)) => {
            println!("Watermark:  (none)");
        }
        Err(err) => return Err(err.into()),
    }

    // full scan; the persisted entry and this should agree on a healthy store
    match reader.recompute_watermark_by_scan()? {
        Some(scanned) => println!("Scanned:    {}", refstore_core::date::format_watermark(scanned)),
        None => println!("Scanned:    (no indexed records)"),
    }

    Ok(())
}
