#![deny(warnings)]

use persistence::{default_sqlite_url, RecordStore, SqliteRecordStore};

/// Create (or upgrade) the records database. Takes an optional URL.
fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    let store = SqliteRecordStore::open(&url)?;
    println!("records DB ready at {} ({} records)", url, store.count()?);
    Ok(())
}
