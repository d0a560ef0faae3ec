#![deny(warnings)]

//! Persistence layer: finished-game records, admin read access and
//! session snapshots.
//!
//! Records go to an append-only store. Two stores are provided: a CSV file
//! (header written once, UTF-8) and a SQLite database via `sqlx`.

mod admin;
mod csv_store;
mod record;
mod snapshot;
mod sqlite;

pub use admin::{AdminGate, AdminView};
pub use csv_store::CsvRecordStore;
pub use record::{count_csv_rows, encode_row, escape_field, render_csv, GameRecord, HEADER, TIMESTAMP_FORMAT};
pub use snapshot::{decode_snapshot, encode_snapshot, load_snapshot, save_snapshot};
pub use sqlite::{count_records, init_db, insert_record, list_records, SqliteRecordStore};

use thiserror::Error;

/// Errors raised by record stores and snapshots. None of them are fatal to
/// a running game; callers may retry.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("snapshot codec error: {0}")]
    Snapshot(#[from] bincode::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Destination for finished-game records.
pub trait RecordSink {
    /// Append one record. Either the whole row is stored or nothing is.
    fn append(&self, record: &GameRecord) -> Result<(), PersistenceError>;
}

/// A sink that can also be read back through the admin gate.
pub trait RecordStore: RecordSink {
    fn count(&self) -> Result<usize, PersistenceError>;
    /// Full record set as CSV bytes.
    fn export(&self) -> Result<Vec<u8>, PersistenceError>;
}

/// Returns the default CSV path used for local records.
pub fn default_csv_path() -> &'static str {
    "./saves/game_records.csv"
}

/// Returns the default SQLite URL used for local records.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/records.db"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
        assert!(default_csv_path().ends_with(".csv"));
    }
}
