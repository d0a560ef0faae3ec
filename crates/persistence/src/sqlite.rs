use crate::record::{render_csv, GameRecord, TIMESTAMP_FORMAT};
use crate::{PersistenceError, RecordSink, RecordStore};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS game_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    player TEXT NOT NULL,
    final_total INTEGER NOT NULL,
    roi_pct TEXT NOT NULL,
    event_cards TEXT NOT NULL,
    allocation_year0 TEXT NOT NULL,
    allocation_year10 TEXT NOT NULL,
    allocation_year20 TEXT NOT NULL,
    feedback TEXT NOT NULL
)";

type RecordRow = (
    String,
    String,
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
);

/// Open a pool for `url` and make sure the records table exists.
pub async fn init_db(url: &str) -> Result<SqlitePool, PersistenceError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    // In-memory databases live as long as their single connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    sqlx::query(CREATE_TABLE).execute(&pool).await?;
    debug!(url, "records table ready");
    Ok(pool)
}

pub async fn insert_record(pool: &SqlitePool, record: &GameRecord) -> Result<i64, PersistenceError> {
    let done = sqlx::query(
        "INSERT INTO game_records (recorded_at, player, final_total, roi_pct, event_cards, \
         allocation_year0, allocation_year10, allocation_year20, feedback) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(record.recorded_at.format(TIMESTAMP_FORMAT).to_string())
    .bind(&record.player)
    .bind(record.final_total)
    .bind(record.roi_pct.to_string())
    .bind(&record.event_cards)
    .bind(&record.allocation_year0)
    .bind(&record.allocation_year10)
    .bind(&record.allocation_year20)
    .bind(&record.feedback)
    .execute(pool)
    .await?;
    Ok(done.last_insert_rowid())
}

pub async fn count_records(pool: &SqlitePool) -> Result<usize, PersistenceError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM game_records")
        .fetch_one(pool)
        .await?;
    Ok(n.max(0) as usize)
}

/// All records in insertion order.
pub async fn list_records(pool: &SqlitePool) -> Result<Vec<GameRecord>, PersistenceError> {
    let rows: Vec<RecordRow> = sqlx::query_as(
        "SELECT recorded_at, player, final_total, roi_pct, event_cards, \
         allocation_year0, allocation_year10, allocation_year20, feedback \
         FROM game_records ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_record).collect()
}

fn row_to_record(row: RecordRow) -> Result<GameRecord, PersistenceError> {
    let (recorded_at, player, final_total, roi_pct, event_cards, y0, y10, y20, feedback) = row;
    let recorded_at = NaiveDateTime::parse_from_str(&recorded_at, TIMESTAMP_FORMAT)
        .map_err(|e| PersistenceError::Corrupt(format!("timestamp {recorded_at:?}: {e}")))?;
    let roi_pct = Decimal::from_str(&roi_pct)
        .map_err(|e| PersistenceError::Corrupt(format!("roi {roi_pct:?}: {e}")))?;
    Ok(GameRecord {
        recorded_at,
        player,
        final_total,
        roi_pct,
        event_cards,
        allocation_year0: y0,
        allocation_year10: y10,
        allocation_year20: y20,
        feedback,
    })
}

fn ensure_parent_dir(url: &str) -> std::io::Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .map(|p| p.split('?').next().unwrap_or(p));
    match path {
        Some(p) if !p.is_empty() && !p.starts_with(":memory:") => {
            if let Some(parent) = Path::new(p).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Blocking record store backed by SQLite.
///
/// Owns a current-thread runtime so the synchronous game loop can call
/// into `sqlx` without being async itself.
pub struct SqliteRecordStore {
    runtime: Runtime,
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn open(url: &str) -> Result<Self, PersistenceError> {
        ensure_parent_dir(url)?;
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let pool = runtime.block_on(init_db(url))?;
        info!(url, "opened sqlite record store");
        Ok(Self { runtime, pool })
    }

    pub fn records(&self) -> Result<Vec<GameRecord>, PersistenceError> {
        self.runtime.block_on(list_records(&self.pool))
    }
}

impl RecordSink for SqliteRecordStore {
    fn append(&self, record: &GameRecord) -> Result<(), PersistenceError> {
        let id = self.runtime.block_on(insert_record(&self.pool, record))?;
        debug!(id, player = %record.player, "record inserted");
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore {
    fn count(&self) -> Result<usize, PersistenceError> {
        self.runtime.block_on(count_records(&self.pool))
    }

    fn export(&self) -> Result<Vec<u8>, PersistenceError> {
        Ok(render_csv(&self.records()?))
    }
}
