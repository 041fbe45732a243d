use std::panic::RefUnwindSafe;
use std::sync::Arc;

use diesel::sql_types::BigInt;
use diesel::QueryableByName;
use thiserror::Error;

use crate::models::{Attendance, NewRsvp, ReportSummary, RsvpRecord};
use crate::settings::Settings;

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),
    #[error("connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database error: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("stored row {id} has unknown attendance {value:?}")]
    CorruptRow { id: i64, value: String },
    #[error("database connection lock poisoned")]
    Poisoned,
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Persistence for RSVP records, either an embedded SQLite file or a
/// PostgreSQL pool.
pub trait RsvpStore: Send + Sync + RefUnwindSafe {
    /// Creates the `rsvps` table if it does not exist yet.
    fn initialize(&self) -> Result<(), StoreError>;

    /// Appends one record and returns the identifier the database assigned to it.
    fn insert(&self, rsvp: &NewRsvp) -> Result<i64, StoreError>;

    /// All records, most recent (highest id) first.
    fn query_all(&self) -> Result<Vec<RsvpRecord>, StoreError>;

    fn compute_summary(&self) -> Result<ReportSummary, StoreError>;

    fn describe(&self) -> String;
}

/// Connects to the backend selected by `settings`. Does not create the schema.
pub fn open(settings: &Settings) -> Result<Arc<dyn RsvpStore>, StoreError> {
    match &settings.database_url {
        Some(url) => Ok(Arc::new(PostgresStore::connect(url, settings.postgres_tls())?)),
        None => Ok(Arc::new(SqliteStore::open(&settings.db_path)?)),
    }
}

/// Runs a blocking store call off the request executor.
pub async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

#[derive(QueryableByName)]
struct SummaryRow {
    #[diesel(sql_type = BigInt)]
    total_sim: i64,
    #[diesel(sql_type = BigInt)]
    total_nao: i64,
    #[diesel(sql_type = BigInt)]
    total_acompanhantes: i64,
}

impl From<SummaryRow> for ReportSummary {
    fn from(row: SummaryRow) -> Self {
        ReportSummary::from_counts(row.total_sim, row.total_nao, row.total_acompanhantes)
    }
}

fn parse_attendance(id: i64, value: String) -> Result<Attendance, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::CorruptRow { id, value })
}

/// Behaviour every backend must share. Each check is relative to the rows
/// already present so the same suite runs against a shared database.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;

    fn rsvp(name: &str, attendance: Attendance, guests: i32, note: Option<&str>) -> NewRsvp {
        NewRsvp {
            name: name.to_owned(),
            attendance,
            guests,
            note: note.map(str::to_owned),
        }
    }

    pub fn run(store: &dyn RsvpStore) {
        store.initialize().unwrap();
        // Initialization is idempotent.
        store.initialize().unwrap();

        let before = store.compute_summary().unwrap();

        let first = store
            .insert(&rsvp("Ana", Attendance::Yes, 2, Some("levo sobremesa")))
            .unwrap();
        let second = store.insert(&rsvp("Bruno", Attendance::No, 3, None)).unwrap();
        let third = store.insert(&rsvp("Carla", Attendance::Yes, 0, None)).unwrap();
        assert!(first < second && second < third);

        let records = store.query_all().unwrap();
        let ids: Vec<i64> = records.iter().map(|record| record.id).collect();
        assert_eq!(&ids[..3], &[third, second, first]);
        let mut sorted = ids.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);

        let ana = &records[2];
        assert_eq!(ana.name, "Ana");
        assert_eq!(ana.attendance, Attendance::Yes);
        assert_eq!(ana.guests, 2);
        assert_eq!(ana.note.as_deref(), Some("levo sobremesa"));

        let bruno = &records[1];
        assert_eq!(bruno.attendance, Attendance::No);
        assert_eq!(bruno.guests, 3);
        assert_eq!(bruno.note, None);
        assert!(bruno.created_at >= ana.created_at);

        let after = store.compute_summary().unwrap();
        assert_eq!(after.total_respostas, before.total_respostas + 3);
        assert_eq!(after.total_sim, before.total_sim + 2);
        assert_eq!(after.total_nao, before.total_nao + 1);
        // Guests of a "nao" answer are kept but never counted.
        assert_eq!(after.total_acompanhantes, before.total_acompanhantes + 2);
        assert_eq!(after.total_pessoas, before.total_pessoas + 4);
        assert_eq!(after.total_respostas, after.total_sim + after.total_nao);
        assert_eq!(after.total_respostas as usize, records.len());

        let guest_sum: i64 = records
            .iter()
            .filter(|record| record.attendance == Attendance::Yes)
            .map(|record| i64::from(record.guests))
            .sum();
        assert_eq!(after.total_acompanhantes, guest_sum);
    }

    pub fn run_empty(store: &dyn RsvpStore) {
        store.initialize().unwrap();
        assert!(store.query_all().unwrap().is_empty());
        assert_eq!(store.compute_summary().unwrap(), ReportSummary::default());
    }
}
