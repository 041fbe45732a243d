use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use tracing::debug;

use super::{parse_attendance, RsvpStore, StoreError, SummaryRow};
use crate::models::{NewRsvp, ReportSummary, RsvpRecord};
use crate::schema::sqlite::rsvps;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS rsvps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        attendance TEXT NOT NULL CHECK (attendance IN ('sim', 'nao')),
        guests INTEGER NOT NULL DEFAULT 0,
        note TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )";

const SUMMARY: &str = "
    SELECT
        COALESCE(SUM(CASE WHEN attendance = 'sim' THEN 1 ELSE 0 END), 0) AS total_sim,
        COALESCE(SUM(CASE WHEN attendance = 'nao' THEN 1 ELSE 0 END), 0) AS total_nao,
        COALESCE(SUM(CASE WHEN attendance = 'sim' THEN guests ELSE 0 END), 0) AS total_acompanhantes
    FROM rsvps";

/// Embedded store: a single connection to a local SQLite file.
///
/// Every operation holds the connection lock, so identifier assignment and
/// `last_insert_rowid()` are serialized per process.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<SqliteConnection>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = rsvps)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct SqliteRow {
    id: i64,
    name: String,
    attendance: String,
    guests: i32,
    note: Option<String>,
    created_at: NaiveDateTime,
}

impl SqliteRow {
    fn into_record(self) -> Result<RsvpRecord, StoreError> {
        Ok(RsvpRecord {
            attendance: parse_attendance(self.id, self.attendance)?,
            id: self.id,
            name: self.name,
            guests: self.guests,
            note: self.note,
            created_at: self.created_at.and_utc(),
        })
    }
}

#[derive(QueryableByName)]
struct InsertedId {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`. `:memory:` gives
    /// a private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> Result<SqliteStore, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = SqliteConnection::establish(&path.to_string_lossy())?;
        Ok(SqliteStore {
            path,
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteConnection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RsvpStore for SqliteStore {
    fn initialize(&self) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        diesel::sql_query(CREATE_TABLE).execute(&mut *conn)?;
        Ok(())
    }

    fn insert(&self, rsvp: &NewRsvp) -> Result<i64, StoreError> {
        let mut conn = self.lock()?;
        let inserted = conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(rsvps::table)
                .values((
                    rsvps::name.eq(&rsvp.name),
                    rsvps::attendance.eq(rsvp.attendance.as_str()),
                    rsvps::guests.eq(rsvp.guests),
                    rsvps::note.eq(rsvp.note.as_deref()),
                ))
                .execute(conn)?;
            diesel::sql_query("SELECT last_insert_rowid() AS id").get_result::<InsertedId>(conn)
        })?;
        debug!(id = inserted.id, "inserted rsvp");
        Ok(inserted.id)
    }

    fn query_all(&self) -> Result<Vec<RsvpRecord>, StoreError> {
        let mut conn = self.lock()?;
        rsvps::table
            .order(rsvps::id.desc())
            .select(SqliteRow::as_select())
            .load(&mut *conn)?
            .into_iter()
            .map(SqliteRow::into_record)
            .collect()
    }

    fn compute_summary(&self) -> Result<ReportSummary, StoreError> {
        let mut conn = self.lock()?;
        let row = diesel::sql_query(SUMMARY).get_result::<SummaryRow>(&mut *conn)?;
        Ok(row.into())
    }

    fn describe(&self) -> String {
        format!("SQLite local ({})", self.path.display())
    }
}
