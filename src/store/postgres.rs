use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use tracing::debug;

use super::{parse_attendance, RsvpStore, StoreError, SummaryRow};
use crate::models::{NewRsvp, ReportSummary, RsvpRecord};
use crate::schema::pg::rsvps;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS rsvps (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        attendance TEXT NOT NULL CHECK (attendance IN ('sim', 'nao')),
        guests INTEGER NOT NULL DEFAULT 0,
        note TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )";

const SUMMARY: &str = "
    SELECT
        COALESCE(SUM(CASE WHEN attendance = 'sim' THEN 1 ELSE 0 END), 0)::bigint AS total_sim,
        COALESCE(SUM(CASE WHEN attendance = 'nao' THEN 1 ELSE 0 END), 0)::bigint AS total_nao,
        COALESCE(SUM(CASE WHEN attendance = 'sim' THEN guests ELSE 0 END), 0)::bigint AS total_acompanhantes
    FROM rsvps";

type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Networked store backed by a pool of PostgreSQL connections. Identifiers
/// come from the `SERIAL` sequence, so any number of processes may insert.
pub struct PostgresStore {
    // r2d2 keeps boxed handler trait objects that are not RefUnwindSafe.
    pool: AssertUnwindSafe<PgPool>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = rsvps)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct PgRow {
    id: i32,
    name: String,
    attendance: String,
    guests: i32,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl PgRow {
    fn into_record(self) -> Result<RsvpRecord, StoreError> {
        let id = i64::from(self.id);
        Ok(RsvpRecord {
            attendance: parse_attendance(id, self.attendance)?,
            id,
            name: self.name,
            guests: self.guests,
            note: self.note,
            created_at: self.created_at,
        })
    }
}

impl PostgresStore {
    /// Builds the pool and checks that the database is reachable. With `tls`
    /// set, the connection asks for `sslmode=require` unless `url` already
    /// names an `sslmode`.
    pub fn connect(url: &str, tls: bool) -> Result<PostgresStore, StoreError> {
        let manager = ConnectionManager::<PgConnection>::new(with_sslmode(url, tls));
        let pool = Pool::builder().build(manager)?;
        Ok(PostgresStore {
            pool: AssertUnwindSafe(pool),
        })
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }
}

impl RsvpStore for PostgresStore {
    fn initialize(&self) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        diesel::sql_query(CREATE_TABLE).execute(&mut *conn)?;
        Ok(())
    }

    fn insert(&self, rsvp: &NewRsvp) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let id: i32 = diesel::insert_into(rsvps::table)
            .values((
                rsvps::name.eq(&rsvp.name),
                rsvps::attendance.eq(rsvp.attendance.as_str()),
                rsvps::guests.eq(rsvp.guests),
                rsvps::note.eq(rsvp.note.as_deref()),
            ))
            .returning(rsvps::id)
            .get_result(&mut *conn)?;
        debug!(id, "inserted rsvp");
        Ok(i64::from(id))
    }

    fn query_all(&self) -> Result<Vec<RsvpRecord>, StoreError> {
        let mut conn = self.conn()?;
        rsvps::table
            .order(rsvps::id.desc())
            .select(PgRow::as_select())
            .load(&mut *conn)?
            .into_iter()
            .map(PgRow::into_record)
            .collect()
    }

    fn compute_summary(&self) -> Result<ReportSummary, StoreError> {
        let mut conn = self.conn()?;
        let row = diesel::sql_query(SUMMARY).get_result::<SummaryRow>(&mut *conn)?;
        Ok(row.into())
    }

    fn describe(&self) -> String {
        "PostgreSQL (DATABASE_URL)".to_owned()
    }
}

/// Appends an `sslmode` to a libpq connection string, in either URI or
/// `key=value` form.
fn with_sslmode(url: &str, tls: bool) -> String {
    if url.contains("sslmode=") {
        return url.to_owned();
    }
    let mode = if tls { "require" } else { "disable" };
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{}{}sslmode={}", url, separator, mode)
    } else {
        format!("{} sslmode={}", url, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn sslmode_is_appended_to_uris() {
        assert_eq!(
            with_sslmode("postgres://u:p@db/rsvp", true),
            "postgres://u:p@db/rsvp?sslmode=require"
        );
        assert_eq!(
            with_sslmode("postgresql://db/rsvp?application_name=x", false),
            "postgresql://db/rsvp?application_name=x&sslmode=disable"
        );
    }

    #[test]
    fn sslmode_is_appended_to_keyword_strings() {
        assert_eq!(
            with_sslmode("host=db dbname=rsvp", true),
            "host=db dbname=rsvp sslmode=require"
        );
    }

    #[test]
    fn explicit_sslmode_wins() {
        let url = "postgres://db/rsvp?sslmode=verify-full";
        assert_eq!(with_sslmode(url, false), url);
    }

    /// Needs a reachable server; set `TEST_DATABASE_URL` to run it.
    #[test]
    fn contract_holds_against_postgres() {
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => return,
        };
        let store = PostgresStore::connect(&url, false).unwrap();
        contract::run(&store);
        assert_eq!(store.describe(), "PostgreSQL (DATABASE_URL)");
    }
}
