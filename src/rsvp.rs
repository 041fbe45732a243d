use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::Error;
use crate::models::{Attendance, NewRsvp, Report};
use crate::store::{self, RsvpStore};

impl NewRsvp {
    /// Validates a raw submission. `name` and `attendance` are checked in that
    /// order and the first failure is returned; `guests` and `note` are
    /// normalized and never rejected.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<NewRsvp, Error> {
        let name = match payload.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_owned(),
            _ => return Err(Error::MissingName),
        };

        let attendance = payload
            .get("attendance")
            .and_then(Value::as_str)
            .and_then(|token| token.parse::<Attendance>().ok())
            .ok_or(Error::InvalidAttendance)?;

        Ok(NewRsvp {
            name,
            attendance,
            guests: payload.get("guests").map(coerce_guests).unwrap_or(0),
            note: payload.get("note").and_then(coerce_note),
        })
    }
}

/// Best-effort guest count: anything unusable becomes 0.
fn coerce_guests(value: &Value) -> i32 {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(text) => leading_integer(text),
        _ => None,
    };
    parsed
        .filter(|guests| *guests >= 0)
        .and_then(|guests| i32::try_from(guests).ok())
        .unwrap_or(0)
}

/// Parses an optional sign and the digits that follow it, after leading
/// whitespace, ignoring whatever trails them (`"4 pessoas"` is 4).
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

fn coerce_note(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null | Value::Bool(false) => return None,
        Value::String(text) => text.trim().to_owned(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Validates submissions and assembles reports on top of whichever store was
/// configured at startup.
#[derive(Clone)]
pub struct RsvpService {
    store: Arc<dyn RsvpStore>,
}

impl RsvpService {
    pub fn new(store: Arc<dyn RsvpStore>) -> RsvpService {
        RsvpService { store }
    }

    pub async fn submit(&self, payload: &Map<String, Value>) -> Result<i64, Error> {
        let rsvp = NewRsvp::from_payload(payload)?;
        let store = self.store.clone();
        store::blocking(move || store.insert(&rsvp))
            .await
            .map_err(Error::SaveFailed)
    }

    /// Summary first, then the listing. The two reads are not in one
    /// transaction; a row committed in between may show up only in the list.
    pub async fn report(&self) -> Result<Report, Error> {
        let store = self.store.clone();
        let summary = store::blocking(move || store.compute_summary())
            .await
            .map_err(Error::ReportFailed)?;
        let store = self.store.clone();
        let responses = store::blocking(move || store.query_all())
            .await
            .map_err(Error::ReportFailed)?;
        Ok(Report { summary, responses })
    }
}
