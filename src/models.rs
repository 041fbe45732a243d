use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a guest is coming. Stored and transmitted as the tokens `sim` / `nao`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Attendance {
    #[serde(rename = "sim")]
    Yes,
    #[serde(rename = "nao")]
    No,
}

impl Attendance {
    pub fn as_str(self) -> &'static str {
        match self {
            Attendance::Yes => "sim",
            Attendance::No => "nao",
        }
    }
}

impl fmt::Display for Attendance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownAttendance(pub String);

impl FromStr for Attendance {
    type Err = UnknownAttendance;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "sim" => Ok(Attendance::Yes),
            "nao" => Ok(Attendance::No),
            other => Err(UnknownAttendance(other.to_owned())),
        }
    }
}

/// A validated submission, ready to be appended to the store.
#[derive(Clone, Debug, PartialEq)]
pub struct NewRsvp {
    pub name: String,
    pub attendance: Attendance,
    pub guests: i32,
    pub note: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RsvpRecord {
    pub id: i64,
    pub name: String,
    pub attendance: Attendance,
    pub guests: i32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_respostas: i64,
    pub total_sim: i64,
    pub total_nao: i64,
    pub total_acompanhantes: i64,
    pub total_pessoas: i64,
}

impl ReportSummary {
    pub fn from_counts(total_sim: i64, total_nao: i64, total_acompanhantes: i64) -> Self {
        ReportSummary {
            total_respostas: total_sim + total_nao,
            total_sim,
            total_nao,
            total_acompanhantes,
            total_pessoas: total_sim + total_acompanhantes,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub responses: Vec<RsvpRecord>,
}
