use std::sync::Arc;

use cookie::time::Duration;
use cookie::{Cookie, SameSite};
use hyper::header::{HeaderMap, COOKIE};
use subtle::ConstantTimeEq;

use crate::error::Error;

pub const COOKIE_NAME: &str = "report_auth";
const SESSION_MARKER: &str = "ok";
const SESSION_LIFETIME: Duration = Duration::hours(8);

/// Shared-password gate in front of the report. A login hands out the fixed
/// cookie `report_auth=ok`, so access lasts until that cookie expires.
#[derive(Clone)]
pub struct ReportGuard {
    password: Arc<str>,
}

impl ReportGuard {
    pub fn new(password: &str) -> ReportGuard {
        ReportGuard {
            password: Arc::from(password),
        }
    }

    pub fn authenticate(&self, candidate: &str) -> Result<Cookie<'static>, Error> {
        let matches = !candidate.is_empty()
            && bool::from(candidate.as_bytes().ct_eq(self.password.as_bytes()));
        if matches {
            Ok(session_cookie(SESSION_MARKER, SESSION_LIFETIME))
        } else {
            Err(Error::WrongPassword)
        }
    }

    /// A cookie that makes the browser drop the session. Always succeeds.
    pub fn logout(&self) -> Cookie<'static> {
        session_cookie("", Duration::ZERO)
    }

    pub fn check(&self, headers: &HeaderMap) -> bool {
        session_value(headers).as_deref() == Some(SESSION_MARKER)
    }
}

fn session_cookie(value: &'static str, max_age: Duration) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

/// Value of the first `report_auth` pair across all `Cookie` headers.
fn session_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
}
