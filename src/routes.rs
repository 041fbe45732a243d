use std::sync::Arc;

use cookie::Cookie;
use gotham::handler::HandlerResult;
use gotham::helpers::http::response::{create_empty_response, create_response};
use gotham::middleware::state::StateMiddleware;
use gotham::pipeline::{single_middleware, single_pipeline};
use gotham::router::builder::*;
use gotham::router::Router;
use gotham::state::{FromState, State};
use gotham_derive::{StateData, StaticResponseExtender};
use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, SET_COOKIE};
use hyper::{Body, Response, StatusCode};
use serde::Serialize;
use serde_derive::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::Error;
use crate::report_auth::ReportGuard;
use crate::rsvp::RsvpService;
use crate::settings::Settings;
use crate::store::RsvpStore;
use crate::templates;

/// Everything a handler needs, built once at startup.
#[derive(Clone, StateData)]
pub struct AppState {
    service: RsvpService,
    guard: ReportGuard,
    event_name: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn RsvpStore>, settings: &Settings) -> AppState {
        AppState {
            service: RsvpService::new(store),
            guard: ReportGuard::new(&settings.report_password),
            event_name: Arc::from(settings.event_name.as_str()),
        }
    }
}

pub fn router(app_state: AppState) -> Router {
    let (chain, pipelines) = single_pipeline(single_middleware(StateMiddleware::new(app_state)));
    build_router(chain, pipelines, |route| {
        route.post("/api/rsvp").to_async(submit_rsvp);
        route.post("/api/report-login").to_async(report_login);
        route.post("/api/report-logout").to(report_logout);
        route.get("/api/report").to_async(report_data);
        route.get("/relatorio").to(report_page);
        route
            .get("/static/:name")
            .with_path_extractor::<StaticPath>()
            .to(serve_static);
    })
}

#[derive(Deserialize, StateData, StaticResponseExtender)]
struct StaticPath {
    name: String,
}

async fn submit_rsvp(mut state: State) -> HandlerResult {
    let response = match submit_rsvp_inner(&mut state).await {
        Ok(id) => json_response(
            &state,
            StatusCode::CREATED,
            &json!({ "message": "Confirmação registrada com sucesso.", "id": id }),
        ),
        Err(err) => err.as_response(&state),
    };
    Ok((state, response))
}

async fn submit_rsvp_inner(state: &mut State) -> Result<i64, Error> {
    let payload = read_payload(state).await?;
    let service = AppState::borrow_from(state).service.clone();
    let id = service.submit(&payload).await?;
    debug!(id, "rsvp recorded");
    Ok(id)
}

async fn report_login(mut state: State) -> HandlerResult {
    let response = match report_login_inner(&mut state).await {
        Ok(cookie) => with_cookie(
            &state,
            json_response(
                &state,
                StatusCode::OK,
                &json!({ "message": "Autenticado com sucesso." }),
            ),
            &cookie,
        ),
        Err(err) => err.as_response(&state),
    };
    Ok((state, response))
}

async fn report_login_inner(state: &mut State) -> Result<Cookie<'static>, Error> {
    let payload = read_payload(state).await?;
    let guard = &AppState::borrow_from(state).guard;
    payload
        .get("password")
        .and_then(Value::as_str)
        .ok_or(Error::WrongPassword)
        .and_then(|password| guard.authenticate(password))
        .map_err(|err| {
            warn!("report login rejected");
            err
        })
}

fn report_logout(state: State) -> (State, Response<Body>) {
    let cookie = AppState::borrow_from(&state).guard.logout();
    let response = json_response(
        &state,
        StatusCode::OK,
        &json!({ "message": "Sessão encerrada." }),
    );
    let response = with_cookie(&state, response, &cookie);
    (state, response)
}

async fn report_data(state: State) -> HandlerResult {
    let app_state = AppState::borrow_from(&state).clone();
    let response = if !app_state.guard.check(HeaderMap::borrow_from(&state)) {
        Error::Unauthorized.as_response(&state)
    } else {
        match app_state.service.report().await {
            Ok(report) => json_response(&state, StatusCode::OK, &report),
            Err(err) => err.as_response(&state),
        }
    };
    Ok((state, response))
}

fn report_page(state: State) -> (State, Response<Body>) {
    let response = match render_report_page(&state) {
        Ok(body) => create_response(&state, StatusCode::OK, mime::TEXT_HTML_UTF_8, body),
        Err(err) => err.as_response(&state),
    };
    (state, response)
}

fn render_report_page(state: &State) -> Result<Vec<u8>, Error> {
    let app_state = AppState::borrow_from(state);
    let mut buf = Vec::new();
    if app_state.guard.check(HeaderMap::borrow_from(state)) {
        templates::report_html(&mut buf, &app_state.event_name).map_err(Error::Render)?;
    } else {
        templates::report_login_html(&mut buf, &app_state.event_name).map_err(Error::Render)?;
    }
    Ok(buf)
}

/// Serves the stylesheet and scripts compiled in from `static/`. Names carry
/// a content hash, so they never change and may be cached for good.
fn serve_static(state: State) -> (State, Response<Body>) {
    let name = &StaticPath::borrow_from(&state).name;
    let response = match templates::statics::StaticFile::get(name) {
        Some(file) => {
            let mut response =
                create_response(&state, StatusCode::OK, file.mime.clone(), file.content);
            response.headers_mut().insert(
                CACHE_CONTROL,
                HeaderValue::from_static("public, max-age=31536000, immutable"),
            );
            response
        }
        None => create_empty_response(&state, StatusCode::NOT_FOUND),
    };
    (state, response)
}

/// Reads the request body as a JSON object or, for HTML form posts, as
/// url-encoded text fields. An empty body is an empty payload.
async fn read_payload(state: &mut State) -> Result<Map<String, Value>, Error> {
    let body = hyper::body::to_bytes(Body::take_from(state))
        .await
        .map_err(|err| Error::MalformedBody(Box::new(err)))?;
    if is_form(HeaderMap::borrow_from(state)) {
        let fields = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&body)
            .map_err(|err| Error::MalformedBody(Box::new(err)))?;
        return Ok(fields
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect());
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    let payload = serde_json::from_slice::<Value>(&body)
        .map_err(|err| Error::MalformedBody(Box::new(err)))?;
    match payload {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .map(|mime| mime.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str())
        .unwrap_or(false)
}

fn json_response<T: Serialize>(state: &State, status: StatusCode, body: &T) -> Response<Body> {
    match serde_json::to_vec(body) {
        Ok(body) => create_response(state, status, mime::APPLICATION_JSON, body),
        Err(err) => Error::from(err).as_response(state),
    }
}

fn with_cookie(
    state: &State,
    mut response: Response<Body>,
    cookie: &Cookie<'_>,
) -> Response<Body> {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().insert(SET_COOKIE, value);
            response
        }
        Err(err) => Error::from(err).as_response(state),
    }
}
