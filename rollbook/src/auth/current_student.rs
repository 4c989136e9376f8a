use crate::{
    AppState,
    auth::session,
    config::Config,
    errors::{Error, Result},
    types::StudentId,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use tracing::{instrument, trace};

/// The student a request's session cookie belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentStudent {
    pub id: StudentId,
    pub email: String,
    pub name: String,
}

/// Extract the student from the JWT session cookie if present and valid.
///
/// Invalid or expired tokens are treated like a missing cookie.
#[instrument(skip(parts, config))]
fn try_jwt_session_auth(parts: &Parts, config: &Config) -> Option<CurrentStudent> {
    let cookie_str = parts.headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    let cookie_name = &config.session.cookie_name;

    for cookie in cookie_str.split(';') {
        if let Some((name, value)) = cookie.trim().split_once('=')
            && name == cookie_name
        {
            match session::verify_session_token(value, config) {
                Ok(student) => return Some(student),
                Err(e) => trace!("Ignoring invalid session cookie: {e}"),
            }
        }
    }
    None
}

impl FromRequestParts<AppState> for CurrentStudent {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        try_jwt_session_auth(parts, &state.config).ok_or(Error::Unauthenticated { message: None })
    }
}
