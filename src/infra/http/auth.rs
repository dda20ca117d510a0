//! Session cookie resolution and the sign-in guard.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Form,
    body::Body,
    extract::{FromRequestParts, Query, State},
    http::{Request, StatusCode, Uri, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::{Url, form_urlencoded};

use crate::application::error::ErrorReport;
use crate::application::sessions::{CurrentUser, SessionAuthError};
use crate::config::SessionSettings;
use crate::presentation::views::{
    LayoutChrome, LayoutContext, LoginContext, LoginTemplate, render_template_response,
};

use super::public::HttpState;

const LOGIN_PATH: &str = "/auth/login/";
const NEXT_BASE: &str = "http://inkwell.invalid/";
const INVALID_TOKEN_MESSAGE: &str = "The session token is invalid or has expired.";

/// Name and lifetime of the cookie carrying the session token.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    pub name: String,
    pub max_age: time::Duration,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            name: name.into(),
            max_age: time::Duration::seconds(seconds),
        }
    }

    fn issue(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.name.clone(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(self.max_age)
            .build()
    }

    fn removal(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), String::new()))
            .path("/")
            .build()
    }
}

impl From<&SessionSettings> for SessionCookie {
    fn from(settings: &SessionSettings) -> Self {
        Self::new(settings.cookie_name.clone(), settings.ttl)
    }
}

/// Attach the signed-in user, when the session cookie resolves to one.
///
/// Requests with a missing, unknown, expired or revoked token continue anonymously.
pub async fn resolve_viewer(
    State(state): State<HttpState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let viewer = match jar.get(&state.session_cookie.name) {
        Some(cookie) => match state.sessions.authenticate(cookie.value()).await {
            Ok(user) => Some(user),
            Err(SessionAuthError::Unavailable) => {
                warn!(
                    target = "inkwell::http::auth",
                    "session lookup failed; continuing anonymously"
                );
                None
            }
            Err(err) => {
                debug!(target = "inkwell::http::auth", reason = %err, "ignoring session cookie");
                None
            }
        },
        None => None,
    };

    if let Some(user) = viewer.clone() {
        request.extensions_mut().insert(user);
    }

    let mut response = next.run(request).await;
    if let Some(user) = viewer {
        response.extensions_mut().insert(user);
    }
    response
}

/// Guard for routes that need a signed-in user.
pub async fn require_login(
    request: Request<Body>,
    next: Next,
) -> Result<Response, Unauthenticated> {
    if request.extensions().get::<CurrentUser>().is_none() {
        return Err(Unauthenticated::from_uri(request.uri()));
    }

    Ok(next.run(request).await)
}

/// Rejection for anonymous access to a sign-in-only route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unauthenticated {
    pub next: String,
}

impl Unauthenticated {
    pub fn from_uri(uri: &Uri) -> Self {
        let next = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());
        Self { next }
    }
}

impl IntoResponse for Unauthenticated {
    fn into_response(self) -> Response {
        Redirect::to(&login_redirect_target(&self.next)).into_response()
    }
}

/// `/auth/login/?next=<target>` with the target form-encoded but slashes kept readable.
pub fn login_redirect_target(next: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(next.as_bytes()).collect();
    format!("{LOGIN_PATH}?next={}", encoded.replace("%2F", "/"))
}

/// The viewer resolved by [`resolve_viewer`], if any.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Viewer(parts.extensions.get::<CurrentUser>().cloned()))
    }
}

/// Only same-site absolute paths are accepted as post-login destinations.
///
/// Browsers drop tabs and newlines while parsing a `Location`, so any control
/// character or whitespace rejects the target outright.
fn safe_next(raw: Option<&str>) -> String {
    const FALLBACK: &str = "/";

    let Some(path) = raw.map(str::trim) else {
        return FALLBACK.to_string();
    };
    if !path.starts_with('/')
        || path.contains('\\')
        || path.chars().any(|c| c.is_control() || c.is_whitespace())
    {
        return FALLBACK.to_string();
    }

    let Ok(base) = Url::parse(NEXT_BASE) else {
        return FALLBACK.to_string();
    };
    match base.join(path) {
        Ok(target) if target.origin() == base.origin() && !target.path().starts_with(LOGIN_PATH) => {
            path.to_string()
        }
        _ => FALLBACK.to_string(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginForm {
    token: String,
    next: Option<String>,
}

pub(super) async fn login_form(Viewer(viewer): Viewer, Query(query): Query<LoginQuery>) -> Response {
    let next = safe_next(query.next.as_deref());
    render_login(viewer.as_ref(), next, None, StatusCode::OK)
}

pub(super) async fn login_submit(
    State(state): State<HttpState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let next = safe_next(form.next.as_deref());
    let token = form.token.trim();

    match state.sessions.authenticate(token).await {
        Ok(user) => {
            info!(
                target = "inkwell::http::auth",
                username = %user.username,
                "signed in"
            );
            let jar = jar.add(state.session_cookie.issue(token.to_string()));
            (jar, Redirect::to(&next)).into_response()
        }
        Err(SessionAuthError::Unavailable) => {
            let mut response = render_login(
                None,
                next,
                Some("Sign-in is temporarily unavailable.".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            );
            ErrorReport::from_error(
                "infra::http::auth::login_submit",
                StatusCode::SERVICE_UNAVAILABLE,
                &SessionAuthError::Unavailable,
            )
            .attach(&mut response);
            response
        }
        Err(_) => render_login(
            None,
            next,
            Some(INVALID_TOKEN_MESSAGE.to_string()),
            StatusCode::OK,
        ),
    }
}

pub(super) async fn logout(State(state): State<HttpState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(&state.session_cookie.name) {
        if let Err(err) = state.sessions.revoke(cookie.value()).await {
            warn!(
                target = "inkwell::http::auth",
                error = %err,
                "failed to revoke session on sign-out"
            );
        }
    }

    let jar = jar.remove(state.session_cookie.removal());
    (jar, Redirect::to("/")).into_response()
}

fn render_login(
    viewer: Option<&CurrentUser>,
    next: String,
    error: Option<String>,
    status: StatusCode,
) -> Response {
    let chrome = LayoutChrome::new(viewer).with_title("Sign in");
    let view = LayoutContext::new(chrome, LoginContext { next, error });
    render_template_response(LoginTemplate { view }, status)
}
