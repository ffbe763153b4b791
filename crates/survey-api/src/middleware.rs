use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, Form, FromRequest, FromRequestParts, Request, State},
    http::{HeaderValue, Method, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use survey_db::models::{ResponseMeta, UserRow};
use survey_types::api::TokenKind;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{AppError, AppResult, ErrorPage};
use crate::security::{
    ACCESS_COOKIE, CSRF_COOKIE, CSRF_FORM_FIELD, CSRF_HEADER, REFRESH_COOKIE, decode_token,
    generate_csrf_token, issue_access_token,
};
use crate::state::{AppState, with_db};
use crate::views::{self, layout::PageContext};

const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// The authenticated user, inserted by [`require_user`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// The user if the request carries a valid access token, for public pages.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<UserRow>);

/// CSRF token of the current browser session, for forms and the page layout.
#[derive(Debug, Clone, Default)]
pub struct CsrfToken(pub String);

/// Client address and a coarse device class, recorded on survey responses.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub device_type: String,
}

impl ClientMeta {
    pub fn response_meta(&self) -> ResponseMeta {
        ResponseMeta {
            ip_address: self.ip_address.clone(),
            device_type: Some(self.device_type.clone()),
        }
    }
}

// -- Cookies --

pub fn access_cookie(settings: &Settings, token: String) -> Cookie<'static> {
    Cookie::build((ACCESS_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.cookie_secure)
        .max_age(time::Duration::minutes(settings.access_token_minutes))
        .build()
}

pub fn refresh_cookie(settings: &Settings, token: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.cookie_secure)
        .max_age(time::Duration::days(settings.refresh_token_days))
        .build()
}

/// Readable by page scripts so HTMX can echo it back in a header.
fn csrf_cookie(settings: &Settings, token: String) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .path("/")
        .same_site(SameSite::Lax)
        .secure(settings.cookie_secure)
        .build()
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

fn cookie_header(jar: &CookieJar) -> Option<HeaderValue> {
    let joined = jar
        .iter()
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&joined).ok()
}

fn append_cookie(response: &mut Response, cookie: Cookie<'static>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Could not encode {} cookie: {}", cookie.name(), e),
    }
}

// -- Session refresh --

/// Mint a new access token from a valid refresh token when the access token
/// is missing, expired or unreadable. The new token is written into the
/// request's `Cookie` header for downstream extractors and set on the
/// response.
pub async fn refresh_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let secret = &state.settings.jwt_secret;

    let access_valid = jar.get(ACCESS_COOKIE).is_some_and(|c| {
        matches!(decode_token(secret, c.value()), Ok(claims) if claims.kind == TokenKind::Access)
    });
    if access_valid {
        return next.run(req).await;
    }

    let Some(refresh) = jar.get(REFRESH_COOKIE) else {
        return next.run(req).await;
    };
    let claims = match decode_token(secret, refresh.value()) {
        Ok(claims) if claims.kind == TokenKind::Refresh => claims,
        Ok(_) => {
            debug!("Refresh cookie holds a non-refresh token");
            return next.run(req).await;
        }
        Err(e) => {
            debug!("Refresh token rejected: {}", e);
            return next.run(req).await;
        }
    };

    let token = match issue_access_token(&state.settings, &claims.sub) {
        Ok(token) => token,
        Err(e) => {
            warn!("Failed to renew access token: {}", e);
            return next.run(req).await;
        }
    };
    debug!("Access token renewed for {}", claims.sub);

    let jar = jar.add(Cookie::new(ACCESS_COOKIE, token.clone()));
    if let Some(value) = cookie_header(&jar) {
        req.headers_mut().insert(header::COOKIE, value);
    }

    let mut response = next.run(req).await;

    // Handlers that log out or log in set their own access cookie
    let handler_set_access = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&format!("{}=", ACCESS_COOKIE)));
    if !handler_set_access {
        append_cookie(&mut response, access_cookie(&state.settings, token));
    }
    response
}

// -- CSRF --

fn is_unsafe(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Double-submit check: unsafe methods must echo the `csrf_token` cookie in
/// the `X-CSRF-Token` header or a `csrf_token` form field. Issues the cookie
/// when the browser has none.
pub async fn csrf_protect(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let existing = jar
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let mut req = req;
    if is_unsafe(req.method()) {
        let header_token = req
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let submitted = match header_token {
            Some(token) => Some(token),
            None => {
                let (rebuilt, field) = match form_field(req, CSRF_FORM_FIELD).await {
                    Ok(pair) => pair,
                    Err(response) => return response,
                };
                req = rebuilt;
                field
            }
        };

        let valid = matches!((&existing, &submitted), (Some(cookie), Some(sent)) if cookie == sent);
        if !valid {
            warn!("CSRF check failed for {} {}", req.method(), req.uri().path());
            return AppError::Forbidden("Ошибка проверки CSRF-токена. Обновите страницу.".into())
                .into_response();
        }
    }

    let token = existing.clone().unwrap_or_else(generate_csrf_token);
    req.extensions_mut().insert(CsrfToken(token.clone()));

    let mut response = next.run(req).await;
    if existing.is_none() {
        append_cookie(&mut response, csrf_cookie(&state.settings, token));
    }
    response
}

/// Read one field of a urlencoded body, handing back an equivalent request.
async fn form_field(req: Request, name: &str) -> Result<(Request, Option<String>), Response> {
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|e| {
        warn!("Could not buffer form body: {}", e);
        AppError::BadRequest("Слишком большой запрос".into()).into_response()
    })?;

    let form_request = axum::http::Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(bytes.clone()))
        .map_err(|e| AppError::Internal(e.into()).into_response())?;
    let value = match Form::<Vec<(String, String)>>::from_request(form_request, &()).await {
        Ok(Form(fields)) => fields.into_iter().find(|(k, _)| k == name).map(|(_, v)| v),
        Err(_) => None,
    };

    Ok((Request::from_parts(parts, Body::from(bytes)), value))
}

// -- Authentication --

async fn resolve_user(state: &AppState, jar: &CookieJar) -> AppResult<Option<UserRow>> {
    let Some(cookie) = jar.get(ACCESS_COOKIE) else {
        return Ok(None);
    };
    let email = match decode_token(&state.settings.jwt_secret, cookie.value()) {
        Ok(claims) if claims.kind == TokenKind::Access => claims.sub,
        Ok(_) => return Ok(None),
        Err(e) => {
            debug!("Access token rejected: {}", e);
            return Ok(None);
        }
    };
    with_db(state, move |db| db.get_user_by_email(&email)).await
}

pub async fn require_user(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    match resolve_user(&state, &jar).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(None) => {
            debug!("Unauthenticated request to {}", req.uri().path());
            AppError::Unauthorized.into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Must run inside [`require_user`].
pub async fn require_admin(req: Request, next: Next) -> Response {
    match req.extensions().get::<CurrentUser>() {
        Some(CurrentUser(user)) if user.is_admin() => next.run(req).await,
        Some(CurrentUser(user)) => {
            warn!("User {} denied access to {}", user.email, req.uri().path());
            AppError::Forbidden("Раздел доступен только администраторам.".into()).into_response()
        }
        None => AppError::Unauthorized.into_response(),
    }
}

// -- Error pages --

/// Handlers fail without knowing who is looking; error pages are rendered
/// again here with the visitor's nav and CSRF token. Runs inside
/// [`csrf_protect`] so the token and a renewed access cookie are in place.
pub async fn error_pages(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    let csrf = req.extensions().get::<CsrfToken>().cloned().unwrap_or_default();

    let mut response = next.run(req).await;
    let Some(error) = response.extensions_mut().remove::<ErrorPage>() else {
        return response;
    };

    let user = match resolve_user(&state, &jar).await {
        Ok(user) => user,
        Err(e) => {
            debug!("Error page rendered without user: {}", e);
            None
        }
    };
    let markup = views::error::page(
        PageContext::new(user.as_ref(), &csrf.0),
        error.status,
        error.title,
        &error.message,
    );

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(markup.into_string()))
}

// -- Extractors --

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>() {
            return Ok(Self(Some(user.clone())));
        }
        let jar = CookieJar::from_headers(&parts.headers);
        Ok(Self(resolve_user(state, &jar).await?))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CsrfToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<CsrfToken>().cloned().unwrap_or_default())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let ip_address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        Ok(Self {
            ip_address,
            device_type: device_type(user_agent).to_string(),
        })
    }
}

pub fn device_type(user_agent: &str) -> &'static str {
    if user_agent.trim().is_empty() {
        "Web"
    } else if ["Mobi", "Android", "iPhone", "iPad"].iter().any(|m| user_agent.contains(m)) {
        "Mobile"
    } else {
        "Desktop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_class_from_user_agent() {
        assert_eq!(device_type(""), "Web");
        assert_eq!(
            device_type("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148"),
            "Mobile"
        );
        assert_eq!(device_type("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"), "Desktop");
    }

    #[test]
    fn session_cookies_are_http_only() {
        let settings = Settings::for_secret("s", "unused.db");
        let cookie = access_cookie(&settings, "tok".into()).to_string();
        assert!(cookie.starts_with("access_token=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=900"));

        let csrf = csrf_cookie(&settings, "abc".into()).to_string();
        assert!(!csrf.contains("HttpOnly"));
    }

    #[test]
    fn unsafe_methods() {
        assert!(is_unsafe(&Method::POST));
        assert!(is_unsafe(&Method::DELETE));
        assert!(!is_unsafe(&Method::GET));
        assert!(!is_unsafe(&Method::HEAD));
    }
}
