use axum::{
    Form,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use survey_types::api::{LoginForm, RegisterForm};
use tracing::{info, warn};

use crate::error::AppResult;
use crate::middleware::{CsrfToken, MaybeUser, access_cookie, clear_session, refresh_cookie};
use crate::security::{hash_password, issue_access_token, issue_refresh_token, verify_password};
use crate::state::{AppState, with_db};
use crate::views::{auth, layout::PageContext, render};

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Log the user in by setting both token cookies, then go home.
fn start_session(state: &AppState, jar: CookieJar, email: &str) -> AppResult<Response> {
    let access = issue_access_token(&state.settings, email)?;
    let refresh = issue_refresh_token(&state.settings, email)?;
    let jar = jar
        .add(access_cookie(&state.settings, access))
        .add(refresh_cookie(&state.settings, refresh));
    Ok((jar, found("/")).into_response())
}

/// 302 Found, as browsers expect after a login form.
fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

pub async fn register_page(MaybeUser(user): MaybeUser, CsrfToken(csrf): CsrfToken) -> Response {
    if user.is_some() {
        return found("/");
    }
    render(auth::register_page(PageContext::new(None, &csrf), "", "", None)).into_response()
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    CsrfToken(csrf): CsrfToken,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let email = normalize_email(&form.email);
    let full_name = form.full_name.trim().to_string();
    let rerender = |status: StatusCode, error: &str| {
        (
            status,
            render(auth::register_page(PageContext::new(None, &csrf), &email, &full_name, Some(error))),
        )
            .into_response()
    };

    if let Err(error) = form.validate() {
        return Ok(rerender(StatusCode::BAD_REQUEST, &error));
    }

    let lookup = email.clone();
    if with_db(&state, move |db| db.get_user_by_email(&lookup)).await?.is_some() {
        return Ok(rerender(StatusCode::BAD_REQUEST, "Email уже зарегистрирован"));
    }

    let password_hash = hash_password(&form.password)?;
    let (new_email, new_name) = (email.clone(), full_name.clone());
    let user_id = with_db(&state, move |db| db.create_user(&new_email, &new_name, &password_hash)).await?;
    info!("Registered user {} ({})", user_id, email);

    start_session(&state, jar, &email)
}

pub async fn login_page(MaybeUser(user): MaybeUser, CsrfToken(csrf): CsrfToken) -> Response {
    if user.is_some() {
        return found("/");
    }
    render(auth::login_page(PageContext::new(None, &csrf), "", None)).into_response()
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    CsrfToken(csrf): CsrfToken,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let email = normalize_email(&form.email);
    let lookup = email.clone();
    let user = with_db(&state, move |db| db.get_user_by_email(&lookup)).await?;

    match user {
        Some(user) if verify_password(&form.password, &user.password_hash) => {
            info!("User {} logged in", user.user_id);
            start_session(&state, jar, &user.email)
        }
        _ => {
            warn!("Failed login for {}", email);
            Ok((
                StatusCode::UNAUTHORIZED,
                render(auth::login_page(
                    PageContext::new(None, &csrf),
                    &email,
                    Some("Неверный email или пароль"),
                )),
            )
                .into_response())
        }
    }
}

pub async fn logout(jar: CookieJar) -> Response {
    (clear_session(jar), found("/login")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_compared_case_insensitively() {
        assert_eq!(normalize_email("  Ann@Example.COM "), "ann@example.com");
    }
}
