use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use survey_db::constraint_message;
use survey_db::models::UserRow;
use survey_types::api::{PasswordChangeForm, ProfileForm};
use tracing::{info, warn};

use super::general::MsgQuery;
use crate::error::{AppError, AppResult};
use crate::middleware::{CsrfToken, CurrentUser};
use crate::security::{hash_password, verify_password};
use crate::state::{AppState, with_db};
use crate::views::{layout::PageContext, profile, render};

async fn render_profile(
    state: &AppState,
    user: &UserRow,
    csrf: &str,
    msg: Option<&str>,
    error: Option<&str>,
) -> AppResult<Response> {
    let user_id = user.user_id;
    let (countries, created, created_count, taken) = with_db(state, move |db| {
        Ok((
            db.list_countries()?,
            db.list_surveys_by_author(user_id)?,
            db.count_surveys_by_author(user_id)?,
            db.list_taken_surveys(user_id)?,
        ))
    })
    .await?;

    let page = profile::profile_page(
        PageContext::new(Some(user), csrf),
        profile::ProfileView {
            user,
            countries: &countries,
            created: &created,
            created_count,
            taken: &taken,
            msg,
            error,
        },
    );
    let status = if error.is_some() { StatusCode::BAD_REQUEST } else { StatusCode::OK };
    Ok((status, render(page)).into_response())
}

pub async fn profile_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
    Query(query): Query<MsgQuery>,
) -> AppResult<Response> {
    render_profile(&state, &user, &csrf, query.msg.as_deref(), None).await
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    let update = match form.normalized() {
        Ok(update) => update,
        Err(error) => return render_profile(&state, &user, &csrf, None, Some(&error)).await,
    };

    let user_id = user.user_id;
    match with_db(&state, move |db| db.update_profile(user_id, &update)).await {
        Ok(()) => {
            info!("User {} updated profile", user_id);
            Ok(Redirect::to("/users/me?msg=profile_updated").into_response())
        }
        Err(AppError::Internal(e)) if constraint_message(&e).is_some() => {
            warn!("Profile update rejected for user {}: {:#}", user_id, e);
            render_profile(&state, &user, &csrf, None, Some("Некорректная дата рождения")).await
        }
        Err(e) => Err(e),
    }
}

pub async fn password_page(CurrentUser(user): CurrentUser, CsrfToken(csrf): CsrfToken) -> Response {
    render(profile::password_page(PageContext::new(Some(&user), &csrf), None)).into_response()
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
    Form(form): Form<PasswordChangeForm>,
) -> AppResult<Response> {
    let rerender = |error: &str| {
        (
            StatusCode::BAD_REQUEST,
            render(profile::password_page(PageContext::new(Some(&user), &csrf), Some(error))),
        )
            .into_response()
    };

    if !verify_password(&form.old_password, &user.password_hash) {
        return Ok(rerender("Старый пароль введен неверно"));
    }
    if let Err(error) = form.validate() {
        return Ok(rerender(&error));
    }

    let password_hash = hash_password(&form.new_password)?;
    let user_id = user.user_id;
    with_db(&state, move |db| db.update_password(user_id, &password_hash)).await?;
    info!("User {} changed password", user_id);

    Ok(Redirect::to("/users/me?msg=password_updated").into_response())
}
