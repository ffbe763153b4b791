use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use survey_db::models::SurveyDetail;
use survey_types::events::{HxEvent, ToastLevel};
use survey_types::models::SurveyStatus;
use tracing::{debug, info, warn};

use super::hx_trigger;
use crate::error::{AppError, AppResult};
use crate::forms::parse_survey_form;
use crate::middleware::{ClientMeta, CsrfToken, CurrentUser, MaybeUser};
use crate::state::{AppState, with_db};
use crate::submission::{PreviousAnswers, clean_submission};
use crate::views::{layout::PageContext, profile, render, surveys};

fn not_found() -> AppError {
    AppError::NotFound("Опрос не найден".into())
}

/// Drafts are not shown to anyone outside the table console.
async fn load_visible(state: &AppState, survey_id: i64) -> AppResult<SurveyDetail> {
    with_db(state, move |db| db.load_survey_detail(survey_id))
        .await?
        .filter(|detail| detail.survey.status != SurveyStatus::Draft)
        .ok_or_else(not_found)
}

pub async fn create_page(CurrentUser(user): CurrentUser, CsrfToken(csrf): CsrfToken) -> Html<String> {
    render(surveys::create_page(PageContext::new(Some(&user), &csrf), None))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let form = match parse_survey_form(&fields) {
        Ok(form) => form,
        Err(error) => {
            debug!("Survey form rejected: {}", error);
            return Ok((
                StatusCode::BAD_REQUEST,
                render(surveys::create_page(PageContext::new(Some(&user), &csrf), Some(&error))),
            )
                .into_response());
        }
    };

    let author_id = user.user_id;
    let question_count = form.questions.len();
    let survey_id = with_db(&state, move |db| db.create_survey(author_id, &form)).await?;
    info!(
        "User {} created survey {} with {} questions",
        author_id, survey_id, question_count
    );

    Ok(Redirect::to("/?msg=survey_created").into_response())
}

#[derive(Debug, Deserialize)]
pub struct QuestionPartialQuery {
    #[serde(default)]
    pub index: usize,
}

pub async fn question_partial(Query(query): Query<QuestionPartialQuery>) -> Html<String> {
    render(surveys::question_block(query.index))
}

#[derive(Debug, Deserialize)]
pub struct OptionPartialQuery {
    #[serde(default)]
    pub q_index: usize,
    #[serde(default)]
    pub o_index: usize,
}

pub async fn option_partial(Query(query): Query<OptionPartialQuery>) -> Html<String> {
    render(surveys::option_input(query.q_index, query.o_index))
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub msg: Option<String>,
}

pub async fn detail(
    State(state): State<AppState>,
    Path(survey_id): Path<i64>,
    MaybeUser(user): MaybeUser,
    CsrfToken(csrf): CsrfToken,
    client: ClientMeta,
    Query(query): Query<DetailQuery>,
) -> AppResult<Html<String>> {
    let detail = load_visible(&state, survey_id).await?;

    let user_id = user.as_ref().map(|u| u.user_id);
    let accepting = detail.survey.status == SurveyStatus::Active;
    let meta = client.response_meta();
    let (answers, benchmark) = with_db(&state, move |db| {
        let answers = match user_id {
            Some(user_id) => {
                let response_id = if accepting {
                    Some(db.start_response(survey_id, user_id, &meta)?)
                } else {
                    db.find_response(survey_id, user_id)?.map(|r| r.response_id)
                };
                match response_id {
                    Some(id) => db.list_answers(id)?,
                    None => Vec::new(),
                }
            }
            None => Vec::new(),
        };
        Ok((answers, db.survey_benchmark(survey_id)?))
    })
    .await?;

    let previous = PreviousAnswers::from_rows(&answers);
    Ok(render(surveys::detail_page(
        PageContext::new(user.as_ref(), &csrf),
        surveys::DetailView {
            detail: &detail,
            previous: &previous,
            benchmark: &benchmark,
            msg: query.msg.as_deref(),
            error: None,
        },
    )))
}

pub async fn submit(
    State(state): State<AppState>,
    Path(survey_id): Path<i64>,
    CurrentUser(user): CurrentUser,
    client: ClientMeta,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    // Drafts exist but take no answers: 400 like any other inactive survey
    let detail = with_db(&state, move |db| db.load_survey_detail(survey_id))
        .await?
        .ok_or_else(not_found)?;
    if detail.survey.status != SurveyStatus::Active {
        debug!("Submission to survey {} in status {:?} rejected", survey_id, detail.survey.status);
        return Err(AppError::BadRequest("Опрос не активен".into()));
    }

    let answers = clean_submission(&detail, &fields).map_err(|error| {
        debug!("Submission to survey {} rejected: {}", survey_id, error);
        AppError::BadRequest(error)
    })?;

    let user_id = user.user_id;
    let meta = client.response_meta();
    let answer_count = answers.len();
    let response_id =
        with_db(&state, move |db| db.save_submission(survey_id, user_id, &meta, &answers)).await?;
    info!(
        "User {} completed survey {} (response {}, {} answers)",
        user_id, survey_id, response_id, answer_count
    );

    Ok(Redirect::to(&format!("/surveys/{}?msg=saved", survey_id)).into_response())
}

/// HTMX delete from the profile page: the row disappears, the created-surveys
/// counter is swapped out of band and a toast confirms.
pub async fn delete(
    State(state): State<AppState>,
    Path(survey_id): Path<i64>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let survey = with_db(&state, move |db| db.get_survey(survey_id))
        .await?
        .ok_or_else(not_found)?;

    if survey.author_id != Some(user.user_id) && !user.is_admin() {
        warn!("User {} tried to delete survey {}", user.user_id, survey_id);
        return Err(AppError::Forbidden("Нет прав на удаление".into()));
    }

    let user_id = user.user_id;
    let remaining = with_db(&state, move |db| {
        db.delete_survey(survey_id)?;
        db.count_surveys_by_author(user_id)
    })
    .await?;
    info!("User {} deleted survey {}", user_id, survey_id);

    let toast = HxEvent::toast(format!("Опрос «{}» удален", survey.title), ToastLevel::Success);
    Ok((hx_trigger(&toast), render(profile::created_count(remaining, true))).into_response())
}
