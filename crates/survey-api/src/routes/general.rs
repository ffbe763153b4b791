use axum::extract::{Query, State};
use axum::response::Html;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::{CsrfToken, MaybeUser};
use crate::state::{AppState, with_db};
use crate::views::{index, layout::PageContext, render};

const RECOMMENDATION_LIMIT: u32 = 3;

#[derive(Debug, Deserialize)]
pub struct MsgQuery {
    pub msg: Option<String>,
}

pub async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    CsrfToken(csrf): CsrfToken,
    Query(query): Query<MsgQuery>,
) -> AppResult<Html<String>> {
    let user_id = user.as_ref().map(|u| u.user_id);
    let (surveys, recommendations) = with_db(&state, move |db| {
        let surveys = db.list_public_surveys()?;
        let recommendations = match user_id {
            Some(id) => db.recommend_surveys(id, RECOMMENDATION_LIMIT)?,
            None => Vec::new(),
        };
        Ok((surveys, recommendations))
    })
    .await?;

    Ok(render(index::index_page(
        PageContext::new(user.as_ref(), &csrf),
        &surveys,
        &recommendations,
        query.msg.as_deref(),
    )))
}

pub async fn health() -> &'static str {
    "ok"
}
