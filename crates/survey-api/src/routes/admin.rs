use axum::extract::{Query, State};
use axum::response::Html;
use serde::Deserialize;
use survey_db::analytics::HeatmapPeriod;

use crate::charts;
use crate::error::AppResult;
use crate::middleware::{CsrfToken, CurrentUser};
use crate::state::{AppState, with_db};
use crate::views::{admin, layout::PageContext, render};

const DASHBOARD_ANOMALY_LIMIT: u32 = 10;

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
) -> AppResult<Html<String>> {
    let period = HeatmapPeriod::default();
    let (summary, activity, tags, heatmap, ages, anomalies, choices, cohorts) = with_db(&state, move |db| {
        Ok((
            db.admin_summary()?,
            db.daily_activity(None, None)?,
            db.top_tags()?,
            db.heatmap(period)?,
            db.age_brackets()?,
            db.anomalies(None, Some(DASHBOARD_ANOMALY_LIMIT))?,
            db.survey_choices()?,
            db.cohort_retention()?,
        ))
    })
    .await?;

    let funnel = charts::funnel(&summary);
    let activity = charts::activity(&activity);
    let tags = charts::tags(&tags);
    let heatmap = charts::heatmap(&heatmap, period.as_str());
    let demographics = charts::demographics(&ages);
    let cohorts = charts::cohorts(&cohorts);

    Ok(render(admin::dashboard_page(
        PageContext::new(Some(&user), &csrf),
        admin::Dashboard {
            summary: &summary,
            funnel: &funnel,
            activity: &activity,
            tags: &tags,
            heatmap: &heatmap,
            demographics: &demographics,
            anomalies: &anomalies,
            survey_choices: &choices,
            cohorts: &cohorts,
        },
    )))
}

#[derive(Debug, Deserialize)]
pub struct HeatmapQuery {
    #[serde(default)]
    pub period: String,
}

pub async fn heatmap_partial(
    State(state): State<AppState>,
    Query(query): Query<HeatmapQuery>,
) -> AppResult<Html<String>> {
    let period = HeatmapPeriod::parse(&query.period);
    let cells = with_db(&state, move |db| db.heatmap(period)).await?;
    Ok(render(admin::heatmap_partial(&charts::heatmap(&cells, period.as_str()))))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn activity_partial(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Html<String>> {
    let start = non_empty_date(query.start_date);
    let end = non_empty_date(query.end_date);
    let rows = with_db(&state, move |db| db.daily_activity(start.as_deref(), end.as_deref())).await?;
    Ok(render(admin::activity_partial(&charts::activity(&rows))))
}

#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    pub survey_id: Option<String>,
}

/// The filtered view lists every anomaly of the survey, not only the top ten.
pub async fn anomalies_partial(
    State(state): State<AppState>,
    Query(query): Query<AnomalyQuery>,
) -> AppResult<Html<String>> {
    let survey_id = query.survey_id.and_then(|raw| raw.trim().parse::<i64>().ok());
    let limit = match survey_id {
        Some(_) => None,
        None => Some(DASHBOARD_ANOMALY_LIMIT),
    };
    let rows = with_db(&state, move |db| db.anomalies(survey_id, limit)).await?;
    Ok(render(admin::anomalies_partial(&rows)))
}

/// Only well-formed `YYYY-MM-DD` values reach SQL; anything else means no bound.
fn non_empty_date(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string())
        .filter(|v| chrono::NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_dates_are_ignored() {
        assert_eq!(non_empty_date(Some(" 2025-03-01 ".into())).as_deref(), Some("2025-03-01"));
        assert_eq!(non_empty_date(Some("".into())), None);
        assert_eq!(non_empty_date(Some("yesterday".into())), None);
        assert_eq!(non_empty_date(None), None);
    }
}
