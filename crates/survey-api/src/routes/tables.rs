//! Generic table console under `/admin/tables`. Every handler resolves the
//! table against the live schema first; unknown names are a 404.
//!
//! Write failures (constraint violations, type mismatches) come back as the
//! same fragment with an inline error and an error toast, with status 200 so
//! HTMX still swaps it in.

use axum::{
    Form,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
    response::{Html, IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use rusqlite::types::Value;
use survey_db::console::{DEFAULT_PAGE_SIZE, RowSet, TableMeta, is_secret_column, render_value};
use survey_types::events::{HxEvent, ToastLevel};
use tracing::{info, warn};

use super::{hx_trigger, hx_triggers};
use crate::error::{AppError, AppResult};
use crate::middleware::{CsrfToken, CurrentUser};
use crate::security::hash_password;
use crate::state::{AppState, with_db};
use crate::views::{error::inline, is_htmx, layout::PageContext, render, tables};

const EXPORT_BATCH_ROWS: u32 = 500;

async fn require_table(state: &AppState, table: String) -> AppResult<TableMeta> {
    with_db(state, move |db| db.table_meta(&table))
        .await?
        .ok_or_else(|| AppError::NotFound("Таблица не найдена".into()))
}

/// SQLite rejected the write: the message is safe to show to an admin.
/// Anything else stays a server error.
fn write_failure(err: AppError) -> Result<String, AppError> {
    match err {
        AppError::Internal(e) if e.chain().any(|cause| cause.is::<rusqlite::Error>()) => {
            Ok(e.root_cause().to_string())
        }
        other => Err(other),
    }
}

fn failure_toast(message: &str) -> HxEvent {
    HxEvent::toast(format!("Ошибка: {}", message), ToastLevel::Error)
}

/// Drop the CSRF field and hash credentials. On update an empty credential
/// means "keep the current one".
fn prepare_values(
    fields: Vec<(String, String)>,
    skip_empty_secrets: bool,
) -> AppResult<Vec<(String, String)>> {
    let mut values = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        if name == crate::security::CSRF_FORM_FIELD {
            continue;
        }
        if is_secret_column(&name) {
            if value.is_empty() {
                if skip_empty_secrets {
                    continue;
                }
            } else {
                values.push((name, hash_password(&value)?));
                continue;
            }
        }
        values.push((name, value));
    }
    Ok(values)
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
) -> AppResult<Html<String>> {
    let names = with_db(&state, |db| db.list_tables()).await?;
    Ok(render(tables::tables_page(PageContext::new(Some(&user), &csrf), &names)))
}

#[derive(Debug, Deserialize)]
pub struct GridQuery {
    pub page: Option<u32>,
    pub q: Option<String>,
}

pub async fn grid(
    State(state): State<AppState>,
    Path(table): Path<String>,
    CurrentUser(user): CurrentUser,
    CsrfToken(csrf): CsrfToken,
    headers: HeaderMap,
    Query(query): Query<GridQuery>,
) -> AppResult<Html<String>> {
    let meta = require_table(&state, table).await?;
    let q = query.q.unwrap_or_default().trim().to_string();
    let page_no = query.page.unwrap_or(1);

    let search = q.clone();
    let data = with_db(&state, move |db| {
        let search = Some(search.as_str()).filter(|s| !s.is_empty());
        db.page(&meta.name, page_no, DEFAULT_PAGE_SIZE, search)
    })
    .await?;

    if is_htmx(&headers) {
        Ok(render(tables::grid(&data, &q)))
    } else {
        Ok(render(tables::table_page(PageContext::new(Some(&user), &csrf), &data, &q)))
    }
}

pub async fn new_row(State(state): State<AppState>, Path(table): Path<String>) -> AppResult<Html<String>> {
    let meta = require_table(&state, table).await?;
    let name = meta.name.clone();
    let options = with_db(&state, move |db| db.form_options(&name)).await?;
    Ok(render(tables::new_row_form(&meta, &options, None)))
}

pub async fn insert(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let meta = require_table(&state, table).await?;
    let values = prepare_values(fields, false)?;

    let name = meta.name.clone();
    match with_db(&state, move |db| db.insert_row(&name, &values)).await {
        Ok(rowid) => {
            info!("Console inserted row {} into {}", rowid, meta.name);
            let events = [
                HxEvent::toast("Запись добавлена", ToastLevel::Success),
                HxEvent::TableChanged { table: meta.name.clone() },
            ];
            Ok((hx_triggers(&events), Html(String::new())).into_response())
        }
        Err(e) => {
            let message = write_failure(e)?;
            warn!("Console insert into {} failed: {}", meta.name, message);
            let name = meta.name.clone();
            let options = with_db(&state, move |db| db.form_options(&name)).await?;
            Ok((
                hx_trigger(&failure_toast(&message)),
                render(tables::new_row_form(&meta, &options, Some(&message))),
            )
                .into_response())
        }
    }
}

/// The row addressed by `key`, with its values in column order.
async fn fetch_values(state: &AppState, meta: &TableMeta, key: &str) -> AppResult<(RowSet, Vec<Value>)> {
    let (name, key) = (meta.name.clone(), key.to_string());
    let rows = with_db(state, move |db| db.fetch_row(&name, &key))
        .await?
        .ok_or_else(|| AppError::NotFound("Запись не найдена".into()))?;
    let values = rows.rows.first().cloned().unwrap_or_default();
    Ok((rows, values))
}

pub async fn show_row(
    State(state): State<AppState>,
    Path((table, key)): Path<(String, String)>,
) -> AppResult<Html<String>> {
    let meta = require_table(&state, table).await?;
    let (rows, values) = fetch_values(&state, &meta, &key).await?;
    Ok(render(tables::row(&meta, &rows, &values)))
}

pub async fn edit_row(
    State(state): State<AppState>,
    Path((table, key)): Path<(String, String)>,
) -> AppResult<Html<String>> {
    let meta = require_table(&state, table).await?;
    let (_, values) = fetch_values(&state, &meta, &key).await?;
    let name = meta.name.clone();
    let options = with_db(&state, move |db| db.form_options(&name)).await?;
    Ok(render(tables::edit_row(&meta, &values, &options, None)))
}

pub async fn update_row(
    State(state): State<AppState>,
    Path((table, key)): Path<(String, String)>,
    Form(fields): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let meta = require_table(&state, table).await?;
    let values = prepare_values(fields, true)?;

    let (name, row_key) = (meta.name.clone(), key.clone());
    match with_db(&state, move |db| db.update_row(&name, &row_key, &values)).await {
        Ok(true) => {
            info!("Console updated {} row {}", meta.name, key);
            let (rows, values) = fetch_values(&state, &meta, &key).await?;
            Ok((
                hx_trigger(&HxEvent::toast("Запись обновлена", ToastLevel::Success)),
                render(tables::row(&meta, &rows, &values)),
            )
                .into_response())
        }
        Ok(false) => Err(AppError::NotFound("Запись не найдена".into())),
        Err(e) => {
            let message = write_failure(e)?;
            warn!("Console update of {} row {} failed: {}", meta.name, key, message);
            let (_, values) = fetch_values(&state, &meta, &key).await?;
            let name = meta.name.clone();
            let options = with_db(&state, move |db| db.form_options(&name)).await?;
            Ok((
                hx_trigger(&failure_toast(&message)),
                render(tables::edit_row(&meta, &values, &options, Some(&message))),
            )
                .into_response())
        }
    }
}

pub async fn delete_row(
    State(state): State<AppState>,
    Path((table, key)): Path<(String, String)>,
) -> AppResult<Response> {
    let meta = require_table(&state, table).await?;

    let (name, row_key) = (meta.name.clone(), key.clone());
    match with_db(&state, move |db| db.delete_row(&name, &row_key)).await {
        Ok(true) => {
            info!("Console deleted {} row {}", meta.name, key);
            Ok((
                hx_trigger(&HxEvent::toast("Запись удалена", ToastLevel::Success)),
                Html(String::new()),
            )
                .into_response())
        }
        Ok(false) => Err(AppError::NotFound("Запись не найдена".into())),
        Err(e) => {
            let message = write_failure(e)?;
            warn!("Console delete of {} row {} failed: {}", meta.name, key, message);
            let (rows, values) = fetch_values(&state, &meta, &key).await?;
            let row = tables::row(&meta, &rows, &values);
            Ok((
                hx_trigger(&failure_toast(&message)),
                render(maud::html! { (row) tr { td colspan=(meta.columns.len() + 1) { (inline(&message)) } } }),
            )
                .into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub q: Option<String>,
}

/// CSV of the (optionally filtered) table, read and written in batches so
/// large tables never sit in memory.
pub async fn export(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(query): Query<ExportQuery>,
) -> AppResult<Response> {
    let meta = require_table(&state, table).await?;
    let q = query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());
    let header_row: Vec<String> = meta.columns.iter().map(|c| c.name.clone()).collect();
    let filename = format!("attachment; filename=\"{}.csv\"", meta.name);
    let table = meta.name.clone();
    info!("Exporting table {} (filter: {:?})", table, q);

    let stream = async_stream::stream! {
        match encode_csv(std::iter::once(header_row)) {
            Ok(bytes) => {
                yield Ok(bytes);
            }
            Err(e) => {
                yield Err(std::io::Error::other(e));
                return;
            }
        }

        let mut offset: u64 = 0;
        loop {
            let (name, search) = (table.clone(), q.clone());
            let batch = match with_db(&state, move |db| {
                db.export_batch(&name, search.as_deref(), offset, EXPORT_BATCH_ROWS)
            })
            .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Export of {} failed at row {}: {}", table, offset, e);
                    yield Err(std::io::Error::other(e.to_string()));
                    return;
                }
            };

            let fetched = batch.len();
            let records = batch
                .iter()
                .map(|row| row.iter().map(render_value).collect::<Vec<_>>());
            match encode_csv(records) {
                Ok(bytes) => {
                    yield Ok(bytes);
                }
                Err(e) => {
                    yield Err(std::io::Error::other(e));
                    return;
                }
            }

            if fetched < EXPORT_BATCH_ROWS as usize {
                break;
            }
            offset += fetched as u64;
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

fn encode_csv<I>(records: I) -> Result<Bytes, csv::Error>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for record in records {
        writer.write_record(&record)?;
    }
    let buffer = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(Bytes::from(buffer))
}
