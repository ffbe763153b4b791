pub mod admin;
pub mod auth;
pub mod general;
pub mod surveys;
pub mod tables;
pub mod users;

use axum::{
    Router,
    http::HeaderName,
    middleware,
    routing::{get, post},
};
use survey_types::events::HxEvent;

use crate::error::AppError;
use crate::middleware::{csrf_protect, error_pages, refresh_session, require_admin, require_user};
use crate::state::AppState;

const HX_TRIGGER: HeaderName = HeaderName::from_static("hx-trigger");

pub(crate) fn hx_trigger(event: &HxEvent) -> [(HeaderName, String); 1] {
    [(HX_TRIGGER, event.header_value())]
}

pub(crate) fn hx_triggers(events: &[HxEvent]) -> [(HeaderName, String); 1] {
    [(HX_TRIGGER, HxEvent::combined_header_value(events))]
}

/// The whole application. Session refresh runs first, then the CSRF check,
/// then error page rendering, then the per-group authentication layers.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(general::index))
        .route("/health", get(general::health))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/surveys/partials/question", get(surveys::question_partial))
        .route("/surveys/partials/option", get(surveys::option_partial))
        .route("/surveys/{id}", get(surveys::detail));

    let members = Router::new()
        .route("/users/me", get(users::profile_page).post(users::update_profile))
        .route("/users/password", get(users::password_page).post(users::change_password))
        .route("/surveys/create", get(surveys::create_page).post(surveys::create))
        .route("/surveys/{id}/submit", post(surveys::submit))
        .route("/surveys/{id}", axum::routing::delete(surveys::delete))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admins = Router::new()
        .route("/admin/analytics", get(admin::dashboard))
        .route("/admin/analytics/heatmap", get(admin::heatmap_partial))
        .route("/admin/analytics/activity", get(admin::activity_partial))
        .route("/admin/analytics/anomalies", get(admin::anomalies_partial))
        .route("/admin/tables_view", get(tables::list))
        .route("/admin/tables/{table}", get(tables::grid))
        .route("/admin/tables/{table}/export", get(tables::export))
        .route("/admin/tables/{table}/rows", post(tables::insert))
        .route("/admin/tables/{table}/rows/new", get(tables::new_row))
        .route(
            "/admin/tables/{table}/rows/{key}",
            get(tables::show_row).post(tables::update_row).delete(tables::delete_row),
        )
        .route("/admin/tables/{table}/rows/{key}/edit", get(tables::edit_row))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    Router::new()
        .merge(public)
        .merge(members)
        .merge(admins)
        .fallback(|| async { AppError::NotFound("Такой страницы нет.".into()) })
        .layer(middleware::from_fn_with_state(state.clone(), error_pages))
        .layer(middleware::from_fn_with_state(state.clone(), csrf_protect))
        .layer(middleware::from_fn_with_state(state.clone(), refresh_session))
        .with_state(state)
}
