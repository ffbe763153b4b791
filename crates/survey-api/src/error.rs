use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use crate::views;
use crate::views::layout::PageContext;

pub type AppResult<T> = Result<T, AppError>;

/// Carried on error responses so [`crate::middleware::error_pages`] can
/// render the page again with the visitor's nav and CSRF token.
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub title: &'static str,
    pub message: String,
}

/// Errors surfaced to the browser. Each renders the error page with its
/// status code; internal failures are logged and shown generically.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Требуется авторизация")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Title and description shown on the error page.
    pub fn page_text(&self) -> (&'static str, String) {
        match self {
            Self::BadRequest(msg) => ("Некорректный запрос", msg.clone()),
            Self::Unauthorized => (
                "Требуется авторизация",
                "Войдите в систему, чтобы продолжить.".into(),
            ),
            Self::Forbidden(msg) => ("Доступ запрещен", msg.clone()),
            Self::NotFound(msg) => ("Страница не найдена", msg.clone()),
            Self::Internal(_) => (
                "Ошибка сервера",
                "Что-то пошло не так. Попробуйте позже.".into(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("Internal error: {:#}", e);
        }
        let status = self.status();
        let (title, message) = self.page_text();
        let markup = views::error::page(PageContext::anonymous(), status, title, &message);
        let mut response = (status, Html(markup.into_string())).into_response();
        response.extensions_mut().insert(ErrorPage { status, title, message });
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_variants() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_stay_hidden() {
        let (title, message) = AppError::from(anyhow::anyhow!("disk on fire")).page_text();
        assert_eq!(title, "Ошибка сервера");
        assert!(!message.contains("disk"));
    }
}
