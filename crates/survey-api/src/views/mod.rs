//! Server-rendered HTML. Full pages go through [`layout::page`]; HTMX
//! requests get bare fragments.

pub mod admin;
pub mod auth;
pub mod error;
pub mod index;
pub mod layout;
pub mod profile;
pub mod surveys;
pub mod tables;

use axum::http::HeaderMap;
use axum::response::Html;
use maud::{Markup, html};

pub fn render(markup: Markup) -> Html<String> {
    Html(markup.into_string())
}

/// Hidden input carrying the CSRF token for plain (non-HTMX) form posts.
pub fn csrf_field(token: &str) -> Markup {
    html! {
        input type="hidden" name="csrf_token" value=(token);
    }
}

/// Text for the `?msg=` banner shown after a redirect.
pub fn flash_message(code: &str) -> Option<&'static str> {
    match code {
        "survey_created" => Some("Опрос успешно создан"),
        "saved" => Some("Ваши ответы сохранены"),
        "password_updated" => Some("Пароль успешно изменен"),
        "profile_updated" => Some("Профиль обновлен"),
        _ => None,
    }
}

pub fn flash_banner(code: Option<&str>) -> Markup {
    html! {
        @if let Some(text) = code.and_then(flash_message) {
            p.banner { (text) }
        }
    }
}

pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get("hx-request")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "true")
}

/// Timestamps are stored as `YYYY-MM-DD HH:MM:SS`; pages show them without seconds.
pub fn short_timestamp(ts: &str) -> &str {
    ts.get(..16).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flash_codes_render_nothing() {
        assert_eq!(flash_message("saved"), Some("Ваши ответы сохранены"));
        assert!(flash_banner(Some("bogus")).into_string().is_empty());
        assert!(flash_banner(None).into_string().is_empty());
    }

    #[test]
    fn htmx_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_htmx(&headers));
        headers.insert("hx-request", "true".parse().unwrap());
        assert!(is_htmx(&headers));
    }

    #[test]
    fn csrf_field_escapes_value() {
        let html = csrf_field("a\"b").into_string();
        assert!(html.contains("name=\"csrf_token\""));
        assert!(html.contains("a&quot;b"));
    }

    #[test]
    fn timestamps_drop_seconds() {
        assert_eq!(short_timestamp("2025-03-01 12:30:45"), "2025-03-01 12:30");
        assert_eq!(short_timestamp("2025"), "2025");
    }
}
