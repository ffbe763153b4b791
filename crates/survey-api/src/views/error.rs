use axum::http::StatusCode;
use maud::{Markup, html};

use super::layout::{PageContext, page as layout_page};

pub fn page(ctx: PageContext<'_>, status: StatusCode, title: &str, message: &str) -> Markup {
    let body = html! {
        div.card {
            h1 { (status.as_u16()) " · " (title) }
            p { (message) }
            @if status == StatusCode::UNAUTHORIZED {
                a.button href="/login" { "Войти" }
            } @else {
                a.button href="/" { "На главную" }
            }
        }
    };
    layout_page(title, ctx, body)
}

/// Inline error used inside HTMX fragments.
pub fn inline(message: &str) -> Markup {
    html! {
        p.error role="alert" { (message) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_page_offers_login() {
        let html = page(PageContext::anonymous(), StatusCode::UNAUTHORIZED, "Требуется авторизация", "Войдите").into_string();
        assert!(html.contains("href=\"/login\""));
        assert!(html.contains("401"));
    }
}
