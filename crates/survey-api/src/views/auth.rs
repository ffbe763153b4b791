use maud::{Markup, html};

use super::csrf_field;
use super::layout::{PageContext, page};

pub fn register_page(ctx: PageContext<'_>, email: &str, full_name: &str, error: Option<&str>) -> Markup {
    let body = html! {
        div.card {
            h1 { "Регистрация" }
            @if let Some(error) = error {
                p.error { (error) }
            }
            form method="post" action="/register" {
                (csrf_field(ctx.csrf_token))
                label for="email" { "Email" }
                input #email type="email" name="email" value=(email) required;
                label for="full_name" { "Имя" }
                input #full_name type="text" name="full_name" value=(full_name) minlength="2" maxlength="100" required;
                label for="password" { "Пароль" }
                input #password type="password" name="password" minlength="6" required;
                p { button type="submit" { "Зарегистрироваться" } }
            }
            p.muted { "Уже есть аккаунт? " a href="/login" { "Войти" } }
        }
    };
    page("Регистрация", ctx, body)
}

pub fn login_page(ctx: PageContext<'_>, email: &str, error: Option<&str>) -> Markup {
    let body = html! {
        div.card {
            h1 { "Вход" }
            @if let Some(error) = error {
                p.error { (error) }
            }
            form method="post" action="/login" {
                (csrf_field(ctx.csrf_token))
                label for="email" { "Email" }
                input #email type="email" name="email" value=(email) required;
                label for="password" { "Пароль" }
                input #password type="password" name="password" required;
                p { button type="submit" { "Войти" } }
            }
            p.muted { "Нет аккаунта? " a href="/register" { "Зарегистрироваться" } }
        }
    };
    page("Вход", ctx, body)
}
