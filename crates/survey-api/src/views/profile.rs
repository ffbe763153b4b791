use maud::{Markup, html};
use survey_db::models::{CountryRow, SurveyRow, TakenSurveyRow, UserRow};

use super::layout::{PageContext, page};
use super::{csrf_field, flash_banner, short_timestamp};

pub const CREATED_COUNT_ID: &str = "created-count";

pub struct ProfileView<'a> {
    pub user: &'a UserRow,
    pub countries: &'a [CountryRow],
    pub created: &'a [SurveyRow],
    pub created_count: i64,
    pub taken: &'a [TakenSurveyRow],
    pub msg: Option<&'a str>,
    pub error: Option<&'a str>,
}

pub fn profile_page(ctx: PageContext<'_>, view: ProfileView<'_>) -> Markup {
    let user = view.user;

    let body = html! {
        (flash_banner(view.msg))
        h1 { "Личный кабинет" }
        div.card {
            h2 { "Профиль" }
            p.muted { (user.email) " · " (user.role.label()) " · с " (short_timestamp(&user.registration_date)) }
            @if let Some(error) = view.error {
                p.error { (error) }
            }
            form method="post" action="/users/me" {
                (csrf_field(ctx.csrf_token))
                label for="full_name" { "Имя" }
                input #full_name type="text" name="full_name" value=(user.full_name) required;
                label for="city" { "Город" }
                input #city type="text" name="city" value=(user.city.as_deref().unwrap_or(""));
                label for="country_id" { "Страна" }
                select #country_id name="country_id" {
                    option value="" { "Не указана" }
                    @for country in view.countries {
                        option value=(country.country_id) selected[user.country_id == Some(country.country_id)] {
                            (country.name)
                        }
                    }
                }
                label for="birth_date" { "Дата рождения" }
                input #birth_date type="date" name="birth_date" value=(user.birth_date.as_deref().unwrap_or(""));
                p {
                    button type="submit" { "Сохранить" }
                    " "
                    a href="/users/password" { "Сменить пароль" }
                }
            }
        }

        div.card {
            h2 { "Мои опросы (" (created_count(view.created_count, false)) ")" }
            @if view.created.is_empty() {
                p.muted { "Вы еще не создали ни одного опроса." }
            } @else {
                ul {
                    @for survey in view.created {
                        li {
                            a href={ "/surveys/" (survey.survey_id) } { (survey.title) }
                            " "
                            span.muted { (survey.status.label()) }
                            " "
                            button.danger
                                hx-delete={ "/surveys/" (survey.survey_id) }
                                hx-target="closest li"
                                hx-swap="outerHTML"
                                hx-confirm="Удалить опрос?" {
                                "Удалить"
                            }
                        }
                    }
                }
            }
        }

        div.card {
            h2 { "Пройденные опросы" }
            @if view.taken.is_empty() {
                p.muted { "Вы еще не проходили опросы." }
            } @else {
                table {
                    thead { tr { th { "Опрос" } th { "Начат" } th { "Завершен" } } }
                    tbody {
                        @for row in view.taken {
                            tr {
                                td { a href={ "/surveys/" (row.survey_id) } { (row.title) } }
                                td { (short_timestamp(&row.started_at)) }
                                td {
                                    @match &row.completed_at {
                                        Some(done) => { (short_timestamp(done)) }
                                        None => { span.muted { "в процессе" } }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };
    page("Личный кабинет", ctx, body)
}

/// The created-surveys counter. With `oob` set it replaces the counter already
/// on the page when returned from an HTMX request.
pub fn created_count(count: i64, oob: bool) -> Markup {
    html! {
        @if oob {
            span id=(CREATED_COUNT_ID) hx-swap-oob="true" { (count) }
        } @else {
            span id=(CREATED_COUNT_ID) { (count) }
        }
    }
}

pub fn password_page(ctx: PageContext<'_>, error: Option<&str>) -> Markup {
    let body = html! {
        div.card {
            h1 { "Смена пароля" }
            @if let Some(error) = error {
                p.error { (error) }
            }
            form method="post" action="/users/password" {
                (csrf_field(ctx.csrf_token))
                label for="old_password" { "Текущий пароль" }
                input #old_password type="password" name="old_password" required;
                label for="new_password" { "Новый пароль" }
                input #new_password type="password" name="new_password" minlength="6" required;
                label for="confirm_password" { "Повторите новый пароль" }
                input #confirm_password type="password" name="confirm_password" minlength="6" required;
                p { button type="submit" { "Сменить пароль" } }
            }
        }
    };
    page("Смена пароля", ctx, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oob_counter_targets_the_page_counter() {
        let html = created_count(4, true).into_string();
        assert_eq!(html, r#"<span id="created-count" hx-swap-oob="true">4</span>"#);
    }
}
