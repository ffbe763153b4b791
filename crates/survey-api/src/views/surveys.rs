use maud::{Markup, PreEscaped, html};
use survey_db::models::{BenchmarkRow, QuestionRow, SurveyDetail};
use survey_types::models::{QuestionType, SurveyStatus};

use super::layout::{PageContext, page};
use super::{csrf_field, flash_banner, short_timestamp};
use crate::forms::{DEFAULT_RATING_SCALE, MAX_RATING_SCALE, MIN_RATING_SCALE};
use crate::submission::{PreviousAnswers, answer_key};

// Keeps `position` in sync with the on-screen order and toggles the options
// block and rating scale when the question type changes.
const BUILDER_SCRIPT: &str = r#"
function renumberQuestions() {
  document.querySelectorAll('#questions .question').forEach(function (q, i) {
    var pos = q.querySelector('input[name$="[position]"]');
    if (pos) { pos.value = i + 1; }
  });
}
function syncQuestionType(select) {
  var q = select.closest('.question');
  var kind = select.value;
  q.querySelector('.options').hidden = !(kind === 'single_choice' || kind === 'multiple_choice');
  q.querySelector('.rating').hidden = kind !== 'rating';
}
document.body.addEventListener('htmx:afterSwap', renumberQuestions);
"#;

pub fn create_page(ctx: PageContext<'_>, error: Option<&str>) -> Markup {
    let body = html! {
        div.card {
            h1 { "Новый опрос" }
            @if let Some(error) = error {
                p.error { (error) }
            }
            form method="post" action="/surveys/create" {
                (csrf_field(ctx.csrf_token))
                label for="title" { "Название" }
                input #title type="text" name="title" maxlength="200" required;
                label for="description" { "Описание" }
                textarea #description name="description" rows="3" {}
                label for="tags" { "Теги" }
                input #tags type="text" name="tag_names" placeholder="например, спорт";
                input type="text" name="tag_names";
                input type="text" name="tag_names";

                h2 { "Вопросы" }
                div #questions {
                    (question_block(0))
                }
                p {
                    button type="button"
                        hx-get="/surveys/partials/question"
                        hx-target="#questions"
                        hx-swap="beforeend"
                        hx-vals="js:{index: document.querySelectorAll('#questions .question').length}" {
                        "Добавить вопрос"
                    }
                }
                p { button type="submit" { "Создать опрос" } }
            }
        }
        script { (PreEscaped(BUILDER_SCRIPT)) }
    };
    page("Новый опрос", ctx, body)
}

/// One question editor; field names follow `questions[<index>][...]`.
pub fn question_block(index: usize) -> Markup {
    let field = |name: &str| format!("questions[{}][{}]", index, name);
    let options_id = format!("options-{}", index);

    html! {
        fieldset.question.card {
            legend { "Вопрос " (index + 1) }
            input type="hidden" name=(field("position")) value=(index + 1);
            label { "Текст вопроса" }
            input type="text" name=(field("text")) required;
            label { "Тип" }
            select name=(field("type")) onchange="syncQuestionType(this)" {
                @for kind in QuestionType::ALL {
                    option value=(kind.as_str()) selected[kind == QuestionType::SingleChoice] { (kind.label()) }
                }
            }
            label {
                input type="checkbox" name=(field("is_required"));
                " Обязательный"
            }
            div.options {
                div id=(options_id) {
                    (option_input(index, 0))
                    (option_input(index, 1))
                }
                button type="button"
                    hx-get="/surveys/partials/option"
                    hx-target={ "#" (options_id) }
                    hx-swap="beforeend"
                    hx-vals={ "js:{q_index: " (index) ", o_index: document.querySelectorAll('#" (options_id) " input').length}" } {
                    "Добавить вариант"
                }
            }
            div.rating hidden {
                label { "Шкала: от " (MIN_RATING_SCALE) " до " (MAX_RATING_SCALE) }
                input type="number" name=(field("rating_scale"))
                    min=(MIN_RATING_SCALE) max=(MAX_RATING_SCALE) value=(DEFAULT_RATING_SCALE);
            }
            button.danger type="button" onclick="this.closest('.question').remove(); renumberQuestions();" {
                "Удалить вопрос"
            }
        }
    }
}

pub fn option_input(q_index: usize, o_index: usize) -> Markup {
    html! {
        input type="text"
            name={ "questions[" (q_index) "][options][" (o_index) "]" }
            placeholder={ "Вариант " (o_index + 1) };
    }
}

pub struct DetailView<'a> {
    pub detail: &'a SurveyDetail,
    pub previous: &'a PreviousAnswers,
    pub benchmark: &'a [BenchmarkRow],
    pub msg: Option<&'a str>,
    pub error: Option<&'a str>,
}

pub fn detail_page(ctx: PageContext<'_>, view: DetailView<'_>) -> Markup {
    let survey = &view.detail.survey;
    let accepting = survey.status == SurveyStatus::Active;
    let logged_in = ctx.user.is_some();

    let body = html! {
        (flash_banner(view.msg))
        div.card {
            h1 { (survey.title) }
            @if let Some(description) = &survey.description {
                p { (description) }
            }
            p.muted {
                @if let Some(author) = &view.detail.author_name {
                    "Автор: " (author) " · "
                }
                "Статус: " (survey.status.label())
                @if let Some(end) = &survey.end_date {
                    " · до " (short_timestamp(end))
                }
            }
            p {
                @for tag in &view.detail.tags {
                    span.tag { (tag) }
                }
            }
        }

        @if let Some(error) = view.error {
            p.error { (error) }
        }

        @if !accepting {
            p.banner { "Опрос не принимает ответы." }
        } @else if !logged_in {
            p.banner { a href="/login" { "Войдите" } ", чтобы пройти опрос." }
        }

        form method="post" action={ "/surveys/" (survey.survey_id) "/submit" } {
            (csrf_field(ctx.csrf_token))
            @for question in &view.detail.questions {
                (question_field(question, view.previous, !accepting))
            }
            @if accepting && logged_in {
                p { button type="submit" { "Отправить ответы" } }
            }
        }

        @if !view.benchmark.is_empty() {
            div.card {
                h2 { "Сравнение с похожими опросами" }
                table {
                    thead { tr { th { "Показатель" } th { "Этот опрос" } th { "Среднее по теме" } } }
                    tbody {
                        @for row in view.benchmark {
                            tr {
                                td { (row.metric) }
                                td { (format!("{:.1}", row.survey_value)) }
                                td { (format!("{:.1}", row.category_avg)) }
                            }
                        }
                    }
                }
            }
        }
    };
    page(&survey.title, ctx, body)
}

fn question_field(question: &QuestionRow, previous: &PreviousAnswers, disabled: bool) -> Markup {
    let name = answer_key(question.question_id);
    let qid = question.question_id;

    html! {
        fieldset.card {
            legend {
                (question.position) ". " (question.question_text)
                @if question.is_required { " *" }
            }
            @match question.question_type {
                QuestionType::TextAnswer => {
                    textarea name=(name) rows="3" disabled[disabled] required[question.is_required] {
                        (previous.text(qid).unwrap_or(""))
                    }
                }
                QuestionType::MultipleChoice => {
                    @for option in &question.options {
                        label {
                            input type="checkbox" name=(name) value=(option.option_id)
                                checked[previous.is_selected(qid, option.option_id)]
                                disabled[disabled];
                            " " (option.option_text)
                        }
                    }
                }
                QuestionType::SingleChoice | QuestionType::Rating => {
                    div class=(if question.question_type == QuestionType::Rating { "rating-scale" } else { "choices" }) {
                        @for option in &question.options {
                            label {
                                input type="radio" name=(name) value=(option.option_id)
                                    checked[previous.is_selected(qid, option.option_id)]
                                    required[question.is_required]
                                    disabled[disabled];
                                " " (option.option_text)
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_block_uses_bracket_names() {
        let html = question_block(3).into_string();
        assert!(html.contains("name=\"questions[3][text]\""));
        assert!(html.contains("name=\"questions[3][options][1]\""));
        assert!(html.contains("name=\"questions[3][rating_scale]\""));
        assert!(html.contains("value=\"4\""));
    }

    #[test]
    fn option_input_is_numbered() {
        let html = option_input(1, 2).into_string();
        assert!(html.contains("questions[1][options][2]"));
        assert!(html.contains("Вариант 3"));
    }
}
