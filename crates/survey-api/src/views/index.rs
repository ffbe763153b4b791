use maud::{Markup, html};
use survey_db::models::{RecommendationRow, SurveyCard};

use super::flash_banner;
use super::layout::{PageContext, page};

pub fn index_page(
    ctx: PageContext<'_>,
    surveys: &[SurveyCard],
    recommendations: &[RecommendationRow],
    msg: Option<&str>,
) -> Markup {
    let body = html! {
        (flash_banner(msg))
        @if !recommendations.is_empty() {
            section {
                h2 { "Рекомендуем пройти" }
                div.grid {
                    @for rec in recommendations {
                        div.card {
                            h3 { a href={ "/surveys/" (rec.survey_id) } { (rec.title) } }
                            @if let Some(description) = &rec.description {
                                p { (description) }
                            }
                            p.muted {
                                "Общих тем: " (rec.shared_tags) " · Ответов: " (rec.popularity)
                            }
                        }
                    }
                }
            }
        }
        section {
            h2 { "Опросы" }
            @if surveys.is_empty() {
                p.muted { "Пока нет ни одного опроса." }
            } @else {
                div.grid {
                    @for card in surveys {
                        div.card {
                            h3 { a href={ "/surveys/" (card.survey.survey_id) } { (card.survey.title) } }
                            @if let Some(description) = &card.survey.description {
                                p { (description) }
                            }
                            p {
                                @for tag in &card.tags {
                                    span.tag { (tag) }
                                }
                            }
                            p.muted { (card.survey.status.label()) }
                        }
                    }
                }
            }
        }
    };
    page("Главная", ctx, body)
}
