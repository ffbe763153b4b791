//! Admin analytics dashboard. Each chart is a `div` plus an inline script that
//! hands its JSON to Plotly; HTMX re-runs the script when a partial is swapped.

use maud::{Markup, PreEscaped, html};
use survey_db::analytics::{AdminSummary, AnomalyRow, HeatmapPeriod};

use super::layout::{PageContext, chart_page};
use crate::charts::{CohortChart, HeatmapChart, Series, to_script_json};

const PERIODS: [(HeatmapPeriod, &str); 4] = [
    (HeatmapPeriod::Week, "7 дней"),
    (HeatmapPeriod::Month, "30 дней"),
    (HeatmapPeriod::Year, "Текущий год"),
    (HeatmapPeriod::All, "Все время"),
];

pub struct Dashboard<'a> {
    pub summary: &'a AdminSummary,
    pub funnel: &'a Series,
    pub activity: &'a Series,
    pub tags: &'a Series,
    pub heatmap: &'a HeatmapChart,
    pub demographics: &'a Series,
    pub anomalies: &'a [AnomalyRow],
    pub survey_choices: &'a [(i64, String)],
    pub cohorts: &'a CohortChart,
}

pub fn dashboard_page(ctx: PageContext<'_>, view: Dashboard<'_>) -> Markup {
    let summary = view.summary;

    let body = html! {
        h1 { "Аналитическая панель" }
        div.grid {
            (kpi("Пользователи", summary.total_users))
            (kpi("Опросы", summary.total_surveys))
            (kpi("Ответы", summary.total_responses))
            (kpi("Начали опрос", summary.unique_users_started))
            (kpi("Завершили опрос", summary.unique_users_completed))
        }

        div.grid {
            div.card {
                h2 { "Воронка" }
                (plot("chart-funnel", &to_script_json(view.funnel), "[{type:'funnel', y:d.labels, x:d.counts}]"))
            }
            div.card {
                h2 { "Популярные теги" }
                (plot("chart-tags", &to_script_json(view.tags), "[{type:'bar', x:d.labels, y:d.counts}]"))
            }
        }

        div.card {
            h2 { "Активность по дням" }
            form hx-get="/admin/analytics/activity" hx-target="#activity" hx-trigger="change" {
                "С " input type="date" name="start_date";
                " по " input type="date" name="end_date";
            }
            div #activity { (activity_partial(view.activity)) }
        }

        div.card {
            h2 { "Время прохождения" }
            form hx-get="/admin/analytics/heatmap" hx-target="#heatmap" hx-trigger="change" {
                select name="period" {
                    @for (period, label) in PERIODS {
                        option value=(period.as_str()) selected[period.as_str() == view.heatmap.period] { (label) }
                    }
                }
            }
            div #heatmap { (heatmap_partial(view.heatmap)) }
        }

        div.grid {
            div.card {
                h2 { "Возраст респондентов" }
                (plot("chart-ages", &to_script_json(view.demographics), "[{type:'pie', labels:d.labels, values:d.counts}]"))
            }
            div.card {
                h2 { "Удержание по когортам" }
                @if view.cohorts.y.is_empty() {
                    p.muted { "Недостаточно данных." }
                } @else {
                    (plot(
                        "chart-cohorts",
                        &to_script_json(view.cohorts),
                        "[{type:'heatmap', x:d.x, y:d.y, z:d.z, text:d.text, texttemplate:'%{text}', colorscale:'Blues'}]",
                    ))
                }
            }
        }

        div.card {
            h2 { "Подозрительно быстрые ответы" }
            form hx-get="/admin/analytics/anomalies" hx-target="#anomalies" hx-trigger="change" {
                select name="survey_id" {
                    option value="" { "Все опросы" }
                    @for (id, title) in view.survey_choices {
                        option value=(id) { (title) }
                    }
                }
            }
            div #anomalies { (anomalies_partial(view.anomalies)) }
        }
    };
    chart_page("Аналитическая панель", ctx, body)
}

fn kpi(label: &str, value: i64) -> Markup {
    html! {
        div.card {
            p.muted { (label) }
            p style="font-size: 1.8rem; margin: 0" { (value) }
        }
    }
}

/// A chart container and the script drawing it. `traces` is a JS expression
/// over `d`, the chart's JSON data.
fn plot(id: &str, data: &str, traces: &str) -> Markup {
    let script = format!(
        "(function (d) {{ Plotly.newPlot('{}', {}, {{margin:{{t:10}}}}, {{responsive:true, displayModeBar:false}}); }})({});",
        id, traces, data
    );
    html! {
        div id=(id) style="min-height: 320px" {}
        script { (PreEscaped(script)) }
    }
}

pub fn activity_partial(activity: &Series) -> Markup {
    html! {
        @if activity.labels.is_empty() {
            p.muted { "Нет ответов за выбранный период." }
        } @else {
            (plot(
                "chart-activity",
                &to_script_json(activity),
                "[{type:'scatter', mode:'lines+markers', x:d.labels, y:d.counts}]",
            ))
        }
    }
}

pub fn heatmap_partial(heatmap: &HeatmapChart) -> Markup {
    html! {
        p.muted { "Всего ответов: " (heatmap.total) }
        (plot(
            "chart-heatmap",
            &to_script_json(heatmap),
            "[{type:'heatmap', x:d.x, y:d.y, z:d.z, colorscale:'YlOrRd'}]",
        ))
    }
}

pub fn anomalies_partial(rows: &[AnomalyRow]) -> Markup {
    html! {
        @if rows.is_empty() {
            p.muted { "Аномалий не найдено." }
        } @else {
            table {
                thead {
                    tr {
                        th { "Опрос" } th { "Пользователь" } th { "Время, сек" }
                        th { "Среднее, сек" } th { "Ст. отклонение" }
                    }
                }
                tbody {
                    @for row in rows {
                        tr {
                            td { a href={ "/surveys/" (row.survey_id) } { (row.survey_title) } }
                            td { (row.user_name) br; span.muted { (row.user_email) } }
                            td { (format!("{:.1}", row.user_sec)) }
                            td { (format!("{:.1}", row.avg_sec)) }
                            td { (format!("{:.1}", row.std_sec)) }
                        }
                    }
                }
            }
        }
    }
}
