//! Table console: grid, inline row editor and the new-row form.

use std::collections::HashMap;

use maud::{Markup, html};
use rusqlite::types::Value;
use survey_db::console::{
    ColumnMeta, FormChoice, RowSet, TableMeta, TablePage, is_secret_column, render_value,
};

use super::layout::{PageContext, page};

pub const GRID_ID: &str = "table-grid";
pub const EDITOR_ID: &str = "row-editor";

fn table_url(table: &str) -> String {
    format!("/admin/tables/{}", table)
}

/// Composite keys contain `,` and text keys anything, so the key is
/// percent-encoded as a path segment.
fn row_url(meta: &TableMeta, values: &[Value]) -> String {
    format!("/admin/tables/{}/rows/{}", meta.name, percent_encode(&meta.row_key(values)))
}

pub fn tables_page(ctx: PageContext<'_>, tables: &[String]) -> Markup {
    let body = html! {
        h1 { "Таблицы базы данных" }
        div.grid {
            @for table in tables {
                div.card {
                    a href=(table_url(table)) { (table) }
                }
            }
        }
    };
    page("Таблицы", ctx, body)
}

pub fn table_page(ctx: PageContext<'_>, data: &TablePage, q: &str) -> Markup {
    let table = &data.meta.name;
    let body = html! {
        p { a href="/admin/tables_view" { "← Все таблицы" } }
        h1 { (table) }
        div.card {
            input type="search" name="q" value=(q) placeholder="Поиск"
                hx-get=(table_url(table))
                hx-trigger="keyup changed delay:300ms, search"
                hx-target={ "#" (GRID_ID) }
                hx-swap="outerHTML";
            " "
            button type="button"
                hx-get={ (table_url(table)) "/rows/new" }
                hx-target={ "#" (EDITOR_ID) } {
                "Добавить запись"
            }
        }
        div id=(EDITOR_ID) {}
        (grid(data, q))
    };
    page(table, ctx, body)
}

/// The grid with search-aware pagination. Reloads itself on `refresh`,
/// which the page fires for `tableChanged` events.
pub fn grid(data: &TablePage, q: &str) -> Markup {
    let meta = &data.meta;
    let table = &meta.name;
    let page_url = |page: u32| format!("{}?page={}&q={}", table_url(table), page, percent_encode(q));

    html! {
        div.card id=(GRID_ID)
            hx-get=(page_url(data.page))
            hx-trigger="refresh"
            hx-swap="outerHTML" {
            p.muted {
                "Записей: " (data.total_rows)
                " · "
                a href={ (table_url(table)) "/export?q=" (percent_encode(q)) } { "Экспорт CSV" }
            }
            div style="overflow-x: auto" {
                table {
                    thead {
                        tr {
                            @for column in &meta.columns {
                                th { (column.name) }
                            }
                            th {}
                        }
                    }
                    tbody {
                        @for values in &data.rows.rows {
                            (row(meta, &data.rows, values))
                        }
                    }
                }
            }
            @if data.total_pages > 1 {
                p {
                    @if data.page > 1 {
                        a href="#" hx-get=(page_url(data.page - 1)) hx-target={ "#" (GRID_ID) } hx-swap="outerHTML" { "← Назад" }
                        " "
                    }
                    "Страница " (data.page) " из " (data.total_pages)
                    @if data.page < data.total_pages {
                        " "
                        a href="#" hx-get=(page_url(data.page + 1)) hx-target={ "#" (GRID_ID) } hx-swap="outerHTML" { "Вперед →" }
                    }
                }
            }
        }
    }
}

/// One read-only row with edit and delete actions.
pub fn row(meta: &TableMeta, rows: &RowSet, values: &[Value]) -> Markup {
    let url = row_url(meta, values);

    html! {
        tr {
            @for (column, value) in meta.columns.iter().zip(values) {
                td {
                    (cell_text(value))
                    @if let Some(label) = rows.label(&column.name, value) {
                        " " span.muted { "(" (label) ")" }
                    }
                }
            }
            td {
                button type="button" hx-get={ (url) "/edit" } hx-target="closest tr" hx-swap="outerHTML" { "Изменить" }
                " "
                button.danger type="button"
                    hx-delete=(url)
                    hx-target="closest tr"
                    hx-swap="outerHTML"
                    hx-confirm="Удалить запись?" {
                    "Удалить"
                }
            }
        }
    }
}

/// Inline editor replacing a row. The key and generated columns are shown
/// read-only.
pub fn edit_row(
    meta: &TableMeta,
    values: &[Value],
    options: &HashMap<String, Vec<FormChoice>>,
    error: Option<&str>,
) -> Markup {
    let url = row_url(meta, values);

    html! {
        tr {
            @for (column, value) in meta.columns.iter().zip(values) {
                td {
                    @if column.generated || meta.is_key(&column.name) {
                        (cell_text(value))
                    } @else if is_secret_column(&column.name) {
                        input type="password" name=(column.name) placeholder="без изменений";
                    } @else {
                        (input(column, &render_value(value), options.get(&column.name)))
                    }
                }
            }
            td {
                @if let Some(error) = error {
                    p.error { (error) }
                }
                button type="button" hx-post=(url) hx-include="closest tr" hx-target="closest tr" hx-swap="outerHTML" { "Сохранить" }
                " "
                button type="button" hx-get=(url) hx-target="closest tr" hx-swap="outerHTML" { "Отмена" }
            }
        }
    }
}

pub fn new_row_form(meta: &TableMeta, options: &HashMap<String, Vec<FormChoice>>, error: Option<&str>) -> Markup {
    let auto_key = meta.has_auto_key();

    html! {
        div.card {
            h2 { "Новая запись" }
            @if let Some(error) = error {
                p.error { (error) }
            }
            form hx-post={ (table_url(&meta.name)) "/rows" } hx-target={ "#" (EDITOR_ID) } {
                @for column in meta.columns.iter().filter(|c| !c.generated) {
                    label {
                        (column.name)
                        " " span.muted { (column.decl_type) }
                        @if auto_key && meta.is_key(&column.name) { " " span.muted { "(пусто = авто)" } }
                    }
                    (input(column, "", options.get(&column.name)))
                }
                p {
                    button type="submit" { "Создать" }
                    " "
                    button type="button" onclick={ "document.getElementById('" (EDITOR_ID) "').innerHTML = ''" } { "Отмена" }
                }
            }
        }
    }
}

fn input(column: &ColumnMeta, current: &str, choices: Option<&Vec<FormChoice>>) -> Markup {
    let ty = column.decl_type.to_ascii_uppercase();

    html! {
        @if let Some(choices) = choices {
            select name=(column.name) {
                option value="" { "NULL" }
                @for choice in choices {
                    option value=(choice.value) selected[choice.value == current] {
                        @if choice.label == choice.value {
                            (choice.label)
                        } @else {
                            (choice.value) ": " (choice.label)
                        }
                    }
                }
            }
        } @else if is_secret_column(&column.name) {
            input type="password" name=(column.name) value=(current);
        } @else if ty.contains("BOOL") {
            select name=(column.name) {
                option value="true" selected[current == "1"] { "true" }
                option value="false" selected[current == "0"] { "false" }
            }
        } @else if ty.contains("DATE") && !ty.contains("TIME") {
            input type="date" name=(column.name) value=(current);
        } @else {
            input type="text" name=(column.name) value=(current);
        }
    }
}

fn cell_text(value: &Value) -> Markup {
    html! {
        @match value {
            Value::Null => { span.muted { "NULL" } }
            other => { (truncate(&render_value(other), 80)) }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

fn percent_encode(q: &str) -> String {
    let mut out = String::with_capacity(q.len());
    for byte in q.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> TableMeta {
        let column = |name: &str, decl: &str, pk: bool, generated: bool| ColumnMeta {
            name: name.into(),
            decl_type: decl.into(),
            not_null: false,
            primary_key: pk,
            generated,
        };
        TableMeta {
            name: "tags".into(),
            columns: vec![
                column("tag_id", "INTEGER", true, false),
                column("name", "TEXT", false, false),
                column("slug", "TEXT", false, true),
            ],
            primary_key: vec!["tag_id".into()],
            foreign_keys: Vec::new(),
        }
    }

    #[test]
    fn row_actions_address_the_key() {
        let values = vec![Value::Integer(7), Value::Text("спорт".into()), Value::Null];
        let html = row(&meta(), &RowSet::default(), &values).into_string();
        assert!(html.contains("hx-delete=\"/admin/tables/tags/rows/7\""));
        assert!(html.contains("/admin/tables/tags/rows/7/edit"));
        assert!(html.contains("NULL"));
    }

    #[test]
    fn editor_keeps_key_and_generated_read_only() {
        let values = vec![Value::Integer(7), Value::Text("a".into()), Value::Text("a".into())];
        let html = edit_row(&meta(), &values, &HashMap::new(), None).into_string();
        assert!(html.contains("name=\"name\""));
        assert!(!html.contains("name=\"tag_id\""));
        assert!(!html.contains("name=\"slug\""));
    }

    #[test]
    fn query_is_percent_encoded() {
        assert_eq!(percent_encode("a b&c"), "a%20b%26c");
        assert_eq!(percent_encode("да"), "%D0%B4%D0%B0");
    }

    #[test]
    fn composite_keys_are_encoded_into_one_segment() {
        let column = |name: &str| ColumnMeta {
            name: name.into(),
            decl_type: "INTEGER".into(),
            not_null: true,
            primary_key: true,
            generated: false,
        };
        let meta = TableMeta {
            name: "survey_tags".into(),
            columns: vec![column("survey_id"), column("tag_id")],
            primary_key: vec!["survey_id".into(), "tag_id".into()],
            foreign_keys: Vec::new(),
        };
        let html = row(&meta, &RowSet::default(), &[Value::Integer(1), Value::Integer(2)]).into_string();
        assert!(html.contains("hx-delete=\"/admin/tables/survey_tags/rows/1%2C2\""));

        let editor = edit_row(&meta, &[Value::Integer(1), Value::Integer(2)], &HashMap::new(), None).into_string();
        assert!(!editor.contains("name=\"survey_id\""));
        assert!(!editor.contains("name=\"tag_id\""));

        let form = new_row_form(&meta, &HashMap::new(), None).into_string();
        assert!(!form.contains("пусто = авто"));
    }

    #[test]
    fn long_cells_are_truncated() {
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
