//! Generic table console: runtime introspection and CRUD over any table in
//! the database, driven by `PRAGMA table_xinfo` / `foreign_key_list`.
//!
//! Table names always come from `sqlite_master`, never straight from the
//! request, and every value goes through a bound parameter.

use std::collections::HashMap;

use anyhow::{Result, bail};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use survey_types::models::{QuestionType, SurveyStatus, UserRole};

use crate::{Database, OptionalExt};

/// Columns tried, in order, when looking for a human-readable label of a row.
pub const DISPLAY_COLUMNS: [&str; 8] = [
    "full_name",
    "title",
    "name",
    "label",
    "email",
    "question_text",
    "option_text",
    "text",
];

/// Joins the parts of a composite key in row addresses.
const KEY_SEPARATOR: char = ',';

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
const FK_CHOICE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type as written in the schema, e.g. `INTEGER`, `DATE`.
    pub decl_type: String,
    pub not_null: bool,
    pub primary_key: bool,
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub table: String,
    pub to_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    /// Primary key columns in key order; more than one for composite keys.
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableMeta {
    /// Columns that address and order rows: the whole primary key, else the
    /// first column.
    pub fn key_columns(&self) -> Vec<&str> {
        if self.primary_key.is_empty() {
            self.columns.iter().take(1).map(|c| c.name.as_str()).collect()
        } else {
            self.primary_key.iter().map(String::as_str).collect()
        }
    }

    pub fn is_key(&self, column: &str) -> bool {
        self.key_columns().contains(&column)
    }

    /// A single `INTEGER PRIMARY KEY`: left empty on insert, SQLite picks it.
    pub fn has_auto_key(&self) -> bool {
        match self.primary_key.as_slice() {
            [only] => self
                .column(only)
                .is_some_and(|c| c.decl_type.eq_ignore_ascii_case("INTEGER")),
            _ => false,
        }
    }

    /// Address of a row in URLs: key values in key order, joined by `,`.
    /// `%` and `,` inside a value are escaped so the split is unambiguous.
    pub fn row_key(&self, values: &[Value]) -> String {
        self.key_columns()
            .into_iter()
            .map(|name| {
                let value = self
                    .columns
                    .iter()
                    .position(|c| c.name == name)
                    .and_then(|idx| values.get(idx))
                    .map(render_value)
                    .unwrap_or_default();
                escape_key_part(&value)
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Typed key values of a row address, or `None` when the number of parts
    /// does not match the key.
    pub fn parse_key(&self, key: &str) -> Option<Vec<Value>> {
        let columns = self.key_columns();
        let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
        if parts.len() != columns.len() {
            return None;
        }
        columns
            .into_iter()
            .zip(parts)
            .map(|(name, part)| {
                let decl = self.column(name).map(|c| c.decl_type.as_str()).unwrap_or("");
                Some(coerce_value(decl, &unescape_key_part(part)?))
            })
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// `"a" = ?1 AND "b" = ?2` over the key columns.
    fn key_filter(&self) -> String {
        self.key_columns()
            .into_iter()
            .enumerate()
            .map(|(i, name)| format!("{} = ?{}", quote_ident(name), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn order_by(&self) -> String {
        self.key_columns()
            .into_iter()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Rows in column order plus resolved labels for foreign key values.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub rows: Vec<Vec<Value>>,
    /// column -> rendered key value -> label of the referenced row
    pub fk_labels: HashMap<String, HashMap<String, String>>,
}

impl RowSet {
    pub fn label(&self, column: &str, value: &Value) -> Option<&str> {
        self.fk_labels
            .get(column)?
            .get(&render_value(value))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct TablePage {
    pub meta: TableMeta,
    pub rows: RowSet,
    pub total_rows: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// One entry of a dropdown in the row editor.
#[derive(Debug, Clone, PartialEq)]
pub struct FormChoice {
    pub value: String,
    pub label: String,
}

impl Database {
    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.with_conn(query_tables)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.list_tables()?.iter().any(|t| t == table))
    }

    pub fn table_meta(&self, table: &str) -> Result<Option<TableMeta>> {
        self.with_conn(|conn| {
            if !query_tables(conn)?.iter().any(|t| t == table) {
                return Ok(None);
            }
            load_meta(conn, table).map(Some)
        })
    }

    /// One page of a table, 1-based, optionally filtered by a substring
    /// search over every column and over the labels of referenced rows.
    pub fn page(&self, table: &str, page: u32, limit: u32, q: Option<&str>) -> Result<TablePage> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let page = page.max(1);

        self.with_conn(|conn| {
            let meta = require_meta(conn, table)?;
            let (where_clause, pattern) = search_clause(conn, &meta, q)?;
            let search_params: Vec<Value> = pattern.into_iter().map(Value::Text).collect();

            let total_rows: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {} {}", quote_ident(table), where_clause),
                params_from_iter(search_params.iter()),
                |r| r.get(0),
            )?;

            let offset = i64::from(page - 1) * i64::from(limit);
            let sql = format!(
                "SELECT {} FROM {} {} ORDER BY {} LIMIT {} OFFSET {}",
                meta.select_list(),
                quote_ident(table),
                where_clause,
                meta.order_by(),
                limit,
                offset
            );
            let rows = query_rows(conn, &sql, &search_params, meta.columns.len())?;
            let fk_labels = resolve_labels(conn, &meta, &rows)?;

            let total_pages = ((total_rows + i64::from(limit) - 1) / i64::from(limit)) as u32;
            Ok(TablePage {
                meta,
                rows: RowSet { rows, fk_labels },
                total_rows,
                page,
                limit,
                total_pages,
            })
        })
    }

    /// A single row addressed by its [`TableMeta::row_key`].
    pub fn fetch_row(&self, table: &str, key: &str) -> Result<Option<RowSet>> {
        self.with_conn(|conn| {
            let meta = require_meta(conn, table)?;
            let Some(key_values) = meta.parse_key(key) else {
                return Ok(None);
            };
            let sql = format!(
                "SELECT {} FROM {} WHERE {}",
                meta.select_list(),
                quote_ident(table),
                meta.key_filter()
            );
            let rows = query_rows(conn, &sql, &key_values, meta.columns.len())?;
            if rows.is_empty() {
                return Ok(None);
            }
            let fk_labels = resolve_labels(conn, &meta, &rows)?;
            Ok(Some(RowSet { rows, fk_labels }))
        })
    }

    /// Dropdown choices per column: fixed lists for enum-like columns and
    /// up to 100 rows of each referenced table.
    pub fn form_options(&self, table: &str) -> Result<HashMap<String, Vec<FormChoice>>> {
        self.with_conn(|conn| {
            let meta = require_meta(conn, table)?;
            let mut options = HashMap::new();

            for column in &meta.columns {
                let values: Option<Vec<&str>> = match column.name.as_str() {
                    "role" => Some(UserRole::ALL.iter().map(|v| v.as_str()).collect()),
                    "status" => Some(SurveyStatus::ALL.iter().map(|v| v.as_str()).collect()),
                    "question_type" => Some(QuestionType::ALL.iter().map(|v| v.as_str()).collect()),
                    _ => None,
                };
                if let Some(values) = values {
                    let choices = values
                        .into_iter()
                        .map(|v| FormChoice {
                            value: v.to_string(),
                            label: v.to_string(),
                        })
                        .collect();
                    options.insert(column.name.clone(), choices);
                }
            }

            for fk in &meta.foreign_keys {
                let display = display_column(conn, &fk.table)?.unwrap_or_else(|| fk.to_column.clone());
                let sql = format!(
                    "SELECT {}, {} FROM {} ORDER BY {} LIMIT {}",
                    quote_ident(&fk.to_column),
                    quote_ident(&display),
                    quote_ident(&fk.table),
                    quote_ident(&fk.to_column),
                    FK_CHOICE_LIMIT
                );
                let rows = query_rows(conn, &sql, &[], 2)?;
                let choices = rows
                    .into_iter()
                    .map(|row| FormChoice {
                        value: render_value(&row[0]),
                        label: render_value(&row[1]),
                    })
                    .collect();
                options.insert(fk.column.clone(), choices);
            }

            Ok(options)
        })
    }

    /// Insert a row from raw form values. Unknown and generated columns are
    /// ignored, as is an empty auto key. Returns the new rowid.
    pub fn insert_row(&self, table: &str, values: &[(String, String)]) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let meta = require_meta(conn, table)?;
            let auto_key = meta.has_auto_key();

            let mut columns = Vec::new();
            let mut params = Vec::new();
            for (name, raw) in values {
                let Some(column) = meta.column(name) else {
                    continue;
                };
                if column.generated || (auto_key && meta.is_key(name) && raw.is_empty()) {
                    continue;
                }
                if columns.contains(&quote_ident(name)) {
                    continue;
                }
                columns.push(quote_ident(name));
                params.push(coerce_value(&column.decl_type, raw));
            }

            if columns.is_empty() {
                conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table)), [])?;
            } else {
                let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    quote_ident(table),
                    columns.join(", "),
                    placeholders.join(", ")
                );
                conn.execute(&sql, params_from_iter(params.iter()))?;
            }
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update a row from raw form values. Key columns and generated columns
    /// are never written. Returns false when no row matched.
    pub fn update_row(&self, table: &str, key: &str, values: &[(String, String)]) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let meta = require_meta(conn, table)?;
            let Some(mut params) = meta.parse_key(key) else {
                return Ok(false);
            };

            let mut sets = Vec::new();
            for (name, raw) in values {
                let Some(column) = meta.column(name) else {
                    continue;
                };
                if column.generated || meta.is_key(name) {
                    continue;
                }
                params.push(coerce_value(&column.decl_type, raw));
                sets.push(format!("{} = ?{}", quote_ident(name), params.len()));
            }

            if sets.is_empty() {
                let exists: Option<i64> = conn
                    .query_row(
                        &format!("SELECT 1 FROM {} WHERE {}", quote_ident(table), meta.key_filter()),
                        params_from_iter(params.iter()),
                        |r| r.get(0),
                    )
                    .optional()?;
                return Ok(exists.is_some());
            }

            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                quote_ident(table),
                sets.join(", "),
                meta.key_filter()
            );
            let updated = conn.execute(&sql, params_from_iter(params.iter()))?;
            Ok(updated > 0)
        })
    }

    /// Delete exactly the row addressed by `key`; a partial composite key
    /// matches nothing.
    pub fn delete_row(&self, table: &str, key: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let meta = require_meta(conn, table)?;
            let Some(key_values) = meta.parse_key(key) else {
                return Ok(false);
            };
            let sql = format!("DELETE FROM {} WHERE {}", quote_ident(table), meta.key_filter());
            let deleted = conn.execute(&sql, params_from_iter(key_values.iter()))?;
            Ok(deleted > 0)
        })
    }

    /// A slice of the filtered table for CSV export, in key order.
    pub fn export_batch(&self, table: &str, q: Option<&str>, offset: u64, limit: u32) -> Result<Vec<Vec<Value>>> {
        self.with_conn(|conn| {
            let meta = require_meta(conn, table)?;
            let (where_clause, pattern) = search_clause(conn, &meta, q)?;
            let search_params: Vec<Value> = pattern.into_iter().map(Value::Text).collect();
            let sql = format!(
                "SELECT {} FROM {} {} ORDER BY {} LIMIT {} OFFSET {}",
                meta.select_list(),
                quote_ident(table),
                where_clause,
                meta.order_by(),
                limit,
                offset
            );
            query_rows(conn, &sql, &search_params, meta.columns.len())
        })
    }
}

/// Convert a raw form value to an SQLite value according to the column's
/// declared type. Values that fail to parse are stored as text and left for
/// the database constraints to judge.
pub fn coerce_value(decl_type: &str, raw: &str) -> Value {
    if raw.is_empty() || raw == "NULL" {
        return Value::Null;
    }
    let ty = decl_type.to_ascii_uppercase();

    if ty.contains("INT") {
        if let Ok(v) = raw.trim().parse::<i64>() {
            return Value::Integer(v);
        }
    } else if ty.contains("BOOL") {
        return Value::Integer(i64::from(raw.trim().eq_ignore_ascii_case("true")));
    } else if ty.contains("DATE") && !ty.contains("TIME") {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            return Value::Text(date.format("%Y-%m-%d").to_string());
        }
    } else if ty.contains("REAL") || ty.contains("FLOA") || ty.contains("DOUB") {
        if let Ok(v) = raw.trim().parse::<f64>() {
            return Value::Real(v);
        }
    }
    Value::Text(raw.to_string())
}

/// Text form of a cell for HTML, CSV and key lookups. NULL renders empty.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(v) => v.clone(),
        Value::Blob(v) => format!("<{} bytes>", v.len()),
    }
}

/// Columns holding credentials. Console writes hash their values and the
/// editor never shows them.
pub fn is_secret_column(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.contains("password") || name.contains("hash")
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn escape_key_part(value: &str) -> String {
    value.replace('%', "%25").replace(KEY_SEPARATOR, "%2C")
}

/// Inverse of [`escape_key_part`]; any other `%` sequence is malformed.
fn unescape_key_part(part: &str) -> Option<String> {
    let mut out = String::with_capacity(part.len());
    let mut rest = part;
    while let Some(idx) = rest.find('%') {
        out.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 3)?;
        if code.eq_ignore_ascii_case("2C") {
            out.push(KEY_SEPARATOR);
        } else if code == "25" {
            out.push('%');
        } else {
            return None;
        }
        rest = &rest[idx + 3..];
    }
    out.push_str(rest);
    Some(out)
}

fn query_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != 'schema_version'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn require_meta(conn: &Connection, table: &str) -> Result<TableMeta> {
    if !query_tables(conn)?.iter().any(|t| t == table) {
        bail!("unknown table '{}'", table);
    }
    load_meta(conn, table)
}

fn load_meta(conn: &Connection, table: &str) -> Result<TableMeta> {
    // hidden: 0 = ordinary, 1 = hidden, 2/3 = generated (virtual/stored)
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", pk, hidden
         FROM pragma_table_xinfo(?1)
         WHERE hidden != 1
         ORDER BY cid",
    )?;
    let columns = stmt
        .query_map([table], |row| {
            let hidden: i64 = row.get(4)?;
            Ok(ColumnMeta {
                name: row.get(0)?,
                decl_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                primary_key: row.get::<_, i64>(3)? > 0,
                generated: hidden == 2 || hidden == 3,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let primary_key = primary_key_of(conn, table)?;

    let mut stmt = conn.prepare(
        "SELECT \"from\", \"table\", \"to\"
         FROM pragma_foreign_key_list(?1)
         WHERE seq = 0
         ORDER BY id",
    )?;
    let raw_fks = stmt
        .query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut foreign_keys = Vec::with_capacity(raw_fks.len());
    for (column, remote, to) in raw_fks {
        let to_column = match to {
            Some(to) => to,
            None => primary_key_of(conn, &remote)?
                .into_iter()
                .next()
                .unwrap_or_else(|| "rowid".to_string()),
        };
        foreign_keys.push(ForeignKey {
            column,
            table: remote,
            to_column,
        });
    }

    Ok(TableMeta {
        name: table.to_string(),
        columns,
        primary_key,
        foreign_keys,
    })
}

fn primary_key_of(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

/// First of [`DISPLAY_COLUMNS`] present in `table`.
pub(crate) fn display_column(conn: &Connection, table: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(DISPLAY_COLUMNS
        .iter()
        .find(|candidate| names.iter().any(|n| n == *candidate))
        .map(|c| c.to_string()))
}

/// WHERE clause plus its `%q%` pattern, or an empty clause without a query.
/// `%` and `_` typed by the user match literally.
fn search_clause(conn: &Connection, meta: &TableMeta, q: Option<&str>) -> Result<(String, Option<String>)> {
    let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) else {
        return Ok((String::new(), None));
    };

    let mut filters: Vec<String> = meta
        .columns
        .iter()
        .map(|c| format!("CAST({} AS TEXT) LIKE ?1 ESCAPE '\\'", quote_ident(&c.name)))
        .collect();

    for fk in &meta.foreign_keys {
        if let Some(display) = display_column(conn, &fk.table)? {
            filters.push(format!(
                "{} IN (SELECT {} FROM {} WHERE CAST({} AS TEXT) LIKE ?1 ESCAPE '\\')",
                quote_ident(&fk.column),
                quote_ident(&fk.to_column),
                quote_ident(&fk.table),
                quote_ident(&display)
            ));
        }
    }

    Ok((format!("WHERE {}", filters.join(" OR ")), Some(format!("%{}%", escape_like(q)))))
}

fn escape_like(q: &str) -> String {
    q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn query_rows(conn: &Connection, sql: &str, params: &[Value], width: usize) -> Result<Vec<Vec<Value>>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            (0..width).map(|i| row.get::<_, Value>(i)).collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn resolve_labels(
    conn: &Connection,
    meta: &TableMeta,
    rows: &[Vec<Value>],
) -> Result<HashMap<String, HashMap<String, String>>> {
    let mut resolved = HashMap::new();
    if rows.is_empty() {
        return Ok(resolved);
    }

    for fk in &meta.foreign_keys {
        let Some(idx) = meta.columns.iter().position(|c| c.name == fk.column) else {
            continue;
        };
        let mut ids: Vec<Value> = rows
            .iter()
            .map(|row| row[idx].clone())
            .filter(|v| *v != Value::Null)
            .collect();
        ids.dedup();
        if ids.is_empty() {
            continue;
        }

        let display = display_column(conn, &fk.table)?.unwrap_or_else(|| fk.to_column.clone());
        let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT {}, {} FROM {} WHERE {} IN ({})",
            quote_ident(&fk.to_column),
            quote_ident(&display),
            quote_ident(&fk.table),
            quote_ident(&fk.to_column),
            placeholders.join(", ")
        );
        let labels: HashMap<String, String> = query_rows(conn, &sql, &ids, 2)?
            .into_iter()
            .map(|row| (render_value(&row[0]), render_value(&row[1])))
            .collect();
        resolved.insert(fk.column.clone(), labels);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_temp;

    fn seed(db: &Database) {
        db.with_conn_mut(|conn| {
            Ok(conn.execute_batch(
                "INSERT INTO users (user_id, full_name, email, password_hash) VALUES
                    (1, 'Анна Петрова', 'anna@x.io', 'h'),
                    (2, 'Борис', 'boris@x.io', 'h');
                 INSERT INTO surveys (survey_id, title, status, author_id) VALUES
                    (1, 'Про кофе', 'active', 1),
                    (2, 'Про чай', 'draft', 2);
                 INSERT INTO survey_responses (survey_id, user_id, started_at, completed_at) VALUES
                    (1, 2, '2025-01-01 10:00:00', '2025-01-01 10:01:00');",
            )?)
        })
        .unwrap();
    }

    #[test]
    fn coerce_follows_declared_type() {
        assert_eq!(coerce_value("INTEGER", ""), Value::Null);
        assert_eq!(coerce_value("TEXT", "NULL"), Value::Null);
        assert_eq!(coerce_value("INTEGER", " 42 "), Value::Integer(42));
        assert_eq!(coerce_value("INTEGER", "abc"), Value::Text("abc".into()));
        assert_eq!(coerce_value("BOOLEAN", "true"), Value::Integer(1));
        assert_eq!(coerce_value("BOOLEAN", "no"), Value::Integer(0));
        assert_eq!(coerce_value("DATE", "2001-02-03"), Value::Text("2001-02-03".into()));
        assert_eq!(coerce_value("DATE", "03.02.2001"), Value::Text("03.02.2001".into()));
        assert_eq!(coerce_value("REAL", "1.5"), Value::Real(1.5));
        assert_eq!(
            coerce_value("TIMESTAMP", "2025-01-01 10:00:00"),
            Value::Text("2025-01-01 10:00:00".into())
        );
    }

    #[test]
    fn credential_columns_are_secret() {
        assert!(is_secret_column("password_hash"));
        assert!(is_secret_column("Password"));
        assert!(!is_secret_column("email"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn introspection_reports_keys_and_generated_columns() {
        let (db, _dir) = open_temp();
        let meta = db.table_meta("survey_responses").unwrap().unwrap();

        assert_eq!(meta.key_columns(), vec!["response_id"]);
        assert!(meta.has_auto_key());
        let duration = meta.column("duration_seconds").unwrap();
        assert!(duration.generated);
        assert!(!meta.column("started_at").unwrap().generated);

        let fk = meta.foreign_key("survey_id").unwrap();
        assert_eq!(fk.table, "surveys");
        assert_eq!(fk.to_column, "survey_id");

        assert!(db.table_meta("no_such_table").unwrap().is_none());
        assert!(db.table_exists("users").unwrap());
    }

    #[test]
    fn page_resolves_labels_and_searches_through_foreign_keys() {
        let (db, _dir) = open_temp();
        seed(&db);

        let page = db.page("surveys", 1, 20, None).unwrap();
        assert_eq!(page.total_rows, 2);
        assert_eq!(page.total_pages, 1);
        let author_idx = page.meta.columns.iter().position(|c| c.name == "author_id").unwrap();
        let first = &page.rows.rows[0];
        assert_eq!(page.rows.label("author_id", &first[author_idx]), Some("Анна Петрова"));

        // Matches surveys authored by "Борис" only through the users table
        let found = db.page("surveys", 1, 20, Some("Борис")).unwrap();
        assert_eq!(found.total_rows, 1);
        assert_eq!(render_value(&found.rows.rows[0][1]), "Про чай");

        let paged = db.page("surveys", 2, 1, None).unwrap();
        assert_eq!(paged.total_pages, 2);
        assert_eq!(paged.rows.rows.len(), 1);
    }

    #[test]
    fn crud_round_trip_skips_key_and_generated_columns() {
        let (db, _dir) = open_temp();
        seed(&db);

        let id = db
            .insert_row(
                "countries",
                &[
                    ("country_id".into(), "".into()),
                    ("name".into(), "Франция".into()),
                    ("csrf_token".into(), "ignored".into()),
                ],
            )
            .unwrap();
        let row = db.fetch_row("countries", &id.to_string()).unwrap().unwrap();
        assert_eq!(render_value(&row.rows[0][1]), "Франция");

        assert!(db
            .update_row("countries", &id.to_string(), &[("name".into(), "Франция (FR)".into())])
            .unwrap());
        let row = db.fetch_row("countries", &id.to_string()).unwrap().unwrap();
        assert_eq!(render_value(&row.rows[0][1]), "Франция (FR)");

        // The generated duration is recomputed, never written
        assert!(db
            .update_row(
                "survey_responses",
                "1",
                &[
                    ("completed_at".into(), "2025-01-01 10:02:00".into()),
                    ("duration_seconds".into(), "1".into()),
                ],
            )
            .unwrap());
        let meta = db.table_meta("survey_responses").unwrap().unwrap();
        let idx = meta.columns.iter().position(|c| c.name == "duration_seconds").unwrap();
        let row = db.fetch_row("survey_responses", "1").unwrap().unwrap();
        match &row.rows[0][idx] {
            Value::Real(v) => assert!((v - 120.0).abs() < 0.01),
            other => panic!("unexpected duration {:?}", other),
        }

        assert!(db.delete_row("countries", &id.to_string()).unwrap());
        assert!(db.fetch_row("countries", &id.to_string()).unwrap().is_none());
        assert!(!db.delete_row("countries", &id.to_string()).unwrap());
    }

    #[test]
    fn composite_keys_address_a_single_row() {
        let (db, _dir) = open_temp();
        seed(&db);
        db.with_conn_mut(|conn| {
            Ok(conn.execute_batch(
                "INSERT INTO tags (tag_id, name) VALUES (1, 'кофе'), (2, 'чай'), (3, 'утро');
                 INSERT INTO survey_tags (survey_id, tag_id) VALUES (1, 1), (1, 2), (1, 3);",
            )?)
        })
        .unwrap();

        let meta = db.table_meta("survey_tags").unwrap().unwrap();
        assert_eq!(meta.key_columns(), vec!["survey_id", "tag_id"]);
        assert!(!meta.has_auto_key());
        assert_eq!(meta.row_key(&[Value::Integer(1), Value::Integer(2)]), "1,2");

        // Half a key matches nothing
        assert!(!db.delete_row("survey_tags", "1").unwrap());
        assert!(db.fetch_row("survey_tags", "1").unwrap().is_none());

        let row = db.fetch_row("survey_tags", "1,2").unwrap().unwrap();
        assert_eq!(row.rows.len(), 1);
        assert!(db.delete_row("survey_tags", "1,2").unwrap());

        let left = db.page("survey_tags", 1, 20, None).unwrap();
        assert_eq!(left.total_rows, 2);
        let keys: Vec<String> = left.rows.rows.iter().map(|r| left.meta.row_key(r)).collect();
        assert_eq!(keys, vec!["1,1", "1,3"]);
    }

    #[test]
    fn text_keys_with_separators_survive() {
        let meta = TableMeta {
            name: "labels".into(),
            columns: vec![ColumnMeta {
                name: "code".into(),
                decl_type: "TEXT".into(),
                not_null: true,
                primary_key: true,
                generated: false,
            }],
            primary_key: vec!["code".into()],
            foreign_keys: Vec::new(),
        };
        let key = meta.row_key(&[Value::Text("a,b%c".into())]);
        assert_eq!(key, "a%2Cb%25c");
        assert_eq!(meta.parse_key(&key), Some(vec![Value::Text("a,b%c".into())]));
        assert_eq!(meta.parse_key("a,b"), None);
        assert_eq!(meta.parse_key("a%zz"), None);
    }

    #[test]
    fn search_wildcards_match_literally() {
        let (db, _dir) = open_temp();
        db.with_conn_mut(|conn| {
            Ok(conn.execute_batch("INSERT INTO tags (name) VALUES ('100%'), ('1000'), ('a_b'), ('axb');")?)
        })
        .unwrap();

        assert_eq!(db.page("tags", 1, 20, Some("0%")).unwrap().total_rows, 1);
        assert_eq!(db.page("tags", 1, 20, Some("a_b")).unwrap().total_rows, 1);
        assert_eq!(db.page("tags", 1, 20, Some("a")).unwrap().total_rows, 2);
    }

    #[test]
    fn migration_bookkeeping_is_not_a_console_table() {
        let (db, _dir) = open_temp();
        let tables = db.list_tables().unwrap();
        assert!(tables.iter().any(|t| t == "users"));
        assert!(!tables.iter().any(|t| t == "schema_version"));
        assert!(db.table_meta("schema_version").unwrap().is_none());
    }

    #[test]
    fn database_constraints_surface_as_errors() {
        let (db, _dir) = open_temp();
        seed(&db);
        let result = db.update_row("users", "1", &[("role".into(), "superuser".into())]);
        assert!(result.is_err());
    }

    #[test]
    fn form_options_cover_enums_and_references() {
        let (db, _dir) = open_temp();
        seed(&db);

        let options = db.form_options("surveys").unwrap();
        let statuses: Vec<&str> = options["status"].iter().map(|c| c.value.as_str()).collect();
        assert_eq!(statuses, vec!["draft", "active", "completed", "archived"]);
        assert_eq!(
            options["author_id"][1],
            FormChoice { value: "2".into(), label: "Борис".into() }
        );
    }

    #[test]
    fn export_batches_respect_filter() {
        let (db, _dir) = open_temp();
        seed(&db);

        let all = db.export_batch("users", None, 0, 500).unwrap();
        assert_eq!(all.len(), 2);
        let filtered = db.export_batch("users", Some("anna"), 0, 500).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(db.export_batch("users", None, 2, 500).unwrap().is_empty());
        assert!(db.export_batch("missing", None, 0, 500).is_err());
    }
}
