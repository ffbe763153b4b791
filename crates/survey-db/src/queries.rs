use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use anyhow::Result;
use rusqlite::{Connection, Row, params, params_from_iter};
use survey_types::api::{ProfileUpdate, SurveyCreateForm};
use survey_types::models::{QuestionType, SurveyStatus, UserRole};

use crate::models::{
    AnswerRow, AnswerValue, BenchmarkRow, CleanedAnswer, CountryRow, OptionRow, QuestionRow,
    RecommendationRow, ResponseMeta, ResponseRow, SurveyCard, SurveyDetail, SurveyRow,
    TakenSurveyRow, UserRow,
};
use crate::{Database, OptionalExt, TIMESTAMP_FORMAT, now_timestamp};

/// How long a freshly created survey accepts answers.
const SURVEY_VALIDITY_DAYS: i64 = 30;
const DEFAULT_RATING_SCALE: u32 = 5;

const USER_COLUMNS: &str = "user_id, full_name, email, password_hash, birth_date, city, country_id, role, registration_date";
const SURVEY_COLUMNS: &str = "survey_id, title, description, status, author_id, created_at, start_date, end_date";
const RESPONSE_COLUMNS: &str = "response_id, survey_id, user_id, started_at, completed_at, duration_seconds, ip_address, device_type";

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, full_name: &str, password_hash: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (email, full_name, password_hash) VALUES (?1, ?2, ?3)",
                (email, full_name, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                [email],
                map_user,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, user_id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"),
                [user_id],
                map_user,
            )
            .optional()
        })
    }

    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<()> {
        let birth_date = update.birth_date.map(|d| d.format("%Y-%m-%d").to_string());
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET full_name = ?1, city = ?2, country_id = ?3, birth_date = ?4
                 WHERE user_id = ?5",
                params![update.full_name, update.city, update.country_id, birth_date, user_id],
            )?;
            Ok(())
        })
    }

    pub fn update_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE user_id = ?2",
                params![password_hash, user_id],
            )?;
            Ok(())
        })
    }

    /// Make sure an administrator account exists for `email`.
    /// Returns true when a new account was created; an existing account is
    /// promoted to admin and keeps its password.
    pub fn ensure_admin(&self, email: &str, full_name: &str, password_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE users SET role = 'admin' WHERE email = ?1",
                [email],
            )?;
            if updated > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO users (email, full_name, password_hash, role) VALUES (?1, ?2, ?3, 'admin')",
                (email, full_name, password_hash),
            )?;
            Ok(true)
        })
    }

    pub fn list_countries(&self) -> Result<Vec<CountryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT country_id, name FROM countries ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CountryRow {
                        country_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Surveys --

    /// Every survey that is not a draft, newest first, with its tags.
    pub fn list_public_surveys(&self) -> Result<Vec<SurveyCard>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SURVEY_COLUMNS} FROM surveys
                 WHERE status != 'draft'
                 ORDER BY created_at DESC, survey_id DESC"
            ))?;
            let surveys = stmt
                .query_map([], map_survey)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut tags = query_all_survey_tags(conn)?;
            Ok(surveys
                .into_iter()
                .map(|survey| SurveyCard {
                    tags: tags.remove(&survey.survey_id).unwrap_or_default(),
                    survey,
                })
                .collect())
        })
    }

    pub fn get_survey(&self, survey_id: i64) -> Result<Option<SurveyRow>> {
        self.with_conn(|conn| query_survey(conn, survey_id))
    }

    pub fn load_survey_detail(&self, survey_id: i64) -> Result<Option<SurveyDetail>> {
        self.with_conn(|conn| {
            let Some(survey) = query_survey(conn, survey_id)? else {
                return Ok(None);
            };

            let author_name: Option<String> = match survey.author_id {
                Some(author_id) => conn
                    .query_row(
                        "SELECT full_name FROM users WHERE user_id = ?1",
                        [author_id],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => None,
            };

            let mut stmt = conn.prepare(
                "SELECT t.name FROM survey_tags st
                 JOIN tags t ON t.tag_id = st.tag_id
                 WHERE st.survey_id = ?1
                 ORDER BY t.name",
            )?;
            let tags = stmt
                .query_map([survey_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let questions = query_questions(conn, survey_id)?;

            Ok(Some(SurveyDetail {
                survey,
                author_name,
                tags,
                questions,
            }))
        })
    }

    /// Create an active survey with its tags, questions and options in one
    /// transaction. Returns the new survey id.
    pub fn create_survey(&self, author_id: i64, form: &SurveyCreateForm) -> Result<i64> {
        let now = chrono::Utc::now();
        let created_at = now.format(TIMESTAMP_FORMAT).to_string();
        let end_date = (now + chrono::Duration::days(SURVEY_VALIDITY_DAYS))
            .format(TIMESTAMP_FORMAT)
            .to_string();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO surveys (title, description, status, author_id, created_at, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
                params![
                    form.title,
                    form.description,
                    SurveyStatus::Active.as_str(),
                    author_id,
                    created_at,
                    end_date,
                ],
            )?;
            let survey_id = tx.last_insert_rowid();

            let tag_names: BTreeSet<&str> = form
                .tag_names
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .collect();
            for name in tag_names {
                tx.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", [name])?;
                let tag_id: i64 =
                    tx.query_row("SELECT tag_id FROM tags WHERE name = ?1", [name], |r| r.get(0))?;
                tx.execute(
                    "INSERT OR IGNORE INTO survey_tags (survey_id, tag_id) VALUES (?1, ?2)",
                    [survey_id, tag_id],
                )?;
            }

            for (idx, question) in form.questions.iter().enumerate() {
                tx.execute(
                    "INSERT INTO questions (survey_id, question_text, question_type, position, is_required)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        survey_id,
                        question.text,
                        question.kind.as_str(),
                        (idx + 1) as i64,
                        question.is_required,
                    ],
                )?;
                let question_id = tx.last_insert_rowid();

                let option_texts: Vec<String> = match question.kind {
                    QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                        question.options.clone()
                    }
                    QuestionType::Rating => {
                        let scale = question.rating_scale.unwrap_or(DEFAULT_RATING_SCALE);
                        (1..=scale).map(|i| i.to_string()).collect()
                    }
                    QuestionType::TextAnswer => Vec::new(),
                };
                for text in option_texts {
                    tx.execute(
                        "INSERT INTO options (question_id, option_text) VALUES (?1, ?2)",
                        params![question_id, text],
                    )?;
                }
            }

            tx.commit()?;
            Ok(survey_id)
        })
    }

    /// Returns false when the survey did not exist.
    pub fn delete_survey(&self, survey_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM surveys WHERE survey_id = ?1", [survey_id])?;
            Ok(deleted > 0)
        })
    }

    pub fn count_surveys_by_author(&self, author_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM surveys WHERE author_id = ?1",
                [author_id],
                |r| r.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn list_surveys_by_author(&self, author_id: i64) -> Result<Vec<SurveyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SURVEY_COLUMNS} FROM surveys
                 WHERE author_id = ?1
                 ORDER BY created_at DESC, survey_id DESC"
            ))?;
            let rows = stmt
                .query_map([author_id], map_survey)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_taken_surveys(&self, user_id: i64) -> Result<Vec<TakenSurveyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sr.response_id, sr.survey_id, s.title, sr.started_at, sr.completed_at
                 FROM survey_responses sr
                 JOIN surveys s ON s.survey_id = sr.survey_id
                 WHERE sr.user_id = ?1
                 ORDER BY sr.started_at DESC, sr.response_id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(TakenSurveyRow {
                        response_id: row.get(0)?,
                        survey_id: row.get(1)?,
                        title: row.get(2)?,
                        started_at: row.get(3)?,
                        completed_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Active surveys the user has neither taken nor authored, ranked by how
    /// many tags they share with surveys the user completed, then by
    /// completed-response count, then by recency.
    pub fn recommend_surveys(&self, user_id: i64, limit: u32) -> Result<Vec<RecommendationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH my_tags AS (
                     SELECT DISTINCT st.tag_id
                     FROM survey_responses sr
                     JOIN survey_tags st ON st.survey_id = sr.survey_id
                     WHERE sr.user_id = ?1 AND sr.completed_at IS NOT NULL
                 )
                 SELECT s.survey_id, s.title, s.description,
                        COUNT(st.tag_id) AS shared_tags,
                        (SELECT COUNT(*) FROM survey_responses r
                            WHERE r.survey_id = s.survey_id AND r.completed_at IS NOT NULL) AS popularity
                 FROM surveys s
                 LEFT JOIN survey_tags st
                        ON st.survey_id = s.survey_id
                       AND st.tag_id IN (SELECT tag_id FROM my_tags)
                 WHERE s.status = 'active'
                   AND (s.author_id IS NULL OR s.author_id != ?1)
                   AND NOT EXISTS (
                       SELECT 1 FROM survey_responses r
                       WHERE r.survey_id = s.survey_id AND r.user_id = ?1
                   )
                 GROUP BY s.survey_id
                 ORDER BY shared_tags DESC, popularity DESC, s.created_at DESC, s.survey_id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![user_id, limit], |row| {
                    Ok(RecommendationRow {
                        survey_id: row.get(0)?,
                        title: row.get(1)?,
                        description: row.get(2)?,
                        shared_tags: row.get(3)?,
                        popularity: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Response count and mean completion time of a survey next to the
    /// averages of surveys sharing any of its tags. Always two rows.
    pub fn survey_benchmark(&self, survey_id: i64) -> Result<Vec<BenchmarkRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH category_surveys AS (
                     SELECT DISTINCT st.survey_id FROM survey_tags st
                     WHERE st.tag_id IN (SELECT tag_id FROM survey_tags WHERE survey_id = ?1)
                 ),
                 category_metrics AS (
                     SELECT sr.survey_id,
                            COUNT(*) AS resp_count,
                            AVG(sr.duration_seconds) AS avg_dur
                     FROM survey_responses sr
                     WHERE sr.survey_id IN (SELECT survey_id FROM category_surveys)
                       AND sr.completed_at IS NOT NULL
                     GROUP BY sr.survey_id
                 )
                 SELECT 'Количество ответов',
                        COALESCE((SELECT COUNT(*) FROM survey_responses WHERE survey_id = ?1), 0),
                        COALESCE((SELECT ROUND(AVG(resp_count), 1) FROM category_metrics), 0)
                 UNION ALL
                 SELECT 'Среднее время (сек)',
                        COALESCE((SELECT ROUND(AVG(duration_seconds), 1) FROM survey_responses
                                  WHERE survey_id = ?1 AND completed_at IS NOT NULL), 0),
                        COALESCE((SELECT ROUND(AVG(avg_dur), 1) FROM category_metrics), 0)",
            )?;
            let rows = stmt
                .query_map([survey_id], |row| {
                    Ok(BenchmarkRow {
                        metric: row.get(0)?,
                        survey_value: row.get(1)?,
                        category_avg: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Responses --

    pub fn find_response(&self, survey_id: i64, user_id: i64) -> Result<Option<ResponseRow>> {
        self.with_conn(|conn| query_response(conn, survey_id, user_id))
    }

    /// Record that the user opened the survey. Existing responses are left
    /// untouched. Returns the response id.
    pub fn start_response(&self, survey_id: i64, user_id: i64, meta: &ResponseMeta) -> Result<i64> {
        self.with_conn_mut(|conn| {
            if let Some(existing) = query_response(conn, survey_id, user_id)? {
                return Ok(existing.response_id);
            }
            insert_response(conn, survey_id, user_id, meta)
        })
    }

    pub fn list_answers(&self, response_id: i64) -> Result<Vec<AnswerRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT answer_id, response_id, question_id, selected_option_id, text_answer
                 FROM user_answers
                 WHERE response_id = ?1
                 ORDER BY answer_id",
            )?;
            let rows = stmt
                .query_map([response_id], |row| {
                    Ok(AnswerRow {
                        answer_id: row.get(0)?,
                        response_id: row.get(1)?,
                        question_id: row.get(2)?,
                        selected_option_id: row.get(3)?,
                        text_answer: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Persist a validated submission: find or create the user's response,
    /// mark it completed, replace multi-select answers, upsert single-valued
    /// answers and drop answers to questions left blank this time.
    pub fn save_submission(
        &self,
        survey_id: i64,
        user_id: i64,
        meta: &ResponseMeta,
        answers: &[CleanedAnswer],
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let response_id = match query_response(&tx, survey_id, user_id)? {
                Some(existing) => existing.response_id,
                None => insert_response(&tx, survey_id, user_id, meta)?,
            };

            tx.execute(
                "UPDATE survey_responses SET completed_at = ?1 WHERE response_id = ?2",
                params![now_timestamp(), response_id],
            )?;

            for answer in answers {
                match (&answer.question_type, &answer.value) {
                    (QuestionType::MultipleChoice, AnswerValue::Options(option_ids)) => {
                        tx.execute(
                            "DELETE FROM user_answers WHERE response_id = ?1 AND question_id = ?2",
                            [response_id, answer.question_id],
                        )?;
                        for option_id in option_ids {
                            tx.execute(
                                "INSERT INTO user_answers (response_id, question_id, selected_option_id)
                                 VALUES (?1, ?2, ?3)",
                                [response_id, answer.question_id, *option_id],
                            )?;
                        }
                    }
                    (_, value) => {
                        let (option_id, text): (Option<i64>, Option<&str>) = match value {
                            AnswerValue::Options(ids) => (ids.first().copied(), None),
                            AnswerValue::Text(text) => (None, Some(text.as_str())),
                        };
                        upsert_single_answer(&tx, response_id, answer.question_id, option_id, text)?;
                    }
                }
            }

            // Orphans: answers to questions that are no longer filled in
            let answered: Vec<i64> = answers.iter().map(|a| a.question_id).collect();
            if answered.is_empty() {
                tx.execute("DELETE FROM user_answers WHERE response_id = ?1", [response_id])?;
            } else {
                let placeholders: Vec<String> =
                    (2..=answered.len() + 1).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "DELETE FROM user_answers WHERE response_id = ?1 AND question_id NOT IN ({})",
                    placeholders.join(", ")
                );
                let mut values = Vec::with_capacity(answered.len() + 1);
                values.push(response_id);
                values.extend(answered);
                tx.execute(&sql, params_from_iter(values))?;
            }

            tx.commit()?;
            Ok(response_id)
        })
    }
}

fn upsert_single_answer(
    conn: &Connection,
    response_id: i64,
    question_id: i64,
    option_id: Option<i64>,
    text: Option<&str>,
) -> Result<()> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT answer_id FROM user_answers
             WHERE response_id = ?1 AND question_id = ?2
             ORDER BY answer_id LIMIT 1",
            [response_id, question_id],
            |r| r.get(0),
        )
        .optional()?;

    match existing {
        Some(answer_id) => {
            conn.execute(
                "UPDATE user_answers SET selected_option_id = ?1, text_answer = ?2 WHERE answer_id = ?3",
                params![option_id, text, answer_id],
            )?;
            // A question used to be multi-select or was answered twice
            conn.execute(
                "DELETE FROM user_answers
                 WHERE response_id = ?1 AND question_id = ?2 AND answer_id != ?3",
                [response_id, question_id, answer_id],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO user_answers (response_id, question_id, selected_option_id, text_answer)
                 VALUES (?1, ?2, ?3, ?4)",
                params![response_id, question_id, option_id, text],
            )?;
        }
    }
    Ok(())
}

fn insert_response(conn: &Connection, survey_id: i64, user_id: i64, meta: &ResponseMeta) -> Result<i64> {
    conn.execute(
        "INSERT INTO survey_responses (survey_id, user_id, started_at, ip_address, device_type)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![survey_id, user_id, now_timestamp(), meta.ip_address, meta.device_type],
    )?;
    Ok(conn.last_insert_rowid())
}

fn query_response(conn: &Connection, survey_id: i64, user_id: i64) -> Result<Option<ResponseRow>> {
    conn.query_row(
        &format!(
            "SELECT {RESPONSE_COLUMNS} FROM survey_responses
             WHERE survey_id = ?1 AND user_id = ?2
             ORDER BY response_id LIMIT 1"
        ),
        [survey_id, user_id],
        |row| {
            Ok(ResponseRow {
                response_id: row.get(0)?,
                survey_id: row.get(1)?,
                user_id: row.get(2)?,
                started_at: row.get(3)?,
                completed_at: row.get(4)?,
                duration_seconds: row.get(5)?,
                ip_address: row.get(6)?,
                device_type: row.get(7)?,
            })
        },
    )
    .optional()
}

fn query_survey(conn: &Connection, survey_id: i64) -> Result<Option<SurveyRow>> {
    conn.query_row(
        &format!("SELECT {SURVEY_COLUMNS} FROM surveys WHERE survey_id = ?1"),
        [survey_id],
        map_survey,
    )
    .optional()
}

fn query_questions(conn: &Connection, survey_id: i64) -> Result<Vec<QuestionRow>> {
    let mut stmt = conn.prepare(
        "SELECT question_id, survey_id, question_text, question_type, position, is_required
         FROM questions
         WHERE survey_id = ?1
         ORDER BY position, question_id",
    )?;
    let mut questions = stmt
        .query_map([survey_id], |row| {
            Ok(QuestionRow {
                question_id: row.get(0)?,
                survey_id: row.get(1)?,
                question_text: row.get(2)?,
                question_type: enum_column(row, 3)?,
                position: row.get(4)?,
                is_required: row.get(5)?,
                options: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    // Batch-fetch options for all questions (avoids N+1)
    let mut stmt = conn.prepare(
        "SELECT o.option_id, o.question_id, o.option_text
         FROM options o
         JOIN questions q ON q.question_id = o.question_id
         WHERE q.survey_id = ?1
         ORDER BY o.option_id",
    )?;
    let options = stmt
        .query_map([survey_id], |row| {
            Ok(OptionRow {
                option_id: row.get(0)?,
                question_id: row.get(1)?,
                option_text: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_question: HashMap<i64, Vec<OptionRow>> = HashMap::new();
    for option in options {
        by_question.entry(option.question_id).or_default().push(option);
    }
    for question in &mut questions {
        question.options = by_question.remove(&question.question_id).unwrap_or_default();
    }
    Ok(questions)
}

fn query_all_survey_tags(conn: &Connection) -> Result<HashMap<i64, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT st.survey_id, t.name FROM survey_tags st
         JOIN tags t ON t.tag_id = st.tag_id
         ORDER BY t.name",
    )?;
    let mut map: HashMap<i64, Vec<String>> = HashMap::new();
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (survey_id, name) = row?;
        map.entry(survey_id).or_default().push(name);
    }
    Ok(map)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user_id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        birth_date: row.get(4)?,
        city: row.get(5)?,
        country_id: row.get(6)?,
        role: enum_column::<UserRole>(row, 7)?,
        registration_date: row.get(8)?,
    })
}

fn map_survey(row: &Row<'_>) -> rusqlite::Result<SurveyRow> {
    Ok(SurveyRow {
        survey_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: enum_column::<SurveyStatus>(row, 3)?,
        author_id: row.get(4)?,
        created_at: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
    })
}

/// Read a TEXT column holding one of the shared enum spellings.
pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_temp;
    use survey_types::api::QuestionCreate;

    fn question(text: &str, kind: QuestionType, options: &[&str]) -> QuestionCreate {
        QuestionCreate {
            text: text.into(),
            kind,
            position: 0,
            is_required: true,
            rating_scale: None,
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    fn sample_form() -> SurveyCreateForm {
        SurveyCreateForm {
            title: "Кофе".into(),
            description: "Привычки".into(),
            tag_names: vec!["еда".into(), " еда ".into(), "".into(), "утро".into()],
            questions: vec![
                question("Пьёте кофе?", QuestionType::SingleChoice, &["Да", "Нет"]),
                question("Какой?", QuestionType::MultipleChoice, &["Эспрессо", "Латте", "Раф"]),
                question("Оцените", QuestionType::Rating, &[]),
                question("Комментарий", QuestionType::TextAnswer, &[]),
            ],
        }
    }

    #[test]
    fn create_survey_builds_questions_options_and_tags() {
        let (db, _dir) = open_temp();
        let author = db.create_user("a@example.com", "Автор", "hash").unwrap();
        let survey_id = db.create_survey(author, &sample_form()).unwrap();

        let detail = db.load_survey_detail(survey_id).unwrap().unwrap();
        assert_eq!(detail.survey.status, SurveyStatus::Active);
        assert_eq!(detail.author_name.as_deref(), Some("Автор"));
        assert_eq!(detail.tags, vec!["еда".to_string(), "утро".to_string()]);
        assert_eq!(detail.questions.len(), 4);
        assert_eq!(
            detail.questions.iter().map(|q| q.position).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(detail.questions[1].options.len(), 3);
        let rating: Vec<&str> = detail.questions[2]
            .options
            .iter()
            .map(|o| o.option_text.as_str())
            .collect();
        assert_eq!(rating, vec!["1", "2", "3", "4", "5"]);
        assert!(detail.questions[3].options.is_empty());
    }

    #[test]
    fn delete_survey_cascades_to_questions() {
        let (db, _dir) = open_temp();
        let author = db.create_user("a@example.com", "Автор", "hash").unwrap();
        let survey_id = db.create_survey(author, &sample_form()).unwrap();

        assert!(db.delete_survey(survey_id).unwrap());
        assert!(!db.delete_survey(survey_id).unwrap());

        let questions: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(questions, 0);
    }

    #[test]
    fn save_submission_replaces_and_cleans_answers() {
        let (db, _dir) = open_temp();
        let author = db.create_user("a@example.com", "Автор", "hash").unwrap();
        let taker = db.create_user("t@example.com", "Респондент", "hash").unwrap();
        let survey_id = db.create_survey(author, &sample_form()).unwrap();
        let detail = db.load_survey_detail(survey_id).unwrap().unwrap();
        let single = &detail.questions[0];
        let multi = &detail.questions[1];
        let text = &detail.questions[3];

        let first = vec![
            CleanedAnswer {
                question_id: single.question_id,
                question_type: QuestionType::SingleChoice,
                value: AnswerValue::Options(vec![single.options[0].option_id]),
            },
            CleanedAnswer {
                question_id: multi.question_id,
                question_type: QuestionType::MultipleChoice,
                value: AnswerValue::Options(vec![multi.options[0].option_id, multi.options[1].option_id]),
            },
            CleanedAnswer {
                question_id: text.question_id,
                question_type: QuestionType::TextAnswer,
                value: AnswerValue::Text("Вкусно".into()),
            },
        ];
        let meta = ResponseMeta::default();
        let response_id = db.save_submission(survey_id, taker, &meta, &first).unwrap();
        assert_eq!(db.list_answers(response_id).unwrap().len(), 4);

        // Second pass: switch the single answer, narrow the multi-select, drop the text
        let second = vec![
            CleanedAnswer {
                question_id: single.question_id,
                question_type: QuestionType::SingleChoice,
                value: AnswerValue::Options(vec![single.options[1].option_id]),
            },
            CleanedAnswer {
                question_id: multi.question_id,
                question_type: QuestionType::MultipleChoice,
                value: AnswerValue::Options(vec![multi.options[2].option_id]),
            },
        ];
        let again = db.save_submission(survey_id, taker, &meta, &second).unwrap();
        assert_eq!(again, response_id);

        let answers = db.list_answers(response_id).unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().any(|a| a.selected_option_id == Some(single.options[1].option_id)));
        assert!(answers.iter().any(|a| a.selected_option_id == Some(multi.options[2].option_id)));
        assert!(answers.iter().all(|a| a.text_answer.is_none()));

        let response = db.find_response(survey_id, taker).unwrap().unwrap();
        assert!(response.completed_at.is_some());
        assert!(response.duration_seconds.is_some());
    }

    #[test]
    fn start_response_is_idempotent() {
        let (db, _dir) = open_temp();
        let author = db.create_user("a@example.com", "Автор", "hash").unwrap();
        let survey_id = db.create_survey(author, &sample_form()).unwrap();
        let meta = ResponseMeta {
            ip_address: Some("10.0.0.1".into()),
            device_type: Some("Desktop".into()),
        };

        let first = db.start_response(survey_id, author, &meta).unwrap();
        let second = db.start_response(survey_id, author, &meta).unwrap();
        assert_eq!(first, second);

        let response = db.find_response(survey_id, author).unwrap().unwrap();
        assert_eq!(response.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(response.completed_at.is_none());
    }

    #[test]
    fn recommendations_prefer_shared_tags_and_skip_taken() {
        let (db, _dir) = open_temp();
        let author = db.create_user("a@example.com", "Автор", "hash").unwrap();
        let user = db.create_user("u@example.com", "Юзер", "hash").unwrap();

        let mut taken = sample_form();
        taken.tag_names = vec!["спорт".into()];
        let taken_id = db.create_survey(author, &taken).unwrap();

        let mut related = sample_form();
        related.title = "Бег".into();
        related.tag_names = vec!["спорт".into()];
        let related_id = db.create_survey(author, &related).unwrap();

        let mut unrelated = sample_form();
        unrelated.title = "Книги".into();
        unrelated.tag_names = vec!["чтение".into()];
        let unrelated_id = db.create_survey(author, &unrelated).unwrap();

        db.save_submission(taken_id, user, &ResponseMeta::default(), &[]).unwrap();

        let recs = db.recommend_surveys(user, 10).unwrap();
        let ids: Vec<i64> = recs.iter().map(|r| r.survey_id).collect();
        assert_eq!(ids, vec![related_id, unrelated_id]);
        assert_eq!(recs[0].shared_tags, 1);
    }

    #[test]
    fn benchmark_always_returns_two_rows() {
        let (db, _dir) = open_temp();
        let author = db.create_user("a@example.com", "Автор", "hash").unwrap();
        let survey_id = db.create_survey(author, &sample_form()).unwrap();

        let rows = db.survey_benchmark(survey_id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].survey_value, 0.0);
        assert_eq!(rows[1].category_avg, 0.0);
    }

    #[test]
    fn ensure_admin_promotes_existing_user() {
        let (db, _dir) = open_temp();
        db.create_user("boss@example.com", "Boss", "hash").unwrap();

        assert!(!db.ensure_admin("boss@example.com", "Boss", "other").unwrap());
        let user = db.get_user_by_email("boss@example.com").unwrap().unwrap();
        assert!(user.is_admin());
        assert_eq!(user.password_hash, "hash");

        assert!(db.ensure_admin("new@example.com", "New", "h2").unwrap());
    }
}
