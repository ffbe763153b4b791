//! Aggregate queries behind the admin dashboard.
//!
//! Every statistic is computed by SQLite; callers only reshape the rows for
//! charts.

use anyhow::Result;
use rusqlite::params;

use crate::Database;

/// Age brackets in display order. Responses from users without a birth date
/// fall into the last one.
pub const AGE_BRACKETS: [&str; 6] = ["До 18", "18-24", "25-34", "35-44", "45+", "Не указано"];

const TOP_TAGS_LIMIT: u32 = 7;

/// Time window applied to the weekday/hour heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeatmapPeriod {
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl HeatmapPeriod {
    /// Accepts `7d`, `30d`, `year` and `all`; anything else means `all`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "7d" => Self::Week,
            "30d" => Self::Month,
            "year" => Self::Year,
            _ => Self::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Year => "year",
            Self::All => "all",
        }
    }

    fn filter_sql(self) -> &'static str {
        match self {
            Self::Week => "started_at >= datetime('now', '-7 days')",
            Self::Month => "started_at >= datetime('now', '-30 days')",
            Self::Year => "strftime('%Y', started_at) = strftime('%Y', 'now')",
            Self::All => "started_at IS NOT NULL",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminSummary {
    pub total_users: i64,
    pub unique_users_started: i64,
    pub unique_users_completed: i64,
    pub total_surveys: i64,
    pub total_responses: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

/// Responses started on an ISO weekday (Mon = 1) during an hour (0..24).
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapCell {
    pub weekday: u32,
    pub hour: u32,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgeBracketCount {
    pub bracket: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyRow {
    pub response_id: i64,
    pub survey_id: i64,
    pub survey_title: String,
    pub user_name: String,
    pub user_email: String,
    pub user_sec: f64,
    pub avg_sec: f64,
    pub std_sec: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CohortCell {
    /// Registration month, `YYYY-MM`.
    pub cohort: String,
    pub cohort_size: i64,
    pub month_lag: i64,
    pub retention_pct: f64,
}

impl Database {
    pub fn admin_summary(&self) -> Result<AdminSummary> {
        self.with_conn(|conn| {
            let summary = conn.query_row(
                "SELECT total_users, unique_users_started, unique_users_completed,
                        total_surveys, total_responses
                 FROM v_admin_summary",
                [],
                |row| {
                    Ok(AdminSummary {
                        total_users: row.get(0)?,
                        unique_users_started: row.get(1)?,
                        unique_users_completed: row.get(2)?,
                        total_surveys: row.get(3)?,
                        total_responses: row.get(4)?,
                    })
                },
            )?;
            Ok(summary)
        })
    }

    /// Responses started per calendar day, optionally bounded (inclusive)
    /// by `YYYY-MM-DD` dates.
    pub fn daily_activity(&self, start: Option<&str>, end: Option<&str>) -> Result<Vec<DailyCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date(started_at) AS day, COUNT(*)
                 FROM survey_responses
                 WHERE (?1 IS NULL OR date(started_at) >= ?1)
                   AND (?2 IS NULL OR date(started_at) <= ?2)
                 GROUP BY day
                 ORDER BY day",
            )?;
            let rows = stmt
                .query_map(params![start, end], |row| {
                    Ok(DailyCount {
                        date: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Most popular tags by completed responses.
    pub fn top_tags(&self) -> Result<Vec<TagCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.name, COUNT(sr.response_id) AS popularity
                 FROM survey_responses sr
                 JOIN survey_tags st ON st.survey_id = sr.survey_id
                 JOIN tags t ON t.tag_id = st.tag_id
                 WHERE sr.completed_at IS NOT NULL
                 GROUP BY t.name
                 ORDER BY popularity DESC, t.name
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([TOP_TAGS_LIMIT], |row| {
                    Ok(TagCount {
                        name: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Non-empty weekday/hour buckets of response starts.
    pub fn heatmap(&self, period: HeatmapPeriod) -> Result<Vec<HeatmapCell>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT ((CAST(strftime('%w', started_at) AS INTEGER) + 6) % 7) + 1 AS dow,
                        CAST(strftime('%H', started_at) AS INTEGER) AS hour,
                        COUNT(*)
                 FROM survey_responses
                 WHERE {}
                 GROUP BY dow, hour",
                period.filter_sql()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(HeatmapCell {
                        weekday: row.get(0)?,
                        hour: row.get(1)?,
                        count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Completed responses grouped by the respondent's age today, in
    /// [`AGE_BRACKETS`] order. Empty brackets are omitted.
    pub fn age_brackets(&self) -> Result<Vec<AgeBracketCount>> {
        let mut rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT CASE
                            WHEN age IS NULL THEN 'Не указано'
                            WHEN age < 18 THEN 'До 18'
                            WHEN age BETWEEN 18 AND 24 THEN '18-24'
                            WHEN age BETWEEN 25 AND 34 THEN '25-34'
                            WHEN age BETWEEN 35 AND 44 THEN '35-44'
                            ELSE '45+'
                        END AS bracket,
                        COUNT(*)
                 FROM (
                     SELECT CASE WHEN u.birth_date IS NULL THEN NULL ELSE
                                CAST(strftime('%Y', 'now') AS INTEGER)
                                - CAST(strftime('%Y', u.birth_date) AS INTEGER)
                                - (strftime('%m-%d', 'now') < strftime('%m-%d', u.birth_date))
                            END AS age
                     FROM survey_responses sr
                     JOIN users u ON u.user_id = sr.user_id
                     WHERE sr.completed_at IS NOT NULL
                 )
                 GROUP BY bracket",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(AgeBracketCount {
                        bracket: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.sort_by_key(|r| {
            AGE_BRACKETS
                .iter()
                .position(|b| *b == r.bracket)
                .unwrap_or(AGE_BRACKETS.len())
        });
        Ok(rows)
    }

    /// Completed responses more than 1.5 sample standard deviations faster
    /// than their survey's mean, fastest first.
    ///
    /// Candidates come from `v_anomaly_candidates`. The comparison is done
    /// on squares, `x < avg` and `(avg - x)^2 > 2.25 * var`, so SQLite needs
    /// no `sqrt`.
    pub fn anomalies(&self, survey_id: Option<i64>, limit: Option<u32>) -> Result<Vec<AnomalyRow>> {
        let limit: i64 = limit.map(i64::from).unwrap_or(-1);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH spread AS (
                     SELECT survey_id,
                            CASE WHEN COUNT(*) > 1 THEN
                                (SUM(duration_seconds * duration_seconds)
                                 - SUM(duration_seconds) * SUM(duration_seconds) / COUNT(*))
                                / (COUNT(*) - 1)
                            ELSE 0 END AS var_sec
                     FROM survey_responses
                     WHERE duration_seconds IS NOT NULL
                     GROUP BY survey_id
                 )
                 SELECT c.response_id, c.survey_id, c.survey_title, c.user_name, c.user_email,
                        c.user_duration_sec, c.survey_avg_sec, MAX(sp.var_sec, 0)
                 FROM v_anomaly_candidates c
                 JOIN spread sp ON sp.survey_id = c.survey_id
                 WHERE c.user_duration_sec < c.survey_avg_sec
                   AND (c.survey_avg_sec - c.user_duration_sec) * (c.survey_avg_sec - c.user_duration_sec)
                       > 2.25 * MAX(sp.var_sec, 0)
                   AND (?1 IS NULL OR c.survey_id = ?1)
                 ORDER BY c.user_duration_sec
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![survey_id, limit], |row| {
                    let var_sec: f64 = row.get(7)?;
                    Ok(AnomalyRow {
                        response_id: row.get(0)?,
                        survey_id: row.get(1)?,
                        survey_title: row.get(2)?,
                        user_name: row.get(3)?,
                        user_email: row.get(4)?,
                        user_sec: row.get(5)?,
                        avg_sec: row.get(6)?,
                        std_sec: var_sec.sqrt(),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Surveys for the anomaly filter, by title.
    pub fn survey_choices(&self) -> Result<Vec<(i64, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT survey_id, title FROM surveys ORDER BY title")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Month-over-month retention: for each registration-month cohort, the
    /// share of its users with a completed response N months later.
    pub fn cohort_retention(&self) -> Result<Vec<CohortCell>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH user_cohorts AS (
                     SELECT user_id, strftime('%Y-%m', registration_date) AS cohort_month
                     FROM users
                 ),
                 cohort_size AS (
                     SELECT cohort_month, COUNT(*) AS total_users
                     FROM user_cohorts
                     GROUP BY cohort_month
                 ),
                 user_activities AS (
                     SELECT DISTINCT user_id, strftime('%Y-%m', completed_at) AS activity_month
                     FROM survey_responses
                     WHERE completed_at IS NOT NULL AND user_id IS NOT NULL
                 )
                 SELECT uc.cohort_month,
                        cs.total_users,
                        (CAST(substr(ua.activity_month, 1, 4) AS INTEGER)
                            - CAST(substr(uc.cohort_month, 1, 4) AS INTEGER)) * 12
                        + (CAST(substr(ua.activity_month, 6, 2) AS INTEGER)
                            - CAST(substr(uc.cohort_month, 6, 2) AS INTEGER)) AS month_lag,
                        ROUND(COUNT(DISTINCT uc.user_id) * 100.0 / cs.total_users, 1)
                 FROM user_cohorts uc
                 JOIN cohort_size cs ON cs.cohort_month = uc.cohort_month
                 JOIN user_activities ua ON ua.user_id = uc.user_id
                 WHERE ua.activity_month >= uc.cohort_month
                 GROUP BY uc.cohort_month, cs.total_users, month_lag
                 ORDER BY uc.cohort_month, month_lag",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CohortCell {
                        cohort: row.get(0)?,
                        cohort_size: row.get(1)?,
                        month_lag: row.get(2)?,
                        retention_pct: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::open_temp;

    fn seed(db: &Database, sql: &str) {
        db.with_conn_mut(|conn| Ok(conn.execute_batch(sql)?)).unwrap();
    }

    #[test]
    fn heatmap_period_parsing() {
        assert_eq!(HeatmapPeriod::parse("7d"), HeatmapPeriod::Week);
        assert_eq!(HeatmapPeriod::parse("30d"), HeatmapPeriod::Month);
        assert_eq!(HeatmapPeriod::parse("year"), HeatmapPeriod::Year);
        assert_eq!(HeatmapPeriod::parse("forever"), HeatmapPeriod::All);
        assert_eq!(HeatmapPeriod::Month.as_str(), "30d");
    }

    #[test]
    fn summary_counts_distinct_participants() {
        let (db, _dir) = open_temp();
        seed(
            &db,
            "INSERT INTO users (user_id, full_name, email, password_hash) VALUES
                (1, 'A', 'a@x.io', 'h'), (2, 'B', 'b@x.io', 'h'), (3, 'C', 'c@x.io', 'h');
             INSERT INTO surveys (survey_id, title, status) VALUES (1, 'S1', 'active'), (2, 'S2', 'active');
             INSERT INTO survey_responses (survey_id, user_id, started_at, completed_at) VALUES
                (1, 1, '2025-01-01 10:00:00', '2025-01-01 10:05:00'),
                (2, 1, '2025-01-02 10:00:00', NULL),
                (1, 2, '2025-01-02 11:00:00', NULL);",
        );

        let summary = db.admin_summary().unwrap();
        assert_eq!(
            summary,
            AdminSummary {
                total_users: 3,
                unique_users_started: 2,
                unique_users_completed: 1,
                total_surveys: 2,
                total_responses: 3,
            }
        );

        let all = db.daily_activity(None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1], DailyCount { date: "2025-01-02".into(), count: 2 });

        let bounded = db.daily_activity(Some("2025-01-02"), Some("2025-01-31")).unwrap();
        assert_eq!(bounded.len(), 1);
    }

    #[test]
    fn heatmap_uses_iso_weekdays() {
        let (db, _dir) = open_temp();
        // 2025-03-02 is a Sunday, 2025-03-03 a Monday
        seed(
            &db,
            "INSERT INTO surveys (survey_id, title) VALUES (1, 'S');
             INSERT INTO survey_responses (survey_id, started_at) VALUES
                (1, '2025-03-02 09:15:00'), (1, '2025-03-03 18:40:00'), (1, '2025-03-03 18:59:00');",
        );

        let mut cells = db.heatmap(HeatmapPeriod::All).unwrap();
        cells.sort_by_key(|c| (c.weekday, c.hour));
        assert_eq!(
            cells,
            vec![
                HeatmapCell { weekday: 1, hour: 18, count: 2 },
                HeatmapCell { weekday: 7, hour: 9, count: 1 },
            ]
        );
        assert!(db.heatmap(HeatmapPeriod::Week).unwrap().is_empty());
    }

    #[test]
    fn top_tags_count_completed_only() {
        let (db, _dir) = open_temp();
        seed(
            &db,
            "INSERT INTO surveys (survey_id, title) VALUES (1, 'S1'), (2, 'S2');
             INSERT INTO tags (tag_id, name) VALUES (1, 'спорт'), (2, 'еда');
             INSERT INTO survey_tags VALUES (1, 1), (2, 2);
             INSERT INTO survey_responses (survey_id, started_at, completed_at) VALUES
                (1, '2025-01-01 10:00:00', '2025-01-01 10:01:00'),
                (1, '2025-01-01 10:00:00', '2025-01-01 10:01:00'),
                (2, '2025-01-01 10:00:00', '2025-01-01 10:01:00'),
                (2, '2025-01-01 10:00:00', NULL),
                (2, '2025-01-01 10:00:00', NULL);",
        );

        let tags = db.top_tags().unwrap();
        assert_eq!(tags[0], TagCount { name: "спорт".into(), count: 2 });
        assert_eq!(tags[1], TagCount { name: "еда".into(), count: 1 });
    }

    #[test]
    fn age_brackets_follow_display_order() {
        let (db, _dir) = open_temp();
        seed(
            &db,
            "INSERT INTO users (user_id, full_name, email, password_hash, birth_date) VALUES
                (1, 'Old', 'o@x.io', 'h', '1950-06-01'),
                (2, 'Young', 'y@x.io', 'h', date('now', '-20 years', '-1 day')),
                (3, 'Unknown', 'u@x.io', 'h', NULL);
             INSERT INTO surveys (survey_id, title) VALUES (1, 'S');
             INSERT INTO survey_responses (survey_id, user_id, started_at, completed_at) VALUES
                (1, 1, '2025-01-01 10:00:00', '2025-01-01 10:01:00'),
                (1, 2, '2025-01-01 10:00:00', '2025-01-01 10:01:00'),
                (1, 3, '2025-01-01 10:00:00', '2025-01-01 10:01:00');",
        );

        let brackets: Vec<String> = db
            .age_brackets()
            .unwrap()
            .into_iter()
            .map(|b| b.bracket)
            .collect();
        assert_eq!(brackets, vec!["18-24", "45+", "Не указано"]);
    }

    #[test]
    fn fast_completion_is_flagged() {
        let (db, _dir) = open_temp();
        seed(
            &db,
            "INSERT INTO users (user_id, full_name, email, password_hash) VALUES
                (1, 'U1', 'u1@x.io', 'h'), (2, 'U2', 'u2@x.io', 'h'), (3, 'U3', 'u3@x.io', 'h'),
                (4, 'U4', 'u4@x.io', 'h'), (5, 'Speedy', 'fast@x.io', 'h');
             INSERT INTO surveys (survey_id, title) VALUES (1, 'S');
             INSERT INTO survey_responses (survey_id, user_id, started_at, completed_at) VALUES
                (1, 1, '2025-01-01 10:00:00', '2025-01-01 10:01:40'),
                (1, 2, '2025-01-01 10:00:00', '2025-01-01 10:01:40'),
                (1, 3, '2025-01-01 10:00:00', '2025-01-01 10:01:40'),
                (1, 4, '2025-01-01 10:00:00', '2025-01-01 10:01:40'),
                (1, 5, '2025-01-01 10:00:00', '2025-01-01 10:00:10');",
        );

        let rows = db.anomalies(None, Some(10)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_email, "fast@x.io");
        assert!((rows[0].avg_sec - 82.0).abs() < 0.01);
        assert!((rows[0].std_sec - 40.25).abs() < 0.01);

        assert!(db.anomalies(Some(2), None).unwrap().is_empty());
    }

    #[test]
    fn single_response_is_not_an_anomaly() {
        let (db, _dir) = open_temp();
        seed(
            &db,
            "INSERT INTO users (user_id, full_name, email, password_hash) VALUES (1, 'U', 'u@x.io', 'h');
             INSERT INTO surveys (survey_id, title) VALUES (1, 'S');
             INSERT INTO survey_responses (survey_id, user_id, started_at, completed_at)
                VALUES (1, 1, '2025-01-01 10:00:00', '2025-01-01 10:00:05');",
        );
        assert!(db.anomalies(None, None).unwrap().is_empty());
    }

    #[test]
    fn cohort_retention_by_month_lag() {
        let (db, _dir) = open_temp();
        seed(
            &db,
            "INSERT INTO users (user_id, full_name, email, password_hash, registration_date) VALUES
                (1, 'A', 'a@x.io', 'h', '2024-11-03 10:00:00'),
                (2, 'B', 'b@x.io', 'h', '2024-11-20 10:00:00');
             INSERT INTO surveys (survey_id, title) VALUES (1, 'S');
             INSERT INTO survey_responses (survey_id, user_id, started_at, completed_at) VALUES
                (1, 1, '2024-11-05 10:00:00', '2024-11-05 10:01:00'),
                (1, 2, '2024-11-21 10:00:00', '2024-11-21 10:01:00'),
                (1, 1, '2025-01-10 10:00:00', '2025-01-10 10:01:00');",
        );

        let cells = db.cohort_retention().unwrap();
        assert_eq!(
            cells,
            vec![
                CohortCell { cohort: "2024-11".into(), cohort_size: 2, month_lag: 0, retention_pct: 100.0 },
                CohortCell { cohort: "2024-11".into(), cohort_size: 2, month_lag: 2, retention_pct: 50.0 },
            ]
        );
    }
}
