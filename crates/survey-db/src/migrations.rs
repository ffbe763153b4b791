use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

const SCHEMA_V1: &str = "
    CREATE TABLE countries (
        country_id  INTEGER PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE
    );

    CREATE TABLE users (
        user_id             INTEGER PRIMARY KEY,
        full_name           TEXT NOT NULL,
        email               TEXT NOT NULL UNIQUE,
        password_hash       TEXT NOT NULL,
        birth_date          DATE,
        city                TEXT,
        country_id          INTEGER REFERENCES countries(country_id) ON DELETE SET NULL,
        role                TEXT NOT NULL DEFAULT 'user'
                                CHECK (role IN ('user', 'creator', 'admin')),
        registration_date   TIMESTAMP NOT NULL DEFAULT (datetime('now'))
    );

    -- SQLite rejects date('now') inside CHECK, so the birth date rule lives in triggers
    CREATE TRIGGER check_birth_date_insert BEFORE INSERT ON users
    WHEN NEW.birth_date IS NOT NULL AND NEW.birth_date >= date('now')
    BEGIN
        SELECT RAISE(ABORT, 'check_birth_date');
    END;

    CREATE TRIGGER check_birth_date_update BEFORE UPDATE OF birth_date ON users
    WHEN NEW.birth_date IS NOT NULL AND NEW.birth_date >= date('now')
    BEGIN
        SELECT RAISE(ABORT, 'check_birth_date');
    END;

    CREATE TABLE tags (
        tag_id  INTEGER PRIMARY KEY,
        name    TEXT NOT NULL UNIQUE
    );

    CREATE TABLE surveys (
        survey_id   INTEGER PRIMARY KEY,
        title       TEXT NOT NULL,
        description TEXT,
        status      TEXT NOT NULL DEFAULT 'draft'
                        CHECK (status IN ('draft', 'active', 'completed', 'archived')),
        author_id   INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
        created_at  TIMESTAMP NOT NULL DEFAULT (datetime('now')),
        start_date  TIMESTAMP,
        end_date    TIMESTAMP,
        CONSTRAINT check_dates CHECK (end_date > start_date)
    );

    CREATE TABLE survey_tags (
        survey_id   INTEGER NOT NULL REFERENCES surveys(survey_id) ON DELETE CASCADE,
        tag_id      INTEGER NOT NULL REFERENCES tags(tag_id) ON DELETE CASCADE,
        PRIMARY KEY (survey_id, tag_id)
    );

    CREATE TABLE questions (
        question_id     INTEGER PRIMARY KEY,
        survey_id       INTEGER NOT NULL REFERENCES surveys(survey_id) ON DELETE CASCADE,
        question_text   TEXT NOT NULL,
        question_type   TEXT NOT NULL
                            CHECK (question_type IN ('single_choice', 'multiple_choice', 'text_answer', 'rating')),
        position        INTEGER NOT NULL DEFAULT 0,
        is_required     BOOLEAN NOT NULL DEFAULT 1
    );

    CREATE INDEX idx_questions_survey ON questions(survey_id, position);

    CREATE TABLE options (
        option_id   INTEGER PRIMARY KEY,
        question_id INTEGER NOT NULL REFERENCES questions(question_id) ON DELETE CASCADE,
        option_text TEXT NOT NULL,
        is_correct  BOOLEAN DEFAULT 0
    );

    CREATE INDEX idx_options_question ON options(question_id);

    CREATE TABLE survey_responses (
        response_id         INTEGER PRIMARY KEY,
        survey_id           INTEGER NOT NULL REFERENCES surveys(survey_id) ON DELETE CASCADE,
        user_id             INTEGER REFERENCES users(user_id) ON DELETE SET NULL,
        started_at          TIMESTAMP NOT NULL DEFAULT (datetime('now')),
        completed_at        TIMESTAMP,
        duration_seconds    REAL GENERATED ALWAYS AS
                                ((julianday(completed_at) - julianday(started_at)) * 86400.0) STORED,
        ip_address          TEXT,
        device_type         TEXT,
        CONSTRAINT check_completion_time CHECK (completed_at >= started_at)
    );

    CREATE INDEX idx_responses_survey_user ON survey_responses(survey_id, user_id);

    CREATE TABLE user_answers (
        answer_id           INTEGER PRIMARY KEY,
        response_id         INTEGER NOT NULL REFERENCES survey_responses(response_id) ON DELETE CASCADE,
        question_id         INTEGER NOT NULL REFERENCES questions(question_id) ON DELETE CASCADE,
        selected_option_id  INTEGER REFERENCES options(option_id) ON DELETE CASCADE,
        text_answer         TEXT,
        CONSTRAINT check_answer_content
            CHECK (selected_option_id IS NOT NULL OR text_answer IS NOT NULL)
    );

    CREATE INDEX idx_answers_response ON user_answers(response_id, question_id);

    INSERT INTO countries (name) VALUES
        ('Россия'), ('Беларусь'), ('Казахстан'), ('Узбекистан'), ('Кыргызстан'),
        ('Армения'), ('Грузия'), ('Азербайджан'), ('Германия'), ('США');
";

const SCHEMA_V2: &str = "
    CREATE VIEW v_admin_summary AS
    SELECT
        (SELECT COUNT(*) FROM users) AS total_users,
        (SELECT COUNT(DISTINCT user_id) FROM survey_responses) AS unique_users_started,
        (SELECT COUNT(DISTINCT user_id) FROM survey_responses
            WHERE completed_at IS NOT NULL) AS unique_users_completed,
        (SELECT COUNT(*) FROM surveys) AS total_surveys,
        (SELECT COUNT(*) FROM survey_responses) AS total_responses;

    CREATE VIEW v_anomaly_candidates AS
    WITH survey_stats AS (
        SELECT survey_id, AVG(duration_seconds) AS avg_sec
        FROM survey_responses
        WHERE completed_at IS NOT NULL
        GROUP BY survey_id
    )
    SELECT
        sr.response_id,
        s.survey_id,
        s.title AS survey_title,
        u.full_name AS user_name,
        u.email AS user_email,
        sr.duration_seconds AS user_duration_sec,
        ss.avg_sec AS survey_avg_sec,
        ROUND(sr.duration_seconds / NULLIF(ss.avg_sec, 0), 3) AS speed_ratio
    FROM survey_responses sr
    JOIN surveys s ON sr.survey_id = s.survey_id
    JOIN users u ON sr.user_id = u.user_id
    JOIN survey_stats ss ON sr.survey_id = ss.survey_id
    WHERE sr.completed_at IS NOT NULL;
";

const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "initial schema", SCHEMA_V1),
    (2, "analytics views", SCHEMA_V2),
];

pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let current: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    for (version, name, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        info!("Running migration v{} ({})", version, name);
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);

        let countries: i64 = conn
            .query_row("SELECT COUNT(*) FROM countries", [], |r| r.get(0))
            .unwrap();
        assert_eq!(countries, 10);
    }

    #[test]
    fn future_birth_date_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();

        let result = conn.execute(
            "INSERT INTO users (full_name, email, password_hash, birth_date)
             VALUES ('Future', 'f@example.com', 'x', date('now', '+1 day'))",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn answer_without_content_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO surveys (survey_id, title, status) VALUES (1, 'S', 'active');
             INSERT INTO questions (question_id, survey_id, question_text, question_type)
                VALUES (1, 1, 'Q', 'text_answer');
             INSERT INTO survey_responses (response_id, survey_id) VALUES (1, 1);",
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO user_answers (response_id, question_id) VALUES (1, 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn duration_is_computed_by_the_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO surveys (survey_id, title) VALUES (1, 'S');
             INSERT INTO survey_responses (survey_id, started_at, completed_at)
                VALUES (1, '2025-03-01 10:00:00', '2025-03-01 10:02:30');",
        )
        .unwrap();

        let duration: f64 = conn
            .query_row("SELECT duration_seconds FROM survey_responses", [], |r| r.get(0))
            .unwrap();
        assert!((duration - 150.0).abs() < 0.01);
    }

    #[test]
    fn completion_before_start_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        conn.execute("INSERT INTO surveys (survey_id, title) VALUES (1, 'S')", []).unwrap();

        let result = conn.execute(
            "INSERT INTO survey_responses (survey_id, started_at, completed_at)
             VALUES (1, '2025-03-01 10:00:00', '2025-03-01 09:00:00')",
            [],
        );
        assert!(result.is_err());
    }
}
