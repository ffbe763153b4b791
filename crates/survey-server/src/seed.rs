//! Fills a database with demo users, surveys and timed responses so the
//! analytics dashboard has something to show.
//!
//! ```text
//! survey-seed [--reset] [--bots N]
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use survey_api::security::hash_password;
use survey_db::models::{AnswerValue, CleanedAnswer, QuestionRow, ResponseMeta};
use survey_db::{Database, TIMESTAMP_FORMAT};
use survey_types::api::{ProfileUpdate, QuestionCreate, SurveyCreateForm};
use survey_types::models::{QuestionType, SurveyStatus};

const DEFAULT_BOTS: usize = 50;
const DEFAULT_PASSWORD: &str = "123456";
const ADMIN_EMAIL: &str = "admin@main.com";
const TESTER_EMAIL: &str = "user@test.com";

/// Child tables first; countries come from the migrations and stay.
const RESET_ORDER: [&str; 8] = [
    "user_answers",
    "survey_responses",
    "options",
    "questions",
    "survey_tags",
    "tags",
    "surveys",
    "users",
];

struct QuestionSpec {
    text: &'static str,
    kind: QuestionType,
    options: &'static [&'static str],
    scale: u32,
}

const fn single(text: &'static str, options: &'static [&'static str]) -> QuestionSpec {
    QuestionSpec { text, kind: QuestionType::SingleChoice, options, scale: 0 }
}

const fn multiple(text: &'static str, options: &'static [&'static str]) -> QuestionSpec {
    QuestionSpec { text, kind: QuestionType::MultipleChoice, options, scale: 0 }
}

const fn rating(text: &'static str, scale: u32) -> QuestionSpec {
    QuestionSpec { text, kind: QuestionType::Rating, options: &[], scale }
}

const fn text(text: &'static str) -> QuestionSpec {
    QuestionSpec { text, kind: QuestionType::TextAnswer, options: &[], scale: 0 }
}

struct Scenario {
    title: &'static str,
    description: &'static str,
    tags: &'static [&'static str],
    status: SurveyStatus,
    questions: &'static [QuestionSpec],
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        title: "Тренды IT",
        description: "Популярность языков программирования и форматов работы.",
        tags: &["IT", "Работа"],
        status: SurveyStatus::Active,
        questions: &[
            single(
                "Ваш основной язык программирования?",
                &["Python", "JavaScript/TypeScript", "Java", "Go", "C#", "Rust"],
            ),
            single("Какой формат работы вы предпочитаете?", &["Удаленка", "Гибрид", "Офис"]),
            text("Какие технологии хотите изучить?"),
        ],
    },
    Scenario {
        title: "Здоровый сон",
        description: "Как жители мегаполисов справляются с недосыпом.",
        tags: &["Здоровье", "Психология"],
        status: SurveyStatus::Active,
        questions: &[
            single("Сколько часов вы спите?", &["Меньше 5", "5-6", "7-8", "Больше 9"]),
            multiple(
                "Что мешает вам уснуть?",
                &["Стресс", "Гаджеты перед сном", "Шум", "Кофеин", "Ничего"],
            ),
            rating("Оцените качество сна", 5),
        ],
    },
    Scenario {
        title: "Игровая индустрия: итоги",
        description: "Во что играли в этом году и чего ждем.",
        tags: &["Гейминг", "IT"],
        status: SurveyStatus::Active,
        questions: &[
            single("Ваша основная платформа?", &["PC", "PlayStation", "Xbox", "Switch", "Телефон"]),
            single("Любимый жанр?", &["RPG", "Шутер", "Стратегия", "MOBA", "Симулятор"]),
        ],
    },
    Scenario {
        title: "Качество образования",
        description: "Опрос студентов и выпускников о вузах.",
        tags: &["Образование", "Работа"],
        status: SurveyStatus::Active,
        questions: &[
            single("Ваш уровень образования?", &["Среднее", "Бакалавриат", "Магистратура"]),
            rating("Помогают ли знания из вуза в работе?", 10),
            text("Чего не хватает образованию?"),
        ],
    },
    Scenario {
        title: "Удаленка или офис",
        description: "Где продуктивнее работать.",
        tags: &["Работа", "Психология"],
        status: SurveyStatus::Active,
        questions: &[
            single("Где вы сейчас работаете?", &["Дома", "В офисе", "В коворкинге"]),
            multiple(
                "Главные плюсы удаленки?",
                &["Нет дороги", "Тишина", "Гибкий график", "Домашняя еда"],
            ),
        ],
    },
    Scenario {
        title: "Финансовая грамотность",
        description: "Как вы ведете бюджет.",
        tags: &["Финансы"],
        status: SurveyStatus::Active,
        questions: &[
            single("Ведете ли учет расходов?", &["В приложении", "В таблице", "В уме", "Нет"]),
            multiple("Куда инвестируете?", &["Акции", "Недвижимость", "Депозиты", "Никуда"]),
        ],
    },
    Scenario {
        title: "Путешествия по России",
        description: "Где вы отдыхали этим летом.",
        tags: &["Путешествия"],
        status: SurveyStatus::Completed,
        questions: &[
            single("Где лучше отдыхать?", &["Море", "Горы", "Города", "Дача"]),
            rating("Впечатление от сервиса", 10),
        ],
    },
    Scenario {
        title: "Маркетинг в соцсетях",
        description: "Какой контент вам нравится.",
        tags: &["Маркетинг", "IT"],
        status: SurveyStatus::Draft,
        questions: &[
            single("Где проводите больше времени?", &["Telegram", "VK", "YouTube"]),
            multiple("Любимый формат?", &["Короткие видео", "Длинные видео", "Посты", "Подкасты"]),
        ],
    },
];

const FIRST_NAMES: &[&str] = &[
    "Анна", "Иван", "Мария", "Петр", "Ольга", "Алексей", "Елена", "Дмитрий", "Наталья", "Сергей",
];
const LAST_NAMES: &[&str] =
    &["Иванов", "Смирнов", "Кузнецов", "Попов", "Соколов", "Лебедев", "Козлов", "Новиков"];
const CITIES: &[&str] = &["Москва", "Санкт-Петербург", "Казань", "Минск", "Алматы", "Новосибирск"];
const TEXT_ANSWERS: &[&str] = &[
    "Сложно сказать",
    "Хочу больше практики",
    "Все устраивает",
    "Нужно подумать",
    "Попробую в следующем году",
];
const DEVICES: &[&str] = &["Desktop", "Mobile", "Tablet"];

struct SeedPlan {
    bots: usize,
    reset: bool,
    password_hash: String,
}

#[derive(Debug, Default, PartialEq)]
struct SeedSummary {
    users: usize,
    surveys: usize,
    responses: usize,
}

struct Member {
    user_id: i64,
    registered: DateTime<Utc>,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "survey_seed=info,survey_db=info".into()),
        )
        .init();

    let mut bots = DEFAULT_BOTS;
    let mut reset = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--reset" => reset = true,
            "--bots" => {
                bots = args
                    .next()
                    .context("--bots needs a number")?
                    .parse()
                    .context("--bots needs a number")?;
            }
            other => bail!("Unknown argument {}; usage: survey-seed [--reset] [--bots N]", other),
        }
    }

    let db_path = PathBuf::from(std::env::var("SURVEY_DB_PATH").unwrap_or_else(|_| "survey.db".into()));
    let db = Database::open(&db_path)?;
    let plan = SeedPlan {
        bots,
        reset,
        password_hash: hash_password(DEFAULT_PASSWORD)?,
    };

    let summary = seed(&db, &plan, &mut StdRng::from_os_rng())?;
    info!(
        "Seeded {}: {} users, {} surveys, {} responses",
        db_path.display(),
        summary.users,
        summary.surveys,
        summary.responses
    );
    info!("Admin: {} / {}", ADMIN_EMAIL, DEFAULT_PASSWORD);
    info!("User:  {} / {}", TESTER_EMAIL, DEFAULT_PASSWORD);
    Ok(())
}

fn seed(db: &Database, plan: &SeedPlan, rng: &mut impl Rng) -> Result<SeedSummary> {
    if plan.reset {
        clear(db)?;
    } else if db.get_user_by_email(ADMIN_EMAIL)?.is_some() {
        bail!("Database already holds demo data; run with --reset to start over");
    }

    let now = Utc::now();
    let countries: Vec<i64> = db.list_countries()?.into_iter().map(|c| c.country_id).collect();

    db.ensure_admin(ADMIN_EMAIL, "Главный Администратор", &plan.password_hash)?;
    let admin = db
        .get_user_by_email(ADMIN_EMAIL)?
        .context("admin missing right after creation")?;
    let tester_id = db.create_user(TESTER_EMAIL, "Иван Тестовый", &plan.password_hash)?;
    let tester = Member {
        user_id: tester_id,
        registered: now - Duration::days(rng.random_range(30..=365)),
    };
    backdate_user(db, tester.user_id, tester.registered)?;

    let mut bots = Vec::with_capacity(plan.bots);
    for n in 1..=plan.bots {
        bots.push(create_bot(db, n, &plan.password_hash, &countries, now, rng)?);
    }
    debug!("Created {} bot users", bots.len());

    let mut survey_ids = Vec::with_capacity(SCENARIOS.len());
    for scenario in SCENARIOS {
        survey_ids.push(create_scenario(db, admin.user_id, scenario, now, rng)?);
    }

    let mut open = Vec::new();
    for (scenario, survey_id) in SCENARIOS.iter().zip(&survey_ids) {
        if scenario.status == SurveyStatus::Draft {
            continue;
        }
        let detail = db
            .load_survey_detail(*survey_id)?
            .context("seeded survey disappeared")?;
        open.push((scenario, detail.questions));
    }

    let mut responses = 0;
    for bot in &bots {
        let take = rng.random_range(2..=5).min(open.len());
        for (_, questions) in open.choose_multiple(rng, take) {
            let survey_id = questions.first().map(|q| q.survey_id);
            if let Some(survey_id) = survey_id {
                respond(db, survey_id, bot, questions, now, rng)?;
                responses += 1;
            }
        }
    }
    for (scenario, questions) in &open {
        let relevant = scenario.tags.iter().any(|t| *t == "IT" || *t == "Гейминг");
        if let (true, Some(first)) = (relevant, questions.first()) {
            respond(db, first.survey_id, &tester, questions, now, rng)?;
            responses += 1;
        }
    }

    Ok(SeedSummary {
        users: bots.len() + 2,
        surveys: survey_ids.len(),
        responses,
    })
}

fn clear(db: &Database) -> Result<()> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        for table in RESET_ORDER {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }
        tx.commit()?;
        Ok(())
    })?;
    info!("Existing survey data cleared");
    Ok(())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn backdate_user(db: &Database, user_id: i64, registered: DateTime<Utc>) -> Result<()> {
    db.with_conn_mut(|conn| {
        conn.execute(
            "UPDATE users SET registration_date = ?1 WHERE user_id = ?2",
            (timestamp(registered), user_id),
        )?;
        Ok(())
    })
}

fn create_bot(
    db: &Database,
    n: usize,
    password_hash: &str,
    countries: &[i64],
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<Member> {
    let full_name = format!(
        "{} {}",
        FIRST_NAMES.choose(rng).copied().unwrap_or("Гость"),
        LAST_NAMES.choose(rng).copied().unwrap_or("Гостев")
    );
    let user_id = db.create_user(&format!("bot{:03}@example.com", n), &full_name, password_hash)?;

    // One in ten keeps the birth date to themselves
    let birth_date = if rng.random_bool(0.9) {
        let age = rng.random_range(16..=65);
        NaiveDate::from_ymd_opt(now.year() - age, rng.random_range(1..=12), rng.random_range(1..=28))
    } else {
        None
    };
    db.update_profile(
        user_id,
        &ProfileUpdate {
            full_name,
            city: CITIES.choose(rng).map(|c| c.to_string()),
            country_id: countries.choose(rng).copied(),
            birth_date,
        },
    )?;

    let registered = now
        - Duration::days(rng.random_range(0..365))
        - Duration::minutes(rng.random_range(0..24 * 60));
    backdate_user(db, user_id, registered)?;
    Ok(Member { user_id, registered })
}

fn create_scenario(
    db: &Database,
    author_id: i64,
    scenario: &Scenario,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<i64> {
    let form = SurveyCreateForm {
        title: scenario.title.into(),
        description: scenario.description.into(),
        tag_names: scenario.tags.iter().map(|t| t.to_string()).collect(),
        questions: scenario
            .questions
            .iter()
            .enumerate()
            .map(|(idx, q)| QuestionCreate {
                text: q.text.into(),
                kind: q.kind,
                position: idx as i64 + 1,
                is_required: true,
                rating_scale: (q.kind == QuestionType::Rating).then_some(q.scale),
                options: q.options.iter().map(|o| o.to_string()).collect(),
            })
            .collect(),
    };
    let survey_id = db.create_survey(author_id, &form)?;

    let created = now - Duration::days(rng.random_range(20..=120));
    let started = now - Duration::days(rng.random_range(10..=100));
    db.with_conn_mut(|conn| {
        conn.execute(
            "UPDATE surveys SET status = ?1, created_at = ?2, start_date = ?3, end_date = ?4
             WHERE survey_id = ?5",
            (
                scenario.status.as_str(),
                timestamp(created),
                timestamp(started),
                timestamp(now + Duration::days(30)),
                survey_id,
            ),
        )?;
        Ok(())
    })?;
    Ok(survey_id)
}

/// Retention shape: most activity lands in the first month after
/// registration, then it tails off.
fn activity_lag(rng: &mut impl Rng) -> Duration {
    let roll: f64 = rng.random();
    let days = if roll < 0.6 {
        rng.random_range(0..=30)
    } else if roll < 0.8 {
        rng.random_range(31..=60)
    } else if roll < 0.9 {
        rng.random_range(61..=90)
    } else {
        rng.random_range(91..=180)
    };
    Duration::days(days) + Duration::minutes(rng.random_range(0..24 * 60))
}

fn answer(question: &QuestionRow, rng: &mut impl Rng) -> Option<CleanedAnswer> {
    let value = match question.question_type {
        QuestionType::TextAnswer => AnswerValue::Text(TEXT_ANSWERS.choose(rng)?.to_string()),
        QuestionType::MultipleChoice => {
            let take = rng.random_range(1..=question.options.len().min(3));
            AnswerValue::Options(
                question
                    .options
                    .choose_multiple(rng, take)
                    .map(|o| o.option_id)
                    .collect(),
            )
        }
        QuestionType::SingleChoice | QuestionType::Rating => {
            AnswerValue::Options(vec![question.options.choose(rng)?.option_id])
        }
    };
    Some(CleanedAnswer {
        question_id: question.question_id,
        question_type: question.question_type,
        value,
    })
}

fn respond(
    db: &Database,
    survey_id: i64,
    member: &Member,
    questions: &[QuestionRow],
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<()> {
    let mut started = member.registered + activity_lag(rng);
    if started > now {
        started = now - Duration::hours(rng.random_range(1..=24));
    }

    // A quarter walk away part-way through
    let abandoned = rng.random_bool(0.25);
    let answered = if abandoned {
        rng.random_range(0..questions.len())
    } else {
        questions.len()
    };
    let answers: Vec<CleanedAnswer> = questions[..answered]
        .iter()
        .filter_map(|q| answer(q, rng))
        .collect();

    let meta = ResponseMeta {
        ip_address: Some(format!(
            "{}.{}.{}.{}",
            rng.random_range(1..=223),
            rng.random_range(0..=255),
            rng.random_range(0..=255),
            rng.random_range(1..=254)
        )),
        device_type: DEVICES.choose(rng).map(|d| d.to_string()),
    };
    let response_id = db.save_submission(survey_id, member.user_id, &meta, &answers)?;

    let completed = (!abandoned).then(|| started + Duration::seconds(rng.random_range(45..=900)));
    db.with_conn_mut(|conn| {
        conn.execute(
            "UPDATE survey_responses SET started_at = ?1, completed_at = ?2 WHERE response_id = ?3",
            (timestamp(started), completed.map(timestamp), response_id),
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("seed.db")).unwrap();
        (dir, db)
    }

    fn plan(bots: usize, reset: bool) -> SeedPlan {
        SeedPlan {
            bots,
            reset,
            password_hash: "not-a-real-hash".into(),
        }
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?)).unwrap()
    }

    #[test]
    fn seeds_users_surveys_and_timed_responses() {
        let (_dir, db) = open_db();
        let summary = seed(&db, &plan(12, false), &mut StdRng::seed_from_u64(7)).unwrap();

        assert_eq!(summary.users, 14);
        assert_eq!(summary.surveys, SCENARIOS.len());
        assert!(summary.responses >= 12 * 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users"), 14);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM survey_responses"), summary.responses as i64);

        let admin = db.get_user_by_email(ADMIN_EMAIL).unwrap().unwrap();
        assert!(admin.is_admin());

        // Drafts collect nothing
        assert_eq!(
            count(
                &db,
                "SELECT COUNT(*) FROM survey_responses r JOIN surveys s USING (survey_id)
                 WHERE s.status = 'draft'"
            ),
            0
        );

        // Completed responses took between 45 seconds and 15 minutes
        let (shortest, longest): (f64, f64) = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT MIN(duration_seconds), MAX(duration_seconds) FROM survey_responses
                     WHERE completed_at IS NOT NULL",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .unwrap();
        assert!(shortest >= 44.5, "shortest {}", shortest);
        assert!(longest <= 900.5, "longest {}", longest);

        assert!(count(&db, "SELECT COUNT(*) FROM user_answers") > 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE registration_date > datetime('now')"), 0);
    }

    #[test]
    fn second_run_needs_reset() {
        let (_dir, db) = open_db();
        let mut rng = StdRng::seed_from_u64(11);
        seed(&db, &plan(3, false), &mut rng).unwrap();

        assert!(seed(&db, &plan(3, false), &mut rng).is_err());

        let summary = seed(&db, &plan(3, true), &mut rng).unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users"), 5);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM surveys"), summary.surveys as i64);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM countries"), 10);
    }
}
