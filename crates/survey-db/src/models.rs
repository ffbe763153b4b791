//! Row types read straight out of SQLite.
//! Forms and enums shared with the web layer live in survey-types.

use survey_types::models::{QuestionType, SurveyStatus, UserRole};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub birth_date: Option<String>,
    pub city: Option<String>,
    pub country_id: Option<i64>,
    pub role: UserRole,
    pub registration_date: String,
}

impl UserRow {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone)]
pub struct CountryRow {
    pub country_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SurveyRow {
    pub survey_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: SurveyStatus,
    pub author_id: Option<i64>,
    pub created_at: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// A survey together with its tag names, as listed on the home page.
#[derive(Debug, Clone)]
pub struct SurveyCard {
    pub survey: SurveyRow,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OptionRow {
    pub option_id: i64,
    pub question_id: i64,
    pub option_text: String,
}

#[derive(Debug, Clone)]
pub struct QuestionRow {
    pub question_id: i64,
    pub survey_id: i64,
    pub question_text: String,
    pub question_type: QuestionType,
    pub position: i64,
    pub is_required: bool,
    pub options: Vec<OptionRow>,
}

/// Everything needed to render a survey for taking.
#[derive(Debug, Clone)]
pub struct SurveyDetail {
    pub survey: SurveyRow,
    pub author_name: Option<String>,
    pub tags: Vec<String>,
    /// Ordered by position.
    pub questions: Vec<QuestionRow>,
}

#[derive(Debug, Clone)]
pub struct ResponseRow {
    pub response_id: i64,
    pub survey_id: i64,
    pub user_id: Option<i64>,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_seconds: Option<f64>,
    pub ip_address: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnswerRow {
    pub answer_id: i64,
    pub response_id: i64,
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub text_answer: Option<String>,
}

/// A survey the user has started or completed, for the profile page.
#[derive(Debug, Clone)]
pub struct TakenSurveyRow {
    pub response_id: i64,
    pub survey_id: i64,
    pub title: String,
    pub started_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecommendationRow {
    pub survey_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub shared_tags: i64,
    pub popularity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRow {
    pub metric: String,
    pub survey_value: f64,
    pub category_avg: f64,
}

/// Client metadata recorded on a survey response.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub ip_address: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Options(Vec<i64>),
    Text(String),
}

/// One validated answer ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedAnswer {
    pub question_id: i64,
    pub question_type: QuestionType,
    pub value: AnswerValue,
}
