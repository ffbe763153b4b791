use std::collections::HashMap;

use survey_db::models::{AnswerRow, AnswerValue, CleanedAnswer, SurveyDetail};
use survey_types::models::QuestionType;

pub const MAX_TEXT_ANSWER_CHARS: usize = 5000;

/// Form key carrying the answer to a question.
pub fn answer_key(question_id: i64) -> String {
    format!("q_{}", question_id)
}

/// Validate submitted answers against the survey's questions.
///
/// Blank values are dropped; required questions must have something left.
/// Option ids must belong to the question. Only the first value counts for
/// single-valued questions.
pub fn clean_submission(detail: &SurveyDetail, fields: &[(String, String)]) -> Result<Vec<CleanedAnswer>, String> {
    let mut cleaned = Vec::new();

    for question in &detail.questions {
        let key = answer_key(question.question_id);
        let mut values: Vec<&str> = fields
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
            .collect();
        if question.question_type != QuestionType::MultipleChoice {
            values.truncate(1);
        }

        if values.is_empty() {
            if question.is_required {
                return Err(format!("Вопрос '{}' обязателен", question.question_text));
            }
            continue;
        }

        let value = match question.question_type {
            QuestionType::TextAnswer => {
                let text = values[0];
                if text.chars().count() > MAX_TEXT_ANSWER_CHARS {
                    return Err(format!(
                        "Ответ на вопрос '{}' слишком длинный",
                        question.question_text
                    ));
                }
                AnswerValue::Text(text.to_string())
            }
            _ => {
                let mut ids = Vec::with_capacity(values.len());
                for raw in values {
                    let id = raw
                        .parse::<i64>()
                        .ok()
                        .filter(|id| question.options.iter().any(|o| o.option_id == *id))
                        .ok_or_else(|| format!("Некорректный вариант для '{}'", question.question_text))?;
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                AnswerValue::Options(ids)
            }
        };

        cleaned.push(CleanedAnswer {
            question_id: question.question_id,
            question_type: question.question_type,
            value,
        });
    }

    Ok(cleaned)
}

/// What the user answered last time, for pre-filling the survey page.
#[derive(Debug, Default, Clone)]
pub struct PreviousAnswers {
    options: HashMap<i64, Vec<i64>>,
    texts: HashMap<i64, String>,
}

impl PreviousAnswers {
    pub fn from_rows(rows: &[AnswerRow]) -> Self {
        let mut answers = Self::default();
        for row in rows {
            if let Some(text) = &row.text_answer {
                answers.texts.insert(row.question_id, text.clone());
            } else if let Some(option_id) = row.selected_option_id {
                answers.options.entry(row.question_id).or_default().push(option_id);
            }
        }
        answers
    }

    pub fn is_selected(&self, question_id: i64, option_id: i64) -> bool {
        self.options
            .get(&question_id)
            .is_some_and(|ids| ids.contains(&option_id))
    }

    pub fn text(&self, question_id: i64) -> Option<&str> {
        self.texts.get(&question_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_db::models::{OptionRow, QuestionRow, SurveyRow};
    use survey_types::models::SurveyStatus;

    fn question(id: i64, kind: QuestionType, required: bool, option_ids: &[i64]) -> QuestionRow {
        QuestionRow {
            question_id: id,
            survey_id: 1,
            question_text: format!("Q{}", id),
            question_type: kind,
            position: id,
            is_required: required,
            options: option_ids
                .iter()
                .map(|o| OptionRow {
                    option_id: *o,
                    question_id: id,
                    option_text: o.to_string(),
                })
                .collect(),
        }
    }

    fn detail() -> SurveyDetail {
        SurveyDetail {
            survey: SurveyRow {
                survey_id: 1,
                title: "S".into(),
                description: None,
                status: SurveyStatus::Active,
                author_id: None,
                created_at: "2025-01-01 00:00:00".into(),
                start_date: None,
                end_date: None,
            },
            author_name: None,
            tags: Vec::new(),
            questions: vec![
                question(1, QuestionType::SingleChoice, true, &[10, 11]),
                question(2, QuestionType::MultipleChoice, false, &[20, 21, 22]),
                question(3, QuestionType::TextAnswer, false, &[]),
                question(4, QuestionType::Rating, false, &[40, 41]),
            ],
        }
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn valid_submission_is_cleaned() {
        let cleaned = clean_submission(
            &detail(),
            &pairs(&[
                ("q_1", "11"),
                ("q_2", "20"),
                ("q_2", "22"),
                ("q_2", "20"),
                ("q_3", "  привет  "),
                ("q_4", ""),
                ("csrf_token", "x"),
            ]),
        )
        .unwrap();

        assert_eq!(cleaned.len(), 3);
        assert_eq!(cleaned[0].value, AnswerValue::Options(vec![11]));
        assert_eq!(cleaned[1].value, AnswerValue::Options(vec![20, 22]));
        assert_eq!(cleaned[2].value, AnswerValue::Text("привет".into()));
    }

    #[test]
    fn missing_required_answer_is_rejected() {
        let err = clean_submission(&detail(), &pairs(&[("q_2", "20")])).unwrap_err();
        assert_eq!(err, "Вопрос 'Q1' обязателен");
    }

    #[test]
    fn foreign_option_is_rejected() {
        let err = clean_submission(&detail(), &pairs(&[("q_1", "20")])).unwrap_err();
        assert_eq!(err, "Некорректный вариант для 'Q1'");
        let err = clean_submission(&detail(), &pairs(&[("q_1", "10"), ("q_4", "abc")])).unwrap_err();
        assert_eq!(err, "Некорректный вариант для 'Q4'");
    }

    #[test]
    fn overlong_text_is_rejected() {
        let long = "я".repeat(MAX_TEXT_ANSWER_CHARS + 1);
        let err = clean_submission(&detail(), &pairs(&[("q_1", "10"), ("q_3", &long)])).unwrap_err();
        assert_eq!(err, "Ответ на вопрос 'Q3' слишком длинный");
    }

    #[test]
    fn previous_answers_group_by_question() {
        let rows = vec![
            AnswerRow { answer_id: 1, response_id: 1, question_id: 2, selected_option_id: Some(20), text_answer: None },
            AnswerRow { answer_id: 2, response_id: 1, question_id: 2, selected_option_id: Some(22), text_answer: None },
            AnswerRow { answer_id: 3, response_id: 1, question_id: 3, selected_option_id: None, text_answer: Some("да".into()) },
        ];
        let previous = PreviousAnswers::from_rows(&rows);
        assert!(previous.is_selected(2, 22));
        assert!(!previous.is_selected(2, 21));
        assert_eq!(previous.text(3), Some("да"));
    }
}
