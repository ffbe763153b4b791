//! Survey builder form: bracket-notation fields such as
//! `questions[0][text]` or `questions[0][options][2]` into a
//! [`SurveyCreateForm`].

use std::collections::BTreeMap;

use survey_types::api::{QuestionCreate, SurveyCreateForm};
use survey_types::models::QuestionType;

pub const DEFAULT_RATING_SCALE: u32 = 5;
pub const MIN_RATING_SCALE: u32 = 2;
pub const MAX_RATING_SCALE: u32 = 10;

const MAX_TITLE_CHARS: usize = 200;

#[derive(Debug, Default)]
struct RawQuestion {
    text: Option<String>,
    kind: Option<String>,
    position: Option<String>,
    is_required: bool,
    rating_scale: Option<String>,
    options: BTreeMap<usize, String>,
}

enum QuestionField<'a> {
    Field(&'a str),
    Option(usize),
}

/// `questions[3][text]` -> (3, Field("text")), `questions[3][options][1]` -> (3, Option(1)).
fn parse_question_key(key: &str) -> Option<(usize, QuestionField<'_>)> {
    let rest = key.strip_prefix("questions[")?;
    let (idx, rest) = rest.split_once(']')?;
    let idx: usize = idx.parse().ok()?;
    let rest = rest.strip_prefix('[')?;
    let (field, rest) = rest.split_once(']')?;

    if field == "options" {
        let option = rest.strip_prefix('[')?.strip_suffix(']')?;
        return Some((idx, QuestionField::Option(option.parse().ok()?)));
    }
    if !rest.is_empty() {
        return None;
    }
    Some((idx, QuestionField::Field(field)))
}

/// Build and validate a new survey from raw form pairs. Errors are the
/// user-facing messages.
pub fn parse_survey_form(fields: &[(String, String)]) -> Result<SurveyCreateForm, String> {
    let mut title = String::new();
    let mut description = String::new();
    let mut tag_names = Vec::new();
    let mut raw: BTreeMap<usize, RawQuestion> = BTreeMap::new();

    for (key, value) in fields {
        match key.as_str() {
            "title" => title = value.trim().to_string(),
            "description" => description = value.trim().to_string(),
            "tag_names" | "tag_names[]" => tag_names.push(value.trim().to_string()),
            _ => {
                let Some((idx, field)) = parse_question_key(key) else {
                    continue;
                };
                let question = raw.entry(idx).or_default();
                match field {
                    QuestionField::Option(o_idx) => {
                        if !value.trim().is_empty() {
                            question.options.insert(o_idx, value.trim().to_string());
                        }
                    }
                    QuestionField::Field("text") => question.text = Some(value.trim().to_string()),
                    QuestionField::Field("type") => question.kind = Some(value.clone()),
                    QuestionField::Field("position") => question.position = Some(value.clone()),
                    QuestionField::Field("rating_scale") => question.rating_scale = Some(value.clone()),
                    // Checkboxes are only sent when ticked
                    QuestionField::Field("is_required") => {
                        question.is_required = !matches!(value.as_str(), "" | "false" | "0" | "off");
                    }
                    QuestionField::Field(_) => {}
                }
            }
        }
    }

    if title.is_empty() {
        return Err("Название опроса обязательно".into());
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(format!("Название опроса не должно превышать {} символов", MAX_TITLE_CHARS));
    }
    tag_names.retain(|t| !t.is_empty());

    let mut ordered: Vec<(i64, usize, RawQuestion)> = raw
        .into_iter()
        .filter(|(_, q)| q.text.as_deref().is_some_and(|t| !t.is_empty()))
        .map(|(idx, q)| {
            let position = q
                .position
                .as_deref()
                .and_then(|p| p.trim().parse::<i64>().ok())
                .unwrap_or(idx as i64);
            (position, idx, q)
        })
        .collect();
    if ordered.is_empty() {
        return Err("Опрос должен содержать хотя бы один вопрос".into());
    }
    ordered.sort_by_key(|(position, idx, _)| (*position, *idx));

    let mut questions = Vec::with_capacity(ordered.len());
    for (number, (_, _, q)) in ordered.into_iter().enumerate() {
        let text = q.text.unwrap_or_default();
        let kind: QuestionType = q
            .kind
            .as_deref()
            .unwrap_or("single_choice")
            .parse()
            .map_err(|_| format!("Некорректный тип вопроса '{}'", text))?;

        let options: Vec<String> = match kind {
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                let options: Vec<String> = q.options.into_values().collect();
                if options.is_empty() {
                    return Err(format!("Вопрос '{}' должен содержать варианты ответа", text));
                }
                options
            }
            _ => Vec::new(),
        };

        let rating_scale = (kind == QuestionType::Rating).then(|| {
            q.rating_scale
                .as_deref()
                .and_then(|s| s.trim().parse::<u32>().ok())
                .unwrap_or(DEFAULT_RATING_SCALE)
                .clamp(MIN_RATING_SCALE, MAX_RATING_SCALE)
        });

        questions.push(QuestionCreate {
            text,
            kind,
            position: number as i64 + 1,
            is_required: q.is_required,
            rating_scale,
            options,
        });
    }

    Ok(SurveyCreateForm {
        title,
        description,
        tag_names,
        questions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn bracket_keys_are_understood() {
        assert!(matches!(parse_question_key("questions[2][text]"), Some((2, QuestionField::Field("text")))));
        assert!(matches!(parse_question_key("questions[0][options][4]"), Some((0, QuestionField::Option(4)))));
        assert!(parse_question_key("questions[x][text]").is_none());
        assert!(parse_question_key("questions[1][text]extra").is_none());
        assert!(parse_question_key("title").is_none());
    }

    #[test]
    fn questions_are_ordered_by_position_and_renumbered() {
        let form = parse_survey_form(&pairs(&[
            ("title", " Опрос "),
            ("description", "Описание"),
            ("tag_names", "спорт"),
            ("tag_names", ""),
            ("questions[0][text]", "Второй"),
            ("questions[0][type]", "text_answer"),
            ("questions[0][position]", "20"),
            ("questions[5][text]", "Первый"),
            ("questions[5][type]", "multiple_choice"),
            ("questions[5][position]", "10"),
            ("questions[5][is_required]", "on"),
            ("questions[5][options][1]", "Б"),
            ("questions[5][options][0]", "А"),
            ("questions[5][options][2]", "  "),
        ]))
        .unwrap();

        assert_eq!(form.title, "Опрос");
        assert_eq!(form.tag_names, vec!["спорт".to_string()]);
        assert_eq!(form.questions.len(), 2);
        assert_eq!(form.questions[0].text, "Первый");
        assert_eq!(form.questions[0].position, 1);
        assert!(form.questions[0].is_required);
        assert_eq!(form.questions[0].options, vec!["А".to_string(), "Б".to_string()]);
        assert_eq!(form.questions[1].text, "Второй");
        assert!(!form.questions[1].is_required);
    }

    #[test]
    fn rating_scale_defaults_and_clamps() {
        let form = parse_survey_form(&pairs(&[
            ("title", "T"),
            ("questions[0][text]", "A"),
            ("questions[0][type]", "rating"),
            ("questions[1][text]", "B"),
            ("questions[1][type]", "rating"),
            ("questions[1][rating_scale]", "42"),
            ("questions[2][text]", "C"),
            ("questions[2][type]", "rating"),
            ("questions[2][rating_scale]", "1"),
        ]))
        .unwrap();
        let scales: Vec<Option<u32>> = form.questions.iter().map(|q| q.rating_scale).collect();
        assert_eq!(scales, vec![Some(5), Some(10), Some(2)]);
    }

    #[test]
    fn survey_without_questions_is_rejected() {
        let err = parse_survey_form(&pairs(&[("title", "T"), ("questions[0][text]", "  ")])).unwrap_err();
        assert_eq!(err, "Опрос должен содержать хотя бы один вопрос");
    }

    #[test]
    fn choice_question_needs_options() {
        let err = parse_survey_form(&pairs(&[
            ("title", "T"),
            ("questions[0][text]", "Цвет?"),
            ("questions[0][type]", "single_choice"),
        ]))
        .unwrap_err();
        assert_eq!(err, "Вопрос 'Цвет?' должен содержать варианты ответа");
    }

    #[test]
    fn title_is_required() {
        let err = parse_survey_form(&pairs(&[("questions[0][text]", "Q")])).unwrap_err();
        assert_eq!(err, "Название опроса обязательно");
    }
}
