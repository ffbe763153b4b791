use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored or submitted enum value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Lifecycle of a survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStatus {
    Draft,
    Active,
    Completed,
    Archived,
}

impl SurveyStatus {
    pub const ALL: [SurveyStatus; 4] = [Self::Draft, Self::Active, Self::Completed, Self::Archived];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "Черновик",
            Self::Active => "Активен",
            Self::Completed => "Завершен",
            Self::Archived => "В архиве",
        }
    }
}

impl FromStr for SurveyStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVariant { kind: "survey status", value: s.to_string() })
    }
}

impl fmt::Display for SurveyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TextAnswer,
    Rating,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] =
        [Self::SingleChoice, Self::MultipleChoice, Self::TextAnswer, Self::Rating];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleChoice => "single_choice",
            Self::MultipleChoice => "multiple_choice",
            Self::TextAnswer => "text_answer",
            Self::Rating => "rating",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SingleChoice => "Один вариант",
            Self::MultipleChoice => "Несколько вариантов",
            Self::TextAnswer => "Текстовый ответ",
            Self::Rating => "Оценка",
        }
    }

    /// Answers to these questions reference options rather than free text.
    pub fn uses_options(self) -> bool {
        !matches!(self, Self::TextAnswer)
    }
}

impl FromStr for QuestionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVariant { kind: "question type", value: s.to_string() })
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Creator,
    Admin,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [Self::User, Self::Creator, Self::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Creator => "creator",
            Self::Admin => "admin",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "Пользователь",
            Self::Creator => "Создатель",
            Self::Admin => "Администратор",
        }
    }
}

impl FromStr for UserRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownVariant { kind: "user role", value: s.to_string() })
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_values_match_database_spelling() {
        assert_eq!("multiple_choice".parse::<QuestionType>().unwrap(), QuestionType::MultipleChoice);
        assert_eq!(SurveyStatus::Archived.as_str(), "archived");
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
    }

    #[test]
    fn unknown_value_is_rejected() {
        let err = "poll".parse::<QuestionType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown question type 'poll'");
    }
}
