use serde::{Deserialize, Serialize};

use crate::models::QuestionType;

// -- JWT Claims --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims for both cookie tokens. `sub` carries the user's email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub full_name: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_email(self.email.trim()) {
            return Err("Некорректный email".into());
        }
        let name_len = self.full_name.trim().chars().count();
        if !(2..=100).contains(&name_len) {
            return Err("Имя должно содержать от 2 до 100 символов".into());
        }
        if self.password.chars().count() < 6 {
            return Err("Пароль должен содержать минимум 6 символов".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

// -- Profile --

/// HTML forms send empty strings for untouched inputs; those become `None`
/// through [`ProfileForm::normalized`].
#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub full_name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_id: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub city: Option<String>,
    pub country_id: Option<i64>,
    pub birth_date: Option<chrono::NaiveDate>,
}

impl ProfileForm {
    pub fn normalized(self) -> Result<ProfileUpdate, String> {
        let full_name = self.full_name.trim().to_string();
        if full_name.chars().count() < 2 {
            return Err("Имя должно содержать минимум 2 символа".into());
        }

        let country_id = match non_empty(self.country_id) {
            Some(raw) => Some(
                raw.parse::<i64>()
                    .map_err(|_| "Некорректная страна".to_string())?,
            ),
            None => None,
        };

        let birth_date = match non_empty(self.birth_date) {
            Some(raw) => Some(
                chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| "Некорректная дата рождения".to_string())?,
            ),
            None => None,
        };

        Ok(ProfileUpdate {
            full_name,
            city: non_empty(self.city),
            country_id,
            birth_date,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChangeForm {
    pub fn validate(&self) -> Result<(), String> {
        if self.new_password.chars().count() < 6 {
            return Err("Пароль должен содержать минимум 6 символов".into());
        }
        if self.new_password != self.confirm_password {
            return Err("Новые пароли не совпадают".into());
        }
        Ok(())
    }
}

// -- Surveys --

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionCreate {
    pub text: String,
    pub kind: QuestionType,
    pub position: i64,
    pub is_required: bool,
    pub rating_scale: Option<u32>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyCreateForm {
    pub title: String,
    pub description: String,
    pub tag_names: Vec<String>,
    /// Sorted by `position`.
    pub questions: Vec<QuestionCreate>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_is_checked() {
        assert!(is_valid_email("anna@example.com"));
        assert!(!is_valid_email("anna.example.com"));
        assert!(!is_valid_email("anna@localhost"));
        assert!(!is_valid_email("an na@example.com"));
    }

    #[test]
    fn profile_empty_fields_become_none() {
        let form = ProfileForm {
            full_name: "  Анна ".into(),
            city: Some("".into()),
            country_id: Some("".into()),
            birth_date: Some("".into()),
        };
        let update = form.normalized().unwrap();
        assert_eq!(update.full_name, "Анна");
        assert_eq!(update.city, None);
        assert_eq!(update.country_id, None);
        assert_eq!(update.birth_date, None);
    }

    #[test]
    fn profile_parses_date_and_country() {
        let form = ProfileForm {
            full_name: "Иван".into(),
            city: Some("Казань".into()),
            country_id: Some("3".into()),
            birth_date: Some("2000-01-01".into()),
        };
        let update = form.normalized().unwrap();
        assert_eq!(update.country_id, Some(3));
        assert_eq!(update.birth_date, chrono::NaiveDate::from_ymd_opt(2000, 1, 1));
    }

    #[test]
    fn password_confirmation_must_match() {
        let form = PasswordChangeForm {
            old_password: "old-pass".into(),
            new_password: "secret1".into(),
            confirm_password: "secret2".into(),
        };
        assert_eq!(form.validate().unwrap_err(), "Новые пароли не совпадают");
    }
}
