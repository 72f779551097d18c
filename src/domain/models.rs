use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role")]
pub enum Role {
    #[sqlx(rename = "LMHTX")]
    #[serde(rename = "LMHTX")]
    Lmhtx,
    #[sqlx(rename = "QTD")]
    #[serde(rename = "QTD")]
    Qtd,
    #[sqlx(rename = "HTX")]
    #[serde(rename = "HTX")]
    Htx,
    #[sqlx(rename = "admin")]
    #[serde(rename = "admin")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Lmhtx => "LMHTX",
            Role::Qtd => "QTD",
            Role::Htx => "HTX",
            Role::Admin => "admin",
        }
    }

    /// Admins manage surveys but never answer them.
    pub fn is_respondent(&self) -> bool {
        !matches!(self, Role::Admin)
    }

    /// Roles allowed to read statistics dashboards.
    pub fn can_view_stats(&self) -> bool {
        matches!(self, Role::Admin | Role::Lmhtx)
    }
}

impl TryFrom<&str> for Role {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "LMHTX" => Ok(Role::Lmhtx),
            "QTD" => Ok(Role::Qtd),
            "HTX" => Ok(Role::Htx),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
    Pnn,
    Nn,
}

/// Membership of a respondent in the cooperative: `Tv` is a member, `Ktv` is not.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "member_kind", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberKind {
    Ktv,
    Tv,
}

/// Answer scale stored in `results.answer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SatisfactionLevel {
    NotSatisfied = 1,
    Partially = 3,
    Satisfied = 5,
}

impl SatisfactionLevel {
    pub fn points(&self) -> i16 {
        *self as i16
    }
}

impl TryFrom<i16> for SatisfactionLevel {
    type Error = i16;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SatisfactionLevel::NotSatisfied),
            3 => Ok(SatisfactionLevel::Partially),
            5 => Ok(SatisfactionLevel::Satisfied),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Province {
    pub id: i32,
    pub name: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ward {
    pub id: i32,
    pub name: String,
    pub province_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Survey {
    pub id: i32,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct AccessRule {
    pub survey_id: i32,
    pub role: Role,
    #[serde(rename = "type")]
    pub user_type: Option<UserType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i32,
    pub survey_id: i32,
    pub question_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSurveyStatus {
    pub user_id: Uuid,
    pub survey_id: i32,
    pub is_locked: bool,
    pub survey_time: Option<DateTime<Utc>>,
    pub point: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_rule_uses_type_key() {
        let rule = AccessRule {
            survey_id: 3,
            role: Role::Htx,
            user_type: Some(UserType::Nn),
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "NN");
        assert!(json.get("user_type").is_none());

        let parsed: AccessRule =
            serde_json::from_str(r#"{"survey_id":3,"role":"QTD","type":null}"#).unwrap();
        assert_eq!(parsed.user_type, None);
    }

    #[test]
    fn satisfaction_scale_accepts_only_odd_levels() {
        assert_eq!(SatisfactionLevel::try_from(1), Ok(SatisfactionLevel::NotSatisfied));
        assert_eq!(SatisfactionLevel::try_from(3), Ok(SatisfactionLevel::Partially));
        assert_eq!(SatisfactionLevel::try_from(5), Ok(SatisfactionLevel::Satisfied));
        assert_eq!(SatisfactionLevel::try_from(2), Err(2));
        assert_eq!(SatisfactionLevel::try_from(0), Err(0));
        assert_eq!(SatisfactionLevel::Satisfied.points(), 5);
    }

    #[test]
    fn role_names_round_trip_through_serde() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let parsed: Role = serde_json::from_str("\"LMHTX\"").unwrap();
        assert_eq!(parsed, Role::Lmhtx);
        assert_eq!(Role::try_from("HTX"), Ok(Role::Htx));
        assert!(Role::try_from("htx").is_err());
    }

    #[test]
    fn only_admin_and_province_union_view_stats() {
        assert!(Role::Admin.can_view_stats());
        assert!(Role::Lmhtx.can_view_stats());
        assert!(!Role::Htx.can_view_stats());
        assert!(!Role::Admin.is_respondent());
        assert!(Role::Qtd.is_respondent());
    }
}
