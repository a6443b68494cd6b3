use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Lecturer,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Lecturer => "lecturer",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "lecturer" => Ok(Role::Lecturer),
            "student" => Ok(Role::Student),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        self.role.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lecturer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub firstname: String,
    pub surname: String,
    pub othernames: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub user_id: Uuid,
    pub registration_number: String,
    pub firstname: String,
    pub surname: String,
    pub othernames: Option<String>,
    pub year_of_study: Option<i32>,
    pub semester: Option<i32>,
    pub hobbies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LecturerAccount {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lecturer: Lecturer,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentAccount {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub student: Student,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailVerification {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub code_hash: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: i32,
}

impl EmailVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether one more wrong code uses up the allowed attempts.
    pub fn is_last_attempt(&self, max_attempts: i32) -> bool {
        self.attempts + 1 >= max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Lecturer".parse::<Role>().unwrap(), Role::Lecturer);
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert!("hr".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn verification_runs_out_of_attempts() {
        let now = Utc::now();
        let mut v = EmailVerification {
            id: Uuid::new_v4(),
            email: "a@b.com".into(),
            role: "student".into(),
            code_hash: String::new(),
            data: serde_json::Value::Null,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(15),
            attempts: 0,
        };
        assert!(!v.is_last_attempt(5));
        assert!(!v.is_expired(now));
        v.attempts = 4;
        assert!(v.is_last_attempt(5));
    }
}
