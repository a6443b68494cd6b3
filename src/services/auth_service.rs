use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::dto::auth_dto::{RegisterStudentRequest, TokenResponse};
use crate::error::{Error, Result};
use crate::models::user::{EmailVerification, Role, Student, User};
use crate::services::user_service::{
    email_taken, hash, insert_student, insert_user, normalize_email, registration_number_taken,
    NewStudent,
};
use crate::utils::crypto::{code_matches, hash_code, verify_password};
use crate::utils::jwt::{decode_token, issue_token, Claims, TokenType};
use crate::utils::token::generate_numeric_code;

pub const VERIFICATION_CODE_DIGITS: usize = 6;
pub const VERIFICATION_TTL_MINUTES: i64 = 15;
pub const MAX_VERIFICATION_ATTEMPTS: i32 = 5;

/// Registration details held until the email is verified. The password is
/// already hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PendingStudent {
    password_hash: String,
    registration_number: String,
    firstname: String,
    surname: String,
    othernames: Option<String>,
    year_of_study: Option<i32>,
    semester: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    pub role: Role,
}

impl IssuedTokens {
    pub fn into_token_response(self) -> TokenResponse {
        TokenResponse {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: "Bearer".to_string(),
            user_id: self.user.id,
            role: self.role,
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    jwt_secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
        }
    }

    pub fn decode(&self, token: &str) -> Result<Claims> {
        decode_token(&self.jwt_secret, token)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedTokens> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::Unauthorized("Invalid email or password".into()))?;

        let valid = verify_password(password, &user.password_hash)
            .map_err(|e| Error::Internal(format!("Stored password hash is unreadable: {}", e)))?;
        if !valid {
            tracing::warn!(user_id = %user.id, "Failed login attempt");
            return Err(Error::Unauthorized("Invalid email or password".into()));
        }
        let role = user
            .role()
            .ok_or_else(|| Error::Internal(format!("User {} has an unknown role", user.id)))?;

        let (access_token, _) =
            issue_token(&self.jwt_secret, user.id, role, TokenType::Access, self.access_ttl)?;
        let (refresh_token, _) =
            issue_token(&self.jwt_secret, user.id, role, TokenType::Refresh, self.refresh_ttl)?;
        tracing::info!(user_id = %user.id, role = %role, "User logged in");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            user,
            role,
        })
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<String> {
        let claims = self.decode(refresh_token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(Error::Unauthorized("A refresh token is required".into()));
        }
        if self.is_revoked(&claims.jti).await? {
            return Err(Error::Unauthorized("Token has been revoked".into()));
        }
        let user_id = claims.user_id()?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(Error::Unauthorized("Account no longer exists".into()));
        }
        let (access_token, _) = issue_token(
            &self.jwt_secret,
            user_id,
            claims.role,
            TokenType::Access,
            self.access_ttl,
        )?;
        Ok(access_token)
    }

    /// Records the token's id until the token would have expired anyway.
    pub async fn revoke(&self, claims: &Claims) -> Result<()> {
        let expires_at: DateTime<Utc> = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now);
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(&claims.jti)
        .bind(claims.user_id().ok())
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        tracing::info!(jti = %claims.jti, sub = %claims.sub, "Token revoked");
        Ok(())
    }

    pub async fn is_revoked(&self, jti: &str) -> Result<bool> {
        let revoked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = $1 AND expires_at > NOW())",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?;
        Ok(revoked)
    }

    /// Users reset their own password; admins may reset anyone's.
    pub async fn reset_password(&self, caller: &Claims, email: &str, new_password: &str) -> Result<()> {
        let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("User not found".into()))?;
        if caller.role != Role::Admin && caller.user_id()? != target.id {
            tracing::warn!(caller = %caller.sub, target = %target.id, "Password reset for another account refused");
            return Err(Error::Forbidden("You can only reset your own password".into()));
        }
        let password_hash = hash(new_password)?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(target.id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        tracing::info!(user_id = %target.id, "Password reset");
        Ok(())
    }

    /// Stores a pending registration and returns the plain verification code
    /// for delivery.
    pub async fn request_registration(&self, req: RegisterStudentRequest) -> Result<String> {
        let email = normalize_email(&req.email);
        let mut conn = self.pool.acquire().await?;
        if email_taken(&mut conn, &email).await? {
            return Err(Error::Conflict("Email already registered".into()));
        }
        if registration_number_taken(&mut conn, &req.registration_number).await? {
            return Err(Error::Conflict("Registration number already registered".into()));
        }
        drop(conn);

        let pending = PendingStudent {
            password_hash: hash(&req.password)?,
            registration_number: req.registration_number.trim().to_string(),
            firstname: req.firstname.trim().to_string(),
            surname: req.surname.trim().to_string(),
            othernames: req.othernames.map(|s| s.trim().to_string()),
            year_of_study: req.year_of_study,
            semester: req.semester,
        };
        let code = generate_numeric_code(VERIFICATION_CODE_DIGITS);

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM email_verifications WHERE email = $1")
            .bind(&email)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO email_verifications (id, email, role, code_hash, data, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(Role::Student.as_str())
        .bind(hash_code(&code))
        .bind(serde_json::to_value(&pending)?)
        .bind(Utc::now() + Duration::minutes(VERIFICATION_TTL_MINUTES))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(email = %email, "Registration pending email verification");
        tracing::debug!(email = %email, code = %code, "Verification code issued");
        Ok(code)
    }

    pub async fn verify_registration(&self, email: &str, code: &str) -> Result<Student> {
        let email = normalize_email(email);
        let mut tx = self.pool.begin().await?;
        let verification = sqlx::query_as::<_, EmailVerification>(
            r#"
            SELECT * FROM email_verifications
            WHERE email = $1
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&email)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::BadRequest("No pending registration for this email".into()))?;

        if verification.is_expired(Utc::now()) {
            return Err(Error::BadRequest("Verification code has expired".into()));
        }
        if !code_matches(code, &verification.code_hash) {
            tracing::warn!(email = %email, attempts = verification.attempts + 1, "Invalid verification code");
            if verification.is_last_attempt(MAX_VERIFICATION_ATTEMPTS) {
                sqlx::query("DELETE FROM email_verifications WHERE email = $1")
                    .bind(&email)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                return Err(Error::BadRequest(
                    "Too many invalid codes. Register again to receive a new code".into(),
                ));
            }
            sqlx::query("UPDATE email_verifications SET attempts = attempts + 1 WHERE id = $1")
                .bind(verification.id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Err(Error::BadRequest("Invalid verification code".into()));
        }

        let pending: PendingStudent = serde_json::from_value(verification.data.clone())?;
        if email_taken(&mut tx, &email).await? {
            return Err(Error::Conflict("Email already registered".into()));
        }
        let user = insert_user(&mut tx, &email, &pending.password_hash, Role::Student).await?;
        let student = insert_student(
            &mut tx,
            user.id,
            &NewStudent {
                registration_number: &pending.registration_number,
                firstname: &pending.firstname,
                surname: &pending.surname,
                othernames: pending.othernames.as_deref(),
                year_of_study: pending.year_of_study,
                semester: pending.semester,
            },
        )
        .await?;
        sqlx::query("DELETE FROM email_verifications WHERE email = $1")
            .bind(&email)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, student_id = %student.id, "Email verified, student registered");
        Ok(student)
    }

    /// Creates the configured super admin when no admin account exists.
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let has_admin: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&mut *tx)
                .await?;
        if has_admin {
            return Ok(false);
        }
        if email_taken(&mut tx, email).await? {
            tracing::warn!(email = %email, "Super admin email belongs to a non-admin account");
            return Ok(false);
        }
        insert_user(&mut tx, email, &hash(password)?, Role::Admin).await?;
        tx.commit().await?;
        tracing::info!(email = %email, "Super admin created");
        Ok(true)
    }

    pub async fn purge_expired(&self) -> Result<(u64, u64)> {
        let tokens = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        let verifications = sqlx::query("DELETE FROM email_verifications WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok((tokens, verifications))
    }
}
