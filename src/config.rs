use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub openai_api_key: String,
    pub ai_base_url: String,
    pub ai_model: String,
    pub ai_image_model: String,
    pub ai_timeout_secs: u64,
    pub upload_folder: String,
    pub max_upload_bytes: usize,
    pub allowed_image_extensions: Vec<String>,
    pub cors_origins: Vec<String>,
    pub super_admin_email: Option<String>,
    pub super_admin_password: Option<String>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env_or("SERVER_ADDRESS", "0.0.0.0:8080"),
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            access_token_ttl_minutes: get_env_parse_or("ACCESS_TOKEN_TTL_MINUTES", 60)?,
            refresh_token_ttl_days: get_env_parse_or("REFRESH_TOKEN_TTL_DAYS", 30)?,
            openai_api_key: get_env("OPENAI_API_KEY")?,
            ai_base_url: get_env_or("AI_BASE_URL", "https://api.openai.com/v1"),
            ai_model: get_env_or("AI_MODEL", "gpt-4o"),
            ai_image_model: get_env_or("AI_IMAGE_MODEL", "gpt-4o"),
            ai_timeout_secs: get_env_parse_or("AI_TIMEOUT_SECS", 120)?,
            upload_folder: get_env_or("UPLOAD_FOLDER", "./uploads"),
            max_upload_bytes: get_env_parse_or("MAX_UPLOAD_BYTES", 16 * 1024 * 1024)?,
            allowed_image_extensions: split_list(&get_env_or(
                "ALLOWED_IMAGE_EXTENSIONS",
                "png,jpg,jpeg",
            )),
            cors_origins: split_list(&get_env_or("CORS_ORIGINS", "http://localhost:3000")),
            super_admin_email: env::var("SUPER_ADMIN_EMAIL").ok(),
            super_admin_password: env::var("SUPER_ADMIN_PASSWORD").ok(),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

/// Installs `config` unless one is already present. Integration tests share a
/// process, so the first installer wins.
pub fn install_config(config: Config) -> &'static Config {
    CONFIG.get_or_init(|| config)
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
