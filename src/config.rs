use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::{errors::AppError, points::PointsRule};

/// `actix_web::cookie::Key::from` needs at least this many bytes.
pub const SESSION_KEY_MIN: usize = 64;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind: String,
    pub port: u16,
    pub session_key: Vec<u8>,
    pub secure_cookies: bool,
    pub upload_dir: PathBuf,
    pub upload_timeout: Duration,
    pub upload_max_bytes: usize,
    pub listing_bonus: i64,
    pub points_rule: PointsRule,
    pub dashboard_refresh_secs: u64,
    pub placeholder_image: String,
    pub admin_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite://rewear.db".to_owned(),
            bind: "0.0.0.0".to_owned(),
            port: 8080,
            session_key: Vec::new(),
            secure_cookies: false,
            upload_dir: PathBuf::from("uploads"),
            upload_timeout: Duration::from_secs(30),
            upload_max_bytes: 5 * 1024 * 1024,
            listing_bonus: 5,
            points_rule: PointsRule::SizeAdjusted,
            dashboard_refresh_secs: 30,
            placeholder_image: "/static/placeholder.svg".to_owned(),
            admin_email: None,
        }
    }
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigError(format!("{name}: {e}"))),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(AppError::EnvVarError(e)),
    }
}

impl Config {
    /// Read settings from the environment (after `dotenvy` has loaded `.env`).
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Config::default();
        let session_key = env::var("SESSION_KEY").map_err(|e| {
            log::error!("FATAL: SESSION_KEY environment variable not set");
            AppError::EnvVarError(e)
        })?;

        let config = Config {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind: env::var("REWEAR_BIND").unwrap_or(defaults.bind),
            port: parsed("REWEAR_PORT", defaults.port)?,
            session_key: session_key.into_bytes(),
            secure_cookies: parsed("REWEAR_SECURE_COOKIES", defaults.secure_cookies)?,
            upload_dir: env::var("REWEAR_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            upload_timeout: Duration::from_secs(parsed(
                "REWEAR_UPLOAD_TIMEOUT_SECS",
                defaults.upload_timeout.as_secs(),
            )?),
            upload_max_bytes: parsed("REWEAR_UPLOAD_MAX_BYTES", defaults.upload_max_bytes)?,
            listing_bonus: parsed("REWEAR_LISTING_BONUS", defaults.listing_bonus)?,
            points_rule: parsed("REWEAR_POINTS_RULE", defaults.points_rule)?,
            dashboard_refresh_secs: parsed(
                "REWEAR_DASHBOARD_REFRESH_SECS",
                defaults.dashboard_refresh_secs,
            )?,
            placeholder_image: env::var("REWEAR_PLACEHOLDER_IMAGE")
                .unwrap_or(defaults.placeholder_image),
            admin_email: env::var("REWEAR_ADMIN_EMAIL")
                .ok()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.session_key.len() < SESSION_KEY_MIN {
            return Err(AppError::ConfigError(format!(
                "SESSION_KEY must be at least {SESSION_KEY_MIN} bytes"
            )));
        }
        if self.listing_bonus < 0 {
            return Err(AppError::ConfigError(
                "REWEAR_LISTING_BONUS must not be negative".to_owned(),
            ));
        }
        if self.upload_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "REWEAR_UPLOAD_TIMEOUT_SECS must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_email.as_deref() == Some(email)
    }
}
