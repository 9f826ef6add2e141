use chrono::Duration;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub keys_dir: String,
    pub token_max_age_hours: i64,
    pub global_channel_name: String,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            keys_dir: "./keys".to_string(),
            token_max_age_hours: 24,
            global_channel_name: "Global Channel".to_string(),
            log_filter: "info,messenger_core=debug".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Config::default();

        let token_max_age_hours = match std::env::var("TOKEN_MAX_AGE_HOURS") {
            Ok(raw) => parse_max_age_hours(&raw)?,
            Err(_) => defaults.token_max_age_hours,
        };

        Ok(Config {
            keys_dir: std::env::var("MESSENGER_KEYS_DIR").unwrap_or(defaults.keys_dir),
            token_max_age_hours,
            global_channel_name: std::env::var("GLOBAL_CHANNEL_NAME")
                .unwrap_or(defaults.global_channel_name),
            log_filter: std::env::var("MESSENGER_LOG").unwrap_or(defaults.log_filter),
        })
    }

    /// Fails for hours that are not positive or don't fit a `Duration`.
    pub fn token_max_age(&self) -> Result<Duration, AppError> {
        max_age_from_hours(self.token_max_age_hours)
    }
}

fn parse_max_age_hours(raw: &str) -> Result<i64, AppError> {
    let hours: i64 = raw
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid TOKEN_MAX_AGE_HOURS: {}", e)))?;

    // Reject now rather than when the token authority is built.
    max_age_from_hours(hours)?;
    Ok(hours)
}

fn max_age_from_hours(hours: i64) -> Result<Duration, AppError> {
    if hours <= 0 {
        return Err(AppError::Config("TOKEN_MAX_AGE_HOURS must be positive".to_string()));
    }
    Duration::try_hours(hours).ok_or_else(|| {
        AppError::Config(format!("TOKEN_MAX_AGE_HOURS {} is out of range", hours))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_max_age() {
        assert_eq!(Config::default().token_max_age().unwrap(), Duration::hours(24));
    }

    #[test]
    fn test_max_age_parsing() {
        assert_eq!(parse_max_age_hours(" 48 ").unwrap(), 48);
        assert!(matches!(parse_max_age_hours("0"), Err(AppError::Config(_))));
        assert!(matches!(parse_max_age_hours("-3"), Err(AppError::Config(_))));
        assert!(matches!(parse_max_age_hours("soon"), Err(AppError::Config(_))));
        assert!(matches!(parse_max_age_hours("3000000000000"), Err(AppError::Config(_))));
    }

    #[test]
    fn test_out_of_range_max_age_is_an_error() {
        let config = Config {
            token_max_age_hours: 3_000_000_000_000,
            ..Config::default()
        };
        assert!(matches!(config.token_max_age(), Err(AppError::Config(_))));
    }
}
