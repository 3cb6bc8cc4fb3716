use std::env;

use crate::domain::LoanPolicy;

pub const DEFAULT_EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub fine_rate_per_day: f64,
    pub lost_book_fee: f64,
    pub default_loan_days: i64,
    /// Days-before-due window used by `send-reminders` when `--days` is omitted
    pub reminder_days: i64,
    pub push_enabled: bool,
    pub expo_push_url: String,
}

impl Default for Config {
    fn default() -> Self {
        let policy = LoanPolicy::default();
        Self {
            database_url: "sqlite://lms.db?mode=rwc".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
            fine_rate_per_day: policy.fine_rate_per_day,
            lost_book_fee: policy.lost_book_fee,
            default_loan_days: policy.default_loan_days,
            reminder_days: 3,
            push_enabled: true,
            expo_push_url: DEFAULT_EXPO_PUSH_URL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parsed("PORT").unwrap_or(defaults.port),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(Vec::new),
            fine_rate_per_day: parsed("FINE_RATE_PER_DAY")
                .filter(|rate: &f64| *rate >= 0.0)
                .unwrap_or(defaults.fine_rate_per_day),
            lost_book_fee: parsed("LOST_BOOK_FEE")
                .filter(|fee: &f64| *fee >= 0.0)
                .unwrap_or(defaults.lost_book_fee),
            default_loan_days: parsed("DEFAULT_LOAN_DAYS")
                .filter(|days: &i64| *days > 0)
                .unwrap_or(defaults.default_loan_days),
            reminder_days: parsed("REMINDER_DAYS")
                .filter(|days: &i64| *days > 0)
                .unwrap_or(defaults.reminder_days),
            push_enabled: env::var("PUSH_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.push_enabled),
            expo_push_url: env::var("EXPO_PUSH_URL").unwrap_or(defaults.expo_push_url),
        }
    }

    pub fn loan_policy(&self) -> LoanPolicy {
        LoanPolicy {
            fine_rate_per_day: self.fine_rate_per_day,
            lost_book_fee: self.lost_book_fee,
            default_loan_days: self.default_loan_days,
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 5] = [
        "FINE_RATE_PER_DAY",
        "LOST_BOOK_FEE",
        "DEFAULT_LOAN_DAYS",
        "PUSH_ENABLED",
        "CORS_ALLOWED_ORIGINS",
    ];

    fn clear() {
        for key in KEYS {
            // SAFETY: tests touching the environment are serialized
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn defaults_match_loan_policy() {
        clear();
        let config = Config::from_env();
        assert_eq!(config.loan_policy(), LoanPolicy::default());
        assert!(config.push_enabled);
    }

    #[test]
    #[serial]
    fn reads_circulation_settings() {
        clear();
        unsafe {
            env::set_var("FINE_RATE_PER_DAY", "1.25");
            env::set_var("DEFAULT_LOAN_DAYS", "21");
            env::set_var("PUSH_ENABLED", "false");
            env::set_var("CORS_ALLOWED_ORIGINS", "http://a.test, ,http://b.test");
        }
        let config = Config::from_env();
        assert_eq!(config.fine_rate_per_day, 1.25);
        assert_eq!(config.default_loan_days, 21);
        assert!(!config.push_enabled);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        clear();
    }

    #[test]
    #[serial]
    fn rejects_negative_or_zero_values() {
        clear();
        unsafe {
            env::set_var("LOST_BOOK_FEE", "-3");
            env::set_var("DEFAULT_LOAN_DAYS", "0");
        }
        let config = Config::from_env();
        assert_eq!(config.lost_book_fee, 25.0);
        assert_eq!(config.default_loan_days, 14);
        clear();
    }
}
