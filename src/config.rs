//! Runtime configuration read from the environment.

use std::env;

use crate::error::{CrmError, CrmResult};
use crate::followups::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    /// Look-ahead horizon shared by every follow-up read path.
    pub follow_up_window_days: i64,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// - `DATABASE_URL` (required)
    /// - `CRM_MAX_CONNECTIONS` (default 5)
    /// - `CRM_FOLLOW_UP_WINDOW_DAYS` (default 7)
    pub fn from_env() -> CrmResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CrmResult<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| CrmError::Config("DATABASE_URL must be set".to_string()))?;

        let max_connections = match lookup("CRM_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or_else(|| {
                    CrmError::Config(format!("CRM_MAX_CONNECTIONS must be a positive integer, got {raw:?}"))
                })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let follow_up_window_days = match lookup("CRM_FOLLOW_UP_WINDOW_DAYS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|value| (0..=MAX_WINDOW_DAYS).contains(value))
                .ok_or_else(|| {
                    CrmError::Config(format!(
                        "CRM_FOLLOW_UP_WINDOW_DAYS must be between 0 and {MAX_WINDOW_DAYS}, got {raw:?}"
                    ))
                })?,
            None => DEFAULT_WINDOW_DAYS,
        };

        Ok(Self {
            database_url,
            max_connections,
            follow_up_window_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> CrmResult<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/crm")]).unwrap();
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.follow_up_window_days, 7);
    }

    #[test]
    fn database_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, CrmError::Config(_)));
    }

    #[test]
    fn rejects_negative_window() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("CRM_FOLLOW_UP_WINDOW_DAYS", "-1"),
        ])
        .unwrap_err();
        assert!(matches!(err, CrmError::Config(_)));
    }

    #[test]
    fn rejects_window_beyond_limit() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("CRM_FOLLOW_UP_WINDOW_DAYS", "200000000"),
        ])
        .unwrap_err();
        assert!(matches!(err, CrmError::Config(_)));

        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("CRM_FOLLOW_UP_WINDOW_DAYS", "3650"),
        ])
        .unwrap();
        assert_eq!(config.follow_up_window_days, MAX_WINDOW_DAYS);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/crm"),
            ("CRM_MAX_CONNECTIONS", "12"),
            ("CRM_FOLLOW_UP_WINDOW_DAYS", "14"),
        ])
        .unwrap();
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.follow_up_window_days, 14);
    }
}
