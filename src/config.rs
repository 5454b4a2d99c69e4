use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::apply::DEFAULT_STEP_TIMEOUT_SECS;
use crate::error::AppError;
use crate::ourgroceries::DEFAULT_BASE_URL;
use crate::session::DEFAULT_SESSION_TTL_HOURS;

pub const HOME_ENV: &str = "MASTERSYNC_HOME";
pub const UPSTREAM_URL_ENV: &str = "MASTERSYNC_UPSTREAM_URL";
pub const SESSION_TTL_ENV: &str = "MASTERSYNC_SESSION_TTL_HOURS";
pub const STEP_TIMEOUT_ENV: &str = "MASTERSYNC_STEP_TIMEOUT_SECS";
pub const LOG_ENV: &str = "MASTERSYNC_LOG";
pub const PASSWORD_ENV: &str = "MASTERSYNC_PASSWORD";
const DEFAULT_HOME_DIR: &str = ".mastersync";
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Clone, Debug)]
pub struct Config {
    pub home: PathBuf,
    pub upstream_url: String,
    pub session_ttl: chrono::Duration,
    pub step_timeout: Duration,
}

impl Config {
    /// Resolves settings from the `--home` flag and the environment.
    pub fn resolve(home_flag: Option<PathBuf>) -> Result<Self, AppError> {
        Self::from_lookup(home_flag, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(home_flag: Option<PathBuf>, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = match home_flag {
            Some(path) => non_empty_path(path, "--home")?,
            None => match lookup(HOME_ENV).filter(|value| !value.trim().is_empty()) {
                Some(value) => PathBuf::from(value),
                None => default_home(lookup("HOME").as_deref())?,
            },
        };

        let upstream_url = lookup(UPSTREAM_URL_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let ttl_hours = parse_positive(SESSION_TTL_ENV, lookup(SESSION_TTL_ENV))?
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS as u64);
        let timeout_secs = parse_positive(STEP_TIMEOUT_ENV, lookup(STEP_TIMEOUT_ENV))?
            .unwrap_or(DEFAULT_STEP_TIMEOUT_SECS);

        Ok(Self {
            home,
            upstream_url,
            session_ttl: chrono::Duration::hours(ttl_hours as i64),
            step_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn non_empty_path(path: PathBuf, flag: &str) -> Result<PathBuf, AppError> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{flag} is empty")));
    }
    Ok(path)
}

fn default_home(user_home: Option<&str>) -> Result<PathBuf, AppError> {
    let user_home = user_home
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            AppError::InvalidInput(format!("unable to resolve home directory; set {HOME_ENV}"))
        })?;
    Ok(Path::new(user_home).join(DEFAULT_HOME_DIR))
}

fn parse_positive(key: &str, raw: Option<String>) -> Result<Option<u64>, AppError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.parse::<u64>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(AppError::InvalidInput(format!(
            "{key} must be a positive integer, got '{trimmed}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(flag: Option<&str>, env: &[(&str, &str)]) -> Result<Config, AppError> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(flag.map(PathBuf::from), |key| env.get(key).cloned())
    }

    #[test]
    fn defaults_come_from_user_home() {
        let config = resolve(None, &[("HOME", "/home/u")]).expect("config");
        assert_eq!(config.home, PathBuf::from("/home/u/.mastersync"));
        assert_eq!(config.upstream_url, DEFAULT_BASE_URL);
        assert_eq!(config.session_ttl, chrono::Duration::hours(12));
        assert_eq!(config.step_timeout, Duration::from_secs(30));
    }

    #[test]
    fn flag_beats_environment() {
        let config = resolve(
            Some("/tmp/flag"),
            &[(HOME_ENV, "/tmp/env"), ("HOME", "/home/u")],
        )
        .expect("config");
        assert_eq!(config.home, PathBuf::from("/tmp/flag"));

        let config = resolve(None, &[(HOME_ENV, "/tmp/env")]).expect("config");
        assert_eq!(config.home, PathBuf::from("/tmp/env"));
    }

    #[test]
    fn numeric_settings_are_validated() {
        let config = resolve(
            None,
            &[
                ("HOME", "/h"),
                (SESSION_TTL_ENV, "2"),
                (STEP_TIMEOUT_ENV, " 5 "),
                (UPSTREAM_URL_ENV, "http://127.0.0.1:9"),
            ],
        )
        .expect("config");
        assert_eq!(config.session_ttl, chrono::Duration::hours(2));
        assert_eq!(config.step_timeout, Duration::from_secs(5));
        assert_eq!(config.upstream_url, "http://127.0.0.1:9");

        let err = resolve(None, &[("HOME", "/h"), (STEP_TIMEOUT_ENV, "0")])
            .err()
            .expect("zero timeout");
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn missing_home_is_an_error() {
        assert!(resolve(None, &[]).is_err());
        assert!(resolve(Some(" "), &[("HOME", "/h")]).is_err());
    }
}
