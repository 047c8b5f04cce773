//! Connection settings for a Piccolo Admin instance.

use serde::Deserialize;

use crate::error::{AdminError, AdminResult};

pub const CREDENTIALS_PATH: &str = "~/.config/piccolo-admin/credentials.json";
pub const DEFAULT_PAGE_SIZE: usize = 15;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the admin lives and how to authenticate.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdminConfig {
    /// Admin root, e.g. `http://localhost:8000/admin/`.
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Existing session cookie, used instead of logging in.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl AdminConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            username: None,
            password: None,
            session_id: None,
            csrf_token: None,
            page_size: DEFAULT_PAGE_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Load from `PICCOLO_ADMIN_*` env vars, falling back to the credentials
    /// file for anything unset.
    pub fn load() -> AdminResult<Self> {
        let file = Self::from_file(&shellexpand::tilde(CREDENTIALS_PATH))?;
        Self::from_sources(|key| std::env::var(key).ok(), file)
    }

    fn from_file(path: &str) -> AdminResult<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| AdminError::Config(format!("Failed to parse {}: {}", path, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AdminError::Config(format!("Failed to read {}: {}", path, e))),
        }
    }

    fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        file: Option<AdminConfig>,
    ) -> AdminResult<Self> {
        let base_url = env("PICCOLO_ADMIN_URL")
            .or_else(|| file.as_ref().map(|f| f.base_url.clone()))
            .ok_or_else(|| {
                AdminError::Config(format!(
                    "PICCOLO_ADMIN_URL not set and {} not found",
                    CREDENTIALS_PATH
                ))
            })?;

        let mut config = file.unwrap_or_else(|| AdminConfig::new(base_url.clone()));
        config.base_url = normalize_base_url(&base_url);

        if let Some(username) = env("PICCOLO_ADMIN_USERNAME") {
            config.username = Some(username);
        }
        if let Some(password) = env("PICCOLO_ADMIN_PASSWORD") {
            config.password = Some(password);
        }
        if let Some(session_id) = env("PICCOLO_ADMIN_SESSION") {
            config.session_id = Some(session_id);
        }
        if let Some(token) = env("PICCOLO_ADMIN_CSRF_TOKEN") {
            config.csrf_token = Some(token);
        }
        if let Some(page_size) = env("PICCOLO_ADMIN_PAGE_SIZE") {
            config.page_size = page_size
                .parse()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| AdminError::Config(format!("Invalid page size: {}", page_size)))?;
        }

        Ok(config)
    }
}

/// Ensure a trailing slash so relative paths join under the admin root.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_only() {
        let config = AdminConfig::from_sources(
            env_from(&[
                ("PICCOLO_ADMIN_URL", "http://localhost:8000/admin"),
                ("PICCOLO_ADMIN_USERNAME", "piccolo"),
                ("PICCOLO_ADMIN_PAGE_SIZE", "50"),
            ]),
            None,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:8000/admin/");
        assert_eq!(config.username.as_deref(), Some("piccolo"));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: AdminConfig = serde_json::from_str(
            r#"{"base_url": "http://file/admin/", "username": "file-user", "password": "secret"}"#,
        )
        .unwrap();
        let config = AdminConfig::from_sources(
            env_from(&[("PICCOLO_ADMIN_USERNAME", "env-user")]),
            Some(file),
        )
        .unwrap();

        assert_eq!(config.base_url, "http://file/admin/");
        assert_eq!(config.username.as_deref(), Some("env-user"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_missing_url_is_an_error() {
        let err = AdminConfig::from_sources(env_from(&[]), None).unwrap_err();
        assert!(err.to_string().contains("PICCOLO_ADMIN_URL"));
    }

    #[test]
    fn test_invalid_page_size() {
        let err = AdminConfig::from_sources(
            env_from(&[("PICCOLO_ADMIN_URL", "http://x/"), ("PICCOLO_ADMIN_PAGE_SIZE", "0")]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, AdminError::Config(_)));
    }
}
