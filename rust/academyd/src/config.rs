use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE: &str = "academyd.json";
const MAX_ACCESS_TOKEN_TTL_MINUTES: i64 = 60 * 24 * 30;
const MAX_REFRESH_TOKEN_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

/// Per-workspace daemon settings, read from `academyd.json` when a workspace is selected.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub mock_data: bool,
    pub default_page_size: i64,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub password_iterations: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mock_data: false,
            default_page_size: 10,
            access_token_ttl_minutes: 60,
            refresh_token_ttl_days: 7,
            password_iterations: 10_000,
            bootstrap_admin: None,
        }
    }
}

impl Config {
    pub fn load(workspace: &Path) -> anyhow::Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        let mut cfg = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
            Self::from_json(&text)
                .with_context(|| format!("invalid config {}", path.to_string_lossy()))?
        } else {
            Self::default()
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg.sanitized())
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(text)?)
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("ACADEMYD_MOCK_DATA") {
            self.mock_data = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        let username = get("ACADEMYD_ADMIN_USERNAME");
        let password = get("ACADEMYD_ADMIN_PASSWORD");
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            let username = username
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "admin".to_string());
            self.bootstrap_admin = Some(BootstrapAdmin { username, password });
        }
    }

    // Out-of-range values fall back to defaults instead of failing the workspace open.
    fn sanitized(mut self) -> Self {
        let d = Self::default();
        if self.default_page_size < 1 {
            self.default_page_size = d.default_page_size;
        }
        if !(1..=MAX_ACCESS_TOKEN_TTL_MINUTES).contains(&self.access_token_ttl_minutes) {
            self.access_token_ttl_minutes = d.access_token_ttl_minutes;
        }
        if !(1..=MAX_REFRESH_TOKEN_TTL_DAYS).contains(&self.refresh_token_ttl_days) {
            self.refresh_token_ttl_days = d.refresh_token_ttl_days;
        }
        if self.password_iterations == 0 {
            self.password_iterations = d.password_iterations;
        }
        self
    }
}
