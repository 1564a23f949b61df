use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Bearer access token issued by `auth.login`.
    #[serde(default)]
    pub token: Option<String>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
    /// Set by `--mock`; wins over the workspace config.
    pub force_mock: bool,
}

impl AppState {
    pub fn new(force_mock: bool) -> Self {
        Self {
            workspace: None,
            db: None,
            config: Config::default(),
            force_mock,
        }
    }

    pub fn mock_data(&self) -> bool {
        self.force_mock || self.config.mock_data
    }
}
