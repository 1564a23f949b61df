use crate::auth;
use crate::config::Config;
use crate::db;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_health(state: &mut AppState, _req: &Request) -> ApiResult {
    let schema_version = state
        .db
        .as_ref()
        .and_then(|conn| db::settings_get_json(conn, "schema").ok().flatten())
        .and_then(|v| v.get("version").and_then(|v| v.as_i64()));
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "schemaVersion": schema_version,
        "mockData": state.mock_data(),
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> ApiResult {
    let path = PathBuf::from(required_str(req, "path")?);
    open_workspace(state, &path)?;
    Ok(json!({
        "workspacePath": path.to_string_lossy(),
        "mockData": state.mock_data(),
    }))
}

/// Opens (or reopens) the workspace database and its config. Also used at
/// startup for `--workspace` and after a backup restore.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<(), ApiError> {
    let conn = db::open_db(path).map_err(|e| ApiError::Db {
        code: "db_open_failed",
        message: format!("{e:#}"),
        table: None,
    })?;
    let config = Config::load(path).map_err(|e| ApiError::bad_params(format!("{e:#}")))?;

    match auth::ensure_bootstrap_admin(&conn, &config) {
        Ok(true) => tracing::info!("bootstrap admin account created"),
        Ok(false) => {}
        Err(e) => return Err(ApiError::db("db_insert_failed", "users", e)),
    }

    tracing::info!(
        workspace = %path.to_string_lossy(),
        mock_data = config.mock_data || state.force_mock,
        "workspace opened"
    );
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.config = config;
    Ok(())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
