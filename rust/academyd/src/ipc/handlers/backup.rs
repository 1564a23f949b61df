use crate::backup;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn current_workspace(state: &AppState) -> Result<PathBuf, ApiError> {
    state.workspace.clone().ok_or(ApiError::NoWorkspace)
}

fn handle_export(state: &mut AppState, req: &Request) -> ApiResult {
    let out_path = required_str(req, "outPath")?;
    let workspace = current_workspace(state)?;
    if let Some(conn) = state.db.as_ref() {
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
            tracing::warn!(error = %e, "wal checkpoint before export failed");
        }
    }

    let export = backup::export_workspace_bundle(&workspace, &PathBuf::from(&out_path))
        .map_err(|e| ApiError::Io(format!("{e:#}")))?;
    tracing::info!(path = %out_path, entries = export.entry_count, "workspace exported");
    Ok(json!({
        "ok": true,
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
    }))
}

/// A failed reopen takes precedence; the restore error is logged so it is not lost.
fn settle_import(
    restored: anyhow::Result<backup::ImportSummary>,
    reopened: Result<(), ApiError>,
) -> Result<backup::ImportSummary, ApiError> {
    if let Err(reopen) = reopened {
        if let Err(e) = &restored {
            tracing::error!(error = %format!("{e:#}"), "workspace restore failed before reopen");
        }
        return Err(reopen);
    }
    restored.map_err(|e| ApiError::Io(format!("{e:#}")))
}

fn handle_import(state: &mut AppState, req: &Request) -> ApiResult {
    let in_path = required_str(req, "inPath")?;
    let workspace = current_workspace(state)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(ApiError::not_found(format!("bundle file not found: {in_path}")));
    }

    // Release the handle before the file underneath it is replaced.
    state.db = None;
    let restored = backup::import_workspace_bundle(&src, &workspace);
    // Reopen whatever is on disk, even when the restore failed part way.
    let reopened = open_workspace(state, &workspace);
    let import = settle_import(restored, reopened)?;

    tracing::info!(
        path = %in_path,
        format = import.bundle_format_detected,
        "workspace restored"
    );
    Ok(json!({
        "ok": true,
        "workspacePath": workspace.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "configRestored": import.config_restored,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "admin.backup.export" => handle_export(state, req),
        "admin.backup.import" => handle_import(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn reopen_failure() -> Result<(), ApiError> {
        Err(ApiError::Db {
            code: "db_open_failed",
            message: "file is not a database".into(),
            table: None,
        })
    }

    #[test]
    fn reopen_failure_wins_over_restore_failure() {
        let err = settle_import(Err(anyhow!("bundle missing manifest.json")), reopen_failure())
            .expect_err("reopen failure");
        assert_eq!(err.code(), "db_open_failed");
    }

    #[test]
    fn restore_failure_surfaces_after_a_clean_reopen() {
        let err = settle_import(Err(anyhow!("bundle missing manifest.json")), Ok(()))
            .expect_err("restore failure");
        assert_eq!(err.code(), "io_failed");
        assert!(err.to_string().contains("manifest.json"));

        let summary = backup::ImportSummary {
            bundle_format_detected: "sqlite3",
            config_restored: false,
        };
        let ok = settle_import(Ok(summary), Ok(())).expect("restored");
        assert_eq!(ok.bundle_format_detected, "sqlite3");
    }
}
