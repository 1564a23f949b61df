//! Workspace bundles: a zip holding the SQLite file plus a manifest.
//!
//! Layout:
//! - `manifest.json`: `{format, version, appVersion, exportedAt}`
//! - `db/academy.sqlite3`: the workspace database
//! - `meta/workspace.json`: where the bundle came from
//! - `config/academyd.json`: the workspace config, when one exists
//!
//! A bare SQLite file is also accepted on import.

use crate::config::CONFIG_FILE;
use crate::db::DB_FILE;
use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/academy.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
const CONFIG_ENTRY: &str = "config/academyd.json";
pub const BUNDLE_FORMAT: &str = "academy-workspace-v1";
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: &'static str,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: &'static str,
    pub config_restored: bool,
}

fn write_json_entry<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    value: &serde_json::Value,
    opts: FileOptions,
) -> anyhow::Result<()> {
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start {name}"))?;
    let text = serde_json::to_string_pretty(value).with_context(|| format!("failed to serialize {name}"))?;
    zip.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {name}"))?;
    Ok(())
}

pub fn export_workspace_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_path = workspace.join(DB_FILE);
    if !db_path.is_file() {
        return Err(anyhow!("workspace database not found: {}", db_path.display()));
    }
    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create output file {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0;

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
    });
    write_json_entry(&mut zip, MANIFEST_ENTRY, &manifest, opts)?;
    entries += 1;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;
    entries += 1;

    let meta = json!({ "sourceWorkspace": workspace.to_string_lossy() });
    write_json_entry(&mut zip, META_WORKSPACE_ENTRY, &meta, opts)?;
    entries += 1;

    let config_path = workspace.join(CONFIG_FILE);
    if config_path.is_file() {
        zip.start_file(CONFIG_ENTRY, opts)
            .context("failed to start config entry")?;
        let mut cfg = File::open(&config_path)
            .with_context(|| format!("failed to open {}", config_path.display()))?;
        std::io::copy(&mut cfg, &mut zip).context("failed to write config entry")?;
        entries += 1;
    }

    zip.finish().context("failed to finalize zip bundle")?;
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT,
        entry_count: entries,
    })
}

/// Restores into `workspace`. The caller must not hold an open connection to
/// the workspace database.
pub fn import_workspace_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let dst = workspace.join(DB_FILE);
    let tmp_dst = workspace.join(format!("{DB_FILE}.importing"));

    match sniff(in_path)? {
        Kind::Sqlite => {
            std::fs::copy(in_path, &tmp_dst).with_context(|| {
                format!("failed to copy sqlite backup from {}", in_path.display())
            })?;
            replace(&tmp_dst, &dst)?;
            Ok(ImportSummary {
                bundle_format_detected: "sqlite3",
                config_restored: false,
            })
        }
        Kind::Zip => {
            let in_file = File::open(in_path)
                .with_context(|| format!("failed to open bundle {}", in_path.display()))?;
            let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

            let mut manifest_text = String::new();
            archive
                .by_name(MANIFEST_ENTRY)
                .context("bundle missing manifest.json")?
                .read_to_string(&mut manifest_text)
                .context("failed to read manifest.json")?;
            let manifest: serde_json::Value =
                serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
            let format = manifest.get("format").and_then(|v| v.as_str()).unwrap_or("");
            if format != BUNDLE_FORMAT {
                return Err(anyhow!("unsupported bundle format: {:?}", format));
            }

            {
                let mut out = File::create(&tmp_dst)
                    .with_context(|| format!("failed to create {}", tmp_dst.display()))?;
                let mut entry = archive
                    .by_name(DB_ENTRY)
                    .with_context(|| format!("bundle missing {DB_ENTRY}"))?;
                std::io::copy(&mut entry, &mut out).context("failed to extract database entry")?;
                out.flush().context("failed to flush extracted database")?;
            }
            replace(&tmp_dst, &dst)?;

            let config_restored = match archive.by_name(CONFIG_ENTRY) {
                Ok(mut entry) => {
                    let mut text = String::new();
                    entry
                        .read_to_string(&mut text)
                        .context("failed to read config entry")?;
                    std::fs::write(workspace.join(CONFIG_FILE), text)
                        .context("failed to restore workspace config")?;
                    true
                }
                Err(ZipError::FileNotFound) => false,
                Err(e) => return Err(anyhow!(e).context("failed to read config entry")),
            };

            Ok(ImportSummary {
                bundle_format_detected: BUNDLE_FORMAT,
                config_restored,
            })
        }
    }
}

fn replace(tmp: &Path, dst: &Path) -> anyhow::Result<()> {
    // SQLite side files belong to the database being replaced.
    for suffix in ["-wal", "-shm"] {
        let side = dst.with_file_name(format!("{DB_FILE}{suffix}"));
        if side.exists() {
            std::fs::remove_file(&side)
                .with_context(|| format!("failed to remove {}", side.display()))?;
        }
    }
    if dst.exists() {
        std::fs::remove_file(dst)
            .with_context(|| format!("failed to remove existing database {}", dst.display()))?;
    }
    std::fs::rename(tmp, dst)
        .with_context(|| format!("failed to move restored database to {}", dst.display()))
}

enum Kind {
    Zip,
    Sqlite,
}

fn sniff(path: &Path) -> anyhow::Result<Kind> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.display()))?;
    let mut sig = [0u8; 16];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read >= 4 && sig[..4] == [0x50, 0x4B, 0x03, 0x04] {
        Ok(Kind::Zip)
    } else if read == SQLITE_MAGIC.len() && &sig == SQLITE_MAGIC {
        Ok(Kind::Sqlite)
    } else {
        Err(anyhow!(
            "{} is neither a workspace bundle nor a SQLite database",
            path.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn bundle_restores_rows_into_a_fresh_workspace() {
        let src = tempfile::tempdir().expect("src");
        let dst = tempfile::tempdir().expect("dst");
        {
            let conn = db::open_db(src.path()).expect("open");
            conn.execute(
                "INSERT INTO fixtures(name, price, count) VALUES('칠판', 30000, 2)",
                [],
            )
            .expect("insert");
        }
        std::fs::write(src.path().join(CONFIG_FILE), r#"{"defaultPageSize": 5}"#)
            .expect("config");

        let bundle = src.path().join("out/backup.zip");
        let export = export_workspace_bundle(src.path(), &bundle).expect("export");
        assert_eq!(export.bundle_format, BUNDLE_FORMAT);
        assert_eq!(export.entry_count, 4);

        let import = import_workspace_bundle(&bundle, dst.path()).expect("import");
        assert_eq!(import.bundle_format_detected, BUNDLE_FORMAT);
        assert!(import.config_restored);

        let conn = db::open_db(dst.path()).expect("reopen");
        let name: String = conn
            .query_row("SELECT name FROM fixtures", [], |r| r.get(0))
            .expect("row");
        assert_eq!(name, "칠판");
    }

    #[test]
    fn raw_sqlite_file_is_accepted() {
        let src = tempfile::tempdir().expect("src");
        let dst = tempfile::tempdir().expect("dst");
        drop(db::open_db(src.path()).expect("open"));
        let import =
            import_workspace_bundle(&src.path().join(DB_FILE), dst.path()).expect("import");
        assert_eq!(import.bundle_format_detected, "sqlite3");
        assert!(dst.path().join(DB_FILE).is_file());
    }

    #[test]
    fn unknown_files_are_rejected() {
        let dir = tempfile::tempdir().expect("dir");
        let junk = dir.path().join("notes.txt");
        std::fs::write(&junk, "hello").expect("write");
        assert!(import_workspace_bundle(&junk, dir.path()).is_err());
    }
}
