use crate::auth;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    check_len, check_non_negative, db_conn, opt_i64, opt_str, required_i64,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub(crate) fn teacher_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = r.get(0)?;
    let teacher_id: String = r.get(1)?;
    let name: String = r.get(2)?;
    let age: i64 = r.get(3)?;
    let position: String = r.get(4)?;
    let sex: String = r.get(5)?;
    Ok(json!({
        "id": id,
        "teacherId": teacher_id,
        "name": name,
        "age": age,
        "position": position,
        "sex": sex,
    }))
}

pub(crate) fn load_teacher(conn: &Connection, id: i64) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT id, teacher_id, teacher_name, age, position, sex FROM teachers WHERE id = ?",
        [id],
        teacher_from_row,
    )
    .optional()
}

pub(crate) fn load_teacher_by_login(
    conn: &Connection,
    teacher_id: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    conn.query_row(
        "SELECT id, teacher_id, teacher_name, age, position, sex FROM teachers WHERE teacher_id = ?",
        [teacher_id],
        teacher_from_row,
    )
    .optional()
}

#[derive(Default)]
struct TeacherInput {
    teacher_id: Option<String>,
    passwd: Option<String>,
    name: Option<String>,
    age: Option<i64>,
    position: Option<String>,
    sex: Option<String>,
}

fn parse_input(req: &Request, require_all: bool) -> Result<TeacherInput, ApiError> {
    let input = TeacherInput {
        teacher_id: opt_str(req, "teacherId")?,
        // Blank means "keep the current password" on update.
        passwd: opt_str(req, "passwd")?.filter(|p| !p.is_empty()),
        name: opt_str(req, "name")?,
        age: opt_i64(req, "age")?,
        position: opt_str(req, "position")?,
        sex: opt_str(req, "sex")?,
    };

    for (key, value, max) in [
        ("teacherId", &input.teacher_id, 50),
        ("name", &input.name, 100),
        ("position", &input.position, 100),
        ("sex", &input.sex, 10),
    ] {
        match value {
            Some(v) if v.is_empty() => {
                return Err(ApiError::field(key, "This field may not be blank."))
            }
            Some(v) => check_len(key, v, max)?,
            None if require_all => return Err(ApiError::field(key, "This field is required.")),
            None => {}
        }
    }
    match input.age {
        Some(age) => check_non_negative("age", age)?,
        None if require_all => return Err(ApiError::field("age", "This field is required.")),
        None => {}
    }
    Ok(input)
}

fn ensure_login_free(conn: &Connection, teacher_id: &str, except: Option<i64>) -> Result<(), ApiError> {
    let taken: Option<i64> = conn
        .query_row(
            "SELECT id FROM teachers WHERE teacher_id = ?",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()?;
    if matches!(taken, Some(id) if Some(id) != except) {
        return Err(ApiError::Conflict(format!(
            "teacher with this teacherId already exists: {}",
            teacher_id
        )));
    }
    let console_account: Option<i64> = conn
        .query_row(
            "SELECT id FROM users WHERE username = ? AND role != 'teacher'",
            [teacher_id],
            |r| r.get(0),
        )
        .optional()?;
    if console_account.is_some() {
        return Err(ApiError::Conflict(format!(
            "teacherId is already used by a console account: {}",
            teacher_id
        )));
    }
    Ok(())
}

fn handle_list(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(
        "SELECT id, teacher_id, teacher_name, age, position, sex FROM teachers ORDER BY id",
    )?;
    let teachers = stmt
        .query_map([], teacher_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "total_counts": teachers.len(),
        "teachers": teachers,
    }))
}

fn handle_get(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let id = required_i64(req, "id")?;
    load_teacher(conn, id)?.ok_or_else(|| ApiError::not_found("teacher not found"))
}

fn handle_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let input = parse_input(req, true)?;
    let Some(passwd) = input.passwd.as_deref() else {
        return Err(ApiError::field(
            "passwd",
            "Password is required for new teacher.",
        ));
    };
    let teacher_id = input.teacher_id.clone().unwrap_or_default();
    ensure_login_free(conn, &teacher_id, None)?;

    let hash = auth::hash_password(passwd, state.config.password_iterations);
    conn.execute(
        "INSERT INTO teachers(teacher_id, passwd, teacher_name, age, position, sex)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &teacher_id,
            &hash,
            &input.name,
            input.age,
            &input.position,
            &input.sex,
        ),
    )
    .map_err(|e| ApiError::db("db_insert_failed", "teachers", e))?;
    let id = conn.last_insert_rowid();
    load_teacher(conn, id)?.ok_or_else(|| ApiError::not_found("teacher not found"))
}

fn handle_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let id = required_i64(req, "id")?;
    let input = parse_input(req, false)?;

    let current: Option<String> = conn
        .query_row("SELECT teacher_id FROM teachers WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    let Some(old_login) = current else {
        return Err(ApiError::not_found("teacher not found"));
    };
    if let Some(new_login) = &input.teacher_id {
        ensure_login_free(conn, new_login, Some(id))?;
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "teachers", e))?;
    tx.execute(
        "UPDATE teachers SET
           teacher_id = COALESCE(?, teacher_id),
           teacher_name = COALESCE(?, teacher_name),
           age = COALESCE(?, age),
           position = COALESCE(?, position),
           sex = COALESCE(?, sex)
         WHERE id = ?",
        (
            &input.teacher_id,
            &input.name,
            input.age,
            &input.position,
            &input.sex,
            id,
        ),
    )
    .map_err(|e| ApiError::db("db_update_failed", "teachers", e))?;

    // Keep the portal account (created at first login) in step with the roster.
    if let Some(new_login) = input.teacher_id.as_deref().filter(|l| *l != old_login) {
        tx.execute(
            "UPDATE users SET username = ? WHERE username = ? AND role = 'teacher'",
            (new_login, &old_login),
        )
        .map_err(|e| ApiError::db("db_update_failed", "users", e))?;
    }
    if let Some(passwd) = input.passwd.as_deref() {
        let hash = auth::hash_password(passwd, state.config.password_iterations);
        tx.execute("UPDATE teachers SET passwd = ? WHERE id = ?", (&hash, id))
            .map_err(|e| ApiError::db("db_update_failed", "teachers", e))?;
        let login = input.teacher_id.as_deref().unwrap_or(&old_login);
        tx.execute(
            "UPDATE users SET password_hash = ? WHERE username = ? AND role = 'teacher'",
            (&hash, login),
        )
        .map_err(|e| ApiError::db("db_update_failed", "users", e))?;
    }
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "teachers", e))?;

    load_teacher(conn, id)?.ok_or_else(|| ApiError::not_found("teacher not found"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let id = required_i64(req, "id")?;
    let login: Option<String> = conn
        .query_row("SELECT teacher_id FROM teachers WHERE id = ?", [id], |r| r.get(0))
        .optional()?;
    let Some(login) = login else {
        return Err(ApiError::not_found("teacher not found"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "teachers", e))?;
    // Classes outlive their teacher.
    tx.execute("UPDATE classes SET teacher_id = NULL WHERE teacher_id = ?", [id])
        .map_err(|e| ApiError::db("db_update_failed", "classes", e))?;
    tx.execute(
        "DELETE FROM sessions WHERE user_id IN (
           SELECT id FROM users WHERE username = ? AND role = 'teacher'
         )",
        [&login],
    )
    .map_err(|e| ApiError::db("db_delete_failed", "sessions", e))?;
    tx.execute(
        "DELETE FROM users WHERE username = ? AND role = 'teacher'",
        [&login],
    )
    .map_err(|e| ApiError::db("db_delete_failed", "users", e))?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [id])
        .map_err(|e| ApiError::db("db_delete_failed", "teachers", e))?;
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "teachers", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "admin.teachers.list" => handle_list(state, req),
        "admin.teachers.get" => handle_get(state, req),
        "admin.teachers.create" => handle_create(state, req),
        "admin.teachers.update" => handle_update(state, req),
        "admin.teachers.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
