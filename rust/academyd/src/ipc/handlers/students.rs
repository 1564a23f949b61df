use crate::calendar::parse_date;
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{as_i64, check_len, db_conn, opt_str, param, required_i64};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

pub(crate) const STUDENT_COLUMNS: &str = "id, class_id, name, email, birth_date, gender";

pub(crate) fn student_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let id: i64 = r.get(0)?;
    let class_id: Option<i64> = r.get(1)?;
    let name: String = r.get(2)?;
    let email: String = r.get(3)?;
    let birth_date: String = r.get(4)?;
    let gender: String = r.get(5)?;
    Ok(json!({
        "id": id,
        "class_id": class_id,
        "name": name,
        "email": email,
        "birth_date": birth_date,
        "gender": gender,
    }))
}

pub(crate) fn load_student(conn: &Connection, id: i64) -> rusqlite::Result<Option<Value>> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [id],
        student_from_row,
    )
    .optional()
}

pub(crate) fn students_in_class(conn: &Connection, class_id: i64) -> rusqlite::Result<Vec<Value>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students WHERE class_id = ? ORDER BY id",
        STUDENT_COLUMNS
    ))?;
    let rows = stmt
        .query_map([class_id], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn is_valid_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// What the payload says about the student's class link.
#[derive(Debug, PartialEq, Eq)]
enum ClassLink {
    Unchanged,
    Clear,
    Set(i64),
}

fn class_link(req: &Request) -> Result<ClassLink, ApiError> {
    let raw = param(req, "classId").or_else(|| param(req, "class_id"));
    match raw {
        None => Ok(ClassLink::Unchanged),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(ClassLink::Clear),
        Some(v) => as_i64(v)
            .map(ClassLink::Set)
            .ok_or_else(|| ApiError::field("classId", "Invalid Class ID")),
    }
}

fn ensure_class(conn: &Connection, class_id: i64) -> Result<(), ApiError> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(ApiError::field("classId", "Invalid Class ID"));
    }
    Ok(())
}

struct StudentInput {
    name: Option<String>,
    email: Option<String>,
    birth_date: Option<String>,
    gender: Option<String>,
}

fn parse_input(req: &Request, require_all: bool) -> Result<StudentInput, ApiError> {
    let input = StudentInput {
        name: opt_str(req, "name")?,
        email: opt_str(req, "email")?,
        birth_date: opt_str(req, "birth_date")?,
        gender: opt_str(req, "gender")?,
    };
    for (key, value, max) in [
        ("name", &input.name, 100),
        ("email", &input.email, 254),
        ("gender", &input.gender, 10),
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
    if let Some(email) = &input.email {
        if !is_valid_email(email) {
            return Err(ApiError::field("email", "Enter a valid email address."));
        }
    }
    match &input.birth_date {
        Some(d) => {
            if d.len() != 10 || parse_date(d).is_err() {
                return Err(ApiError::field(
                    "birth_date",
                    "Date has wrong format. Use YYYY-MM-DD.",
                ));
            }
        }
        None if require_all => {
            return Err(ApiError::field("birth_date", "This field is required."))
        }
        None => {}
    }
    Ok(input)
}

fn handle_list(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY id",
        STUDENT_COLUMNS
    ))?;
    let students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "total_counts": students.len(),
        "students": students,
    }))
}

fn handle_get(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let id = required_i64(req, "id")?;
    load_student(conn, id)?.ok_or_else(|| ApiError::not_found("student not found"))
}

fn handle_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let input = parse_input(req, true)?;
    let class_id = match class_link(req)? {
        ClassLink::Set(id) => {
            ensure_class(conn, id)?;
            Some(id)
        }
        ClassLink::Clear | ClassLink::Unchanged => None,
    };
    conn.execute(
        "INSERT INTO students(class_id, name, birth_date, email, gender) VALUES(?, ?, ?, ?, ?)",
        (
            class_id,
            &input.name,
            &input.birth_date,
            &input.email,
            &input.gender,
        ),
    )
    .map_err(|e| ApiError::db("db_insert_failed", "students", e))?;
    let id = conn.last_insert_rowid();
    load_student(conn, id)?.ok_or_else(|| ApiError::not_found("student not found"))
}

fn handle_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let id = required_i64(req, "id")?;
    let input = parse_input(req, false)?;
    if load_student(conn, id)?.is_none() {
        return Err(ApiError::not_found("student not found"));
    }
    let link = class_link(req)?;
    if let ClassLink::Set(class_id) = link {
        ensure_class(conn, class_id)?;
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "students", e))?;
    tx.execute(
        "UPDATE students SET
           name = COALESCE(?, name),
           email = COALESCE(?, email),
           birth_date = COALESCE(?, birth_date),
           gender = COALESCE(?, gender)
         WHERE id = ?",
        (
            &input.name,
            &input.email,
            &input.birth_date,
            &input.gender,
            id,
        ),
    )
    .map_err(|e| ApiError::db("db_update_failed", "students", e))?;
    match link {
        ClassLink::Unchanged => {}
        ClassLink::Clear => {
            tx.execute("UPDATE students SET class_id = NULL WHERE id = ?", [id])
                .map_err(|e| ApiError::db("db_update_failed", "students", e))?;
        }
        ClassLink::Set(class_id) => {
            tx.execute(
                "UPDATE students SET class_id = ? WHERE id = ?",
                (class_id, id),
            )
            .map_err(|e| ApiError::db("db_update_failed", "students", e))?;
        }
    }
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "students", e))?;

    load_student(conn, id)?.ok_or_else(|| ApiError::not_found("student not found"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let id = required_i64(req, "id")?;
    if load_student(conn, id)?.is_none() {
        return Err(ApiError::not_found("student not found"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "students", e))?;
    tx.execute("DELETE FROM reports WHERE student_id = ?", [id])
        .map_err(|e| ApiError::db("db_delete_failed", "reports", e))?;
    tx.execute("DELETE FROM students WHERE id = ?", [id])
        .map_err(|e| ApiError::db("db_delete_failed", "students", e))?;
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "students", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "admin.students.list" => handle_list(state, req),
        "admin.students.get" => handle_get(state, req),
        "admin.students.create" => handle_create(state, req),
        "admin.students.update" => handle_update(state, req),
        "admin.students.delete" => handle_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
