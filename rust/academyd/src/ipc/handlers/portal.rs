use crate::auth::{Caller, Role};
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::handlers::classes::{class_ids, class_json, month_view, year_month};
use crate::ipc::handlers::students::{load_student, students_in_class};
use crate::ipc::handlers::teachers::load_teacher_by_login;
use crate::ipc::helpers::{as_i64, db_conn, now_ts, opt_i64, param, required_i64};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Value};

/// `None` means unrestricted (admin callers).
fn scope(caller: &Caller) -> Option<&str> {
    match caller.role {
        Role::Admin => None,
        Role::Teacher => Some(caller.username.as_str()),
    }
}

fn scoped_class(conn: &Connection, caller: &Caller, class_id: i64) -> Result<i64, ApiError> {
    if class_ids(conn, scope(caller))?.contains(&class_id) {
        Ok(class_id)
    } else {
        Err(ApiError::not_found("class not found"))
    }
}

fn handle_me(state: &mut AppState, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    load_teacher_by_login(conn, &caller.username)?
        .ok_or_else(|| ApiError::not_found("no teacher profile for this account"))
}

fn handle_classes_list(state: &mut AppState, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    let mut classes = Vec::new();
    for id in class_ids(conn, scope(caller))? {
        if let Some(c) = class_json(conn, id)? {
            classes.push(c);
        }
    }
    Ok(json!({ "classes": classes }))
}

fn handle_classes_get(state: &mut AppState, req: &Request, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    let class_id = scoped_class(conn, caller, required_i64(req, "classId")?)?;
    class_json(conn, class_id)?.ok_or_else(|| ApiError::not_found("class not found"))
}

fn handle_classes_students(state: &mut AppState, req: &Request, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    let class_id = scoped_class(conn, caller, required_i64(req, "classId")?)?;
    Ok(json!({ "students": students_in_class(conn, class_id)? }))
}

fn handle_classes_todos(state: &mut AppState, req: &Request, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    let class_id = scoped_class(conn, caller, required_i64(req, "classId")?)?;
    match year_month(req)? {
        Some((year, month)) => Ok(month_view(conn, class_id, year, month)?.to_json()),
        None => Ok(json!({ "todos": [], "days": {}, "markedDates": [] })),
    }
}

fn common_text(common: Option<&Value>, key: &str) -> Result<Option<String>, ApiError> {
    match common.and_then(|c| c.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ApiError::bad_params(format!("common.{} must be a string", key))),
    }
}

fn handle_reports_send(state: &mut AppState, req: &Request, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    let common = param(req, "common");
    if common.is_some_and(|c| !c.is_object()) {
        return Err(ApiError::bad_params("common must be an object"));
    }
    let subject = common_text(common, "subject")?;
    let content = common_text(common, "content")?;
    let recipients = match param(req, "recipients") {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return Err(ApiError::bad_params("recipients must be an array")),
    };

    let created_at = now_ts();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "reports", e))?;
    let mut sent_individual = 0;
    for recipient in &recipients {
        let Some(student_id) = recipient.get("studentId").and_then(as_i64) else {
            tracing::warn!(recipient = %recipient, "report recipient without a studentId");
            continue;
        };
        if load_student(&tx, student_id)?.is_none() {
            tracing::warn!(student_id, "report recipient not found, skipped");
            continue;
        }
        let personal = recipient
            .get("personalMessage")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        tx.execute(
            "INSERT INTO reports(student_id, common_subject, common_content, personal_message, created_at)
             VALUES(?, ?, ?, ?, ?)",
            (student_id, &subject, &content, &personal, &created_at),
        )
        .map_err(|e| ApiError::db("db_insert_failed", "reports", e))?;
        sent_individual += 1;
    }
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "reports", e))?;

    let sent_common = subject.as_deref().is_some_and(|s| !s.is_empty())
        || content.as_deref().is_some_and(|s| !s.is_empty());
    tracing::info!(
        sender = %caller.username,
        sent_common,
        sent_individual,
        "reports sent"
    );
    Ok(json!({
        "status": "success",
        "sentCommon": sent_common,
        "sentIndividual": sent_individual,
    }))
}

fn handle_reports_list(state: &mut AppState, req: &Request, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    let student_filter = opt_i64(req, "studentId")?;
    let visible_classes = match scope(caller) {
        None => None,
        Some(login) => Some(class_ids(conn, Some(login))?),
    };

    let mut stmt = conn.prepare(
        "SELECT r.id, r.student_id, s.class_id, r.common_subject, r.common_content,
                r.personal_message, r.created_at
         FROM reports r
         JOIN students s ON s.id = r.student_id
         WHERE (?1 IS NULL OR r.student_id = ?1)
         ORDER BY r.created_at DESC, r.id DESC",
    )?;
    let rows = stmt
        .query_map([student_filter], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut reports = Vec::new();
    for (id, student_id, class_id, subject, content, personal, created_at) in rows {
        if let Some(visible) = &visible_classes {
            if !class_id.is_some_and(|c| visible.contains(&c)) {
                continue;
            }
        }
        reports.push(json!({
            "id": id,
            "student": load_student(conn, student_id)?,
            "common_subject": subject,
            "common_content": content,
            "personal_message": personal,
            "created_at": created_at,
        }));
    }
    Ok(json!({ "reports": reports }))
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    caller: Option<&Caller>,
) -> Option<Value> {
    let caller = caller?;
    let result = match req.method.as_str() {
        "teacher.me" => handle_me(state, caller),
        "teacher.classes.list" => handle_classes_list(state, caller),
        "teacher.classes.get" => handle_classes_get(state, req, caller),
        "teacher.classes.students" => handle_classes_students(state, req, caller),
        "teacher.classes.todos" => handle_classes_todos(state, req, caller),
        "teacher.reports.send" => handle_reports_send(state, req, caller),
        "teacher.reports.list" => handle_reports_list(state, req, caller),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
