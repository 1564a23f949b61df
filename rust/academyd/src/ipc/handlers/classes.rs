use crate::calendar::{self, MonthView, Todo, TodoDraft};
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::handlers::teachers::load_teacher;
use crate::ipc::helpers::{as_i64, check_len, db_conn, opt_i64, opt_str, param, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::weekdays;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde_json::{json, Value};

const CLASS_NAME_MAX_CHARS: usize = 100;
const CLASSROOM_MAX_CHARS: usize = 50;

pub(crate) fn load_todos(conn: &Connection, class_id: i64) -> rusqlite::Result<Vec<Todo>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, task, date FROM todos WHERE class_id = ? ORDER BY date, id",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, title, task, date)| {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;
            Some(Todo {
                id,
                title,
                task,
                date,
            })
        })
        .collect())
}

/// Serialized class with nested teacher, students and to-dos.
pub(crate) fn class_json(conn: &Connection, class_id: i64) -> rusqlite::Result<Option<Value>> {
    let row: Option<(String, Option<i64>, Option<String>, Option<String>)> = conn
        .query_row(
            "SELECT class_name, teacher_id, class_time, classroom FROM classes WHERE id = ?",
            [class_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((class_name, teacher_id, class_time, classroom)) = row else {
        return Ok(None);
    };

    let teacher = match teacher_id {
        Some(tid) => load_teacher(conn, tid)?,
        None => None,
    };

    let mut stmt = conn.prepare("SELECT id, name FROM students WHERE class_id = ? ORDER BY id")?;
    let students = stmt
        .query_map([class_id], |r| {
            let id: i64 = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let todos = load_todos(conn, class_id)?;

    Ok(Some(json!({
        "classId": class_id,
        "className": class_name,
        "teacher": teacher,
        "daysOfWeek": weekdays::split_days(class_time.as_deref()),
        "students": students,
        "todos": todos.iter().map(Todo::to_json).collect::<Vec<_>>(),
        "classroom": classroom,
    })))
}

/// Class ids visible to a caller; `Some(login)` restricts to that teacher's classes.
pub(crate) fn class_ids(conn: &Connection, teacher_login: Option<&str>) -> rusqlite::Result<Vec<i64>> {
    match teacher_login {
        None => {
            let mut stmt = conn.prepare("SELECT id FROM classes ORDER BY id")?;
            let ids = stmt
                .query_map([], |r| r.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        }
        Some(login) => {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM classes c
                 JOIN teachers t ON t.id = c.teacher_id
                 WHERE t.teacher_id = ?
                 ORDER BY c.id",
            )?;
            let ids = stmt
                .query_map([login], |r| r.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        }
    }
}

pub(crate) fn month_view(
    conn: &Connection,
    class_id: i64,
    year: i32,
    month: u32,
) -> Result<MonthView, ApiError> {
    let (start, end) = calendar::month_bounds(year, month)
        .ok_or_else(|| ApiError::bad_params("month must be between 1 and 12"))?;
    let todos = load_todos(conn, class_id)?
        .into_iter()
        .filter(|t| t.date >= start && t.date < end);
    Ok(MonthView::build(year, month, todos))
}

pub(crate) fn year_month(req: &Request) -> Result<Option<(i32, u32)>, ApiError> {
    let year = opt_i64(req, "year")?;
    let month = opt_i64(req, "month")?;
    let (Some(year), Some(month)) = (year, month) else {
        return Ok(None);
    };
    if !(1..=12).contains(&month) {
        return Err(ApiError::bad_params("month must be between 1 and 12"));
    }
    let year = i32::try_from(year).map_err(|_| ApiError::bad_params("year out of range"))?;
    Ok(Some((year, month as u32)))
}

#[derive(Debug, PartialEq, Eq)]
enum TeacherRef {
    Unchanged,
    Clear,
    ById(i64),
    ByLogin(String),
}

fn teacher_ref(req: &Request) -> Result<TeacherRef, ApiError> {
    match req.params.get("teacher") {
        None => Ok(TeacherRef::Unchanged),
        Some(Value::Null) => Ok(TeacherRef::Clear),
        Some(Value::Object(obj)) => {
            if let Some(id) = obj.get("id").filter(|v| !v.is_null() && v.as_str() != Some("")) {
                return as_i64(id)
                    .map(TeacherRef::ById)
                    .ok_or_else(|| ApiError::bad_params("teacher.id must be an integer"));
            }
            match obj.get("teacherId").and_then(|v| v.as_str()).map(str::trim) {
                Some(login) if !login.is_empty() => Ok(TeacherRef::ByLogin(login.to_string())),
                _ => Ok(TeacherRef::Unchanged),
            }
        }
        Some(_) => Err(ApiError::bad_params("teacher must be an object or null")),
    }
}

fn resolve_teacher(conn: &Connection, r: &TeacherRef) -> Result<Option<i64>, ApiError> {
    let found: Option<i64> = match r {
        TeacherRef::Unchanged | TeacherRef::Clear => return Ok(None),
        TeacherRef::ById(id) => conn
            .query_row("SELECT id FROM teachers WHERE id = ?", [id], |row| row.get(0))
            .optional()?,
        TeacherRef::ByLogin(login) => conn
            .query_row(
                "SELECT id FROM teachers WHERE teacher_id = ?",
                [login],
                |row| row.get(0),
            )
            .optional()?,
    };
    found
        .map(Some)
        .ok_or_else(|| ApiError::not_found("teacher not found"))
}

fn array_param<'a>(req: &'a Request, key: &str) -> Result<Option<&'a Vec<Value>>, ApiError> {
    match param(req, key) {
        None => Ok(None),
        Some(v) => v
            .as_array()
            .map(Some)
            .ok_or_else(|| ApiError::bad_params(format!("{} must be an array", key))),
    }
}

fn days_param(req: &Request) -> Result<Option<String>, ApiError> {
    array_param(req, "daysOfWeek")?
        .map(|arr| {
            weekdays::parse_days(arr)
                .map(|days| weekdays::join_days(&days))
                .map_err(ApiError::bad_params)
        })
        .transpose()
}

/// Student ids from `[{id, name}]` (or bare ids). Entries without a usable id are ignored.
fn student_ids_param(req: &Request) -> Result<Option<Vec<i64>>, ApiError> {
    Ok(array_param(req, "students")?.map(|arr| {
        arr.iter()
            .filter_map(|s| match s {
                Value::Object(o) => o.get("id").and_then(as_i64),
                other => as_i64(other),
            })
            .collect()
    }))
}

fn todos_param(req: &Request) -> Result<Option<Vec<TodoDraft>>, ApiError> {
    array_param(req, "todos")?
        .map(|arr| calendar::parse_todos(arr).map_err(ApiError::bad_params))
        .transpose()
}

fn class_name_param(req: &Request, required: bool) -> Result<Option<String>, ApiError> {
    match opt_str(req, "className")? {
        Some(name) if name.is_empty() => {
            Err(ApiError::field("className", "This field may not be blank."))
        }
        Some(name) => {
            check_len("className", &name, CLASS_NAME_MAX_CHARS)?;
            Ok(Some(name))
        }
        None if required => Err(ApiError::field("className", "This field is required.")),
        None => Ok(None),
    }
}

/// `Some(None)` is an explicit `null`, which clears the classroom on update.
fn classroom_param(req: &Request) -> Result<Option<Option<String>>, ApiError> {
    if req.params.get("classroom").is_some_and(Value::is_null) {
        return Ok(Some(None));
    }
    let classroom = opt_str(req, "classroom")?;
    if let Some(c) = &classroom {
        check_len("classroom", c, CLASSROOM_MAX_CHARS)?;
    }
    Ok(classroom.map(Some))
}

fn link_students(tx: &Transaction<'_>, class_id: i64, ids: &[i64]) -> Result<usize, ApiError> {
    let mut linked = 0;
    for sid in ids {
        let n = tx
            .execute(
                "UPDATE students SET class_id = ? WHERE id = ?",
                (class_id, sid),
            )
            .map_err(|e| ApiError::db("db_update_failed", "students", e))?;
        if n == 0 {
            tracing::debug!(student_id = sid, class_id, "skipping unknown student");
        }
        linked += n;
    }
    Ok(linked)
}

fn insert_todo(tx: &Transaction<'_>, class_id: i64, t: &TodoDraft) -> Result<(), ApiError> {
    tx.execute(
        "INSERT INTO todos(class_id, title, task, date) VALUES(?, ?, ?, ?)",
        (
            class_id,
            &t.title,
            &t.task,
            t.date.format("%Y-%m-%d").to_string(),
        ),
    )
    .map_err(|e| ApiError::db("db_insert_failed", "todos", e))?;
    Ok(())
}

fn merge_todos(tx: &Transaction<'_>, class_id: i64, incoming: Vec<TodoDraft>) -> Result<(), ApiError> {
    let existing: Vec<i64> = {
        let mut stmt = tx.prepare("SELECT id FROM todos WHERE class_id = ?")?;
        let ids = stmt
            .query_map([class_id], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        ids
    };
    let plan = calendar::plan_merge(&existing, incoming);

    for id in &plan.delete {
        tx.execute("DELETE FROM todos WHERE id = ?", [id])
            .map_err(|e| ApiError::db("db_delete_failed", "todos", e))?;
    }
    for (id, t) in &plan.update {
        tx.execute(
            "UPDATE todos SET title = ?, task = ?, date = ? WHERE id = ?",
            (&t.title, &t.task, t.date.format("%Y-%m-%d").to_string(), id),
        )
        .map_err(|e| ApiError::db("db_update_failed", "todos", e))?;
    }
    for t in &plan.create {
        insert_todo(tx, class_id, t)?;
    }
    Ok(())
}

fn ensure_class(conn: &Connection, class_id: i64) -> Result<(), ApiError> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()?;
    if exists.is_none() {
        return Err(ApiError::not_found("class not found"));
    }
    Ok(())
}

fn handle_list(state: &mut AppState, _req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let mut out = Vec::new();
    for id in class_ids(conn, None)? {
        if let Some(c) = class_json(conn, id)? {
            out.push(c);
        }
    }
    Ok(Value::Array(out))
}

fn handle_get(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let class_id = required_i64(req, "classId")?;
    class_json(conn, class_id)?.ok_or_else(|| ApiError::not_found("class not found"))
}

fn handle_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let class_name = class_name_param(req, true)?;
    let classroom = classroom_param(req)?.flatten();
    let days = days_param(req)?.unwrap_or_default();
    let students = student_ids_param(req)?.unwrap_or_default();
    let todos = todos_param(req)?.unwrap_or_default();
    let teacher_id = resolve_teacher(conn, &teacher_ref(req)?)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "classes", e))?;
    tx.execute(
        "INSERT INTO classes(class_name, teacher_id, class_time, classroom) VALUES(?, ?, ?, ?)",
        (&class_name, teacher_id, &days, &classroom),
    )
    .map_err(|e| ApiError::db("db_insert_failed", "classes", e))?;
    let class_id = tx.last_insert_rowid();
    link_students(&tx, class_id, &students)?;
    for t in &todos {
        insert_todo(&tx, class_id, t)?;
    }
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "classes", e))?;

    tracing::info!(class_id, "class created");
    Ok(json!({ "message": "Class added successfully", "classId": class_id }))
}

fn handle_update(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let class_id = required_i64(req, "classId")?;
    ensure_class(conn, class_id)?;

    let class_name = class_name_param(req, false)?;
    let classroom = classroom_param(req)?;
    let days = days_param(req)?;
    let students = student_ids_param(req)?;
    let todos = todos_param(req)?;
    let teacher = teacher_ref(req)?;
    let teacher_id = resolve_teacher(conn, &teacher)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "classes", e))?;
    match teacher {
        TeacherRef::Unchanged => {}
        TeacherRef::Clear => {
            tx.execute("UPDATE classes SET teacher_id = NULL WHERE id = ?", [class_id])
                .map_err(|e| ApiError::db("db_update_failed", "classes", e))?;
        }
        TeacherRef::ById(_) | TeacherRef::ByLogin(_) => {
            tx.execute(
                "UPDATE classes SET teacher_id = ? WHERE id = ?",
                (teacher_id, class_id),
            )
            .map_err(|e| ApiError::db("db_update_failed", "classes", e))?;
        }
    }
    if let Some(classroom) = &classroom {
        tx.execute(
            "UPDATE classes SET classroom = ? WHERE id = ?",
            (classroom, class_id),
        )
        .map_err(|e| ApiError::db("db_update_failed", "classes", e))?;
    }
    tx.execute(
        "UPDATE classes SET
           class_name = COALESCE(?, class_name),
           class_time = COALESCE(?, class_time)
         WHERE id = ?",
        (&class_name, &days, class_id),
    )
    .map_err(|e| ApiError::db("db_update_failed", "classes", e))?;

    if let Some(ids) = students {
        tx.execute(
            "UPDATE students SET class_id = NULL WHERE class_id = ?",
            [class_id],
        )
        .map_err(|e| ApiError::db("db_update_failed", "students", e))?;
        link_students(&tx, class_id, &ids)?;
    }
    if let Some(todos) = todos {
        merge_todos(&tx, class_id, todos)?;
    }
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "classes", e))?;

    class_json(conn, class_id)?.ok_or_else(|| ApiError::not_found("class not found"))
}

fn handle_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let class_id = required_i64(req, "classId")?;
    ensure_class(conn, class_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| ApiError::db("db_tx_failed", "classes", e))?;
    // Explicitly clear dependents (no ON DELETE actions in the schema).
    tx.execute(
        "UPDATE students SET class_id = NULL WHERE class_id = ?",
        [class_id],
    )
    .map_err(|e| ApiError::db("db_update_failed", "students", e))?;
    tx.execute("DELETE FROM todos WHERE class_id = ?", [class_id])
        .map_err(|e| ApiError::db("db_delete_failed", "todos", e))?;
    tx.execute("DELETE FROM classes WHERE id = ?", [class_id])
        .map_err(|e| ApiError::db("db_delete_failed", "classes", e))?;
    tx.commit()
        .map_err(|e| ApiError::db("db_commit_failed", "classes", e))?;

    Ok(json!({ "ok": true }))
}

fn handle_calendar(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let class_id = required_i64(req, "classId")?;
    ensure_class(conn, class_id)?;
    let (year, month) =
        year_month(req)?.ok_or_else(|| ApiError::bad_params("missing year/month"))?;
    Ok(month_view(conn, class_id, year, month)?.to_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "admin.classes.list" | "admin.classrooms.list" => handle_list(state, req),
        "admin.classes.get" => handle_get(state, req),
        "admin.classes.create" => handle_create(state, req),
        "admin.classes.update" => handle_update(state, req),
        "admin.classes.delete" => handle_delete(state, req),
        "admin.classes.calendar" => handle_calendar(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(params: Value) -> Request {
        Request {
            id: "t".into(),
            method: "admin.classes.update".into(),
            params,
            token: None,
        }
    }

    #[test]
    fn classroom_null_is_distinct_from_absent() {
        assert_eq!(classroom_param(&req(json!({}))).expect("absent"), None);
        assert_eq!(
            classroom_param(&req(json!({ "classroom": null }))).expect("null"),
            Some(None)
        );
        assert_eq!(
            classroom_param(&req(json!({ "classroom": " 302호 " }))).expect("set"),
            Some(Some("302호".to_string()))
        );
        assert!(classroom_param(&req(json!({ "classroom": 302 }))).is_err());
    }

    #[test]
    fn teacher_ref_reads_nested_object() {
        assert_eq!(teacher_ref(&req(json!({}))).expect("ref"), TeacherRef::Unchanged);
        assert_eq!(
            teacher_ref(&req(json!({ "teacher": null }))).expect("ref"),
            TeacherRef::Clear
        );
        assert_eq!(
            teacher_ref(&req(json!({ "teacher": { "id": 3 } }))).expect("ref"),
            TeacherRef::ById(3)
        );
        assert_eq!(
            teacher_ref(&req(json!({ "teacher": { "id": "", "teacherId": "kim01" } })))
                .expect("ref"),
            TeacherRef::ByLogin("kim01".into())
        );
        assert_eq!(
            teacher_ref(&req(json!({ "teacher": {} }))).expect("ref"),
            TeacherRef::Unchanged
        );
        assert!(teacher_ref(&req(json!({ "teacher": 3 }))).is_err());
    }

    #[test]
    fn student_ids_accept_objects_and_bare_ids() {
        let ids = student_ids_param(&req(json!({
            "students": [{ "id": 1, "name": "a" }, 2, "3", { "name": "no id" }]
        })))
        .expect("ids")
        .expect("present");
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(student_ids_param(&req(json!({}))).expect("ids").is_none());
    }

    #[test]
    fn year_month_requires_both() {
        assert_eq!(year_month(&req(json!({ "year": 2024 }))).expect("ym"), None);
        assert_eq!(
            year_month(&req(json!({ "year": "2024", "month": 5 }))).expect("ym"),
            Some((2024, 5))
        );
        assert!(year_month(&req(json!({ "year": 2024, "month": 13 }))).is_err());
    }
}
