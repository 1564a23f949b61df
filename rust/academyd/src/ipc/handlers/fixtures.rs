use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{
    check_len, check_non_negative, db_conn, opt_i64, opt_str, required_i64,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

const NAME_MAX_CHARS: usize = 100;

/// Built-in inventory served when the workspace runs in mock mode.
const MOCK_CATALOGUE: [(&str, i64, i64); 15] = [
    ("빔 프로젝터", 1_200_000, 5),
    ("노트북", 1_500_000, 10),
    ("화이트보드", 50_000, 20),
    ("마이크", 80_000, 15),
    ("스피커", 200_000, 8),
    ("카메라", 700_000, 3),
    ("삼각대", 30_000, 12),
    ("프린터", 400_000, 4),
    ("스캐너", 250_000, 2),
    ("모니터", 300_000, 7),
    ("키보드", 20_000, 25),
    ("마우스", 15_000, 30),
    ("USB 허브", 10_000, 18),
    ("외장하드", 100_000, 6),
    ("네트워크 케이블", 5_000, 50),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fixture {
    id: i64,
    name: String,
    price: i64,
    count: i64,
}

impl Fixture {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "name": self.name,
            "price": self.price,
            "count": self.count,
        })
    }
}

fn mock_fixtures() -> Vec<Fixture> {
    MOCK_CATALOGUE
        .iter()
        .enumerate()
        .map(|(i, (name, price, count))| Fixture {
            id: i as i64 + 1,
            name: name.to_string(),
            price: *price,
            count: *count,
        })
        .collect()
}

fn total_pages(total: i64, size: i64) -> i64 {
    if total <= 0 {
        0
    } else {
        (total - 1) / size + 1
    }
}

/// 1-based page slice plus the page count, as the console's pager expects.
fn paginate<T: Clone>(items: &[T], page: i64, size: i64) -> (Vec<T>, i64) {
    let start = (page - 1).saturating_mul(size).min(items.len() as i64) as usize;
    let end = (start as i64).saturating_add(size).min(items.len() as i64) as usize;
    (items[start..end].to_vec(), total_pages(items.len() as i64, size))
}

fn page_params(state: &AppState, req: &Request) -> Result<(i64, i64), ApiError> {
    let page = opt_i64(req, "page")?.unwrap_or(1);
    let size = opt_i64(req, "size")?.unwrap_or(state.config.default_page_size);
    if page < 1 {
        return Err(ApiError::bad_params("page must be >= 1"));
    }
    if size < 1 {
        return Err(ApiError::bad_params("size must be >= 1"));
    }
    Ok((page, size))
}

struct FixtureInput {
    name: Option<String>,
    price: Option<i64>,
    count: Option<i64>,
}

fn parse_input(req: &Request, require_all: bool) -> Result<FixtureInput, ApiError> {
    let name = opt_str(req, "name")?;
    let price = opt_i64(req, "price")?;
    let count = opt_i64(req, "count")?;
    if let Some(name) = &name {
        if name.is_empty() {
            return Err(ApiError::field("name", "This field may not be blank."));
        }
        check_len("name", name, NAME_MAX_CHARS)?;
    }
    if let Some(price) = price {
        check_non_negative("price", price)?;
    }
    if let Some(count) = count {
        check_non_negative("count", count)?;
    }
    if require_all {
        for (key, present) in [
            ("name", name.is_some()),
            ("price", price.is_some()),
            ("count", count.is_some()),
        ] {
            if !present {
                return Err(ApiError::field(key, "This field is required."));
            }
        }
    }
    Ok(FixtureInput { name, price, count })
}

fn load_fixture(conn: &Connection, id: i64) -> Result<Fixture, ApiError> {
    conn.query_row(
        "SELECT id, name, price, count FROM fixtures WHERE id = ?",
        [id],
        |r| {
            Ok(Fixture {
                id: r.get(0)?,
                name: r.get(1)?,
                price: r.get(2)?,
                count: r.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("fixture not found"))
}

fn all_fixtures(conn: &Connection) -> Result<Vec<Fixture>, ApiError> {
    let mut stmt = conn.prepare("SELECT id, name, price, count FROM fixtures ORDER BY id")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Fixture {
                id: r.get(0)?,
                name: r.get(1)?,
                price: r.get(2)?,
                count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn handle_list(state: &mut AppState, req: &Request) -> ApiResult {
    let (page, size) = page_params(state, req)?;
    if state.mock_data() {
        let (data, total_page) = paginate(&mock_fixtures(), page, size);
        return Ok(json!({
            "data": data.iter().map(Fixture::to_json).collect::<Vec<_>>(),
            "totalPage": total_page,
        }));
    }

    let conn = db_conn(state)?;
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM fixtures", [], |r| r.get(0))?;
    let mut stmt = conn.prepare(
        "SELECT id, name, price, count FROM fixtures ORDER BY id LIMIT ? OFFSET ?",
    )?;
    let data = stmt
        .query_map((size, (page - 1).saturating_mul(size)), |r| {
            Ok(Fixture {
                id: r.get(0)?,
                name: r.get(1)?,
                price: r.get(2)?,
                count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({
        "data": data.iter().map(Fixture::to_json).collect::<Vec<_>>(),
        "totalPage": total_pages(total, size),
    }))
}

fn handle_get(state: &mut AppState, req: &Request) -> ApiResult {
    let id = required_i64(req, "id")?;
    if state.mock_data() {
        return mock_fixtures()
            .into_iter()
            .find(|f| f.id == id)
            .map(|f| f.to_json())
            .ok_or_else(|| ApiError::not_found("fixture not found"));
    }
    let conn = db_conn(state)?;
    Ok(load_fixture(conn, id)?.to_json())
}

fn handle_create(state: &mut AppState, req: &Request) -> ApiResult {
    let input = parse_input(req, true)?;
    if state.mock_data() {
        return Ok(json!({ "message": "Fixture added successfully (mock)" }));
    }
    let conn = db_conn(state)?;
    conn.execute(
        "INSERT INTO fixtures(name, price, count) VALUES(?, ?, ?)",
        (&input.name, input.price, input.count),
    )
    .map_err(|e| ApiError::db("db_insert_failed", "fixtures", e))?;
    Ok(load_fixture(conn, conn.last_insert_rowid())?.to_json())
}

fn handle_update(state: &mut AppState, req: &Request) -> ApiResult {
    let id = required_i64(req, "id")?;
    let input = parse_input(req, false)?;
    if state.mock_data() {
        return Ok(json!({ "message": "Fixture updated successfully (mock)" }));
    }
    let conn = db_conn(state)?;
    let current = load_fixture(conn, id)?;
    let next = Fixture {
        id,
        name: input.name.unwrap_or(current.name),
        price: input.price.unwrap_or(current.price),
        count: input.count.unwrap_or(current.count),
    };
    conn.execute(
        "UPDATE fixtures SET name = ?, price = ?, count = ? WHERE id = ?",
        (&next.name, next.price, next.count, id),
    )
    .map_err(|e| ApiError::db("db_update_failed", "fixtures", e))?;
    Ok(next.to_json())
}

fn handle_delete(state: &mut AppState, req: &Request) -> ApiResult {
    let id = required_i64(req, "id")?;
    if state.mock_data() {
        return Ok(json!({ "message": "Fixture deleted successfully (mock)" }));
    }
    let conn = db_conn(state)?;
    let n = conn
        .execute("DELETE FROM fixtures WHERE id = ?", [id])
        .map_err(|e| ApiError::db("db_delete_failed", "fixtures", e))?;
    if n == 0 {
        return Err(ApiError::not_found("fixture not found"));
    }
    Ok(json!({ "ok": true }))
}

/// Read-only inventory for the teacher portal.
fn handle_teacher_list(state: &mut AppState, _req: &Request) -> ApiResult {
    let fixtures = if state.mock_data() {
        mock_fixtures()
    } else {
        all_fixtures(db_conn(state)?)?
    };
    Ok(json!({
        "fixtures": fixtures.iter().map(Fixture::to_json).collect::<Vec<_>>(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "admin.fixtures.list" => handle_list(state, req),
        "admin.fixtures.get" => handle_get(state, req),
        "admin.fixtures.create" => handle_create(state, req),
        "admin.fixtures.update" => handle_update(state, req),
        "admin.fixtures.delete" => handle_delete(state, req),
        "teacher.fixtures.list" => handle_teacher_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
