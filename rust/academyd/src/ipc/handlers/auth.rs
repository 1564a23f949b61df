use crate::auth::{self, Caller, Role, User};
use crate::ipc::error::{respond, ApiError, ApiResult};
use crate::ipc::helpers::{db_conn, opt_str, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".into())
}

fn user_json(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "name": user.username,
        "position": user.role.position(),
    })
}

fn login_admin(conn: &Connection, username: &str, password: &str) -> Result<User, ApiError> {
    match auth::find_user(conn, username)? {
        Some(u) if u.role == Role::Admin && auth::verify_password(password, &u.password_hash) => {
            Ok(u)
        }
        _ => Err(ApiError::Unauthorized(
            "Invalid credentials or not an admin".into(),
        )),
    }
}

/// Existing teacher accounts are tried first; otherwise the teacher roster is
/// checked and a teacher account is created (or its password synced) on
/// success. Only accounts with the teacher role are ever returned or touched.
fn login_teacher(
    conn: &Connection,
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<User, ApiError> {
    let existing = auth::find_user(conn, username)?;
    if let Some(u) = &existing {
        if u.role != Role::Teacher {
            tracing::warn!(username, role = u.role.as_str(), "teacher login for a non-teacher account");
            return Err(invalid_credentials());
        }
        if auth::verify_password(password, &u.password_hash) {
            return Ok(u.clone());
        }
    }

    let teacher: Option<(String, String)> = conn
        .query_row(
            "SELECT passwd, teacher_name FROM teachers WHERE teacher_id = ?",
            [username],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((passwd_hash, teacher_name)) = teacher else {
        tracing::info!(username, "teacher login: no such teacher");
        return Err(invalid_credentials());
    };
    if !auth::verify_password(password, &passwd_hash) {
        tracing::info!(username, "teacher login: password mismatch");
        return Err(invalid_credentials());
    }

    let hash = auth::hash_password(password, state.config.password_iterations);
    let user_id = match existing {
        Some(u) => {
            auth::set_password(conn, u.id, &hash)
                .map_err(|e| ApiError::db("db_update_failed", "users", e))?;
            u.id
        }
        None => auth::create_user(conn, username, &hash, Role::Teacher, &teacher_name)
            .map_err(|e| ApiError::db("db_insert_failed", "users", e))?,
    };
    auth::get_user(conn, user_id)?.ok_or_else(invalid_credentials)
}

fn handle_login(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let username = opt_str(req, "username")?.unwrap_or_default();
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let role = opt_str(req, "role")?.unwrap_or_default();
    tracing::info!(username = %username, role = %role, "login attempt");

    let user = match role.as_str() {
        "admin" => login_admin(conn, &username, &password)?,
        "teacher" => login_teacher(conn, state, &username, &password)?,
        _ => return Err(ApiError::bad_params("Invalid request")),
    };

    let tokens = auth::issue_tokens(conn, user.id, &state.config, Utc::now())
        .map_err(|e| ApiError::db("db_insert_failed", "sessions", e))?;
    tracing::info!(username = %user.username, role = user.role.as_str(), "login succeeded");
    Ok(json!({
        "access": tokens.access,
        "refresh": tokens.refresh,
        "user": user_json(&user),
    }))
}

fn handle_logout(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let refresh = required_str(req, "refresh")?;
    let revoked = auth::revoke_refresh(conn, &refresh)
        .map_err(|e| ApiError::db("db_update_failed", "sessions", e))?;
    if !revoked {
        return Err(ApiError::bad_params("unknown refresh token"));
    }
    Ok(json!({ "loggedOut": true }))
}

fn handle_refresh(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let refresh = required_str(req, "refresh")?;
    let access = auth::refresh_access(conn, &refresh, &state.config, Utc::now())
        .map_err(|e| ApiError::db("db_insert_failed", "sessions", e))?
        .ok_or_else(|| ApiError::Unauthorized("Token is invalid or expired".into()))?;
    Ok(json!({ "access": access }))
}

fn handle_me(state: &mut AppState, caller: &Caller) -> ApiResult {
    let conn = db_conn(state)?;
    let user = auth::get_user(conn, caller.user_id)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    let mut out = user_json(&user);
    out["displayName"] = json!(user.display_name);
    out["role"] = json!(user.role.as_str());
    Ok(out)
}

fn handle_users_create(state: &mut AppState, req: &Request) -> ApiResult {
    let conn = db_conn(state)?;
    let username = required_str(req, "username")?;
    let password = required_str(req, "password")?;
    let role = required_str(req, "role")?;
    let role = Role::parse(&role).ok_or_else(|| ApiError::field("role", "must be admin or teacher"))?;
    let display_name = opt_str(req, "displayName")?.unwrap_or_else(|| username.clone());
    if auth::find_user(conn, &username)?.is_some() {
        return Err(ApiError::Conflict(format!("username {} already exists", username)));
    }
    // A roster teacher owns this login name for the portal.
    let on_roster: Option<i64> = conn
        .query_row(
            "SELECT id FROM teachers WHERE teacher_id = ?",
            [&username],
            |r| r.get(0),
        )
        .optional()?;
    if role != Role::Teacher && on_roster.is_some() {
        return Err(ApiError::Conflict(format!(
            "username {} is a teacher login id",
            username
        )));
    }
    let hash = auth::hash_password(&password, state.config.password_iterations);
    let id = auth::create_user(conn, &username, &hash, role, &display_name)
        .map_err(|e| ApiError::db("db_insert_failed", "users", e))?;
    Ok(json!({ "id": id, "name": username, "position": role.position() }))
}

pub fn try_handle(
    state: &mut AppState,
    req: &Request,
    caller: Option<&Caller>,
) -> Option<serde_json::Value> {
    let result = match (req.method.as_str(), caller) {
        ("auth.login", _) => handle_login(state, req),
        ("auth.logout", _) => handle_logout(state, req),
        ("auth.refresh", _) => handle_refresh(state, req),
        ("auth.me", Some(caller)) => handle_me(state, caller),
        ("admin.users.create", Some(_)) => handle_users_create(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
