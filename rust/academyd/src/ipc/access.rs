use crate::auth::{self, Caller, Role};

use super::error::ApiError;
use super::helpers::db_conn;
use super::types::{AppState, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Open,
    AnyUser,
    Staff,
    Admin,
}

fn gate_for(method: &str) -> Gate {
    if method.starts_with("admin.") {
        Gate::Admin
    } else if method.starts_with("teacher.") {
        Gate::Staff
    } else if method == "auth.me" {
        Gate::AnyUser
    } else {
        Gate::Open
    }
}

/// Resolves the bearer token for gated methods and checks the caller's role.
pub fn authorize(state: &AppState, req: &Request) -> Result<Option<Caller>, ApiError> {
    let gate = gate_for(&req.method);
    if gate == Gate::Open {
        return Ok(None);
    }
    let conn = db_conn(state)?;
    let token = req
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".into())
        })?;
    let caller = auth::resolve_access(conn, token, chrono::Utc::now())?
        .ok_or_else(|| ApiError::Unauthorized("Token is invalid or expired".into()))?;

    let allowed = match gate {
        Gate::Open | Gate::AnyUser | Gate::Staff => true,
        Gate::Admin => caller.role == Role::Admin,
    };
    if !allowed {
        return Err(ApiError::Forbidden(format!(
            "{} requires an admin account",
            req.method
        )));
    }
    Ok(Some(caller))
}
