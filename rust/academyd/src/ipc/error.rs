use serde_json::json;
use thiserror::Error;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of a single IPC call. Each variant maps to one wire error code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("select a workspace first")]
    NoWorkspace,

    #[error("{0}")]
    BadParams(String),

    /// Field-level validation failure; `details` carries `{field: message}`.
    #[error("{message}")]
    Validation {
        message: String,
        details: serde_json::Value,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{message}")]
    Db {
        code: &'static str,
        message: String,
        table: Option<&'static str>,
    },

    #[error("{0}")]
    Io(String),
}

pub type ApiResult = Result<serde_json::Value, ApiError>;

impl ApiError {
    pub fn bad_params(msg: impl Into<String>) -> Self {
        Self::BadParams(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn field(field: &str, msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let mut details = serde_json::Map::new();
        details.insert(field.to_string(), serde_json::Value::String(msg.clone()));
        Self::Validation {
            message: format!("{}: {}", field, msg),
            details: serde_json::Value::Object(details),
        }
    }

    pub fn db(code: &'static str, table: &'static str, e: impl std::fmt::Display) -> Self {
        Self::Db {
            code,
            message: e.to_string(),
            table: Some(table),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWorkspace => "no_workspace",
            Self::BadParams(_) => "bad_params",
            Self::Validation { .. } => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Db { code, .. } => *code,
            Self::Io(_) => "io_failed",
        }
    }

    pub fn into_response(self, id: &str) -> serde_json::Value {
        let details = match &self {
            Self::Validation { details, .. } => Some(details.clone()),
            Self::Db {
                table: Some(table), ..
            } => Some(json!({ "table": table })),
            _ => None,
        };
        err(id, self.code(), self.to_string(), details)
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Db {
            code: "db_query_failed",
            message: e.to_string(),
            table: None,
        }
    }
}

pub fn respond(id: &str, result: ApiResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => {
            tracing::warn!(id, code = e.code(), error = %e, "request failed");
            e.into_response(id)
        }
    }
}
