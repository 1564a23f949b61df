//! Console accounts, password hashing and bearer tokens.
//!
//! Passwords are stored as `sha256$<iterations>$<salt>$<hex digest>`. Tokens are
//! opaque random strings kept in the `sessions` table; an access token records
//! the refresh token it was minted from so logout can revoke both.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;

const HASH_SCHEME: &str = "sha256";
const KIND_ACCESS: &str = "access";
const KIND_REFRESH: &str = "refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Teacher,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "teacher" => Some(Self::Teacher),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
        }
    }

    /// Label shown in the console header.
    pub fn position(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Teacher => "Teacher",
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub display_name: String,
}

/// The authenticated user behind a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = stretch(&salt, password, iterations);
    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        iterations,
        salt,
        hex::encode(digest)
    )
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(4, '$');
    let (Some(scheme), Some(iters), Some(salt), Some(expected)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let Ok(iterations) = iters.parse::<u32>() else {
        return false;
    };
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };
    constant_time_eq(&stretch(salt, password, iterations), &expected)
}

fn stretch(salt: &str, password: &str, iterations: u32) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let mut digest = hasher.finalize();
    for _ in 1..iterations.max(1) {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(password.as_bytes());
        digest = hasher.finalize();
    }
    digest.to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        // Unknown roles are stored only by hand; treat them as the least privileged.
        role: Role::parse(&role).unwrap_or(Role::Teacher),
        display_name: row.get(4)?,
    })
}

pub fn find_user(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, password_hash, role, display_name FROM users WHERE username = ?",
        [username],
        row_to_user,
    )
    .optional()
}

pub fn get_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, password_hash, role, display_name FROM users WHERE id = ?",
        [id],
        row_to_user,
    )
    .optional()
}

pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    role: Role,
    display_name: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users(username, password_hash, role, display_name) VALUES(?, ?, ?, ?)",
        (username, password_hash, role.as_str(), display_name),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_password(conn: &Connection, user_id: i64, password_hash: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (password_hash, user_id),
    )?;
    Ok(())
}

/// Creates the configured admin account when the workspace has no admin yet.
pub fn ensure_bootstrap_admin(conn: &Connection, cfg: &Config) -> rusqlite::Result<bool> {
    let Some(admin) = cfg.bootstrap_admin.as_ref() else {
        return Ok(false);
    };
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = 'admin'",
        [],
        |r| r.get(0),
    )?;
    if existing > 0 || find_user(conn, &admin.username)?.is_some() {
        return Ok(false);
    }
    let hash = hash_password(&admin.password, cfg.password_iterations);
    create_user(conn, &admin.username, &hash, Role::Admin, &admin.username)?;
    Ok(true)
}

fn new_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// A lifetime that cannot be represented yields an already-expired token.
fn expiry(now: DateTime<Utc>, ttl: Option<Duration>) -> DateTime<Utc> {
    ttl.and_then(|d| now.checked_add_signed(d)).unwrap_or(now)
}

fn insert_session(
    conn: &Connection,
    kind: &str,
    user_id: i64,
    parent: Option<&str>,
    expires_at: DateTime<Utc>,
) -> rusqlite::Result<String> {
    let token = new_token();
    conn.execute(
        "INSERT INTO sessions(token, kind, user_id, parent_token, expires_at, revoked)
         VALUES(?, ?, ?, ?, ?, 0)",
        (&token, kind, user_id, parent, expires_at.to_rfc3339()),
    )?;
    Ok(token)
}

pub fn issue_tokens(
    conn: &Connection,
    user_id: i64,
    cfg: &Config,
    now: DateTime<Utc>,
) -> rusqlite::Result<TokenPair> {
    let refresh = insert_session(
        conn,
        KIND_REFRESH,
        user_id,
        None,
        expiry(now, Duration::try_days(cfg.refresh_token_ttl_days)),
    )?;
    let access = insert_session(
        conn,
        KIND_ACCESS,
        user_id,
        Some(&refresh),
        expiry(now, Duration::try_minutes(cfg.access_token_ttl_minutes)),
    )?;
    Ok(TokenPair { access, refresh })
}

/// Returns the owning user id of a live (unrevoked, unexpired) token of `kind`.
fn live_session(
    conn: &Connection,
    token: &str,
    kind: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<i64>> {
    let row: Option<(i64, String, i64)> = conn
        .query_row(
            "SELECT user_id, expires_at, revoked FROM sessions WHERE token = ? AND kind = ?",
            (token, kind),
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((user_id, expires_at, revoked)) = row else {
        return Ok(None);
    };
    if revoked != 0 {
        return Ok(None);
    }
    let live = DateTime::parse_from_rfc3339(&expires_at)
        .map(|t| t.with_timezone(&Utc) > now)
        .unwrap_or(false);
    Ok(live.then_some(user_id))
}

pub fn resolve_access(
    conn: &Connection,
    token: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<Caller>> {
    let Some(user_id) = live_session(conn, token, KIND_ACCESS, now)? else {
        return Ok(None);
    };
    Ok(get_user(conn, user_id)?.map(|u| Caller {
        user_id: u.id,
        username: u.username,
        role: u.role,
    }))
}

/// Mints a fresh access token from a live refresh token.
pub fn refresh_access(
    conn: &Connection,
    refresh: &str,
    cfg: &Config,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<String>> {
    let Some(user_id) = live_session(conn, refresh, KIND_REFRESH, now)? else {
        return Ok(None);
    };
    insert_session(
        conn,
        KIND_ACCESS,
        user_id,
        Some(refresh),
        expiry(now, Duration::try_minutes(cfg.access_token_ttl_minutes)),
    )
    .map(Some)
}

/// Revokes a refresh token and every access token minted from it.
/// Returns false when the token is unknown.
pub fn revoke_refresh(conn: &Connection, refresh: &str) -> rusqlite::Result<bool> {
    let n = conn.execute(
        "UPDATE sessions SET revoked = 1 WHERE token = ? AND kind = ?",
        (refresh, KIND_REFRESH),
    )?;
    if n == 0 {
        return Ok(false);
    }
    conn.execute(
        "UPDATE sessions SET revoked = 1 WHERE parent_token = ?",
        [refresh],
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn hash_verifies_only_the_right_password() {
        let h = hash_password("s3cret", 50);
        assert!(h.starts_with("sha256$50$"));
        assert!(verify_password("s3cret", &h));
        assert!(!verify_password("s3cret ", &h));
        assert!(!verify_password("s3cret", "plain-text"));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        assert_ne!(hash_password("x", 5), hash_password("x", 5));
    }

    #[test]
    fn tokens_expire_and_revoke() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open");
        let cfg = Config::default();
        let uid = create_user(&conn, "kim", &hash_password("pw", 2), Role::Teacher, "Kim")
            .expect("user");
        let now = Utc::now();
        let pair = issue_tokens(&conn, uid, &cfg, now).expect("issue");

        let caller = resolve_access(&conn, &pair.access, now)
            .expect("resolve")
            .expect("live");
        assert_eq!(caller.username, "kim");
        assert_eq!(caller.role, Role::Teacher);

        // Refresh tokens are not accepted as access tokens.
        assert!(resolve_access(&conn, &pair.refresh, now).expect("resolve").is_none());

        let later = now + Duration::minutes(cfg.access_token_ttl_minutes + 1);
        assert!(resolve_access(&conn, &pair.access, later).expect("resolve").is_none());
        let renewed = refresh_access(&conn, &pair.refresh, &cfg, later)
            .expect("refresh")
            .expect("renewed");
        assert!(resolve_access(&conn, &renewed, later).expect("resolve").is_some());

        assert!(revoke_refresh(&conn, &pair.refresh).expect("revoke"));
        assert!(resolve_access(&conn, &renewed, later).expect("resolve").is_none());
        assert!(refresh_access(&conn, &pair.refresh, &cfg, later)
            .expect("refresh")
            .is_none());
        assert!(!revoke_refresh(&conn, "nope").expect("revoke"));
    }

    #[test]
    fn unrepresentable_lifetimes_do_not_panic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open");
        let cfg = Config {
            access_token_ttl_minutes: i64::MAX,
            refresh_token_ttl_days: i64::MAX,
            ..Config::default()
        };
        let uid = create_user(&conn, "lee", &hash_password("pw", 2), Role::Teacher, "Lee")
            .expect("user");
        let now = Utc::now();
        let pair = issue_tokens(&conn, uid, &cfg, now).expect("issue");
        assert!(resolve_access(&conn, &pair.access, now).expect("resolve").is_none());
        assert!(refresh_access(&conn, &pair.refresh, &cfg, now)
            .expect("refresh")
            .is_none());
    }

    #[test]
    fn bootstrap_admin_is_created_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("open");
        let cfg = Config {
            bootstrap_admin: Some(crate::config::BootstrapAdmin {
                username: "root".into(),
                password: "pw".into(),
            }),
            password_iterations: 3,
            ..Config::default()
        };
        assert!(ensure_bootstrap_admin(&conn, &cfg).expect("first"));
        assert!(!ensure_bootstrap_admin(&conn, &cfg).expect("second"));
        let u = find_user(&conn, "root").expect("find").expect("exists");
        assert_eq!(u.role, Role::Admin);
        assert!(verify_password("pw", &u.password_hash));
    }
}
