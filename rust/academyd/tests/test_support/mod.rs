#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tempfile::TempDir;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin-pass-1";

/// Fresh workspace with a bootstrap admin and cheap password hashing.
pub fn temp_workspace(extra: Value) -> TempDir {
    let dir = tempfile::Builder::new()
        .prefix("academyd-test-")
        .tempdir()
        .expect("create temp dir");
    let mut cfg = json!({
        "passwordIterations": 10,
        "bootstrapAdmin": { "username": ADMIN_USER, "password": ADMIN_PASSWORD },
    });
    if let (Some(cfg), Some(extra)) = (cfg.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            cfg.insert(k.clone(), v.clone());
        }
    }
    std::fs::write(dir.path().join("academyd.json"), cfg.to_string()).expect("write config");
    dir
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    seq: u64,
    pub token: Option<String>,
}

impl Sidecar {
    pub fn spawn(args: &[&str]) -> Self {
        let exe = env!("CARGO_BIN_EXE_academyd");
        let mut child = Command::new(exe)
            .args(args)
            .env_remove("ACADEMYD_MOCK_DATA")
            .env_remove("ACADEMYD_ADMIN_USERNAME")
            .env_remove("ACADEMYD_ADMIN_PASSWORD")
            .env_remove("ACADEMYD_WORKSPACE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn academyd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            seq: 0,
            token: None,
        }
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn call_as(&mut self, token: Option<&str>, method: &str, params: Value) -> Value {
        self.seq += 1;
        let id = self.seq.to_string();
        let mut payload = json!({ "id": id, "method": method, "params": params });
        if let Some(t) = token {
            payload["token"] = json!(t);
        }
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            let code = value["error"]["code"].as_str().unwrap_or("unknown");
            assert_ne!(code, "not_implemented", "unknown method {}", method);
        }
        value
    }

    pub fn call(&mut self, method: &str, params: Value) -> Value {
        let token = self.token.clone();
        self.call_as(token.as_deref(), method, params)
    }

    /// Asserts success and returns `result`.
    pub fn ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Asserts failure and returns the error object.
    pub fn fail(&mut self, method: &str, params: Value) -> Value {
        let value = self.call(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"].clone()
    }

    pub fn fail_code(&mut self, method: &str, params: Value) -> String {
        self.fail(method, params)["code"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    pub fn select(&mut self, workspace: &Path) -> Value {
        self.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        )
    }

    /// Logs in and keeps the access token for later calls.
    pub fn login(&mut self, username: &str, password: &str, role: &str) -> Value {
        let result = self.ok(
            "auth.login",
            json!({ "username": username, "password": password, "role": role }),
        );
        self.token = result["access"].as_str().map(str::to_string);
        assert!(self.token.is_some(), "login returned no access token");
        result
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Sidecar with a selected workspace and a logged-in admin.
pub fn admin_session(extra_config: Value) -> (TempDir, Sidecar) {
    let workspace = temp_workspace(extra_config);
    let mut sidecar = Sidecar::spawn(&[]);
    sidecar.select(workspace.path());
    sidecar.login(ADMIN_USER, ADMIN_PASSWORD, "admin");
    (workspace, sidecar)
}

pub fn create_teacher(sidecar: &mut Sidecar, teacher_id: &str, passwd: &str, name: &str) -> i64 {
    let t = sidecar.ok(
        "admin.teachers.create",
        json!({
            "teacherId": teacher_id,
            "passwd": passwd,
            "name": name,
            "age": 35,
            "position": "수학",
            "sex": "F",
        }),
    );
    t["id"].as_i64().expect("teacher id")
}

pub fn create_student(sidecar: &mut Sidecar, name: &str, email: &str) -> i64 {
    let s = sidecar.ok(
        "admin.students.create",
        json!({
            "name": name,
            "email": email,
            "birth_date": "2012-03-04",
            "gender": "M",
        }),
    );
    s["id"].as_i64().expect("student id")
}
