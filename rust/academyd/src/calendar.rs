//! Dated to-dos on a class calendar.
//!
//! A class holds at most one to-do per date. Incoming entries are normalized
//! the same way the class editor builds them before they are merged into the
//! stored set.

use chrono::{Datelike, NaiveDate};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

pub const TITLE_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    pub task: String,
    pub date: NaiveDate,
}

impl Todo {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "task": self.task,
            "date": self.date.format("%Y-%m-%d").to_string(),
        })
    }
}

/// An incoming to-do; `id` is set when it refers to an existing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDraft {
    pub id: Option<i64>,
    pub title: String,
    pub task: String,
    pub date: NaiveDate,
}

fn text_field(obj: &Value, primary: &str, fallback: &str) -> Result<String, String> {
    for key in [primary, fallback] {
        match obj.get(key) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.is_empty() => continue,
            Some(Value::String(s)) => return Ok(s.clone()),
            Some(_) => return Err(format!("todo {} must be a string", primary)),
        }
    }
    Ok(String::new())
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    // Date pickers send full timestamps; only the calendar day matters.
    let day: String = raw.trim().chars().take(10).collect();
    NaiveDate::parse_from_str(&day, "%Y-%m-%d")
        .map_err(|_| format!("invalid date: {:?} (expected YYYY-MM-DD)", raw))
}

fn id_field(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn normalize_todo(obj: &Value) -> Result<TodoDraft, String> {
    if !obj.is_object() {
        return Err("todos must be an array of objects".to_string());
    }
    let date = match obj.get("date") {
        Some(Value::String(s)) => parse_date(s)?,
        _ => return Err("todo date is required".to_string()),
    };
    let title = text_field(obj, "title", "todoTitle")?;
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(format!(
            "todo title must have no more than {} characters",
            TITLE_MAX_CHARS
        ));
    }
    let task = text_field(obj, "task", "description")?;
    let id = obj.get("id").and_then(id_field);
    Ok(TodoDraft {
        id,
        title,
        task,
        date,
    })
}

/// Normalizes a payload's to-do list and enforces one entry per date.
pub fn parse_todos(values: &[Value]) -> Result<Vec<TodoDraft>, String> {
    let mut seen: HashSet<NaiveDate> = HashSet::new();
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        let draft = normalize_todo(v)?;
        if !seen.insert(draft.date) {
            return Err(format!(
                "more than one todo on {}",
                draft.date.format("%Y-%m-%d")
            ));
        }
        out.push(draft);
    }
    Ok(out)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergePlan {
    pub update: Vec<(i64, TodoDraft)>,
    pub create: Vec<TodoDraft>,
    pub delete: Vec<i64>,
}

/// Items whose id matches an existing row update it, the rest are created,
/// and existing rows not mentioned are deleted.
pub fn plan_merge(existing_ids: &[i64], incoming: Vec<TodoDraft>) -> MergePlan {
    let mut remaining: Vec<i64> = existing_ids.to_vec();
    let mut plan = MergePlan::default();
    for draft in incoming {
        match draft.id.and_then(|id| remaining.iter().position(|x| *x == id)) {
            Some(pos) => {
                let id = remaining.remove(pos);
                plan.update.push((id, draft));
            }
            None => plan.create.push(draft),
        }
    }
    plan.delete = remaining;
    plan
}

/// First day of the month and first day of the following month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

#[derive(Debug, Default)]
pub struct MonthView {
    pub todos: Vec<Todo>,
    pub days: BTreeMap<NaiveDate, Vec<Todo>>,
}

impl MonthView {
    pub fn build(year: i32, month: u32, todos: impl IntoIterator<Item = Todo>) -> Self {
        let mut view = MonthView::default();
        for t in todos {
            if t.date.year() != year || t.date.month() != month {
                continue;
            }
            view.days.entry(t.date).or_default().push(t.clone());
            view.todos.push(t);
        }
        view.todos.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        view
    }

    pub fn marked_dates(&self) -> Vec<String> {
        self.days
            .keys()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect()
    }

    pub fn to_json(&self) -> Value {
        let mut days = serde_json::Map::new();
        for (date, items) in &self.days {
            days.insert(
                date.format("%Y-%m-%d").to_string(),
                Value::Array(items.iter().map(Todo::to_json).collect()),
            );
        }
        json!({
            "todos": self.todos.iter().map(Todo::to_json).collect::<Vec<_>>(),
            "days": days,
            "markedDates": self.marked_dates(),
        })
    }
}
