use crate::Metadata;
use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::Value;

pub const EMPTY_CELL: &str = "—";

/// Compact `dd.mm. HH:MM` in local time. Unparseable input is shown as-is.
pub fn format_date(ts: &str) -> String {
    if ts.trim().is_empty() {
        return EMPTY_CELL.to_string();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
        return parsed.with_timezone(&Local).format("%d.%m. %H:%M").to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f") {
        return parsed.format("%d.%m. %H:%M").to_string();
    }
    ts.to_string()
}

pub fn format_score(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}

pub fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        EMPTY_CELL
    } else {
        value
    }
}

pub fn truncate(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let mut out: String = input.chars().take(max).collect();
    out.push('…');
    out
}

/// One-line gist of a context payload: the first text-like field, else the
/// first few keys.
pub fn payload_summary(payload: &Metadata) -> String {
    if payload.is_empty() {
        return "{}".to_string();
    }
    for key in ["content", "text", "message", "summary", "input"] {
        if let Some(Value::String(text)) = payload.get(key) {
            return truncate(text, 80);
        }
    }
    let keys: Vec<&str> = payload.keys().take(3).map(String::as_str).collect();
    let more = if payload.len() > 3 { ", …" } else { "" };
    format!("{{{}{more}}}", keys.join(", "))
}

/// Metadata values rendered for display; strings without quotes.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
