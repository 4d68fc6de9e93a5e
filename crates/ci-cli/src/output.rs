//! Result rendering: pretty JSON in `--json` mode, a short human summary
//! otherwise (mirrors the teacher CLI's `output::display`).

use serde_json::Value;

use crate::cli::Connection;

pub fn display(conn: &Connection, value: &Value) {
    if conn.json {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        );
        return;
    }
    println!("{}", human_summary(value));
}

/// A best-effort single-line-per-field rendering for humans. Objects print
/// `key: value` pairs; arrays print one entry per line; scalars print as-is.
fn human_summary(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", scalar(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Array(items) => items
            .iter()
            .map(scalar)
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar(other),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
