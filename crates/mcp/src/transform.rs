//! Declarative payload-transform pipeline.
//!
//! A pipeline is a sequence of steps, each pairing a path with a transform.
//! Paths are `.`-separated segments; a segment ending in `[]` iterates the
//! array at that point, and `_root[]` addresses the root value itself when
//! it is an array. Missing intermediate segments make the step a silent
//! no-op. The input value is never mutated: the pipeline works on a deep
//! copy.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use cubicler_types::config::{TransformOp, TransformStep};
use regex::Regex;
use serde_json::Value;

/// Run a pipeline over a JSON value, returning the transformed copy.
pub fn transform_response(data: &Value, steps: &[TransformStep]) -> Value {
    let mut result = data.clone();
    for step in steps {
        apply_step(&mut result, step);
    }
    result
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `key`
    Key(String),
    /// `key[]`
    KeyEach(String),
    /// `_root[]`
    RootEach,
}

fn parse_path(path: &str) -> Vec<Segment> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part == "_root[]" {
                Segment::RootEach
            } else if let Some(key) = part.strip_suffix("[]") {
                Segment::KeyEach(key.to_string())
            } else {
                Segment::Key(part.to_string())
            }
        })
        .collect()
}

fn apply_step(value: &mut Value, step: &TransformStep) {
    let segments = parse_path(&step.path);
    if segments.is_empty() {
        return;
    }
    descend(value, &segments, &step.op);
}

fn descend(value: &mut Value, segments: &[Segment], op: &TransformOp) {
    match segments {
        [] => {}
        [last] => apply_terminal(value, last, op),
        [first, rest @ ..] => match first {
            Segment::Key(key) => {
                if let Some(child) = value.get_mut(key) {
                    descend(child, rest, op);
                }
            }
            Segment::KeyEach(key) => {
                if let Some(Value::Array(items)) = value.get_mut(key) {
                    for item in items {
                        descend(item, rest, op);
                    }
                }
            }
            Segment::RootEach => {
                if let Value::Array(items) = value {
                    for item in items {
                        descend(item, rest, op);
                    }
                }
            }
        },
    }
}

fn apply_terminal(value: &mut Value, segment: &Segment, op: &TransformOp) {
    match segment {
        Segment::Key(key) => {
            if matches!(op, TransformOp::Remove) {
                if let Some(object) = value.as_object_mut() {
                    object.remove(key);
                }
            } else if let Some(child) = value.get_mut(key) {
                apply_op(child, op);
            }
        }
        Segment::KeyEach(key) => {
            if let Some(Value::Array(items)) = value.get_mut(key) {
                if matches!(op, TransformOp::Remove) {
                    items.clear();
                } else {
                    for item in items {
                        apply_op(item, op);
                    }
                }
            }
        }
        Segment::RootEach => {
            if let Value::Array(items) = value {
                if matches!(op, TransformOp::Remove) {
                    items.clear();
                } else {
                    for item in items {
                        apply_op(item, op);
                    }
                }
            }
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_op(value: &mut Value, op: &TransformOp) {
    match op {
        TransformOp::Map { map } => {
            let key = value_to_string(value);
            if let Some(mapped) = map.get(&key) {
                *value = mapped.clone();
            }
        }
        TransformOp::DateFormat { format } => {
            if let Some(formatted) = value.as_str().and_then(|s| format_date(s, format)) {
                *value = Value::String(formatted);
            }
            // Non-string or unparseable input keeps the original.
        }
        TransformOp::Template { template } => {
            let rendered = template.replace("{value}", &value_to_string(value));
            *value = Value::String(rendered);
        }
        TransformOp::RegexReplace { pattern, replacement } => {
            let Some(text) = value.as_str() else { return };
            match Regex::new(pattern) {
                Ok(re) => {
                    let replaced = re.replace_all(text, replacement.as_str()).into_owned();
                    *value = Value::String(replaced);
                }
                Err(_) => {
                    // Invalid pattern keeps the original.
                }
            }
        }
        TransformOp::Remove => {
            // Handled structurally in apply_terminal.
        }
    }
}

fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(parsed.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

fn format_date(input: &str, format: &str) -> Option<String> {
    let datetime = parse_datetime(input)?;
    let rendered = format
        .replace("YYYY", &datetime.format("%Y").to_string())
        .replace("MM", &datetime.format("%m").to_string())
        .replace("DD", &datetime.format("%d").to_string())
        .replace("HH", &datetime.format("%H").to_string())
        .replace("mm", &datetime.format("%M").to_string())
        .replace("ss", &datetime.format("%S").to_string());
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn steps(value: Value) -> Vec<TransformStep> {
        serde_json::from_value(value).expect("steps")
    }

    #[test]
    fn map_date_format_and_remove_compose() {
        let input = json!({
            "status": "1",
            "created_at": "2023-12-25T10:30:45.000Z",
            "debug": "x"
        });
        let pipeline = steps(json!([
            { "path": "status", "transform": "map", "map": { "1": "Active" } },
            { "path": "created_at", "transform": "date_format", "format": "YYYY-MM-DD" },
            { "path": "debug", "transform": "remove" }
        ]));

        let output = transform_response(&input, &pipeline);
        assert_eq!(
            output,
            json!({ "status": "Active", "created_at": "2023-12-25" })
        );

        // Re-applying the same pipeline is a fixed point.
        assert_eq!(transform_response(&output, &pipeline), output);
    }

    #[test]
    fn input_is_not_mutated() {
        let input = json!({ "debug": "x" });
        let pipeline = steps(json!([{ "path": "debug", "transform": "remove" }]));
        let _ = transform_response(&input, &pipeline);
        assert_eq!(input, json!({ "debug": "x" }));
    }

    #[test]
    fn array_iteration_applies_to_each_element() {
        let input = json!({ "items": [ { "state": "0" }, { "state": "1" } ] });
        let pipeline = steps(json!([
            { "path": "items[].state", "transform": "map", "map": { "0": "off", "1": "on" } }
        ]));
        let output = transform_response(&input, &pipeline);
        assert_eq!(output, json!({ "items": [ { "state": "off" }, { "state": "on" } ] }));
    }

    #[test]
    fn root_array_addressing() {
        let input = json!([{ "name": "a" }, { "name": "b" }]);
        let pipeline = steps(json!([
            { "path": "_root[].name", "transform": "template", "template": "user-{value}" }
        ]));
        let output = transform_response(&input, &pipeline);
        assert_eq!(output, json!([{ "name": "user-a" }, { "name": "user-b" }]));
    }

    #[test]
    fn missing_paths_are_silent_noops() {
        let input = json!({ "a": 1 });
        let pipeline = steps(json!([
            { "path": "missing.deep.path", "transform": "remove" },
            { "path": "also[].gone", "transform": "template", "template": "{value}" }
        ]));
        assert_eq!(transform_response(&input, &pipeline), input);
    }

    #[test]
    fn invalid_date_keeps_original() {
        let input = json!({ "created_at": "not a date" });
        let pipeline = steps(json!([
            { "path": "created_at", "transform": "date_format", "format": "YYYY" }
        ]));
        assert_eq!(transform_response(&input, &pipeline), input);
    }

    #[test]
    fn invalid_regex_keeps_original() {
        let input = json!({ "text": "abc123" });
        let pipeline = steps(json!([
            { "path": "text", "transform": "regex_replace", "pattern": "([", "replacement": "#" }
        ]));
        assert_eq!(transform_response(&input, &pipeline), input);
    }

    #[test]
    fn regex_replaces_globally() {
        let input = json!({ "text": "a1b2c3" });
        let pipeline = steps(json!([
            { "path": "text", "transform": "regex_replace", "pattern": "\\d", "replacement": "#" }
        ]));
        assert_eq!(
            transform_response(&input, &pipeline),
            json!({ "text": "a#b#c#" })
        );
    }

    #[test]
    fn map_uses_string_form_of_non_string_values() {
        let input = json!({ "code": 1 });
        let pipeline = steps(json!([
            { "path": "code", "transform": "map", "map": { "1": "one" } }
        ]));
        assert_eq!(transform_response(&input, &pipeline), json!({ "code": "one" }));
    }

    #[test]
    fn date_format_renders_time_tokens() {
        let input = json!({ "at": "2023-12-25T10:30:45.000Z" });
        let pipeline = steps(json!([
            { "path": "at", "transform": "date_format", "format": "YYYY-MM-DD HH:mm:ss" }
        ]));
        assert_eq!(
            transform_response(&input, &pipeline),
            json!({ "at": "2023-12-25 10:30:45" })
        );
    }

    #[test]
    fn remove_on_array_segment_clears_entries() {
        let input = json!({ "items": [1, 2, 3] });
        let pipeline = steps(json!([{ "path": "items[]", "transform": "remove" }]));
        assert_eq!(transform_response(&input, &pipeline), json!({ "items": [] }));
    }
}
