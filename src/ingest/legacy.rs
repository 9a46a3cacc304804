//! Import of legacy entity archives.
//!
//! An archive is a JSON array of entities (or an object wrapping such an
//! array under some key), or newline-delimited JSON with one entity per line.
//! Each entity looks like:
//!
//! ```text
//! {
//!   "id": 3,
//!   "history_X": [...], "history_Y": [...],
//!   "detections": [
//!     {"label": "car", "confidence": 0.62, "X": 0.4875, "Y": 0.2597,
//!      "Width": 0.0861, "Height": 0.1389, "frameID": 9.0},
//!     ...
//!   ]
//! }
//! ```
//!
//! `X`/`Y` are box centers and `Width`/`Height` box sizes, usually normalized.
//! Entities without detections fall back to their position histories, indexed
//! by frame 0..N-1. Malformed entities and records are skipped, never fatal.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ingest::detection::{Detection, UNKNOWN_CLASS, UNTRACKED};

/// Mapping from label strings (e.g. "car") to integer class ids.
pub type ClassMap = HashMap<String, i64>;

/// Load a legacy archive from disk.
pub fn load_legacy_json(path: impl AsRef<Path>, class_map: Option<&ClassMap>) -> Result<Vec<Detection>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let rows = parse_legacy_str(&text, class_map);
    info!(path = %path.display(), rows = rows.len(), "imported legacy archive");
    Ok(rows)
}

/// Parse the textual content of a legacy archive.
pub fn parse_legacy_str(text: &str, class_map: Option<&ClassMap>) -> Vec<Detection> {
    let entities = split_entities(text);
    let mut rows = Vec::new();
    for entity in &entities {
        match entity_to_rows(entity, class_map) {
            Some(entity_rows) => rows.extend(entity_rows),
            None => warn!("skipping malformed legacy entity"),
        }
    }
    debug!(entities = entities.len(), rows = rows.len(), "normalized legacy entities");
    rows
}

fn split_entities(text: &str) -> Vec<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) => objects(items),
        Ok(Value::Object(wrapper)) => {
            // Some exports wrap the payload, e.g. {"tracks": [...]}.
            let found = wrapper.into_iter().find_map(|(_, v)| match v {
                Value::Array(items) if matches!(items.first(), Some(Value::Object(_))) => Some(items),
                _ => None,
            });
            found.map(objects).unwrap_or_default()
        }
        Ok(_) => Vec::new(),
        Err(_) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(entity)) => Some(entity),
                Ok(_) => None,
                Err(e) => {
                    debug!(error = %e, "skipping unparseable ndjson line");
                    None
                }
            })
            .collect(),
    }
}

fn objects(items: Vec<Value>) -> Vec<Map<String, Value>> {
    items
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(entity) => Some(entity),
            _ => None,
        })
        .collect()
}

/// Convert one entity to rows. Returns `None` when the entity is malformed.
fn entity_to_rows(entity: &Map<String, Value>, class_map: Option<&ClassMap>) -> Option<Vec<Detection>> {
    let track_id = match entity.get("id") {
        None | Some(Value::Null) => UNTRACKED,
        Some(v) => as_integer(v)?,
    };

    match entity.get("detections") {
        Some(Value::Array(dets)) if !dets.is_empty() => {
            let rows = dets
                .iter()
                .filter_map(Value::as_object)
                .map(|d| detection_row(d, track_id, class_map))
                .collect();
            return Some(rows);
        }
        _ => {}
    }

    let hx = history(entity, "history_X")?;
    let hy = history(entity, "history_Y")?;
    let rows = hx
        .iter()
        .zip(hy.iter())
        .enumerate()
        .map(|(i, (&cx, &cy))| Detection {
            frame: i as u32,
            track_id,
            cls: UNKNOWN_CLASS,
            conf: None,
            cx,
            cy,
            w: 0.0,
            h: 0.0,
        })
        .collect();
    Some(rows)
}

fn detection_row(d: &Map<String, Value>, track_id: i64, class_map: Option<&ClassMap>) -> Detection {
    let frame = d
        .get("frameID")
        .or_else(|| d.get("frame"))
        .and_then(as_float)
        .map(f64::round_ties_even)
        .filter(|f| *f >= 0.0 && *f <= u32::MAX as f64)
        .map_or(0, |f| f as u32);

    Detection {
        frame,
        track_id,
        cls: label_to_cls(d.get("label"), class_map),
        conf: d.get("confidence").and_then(as_float),
        cx: field(d, "X"),
        cy: field(d, "Y"),
        w: field(d, "Width"),
        h: field(d, "Height"),
    }
}

/// Integer labels are used as is, numeric strings are parsed, other strings
/// go through the class map. Anything else is unknown.
fn label_to_cls(label: Option<&Value>, class_map: Option<&ClassMap>) -> i64 {
    match label {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(UNKNOWN_CLASS),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| class_map.and_then(|m| m.get(s).copied()))
            .unwrap_or(UNKNOWN_CLASS),
        _ => UNKNOWN_CLASS,
    }
}

fn field(d: &Map<String, Value>, key: &str) -> f64 {
    d.get(key).and_then(as_float).unwrap_or(0.0)
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A missing or null history is empty; a history with non-numeric entries is malformed.
fn history(entity: &Map<String, Value>, key: &str) -> Option<Vec<f64>> {
    match entity.get(key) {
        None | Some(Value::Null) => Some(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(as_float).collect(),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_map() -> ClassMap {
        HashMap::from([("car".to_string(), 2)])
    }

    #[test]
    fn test_label_mapping() {
        let map = class_map();
        assert_eq!(label_to_cls(Some(&Value::from(5)), Some(&map)), 5);
        assert_eq!(label_to_cls(Some(&Value::from("7")), Some(&map)), 7);
        assert_eq!(label_to_cls(Some(&Value::from("car")), Some(&map)), 2);
        assert_eq!(label_to_cls(Some(&Value::from("bus")), Some(&map)), UNKNOWN_CLASS);
        assert_eq!(label_to_cls(Some(&Value::from("car")), None), UNKNOWN_CLASS);
        assert_eq!(label_to_cls(None, Some(&map)), UNKNOWN_CLASS);
    }

    #[test]
    fn test_frame_falls_back_and_rounds() {
        let rows = parse_legacy_str(
            r#"[{"id": 1, "detections": [{"frame": 3.6}, {"frameID": null}, {"frameID": "x"}]}]"#,
            None,
        );
        let frames: Vec<u32> = rows.iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![4, 0, 0]);
    }

    #[test]
    fn test_null_fields() {
        let rows = parse_legacy_str(
            r#"[{"id": 1, "detections": [{"X": null, "Y": 0.5, "confidence": null}]}]"#,
            None,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cx, 0.0);
        assert_eq!(rows[0].cy, 0.5);
        assert_eq!(rows[0].conf, None);
    }

    #[test]
    fn test_wrapped_payload() {
        let rows = parse_legacy_str(
            r#"{"meta": {"v": 1}, "tracks": [{"id": 4, "history_X": [0.1], "history_Y": [0.2]}]}"#,
            None,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].track_id, 4);
    }

    #[test]
    fn test_malformed_entities_are_skipped() {
        let text = r#"[
            {"id": "abc", "history_X": [0.1], "history_Y": [0.2]},
            {"id": 2, "history_X": [0.1, "q"], "history_Y": [0.2, 0.3]},
            7,
            {"id": 3, "history_X": [0.1, 0.2], "history_Y": [0.2]},
            {"id": 4, "detections": [1, {"X": 0.3}]}
        ]"#;
        let rows = parse_legacy_str(text, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].track_id, 3);
        assert_eq!(rows[1].track_id, 4);
        assert_eq!(rows[1].cx, 0.3);
    }

    #[test]
    fn test_ndjson_skips_bad_lines() {
        let text = "{\"id\": 1, \"history_X\": [0.1], \"history_Y\": [0.2]}\n\nnot json\n[1,2]\n{\"id\": 2, \"history_X\": [0.3], \"history_Y\": [0.4]}\n";
        let rows = parse_legacy_str(text, None);
        assert_eq!(rows.iter().map(|r| r.track_id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_missing_id_is_untracked() {
        let rows = parse_legacy_str(r#"[{"history_X": [0.1], "history_Y": [0.2]}]"#, None);
        assert_eq!(rows[0].track_id, UNTRACKED);
    }
}
