//! Layer merging and `-D key=value` overrides
//!
//! Objects deep-merge by key. Arrays and scalars are replaced by the later
//! layer.

use serde_json::{Map, Value};

use super::effective::ConfigError;

/// Deep merge `overlay` onto `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let value = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in precedence order (last wins).
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Split a dotted override key into object path segments.
///
/// Property names contain dots themselves, so everything after
/// `properties.` is one key, and a server key is `servers.<id>.<key>` with
/// the id taking every middle segment.
fn key_path(key: &str) -> Vec<String> {
    if let Some(property) = key.strip_prefix("properties.") {
        return vec!["properties".to_string(), property.to_string()];
    }
    if let Some(rest) = key.strip_prefix("servers.") {
        if let Some((id, field)) = rest.rsplit_once('.') {
            return vec!["servers".to_string(), id.to_string(), field.to_string()];
        }
    }
    key.split('.').map(str::to_string).collect()
}

fn scalar(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

/// Build one override layer from `key=value` pairs.
pub fn parse_overrides<S: AsRef<str>>(pairs: &[S]) -> Result<Value, ConfigError> {
    let mut layer = Value::Object(Map::new());
    for pair in pairs {
        let pair = pair.as_ref();
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| ConfigError::Parse(format!("override must be key=value: {}", pair)))?;
        let path = key_path(key.trim());
        if path.iter().any(String::is_empty) {
            return Err(ConfigError::Parse(format!("empty segment in override key: {}", key)));
        }
        let value = path
            .iter()
            .rev()
            .fold(scalar(raw.trim()), |inner, segment| {
                let mut map = Map::new();
                map.insert(segment.clone(), inner);
                Value::Object(map)
            });
        layer = deep_merge(layer, value);
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge() {
        let base = json!({"servers": {"central": {"username": "ci", "releaseUrl": "a"}}, "parallelism": 1});
        let overlay = json!({"servers": {"central": {"releaseUrl": "b"}}, "parallelism": 4});
        let merged = deep_merge(base, overlay);

        assert_eq!(merged["servers"]["central"]["username"], "ci");
        assert_eq!(merged["servers"]["central"]["releaseUrl"], "b");
        assert_eq!(merged["parallelism"], 4);
    }

    #[test]
    fn test_arrays_replace() {
        let merged = merge_layers(vec![
            json!({"direct_only_urls": ["a", "b"]}),
            json!({"direct_only_urls": ["c"]}),
        ]);
        assert_eq!(merged["direct_only_urls"], json!(["c"]));
    }

    #[test]
    fn test_parse_overrides() {
        let layer = parse_overrides(&[
            "parallelism=8",
            "dry_run=true",
            "properties.stage.releaseUrl.central=file:///tmp/repo",
            "servers.corp.mirror.authRedirect=central",
            "distribution.release.id=central",
        ])
        .unwrap();

        assert_eq!(layer["parallelism"], 8);
        assert_eq!(layer["dry_run"], true);
        assert_eq!(layer["properties"]["stage.releaseUrl.central"], "file:///tmp/repo");
        assert_eq!(layer["servers"]["corp.mirror"]["authRedirect"], "central");
        assert_eq!(layer["distribution"]["release"]["id"], "central");
    }

    #[test]
    fn test_parse_overrides_rejects_malformed() {
        assert!(parse_overrides(&["parallelism"]).is_err());
        assert!(parse_overrides(&["a..b=1"]).is_err());
    }
}
