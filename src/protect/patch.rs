//! Patch generation for a single protected path
//!
//! Compares the prior and incoming object at one path and produces the JSON
//! patch operation (if any) that restores the prior value.

use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use serde_json::Value;
use tracing::debug;

use super::record::Record;

/// Split a protected path into lookup segments
///
/// Leading and trailing slashes are trimmed and the remainder is split on `/`
/// with no special handling of repeated separators, so `""` and `"/"` both
/// yield a single empty segment. `~1` and `~0` escapes are decoded so keys
/// containing `/` remain addressable.
pub fn path_segments(path: &str) -> Vec<String> {
    path.trim_matches('/')
        .split('/')
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Compute the operation needed to keep `path` at its value in `old`
///
/// - `old` lacks the path: nothing to protect
/// - `new` lacks the path: `add` the old value back
/// - `new` has an equal value: nothing to do
/// - `new` has a different value: `replace` it with the old value
pub fn diff_path(path: &str, old: &Record, new: &Record) -> Option<PatchOperation> {
    let segments = path_segments(path);

    let Some(old_value) = old.get(&segments) else {
        debug!(path, "path not set on prior object, nothing to protect");
        return None;
    };

    let pointer = PointerBuf::from_tokens(segments.iter().map(String::as_str));

    match new.get(&segments) {
        Some(new_value) if same_value(new_value, old_value) => None,
        Some(new_value) => {
            debug!(path, old = %old_value, new = %new_value, "restoring changed value");
            Some(PatchOperation::Replace(ReplaceOperation {
                path: pointer,
                value: old_value.clone(),
            }))
        }
        None => {
            debug!(path, value = %old_value, "restoring removed value");
            Some(PatchOperation::Add(AddOperation {
                path: pointer,
                value: old_value.clone(),
            }))
        }
    }
}

/// Deep equality where numbers compare by value, so `10` equals `10.0`
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, x)| y.get(key).is_some_and(|y| same_value(x, y)))
        }
        _ => a == b,
    }
}
