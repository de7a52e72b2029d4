// Document Model
// Ordered JSON-like tree shared by templates, concrete runs and results

pub mod loader;
pub mod names;

pub use loader::{find_in_search_paths, load_document, parse_json, parse_yaml, strip_comments};

use crate::error::{ServiceError, ServiceResult};

use serde_json::{Map, Value};
use tracing::debug;

/// A template or concrete configuration.
///
/// Mappings keep insertion order (`serde_json` with `preserve_order`).
pub type Document = Value;

/// Normalize a link or unit path into a JSON pointer (`a/b` becomes `/a/b`)
pub fn normalize_pointer(path: &str) -> String {
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Split a JSON pointer into unescaped reference tokens
pub fn pointer_tokens(pointer: &str) -> Vec<String> {
    normalize_pointer(pointer)
        .split('/')
        .skip(1)
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Look up a value, failing with a message naming the pointer
pub fn access<'a>(document: &'a Document, pointer: &str) -> ServiceResult<&'a Document> {
    document
        .pointer(&normalize_pointer(pointer))
        .ok_or_else(|| ServiceError::ConfigShape(format!("'{}' does not exist in document", pointer)))
}

/// Walk a pointer, creating empty mappings for every missing step
pub fn access_or_create<'a>(document: &'a mut Document, pointer: &str) -> ServiceResult<&'a mut Document> {
    let mut current = document;
    for token in pointer_tokens(pointer) {
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => map
                .entry(token)
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index: usize = token.parse().map_err(|_| {
                    ServiceError::ConfigShape(format!("'{}' is not an array index in '{}'", token, pointer))
                })?;
                items.get_mut(index).ok_or_else(|| {
                    ServiceError::ConfigShape(format!("index {} out of range in '{}'", index, pointer))
                })?
            }
            _ => {
                return Err(ServiceError::ConfigShape(format!(
                    "cannot descend into scalar while creating '{}'",
                    pointer
                )))
            }
        };
    }
    Ok(current)
}

/// Store a value at a pointer, creating intermediate mappings
pub fn set_pointer(document: &mut Document, pointer: &str, value: Document) -> ServiceResult<()> {
    let slot = access_or_create(document, pointer)?;
    *slot = value;
    Ok(())
}

/// Merge a configuration over the shared default configuration.
///
/// Top-level keys of `additional` replace those of `default`, except that two
/// sequences are concatenated (default entries first).
pub fn merge_config(default: Option<&Document>, additional: &Document) -> Document {
    let (Some(Value::Object(base)), Value::Object(extra)) = (default, additional) else {
        return additional.clone();
    };

    let mut result = base.clone();
    for (key, value) in extra {
        if let (Some(Value::Array(existing)), Value::Array(more)) = (result.get_mut(key), value) {
            existing.extend(more.iter().cloned());
            continue;
        }
        result.insert(key.clone(), value.clone());
    }
    Value::Object(result)
}

/// Check the structure of a root document before it is run
pub fn validate_root(document: &Document) -> ServiceResult<()> {
    let Value::Object(root) = document else {
        return Err(ServiceError::ConfigShape(
            "root document must be a mapping".to_string(),
        ));
    };

    if let Some(configurations) = root.get(names::CONFIGURATIONS) {
        if !configurations.is_array() {
            return Err(ServiceError::ConfigShape(format!(
                "'{}' must be a sequence",
                names::CONFIGURATIONS
            )));
        }
    }

    if let Some(tools) = root.get(names::TOOLS) {
        if !tools.is_array() {
            return Err(ServiceError::ConfigShape(format!(
                "'{}' must be a sequence",
                names::TOOLS
            )));
        }
    }

    for key in root.keys() {
        if !names::KNOWN_ROOT_KEYS.contains(&key.as_str()) {
            debug!(key = %key, "unknown top-level key");
        }
    }

    Ok(())
}

/// Whether any directive marker remains anywhere in the tree
pub fn has_directives(document: &Document) -> bool {
    match document {
        Value::Object(map) => {
            map.keys().any(|k| names::is_directive(k)) || map.values().any(has_directives)
        }
        Value::Array(items) => items.iter().any(has_directives),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_extends_sequences() {
        let default = json!({"tools": ["A"], "x": 1, "y": {"k": 1}});
        let extra = json!({"tools": ["B"], "y": {"j": 2}});

        let merged = merge_config(Some(&default), &extra);
        assert_eq!(merged, json!({"tools": ["A", "B"], "x": 1, "y": {"j": 2}}));
        // the default is left untouched
        assert_eq!(default["tools"], json!(["A"]));
    }

    #[test]
    fn test_merge_without_default() {
        let extra = json!({"a": 1});
        assert_eq!(merge_config(None, &extra), extra);
    }

    #[test]
    fn test_access_or_create() {
        let mut doc = json!({"a": {"b": 1}});
        let slot = access_or_create(&mut doc, "/a/times/run").unwrap();
        *slot = json!(3.5);
        assert_eq!(doc, json!({"a": {"b": 1, "times": {"run": 3.5}}}));

        assert!(access_or_create(&mut doc, "/a/b/c").is_err());
    }

    #[test]
    fn test_pointer_escapes() {
        assert_eq!(pointer_tokens("/a~1b/c~0d"), vec!["a/b", "c~d"]);
        assert_eq!(pointer_tokens("x/y"), vec!["x", "y"]);
        assert!(pointer_tokens("").is_empty());
    }

    #[test]
    fn test_validate_root() {
        assert!(validate_root(&json!({"configurations": []})).is_ok());
        assert!(matches!(
            validate_root(&json!({"configurations": {"a": 1}})),
            Err(ServiceError::ConfigShape(_))
        ));
        assert!(validate_root(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_has_directives() {
        assert!(has_directives(&json!({"a": [{"%link": "/b"}]})));
        assert!(!has_directives(&json!({"a": [{"link": "/b"}]})));
    }
}
