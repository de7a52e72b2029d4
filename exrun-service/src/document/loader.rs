// Document Loader
// Reads JSON-with-comments and YAML documents with located parse errors

use crate::document::Document;
use crate::error::{ServiceError, ServiceResult};

use std::fs;
use std::path::{Path, PathBuf};

/// Number of source lines shown on either side of a parse error
const CONTEXT_LINES: usize = 2;

/// Remove `//` line comments and tolerate a trailing comma before `]` or `}`.
///
/// Comment lines are blanked rather than removed and dropped commas are
/// replaced by a space, so line and column numbers reported by the JSON
/// parser still point into the original text.
pub fn strip_comments(text: &str) -> String {
    let mut blanked = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if line.trim_start().starts_with("//") {
            if line.ends_with("\r\n") {
                blanked.push_str("\r\n");
            } else if line.ends_with('\n') {
                blanked.push('\n');
            }
        } else {
            blanked.push_str(line);
        }
    }

    let chars: Vec<char> = blanked.chars().collect();
    let mut out = String::with_capacity(blanked.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(next, Some(']') | Some('}')) {
                    out.push(' ');
                } else {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }

    out
}

/// Parse JSON-with-comments text into a document
pub fn parse_json(text: &str, file: &str) -> ServiceResult<Document> {
    let cleaned = strip_comments(text);
    serde_json::from_str(&cleaned).map_err(|e| {
        parse_error(file, text, e.line(), e.column(), strip_location(&e.to_string()))
    })
}

/// Parse YAML text into a document
pub fn parse_yaml(text: &str, file: &str) -> ServiceResult<Document> {
    serde_yaml::from_str(text).map_err(|e| {
        let (line, column) = e
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));
        parse_error(file, text, line, column, e.to_string())
    })
}

/// Load a document from disk, choosing the parser by extension
pub fn load_document(path: &Path) -> ServiceResult<Document> {
    let text = fs::read_to_string(path)?;
    let file = path.display().to_string();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parse_yaml(&text, &file),
        _ => parse_json(&text, &file),
    }
}

/// Resolve a file name against a base directory and then each search path
pub fn find_in_search_paths(
    name: &str,
    base_dir: Option<&Path>,
    search_paths: &[PathBuf],
) -> ServiceResult<PathBuf> {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return if candidate.exists() {
            Ok(candidate.to_path_buf())
        } else {
            Err(ServiceError::NotFound(candidate.to_path_buf()))
        };
    }

    base_dir
        .into_iter()
        .chain(search_paths.iter().map(PathBuf::as_path))
        .map(|dir| dir.join(candidate))
        .find(|path| path.exists())
        .ok_or_else(|| ServiceError::NotFound(candidate.to_path_buf()))
}

fn parse_error(file: &str, source: &str, line: usize, column: usize, message: String) -> ServiceError {
    let context = source_context(source, line, column);
    let message = if context.is_empty() {
        message
    } else {
        format!("{}\n{}", message, context)
    };
    ServiceError::ConfigParse {
        file: file.to_string(),
        line,
        column,
        message,
    }
}

/// serde_json appends " at line X column Y", which the error already carries
fn strip_location(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

fn source_context(source: &str, line: usize, column: usize) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let start = line.saturating_sub(CONTEXT_LINES + 1);
    let end = (line + CONTEXT_LINES).min(lines.len());

    let mut context = String::new();
    for (i, text) in lines.iter().enumerate().take(end).skip(start) {
        let line_num = i + 1;
        let prefix = if line_num == line { ">" } else { " " };
        context.push_str(&format!("{} {:4} | {}\n", prefix, line_num, text));

        if line_num == line && column > 0 {
            context.push_str(&format!("       | {}^\n", " ".repeat(column.saturating_sub(1))));
        }
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_strip_comment_lines() {
        let text = "{\n  // a comment\n  \"a\": 1\n}";
        let doc = parse_json(text, "t.json").unwrap();
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn test_comment_marker_inside_string_is_kept() {
        let text = r#"{"url": "http://example.org", "b": [1, 2,],}"#;
        let doc = parse_json(text, "t.json").unwrap();
        assert_eq!(doc, json!({"url": "http://example.org", "b": [1, 2]}));
    }

    #[test]
    fn test_trailing_comma_inside_string_untouched() {
        let doc = parse_json(r#"{"s": "a,}"}"#, "t.json").unwrap();
        assert_eq!(doc["s"], "a,}");
    }

    #[test]
    fn test_parse_error_location() {
        let text = "{\n  // comment\n  \"a\": oops,\n  \"b\": 1\n}";
        let err = parse_json(text, "bad.json").unwrap_err();
        match err {
            ServiceError::ConfigParse {
                file, line, message, ..
            } => {
                assert_eq!(file, "bad.json");
                assert_eq!(line, 3);
                assert!(message.contains(">    3 |"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_yaml_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.yaml");
        fs::write(&path, "a: 1\nb:\n  - x\n  - y\n").unwrap();

        let doc = load_document(&path).unwrap();
        assert_eq!(doc, json!({"a": 1, "b": ["x", "y"]}));
    }

    #[test]
    fn test_search_path_order() {
        let base = TempDir::new().unwrap();
        let extra = TempDir::new().unwrap();
        fs::write(extra.path().join("shared.json"), "{}").unwrap();

        let found =
            find_in_search_paths("shared.json", Some(base.path()), &[extra.path().to_path_buf()])
                .unwrap();
        assert_eq!(found, extra.path().join("shared.json"));

        fs::write(base.path().join("shared.json"), "{}").unwrap();
        let found =
            find_in_search_paths("shared.json", Some(base.path()), &[extra.path().to_path_buf()])
                .unwrap();
        assert_eq!(found, base.path().join("shared.json"));

        assert!(matches!(
            find_in_search_paths("missing.json", Some(base.path()), &[]),
            Err(ServiceError::NotFound(_))
        ));
    }
}
