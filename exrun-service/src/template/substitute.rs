// Evaluation Pass
// Resolves `%eval` directives and inline `${/pointer}` / `%{expr}` substitutions

use crate::document::{access, names, Document};
use crate::error::{ServiceError, ServiceResult};
use crate::expression::{split_segments, ExpressionEvaluator, Segment, ValueExt};

use serde_json::Value;

/// Upper bound on substitution passes over one string
pub const MAX_SUBSTITUTIONS: usize = 100;

/// Replace every `%eval` node and inline substitution in a document.
///
/// Sites are evaluated in document order against the partly evaluated
/// document, so a site may read another site's result. A site that reads a
/// value still carrying `%eval` is retried on the next pass; a pass that
/// makes no progress fails with the last error seen. The top-level `tools`
/// list is left alone: units substitute their own arguments against the live
/// document when they run.
pub fn evaluate(document: &Document, evaluator: Option<&dyn ExpressionEvaluator>) -> ServiceResult<Document> {
    let mut current = document.clone();
    let mut pending = Vec::new();
    collect_sites(&current, String::new(), &mut pending);

    while !pending.is_empty() {
        let before = pending.len();
        let mut deferred = Vec::new();
        let mut last_error = None;

        for pointer in pending {
            let Some(site) = current.pointer(&pointer).cloned() else {
                continue;
            };
            match evaluate_site(&site, &current, evaluator) {
                Ok(value) if !contains_eval(&value) => {
                    if let Some(slot) = current.pointer_mut(&pointer) {
                        *slot = value;
                    }
                }
                Ok(_) => deferred.push(pointer),
                Err(e) => {
                    last_error = Some(e);
                    deferred.push(pointer);
                }
            }
        }

        if deferred.len() == before {
            return Err(last_error.unwrap_or_else(|| {
                ServiceError::Expression(format!(
                    "'{}' directives at {} refer to each other",
                    names::EVAL,
                    deferred.join(", ")
                ))
            }));
        }
        pending = deferred;
    }

    Ok(current)
}

/// Collect pointers to every `%eval` node and every string holding a substitution
fn collect_sites(node: &Document, pointer: String, sites: &mut Vec<String>) {
    match node {
        Value::Object(map) if map.contains_key(names::EVAL) => sites.push(pointer),
        Value::Object(map) => {
            for (key, value) in map {
                if pointer.is_empty() && key == names::TOOLS {
                    continue;
                }
                let escaped = key.replace('~', "~0").replace('/', "~1");
                collect_sites(value, format!("{}/{}", pointer, escaped), sites);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_sites(item, format!("{}/{}", pointer, index), sites);
            }
        }
        Value::String(text) => {
            if split_segments(text).iter().any(|s| !matches!(s, Segment::Text(_))) {
                sites.push(pointer);
            }
        }
        _ => {}
    }
}

fn evaluate_site(
    site: &Document,
    document: &Document,
    evaluator: Option<&dyn ExpressionEvaluator>,
) -> ServiceResult<Document> {
    match site {
        Value::Object(map) => {
            let expression = map.get(names::EVAL).and_then(Value::as_str).ok_or_else(|| {
                ServiceError::ConfigShape(format!("'{}' expects an expression string", names::EVAL))
            })?;
            evaluate_expression(expression, document, evaluator)
        }
        Value::String(text) => substitute_text(text, document, evaluator).map(Value::String),
        other => Ok(other.clone()),
    }
}

fn contains_eval(value: &Document) -> bool {
    match value {
        Value::Object(map) => map.contains_key(names::EVAL) || map.values().any(contains_eval),
        Value::Array(items) => items.iter().any(contains_eval),
        _ => false,
    }
}

fn resolved(value: Document, source: &str) -> ServiceResult<Document> {
    if contains_eval(&value) {
        return Err(ServiceError::Expression(format!(
            "'{}' refers to a value that is not evaluated yet",
            source
        )));
    }
    Ok(value)
}

/// Evaluate one expression, failing when no evaluator is installed
pub fn evaluate_expression(
    expression: &str,
    document: &Document,
    evaluator: Option<&dyn ExpressionEvaluator>,
) -> ServiceResult<Document> {
    let evaluator = evaluator.ok_or_else(|| {
        ServiceError::Expression(format!(
            "expression evaluation is not enabled (while evaluating '{}')",
            expression
        ))
    })?;

    evaluator
        .evaluate(expression, document)
        .map_err(|e| ServiceError::Expression(e.to_string()))
}

/// Substitute `${/pointer}` and `%{expr}` in a string until none remain
pub fn substitute_text(
    text: &str,
    document: &Document,
    evaluator: Option<&dyn ExpressionEvaluator>,
) -> ServiceResult<String> {
    let mut current = text.to_string();

    for _ in 0..MAX_SUBSTITUTIONS {
        let segments = split_segments(&current);
        if segments.iter().all(|s| matches!(s, Segment::Text(_))) {
            return Ok(current);
        }

        let mut next = String::with_capacity(current.len());
        for segment in segments {
            match segment {
                Segment::Text(t) => next.push_str(&t),
                Segment::Pointer(pointer) => {
                    let value = resolved(access(document, &pointer)?.clone(), &pointer)?;
                    next.push_str(&value.as_string())
                }
                Segment::Expression(expression) => {
                    let value = evaluate_expression(&expression, document, evaluator)?;
                    next.push_str(&resolved(value, &expression)?.as_string())
                }
            }
        }
        current = next;
    }

    Err(ServiceError::Expression(format!(
        "substitution in '{}' did not finish after {} passes",
        text, MAX_SUBSTITUTIONS
    )))
}
