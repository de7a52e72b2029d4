// Unit Descriptors
// Parses `Name(args)`, `Name{kwargs}` and `{name, parameters}` into typed descriptors

use crate::document::Document;
use crate::error::{ServiceError, ServiceResult};
use crate::expression::{Expr, ExprParser};

use serde_json::{Map, Value};
use std::fmt;

/// Constructor arguments of a unit
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UnitParams {
    #[default]
    None,
    Positional(Vec<Document>),
    Keyword(Map<String, Document>),
}

impl UnitParams {
    /// Argument by position or by keyword
    pub fn get(&self, index: usize, name: &str) -> Option<&Document> {
        match self {
            UnitParams::None => None,
            UnitParams::Positional(values) => values.get(index),
            UnitParams::Keyword(map) => map.get(name),
        }
    }

    /// Reject arguments a unit does not accept
    pub fn check(&self, unit: &str, accepted: &[&str]) -> ServiceResult<()> {
        match self {
            UnitParams::None => Ok(()),
            UnitParams::Positional(values) if values.len() > accepted.len() => Err(ServiceError::unit_load(
                unit,
                format!("takes at most {} argument(s), got {}", accepted.len(), values.len()),
            )),
            UnitParams::Positional(_) => Ok(()),
            UnitParams::Keyword(map) => match map.keys().find(|k| !accepted.contains(&k.as_str())) {
                Some(key) => Err(ServiceError::unit_load(unit, format!("unexpected argument '{}'", key))),
                None => Ok(()),
            },
        }
    }

    pub fn string(&self, unit: &str, index: usize, name: &str) -> ServiceResult<Option<String>> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ServiceError::unit_load(
                unit,
                format!("argument '{}' must be a string, got {}", name, other),
            )),
        }
    }

    pub fn required_string(&self, unit: &str, index: usize, name: &str) -> ServiceResult<String> {
        self.string(unit, index, name)?
            .ok_or_else(|| ServiceError::unit_load(unit, format!("missing argument '{}'", name)))
    }

    pub fn bool(&self, unit: &str, index: usize, name: &str, default: bool) -> ServiceResult<bool> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(ServiceError::unit_load(
                unit,
                format!("argument '{}' must be a boolean, got {}", name, other),
            )),
        }
    }
}

/// A parsed entry of a `tools` list
#[derive(Debug, Clone, PartialEq)]
pub struct UnitDescriptor {
    pub identifier: String,
    pub params: UnitParams,
}

impl UnitDescriptor {
    pub fn new(identifier: impl Into<String>, params: UnitParams) -> Self {
        Self {
            identifier: identifier.into(),
            params,
        }
    }

    /// Parse the string form: `Name`, `Name()`, `Name(arg, ...)` or `Name{key: value, ...}`.
    ///
    /// Arguments must be literals; nothing is evaluated.
    pub fn parse(text: &str) -> ServiceResult<Self> {
        let text = text.trim();
        let Some(open) = text.find(|c: char| c == '(' || c == '{') else {
            return Self::from_identifier(text, UnitParams::None);
        };

        let identifier = &text[..open];
        let opener = text[open..].chars().next().unwrap_or('(');
        let closer = if opener == '(' { ')' } else { '}' };
        if !text.ends_with(closer) || text.len() < open + 2 {
            return Err(ServiceError::unit_load(
                text,
                format!("expected closing '{}'", closer),
            ));
        }
        let inner = &text[open + 1..text.len() - 1];

        let params = if opener == '(' {
            positional(text, inner)?
        } else {
            keyword(text, inner)?
        };
        Self::from_identifier(identifier, params)
    }

    /// Parse a `tools` entry: a descriptor string or `{"name": ..., "parameters": ...}`
    pub fn from_document(value: &Document) -> ServiceResult<Self> {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Object(map) => {
                let identifier = map.get("name").and_then(Value::as_str).ok_or_else(|| {
                    ServiceError::unit_load(value.to_string(), "structured unit needs a string 'name'")
                })?;
                let params = match map.get("parameters") {
                    None | Some(Value::Null) => UnitParams::None,
                    Some(Value::Array(values)) => UnitParams::Positional(values.clone()),
                    Some(Value::Object(kwargs)) => UnitParams::Keyword(kwargs.clone()),
                    Some(other) => {
                        return Err(ServiceError::unit_load(
                            identifier,
                            format!("'parameters' must be a sequence or mapping, got {}", other),
                        ))
                    }
                };
                Self::from_identifier(identifier, params)
            }
            other => Err(ServiceError::unit_load(
                other.to_string(),
                "unit descriptor must be a string or mapping",
            )),
        }
    }

    fn from_identifier(identifier: &str, params: UnitParams) -> ServiceResult<Self> {
        let identifier = identifier.trim();
        let valid = !identifier.is_empty()
            && identifier
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
        if !valid {
            return Err(ServiceError::unit_load(identifier, "invalid unit identifier"));
        }
        Ok(Self::new(identifier, params))
    }
}

impl fmt::Display for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            UnitParams::None => write!(f, "{}", self.identifier),
            UnitParams::Positional(values) => {
                let args: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "{}({})", self.identifier, args.join(", "))
            }
            UnitParams::Keyword(map) => write!(f, "{}{}", self.identifier, Value::Object(map.clone())),
        }
    }
}

fn positional(text: &str, inner: &str) -> ServiceResult<UnitParams> {
    if inner.trim().is_empty() {
        return Ok(UnitParams::None);
    }

    let args = ExprParser::parse_arguments(inner)
        .map_err(|e| ServiceError::unit_load(text, format!("malformed arguments: {}", e)))?;
    args.iter()
        .map(|arg| literal(text, arg))
        .collect::<ServiceResult<Vec<_>>>()
        .map(UnitParams::Positional)
}

fn keyword(text: &str, inner: &str) -> ServiceResult<UnitParams> {
    let expr = ExprParser::parse_str(&format!("{{{}}}", inner))
        .map_err(|e| ServiceError::unit_load(text, format!("malformed keyword arguments: {}", e)))?;
    match literal(text, &expr)? {
        Value::Object(map) => Ok(UnitParams::Keyword(map)),
        _ => Err(ServiceError::unit_load(text, "keyword arguments must form a mapping")),
    }
}

fn literal(text: &str, expr: &Expr) -> ServiceResult<Document> {
    expr.literal_value()
        .ok_or_else(|| ServiceError::unit_load(text, "arguments must be literal values"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_identifier() {
        let d = UnitDescriptor::parse("exrun.units.ExplodeAndRun").unwrap();
        assert_eq!(d.identifier, "exrun.units.ExplodeAndRun");
        assert_eq!(d.params, UnitParams::None);

        let d = UnitDescriptor::parse("PrintCurrentJson()  ").unwrap();
        assert_eq!(d.params, UnitParams::None);
    }

    #[test]
    fn test_positional_arguments() {
        let d = UnitDescriptor::parse("RunShell('sleep 1', \"/times\", None)").unwrap();
        assert_eq!(d.identifier, "RunShell");
        assert_eq!(
            d.params,
            UnitParams::Positional(vec![json!("sleep 1"), json!("/times"), Value::Null])
        );
    }

    #[test]
    fn test_keyword_arguments() {
        let d = UnitDescriptor::parse("MakeAndCdTempDir{'prefix': 'run-', 'hasRandomPart': False}").unwrap();
        let UnitParams::Keyword(map) = &d.params else {
            panic!("expected keyword params");
        };
        assert_eq!(map.get("prefix"), Some(&json!("run-")));
        assert_eq!(map.get("hasRandomPart"), Some(&json!(false)));
    }

    #[test]
    fn test_nested_literals() {
        let d = UnitDescriptor::parse("Custom([1, -2, {'k': 'v'}])").unwrap();
        assert_eq!(d.params, UnitParams::Positional(vec![json!([1, -2, {"k": "v"}])]));
    }

    #[test]
    fn test_non_literal_arguments_rejected() {
        assert!(matches!(
            UnitDescriptor::parse("RunShell(threads * 2)"),
            Err(ServiceError::UnitLoad { .. })
        ));
        assert!(UnitDescriptor::parse("RunShell(open('x'))").is_err());
    }

    #[test]
    fn test_malformed_descriptors() {
        assert!(UnitDescriptor::parse("RunShell('x'").is_err());
        assert!(UnitDescriptor::parse("RunShell{'a': 1)").is_err());
        assert!(UnitDescriptor::parse("Run Shell").is_err());
        assert!(UnitDescriptor::parse("").is_err());
    }

    #[test]
    fn test_structured_form() {
        let d = UnitDescriptor::from_document(&json!({
            "name": "RunShell",
            "parameters": {"command": "true", "requireSuccess": true}
        }))
        .unwrap();
        assert_eq!(d.identifier, "RunShell");
        assert!(d.params.bool("RunShell", 4, "requireSuccess", false).unwrap());

        assert!(UnitDescriptor::from_document(&json!({"name": "X", "parameters": 3})).is_err());
        assert!(UnitDescriptor::from_document(&json!(7)).is_err());
    }

    #[test]
    fn test_params_check() {
        let params = UnitParams::Positional(vec![json!("a"), json!("b")]);
        assert!(params.check("Unit", &["one", "two"]).is_ok());
        assert!(params.check("Unit", &["one"]).is_err());

        let params = UnitParams::Keyword(Map::from_iter([("bogus".to_string(), json!(1))]));
        assert!(params.check("Unit", &["one"]).is_err());
    }
}
