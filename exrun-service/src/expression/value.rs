// Expression Values
// Truthiness, coercion and number helpers over document values

use serde_json::{Number, Value};

/// Build a JSON number, keeping integral values as integers
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9.0e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Loose conversions used by operators and built-in functions
pub trait ValueExt {
    fn is_truthy(&self) -> bool;
    fn coerce_f64(&self) -> Option<f64>;
    /// Render a value for string interpolation: strings are not quoted
    fn as_string(&self) -> String;
}

impl ValueExt for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    fn coerce_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn as_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Equality used by `==` and the comparison functions.
///
/// Strings compare case-sensitively; a number equals a string that parses to it.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(_), Value::String(s)) | (Value::String(s), Value::Number(_)) => {
            let n = if a.is_number() { a } else { b };
            s.trim().parse::<f64>().ok() == n.as_f64()
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| loose_eq(l, r))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_keeps_integers() {
        assert_eq!(number(4.0), json!(4));
        assert_eq!(number(2.5), json!(2.5));
        assert_eq!(number(f64::NAN), Value::Null);
    }

    #[test]
    fn test_truthiness() {
        assert!(json!(1).is_truthy());
        assert!(!json!(0).is_truthy());
        assert!(!json!("").is_truthy());
        assert!(json!({"a": 1}).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_coerce_f64() {
        let n: Option<f64> = json!(3).coerce_f64();
        assert_eq!(n, Some(3.0));
        assert_eq!(json!(" 2.5 ").coerce_f64(), Some(2.5));
        assert_eq!(json!(true).coerce_f64(), Some(1.0));
        assert_eq!(json!([1]).coerce_f64(), None);
    }

    #[test]
    fn test_as_string() {
        assert_eq!(json!("x").as_string(), "x");
        assert_eq!(json!(3).as_string(), "3");
        assert_eq!(json!(0.5).as_string(), "0.5");
        assert_eq!(json!([1, "a"]).as_string(), "[1,\"a\"]");
        assert_eq!(Value::Null.as_string(), "");
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!(2), &json!(2.0)));
        assert!(loose_eq(&json!("2"), &json!(2)));
        assert!(!loose_eq(&json!("Z3"), &json!("z3")));
        assert!(loose_eq(&json!([1, "a"]), &json!([1.0, "a"])));
    }
}
