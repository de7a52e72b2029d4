// Built-in Functions
// The fixed function set available to `%eval` and `%{...}` expressions

use crate::expression::evaluator::EvalError;
use crate::expression::value::{loose_eq, number, ValueExt};

use serde_json::Value;

/// Registry of built-in functions
#[derive(Debug, Default)]
pub struct BuiltinFunctions;

impl BuiltinFunctions {
    pub fn new() -> Self {
        Self
    }

    /// Call a built-in function; names are case-insensitive
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        match name.to_lowercase().as_str() {
            // Comparison
            "eq" => self.binary(&args, "eq", |a, b| Ok(Value::Bool(loose_eq(a, b)))),
            "ne" => self.binary(&args, "ne", |a, b| Ok(Value::Bool(!loose_eq(a, b)))),
            "lt" => self.compare(&args, "lt", |a, b| a < b),
            "le" => self.compare(&args, "le", |a, b| a <= b),
            "gt" => self.compare(&args, "gt", |a, b| a > b),
            "ge" => self.compare(&args, "ge", |a, b| a >= b),
            "in" => self.fn_in(&args).map(Value::Bool),
            "notin" => self.fn_in(&args).map(|found| Value::Bool(!found)),

            // Logical
            "and" => Ok(Value::Bool(args.iter().all(ValueExt::is_truthy))),
            "or" => Ok(Value::Bool(args.iter().any(ValueExt::is_truthy))),
            "not" => {
                self.require_args(&args, 1, "not")?;
                Ok(Value::Bool(!args[0].is_truthy()))
            }
            "xor" => self.binary(&args, "xor", |a, b| {
                Ok(Value::Bool(a.is_truthy() ^ b.is_truthy()))
            }),

            // Strings
            "contains" => self.fn_contains(&args),
            "startswith" => self.binary(&args, "startsWith", |a, b| {
                Ok(Value::Bool(a.as_string().starts_with(&b.as_string())))
            }),
            "endswith" => self.binary(&args, "endsWith", |a, b| {
                Ok(Value::Bool(a.as_string().ends_with(&b.as_string())))
            }),
            "format" => self.fn_format(&args),
            "join" => self.fn_join(&args),
            "replace" => {
                self.require_args(&args, 3, "replace")?;
                let (s, from, to) = (args[0].as_string(), args[1].as_string(), args[2].as_string());
                Ok(Value::String(s.replace(&from, &to)))
            }
            "split" => self.binary(&args, "split", |a, b| {
                let delimiter = b.as_string();
                Ok(Value::Array(
                    a.as_string()
                        .split(delimiter.as_str())
                        .map(|p| Value::String(p.to_string()))
                        .collect(),
                ))
            }),
            "lower" => self.unary(&args, "lower", |v| Ok(Value::String(v.as_string().to_lowercase()))),
            "upper" => self.unary(&args, "upper", |v| Ok(Value::String(v.as_string().to_uppercase()))),
            "trim" => self.unary(&args, "trim", |v| Ok(Value::String(v.as_string().trim().to_string()))),

            // Conversion
            "str" => self.unary(&args, "str", |v| Ok(Value::String(v.as_string()))),
            "num" => self.unary(&args, "num", |v| {
                v.coerce_f64()
                    .map(number)
                    .ok_or_else(|| EvalError::new(format!("cannot convert {} to a number", v)))
            }),
            "converttojson" => self.unary(&args, "convertToJson", |v| Ok(Value::String(v.to_string()))),
            "convertfromjson" => self.unary(&args, "convertFromJson", |v| {
                serde_json::from_str(&v.as_string())
                    .map_err(|e| EvalError::new(format!("convertFromJson: {}", e)))
            }),

            // Numbers
            "min" => self.fold_numbers(&args, "min", f64::min),
            "max" => self.fold_numbers(&args, "max", f64::max),
            "abs" => self.numeric(&args, "abs", f64::abs),
            "floor" => self.numeric(&args, "floor", f64::floor),
            "ceil" => self.numeric(&args, "ceil", f64::ceil),
            "round" => self.numeric(&args, "round", f64::round),
            "pow" => self.binary(&args, "pow", |a, b| {
                let (x, y) = as_numbers(a, b)?;
                Ok(number(x.powf(y)))
            }),

            // Utility
            "coalesce" => Ok(args
                .into_iter()
                .find(|arg| !matches!(arg, Value::Null) && arg.as_str() != Some(""))
                .unwrap_or(Value::Null)),
            "iif" => {
                self.require_args(&args, 3, "iif")?;
                let mut args = args;
                let otherwise = args.pop().unwrap_or(Value::Null);
                let then = args.pop().unwrap_or(Value::Null);
                Ok(if args[0].is_truthy() { then } else { otherwise })
            }
            "length" => self.unary(&args, "length", |v| match v {
                Value::String(s) => Ok(number(s.chars().count() as f64)),
                Value::Array(a) => Ok(number(a.len() as f64)),
                Value::Object(o) => Ok(number(o.len() as f64)),
                _ => Err(EvalError::new("length() requires string, array, or object")),
            }),
            "range" => self.fn_range(&args),

            _ => Err(EvalError::new(format!("unknown function: {}", name))),
        }
    }

    fn fn_in(&self, args: &[Value]) -> Result<bool, EvalError> {
        if args.len() < 2 {
            return Err(EvalError::new("in() requires at least 2 arguments"));
        }
        Ok(args[1..].iter().any(|candidate| loose_eq(&args[0], candidate)))
    }

    fn fn_contains(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.require_args(args, 2, "contains")?;

        match (&args[0], &args[1]) {
            (Value::String(haystack), needle) => {
                Ok(Value::Bool(haystack.contains(&needle.as_string())))
            }
            (Value::Array(items), needle) => {
                Ok(Value::Bool(items.iter().any(|item| loose_eq(item, needle))))
            }
            (Value::Object(map), key) => Ok(Value::Bool(map.contains_key(&key.as_string()))),
            _ => Err(EvalError::new("contains() requires string, array, or object")),
        }
    }

    /// format('{0}-{1}', a, b)
    fn fn_format(&self, args: &[Value]) -> Result<Value, EvalError> {
        let Some(template) = args.first() else {
            return Err(EvalError::new("format() requires at least 1 argument"));
        };

        let mut result = template.as_string();
        for (i, arg) in args.iter().skip(1).enumerate() {
            result = result.replace(&format!("{{{}}}", i), &arg.as_string());
        }
        Ok(Value::String(result))
    }

    fn fn_join(&self, args: &[Value]) -> Result<Value, EvalError> {
        self.require_args(args, 2, "join")?;

        match &args[0] {
            Value::Array(items) => {
                let strings: Vec<String> = items.iter().map(ValueExt::as_string).collect();
                Ok(Value::String(strings.join(&args[1].as_string())))
            }
            _ => Err(EvalError::new("join() requires array as first argument")),
        }
    }

    /// range(end) or range(start, end[, step]), integers only
    fn fn_range(&self, args: &[Value]) -> Result<Value, EvalError> {
        let ints: Vec<i64> = args
            .iter()
            .map(|v| {
                v.coerce_f64()
                    .filter(|n| n.fract() == 0.0)
                    .map(|n| n as i64)
                    .ok_or_else(|| EvalError::new("range() requires integer arguments"))
            })
            .collect::<Result<_, _>>()?;

        let (start, end, step) = match ints.as_slice() {
            [end] => (0, *end, 1),
            [start, end] => (*start, *end, 1),
            [start, end, step] if *step != 0 => (*start, *end, *step),
            _ => return Err(EvalError::new("range() requires 1 to 3 arguments and a non-zero step")),
        };

        let mut values = Vec::new();
        let mut i = start;
        while (step > 0 && i < end) || (step < 0 && i > end) {
            values.push(Value::from(i));
            i += step;
        }
        Ok(Value::Array(values))
    }

    fn unary<F>(&self, args: &[Value], name: &str, f: F) -> Result<Value, EvalError>
    where
        F: FnOnce(&Value) -> Result<Value, EvalError>,
    {
        self.require_args(args, 1, name)?;
        f(&args[0])
    }

    fn binary<F>(&self, args: &[Value], name: &str, f: F) -> Result<Value, EvalError>
    where
        F: FnOnce(&Value, &Value) -> Result<Value, EvalError>,
    {
        self.require_args(args, 2, name)?;
        f(&args[0], &args[1])
    }

    fn compare<F>(&self, args: &[Value], name: &str, op: F) -> Result<Value, EvalError>
    where
        F: FnOnce(f64, f64) -> bool,
    {
        self.binary(args, name, |a, b| {
            let (x, y) = as_numbers(a, b)?;
            Ok(Value::Bool(op(x, y)))
        })
    }

    fn numeric<F>(&self, args: &[Value], name: &str, op: F) -> Result<Value, EvalError>
    where
        F: FnOnce(f64) -> f64,
    {
        self.unary(args, name, |v| {
            v.coerce_f64()
                .map(|n| number(op(n)))
                .ok_or_else(|| EvalError::new(format!("{}() requires a number", name)))
        })
    }

    fn fold_numbers<F>(&self, args: &[Value], name: &str, op: F) -> Result<Value, EvalError>
    where
        F: Fn(f64, f64) -> f64,
    {
        // min([1, 2]) and min(1, 2) are equivalent
        let items = match args {
            [Value::Array(items)] => items.as_slice(),
            _ => args,
        };

        let mut numbers = items.iter().map(|v| {
            v.coerce_f64()
                .ok_or_else(|| EvalError::new(format!("{}() requires numbers", name)))
        });
        let first = numbers
            .next()
            .ok_or_else(|| EvalError::new(format!("{}() requires at least 1 argument", name)))??;
        numbers
            .try_fold(first, |acc, n| n.map(|n| op(acc, n)))
            .map(number)
    }

    fn require_args(&self, args: &[Value], count: usize, name: &str) -> Result<(), EvalError> {
        if args.len() != count {
            return Err(EvalError::new(format!(
                "{}() requires {} argument(s), got {}",
                name,
                count,
                args.len()
            )));
        }
        Ok(())
    }
}

fn as_numbers(a: &Value, b: &Value) -> Result<(f64, f64), EvalError> {
    let x = a
        .coerce_f64()
        .ok_or_else(|| EvalError::new("first argument is not a number"))?;
    let y = b
        .coerce_f64()
        .ok_or_else(|| EvalError::new("second argument is not a number"))?;
    Ok((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::evaluator::Evaluator;
    use crate::expression::parser::ExprParser;
    use serde_json::json;

    fn eval(expr: &str) -> Value {
        let doc = json!({"solver": "z3", "threads": 4, "seeds": [3, 1, 2]});
        let ast = ExprParser::parse_str(expr).unwrap();
        Evaluator::new(&doc).eval(&ast).unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("eq(solver, 'z3')"), json!(true));
        assert_eq!(eval("ne(threads, '4')"), json!(false));
        assert_eq!(eval("lt(1, 2)"), json!(true));
        assert_eq!(eval("ge(threads, 5)"), json!(false));
        assert_eq!(eval("in(solver, 'cvc5', 'z3')"), json!(true));
        assert_eq!(eval("notin(threads, 1, 2)"), json!(true));
    }

    #[test]
    fn test_logical() {
        assert_eq!(eval("and(true, 1, 'x')"), json!(true));
        assert_eq!(eval("or(false, 0)"), json!(false));
        assert_eq!(eval("xor(true, true)"), json!(false));
        assert_eq!(eval("not('')"), json!(true));
    }

    #[test]
    fn test_strings() {
        assert_eq!(eval("contains(solver, 'z')"), json!(true));
        assert_eq!(eval("contains(seeds, 2)"), json!(true));
        assert_eq!(eval("format('{0}-{1}', solver, threads)"), json!("z3-4"));
        assert_eq!(eval("join(seeds, ',')"), json!("3,1,2"));
        assert_eq!(eval("split('a:b', ':')"), json!(["a", "b"]));
        assert_eq!(eval("upper(replace(solver, '3', 'x'))"), json!("ZX"));
        assert_eq!(eval("startsWith('run-1', 'run')"), json!(true));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(eval("max(seeds)"), json!(3));
        assert_eq!(eval("min(threads, 2.5)"), json!(2.5));
        assert_eq!(eval("pow(2, 10)"), json!(1024));
        assert_eq!(eval("floor(7 / 2)"), json!(3));
        assert_eq!(eval("num('12')"), json!(12));
        assert_eq!(eval("range(3)"), json!([0, 1, 2]));
        assert_eq!(eval("range(10, 0, -4)"), json!([10, 6, 2]));
    }

    #[test]
    fn test_utility() {
        assert_eq!(eval("coalesce(null, '', 'x')"), json!("x"));
        assert_eq!(eval("iif(gt(threads, 2), 'many', 'few')"), json!("many"));
        assert_eq!(eval("length(seeds)"), json!(3));
        assert_eq!(eval("convertFromJson('{\"a\": [1]}')"), json!({"a": [1]}));
    }

    #[test]
    fn test_errors() {
        let functions = BuiltinFunctions::new();
        assert!(functions.call("eq", vec![json!(1)]).is_err());
        assert!(functions.call("nope", vec![]).is_err());
        assert!(functions.call("range", vec![json!(1), json!(2), json!(0)]).is_err());
    }
}
