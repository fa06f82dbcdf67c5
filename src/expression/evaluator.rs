use std::cmp::Ordering;

use chrono::SecondsFormat;
use regex::Regex;
use serde_json::{Number, Value};

use super::ast::{BinaryOperator, Expr, Function};
use super::{EngineError, EngineResult, Scope};

pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> EngineResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(name) => Ok(scope.field(name)),
        Expr::Last(name) => Ok(scope.previous_field(name)),
        Expr::Now => Ok(Value::String(
            scope.now.to_rfc3339_opts(SecondsFormat::Millis, true),
        )),
        Expr::Today => Ok(Value::String(scope.today.format("%Y-%m-%d").to_string())),
        Expr::Not(inner) => {
            let value = evaluate(inner, scope)?;
            Ok(Value::Bool(!as_bool(".NOT.", &value)?))
        }
        Expr::Negate(inner) => {
            let value = evaluate(inner, scope)?;
            arithmetic(BinaryOperator::Subtract, &Value::from(0), &value)
        }
        Expr::Binary { op, left, right } => evaluate_binary(*op, left, right, scope),
        Expr::Call { function, args } => evaluate_call(*function, args, scope),
    }
}

fn evaluate_binary(
    op: BinaryOperator,
    left: &Expr,
    right: &Expr,
    scope: &Scope<'_>,
) -> EngineResult<Value> {
    let left = evaluate(left, scope)?;

    // short-circuit
    match op {
        BinaryOperator::And if !as_bool(".AND.", &left)? => return Ok(Value::Bool(false)),
        BinaryOperator::Or if as_bool(".OR.", &left)? => return Ok(Value::Bool(true)),
        _ => {}
    }

    let right = evaluate(right, scope)?;
    match op {
        BinaryOperator::And | BinaryOperator::Or => {
            Ok(Value::Bool(as_bool(&op.to_string(), &right)?))
        }
        BinaryOperator::Equal => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOperator::LessThan
        | BinaryOperator::LessThanEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanEqual => {
            let ordering = compare(op, &left, &right)?;
            Ok(Value::Bool(match op {
                BinaryOperator::LessThan => ordering == Ordering::Less,
                BinaryOperator::LessThanEqual => ordering != Ordering::Greater,
                BinaryOperator::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOperator::Contains => contains(&left, &right).map(Value::Bool),
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide => arithmetic(op, &left, &right),
    }
}

fn evaluate_call(function: Function, args: &[Expr], scope: &Scope<'_>) -> EngineResult<Value> {
    let arg = |index: usize| -> EngineResult<Value> {
        let expr = args.get(index).ok_or_else(|| {
            EngineError::Evaluation(format!("{} is missing argument {}", function, index + 1))
        })?;
        evaluate(expr, scope)
    };

    match function {
        Function::Iif => {
            // only the chosen branch is evaluated
            if as_bool("IIF", &arg(0)?)? {
                arg(1)
            } else {
                arg(2)
            }
        }
        Function::Length => match arg(0)? {
            Value::Null => Ok(Value::from(0)),
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(items) => Ok(Value::from(items.len())),
            other => Err(unsupported("LENGTH", &other)),
        },
        Function::Match => match (arg(0)?, arg(1)?) {
            (Value::Null, _) => Ok(Value::Bool(false)),
            (Value::String(subject), Value::String(pattern)) => {
                let regex = Regex::new(&pattern).map_err(|e| {
                    EngineError::Evaluation(format!("invalid pattern {:?}: {}", pattern, e))
                })?;
                Ok(Value::Bool(regex.is_match(&subject)))
            }
            (subject, Value::String(_)) => Err(unsupported("MATCH", &subject)),
            (_, pattern) => Err(unsupported("MATCH", &pattern)),
        },
        Function::Upper => map_string("UPPER", arg(0)?, |s| s.to_uppercase()),
        Function::Lower => map_string("LOWER", arg(0)?, |s| s.to_lowercase()),
    }
}

fn map_string(name: &str, value: Value, f: impl Fn(&str) -> String) -> EngineResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(f(&s))),
        other => Err(unsupported(name, &other)),
    }
}

fn as_bool(context: &str, value: &Value) -> EngineResult<bool> {
    value.as_bool().ok_or_else(|| {
        EngineError::Evaluation(format!(
            "{} expects a boolean, got {}",
            context,
            type_name(value)
        ))
    })
}

/// Numbers compare by value, so `1 = 1.0`.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(op: BinaryOperator, left: &Value, right: &Value) -> EngineResult<Ordering> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b))
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| mismatch(op, left, right))
}

fn contains(haystack: &Value, needle: &Value) -> EngineResult<bool> {
    match (haystack, needle) {
        (Value::Null, _) => Ok(false),
        (Value::Array(items), needle) => Ok(items.iter().any(|item| values_equal(item, needle))),
        (Value::String(s), Value::String(part)) => Ok(s.contains(part.as_str())),
        _ => Err(mismatch(BinaryOperator::Contains, haystack, needle)),
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> EngineResult<Value> {
    let (a, b) = match (left, right) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        (Value::String(a), Value::String(b)) if op == BinaryOperator::Add => {
            return Ok(Value::String(format!("{}{}", a, b)));
        }
        _ => return Err(mismatch(op, left, right)),
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOperator::Add => x.checked_add(y),
            BinaryOperator::Subtract => x.checked_sub(y),
            BinaryOperator::Multiply => x.checked_mul(y),
            BinaryOperator::Divide if x.checked_rem(y) == Some(0) => x.checked_div(y),
            _ => None,
        };
        if let Some(result) = exact {
            return Ok(Value::from(result));
        }
    }

    let (x, y) = float_pair(a, b);
    let result = match op {
        BinaryOperator::Add => x + y,
        BinaryOperator::Subtract => x - y,
        BinaryOperator::Multiply => x * y,
        BinaryOperator::Divide if y == 0.0 => {
            return Err(EngineError::Evaluation("division by zero".to_string()));
        }
        BinaryOperator::Divide => x / y,
        _ => return Err(mismatch(op, left, right)),
    };
    Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| EngineError::Evaluation(format!("{} produced a non-finite number", op)))
}

fn float_pair(a: &Number, b: &Number) -> (f64, f64) {
    (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN))
}

fn mismatch(op: BinaryOperator, left: &Value, right: &Value) -> EngineError {
    EngineError::Evaluation(format!(
        "cannot apply {} to {} and {}",
        op,
        type_name(left),
        type_name(right)
    ))
}

fn unsupported(name: &str, value: &Value) -> EngineError {
    EngineError::Evaluation(format!("{} does not accept {}", name, type_name(value)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "empty",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::expression::parser::parse;

    fn eval_with(source: &str, current: Value, previous: Value) -> EngineResult<Value> {
        let locals = BTreeMap::new();
        let scope = Scope {
            current: &current,
            previous: &previous,
            locals: &locals,
            now: Utc
                .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
                .unwrap()
                .fixed_offset(),
            today: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
        };
        evaluate(&parse(source)?, &scope)
    }

    fn eval(source: &str, current: Value) -> EngineResult<Value> {
        eval_with(source, current, Value::Null)
    }

    #[test]
    fn test_comparisons() {
        let data = json!({"ListPrice": 100, "MlsStatus": "Active"});
        assert_eq!(eval("ListPrice > 0", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("ListPrice <= 99.5", data.clone()).unwrap(), json!(false));
        assert_eq!(eval("ListPrice = 100.0", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("MlsStatus != \"Closed\"", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("MlsStatus < \"B\"", data).unwrap(), json!(true));
    }

    #[test]
    fn test_missing_fields_are_empty() {
        assert_eq!(eval("Missing = .EMPTY.", json!({})).unwrap(), json!(true));
        assert_eq!(eval("LAST Missing = .EMPTY.", json!({})).unwrap(), json!(true));
        assert!(matches!(
            eval("Missing > 0", json!({})),
            Err(EngineError::Evaluation(_))
        ));
    }

    #[test]
    fn test_last_reads_previous_record() {
        let current = json!({"ListPrice": 200});
        let previous = json!({"ListPrice": 150});
        assert_eq!(
            eval_with(
                "IIF(ListPrice != LAST ListPrice, LAST ListPrice, 0)",
                current,
                previous
            )
            .unwrap(),
            json!(150)
        );
    }

    #[test]
    fn test_boolean_operators() {
        let data = json!({"A": true, "B": false});
        assert_eq!(eval("A .AND. .NOT. B", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("B .OR. B", data.clone()).unwrap(), json!(false));
        // right side is never evaluated
        assert_eq!(eval("B .AND. (1 / 0 = 1)", data.clone()).unwrap(), json!(false));
        assert!(matches!(
            eval("A .AND. 1", data),
            Err(EngineError::Evaluation(_))
        ));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("1 + 2 * 3", json!({})).unwrap(), json!(7));
        assert_eq!(eval("7 / 2", json!({})).unwrap(), json!(3.5));
        assert_eq!(eval("6 / 2", json!({})).unwrap(), json!(3));
        assert_eq!(eval("-(2 - 5)", json!({})).unwrap(), json!(3));
        assert_eq!(eval("\"a\" + \"b\"", json!({})).unwrap(), json!("ab"));

        let Err(EngineError::Evaluation(message)) = eval("1 / 0", json!({})) else {
            panic!("expected an evaluation error");
        };
        assert_eq!(message, "division by zero");
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        let data = json!({"A": i64::MIN});
        assert_eq!(eval("A / -1", data.clone()).unwrap(), json!(9223372036854775808.0));
        assert_eq!(eval("-A", data.clone()).unwrap(), json!(9223372036854775808.0));
        assert_eq!(eval("A / 2", data).unwrap(), json!(i64::MIN / 2));
    }

    #[test]
    fn test_functions() {
        let data = json!({
            "Cooling": ["Central Air", "Ceiling Fan(s)"],
            "PublicRemarks": "Call 555-1234 today",
            "City": "Springfield",
        });
        assert_eq!(eval("LENGTH(Cooling)", data.clone()).unwrap(), json!(2));
        assert_eq!(eval("LENGTH(Nothing)", data.clone()).unwrap(), json!(0));
        assert_eq!(eval("LENGTH(City)", data.clone()).unwrap(), json!(11));
        assert_eq!(
            eval("Cooling .CONTAINS. \"Central Air\"", data.clone()).unwrap(),
            json!(true)
        );
        assert_eq!(
            eval(r#"MATCH(PublicRemarks, "\\d{3}-\\d{4}")"#, data.clone()).unwrap(),
            json!(true)
        );
        assert_eq!(eval("UPPER(City)", data.clone()).unwrap(), json!("SPRINGFIELD"));
        assert_eq!(eval("lower(City)", data.clone()).unwrap(), json!("springfield"));
        assert!(matches!(
            eval(r#"MATCH(City, "(")"#, data),
            Err(EngineError::Evaluation(_))
        ));
    }

    #[test]
    fn test_clock_readings() {
        assert_eq!(
            eval(".NOW.", json!({})).unwrap(),
            json!("2024-05-06T07:08:09.000Z")
        );
        assert_eq!(eval(".TODAY.", json!({})).unwrap(), json!("2024-05-06"));
    }

    #[test]
    fn test_locals_shadow_record_fields() {
        let current = json!({"Status": "Active"});
        let mut locals = BTreeMap::new();
        locals.insert("Status".to_string(), json!("Pending"));
        let scope = Scope {
            current: &current,
            previous: &Value::Null,
            locals: &locals,
            now: Utc::now().fixed_offset(),
            today: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        };
        assert_eq!(
            evaluate(&parse("Status").unwrap(), &scope).unwrap(),
            json!("Pending")
        );
    }
}
