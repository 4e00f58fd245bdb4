use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use regex::Regex;
use serde_json::Value as JsonValue;

use super::ast::{BinaryOp, Expr, Function, UnaryOp};
use super::EvalError;

/// Read-only view of the variables an expression is evaluated against.
pub trait Bindings {
    fn lookup(&self, name: &str) -> Option<JsonValue>;
}

impl Bindings for BTreeMap<String, JsonValue> {
    fn lookup(&self, name: &str) -> Option<JsonValue> {
        self.get(name).cloned()
    }
}

impl Bindings for HashMap<String, JsonValue> {
    fn lookup(&self, name: &str) -> Option<JsonValue> {
        self.get(name).cloned()
    }
}

impl Bindings for serde_json::Map<String, JsonValue> {
    fn lookup(&self, name: &str) -> Option<JsonValue> {
        self.get(name).cloned()
    }
}

/// A single `name -> value` binding.
pub struct Binding<'a> {
    pub name: &'a str,
    pub value: &'a JsonValue,
}

impl Bindings for Binding<'_> {
    fn lookup(&self, name: &str) -> Option<JsonValue> {
        (name == self.name).then(|| self.value.clone())
    }
}

pub(crate) fn eval(expr: &Expr, vars: &dyn Bindings) -> Result<JsonValue, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        // Declared but unset variables read as null.
        Expr::Var(name) => Ok(vars.lookup(name).unwrap_or(JsonValue::Null)),
        Expr::Member(base, field) => match eval(base, vars)? {
            JsonValue::Null => Ok(JsonValue::Null),
            JsonValue::Object(map) => Ok(map.get(field).cloned().unwrap_or(JsonValue::Null)),
            other => Err(EvalError::TypeMismatch(format!(
                "cannot read field '{field}' of {}",
                type_name(&other)
            ))),
        },
        Expr::Index(base, idx) => {
            let base = eval(base, vars)?;
            let idx = eval(idx, vars)?;
            index_value(&base, &idx)
        }
        Expr::Unary(op, e) => {
            let v = eval(e, vars)?;
            match op {
                UnaryOp::Not => Ok(JsonValue::Bool(!as_bool(&v, "!")?)),
                UnaryOp::Neg => match &v {
                    JsonValue::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            Ok(JsonValue::from(-i))
                        } else {
                            float_value(-n.as_f64().unwrap_or(0.0))
                        }
                    }
                    other => Err(EvalError::TypeMismatch(format!(
                        "cannot negate {}",
                        type_name(other)
                    ))),
                },
            }
        }
        Expr::Binary(BinaryOp::And, l, r) => {
            if !as_bool(&eval(l, vars)?, "&&")? {
                return Ok(JsonValue::Bool(false));
            }
            Ok(JsonValue::Bool(as_bool(&eval(r, vars)?, "&&")?))
        }
        Expr::Binary(BinaryOp::Or, l, r) => {
            if as_bool(&eval(l, vars)?, "||")? {
                return Ok(JsonValue::Bool(true));
            }
            Ok(JsonValue::Bool(as_bool(&eval(r, vars)?, "||")?))
        }
        Expr::Binary(op, l, r) => {
            let lhs = eval(l, vars)?;
            let rhs = eval(r, vars)?;
            binary(*op, &lhs, &rhs)
        }
        Expr::Call(func, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, vars))
                .collect::<Result<Vec<_>, _>>()?;
            call(*func, &values)
        }
    }
}

fn binary(op: BinaryOp, lhs: &JsonValue, rhs: &JsonValue) -> Result<JsonValue, EvalError> {
    match op {
        BinaryOp::Eq => Ok(JsonValue::Bool(json_eq(lhs, rhs))),
        BinaryOp::Ne => Ok(JsonValue::Bool(!json_eq(lhs, rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = json_cmp(lhs, rhs).ok_or_else(|| {
                EvalError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    type_name(lhs),
                    type_name(rhs)
                ))
            })?;
            Ok(JsonValue::Bool(match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            }))
        }
        BinaryOp::Add if lhs.is_string() || rhs.is_string() => {
            Ok(JsonValue::String(format!("{}{}", display(lhs), display(rhs))))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, lhs, rhs)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators handled by eval"),
    }
}

fn arithmetic(op: BinaryOp, lhs: &JsonValue, rhs: &JsonValue) -> Result<JsonValue, EvalError> {
    let (JsonValue::Number(a), JsonValue::Number(b)) = (lhs, rhs) else {
        return Err(EvalError::TypeMismatch(format!(
            "arithmetic on {} and {}",
            type_name(lhs),
            type_name(rhs)
        )));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let out = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => {
                if y == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                x.checked_div(y)
            }
            _ => {
                if y == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                x.checked_rem(y)
            }
        };
        return out
            .map(JsonValue::from)
            .ok_or_else(|| EvalError::TypeMismatch("integer overflow".to_string()));
    }

    let x = a.as_f64().unwrap_or(0.0);
    let y = b.as_f64().unwrap_or(0.0);
    let out = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            x / y
        }
        _ => {
            if y == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            x % y
        }
    };
    float_value(out)
}

fn call(func: Function, args: &[JsonValue]) -> Result<JsonValue, EvalError> {
    match func {
        Function::Size => Ok(JsonValue::from(size_of(&args[0])? as u64)),
        Function::IsEmpty => Ok(JsonValue::Bool(size_of(&args[0])? == 0)),
        Function::Contains => {
            let found = match (&args[0], &args[1]) {
                (JsonValue::String(h), JsonValue::String(n)) => h.contains(n.as_str()),
                (JsonValue::Array(items), needle) => items.iter().any(|i| json_eq(i, needle)),
                (JsonValue::Object(map), JsonValue::String(key)) => map.contains_key(key),
                (JsonValue::Null, _) => false,
                (h, n) => {
                    return Err(EvalError::TypeMismatch(format!(
                        "contains({}, {})",
                        type_name(h),
                        type_name(n)
                    )))
                }
            };
            Ok(JsonValue::Bool(found))
        }
        Function::StartsWith => match (&args[0], &args[1]) {
            (JsonValue::String(s), JsonValue::String(p)) => {
                Ok(JsonValue::Bool(s.starts_with(p.as_str())))
            }
            (JsonValue::Null, _) => Ok(JsonValue::Bool(false)),
            (s, p) => Err(EvalError::TypeMismatch(format!(
                "startsWith({}, {})",
                type_name(s),
                type_name(p)
            ))),
        },
        Function::Matches => match (&args[0], &args[1]) {
            (JsonValue::String(s), JsonValue::String(p)) => {
                let re = Regex::new(p).map_err(|e| EvalError::InvalidRegex(e.to_string()))?;
                Ok(JsonValue::Bool(re.is_match(s)))
            }
            (JsonValue::Null, _) => Ok(JsonValue::Bool(false)),
            (s, p) => Err(EvalError::TypeMismatch(format!(
                "matches({}, {})",
                type_name(s),
                type_name(p)
            ))),
        },
    }
}

fn index_value(base: &JsonValue, idx: &JsonValue) -> Result<JsonValue, EvalError> {
    match (base, idx) {
        (JsonValue::Null, _) => Ok(JsonValue::Null),
        (JsonValue::Array(items), JsonValue::Number(n)) => {
            let i = n.as_u64().ok_or_else(|| {
                EvalError::TypeMismatch(format!("invalid list index {n}"))
            })?;
            Ok(items.get(i as usize).cloned().unwrap_or(JsonValue::Null))
        }
        (JsonValue::Object(map), JsonValue::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(JsonValue::Null))
        }
        (b, i) => Err(EvalError::TypeMismatch(format!(
            "cannot index {} with {}",
            type_name(b),
            type_name(i)
        ))),
    }
}

fn size_of(v: &JsonValue) -> Result<usize, EvalError> {
    match v {
        JsonValue::Null => Ok(0),
        JsonValue::String(s) => Ok(s.chars().count()),
        JsonValue::Array(a) => Ok(a.len()),
        JsonValue::Object(o) => Ok(o.len()),
        other => Err(EvalError::TypeMismatch(format!(
            "size of {}",
            type_name(other)
        ))),
    }
}

fn as_bool(v: &JsonValue, op: &str) -> Result<bool, EvalError> {
    v.as_bool().ok_or_else(|| {
        EvalError::TypeMismatch(format!("operator {op} expects boolean, got {}", type_name(v)))
    })
}

fn float_value(f: f64) -> Result<JsonValue, EvalError> {
    serde_json::Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| EvalError::TypeMismatch(format!("non-finite result {f}")))
}

fn display(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn type_name(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}

pub fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Null, JsonValue::Null) => true,
        (JsonValue::Bool(a), JsonValue::Bool(b)) => a == b,
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (JsonValue::String(a), JsonValue::String(b)) => a == b,
        (JsonValue::Array(a), JsonValue::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| json_eq(x, y))
        }
        (JsonValue::Object(a), JsonValue::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map(|bv| json_eq(v, bv)).unwrap_or(false))
        }
        _ => false,
    }
}

fn json_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}
