//! Tree-walking evaluation over JSON values with Python-like semantics.

use super::NativeFunction;
use super::parser::{BinaryOp, CompareOp, Expr, UnaryOp};
use crate::error::{ConfigError, Result};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Upper bound on the length of lists built by `range` and repetition.
const MAX_SEQUENCE_LEN: usize = 1_000_000;

/// Deepest expression tree evaluated; long operator chains nest to the left.
const MAX_EVAL_DEPTH: usize = 256;

/// Variable bindings plus the host functions visible to an expression.
pub(crate) struct Scope<'a> {
    vars: Vec<(String, Value)>,
    functions: &'a HashMap<String, NativeFunction>,
    depth: usize,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(functions: &'a HashMap<String, NativeFunction>) -> Self {
        Self {
            vars: Vec::new(),
            functions,
            depth: 0,
        }
    }

    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        self.vars.push((name.to_string(), value));
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Num::Int(i)),
                None => n.as_f64().map(Num::Float),
            },
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn float(f: f64) -> Result<Value> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| ConfigError::expression(format!("{} is not a finite number", f)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "None",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Equality where `1 == 1.0` and containers compare element-wise.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (Num::of(a), Num::of(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| loose_eq(x, y)))
        }
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    let ordering = match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Some(xs.len().cmp(&ys.len()))
        }
        _ => match (Num::of(a), Num::of(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Some(x.cmp(&y)),
            (Some(x), Some(y)) => x.as_f64().partial_cmp(&y.as_f64()),
            _ => None,
        },
    };
    ordering.ok_or_else(|| {
        ConfigError::expression(format!(
            "cannot compare {} with {}",
            type_name(a),
            type_name(b)
        ))
    })
}

pub(crate) fn eval(expr: &Expr, scope: &mut Scope<'_>) -> Result<Value> {
    if scope.depth >= MAX_EVAL_DEPTH {
        return Err(ConfigError::expression("expression nested too deeply"));
    }
    scope.depth += 1;
    let value = eval_node(expr, scope);
    scope.depth -= 1;
    value
}

fn eval_node(expr: &Expr, scope: &mut Scope<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| ConfigError::expression(format!("name '{}' is not defined", name))),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, scope))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Expr::Map(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                let key = match eval(key, scope)? {
                    Value::String(s) => s,
                    other @ (Value::Number(_) | Value::Bool(_)) => other.to_string(),
                    other => {
                        return Err(ConfigError::expression(format!(
                            "unhashable dict key of type {}",
                            type_name(&other)
                        )));
                    }
                };
                map.insert(key, eval(value, scope)?);
            }
            Ok(Value::Object(map))
        }
        Expr::Unary(op, operand) => {
            let value = eval(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Pos => match Num::of(&value) {
                    Some(Num::Int(i)) => Ok(Value::from(i)),
                    Some(Num::Float(f)) => float(f),
                    None => Err(bad_operand("unary +", &value)),
                },
                UnaryOp::Neg => match Num::of(&value) {
                    Some(Num::Int(i)) => i
                        .checked_neg()
                        .map(Value::from)
                        .ok_or_else(|| ConfigError::expression("integer overflow")),
                    Some(Num::Float(f)) => float(-f),
                    None => Err(bad_operand("unary -", &value)),
                },
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            binary(*op, &left, &right)
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(first, scope)?;
            for (op, operand) in rest {
                let right = eval(operand, scope)?;
                if !compare_op(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(left, right) => {
            let left = eval(left, scope)?;
            if truthy(&left) {
                eval(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, scope)?;
            if truthy(&left) {
                Ok(left)
            } else {
                eval(right, scope)
            }
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if truthy(&eval(condition, scope)?) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::Index(target, index) => {
            let target = eval(target, scope)?;
            let index = eval(index, scope)?;
            subscript(&target, &index)
        }
        Expr::Slice {
            target,
            start,
            stop,
        } => {
            let target = eval(target, scope)?;
            let start = bound(start.as_deref(), scope)?;
            let stop = bound(stop.as_deref(), scope)?;
            slice(&target, start, stop)
        }
        Expr::Call(name, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>>>()?;
            if let Some(function) = scope.functions.get(name) {
                return function(args.as_slice());
            }
            builtin(name, &args)
        }
        Expr::Comprehension {
            element,
            var,
            iter,
            condition,
        } => {
            let items = iterate(&eval(iter, scope)?)?;
            let mut out = Vec::new();
            for item in items {
                scope.bind(var, item);
                let keep = match condition {
                    Some(condition) => eval(condition, scope).map(|c| truthy(&c)),
                    None => Ok(true),
                };
                let value = match keep {
                    Ok(true) => eval(element, scope).map(Some),
                    Ok(false) => Ok(None),
                    Err(e) => Err(e),
                };
                scope.vars.pop();
                if let Some(value) = value? {
                    out.push(value);
                }
            }
            Ok(Value::Array(out))
        }
    }
}

fn bad_operand(op: &str, value: &Value) -> ConfigError {
    ConfigError::expression(format!(
        "bad operand type for {}: '{}'",
        op,
        type_name(value)
    ))
}

fn unsupported(op: &str, left: &Value, right: &Value) -> ConfigError {
    ConfigError::expression(format!(
        "unsupported operand types for {}: '{}' and '{}'",
        op,
        type_name(left),
        type_name(right)
    ))
}

fn overflow() -> ConfigError {
    ConfigError::expression("integer overflow")
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>> {
    let times = usize::try_from(times.max(0)).unwrap_or(0);
    if items.len().saturating_mul(times) > MAX_SEQUENCE_LEN {
        return Err(ConfigError::expression("sequence repetition is too large"));
    }
    Ok((0..times).flat_map(|_| items.iter().cloned()).collect())
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    match (op, left, right) {
        (BinaryOp::Add, Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Mul, Value::String(s), Value::Number(_))
        | (BinaryOp::Mul, Value::Number(_), Value::String(s)) => {
            let times = match (Num::of(left), Num::of(right)) {
                (Some(Num::Int(n)), _) | (_, Some(Num::Int(n))) => n,
                _ => return Err(unsupported("*", left, right)),
            };
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::String(repeat(&chars, times)?.into_iter().collect()))
        }
        (BinaryOp::Mul, Value::Array(items), Value::Number(_))
        | (BinaryOp::Mul, Value::Number(_), Value::Array(items)) => {
            let times = match (Num::of(left), Num::of(right)) {
                (Some(Num::Int(n)), _) | (_, Some(Num::Int(n))) => n,
                _ => return Err(unsupported("*", left, right)),
            };
            Ok(Value::Array(repeat(items, times)?))
        }
        _ => {
            let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
                return Err(unsupported(symbol(op), left, right));
            };
            arithmetic(op, a, b)
        }
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

fn arithmetic(op: BinaryOp, a: Num, b: Num) -> Result<Value> {
    let divides_by_zero = matches!(op, BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod)
        && b.as_f64() == 0.0;
    if divides_by_zero {
        return Err(ConfigError::expression("division by zero"));
    }

    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => return float(x as f64 / y as f64),
            BinaryOp::FloorDiv => x.checked_div_euclid(y).map(|q| {
                // floor, not euclid, for a negative divisor
                if y < 0 && x.rem_euclid(y) != 0 { q - 1 } else { q }
            }),
            BinaryOp::Mod => x.checked_rem_euclid(y).map(|r| {
                if y < 0 && r != 0 { r + y } else { r }
            }),
            BinaryOp::Pow => {
                if y < 0 {
                    return float((x as f64).powf(y as f64));
                }
                u32::try_from(y).ok().and_then(|e| x.checked_pow(e))
            }
        };
        return result.map(Value::from).ok_or_else(overflow);
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
        BinaryOp::Pow => x.powf(y),
    };
    float(result)
}

fn compare_op(op: CompareOp, left: &Value, right: &Value) -> Result<bool> {
    Ok(match op {
        CompareOp::Eq => loose_eq(left, right),
        CompareOp::Ne => !loose_eq(left, right),
        CompareOp::Lt => compare(left, right)? == Ordering::Less,
        CompareOp::Le => compare(left, right)? != Ordering::Greater,
        CompareOp::Gt => compare(left, right)? == Ordering::Greater,
        CompareOp::Ge => compare(left, right)? != Ordering::Less,
        CompareOp::In => contains(right, left)?,
        CompareOp::NotIn => !contains(right, left)?,
    })
}

fn contains(container: &Value, item: &Value) -> Result<bool> {
    match (container, item) {
        (Value::Array(items), _) => Ok(items.iter().any(|x| loose_eq(x, item))),
        (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(ConfigError::expression(format!(
            "'in' is not supported between '{}' and '{}'",
            type_name(item),
            type_name(container)
        ))),
    }
}

fn to_index(value: &Value) -> Result<i64> {
    match Num::of(value) {
        Some(Num::Int(i)) if !value.is_boolean() => Ok(i),
        _ => Err(ConfigError::expression(format!(
            "indices must be integers, not {}",
            type_name(value)
        ))),
    }
}

fn normalize(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    usize::try_from(index).ok().filter(|&i| (i as i64) < len)
}

fn subscript(target: &Value, index: &Value) -> Result<Value> {
    match target {
        Value::Array(items) => normalize(to_index(index)?, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| ConfigError::expression("list index out of range")),
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            normalize(to_index(index)?, chars.len())
                .map(|i| Value::String(chars[i].to_string()))
                .ok_or_else(|| ConfigError::expression("string index out of range"))
        }
        Value::Object(map) => {
            let key = match index {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            map.get(&key)
                .cloned()
                .ok_or_else(|| ConfigError::expression(format!("key '{}' not found", key)))
        }
        other => Err(ConfigError::expression(format!(
            "'{}' object is not subscriptable",
            type_name(other)
        ))),
    }
}

fn bound(expr: Option<&Expr>, scope: &mut Scope<'_>) -> Result<Option<i64>> {
    match expr {
        Some(expr) => to_index(&eval(expr, scope)?).map(Some),
        None => Ok(None),
    }
}

/// Python slice bounds: negative counts from the end, out-of-range clamps.
fn clamp(bound: Option<i64>, len: usize, default: usize) -> usize {
    let Some(bound) = bound else {
        return default;
    };
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let resolved = if bound < 0 { (bound + len_i).max(0) } else { bound.min(len_i) };
    usize::try_from(resolved).unwrap_or(0)
}

fn slice(target: &Value, start: Option<i64>, stop: Option<i64>) -> Result<Value> {
    match target {
        Value::Array(items) => {
            let (from, to) = (clamp(start, items.len(), 0), clamp(stop, items.len(), items.len()));
            Ok(Value::Array(items.get(from..to.max(from)).unwrap_or_default().to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, to) = (clamp(start, chars.len(), 0), clamp(stop, chars.len(), chars.len()));
            Ok(Value::String(
                chars.get(from..to.max(from)).unwrap_or_default().iter().collect(),
            ))
        }
        other => Err(ConfigError::expression(format!(
            "'{}' object cannot be sliced",
            type_name(other)
        ))),
    }
}

fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Object(map) => Ok(map.keys().cloned().map(Value::String).collect()),
        other => Err(ConfigError::expression(format!(
            "'{}' object is not iterable",
            type_name(other)
        ))),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        return Err(ConfigError::expression(format!(
            "{}() takes {}..={} arguments, got {}",
            name,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

/// Text rendering used by `str()`.
fn to_text(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn builtin(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "range" => {
            arity(name, args, 1, 3)?;
            let ints = args.iter().map(to_index).collect::<Result<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(ConfigError::expression("range() arguments")),
            };
            if step == 0 {
                return Err(ConfigError::expression("range() step must not be zero"));
            }
            let mut out = Vec::new();
            let mut i = start;
            while (step > 0 && i < stop) || (step < 0 && i > stop) {
                if out.len() >= MAX_SEQUENCE_LEN {
                    return Err(ConfigError::expression("range() is too large"));
                }
                out.push(Value::from(i));
                i = i.checked_add(step).ok_or_else(overflow)?;
            }
            Ok(Value::Array(out))
        }
        "list" => {
            arity(name, args, 0, 1)?;
            match args.first() {
                Some(value) => iterate(value).map(Value::Array),
                None => Ok(Value::Array(Vec::new())),
            }
        }
        "len" => {
            arity(name, args, 1, 1)?;
            let len = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(ConfigError::expression(format!(
                        "object of type '{}' has no len()",
                        type_name(other)
                    )));
                }
            };
            Ok(Value::from(len))
        }
        "str" => {
            arity(name, args, 1, 1)?;
            Ok(Value::String(to_text(&args[0])))
        }
        "int" => {
            arity(name, args, 1, 1)?;
            match &args[0] {
                Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| {
                    ConfigError::expression(format!("invalid literal for int(): '{}'", s))
                }),
                value => match Num::of(value) {
                    Some(Num::Int(i)) => Ok(Value::from(i)),
                    Some(Num::Float(f)) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                        Ok(Value::from(f.trunc() as i64))
                    }
                    _ => Err(bad_operand("int()", value)),
                },
            }
        }
        "float" => {
            arity(name, args, 1, 1)?;
            match &args[0] {
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
                    ConfigError::expression(format!("could not convert string to float: '{}'", s))
                })
                .and_then(float),
                value => match Num::of(value) {
                    Some(n) => float(n.as_f64()),
                    None => Err(bad_operand("float()", value)),
                },
            }
        }
        "bool" => {
            arity(name, args, 1, 1)?;
            Ok(Value::Bool(truthy(&args[0])))
        }
        "abs" => {
            arity(name, args, 1, 1)?;
            match Num::of(&args[0]) {
                Some(Num::Int(i)) => i.checked_abs().map(Value::from).ok_or_else(overflow),
                Some(Num::Float(f)) => float(f.abs()),
                None => Err(bad_operand("abs()", &args[0])),
            }
        }
        "min" | "max" => {
            let items = match args {
                [Value::Array(items)] => items.clone(),
                [] => return Err(ConfigError::expression(format!("{}() expects arguments", name))),
                _ => args.to_vec(),
            };
            let mut best: Option<Value> = None;
            for item in items {
                best = Some(match best {
                    None => item,
                    Some(current) => {
                        let ordering = compare(&item, &current)?;
                        let better = if name == "min" {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        };
                        if better { item } else { current }
                    }
                });
            }
            best.ok_or_else(|| ConfigError::expression(format!("{}() arg is an empty sequence", name)))
        }
        "sum" => {
            arity(name, args, 1, 2)?;
            let items = iterate(&args[0])?;
            let mut total = args.get(1).cloned().unwrap_or(Value::from(0));
            for item in &items {
                total = binary(BinaryOp::Add, &total, item)?;
            }
            Ok(total)
        }
        "round" => {
            arity(name, args, 1, 2)?;
            let value = Num::of(&args[0]).ok_or_else(|| bad_operand("round()", &args[0]))?;
            match args.get(1) {
                None => match value {
                    Num::Int(i) => Ok(Value::from(i)),
                    Num::Float(f) => {
                        let rounded = f.round_ties_even();
                        if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                            Ok(Value::from(rounded as i64))
                        } else {
                            Err(overflow())
                        }
                    }
                },
                Some(digits) => {
                    let digits = i32::try_from(to_index(digits)?)
                        .map_err(|_| ConfigError::expression("round() digits out of range"))?;
                    let factor = 10f64.powi(digits);
                    match value {
                        Num::Int(i) if digits >= 0 => Ok(Value::from(i)),
                        n => float((n.as_f64() * factor).round_ties_even() / factor),
                    }
                }
            }
        }
        "sorted" => {
            arity(name, args, 1, 1)?;
            let mut items = iterate(&args[0])?;
            let mut failure = None;
            items.sort_by(|a, b| match compare(a, b) {
                Ok(ordering) => ordering,
                Err(e) => {
                    failure.get_or_insert(e);
                    Ordering::Equal
                }
            });
            match failure {
                Some(e) => Err(e),
                None => Ok(Value::Array(items)),
            }
        }
        _ => Err(ConfigError::expression(format!(
            "name '{}' is not defined",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse_expression;
    use serde_json::json;

    fn run(source: &str) -> Result<Value> {
        let functions = HashMap::new();
        let mut scope = Scope::new(&functions);
        scope.bind("x", json!(5));
        scope.bind("xs", json!([3, 1, 2]));
        scope.bind("cfg", json!({"lr": 0.1, "name": "bert"}));
        eval(&parse_expression(source)?, &mut scope)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("x + 1").unwrap(), json!(6));
        assert_eq!(run("x / 2").unwrap(), json!(2.5));
        assert_eq!(run("x // 2").unwrap(), json!(2));
        assert_eq!(run("-7 // 2").unwrap(), json!(-4));
        assert_eq!(run("7 // -2").unwrap(), json!(-4));
        assert_eq!(run("-7 % 3").unwrap(), json!(2));
        assert_eq!(run("7 % -3").unwrap(), json!(-2));
        assert_eq!(run("2 ** 10").unwrap(), json!(1024));
        assert_eq!(run("2 ** -1").unwrap(), json!(0.5));
        assert_eq!(run("-2 ** 2").unwrap(), json!(-4));
        assert_eq!(run("0.5 * 4").unwrap(), json!(2.0));
        assert!(run("x / 0").is_err());
    }

    #[test]
    fn test_strings_and_lists() {
        assert_eq!(run("'a' + 'b'").unwrap(), json!("ab"));
        assert_eq!(run("'ab' * 2").unwrap(), json!("abab"));
        assert_eq!(run("[1] * 3").unwrap(), json!([1, 1, 1]));
        assert_eq!(run("[xs, 'a'] * 2").unwrap(), json!([[3, 1, 2], "a", [3, 1, 2], "a"]));
        assert_eq!(run("xs + [4]").unwrap(), json!([3, 1, 2, 4]));
        assert_eq!(run("xs[-1]").unwrap(), json!(2));
        assert_eq!(run("xs[1:]").unwrap(), json!([1, 2]));
        assert_eq!(run("xs[:-1]").unwrap(), json!([3, 1]));
        assert_eq!(run("'bert'[0:2]").unwrap(), json!("be"));
        assert_eq!(run("cfg['name']").unwrap(), json!("bert"));
        assert!(run("xs[5]").is_err());
    }

    #[test]
    fn test_logic_and_comparison() {
        assert_eq!(run("1 < x <= 5").unwrap(), json!(true));
        assert_eq!(run("1 < x < 5").unwrap(), json!(false));
        assert_eq!(run("1 == 1.0").unwrap(), json!(true));
        assert_eq!(run("2 in xs").unwrap(), json!(true));
        assert_eq!(run("'lr' not in cfg").unwrap(), json!(false));
        assert_eq!(run("x > 3 and 'big' or 'small'").unwrap(), json!("big"));
        assert_eq!(run("'yes' if x else 'no'").unwrap(), json!("yes"));
        assert_eq!(run("not []").unwrap(), json!(true));
        assert!(run("x < 'a'").is_err());
    }

    #[test]
    fn test_comprehension_and_builtins() {
        assert_eq!(
            run("[i * 2 for i in range(4) if i % 2 == 0]").unwrap(),
            json!([0, 4])
        );
        assert_eq!(run("list(range(1, 7, 2))").unwrap(), json!([1, 3, 5]));
        assert_eq!(run("len(xs)").unwrap(), json!(3));
        assert_eq!(run("sorted(xs)").unwrap(), json!([1, 2, 3]));
        assert_eq!(run("sum(xs)").unwrap(), json!(6));
        assert_eq!(run("min(xs)").unwrap(), json!(1));
        assert_eq!(run("max(4, x)").unwrap(), json!(5));
        assert_eq!(run("str(x) + 'k'").unwrap(), json!("5k"));
        assert_eq!(run("int('12') + int(2.9)").unwrap(), json!(14));
        assert_eq!(run("float(x)").unwrap(), json!(5.0));
        assert_eq!(run("round(2.5)").unwrap(), json!(2));
        assert_eq!(run("round(0.126, 2)").unwrap(), json!(0.13));
        assert_eq!(run("abs(-3)").unwrap(), json!(3));
        assert_eq!(run("bool('')").unwrap(), json!(false));
        assert_eq!(run("{'a': x}").unwrap(), json!({"a": 5}));
        assert!(run("range(0, 3, 0)").is_err());
        assert!(run("nope(1)").is_err());
        assert!(run("y").is_err());
    }

    #[test]
    fn test_long_chains_stop_at_depth_limit() {
        let chain = |terms: usize| format!("1{}", " + 1".repeat(terms - 1));
        assert_eq!(run(&chain(100)).unwrap(), json!(100));
        let err = run(&chain(1000)).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[test]
    fn test_comprehension_scope_is_restored() {
        assert_eq!(run("[x for x in [1, 2]] + [x]").unwrap(), json!([1, 2, 5]));
    }
}
