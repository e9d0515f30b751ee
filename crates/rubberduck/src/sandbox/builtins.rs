//! Builtin functions and type constructors

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::lang::ast::BinOp;
use crate::sandbox::exception::{ExcKind, Exception, overflow, type_error, value_error};
use crate::sandbox::gate::{guarded_iter, unpack};
use crate::sandbox::interp::Interpreter;
use crate::sandbox::value::{Args, Builtin, BuiltinFn, Dict, HashKey, Range, TypeKind, Value};

type Native = Result<Value, Exception>;

const FUNCTIONS: &[(&str, BuiltinFn)] = &[
    ("print", print),
    ("len", len),
    ("abs", abs),
    ("min", min),
    ("max", max),
    ("sum", sum),
    ("sorted", sorted),
    ("reversed", reversed),
    ("enumerate", enumerate),
    ("zip", zip),
    ("map", map),
    ("filter", filter),
    ("repr", repr),
    ("round", round),
    ("divmod", divmod),
    ("pow", pow),
    ("isinstance", isinstance),
    ("chr", chr),
    ("ord", ord),
    ("hex", hex),
    ("oct", oct),
    ("bin", bin),
    ("all", all),
    ("any", any),
    ("callable", callable),
    ("hash", hash),
];

const TYPES: &[TypeKind] = &[
    TypeKind::List,
    TypeKind::Tuple,
    TypeKind::Dict,
    TypeKind::Str,
    TypeKind::Int,
    TypeKind::Float,
    TypeKind::Bool,
    TypeKind::Range,
    TypeKind::Type,
];

/// Every name a script can use without importing it
pub fn table() -> HashMap<&'static str, Value> {
    let mut names = HashMap::new();
    for &(name, func) in FUNCTIONS {
        names.insert(name, Value::Builtin(Rc::new(Builtin { name, func })));
    }
    for &kind in TYPES {
        names.insert(kind.name(), Value::Type(kind));
    }
    for kind in ExcKind::ALL {
        names.insert(kind.name(), Value::ExcType(kind));
    }
    names
}

/// Call a type object: `int("3")`, `list(range(3))`, ...
pub fn construct(interp: &mut Interpreter, kind: TypeKind, mut args: Args) -> Native {
    match kind {
        TypeKind::Bool => {
            args.check("bool", 0, 1)?;
            Ok(Value::Bool(args.get(0).is_some_and(Value::truthy)))
        }
        TypeKind::Int => {
            let base = args.keyword("base");
            args.check("int", 0, 2)?;
            let base = match (base, args.get(1).cloned()) {
                (Some(_), Some(_)) => {
                    return Err(type_error("int() got multiple values for argument 'base'"));
                }
                (Some(base), None) | (None, Some(base)) => Some(base),
                (None, None) => None,
            };
            match (args.get(0), base) {
                (None, _) => Ok(Value::Int(0)),
                (Some(Value::Str(s)), base) => {
                    let base = match base {
                        Some(base) => base
                            .as_int()
                            .ok_or_else(|| type_error("int() base must be an integer"))?,
                        None => 10,
                    };
                    parse_int(s, base).map(Value::Int)
                }
                (Some(_), Some(_)) => Err(type_error(
                    "int() can't convert non-string with explicit base",
                )),
                (Some(Value::Float(f)), None) => float_to_int(f.trunc()).map(Value::Int),
                (Some(value), None) => value.as_int().map(Value::Int).ok_or_else(|| {
                    type_error(format!(
                        "int() argument must be a string or a number, not '{}'",
                        value.type_name()
                    ))
                }),
            }
        }
        TypeKind::Float => {
            args.check("float", 0, 1)?;
            match args.get(0) {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s).map(Value::Float),
                Some(value) => value.as_float().map(Value::Float).ok_or_else(|| {
                    type_error(format!(
                        "float() argument must be a string or a real number, not '{}'",
                        value.type_name()
                    ))
                }),
            }
        }
        TypeKind::Str => {
            args.check("str", 0, 1)?;
            Ok(Value::from(args.get(0).map(Value::to_str).unwrap_or_default()))
        }
        TypeKind::List => {
            args.check("list", 0, 1)?;
            match args.get(0) {
                None => Ok(Value::list(Vec::new())),
                Some(value) => Ok(Value::list(interp.collect(value)?)),
            }
        }
        TypeKind::Tuple => {
            args.check("tuple", 0, 1)?;
            match args.get(0) {
                None => Ok(Value::tuple(Vec::new())),
                Some(Value::Tuple(items)) => Ok(Value::Tuple(items.clone())),
                Some(value) => Ok(Value::tuple(interp.collect(value)?)),
            }
        }
        TypeKind::Dict => {
            let keywords = std::mem::take(&mut args.keywords);
            args.check("dict", 0, 1)?;
            let mut dict = match args.get(0) {
                None => Dict::new(),
                Some(Value::Dict(other)) => other.borrow().clone(),
                Some(value) => {
                    let mut dict = Dict::new();
                    for item in interp.collect(value)? {
                        let mut pair = unpack(&item, 2)?.into_iter();
                        if let (Some(key), Some(value)) = (pair.next(), pair.next()) {
                            dict.insert(key, value)?;
                        }
                    }
                    dict
                }
            };
            for (key, value) in keywords {
                dict.insert(Value::from(key), value)?;
            }
            Ok(Value::dict(dict))
        }
        TypeKind::Range => {
            args.check("range", 1, 3)?;
            let ints = args
                .positional
                .iter()
                .map(|v| {
                    v.as_int().ok_or_else(|| {
                        type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            v.type_name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("arity checked above"),
            };
            if step == 0 {
                return Err(value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range(Range { start, stop, step }))
        }
        TypeKind::Type => {
            args.check("type", 1, 1)?;
            Ok(type_of(&args.positional[0]))
        }
        other => Err(type_error(format!(
            "cannot create '{}' instances",
            other.name()
        ))),
    }
}

fn type_of(value: &Value) -> Value {
    match value {
        Value::Exception(exc) => Value::ExcType(exc.kind),
        other => Value::Type(other.type_kind()),
    }
}

fn parse_int(text: &str, base: i64) -> Result<i64, Exception> {
    let invalid = || {
        value_error(format!(
            "invalid literal for int() with base {base}: {}",
            Value::from(text).repr()
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &lower[2..]),
        (0 | 8, Some("0o")) => (8, &lower[2..]),
        (0 | 2, Some("0b")) => (2, &lower[2..]),
        (0, _) => (10, lower.as_str()),
        (base, _) => (base as u32, lower.as_str()),
    };
    if digits.is_empty()
        || digits.starts_with(['_', '+', '-'])
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return Err(invalid());
    }
    let clean: String = digits.chars().filter(|&c| c != '_').collect();
    let magnitude = u64::from_str_radix(&clean, radix).map_err(|e| {
        if matches!(e.kind(), std::num::IntErrorKind::PosOverflow) {
            overflow()
        } else {
            invalid()
        }
    })?;
    let value = if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        i64::try_from(magnitude).ok()
    };
    value.ok_or_else(overflow)
}

fn parse_float(text: &str) -> Result<f64, Exception> {
    let trimmed = text.trim();
    let clean: String = trimmed.chars().filter(|&c| c != '_').collect();
    let valid_underscores = !trimmed.starts_with('_') && !trimmed.ends_with('_');
    match clean.parse::<f64>() {
        Ok(value) if valid_underscores && !clean.is_empty() => Ok(value),
        _ => Err(value_error(format!(
            "could not convert string to float: {}",
            Value::from(text).repr()
        ))),
    }
}

fn float_to_int(f: f64) -> Result<i64, Exception> {
    if f.is_nan() {
        return Err(value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Exception::new(
            ExcKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    if f < -9.223_372_036_854_775_808e18 || f >= 9.223_372_036_854_775_808e18 {
        return Err(overflow());
    }
    Ok(f as i64)
}

fn string_keyword(args: &mut Args, name: &str, default: &str) -> Result<String, Exception> {
    match args.keyword(name) {
        None | Some(Value::None) => Ok(default.to_owned()),
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(type_error(format!(
            "{name} must be None or a string, not {}",
            other.type_name()
        ))),
    }
}

fn print(interp: &mut Interpreter, mut args: Args) -> Native {
    let sep = string_keyword(&mut args, "sep", " ")?;
    let end = string_keyword(&mut args, "end", "\n")?;
    args.check("print", 0, usize::MAX)?;
    let mut line = args
        .positional
        .iter()
        .map(Value::to_str)
        .collect::<Vec<_>>()
        .join(&sep);
    line.push_str(&end);
    interp.output().write(line)?;
    Ok(Value::None)
}

fn len(_: &mut Interpreter, args: Args) -> Native {
    args.check("len", 1, 1)?;
    let n = match &args.positional[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Range(range) => range.len(),
        other => {
            return Err(type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    i64::try_from(n).map(Value::Int).map_err(|_| overflow())
}

fn abs(_: &mut Interpreter, args: Args) -> Native {
    args.check("abs", 1, 1)?;
    match &args.positional[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        value => value
            .as_int()
            .ok_or_else(|| {
                type_error(format!(
                    "bad operand type for abs(): '{}'",
                    value.type_name()
                ))
            })?
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(overflow),
    }
}

/// Stable sort, comparing `key(v)` when a key function is given
pub fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Result<Vec<Value>, Exception> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let sort_key = match key {
            Some(Value::None) | None => item.clone(),
            Some(func) => interp.call(func, Args::new(vec![item.clone()]))?,
        };
        keyed.push((sort_key, item));
    }
    // `right` moves ahead of `left` only when strictly before it, so equal keys keep their order
    let mut right_first =
        |(left, _): &(Value, Value), (right, _): &(Value, Value)| -> Result<bool, Exception> {
            let (a, b) = if reverse { (left, right) } else { (right, left) };
            Ok(a.compare(b, "<")? == Some(Ordering::Less))
        };
    let sorted = merge_sort(keyed, &mut right_first)?;
    Ok(sorted.into_iter().map(|(_, item)| item).collect())
}

/// Merge sort over a fallible comparison
///
/// Unordered pairs such as NaN simply stay where they are, and the first
/// failed comparison aborts the sort.
fn merge_sort<T>(
    mut items: Vec<T>,
    right_first: &mut impl FnMut(&T, &T) -> Result<bool, Exception>,
) -> Result<Vec<T>, Exception> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let tail = items.split_off(items.len() / 2);
    let mut left = merge_sort(items, &mut *right_first)?.into_iter().peekable();
    let mut right = merge_sort(tail, &mut *right_first)?.into_iter().peekable();

    let mut merged = Vec::with_capacity(left.len() + right.len());
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        if right_first(l, r)? {
            merged.extend(right.next());
        } else {
            merged.extend(left.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}

fn extreme(interp: &mut Interpreter, mut args: Args, name: &str, want: Ordering) -> Native {
    let key = args.keyword("key");
    let default = args.keyword("default");
    args.check(name, 1, usize::MAX)?;
    let items = if args.positional.len() == 1 {
        interp.collect(&args.positional[0])?
    } else {
        if default.is_some() {
            return Err(type_error(format!(
                "Cannot specify a default for {name}() with multiple positional arguments"
            )));
        }
        args.positional
    };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let item_key = match &key {
            Some(Value::None) | None => item.clone(),
            Some(func) => interp.call(func, Args::new(vec![item.clone()]))?,
        };
        let op = if want == Ordering::Less { "<" } else { ">" };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => item_key.compare(best_key, op)? == Some(want),
        };
        if replace {
            best = Some((item_key, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(value_error(format!("{name}() arg is an empty sequence"))),
    }
}

fn min(interp: &mut Interpreter, args: Args) -> Native {
    extreme(interp, args, "min", Ordering::Less)
}

fn max(interp: &mut Interpreter, args: Args) -> Native {
    extreme(interp, args, "max", Ordering::Greater)
}

fn sum(interp: &mut Interpreter, mut args: Args) -> Native {
    let start = args.keyword("start");
    args.check("sum", 1, 2)?;
    let mut total = match (start, args.positional.get(1)) {
        (Some(start), _) => start,
        (None, Some(start)) => start.clone(),
        (None, None) => Value::Int(0),
    };
    if matches!(total, Value::Str(_)) {
        return Err(type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    for item in guarded_iter(&args.positional[0])? {
        total = interp.binary(BinOp::Add, total, item)?;
    }
    Ok(total)
}

fn sorted(interp: &mut Interpreter, mut args: Args) -> Native {
    let key = args.keyword("key");
    let reverse = args.keyword("reverse").is_some_and(|v| v.truthy());
    args.check("sorted", 1, 1)?;
    let items = interp.collect(&args.positional[0])?;
    Ok(Value::list(sort_values(interp, items, key.as_ref(), reverse)?))
}

fn reversed(interp: &mut Interpreter, args: Args) -> Native {
    args.check("reversed", 1, 1)?;
    let value = &args.positional[0];
    if matches!(value, Value::Dict(_)) {
        return Err(type_error("'dict' object is not reversible"));
    }
    let mut items = interp.collect(value)?;
    items.reverse();
    Ok(Value::list(items))
}

fn enumerate(interp: &mut Interpreter, mut args: Args) -> Native {
    let start = args.keyword("start");
    args.check("enumerate", 1, 2)?;
    let start = start
        .as_ref()
        .or(args.positional.get(1))
        .map(|v| {
            v.as_int().ok_or_else(|| {
                type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        })
        .transpose()?
        .unwrap_or(0);
    let items = interp.collect(&args.positional[0])?;
    let mut out = Vec::with_capacity(items.len());
    for (offset, item) in items.into_iter().enumerate() {
        let index = i64::try_from(offset)
            .ok()
            .and_then(|i| start.checked_add(i))
            .ok_or_else(overflow)?;
        out.push(Value::tuple(vec![Value::Int(index), item]));
    }
    Ok(Value::list(out))
}

fn transpose(interp: &mut Interpreter, iterables: &[Value]) -> Result<Vec<Vec<Value>>, Exception> {
    let columns = iterables
        .iter()
        .map(|it| interp.collect(it))
        .collect::<Result<Vec<_>, _>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut columns: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    Ok((0..rows)
        .map(|_| columns.iter_mut().filter_map(|column| column.next()).collect())
        .collect())
}

fn zip(interp: &mut Interpreter, args: Args) -> Native {
    args.check("zip", 0, usize::MAX)?;
    let rows = transpose(interp, &args.positional)?;
    Ok(Value::list(rows.into_iter().map(Value::tuple).collect()))
}

fn map(interp: &mut Interpreter, args: Args) -> Native {
    args.check("map", 2, usize::MAX)?;
    let func = args.positional[0].clone();
    let rows = transpose(interp, &args.positional[1..])?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(interp.call(&func, Args::new(row))?);
    }
    Ok(Value::list(out))
}

fn filter(interp: &mut Interpreter, args: Args) -> Native {
    args.check("filter", 2, 2)?;
    let func = &args.positional[0];
    let mut out = Vec::new();
    for item in interp.collect(&args.positional[1])? {
        let keep = match func {
            Value::None => item.truthy(),
            func => interp.call(func, Args::new(vec![item.clone()]))?.truthy(),
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn repr(_: &mut Interpreter, args: Args) -> Native {
    args.check("repr", 1, 1)?;
    Ok(Value::from(args.positional[0].repr()))
}

fn round(_: &mut Interpreter, mut args: Args) -> Native {
    let ndigits = args.keyword("ndigits");
    args.check("round", 1, 2)?;
    let ndigits = match ndigits.as_ref().or(args.positional.get(1)) {
        None | Some(Value::None) => None,
        Some(n) => Some(n.as_int().ok_or_else(|| {
            type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                n.type_name()
            ))
        })?),
    };
    match (&args.positional[0], ndigits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(n)) => {
            let n = n.clamp(-400, 400) as i32;
            let scale = 10f64.powi(n.abs());
            let rounded = if n >= 0 {
                (f * scale).round_ties_even() / scale
            } else {
                (f / scale).round_ties_even() * scale
            };
            Ok(Value::Float(if rounded.is_finite() { rounded } else { *f }))
        }
        (value, n) => {
            let i = value.as_int().ok_or_else(|| {
                type_error(format!(
                    "type {} doesn't define __round__ method",
                    value.type_name()
                ))
            })?;
            match n {
                Some(n) if n < 0 => {
                    let Some(scale) = u32::try_from(-n).ok().and_then(|e| 10i64.checked_pow(e))
                    else {
                        return Ok(Value::Int(0));
                    };
                    let quotient = i.div_euclid(scale);
                    let remainder = i.rem_euclid(scale);
                    let half = scale / 2;
                    let up = remainder > half || (remainder == half && quotient % 2 != 0);
                    let quotient = if up { quotient + 1 } else { quotient };
                    quotient.checked_mul(scale).map(Value::Int).ok_or_else(overflow)
                }
                _ => Ok(Value::Int(i)),
            }
        }
    }
}

fn divmod(interp: &mut Interpreter, args: Args) -> Native {
    args.check("divmod", 2, 2)?;
    let (a, b) = (args.positional[0].clone(), args.positional[1].clone());
    let quotient = interp.binary(BinOp::FloorDiv, a.clone(), b.clone())?;
    let remainder = interp.binary(BinOp::Mod, a, b)?;
    Ok(Value::tuple(vec![quotient, remainder]))
}

fn pow(interp: &mut Interpreter, args: Args) -> Native {
    args.check("pow", 2, 3)?;
    let (base, exp) = (args.positional[0].clone(), args.positional[1].clone());
    let Some(modulus) = args.positional.get(2).filter(|m| !matches!(m, Value::None)) else {
        return interp.binary(BinOp::Pow, base, exp);
    };
    let (Some(base), Some(exp), Some(modulus)) = (base.as_int(), exp.as_int(), modulus.as_int())
    else {
        return Err(type_error(
            "pow() 3rd argument not allowed unless all arguments are integers",
        ));
    };
    if modulus == 0 {
        return Err(value_error("pow() 3rd argument cannot be 0"));
    }
    if exp < 0 {
        return Err(value_error("pow() 2nd argument cannot be negative when 3rd argument specified"));
    }
    let m = i128::from(modulus).abs();
    let mut result: i128 = 1 % m;
    let mut b = i128::from(base).rem_euclid(m);
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = (result * b) % m;
        }
        b = (b * b) % m;
        e >>= 1;
    }
    // the result takes the sign of the modulus
    if modulus < 0 && result != 0 {
        result -= m;
    }
    i64::try_from(result).map(Value::Int).map_err(|_| overflow())
}

fn instance_of(value: &Value, class: &Value) -> Result<bool, Exception> {
    match class {
        Value::Type(TypeKind::Int) => Ok(matches!(value, Value::Int(_) | Value::Bool(_))),
        Value::Type(kind) => Ok(match value {
            Value::ExcType(_) => *kind == TypeKind::Type,
            Value::Exception(_) => false,
            other => other.type_kind() == *kind,
        }),
        Value::ExcType(kind) => Ok(
            matches!(value, Value::Exception(exc) if exc.kind.is_subclass_of(*kind)),
        ),
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if instance_of(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(type_error(
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        )),
    }
}

fn isinstance(_: &mut Interpreter, args: Args) -> Native {
    args.check("isinstance", 2, 2)?;
    instance_of(&args.positional[0], &args.positional[1]).map(Value::Bool)
}

fn chr(_: &mut Interpreter, args: Args) -> Native {
    args.check("chr", 1, 1)?;
    let code = integer_arg(&args.positional[0])?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::from(c.to_string()))
        .ok_or_else(|| value_error("chr() arg not in range(0x110000)"))
}

fn ord(_: &mut Interpreter, args: Args) -> Native {
    args.check("ord", 1, 1)?;
    let Value::Str(s) = &args.positional[0] else {
        return Err(type_error(format!(
            "ord() expected string of length 1, but {} found",
            args.positional[0].type_name()
        )));
    };
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
        _ => Err(type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

fn integer_arg(value: &Value) -> Result<i64, Exception> {
    value.as_int().ok_or_else(|| {
        type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

fn radix_string(value: &Value, prefix: &str, radix: u32) -> Native {
    let i = integer_arg(value)?;
    let magnitude = i.unsigned_abs();
    let digits = match radix {
        2 => format!("{magnitude:b}"),
        8 => format!("{magnitude:o}"),
        _ => format!("{magnitude:x}"),
    };
    let sign = if i < 0 { "-" } else { "" };
    Ok(Value::from(format!("{sign}{prefix}{digits}")))
}

fn hex(_: &mut Interpreter, args: Args) -> Native {
    args.check("hex", 1, 1)?;
    radix_string(&args.positional[0], "0x", 16)
}

fn oct(_: &mut Interpreter, args: Args) -> Native {
    args.check("oct", 1, 1)?;
    radix_string(&args.positional[0], "0o", 8)
}

fn bin(_: &mut Interpreter, args: Args) -> Native {
    args.check("bin", 1, 1)?;
    radix_string(&args.positional[0], "0b", 2)
}

fn all(_: &mut Interpreter, args: Args) -> Native {
    args.check("all", 1, 1)?;
    Ok(Value::Bool(guarded_iter(&args.positional[0])?.all(|v| v.truthy())))
}

fn any(_: &mut Interpreter, args: Args) -> Native {
    args.check("any", 1, 1)?;
    Ok(Value::Bool(guarded_iter(&args.positional[0])?.any(|v| v.truthy())))
}

fn callable(_: &mut Interpreter, args: Args) -> Native {
    args.check("callable", 1, 1)?;
    Ok(Value::Bool(args.positional[0].is_callable()))
}

fn hash(_: &mut Interpreter, args: Args) -> Native {
    args.check("hash", 1, 1)?;
    let key = args.positional[0].hash_key()?;
    if let HashKey::Int(i) = key {
        return Ok(Value::Int(i));
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    Ok(Value::Int(hasher.finish() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_contains_builtins_types_and_exceptions() {
        let table = table();
        for name in ["print", "len", "sorted", "hash", "int", "dict", "ValueError", "Exception"] {
            assert!(table.contains_key(name), "{name}");
        }
        for name in ["open", "eval", "exec", "getattr", "__import__", "globals", "input"] {
            assert!(!table.contains_key(name), "{name}");
        }
    }

    #[test]
    fn int_parsing() {
        assert_eq!(parse_int(" 42 ", 10).unwrap(), 42);
        assert_eq!(parse_int("-1_000", 10).unwrap(), -1000);
        assert_eq!(parse_int("ff", 16).unwrap(), 255);
        assert_eq!(parse_int("0x1F", 0).unwrap(), 31);
        assert_eq!(parse_int("0b101", 2).unwrap(), 5);
        assert_eq!(parse_int("-9223372036854775808", 10).unwrap(), i64::MIN);
        let err = parse_int("12a", 10).unwrap_err();
        assert_eq!(err.message, "invalid literal for int() with base 10: '12a'");
        assert_eq!(
            parse_int("99999999999999999999", 10).unwrap_err().kind,
            ExcKind::OverflowError
        );
        assert!(parse_int("1__0", 10).is_err());
    }

    #[test]
    fn float_parsing() {
        assert_eq!(parse_float(" 2.5 ").unwrap(), 2.5);
        assert_eq!(parse_float("1e3").unwrap(), 1000.0);
        assert!(parse_float("-inf").unwrap().is_infinite());
        assert!(parse_float("abc").is_err());
        assert!(parse_float("").is_err());
    }

    #[test]
    fn float_conversion_bounds() {
        assert_eq!(float_to_int(-3.0).unwrap(), -3);
        assert_eq!(float_to_int(f64::NAN).unwrap_err().kind, ExcKind::ValueError);
        assert_eq!(float_to_int(f64::INFINITY).unwrap_err().kind, ExcKind::OverflowError);
        assert_eq!(float_to_int(1e19).unwrap_err().kind, ExcKind::OverflowError);
    }

    #[test]
    fn isinstance_rules() {
        assert!(instance_of(&Value::Bool(true), &Value::Type(TypeKind::Int)).unwrap());
        assert!(!instance_of(&Value::Int(1), &Value::Type(TypeKind::Bool)).unwrap());
        let classes = Value::tuple(vec![Value::Type(TypeKind::Str), Value::Type(TypeKind::Float)]);
        assert!(instance_of(&Value::Float(1.0), &classes).unwrap());
        let exc = Value::Exception(Rc::new(Exception::new(ExcKind::KeyError, "k")));
        assert!(instance_of(&exc, &Value::ExcType(ExcKind::LookupError)).unwrap());
        assert!(instance_of(&Value::Int(1), &Value::Int(2)).is_err());
    }

    #[test]
    fn radix_strings() {
        let render = |i: i64, prefix: &str, radix: u32| {
            radix_string(&Value::Int(i), prefix, radix).unwrap().to_str()
        };
        assert_eq!(render(255, "0x", 16), "0xff");
        assert_eq!(render(-8, "0o", 8), "-0o10");
        assert_eq!(render(5, "0b", 2), "0b101");
        assert_eq!(render(i64::MIN, "0x", 16), "-0x8000000000000000");
    }
}
