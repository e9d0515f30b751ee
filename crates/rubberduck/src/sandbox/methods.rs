//! Methods of the built-in types
//!
//! Only the names listed here can be bound; anything else is an
//! `AttributeError` once the gate has let the name through.

use std::rc::Rc;

use crate::sandbox::builtins::sort_values;
use crate::sandbox::exception::{ExcKind, Exception, index_error, type_error, value_error};
use crate::sandbox::gate::unpack;
use crate::sandbox::interp::{Interpreter, position};
use crate::sandbox::value::{Args, Dict, Value};

type Native = Result<Value, Exception>;

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "index",
    "count",
    "isdigit",
    "isalpha",
    "isalnum",
    "isspace",
    "isupper",
    "islower",
    "title",
    "capitalize",
    "center",
    "ljust",
    "rjust",
    "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "clear",
    "copy",
];

const DICT_METHODS: &[&str] = &[
    "keys",
    "values",
    "items",
    "get",
    "pop",
    "setdefault",
    "update",
    "clear",
    "copy",
];

const TUPLE_METHODS: &[&str] = &["index", "count"];

/// Resolve a method name for a receiver
pub fn lookup(receiver: &Value, name: &str) -> Option<&'static str> {
    let table = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => return None,
    };
    table.iter().find(|&&method| method == name).copied()
}

pub fn call(interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Native {
    match receiver {
        Value::Str(s) => str_method(interp, s, name, args),
        Value::List(_) => list_method(interp, receiver, name, args),
        Value::Dict(_) => dict_method(interp, receiver, name, args),
        Value::Tuple(items) => sequence_method(items, "tuple", name, args),
        other => Err(Exception::new(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{name}'", other.type_name()),
        )),
    }
}

fn str_arg(args: &Args, index: usize, method: &str) -> Result<Rc<str>, Exception> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(type_error(format!(
            "{method}() argument {} must be str, not {}",
            index + 1,
            other.type_name()
        ))),
        None => Err(type_error(format!("{method}() missing required argument"))),
    }
}

/// Optional `chars` argument of the strip family; `None` means whitespace
fn strip_chars(args: &Args, method: &str) -> Result<Option<Vec<char>>, Exception> {
    args.check(method, 0, 1)?;
    match args.get(0) {
        None | Some(Value::None) => Ok(None),
        Some(_) => Ok(Some(str_arg(args, 0, method)?.chars().collect())),
    }
}

fn int_arg(args: &Args, index: usize, default: i64) -> Result<i64, Exception> {
    int_value(args.get(index), default)
}

fn int_value(value: Option<&Value>, default: i64) -> Result<i64, Exception> {
    match value {
        None | Some(Value::None) => Ok(default),
        Some(value) => value.as_int().ok_or_else(|| {
            type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ))
        }),
    }
}

fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 >= maxsplit {
            parts.push(Value::from(rest.trim_end()));
            break;
        }
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        parts.push(Value::from(&rest[..end]));
        rest = rest[end..].trim_start();
    }
    parts
}

fn pad(
    interp: &Interpreter,
    s: &str,
    args: &Args,
    method: &str,
    align: fn(usize, usize) -> (usize, usize),
) -> Native {
    args.check(method, 1, 2)?;
    let width = usize::try_from(int_arg(args, 0, 0)?).unwrap_or(0);
    let fill = match args.get(1) {
        None => ' ',
        Some(_) => {
            let fill = str_arg(args, 1, method)?;
            let mut chars = fill.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(type_error(
                        "The fill character must be exactly one character long",
                    ));
                }
            }
        }
    };
    let len = s.chars().count();
    if width <= len {
        return Ok(Value::from(s));
    }
    interp.check_len(width)?;
    let (left, right) = align(width - len, width);
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat_n(fill, left));
    out.push_str(s);
    out.extend(std::iter::repeat_n(fill, right));
    Ok(Value::from(out))
}

fn affix_matches(s: &str, args: &Args, method: &str, suffix: bool) -> Native {
    args.check(method, 1, 1)?;
    let candidates = match &args.positional[0] {
        Value::Str(affix) => vec![affix.clone()],
        Value::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Value::Str(affix) => Ok(affix.clone()),
                other => Err(type_error(format!(
                    "tuple for {method} must only contain str, not {}",
                    other.type_name()
                ))),
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(type_error(format!(
                "{method} first arg must be str or a tuple of str, not {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Bool(candidates.iter().any(|affix| {
        if suffix {
            s.ends_with(&**affix)
        } else {
            s.starts_with(&**affix)
        }
    })))
}

fn char_class(s: &str, pred: fn(char) -> bool) -> Native {
    Ok(Value::Bool(!s.is_empty() && s.chars().all(pred)))
}

fn cased(s: &str, upper: bool) -> Native {
    let mut any_cased = false;
    for c in s.chars() {
        if c.is_uppercase() {
            if !upper {
                return Ok(Value::Bool(false));
            }
            any_cased = true;
        } else if c.is_lowercase() {
            if upper {
                return Ok(Value::Bool(false));
            }
            any_cased = true;
        }
    }
    Ok(Value::Bool(any_cased))
}

fn str_method(interp: &mut Interpreter, s: &Rc<str>, name: &str, mut args: Args) -> Native {
    let s: &str = s;
    match name {
        "upper" => {
            args.check(name, 0, 0)?;
            Ok(Value::from(s.to_uppercase()))
        }
        "lower" => {
            args.check(name, 0, 0)?;
            Ok(Value::from(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(&args, name)?;
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Ok(Value::from(match name {
                "lstrip" => s.trim_start_matches(matcher),
                "rstrip" => s.trim_end_matches(matcher),
                _ => s.trim_matches(matcher),
            }))
        }
        "split" => {
            let sep = args.keyword("sep");
            let maxsplit = args.keyword("maxsplit");
            args.check(name, 0, 2)?;
            let sep = sep.or_else(|| args.get(0).cloned()).unwrap_or(Value::None);
            let maxsplit = int_value(maxsplit.as_ref().or(args.get(1)), -1)?;
            let parts = match sep {
                Value::None => split_whitespace(s, maxsplit),
                Value::Str(sep) if sep.is_empty() => {
                    return Err(value_error("empty separator"));
                }
                Value::Str(sep) => {
                    if maxsplit < 0 {
                        s.split(&*sep).map(Value::from).collect()
                    } else {
                        let limit = usize::try_from(maxsplit)
                            .unwrap_or(usize::MAX)
                            .saturating_add(1);
                        s.splitn(limit, &*sep).map(Value::from).collect()
                    }
                }
                other => {
                    return Err(type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::list(parts))
        }
        "join" => {
            args.check(name, 1, 1)?;
            let items = interp.collect(&args.positional[0])?;
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                let Value::Str(part) = item else {
                    return Err(type_error(format!(
                        "sequence item {i}: expected str instance, {} found",
                        item.type_name()
                    )));
                };
                if i > 0 {
                    out.push_str(s);
                }
                out.push_str(part);
                interp.check_len(out.len())?;
            }
            Ok(Value::from(out))
        }
        "replace" => {
            args.check(name, 2, 3)?;
            let old = str_arg(&args, 0, name)?;
            let new = str_arg(&args, 1, name)?;
            let count = int_arg(&args, 2, -1)?;
            let occurrences = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(&*old).count()
            };
            let replaced = match usize::try_from(count) {
                Ok(count) => occurrences.min(count),
                Err(_) => occurrences,
            };
            interp.check_len(s.len() + replaced.saturating_mul(new.len()))?;
            Ok(Value::from(if count < 0 {
                s.replace(&*old, &new)
            } else {
                s.replacen(&*old, &new, replaced)
            }))
        }
        "startswith" => affix_matches(s, &args, name, false),
        "endswith" => affix_matches(s, &args, name, true),
        "find" | "index" => {
            args.check(name, 1, 1)?;
            let sub = str_arg(&args, 0, name)?;
            match s.find(&*sub) {
                Some(byte) => Ok(Value::Int(char_index(s, byte))),
                None if name == "find" => Ok(Value::Int(-1)),
                None => Err(value_error("substring not found")),
            }
        }
        "count" => {
            args.check(name, 1, 1)?;
            let sub = str_arg(&args, 0, name)?;
            let n = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(&*sub).count()
            };
            Ok(Value::Int(n as i64))
        }
        "isdigit" => {
            args.check(name, 0, 0)?;
            char_class(s, |c| c.is_ascii_digit())
        }
        "isalpha" => {
            args.check(name, 0, 0)?;
            char_class(s, char::is_alphabetic)
        }
        "isalnum" => {
            args.check(name, 0, 0)?;
            char_class(s, char::is_alphanumeric)
        }
        "isspace" => {
            args.check(name, 0, 0)?;
            char_class(s, char::is_whitespace)
        }
        "isupper" | "islower" => {
            args.check(name, 0, 0)?;
            cased(s, name == "isupper")
        }
        "title" => {
            args.check(name, 0, 0)?;
            let mut out = String::with_capacity(s.len());
            let mut previous_cased = false;
            for c in s.chars() {
                if previous_cased {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                previous_cased = c.is_alphabetic();
            }
            Ok(Value::from(out))
        }
        "capitalize" => {
            args.check(name, 0, 0)?;
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => {
                    let mut out: String = first.to_uppercase().collect();
                    out.push_str(&chars.as_str().to_lowercase());
                    out
                }
                None => String::new(),
            };
            Ok(Value::from(out))
        }
        "center" => pad(interp, s, &args, name, |extra, width| {
            let left = extra / 2 + (extra & width & 1);
            (left, extra - left)
        }),
        "ljust" => pad(interp, s, &args, name, |extra, _| (0, extra)),
        "rjust" => pad(interp, s, &args, name, |extra, _| (extra, 0)),
        "zfill" => {
            args.check(name, 1, 1)?;
            let width = usize::try_from(int_arg(&args, 0, 0)?).unwrap_or(0);
            let len = s.chars().count();
            if width <= len {
                return Ok(Value::from(s));
            }
            interp.check_len(width)?;
            let (sign, digits) = match s.chars().next() {
                Some(c @ ('+' | '-')) => (Some(c), &s[1..]),
                _ => (None, s),
            };
            let mut out = String::with_capacity(width);
            out.extend(sign);
            out.extend(std::iter::repeat_n('0', width - len));
            out.push_str(digits);
            Ok(Value::from(out))
        }
        _ => Err(Exception::new(
            ExcKind::AttributeError,
            format!("'str' object has no attribute '{name}'"),
        )),
    }
}

/// `index` and `count`, shared by lists and tuples
fn sequence_method(items: &[Value], type_name: &str, name: &str, args: Args) -> Native {
    args.check(name, 1, 1)?;
    let needle = &args.positional[0];
    match name {
        "index" => position(items, needle)?
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| value_error(format!("{} is not in {type_name}", needle.repr()))),
        "count" => {
            let mut count = 0;
            for item in items {
                if item.equals(needle)? {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }
        _ => Err(Exception::new(
            ExcKind::AttributeError,
            format!("'{type_name}' object has no attribute '{name}'"),
        )),
    }
}

fn list_method(interp: &mut Interpreter, receiver: &Value, name: &str, mut args: Args) -> Native {
    let Value::List(list) = receiver else {
        return Err(type_error("descriptor requires a 'list' object"));
    };
    match name {
        "append" => {
            args.check(name, 1, 1)?;
            interp.check_len(list.borrow().len() + 1)?;
            let item = args.positional.remove(0);
            list.borrow_mut().push(item);
            Ok(Value::None)
        }
        "extend" => {
            args.check(name, 1, 1)?;
            let items = interp.collect(&args.positional[0])?;
            interp.check_len(list.borrow().len() + items.len())?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "insert" => {
            args.check(name, 2, 2)?;
            interp.check_len(list.borrow().len() + 1)?;
            let index = int_arg(&args, 0, 0)?;
            let item = args.positional.remove(1);
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, item);
            Ok(Value::None)
        }
        "pop" => {
            args.check(name, 0, 1)?;
            let index = int_arg(&args, 0, -1)?;
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(index_error("pop from empty list"));
            }
            let len = items.len() as i64;
            let at = if index < 0 { index + len } else { index };
            if !(0..len).contains(&at) {
                return Err(index_error("pop index out of range"));
            }
            Ok(items.remove(at as usize))
        }
        "remove" => {
            args.check(name, 1, 1)?;
            let found = position(&list.borrow(), &args.positional[0])?;
            match found {
                Some(i) => {
                    let removed = list.borrow_mut().remove(i);
                    drop(removed);
                    Ok(Value::None)
                }
                None => Err(value_error("list.remove(x): x not in list")),
            }
        }
        "index" | "count" => {
            let items = list.borrow().clone();
            sequence_method(&items, "list", name, args)
        }
        "sort" => {
            let key = args.keyword("key");
            let reverse = args.keyword("reverse").is_some_and(|v| v.truthy());
            args.check(name, 0, 0)?;
            let items = list.borrow().clone();
            let sorted = sort_values(interp, items, key.as_ref(), reverse)?;
            *list.borrow_mut() = sorted;
            Ok(Value::None)
        }
        "reverse" => {
            args.check(name, 0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            args.check(name, 0, 0)?;
            let old = std::mem::take(&mut *list.borrow_mut());
            drop(old);
            Ok(Value::None)
        }
        "copy" => {
            args.check(name, 0, 0)?;
            Ok(Value::list(list.borrow().clone()))
        }
        _ => Err(Exception::new(
            ExcKind::AttributeError,
            format!("'list' object has no attribute '{name}'"),
        )),
    }
}

fn dict_method(interp: &mut Interpreter, receiver: &Value, name: &str, mut args: Args) -> Native {
    let Value::Dict(dict) = receiver else {
        return Err(type_error("descriptor requires a 'dict' object"));
    };
    match name {
        "keys" => {
            args.check(name, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            args.check(name, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            args.check(name, 0, 0)?;
            let items = dict
                .borrow()
                .items()
                .into_iter()
                .map(|(k, v)| Value::tuple(vec![k, v]))
                .collect();
            Ok(Value::list(items))
        }
        "get" => {
            args.check(name, 1, 2)?;
            let found = dict.borrow().get(&args.positional[0])?;
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::None))
        }
        "pop" => {
            args.check(name, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args.positional[0])?;
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Exception::new(ExcKind::KeyError, args.positional[0].repr())),
            }
        }
        "setdefault" => {
            args.check(name, 1, 2)?;
            let key = args.positional[0].clone();
            if let Some(value) = dict.borrow().get(&key)? {
                return Ok(value);
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            interp.check_len(dict.borrow().len() + 1)?;
            dict.borrow_mut().insert(key, default.clone())?;
            Ok(default)
        }
        "update" => {
            let keywords = std::mem::take(&mut args.keywords);
            args.check(name, 0, 1)?;
            let mut pairs = match args.get(0) {
                None => Vec::new(),
                Some(Value::Dict(other)) => other.borrow().items(),
                Some(iterable) => interp
                    .collect(iterable)?
                    .iter()
                    .map(|item| {
                        let mut pair = unpack(item, 2)?.into_iter();
                        match (pair.next(), pair.next()) {
                            (Some(k), Some(v)) => Ok((k, v)),
                            _ => Err(value_error(
                                "dictionary update sequence element has wrong length",
                            )),
                        }
                    })
                    .collect::<Result<Vec<_>, Exception>>()?,
            };
            pairs.extend(keywords.into_iter().map(|(k, v)| (Value::from(k), v)));
            interp.check_len(dict.borrow().len() + pairs.len())?;
            let mut target = dict.borrow_mut();
            for (key, value) in pairs {
                target.insert(key, value)?;
            }
            Ok(Value::None)
        }
        "clear" => {
            args.check(name, 0, 0)?;
            let old = std::mem::take(&mut *dict.borrow_mut());
            drop(old);
            Ok(Value::None)
        }
        "copy" => {
            args.check(name, 0, 0)?;
            let copy: Dict = dict.borrow().clone();
            Ok(Value::dict(copy))
        }
        _ => Err(Exception::new(
            ExcKind::AttributeError,
            format!("'dict' object has no attribute '{name}'"),
        )),
    }
}
