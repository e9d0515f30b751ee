//! Guarded attribute access and iteration
//!
//! Every attribute lookup a script performs is first put to an
//! [`AccessGate`]. Iteration and unpacking go through [`guarded_iter`] and
//! [`unpack`], which only understand built-in iterables.

use std::cell::RefCell;
use std::rc::Rc;

use crate::sandbox::exception::{Exception, memory_error, type_error, value_error};
use crate::sandbox::value::{Range, Value};

/// Outcome of an access check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied(String),
}

/// Decides whether a script may read an attribute of a value
pub trait AccessGate {
    fn check(&self, object: &Value, name: &str) -> Access;
}

/// Denies private and dunder names and the string formatting methods,
/// which can reach attributes without passing through the gate.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultGate;

impl AccessGate for DefaultGate {
    fn check(&self, object: &Value, name: &str) -> Access {
        if name.starts_with('_') {
            return Access::Denied(format!(
                "access to attribute '{name}' is not allowed"
            ));
        }
        if matches!(object, Value::Str(_)) && matches!(name, "format" | "format_map") {
            return Access::Denied(format!("str.{name} is not allowed"));
        }
        Access::Allowed
    }
}

impl<F> AccessGate for F
where
    F: Fn(&Value, &str) -> Access,
{
    fn check(&self, object: &Value, name: &str) -> Access {
        self(object, name)
    }
}

/// Iterator over a built-in iterable
pub enum ValueIter {
    Range { range: Range, index: usize },
    List { list: Rc<RefCell<Vec<Value>>>, index: usize },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Self::Range { range, index } => {
                let value = range.get(*index)?;
                *index += 1;
                Some(Value::Int(value))
            }
            // Reads the live list so appends during a loop are seen
            Self::List { list, index } => {
                let value = list.borrow().get(*index).cloned()?;
                *index += 1;
                Some(value)
            }
            Self::Items(items) => items.next(),
        }
    }
}

/// Start iterating over a value
pub fn guarded_iter(value: &Value) -> Result<ValueIter, Exception> {
    let iter = match value {
        Value::Range(range) => ValueIter::Range {
            range: *range,
            index: 0,
        },
        Value::List(list) => ValueIter::List {
            list: list.clone(),
            index: 0,
        },
        Value::Tuple(items) => ValueIter::Items(items.to_vec().into_iter()),
        Value::Str(s) => ValueIter::Items(
            s.chars()
                .map(|c| Value::from(c.to_string()))
                .collect::<Vec<_>>()
                .into_iter(),
        ),
        Value::Dict(dict) => ValueIter::Items(dict.borrow().keys().into_iter()),
        other => {
            return Err(type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )));
        }
    };
    Ok(iter)
}

/// Materialise an iterable, refusing more than `limit` items
pub fn collect(value: &Value, limit: usize) -> Result<Vec<Value>, Exception> {
    if let Value::Range(range) = value
        && range.len() > limit
    {
        return Err(memory_error(format!(
            "sequence of {} items exceeds the limit of {limit}",
            range.len()
        )));
    }
    let mut items = Vec::new();
    for item in guarded_iter(value)? {
        if items.len() >= limit {
            return Err(memory_error(format!(
                "sequence exceeds the limit of {limit} items"
            )));
        }
        items.push(item);
    }
    Ok(items)
}

/// Unpack an iterable into exactly `count` values
pub fn unpack(value: &Value, count: usize) -> Result<Vec<Value>, Exception> {
    let mut items = Vec::with_capacity(count);
    for item in guarded_iter(value)? {
        if items.len() == count {
            return Err(value_error(format!(
                "too many values to unpack (expected {count})"
            )));
        }
        items.push(item);
    }
    if items.len() < count {
        return Err(value_error(format!(
            "not enough values to unpack (expected {count}, got {})",
            items.len()
        )));
    }
    Ok(items)
}
