//! Runtime values

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::lang::ast::FunctionDef;
use crate::sandbox::exception::{ExcKind, Exception, type_error};
use crate::sandbox::format::float_repr;
use crate::sandbox::interp::{Interpreter, Scope};

pub type BuiltinFn = fn(&mut Interpreter, Args) -> Result<Value, Exception>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Range(Range),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    BoundMethod(Rc<BoundMethod>),
    Module(Rc<Module>),
    Type(TypeKind),
    ExcType(ExcKind),
    Exception(Rc<Exception>),
}

/// Built-in types that scripts can name, call and test against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Range,
    Function,
    BuiltinFunction,
    Method,
    Module,
    Type,
}

impl TypeKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::NoneType => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Range => "range",
            Self::Function => "function",
            Self::BuiltinFunction => "builtin_function_or_method",
            Self::Method => "method",
            Self::Module => "module",
            Self::Type => "type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let len = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let value = self.start as i128 + index as i128 * self.step as i128;
        i64::try_from(value).ok()
    }

    pub fn contains(&self, value: i64) -> bool {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let value = value as i128;
        let in_bounds = if step > 0 {
            start <= value && value < stop
        } else {
            stop < value && value <= start
        };
        in_bounds && (value - start) % step == 0
    }
}

pub struct Function {
    pub def: Rc<FunctionDef>,
    /// Evaluated default for each parameter that has one
    pub defaults: Vec<Option<Value>>,
    pub closure: Rc<Scope>,
}

pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

pub struct BoundMethod {
    pub receiver: Value,
    pub name: &'static str,
}

pub struct Module {
    pub name: &'static str,
    pub attrs: HashMap<&'static str, Value>,
}

/// Arguments of a native call
#[derive(Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    /// Remove a keyword argument by name
    pub fn keyword(&mut self, name: &str) -> Option<Value> {
        let pos = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(pos).1)
    }

    /// Check arity and that no unexpected keywords are left
    pub fn check(&self, func: &str, min: usize, max: usize) -> Result<(), Exception> {
        if let Some((name, _)) = self.keywords.first() {
            return Err(type_error(format!(
                "{func}() got an unexpected keyword argument '{name}'"
            )));
        }
        let given = self.positional.len();
        if given < min || given > max {
            let expected = if min == max {
                format!("exactly {min}")
            } else if given < min {
                format!("at least {min}")
            } else {
                format!("at most {max}")
            };
            let plural = if expected.ends_with(" 1") { "" } else { "s" };
            return Err(type_error(format!(
                "{func}() takes {expected} argument{plural} ({given} given)"
            )));
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }
}

/// Insertion-ordered dictionary
#[derive(Default, Clone)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: HashMap<HashKey, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, Exception> {
        let hash = key.hash_key()?;
        Ok(self.index.get(&hash).map(|&i| self.entries[i].1.clone()))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, Exception> {
        Ok(self.index.contains_key(&key.hash_key()?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), Exception> {
        let hash = key.hash_key()?;
        match self.index.get(&hash) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, Exception> {
        let hash = key.hash_key()?;
        let Some(i) = self.index.remove(&hash) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        let (key, value) = self.entries.pop()?;
        if let Ok(hash) = key.hash_key() {
            self.index.remove(&hash);
        }
        Some((key, value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.entries.clone()
    }
}

/// Hashable projection of a value, used as a dict key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Type(&'static str),
    Identity(usize),
}

const MAX_REPR_DEPTH: usize = 200;

impl Value {
    pub fn str(text: impl Into<Rc<str>>) -> Self {
        Self::Str(text.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::from(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Self::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Exception(exc) => exc.kind.name(),
            Self::ExcType(_) => "type",
            other => other.type_kind().name(),
        }
    }

    pub fn type_kind(&self) -> TypeKind {
        match self {
            Self::None => TypeKind::NoneType,
            Self::Bool(_) => TypeKind::Bool,
            Self::Int(_) => TypeKind::Int,
            Self::Float(_) => TypeKind::Float,
            Self::Str(_) => TypeKind::Str,
            Self::List(_) => TypeKind::List,
            Self::Tuple(_) => TypeKind::Tuple,
            Self::Dict(_) => TypeKind::Dict,
            Self::Range(_) => TypeKind::Range,
            Self::Function(_) => TypeKind::Function,
            Self::Builtin(_) => TypeKind::BuiltinFunction,
            Self::BoundMethod(_) => TypeKind::Method,
            Self::Module(_) => TypeKind::Module,
            Self::Type(_) | Self::ExcType(_) | Self::Exception(_) => TypeKind::Type,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.borrow().is_empty(),
            Self::Tuple(items) => !items.is_empty(),
            Self::Dict(dict) => !dict.borrow().is_empty(),
            Self::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Function(_)
                | Self::Builtin(_)
                | Self::BoundMethod(_)
                | Self::Type(_)
                | Self::ExcType(_)
        )
    }

    /// Numeric view, with bools counting as integers
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            Self::Bool(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// Text used by `str()` and `print`
    pub fn to_str(&self) -> String {
        match self {
            Self::Str(s) => s.to_string(),
            Self::Exception(exc) => exc.message.clone(),
            other => other.repr(),
        }
    }

    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new());
        out
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<usize>) {
        match self {
            Self::None => out.push_str("None"),
            Self::Bool(true) => out.push_str("True"),
            Self::Bool(false) => out.push_str("False"),
            Self::Int(i) => out.push_str(&i.to_string()),
            Self::Float(f) => out.push_str(&float_repr(*f)),
            Self::Str(s) => out.push_str(&str_repr(s)),
            Self::List(items) => {
                let id = Rc::as_ptr(items) as *const () as usize;
                if seen.contains(&id) || seen.len() > MAX_REPR_DEPTH {
                    out.push_str("[...]");
                    return;
                }
                seen.push(id);
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, seen);
                }
                out.push(']');
                seen.pop();
            }
            Self::Tuple(items) => {
                if seen.len() > MAX_REPR_DEPTH {
                    out.push_str("(...)");
                    return;
                }
                seen.push(0);
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, seen);
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                seen.pop();
            }
            Self::Dict(dict) => {
                let id = Rc::as_ptr(dict) as *const () as usize;
                if seen.contains(&id) || seen.len() > MAX_REPR_DEPTH {
                    out.push_str("{...}");
                    return;
                }
                seen.push(id);
                out.push('{');
                for (i, (key, value)) in dict.borrow().entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, seen);
                    out.push_str(": ");
                    value.write_repr(out, seen);
                }
                out.push('}');
                seen.pop();
            }
            Self::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Self::Function(func) => out.push_str(&format!("<function {}>", func.def.name)),
            Self::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name)),
            Self::BoundMethod(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
            Self::Module(m) => out.push_str(&format!("<module '{}'>", m.name)),
            Self::Type(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
            Self::ExcType(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
            Self::Exception(exc) => {
                out.push_str(exc.kind.name());
                out.push('(');
                if !exc.message.is_empty() {
                    out.push_str(&str_repr(&exc.message));
                }
                out.push(')');
            }
        }
    }

    pub fn hash_key(&self) -> Result<HashKey, Exception> {
        let key = match self {
            Self::None => HashKey::None,
            Self::Bool(b) => HashKey::Int(i64::from(*b)),
            Self::Int(i) => HashKey::Int(*i),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.2e18 {
                    HashKey::Int(*f as i64)
                } else {
                    HashKey::Float(f.to_bits())
                }
            }
            Self::Str(s) => HashKey::Str(s.clone()),
            Self::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(Value::hash_key)
                    .collect::<Result<_, _>>()?,
            ),
            Self::Range(r) => HashKey::Tuple(vec![
                HashKey::Type("range"),
                HashKey::Int(r.start),
                HashKey::Int(r.stop),
                HashKey::Int(r.step),
            ]),
            Self::Type(kind) => HashKey::Type(kind.name()),
            Self::ExcType(kind) => HashKey::Type(kind.name()),
            Self::Function(f) => HashKey::Identity(Rc::as_ptr(f) as *const () as usize),
            Self::Builtin(b) => HashKey::Identity(Rc::as_ptr(b) as *const () as usize),
            Self::Module(m) => HashKey::Identity(Rc::as_ptr(m) as *const () as usize),
            Self::Exception(e) => HashKey::Identity(Rc::as_ptr(e) as *const () as usize),
            Self::List(_) | Self::Dict(_) | Self::BoundMethod(_) => {
                return Err(type_error(format!(
                    "unhashable type: '{}'",
                    self.type_name()
                )));
            }
        };
        Ok(key)
    }

    /// Identity comparison (`is`)
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Tuple(a), Self::Tuple(b)) => Rc::ptr_eq(a, b),
            (Self::Dict(a), Self::Dict(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Builtin(a), Self::Builtin(b)) => Rc::ptr_eq(a, b),
            (Self::Module(a), Self::Module(b)) => Rc::ptr_eq(a, b),
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::ExcType(a), Self::ExcType(b)) => a == b,
            _ => false,
        }
    }

    /// Equality (`==`)
    pub fn equals(&self, other: &Value) -> Result<bool, Exception> {
        self.equals_at(other, 0)
    }

    fn equals_at(&self, other: &Value, depth: usize) -> Result<bool, Exception> {
        if depth > MAX_REPR_DEPTH {
            return Err(comparison_too_deep());
        }
        let equal = match (self, other) {
            (Self::Float(_), _) | (_, Self::Float(_)) => match (self.as_float(), other.as_float())
            {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            (Self::Int(_) | Self::Bool(_), Self::Int(_) | Self::Bool(_)) => {
                self.as_int() == other.as_int()
            }
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                Rc::ptr_eq(a, b) || seq_equal(&a.borrow(), &b.borrow(), depth)?
            }
            (Self::Tuple(a), Self::Tuple(b)) => seq_equal(a, b, depth)?,
            (Self::Dict(a), Self::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let (a, b) = (a.borrow(), b.borrow());
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (key, value) in &a.entries {
                    let Ok(Some(other)) = b.get(key) else {
                        return Ok(false);
                    };
                    if !value.equals_at(&other, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Self::Range(a), Self::Range(b)) => {
                let (la, lb) = (a.len(), b.len());
                la == lb && (la == 0 || (a.start == b.start && (la == 1 || a.step == b.step)))
            }
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            (Self::BoundMethod(a), Self::BoundMethod(b)) => {
                a.name == b.name && a.receiver.is(&b.receiver)
            }
            _ => self.is(other),
        };
        Ok(equal)
    }

    /// Ordering for `<`, `<=`, `>`, `>=`; `None` when unordered (NaN)
    pub fn compare(&self, other: &Value, op: &str) -> Result<Option<Ordering>, Exception> {
        self.compare_at(other, op, 0)
    }

    fn compare_at(
        &self,
        other: &Value,
        op: &str,
        depth: usize,
    ) -> Result<Option<Ordering>, Exception> {
        if depth > MAX_REPR_DEPTH {
            return Err(comparison_too_deep());
        }
        match (self, other) {
            (Self::Int(_) | Self::Bool(_), Self::Int(_) | Self::Bool(_)) => {
                Ok(self.as_int().cmp(&other.as_int()).into())
            }
            (
                Self::Int(_) | Self::Bool(_) | Self::Float(_),
                Self::Int(_) | Self::Bool(_) | Self::Float(_),
            ) => {
                let (a, b) = (self.as_float(), other.as_float());
                Ok(a.partial_cmp(&b))
            }
            (Self::Str(a), Self::Str(b)) => Ok(Some(a.cmp(b))),
            (Self::List(a), Self::List(b)) => seq_compare(&a.borrow(), &b.borrow(), op, depth),
            (Self::Tuple(a), Self::Tuple(b)) => seq_compare(a, b, op, depth),
            _ => Err(type_error(format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                self.type_name(),
                other.type_name()
            ))),
        }
    }
}

fn comparison_too_deep() -> Exception {
    Exception::new(
        ExcKind::RecursionError,
        "maximum recursion depth exceeded in comparison",
    )
}

fn seq_equal(a: &[Value], b: &[Value], depth: usize) -> Result<bool, Exception> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b) {
        if !x.equals_at(y, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seq_compare(
    a: &[Value],
    b: &[Value],
    op: &str,
    depth: usize,
) -> Result<Option<Ordering>, Exception> {
    for (x, y) in a.iter().zip(b) {
        if !x.equals_at(y, depth + 1)? {
            return x.compare_at(y, op, depth + 1);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

/// Quote a string the way `repr` does
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Rc::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_of_containers() {
        let value = Value::list(vec![
            Value::Int(1),
            Value::from("a"),
            Value::tuple(vec![Value::None]),
        ]);
        assert_eq!(value.repr(), "[1, 'a', (None,)]");
    }

    #[test]
    fn repr_of_self_referencing_list() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[1, [...]]");
        if let Value::List(items) = &list {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn str_repr_picks_quotes() {
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
        assert_eq!(str_repr("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(Value::Int(1).equals(&Value::Float(1.0)).unwrap());
        assert!(Value::Bool(true).equals(&Value::Int(1)).unwrap());
        assert!(!Value::Int(1).equals(&Value::from("1")).unwrap());
    }

    #[test]
    fn dict_keeps_insertion_order_and_unifies_numeric_keys() {
        let mut dict = Dict::new();
        dict.insert(Value::from("b"), Value::Int(1)).unwrap();
        dict.insert(Value::from("a"), Value::Int(2)).unwrap();
        dict.insert(Value::Int(1), Value::Int(3)).unwrap();
        dict.insert(Value::Bool(true), Value::Int(4)).unwrap();
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.get(&Value::Float(1.0)).unwrap().unwrap().repr(), "4");
        dict.remove(&Value::from("b")).unwrap();
        assert_eq!(Value::dict(dict).repr(), "{'a': 2, 1: 4}");
    }

    #[test]
    fn lists_are_unhashable() {
        let err = Value::list(vec![]).hash_key().unwrap_err();
        assert_eq!(err.kind, ExcKind::TypeError);
        assert!(err.message.contains("unhashable type: 'list'"));
    }

    #[test]
    fn range_len_and_contains() {
        let r = Range {
            start: 10,
            stop: 0,
            step: -3,
        };
        assert_eq!(r.len(), 4);
        assert_eq!(r.get(3), Some(1));
        assert!(r.contains(4));
        assert!(!r.contains(5));
    }

    #[test]
    fn mixed_comparison_is_type_error() {
        let err = Value::Int(1).compare(&Value::from("a"), "<").unwrap_err();
        assert_eq!(err.kind, ExcKind::TypeError);
    }
}
