//! Importable modules
//!
//! A module is built fresh for every execution that imports it, so
//! nothing a script does to module state outlives the run.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::lang::ast::BinOp;
use crate::sandbox::builtins::sort_values;
use crate::sandbox::exception::{
    ExcKind, Exception, index_error, overflow, type_error, value_error,
};
use crate::sandbox::interp::Interpreter;
use crate::sandbox::value::{Args, Builtin, BuiltinFn, Module, Range, Value};

type Native = Result<Value, Exception>;

const KNOWN: [&str; 4] = ["math", "random", "string", "statistics"];

/// Whether a module of this name exists at all
pub fn is_known(name: &str) -> bool {
    KNOWN.contains(&name)
}

/// Build a module by name
pub fn load(name: &str) -> Option<Module> {
    match name {
        "math" => Some(math()),
        "random" => Some(random()),
        "string" => Some(string()),
        "statistics" => Some(statistics()),
        _ => None,
    }
}

fn module(
    name: &'static str,
    functions: &[(&'static str, BuiltinFn)],
    constants: Vec<(&'static str, Value)>,
) -> Module {
    let mut attrs: HashMap<&'static str, Value> = functions
        .iter()
        .map(|&(name, func)| (name, Value::Builtin(Rc::new(Builtin { name, func }))))
        .collect();
    attrs.extend(constants);
    Module { name, attrs }
}

fn domain_error() -> Exception {
    value_error("math domain error")
}

fn range_error() -> Exception {
    Exception::new(ExcKind::OverflowError, "math range error")
}

fn real(value: &Value) -> Result<f64, Exception> {
    value.as_float().ok_or_else(|| {
        type_error(format!(
            "must be real number, not {}",
            value.type_name()
        ))
    })
}

fn integer(value: &Value) -> Result<i64, Exception> {
    value.as_int().ok_or_else(|| {
        type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

/// Apply a one-argument float function, checking domain and range
fn unary(args: &Args, name: &str, f: fn(f64) -> f64) -> Native {
    args.check(name, 1, 1)?;
    let x = real(&args.positional[0])?;
    let y = f(x);
    if y.is_nan() && !x.is_nan() {
        return Err(domain_error());
    }
    if y.is_infinite() && x.is_finite() {
        return Err(range_error());
    }
    Ok(Value::Float(y))
}

fn to_int(f: f64) -> Native {
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
    Ok(Value::Int(f as i64))
}

fn rounding(args: &Args, name: &str, f: fn(f64) -> f64) -> Native {
    args.check(name, 1, 1)?;
    match &args.positional[0] {
        Value::Float(x) => to_int(f(*x)),
        other => integer(other).map(Value::Int),
    }
}

fn math() -> Module {
    module(
        "math",
        &[
            ("sqrt", |_, a| unary(&a, "sqrt", f64::sqrt)),
            ("exp", |_, a| unary(&a, "exp", f64::exp)),
            ("log", math_log),
            ("log2", |_, a| positive_log(&a, "log2", f64::log2)),
            ("log10", |_, a| positive_log(&a, "log10", f64::log10)),
            ("sin", |_, a| unary(&a, "sin", f64::sin)),
            ("cos", |_, a| unary(&a, "cos", f64::cos)),
            ("tan", |_, a| unary(&a, "tan", f64::tan)),
            ("asin", |_, a| unary(&a, "asin", f64::asin)),
            ("acos", |_, a| unary(&a, "acos", f64::acos)),
            ("atan", |_, a| unary(&a, "atan", f64::atan)),
            ("atan2", math_atan2),
            ("hypot", math_hypot),
            ("fabs", |_, a| unary(&a, "fabs", f64::abs)),
            ("degrees", |_, a| unary(&a, "degrees", f64::to_degrees)),
            ("radians", |_, a| unary(&a, "radians", f64::to_radians)),
            ("floor", |_, a| rounding(&a, "floor", f64::floor)),
            ("ceil", |_, a| rounding(&a, "ceil", f64::ceil)),
            ("trunc", |_, a| rounding(&a, "trunc", f64::trunc)),
            ("pow", math_pow),
            ("fmod", math_fmod),
            ("copysign", math_copysign),
            ("factorial", math_factorial),
            ("gcd", math_gcd),
            ("lcm", math_lcm),
            ("isqrt", math_isqrt),
            ("comb", math_comb),
            ("perm", math_perm),
            ("isclose", math_isclose),
            ("isfinite", |_, a| float_predicate(&a, "isfinite", f64::is_finite)),
            ("isinf", |_, a| float_predicate(&a, "isinf", f64::is_infinite)),
            ("isnan", |_, a| float_predicate(&a, "isnan", f64::is_nan)),
            ("fsum", math_fsum),
            ("prod", math_prod),
        ],
        vec![
            ("pi", Value::Float(std::f64::consts::PI)),
            ("e", Value::Float(std::f64::consts::E)),
            ("tau", Value::Float(std::f64::consts::TAU)),
            ("inf", Value::Float(f64::INFINITY)),
            ("nan", Value::Float(f64::NAN)),
        ],
    )
}

fn positive_log(args: &Args, name: &str, f: fn(f64) -> f64) -> Native {
    args.check(name, 1, 1)?;
    let x = real(&args.positional[0])?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(f(x)))
}

fn math_log(_: &mut Interpreter, args: Args) -> Native {
    args.check("log", 1, 2)?;
    let x = real(&args.positional[0])?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        None => Ok(Value::Float(x.ln())),
        Some(base) => {
            let base = real(base)?;
            if base <= 0.0 {
                return Err(domain_error());
            }
            if base == 1.0 {
                return Err(Exception::new(
                    ExcKind::ZeroDivisionError,
                    "float division by zero",
                ));
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
    }
}

fn two_reals(args: &Args, name: &str) -> Result<(f64, f64), Exception> {
    args.check(name, 2, 2)?;
    Ok((real(&args.positional[0])?, real(&args.positional[1])?))
}

fn math_atan2(_: &mut Interpreter, args: Args) -> Native {
    let (y, x) = two_reals(&args, "atan2")?;
    Ok(Value::Float(y.atan2(x)))
}

fn math_hypot(_: &mut Interpreter, args: Args) -> Native {
    args.check("hypot", 0, usize::MAX)?;
    let mut sum: f64 = 0.0;
    for value in &args.positional {
        let x = real(value)?;
        sum += x * x;
    }
    Ok(Value::Float(sum.sqrt()))
}

fn math_pow(_: &mut Interpreter, args: Args) -> Native {
    let (x, y) = two_reals(&args, "pow")?;
    if x == 0.0 && y < 0.0 {
        return Err(domain_error());
    }
    let result = x.powf(y);
    if result.is_nan() && !x.is_nan() && !y.is_nan() {
        return Err(domain_error());
    }
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(range_error());
    }
    Ok(Value::Float(result))
}

fn math_fmod(_: &mut Interpreter, args: Args) -> Native {
    let (x, y) = two_reals(&args, "fmod")?;
    if y == 0.0 || x.is_infinite() {
        return Err(domain_error());
    }
    Ok(Value::Float(x % y))
}

fn math_copysign(_: &mut Interpreter, args: Args) -> Native {
    let (x, y) = two_reals(&args, "copysign")?;
    Ok(Value::Float(x.copysign(y)))
}

fn math_factorial(_: &mut Interpreter, args: Args) -> Native {
    args.check("factorial", 1, 1)?;
    let n = integer(&args.positional[0])?;
    if n < 0 {
        return Err(value_error("factorial() not defined for negative values"));
    }
    (2..=n)
        .try_fold(1i64, |acc, k| acc.checked_mul(k))
        .map(Value::Int)
        .ok_or_else(overflow)
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a.wrapping_rem(b));
    }
    a.wrapping_abs()
}

fn math_gcd(_: &mut Interpreter, args: Args) -> Native {
    args.check("gcd", 0, usize::MAX)?;
    let mut result = 0;
    for value in &args.positional {
        result = gcd(result, integer(value)?);
    }
    Ok(Value::Int(result))
}

fn math_lcm(_: &mut Interpreter, args: Args) -> Native {
    args.check("lcm", 0, usize::MAX)?;
    let mut result: i64 = 1;
    for value in &args.positional {
        let n = integer(value)?;
        if n == 0 || result == 0 {
            result = 0;
            continue;
        }
        result = (result / gcd(result, n))
            .checked_mul(n)
            .map(i64::abs)
            .ok_or_else(overflow)?;
    }
    Ok(Value::Int(result))
}

fn math_isqrt(_: &mut Interpreter, args: Args) -> Native {
    args.check("isqrt", 1, 1)?;
    let n = integer(&args.positional[0])?;
    if n < 0 {
        return Err(value_error("isqrt() argument must be nonnegative"));
    }
    Ok(Value::Int(n.isqrt()))
}

fn comb_perm(args: &Args, name: &str, choose: bool) -> Native {
    args.check(name, 1, 2)?;
    let n = integer(&args.positional[0])?;
    let k = match args.get(1) {
        Some(k) => integer(k)?,
        None if !choose => n,
        None => return Err(type_error("comb() missing required argument 'k'")),
    };
    if n < 0 || k < 0 {
        return Err(value_error(format!("{name}() arguments must be non-negative")));
    }
    if k > n {
        return Ok(Value::Int(0));
    }
    let k = if choose { k.min(n - k) } else { k };
    let mut result: i128 = 1;
    for i in 0..k {
        result *= i128::from(n - i);
        if choose {
            result /= i128::from(i + 1);
        }
        if result > i128::from(i64::MAX) {
            return Err(overflow());
        }
    }
    i64::try_from(result).map(Value::Int).map_err(|_| overflow())
}

fn math_comb(_: &mut Interpreter, args: Args) -> Native {
    comb_perm(&args, "comb", true)
}

fn math_perm(_: &mut Interpreter, args: Args) -> Native {
    comb_perm(&args, "perm", false)
}

fn math_isclose(_: &mut Interpreter, mut args: Args) -> Native {
    let rel_tol = args.keyword("rel_tol").map(|v| real(&v)).transpose()?.unwrap_or(1e-9);
    let abs_tol = args.keyword("abs_tol").map(|v| real(&v)).transpose()?.unwrap_or(0.0);
    let (a, b) = two_reals(&args, "isclose")?;
    if rel_tol < 0.0 || abs_tol < 0.0 {
        return Err(value_error("tolerances must be non-negative"));
    }
    if a == b {
        return Ok(Value::Bool(true));
    }
    if a.is_infinite() || b.is_infinite() {
        return Ok(Value::Bool(false));
    }
    let diff = (a - b).abs();
    Ok(Value::Bool(
        diff <= (rel_tol * b.abs()).max(rel_tol * a.abs()).max(abs_tol),
    ))
}

fn float_predicate(args: &Args, name: &str, f: fn(f64) -> bool) -> Native {
    args.check(name, 1, 1)?;
    Ok(Value::Bool(f(real(&args.positional[0])?)))
}

fn math_fsum(interp: &mut Interpreter, args: Args) -> Native {
    args.check("fsum", 1, 1)?;
    // Kahan-Babuska summation
    let mut sum: f64 = 0.0;
    let mut compensation: f64 = 0.0;
    for value in interp.collect(&args.positional[0])? {
        let x = real(&value)?;
        let t = sum + x;
        if sum.abs() >= x.abs() {
            compensation += (sum - t) + x;
        } else {
            compensation += (x - t) + sum;
        }
        sum = t;
    }
    Ok(Value::Float(sum + compensation))
}

fn math_prod(interp: &mut Interpreter, mut args: Args) -> Native {
    let start = args.keyword("start").unwrap_or(Value::Int(1));
    args.check("prod", 1, 1)?;
    let mut product = start;
    for value in interp.collect(&args.positional[0])? {
        product = interp.binary(BinOp::Mul, product, value)?;
    }
    Ok(product)
}

fn random() -> Module {
    module(
        "random",
        &[
            ("random", random_random),
            ("randint", random_randint),
            ("randrange", random_randrange),
            ("uniform", random_uniform),
            ("choice", random_choice),
            ("shuffle", random_shuffle),
            ("seed", random_seed),
        ],
        Vec::new(),
    )
}

fn random_random(interp: &mut Interpreter, args: Args) -> Native {
    args.check("random", 0, 0)?;
    Ok(Value::Float(interp.rng().r#gen::<f64>()))
}

fn random_randint(interp: &mut Interpreter, args: Args) -> Native {
    args.check("randint", 2, 2)?;
    let (a, b) = (integer(&args.positional[0])?, integer(&args.positional[1])?);
    if a > b {
        return Err(value_error(format!("empty range for randint({a}, {b})")));
    }
    Ok(Value::Int(interp.rng().gen_range(a..=b)))
}

fn random_randrange(interp: &mut Interpreter, args: Args) -> Native {
    args.check("randrange", 1, 3)?;
    let ints = args
        .positional
        .iter()
        .map(integer)
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step, ..] => (*start, *stop, *step),
        [] => return Err(type_error("randrange() missing required argument 'start'")),
    };
    if step == 0 {
        return Err(value_error("zero step for randrange()"));
    }
    let range = Range { start, stop, step };
    let len = range.len();
    if len == 0 {
        return Err(value_error(format!(
            "empty range for randrange({start}, {stop}, {step})"
        )));
    }
    let index = interp.rng().gen_range(0..len);
    range.get(index).map(Value::Int).ok_or_else(overflow)
}

fn random_uniform(interp: &mut Interpreter, args: Args) -> Native {
    let (a, b) = two_reals(&args, "uniform")?;
    let t: f64 = interp.rng().r#gen();
    Ok(Value::Float(a + (b - a) * t))
}

fn random_choice(interp: &mut Interpreter, args: Args) -> Native {
    args.check("choice", 1, 1)?;
    let items = interp.collect(&args.positional[0])?;
    if items.is_empty() {
        return Err(index_error("Cannot choose from an empty sequence"));
    }
    let index = interp.rng().gen_range(0..items.len());
    Ok(items[index].clone())
}

fn random_shuffle(interp: &mut Interpreter, args: Args) -> Native {
    args.check("shuffle", 1, 1)?;
    let Value::List(list) = &args.positional[0] else {
        return Err(type_error(format!(
            "'{}' object does not support item assignment",
            args.positional[0].type_name()
        )));
    };
    let mut items = std::mem::take(&mut *list.borrow_mut());
    items.shuffle(interp.rng());
    *list.borrow_mut() = items;
    Ok(Value::None)
}

fn random_seed(interp: &mut Interpreter, args: Args) -> Native {
    args.check("seed", 0, 1)?;
    let rng = match args.get(0) {
        None | Some(Value::None) => StdRng::from_entropy(),
        Some(Value::Int(n)) => StdRng::seed_from_u64(*n as u64),
        Some(other) => {
            let key = other.hash_key()?;
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            StdRng::seed_from_u64(hasher.finish())
        }
    };
    interp.reseed(rng);
    Ok(Value::None)
}

fn string() -> Module {
    let lowercase = "abcdefghijklmnopqrstuvwxyz";
    let uppercase = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let digits = "0123456789";
    let punctuation = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;
    let whitespace = " \t\n\r\x0b\x0c";
    module(
        "string",
        &[],
        vec![
            ("ascii_lowercase", Value::from(lowercase)),
            ("ascii_uppercase", Value::from(uppercase)),
            ("ascii_letters", Value::from(format!("{lowercase}{uppercase}"))),
            ("digits", Value::from(digits)),
            ("hexdigits", Value::from("0123456789abcdefABCDEF")),
            ("octdigits", Value::from("01234567")),
            ("punctuation", Value::from(punctuation)),
            ("whitespace", Value::from(whitespace)),
            (
                "printable",
                Value::from(format!(
                    "{digits}{lowercase}{uppercase}{punctuation}{whitespace}"
                )),
            ),
        ],
    )
}

fn statistics() -> Module {
    module(
        "statistics",
        &[
            ("mean", stats_mean),
            ("fmean", stats_fmean),
            ("median", stats_median),
            ("mode", stats_mode),
            ("pstdev", |i, a| spread(i, a, "pstdev", false, true)),
            ("stdev", |i, a| spread(i, a, "stdev", true, true)),
            ("pvariance", |i, a| spread(i, a, "pvariance", false, false)),
            ("variance", |i, a| spread(i, a, "variance", true, false)),
        ],
        Vec::new(),
    )
}

fn data(
    interp: &mut Interpreter,
    args: &Args,
    name: &str,
    min: usize,
) -> Result<Vec<Value>, Exception> {
    args.check(name, 1, 1)?;
    let items = interp.collect(&args.positional[0])?;
    if items.len() < min {
        let what = if min == 1 {
            "at least one data point"
        } else {
            "at least two data points"
        };
        return Err(value_error(format!("{name} requires {what}")));
    }
    Ok(items)
}

fn reals(items: &[Value]) -> Result<Vec<f64>, Exception> {
    items.iter().map(real).collect()
}

fn stats_mean(interp: &mut Interpreter, args: Args) -> Native {
    let items = data(interp, &args, "mean", 1)?;
    let n = items.len() as i64;
    if items.iter().all(|v| matches!(v, Value::Int(_) | Value::Bool(_))) {
        let total = items
            .iter()
            .try_fold(0i64, |acc, v| acc.checked_add(v.as_int().unwrap_or_default()));
        if let Some(total) = total
            && total % n == 0
        {
            return Ok(Value::Int(total / n));
        }
    }
    let values = reals(&items)?;
    Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
}

fn stats_fmean(interp: &mut Interpreter, args: Args) -> Native {
    let values = reals(&data(interp, &args, "fmean", 1)?)?;
    Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
}

fn stats_median(interp: &mut Interpreter, args: Args) -> Native {
    let items = data(interp, &args, "median", 1)?;
    let values = sort_values(interp, items, None, false)?;
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        return Ok(values[mid].clone());
    }
    let (a, b) = (real(&values[mid - 1])?, real(&values[mid])?);
    Ok(Value::Float((a + b) / 2.0))
}

fn stats_mode(interp: &mut Interpreter, args: Args) -> Native {
    let items = data(interp, &args, "mode", 1)?;
    let mut counts: Vec<(Value, usize)> = Vec::new();
    for item in items {
        item.hash_key()?;
        let mut found = None;
        for (i, (seen, _)) in counts.iter().enumerate() {
            if seen.equals(&item)? {
                found = Some(i);
                break;
            }
        }
        match found {
            Some(i) => counts[i].1 += 1,
            None => counts.push((item, 1)),
        }
    }
    let best = counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
    counts
        .into_iter()
        .find(|(_, count)| *count == best)
        .map(|(value, _)| value)
        .ok_or_else(|| value_error("no mode for empty data"))
}

fn spread(interp: &mut Interpreter, args: Args, name: &str, sample: bool, root: bool) -> Native {
    let values = reals(&data(interp, &args, name, if sample { 2 } else { 1 })?)?;
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let squares: f64 = values.iter().map(|x| (x - mean) * (x - mean)).sum();
    let variance = squares / if sample { n - 1.0 } else { n };
    Ok(Value::Float(if root { variance.sqrt() } else { variance }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_modules_load() {
        for name in KNOWN {
            assert!(is_known(name));
            assert_eq!(load(name).unwrap().name, name);
        }
        assert!(!is_known("os"));
        assert!(load("os").is_none());
    }

    #[test]
    fn math_constants_and_functions() {
        let math = load("math").unwrap();
        assert!(matches!(math.attrs["pi"], Value::Float(p) if p == std::f64::consts::PI));
        assert!(math.attrs["sqrt"].is_callable());
        assert!(!math.attrs.contains_key("system"));
    }

    #[test]
    fn string_constants() {
        let string = load("string").unwrap();
        assert_eq!(string.attrs["digits"].to_str(), "0123456789");
        assert_eq!(string.attrs["ascii_letters"].to_str().len(), 52);
        assert_eq!(string.attrs["punctuation"].to_str().len(), 32);
    }

    #[test]
    fn gcd_handles_signs() {
        assert_eq!(gcd(12, -18), 6);
        assert_eq!(gcd(0, 5), 5);
        assert_eq!(gcd(0, 0), 0);
    }
}
