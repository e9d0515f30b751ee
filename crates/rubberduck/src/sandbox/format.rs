//! Number rendering, format specs and `%`-formatting

use crate::sandbox::exception::{ExcKind, Exception, type_error, value_error};
use crate::sandbox::value::{Value, str_repr};

/// Widest field a format spec may request
const MAX_WIDTH: usize = 100_000;

/// Shortest round-tripping text for a float, with the usual exponent rules
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_owned();
    }

    let sci = format!("{value:e}");
    let (mantissa, exp) = split_exponent(&sci);
    if !(-4..16).contains(&exp) {
        return format!("{mantissa}e{}", exponent_suffix(exp));
    }
    let plain = format!("{value}");
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

fn split_exponent(sci: &str) -> (&str, i32) {
    match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse().unwrap_or(0)),
        None => (sci, 0),
    }
}

fn exponent_suffix(exp: i32) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{sign}{:02}", exp.abs())
}

/// Scientific notation with a fixed number of digits after the point
fn format_exp(value: f64, precision: usize, upper: bool) -> String {
    let sci = format!("{value:.precision$e}");
    let (mantissa, exp) = split_exponent(&sci);
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{}", exponent_suffix(exp))
}

/// The `g` presentation type
fn format_general(value: f64, precision: usize, alternate: bool, upper: bool) -> String {
    if !value.is_finite() {
        return finite_or_special(value, upper);
    }
    let precision = precision.max(1);
    let exp = if value == 0.0 {
        0
    } else {
        let sci = format!("{value:.prec$e}", prec = precision - 1);
        split_exponent(&sci).1
    };
    let mut text = if exp >= -4 && exp < precision as i32 {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        format!("{value:.decimals$}")
    } else {
        format_exp(value, precision - 1, upper)
    };
    if !alternate {
        text = strip_trailing_zeros(&text);
    }
    text
}

fn strip_trailing_zeros(text: &str) -> String {
    let (number, exp) = match text.find(['e', 'E']) {
        Some(i) => text.split_at(i),
        None => (text, ""),
    };
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    format!("{number}{exp}")
}

fn finite_or_special(value: f64, upper: bool) -> String {
    let text = if value.is_nan() {
        "nan"
    } else if value > 0.0 {
        "inf"
    } else {
        "-inf"
    };
    if upper {
        text.to_uppercase()
    } else {
        text.to_owned()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<Spec, Exception> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().is_some_and(|&c| is_align(c)) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i)
        && matches!(c, '+' | '-' | ' ')
    {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        out.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        let digits: String = chars[start..i].iter().collect();
        out.width = digits
            .parse()
            .ok()
            .filter(|w| *w <= MAX_WIDTH)
            .ok_or_else(|| value_error("too many decimal digits in format string"))?;
    }
    if let Some(&c) = chars.get(i)
        && matches!(c, ',' | '_')
    {
        out.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i == start {
            return Err(value_error("format specifier missing precision"));
        }
        let digits: String = chars[start..i].iter().collect();
        out.precision = Some(
            digits
                .parse()
                .ok()
                .filter(|p| *p <= MAX_WIDTH)
                .ok_or_else(|| value_error("too many decimal digits in format string"))?,
        );
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(value_error("invalid format specifier"));
    }
    Ok(out)
}

fn group_digits(digits: &str, separator: char) -> String {
    let (int_part, rest) = match digits.find('.') {
        Some(i) => digits.split_at(i),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(c);
    }
    grouped + rest
}

fn pad(body: String, sign: &str, spec: &Spec, default_align: char) -> String {
    let len = body.chars().count() + sign.chars().count();
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let padding = spec.width - len;
    let (fill, align) = if spec.zero && spec.align.is_none() {
        ('0', '=')
    } else {
        (
            spec.fill.unwrap_or(' '),
            spec.align.unwrap_or(default_align),
        )
    };
    let fill_str = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    match align {
        '<' => format!("{sign}{body}{}", fill_str(padding)),
        '^' => format!(
            "{}{sign}{body}{}",
            fill_str(padding / 2),
            fill_str(padding - padding / 2)
        ),
        '=' => format!("{sign}{}{body}", fill_str(padding)),
        _ => format!("{}{sign}{body}", fill_str(padding)),
    }
}

fn sign_prefix(negative: bool, spec: &Spec) -> &'static str {
    match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    }
}

/// Apply a format spec (`format(value, spec)` and f-string fields)
pub fn format_value(value: &Value, spec: &str) -> Result<String, Exception> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let spec = parse_spec(spec)?;
    match value {
        Value::Str(s) => {
            if !matches!(spec.kind, None | Some('s')) {
                return Err(value_error(format!(
                    "Unknown format code '{}' for object of type 'str'",
                    spec.kind.unwrap_or('s')
                )));
            }
            let mut text: String = s.to_string();
            if let Some(precision) = spec.precision {
                text = text.chars().take(precision).collect();
            }
            Ok(pad(text, "", &spec, '<'))
        }
        Value::Int(_) | Value::Bool(_) if !matches!(spec.kind, Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%')) => {
            let n = value.as_int().unwrap_or_default();
            let magnitude = n.unsigned_abs();
            let digits = match spec.kind {
                None | Some('d') | Some('n') => magnitude.to_string(),
                Some('b') => format!("{magnitude:b}"),
                Some('o') => format!("{magnitude:o}"),
                Some('x') => format!("{magnitude:x}"),
                Some('X') => format!("{magnitude:X}"),
                Some('c') => {
                    let c = u32::try_from(n)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| value_error("%c arg not in range(0x110000)"))?;
                    return Ok(pad(c.to_string(), "", &spec, '<'));
                }
                Some(other) => {
                    return Err(value_error(format!(
                        "Unknown format code '{other}' for object of type 'int'"
                    )));
                }
            };
            let digits = match spec.grouping {
                Some(sep) => group_digits(&digits, sep),
                None => digits,
            };
            let prefix = match (spec.alternate, spec.kind) {
                (true, Some('b')) => "0b",
                (true, Some('o')) => "0o",
                (true, Some('x')) => "0x",
                (true, Some('X')) => "0X",
                _ => "",
            };
            let sign = format!("{}{prefix}", sign_prefix(n < 0, &spec));
            Ok(pad(digits, &sign, &spec, '>'))
        }
        Value::Int(_) | Value::Bool(_) | Value::Float(_) => {
            let f = value.as_float().unwrap_or_default();
            let magnitude = f.abs();
            let upper = matches!(spec.kind, Some('E' | 'F' | 'G'));
            let body = if !magnitude.is_finite() {
                finite_or_special(magnitude, upper)
            } else {
                match spec.kind {
                    Some('f' | 'F') => {
                        let p = spec.precision.unwrap_or(6);
                        format!("{magnitude:.p$}")
                    }
                    Some('e' | 'E') => format_exp(magnitude, spec.precision.unwrap_or(6), upper),
                    Some('g' | 'G') => format_general(
                        magnitude,
                        spec.precision.unwrap_or(6),
                        spec.alternate,
                        upper,
                    ),
                    Some('%') => {
                        let p = spec.precision.unwrap_or(6);
                        format!("{:.p$}%", magnitude * 100.0)
                    }
                    None | Some('n') => match spec.precision {
                        Some(p) => format_general(magnitude, p, spec.alternate, false),
                        None => float_repr(magnitude),
                    },
                    Some(other) => {
                        return Err(value_error(format!(
                            "Unknown format code '{other}' for object of type 'float'"
                        )));
                    }
                }
            };
            let body = match spec.grouping {
                Some(sep) if magnitude.is_finite() => group_digits(&body, sep),
                _ => body,
            };
            let negative = f.is_sign_negative() && !f.is_nan();
            Ok(pad(body, sign_prefix(negative, &spec), &spec, '>'))
        }
        other => {
            if spec.kind.is_some() || spec.precision.is_some() {
                return Err(type_error(format!(
                    "unsupported format string passed to {}.__format__",
                    other.type_name()
                )));
            }
            Ok(pad(other.to_str(), "", &spec, '<'))
        }
    }
}

/// `format % args`
pub fn percent_format(template: &str, args: &Value) -> Result<String, Exception> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mapping = match args {
        Value::Dict(dict) => Some(dict.clone()),
        _ => None,
    };

    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut next = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut keyed: Option<Value> = None;
        if chars.get(i) == Some(&'(') {
            let close = chars[i..]
                .iter()
                .position(|&c| c == ')')
                .ok_or_else(|| value_error("incomplete format key"))?;
            let key: String = chars[i + 1..i + close].iter().collect();
            i += close + 1;
            let dict = mapping
                .as_ref()
                .ok_or_else(|| type_error("format requires a mapping"))?;
            let value = dict.borrow().get(&Value::from(key.as_str()))?;
            keyed = Some(value.ok_or_else(|| Exception::new(ExcKind::KeyError, str_repr(&key)))?);
        }

        let mut flags = String::new();
        while let Some(&f) = chars.get(i)
            && matches!(f, '-' | '+' | ' ' | '#' | '0')
        {
            flags.push(f);
            i += 1;
        }
        let mut width = String::new();
        while let Some(&d) = chars.get(i)
            && d.is_ascii_digit()
        {
            width.push(d);
            i += 1;
        }
        let mut precision = None;
        if chars.get(i) == Some(&'.') {
            i += 1;
            let mut digits = String::new();
            while let Some(&d) = chars.get(i)
                && d.is_ascii_digit()
            {
                digits.push(d);
                i += 1;
            }
            precision = Some(digits);
        }
        let conversion = *chars
            .get(i)
            .ok_or_else(|| value_error("incomplete format"))?;
        i += 1;

        if conversion == '%' {
            out.push('%');
            continue;
        }

        let value = match keyed {
            Some(value) => value,
            None => {
                let value = positional
                    .get(next)
                    .cloned()
                    .ok_or_else(|| type_error("not enough arguments for format string"))?;
                next += 1;
                value
            }
        };

        let mut spec = String::new();
        if flags.contains('-') {
            spec.push('<');
        } else if !flags.contains('0') {
            spec.push('>');
        }
        if flags.contains('+') {
            spec.push('+');
        } else if flags.contains(' ') {
            spec.push(' ');
        }
        if flags.contains('#') {
            spec.push('#');
        }
        if flags.contains('0') && !flags.contains('-') {
            spec.push('0');
        }
        spec.push_str(&width);
        if let Some(p) = &precision {
            spec.push('.');
            spec.push_str(if p.is_empty() { "0" } else { p });
        }

        let rendered = match conversion {
            's' | 'r' | 'a' => {
                let text = if conversion == 's' {
                    value.to_str()
                } else {
                    value.repr()
                };
                format_value(&Value::from(text), &spec)?
            }
            'd' | 'i' | 'u' => {
                let n = match &value {
                    Value::Float(f) => Value::Int(f.trunc() as i64),
                    v if v.as_int().is_some() => Value::Int(v.as_int().unwrap_or_default()),
                    v => {
                        return Err(type_error(format!(
                            "%{conversion} format: a real number is required, not {}",
                            v.type_name()
                        )));
                    }
                };
                let spec = spec.split('.').next().unwrap_or_default().to_owned();
                format_value(&n, &spec)?
            }
            'x' | 'X' | 'o' | 'c' => {
                if value.as_int().is_none() {
                    return Err(type_error(format!(
                        "%{conversion} format: an integer is required, not {}",
                        value.type_name()
                    )));
                }
                let spec = spec.split('.').next().unwrap_or_default();
                format_value(&value, &format!("{spec}{conversion}"))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let f = value.as_float().ok_or_else(|| {
                    type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    ))
                })?;
                let spec = if precision.is_none() {
                    format!("{spec}.6{conversion}")
                } else {
                    format!("{spec}{conversion}")
                };
                format_value(&Value::Float(f), &spec)?
            }
            other => {
                return Err(value_error(format!(
                    "unsupported format character '{other}'"
                )));
            }
        };
        out.push_str(&rendered);
    }

    if mapping.is_none() && next < positional.len() {
        return Err(type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_repr_matches_conventions() {
        assert_eq!(float_repr(3.0), "3.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(-2.5), "-2.5");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(123456789.0), "123456789.0");
    }

    #[test]
    fn fixed_and_width() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), ">6").unwrap(), "    42");
        assert_eq!(format_value(&Value::Int(42), "06").unwrap(), "000042");
        assert_eq!(format_value(&Value::Int(-42), "06").unwrap(), "-00042");
        assert_eq!(format_value(&Value::from("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::from("ab"), "4").unwrap(), "ab  ");
    }

    #[test]
    fn integer_presentations() {
        assert_eq!(format_value(&Value::Int(255), "x").unwrap(), "ff");
        assert_eq!(format_value(&Value::Int(255), "#X").unwrap(), "0XFF");
        assert_eq!(format_value(&Value::Int(5), "b").unwrap(), "101");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Int(5), "+d").unwrap(), "+5");
    }

    #[test]
    fn exponent_and_general() {
        assert_eq!(format_value(&Value::Float(12345.678), ".2e").unwrap(), "1.23e+04");
        assert_eq!(format_value(&Value::Float(0.00001234), "g").unwrap(), "1.234e-05");
        assert_eq!(format_value(&Value::Float(1234.5), "g").unwrap(), "1234.5");
        assert_eq!(format_value(&Value::Float(0.5), ".1%").unwrap(), "50.0%");
        assert_eq!(format_value(&Value::Int(2), ".3f").unwrap(), "2.000");
    }

    #[test]
    fn bad_specs() {
        assert!(format_value(&Value::from("x"), "d").is_err());
        assert!(format_value(&Value::Int(1), "z").is_err());
        assert!(format_value(&Value::Int(1), "999999999").is_err());
    }

    #[test]
    fn percent_formatting() {
        let args = Value::tuple(vec![Value::from("x"), Value::Int(3), Value::Float(2.5)]);
        assert_eq!(
            percent_format("%s=%d (%.2f) 100%%", &args).unwrap(),
            "x=3 (2.50) 100%"
        );
        assert_eq!(percent_format("%5s|%-5s|", &Value::tuple(vec![
            Value::from("a"),
            Value::from("b"),
        ]))
        .unwrap(), "    a|b    |");
        assert_eq!(percent_format("%r", &Value::from("q")).unwrap(), "'q'");
        assert_eq!(percent_format("%03d", &Value::Int(7)).unwrap(), "007");
        assert_eq!(percent_format("%x", &Value::Int(255)).unwrap(), "ff");
    }

    #[test]
    fn percent_argument_count_mismatch() {
        assert!(percent_format("%s %s", &Value::from("a")).is_err());
        let args = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        assert!(percent_format("%s", &args).is_err());
    }
}
