//! Primitive coercions.
//!
//! Each function unwraps pointers and dynamic values first, then applies
//! a fixed policy. The flag in each result tells whether the conversion
//! was exact; callers decide whether an inexact result is an error.

use tracing::trace;

use crate::reflect::{Number, Reflect, ReflectRef};

/// Read view after unwrapping every pointer and dynamic layer.
/// Null collapses to `Pointer(None)` or `Dynamic(None)`.
pub fn base(src: &dyn Reflect) -> ReflectRef<'_> {
    let mut current = src.reflect_ref();
    loop {
        match current {
            ReflectRef::Pointer(Some(inner)) | ReflectRef::Dynamic(Some(inner)) => {
                current = inner.reflect_ref();
            }
            other => return other,
        }
    }
}

fn is_null(view: &ReflectRef<'_>) -> bool {
    matches!(view, ReflectRef::Pointer(None) | ReflectRef::Dynamic(None))
}

fn text_truthy(bytes: &[u8]) -> bool {
    match bytes {
        [] | [b'0'] => false,
        _ => true,
    }
}

pub fn to_bool(src: &dyn Reflect) -> bool {
    match base(src) {
        ReflectRef::Bool(b) => b,
        ReflectRef::Number(n) => !n.is_zero(),
        ReflectRef::Str(s) => text_truthy(s.as_bytes()),
        ReflectRef::Bytes(b) => text_truthy(b),
        ReflectRef::Seq(seq) => !seq.is_empty(),
        ReflectRef::Map(map) => !map.is_empty(),
        _ => false,
    }
}

pub fn to_i64(src: &dyn Reflect) -> (i64, bool) {
    let view = base(src);
    match view {
        ReflectRef::Number(n) => n.to_i64(),
        ReflectRef::Bool(b) => (i64::from(b), true),
        ReflectRef::Str(s) => parse_int(s).map_or((0, false), |v| (v, true)),
        ReflectRef::Bytes(b) => std::str::from_utf8(b)
            .ok()
            .and_then(parse_int)
            .map_or((0, false), |v| (v, true)),
        _ if is_null(&view) => (0, true),
        _ => {
            trace!(src = src.type_of().name(), "not convertible to a signed integer");
            (0, false)
        }
    }
}

pub fn to_u64(src: &dyn Reflect) -> (u64, bool) {
    let view = base(src);
    match view {
        ReflectRef::Number(n) => n.to_u64(),
        ReflectRef::Bool(b) => (u64::from(b), true),
        ReflectRef::Str(s) => parse_uint(s).map_or((0, false), |v| (v, true)),
        ReflectRef::Bytes(b) => std::str::from_utf8(b)
            .ok()
            .and_then(parse_uint)
            .map_or((0, false), |v| (v, true)),
        _ if is_null(&view) => (0, true),
        _ => {
            trace!(src = src.type_of().name(), "not convertible to an unsigned integer");
            (0, false)
        }
    }
}

pub fn to_f64(src: &dyn Reflect) -> (f64, bool) {
    let view = base(src);
    match view {
        ReflectRef::Number(n) => (n.to_f64(), true),
        ReflectRef::Str(s) => s.parse::<f64>().map_or((0.0, false), |v| (v, true)),
        _ if is_null(&view) => (0.0, true),
        _ => {
            let (v, ok) = to_i64(src);
            (v as f64, ok)
        }
    }
}

pub fn to_string(src: &dyn Reflect) -> (String, bool) {
    let view = base(src);
    match view {
        ReflectRef::Str(s) => (s.to_owned(), true),
        ReflectRef::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => (s.to_owned(), true),
            Err(_) => (String::from_utf8_lossy(b).into_owned(), false),
        },
        ReflectRef::Number(n) => (n.to_string(), true),
        ReflectRef::Bool(b) => (if b { "1" } else { "0" }.to_owned(), true),
        _ if is_null(&view) => (String::new(), false),
        _ => {
            trace!(src = src.type_of().name(), "not convertible to a string");
            (src.type_of().name().to_owned(), false)
        }
    }
}

pub fn to_bytes(src: &dyn Reflect) -> (Vec<u8>, bool) {
    let view = base(src);
    match view {
        ReflectRef::Bytes(b) => (b.to_vec(), true),
        ReflectRef::Str(s) => (s.as_bytes().to_vec(), true),
        ReflectRef::Number(n) => (n.to_be_bytes(), true),
        ReflectRef::Bool(b) => (vec![u8::from(b)], true),
        _ if is_null(&view) => (Vec::new(), true),
        _ => {
            trace!(src = src.type_of().name(), "not convertible to bytes");
            (Vec::new(), false)
        }
    }
}

/// The source as a number, if it is one after unwrapping.
pub fn to_number(src: &dyn Reflect) -> Option<Number> {
    match base(src) {
        ReflectRef::Number(n) => Some(n),
        _ => None,
    }
}

// ════════════════════════════════════════════════════════════════
//  Integer literals
// ════════════════════════════════════════════════════════════════

/// Parse a signed integer literal: optional sign, then a base prefix
/// (`0x`, `0o`, `0b`, or a bare leading `0` for octal) and digits with
/// optional `_` separators.
pub fn parse_int(s: &str) -> Option<i64> {
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let magnitude = parse_magnitude(digits)?;
    if negative {
        if magnitude > i64::MIN.unsigned_abs() {
            return None;
        }
        Some(0i64.wrapping_sub_unsigned(magnitude))
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// Unsigned form of [`parse_int`]. No sign is accepted.
pub fn parse_uint(s: &str) -> Option<u64> {
    parse_magnitude(s)
}

fn parse_magnitude(s: &str) -> Option<u64> {
    let lower = s.get(..2).map(str::to_ascii_lowercase);
    let (radix, digits, prefixed) = match lower.as_deref() {
        Some("0x") => (16, &s[2..], true),
        Some("0o") => (8, &s[2..], true),
        Some("0b") => (2, &s[2..], true),
        _ if s.len() > 1 && s.starts_with('0') => (8, &s[1..], true),
        _ => (10, s, false),
    };

    let mut value: u64 = 0;
    let mut seen_digit = false;
    let mut last_underscore = false;
    for (idx, c) in digits.char_indices() {
        if c == '_' {
            // Separators sit between digits, or right after a base prefix.
            if last_underscore || (idx == 0 && !prefixed) {
                return None;
            }
            last_underscore = true;
            continue;
        }
        let digit = c.to_digit(radix)?;
        value = value
            .checked_mul(u64::from(radix))?
            .checked_add(u64::from(digit))?;
        seen_digit = true;
        last_underscore = false;
    }
    if !seen_digit || last_underscore {
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn integer_literals() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("-0x1F"), Some(-31));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("017"), Some(15));
        assert_eq!(parse_int("0b1_01"), Some(5));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("0"), Some(0));
        assert_eq!(parse_int("-9223372036854775808"), Some(i64::MIN));
        assert_eq!(parse_int("9223372036854775808"), None);
        assert_eq!(parse_int("_1"), None);
        assert_eq!(parse_int("1__0"), None);
        assert_eq!(parse_int("10_"), None);
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int("08"), None);
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int(" 1"), None);
        assert_eq!(parse_uint("-1"), None);
        assert_eq!(parse_uint("18446744073709551615"), Some(u64::MAX));
    }

    #[test]
    fn bool_policy() {
        assert!(!to_bool(&String::new()));
        assert!(!to_bool(&"0".to_string()));
        assert!(to_bool(&"1".to_string()));
        assert!(to_bool(&"00".to_string()));
        assert!(to_bool(&"false".to_string()));
        assert!(to_bool(&3u8));
        assert!(!to_bool(&0.0f64));
        assert!(!to_bool(&Vec::<i32>::new()));
        assert!(to_bool(&vec![0i32]));
        assert!(!to_bool(&Value::Null));
        assert!(!to_bool(&None::<bool>));
        assert!(to_bool(&Some(true)));
    }

    #[test]
    fn signed_policy() {
        assert_eq!(to_i64(&u64::MAX), (-1, false));
        assert_eq!(to_i64(&true), (1, true));
        assert_eq!(to_i64(&42.5f64), (43, true));
        assert_eq!(to_i64(&-42.5f32), (-43, true));
        assert_eq!(to_i64(&"0x10".to_string()), (16, true));
        assert_eq!(to_i64(&b"12".to_vec()), (12, true));
        assert_eq!(to_i64(&"abc".to_string()), (0, false));
        assert_eq!(to_i64(&Value::Null), (0, true));
        assert_eq!(to_i64(&Value::Map(Default::default())), (0, false));
    }

    #[test]
    fn unsigned_policy() {
        assert_eq!(to_u64(&-1i32), (u64::MAX, false));
        assert_eq!(to_u64(&-0.4f64), (0, false));
        assert_eq!(to_u64(&2.5f64), (3, true));
        assert_eq!(to_u64(&"-1".to_string()), (0, false));
    }

    #[test]
    fn float_policy() {
        assert_eq!(to_f64(&"1.25".to_string()), (1.25, true));
        assert_eq!(to_f64(&true), (1.0, true));
        assert_eq!(to_f64(&Value::Null), (0.0, true));
        assert_eq!(to_f64(&"x".to_string()), (0.0, false));
    }

    #[test]
    fn string_policy() {
        assert_eq!(to_string(&-12i16), ("-12".to_string(), true));
        assert_eq!(to_string(&false), ("0".to_string(), true));
        assert_eq!(to_string(&1.5f64), ("1.5".to_string(), true));
        assert_eq!(to_string(&vec![0xffu8]).1, false);
        assert_eq!(to_string(&Value::Null), (String::new(), false));
        assert!(!to_string(&vec![1i32]).1);
    }

    #[test]
    fn bytes_policy() {
        assert_eq!(to_bytes(&0x0102u16), (vec![1, 2], true));
        assert_eq!(to_bytes(&1.0f32), (1.0f32.to_be_bytes().to_vec(), true));
        assert_eq!(to_bytes(&true), (vec![1], true));
        assert_eq!(to_bytes(&"hi".to_string()), (b"hi".to_vec(), true));
        assert_eq!(to_bytes(&None::<u8>), (Vec::new(), true));
        assert!(!to_bytes(&vec![1i32]).1);
    }
}
