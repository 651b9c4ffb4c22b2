use std::net::IpAddr;

use crate::coerce;
use crate::validator::ValidatorRegistry;
use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("validator: value must not be empty")]
    Empty,

    #[error("string must be at least {0} characters")]
    TooShort(usize),

    #[error("string must be at most {0} characters")]
    TooLong(usize),

    #[error("invalid IP address: {0}")]
    IpAddress(String),

    #[error("invalid hex color: {0}")]
    HexColor(String),

    #[error("invalid 64 character hex string: {0}")]
    Hex64(String),
}

/// Register the built-in rules.
pub fn register(registry: &ValidatorRegistry) {
    registry.register("not_empty", not_empty);
    registry.register("notempty", not_empty);

    registry.register_with_args("minlength", |s: String, min: &usize| {
        if s.chars().count() < *min {
            return Err(RuleError::TooShort(*min));
        }
        Ok(())
    });

    registry.register_with_args("maxlength", |s: String, max: &usize| {
        if s.chars().count() > *max {
            return Err(RuleError::TooLong(*max));
        }
        Ok(())
    });

    registry.register("ip_address", |s: String| {
        s.parse::<IpAddr>()
            .map(|_| ())
            .map_err(|_| RuleError::IpAddress(s))
    });

    registry.register_mut("hex6color", |s: &mut String| {
        if s.is_empty() {
            return Ok(());
        }
        let digits = s.strip_prefix('#').unwrap_or(s.as_str());
        if digits.len() != 6 || !is_hex(digits) {
            return Err(RuleError::HexColor(s.clone()));
        }
        *s = digits.to_owned();
        Ok(())
    });

    registry.register("hex64", |s: String| {
        if s.is_empty() || (s.len() == 64 && is_hex(&s)) {
            return Ok(());
        }
        Err(RuleError::Hex64(s))
    });
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn not_empty(v: Value) -> Result<(), RuleError> {
    match &v {
        Value::String(s) if s.is_empty() => Err(RuleError::Empty),
        Value::String(_) => Ok(()),
        _ if coerce::to_bool(&v) => Ok(()),
        _ => Err(RuleError::Empty),
    }
}
