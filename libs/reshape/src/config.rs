use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  Numeric overflow
// ════════════════════════════════════════════════════════════════

/// What to do when a number does not fit the destination width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Store the two's-complement truncation and still report `OutOfRange`.
    #[default]
    Wrap,
    /// Leave the destination untouched and report `OutOfRange`.
    Reject,
}

// ════════════════════════════════════════════════════════════════
//  Map → struct field order
// ════════════════════════════════════════════════════════════════

/// Order in which matched map entries are assigned to struct fields.
///
/// Only observable when a field fails: the first failing field wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapFieldOrder {
    /// Declaration order of the destination struct.
    #[default]
    Declared,
    /// Iteration order of the source map.
    #[serde(alias = "iteration")]
    Source,
}

// ════════════════════════════════════════════════════════════════
//  Engine config
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub overflow: OverflowPolicy,
    pub map_field_order: MapFieldOrder,
    /// Register `not_empty`, `minlength`, `maxlength`, `ip_address`,
    /// `hex6color` and `hex64` on construction.
    pub std_validators: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overflow: OverflowPolicy::default(),
            map_field_order: MapFieldOrder::default(),
            std_validators: true,
        }
    }
}

impl EngineConfig {
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_map_field_order(mut self, order: MapFieldOrder) -> Self {
        self.map_field_order = order;
        self
    }

    pub fn without_std_validators(mut self) -> Self {
        self.std_validators = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"overflow":"reject"}"#).unwrap();
        assert_eq!(cfg.overflow, OverflowPolicy::Reject);
        assert_eq!(cfg.map_field_order, MapFieldOrder::Declared);
        assert!(cfg.std_validators);
    }

    #[test]
    fn iteration_is_an_alias_for_source_order() {
        let order: MapFieldOrder = serde_json::from_str(r#""iteration""#).unwrap();
        assert_eq!(order, MapFieldOrder::Source);
    }
}
