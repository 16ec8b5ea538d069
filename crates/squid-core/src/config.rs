//! Configuration validation
//!
//! Each crate owns a serde-deserializable config struct; hosts aggregate them
//! and call [`ConfigValidation::validate`] before wiring services.

/// Validation hook implemented by every config section.
pub trait ConfigValidation {
    /// Check invariants, returning a message naming the offending field.
    fn validate(&self) -> Result<(), String>;
}
