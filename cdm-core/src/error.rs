//! Error types and conversion diagnostics for the CDM core.
//!
//! Two classes of problem exist. Structurally invalid configuration is a
//! [`CdmError`] and is always returned to the caller. Problems with message
//! *data* are diagnostics ([`ConversionWarning`], [`ValidationIssue`]) that
//! accumulate in a [`ValidationResult`](crate::validation::ValidationResult)
//! and never abort a conversion.

use thiserror::Error;

use crate::vocab::Unit;

/// Configuration-level errors.
#[derive(Debug, Error)]
pub enum CdmError {
    /// A string did not name any variant of a closed vocabulary.
    #[error("unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },

    /// Structurally invalid configuration (bad bit range, bad document).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A routing pattern that does not compile.
    #[error("invalid routing pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A message handler reported a failure.
    #[error("handler error: {0}")]
    Handler(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Filesystem error while reading or writing a document.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CDM operations.
pub type CdmResult<T> = Result<T, CdmError>;

/// Advisory problems raised while converting values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionWarning {
    /// Neither a direct nor a pivoted conversion factor exists.
    #[error("no unit conversion path: {from} -> {to}")]
    UnitPathMissing { from: Unit, to: Unit },

    /// The rule carries an enum table but the value is not one of its keys.
    #[error("enum code {code:?} has no mapping for {field}")]
    EnumCodeUnmapped { field: String, code: String },

    /// Recomputed and actual values differ by more than the declared resolution.
    #[error("precision loss: {source_field} -> {target_field}, difference {difference}")]
    PrecisionLoss {
        source_field: String,
        target_field: String,
        difference: f64,
    },
}

/// Validation failures. These fail a check but never suppress output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationIssue {
    #[error("concept not found: {0}")]
    ConceptMissing(String),

    #[error("data type mismatch for {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("value out of range for {path}: {value} not in [{min}, {max}]")]
    OutOfRange {
        path: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("golden sample '{sample}': {reason}")]
    GoldenSampleFailed { sample: String, reason: String },
}

/// Advisory validation findings that do not fail a check.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationNotice {
    #[error("enum value {value} not declared for {path}")]
    UndeclaredEnumCode { path: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_variant_display() {
        let err = CdmError::UnknownVariant {
            kind: "unit",
            value: "furlong".to_string(),
        };
        assert_eq!(err.to_string(), "unknown unit: \"furlong\"");
    }

    #[test]
    fn warning_display_names_units() {
        let warning = ConversionWarning::UnitPathMissing {
            from: Unit::Hertz,
            to: Unit::Meter,
        };
        assert_eq!(warning.to_string(), "no unit conversion path: Hz -> m");
    }

    #[test]
    fn regex_errors_convert() {
        let err: CdmError = regex::Regex::new("(unclosed").unwrap_err().into();
        assert!(matches!(err, CdmError::InvalidPattern(_)));
    }
}
