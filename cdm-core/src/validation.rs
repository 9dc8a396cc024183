//! Diagnostics accumulator and the Validator.
//!
//! The validator covers three dimensions:
//! - concept values: kind, range and enum membership
//! - message consistency: recomputed vs. actual target values
//! - golden-sample regression over the full conversion pipeline

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::concept::ConceptRegistry;
use crate::converter::{apply_rule_conversion, MessageConverter};
use crate::error::{ConversionWarning, ValidationIssue, ValidationNotice};
use crate::message::{self, Message};
use crate::rules::MappingRule;
use crate::vocab::{DataKind, MessageStandard};

/// Relative tolerance for golden-sample numeric comparison.
pub const GOLDEN_TOLERANCE: f64 = 1e-9;

/// Errors fail a check, warnings are advisory, metrics are free-form.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ValidationResult {
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Value>,
}

impl ValidationResult {
    /// Empty, valid result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error; the result becomes invalid.
    pub fn add_error(&mut self, error: impl Display) {
        self.errors.push(error.to_string());
    }

    /// Record a warning.
    pub fn add_warning(&mut self, warning: impl Display) {
        self.warnings.push(warning.to_string());
    }

    /// Set a metric, replacing any earlier value.
    pub fn add_metric(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metrics.insert(key.into(), value.into());
    }

    /// Add one to an integer metric, starting from zero.
    pub fn increment_metric(&mut self, key: &str) {
        let current = self.metrics.get(key).and_then(Value::as_u64).unwrap_or(0);
        self.metrics.insert(key.to_string(), Value::from(current + 1));
    }

    /// True when no error was recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Append another result's diagnostics; its metrics overwrite ours.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.metrics.extend(other.metrics);
    }
}

impl Serialize for ValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Repr<'a> {
            is_valid: bool,
            errors: &'a [String],
            warnings: &'a [String],
            metrics: &'a BTreeMap<String, Value>,
        }
        Repr {
            is_valid: self.is_valid(),
            errors: &self.errors,
            warnings: &self.warnings,
            metrics: &self.metrics,
        }
        .serialize(serializer)
    }
}

/// A fixed `(source, expected)` pair replayed through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenSample {
    pub name: String,
    pub source: Message,
    /// Every key here must appear in the converted message with a matching
    /// value; extra keys in the output are ignored.
    pub expected: Message,
    pub protocols: (MessageStandard, MessageStandard),
    pub message_type: String,
}

/// Holds the golden set and runs the checks.
#[derive(Debug, Clone)]
pub struct Validator {
    golden_set: Vec<GoldenSample>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// Validator seeded with golden samples for the built-in pipelines.
    pub fn new() -> Self {
        Self {
            golden_set: builtin_golden_samples(),
        }
    }

    /// Validator with no golden samples.
    pub fn empty() -> Self {
        Self {
            golden_set: Vec::new(),
        }
    }

    /// Add a sample to the regression set.
    pub fn add_golden_sample(&mut self, sample: GoldenSample) {
        tracing::info!(sample = %sample.name, "added golden sample");
        self.golden_set.push(sample);
    }

    /// The regression set.
    pub fn golden_samples(&self) -> &[GoldenSample] {
        &self.golden_set
    }

    /// Check one value against its concept.
    pub fn validate_concept_value(
        concepts: &ConceptRegistry,
        path: &str,
        value: &Value,
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let Some(concept) = concepts.get_concept(path) else {
            result.add_error(ValidationIssue::ConceptMissing(path.to_string()));
            return result;
        };

        if !accepts(concept.data_kind, value) {
            result.add_error(ValidationIssue::TypeMismatch {
                path: path.to_string(),
                expected: accepted_representation(concept.data_kind).to_string(),
                actual: message::type_name(value).to_string(),
            });
            return result;
        }

        if let (Some((min, max)), true, Some(x)) = (
            concept.value_range,
            concept.data_kind.is_numeric(),
            message::as_number(value),
        ) {
            if x < min || x > max {
                result.add_error(ValidationIssue::OutOfRange {
                    path: path.to_string(),
                    value: x,
                    min,
                    max,
                });
            }
        }

        if let Some(declared) = &concept.enum_values {
            let code = message::stringify(value);
            if !declared.contains_key(&code) && !declared.values().any(|label| *label == code) {
                result.add_warning(ValidationNotice::UndeclaredEnumCode {
                    path: path.to_string(),
                    value: code,
                });
            }
        }

        result
    }

    /// Recompute each rule's output and compare it with the target message.
    /// Differences beyond the declared resolution are warnings.
    pub fn validate_message_consistency(
        concepts: &ConceptRegistry,
        source: &Message,
        target: &Message,
        rules: &[MappingRule],
    ) -> ValidationResult {
        let mut result = ValidationResult::new();
        let mut checked = 0u64;

        for rule in rules {
            let (Some(input), Some(actual)) =
                (source.get(&rule.source_field), target.get(&rule.target_field))
            else {
                continue;
            };
            checked += 1;

            let mut scratch = ValidationResult::new();
            let expected = apply_rule_conversion(concepts.units(), input, rule, &mut scratch);
            let resolution = rule
                .resolution
                .or_else(|| concepts.get_concept(&rule.cdm_path).and_then(|c| c.resolution));

            if let (Some(e), Some(a), Some(resolution)) =
                (message::as_number(&expected), message::as_number(actual), resolution)
            {
                let difference = (e - a).abs();
                if difference > resolution {
                    result.add_warning(ConversionWarning::PrecisionLoss {
                        source_field: rule.source_field.clone(),
                        target_field: rule.target_field.clone(),
                        difference,
                    });
                }
            }
        }

        result.add_metric("fields_checked", checked);
        result
    }

    /// Replay every golden sample. A failing sample is an error naming it.
    pub fn run_golden_set_regression(&self, converter: &MessageConverter<'_>) -> ValidationResult {
        let mut result = ValidationResult::new();
        let mut passed = 0u64;
        let mut failed = 0u64;

        for sample in &self.golden_set {
            let (source_std, target_std) = sample.protocols;
            let mut scratch = ValidationResult::new();
            let actual = converter.convert_message(
                &sample.source,
                source_std,
                target_std,
                &sample.message_type,
                &mut scratch,
            );

            match first_mismatch(&sample.expected, &actual) {
                None => passed += 1,
                Some(reason) => {
                    failed += 1;
                    tracing::warn!(sample = %sample.name, "golden sample failed: {}", reason);
                    result.add_error(ValidationIssue::GoldenSampleFailed {
                        sample: sample.name.clone(),
                        reason,
                    });
                }
            }
        }

        result.add_metric("golden_set_size", self.golden_set.len() as u64);
        result.add_metric("passed", passed);
        result.add_metric("failed", failed);
        result.add_metric("regression_passed", failed == 0);
        result
    }
}

fn first_mismatch(expected: &Message, actual: &Message) -> Option<String> {
    expected.iter().find_map(|(key, want)| match actual.get(key) {
        None => Some(format!("missing field {key}")),
        Some(got) if !message::values_match(want, got, GOLDEN_TOLERANCE) => {
            Some(format!("field {key}: expected {want}, got {got}"))
        }
        Some(_) => None,
    })
}

/// Kind -> accepted JSON representation.
fn accepts(kind: DataKind, value: &Value) -> bool {
    match kind {
        DataKind::Integer => message::is_integer(value),
        DataKind::Float => value.is_number(),
        DataKind::String => value.is_string(),
        DataKind::Boolean => value.is_boolean(),
        DataKind::Enum | DataKind::Identifier | DataKind::Bits => {
            value.is_string() || message::is_integer(value)
        }
        DataKind::Timestamp => value.is_number() || value.is_string(),
        DataKind::Coordinate => {
            value.is_number()
                || value
                    .as_array()
                    .is_some_and(|items| items.iter().all(Value::is_number))
        }
    }
}

fn accepted_representation(kind: DataKind) -> &'static str {
    match kind {
        DataKind::Integer => "integer",
        DataKind::Float => "number",
        DataKind::String => "string",
        DataKind::Boolean => "boolean",
        DataKind::Enum | DataKind::Identifier | DataKind::Bits => "string or integer",
        DataKind::Timestamp => "number or string",
        DataKind::Coordinate => "number or array of numbers",
    }
}

fn object(value: Value) -> Message {
    match value {
        Value::Object(map) => map,
        _ => Message::new(),
    }
}

fn builtin_golden_samples() -> Vec<GoldenSample> {
    vec![
        GoldenSample {
            name: "mavlink_attitude_to_link16".to_string(),
            source: object(serde_json::json!({"roll": 0.5, "pitch": 0.1, "yaw": 1.2})),
            expected: object(serde_json::json!({"bits[10:21]": 50.0, "bits[22:33]": 120.0})),
            protocols: (MessageStandard::MavLink, MessageStandard::MilStd6016),
            message_type: "ATTITUDE".to_string(),
        },
        GoldenSample {
            name: "link16_weapon_status_to_mqtt".to_string(),
            source: object(serde_json::json!({"bits[0:5]": 2, "bits[6:15]": 12345})),
            expected: object(serde_json::json!({"wes": "Engaged", "track_id": 12345})),
            protocols: (MessageStandard::MilStd6016, MessageStandard::Mqtt),
            message_type: "J10.2".to_string(),
        },
    ]
}
