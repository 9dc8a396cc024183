//! Declarative field-level mapping rules.
//!
//! A [`MappingRule`] moves one field between a standard and the CDM; a
//! [`FieldMapping`] moves one field directly between two standards inside a
//! message-level mapping. Both run through the same conversion pipeline
//! (see [`crate::converter`]).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::concept::default_version;
use crate::error::{CdmError, CdmResult};
use crate::message::Message;
use crate::vocab::Unit;

/// Named value transforms.
///
/// Value transforms run before scaling. Integer encodings (`*_to_int`,
/// `meter_to_mm`, `timestamp_to_epoch`) run after the offset and emit an
/// integer; their inverses are pass-through decodings. Unknown names are
/// kept as [`Transform::Custom`] and do nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Transform {
    DegreeToRadian,
    RadianToDegree,
    MeterToFeet,
    FeetToMeter,
    CelsiusToFahrenheit,
    FahrenheitToCelsius,
    TimestampToEpoch,
    EpochToTimestamp,
    DegreeToInt,
    IntToDegree,
    MeterToMm,
    MmToMeter,
    Custom(String),
}

impl Transform {
    /// Parse a transform name; unknown names become `Custom`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "degree_to_radian" => Self::DegreeToRadian,
            "radian_to_degree" => Self::RadianToDegree,
            "meter_to_feet" => Self::MeterToFeet,
            "feet_to_meter" => Self::FeetToMeter,
            "celsius_to_fahrenheit" => Self::CelsiusToFahrenheit,
            "fahrenheit_to_celsius" => Self::FahrenheitToCelsius,
            "timestamp_to_epoch" => Self::TimestampToEpoch,
            "epoch_to_timestamp" => Self::EpochToTimestamp,
            "degree_to_int" => Self::DegreeToInt,
            "int_to_degree" => Self::IntToDegree,
            "meter_to_mm" => Self::MeterToMm,
            "mm_to_meter" => Self::MmToMeter,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The transform's name as written in documents.
    pub fn name(&self) -> &str {
        match self {
            Self::DegreeToRadian => "degree_to_radian",
            Self::RadianToDegree => "radian_to_degree",
            Self::MeterToFeet => "meter_to_feet",
            Self::FeetToMeter => "feet_to_meter",
            Self::CelsiusToFahrenheit => "celsius_to_fahrenheit",
            Self::FahrenheitToCelsius => "fahrenheit_to_celsius",
            Self::TimestampToEpoch => "timestamp_to_epoch",
            Self::EpochToTimestamp => "epoch_to_timestamp",
            Self::DegreeToInt => "degree_to_int",
            Self::IntToDegree => "int_to_degree",
            Self::MeterToMm => "meter_to_mm",
            Self::MmToMeter => "mm_to_meter",
            Self::Custom(name) => name,
        }
    }

    /// Explicit inverse, if one is known.
    pub fn inverse(&self) -> Option<Transform> {
        let inverse = match self {
            Self::DegreeToRadian => Self::RadianToDegree,
            Self::RadianToDegree => Self::DegreeToRadian,
            Self::MeterToFeet => Self::FeetToMeter,
            Self::FeetToMeter => Self::MeterToFeet,
            Self::CelsiusToFahrenheit => Self::FahrenheitToCelsius,
            Self::FahrenheitToCelsius => Self::CelsiusToFahrenheit,
            Self::TimestampToEpoch => Self::EpochToTimestamp,
            Self::EpochToTimestamp => Self::TimestampToEpoch,
            Self::DegreeToInt => Self::IntToDegree,
            Self::IntToDegree => Self::DegreeToInt,
            Self::MeterToMm => Self::MmToMeter,
            Self::MmToMeter => Self::MeterToMm,
            Self::Custom(_) => return None,
        };
        Some(inverse)
    }

    /// Inverse for reverse mappings. A transform without a known inverse is
    /// carried over unchanged, which is only an approximation.
    pub fn inverted(&self) -> Transform {
        self.inverse().unwrap_or_else(|| self.clone())
    }

    /// Pre-scale value transform; `None` when this is not one.
    pub fn apply(&self, x: f64) -> Option<f64> {
        match self {
            Self::DegreeToRadian => Some(x.to_radians()),
            Self::RadianToDegree => Some(x.to_degrees()),
            Self::MeterToFeet => Some(x * 3.28084),
            Self::FeetToMeter => Some(x / 3.28084),
            Self::CelsiusToFahrenheit => Some(x * 9.0 / 5.0 + 32.0),
            Self::FahrenheitToCelsius => Some((x - 32.0) * 5.0 / 9.0),
            _ => None,
        }
    }

    /// Post-offset integer encoding; `None` when this is not one.
    pub fn encode(&self, x: f64) -> Option<f64> {
        match self {
            Self::DegreeToInt | Self::MeterToMm => Some(x.round()),
            Self::TimestampToEpoch => Some(x.trunc()),
            _ => None,
        }
    }
}

impl From<String> for Transform {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<Transform> for String {
    fn from(transform: Transform) -> Self {
        transform.name().to_string()
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive bit positions, carried as metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct BitRange {
    start: u32,
    end: u32,
}

impl BitRange {
    /// Validated bit range; `start` must not exceed `end`.
    pub fn new(start: u32, end: u32) -> CdmResult<Self> {
        if start > end {
            return Err(CdmError::Configuration(format!(
                "bit range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    /// Width in bits.
    pub fn width(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Textual key form, e.g. `bits[10:21]`.
    pub fn key(&self) -> String {
        format!("bits[{}:{}]", self.start, self.end)
    }
}

impl TryFrom<(u32, u32)> for BitRange {
    type Error = CdmError;

    fn try_from((start, end): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(start, end)
    }
}

impl From<BitRange> for (u32, u32) {
    fn from(range: BitRange) -> Self {
        (range.start, range.end)
    }
}

/// Predicate gating a rule: `field` must be present, and equal to `equals`
/// when given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Value>,
}

impl RuleCondition {
    /// Fires when `field` is present.
    pub fn present(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            equals: None,
        }
    }

    /// Fires when `field` equals `value`.
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            equals: Some(value),
        }
    }

    /// Whether the condition holds for a message.
    pub fn holds(&self, message: &Message) -> bool {
        match (message.get(&self.field), &self.equals) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

fn invert_table(table: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    table.iter().map(|(k, v)| (v.clone(), k.clone())).collect()
}

fn invert_scale(scale: Option<f64>) -> Option<f64> {
    scale.filter(|s| *s != 0.0).map(|s| 1.0 / s)
}

/// One field-level transform between a standard and the CDM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRule {
    pub source_field: String,
    pub cdm_path: String,
    #[serde(default)]
    pub target_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_conversion: Option<(Unit, Unit)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_mapping: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_range: Option<BitRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RuleCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Declared precision used by consistency checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// Run the pipeline mirrored (enum, offset, scale, unit). Set on
    /// inverted rules so that inversion is exact.
    #[serde(default, skip_serializing_if = "is_false")]
    pub reversed: bool,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl MappingRule {
    /// Rule mapping `source_field` through `cdm_path` to `target_field`.
    pub fn new(
        source_field: impl Into<String>,
        cdm_path: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            source_field: source_field.into(),
            cdm_path: cdm_path.into(),
            target_field: target_field.into(),
            unit_conversion: None,
            scale_factor: None,
            offset: None,
            enum_mapping: None,
            bit_range: None,
            condition: None,
            default_value: None,
            resolution: None,
            transform: None,
            reversed: false,
            version: default_version(),
            author: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Convert from `from` to `to` before scaling.
    pub fn with_units(mut self, from: Unit, to: Unit) -> Self {
        self.unit_conversion = Some((from, to));
        self
    }

    /// Multiply by `scale`.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale_factor = Some(scale);
        self
    }

    /// Add `offset` after scaling.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Substitute enum codes after the numeric steps.
    pub fn with_enum_mapping<I, K, V>(mut self, table: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.enum_mapping = Some(
            table
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Attach a bit range; fails when `start > end`.
    pub fn with_bit_range(mut self, start: u32, end: u32) -> CdmResult<Self> {
        self.bit_range = Some(BitRange::new(start, end)?);
        Ok(self)
    }

    /// Only apply the rule when `condition` holds.
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Value used when the source field is absent.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Declared precision of the target field.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Apply a named value transform first.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Record rule version and author.
    pub fn with_provenance(mut self, version: impl Into<String>, author: impl Into<String>) -> Self {
        self.version = version.into();
        self.author = author.into();
        self
    }

    /// The rule applied in the opposite direction: fields swapped, unit pair
    /// swapped, scale reciprocal, offset negated, enum table flipped, pipeline
    /// order mirrored.
    pub fn inverted(&self) -> Self {
        Self {
            source_field: self.target_field.clone(),
            cdm_path: self.cdm_path.clone(),
            target_field: self.source_field.clone(),
            unit_conversion: self.unit_conversion.map(|(from, to)| (to, from)),
            scale_factor: invert_scale(self.scale_factor),
            offset: self.offset.map(|o| -o),
            enum_mapping: self.enum_mapping.as_ref().map(invert_table),
            bit_range: self.bit_range,
            condition: None,
            default_value: None,
            resolution: self.resolution,
            transform: self.transform.as_ref().map(Transform::inverted),
            reversed: !self.reversed,
            version: self.version.clone(),
            author: self.author.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Field mapping inside a message-level mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    #[serde(default)]
    pub transform_function: Option<Transform>,
    #[serde(default)]
    pub scaling_factor: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub enum_mapping: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reversed: bool,
}

impl FieldMapping {
    /// Copy `source_field` to `target_field` unchanged.
    pub fn new(source_field: impl Into<String>, target_field: impl Into<String>) -> Self {
        Self {
            source_field: source_field.into(),
            target_field: target_field.into(),
            transform_function: None,
            scaling_factor: None,
            offset: None,
            enum_mapping: None,
            reversed: false,
        }
    }

    /// Apply a named value transform.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform_function = Some(transform);
        self
    }

    /// Multiply by `scale`.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scaling_factor = Some(scale);
        self
    }

    /// Add `offset` after scaling.
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Substitute enum codes.
    pub fn with_enum_mapping<I, K, V>(mut self, table: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.enum_mapping = Some(
            table
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// The reverse field mapping; see [`MappingRule::inverted`].
    pub fn inverted(&self) -> Self {
        Self {
            source_field: self.target_field.clone(),
            target_field: self.source_field.clone(),
            transform_function: self.transform_function.as_ref().map(Transform::inverted),
            scaling_factor: invert_scale(self.scaling_factor),
            offset: self.offset.map(|o| -o),
            enum_mapping: self.enum_mapping.as_ref().map(invert_table),
            reversed: !self.reversed,
        }
    }

    /// The equivalent rule for the shared conversion pipeline. The CDM path
    /// is the source field name.
    pub fn as_rule(&self) -> MappingRule {
        let mut rule = MappingRule::new(
            self.source_field.clone(),
            self.source_field.clone(),
            self.target_field.clone(),
        );
        rule.transform = self.transform_function.clone();
        rule.scale_factor = self.scaling_factor;
        rule.offset = self.offset;
        rule.enum_mapping = self.enum_mapping.clone();
        rule.reversed = self.reversed;
        rule
    }
}
