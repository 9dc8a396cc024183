//! Message Converter: the runtime core.
//!
//! Every field moves through the same rule pipeline. Forward rules run
//! unit conversion, value transform, scale, offset, integer encoding, then
//! enum substitution. Reversed rules (produced by inversion) run the mirror:
//! enum, offset, scale, value transform, unit conversion. Each step is
//! skipped when it does not apply.
//!
//! Standard-to-standard conversion goes through the CDM in two passes:
//! source -> CDM bag keyed by concept path, then CDM bag -> target.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::concept::ConceptRegistry;
use crate::error::ConversionWarning;
use crate::mapping::{MappingRegistry, MessageMapping};
use crate::message::{self, Message, MESSAGE_TYPE_KEY};
use crate::rules::MappingRule;
use crate::units::UnitTable;
use crate::validation::{ValidationResult, Validator};
use crate::vocab::MessageStandard;

/// One populated CDM concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdmValue {
    pub value: Value,
    pub confidence: f64,
    /// `"{standard}.{field}"` the value came from.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// The CDM intermediate form of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CdmMessage {
    pub message_type: String,
    pub source_standard: MessageStandard,
    pub values: BTreeMap<String, CdmValue>,
}

impl CdmMessage {
    /// Concept path -> bare value.
    pub fn flatten(&self) -> Message {
        self.values
            .iter()
            .map(|(path, v)| (path.clone(), v.value.clone()))
            .collect()
    }
}

/// Outcome of converting one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    /// At least one target field was produced.
    pub success: bool,
    pub source_message: Message,
    pub target_message: Message,
    pub validation: ValidationResult,
    pub timestamp: DateTime<Utc>,
}

/// Run one rule's pipeline over a value. Never fails; problems land in
/// `report` as warnings.
pub fn apply_rule_conversion(
    units: &UnitTable,
    value: &Value,
    rule: &MappingRule,
    report: &mut ValidationResult,
) -> Value {
    if rule.reversed {
        let value = substitute_enum(value, rule, report);
        apply_numeric_steps(units, &value, rule, report)
    } else {
        let value = apply_numeric_steps(units, value, rule, report);
        substitute_enum(&value, rule, report)
    }
}

fn has_numeric_steps(rule: &MappingRule) -> bool {
    rule.unit_conversion.is_some()
        || rule.scale_factor.is_some()
        || rule.offset.is_some()
        || rule.transform.is_some()
}

fn apply_numeric_steps(
    units: &UnitTable,
    value: &Value,
    rule: &MappingRule,
    report: &mut ValidationResult,
) -> Value {
    if !has_numeric_steps(rule) {
        return value.clone();
    }
    // an enum substitution may have produced a numeric string
    let numeric = message::as_number(value).or_else(|| {
        rule.reversed
            .then(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
            .flatten()
    });
    let Some(mut x) = numeric else {
        return value.clone();
    };

    let convert_units = |x: f64, report: &mut ValidationResult| match rule.unit_conversion {
        Some((from, to)) => units.convert(x, from, to, report),
        None => x,
    };
    let transform = |x: f64| {
        rule.transform
            .as_ref()
            .and_then(|t| t.apply(x))
            .unwrap_or(x)
    };

    if rule.reversed {
        x += rule.offset.unwrap_or(0.0);
        x *= rule.scale_factor.unwrap_or(1.0);
        x = transform(x);
        x = convert_units(x, report);
    } else {
        x = convert_units(x, report);
        x = transform(x);
        x *= rule.scale_factor.unwrap_or(1.0);
        x += rule.offset.unwrap_or(0.0);
    }

    match rule.transform.as_ref().and_then(|t| t.encode(x)) {
        Some(encoded) => message::integer(encoded),
        None => message::number(x),
    }
}

fn substitute_enum(value: &Value, rule: &MappingRule, report: &mut ValidationResult) -> Value {
    let Some(table) = &rule.enum_mapping else {
        return value.clone();
    };
    let code = message::stringify(value);
    match table.get(&code) {
        Some(mapped) => Value::String(mapped.clone()),
        None => {
            report.add_warning(ConversionWarning::EnumCodeUnmapped {
                field: rule.source_field.clone(),
                code,
            });
            value.clone()
        }
    }
}

/// Applies registered rules between standards, through the CDM.
#[derive(Debug, Clone, Copy)]
pub struct MessageConverter<'a> {
    concepts: &'a ConceptRegistry,
    mappings: &'a MappingRegistry,
}

impl<'a> MessageConverter<'a> {
    /// Converter over borrowed registries.
    pub fn new(concepts: &'a ConceptRegistry, mappings: &'a MappingRegistry) -> Self {
        Self { concepts, mappings }
    }

    /// The concept registry in use.
    pub fn concepts(&self) -> &'a ConceptRegistry {
        self.concepts
    }

    /// The mapping registry in use.
    pub fn mappings(&self) -> &'a MappingRegistry {
        self.mappings
    }

    /// Run one rule's pipeline on a value; see [`apply_rule_conversion`].
    pub fn apply_rule_conversion(
        &self,
        value: &Value,
        rule: &MappingRule,
        report: &mut ValidationResult,
    ) -> Value {
        apply_rule_conversion(self.concepts.units(), value, rule, report)
    }

    /// Source pass. Rules whose condition fails are skipped; rules whose
    /// source field is absent use their default value if declared.
    pub fn to_cdm(
        &self,
        source: &Message,
        source_std: MessageStandard,
        message_type: &str,
        report: &mut ValidationResult,
    ) -> CdmMessage {
        let mut values = BTreeMap::new();

        if source_std == MessageStandard::Cdm {
            for (path, value) in source.iter().filter(|(k, _)| *k != MESSAGE_TYPE_KEY) {
                let entry = self.cdm_value(value.clone(), source_std, path, path);
                values.insert(path.clone(), entry);
            }
        } else {
            let rules = self
                .mappings
                .get_mapping_rules(source_std, MessageStandard::Cdm, message_type);
            for rule in rules {
                if let Some(input) = rule_input(source, rule, report) {
                    let value = self.apply_rule_conversion(&input, rule, report);
                    let entry = self.cdm_value(value, source_std, &rule.cdm_path, &rule.source_field);
                    values.insert(rule.cdm_path.clone(), entry);
                }
            }
        }

        CdmMessage {
            message_type: message_type.to_string(),
            source_standard: source_std,
            values,
        }
    }

    /// Target pass. Emits a target field for every rule whose concept was
    /// populated.
    pub fn from_cdm(
        &self,
        cdm: &CdmMessage,
        target_std: MessageStandard,
        report: &mut ValidationResult,
    ) -> Message {
        let mut target = Message::new();
        target.insert(
            MESSAGE_TYPE_KEY.to_string(),
            Value::String(cdm.message_type.clone()),
        );

        if target_std == MessageStandard::Cdm {
            target.extend(cdm.flatten());
            return target;
        }

        let flat = cdm.flatten();
        let rules = self
            .mappings
            .get_mapping_rules(MessageStandard::Cdm, target_std, &cdm.message_type);
        for rule in rules {
            let mut keyed = rule.clone();
            keyed.source_field = rule.cdm_path.clone();
            if let Some(input) = rule_input(&flat, &keyed, report) {
                let value = self.apply_rule_conversion(&input, rule, report);
                target.insert(rule.target_field.clone(), value);
            }
        }
        target
    }

    /// Convert a message between two standards through the CDM.
    pub fn convert_message(
        &self,
        source: &Message,
        source_std: MessageStandard,
        target_std: MessageStandard,
        message_type: &str,
        report: &mut ValidationResult,
    ) -> Message {
        let cdm = self.to_cdm(source, source_std, message_type, report);
        self.from_cdm(&cdm, target_std, report)
    }

    /// Convert and validate: every populated concept value is checked, and
    /// the target is checked against the CDM values it came from.
    pub fn process_message(
        &self,
        source: &Message,
        source_std: MessageStandard,
        target_std: MessageStandard,
        message_type: &str,
    ) -> ConversionResult {
        let mut validation = ValidationResult::new();
        let cdm = self.to_cdm(source, source_std, message_type, &mut validation);
        let target = self.from_cdm(&cdm, target_std, &mut validation);

        for (path, value) in &cdm.values {
            validation.merge(Validator::validate_concept_value(self.concepts, path, &value.value));
        }
        let outbound = self
            .mappings
            .get_mapping_rules(MessageStandard::Cdm, target_std, message_type);
        validation.merge(Validator::validate_message_consistency(
            self.concepts,
            &cdm.flatten(),
            &target,
            outbound,
        ));
        validation.add_metric("cdm_concepts", cdm.values.len() as u64);

        finish(source, target, validation)
    }

    /// Convert with a message-level mapping, bypassing the CDM.
    pub fn convert_with_mapping(&self, source: &Message, mapping: &MessageMapping) -> ConversionResult {
        let mut validation = ValidationResult::new();
        let rules = mapping.rules();

        let mut target = Message::new();
        target.insert(
            MESSAGE_TYPE_KEY.to_string(),
            Value::String(mapping.target_message.clone()),
        );
        for rule in &rules {
            if let Some(input) = rule_input(source, rule, &mut validation) {
                let value = self.apply_rule_conversion(&input, rule, &mut validation);
                target.insert(rule.target_field.clone(), value);
            }
        }

        validation.merge(Validator::validate_message_consistency(
            self.concepts,
            source,
            &target,
            &rules,
        ));
        finish(source, target, validation)
    }

    fn cdm_value(&self, value: Value, standard: MessageStandard, path: &str, field: &str) -> CdmValue {
        CdmValue {
            value,
            confidence: self.concepts.get_concept(path).map_or(1.0, |c| c.confidence),
            source: format!("{standard}.{field}"),
            timestamp: Utc::now(),
        }
    }
}

fn rule_input(message: &Message, rule: &MappingRule, report: &mut ValidationResult) -> Option<Value> {
    if let Some(condition) = &rule.condition {
        if !condition.holds(message) {
            return None;
        }
    }
    match (message.get(&rule.source_field), &rule.default_value) {
        (Some(value), _) => Some(value.clone()),
        (None, Some(default)) => {
            report.increment_metric("defaults_applied");
            Some(default.clone())
        }
        (None, None) => None,
    }
}

fn finish(source: &Message, target: Message, validation: ValidationResult) -> ConversionResult {
    let success = target.keys().any(|k| k != MESSAGE_TYPE_KEY);
    ConversionResult {
        success,
        source_message: source.clone(),
        target_message: target,
        validation,
        timestamp: Utc::now(),
    }
}
