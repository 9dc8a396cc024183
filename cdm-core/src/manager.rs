//! Interoperability Manager: the façade over every registry.
//!
//! The manager owns all state explicitly; construction seeds the built-in
//! concepts, units, fields, mappings, routes and golden samples once.
//! Share it across threads behind a reader/writer lock: conversions only
//! need `&self`, registrations need `&mut self`.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::concept::{Concept, ConceptRegistry};
use crate::config::{FieldEntry, SemanticConfig};
use crate::converter::{ConversionResult, MessageConverter};
use crate::error::CdmResult;
use crate::mapping::{MappingRegistry, MessageMapping};
use crate::message::{self, Message};
use crate::router::{MessageRouter, RouteCondition, RoutedMessage};
use crate::rules::{FieldMapping, MappingRule, Transform};
use crate::semantic::{SemanticField, SemanticRegistry};
use crate::state::DispatchState;
use crate::validation::{GoldenSample, ValidationResult, Validator};
use crate::vocab::{FieldType, MessageStandard, SemanticCategory, Unit};

/// How one message field resolved against the semantic registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSemantics {
    pub semantic_id: String,
    pub category: SemanticCategory,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticAnalysis {
    pub message_type: String,
    pub standard: MessageStandard,
    pub semantic_fields: BTreeMap<String, FieldSemantics>,
    pub missing_semantics: Vec<String>,
    pub potential_mappings: Vec<MessageStandard>,
}

/// Result of the single external entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub id: Uuid,
    pub original_message: Message,
    pub source_standard: MessageStandard,
    pub semantic_analysis: SemanticAnalysis,
    pub routed_messages: Vec<RoutedMessage>,
    pub state: DispatchState,
    pub processing_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub concepts: usize,
    pub concepts_by_category: BTreeMap<String, usize>,
    pub semantic_fields: usize,
    pub protocol_mappings: usize,
    pub mapping_rules: usize,
    pub message_mappings: usize,
    pub message_mappings_by_pair: BTreeMap<String, usize>,
    pub custom_mappings: usize,
    pub routing_rules: usize,
    pub unit_conversions: usize,
    pub golden_samples: usize,
    pub audit_entries: usize,
}

#[derive(Debug)]
pub struct InteropManager {
    concepts: ConceptRegistry,
    semantics: SemanticRegistry,
    mappings: MappingRegistry,
    router: MessageRouter,
    validator: Validator,
    custom_mappings: BTreeMap<String, MessageMapping>,
}

impl Default for InteropManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InteropManager {
    /// Manager with every built-in seed.
    pub fn new() -> Self {
        let mut manager = Self::from_parts(
            ConceptRegistry::new(),
            SemanticRegistry::new(),
            MappingRegistry::new(),
            MessageRouter::new(),
            Validator::new(),
        );
        for mapping in builtin_message_mappings() {
            manager.mappings.register_message_mapping(mapping);
        }
        manager
    }

    /// Compose a manager from prebuilt parts without seeding anything.
    pub fn from_parts(
        concepts: ConceptRegistry,
        semantics: SemanticRegistry,
        mappings: MappingRegistry,
        router: MessageRouter,
        validator: Validator,
    ) -> Self {
        Self {
            concepts,
            semantics,
            mappings,
            router,
            validator,
            custom_mappings: BTreeMap::new(),
        }
    }

    /// The concept registry.
    pub fn concepts(&self) -> &ConceptRegistry {
        &self.concepts
    }

    /// The semantic field registry.
    pub fn semantics(&self) -> &SemanticRegistry {
        &self.semantics
    }

    /// The mapping registry.
    pub fn mappings(&self) -> &MappingRegistry {
        &self.mappings
    }

    /// The message router.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// The validator and its golden samples.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// A converter borrowing the current registries.
    pub fn converter(&self) -> MessageConverter<'_> {
        MessageConverter::new(&self.concepts, &self.mappings)
    }

    /// Register or replace a concept.
    pub fn register_concept(&mut self, concept: Concept) {
        self.concepts.register_concept(concept);
    }

    /// Extend the unit table with `from -> to` and its reciprocal.
    pub fn register_unit_conversion(&mut self, from: Unit, to: Unit, factor: f64) {
        self.concepts.register_unit_conversion(from, to, factor);
    }

    /// Register or replace a semantic field.
    pub fn register_semantic_field(&mut self, field: SemanticField) {
        self.semantics.register_semantic_field(field);
    }

    /// Register rule sets for `source -> target`.
    pub fn register_mapping(
        &mut self,
        source: MessageStandard,
        target: MessageStandard,
        message_map: BTreeMap<String, Vec<MappingRule>>,
    ) {
        self.mappings.register_mapping(source, target, message_map);
    }

    /// Register a message mapping, deriving its inverse when bidirectional.
    pub fn register_message_mapping(&mut self, mapping: MessageMapping) {
        self.mappings.register_message_mapping(mapping);
    }

    /// Add a routing rule; an invalid pattern is a configuration error.
    pub fn add_routing_rule(
        &mut self,
        source_pattern: &str,
        target_standards: Vec<MessageStandard>,
        condition: Option<RouteCondition>,
        priority: i32,
    ) -> CdmResult<()> {
        self.router
            .add_routing_rule(source_pattern, target_standards, condition, priority)
    }

    /// Register a handler for messages dispatched to `standard`.
    pub fn register_message_handler<F>(&mut self, standard: MessageStandard, handler: F)
    where
        F: Fn(&Message) -> CdmResult<()> + Send + Sync + 'static,
    {
        self.router.register_message_handler(standard, handler);
    }

    /// Add a golden sample to the regression set.
    pub fn add_golden_sample(&mut self, sample: GoldenSample) {
        self.validator.add_golden_sample(sample);
    }

    /// Resolve every field of a message and list the reachable standards.
    pub fn analyze_message_semantics(&self, message: &Message, standard: MessageStandard) -> SemanticAnalysis {
        let mut semantic_fields = BTreeMap::new();
        let mut missing_semantics = Vec::new();

        for (name, value) in message {
            match self.semantics.find_semantic_field(name) {
                Some(field) => {
                    semantic_fields.insert(
                        name.clone(),
                        FieldSemantics {
                            semantic_id: field.semantic_id.clone(),
                            category: field.category,
                            field_type: field.field_type,
                            value: value.clone(),
                        },
                    );
                }
                None => missing_semantics.push(name.clone()),
            }
        }

        let potential_mappings = MessageStandard::ALL
            .iter()
            .copied()
            .filter(|&target| target != standard)
            .filter(|&target| {
                self.mappings.has_message_mappings(standard, target)
                    || self.mappings.protocol_mapping(standard, target).is_some()
            })
            .collect();

        SemanticAnalysis {
            message_type: message::message_type(message).unwrap_or("unknown").to_string(),
            standard,
            semantic_fields,
            missing_semantics,
            potential_mappings,
        }
    }

    /// Register a bidirectional mapping from caller-supplied field mappings
    /// and return its id.
    pub fn create_custom_mapping(
        &mut self,
        source_message: &str,
        target_message: &str,
        source_standard: MessageStandard,
        target_standard: MessageStandard,
        field_mappings: Vec<FieldMapping>,
    ) -> String {
        let mapping = MessageMapping::new(
            source_standard,
            source_message,
            target_standard,
            target_message,
            field_mappings,
        );
        let mapping_id =
            format!("{source_standard}_{source_message}_to_{target_standard}_{target_message}");
        self.custom_mappings.insert(mapping_id.clone(), mapping.clone());
        self.mappings.register_message_mapping(mapping);
        tracing::info!(mapping_id = %mapping_id, "created custom mapping");
        mapping_id
    }

    /// A mapping created through [`Self::create_custom_mapping`].
    pub fn custom_mapping(&self, mapping_id: &str) -> Option<&MessageMapping> {
        self.custom_mappings.get(mapping_id)
    }

    /// Semantic analysis plus routing.
    pub fn process_message_with_routing(
        &self,
        message: &Message,
        source_standard: MessageStandard,
    ) -> ProcessingResult {
        let semantic_analysis = self.analyze_message_semantics(message, source_standard);
        let outcome = self.router.route(message, source_standard, &self.converter());
        ProcessingResult {
            id: Uuid::new_v4(),
            original_message: message.clone(),
            source_standard,
            semantic_analysis,
            routed_messages: outcome.routed,
            state: outcome.state,
            processing_timestamp: Utc::now(),
        }
    }

    /// Convert through the CDM using the message's own type.
    pub fn process_message(
        &self,
        message: &Message,
        source_standard: MessageStandard,
        target_standard: MessageStandard,
    ) -> ConversionResult {
        let message_type = message::message_type(message).unwrap_or("unknown");
        self.converter()
            .process_message(message, source_standard, target_standard, message_type)
    }

    /// Run every golden sample through the current registries.
    pub fn run_golden_set_regression(&self) -> ValidationResult {
        self.validator.run_golden_set_regression(&self.converter())
    }

    /// Semantic fields filtered by category and a search term.
    pub fn list_semantic_fields(
        &self,
        category: Option<SemanticCategory>,
        search: Option<&str>,
    ) -> Vec<&SemanticField> {
        self.semantics.list_semantic_fields(category, search)
    }

    /// Concepts filtered by category and a search term.
    pub fn list_concepts(&self, category: Option<&str>, search: Option<&str>) -> Vec<&Concept> {
        self.concepts.list_concepts(category, search)
    }

    /// Counts over every registry.
    pub fn statistics(&self) -> Statistics {
        let mut concepts_by_category = BTreeMap::new();
        for concept in self.concepts.concepts() {
            *concepts_by_category
                .entry(concept.category().to_string())
                .or_insert(0) += 1;
        }
        let message_mappings_by_pair = self
            .mappings
            .message_mappings()
            .map(|(key, list)| (key.clone(), list.len()))
            .collect();

        Statistics {
            concepts: self.concepts.len(),
            concepts_by_category,
            semantic_fields: self.semantics.len(),
            protocol_mappings: self.mappings.protocol_mappings().count(),
            mapping_rules: self.mappings.rule_count(),
            message_mappings: self.mappings.message_mapping_count(),
            message_mappings_by_pair,
            custom_mappings: self.custom_mappings.len(),
            routing_rules: self.router.len(),
            unit_conversions: self.concepts.units().len(),
            golden_samples: self.validator.golden_samples().len(),
            audit_entries: self.mappings.audit_trail().len(),
        }
    }

    /// Snapshot of the registries as a configuration document. Derived
    /// inverse mappings are left out; import re-derives them.
    pub fn semantic_config(&self) -> SemanticConfig {
        let semantic_fields = self
            .semantics
            .fields()
            .iter()
            .map(|f| (f.semantic_id.clone(), FieldEntry::from_field(f)))
            .collect();
        let mut message_mappings: BTreeMap<String, Vec<MessageMapping>> = BTreeMap::new();
        for mapping in self.mappings.list_message_mappings() {
            if !mapping.derived {
                message_mappings
                    .entry(mapping.key())
                    .or_default()
                    .push(mapping.clone());
            }
        }

        SemanticConfig {
            semantic_fields,
            message_mappings,
            protocol_mappings: self.mappings.protocol_mappings().cloned().collect(),
            concepts: self.concepts.concepts().cloned().collect(),
        }
    }

    /// Register everything in a document as if created live, re-deriving
    /// inverses of bidirectional mappings.
    pub fn apply_semantic_config(&mut self, config: SemanticConfig) {
        for concept in config.concepts {
            self.concepts.register_concept(concept);
        }
        for (semantic_id, entry) in config.semantic_fields {
            self.semantics.register_semantic_field(entry.into_field(semantic_id));
        }
        for mapping in config.protocol_mappings {
            self.mappings.register_protocol_mapping(mapping);
        }
        for mapping in config.message_mappings.into_values().flatten() {
            self.mappings.register_message_mapping(mapping);
        }
    }

    /// Write the semantic configuration to `path`.
    pub fn export_semantic_config(&self, path: impl AsRef<Path>) -> CdmResult<()> {
        let path = path.as_ref();
        self.semantic_config().save(path)?;
        tracing::info!(path = %path.display(), "exported semantic config");
        Ok(())
    }

    /// Load a semantic configuration from `path` and register its contents.
    pub fn import_semantic_config(&mut self, path: impl AsRef<Path>) -> CdmResult<()> {
        let path = path.as_ref();
        let config = SemanticConfig::load(path)?;
        self.apply_semantic_config(config);
        tracing::info!(path = %path.display(), "imported semantic config");
        Ok(())
    }
}

fn builtin_message_mappings() -> Vec<MessageMapping> {
    vec![
        MessageMapping::new(
            MessageStandard::MilStd6016,
            "J2.0",
            MessageStandard::MavLink,
            "GLOBAL_POSITION_INT",
            vec![
                FieldMapping::new("latitude", "lat")
                    .with_scale(1e7)
                    .with_transform(Transform::DegreeToInt),
                FieldMapping::new("longitude", "lon")
                    .with_scale(1e7)
                    .with_transform(Transform::DegreeToInt),
                FieldMapping::new("altitude", "alt")
                    .with_scale(1000.0)
                    .with_transform(Transform::MeterToMm),
                FieldMapping::new("track_id", "sysid"),
            ],
        ),
        MessageMapping::new(
            MessageStandard::Mqtt,
            "PUBLISH",
            MessageStandard::MilStd6016,
            "J2.1",
            vec![
                FieldMapping::new("client_id", "reporting_post"),
                FieldMapping::new("payload", "status_data")
                    .with_transform(Transform::from_name("json_to_milstd_format")),
            ],
        )
        .one_way(),
    ]
}
