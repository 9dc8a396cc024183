//! # cdm-core
//!
//! Semantic mediation between tactical and telemetry message standards
//! through a protocol-neutral Canonical Data Model (CDM).
//!
//! This crate provides the concept, unit and semantic field registries,
//! declarative mapping rules with bidirectional inversion, the validator,
//! the message converter, the priority router and the interoperability
//! manager that composes them.

pub mod concept;
pub mod config;
pub mod converter;
pub mod error;
pub mod fingerprint;
pub mod manager;
pub mod mapping;
pub mod message;
pub mod router;
pub mod rules;
pub mod semantic;
pub mod state;
pub mod units;
pub mod validation;
pub mod vocab;

pub use concept::{Concept, ConceptRegistry};
pub use config::{DocumentFormat, FieldEntry, SemanticConfig};
pub use converter::{apply_rule_conversion, CdmMessage, CdmValue, ConversionResult, MessageConverter};
pub use error::{CdmError, CdmResult, ConversionWarning, ValidationIssue, ValidationNotice};
pub use fingerprint::{canonicalize_json, fingerprint};
pub use manager::{FieldSemantics, InteropManager, ProcessingResult, SemanticAnalysis, Statistics};
pub use mapping::{AuditAction, AuditEntry, MappingRegistry, MessageMapping, ProtocolMapping};
pub use message::{Message, MESSAGE_TYPE_KEY};
pub use router::{MessageHandler, MessageRouter, RouteCondition, RouteOutcome, RoutedMessage, RuleSummary};
pub use rules::{BitRange, FieldMapping, MappingRule, RuleCondition, Transform};
pub use semantic::{FieldResolver, SemanticField, SemanticRegistry, SubstringResolver};
pub use state::{DispatchEvent, DispatchState};
pub use units::UnitTable;
pub use validation::{GoldenSample, ValidationResult, Validator};
pub use vocab::{CoordinateFrame, DataKind, FieldType, MessageStandard, SemanticCategory, Unit, UnitFamily};

/// CDM schema version.
pub const CDM_VERSION: &str = "1.0";
