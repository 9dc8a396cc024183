//! Mapping Registry: versioned CDM rule sets and message-level mappings.
//!
//! Two kinds of mapping live here:
//! - [`ProtocolMapping`]: rule sets between one standard and the CDM, keyed
//!   `"source→target"` and grouped by message type.
//! - [`MessageMapping`]: direct standard-to-standard mappings keyed
//!   `"source:target"`, with automatic inversion when bidirectional.
//!
//! Every registration appends an [`AuditEntry`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::concept::default_version;
use crate::error::CdmResult;
use crate::fingerprint::fingerprint;
use crate::rules::{FieldMapping, MappingRule};
use crate::vocab::{MessageStandard, Unit};

/// Rule sets from one standard to another, grouped by message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMapping {
    pub source_standard: MessageStandard,
    pub target_standard: MessageStandard,
    pub message_mappings: BTreeMap<String, Vec<MappingRule>>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ProtocolMapping {
    /// Create a protocol mapping at the current version.
    pub fn new(
        source_standard: MessageStandard,
        target_standard: MessageStandard,
        message_mappings: BTreeMap<String, Vec<MappingRule>>,
    ) -> Self {
        Self {
            source_standard,
            target_standard,
            message_mappings,
            version: default_version(),
            author: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Registry key, `source→target`.
    pub fn key(&self) -> String {
        protocol_key(self.source_standard, self.target_standard)
    }

    /// Total rules across all message types.
    pub fn rule_count(&self) -> usize {
        self.message_mappings.values().map(Vec::len).sum()
    }
}

/// Message-level mapping between two standards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMapping {
    pub source_message: String,
    pub target_message: String,
    pub source_standard: MessageStandard,
    pub target_standard: MessageStandard,
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_bidirectional")]
    pub bidirectional: bool,
    /// Synthesised by inversion; never re-inverted and never exported.
    #[serde(skip)]
    pub derived: bool,
}

fn default_bidirectional() -> bool {
    true
}

impl MessageMapping {
    /// Create a bidirectional mapping at priority 0.
    pub fn new(
        source_standard: MessageStandard,
        source_message: impl Into<String>,
        target_standard: MessageStandard,
        target_message: impl Into<String>,
        field_mappings: Vec<FieldMapping>,
    ) -> Self {
        Self {
            source_message: source_message.into(),
            target_message: target_message.into(),
            source_standard,
            target_standard,
            field_mappings,
            priority: 0,
            bidirectional: true,
            derived: false,
        }
    }

    /// Set the selection priority; higher wins.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Do not derive an inverse.
    pub fn one_way(mut self) -> Self {
        self.bidirectional = false;
        self
    }

    /// Registry key, `source:target`.
    pub fn key(&self) -> String {
        message_key(self.source_standard, self.target_standard)
    }

    /// The reverse mapping: standards and messages swapped, every field
    /// mapping inverted, not bidirectional.
    pub fn inverted(&self) -> Self {
        Self {
            source_message: self.target_message.clone(),
            target_message: self.source_message.clone(),
            source_standard: self.target_standard,
            target_standard: self.source_standard,
            field_mappings: self.field_mappings.iter().map(FieldMapping::inverted).collect(),
            priority: self.priority,
            bidirectional: false,
            derived: true,
        }
    }

    /// Rules for the shared conversion pipeline.
    pub fn rules(&self) -> Vec<MappingRule> {
        self.field_mappings.iter().map(FieldMapping::as_rule).collect()
    }

    fn same_slot(&self, other: &MessageMapping) -> bool {
        self.source_message == other.source_message && self.target_message == other.target_message
    }
}

/// Audit trail action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RegisterMapping,
    RegisterMessageMapping,
    RegisterDerivedMapping,
    RetireDerivedMapping,
}

/// Append-only record of a registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// SHA-256 over the canonical JSON of what was registered.
    pub fingerprint: String,
}

/// Key of a protocol mapping.
pub fn protocol_key(source: MessageStandard, target: MessageStandard) -> String {
    format!("{source}→{target}")
}

/// Key of a message mapping.
pub fn message_key(source: MessageStandard, target: MessageStandard) -> String {
    format!("{source}:{target}")
}

/// Registry of protocol and message mappings.
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    protocol_mappings: BTreeMap<String, ProtocolMapping>,
    message_mappings: BTreeMap<String, Vec<MessageMapping>>,
    audit_trail: Vec<AuditEntry>,
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingRegistry {
    /// Registry seeded with the built-in CDM rule sets.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        match builtin_protocol_mappings() {
            Ok(mappings) => {
                for mapping in mappings {
                    registry.register_protocol_mapping(mapping);
                }
            }
            Err(e) => tracing::error!("built-in mappings rejected: {}", e),
        }
        registry
    }

    /// Registry with no seeded mappings.
    pub fn empty() -> Self {
        Self {
            protocol_mappings: BTreeMap::new(),
            message_mappings: BTreeMap::new(),
            audit_trail: Vec::new(),
        }
    }

    /// Register rule sets for `source → target`, replacing any previous set
    /// for the pair.
    pub fn register_mapping(
        &mut self,
        source: MessageStandard,
        target: MessageStandard,
        message_map: BTreeMap<String, Vec<MappingRule>>,
    ) {
        self.register_protocol_mapping(ProtocolMapping::new(source, target, message_map));
    }

    /// Register a fully described protocol mapping.
    pub fn register_protocol_mapping(&mut self, mapping: ProtocolMapping) {
        let key = mapping.key();
        self.audit(
            AuditAction::RegisterMapping,
            &key,
            &mapping.version,
            &mapping.message_mappings,
        );
        tracing::info!(key = %key, rules = mapping.rule_count(), "registered mapping");
        self.protocol_mappings.insert(key, mapping);
    }

    /// Rules for a message type; empty when the pair or type is unknown.
    pub fn get_mapping_rules(
        &self,
        source: MessageStandard,
        target: MessageStandard,
        message_type: &str,
    ) -> &[MappingRule] {
        self.protocol_mappings
            .get(&protocol_key(source, target))
            .and_then(|m| m.message_mappings.get(message_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The protocol mapping for a pair, if any.
    pub fn protocol_mapping(
        &self,
        source: MessageStandard,
        target: MessageStandard,
    ) -> Option<&ProtocolMapping> {
        self.protocol_mappings.get(&protocol_key(source, target))
    }

    /// All protocol mappings in key order.
    pub fn protocol_mappings(&self) -> impl Iterator<Item = &ProtocolMapping> {
        self.protocol_mappings.values()
    }

    /// Register a message mapping. A mapping for the same standards and
    /// messages is replaced. When `bidirectional`, the inverse is derived and
    /// registered too; derived mappings are never inverted again. A one-way
    /// registration retires the inverse an earlier bidirectional one derived.
    pub fn register_message_mapping(&mut self, mapping: MessageMapping) {
        if !mapping.bidirectional && !mapping.derived {
            self.retire_derived_inverse(&mapping);
        }
        let inverse = (mapping.bidirectional && !mapping.derived).then(|| mapping.inverted());
        self.upsert_message_mapping(mapping);
        if let Some(inverse) = inverse {
            self.upsert_message_mapping(inverse);
        }
    }

    fn retire_derived_inverse(&mut self, mapping: &MessageMapping) {
        let reverse_key = message_key(mapping.target_standard, mapping.source_standard);
        let Some(entries) = self.message_mappings.get_mut(&reverse_key) else {
            return;
        };
        let Some(pos) = entries.iter().position(|existing| {
            existing.derived
                && existing.source_message == mapping.target_message
                && existing.target_message == mapping.source_message
        }) else {
            return;
        };
        let retired = entries.remove(pos);
        if entries.is_empty() {
            self.message_mappings.remove(&reverse_key);
        }
        let slot_key = format!(
            "{reverse_key}/{}->{}",
            retired.source_message, retired.target_message
        );
        self.audit(AuditAction::RetireDerivedMapping, &slot_key, &default_version(), &retired);
        tracing::info!(mapping = %slot_key, "retired derived message mapping");
    }

    fn upsert_message_mapping(&mut self, mapping: MessageMapping) {
        let key = mapping.key();
        let action = if mapping.derived {
            AuditAction::RegisterDerivedMapping
        } else {
            AuditAction::RegisterMessageMapping
        };
        let slot_key = format!("{key}/{}->{}", mapping.source_message, mapping.target_message);
        self.audit(action, &slot_key, &default_version(), &mapping);

        let entries = self.message_mappings.entry(key).or_default();
        match entries.iter_mut().find(|existing| existing.same_slot(&mapping)) {
            Some(existing) => {
                tracing::info!(mapping = %slot_key, "replaced message mapping");
                *existing = mapping;
            }
            None => {
                tracing::info!(mapping = %slot_key, "registered message mapping");
                entries.push(mapping);
            }
        }
    }

    /// Highest-priority mapping for a source message; ties go to the
    /// earliest registration.
    pub fn find_message_mapping(
        &self,
        source: MessageStandard,
        target: MessageStandard,
        source_message: &str,
    ) -> Option<&MessageMapping> {
        self.mapping_rules_between(source, target)
            .iter()
            .filter(|m| m.source_message == source_message)
            .fold(None, |best: Option<&MessageMapping>, m| match best {
                Some(b) if b.priority >= m.priority => Some(b),
                _ => Some(m),
            })
    }

    /// Message mappings registered for a pair, in registration order.
    pub fn mapping_rules_between(
        &self,
        source: MessageStandard,
        target: MessageStandard,
    ) -> &[MessageMapping] {
        self.message_mappings
            .get(&message_key(source, target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any message mapping exists for the pair.
    pub fn has_message_mappings(&self, source: MessageStandard, target: MessageStandard) -> bool {
        !self.mapping_rules_between(source, target).is_empty()
    }

    /// All message mappings, grouped by `"source:target"`.
    pub fn message_mappings(&self) -> impl Iterator<Item = (&String, &Vec<MessageMapping>)> {
        self.message_mappings.iter()
    }

    /// Every message mapping, forward and derived, in key order.
    pub fn list_message_mappings(&self) -> Vec<&MessageMapping> {
        self.message_mappings.values().flatten().collect()
    }

    /// Number of message mappings, derived included.
    pub fn message_mapping_count(&self) -> usize {
        self.message_mappings.values().map(Vec::len).sum()
    }

    /// Total protocol mapping rules.
    pub fn rule_count(&self) -> usize {
        self.protocol_mappings.values().map(ProtocolMapping::rule_count).sum()
    }

    /// Every registration so far, oldest first.
    pub fn audit_trail(&self) -> &[AuditEntry] {
        &self.audit_trail
    }

    fn audit<T: Serialize + ?Sized>(&mut self, action: AuditAction, key: &str, version: &str, content: &T) {
        let fingerprint = fingerprint(content).unwrap_or_else(|e| {
            tracing::warn!(key = %key, "could not fingerprint registration: {}", e);
            String::new()
        });
        self.audit_trail.push(AuditEntry {
            action,
            key: key.to_string(),
            timestamp: Utc::now(),
            version: version.to_string(),
            fingerprint,
        });
    }
}

fn builtin_protocol_mappings() -> CdmResult<Vec<ProtocolMapping>> {
    let engagement_codes = [
        ("0", "No_Engagement"),
        ("1", "Engaging"),
        ("2", "Engaged"),
        ("3", "Cease_Fire"),
        ("4", "Hold_Fire"),
    ];

    let weapon_status_in = vec![
        MappingRule::new("bits[0:5]", "Weapon.EngagementStatus", "wes")
            .with_enum_mapping(engagement_codes)
            .with_bit_range(0, 5)?
            .with_provenance("1.3", "system"),
        MappingRule::new("bits[6:15]", "Track.Identity", "track_id")
            .with_bit_range(6, 15)?
            .with_provenance("1.3", "system"),
    ];
    let weapon_status_out = vec![
        MappingRule::new("Weapon.EngagementStatus", "Weapon.EngagementStatus", "wes")
            .with_provenance("1.1", "system"),
        MappingRule::new("Track.Identity", "Track.Identity", "track_id")
            .with_provenance("1.1", "system"),
    ];
    let attitude_in = vec![
        MappingRule::new("roll", "Vehicle.Attitude.Roll", "roll")
            .with_units(Unit::Radian, Unit::Radian)
            .with_provenance("1.0", "system"),
        MappingRule::new("pitch", "Vehicle.Attitude.Pitch", "pitch")
            .with_units(Unit::Radian, Unit::Radian)
            .with_provenance("1.0", "system"),
        MappingRule::new("yaw", "Vehicle.Attitude.HeadingTrue", "yaw")
            .with_units(Unit::Radian, Unit::Radian)
            .with_provenance("1.0", "system"),
    ];
    // 0.01 rad per LSB
    let attitude_out = vec![
        MappingRule::new("Vehicle.Attitude.Roll", "Vehicle.Attitude.Roll", "bits[10:21]")
            .with_bit_range(10, 21)?
            .with_scale(100.0)
            .with_provenance("1.0", "system"),
        MappingRule::new("Vehicle.Attitude.HeadingTrue", "Vehicle.Attitude.HeadingTrue", "bits[22:33]")
            .with_bit_range(22, 33)?
            .with_scale(100.0)
            .with_provenance("1.0", "system"),
    ];

    Ok(vec![
        ProtocolMapping::new(
            MessageStandard::MilStd6016,
            MessageStandard::Cdm,
            BTreeMap::from([("J10.2".to_string(), weapon_status_in)]),
        ),
        ProtocolMapping::new(
            MessageStandard::Cdm,
            MessageStandard::Mqtt,
            BTreeMap::from([("J10.2".to_string(), weapon_status_out)]),
        ),
        ProtocolMapping::new(
            MessageStandard::MavLink,
            MessageStandard::Cdm,
            BTreeMap::from([("ATTITUDE".to_string(), attitude_in)]),
        ),
        ProtocolMapping::new(
            MessageStandard::Cdm,
            MessageStandard::MilStd6016,
            BTreeMap::from([("ATTITUDE".to_string(), attitude_out)]),
        ),
    ])
}
