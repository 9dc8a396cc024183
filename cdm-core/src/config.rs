//! Semantic configuration document.
//!
//! The document carries the semantic field dictionary and the message
//! mappings, plus the protocol rule sets and concepts so that an import
//! reproduces CDM conversions too. The format follows the file extension:
//! `.yaml`/`.yml` is YAML, anything else is JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::concept::Concept;
use crate::error::{CdmError, CdmResult};
use crate::mapping::{MessageMapping, ProtocolMapping};
use crate::semantic::SemanticField;
use crate::vocab::{FieldType, SemanticCategory};

/// Document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick a format from the file extension; anything but yaml/yml is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::Yaml
            }
            _ => Self::Json,
        }
    }
}

/// A semantic field entry, keyed by semantic id in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEntry {
    pub name: String,
    pub category: SemanticCategory,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_max: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl FieldEntry {
    /// Document entry for a registered field.
    pub fn from_field(field: &SemanticField) -> Self {
        Self {
            name: field.name.clone(),
            category: field.category,
            field_type: field.field_type,
            unit: field.unit.clone(),
            range_min: field.range_min,
            range_max: field.range_max,
            description: field.description.clone(),
            aliases: field.aliases.clone(),
        }
    }

    /// Rebuild the field stored under `semantic_id`.
    pub fn into_field(self, semantic_id: String) -> SemanticField {
        SemanticField {
            name: self.name,
            semantic_id,
            category: self.category,
            field_type: self.field_type,
            unit: self.unit,
            range_min: self.range_min,
            range_max: self.range_max,
            description: self.description,
            aliases: self.aliases,
        }
    }
}

/// The export/import document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticConfig {
    #[serde(default)]
    pub semantic_fields: BTreeMap<String, FieldEntry>,
    /// `"source:target"` -> mappings. Derived inverses are not listed.
    #[serde(default)]
    pub message_mappings: BTreeMap<String, Vec<MessageMapping>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocol_mappings: Vec<ProtocolMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<Concept>,
}

impl SemanticConfig {
    /// Serialize in the given format.
    pub fn to_string_as(&self, format: DocumentFormat) -> CdmResult<String> {
        Ok(match format {
            DocumentFormat::Json => serde_json::to_string_pretty(self)?,
            DocumentFormat::Yaml => serde_yaml::to_string(self)?,
        })
    }

    /// Parse a document and check every mapping is filed under its own key.
    pub fn from_str_as(text: &str, format: DocumentFormat) -> CdmResult<Self> {
        let config: Self = match format {
            DocumentFormat::Json => serde_json::from_str(text)?,
            DocumentFormat::Yaml => serde_yaml::from_str(text)?,
        };
        config.check()?;
        Ok(config)
    }

    /// Write the document, choosing the format from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> CdmResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_string_as(DocumentFormat::from_path(path))?)?;
        Ok(())
    }

    /// Read a document, choosing the format from the extension.
    pub fn load(path: impl AsRef<Path>) -> CdmResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_str_as(&text, DocumentFormat::from_path(path))
    }

    /// Every mapping must sit under its own `"source:target"` key.
    fn check(&self) -> CdmResult<()> {
        for (key, mappings) in &self.message_mappings {
            if let Some(stray) = mappings.iter().find(|m| m.key() != *key) {
                return Err(CdmError::Configuration(format!(
                    "mapping {} -> {} listed under {key}, expected {}",
                    stray.source_message,
                    stray.target_message,
                    stray.key()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::FieldMapping;
    use crate::vocab::MessageStandard;

    fn sample() -> SemanticConfig {
        let field = SemanticField::new(
            "heading",
            "sem.nav.heading",
            SemanticCategory::Navigation,
            FieldType::Float,
        )
        .with_unit("rad")
        .with_aliases(["hdg", "yaw"]);
        let mapping = MessageMapping::new(
            MessageStandard::MavLink,
            "VFR_HUD",
            MessageStandard::MilStd6016,
            "J2.2",
            vec![FieldMapping::new("heading", "course").with_scale(100.0)],
        );
        SemanticConfig {
            semantic_fields: BTreeMap::from([(
                field.semantic_id.clone(),
                FieldEntry::from_field(&field),
            )]),
            message_mappings: BTreeMap::from([(mapping.key(), vec![mapping])]),
            ..SemanticConfig::default()
        }
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("a/b.yaml")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("b.YML")), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("b.json")), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("config")), DocumentFormat::Json);
    }

    #[test]
    fn yaml_document_uses_type_key() {
        let text = sample().to_string_as(DocumentFormat::Yaml).unwrap();
        assert!(text.contains("type: float"));
        assert!(text.contains("MAVLink:MIL-STD-6016"));
        let parsed = SemanticConfig::from_str_as(&text, DocumentFormat::Yaml).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn misfiled_mapping_is_rejected() {
        let mut config = sample();
        let mappings = config.message_mappings.remove("MAVLink:MIL-STD-6016").unwrap();
        config.message_mappings.insert("MQTT:CDM".to_string(), mappings);
        let text = config.to_string_as(DocumentFormat::Json).unwrap();
        let err = SemanticConfig::from_str_as(&text, DocumentFormat::Json).unwrap_err();
        assert!(matches!(err, CdmError::Configuration(_)));
    }

    #[test]
    fn unknown_category_is_error() {
        let text = r#"{"semantic_fields": {"sem.x": {"name": "x", "category": "weather", "type": "float"}}}"#;
        let err = SemanticConfig::from_str_as(text, DocumentFormat::Json).unwrap_err();
        assert!(matches!(err, CdmError::Serialization(_)));
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("semantic.json");
        sample().save(&path).unwrap();
        assert_eq!(SemanticConfig::load(&path).unwrap(), sample());
    }
}
