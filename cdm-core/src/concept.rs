//! Canonical concepts and the Unit & Concept Registry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::units::UnitTable;
use crate::validation::ValidationResult;
use crate::vocab::{CoordinateFrame, DataKind, Unit};

/// A named, typed point in the canonical vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Dotted identifier, e.g. `Track.Position.Latitude`.
    pub path: String,
    pub data_kind: DataKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    /// Inclusive `(min, max)`; only checked for numeric values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_range: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinate_frame: Option<CoordinateFrame>,
    /// Enum code -> label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub source: String,
    /// Seconds a value stays valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_validity: Option<f64>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_confidence() -> f64 {
    1.0
}

pub(crate) fn default_version() -> String {
    crate::CDM_VERSION.to_string()
}

impl Concept {
    /// Create a concept with default confidence and the current version.
    pub fn new(path: impl Into<String>, data_kind: DataKind) -> Self {
        Self {
            path: path.into(),
            data_kind,
            unit: None,
            value_range: None,
            resolution: None,
            coordinate_frame: None,
            enum_values: None,
            description: String::new(),
            confidence: 1.0,
            source: String::new(),
            temporal_validity: None,
            version: default_version(),
            created_at: Utc::now(),
        }
    }

    /// Set the canonical unit.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the inclusive value range.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.value_range = Some((min, max));
        self
    }

    /// Set the declared resolution.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Set the coordinate frame.
    pub fn with_frame(mut self, frame: CoordinateFrame) -> Self {
        self.coordinate_frame = Some(frame);
        self
    }

    /// Set the enum code -> label table.
    pub fn with_enum_values<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.enum_values = Some(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Seconds a value of this concept stays valid.
    pub fn with_temporal_validity(mut self, seconds: f64) -> Self {
        self.temporal_validity = Some(seconds);
        self
    }

    /// Set where the concept definition came from.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// First path segment, used as the listing category.
    pub fn category(&self) -> &str {
        self.path.split('.').next().unwrap_or_default()
    }
}

/// Registry of concepts plus the unit conversion table.
#[derive(Debug, Clone)]
pub struct ConceptRegistry {
    concepts: BTreeMap<String, Concept>,
    units: UnitTable,
}

impl Default for ConceptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConceptRegistry {
    /// Registry seeded with the built-in concepts and unit factors.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.units = UnitTable::seeded();
        for concept in builtin_concepts() {
            registry.register_concept(concept);
        }
        registry
    }

    /// Registry with no concepts and no unit factors.
    pub fn empty() -> Self {
        Self {
            concepts: BTreeMap::new(),
            units: UnitTable::empty(),
        }
    }

    /// Insert or overwrite by path. Range/resolution consistency is left to
    /// the validator.
    pub fn register_concept(&mut self, concept: Concept) {
        tracing::info!(path = %concept.path, kind = %concept.data_kind, "registered concept");
        self.concepts.insert(concept.path.clone(), concept);
    }

    /// Look up a concept by exact path.
    pub fn get_concept(&self, path: &str) -> Option<&Concept> {
        self.concepts.get(path)
    }

    /// Number of registered concepts.
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// All concepts in path order.
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    /// Concepts filtered by category (first path segment, case-insensitive)
    /// and a search term matched against path or description.
    pub fn list_concepts(&self, category: Option<&str>, search: Option<&str>) -> Vec<&Concept> {
        let category = category.map(str::to_lowercase);
        let search = search.map(str::to_lowercase);
        self.concepts
            .values()
            .filter(|c| {
                category
                    .as_deref()
                    .map_or(true, |cat| c.category().to_lowercase() == cat)
            })
            .filter(|c| {
                search.as_deref().map_or(true, |term| {
                    c.path.to_lowercase().contains(term)
                        || c.description.to_lowercase().contains(term)
                })
            })
            .collect()
    }

    /// The unit-conversion table.
    pub fn units(&self) -> &UnitTable {
        &self.units
    }

    /// Add a linear conversion and its reciprocal.
    pub fn register_unit_conversion(&mut self, from: Unit, to: Unit, factor: f64) {
        tracing::info!(from = %from, to = %to, factor, "registered unit conversion");
        self.units.register_pair(from, to, factor);
    }

    /// Convert between units. Never fails: a missing path returns the input
    /// and records one warning in `report`.
    pub fn convert_unit(&self, value: f64, from: Unit, to: Unit, report: &mut ValidationResult) -> f64 {
        self.units.convert(value, from, to, report)
    }
}

fn builtin_concepts() -> Vec<Concept> {
    vec![
        Concept::new("Track.Identity", DataKind::Identifier)
            .with_description("Unique track identifier"),
        Concept::new("Track.PlatformID", DataKind::String)
            .with_description("Platform identifier"),
        Concept::new("Track.Position.Latitude", DataKind::Float)
            .with_unit(Unit::Degree)
            .with_range(-90.0, 90.0)
            .with_resolution(1e-7)
            .with_frame(CoordinateFrame::Wgs84)
            .with_description("Latitude"),
        Concept::new("Track.Position.Longitude", DataKind::Float)
            .with_unit(Unit::Degree)
            .with_range(-180.0, 180.0)
            .with_resolution(1e-7)
            .with_frame(CoordinateFrame::Wgs84)
            .with_description("Longitude"),
        Concept::new("Track.Position.Altitude", DataKind::Float)
            .with_unit(Unit::Meter)
            .with_resolution(0.1)
            .with_frame(CoordinateFrame::Wgs84)
            .with_description("Altitude"),
        Concept::new("Vehicle.Attitude.Roll", DataKind::Float)
            .with_unit(Unit::Radian)
            .with_range(-3.14159, 3.14159)
            .with_resolution(0.01)
            .with_frame(CoordinateFrame::Body)
            .with_description("Roll angle"),
        Concept::new("Vehicle.Attitude.Pitch", DataKind::Float)
            .with_unit(Unit::Radian)
            .with_range(-1.5708, 1.5708)
            .with_resolution(0.01)
            .with_frame(CoordinateFrame::Body)
            .with_description("Pitch angle"),
        Concept::new("Vehicle.Attitude.HeadingTrue", DataKind::Float)
            .with_unit(Unit::Radian)
            .with_range(0.0, 6.28318)
            .with_resolution(0.01)
            .with_frame(CoordinateFrame::True)
            .with_description("True heading"),
        Concept::new("Weapon.EngagementStatus", DataKind::Enum)
            .with_enum_values([
                ("0", "No_Engagement"),
                ("1", "Engaging"),
                ("2", "Engaged"),
                ("3", "Cease_Fire"),
                ("4", "Hold_Fire"),
            ])
            .with_description("Weapon engagement status"),
        Concept::new("Time.Timestamp", DataKind::Timestamp)
            .with_unit(Unit::Second)
            .with_description("UTC timestamp"),
        Concept::new("Time.TimeBase", DataKind::Timestamp)
            .with_unit(Unit::Second)
            .with_description("Time base"),
        Concept::new("Track.Velocity.X", DataKind::Float)
            .with_unit(Unit::MeterPerSecond)
            .with_resolution(0.1)
            .with_frame(CoordinateFrame::Ned)
            .with_description("Velocity along X"),
        Concept::new("Track.Velocity.Y", DataKind::Float)
            .with_unit(Unit::MeterPerSecond)
            .with_resolution(0.1)
            .with_frame(CoordinateFrame::Ned)
            .with_description("Velocity along Y"),
        Concept::new("Track.Velocity.Z", DataKind::Float)
            .with_unit(Unit::MeterPerSecond)
            .with_resolution(0.1)
            .with_frame(CoordinateFrame::Ned)
            .with_description("Velocity along Z"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_concepts_present() {
        let registry = ConceptRegistry::new();
        assert_eq!(registry.len(), 14);
        let lat = registry.get_concept("Track.Position.Latitude").unwrap();
        assert_eq!(lat.value_range, Some((-90.0, 90.0)));
        assert_eq!(lat.coordinate_frame, Some(CoordinateFrame::Wgs84));
        assert!(registry.get_concept("Track.Position.Depth").is_none());
    }

    #[test]
    fn reregistering_identical_concept_is_idempotent() {
        let mut registry = ConceptRegistry::empty();
        let concept = Concept::new("Sensor.Range", DataKind::Float)
            .with_unit(Unit::Kilometer)
            .with_range(0.0, 400.0);
        registry.register_concept(concept.clone());
        registry.register_concept(concept.clone());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_concept("Sensor.Range"), Some(&concept));
    }

    #[test]
    fn overwrite_is_last_write_wins() {
        let mut registry = ConceptRegistry::empty();
        registry.register_concept(Concept::new("Sensor.Mode", DataKind::String));
        registry.register_concept(Concept::new("Sensor.Mode", DataKind::Enum));
        assert_eq!(
            registry.get_concept("Sensor.Mode").unwrap().data_kind,
            DataKind::Enum
        );
    }

    #[test]
    fn list_by_category_and_search() {
        let registry = ConceptRegistry::new();
        assert_eq!(registry.list_concepts(Some("vehicle"), None).len(), 3);
        let found = registry.list_concepts(None, Some("latitude"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "Track.Position.Latitude");
        assert_eq!(registry.list_concepts(Some("track"), Some("velocity")).len(), 3);
    }

    #[test]
    fn convert_unit_degrades_without_path() {
        let registry = ConceptRegistry::new();
        let mut report = ValidationResult::new();
        let rad = registry.convert_unit(90.0, Unit::Degree, Unit::Radian, &mut report);
        assert!((rad - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!(report.warnings.is_empty());

        let same = registry.convert_unit(10.0, Unit::Hertz, Unit::Second, &mut report);
        assert_eq!(same, 10.0);
        assert_eq!(report.warnings.len(), 1);
    }
}
