//! Cross-standard semantic field identities.
//!
//! Fields are indexed under their `semantic_id` and every alias in one table.
//! Lookups that miss the index fall through to a [`FieldResolver`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::vocab::{FieldType, SemanticCategory};

/// Cross-standard field identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticField {
    pub name: String,
    /// Namespaced id, e.g. `sem.pos.latitude`.
    pub semantic_id: String,
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

impl SemanticField {
    /// Create a field with no aliases.
    pub fn new(
        name: impl Into<String>,
        semantic_id: impl Into<String>,
        category: SemanticCategory,
        field_type: FieldType,
    ) -> Self {
        Self {
            name: name.into(),
            semantic_id: semantic_id.into(),
            category,
            field_type,
            unit: None,
            range_min: None,
            range_max: None,
            description: String::new(),
            aliases: Vec::new(),
        }
    }

    /// Set the unit label.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the inclusive value range.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range_min = Some(min);
        self.range_max = Some(max);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add alternative names matched exactly.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }
}

/// Fallback resolution for names the exact index does not know.
///
/// `fields` is given in registration order.
pub trait FieldResolver: Send + Sync {
    fn resolve<'a>(&self, name: &str, fields: &'a [SemanticField]) -> Option<&'a SemanticField>;
}

/// Case-insensitive substring matching against names and aliases.
///
/// The first field in registration order wins; ties between fields are not
/// broken any other way.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringResolver;

impl FieldResolver for SubstringResolver {
    fn resolve<'a>(&self, name: &str, fields: &'a [SemanticField]) -> Option<&'a SemanticField> {
        let needle = name.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        fields.iter().find(|field| {
            field.name.to_lowercase().contains(&needle)
                || field
                    .aliases
                    .iter()
                    .any(|alias| alias.to_lowercase().contains(&needle))
        })
    }
}

/// Registry of semantic fields.
pub struct SemanticRegistry {
    fields: Vec<SemanticField>,
    index: HashMap<String, usize>,
    resolver: Box<dyn FieldResolver>,
}

impl Default for SemanticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SemanticRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticRegistry")
            .field("fields", &self.fields.len())
            .field("index", &self.index.len())
            .finish()
    }
}

impl SemanticRegistry {
    /// Registry seeded with the built-in fields and substring resolution.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for field in builtin_fields() {
            registry.register_semantic_field(field);
        }
        registry
    }

    /// Empty registry with substring resolution.
    pub fn empty() -> Self {
        Self::with_resolver(Box::new(SubstringResolver))
    }

    /// Empty registry with a custom fallback resolver.
    pub fn with_resolver(resolver: Box<dyn FieldResolver>) -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
            resolver,
        }
    }

    /// Index a field under its id and each alias. Re-registering an id
    /// replaces the field in place; an alias claimed by another field moves
    /// to the newest registration.
    pub fn register_semantic_field(&mut self, field: SemanticField) {
        // the index may point an id at another field's alias, so match by id
        let existing = self
            .fields
            .iter()
            .position(|f| f.semantic_id == field.semantic_id);
        let slot = match existing {
            Some(slot) => {
                let stale: Vec<String> = self.fields[slot].aliases.clone();
                for alias in stale {
                    if self.index.get(&alias) == Some(&slot) {
                        self.index.remove(&alias);
                    }
                }
                self.fields[slot] = field;
                slot
            }
            None => {
                self.fields.push(field);
                self.fields.len() - 1
            }
        };

        let field = &self.fields[slot];
        self.index.insert(field.semantic_id.clone(), slot);
        for alias in &field.aliases {
            if let Some(previous) = self.index.insert(alias.clone(), slot) {
                if previous != slot {
                    tracing::warn!(
                        alias = %alias,
                        from = %self.fields[previous].semantic_id,
                        to = %field.semantic_id,
                        "semantic alias reassigned"
                    );
                }
            }
        }
        tracing::info!(semantic_id = %field.semantic_id, "registered semantic field");
    }

    /// Exact id/alias match first, then the fallback resolver.
    pub fn find_semantic_field(&self, name: &str) -> Option<&SemanticField> {
        if let Some(&slot) = self.index.get(name) {
            return Some(&self.fields[slot]);
        }
        self.resolver.resolve(name, &self.fields)
    }

    /// Lookup by canonical id only.
    pub fn get(&self, semantic_id: &str) -> Option<&SemanticField> {
        self.index
            .get(semantic_id)
            .map(|&slot| &self.fields[slot])
            .filter(|field| field.semantic_id == semantic_id)
    }

    /// Fields in registration order.
    pub fn fields(&self) -> &[SemanticField] {
        &self.fields
    }

    /// Number of registered fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields filtered by category and a search term over name/description.
    pub fn list_semantic_fields(
        &self,
        category: Option<SemanticCategory>,
        search: Option<&str>,
    ) -> Vec<&SemanticField> {
        let search = search.map(str::to_lowercase);
        self.fields
            .iter()
            .filter(|f| category.map_or(true, |c| f.category == c))
            .filter(|f| {
                search.as_deref().map_or(true, |term| {
                    f.name.to_lowercase().contains(term)
                        || f.description.to_lowercase().contains(term)
                })
            })
            .collect()
    }
}

fn builtin_fields() -> Vec<SemanticField> {
    vec![
        SemanticField::new(
            "platform_id",
            "sem.id.platform",
            SemanticCategory::Identification,
            FieldType::Identifier,
        )
        .with_description("Platform identifier")
        .with_aliases(["track_id", "unit_id", "source_id", "sender_id"]),
        SemanticField::new(
            "latitude",
            "sem.pos.latitude",
            SemanticCategory::Position,
            FieldType::Float,
        )
        .with_unit("degree")
        .with_range(-90.0, 90.0)
        .with_description("Latitude")
        .with_aliases(["lat", "y_coord"]),
        SemanticField::new(
            "longitude",
            "sem.pos.longitude",
            SemanticCategory::Position,
            FieldType::Float,
        )
        .with_unit("degree")
        .with_range(-180.0, 180.0)
        .with_description("Longitude")
        .with_aliases(["lon", "lng", "x_coord"]),
        SemanticField::new(
            "altitude",
            "sem.pos.altitude",
            SemanticCategory::Position,
            FieldType::Float,
        )
        .with_unit("meter")
        .with_description("Altitude")
        .with_aliases(["alt", "height", "z_coord"]),
        SemanticField::new(
            "timestamp",
            "sem.time.timestamp",
            SemanticCategory::Timing,
            FieldType::Timestamp,
        )
        .with_unit("second")
        .with_description("Timestamp")
        .with_aliases(["time", "time_stamp", "message_time"]),
        SemanticField::new(
            "velocity_x",
            "sem.nav.velocity.x",
            SemanticCategory::Navigation,
            FieldType::Float,
        )
        .with_unit("m/s")
        .with_description("Velocity along X")
        .with_aliases(["vx", "vel_x", "speed_x"]),
        SemanticField::new(
            "velocity_y",
            "sem.nav.velocity.y",
            SemanticCategory::Navigation,
            FieldType::Float,
        )
        .with_unit("m/s")
        .with_description("Velocity along Y")
        .with_aliases(["vy", "vel_y", "speed_y"]),
        SemanticField::new(
            "status_code",
            "sem.status.code",
            SemanticCategory::Status,
            FieldType::Enum,
        )
        .with_description("Status code")
        .with_aliases(["status", "state", "mode"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_id_and_alias_share_one_field() {
        let registry = SemanticRegistry::new();
        let by_id = registry.find_semantic_field("sem.pos.latitude").unwrap();
        let by_alias = registry.find_semantic_field("lat").unwrap();
        assert_eq!(by_id, by_alias);
        assert_eq!(by_alias.name, "latitude");
    }

    #[test]
    fn every_alias_resolves_to_its_field() {
        let registry = SemanticRegistry::new();
        for field in registry.fields() {
            for alias in &field.aliases {
                let found = registry.find_semantic_field(alias).unwrap();
                assert_eq!(found.semantic_id, field.semantic_id, "alias {alias}");
            }
        }
    }

    #[test]
    fn fuzzy_match_is_case_insensitive_substring() {
        let registry = SemanticRegistry::new();
        assert_eq!(
            registry.find_semantic_field("LATITUDE").unwrap().semantic_id,
            "sem.pos.latitude"
        );
        assert_eq!(
            registry.find_semantic_field("Speed_Y").unwrap().semantic_id,
            "sem.nav.velocity.y"
        );
        assert!(registry.find_semantic_field("message_type").is_none());
        assert!(registry.find_semantic_field("").is_none());
    }

    #[test]
    fn fuzzy_ties_resolve_in_registration_order() {
        // "velocity" is a substring of both velocity_x and velocity_y; the
        // earlier registration wins.
        let registry = SemanticRegistry::new();
        assert_eq!(
            registry.find_semantic_field("velocity").unwrap().semantic_id,
            "sem.nav.velocity.x"
        );

        let mut reordered = SemanticRegistry::empty();
        reordered.register_semantic_field(
            SemanticField::new("velocity_y", "sem.nav.velocity.y", SemanticCategory::Navigation, FieldType::Float),
        );
        reordered.register_semantic_field(
            SemanticField::new("velocity_x", "sem.nav.velocity.x", SemanticCategory::Navigation, FieldType::Float),
        );
        assert_eq!(
            reordered.find_semantic_field("velocity").unwrap().semantic_id,
            "sem.nav.velocity.y"
        );
    }

    #[test]
    fn reregistration_replaces_in_place() {
        let mut registry = SemanticRegistry::new();
        let before = registry.len();
        registry.register_semantic_field(
            SemanticField::new("latitude", "sem.pos.latitude", SemanticCategory::Position, FieldType::Float)
                .with_aliases(["phi"]),
        );
        assert_eq!(registry.len(), before);
        assert_eq!(registry.find_semantic_field("phi").unwrap().semantic_id, "sem.pos.latitude");
        // The dropped alias now only matches by substring on the name.
        assert!(registry.find_semantic_field("y_coord").is_none());
    }

    #[test]
    fn reregistered_id_claimed_as_alias_stays_unique() {
        let field = |name: &str, id: &str| {
            SemanticField::new(name, id, SemanticCategory::Status, FieldType::Integer)
        };
        let mut registry = SemanticRegistry::empty();
        registry.register_semantic_field(field("alpha", "sem.a"));
        registry.register_semantic_field(field("beta", "sem.b").with_aliases(["sem.a"]));
        registry.register_semantic_field(field("alpha_v2", "sem.a"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.fields().iter().filter(|f| f.semantic_id == "sem.a").count(), 1);
        assert_eq!(registry.find_semantic_field("sem.a").unwrap().name, "alpha_v2");
        assert_eq!(registry.find_semantic_field("sem.b").unwrap().name, "beta");
    }

    #[test]
    fn alias_moves_to_newest_field() {
        let mut registry = SemanticRegistry::new();
        registry.register_semantic_field(
            SemanticField::new("track_number", "sem.id.track", SemanticCategory::Identification, FieldType::Identifier)
                .with_aliases(["track_id"]),
        );
        assert_eq!(registry.find_semantic_field("track_id").unwrap().semantic_id, "sem.id.track");
        assert_eq!(registry.find_semantic_field("unit_id").unwrap().semantic_id, "sem.id.platform");
    }

    #[test]
    fn custom_resolver_is_used_on_miss() {
        struct Never;
        impl FieldResolver for Never {
            fn resolve<'a>(&self, _: &str, _: &'a [SemanticField]) -> Option<&'a SemanticField> {
                None
            }
        }
        let mut registry = SemanticRegistry::with_resolver(Box::new(Never));
        registry.register_semantic_field(
            SemanticField::new("latitude", "sem.pos.latitude", SemanticCategory::Position, FieldType::Float)
                .with_aliases(["lat"]),
        );
        assert!(registry.find_semantic_field("lat").is_some());
        assert!(registry.find_semantic_field("latitude").is_none());
    }

    #[test]
    fn list_filters() {
        let registry = SemanticRegistry::new();
        assert_eq!(
            registry.list_semantic_fields(Some(SemanticCategory::Position), None).len(),
            3
        );
        assert_eq!(registry.list_semantic_fields(None, Some("velocity")).len(), 2);
    }
}
