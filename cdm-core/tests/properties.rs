//! End-to-end behaviour of the mediation engine.

use std::collections::BTreeMap;

use cdm_core::{
    Concept, ConceptRegistry, DataKind, DispatchState, FieldMapping, InteropManager, MappingRule,
    Message, MessageMapping, MessageStandard, SemanticCategory, SemanticField, FieldType, Unit,
    UnitTable, ValidationResult,
};
use serde_json::{json, Value};

fn msg(value: Value) -> Message {
    value.as_object().cloned().unwrap()
}

#[test]
fn unit_round_trip_for_every_registered_pair() {
    let table = UnitTable::seeded();
    for (from, to, _) in table.entries() {
        if table.factor(to, from).is_none() {
            continue;
        }
        let mut report = ValidationResult::new();
        let x = 123.456;
        let there = table.convert(x, from, to, &mut report);
        let back = table.convert(there, to, from, &mut report);
        assert!((back - x).abs() < 1e-9 * x.abs(), "{from} -> {to}");
        assert!(report.warnings.is_empty());
    }
}

#[test]
fn pivoted_conversion_between_non_si_units() {
    let registry = ConceptRegistry::new();
    let mut report = ValidationResult::new();
    let feet = registry.convert_unit(1.0, Unit::NauticalMile, Unit::Foot, &mut report);
    assert!((feet - 1852.0 / 0.3048).abs() < 1e-6);
    assert!(report.is_valid());
    assert!(report.warnings.is_empty());
}

#[test]
fn unregistered_unit_pair_degrades_with_one_warning() {
    let registry = ConceptRegistry::new();
    let mut report = ValidationResult::new();
    let out = registry.convert_unit(42.0, Unit::Celsius, Unit::Kelvin, &mut report);
    assert_eq!(out, 42.0);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.is_valid());
}

#[test]
fn bidirectional_inversion_of_scale_and_enum() {
    let mut manager = InteropManager::new();
    manager.register_message_mapping(MessageMapping::new(
        MessageStandard::MilStd6016,
        "J12.6",
        MessageStandard::Mqtt,
        "PUBLISH_ARM",
        vec![FieldMapping::new("master_arm", "arm")
            .with_scale(100.0)
            .with_offset(0.0)
            .with_enum_mapping([("0", "Safe"), ("1", "Armed")])],
    ));
    let reverse = manager
        .mappings()
        .find_message_mapping(MessageStandard::Mqtt, MessageStandard::MilStd6016, "PUBLISH_ARM")
        .unwrap();
    let field = &reverse.field_mappings[0];
    assert_eq!(field.scaling_factor, Some(0.01));
    assert_eq!(
        field.enum_mapping,
        Some(BTreeMap::from([
            ("Safe".to_string(), "0".to_string()),
            ("Armed".to_string(), "1".to_string()),
        ]))
    );
}

#[test]
fn custom_transform_is_carried_unchanged_through_inversion() {
    // Known approximation: transforms outside the inversion table are reused
    // as-is in the reverse direction.
    let mut manager = InteropManager::new();
    manager.create_custom_mapping(
        "STATUS",
        "J13.0",
        MessageStandard::Mqtt,
        MessageStandard::MilStd6016,
        vec![FieldMapping::new("payload", "status")
            .with_transform(cdm_core::Transform::from_name("json_to_milstd_format"))],
    );
    let reverse = manager
        .mappings()
        .find_message_mapping(MessageStandard::MilStd6016, MessageStandard::Mqtt, "J13.0")
        .unwrap();
    assert_eq!(
        reverse.field_mappings[0].transform_function.as_ref().map(|t| t.name()),
        Some("json_to_milstd_format")
    );
}

#[test]
fn registration_is_idempotent_and_audited() {
    let mut manager = InteropManager::new();
    let concept = Concept::new("Sensor.Range", DataKind::Float).with_range(0.0, 500.0);
    manager.register_concept(concept.clone());
    manager.register_concept(concept.clone());
    assert_eq!(manager.concepts().get_concept("Sensor.Range"), Some(&concept));

    let before = manager.mappings().audit_trail().len();
    let rules = |scale: f64| {
        BTreeMap::from([(
            "RANGE".to_string(),
            vec![MappingRule::new("rng", "Sensor.Range", "range").with_scale(scale)],
        )])
    };
    manager.register_mapping(MessageStandard::Generic, MessageStandard::Cdm, rules(1.0));
    manager.register_mapping(MessageStandard::Generic, MessageStandard::Cdm, rules(2.0));
    assert_eq!(manager.mappings().audit_trail().len(), before + 2);
    let effective = manager
        .mappings()
        .get_mapping_rules(MessageStandard::Generic, MessageStandard::Cdm, "RANGE");
    assert_eq!(effective.len(), 1);
    assert_eq!(effective[0].scale_factor, Some(2.0));
}

#[test]
fn routing_priority_order_and_self_exclusion() {
    let mut manager = InteropManager::new();
    for target in [MessageStandard::Mqtt, MessageStandard::Generic] {
        manager.register_message_mapping(
            MessageMapping::new(
                MessageStandard::MavLink,
                "VFR_HUD",
                target,
                "HUD",
                vec![FieldMapping::new("heading", "hdg")],
            )
            .one_way(),
        );
    }
    manager
        .add_routing_rule("VFR_.*", vec![MessageStandard::Generic], None, 5)
        .unwrap();
    manager
        .add_routing_rule(
            "VFR_.*",
            vec![MessageStandard::MavLink, MessageStandard::Mqtt],
            None,
            10,
        )
        .unwrap();

    let result = manager.process_message_with_routing(
        &msg(json!({"message_type": "VFR_HUD", "heading": 90})),
        MessageStandard::MavLink,
    );
    let targets: Vec<_> = result
        .routed_messages
        .iter()
        .map(|r| r.target_standard)
        .collect();
    assert_eq!(targets, vec![MessageStandard::Mqtt, MessageStandard::Generic]);
    assert!(result
        .routed_messages
        .iter()
        .all(|r| r.target_standard != MessageStandard::MavLink));
}

#[test]
fn end_to_end_j20_to_global_position() {
    let manager = InteropManager::new();
    let result = manager.process_message_with_routing(
        &msg(json!({
            "message_type": "J2.0",
            "track_id": "12345",
            "latitude": 39.9042,
            "longitude": 116.4074,
            "altitude": 50.0
        })),
        MessageStandard::MilStd6016,
    );

    assert_eq!(result.state, DispatchState::Dispatched);
    let mavlink = result
        .routed_messages
        .iter()
        .find(|r| r.target_standard == MessageStandard::MavLink)
        .unwrap();
    assert_eq!(mavlink.message["lat"], json!(399042000));
    assert_eq!(mavlink.message["lon"], json!(1164074000));
    assert_eq!(mavlink.message["alt"], json!(50000));
    assert_eq!(mavlink.message["message_type"], json!("GLOBAL_POSITION_INT"));
    assert!(mavlink.validation.is_valid());
}

#[test]
fn global_position_routes_back_through_derived_mapping() {
    let manager = InteropManager::new();
    let result = manager.process_message_with_routing(
        &msg(json!({
            "message_type": "GLOBAL_POSITION_INT",
            "lat": 399042000,
            "lon": 1164074000,
            "alt": 50000
        })),
        MessageStandard::MavLink,
    );
    let j20 = &result.routed_messages[0];
    assert_eq!(j20.target_standard, MessageStandard::MilStd6016);
    assert_eq!(j20.message["message_type"], json!("J2.0"));
    assert!((j20.message["latitude"].as_f64().unwrap() - 39.9042).abs() < 1e-9);
    assert!((j20.message["altitude"].as_f64().unwrap() - 50.0).abs() < 1e-9);
}

#[test]
fn validation_errors_do_not_suppress_output() {
    let manager = InteropManager::new();
    let result = manager.process_message(
        &msg(json!({"message_type": "ATTITUDE", "roll": 9.0, "pitch": 0.0, "yaw": 0.5})),
        MessageStandard::MavLink,
        MessageStandard::MilStd6016,
    );
    assert!(result.success);
    assert!(!result.validation.is_valid());
    assert!((result.target_message["bits[10:21]"].as_f64().unwrap() - 900.0).abs() < 1e-9);
}

#[test]
fn config_round_trip_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("semantic.yaml");

    let mut original = InteropManager::new();
    original.register_semantic_field(
        SemanticField::new(
            "fuel_remaining",
            "sem.status.fuel",
            SemanticCategory::Status,
            FieldType::Float,
        )
        .with_unit("kg")
        .with_aliases(["fuel", "fuel_kg"]),
    );
    original.create_custom_mapping(
        "BATTERY_STATUS",
        "J13.2",
        MessageStandard::MavLink,
        MessageStandard::MilStd6016,
        vec![FieldMapping::new("fuel_kg", "fuel").with_scale(0.5)],
    );
    original.register_mapping(
        MessageStandard::Generic,
        MessageStandard::Cdm,
        BTreeMap::from([(
            "POS".to_string(),
            vec![MappingRule::new("lat_deg", "Track.Position.Latitude", "lat")
                .with_bit_range(0, 23)
                .unwrap()
                .with_units(Unit::Degree, Unit::Degree)],
        )]),
    );
    original.register_concept(
        Concept::new("Status.FuelRemaining", DataKind::Float)
            .with_description("Fuel remaining")
            .with_temporal_validity(30.0),
    );
    original.export_semantic_config(&path).unwrap();

    let mut restored = InteropManager::new();
    restored.import_semantic_config(&path).unwrap();

    let fuel = restored.concepts().get_concept("Status.FuelRemaining").unwrap();
    assert_eq!(fuel.temporal_validity, Some(30.0));
    assert_eq!(fuel.version, cdm_core::CDM_VERSION);

    for name in ["sem.status.fuel", "fuel", "fuel_kg"] {
        assert_eq!(
            restored.semantics().find_semantic_field(name),
            original.semantics().find_semantic_field(name)
        );
    }
    assert_eq!(
        restored
            .mappings()
            .get_mapping_rules(MessageStandard::Generic, MessageStandard::Cdm, "POS"),
        original
            .mappings()
            .get_mapping_rules(MessageStandard::Generic, MessageStandard::Cdm, "POS")
    );
    for (src, tgt, message) in [
        (MessageStandard::MavLink, MessageStandard::MilStd6016, "BATTERY_STATUS"),
        (MessageStandard::MilStd6016, MessageStandard::MavLink, "J13.2"),
    ] {
        assert_eq!(
            restored.mappings().find_message_mapping(src, tgt, message),
            original.mappings().find_message_mapping(src, tgt, message)
        );
    }
}

#[test]
fn config_round_trip_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("semantic.json");
    let original = InteropManager::new();
    original.export_semantic_config(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let document: Value = serde_json::from_str(&text).unwrap();
    assert!(document["semantic_fields"]["sem.pos.latitude"]["aliases"].is_array());
    assert_eq!(document["semantic_fields"]["sem.pos.latitude"]["type"], json!("float"));

    let mut restored = InteropManager::new();
    restored.import_semantic_config(&path).unwrap();
    assert_eq!(
        restored.statistics().message_mappings,
        original.statistics().message_mappings
    );
}

#[test]
fn one_way_reregistration_survives_config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("semantic.json");
    let hud = || {
        MessageMapping::new(
            MessageStandard::MavLink,
            "VFR_HUD",
            MessageStandard::Mqtt,
            "HUD",
            vec![FieldMapping::new("airspeed", "speed")],
        )
    };

    let mut original = InteropManager::new();
    original.register_message_mapping(hud());
    original.register_message_mapping(hud().one_way());
    let reverse = |m: &InteropManager| {
        m.mappings()
            .find_message_mapping(MessageStandard::Mqtt, MessageStandard::MavLink, "HUD")
            .is_some()
    };
    assert!(!reverse(&original));

    original.export_semantic_config(&path).unwrap();
    let mut restored = InteropManager::new();
    restored.import_semantic_config(&path).unwrap();
    assert!(!reverse(&restored));
    assert_eq!(
        restored.statistics().message_mappings,
        original.statistics().message_mappings
    );
}

#[test]
fn missing_document_is_io_error() {
    let mut manager = InteropManager::new();
    let err = manager
        .import_semantic_config("/nonexistent/semantic.yaml")
        .unwrap_err();
    assert!(matches!(err, cdm_core::CdmError::Io(_)));
}
