//! Applies schemas in their entity form to entities built from JSON.

use scl_core::{Entity, EntityValue, ErrorBehaviour, ErrorCode, ErrorLocation, Schema};
use serde_json::json;

fn schema(json: serde_json::Value) -> Schema {
    Schema::try_from_entity(&Entity::from_json(&json)).unwrap()
}

fn entity(json: serde_json::Value) -> Entity {
    Entity::from_json(&json)
}

#[test]
fn missing_required_property_is_a_violation() {
    let schema = schema(json!({
        "Name": "Test",
        "Properties": { "Bar": { "Type": "Integer", "Multiplicity": "ExactlyOne" } }
    }));
    let err = schema
        .apply_to_entity(&entity(json!({ "Foo": "Hello" })), &ErrorLocation::none(), None)
        .unwrap_err();
    assert!(err
        .codes()
        .any(|c| matches!(c, ErrorCode::SchemaViolationMissingProperty(p) if p == "Bar")));
    assert!(err.to_string().contains("Missing property 'Bar'"));
}

#[test]
fn unconvertible_value_is_a_violation() {
    let schema = schema(json!({
        "Name": "Test",
        "Properties": { "Foo": { "Type": "Integer" } }
    }));
    let err = schema
        .apply_to_entity(&entity(json!({ "Foo": "Hello" })), &ErrorLocation::none(), None)
        .unwrap_err();
    assert!(err.to_string().contains("Could not convert 'Hello' to Integer"));
}

#[test]
fn convertible_strings_are_coerced() {
    let schema = schema(json!({
        "Properties": { "Foo": { "Type": "Integer" } }
    }));
    let result = schema
        .apply_to_entity(&entity(json!({ "Foo": "12" })), &ErrorLocation::none(), None)
        .unwrap()
        .unwrap();
    assert_eq!(result.try_get_value("Foo"), Some(&EntityValue::Integer(12)));
}

#[test]
fn skip_and_ignore_overrides() {
    let schema = schema(json!({
        "Properties": { "Foo": { "Type": "Integer" } }
    }));
    let bad = entity(json!({ "Foo": "Hello" }));
    let location = ErrorLocation::none();

    let skipped = schema
        .apply_to_entity(&bad, &location, Some(ErrorBehaviour::Skip))
        .unwrap();
    assert!(skipped.is_none());

    let ignored = schema
        .apply_to_entity(&bad, &location, Some(ErrorBehaviour::Ignore))
        .unwrap()
        .unwrap();
    assert_eq!(ignored, bad);
}

#[test]
fn extra_properties_respect_the_schema_flag() {
    let closed = schema(json!({
        "AllowExtraProperties": false,
        "Properties": { "Foo": { "Type": "String" } }
    }));
    let err = closed
        .apply_to_entity(&entity(json!({ "Foo": "a", "Extra": 1 })), &ErrorLocation::none(), None)
        .unwrap_err();
    assert!(err
        .codes()
        .any(|c| matches!(c, ErrorCode::SchemaViolationUnexpectedProperty(p) if p == "Extra")));

    let open = schema(json!({ "Properties": { "Foo": { "Type": "String" } } }));
    assert!(open
        .apply_to_entity(&entity(json!({ "Foo": "a", "Extra": 1 })), &ErrorLocation::none(), None)
        .unwrap()
        .is_some());
}

#[test]
fn schema_without_property_type_is_invalid() {
    let err = Schema::try_from_entity(&entity(json!({
        "Properties": { "Foo": { "Multiplicity": "ExactlyOne" } }
    })))
    .unwrap_err();
    assert!(matches!(err, ErrorCode::SchemaInvalid(_)));
}
