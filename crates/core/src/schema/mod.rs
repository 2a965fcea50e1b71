//! Entity schemas: declared properties, validation and coercion.

pub mod node;

pub use node::{ObjectNode, SchemaNode, StringFormat};

use std::fmt;

use indexmap::IndexMap;
use tracing::warn;

use crate::entity::{Entity, EntityValue};
use crate::error::{ErrorCode, SclError};
use crate::location::ErrorLocation;
use crate::value::SclEnum;

// ──────────────────────────────────────────────
// Property metadata
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Multiplicity {
    ExactlyOne,
    UpToOne,
    AtLeastOne,
    Any,
}

impl Multiplicity {
    pub const ALL: [Multiplicity; 4] = [
        Multiplicity::ExactlyOne,
        Multiplicity::UpToOne,
        Multiplicity::AtLeastOne,
        Multiplicity::Any,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Multiplicity::ExactlyOne => "ExactlyOne",
            Multiplicity::UpToOne => "UpToOne",
            Multiplicity::AtLeastOne => "AtLeastOne",
            Multiplicity::Any => "Any",
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, Multiplicity::ExactlyOne | Multiplicity::AtLeastOne)
    }

    pub fn allows_list(self) -> bool {
        matches!(self, Multiplicity::AtLeastOne | Multiplicity::Any)
    }
}

/// What to do with an entity that violates its schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorBehaviour {
    /// Stop with an error.
    Fail,
    /// Log and drop the entity.
    Error,
    /// Log and keep the entity.
    Warning,
    /// Drop the entity silently.
    Skip,
    /// Keep the original value silently.
    Ignore,
}

impl ErrorBehaviour {
    pub const ALL: [ErrorBehaviour; 5] = [
        ErrorBehaviour::Fail,
        ErrorBehaviour::Error,
        ErrorBehaviour::Warning,
        ErrorBehaviour::Skip,
        ErrorBehaviour::Ignore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorBehaviour::Fail => "Fail",
            ErrorBehaviour::Error => "Error",
            ErrorBehaviour::Warning => "Warning",
            ErrorBehaviour::Skip => "Skip",
            ErrorBehaviour::Ignore => "Ignore",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaPropertyType {
    String,
    Integer,
    Double,
    Bool,
    Enum,
    Date,
    Entity,
    Any,
}

impl SchemaPropertyType {
    pub const ALL: [SchemaPropertyType; 8] = [
        SchemaPropertyType::String,
        SchemaPropertyType::Integer,
        SchemaPropertyType::Double,
        SchemaPropertyType::Bool,
        SchemaPropertyType::Enum,
        SchemaPropertyType::Date,
        SchemaPropertyType::Entity,
        SchemaPropertyType::Any,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SchemaPropertyType::String => "String",
            SchemaPropertyType::Integer => "Integer",
            SchemaPropertyType::Double => "Double",
            SchemaPropertyType::Bool => "Bool",
            SchemaPropertyType::Enum => "Enum",
            SchemaPropertyType::Date => "Date",
            SchemaPropertyType::Entity => "Entity",
            SchemaPropertyType::Any => "Any",
        }
    }
}

/// Enum type names used in the entity form of a schema.
pub const SCL_TYPE_ENUM: &str = "SCLType";
pub const MULTIPLICITY_ENUM: &str = "Multiplicity";
pub const ERROR_BEHAVIOUR_ENUM: &str = "ErrorBehaviour";

fn parse_member<T: Copy>(all: &[T], name: fn(T) -> &'static str, text: &str) -> Option<T> {
    let text = text.rsplit('.').next().unwrap_or(text);
    all.iter().copied().find(|m| name(*m).eq_ignore_ascii_case(text)).or_else(|| {
        if text.eq_ignore_ascii_case("boolean") {
            all.iter().copied().find(|m| name(*m) == "Bool")
        } else {
            None
        }
    })
}

impl std::str::FromStr for Multiplicity {
    type Err = ErrorCode;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_member(&Multiplicity::ALL, Multiplicity::name, s).ok_or_else(|| {
            ErrorCode::CouldNotParse {
                text: s.to_string(),
                target: MULTIPLICITY_ENUM.to_string(),
            }
        })
    }
}

impl std::str::FromStr for ErrorBehaviour {
    type Err = ErrorCode;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_member(&ErrorBehaviour::ALL, ErrorBehaviour::name, s).ok_or_else(|| {
            ErrorCode::CouldNotParse {
                text: s.to_string(),
                target: ERROR_BEHAVIOUR_ENUM.to_string(),
            }
        })
    }
}

impl std::str::FromStr for SchemaPropertyType {
    type Err = ErrorCode;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_member(&SchemaPropertyType::ALL, SchemaPropertyType::name, s).ok_or_else(|| {
            ErrorCode::CouldNotParse {
                text: s.to_string(),
                target: SCL_TYPE_ENUM.to_string(),
            }
        })
    }
}

impl fmt::Display for ErrorBehaviour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaProperty {
    pub property_type: SchemaPropertyType,
    pub multiplicity: Multiplicity,
    pub enum_type: Option<String>,
    pub values: Option<Vec<String>>,
    pub regex: Option<String>,
    pub date_input_formats: Option<Vec<String>>,
    pub date_output_format: Option<String>,
    pub error_behaviour: Option<ErrorBehaviour>,
}

impl SchemaProperty {
    pub fn new(property_type: SchemaPropertyType, multiplicity: Multiplicity) -> Self {
        SchemaProperty {
            property_type,
            multiplicity,
            enum_type: None,
            values: None,
            regex: None,
            date_input_formats: None,
            date_output_format: None,
            error_behaviour: None,
        }
    }

    fn to_entity(&self) -> Entity {
        let mut e = Entity::new()
            .with_property("Type", enum_value(SCL_TYPE_ENUM, self.property_type.name()))
            .with_property(
                "Multiplicity",
                enum_value(MULTIPLICITY_ENUM, self.multiplicity.name()),
            );
        if let Some(t) = &self.enum_type {
            e = e.with_property("EnumType", EntityValue::String(t.clone()));
        }
        if let Some(values) = &self.values {
            e = e.with_property("Values", string_list(values));
        }
        if let Some(r) = &self.regex {
            e = e.with_property("Regex", EntityValue::String(r.clone()));
        }
        if let Some(formats) = &self.date_input_formats {
            e = e.with_property("DateInputFormats", string_list(formats));
        }
        if let Some(f) = &self.date_output_format {
            e = e.with_property("DateOutputFormat", EntityValue::String(f.clone()));
        }
        if let Some(b) = self.error_behaviour {
            e = e.with_property("ErrorBehaviour", enum_value(ERROR_BEHAVIOUR_ENUM, b.name()));
        }
        e
    }

    fn try_from_entity(name: &str, entity: &Entity) -> Result<SchemaProperty, ErrorCode> {
        let property_type = match entity.try_get_value("Type") {
            Some(v) => member_text(v)?.parse::<SchemaPropertyType>()?,
            None => {
                return Err(ErrorCode::SchemaInvalid(format!(
                    "property '{}' has no Type",
                    name
                )))
            }
        };
        let multiplicity = match entity.try_get_value("Multiplicity") {
            Some(v) => member_text(v)?.parse::<Multiplicity>()?,
            None => Multiplicity::ExactlyOne,
        };
        let error_behaviour = entity
            .try_get_value("ErrorBehaviour")
            .map(|v| member_text(v).and_then(|t| t.parse::<ErrorBehaviour>()))
            .transpose()?;
        Ok(SchemaProperty {
            property_type,
            multiplicity,
            enum_type: optional_string(entity, "EnumType")?,
            values: optional_list(entity, "Values")?,
            regex: optional_string(entity, "Regex")?,
            date_input_formats: optional_list(entity, "DateInputFormats")?,
            date_output_format: optional_string(entity, "DateOutputFormat")?,
            error_behaviour,
        })
    }
}

// ──────────────────────────────────────────────
// Schema
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub name: String,
    pub properties: IndexMap<String, SchemaProperty>,
    pub allow_extra_properties: bool,
    pub default_error_behaviour: ErrorBehaviour,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Schema {
            name: name.into(),
            properties: IndexMap::new(),
            allow_extra_properties: true,
            default_error_behaviour: ErrorBehaviour::Fail,
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, property: SchemaProperty) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Case-insensitive property lookup.
    pub fn find_property(&self, name: &str) -> Option<(&String, &SchemaProperty)> {
        self.properties
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Validate and coerce `entity`.
    ///
    /// Returns `Ok(None)` when the entity is dropped, `Ok(Some(_))` when it
    /// is kept (the same entity when nothing changed), and `Err` with every
    /// `Fail` violation combined.
    pub fn apply_to_entity(
        &self,
        entity: &Entity,
        location: &ErrorLocation,
        error_behaviour_override: Option<ErrorBehaviour>,
    ) -> Result<Option<Entity>, SclError> {
        let mut result = entity.clone();
        let mut errors = Vec::new();
        let mut drop_entity = false;
        let mut unseen: Vec<&String> = self.properties.keys().collect();

        let mut violation = |code: ErrorCode, behaviour: ErrorBehaviour| match behaviour {
            ErrorBehaviour::Fail => errors.push(code.with_location(location.clone())),
            ErrorBehaviour::Error => {
                warn!(schema = %self.name, "{}; entity dropped", code);
                drop_entity = true;
            }
            ErrorBehaviour::Warning => warn!(schema = %self.name, "{}", code),
            ErrorBehaviour::Skip => drop_entity = true,
            ErrorBehaviour::Ignore => {}
        };

        for property in entity.properties() {
            match self.find_property(&property.name) {
                Some((declared, schema_property)) => {
                    unseen.retain(|n| *n != declared);
                    let behaviour = error_behaviour_override
                        .or(schema_property.error_behaviour)
                        .unwrap_or(self.default_error_behaviour);
                    match property.value.try_convert(schema_property) {
                        Ok((value, true)) => {
                            result = result.with_value_replaced(&property.name, value);
                        }
                        Ok((_, false)) => {}
                        Err(code) => violation(code, behaviour),
                    }
                }
                None if !self.allow_extra_properties => violation(
                    ErrorCode::SchemaViolationUnexpectedProperty(property.name.clone()),
                    error_behaviour_override.unwrap_or(self.default_error_behaviour),
                ),
                None => {}
            }
        }

        for name in unseen {
            if let Some(schema_property) = self.properties.get(name) {
                if schema_property.multiplicity.is_required() {
                    let behaviour = error_behaviour_override
                        .or(schema_property.error_behaviour)
                        .unwrap_or(self.default_error_behaviour);
                    violation(
                        ErrorCode::SchemaViolationMissingProperty(name.clone()),
                        behaviour,
                    );
                }
            }
        }

        SclError::check(errors)?;
        Ok(if drop_entity { None } else { Some(result) })
    }

    // ──────────────────────────────────────────────
    // Entity form
    // ──────────────────────────────────────────────

    pub fn to_entity(&self) -> Entity {
        let properties = Entity::from_pairs(
            self.properties
                .iter()
                .map(|(name, p)| (name.clone(), EntityValue::NestedEntity(p.to_entity()))),
        );
        Entity::new()
            .with_property("Name", EntityValue::String(self.name.clone()))
            .with_property(
                "AllowExtraProperties",
                EntityValue::Boolean(self.allow_extra_properties),
            )
            .with_property(
                "DefaultErrorBehaviour",
                enum_value(ERROR_BEHAVIOUR_ENUM, self.default_error_behaviour.name()),
            )
            .with_property("Properties", EntityValue::NestedEntity(properties))
    }

    pub fn try_from_entity(entity: &Entity) -> Result<Schema, ErrorCode> {
        let name = optional_string(entity, "Name")?.unwrap_or_else(|| "Schema".to_string());
        let allow_extra_properties = match entity.try_get_value("AllowExtraProperties") {
            Some(EntityValue::Boolean(b)) => *b,
            Some(EntityValue::String(s)) => s.eq_ignore_ascii_case("true"),
            Some(other) => {
                return Err(ErrorCode::SchemaInvalid(format!(
                    "AllowExtraProperties should be a boolean but was {}",
                    other.serialize()
                )))
            }
            None => true,
        };
        let default_error_behaviour = match entity.try_get_value("DefaultErrorBehaviour") {
            Some(v) => member_text(v)?.parse::<ErrorBehaviour>()?,
            None => ErrorBehaviour::Fail,
        };
        let mut properties = IndexMap::new();
        match entity.try_get_value("Properties") {
            Some(EntityValue::NestedEntity(props)) => {
                for p in props.properties() {
                    match &p.value {
                        EntityValue::NestedEntity(e) => {
                            properties.insert(
                                p.name.clone(),
                                SchemaProperty::try_from_entity(&p.name, e)?,
                            );
                        }
                        other => {
                            return Err(ErrorCode::SchemaInvalid(format!(
                                "property '{}' should be an entity but was {}",
                                p.name,
                                other.serialize()
                            )))
                        }
                    }
                }
            }
            None => {}
            Some(other) => {
                return Err(ErrorCode::SchemaInvalid(format!(
                    "Properties should be an entity but was {}",
                    other.serialize()
                )))
            }
        }
        Ok(Schema {
            name,
            properties,
            allow_extra_properties,
            default_error_behaviour,
        })
    }
}

fn enum_value(type_name: &str, member: &str) -> EntityValue {
    EntityValue::EnumerationValue(SclEnum::new(type_name, member))
}

fn string_list(values: &[String]) -> EntityValue {
    EntityValue::NestedList(values.iter().cloned().map(EntityValue::String).collect())
}

fn member_text(value: &EntityValue) -> Result<String, ErrorCode> {
    match value {
        EntityValue::EnumerationValue(e) => Ok(e.value.clone()),
        EntityValue::String(s) => Ok(s.clone()),
        other => Err(ErrorCode::SchemaInvalid(format!(
            "expected an enum member but got {}",
            other.serialize()
        ))),
    }
}

fn optional_string(entity: &Entity, name: &str) -> Result<Option<String>, ErrorCode> {
    match entity.try_get_value(name) {
        None | Some(EntityValue::Null) => Ok(None),
        Some(EntityValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ErrorCode::SchemaInvalid(format!(
            "{} should be a string but was {}",
            name,
            other.serialize()
        ))),
    }
}

fn optional_list(entity: &Entity, name: &str) -> Result<Option<Vec<String>>, ErrorCode> {
    match entity.try_get_value(name) {
        None | Some(EntityValue::Null) => Ok(None),
        Some(EntityValue::NestedList(items)) => Ok(Some(
            items.iter().map(EntityValue::primitive_string).collect(),
        )),
        Some(EntityValue::String(s)) => Ok(Some(vec![s.clone()])),
        Some(other) => Err(ErrorCode::SchemaInvalid(format!(
            "{} should be a list but was {}",
            name,
            other.serialize()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo_schema() -> Schema {
        let mut schema = Schema::new("Test")
            .with_property(
                "Foo",
                SchemaProperty::new(SchemaPropertyType::Integer, Multiplicity::ExactlyOne),
            )
            .with_property(
                "Bar",
                SchemaProperty::new(SchemaPropertyType::String, Multiplicity::ExactlyOne),
            );
        schema.allow_extra_properties = false;
        schema
    }

    fn entity(pairs: &[(&str, EntityValue)]) -> Entity {
        Entity::from_pairs(pairs.iter().map(|(k, v)| (*k, v.clone())))
    }

    #[test]
    fn missing_property_fails() {
        let e = entity(&[("Foo", EntityValue::Integer(1))]);
        let err = foo_schema()
            .apply_to_entity(&e, &ErrorLocation::none(), None)
            .unwrap_err();
        assert_eq!(
            err.codes().collect::<Vec<_>>(),
            vec![&ErrorCode::SchemaViolationMissingProperty("Bar".into())]
        );
    }

    #[test]
    fn wrong_type_fails() {
        let e = entity(&[
            ("Foo", EntityValue::String("Hello".into())),
            ("Bar", EntityValue::String("x".into())),
        ]);
        let err = foo_schema()
            .apply_to_entity(&e, &ErrorLocation::none(), None)
            .unwrap_err();
        assert_eq!(
            err.as_string(),
            "Schema violation: Could not convert 'Hello' to Integer"
        );
    }

    #[test]
    fn all_fail_violations_are_combined() {
        let e = entity(&[
            ("Foo", EntityValue::String("Hello".into())),
            ("Baz", EntityValue::Integer(1)),
        ]);
        let err = foo_schema()
            .apply_to_entity(&e, &ErrorLocation::none(), None)
            .unwrap_err();
        assert_eq!(err.errors().len(), 3);
    }

    #[test]
    fn conversion_rewrites_values() {
        let e = entity(&[
            ("Foo", EntityValue::String("12".into())),
            ("Bar", EntityValue::String("x".into())),
        ]);
        let out = foo_schema()
            .apply_to_entity(&e, &ErrorLocation::none(), None)
            .unwrap()
            .unwrap();
        assert_eq!(out.try_get_value("foo"), Some(&EntityValue::Integer(12)));
    }

    #[test]
    fn apply_is_idempotent() {
        let e = entity(&[
            ("Foo", EntityValue::String("12".into())),
            ("Bar", EntityValue::Double(1.5)),
        ]);
        let schema = foo_schema();
        let once = schema
            .apply_to_entity(&e, &ErrorLocation::none(), None)
            .unwrap()
            .unwrap();
        let twice = schema
            .apply_to_entity(&once, &ErrorLocation::none(), None)
            .unwrap()
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn behaviours_other_than_fail_do_not_error() {
        let e = entity(&[("Foo", EntityValue::String("Hello".into()))]);
        let schema = foo_schema();
        let loc = ErrorLocation::none();
        assert_eq!(
            schema.apply_to_entity(&e, &loc, Some(ErrorBehaviour::Skip)),
            Ok(None)
        );
        assert_eq!(
            schema.apply_to_entity(&e, &loc, Some(ErrorBehaviour::Error)),
            Ok(None)
        );
        assert_eq!(
            schema.apply_to_entity(&e, &loc, Some(ErrorBehaviour::Warning)),
            Ok(Some(e.clone()))
        );
        assert_eq!(
            schema.apply_to_entity(&e, &loc, Some(ErrorBehaviour::Ignore)),
            Ok(Some(e.clone()))
        );
    }

    #[test]
    fn extra_properties_allowed_by_default() {
        let schema = Schema::new("Open");
        let e = entity(&[("Anything", EntityValue::Integer(1))]);
        assert_eq!(
            schema.apply_to_entity(&e, &ErrorLocation::none(), None),
            Ok(Some(e.clone()))
        );
    }

    #[test]
    fn entity_form_round_trips() {
        let mut schema = foo_schema();
        let mut color = SchemaProperty::new(SchemaPropertyType::Enum, Multiplicity::UpToOne);
        color.enum_type = Some("Color".into());
        color.values = Some(vec!["Red".into(), "Blue".into()]);
        color.error_behaviour = Some(ErrorBehaviour::Warning);
        schema = schema.with_property("Color", color);
        let back = Schema::try_from_entity(&schema.to_entity()).unwrap();
        assert_eq!(back, schema);
    }
}
