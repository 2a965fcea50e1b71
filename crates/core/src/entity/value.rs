use std::hash::{Hash, Hasher};

use regex::Regex;
use time::PrimitiveDateTime;

use super::Entity;
use crate::array::Array;
use crate::error::ErrorCode;
use crate::schema::{Multiplicity, SchemaProperty, SchemaPropertyType};
use crate::value::date::{format_date, parse_date};
use crate::value::{format_double, quote_double, quote_single, SclEnum, SclObject};

/// The value of one entity property.
#[derive(Debug, Clone)]
pub enum EntityValue {
    Null,
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    EnumerationValue(SclEnum),
    /// A date plus the format it should be written in, if one was chosen.
    Date {
        value: PrimitiveDateTime,
        format: Option<String>,
    },
    NestedEntity(Entity),
    NestedList(Vec<EntityValue>),
}

impl EntityValue {
    pub fn from_object(object: &SclObject) -> EntityValue {
        match object {
            SclObject::Unit | SclObject::Null => EntityValue::Null,
            SclObject::String(s) => EntityValue::String(s.clone()),
            SclObject::Int(i) => EntityValue::Integer(*i),
            SclObject::Double(d) => EntityValue::Double(*d),
            SclObject::Bool(b) => EntityValue::Boolean(*b),
            SclObject::Date(d) => EntityValue::Date {
                value: *d,
                format: None,
            },
            SclObject::Enum(e) => EntityValue::EnumerationValue(e.clone()),
            SclObject::Entity(e) => EntityValue::NestedEntity(e.clone()),
            // lazy arrays must be evaluated before they can be stored
            SclObject::Array(a) => match a.as_eager() {
                Some(elements) => {
                    EntityValue::NestedList(elements.iter().map(EntityValue::from_object).collect())
                }
                None => EntityValue::Null,
            },
            SclObject::OneOf(o) => EntityValue::from_object(&o.value),
        }
    }

    pub fn to_object(&self) -> SclObject {
        match self {
            EntityValue::Null => SclObject::Null,
            EntityValue::String(s) => SclObject::String(s.clone()),
            EntityValue::Integer(i) => SclObject::Int(*i),
            EntityValue::Double(d) => SclObject::Double(*d),
            EntityValue::Boolean(b) => SclObject::Bool(*b),
            EntityValue::EnumerationValue(e) => SclObject::Enum(e.clone()),
            EntityValue::Date { value, .. } => SclObject::Date(*value),
            EntityValue::NestedEntity(e) => SclObject::Entity(e.clone()),
            EntityValue::NestedList(items) => {
                SclObject::Array(Array::from_vec(items.iter().map(EntityValue::to_object).collect()))
            }
        }
    }

    pub fn from_json(json: &serde_json::Value) -> EntityValue {
        use serde_json::Value;
        match json {
            Value::Null => EntityValue::Null,
            Value::Bool(b) => EntityValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => EntityValue::Integer(i),
                None => EntityValue::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => EntityValue::String(s.clone()),
            Value::Array(items) => {
                EntityValue::NestedList(items.iter().map(EntityValue::from_json).collect())
            }
            Value::Object(_) => EntityValue::NestedEntity(Entity::from_json(json)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            EntityValue::Null => Value::Null,
            EntityValue::String(s) => Value::String(s.clone()),
            EntityValue::Integer(i) => Value::from(*i),
            EntityValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            EntityValue::Boolean(b) => Value::Bool(*b),
            EntityValue::EnumerationValue(e) => Value::String(e.value.clone()),
            EntityValue::Date { .. } => Value::String(self.primitive_string()),
            EntityValue::NestedEntity(e) => e.to_json(),
            EntityValue::NestedList(items) => {
                Value::Array(items.iter().map(EntityValue::to_json).collect())
            }
        }
    }

    /// The plain text of a scalar, as matched by schema regexes.
    pub fn primitive_string(&self) -> String {
        match self {
            EntityValue::Null => String::new(),
            EntityValue::String(s) => s.clone(),
            EntityValue::Integer(i) => i.to_string(),
            EntityValue::Double(d) => format_double(*d),
            EntityValue::Boolean(b) => b.to_string(),
            EntityValue::EnumerationValue(e) => e.value.clone(),
            EntityValue::Date { value, format } => format_date(value, format.as_deref()),
            EntityValue::NestedEntity(e) => e.serialize(),
            EntityValue::NestedList(_) => self.serialize(),
        }
    }

    pub fn serialize(&self) -> String {
        match self {
            EntityValue::Null => "null".to_string(),
            EntityValue::String(s) => quote_single(s),
            EntityValue::Integer(i) => i.to_string(),
            EntityValue::Double(d) => format_double(*d),
            EntityValue::Boolean(b) => b.to_string(),
            EntityValue::EnumerationValue(e) => e.serialize(),
            EntityValue::Date { value, .. } => format_date(value, None),
            EntityValue::NestedEntity(e) => e.serialize(),
            EntityValue::NestedList(items) => {
                let parts: Vec<String> = items.iter().map(EntityValue::serialize).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    pub fn format(&self) -> String {
        match self {
            EntityValue::String(s) => quote_double(s),
            EntityValue::NestedEntity(e) => e.format(),
            EntityValue::NestedList(items) => {
                let parts: Vec<String> = items.iter().map(EntityValue::format).collect();
                format!("[{}]", parts.join(", "))
            }
            other => other.serialize(),
        }
    }

    // ──────────────────────────────────────────────
    // Schema conversion
    // ──────────────────────────────────────────────

    /// Convert this value to satisfy `property`. Returns the converted value
    /// and whether it differs from the original.
    pub fn try_convert(&self, property: &SchemaProperty) -> Result<(EntityValue, bool), ErrorCode> {
        match (self, property.multiplicity) {
            (EntityValue::NestedList(items), Multiplicity::Any | Multiplicity::AtLeastOne) => {
                let element = SchemaProperty {
                    multiplicity: Multiplicity::ExactlyOne,
                    ..property.clone()
                };
                let mut changed = false;
                let mut converted = Vec::with_capacity(items.len());
                for item in items {
                    let (v, c) = item.convert_single(&element)?;
                    changed |= c;
                    converted.push(v);
                }
                if changed {
                    Ok((EntityValue::NestedList(converted), true))
                } else {
                    Ok((self.clone(), false))
                }
            }
            (EntityValue::NestedList(items), Multiplicity::ExactlyOne | Multiplicity::UpToOne) => {
                match items.as_slice() {
                    [single] => {
                        let (v, _) = single.try_convert(property)?;
                        Ok((v, true))
                    }
                    [] if property.multiplicity == Multiplicity::UpToOne => {
                        Ok((EntityValue::Null, true))
                    }
                    _ => Err(ErrorCode::SchemaViolationUnexpectedList(items.len())),
                }
            }
            _ => self.convert_single(property),
        }
    }

    fn convert_single(&self, property: &SchemaProperty) -> Result<(EntityValue, bool), ErrorCode> {
        if let EntityValue::Null = self {
            return match property.multiplicity {
                Multiplicity::Any | Multiplicity::UpToOne => Ok((EntityValue::Null, false)),
                Multiplicity::ExactlyOne | Multiplicity::AtLeastOne => {
                    Err(ErrorCode::SchemaViolationUnexpectedNull)
                }
            };
        }

        if let Some(pattern) = &property.regex {
            let regex = Regex::new(pattern)
                .map_err(|_| ErrorCode::SchemaInvalidRegex(pattern.clone()))?;
            let text = self.primitive_string();
            if !regex.is_match(&text) {
                return Err(ErrorCode::SchemaViolationUnmatchedRegex {
                    value: text,
                    regex: pattern.clone(),
                });
            }
        }

        let unchanged = || Ok((self.clone(), false));
        let changed = |v: EntityValue| Ok((v, true));
        let wrong_type = || {
            Err(ErrorCode::SchemaViolationWrongType {
                value: self.primitive_string(),
                target: property.property_type.name().to_string(),
            })
        };

        match property.property_type {
            SchemaPropertyType::Any => unchanged(),

            SchemaPropertyType::String => match self {
                EntityValue::String(_) => unchanged(),
                EntityValue::NestedList(_) => wrong_type(),
                other => changed(EntityValue::String(other.primitive_string())),
            },

            SchemaPropertyType::Integer => match self {
                EntityValue::Integer(_) => unchanged(),
                EntityValue::String(s) => match s.trim().parse::<i64>() {
                    Ok(i) => changed(EntityValue::Integer(i)),
                    Err(_) => wrong_type(),
                },
                _ => wrong_type(),
            },

            SchemaPropertyType::Double => match self {
                EntityValue::Double(_) => unchanged(),
                EntityValue::Integer(i) => changed(EntityValue::Double(*i as f64)),
                EntityValue::String(s) => match s.trim().parse::<f64>() {
                    Ok(d) => changed(EntityValue::Double(d)),
                    Err(_) => wrong_type(),
                },
                _ => wrong_type(),
            },

            SchemaPropertyType::Bool => match self {
                EntityValue::Boolean(_) => unchanged(),
                EntityValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => changed(EntityValue::Boolean(true)),
                    "false" => changed(EntityValue::Boolean(false)),
                    _ => wrong_type(),
                },
                _ => wrong_type(),
            },

            SchemaPropertyType::Enum => {
                let type_name = property
                    .enum_type
                    .as_deref()
                    .ok_or(ErrorCode::SchemaInvalidMissingEnum)?;
                let values = match &property.values {
                    Some(v) if !v.is_empty() => v,
                    _ => return Err(ErrorCode::SchemaInvalidNoEnumValues(type_name.to_string())),
                };
                let member = |text: &str| values.iter().find(|v| v.eq_ignore_ascii_case(text));
                match self {
                    EntityValue::EnumerationValue(e) => match member(&e.value) {
                        Some(m) if *m == e.value && e.type_name == type_name => unchanged(),
                        Some(m) => changed(EntityValue::EnumerationValue(SclEnum::new(type_name, m.clone()))),
                        None => wrong_type(),
                    },
                    EntityValue::String(s) => match member(s.trim()) {
                        Some(m) => changed(EntityValue::EnumerationValue(SclEnum::new(type_name, m.clone()))),
                        None => wrong_type(),
                    },
                    EntityValue::NestedEntity(_) => unchanged(),
                    _ => wrong_type(),
                }
            }

            SchemaPropertyType::Date => {
                let output = property.date_output_format.clone();
                match self {
                    EntityValue::Date { value, format } => {
                        if output.is_some() && *format != output {
                            changed(EntityValue::Date {
                                value: *value,
                                format: output,
                            })
                        } else {
                            unchanged()
                        }
                    }
                    EntityValue::String(s) => {
                        let formats = property.date_input_formats.as_deref().unwrap_or(&[]);
                        match parse_date(s, formats) {
                            Some(value) => changed(EntityValue::Date {
                                value,
                                format: output,
                            }),
                            None => wrong_type(),
                        }
                    }
                    _ => wrong_type(),
                }
            }

            SchemaPropertyType::Entity => match self {
                EntityValue::NestedEntity(_) => unchanged(),
                _ => wrong_type(),
            },
        }
    }
}

impl PartialEq for EntityValue {
    fn eq(&self, other: &Self) -> bool {
        use EntityValue::*;
        match (self, other) {
            (Null, Null) => true,
            (String(a), String(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Boolean(a), Boolean(b)) => a == b,
            (EnumerationValue(a), EnumerationValue(b)) => a == b,
            (Date { value: a, format: fa }, Date { value: b, format: fb }) => a == b && fa == fb,
            (NestedEntity(a), NestedEntity(b)) => a == b,
            (NestedList(a), NestedList(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for EntityValue {}

impl Hash for EntityValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            EntityValue::Null => {}
            EntityValue::String(s) => s.hash(state),
            EntityValue::Integer(i) => i.hash(state),
            EntityValue::Double(d) => d.to_bits().hash(state),
            EntityValue::Boolean(b) => b.hash(state),
            EntityValue::EnumerationValue(e) => e.hash(state),
            EntityValue::Date { value, format } => {
                value.hash(state);
                format.hash(state);
            }
            EntityValue::NestedEntity(e) => e.hash(state),
            EntityValue::NestedList(items) => items.hash(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn prop(property_type: SchemaPropertyType) -> SchemaProperty {
        SchemaProperty::new(property_type, Multiplicity::ExactlyOne)
    }

    #[test]
    fn string_to_integer() {
        let (v, changed) = EntityValue::String("42".into())
            .try_convert(&prop(SchemaPropertyType::Integer))
            .unwrap();
        assert_eq!(v, EntityValue::Integer(42));
        assert!(changed);

        let err = EntityValue::String("Hello".into())
            .try_convert(&prop(SchemaPropertyType::Integer))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema violation: Could not convert 'Hello' to Integer"
        );
    }

    #[test]
    fn double_is_not_an_integer() {
        let err = EntityValue::Double(3.0)
            .try_convert(&prop(SchemaPropertyType::Integer))
            .unwrap_err();
        assert_eq!(
            err,
            ErrorCode::SchemaViolationWrongType {
                value: "3.0".into(),
                target: "Integer".into()
            }
        );
    }

    #[test]
    fn matching_type_is_unchanged() {
        let (v, changed) = EntityValue::Integer(3)
            .try_convert(&prop(SchemaPropertyType::Integer))
            .unwrap();
        assert_eq!(v, EntityValue::Integer(3));
        assert!(!changed);
    }

    #[test]
    fn double_to_string_is_a_change() {
        let (v, changed) = EntityValue::Double(1.5)
            .try_convert(&prop(SchemaPropertyType::String))
            .unwrap();
        assert_eq!(v, EntityValue::String("1.5".into()));
        assert!(changed);
    }

    #[test]
    fn null_depends_on_multiplicity() {
        assert!(EntityValue::Null
            .try_convert(&prop(SchemaPropertyType::String))
            .is_err());
        let optional = SchemaProperty::new(SchemaPropertyType::String, Multiplicity::UpToOne);
        assert_eq!(
            EntityValue::Null.try_convert(&optional).unwrap(),
            (EntityValue::Null, false)
        );
    }

    #[test]
    fn lists_need_list_multiplicity() {
        let list = EntityValue::NestedList(vec![
            EntityValue::String("1".into()),
            EntityValue::Integer(2),
        ]);
        assert!(matches!(
            list.try_convert(&prop(SchemaPropertyType::Integer)),
            Err(ErrorCode::SchemaViolationUnexpectedList(2))
        ));
        let single = EntityValue::NestedList(vec![EntityValue::String("7".into())]);
        assert_eq!(
            single.try_convert(&prop(SchemaPropertyType::Integer)).unwrap(),
            (EntityValue::Integer(7), true)
        );
        let many = SchemaProperty::new(SchemaPropertyType::Integer, Multiplicity::Any);
        let (v, changed) = list.try_convert(&many).unwrap();
        assert_eq!(
            v,
            EntityValue::NestedList(vec![EntityValue::Integer(1), EntityValue::Integer(2)])
        );
        assert!(changed);
    }

    #[test]
    fn regex_is_checked_against_the_text() {
        let mut p = prop(SchemaPropertyType::String);
        p.regex = Some("^a+$".into());
        assert!(EntityValue::String("aaa".into()).try_convert(&p).is_ok());
        assert!(matches!(
            EntityValue::String("b".into()).try_convert(&p),
            Err(ErrorCode::SchemaViolationUnmatchedRegex { .. })
        ));
    }

    #[test]
    fn enum_from_string_is_canonicalized() {
        let mut p = prop(SchemaPropertyType::Enum);
        p.enum_type = Some("Color".into());
        p.values = Some(vec!["Red".into(), "Green".into()]);
        let (v, changed) = EntityValue::String("red".into()).try_convert(&p).unwrap();
        assert_eq!(v, EntityValue::EnumerationValue(SclEnum::new("Color", "Red")));
        assert!(changed);
        assert!(EntityValue::String("blue".into()).try_convert(&p).is_err());

        p.values = None;
        assert_eq!(
            EntityValue::String("red".into()).try_convert(&p),
            Err(ErrorCode::SchemaInvalidNoEnumValues("Color".into()))
        );
    }

    #[test]
    fn date_from_string_with_formats() {
        let mut p = prop(SchemaPropertyType::Date);
        p.date_input_formats = Some(vec!["[day]/[month]/[year]".into()]);
        p.date_output_format = Some("[year]".into());
        let (v, changed) = EntityValue::String("03/01/2020".into())
            .try_convert(&p)
            .unwrap();
        assert!(changed);
        assert_eq!(v.primitive_string(), "2020");
        let (again, changed_again) = v.try_convert(&p).unwrap();
        assert_eq!(again, v);
        assert!(!changed_again);
        assert_eq!(
            again,
            EntityValue::Date {
                value: datetime!(2020-01-03 0:00),
                format: Some("[year]".into())
            }
        );
    }

    #[test]
    fn date_formats_fall_back_to_free_parse() {
        let mut p = prop(SchemaPropertyType::Date);
        p.date_input_formats = Some(vec!["[day]/[month]/[year]".into()]);
        let (v, changed) = EntityValue::String("2020-01-03".into())
            .try_convert(&p)
            .unwrap();
        assert!(changed);
        assert_eq!(
            v,
            EntityValue::Date {
                value: datetime!(2020-01-03 0:00),
                format: None
            }
        );
    }
}
