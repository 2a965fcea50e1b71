//! JSON-Schema-shaped schema trees.
//!
//! Nodes can be merged with [`SchemaNode::combine`] when schema
//! information comes from several sources; the result accepts everything
//! either input accepts.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::{Schema, SchemaProperty, SchemaPropertyType};
use crate::entity::{Entity, EntityValue};
use crate::error::ErrorCode;
use crate::value::date::parse_date;

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Accepts any value (`true` in JSON Schema).
    Any,
    Null,
    Boolean,
    Integer,
    Number,
    String(StringFormat),
    Array(Box<SchemaNode>),
    Object(ObjectNode),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringFormat {
    None,
    DateTime,
    Enum(BTreeSet<String>),
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectNode {
    pub title: Option<String>,
    pub properties: IndexMap<String, SchemaNode>,
    pub required: BTreeSet<String>,
    pub additional_properties: bool,
}

impl StringFormat {
    fn combine(&self, other: &StringFormat) -> StringFormat {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (StringFormat::Enum(a), StringFormat::Enum(b)) => {
                StringFormat::Enum(a.union(b).cloned().collect())
            }
            _ => StringFormat::None,
        }
    }

    fn is_more_permissive(&self, other: &StringFormat) -> bool {
        match (self, other) {
            (StringFormat::None, _) => true,
            (StringFormat::Enum(a), StringFormat::Enum(b)) => b.is_subset(a),
            (a, b) => a == b,
        }
    }
}

impl ObjectNode {
    fn combine(&self, other: &ObjectNode) -> ObjectNode {
        let mut properties = IndexMap::new();
        for (name, node) in &self.properties {
            let merged = match other.properties.get(name) {
                Some(o) => node.combine(o),
                None => node.clone(),
            };
            properties.insert(name.clone(), merged);
        }
        for (name, node) in &other.properties {
            if !properties.contains_key(name) {
                properties.insert(name.clone(), node.clone());
            }
        }
        let title = match (&self.title, &other.title) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };
        ObjectNode {
            title,
            properties,
            required: self.required.intersection(&other.required).cloned().collect(),
            additional_properties: self.additional_properties || other.additional_properties,
        }
    }

    fn is_more_permissive(&self, other: &ObjectNode) -> bool {
        self.required.is_subset(&other.required)
            && (self.additional_properties || !other.additional_properties)
            && other.properties.iter().all(|(name, node)| {
                match self.properties.get(name) {
                    Some(mine) => mine.is_more_permissive(node),
                    None => self.additional_properties,
                }
            })
    }

    fn try_transform(&self, entity: &Entity) -> Result<Option<Entity>, Vec<ErrorCode>> {
        let mut errors = Vec::new();
        let mut result = entity.clone();
        let mut changed = false;
        for p in entity.properties() {
            let node = self
                .properties
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(&p.name))
                .map(|(_, n)| n);
            match node {
                Some(node) => match node.try_transform(&p.value) {
                    Ok(Some(v)) => {
                        result = result.with_value_replaced(&p.name, v);
                        changed = true;
                    }
                    Ok(None) => {}
                    Err(mut e) => errors.append(&mut e),
                },
                None if !self.additional_properties => {
                    errors.push(ErrorCode::SchemaViolationUnexpectedProperty(p.name.clone()))
                }
                None => {}
            }
        }
        for name in &self.required {
            if !entity.contains(name) {
                errors.push(ErrorCode::SchemaViolationMissingProperty(name.clone()));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(changed.then_some(result))
    }
}

impl SchemaNode {
    /// A node accepting everything either node accepts. Commutative and
    /// idempotent; when neither node covers the other the more general
    /// kind wins, falling back to [`SchemaNode::Any`].
    pub fn combine(&self, other: &SchemaNode) -> SchemaNode {
        use SchemaNode::*;
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Any, _) | (_, Any) => Any,
            (Integer, Number) | (Number, Integer) => Number,
            (String(a), String(b)) => String(a.combine(b)),
            (Array(a), Array(b)) => Array(Box::new(a.combine(b))),
            (Object(a), Object(b)) => Object(a.combine(b)),
            (Null, x) | (x, Null) => x.clone(),
            _ => Any,
        }
    }

    /// True when `self` accepts every value `other` accepts.
    pub fn is_more_permissive(&self, other: &SchemaNode) -> bool {
        use SchemaNode::*;
        match (self, other) {
            (Any, _) => true,
            (_, Any) => false,
            (a, b) if a == b => true,
            (_, Null) => true,
            (Number, Integer) => true,
            (String(a), String(b)) => a.is_more_permissive(b),
            (Array(a), Array(b)) => a.is_more_permissive(b),
            (Object(a), Object(b)) => a.is_more_permissive(b),
            _ => false,
        }
    }

    // ──────────────────────────────────────────────
    // Construction
    // ──────────────────────────────────────────────

    pub fn from_schema(schema: &Schema) -> SchemaNode {
        let mut node = ObjectNode {
            title: Some(schema.name.clone()),
            additional_properties: schema.allow_extra_properties,
            ..ObjectNode::default()
        };
        for (name, property) in &schema.properties {
            let single = SchemaNode::from_property(property);
            let n = if property.multiplicity.allows_list() {
                SchemaNode::Array(Box::new(single))
            } else {
                single
            };
            node.properties.insert(name.clone(), n);
            if property.multiplicity.is_required() {
                node.required.insert(name.clone());
            }
        }
        SchemaNode::Object(node)
    }

    fn from_property(property: &SchemaProperty) -> SchemaNode {
        match property.property_type {
            SchemaPropertyType::String => match &property.regex {
                Some(r) => SchemaNode::String(StringFormat::Pattern(r.clone())),
                None => SchemaNode::String(StringFormat::None),
            },
            SchemaPropertyType::Integer => SchemaNode::Integer,
            SchemaPropertyType::Double => SchemaNode::Number,
            SchemaPropertyType::Bool => SchemaNode::Boolean,
            SchemaPropertyType::Enum => SchemaNode::String(StringFormat::Enum(
                property.values.iter().flatten().cloned().collect(),
            )),
            SchemaPropertyType::Date => SchemaNode::String(StringFormat::DateTime),
            SchemaPropertyType::Entity => SchemaNode::Object(ObjectNode {
                additional_properties: true,
                ..ObjectNode::default()
            }),
            SchemaPropertyType::Any => SchemaNode::Any,
        }
    }

    /// The narrowest node accepting `value`.
    pub fn infer(value: &EntityValue) -> SchemaNode {
        match value {
            EntityValue::Null => SchemaNode::Null,
            EntityValue::String(_) => SchemaNode::String(StringFormat::None),
            EntityValue::Integer(_) => SchemaNode::Integer,
            EntityValue::Double(_) => SchemaNode::Number,
            EntityValue::Boolean(_) => SchemaNode::Boolean,
            EntityValue::EnumerationValue(e) => {
                SchemaNode::String(StringFormat::Enum([e.value.clone()].into_iter().collect()))
            }
            EntityValue::Date { .. } => SchemaNode::String(StringFormat::DateTime),
            EntityValue::NestedEntity(e) => SchemaNode::infer_entity(e),
            EntityValue::NestedList(items) => {
                let item = items
                    .iter()
                    .map(SchemaNode::infer)
                    .reduce(|a, b| a.combine(&b))
                    .unwrap_or(SchemaNode::Any);
                SchemaNode::Array(Box::new(item))
            }
        }
    }

    pub fn infer_entity(entity: &Entity) -> SchemaNode {
        let mut node = ObjectNode::default();
        for p in entity.properties() {
            node.properties.insert(p.name.clone(), SchemaNode::infer(&p.value));
            node.required.insert(p.name.clone());
        }
        SchemaNode::Object(node)
    }

    // ──────────────────────────────────────────────
    // Validation
    // ──────────────────────────────────────────────

    /// Validate `value`, coercing strings and numbers where the node asks
    /// for a different scalar. `Ok(None)` means the value is fine as is.
    pub fn try_transform(&self, value: &EntityValue) -> Result<Option<EntityValue>, Vec<ErrorCode>> {
        let wrong = |target: &str| {
            Err(vec![ErrorCode::SchemaViolationWrongType {
                value: value.primitive_string(),
                target: target.to_string(),
            }])
        };
        match (self, value) {
            (SchemaNode::Any, _) | (_, EntityValue::Null) => Ok(None),
            (SchemaNode::Null, _) => wrong("Null"),

            (SchemaNode::Boolean, EntityValue::Boolean(_)) => Ok(None),
            (SchemaNode::Boolean, EntityValue::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Ok(Some(EntityValue::Boolean(true))),
                "false" => Ok(Some(EntityValue::Boolean(false))),
                _ => wrong("Boolean"),
            },
            (SchemaNode::Boolean, _) => wrong("Boolean"),

            (SchemaNode::Integer, EntityValue::Integer(_)) => Ok(None),
            (SchemaNode::Integer, EntityValue::String(s)) => match s.trim().parse() {
                Ok(i) => Ok(Some(EntityValue::Integer(i))),
                Err(_) => wrong("Integer"),
            },
            (SchemaNode::Integer, _) => wrong("Integer"),

            (SchemaNode::Number, EntityValue::Integer(_) | EntityValue::Double(_)) => Ok(None),
            (SchemaNode::Number, EntityValue::String(s)) => match s.trim().parse() {
                Ok(d) => Ok(Some(EntityValue::Double(d))),
                Err(_) => wrong("Number"),
            },
            (SchemaNode::Number, _) => wrong("Number"),

            (SchemaNode::String(format), _) => transform_string(format, value),

            (SchemaNode::Array(item), EntityValue::NestedList(items)) => {
                let mut errors = Vec::new();
                let mut changed = false;
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    match item.try_transform(v) {
                        Ok(Some(n)) => {
                            changed = true;
                            out.push(n);
                        }
                        Ok(None) => out.push(v.clone()),
                        Err(mut e) => errors.append(&mut e),
                    }
                }
                if !errors.is_empty() {
                    return Err(errors);
                }
                Ok(changed.then_some(EntityValue::NestedList(out)))
            }
            (SchemaNode::Array(_), _) => wrong("Array"),

            (SchemaNode::Object(o), EntityValue::NestedEntity(e)) => {
                Ok(o.try_transform(e)?.map(EntityValue::NestedEntity))
            }
            (SchemaNode::Object(_), _) => wrong("Entity"),
        }
    }

    // ──────────────────────────────────────────────
    // JSON Schema
    // ──────────────────────────────────────────────

    pub fn from_json_schema(json: &Value) -> Result<SchemaNode, ErrorCode> {
        let map = match json {
            Value::Bool(true) => return Ok(SchemaNode::Any),
            Value::Object(map) => map,
            other => {
                return Err(ErrorCode::SchemaInvalid(format!(
                    "unsupported JSON schema {}",
                    other
                )))
            }
        };
        if let Some(Value::Array(values)) = map.get("enum") {
            let members = values
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            return Ok(SchemaNode::String(StringFormat::Enum(members)));
        }
        match map.get("type") {
            None if map.contains_key("properties") => object_from_json(map),
            None => Ok(SchemaNode::Any),
            Some(Value::String(t)) => node_for_type(t, map),
            Some(Value::Array(types)) => {
                let mut node: Option<SchemaNode> = None;
                for t in types {
                    let name = t.as_str().ok_or_else(|| {
                        ErrorCode::SchemaInvalid(format!("invalid type {}", t))
                    })?;
                    let n = node_for_type(name, map)?;
                    node = Some(match node {
                        Some(existing) => existing.combine(&n),
                        None => n,
                    });
                }
                Ok(node.unwrap_or(SchemaNode::Any))
            }
            Some(other) => Err(ErrorCode::SchemaInvalid(format!("invalid type {}", other))),
        }
    }

    pub fn to_json_schema(&self) -> Value {
        match self {
            SchemaNode::Any => Value::Bool(true),
            SchemaNode::Null => json!({"type": "null"}),
            SchemaNode::Boolean => json!({"type": "boolean"}),
            SchemaNode::Integer => json!({"type": "integer"}),
            SchemaNode::Number => json!({"type": "number"}),
            SchemaNode::String(StringFormat::None) => json!({"type": "string"}),
            SchemaNode::String(StringFormat::DateTime) => {
                json!({"type": "string", "format": "date-time"})
            }
            SchemaNode::String(StringFormat::Pattern(p)) => {
                json!({"type": "string", "pattern": p})
            }
            SchemaNode::String(StringFormat::Enum(values)) => {
                json!({"type": "string", "enum": values})
            }
            SchemaNode::Array(item) => json!({"type": "array", "items": item.to_json_schema()}),
            SchemaNode::Object(o) => {
                let mut map = Map::new();
                if let Some(title) = &o.title {
                    map.insert("title".into(), Value::String(title.clone()));
                }
                map.insert("type".into(), Value::String("object".into()));
                let properties: Map<String, Value> = o
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json_schema()))
                    .collect();
                map.insert("properties".into(), Value::Object(properties));
                if !o.required.is_empty() {
                    map.insert("required".into(), json!(o.required));
                }
                map.insert(
                    "additionalProperties".into(),
                    Value::Bool(o.additional_properties),
                );
                Value::Object(map)
            }
        }
    }
}

fn transform_string(format: &StringFormat, value: &EntityValue) -> Result<Option<EntityValue>, Vec<ErrorCode>> {
    let text = value.primitive_string();
    let wrong = |target: &str| {
        Err(vec![ErrorCode::SchemaViolationWrongType {
            value: text.clone(),
            target: target.to_string(),
        }])
    };
    match format {
        StringFormat::None => match value {
            EntityValue::String(_) => Ok(None),
            EntityValue::NestedEntity(_) | EntityValue::NestedList(_) => wrong("String"),
            _ => Ok(Some(EntityValue::String(text.clone()))),
        },
        StringFormat::DateTime => match value {
            EntityValue::Date { .. } => Ok(None),
            EntityValue::String(s) => match parse_date(s, &[]) {
                Some(d) => Ok(Some(EntityValue::Date {
                    value: d,
                    format: None,
                })),
                None => wrong("Date"),
            },
            _ => wrong("Date"),
        },
        StringFormat::Pattern(p) => {
            let regex = Regex::new(p).map_err(|_| vec![ErrorCode::SchemaInvalidRegex(p.clone())])?;
            if !regex.is_match(&text) {
                return Err(vec![ErrorCode::SchemaViolationUnmatchedRegex {
                    value: text.clone(),
                    regex: p.clone(),
                }]);
            }
            match value {
                EntityValue::String(_) => Ok(None),
                _ => Ok(Some(EntityValue::String(text.clone()))),
            }
        }
        StringFormat::Enum(values) => {
            let member = values.iter().find(|v| v.eq_ignore_ascii_case(&text));
            match (member, value) {
                (Some(m), EntityValue::String(s)) if m == s => Ok(None),
                (Some(_), EntityValue::EnumerationValue(_)) => Ok(None),
                (Some(m), _) => Ok(Some(EntityValue::String(m.clone()))),
                (None, _) => wrong("Enum"),
            }
        }
    }
}

fn node_for_type(type_name: &str, map: &Map<String, Value>) -> Result<SchemaNode, ErrorCode> {
    match type_name {
        "object" => object_from_json(map),
        "array" => {
            let item = match map.get("items") {
                Some(items) => SchemaNode::from_json_schema(items)?,
                None => SchemaNode::Any,
            };
            Ok(SchemaNode::Array(Box::new(item)))
        }
        "string" => {
            let format = match (map.get("format"), map.get("pattern")) {
                (Some(Value::String(f)), _) if f == "date-time" || f == "date" => StringFormat::DateTime,
                (_, Some(Value::String(p))) => StringFormat::Pattern(p.clone()),
                _ => StringFormat::None,
            };
            Ok(SchemaNode::String(format))
        }
        "integer" => Ok(SchemaNode::Integer),
        "number" => Ok(SchemaNode::Number),
        "boolean" => Ok(SchemaNode::Boolean),
        "null" => Ok(SchemaNode::Null),
        other => Err(ErrorCode::SchemaInvalid(format!("unknown type '{}'", other))),
    }
}

fn object_from_json(map: &Map<String, Value>) -> Result<SchemaNode, ErrorCode> {
    let mut node = ObjectNode {
        title: map.get("title").and_then(Value::as_str).map(str::to_string),
        additional_properties: map
            .get("additionalProperties")
            .map(|v| !matches!(v, Value::Bool(false)))
            .unwrap_or(true),
        ..ObjectNode::default()
    };
    if let Some(Value::Object(props)) = map.get("properties") {
        for (name, schema) in props {
            node.properties
                .insert(name.clone(), SchemaNode::from_json_schema(schema)?);
        }
    }
    if let Some(Value::Array(required)) = map.get("required") {
        node.required = required
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    Ok(SchemaNode::Object(node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Multiplicity;

    fn obj(props: &[(&str, SchemaNode)], required: &[&str], additional: bool) -> SchemaNode {
        SchemaNode::Object(ObjectNode {
            title: None,
            properties: props.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            required: required.iter().map(|s| s.to_string()).collect(),
            additional_properties: additional,
        })
    }

    fn samples() -> Vec<SchemaNode> {
        vec![
            SchemaNode::Any,
            SchemaNode::Null,
            SchemaNode::Integer,
            SchemaNode::Number,
            SchemaNode::Boolean,
            SchemaNode::String(StringFormat::None),
            SchemaNode::String(StringFormat::Enum(["a".to_string()].into_iter().collect())),
            SchemaNode::String(StringFormat::Enum(["b".to_string()].into_iter().collect())),
            SchemaNode::Array(Box::new(SchemaNode::Integer)),
            obj(&[("x", SchemaNode::Integer)], &["x"], false),
            obj(&[("y", SchemaNode::Number)], &["y"], false),
        ]
    }

    #[test]
    fn combine_is_commutative_and_idempotent() {
        for a in samples() {
            assert_eq!(a.combine(&a), a);
            for b in samples() {
                assert_eq!(a.combine(&b), b.combine(&a), "{:?} / {:?}", a, b);
            }
        }
    }

    #[test]
    fn combined_node_is_more_permissive_than_inputs() {
        for a in samples() {
            for b in samples() {
                let c = a.combine(&b);
                assert!(c.is_more_permissive(&a), "{:?} !>= {:?}", c, a);
                assert!(c.is_more_permissive(&b), "{:?} !>= {:?}", c, b);
            }
        }
    }

    #[test]
    fn objects_combine_properties() {
        let a = obj(&[("x", SchemaNode::Integer)], &["x"], false);
        let b = obj(&[("x", SchemaNode::Number), ("y", SchemaNode::Boolean)], &["x", "y"], false);
        assert_eq!(
            a.combine(&b),
            obj(&[("x", SchemaNode::Number), ("y", SchemaNode::Boolean)], &["x"], false)
        );
    }

    #[test]
    fn json_schema_round_trip() {
        let json = json!({
            "title": "Person",
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"},
                "tags": {"type": "array", "items": {"type": "string", "enum": ["a", "b"]}},
                "born": {"type": "string", "format": "date-time"}
            },
            "required": ["name"],
            "additionalProperties": false
        });
        let node = SchemaNode::from_json_schema(&json).unwrap();
        assert_eq!(node.to_json_schema(), json);
    }

    #[test]
    fn infer_and_transform() {
        let entity = Entity::from_pairs([
            ("a", EntityValue::Integer(1)),
            ("b", EntityValue::String("x".into())),
        ]);
        let node = SchemaNode::infer_entity(&entity);
        assert_eq!(node.try_transform(&EntityValue::NestedEntity(entity.clone())), Ok(None));

        let stringly = Entity::from_pairs([
            ("a", EntityValue::String("2".into())),
            ("b", EntityValue::String("y".into())),
        ]);
        let transformed = node
            .try_transform(&EntityValue::NestedEntity(stringly))
            .unwrap()
            .unwrap();
        match transformed {
            EntityValue::NestedEntity(e) => {
                assert_eq!(e.try_get_value("a"), Some(&EntityValue::Integer(2)))
            }
            other => panic!("unexpected {:?}", other),
        }

        let missing = Entity::from_pairs([("a", EntityValue::Integer(1))]);
        let errors = node
            .try_transform(&EntityValue::NestedEntity(missing))
            .unwrap_err();
        assert_eq!(
            errors,
            vec![ErrorCode::SchemaViolationMissingProperty("b".into())]
        );
    }

    #[test]
    fn whole_doubles_are_not_integers() {
        assert_eq!(
            SchemaNode::Integer.try_transform(&EntityValue::Double(3.0)),
            Err(vec![ErrorCode::SchemaViolationWrongType {
                value: "3.0".into(),
                target: "Integer".into()
            }])
        );
        assert_eq!(SchemaNode::Number.try_transform(&EntityValue::Double(3.0)), Ok(None));
    }

    #[test]
    fn from_schema_marks_required_and_lists() {
        let schema = Schema::new("S")
            .with_property(
                "Id",
                SchemaProperty::new(SchemaPropertyType::Integer, Multiplicity::ExactlyOne),
            )
            .with_property(
                "Tags",
                SchemaProperty::new(SchemaPropertyType::String, Multiplicity::Any),
            );
        match SchemaNode::from_schema(&schema) {
            SchemaNode::Object(o) => {
                assert!(o.required.contains("Id"));
                assert!(!o.required.contains("Tags"));
                assert_eq!(
                    o.properties.get("Tags"),
                    Some(&SchemaNode::Array(Box::new(SchemaNode::String(StringFormat::None))))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
