//! Entities: ordered, case-insensitive property bags.

mod value;

pub use value::EntityValue;

use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

use crate::value::quote_single;

/// Property name that holds a scalar merged into a nested entity.
pub const PRIMITIVE_KEY: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityProperty {
    pub name: String,
    pub value: EntityValue,
}

/// An immutable record. Property names compare case-insensitively and keep
/// first-insertion order; setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    properties: IndexMap<String, EntityProperty>,
}

impl Entity {
    pub fn new() -> Self {
        Entity::default()
    }

    /// Build an entity from name/value pairs. Later duplicates win.
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, EntityValue)>) -> Self {
        let mut entity = Entity::new();
        for (name, value) in pairs {
            entity.insert(name.into(), value);
        }
        entity
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn properties(&self) -> impl Iterator<Item = &EntityProperty> {
        self.properties.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(&name.to_lowercase())
    }

    /// Look up a property. Dotted names walk into nested entities when no
    /// property has the full dotted name.
    pub fn try_get_value(&self, name: &str) -> Option<&EntityValue> {
        if let Some(p) = self.properties.get(&name.to_lowercase()) {
            return Some(&p.value);
        }
        let (head, rest) = name.split_once('.')?;
        match self.try_get_value(head)? {
            EntityValue::NestedEntity(nested) => nested.try_get_value(rest),
            _ => None,
        }
    }

    /// A copy with `name` set to `value`.
    ///
    /// Nested entities merge recursively. Setting a scalar where a nested
    /// entity already exists stores it under [`PRIMITIVE_KEY`] in that entity.
    pub fn with_property(&self, name: &str, value: EntityValue) -> Entity {
        let mut new = self.clone();
        new.insert(name.to_string(), value);
        new
    }

    /// A copy with `name` replaced by `value` and no merging.
    pub fn with_value_replaced(&self, name: &str, value: EntityValue) -> Entity {
        let mut new = self.clone();
        match new.properties.get_mut(&name.to_lowercase()) {
            Some(p) => p.value = value,
            None => {
                new.properties.insert(
                    name.to_lowercase(),
                    EntityProperty {
                        name: name.to_string(),
                        value,
                    },
                );
            }
        }
        new
    }

    pub fn without_property(&self, name: &str) -> Entity {
        let mut new = self.clone();
        new.properties.shift_remove(&name.to_lowercase());
        new
    }

    /// Every property of `other` applied on top of `self`.
    pub fn combine(&self, other: &Entity) -> Entity {
        let mut new = self.clone();
        for p in other.properties() {
            new.insert(p.name.clone(), p.value.clone());
        }
        new
    }

    fn insert(&mut self, name: String, value: EntityValue) {
        let key = name.to_lowercase();
        match self.properties.get_mut(&key) {
            Some(existing) => {
                let merged = match (&existing.value, value) {
                    (EntityValue::NestedEntity(old), EntityValue::NestedEntity(new)) => {
                        EntityValue::NestedEntity(old.combine(&new))
                    }
                    (EntityValue::NestedEntity(old), scalar) => {
                        EntityValue::NestedEntity(old.with_property(PRIMITIVE_KEY, scalar))
                    }
                    (_, v) => v,
                };
                existing.value = merged;
            }
            None => {
                self.properties.insert(key, EntityProperty { name, value });
            }
        }
    }

    // ──────────────────────────────────────────────
    // Text and JSON forms
    // ──────────────────────────────────────────────

    /// `(Name: 'x' Age: 3)`
    pub fn serialize(&self) -> String {
        self.render(EntityValue::serialize)
    }

    pub fn format(&self) -> String {
        self.render(EntityValue::format)
    }

    fn render(&self, value: fn(&EntityValue) -> String) -> String {
        let parts: Vec<String> = self
            .properties()
            .map(|p| format!("{}: {}", property_key(&p.name), value(&p.value)))
            .collect();
        format!("({})", parts.join(" "))
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .properties()
            .map(|p| (p.name.clone(), p.value.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// A JSON object becomes an entity; any other JSON value is stored
    /// under [`PRIMITIVE_KEY`].
    pub fn from_json(json: &serde_json::Value) -> Entity {
        match json {
            serde_json::Value::Object(map) => Entity::from_pairs(
                map.iter()
                    .map(|(k, v)| (k.clone(), EntityValue::from_json(v))),
            ),
            other => Entity::from_pairs([(PRIMITIVE_KEY, EntityValue::from_json(other))]),
        }
    }
}

/// A property name as it appears in entity literals. Keys that are not
/// plain identifiers are quoted.
pub fn property_key(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    };
    if plain {
        name.to_string()
    } else {
        quote_single(name)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.properties.len() == other.properties.len()
            && self.properties.iter().all(|(k, p)| {
                other
                    .properties
                    .get(k)
                    .is_some_and(|o| o.value == p.value)
            })
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut entries: Vec<(&String, &EntityProperty)> = self.properties.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, p) in entries {
            key.hash(state);
            p.value.hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(pairs: &[(&str, EntityValue)]) -> Entity {
        Entity::from_pairs(pairs.iter().map(|(k, v)| (*k, v.clone())))
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let e = entity(&[("Foo", EntityValue::Integer(1))]);
        assert_eq!(e.try_get_value("foo"), Some(&EntityValue::Integer(1)));
        assert_eq!(e.try_get_value("FOO"), Some(&EntityValue::Integer(1)));
        assert!(e.try_get_value("bar").is_none());
    }

    #[test]
    fn duplicates_collapse_and_keep_position() {
        let e = entity(&[
            ("a", EntityValue::Integer(1)),
            ("b", EntityValue::Integer(2)),
            ("A", EntityValue::Integer(3)),
        ]);
        assert_eq!(e.len(), 2);
        assert_eq!(e.serialize(), "(a: 3 b: 2)");
    }

    #[test]
    fn combine_second_wins_for_scalars() {
        let e1 = entity(&[("a", EntityValue::Integer(1)), ("b", EntityValue::Integer(2))]);
        let e2 = entity(&[("b", EntityValue::Integer(5)), ("c", EntityValue::Integer(6))]);
        let combined = e1.combine(&e2);
        assert_eq!(combined.try_get_value("a"), Some(&EntityValue::Integer(1)));
        assert_eq!(combined.try_get_value("b"), Some(&EntityValue::Integer(5)));
        assert_eq!(combined.try_get_value("c"), Some(&EntityValue::Integer(6)));
    }

    #[test]
    fn nested_entities_merge_recursively() {
        let inner1 = entity(&[("x", EntityValue::Integer(1))]);
        let inner2 = entity(&[("y", EntityValue::Integer(2))]);
        let e = entity(&[("n", EntityValue::NestedEntity(inner1))])
            .with_property("n", EntityValue::NestedEntity(inner2));
        assert_eq!(e.try_get_value("n.x"), Some(&EntityValue::Integer(1)));
        assert_eq!(e.try_get_value("n.y"), Some(&EntityValue::Integer(2)));
    }

    #[test]
    fn scalar_over_nested_goes_to_primitive_key() {
        let inner = entity(&[("x", EntityValue::Integer(1))]);
        let e = entity(&[("n", EntityValue::NestedEntity(inner))])
            .with_property("n", EntityValue::String("hi".into()));
        assert_eq!(
            e.try_get_value("n.value"),
            Some(&EntityValue::String("hi".into()))
        );
        assert_eq!(e.try_get_value("n.x"), Some(&EntityValue::Integer(1)));
    }

    #[test]
    fn equality_ignores_key_case() {
        let a = entity(&[("Name", EntityValue::String("x".into()))]);
        let b = entity(&[("name", EntityValue::String("x".into()))]);
        assert_eq!(a, b);
    }

    #[test]
    fn serialize_quotes_odd_keys() {
        let e = entity(&[("my key", EntityValue::String("it's".into()))]);
        assert_eq!(e.serialize(), "('my key': 'it''s')");
    }
}
