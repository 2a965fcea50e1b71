//! Runtime values.
//!
//! [`SclObject`] is the closed set of values an SCL step can produce.
//! Conversions between value kinds go through [`SclObject::maybe_as`] and
//! [`SclObject::try_convert`]; there is no open-ended conversion hook.

pub mod date;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use futures::future::{BoxFuture, FutureExt};
use time::PrimitiveDateTime;

use crate::array::Array;
use crate::entity::Entity;
use crate::error::{ErrorCode, SclError};
use crate::types::{SclType, TypeReference};

// ──────────────────────────────────────────────
// Enum and OneOf values
// ──────────────────────────────────────────────

/// A member of a named enumeration, written `Type.Value`.
/// Type and member names compare case-insensitively.
#[derive(Debug, Clone, Eq)]
pub struct SclEnum {
    pub type_name: String,
    pub value: String,
}

impl SclEnum {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        SclEnum {
            type_name: type_name.into(),
            value: value.into(),
        }
    }

    pub fn serialize(&self) -> String {
        format!("{}.{}", self.type_name, self.value)
    }
}

impl PartialEq for SclEnum {
    fn eq(&self, other: &Self) -> bool {
        self.type_name.eq_ignore_ascii_case(&other.type_name)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

impl Hash for SclEnum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_name.to_ascii_lowercase().hash(state);
        self.value.to_ascii_lowercase().hash(state);
    }
}

/// A value tagged with which of several possible types it holds.
#[derive(Debug, Clone)]
pub struct SclOneOf {
    pub index: usize,
    pub options: Vec<TypeReference>,
    pub value: Box<SclObject>,
}

// ──────────────────────────────────────────────
// SclObject
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum SclObject {
    Unit,
    Null,
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Date(PrimitiveDateTime),
    Enum(SclEnum),
    Entity(Entity),
    Array(Array),
    OneOf(SclOneOf),
}

impl SclObject {
    pub fn string(s: impl Into<String>) -> Self {
        SclObject::String(s.into())
    }

    pub fn type_reference(&self) -> TypeReference {
        match self {
            SclObject::Unit => TypeReference::UNIT,
            SclObject::Null => TypeReference::NULL,
            SclObject::String(_) => TypeReference::STRING,
            SclObject::Int(_) => TypeReference::INTEGER,
            SclObject::Double(_) => TypeReference::DOUBLE,
            SclObject::Bool(_) => TypeReference::BOOL,
            SclObject::Date(_) => TypeReference::DATE,
            SclObject::Enum(e) => TypeReference::Enum(e.type_name.clone()),
            SclObject::Entity(_) => TypeReference::ENTITY,
            SclObject::Array(a) => TypeReference::array(a.element_type()),
            SclObject::OneOf(o) => TypeReference::OneOf(o.options.clone()),
        }
    }

    /// A view of this value as `target`, if it already is one or is
    /// trivially compatible (integers widen to doubles).
    pub fn maybe_as(&self, target: &TypeReference) -> Option<SclObject> {
        use SclObject::*;
        if let OneOf(o) = self {
            if !matches!(target, TypeReference::OneOf(_)) {
                return o.value.maybe_as(target);
            }
        }
        match target {
            TypeReference::Any
            | TypeReference::Unknown
            | TypeReference::Variable(_) => Some(self.clone()),
            TypeReference::Multiple(options) => {
                options.iter().find_map(|o| self.maybe_as(o))
            }
            TypeReference::Actual(t) => match (t, self) {
                (SclType::Unit, Unit)
                | (SclType::Null, Null)
                | (SclType::String, String(_))
                | (SclType::Integer, Int(_))
                | (SclType::Double, Double(_))
                | (SclType::Bool, Bool(_))
                | (SclType::Date, Date(_))
                | (SclType::Entity, Entity(_)) => Some(self.clone()),
                (SclType::Double, Int(i)) => Some(Double(*i as f64)),
                _ => None,
            },
            TypeReference::Enum(name) => match self {
                Enum(e) if e.type_name.eq_ignore_ascii_case(name) => Some(self.clone()),
                _ => None,
            },
            TypeReference::Array(element) => match self {
                Array(a) => a.maybe_as_elements(element).map(Array),
                _ => None,
            },
            TypeReference::OneOf(options) => {
                let inner = match self {
                    OneOf(o) => &*o.value,
                    other => other,
                };
                options.iter().enumerate().find_map(|(index, option)| {
                    inner.maybe_as(option).map(|value| {
                        OneOf(SclOneOf {
                            index,
                            options: options.clone(),
                            value: Box::new(value),
                        })
                    })
                })
            }
        }
    }

    /// Like [`maybe_as`](Self::maybe_as) but reports a typed failure naming
    /// the property being converted.
    pub fn try_convert(
        &self,
        target: &TypeReference,
        property_name: &str,
    ) -> Result<SclObject, ErrorCode> {
        self.maybe_as(target).ok_or_else(|| ErrorCode::InvalidCast {
            property: property_name.to_string(),
            value: self.serialize(),
            target: target.to_string(),
        })
    }

    /// The value a parameter of type `type_ref` takes when nothing was
    /// supplied. `first_enum_member` resolves the default of enum types.
    pub fn default_value(
        type_ref: &TypeReference,
        first_enum_member: &dyn Fn(&str) -> Option<String>,
    ) -> SclObject {
        match type_ref {
            TypeReference::Actual(t) => match t {
                SclType::Unit => SclObject::Unit,
                SclType::Null => SclObject::Null,
                SclType::String => SclObject::String(String::new()),
                SclType::Integer => SclObject::Int(0),
                SclType::Double => SclObject::Double(0.0),
                SclType::Bool => SclObject::Bool(false),
                SclType::Date => SclObject::Date(PrimitiveDateTime::MIN),
                SclType::Entity => SclObject::Entity(Entity::new()),
            },
            TypeReference::Enum(name) => match first_enum_member(name) {
                Some(value) => SclObject::Enum(SclEnum::new(name.clone(), value)),
                None => SclObject::Null,
            },
            TypeReference::Array(_) => SclObject::Array(Array::empty()),
            TypeReference::OneOf(options) => match options.first() {
                Some(first) => SclObject::OneOf(SclOneOf {
                    index: 0,
                    options: options.clone(),
                    value: Box::new(SclObject::default_value(first, first_enum_member)),
                }),
                None => SclObject::Null,
            },
            TypeReference::Variable(_)
            | TypeReference::Any
            | TypeReference::Unknown
            | TypeReference::Multiple(_) => SclObject::Null,
        }
    }

    /// Ordering used by comparisons and sorting. Numbers compare by value
    /// across Int and Double; values of unrelated kinds order by kind.
    pub fn compare(&self, other: &SclObject) -> Ordering {
        use SclObject::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Double(b)) => (*a as f64).total_cmp(b),
            (Double(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Double(a), Double(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Enum(a), Enum(b)) => a
                .value
                .to_ascii_lowercase()
                .cmp(&b.value.to_ascii_lowercase()),
            (OneOf(a), b) => a.value.compare(b),
            (a, OneOf(b)) => a.compare(&b.value),
            _ => self
                .kind_rank()
                .cmp(&other.kind_rank())
                .then_with(|| self.serialize().cmp(&other.serialize())),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            SclObject::Unit => 0,
            SclObject::Null => 1,
            SclObject::Bool(_) => 2,
            SclObject::Int(_) | SclObject::Double(_) => 3,
            SclObject::String(_) => 4,
            SclObject::Date(_) => 5,
            SclObject::Enum(_) => 6,
            SclObject::Entity(_) => 7,
            SclObject::Array(_) => 8,
            SclObject::OneOf(_) => 9,
        }
    }

    /// Materialize every lazy array inside this value.
    pub fn evaluated(self) -> BoxFuture<'static, Result<SclObject, SclError>> {
        async move {
            match self {
                SclObject::Array(a) => {
                    let eager = a.evaluate().await?;
                    let mut elements = Vec::with_capacity(eager.len());
                    let mut errors = Vec::new();
                    for e in eager.into_vec() {
                        match e.evaluated().await {
                            Ok(v) => elements.push(v),
                            Err(err) => errors.push(err),
                        }
                    }
                    SclError::check(errors)?;
                    Ok(SclObject::Array(Array::from_vec(elements)))
                }
                SclObject::OneOf(mut o) => {
                    let inner = (*o.value).evaluated().await?;
                    o.value = Box::new(inner);
                    Ok(SclObject::OneOf(o))
                }
                other => Ok(other),
            }
        }
        .boxed()
    }

    // ──────────────────────────────────────────────
    // Text forms
    // ──────────────────────────────────────────────

    /// SCL literal text for this value. Parsing it back yields an equal value.
    pub fn serialize(&self) -> String {
        match self {
            SclObject::Unit => "Unit".to_string(),
            SclObject::Null => "null".to_string(),
            SclObject::String(s) => quote_single(s),
            SclObject::Int(i) => i.to_string(),
            SclObject::Double(d) => format_double(*d),
            SclObject::Bool(b) => b.to_string(),
            SclObject::Date(d) => date::format_date(d, None),
            SclObject::Enum(e) => e.serialize(),
            SclObject::Entity(e) => e.serialize(),
            SclObject::Array(a) => a.serialize(),
            SclObject::OneOf(o) => o.value.serialize(),
        }
    }

    /// Log form: like [`serialize`](Self::serialize) but strings are
    /// double-quoted with backslash escapes.
    pub fn format(&self) -> String {
        match self {
            SclObject::String(s) => quote_double(s),
            SclObject::Entity(e) => e.format(),
            SclObject::Array(a) => a.format(),
            SclObject::OneOf(o) => o.value.format(),
            other => other.serialize(),
        }
    }

    // ──────────────────────────────────────────────
    // JSON interop
    // ──────────────────────────────────────────────

    /// Convert to JSON. Lazy arrays become `null`; evaluate them first.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            SclObject::Unit | SclObject::Null => Value::Null,
            SclObject::String(s) => Value::String(s.clone()),
            SclObject::Int(i) => Value::from(*i),
            SclObject::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SclObject::Bool(b) => Value::Bool(*b),
            SclObject::Date(d) => Value::String(date::format_date(d, None)),
            SclObject::Enum(e) => Value::String(e.value.clone()),
            SclObject::Entity(e) => e.to_json(),
            SclObject::Array(a) => match a.as_eager() {
                Some(elements) => Value::Array(elements.iter().map(SclObject::to_json).collect()),
                None => Value::Null,
            },
            SclObject::OneOf(o) => o.value.to_json(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> SclObject {
        use serde_json::Value;
        match value {
            Value::Null => SclObject::Null,
            Value::Bool(b) => SclObject::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SclObject::Int(i),
                None => SclObject::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SclObject::String(s.clone()),
            Value::Array(items) => {
                SclObject::Array(Array::from_vec(items.iter().map(SclObject::from_json).collect()))
            }
            Value::Object(_) => SclObject::Entity(Entity::from_json(value)),
        }
    }
}

impl PartialEq for SclObject {
    fn eq(&self, other: &Self) -> bool {
        use SclObject::*;
        match (self, other) {
            (Unit, Unit) | (Null, Null) => true,
            (String(a), String(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Enum(a), Enum(b)) => a == b,
            (Entity(a), Entity(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (OneOf(a), OneOf(b)) => a.value == b.value,
            _ => false,
        }
    }
}

impl fmt::Display for SclObject {
    /// Strings display as their raw text; everything else in log form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SclObject::String(s) => f.write_str(s),
            SclObject::OneOf(o) => write!(f, "{}", o.value),
            other => f.write_str(&other.format()),
        }
    }
}

impl From<i64> for SclObject {
    fn from(i: i64) -> Self {
        SclObject::Int(i)
    }
}

impl From<f64> for SclObject {
    fn from(d: f64) -> Self {
        SclObject::Double(d)
    }
}

impl From<bool> for SclObject {
    fn from(b: bool) -> Self {
        SclObject::Bool(b)
    }
}

impl From<&str> for SclObject {
    fn from(s: &str) -> Self {
        SclObject::String(s.to_string())
    }
}

impl From<Entity> for SclObject {
    fn from(e: Entity) -> Self {
        SclObject::Entity(e)
    }
}

/// Doubles always carry a decimal point so they re-parse as doubles.
///
/// Non-finite values have no literal form: NaN and the infinities are written
/// as `NaN`, `inf` and `-inf`, which the parser does not read back.
pub fn format_double(d: f64) -> String {
    let s = d.to_string();
    if d.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else {
        s
    }
}

/// `'text'` with embedded quotes doubled.
pub fn quote_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// `"text"` with backslash escapes.
pub fn quote_double(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_scalars() {
        assert_eq!(SclObject::from("it's").serialize(), "'it''s'");
        assert_eq!(SclObject::from("it's").format(), "\"it's\"");
        assert_eq!(SclObject::Double(2.0).serialize(), "2.0");
        assert_eq!(SclObject::Double(1.5).serialize(), "1.5");
        assert_eq!(SclObject::Int(-3).serialize(), "-3");
        assert_eq!(SclObject::Bool(true).serialize(), "true");
    }

    #[test]
    fn non_finite_doubles_have_no_decimal_point() {
        assert_eq!(format_double(f64::NAN), "NaN");
        assert_eq!(format_double(f64::INFINITY), "inf");
        assert_eq!(format_double(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn maybe_as_widens_integers_only() {
        assert_eq!(
            SclObject::Int(2).maybe_as(&TypeReference::DOUBLE),
            Some(SclObject::Double(2.0))
        );
        assert_eq!(SclObject::Double(2.0).maybe_as(&TypeReference::INTEGER), None);
        assert_eq!(SclObject::from("1").maybe_as(&TypeReference::INTEGER), None);
    }

    #[test]
    fn try_convert_reports_property() {
        let err = SclObject::from("Hello")
            .try_convert(&TypeReference::INTEGER, "Value")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "'Value' with value 'Hello' could not be converted to 'Integer'"
        );
    }

    #[test]
    fn one_of_picks_first_matching_option() {
        let t = TypeReference::OneOf(vec![TypeReference::STRING, TypeReference::INTEGER]);
        match SclObject::Int(4).maybe_as(&t) {
            Some(SclObject::OneOf(o)) => {
                assert_eq!(o.index, 1);
                assert_eq!(*o.value, SclObject::Int(4));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn default_values() {
        let no_enums = |_: &str| -> Option<String> { None };
        assert_eq!(SclObject::default_value(&TypeReference::INTEGER, &no_enums), SclObject::Int(0));
        assert_eq!(
            SclObject::default_value(&TypeReference::STRING, &no_enums),
            SclObject::from("")
        );
        let members = |name: &str| (name == "Color").then(|| "Red".to_string());
        assert_eq!(
            SclObject::default_value(&TypeReference::Enum("Color".into()), &members),
            SclObject::Enum(SclEnum::new("Color", "Red"))
        );
    }

    #[test]
    fn compare_mixes_numbers() {
        assert_eq!(SclObject::Int(1).compare(&SclObject::Double(1.5)), Ordering::Less);
        assert_eq!(SclObject::from("b").compare(&SclObject::from("a")), Ordering::Greater);
    }

    #[test]
    fn json_conversion() {
        let json = serde_json::json!({"a": 1, "b": [true, null], "c": 2.5});
        let obj = SclObject::from_json(&json);
        assert_eq!(obj.to_json(), json);
    }
}
