//! Static type references used while freezing a program.

use std::fmt;

/// The concrete scalar and structural kinds of SCL values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SclType {
    Unit,
    Null,
    String,
    Integer,
    Double,
    Bool,
    Date,
    Entity,
}

impl SclType {
    pub fn name(self) -> &'static str {
        match self {
            SclType::Unit => "Unit",
            SclType::Null => "Null",
            SclType::String => "String",
            SclType::Integer => "Integer",
            SclType::Double => "Double",
            SclType::Bool => "Boolean",
            SclType::Date => "Date",
            SclType::Entity => "Entity",
        }
    }

    pub fn from_name(name: &str) -> Option<SclType> {
        let t = match name.to_ascii_lowercase().as_str() {
            "unit" => SclType::Unit,
            "null" => SclType::Null,
            "string" | "stringstream" => SclType::String,
            "integer" | "int" => SclType::Integer,
            "double" => SclType::Double,
            "bool" | "boolean" => SclType::Bool,
            "date" | "datetime" => SclType::Date,
            "entity" => SclType::Entity,
            _ => return None,
        };
        Some(t)
    }
}

/// The name of a variable, written `<name>` in SCL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableName(pub String);

impl VariableName {
    pub fn new(name: impl Into<String>) -> Self {
        VariableName(name.into())
    }

    /// The implicit lambda variable.
    pub fn item() -> Self {
        VariableName("item".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn serialize(&self) -> String {
        format!("<{}>", self.0)
    }
}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// A static reference to a type, possibly not yet fully known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeReference {
    Actual(SclType),
    Enum(String),
    Array(Box<TypeReference>),
    OneOf(Vec<TypeReference>),
    /// The type of whatever is stored in the variable.
    Variable(VariableName),
    /// Accepts any value; checked at run time.
    Any,
    /// Not inferred yet.
    Unknown,
    /// Several candidate types unified into one reference.
    Multiple(Vec<TypeReference>),
}

impl TypeReference {
    pub const UNIT: TypeReference = TypeReference::Actual(SclType::Unit);
    pub const NULL: TypeReference = TypeReference::Actual(SclType::Null);
    pub const STRING: TypeReference = TypeReference::Actual(SclType::String);
    pub const INTEGER: TypeReference = TypeReference::Actual(SclType::Integer);
    pub const DOUBLE: TypeReference = TypeReference::Actual(SclType::Double);
    pub const BOOL: TypeReference = TypeReference::Actual(SclType::Bool);
    pub const DATE: TypeReference = TypeReference::Actual(SclType::Date);
    pub const ENTITY: TypeReference = TypeReference::Actual(SclType::Entity);

    pub fn array(element: TypeReference) -> Self {
        TypeReference::Array(Box::new(element))
    }

    pub fn is_any_or_unknown(&self) -> bool {
        matches!(self, TypeReference::Any | TypeReference::Unknown)
    }

    /// True when a value of type `actual` may be passed where `self` is
    /// expected. Unknown, `Any` and unresolved variables are allowed at
    /// freeze time and checked again when the program runs.
    pub fn allow(&self, actual: &TypeReference) -> bool {
        use TypeReference::*;
        match (self, actual) {
            (Any | Unknown | Variable(_), _) | (_, Any | Unknown | Variable(_)) => true,
            (Multiple(options), a) => options.iter().any(|o| o.allow(a)),
            (e, Multiple(options)) => options.iter().any(|o| e.allow(o)),
            (OneOf(options), OneOf(actuals)) => actuals.iter().all(|a| self.allow(a)) || options == actuals,
            (OneOf(options), a) => options.iter().any(|o| o.allow(a)),
            (Array(e), Array(a)) => e.allow(a),
            (Actual(e), Actual(a)) => e == a,
            (Enum(e), Enum(a)) => e.eq_ignore_ascii_case(a),
            _ => false,
        }
    }

    /// Unify two inferred types into one, if they are compatible.
    ///
    /// Integer and Double unify to Double; this only affects inference, the
    /// values themselves are never converted here.
    pub fn try_combine(&self, other: &TypeReference) -> Option<TypeReference> {
        use TypeReference::*;
        match (self, other) {
            (a, b) if a == b => Some(a.clone()),
            (Unknown, x) | (x, Unknown) => Some(x.clone()),
            (Any, _) | (_, Any) => Some(Any),
            (Array(a), Array(b)) => a.try_combine(b).map(TypeReference::array),
            (Actual(SclType::Integer), Actual(SclType::Double))
            | (Actual(SclType::Double), Actual(SclType::Integer)) => Some(TypeReference::DOUBLE),
            (Enum(a), Enum(b)) if a.eq_ignore_ascii_case(b) => Some(self.clone()),
            (Multiple(options), x) | (x, Multiple(options)) => {
                if options.contains(x) {
                    Some(Multiple(options.clone()))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Unify a sequence of types, falling back to `Multiple` when they disagree.
    pub fn unify_all<'a>(types: impl IntoIterator<Item = &'a TypeReference>) -> TypeReference {
        let mut distinct: Vec<TypeReference> = Vec::new();
        let mut combined: Option<TypeReference> = None;
        let mut compatible = true;
        for t in types {
            if !distinct.contains(t) {
                distinct.push(t.clone());
            }
            if compatible {
                combined = match &combined {
                    None => Some(t.clone()),
                    Some(c) => match c.try_combine(t) {
                        Some(n) => Some(n),
                        None => {
                            compatible = false;
                            None
                        }
                    },
                };
            }
        }
        match (compatible, combined) {
            (_, None) if distinct.is_empty() => TypeReference::Any,
            (true, Some(c)) => c,
            _ => TypeReference::Multiple(distinct),
        }
    }

    /// The element type when this is an array (or could be one).
    pub fn try_get_array_member_type(&self) -> Option<TypeReference> {
        match self {
            TypeReference::Array(e) => Some((**e).clone()),
            TypeReference::Any | TypeReference::Unknown | TypeReference::Variable(_) => {
                Some(TypeReference::Any)
            }
            _ => None,
        }
    }

    /// Whether values of this type have an ordering usable by comparisons
    /// and sorting. Composite values (arrays, entities) do not.
    pub fn is_comparable(&self) -> bool {
        match self {
            TypeReference::Actual(SclType::Entity) => false,
            TypeReference::Actual(_) | TypeReference::Enum(_) => true,
            TypeReference::Array(_) => false,
            TypeReference::OneOf(options) | TypeReference::Multiple(options) => {
                options.iter().all(TypeReference::is_comparable)
            }
            TypeReference::Any | TypeReference::Unknown | TypeReference::Variable(_) => true,
        }
    }

    /// Replace `Unknown` (anywhere inside) with `Any`.
    pub fn unknown_to_any(self) -> TypeReference {
        match self {
            TypeReference::Unknown => TypeReference::Any,
            TypeReference::Array(e) => TypeReference::array(e.unknown_to_any()),
            TypeReference::OneOf(o) => {
                TypeReference::OneOf(o.into_iter().map(TypeReference::unknown_to_any).collect())
            }
            TypeReference::Multiple(o) => {
                TypeReference::Multiple(o.into_iter().map(TypeReference::unknown_to_any).collect())
            }
            other => other,
        }
    }

    /// Parse a type name such as `Integer` or `Array<String>`.
    /// Names that are not built-in types are taken as enum type names.
    pub fn from_name(name: &str) -> Option<TypeReference> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Some(inner) = strip_generic(name, "Array") {
            return TypeReference::from_name(inner).map(TypeReference::array);
        }
        if let Some(inner) = strip_generic(name, "OneOf") {
            let options: Option<Vec<_>> = split_top_level(inner)
                .into_iter()
                .map(TypeReference::from_name)
                .collect();
            return options.map(TypeReference::OneOf);
        }
        if name.eq_ignore_ascii_case("any") {
            return Some(TypeReference::Any);
        }
        if let Some(t) = SclType::from_name(name) {
            return Some(TypeReference::Actual(t));
        }
        if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Some(TypeReference::Enum(name.to_string()));
        }
        None
    }
}

fn strip_generic<'a>(name: &'a str, head: &str) -> Option<&'a str> {
    let rest = name.get(..head.len())?;
    if !rest.eq_ignore_ascii_case(head) {
        return None;
    }
    name[head.len()..]
        .trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeReference::Actual(t) => f.write_str(t.name()),
            TypeReference::Enum(name) => f.write_str(name),
            TypeReference::Array(e) => write!(f, "Array<{}>", e),
            TypeReference::OneOf(options) => {
                let names: Vec<String> = options.iter().map(|o| o.to_string()).collect();
                write!(f, "OneOf<{}>", names.join(", "))
            }
            TypeReference::Variable(v) => write!(f, "{}", v),
            TypeReference::Any => f.write_str("Any"),
            TypeReference::Unknown => f.write_str("Unknown"),
            TypeReference::Multiple(options) => {
                let names: Vec<String> = options.iter().map(|o| o.to_string()).collect();
                f.write_str(&names.join(" or "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_is_exact_for_actual_types() {
        assert!(TypeReference::INTEGER.allow(&TypeReference::INTEGER));
        assert!(!TypeReference::DOUBLE.allow(&TypeReference::INTEGER));
        assert!(!TypeReference::STRING.allow(&TypeReference::INTEGER));
        assert!(TypeReference::Any.allow(&TypeReference::ENTITY));
        assert!(TypeReference::STRING.allow(&TypeReference::Any));
    }

    #[test]
    fn allow_arrays_by_element() {
        let ints = TypeReference::array(TypeReference::INTEGER);
        let any = TypeReference::array(TypeReference::Any);
        assert!(ints.allow(&ints));
        assert!(any.allow(&ints));
        assert!(!ints.allow(&TypeReference::array(TypeReference::STRING)));
    }

    #[test]
    fn combine_integer_and_double() {
        assert_eq!(
            TypeReference::INTEGER.try_combine(&TypeReference::DOUBLE),
            Some(TypeReference::DOUBLE)
        );
        assert_eq!(TypeReference::INTEGER.try_combine(&TypeReference::STRING), None);
    }

    #[test]
    fn unify_all_falls_back_to_multiple() {
        let t = TypeReference::unify_all(&[TypeReference::INTEGER, TypeReference::STRING]);
        assert_eq!(
            t,
            TypeReference::Multiple(vec![TypeReference::INTEGER, TypeReference::STRING])
        );
        assert_eq!(TypeReference::unify_all(&[]), TypeReference::Any);
    }

    #[test]
    fn arrays_are_not_comparable() {
        assert!(TypeReference::STRING.is_comparable());
        assert!(!TypeReference::array(TypeReference::STRING).is_comparable());
        assert!(!TypeReference::ENTITY.is_comparable());
    }

    #[test]
    fn names_round_trip() {
        for name in ["Integer", "Array<String>", "Array<Array<Double>>", "ErrorBehaviour"] {
            let t = TypeReference::from_name(name).unwrap();
            assert_eq!(t.to_string(), name);
        }
    }
}
