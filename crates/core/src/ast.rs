//! The freezable step tree produced by the parser.
//!
//! Nothing here is typed yet: a freezable step only knows the names the
//! source used. Freezing (in the evaluator) resolves step names, checks
//! parameters and types, and produces runnable steps.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::location::TextLocation;
use crate::types::VariableName;
use crate::value::SclObject;

#[derive(Debug, Clone, PartialEq)]
pub enum FreezableStep {
    /// A literal value.
    Constant {
        value: SclObject,
        location: TextLocation,
    },
    /// A step call with its arguments.
    Compound(FreezableStepData),
    /// Several candidate interpretations; the first that freezes wins.
    /// Candidates are shared, so cloning an option is cheap and every
    /// clone refers to the same candidates.
    Option {
        options: Arc<[FreezableStep]>,
        location: TextLocation,
    },
    /// An entity literal whose property values are steps.
    CreateEntity {
        properties: Vec<(String, FreezableStep)>,
        location: TextLocation,
    },
}

impl FreezableStep {
    pub fn location(&self) -> &TextLocation {
        match self {
            FreezableStep::Constant { location, .. }
            | FreezableStep::Option { location, .. }
            | FreezableStep::CreateEntity { location, .. } => location,
            FreezableStep::Compound(data) => &data.location,
        }
    }

    /// A short name for diagnostics.
    pub fn step_name(&self) -> String {
        match self {
            FreezableStep::Constant { value, .. } => value.serialize(),
            FreezableStep::Compound(data) => data.step_name.clone(),
            FreezableStep::Option { options, .. } => {
                let names: Vec<String> = options.iter().map(FreezableStep::step_name).collect();
                names.join(" or ")
            }
            FreezableStep::CreateEntity { .. } => "CreateEntity".to_string(),
        }
    }

    /// Visit this step and every nested step, including lambda bodies.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FreezableStep)) {
        visit(self);
        match self {
            FreezableStep::Constant { .. } => {}
            FreezableStep::Compound(data) => {
                for property in data.properties.values() {
                    property.walk(visit);
                }
            }
            FreezableStep::Option { options, .. } => {
                for o in options.iter() {
                    o.walk(visit);
                }
            }
            FreezableStep::CreateEntity { properties, .. } => {
                for (_, step) in properties {
                    step.walk(visit);
                }
            }
        }
    }
}

/// A parsed step call.
#[derive(Debug, Clone, PartialEq)]
pub struct FreezableStepData {
    pub step_name: String,
    pub properties: IndexMap<StepParameterReference, FreezableStepProperty>,
    pub location: TextLocation,
}

impl FreezableStepData {
    pub fn new(step_name: impl Into<String>, location: TextLocation) -> Self {
        FreezableStepData {
            step_name: step_name.into(),
            properties: IndexMap::new(),
            location,
        }
    }

    pub fn with_property(
        mut self,
        reference: StepParameterReference,
        property: FreezableStepProperty,
    ) -> Self {
        self.properties.insert(reference, property);
        self
    }
}

/// How an argument was supplied: by name or by position (0-based).
/// Names compare case-insensitively.
#[derive(Debug, Clone, Eq)]
pub enum StepParameterReference {
    Named(String),
    Index(usize),
}

impl StepParameterReference {
    pub fn named(name: impl Into<String>) -> Self {
        StepParameterReference::Named(name.into())
    }
}

impl PartialEq for StepParameterReference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Named(a), Self::Named(b)) => a.eq_ignore_ascii_case(b),
            (Self::Index(a), Self::Index(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for StepParameterReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Named(n) => {
                0u8.hash(state);
                n.to_ascii_lowercase().hash(state);
            }
            Self::Index(i) => {
                1u8.hash(state);
                i.hash(state);
            }
        }
    }
}

impl fmt::Display for StepParameterReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(n) => f.write_str(n),
            Self::Index(i) => write!(f, "Parameter {}", i),
        }
    }
}

/// A lambda argument: `<x> => body`. Without a variable the body binds `<item>`.
#[derive(Debug, Clone, PartialEq)]
pub struct FreezableLambda {
    pub variable: Option<VariableName>,
    pub body: Box<FreezableStep>,
    pub location: TextLocation,
}

impl FreezableLambda {
    pub fn variable_or_item(&self) -> VariableName {
        self.variable.clone().unwrap_or_else(VariableName::item)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FreezableStepProperty {
    Step(Box<FreezableStep>),
    StepList {
        steps: Vec<FreezableStep>,
        location: TextLocation,
    },
    Variable {
        name: VariableName,
        location: TextLocation,
    },
    Lambda(FreezableLambda),
}

impl FreezableStepProperty {
    pub fn location(&self) -> &TextLocation {
        match self {
            FreezableStepProperty::Step(s) => s.location(),
            FreezableStepProperty::StepList { location, .. }
            | FreezableStepProperty::Variable { location, .. } => location,
            FreezableStepProperty::Lambda(l) => &l.location,
        }
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a FreezableStep)) {
        match self {
            FreezableStepProperty::Step(s) => s.walk(visit),
            FreezableStepProperty::StepList { steps, .. } => {
                for s in steps {
                    s.walk(visit);
                }
            }
            FreezableStepProperty::Variable { .. } => {}
            FreezableStepProperty::Lambda(l) => l.body.walk(visit),
        }
    }
}
