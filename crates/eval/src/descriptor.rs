//! Declarative step signatures.
//!
//! Every step type describes its parameters once, at registration, with a
//! [`StepDescriptor`]. Freezing matches arguments against the descriptor,
//! infers generic slots from its [`TypeTemplate`]s and checks
//! [`Requirement`]s against the installed connectors.

use std::fmt;

use scl_core::{ErrorCode, SclObject, TypeReference};
use semver::{Version, VersionReq};

use crate::settings::SclSettings;

// ──────────────────────────────────────────────
// Parameters
// ──────────────────────────────────────────────

/// How an argument must be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// A single step producing a value.
    Step,
    /// A list of steps; a single array-producing step is also accepted.
    StepList,
    /// A variable name such as `<x>`.
    VariableName,
    /// A lambda `<x> => body`, or a step run with `<item>` bound.
    Lambda,
}

impl ParameterKind {
    pub fn name(self) -> &'static str {
        match self {
            ParameterKind::Step => "step",
            ParameterKind::StepList => "step list",
            ParameterKind::VariableName => "variable name",
            ParameterKind::Lambda => "lambda",
        }
    }
}

/// A parameter or output type, possibly mentioning generic slots.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeTemplate {
    Exact(TypeReference),
    /// Generic slot, bound during freezing.
    Param(usize),
    ArrayOf(Box<TypeTemplate>),
    /// The type of the variable named by another parameter.
    VariableOf(&'static str),
    /// A lambda binding `variable` and producing `body`.
    Lambda {
        variable: Box<TypeTemplate>,
        body: Box<TypeTemplate>,
    },
}

impl TypeTemplate {
    pub fn any() -> Self {
        TypeTemplate::Exact(TypeReference::Any)
    }

    pub fn exact(t: TypeReference) -> Self {
        TypeTemplate::Exact(t)
    }

    pub fn array_of(element: TypeTemplate) -> Self {
        TypeTemplate::ArrayOf(Box::new(element))
    }

    pub fn lambda(variable: TypeTemplate, body: TypeTemplate) -> Self {
        TypeTemplate::Lambda {
            variable: Box::new(variable),
            body: Box::new(body),
        }
    }

    /// Number of generic slots mentioned.
    pub fn slot_count(&self) -> usize {
        match self {
            TypeTemplate::Param(i) => i + 1,
            TypeTemplate::ArrayOf(t) => t.slot_count(),
            TypeTemplate::Lambda { variable, body } => variable.slot_count().max(body.slot_count()),
            TypeTemplate::Exact(_) | TypeTemplate::VariableOf(_) => 0,
        }
    }

    /// The concrete type under `generics`. Unbound slots are `Any`; a
    /// lambda instantiates to the type its body produces.
    pub fn instantiate(
        &self,
        generics: &[TypeReference],
        variable_type: &dyn Fn(&str) -> TypeReference,
    ) -> TypeReference {
        match self {
            TypeTemplate::Exact(t) => t.clone(),
            TypeTemplate::Param(i) => generics
                .get(*i)
                .cloned()
                .unwrap_or(TypeReference::Any)
                .unknown_to_any(),
            TypeTemplate::ArrayOf(t) => TypeReference::array(t.instantiate(generics, variable_type)),
            TypeTemplate::VariableOf(parameter) => variable_type(parameter).unknown_to_any(),
            TypeTemplate::Lambda { body, .. } => body.instantiate(generics, variable_type),
        }
    }

    /// Bind generic slots from a type known to fill this template.
    pub fn unify(&self, actual: &TypeReference, generics: &mut [TypeReference]) {
        match self {
            TypeTemplate::Param(i) => {
                if actual.is_any_or_unknown() {
                    return;
                }
                if let Some(slot) = generics.get_mut(*i) {
                    if let Some(combined) = slot.try_combine(actual) {
                        *slot = combined;
                    }
                }
            }
            TypeTemplate::ArrayOf(t) => {
                if let Some(element) = actual.try_get_array_member_type() {
                    t.unify(&element, generics);
                }
            }
            TypeTemplate::Lambda { body, .. } => body.unify(actual, generics),
            TypeTemplate::Exact(_) | TypeTemplate::VariableOf(_) => {}
        }
    }

    /// The element template of a list parameter.
    pub fn element(&self) -> TypeTemplate {
        match self {
            TypeTemplate::ArrayOf(t) => (**t).clone(),
            _ => TypeTemplate::any(),
        }
    }
}

impl fmt::Display for TypeTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const SLOTS: [&str; 4] = ["T", "U", "V", "W"];
        match self {
            TypeTemplate::Exact(t) => write!(f, "{}", t),
            TypeTemplate::Param(i) => match SLOTS.get(*i) {
                Some(s) => f.write_str(s),
                None => write!(f, "T{}", i),
            },
            TypeTemplate::ArrayOf(t) => write!(f, "Array<{}>", t),
            TypeTemplate::VariableOf(p) => write!(f, "typeof({})", p),
            TypeTemplate::Lambda { variable, body } => write!(f, "{} => {}", variable, body),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub aliases: Vec<&'static str>,
    /// 0-based position for positional arguments.
    pub position: Option<usize>,
    pub required: bool,
    pub kind: ParameterKind,
    pub template: TypeTemplate,
    pub default: Option<SclObject>,
    /// Only checked when the argument is supplied.
    pub requirement: Option<Requirement>,
    /// A variable-name parameter whose variable must already be set.
    pub reads_variable: bool,
    pub summary: &'static str,
}

impl ParameterSpec {
    fn new(name: &'static str, kind: ParameterKind, template: TypeTemplate) -> Self {
        ParameterSpec {
            name,
            aliases: Vec::new(),
            position: None,
            required: true,
            kind,
            template,
            default: None,
            requirement: None,
            reads_variable: false,
            summary: "",
        }
    }

    pub fn step(name: &'static str, template: TypeTemplate) -> Self {
        Self::new(name, ParameterKind::Step, template)
    }

    /// A list parameter; `element` is the type of each item.
    pub fn list(name: &'static str, element: TypeTemplate) -> Self {
        Self::new(name, ParameterKind::StepList, TypeTemplate::array_of(element))
    }

    pub fn variable(name: &'static str) -> Self {
        Self::new(name, ParameterKind::VariableName, TypeTemplate::any())
    }

    pub fn lambda(name: &'static str, variable: TypeTemplate, body: TypeTemplate) -> Self {
        Self::new(name, ParameterKind::Lambda, TypeTemplate::lambda(variable, body))
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default_value(mut self, value: SclObject) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn reads(mut self) -> Self {
        self.reads_variable = true;
        self
    }

    pub fn summary(mut self, summary: &'static str) -> Self {
        self.summary = summary;
        self
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

// ──────────────────────────────────────────────
// Requirements
// ──────────────────────────────────────────────

/// A connector that must be installed, optionally within a version range.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub connector: String,
    pub version: Option<VersionReq>,
}

impl Requirement {
    pub fn connector(name: impl Into<String>) -> Self {
        Requirement {
            connector: name.into(),
            version: None,
        }
    }

    /// Restrict the version with a semver requirement such as `>=1.2, <2`.
    pub fn with_version(mut self, req: &str) -> Result<Self, semver::Error> {
        self.version = Some(VersionReq::parse(req)?);
        Ok(self)
    }

    pub fn check(&self, settings: &SclSettings) -> Result<(), ErrorCode> {
        let not_met = |reason: String| ErrorCode::RequirementsNotMet {
            requirement: self.to_string(),
            reason,
        };
        let installed = match settings.connector(&self.connector) {
            Some(c) if c.enabled => c,
            Some(_) => return Err(not_met(format!("connector '{}' is disabled", self.connector))),
            None => return Err(not_met(format!("connector '{}' is not installed", self.connector))),
        };
        let Some(req) = &self.version else {
            return Ok(());
        };
        let version = Version::parse(&installed.version)
            .map_err(|e| not_met(format!("installed version '{}' is invalid: {}", installed.version, e)))?;
        if req.matches(&version) {
            Ok(())
        } else {
            Err(not_met(format!("installed version is {}", version)))
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{} {}", self.connector, v),
            None => f.write_str(&self.connector),
        }
    }
}

// ──────────────────────────────────────────────
// Descriptor
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StepDescriptor {
    pub name: &'static str,
    pub aliases: Vec<&'static str>,
    pub summary: &'static str,
    pub parameters: Vec<ParameterSpec>,
    pub output: TypeTemplate,
    pub requirements: Vec<Requirement>,
}

impl StepDescriptor {
    pub fn new(name: &'static str, output: TypeTemplate) -> Self {
        StepDescriptor {
            name,
            aliases: Vec::new(),
            summary: "",
            parameters: Vec::new(),
            output,
            requirements: Vec::new(),
        }
    }

    pub fn summary(mut self, summary: &'static str) -> Self {
        self.summary = summary;
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn find_parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.matches(name))
    }

    pub fn positional(&self, position: usize) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.position == Some(position))
    }

    /// Number of generic slots across the parameters and the output.
    pub fn slot_count(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| p.template.slot_count())
            .chain(std::iter::once(self.output.slot_count()))
            .max()
            .unwrap_or(0)
    }

    /// One-line signature, e.g. `ArrayTake Array: Array<T> Count: Integer -> Array<T>`.
    pub fn signature(&self) -> String {
        let mut s = self.name.to_string();
        for p in &self.parameters {
            let optional = if p.required { "" } else { "?" };
            s.push_str(&format!(" {}{}: {}", p.name, optional, p.template));
        }
        s.push_str(&format!(" -> {}", self.output));
        s
    }
}
