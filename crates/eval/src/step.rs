//! Frozen, runnable steps.
//!
//! Freezing turns every node of the parsed tree into an `Arc<dyn Step>`:
//! constants, entity literals, and compound steps that delegate to their
//! [`StepFactory`]. Compound steps also carry the typed accessors that
//! factories use to evaluate their arguments.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use scl_core::parser::{ARRAY_NEW, GET_VARIABLE};
use scl_core::{
    property_key, Array, Entity, EntityValue, ErrorCode, ErrorLocation, SclError, SclObject,
    TextLocation, TypeReference, VariableName,
};
use tracing::debug;

use crate::descriptor::{ParameterSpec, StepDescriptor};
use crate::settings::SclSettings;
use crate::state::StateMonad;
use crate::store::StepFactory;

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn location(&self) -> &TextLocation;

    fn output_type(&self) -> &TypeReference;

    async fn run(&self, state: &StateMonad) -> Result<SclObject, SclError>;

    /// SCL text that parses and freezes back to an equivalent step.
    fn serialize(&self) -> String;

    /// The form used when this step is an argument of another step.
    fn serialize_nested(&self) -> String {
        self.serialize()
    }

    /// Check requirements of this step and everything below it, reporting
    /// every failure together.
    fn verify(&self, settings: &SclSettings) -> Result<(), SclError>;

    fn as_compound(&self) -> Option<&CompoundStep> {
        None
    }
}

// ──────────────────────────────────────────────
// Constants and entity literals
// ──────────────────────────────────────────────

pub struct ConstantStep {
    value: SclObject,
    output_type: TypeReference,
    location: TextLocation,
}

impl ConstantStep {
    pub fn new(value: SclObject, location: TextLocation) -> Self {
        ConstantStep {
            output_type: value.type_reference(),
            value,
            location,
        }
    }

    pub fn value(&self) -> &SclObject {
        &self.value
    }
}

#[async_trait]
impl Step for ConstantStep {
    fn name(&self) -> &str {
        "Constant"
    }

    fn location(&self) -> &TextLocation {
        &self.location
    }

    fn output_type(&self) -> &TypeReference {
        &self.output_type
    }

    async fn run(&self, _state: &StateMonad) -> Result<SclObject, SclError> {
        Ok(self.value.clone())
    }

    fn serialize(&self) -> String {
        self.value.serialize()
    }

    fn verify(&self, _settings: &SclSettings) -> Result<(), SclError> {
        Ok(())
    }
}

pub struct CreateEntityStep {
    properties: Vec<(String, Arc<dyn Step>)>,
    output_type: TypeReference,
    location: TextLocation,
}

impl CreateEntityStep {
    pub fn new(properties: Vec<(String, Arc<dyn Step>)>, location: TextLocation) -> Self {
        CreateEntityStep {
            properties,
            output_type: TypeReference::ENTITY,
            location,
        }
    }
}

#[async_trait]
impl Step for CreateEntityStep {
    fn name(&self) -> &str {
        "CreateEntity"
    }

    fn location(&self) -> &TextLocation {
        &self.location
    }

    fn output_type(&self) -> &TypeReference {
        &self.output_type
    }

    async fn run(&self, state: &StateMonad) -> Result<SclObject, SclError> {
        let mut entity = Entity::new();
        for (key, step) in &self.properties {
            let value = step.run(state).await?.evaluated().await?;
            entity = entity.with_property(key, EntityValue::from_object(&value));
        }
        Ok(SclObject::Entity(entity))
    }

    fn serialize(&self) -> String {
        let parts: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| format!("{}: {}", property_key(k), v.serialize_nested()))
            .collect();
        format!("({})", parts.join(" "))
    }

    fn verify(&self, settings: &SclSettings) -> Result<(), SclError> {
        let errors: Vec<SclError> = self
            .properties
            .iter()
            .filter_map(|(_, s)| s.verify(settings).err())
            .collect();
        SclError::check(errors)
    }
}

// ──────────────────────────────────────────────
// Compound steps
// ──────────────────────────────────────────────

/// A frozen argument.
pub enum FrozenProperty {
    Step(Arc<dyn Step>),
    StepList(Vec<Arc<dyn Step>>),
    Variable(VariableName),
    Lambda {
        variable: VariableName,
        body: Arc<dyn Step>,
    },
}

impl FrozenProperty {
    pub fn serialize(&self) -> String {
        match self {
            FrozenProperty::Step(s) => s.serialize_nested(),
            FrozenProperty::StepList(steps) => {
                let items: Vec<String> = steps.iter().map(|s| s.serialize_nested()).collect();
                format!("[{}]", items.join(", "))
            }
            FrozenProperty::Variable(v) => v.serialize(),
            FrozenProperty::Lambda { variable, body } => {
                format!("({} => {})", variable.serialize(), body.serialize())
            }
        }
    }

    fn verify(&self, settings: &SclSettings) -> Result<(), SclError> {
        match self {
            FrozenProperty::Step(s) | FrozenProperty::Lambda { body: s, .. } => s.verify(settings),
            FrozenProperty::StepList(steps) => {
                SclError::check(steps.iter().filter_map(|s| s.verify(settings).err()).collect())
            }
            FrozenProperty::Variable(_) => Ok(()),
        }
    }
}

/// A step call bound to its factory.
pub struct CompoundStep {
    factory: Arc<dyn StepFactory>,
    properties: IndexMap<&'static str, FrozenProperty>,
    location: TextLocation,
    output_type: TypeReference,
    generics: Vec<TypeReference>,
}

impl CompoundStep {
    pub fn new(
        factory: Arc<dyn StepFactory>,
        properties: IndexMap<&'static str, FrozenProperty>,
        location: TextLocation,
        output_type: TypeReference,
        generics: Vec<TypeReference>,
    ) -> Self {
        CompoundStep {
            factory,
            properties,
            location,
            output_type,
            generics,
        }
    }

    pub fn descriptor(&self) -> &StepDescriptor {
        self.factory.descriptor()
    }

    pub fn properties(&self) -> impl Iterator<Item = (&'static str, &FrozenProperty)> {
        self.properties.iter().map(|(k, v)| (*k, v))
    }

    pub fn property(&self, name: &str) -> Option<&FrozenProperty> {
        self.properties.get(name)
    }

    /// Generic slot `i`, `Any` when it was never bound.
    pub fn generic(&self, i: usize) -> TypeReference {
        self.generics.get(i).cloned().unwrap_or(TypeReference::Any)
    }

    fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.descriptor().find_parameter(name)
    }

    fn missing(&self, name: &str) -> SclError {
        ErrorCode::MissingParameter {
            parameter: name.to_string(),
            step: self.name().to_string(),
        }
        .unlocated()
    }

    fn wrong_kind(&self, name: &str, expected: &str) -> SclError {
        ErrorCode::WrongParameterKind {
            step: self.name().to_string(),
            parameter: name.to_string(),
            expected: expected.to_string(),
        }
        .unlocated()
    }

    fn default_for(&self, name: &str, state: &StateMonad) -> Option<SclObject> {
        let spec = self.spec(name)?;
        if let Some(d) = &spec.default {
            return Some(d.clone());
        }
        if spec.required {
            return None;
        }
        let store = &state.context().store;
        let t = spec.template.instantiate(&self.generics, &|_| TypeReference::Any);
        Some(SclObject::default_value(&t, &|e: &str| store.first_enum_member(e)))
    }

    // ──────────────────────────────────────────────
    // Argument accessors
    // ──────────────────────────────────────────────

    /// Evaluate an argument, falling back to its default.
    pub async fn evaluate(&self, name: &str, state: &StateMonad) -> Result<SclObject, SclError> {
        match self.evaluate_optional(name, state).await? {
            Some(v) => Ok(v),
            None => Err(self.missing(name)),
        }
    }

    /// `None` when the argument was not supplied and has no default.
    pub async fn evaluate_optional(
        &self,
        name: &str,
        state: &StateMonad,
    ) -> Result<Option<SclObject>, SclError> {
        match self.properties.get(name) {
            Some(FrozenProperty::Step(s)) => s.run(state).await.map(Some),
            Some(FrozenProperty::StepList(steps)) => {
                let mut elements = Vec::with_capacity(steps.len());
                for s in steps {
                    elements.push(s.run(state).await?);
                }
                Ok(Some(SclObject::Array(Array::from_vec(elements))))
            }
            Some(FrozenProperty::Variable(v)) => state.get_variable(v).map(Some),
            Some(FrozenProperty::Lambda { .. }) => Err(self.wrong_kind(name, "a step")),
            None => Ok(self.default_for(name, state)),
        }
    }

    /// Evaluate and convert to `target`.
    pub async fn evaluate_as(
        &self,
        name: &str,
        target: &TypeReference,
        state: &StateMonad,
    ) -> Result<SclObject, SclError> {
        let value = self.evaluate(name, state).await?;
        value.try_convert(target, name).map_err(ErrorCode::unlocated)
    }

    pub async fn evaluate_int(&self, name: &str, state: &StateMonad) -> Result<i64, SclError> {
        match self.evaluate_as(name, &TypeReference::INTEGER, state).await? {
            SclObject::Int(i) => Ok(i),
            other => Err(cast_error(name, &other, &TypeReference::INTEGER)),
        }
    }

    pub async fn evaluate_double(&self, name: &str, state: &StateMonad) -> Result<f64, SclError> {
        match self.evaluate_as(name, &TypeReference::DOUBLE, state).await? {
            SclObject::Double(d) => Ok(d),
            SclObject::Int(i) => Ok(i as f64),
            other => Err(cast_error(name, &other, &TypeReference::DOUBLE)),
        }
    }

    pub async fn evaluate_bool(&self, name: &str, state: &StateMonad) -> Result<bool, SclError> {
        match self.evaluate_as(name, &TypeReference::BOOL, state).await? {
            SclObject::Bool(b) => Ok(b),
            other => Err(cast_error(name, &other, &TypeReference::BOOL)),
        }
    }

    pub async fn evaluate_string(&self, name: &str, state: &StateMonad) -> Result<String, SclError> {
        match self.evaluate_as(name, &TypeReference::STRING, state).await? {
            SclObject::String(s) => Ok(s),
            other => Err(cast_error(name, &other, &TypeReference::STRING)),
        }
    }

    pub async fn evaluate_entity(&self, name: &str, state: &StateMonad) -> Result<Entity, SclError> {
        match self.evaluate_as(name, &TypeReference::ENTITY, state).await? {
            SclObject::Entity(e) => Ok(e),
            other => Err(cast_error(name, &other, &TypeReference::ENTITY)),
        }
    }

    pub async fn evaluate_array(&self, name: &str, state: &StateMonad) -> Result<Array, SclError> {
        match self.evaluate(name, state).await? {
            SclObject::Array(a) => Ok(a),
            other => Err(cast_error(name, &other, &TypeReference::array(TypeReference::Any))),
        }
    }

    /// The items of a list argument, whether it was written as a list or
    /// as a step producing an array.
    pub async fn evaluate_list(&self, name: &str, state: &StateMonad) -> Result<Vec<SclObject>, SclError> {
        match self.properties.get(name) {
            Some(FrozenProperty::StepList(steps)) => {
                let mut items = Vec::with_capacity(steps.len());
                for s in steps {
                    items.push(s.run(state).await?);
                }
                Ok(items)
            }
            _ => Ok(self.evaluate_array(name, state).await?.evaluate().await?.into_vec()),
        }
    }

    pub fn variable(&self, name: &str) -> Result<&VariableName, SclError> {
        match self.properties.get(name) {
            Some(FrozenProperty::Variable(v)) => Ok(v),
            Some(_) => Err(self.wrong_kind(name, "a variable name")),
            None => Err(self.missing(name)),
        }
    }

    pub fn lambda(&self, name: &str) -> Option<(&VariableName, &Arc<dyn Step>)> {
        match self.properties.get(name) {
            Some(FrozenProperty::Lambda { variable, body }) => Some((variable, body)),
            _ => None,
        }
    }

    /// Run a lambda argument with its variable bound to `value`.
    pub async fn run_lambda(
        &self,
        name: &str,
        value: SclObject,
        state: &StateMonad,
    ) -> Result<SclObject, SclError> {
        let Some((variable, body)) = self.lambda(name) else {
            return Err(self.missing(name));
        };
        let scope = state.scoped(variable.clone(), value);
        body.run(&scope).await
    }
}

fn cast_error(name: &str, value: &SclObject, target: &TypeReference) -> SclError {
    ErrorCode::InvalidCast {
        property: name.to_string(),
        value: value.serialize(),
        target: target.to_string(),
    }
    .unlocated()
}

/// `Name Param: value Param2: value2`, the default text form of a step.
pub fn serialize_named(step: &CompoundStep) -> String {
    let mut s = step.name().to_string();
    for (name, property) in step.properties() {
        s.push_str(&format!(" {}: {}", name, property.serialize()));
    }
    s
}

#[async_trait]
impl Step for CompoundStep {
    fn name(&self) -> &str {
        self.descriptor().name
    }

    fn location(&self) -> &TextLocation {
        &self.location
    }

    fn output_type(&self) -> &TypeReference {
        &self.output_type
    }

    async fn run(&self, state: &StateMonad) -> Result<SclObject, SclError> {
        state.check_cancelled()?;
        debug!(step = self.name(), "running step");
        let result = self.factory.run(self, state).await;
        if let Err(e) = &result {
            debug!(step = self.name(), error = %e, "step failed");
        }
        result.map_err(|e| e.locate(&ErrorLocation::step(self.name(), &self.location)))
    }

    fn serialize(&self) -> String {
        self.factory.serialize(self)
    }

    fn serialize_nested(&self) -> String {
        let atomic = self.properties.is_empty()
            || self.name() == ARRAY_NEW
            || self.name() == GET_VARIABLE;
        if atomic {
            self.serialize()
        } else {
            format!("({})", self.serialize())
        }
    }

    fn verify(&self, settings: &SclSettings) -> Result<(), SclError> {
        let mut errors = Vec::new();
        let descriptor = self.descriptor();
        for requirement in &descriptor.requirements {
            if let Err(code) = requirement.check(settings) {
                errors.push(code.at_step(self.name(), &self.location));
            }
        }
        for (name, property) in &self.properties {
            if let Some(requirement) = self.spec(name).and_then(|p| p.requirement.as_ref()) {
                if let Err(code) = requirement.check(settings) {
                    errors.push(code.at_step(self.name(), &self.location));
                }
            }
            if let Err(e) = property.verify(settings) {
                errors.push(e);
            }
        }
        SclError::check(errors)
    }

    fn as_compound(&self) -> Option<&CompoundStep> {
        Some(self)
    }
}
