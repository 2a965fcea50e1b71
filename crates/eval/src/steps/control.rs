//! Sequencing, variables, output, assertions and branching.

use std::sync::Arc;

use async_trait::async_trait;
use scl_core::parser::{GET_VARIABLE, SEQUENCE, SET_VARIABLE};
use scl_core::{ErrorCode, SclError, SclObject, TypeReference};
use tracing::{debug, info};

use super::{exact, t};
use crate::descriptor::{ParameterSpec, StepDescriptor, TypeTemplate};
use crate::state::StateMonad;
use crate::step::{CompoundStep, FrozenProperty, Step};
use crate::store::StepFactory;

pub fn factories() -> Vec<Arc<dyn StepFactory>> {
    vec![
        Arc::new(Sequence::default()),
        Arc::new(Print::default()),
        Arc::new(Log::default()),
        Arc::new(SetVariable::default()),
        Arc::new(GetVariable::default()),
        Arc::new(AssertTrue::default()),
        Arc::new(AssertEqual::default()),
        Arc::new(AssertError::default()),
        Arc::new(If::default()),
    ]
}

// ──────────────────────────────────────────────
// Sequence
// ──────────────────────────────────────────────

pub struct Sequence {
    descriptor: StepDescriptor,
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence {
            descriptor: StepDescriptor::new(SEQUENCE, t())
                .summary("Run each initial step in order, then return the final step's value.")
                .parameter(ParameterSpec::list("InitialSteps", exact(TypeReference::UNIT)).at(0))
                .parameter(ParameterSpec::step("FinalStep", t()).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for Sequence {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        match step.property("InitialSteps") {
            Some(FrozenProperty::StepList(steps)) => {
                for s in steps {
                    s.run(state).await?;
                }
            }
            _ => {
                step.evaluate_list("InitialSteps", state).await?;
            }
        }
        step.evaluate("FinalStep", state).await
    }

    fn serialize(&self, step: &CompoundStep) -> String {
        let mut lines = Vec::new();
        match step.property("InitialSteps") {
            Some(FrozenProperty::StepList(steps)) => lines.extend(steps.iter().map(|s| s.serialize())),
            Some(other) => lines.push(other.serialize()),
            None => {}
        }
        if let Some(FrozenProperty::Step(s)) = step.property("FinalStep") {
            lines.push(s.serialize());
        }
        lines
            .iter()
            .map(|l| format!("- {}", l))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ──────────────────────────────────────────────
// Output
// ──────────────────────────────────────────────

/// Display form used by `Print`: strings unquoted, long arrays truncated.
fn display(value: &SclObject, max_elements: usize) -> String {
    match value {
        SclObject::String(s) => s.clone(),
        SclObject::Array(a) => match a.as_eager() {
            Some(items) if items.len() > max_elements => {
                let shown: Vec<String> = items[..max_elements].iter().map(SclObject::format).collect();
                format!("[{}, ... {} more]", shown.join(", "), items.len() - max_elements)
            }
            _ => a.format(),
        },
        other => other.format(),
    }
}

pub struct Print {
    descriptor: StepDescriptor,
}

impl Default for Print {
    fn default() -> Self {
        Print {
            descriptor: StepDescriptor::new("Print", exact(TypeReference::UNIT))
                .summary("Write a value to the console.")
                .parameter(ParameterSpec::step("Value", TypeTemplate::any()).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for Print {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let value = step.evaluate("Value", state).await?.evaluated().await?;
        state
            .console()
            .write_line(&display(&value, state.settings().max_array_display));
        Ok(SclObject::Unit)
    }
}

pub struct Log {
    descriptor: StepDescriptor,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            descriptor: StepDescriptor::new("Log", exact(TypeReference::UNIT))
                .summary("Write a value to the log at info level.")
                .parameter(ParameterSpec::step("Value", TypeTemplate::any()).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for Log {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let value = step.evaluate("Value", state).await?.evaluated().await?;
        info!(target: "scl", "{}", value.format());
        Ok(SclObject::Unit)
    }
}

// ──────────────────────────────────────────────
// Variables
// ──────────────────────────────────────────────

pub struct SetVariable {
    descriptor: StepDescriptor,
}

impl Default for SetVariable {
    fn default() -> Self {
        SetVariable {
            descriptor: StepDescriptor::new(SET_VARIABLE, exact(TypeReference::UNIT))
                .summary("Store a value in a variable.")
                .parameter(ParameterSpec::variable("Variable").at(0))
                .parameter(ParameterSpec::step("Value", TypeTemplate::VariableOf("Variable")).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for SetVariable {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let variable = step.variable("Variable")?.clone();
        let value = step.evaluate("Value", state).await?;
        state.set_variable(variable, value);
        Ok(SclObject::Unit)
    }

    fn serialize(&self, step: &CompoundStep) -> String {
        let variable = step.property("Variable").map(FrozenProperty::serialize).unwrap_or_default();
        let value = match step.property("Value") {
            Some(FrozenProperty::Step(s)) => s.serialize(),
            Some(other) => other.serialize(),
            None => String::new(),
        };
        format!("{} = {}", variable, value)
    }
}

pub struct GetVariable {
    descriptor: StepDescriptor,
}

impl Default for GetVariable {
    fn default() -> Self {
        GetVariable {
            descriptor: StepDescriptor::new(GET_VARIABLE, TypeTemplate::VariableOf("Variable"))
                .summary("Read a variable.")
                .parameter(ParameterSpec::variable("Variable").at(0).reads()),
        }
    }
}

#[async_trait]
impl StepFactory for GetVariable {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        state.get_variable(step.variable("Variable")?)
    }

    fn serialize(&self, step: &CompoundStep) -> String {
        step.property("Variable").map(FrozenProperty::serialize).unwrap_or_default()
    }
}

// ──────────────────────────────────────────────
// Assertions
// ──────────────────────────────────────────────

pub struct AssertTrue {
    descriptor: StepDescriptor,
}

impl Default for AssertTrue {
    fn default() -> Self {
        AssertTrue {
            descriptor: StepDescriptor::new("AssertTrue", exact(TypeReference::UNIT))
                .summary("Fail unless the condition is true.")
                .parameter(ParameterSpec::step("Boolean", exact(TypeReference::BOOL)).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for AssertTrue {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        if step.evaluate_bool("Boolean", state).await? {
            return Ok(SclObject::Unit);
        }
        let condition = step.property("Boolean").map(FrozenProperty::serialize).unwrap_or_default();
        Err(ErrorCode::AssertionFailed(format!("{} was false", condition)).unlocated())
    }
}

pub struct AssertEqual {
    descriptor: StepDescriptor,
}

impl Default for AssertEqual {
    fn default() -> Self {
        AssertEqual {
            descriptor: StepDescriptor::new("AssertEqual", exact(TypeReference::UNIT))
                .summary("Fail unless both values are equal.")
                .parameter(ParameterSpec::step("Left", t()).at(0))
                .parameter(ParameterSpec::step("Right", t()).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for AssertEqual {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let left = step.evaluate("Left", state).await?.evaluated().await?;
        let right = step.evaluate("Right", state).await?.evaluated().await?;
        if left == right {
            Ok(SclObject::Unit)
        } else {
            Err(ErrorCode::AssertionFailed(format!("{} != {}", left.serialize(), right.serialize())).unlocated())
        }
    }
}

pub struct AssertError {
    descriptor: StepDescriptor,
}

impl Default for AssertError {
    fn default() -> Self {
        AssertError {
            descriptor: StepDescriptor::new("AssertError", exact(TypeReference::UNIT))
                .summary("Fail unless the step fails.")
                .parameter(ParameterSpec::step("Step", TypeTemplate::any()).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for AssertError {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        match step.evaluate("Step", state).await {
            Ok(_) => Err(ErrorCode::AssertionFailed("expected the step to fail".to_string()).unlocated()),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                debug!(error = %e, "step failed as expected");
                Ok(SclObject::Unit)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Branching
// ──────────────────────────────────────────────

pub struct If {
    descriptor: StepDescriptor,
}

impl Default for If {
    fn default() -> Self {
        If {
            descriptor: StepDescriptor::new("If", exact(TypeReference::UNIT))
                .summary("Run Then when the condition holds, otherwise Else.")
                .parameter(ParameterSpec::step("Condition", exact(TypeReference::BOOL)).at(0))
                .parameter(ParameterSpec::step("Then", exact(TypeReference::UNIT)).at(1))
                .parameter(ParameterSpec::step("Else", exact(TypeReference::UNIT)).at(2).optional()),
        }
    }
}

#[async_trait]
impl StepFactory for If {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        if step.evaluate_bool("Condition", state).await? {
            step.evaluate("Then", state).await?;
        } else if step.property("Else").is_some() {
            step.evaluate("Else", state).await?;
        }
        Ok(SclObject::Unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scl_core::Array;

    #[test]
    fn display_truncates_long_arrays() {
        let array = SclObject::Array(Array::from_vec((1..=5).map(SclObject::Int).collect()));
        assert_eq!(display(&array, 3), "[1, 2, 3, ... 2 more]");
        assert_eq!(display(&array, 10), "[1, 2, 3, 4, 5]");
        assert_eq!(display(&SclObject::string("hi"), 3), "hi");
    }

    #[test]
    fn sequence_signature() {
        let d = Sequence::default();
        assert_eq!(
            d.descriptor().signature(),
            "Sequence InitialSteps: Array<Unit> FinalStep: T -> T"
        );
    }
}
