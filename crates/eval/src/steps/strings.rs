//! String steps.

use std::sync::Arc;

use async_trait::async_trait;
use scl_core::{ErrorCode, SclError, SclObject, TypeReference};

use super::exact;
use crate::descriptor::{ParameterSpec, StepDescriptor};
use crate::state::StateMonad;
use crate::step::CompoundStep;
use crate::store::StepFactory;

pub fn factories() -> Vec<Arc<dyn StepFactory>> {
    vec![Arc::new(StringJoin::default()), Arc::new(StringLength::default())]
}

pub struct StringJoin {
    descriptor: StepDescriptor,
}

impl Default for StringJoin {
    fn default() -> Self {
        StringJoin {
            descriptor: StepDescriptor::new("StringJoin", exact(TypeReference::STRING))
                .summary("Join strings with a delimiter.")
                .parameter(ParameterSpec::list("Strings", exact(TypeReference::STRING)).at(0))
                .parameter(
                    ParameterSpec::step("Delimiter", exact(TypeReference::STRING))
                        .at(1)
                        .default_value(SclObject::string("")),
                ),
        }
    }
}

#[async_trait]
impl StepFactory for StringJoin {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let mut parts = Vec::new();
        for value in step.evaluate_list("Strings", state).await? {
            match value.try_convert(&TypeReference::STRING, "Strings") {
                Ok(SclObject::String(s)) => parts.push(s),
                Ok(other) => parts.push(other.serialize()),
                Err(code) => return Err(code.unlocated()),
            }
        }
        let delimiter = step.evaluate_string("Delimiter", state).await?;
        Ok(SclObject::String(parts.join(&delimiter)))
    }
}

pub struct StringLength {
    descriptor: StepDescriptor,
}

impl Default for StringLength {
    fn default() -> Self {
        StringLength {
            descriptor: StepDescriptor::new("StringLength", exact(TypeReference::INTEGER))
                .summary("Number of characters in a string.")
                .parameter(ParameterSpec::step("String", exact(TypeReference::STRING)).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for StringLength {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let s = step.evaluate_string("String", state).await?;
        let length = i64::try_from(s.chars().count())
            .map_err(|_| ErrorCode::Overflow("StringLength".to_string()).unlocated())?;
        Ok(SclObject::Int(length))
    }
}
