//! Entity steps.

use std::sync::Arc;

use async_trait::async_trait;
use scl_core::{Entity, EntityValue, ErrorCode, SclError, SclObject, TypeReference};

use super::exact;
use crate::descriptor::{ParameterSpec, StepDescriptor, TypeTemplate};
use crate::state::StateMonad;
use crate::step::CompoundStep;
use crate::store::StepFactory;

pub fn factories() -> Vec<Arc<dyn StepFactory>> {
    vec![
        Arc::new(EntityCombine::default()),
        Arc::new(EntityGetValue::default()),
        Arc::new(EntitySetValue::default()),
        Arc::new(EntityHasProperty::default()),
    ]
}

fn entity_param() -> ParameterSpec {
    ParameterSpec::step("Entity", exact(TypeReference::ENTITY)).at(0)
}

fn property_param() -> ParameterSpec {
    ParameterSpec::step("Property", exact(TypeReference::STRING)).at(1)
}

pub struct EntityCombine {
    descriptor: StepDescriptor,
}

impl Default for EntityCombine {
    fn default() -> Self {
        EntityCombine {
            descriptor: StepDescriptor::new("EntityCombine", exact(TypeReference::ENTITY))
                .summary("Merge entities left to right; later properties win.")
                .parameter(ParameterSpec::list("Terms", exact(TypeReference::ENTITY)).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for EntityCombine {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let mut combined = Entity::new();
        for term in step.evaluate_list("Terms", state).await? {
            match term.try_convert(&TypeReference::ENTITY, "Terms") {
                Ok(SclObject::Entity(e)) => combined = combined.combine(&e),
                Ok(other) => {
                    return Err(ErrorCode::InvalidCast {
                        property: "Terms".to_string(),
                        value: other.serialize(),
                        target: TypeReference::ENTITY.to_string(),
                    }
                    .unlocated())
                }
                Err(code) => return Err(code.unlocated()),
            }
        }
        Ok(SclObject::Entity(combined))
    }
}

pub struct EntityGetValue {
    descriptor: StepDescriptor,
}

impl Default for EntityGetValue {
    fn default() -> Self {
        EntityGetValue {
            descriptor: StepDescriptor::new("EntityGetValue", TypeTemplate::any())
                .summary("The value of a property, or null when it is missing.")
                .parameter(entity_param())
                .parameter(property_param()),
        }
    }
}

#[async_trait]
impl StepFactory for EntityGetValue {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let entity = step.evaluate_entity("Entity", state).await?;
        let property = step.evaluate_string("Property", state).await?;
        Ok(entity
            .try_get_value(&property)
            .map(EntityValue::to_object)
            .unwrap_or(SclObject::Null))
    }
}

pub struct EntitySetValue {
    descriptor: StepDescriptor,
}

impl Default for EntitySetValue {
    fn default() -> Self {
        EntitySetValue {
            descriptor: StepDescriptor::new("EntitySetValue", exact(TypeReference::ENTITY))
                .summary("A copy of the entity with one property set.")
                .parameter(entity_param())
                .parameter(property_param())
                .parameter(ParameterSpec::step("Value", TypeTemplate::any()).at(2)),
        }
    }
}

#[async_trait]
impl StepFactory for EntitySetValue {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let entity = step.evaluate_entity("Entity", state).await?;
        let property = step.evaluate_string("Property", state).await?;
        let value = step.evaluate("Value", state).await?.evaluated().await?;
        Ok(SclObject::Entity(
            entity.with_property(&property, EntityValue::from_object(&value)),
        ))
    }
}

pub struct EntityHasProperty {
    descriptor: StepDescriptor,
}

impl Default for EntityHasProperty {
    fn default() -> Self {
        EntityHasProperty {
            descriptor: StepDescriptor::new("EntityHasProperty", exact(TypeReference::BOOL))
                .summary("True when the entity has the property.")
                .parameter(entity_param())
                .parameter(property_param()),
        }
    }
}

#[async_trait]
impl StepFactory for EntityHasProperty {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let entity = step.evaluate_entity("Entity", state).await?;
        let property = step.evaluate_string("Property", state).await?;
        Ok(SclObject::Bool(entity.try_get_value(&property).is_some()))
    }
}
