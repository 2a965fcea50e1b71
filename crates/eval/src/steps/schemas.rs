//! Schema validation and inference.

use std::sync::Arc;

use async_trait::async_trait;
use scl_core::schema::{ObjectNode, ERROR_BEHAVIOUR_ENUM};
use scl_core::{
    Entity, ErrorBehaviour, ErrorCode, ErrorLocation, Schema, SchemaNode, SclError,
    SclObject, TypeReference,
};
use tracing::debug;

use super::exact;
use crate::descriptor::{ParameterSpec, StepDescriptor};
use crate::state::StateMonad;
use crate::step::{CompoundStep, Step};
use crate::store::StepFactory;

pub fn factories() -> Vec<Arc<dyn StepFactory>> {
    vec![
        Arc::new(SchemaValidate::default()),
        Arc::new(SchemaCreate::default()),
        Arc::new(ToJsonSchema::default()),
    ]
}

fn entity_array() -> TypeReference {
    TypeReference::array(TypeReference::ENTITY)
}

async fn evaluate_schema(step: &CompoundStep, state: &StateMonad) -> Result<Schema, SclError> {
    let entity = step.evaluate_entity("Schema", state).await?;
    Schema::try_from_entity(&entity).map_err(ErrorCode::unlocated)
}

/// Validate and coerce every entity in a stream. Lazy streams stay lazy;
/// violations surface as the elements are enumerated.
pub struct SchemaValidate {
    descriptor: StepDescriptor,
}

impl Default for SchemaValidate {
    fn default() -> Self {
        SchemaValidate {
            descriptor: StepDescriptor::new("SchemaValidate", exact(entity_array()))
                .summary("Check entities against a schema, coercing values where it allows.")
                .parameter(ParameterSpec::step("EntityStream", exact(entity_array())).at(0))
                .parameter(ParameterSpec::step("Schema", exact(TypeReference::ENTITY)).at(1))
                .parameter(
                    ParameterSpec::step(
                        "ErrorBehaviour",
                        exact(TypeReference::Enum(ERROR_BEHAVIOUR_ENUM.to_string())),
                    )
                    .at(2)
                    .optional(),
                ),
        }
    }
}

#[async_trait]
impl StepFactory for SchemaValidate {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let entities = step.evaluate_array("EntityStream", state).await?;
        let schema = evaluate_schema(step, state).await?;
        let behaviour = if step.property("ErrorBehaviour").is_some() {
            match step.evaluate("ErrorBehaviour", state).await? {
                SclObject::Enum(e) => Some(e.value.parse::<ErrorBehaviour>().map_err(ErrorCode::unlocated)?),
                SclObject::String(s) => Some(s.parse::<ErrorBehaviour>().map_err(ErrorCode::unlocated)?),
                other => {
                    return Err(ErrorCode::InvalidCast {
                        property: "ErrorBehaviour".to_string(),
                        value: other.serialize(),
                        target: ERROR_BEHAVIOUR_ENUM.to_string(),
                    }
                    .unlocated())
                }
            }
        } else {
            None
        };
        debug!(schema = %schema.name, ?behaviour, "validating entities");

        let location = ErrorLocation::step(step.name(), step.location());
        let validated = entities.filter_map_elements(TypeReference::ENTITY, move |element| match element {
            SclObject::Entity(e) => Ok(schema.apply_to_entity(&e, &location, behaviour)?.map(SclObject::Entity)),
            other => Err(ErrorCode::InvalidCast {
                property: "EntityStream".to_string(),
                value: other.serialize(),
                target: TypeReference::ENTITY.to_string(),
            }
            .with_location(location.clone())),
        })?;
        Ok(SclObject::Array(validated))
    }
}

/// Infer a JSON schema covering every entity in an array.
pub struct SchemaCreate {
    descriptor: StepDescriptor,
}

impl Default for SchemaCreate {
    fn default() -> Self {
        SchemaCreate {
            descriptor: StepDescriptor::new("SchemaCreate", exact(TypeReference::ENTITY))
                .summary("Infer a JSON schema from example entities.")
                .parameter(ParameterSpec::step("Entities", exact(entity_array())).at(0))
                .parameter(
                    ParameterSpec::step("SchemaName", exact(TypeReference::STRING))
                        .at(1)
                        .default_value(SclObject::string("Schema")),
                ),
        }
    }
}

#[async_trait]
impl StepFactory for SchemaCreate {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let entities = step.evaluate_array("Entities", state).await?.evaluate().await?;
        let name = step.evaluate_string("SchemaName", state).await?;
        let node = entities
            .as_slice()
            .iter()
            .filter_map(|e| match e {
                SclObject::Entity(e) => Some(SchemaNode::infer_entity(e)),
                _ => None,
            })
            .reduce(|a, b| a.combine(&b))
            .unwrap_or_else(|| {
                SchemaNode::Object(ObjectNode {
                    additional_properties: true,
                    ..ObjectNode::default()
                })
            });
        Ok(SclObject::Entity(json_schema_entity(&node, &name)))
    }
}

fn json_schema_entity(node: &SchemaNode, title: &str) -> Entity {
    let node = match node {
        SchemaNode::Object(object) => SchemaNode::Object(ObjectNode {
            title: Some(title.to_string()),
            ..object.clone()
        }),
        other => other.clone(),
    };
    Entity::from_json(&node.to_json_schema())
}

/// Convert a schema in its entity form to a JSON schema.
pub struct ToJsonSchema {
    descriptor: StepDescriptor,
}

impl Default for ToJsonSchema {
    fn default() -> Self {
        ToJsonSchema {
            descriptor: StepDescriptor::new("ToJsonSchema", exact(TypeReference::ENTITY))
                .summary("The JSON schema equivalent of a schema entity.")
                .parameter(ParameterSpec::step("Schema", exact(TypeReference::ENTITY)).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for ToJsonSchema {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let schema = evaluate_schema(step, state).await?;
        let node = SchemaNode::from_schema(&schema);
        Ok(SclObject::Entity(json_schema_entity(&node, &schema.name)))
    }
}
