#![allow(clippy::result_large_err)]
//! scl-core: the SCL value model, schemas and parser.
//!
//! Everything needed to turn SCL text into a freezable step tree and to
//! represent the values a running sequence produces. Freezing and running
//! live in `scl-eval`.
//!
//! # Public API
//!
//! - [`parse()`] -- SCL text to a [`FreezableStep`] tree
//! - [`SclObject`], [`Array`], [`Entity`], [`EntityValue`] -- runtime values
//! - [`TypeReference`] -- the static types freezing reasons about
//! - [`Schema`], [`SchemaNode`] -- entity validation and inferred schemas
//! - [`SclError`], [`ErrorCode`] -- located, accumulating errors

pub mod array;
pub mod ast;
pub mod entity;
pub mod error;
pub mod lexer;
pub mod location;
pub mod parser;
pub mod schema;
pub mod types;
pub mod value;

pub use array::{Array, EagerArray, ElementStream, LazyArray};
pub use ast::{
    FreezableLambda, FreezableStep, FreezableStepData, FreezableStepProperty,
    StepParameterReference,
};
pub use entity::{property_key, Entity, EntityProperty, EntityValue, PRIMITIVE_KEY};
pub use error::{ErrorCode, SclError, SingleError};
pub use location::{ErrorLocation, TextLocation, TextPosition};
pub use parser::{parse, InfixOperator};
pub use schema::{ErrorBehaviour, Multiplicity, Schema, SchemaNode, SchemaProperty, SchemaPropertyType};
pub use types::{SclType, TypeReference, VariableName};
pub use value::{SclEnum, SclObject, SclOneOf};
