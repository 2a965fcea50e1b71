//! The built-in step catalog.
//!
//! Each step type is a [`StepFactory`] holding its [`StepDescriptor`],
//! built once when the store is assembled. Families of steps that share a
//! shape (numeric folds, comparisons) are one factory type parameterised
//! by an operator.

pub mod arrays;
pub mod control;
pub mod entities;
pub mod logic;
pub mod numbers;
pub mod schemas;
pub mod strings;

use std::sync::Arc;

use scl_core::TypeReference;

use crate::descriptor::TypeTemplate;
use crate::store::StepFactory;

/// Every built-in step, in catalog order.
pub fn core_factories() -> Vec<Arc<dyn StepFactory>> {
    let mut factories: Vec<Arc<dyn StepFactory>> = Vec::new();
    factories.extend(control::factories());
    factories.extend(logic::factories());
    factories.extend(numbers::factories());
    factories.extend(strings::factories());
    factories.extend(arrays::factories());
    factories.extend(entities::factories());
    factories.extend(schemas::factories());
    factories
}

pub(crate) fn t() -> TypeTemplate {
    TypeTemplate::Param(0)
}

pub(crate) fn u() -> TypeTemplate {
    TypeTemplate::Param(1)
}

pub(crate) fn exact(t: TypeReference) -> TypeTemplate {
    TypeTemplate::exact(t)
}

pub(crate) fn array_of_t() -> TypeTemplate {
    TypeTemplate::array_of(t())
}
