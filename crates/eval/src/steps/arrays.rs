//! Array construction, queries and transforms.
//!
//! Steps that only reshape an array (`ArrayTake`, `ArraySkip`, `ArraySort`,
//! `ArrayConcat`) keep lazy arrays lazy. Steps that run a lambda per
//! element (`ArrayFilter`, `ArrayMap`, `ArrayGroupBy`) materialize their
//! input first; `ForEach` streams it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use scl_core::parser::ARRAY_NEW;
use scl_core::{Array, Entity, EntityValue, ErrorCode, SclError, SclObject, TypeReference};

use super::{array_of_t, exact, t, u};
use crate::descriptor::{ParameterSpec, StepDescriptor, TypeTemplate};
use crate::state::StateMonad;
use crate::step::{CompoundStep, FrozenProperty};
use crate::store::StepFactory;

pub fn factories() -> Vec<Arc<dyn StepFactory>> {
    vec![
        Arc::new(ArrayNew::default()),
        Arc::new(ArrayConcat::default()),
        Arc::new(ArrayLength::default()),
        Arc::new(ArrayIsEmpty::default()),
        Arc::new(ArraySlice::new(Slice::Take)),
        Arc::new(ArraySlice::new(Slice::Skip)),
        Arc::new(ArraySort::default()),
        Arc::new(ArrayFilter::default()),
        Arc::new(ArrayMap::default()),
        Arc::new(ArrayGroupBy::default()),
        Arc::new(ArrayElementAtIndex::default()),
        Arc::new(ArrayFind::default()),
        Arc::new(ArrayEvaluate::default()),
        Arc::new(ForEach::default()),
        Arc::new(Range::default()),
    ]
}

fn array_param() -> ParameterSpec {
    ParameterSpec::step("Array", array_of_t()).at(0)
}

fn not_comparable(step: &CompoundStep) -> Result<(), ErrorCode> {
    let element = step.generic(0);
    if element.is_comparable() {
        Ok(())
    } else {
        Err(ErrorCode::TypeNotComparable(element.to_string()))
    }
}

fn predicate_holds(verdict: &SclObject) -> Result<bool, SclError> {
    let verdict = verdict
        .try_convert(&TypeReference::BOOL, "Predicate")
        .map_err(ErrorCode::unlocated)?;
    Ok(matches!(verdict, SclObject::Bool(true)))
}

fn non_negative(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

// ──────────────────────────────────────────────
// Construction
// ──────────────────────────────────────────────

pub struct ArrayNew {
    descriptor: StepDescriptor,
}

impl Default for ArrayNew {
    fn default() -> Self {
        ArrayNew {
            descriptor: StepDescriptor::new(ARRAY_NEW, array_of_t())
                .summary("An array of the given elements.")
                .parameter(ParameterSpec::list("Elements", t()).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayNew {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        step.evaluate("Elements", state).await
    }

    fn serialize(&self, step: &CompoundStep) -> String {
        match step.property("Elements") {
            Some(p @ FrozenProperty::StepList(_)) => p.serialize(),
            Some(other) => format!("{} Elements: {}", ARRAY_NEW, other.serialize()),
            None => "[]".to_string(),
        }
    }
}

pub struct ArrayConcat {
    descriptor: StepDescriptor,
}

impl Default for ArrayConcat {
    fn default() -> Self {
        ArrayConcat {
            descriptor: StepDescriptor::new("ArrayConcat", array_of_t())
                .summary("Concatenate arrays. The result is lazy when any input is.")
                .parameter(ParameterSpec::list("Arrays", array_of_t()).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayConcat {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let mut arrays = Vec::new();
        for value in step.evaluate_list("Arrays", state).await? {
            match value {
                SclObject::Array(a) => arrays.push(a),
                other => {
                    return Err(ErrorCode::InvalidCast {
                        property: "Arrays".to_string(),
                        value: other.serialize(),
                        target: "Array".to_string(),
                    }
                    .unlocated())
                }
            }
        }
        Ok(SclObject::Array(Array::concat(arrays)))
    }
}

pub struct Range {
    descriptor: StepDescriptor,
}

impl Default for Range {
    fn default() -> Self {
        Range {
            descriptor: StepDescriptor::new("Range", exact(TypeReference::array(TypeReference::INTEGER)))
                .summary("The integers from From up to but not including To, produced lazily.")
                .parameter(ParameterSpec::step("From", exact(TypeReference::INTEGER)).at(0))
                .parameter(ParameterSpec::step("To", exact(TypeReference::INTEGER)).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for Range {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let from = step.evaluate_int("From", state).await?;
        let to = step.evaluate_int("To", state).await?;
        Ok(SclObject::Array(Array::lazy(TypeReference::INTEGER, move || {
            stream::iter((from..to).map(|i| Ok(SclObject::Int(i)))).boxed()
        })))
    }
}

// ──────────────────────────────────────────────
// Queries
// ──────────────────────────────────────────────

pub struct ArrayLength {
    descriptor: StepDescriptor,
}

impl Default for ArrayLength {
    fn default() -> Self {
        ArrayLength {
            descriptor: StepDescriptor::new("ArrayLength", exact(TypeReference::INTEGER))
                .alias("ArrayCount")
                .summary("Number of elements.")
                .parameter(array_param()),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayLength {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let count = step.evaluate_array("Array", state).await?.count().await?;
        i64::try_from(count)
            .map(SclObject::Int)
            .map_err(|_| ErrorCode::Overflow("ArrayLength".to_string()).unlocated())
    }
}

pub struct ArrayIsEmpty {
    descriptor: StepDescriptor,
}

impl Default for ArrayIsEmpty {
    fn default() -> Self {
        ArrayIsEmpty {
            descriptor: StepDescriptor::new("ArrayIsEmpty", exact(TypeReference::BOOL))
                .summary("True when the array has no elements.")
                .parameter(array_param()),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayIsEmpty {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let any = step.evaluate_array("Array", state).await?.any().await?;
        Ok(SclObject::Bool(!any))
    }
}

pub struct ArrayElementAtIndex {
    descriptor: StepDescriptor,
}

impl Default for ArrayElementAtIndex {
    fn default() -> Self {
        ArrayElementAtIndex {
            descriptor: StepDescriptor::new("ArrayElementAtIndex", t())
                .summary("The element at a zero-based index.")
                .parameter(array_param())
                .parameter(ParameterSpec::step("Index", exact(TypeReference::INTEGER)).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayElementAtIndex {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let array = step.evaluate_array("Array", state).await?;
        let index = step.evaluate_int("Index", state).await?;
        let index = usize::try_from(index).map_err(|_| ErrorCode::IndexOutOfBounds.unlocated())?;
        array.element_at(index).await
    }
}

pub struct ArrayFind {
    descriptor: StepDescriptor,
}

impl Default for ArrayFind {
    fn default() -> Self {
        ArrayFind {
            descriptor: StepDescriptor::new("ArrayFind", exact(TypeReference::INTEGER))
                .summary("Index of the first element equal to Element, or -1.")
                .parameter(array_param())
                .parameter(ParameterSpec::step("Element", t()).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayFind {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let array = step.evaluate_array("Array", state).await?;
        let element = step.evaluate("Element", state).await?;
        let index = match array.index_of(&element).await? {
            Some(i) => i64::try_from(i).unwrap_or(i64::MAX),
            None => -1,
        };
        Ok(SclObject::Int(index))
    }
}

pub struct ArrayEvaluate {
    descriptor: StepDescriptor,
}

impl Default for ArrayEvaluate {
    fn default() -> Self {
        ArrayEvaluate {
            descriptor: StepDescriptor::new("ArrayEvaluate", array_of_t())
                .summary("Materialize a lazy array, reporting every failing element.")
                .parameter(array_param()),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayEvaluate {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let eager = step.evaluate_array("Array", state).await?.evaluate().await?;
        Ok(SclObject::Array(Array::Eager(eager)))
    }
}

// ──────────────────────────────────────────────
// Reshaping
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slice {
    Take,
    Skip,
}

/// `ArrayTake` and `ArraySkip`.
pub struct ArraySlice {
    slice: Slice,
    descriptor: StepDescriptor,
}

impl ArraySlice {
    pub fn new(slice: Slice) -> Self {
        let (name, summary) = match slice {
            Slice::Take => ("ArrayTake", "The first Count elements."),
            Slice::Skip => ("ArraySkip", "Every element after the first Count."),
        };
        ArraySlice {
            slice,
            descriptor: StepDescriptor::new(name, array_of_t())
                .summary(summary)
                .parameter(array_param())
                .parameter(ParameterSpec::step("Count", exact(TypeReference::INTEGER)).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for ArraySlice {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let array = step.evaluate_array("Array", state).await?;
        let count = non_negative(step.evaluate_int("Count", state).await?);
        let sliced = match self.slice {
            Slice::Take => array.take(count),
            Slice::Skip => array.skip(count),
        };
        Ok(SclObject::Array(sliced))
    }
}

pub struct ArraySort {
    descriptor: StepDescriptor,
}

impl Default for ArraySort {
    fn default() -> Self {
        ArraySort {
            descriptor: StepDescriptor::new("ArraySort", array_of_t())
                .summary("Sort the elements.")
                .parameter(array_param())
                .parameter(
                    ParameterSpec::step("Descending", exact(TypeReference::BOOL))
                        .at(1)
                        .default_value(SclObject::Bool(false)),
                ),
        }
    }
}

#[async_trait]
impl StepFactory for ArraySort {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn check_types(&self, step: &CompoundStep) -> Result<(), ErrorCode> {
        not_comparable(step)
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let array = step.evaluate_array("Array", state).await?;
        let descending = step.evaluate_bool("Descending", state).await?;
        Ok(SclObject::Array(array.sort(descending)))
    }
}

// ──────────────────────────────────────────────
// Lambdas
// ──────────────────────────────────────────────

pub struct ArrayFilter {
    descriptor: StepDescriptor,
}

impl Default for ArrayFilter {
    fn default() -> Self {
        ArrayFilter {
            descriptor: StepDescriptor::new("ArrayFilter", array_of_t())
                .summary("The elements for which the predicate is true.")
                .parameter(array_param())
                .parameter(ParameterSpec::lambda("Predicate", t(), exact(TypeReference::BOOL)).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayFilter {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let elements = step.evaluate_array("Array", state).await?.evaluate().await?;
        let mut kept = Vec::new();
        for element in elements.into_vec() {
            let verdict = step.run_lambda("Predicate", element.clone(), state).await?;
            if predicate_holds(&verdict)? {
                kept.push(element);
            }
        }
        Ok(SclObject::Array(Array::from_vec(kept)))
    }
}

pub struct ArrayMap {
    descriptor: StepDescriptor,
}

impl Default for ArrayMap {
    fn default() -> Self {
        ArrayMap {
            descriptor: StepDescriptor::new("ArrayMap", TypeTemplate::array_of(u()))
                .summary("Apply a function to every element.")
                .parameter(array_param())
                .parameter(ParameterSpec::lambda("Function", t(), u()).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayMap {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let elements = step.evaluate_array("Array", state).await?.evaluate().await?;
        let mut mapped = Vec::with_capacity(elements.len());
        for element in elements.into_vec() {
            mapped.push(step.run_lambda("Function", element, state).await?);
        }
        Ok(SclObject::Array(Array::from_vec(mapped)))
    }
}

pub struct ArrayGroupBy {
    descriptor: StepDescriptor,
}

impl Default for ArrayGroupBy {
    fn default() -> Self {
        ArrayGroupBy {
            descriptor: StepDescriptor::new("ArrayGroupBy", exact(TypeReference::array(TypeReference::ENTITY)))
                .summary("Group elements by key into entities (Key: k Values: [..]), in first-seen order.")
                .parameter(array_param())
                .parameter(ParameterSpec::lambda("Function", t(), TypeTemplate::any()).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for ArrayGroupBy {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let elements = step.evaluate_array("Array", state).await?.evaluate().await?;
        let mut groups: IndexMap<String, (SclObject, Vec<SclObject>)> = IndexMap::new();
        for element in elements.into_vec() {
            let key = step.run_lambda("Function", element.clone(), state).await?.evaluated().await?;
            groups
                .entry(key.serialize())
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push(element);
        }
        let entities = groups
            .into_values()
            .map(|(key, values)| {
                let values = SclObject::Array(Array::from_vec(values));
                SclObject::Entity(Entity::from_pairs([
                    ("Key", EntityValue::from_object(&key)),
                    ("Values", EntityValue::from_object(&values)),
                ]))
            })
            .collect();
        Ok(SclObject::Array(Array::from_vec(entities)))
    }
}

pub struct ForEach {
    descriptor: StepDescriptor,
}

impl Default for ForEach {
    fn default() -> Self {
        ForEach {
            descriptor: StepDescriptor::new("ForEach", exact(TypeReference::UNIT))
                .summary("Run an action for every element, then report every failure together.")
                .parameter(array_param())
                .parameter(ParameterSpec::lambda("Action", t(), exact(TypeReference::UNIT)).at(1)),
        }
    }
}

#[async_trait]
impl StepFactory for ForEach {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let array = step.evaluate_array("Array", state).await?;
        array
            .for_each(|element| async move { step.run_lambda("Action", element, state).await.map(|_| ()) })
            .await?;
        Ok(SclObject::Unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_length_answers_to_its_alias() {
        let d = ArrayLength::default();
        assert!(d.descriptor().aliases.contains(&"ArrayCount"));
    }

    #[test]
    fn filter_predicate_must_be_a_bool() {
        assert!(predicate_holds(&SclObject::Bool(true)).unwrap());
        assert!(!predicate_holds(&SclObject::Bool(false)).unwrap());
        let err = predicate_holds(&SclObject::from("yes")).unwrap_err();
        assert!(matches!(
            err.codes().next(),
            Some(ErrorCode::InvalidCast { property, .. }) if property == "Predicate"
        ));
    }

    #[test]
    fn negative_counts_clamp_to_zero() {
        assert_eq!(non_negative(-3), 0);
        assert_eq!(non_negative(4), 4);
    }

    #[test]
    fn map_output_uses_the_second_slot() {
        let d = ArrayMap::default();
        assert_eq!(d.descriptor().signature(), "ArrayMap Array: Array<T> Function: T => U -> Array<U>");
    }
}
