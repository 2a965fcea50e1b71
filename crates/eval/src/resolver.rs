//! Variable types visible while freezing.
//!
//! A [`TypeResolver`] maps variable names to their static types and knows
//! the step store. It is cheap to clone; scoped clones add one binding for
//! a lambda variable. [`TypeResolver::try_create`] computes the types of
//! every variable a program assigns before freezing starts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use scl_core::{
    ErrorCode, FreezableStep, FreezableStepProperty, SclError, StepParameterReference,
    TextLocation, TypeReference, VariableName,
};
use tracing::debug;

use crate::freeze::output_type_reference;
use crate::step::Step;
use crate::store::StepFactoryStore;

/// What the containing step expects at this position.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerMetadata {
    pub step_name: String,
    pub parameter: String,
    pub expected: TypeReference,
}

impl CallerMetadata {
    pub fn new(step_name: impl Into<String>, parameter: impl Into<String>, expected: TypeReference) -> Self {
        CallerMetadata {
            step_name: step_name.into(),
            parameter: parameter.into(),
            expected,
        }
    }

    /// The whole program, which may produce anything.
    pub fn top_level() -> Self {
        CallerMetadata::new("Program", "Step", TypeReference::Any)
    }

    pub fn relaxed(&self) -> Self {
        CallerMetadata {
            expected: TypeReference::Any,
            ..self.clone()
        }
    }

    pub fn check(&self, actual: &TypeReference) -> Result<(), ErrorCode> {
        if self.expected.allow(actual) {
            Ok(())
        } else {
            Err(ErrorCode::WrongType {
                step: self.step_name.clone(),
                parameter: self.parameter.clone(),
                expected: self.expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

// ──────────────────────────────────────────────
// Option cache
// ──────────────────────────────────────────────

type OptionKey = (
    usize,
    String,
    String,
    TypeReference,
    BTreeMap<VariableName, TypeReference>,
);

/// Freezing results of option nodes. Infix chains make the same option
/// reachable from every candidate of its parent, so each is frozen once
/// per caller and scope.
#[derive(Default)]
struct OptionCache {
    entries: HashMap<OptionKey, (Arc<[FreezableStep]>, Result<Arc<dyn Step>, SclError>)>,
}

// ──────────────────────────────────────────────
// TypeResolver
// ──────────────────────────────────────────────

#[derive(Clone)]
pub struct TypeResolver {
    store: Arc<StepFactoryStore>,
    variables: Arc<BTreeMap<VariableName, TypeReference>>,
    cache: Arc<Mutex<OptionCache>>,
}

impl TypeResolver {
    pub fn new(store: Arc<StepFactoryStore>) -> Self {
        TypeResolver {
            store,
            variables: Arc::new(BTreeMap::new()),
            cache: Arc::new(Mutex::new(OptionCache::default())),
        }
    }

    pub fn store(&self) -> &Arc<StepFactoryStore> {
        &self.store
    }

    pub fn get(&self, name: &VariableName) -> Option<&TypeReference> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> &BTreeMap<VariableName, TypeReference> {
        &self.variables
    }

    /// Bind a variable assigned by the program. Assigning an incompatible
    /// type to a known variable is an error.
    pub fn try_add_variable(&mut self, name: &VariableName, t: TypeReference) -> Result<(), ErrorCode> {
        let combined = match self.variables.get(name) {
            Some(existing) => existing.try_combine(&t).ok_or_else(|| ErrorCode::WrongVariableType {
                variable: name.serialize(),
                expected: existing.to_string(),
            })?,
            None => t,
        };
        Arc::make_mut(&mut self.variables).insert(name.clone(), combined);
        Ok(())
    }

    pub fn try_clone_with_scoped_step(&self, name: &VariableName, t: TypeReference) -> Result<TypeResolver, ErrorCode> {
        let mut scoped = self.clone();
        scoped.try_add_variable(name, t)?;
        Ok(scoped)
    }

    /// A resolver where the lambda variable `name` has type `t`. An
    /// existing binding of an incompatible type is a scope conflict.
    pub fn try_clone_with_scoped_lambda(
        &self,
        name: &VariableName,
        t: TypeReference,
    ) -> Result<TypeResolver, ErrorCode> {
        if let Some(existing) = self.variables.get(name) {
            if existing.try_combine(&t).is_none() {
                return Err(ErrorCode::ScopeConflict {
                    variable: name.serialize(),
                    existing: existing.to_string(),
                    requested: t.to_string(),
                });
            }
        }
        let mut scoped = self.clone();
        Arc::make_mut(&mut scoped.variables).insert(name.clone(), t);
        Ok(scoped)
    }

    /// Resolve the type of every variable `top` assigns. Assignments whose
    /// value depends on variables not yet known are retried until nothing
    /// changes; whatever is still unknown is bound as `Any`.
    pub fn try_create(store: Arc<StepFactoryStore>, top: &FreezableStep) -> Result<TypeResolver, SclError> {
        let mut resolver = TypeResolver::new(store);
        let mut pending = collect_assignments(top, &resolver.store);
        let meta = CallerMetadata::new("SetVariable", "Value", TypeReference::Any);

        while !pending.is_empty() {
            let mut unresolved = Vec::new();
            let mut errors = Vec::new();
            let before = pending.len();
            for assignment in pending {
                match output_type_reference(assignment.value, &meta, &resolver) {
                    Ok(t) if t != TypeReference::Unknown => {
                        if let Err(code) = resolver.try_add_variable(&assignment.name, t) {
                            errors.push(code.at_step("SetVariable", assignment.location));
                        }
                    }
                    _ => unresolved.push(assignment),
                }
            }
            SclError::check(errors)?;
            if unresolved.len() == before {
                for a in &unresolved {
                    if resolver.get(&a.name).is_none() {
                        debug!(variable = %a.name, "variable type unresolved; using Any");
                        Arc::make_mut(&mut resolver.variables).insert(a.name.clone(), TypeReference::Any);
                    }
                }
                break;
            }
            pending = unresolved;
        }
        Ok(resolver)
    }

    pub(crate) fn cached_option(
        &self,
        options: &Arc<[FreezableStep]>,
        caller: &CallerMetadata,
    ) -> Option<Result<Arc<dyn Step>, SclError>> {
        let key = self.option_key(options, caller);
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.entries.get(&key).map(|(_, result)| result.clone())
    }

    pub(crate) fn cache_option(
        &self,
        options: &Arc<[FreezableStep]>,
        caller: &CallerMetadata,
        result: &Result<Arc<dyn Step>, SclError>,
    ) {
        let key = self.option_key(options, caller);
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.entries.insert(key, (options.clone(), result.clone()));
    }

    fn option_key(&self, options: &Arc<[FreezableStep]>, caller: &CallerMetadata) -> OptionKey {
        (
            Arc::as_ptr(options) as *const FreezableStep as usize,
            caller.step_name.clone(),
            caller.parameter.clone(),
            caller.expected.clone(),
            (*self.variables).clone(),
        )
    }
}

struct Assignment<'a> {
    name: VariableName,
    value: &'a FreezableStep,
    location: &'a TextLocation,
}

fn collect_assignments<'a>(top: &'a FreezableStep, store: &StepFactoryStore) -> Vec<Assignment<'a>> {
    let mut found = Vec::new();
    top.walk(&mut |step| {
        let FreezableStep::Compound(data) = step else {
            return;
        };
        let is_set = store
            .find(&data.step_name)
            .is_some_and(|f| f.descriptor().name == "SetVariable");
        if !is_set {
            return;
        }
        let argument = |name: &str, position: usize| {
            data.properties
                .get(&StepParameterReference::named(name))
                .or_else(|| data.properties.get(&StepParameterReference::Index(position)))
        };
        if let (Some(FreezableStepProperty::Variable { name, .. }), Some(FreezableStepProperty::Step(value))) =
            (argument("Variable", 0), argument("Value", 1))
        {
            found.push(Assignment {
                name: name.clone(),
                value: &**value,
                location: &data.location,
            });
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TypeResolver {
        TypeResolver::new(Arc::new(StepFactoryStore::with_core_steps()))
    }

    #[test]
    fn scoped_lambda_rejects_incompatible_binding() {
        let x = VariableName::new("x");
        let r = resolver().try_clone_with_scoped_lambda(&x, TypeReference::INTEGER).unwrap();
        assert!(r.try_clone_with_scoped_lambda(&x, TypeReference::DOUBLE).is_ok());
        let err = r.try_clone_with_scoped_lambda(&x, TypeReference::STRING).err();
        assert!(matches!(err, Some(ErrorCode::ScopeConflict { .. })));
    }

    #[test]
    fn scoped_clones_leave_the_original_alone() {
        let base = resolver();
        let scoped = base
            .try_clone_with_scoped_step(&VariableName::new("y"), TypeReference::STRING)
            .unwrap();
        assert!(base.get(&VariableName::new("y")).is_none());
        assert_eq!(scoped.get(&VariableName::new("y")), Some(&TypeReference::STRING));
    }

    #[test]
    fn option_results_are_cached_per_caller() {
        let r = resolver();
        let options: Arc<[FreezableStep]> = Arc::from(Vec::new());
        let print = CallerMetadata::new("Print", "Value", TypeReference::Any);
        let log = CallerMetadata::new("Log", "Value", TypeReference::Any);
        let failed: Result<Arc<dyn Step>, SclError> = Err(ErrorCode::DivideByZero.unlocated());

        r.cache_option(&options, &print, &failed);
        assert!(r.cached_option(&options, &print).is_some());
        assert!(r.cached_option(&options, &log).is_none());
    }

    #[test]
    fn create_resolves_dependent_assignments() {
        let tree = scl_core::parse("- <b> = <a> + 1\n- <a> = 2\n- Print <b>").unwrap();
        let r = TypeResolver::try_create(resolver().store().clone(), &tree).unwrap();
        assert_eq!(r.get(&VariableName::new("a")), Some(&TypeReference::INTEGER));
        assert_eq!(r.get(&VariableName::new("b")), Some(&TypeReference::INTEGER));
    }

    #[test]
    fn create_rejects_conflicting_assignments() {
        let tree = scl_core::parse("- <a> = 2\n- <a> = 'text'").unwrap();
        let err = TypeResolver::try_create(resolver().store().clone(), &tree).err().unwrap();
        assert!(matches!(err.codes().next(), Some(ErrorCode::WrongVariableType { .. })));
    }

    #[test]
    fn lambda_dependent_assignments_become_any() {
        let tree = scl_core::parse("ForEach [1, 2] (<x> => <last> = <x>)").unwrap();
        let r = TypeResolver::try_create(resolver().store().clone(), &tree).unwrap();
        assert_eq!(r.get(&VariableName::new("last")), Some(&TypeReference::Any));
    }
}
