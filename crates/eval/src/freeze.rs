//! Freezing: typing the parsed tree and binding it to step factories.
//!
//! Two entry points walk the same tree. [`output_type_reference`] answers
//! "what would this produce here?" and is used to infer generic slots and
//! variable types; [`freeze`] produces the runnable step, reporting every
//! independent failure together.

use std::sync::Arc;

use indexmap::IndexMap;
use scl_core::parser::{array_new_step, get_variable_step};
use scl_core::{
    ErrorCode, FreezableStep, FreezableStepData, FreezableStepProperty, SclEnum, SclError,
    SclObject, StepParameterReference, TextLocation, TypeReference, VariableName,
};
use tracing::trace;

use crate::descriptor::{ParameterKind, ParameterSpec, StepDescriptor, TypeTemplate};
use crate::resolver::{CallerMetadata, TypeResolver};
use crate::step::{CompoundStep, ConstantStep, CreateEntityStep, FrozenProperty, Step};
use crate::store::StepFactory;

type Matched<'d, 'p> = Vec<(&'d ParameterSpec, &'p FreezableStepProperty)>;

// ──────────────────────────────────────────────
// Output types
// ──────────────────────────────────────────────

/// The type `step` produces where `meta` expects a value.
pub fn output_type_reference(
    step: &FreezableStep,
    meta: &CallerMetadata,
    resolver: &TypeResolver,
) -> Result<TypeReference, SclError> {
    match step {
        FreezableStep::Constant { value, .. } => Ok(promote(value, &meta.expected).type_reference()),
        FreezableStep::CreateEntity { .. } => Ok(TypeReference::ENTITY),
        FreezableStep::Option { .. } => freeze(step, meta, resolver).map(|s| s.output_type().clone()),
        FreezableStep::Compound(data) => {
            let factory = find_factory(data, resolver)?;
            let descriptor = factory.descriptor();
            let matched = match_properties(descriptor, data)?;
            let generics = infer_generics(descriptor, &matched, meta, resolver);
            let variable_type = |p: &str| variable_type_of(&matched, p, resolver);
            Ok(descriptor.output.instantiate(&generics, &variable_type))
        }
    }
}

/// Integer literals become doubles where only a double is accepted.
fn promote(value: &SclObject, expected: &TypeReference) -> SclObject {
    match value {
        SclObject::Int(i)
            if !expected.allow(&TypeReference::INTEGER) && expected.allow(&TypeReference::DOUBLE) =>
        {
            SclObject::Double(*i as f64)
        }
        other => other.clone(),
    }
}

fn find_factory(data: &FreezableStepData, resolver: &TypeResolver) -> Result<Arc<dyn StepFactory>, SclError> {
    resolver.store().find(&data.step_name).cloned().ok_or_else(|| {
        ErrorCode::StepDoesNotExist(data.step_name.clone()).at_step(&data.step_name, &data.location)
    })
}

fn variable_type_of(matched: &Matched<'_, '_>, parameter: &str, resolver: &TypeResolver) -> TypeReference {
    matched
        .iter()
        .find(|(spec, _)| spec.name == parameter)
        .and_then(|(_, prop)| match prop {
            FreezableStepProperty::Variable { name, .. } => resolver.get(name).cloned(),
            _ => None,
        })
        .unwrap_or(TypeReference::Unknown)
}

/// Pair each supplied argument with its declared parameter, in declaration
/// order. Unknown, duplicated and missing parameters are all reported.
fn match_properties<'d, 'p>(
    descriptor: &'d StepDescriptor,
    data: &'p FreezableStepData,
) -> Result<Matched<'d, 'p>, SclError> {
    let mut by_name: IndexMap<&'static str, &'p FreezableStepProperty> = IndexMap::new();
    let mut errors = Vec::new();
    for (reference, property) in &data.properties {
        let spec = match reference {
            StepParameterReference::Named(n) => descriptor.find_parameter(n),
            StepParameterReference::Index(i) => descriptor.positional(*i),
        };
        let Some(spec) = spec else {
            errors.push(
                ErrorCode::UnexpectedParameter {
                    parameter: reference.to_string(),
                    step: descriptor.name.to_string(),
                }
                .at_step(descriptor.name, property.location()),
            );
            continue;
        };
        if by_name.insert(spec.name, property).is_some() {
            errors.push(
                ErrorCode::DuplicateParameter(spec.name.to_string())
                    .at_step(descriptor.name, property.location()),
            );
        }
    }
    for spec in &descriptor.parameters {
        if spec.required && !by_name.contains_key(spec.name) {
            errors.push(
                ErrorCode::MissingParameter {
                    parameter: spec.name.to_string(),
                    step: descriptor.name.to_string(),
                }
                .at_step(descriptor.name, &data.location),
            );
        }
    }
    SclError::check(errors)?;
    Ok(descriptor
        .parameters
        .iter()
        .filter_map(|spec| by_name.get(spec.name).map(|p| (spec, *p)))
        .collect())
}

/// The lambda variable and body an argument binds, when it can fill a
/// lambda parameter. Plain steps bind `<item>`.
fn lambda_parts(property: &FreezableStepProperty) -> Option<(VariableName, FreezableStep)> {
    match property {
        FreezableStepProperty::Lambda(l) => Some((l.variable_or_item(), (*l.body).clone())),
        FreezableStepProperty::Step(s) => Some((VariableName::item(), (**s).clone())),
        FreezableStepProperty::Variable { name, location } => {
            Some((VariableName::item(), get_variable_step(name.clone(), location.clone())))
        }
        FreezableStepProperty::StepList { .. } => None,
    }
}

fn lambda_templates(template: &TypeTemplate) -> (TypeTemplate, TypeTemplate) {
    match template {
        TypeTemplate::Lambda { variable, body } => ((**variable).clone(), (**body).clone()),
        other => (TypeTemplate::any(), other.clone()),
    }
}

/// Bind the generic slots of a step call.
///
/// The caller's expectation is unified with the output first, then every
/// ordinary argument in declaration order, then lambda bodies with their
/// variable typed from what the other arguments established.
fn infer_generics(
    descriptor: &StepDescriptor,
    matched: &Matched<'_, '_>,
    meta: &CallerMetadata,
    resolver: &TypeResolver,
) -> Vec<TypeReference> {
    let mut generics = vec![TypeReference::Unknown; descriptor.slot_count()];
    descriptor.output.unify(&meta.expected, &mut generics);
    let variable_type = |p: &str| variable_type_of(matched, p, resolver);

    for (spec, property) in matched.iter().filter(|(s, _)| s.kind != ParameterKind::Lambda) {
        let expected = spec.template.instantiate(&generics, &variable_type);
        let child = CallerMetadata::new(descriptor.name, spec.name, expected);
        let actual = match (spec.kind, property) {
            (ParameterKind::VariableName, _) => continue,
            (_, FreezableStepProperty::Step(s)) => output_type_reference(s, &child, resolver).ok(),
            (_, FreezableStepProperty::StepList { steps, .. }) => {
                let element = child
                    .expected
                    .try_get_array_member_type()
                    .unwrap_or(TypeReference::Any);
                let element_meta = CallerMetadata::new(descriptor.name, spec.name, element);
                let types: Vec<TypeReference> = steps
                    .iter()
                    .filter_map(|s| output_type_reference(s, &element_meta, resolver).ok())
                    .collect();
                Some(TypeReference::array(TypeReference::unify_all(&types)))
            }
            (_, FreezableStepProperty::Variable { name, .. }) => resolver.get(name).cloned(),
            (_, FreezableStepProperty::Lambda(_)) => None,
        };
        if let Some(actual) = actual {
            spec.template.unify(&actual, &mut generics);
        }
    }

    for (spec, property) in matched.iter().filter(|(s, _)| s.kind == ParameterKind::Lambda) {
        let Some((variable, body)) = lambda_parts(property) else {
            continue;
        };
        let (variable_template, body_template) = lambda_templates(&spec.template);
        let bound = variable_template.instantiate(&generics, &variable_type);
        let Ok(scoped) = resolver.try_clone_with_scoped_lambda(&variable, bound) else {
            continue;
        };
        let expected = body_template.instantiate(&generics, &variable_type);
        let child = CallerMetadata::new(descriptor.name, spec.name, expected);
        if let Ok(actual) = output_type_reference(&body, &child, &scoped) {
            body_template.unify(&actual, &mut generics);
        }
    }

    generics.into_iter().map(TypeReference::unknown_to_any).collect()
}

// ──────────────────────────────────────────────
// Freezing
// ──────────────────────────────────────────────

/// Turn `step` into a runnable step that produces what `meta` expects.
pub fn freeze(
    step: &FreezableStep,
    meta: &CallerMetadata,
    resolver: &TypeResolver,
) -> Result<Arc<dyn Step>, SclError> {
    match step {
        FreezableStep::Constant { value, location } => freeze_constant(value, location, meta, resolver),
        FreezableStep::CreateEntity { properties, location } => {
            let mut frozen = Vec::with_capacity(properties.len());
            let mut errors = Vec::new();
            for (key, value) in properties {
                let child = CallerMetadata::new("CreateEntity", key.clone(), TypeReference::Any);
                match freeze(value, &child, resolver) {
                    Ok(s) => frozen.push((key.clone(), s)),
                    Err(e) => errors.push(e),
                }
            }
            if let Err(code) = meta.check(&TypeReference::ENTITY) {
                errors.push(code.at_step("CreateEntity", location));
            }
            SclError::check(errors)?;
            Ok(Arc::new(CreateEntityStep::new(frozen, location.clone())))
        }
        FreezableStep::Option { options, .. } => {
            if let Some(cached) = resolver.cached_option(options, meta) {
                return cached;
            }
            let result = freeze_option(options, meta, resolver);
            resolver.cache_option(options, meta, &result);
            result
        }
        FreezableStep::Compound(data) => freeze_compound(data, meta, resolver),
    }
}

fn freeze_constant(
    value: &SclObject,
    location: &TextLocation,
    meta: &CallerMetadata,
    resolver: &TypeResolver,
) -> Result<Arc<dyn Step>, SclError> {
    let value = match promote(value, &meta.expected) {
        SclObject::Enum(e) => SclObject::Enum(canonical_enum(&e, resolver).map_err(|c| c.with_location(location))?),
        SclObject::String(s) => match &meta.expected {
            TypeReference::Enum(type_name) => {
                let wanted = SclEnum::new(type_name.clone(), s);
                SclObject::Enum(canonical_enum(&wanted, resolver).map_err(|c| c.with_location(location))?)
            }
            _ => SclObject::String(s),
        },
        other => other,
    };
    meta.check(&value.type_reference())
        .map_err(|c| c.with_location(location))?;
    Ok(Arc::new(ConstantStep::new(value, location.clone())))
}

/// Resolve an enum literal against the registered enum types, fixing the
/// case of its names.
fn canonical_enum(value: &SclEnum, resolver: &TypeResolver) -> Result<SclEnum, ErrorCode> {
    let not_parsed = || ErrorCode::CouldNotParse {
        text: value.value.clone(),
        target: value.type_name.clone(),
    };
    let (type_name, members) = resolver.store().enum_type(&value.type_name).ok_or_else(not_parsed)?;
    let member = members
        .iter()
        .find(|m| m.eq_ignore_ascii_case(&value.value))
        .ok_or_else(not_parsed)?;
    Ok(SclEnum::new(type_name, member.clone()))
}

/// First candidate that freezes wins. When none do, prefer the error of a
/// candidate that only failed on the expected type.
fn freeze_option(
    options: &[FreezableStep],
    meta: &CallerMetadata,
    resolver: &TypeResolver,
) -> Result<Arc<dyn Step>, SclError> {
    let mut failures = Vec::with_capacity(options.len());
    for candidate in options {
        match freeze(candidate, meta, resolver) {
            Ok(step) => {
                trace!(step = step.name(), "option candidate chosen");
                return Ok(step);
            }
            Err(e) => failures.push(e),
        }
    }
    if meta.expected != TypeReference::Any {
        let relaxed = meta.relaxed();
        for (candidate, error) in options.iter().zip(&failures) {
            if freeze(candidate, &relaxed, resolver).is_ok() {
                return Err(error.clone());
            }
        }
    }
    match failures.into_iter().next() {
        Some(first) => Err(first),
        None => Err(ErrorCode::Unknown("empty option".to_string()).unlocated()),
    }
}

fn freeze_compound(
    data: &FreezableStepData,
    meta: &CallerMetadata,
    resolver: &TypeResolver,
) -> Result<Arc<dyn Step>, SclError> {
    let factory = find_factory(data, resolver)?;
    let descriptor = factory.descriptor();
    let matched = match_properties(descriptor, data)?;
    let generics = infer_generics(descriptor, &matched, meta, resolver);
    let variable_type = |p: &str| variable_type_of(&matched, p, resolver);

    let mut properties = IndexMap::new();
    let mut errors = Vec::new();
    for (spec, property) in &matched {
        if spec.reads_variable {
            if let FreezableStepProperty::Variable { name, location } = property {
                if resolver.get(name).is_none() {
                    errors.push(ErrorCode::MissingVariable(name.serialize()).at_step(descriptor.name, location));
                    continue;
                }
            }
        }
        let expected = spec.template.instantiate(&generics, &variable_type);
        let child = CallerMetadata::new(descriptor.name, spec.name, expected);
        match freeze_property(descriptor, spec, property, &child, &generics, resolver) {
            Ok(frozen) => {
                properties.insert(spec.name, frozen);
            }
            Err(e) => errors.push(e),
        }
    }
    SclError::check(errors)?;

    let output = descriptor.output.instantiate(&generics, &variable_type);
    let step = CompoundStep::new(factory.clone(), properties, data.location.clone(), output.clone(), generics);
    let mut errors = Vec::new();
    if let Err(code) = factory.check_types(&step) {
        errors.push(code.at_step(descriptor.name, &data.location));
    }
    if let Err(code) = meta.check(&output) {
        errors.push(code.at_step(descriptor.name, &data.location));
    }
    SclError::check(errors)?;
    Ok(Arc::new(step))
}

fn freeze_property(
    descriptor: &StepDescriptor,
    spec: &ParameterSpec,
    property: &FreezableStepProperty,
    meta: &CallerMetadata,
    generics: &[TypeReference],
    resolver: &TypeResolver,
) -> Result<FrozenProperty, SclError> {
    use FreezableStepProperty as P;
    match (spec.kind, property) {
        (ParameterKind::Step, P::Step(s)) => Ok(FrozenProperty::Step(freeze(s, meta, resolver)?)),
        (ParameterKind::Step, P::StepList { steps, location }) => {
            let array = array_new_step(steps.clone(), location.clone());
            Ok(FrozenProperty::Step(freeze(&array, meta, resolver)?))
        }
        (ParameterKind::Step | ParameterKind::StepList, P::Variable { name, location }) => {
            let get = get_variable_step(name.clone(), location.clone());
            Ok(FrozenProperty::Step(freeze(&get, meta, resolver)?))
        }
        (ParameterKind::StepList, P::StepList { steps, .. }) => {
            let element = meta.expected.try_get_array_member_type().unwrap_or(TypeReference::Any);
            let element_meta = CallerMetadata::new(descriptor.name, spec.name, element);
            let mut frozen = Vec::with_capacity(steps.len());
            let mut errors = Vec::new();
            for s in steps {
                match freeze(s, &element_meta, resolver) {
                    Ok(f) => frozen.push(f),
                    Err(e) => errors.push(e),
                }
            }
            SclError::check(errors)?;
            Ok(FrozenProperty::StepList(frozen))
        }
        (ParameterKind::StepList, P::Step(s)) => Ok(FrozenProperty::Step(freeze(s, meta, resolver)?)),
        (ParameterKind::VariableName, P::Variable { name, .. }) => Ok(FrozenProperty::Variable(name.clone())),
        (ParameterKind::Lambda, _) => {
            let Some((variable, body)) = lambda_parts(property) else {
                return Err(wrong_kind(descriptor, spec, property));
            };
            let (variable_template, body_template) = lambda_templates(&spec.template);
            let bound = variable_template.instantiate(generics, &|_| TypeReference::Any);
            let scoped = resolver
                .try_clone_with_scoped_lambda(&variable, bound)
                .map_err(|c| c.at_step(descriptor.name, property.location()))?;
            let expected = body_template.instantiate(generics, &|_| TypeReference::Any);
            let body_meta = CallerMetadata::new(descriptor.name, spec.name, expected);
            let body = freeze(&body, &body_meta, &scoped)?;
            Ok(FrozenProperty::Lambda { variable, body })
        }
        _ => Err(wrong_kind(descriptor, spec, property)),
    }
}

fn wrong_kind(descriptor: &StepDescriptor, spec: &ParameterSpec, property: &FreezableStepProperty) -> SclError {
    ErrorCode::WrongParameterKind {
        step: descriptor.name.to_string(),
        parameter: spec.name.to_string(),
        expected: format!("a {}", spec.kind.name()),
    }
    .at_step(descriptor.name, property.location())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StepFactoryStore;

    fn resolver_for(text: &str) -> (FreezableStep, TypeResolver) {
        let store = Arc::new(StepFactoryStore::with_core_steps());
        let tree = scl_core::parse(text).unwrap();
        let resolver = TypeResolver::try_create(store, &tree).unwrap();
        (tree, resolver)
    }

    fn freeze_text(text: &str) -> Result<Arc<dyn Step>, SclError> {
        let (tree, resolver) = resolver_for(text);
        freeze(&tree, &CallerMetadata::top_level(), &resolver)
    }

    fn first_code(result: Result<Arc<dyn Step>, SclError>) -> ErrorCode {
        match result {
            Ok(step) => panic!("expected an error, froze {}", step.serialize()),
            Err(e) => e.codes().next().cloned().unwrap(),
        }
    }

    #[test]
    fn integer_literal_promotes_where_double_expected() {
        let step = freeze_text("2 * 3.0").unwrap();
        assert_eq!(step.name(), "DoubleProduct");
        assert_eq!(step.output_type(), &TypeReference::DOUBLE);
        assert_eq!(step.serialize(), "DoubleProduct Terms: [2.0, 3.0]");
    }

    #[test]
    fn integer_infix_picks_integer_step() {
        let step = freeze_text("2 * 3").unwrap();
        assert_eq!(step.name(), "Product");
        assert_eq!(step.output_type(), &TypeReference::INTEGER);
    }

    #[test]
    fn plus_on_arrays_concatenates() {
        let step = freeze_text("[1, 2] + [3]").unwrap();
        assert_eq!(step.name(), "ArrayConcat");
        assert_eq!(step.output_type(), &TypeReference::array(TypeReference::INTEGER));
    }

    #[test]
    fn plus_on_entities_combines() {
        let step = freeze_text("(a: 1) + (b: 2)").unwrap();
        assert_eq!(step.name(), "EntityCombine");
    }

    #[test]
    fn unknown_step_is_reported() {
        let code = first_code(freeze_text("NoSuchStep Value: 1"));
        assert_eq!(code, ErrorCode::StepDoesNotExist("NoSuchStep".to_string()));
    }

    #[test]
    fn missing_and_unexpected_parameters_are_reported_together() {
        let err = freeze_text("ArrayTake Bogus: 1").err().unwrap();
        let codes: Vec<&ErrorCode> = err.codes().collect();
        assert!(codes.iter().any(|c| matches!(c, ErrorCode::UnexpectedParameter { .. })));
        assert!(codes.iter().any(|c| matches!(c, ErrorCode::MissingParameter { parameter, .. } if parameter == "Array")));
    }

    #[test]
    fn wrong_argument_type_is_reported() {
        let code = first_code(freeze_text("StringLength 42"));
        assert!(matches!(code, ErrorCode::WrongType { ref parameter, .. } if parameter == "String"));
    }

    #[test]
    fn lambda_variable_takes_the_element_type() {
        let step = freeze_text("ArrayMap [1, 2] (<x> => <x> + 1)").unwrap();
        assert_eq!(step.output_type(), &TypeReference::array(TypeReference::INTEGER));
    }

    #[test]
    fn implicit_item_lambda() {
        let step = freeze_text("ArrayFilter ['a', 'bb'] ((StringLength <item>) > 1)").unwrap();
        assert_eq!(step.output_type(), &TypeReference::array(TypeReference::STRING));
    }

    #[test]
    fn lambda_conflicting_with_a_variable_is_a_scope_conflict() {
        let (tree, resolver) = resolver_for("- <x> = 'text'\n- ForEach [1, 2] (<x> => Print <x>)");
        let err = freeze(&tree, &CallerMetadata::top_level(), &resolver).err().unwrap();
        assert!(err.codes().any(|c| matches!(c, ErrorCode::ScopeConflict { .. })));
    }

    #[test]
    fn enum_literals_are_canonicalized() {
        let step = freeze_text("Print errorbehaviour.skip").unwrap();
        assert_eq!(step.serialize(), "Print Value: ErrorBehaviour.Skip");
        let code = first_code(freeze_text("Print ErrorBehaviour.Sometimes"));
        assert!(matches!(code, ErrorCode::CouldNotParse { .. }));
    }

    #[test]
    fn option_reports_the_close_candidate() {
        // Both operands are strings; only StringJoin fits, and it produces
        // a string where a bool is needed.
        let code = first_code(freeze_text("If ('a' + 'b') (Print 1)"));
        assert!(matches!(code, ErrorCode::WrongType { ref step, .. } if step == "If"));
    }

    #[test]
    fn reading_an_unset_variable_fails() {
        let code = first_code(freeze_text("Print <never>"));
        assert_eq!(code, ErrorCode::MissingVariable("<never>".to_string()));
    }
}
