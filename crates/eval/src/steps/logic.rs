//! Boolean connectives and comparisons.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use scl_core::{ErrorCode, SclError, SclObject, TypeReference};

use super::{exact, t};
use crate::descriptor::{ParameterSpec, StepDescriptor};
use crate::state::StateMonad;
use crate::step::{CompoundStep, FrozenProperty, Step};
use crate::store::StepFactory;

pub fn factories() -> Vec<Arc<dyn StepFactory>> {
    let mut factories: Vec<Arc<dyn StepFactory>> = vec![
        Arc::new(Not::default()),
        Arc::new(Connective::new(BoolOp::And)),
        Arc::new(Connective::new(BoolOp::Or)),
    ];
    for op in CompareOp::ALL {
        factories.push(Arc::new(Compare::new(op)));
    }
    factories
}

pub struct Not {
    descriptor: StepDescriptor,
}

impl Default for Not {
    fn default() -> Self {
        Not {
            descriptor: StepDescriptor::new("Not", exact(TypeReference::BOOL))
                .summary("Negate a boolean.")
                .parameter(ParameterSpec::step("Boolean", exact(TypeReference::BOOL)).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for Not {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        Ok(SclObject::Bool(!step.evaluate_bool("Boolean", state).await?))
    }
}

// ──────────────────────────────────────────────
// And / Or
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    fn name(self) -> &'static str {
        match self {
            BoolOp::And => "And",
            BoolOp::Or => "Or",
        }
    }

    /// The value that ends evaluation early.
    fn decisive(self) -> bool {
        matches!(self, BoolOp::Or)
    }
}

/// `And`/`Or` over a list of booleans. Terms are evaluated left to right
/// and evaluation stops at the first decisive term.
pub struct Connective {
    op: BoolOp,
    descriptor: StepDescriptor,
}

impl Connective {
    pub fn new(op: BoolOp) -> Self {
        Connective {
            op,
            descriptor: StepDescriptor::new(op.name(), exact(TypeReference::BOOL))
                .summary(match op {
                    BoolOp::And => "True when every term is true.",
                    BoolOp::Or => "True when any term is true.",
                })
                .parameter(ParameterSpec::list("Terms", exact(TypeReference::BOOL)).at(0)),
        }
    }
}

fn as_bool(value: SclObject) -> Result<bool, SclError> {
    match value.try_convert(&TypeReference::BOOL, "Terms") {
        Ok(SclObject::Bool(b)) => Ok(b),
        Ok(other) => Err(ErrorCode::InvalidCast {
            property: "Terms".to_string(),
            value: other.serialize(),
            target: TypeReference::BOOL.to_string(),
        }
        .unlocated()),
        Err(code) => Err(code.unlocated()),
    }
}

#[async_trait]
impl StepFactory for Connective {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let decisive = self.op.decisive();
        if let Some(FrozenProperty::StepList(terms)) = step.property("Terms") {
            for term in terms {
                if as_bool(term.run(state).await?)? == decisive {
                    return Ok(SclObject::Bool(decisive));
                }
            }
            return Ok(SclObject::Bool(!decisive));
        }
        for value in step.evaluate_list("Terms", state).await? {
            if as_bool(value)? == decisive {
                return Ok(SclObject::Bool(decisive));
            }
        }
        Ok(SclObject::Bool(!decisive))
    }
}

// ──────────────────────────────────────────────
// Comparisons
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl CompareOp {
    pub const ALL: [CompareOp; 6] = [
        CompareOp::Equals,
        CompareOp::NotEquals,
        CompareOp::LessThan,
        CompareOp::LessThanOrEqual,
        CompareOp::GreaterThan,
        CompareOp::GreaterThanOrEqual,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CompareOp::Equals => "Equals",
            CompareOp::NotEquals => "NotEquals",
            CompareOp::LessThan => "LessThan",
            CompareOp::LessThanOrEqual => "LessThanOrEqual",
            CompareOp::GreaterThan => "GreaterThan",
            CompareOp::GreaterThanOrEqual => "GreaterThanOrEqual",
        }
    }

    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equals => ordering == Ordering::Equal,
            CompareOp::NotEquals => ordering != Ordering::Equal,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessThanOrEqual => ordering != Ordering::Greater,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

/// A comparison chained over every adjacent pair of terms.
pub struct Compare {
    op: CompareOp,
    descriptor: StepDescriptor,
}

impl Compare {
    pub fn new(op: CompareOp) -> Self {
        Compare {
            op,
            descriptor: StepDescriptor::new(op.name(), exact(TypeReference::BOOL))
                .summary("Compare each term with the next.")
                .parameter(ParameterSpec::list("Terms", t()).at(0)),
        }
    }
}

#[async_trait]
impl StepFactory for Compare {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn check_types(&self, step: &CompoundStep) -> Result<(), ErrorCode> {
        let element = step.generic(0);
        if element.is_comparable() {
            Ok(())
        } else {
            Err(ErrorCode::TypeNotComparable(element.to_string()))
        }
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let terms = step.evaluate_list("Terms", state).await?;
        let holds = terms
            .windows(2)
            .all(|pair| self.op.holds(pair[0].compare(&pair[1])));
        Ok(SclObject::Bool(holds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_table() {
        assert!(CompareOp::LessThanOrEqual.holds(Ordering::Equal));
        assert!(!CompareOp::LessThan.holds(Ordering::Equal));
        assert!(CompareOp::NotEquals.holds(Ordering::Greater));
        assert!(CompareOp::GreaterThanOrEqual.holds(Ordering::Greater));
    }

    #[test]
    fn or_is_decided_by_true() {
        assert!(BoolOp::Or.decisive());
        assert!(!BoolOp::And.decisive());
    }
}
