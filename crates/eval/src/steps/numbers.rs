//! Integer and double arithmetic folded over a list of terms.

use std::sync::Arc;

use async_trait::async_trait;
use scl_core::{ErrorCode, SclError, SclObject, TypeReference};

use super::exact;
use crate::descriptor::{ParameterSpec, StepDescriptor};
use crate::state::StateMonad;
use crate::step::CompoundStep;
use crate::store::StepFactory;

pub fn factories() -> Vec<Arc<dyn StepFactory>> {
    let mut factories: Vec<Arc<dyn StepFactory>> = Vec::new();
    for op in NumericOp::ALL {
        for kind in [NumberKind::Integer, NumberKind::Double] {
            if let Some(arithmetic) = Arithmetic::new(op, kind) {
                factories.push(Arc::new(arithmetic));
            }
        }
    }
    factories
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Sum,
    Subtract,
    Product,
    Divide,
    Modulo,
    Power,
}

impl NumericOp {
    pub const ALL: [NumericOp; 6] = [
        NumericOp::Sum,
        NumericOp::Subtract,
        NumericOp::Product,
        NumericOp::Divide,
        NumericOp::Modulo,
        NumericOp::Power,
    ];

    fn base_name(self) -> &'static str {
        match self {
            NumericOp::Sum => "Sum",
            NumericOp::Subtract => "Subtract",
            NumericOp::Product => "Product",
            NumericOp::Divide => "Divide",
            NumericOp::Modulo => "Modulo",
            NumericOp::Power => "Power",
        }
    }

    /// `None` when the operation only exists for integers.
    fn double_name(self) -> Option<&'static str> {
        match self {
            NumericOp::Sum => Some("DoubleSum"),
            NumericOp::Subtract => Some("DoubleSubtract"),
            NumericOp::Product => Some("DoubleProduct"),
            NumericOp::Divide => Some("DoubleDivide"),
            NumericOp::Modulo => None,
            NumericOp::Power => Some("DoublePower"),
        }
    }

    /// Result of folding an empty list.
    fn identity(self) -> i64 {
        match self {
            NumericOp::Product | NumericOp::Divide | NumericOp::Power => 1,
            NumericOp::Sum | NumericOp::Subtract | NumericOp::Modulo => 0,
        }
    }

    fn summary(self) -> &'static str {
        match self {
            NumericOp::Sum => "Add the terms.",
            NumericOp::Subtract => "Subtract each later term from the first.",
            NumericOp::Product => "Multiply the terms.",
            NumericOp::Divide => "Divide the first term by each later term.",
            NumericOp::Modulo => "Remainder of dividing the first term by each later term.",
            NumericOp::Power => "Raise the first term to each later term in turn.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    Integer,
    Double,
}

impl NumberKind {
    fn type_reference(self) -> TypeReference {
        match self {
            NumberKind::Integer => TypeReference::INTEGER,
            NumberKind::Double => TypeReference::DOUBLE,
        }
    }
}

pub struct Arithmetic {
    op: NumericOp,
    kind: NumberKind,
    descriptor: StepDescriptor,
}

impl Arithmetic {
    pub fn new(op: NumericOp, kind: NumberKind) -> Option<Self> {
        let name = match kind {
            NumberKind::Integer => op.base_name(),
            NumberKind::Double => op.double_name()?,
        };
        Some(Arithmetic {
            op,
            kind,
            descriptor: StepDescriptor::new(name, exact(kind.type_reference()))
                .summary(op.summary())
                .parameter(ParameterSpec::list("Terms", exact(kind.type_reference())).at(0)),
        })
    }

    fn unsupported(&self) -> SclError {
        ErrorCode::StepDoesNotExist(self.descriptor.name.to_string()).unlocated()
    }

    fn overflow(&self) -> SclError {
        ErrorCode::Overflow(self.descriptor.name.to_string()).unlocated()
    }

    fn apply_integer(&self, left: i64, right: i64) -> Result<i64, SclError> {
        let result = match self.op {
            NumericOp::Sum => left.checked_add(right),
            NumericOp::Subtract => left.checked_sub(right),
            NumericOp::Product => left.checked_mul(right),
            NumericOp::Divide | NumericOp::Modulo if right == 0 => {
                return Err(ErrorCode::DivideByZero.unlocated())
            }
            NumericOp::Divide => left.checked_div(right),
            NumericOp::Modulo => left.checked_rem(right),
            NumericOp::Power if left == 0 && right < 0 => return Err(ErrorCode::DivideByZero.unlocated()),
            NumericOp::Power => return integer_power(left, right).ok_or_else(|| self.overflow()),
        };
        result.ok_or_else(|| self.overflow())
    }

    fn apply_double(&self, left: f64, right: f64) -> Result<f64, SclError> {
        match self.op {
            NumericOp::Sum => Ok(left + right),
            NumericOp::Subtract => Ok(left - right),
            NumericOp::Product => Ok(left * right),
            NumericOp::Divide if right == 0.0 => Err(ErrorCode::DivideByZero.unlocated()),
            NumericOp::Divide => Ok(left / right),
            NumericOp::Power => Ok(left.powf(right)),
            NumericOp::Modulo => Err(self.unsupported()),
        }
    }
}

/// Integer power. Negative exponents truncate toward zero like integer
/// division does.
fn integer_power(base: i64, exponent: i64) -> Option<i64> {
    if exponent >= 0 {
        let exponent = u32::try_from(exponent).ok()?;
        return base.checked_pow(exponent);
    }
    match base {
        1 => Some(1),
        -1 => Some(if exponent % 2 == 0 { 1 } else { -1 }),
        _ => Some(0),
    }
}

#[async_trait]
impl StepFactory for Arithmetic {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn run(&self, step: &CompoundStep, state: &StateMonad) -> Result<SclObject, SclError> {
        let target = self.kind.type_reference();
        let mut terms = Vec::new();
        for value in step.evaluate_list("Terms", state).await? {
            terms.push(value.try_convert(&target, "Terms").map_err(ErrorCode::unlocated)?);
        }

        let mut iter = terms.into_iter();
        match self.kind {
            NumberKind::Integer => {
                let Some(first) = iter.next() else {
                    return Ok(SclObject::Int(self.op.identity()));
                };
                let mut acc = integer(&first)?;
                for term in iter {
                    acc = self.apply_integer(acc, integer(&term)?)?;
                }
                Ok(SclObject::Int(acc))
            }
            NumberKind::Double => {
                let Some(first) = iter.next() else {
                    return Ok(SclObject::Double(self.op.identity() as f64));
                };
                let mut acc = double(&first)?;
                for term in iter {
                    acc = self.apply_double(acc, double(&term)?)?;
                }
                Ok(SclObject::Double(acc))
            }
        }
    }
}

fn integer(value: &SclObject) -> Result<i64, SclError> {
    match value {
        SclObject::Int(i) => Ok(*i),
        other => Err(invalid_term(other, &TypeReference::INTEGER)),
    }
}

fn double(value: &SclObject) -> Result<f64, SclError> {
    match value {
        SclObject::Double(d) => Ok(*d),
        SclObject::Int(i) => Ok(*i as f64),
        other => Err(invalid_term(other, &TypeReference::DOUBLE)),
    }
}

fn invalid_term(value: &SclObject, target: &TypeReference) -> SclError {
    ErrorCode::InvalidCast {
        property: "Terms".to_string(),
        value: value.serialize(),
        target: target.to_string(),
    }
    .unlocated()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_ops_check_overflow_and_zero() {
        let sum = Arithmetic::new(NumericOp::Sum, NumberKind::Integer).unwrap();
        assert!(matches!(
            sum.apply_integer(i64::MAX, 1).unwrap_err().codes().next(),
            Some(ErrorCode::Overflow(name)) if name == "Sum"
        ));
        let divide = Arithmetic::new(NumericOp::Divide, NumberKind::Integer).unwrap();
        assert!(matches!(
            divide.apply_integer(4, 0).unwrap_err().codes().next(),
            Some(ErrorCode::DivideByZero)
        ));
        assert_eq!(divide.apply_integer(7, 2).unwrap(), 3);
    }

    #[test]
    fn negative_integer_powers_truncate() {
        assert_eq!(integer_power(2, 10), Some(1024));
        assert_eq!(integer_power(2, -1), Some(0));
        assert_eq!(integer_power(-1, -3), Some(-1));
        assert_eq!(integer_power(10, 100), None);
    }

    #[test]
    fn modulo_has_no_double_form() {
        let names: Vec<&str> = factories().iter().map(|f| f.descriptor().name).collect();
        assert!(names.contains(&"DoublePower"));
        assert!(!names.contains(&"DoubleModulo"));
        assert!(Arithmetic::new(NumericOp::Modulo, NumberKind::Double).is_none());
    }

    #[test]
    fn non_numeric_terms_are_an_invalid_cast() {
        let err = integer(&SclObject::from("x")).unwrap_err();
        assert!(matches!(
            err.codes().next(),
            Some(ErrorCode::InvalidCast { target, .. }) if target == "Integer"
        ));
        assert!(double(&SclObject::Bool(true)).is_err());
        assert_eq!(double(&SclObject::Int(2)).unwrap(), 2.0);
    }
}
