use crate::ast::{FreezableStep, FreezableStepData, FreezableStepProperty, StepParameterReference};
use crate::lexer::Token;
use crate::location::TextLocation;

/// Infix operators, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Or,
    And,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl InfixOperator {
    pub fn from_token(token: &Token) -> Option<InfixOperator> {
        let op = match token {
            Token::OrOr => InfixOperator::Or,
            Token::AndAnd => InfixOperator::And,
            Token::EqEq => InfixOperator::Equals,
            Token::Neq => InfixOperator::NotEquals,
            Token::Lt => InfixOperator::LessThan,
            Token::Lte => InfixOperator::LessThanOrEqual,
            Token::Gt => InfixOperator::GreaterThan,
            Token::Gte => InfixOperator::GreaterThanOrEqual,
            Token::Plus => InfixOperator::Add,
            Token::Minus => InfixOperator::Subtract,
            Token::Star => InfixOperator::Multiply,
            Token::Slash => InfixOperator::Divide,
            Token::Percent => InfixOperator::Modulo,
            Token::Caret => InfixOperator::Power,
            _ => return None,
        };
        Some(op)
    }

    pub fn precedence(self) -> u8 {
        match self {
            InfixOperator::Or => 1,
            InfixOperator::And => 2,
            InfixOperator::Equals
            | InfixOperator::NotEquals
            | InfixOperator::LessThan
            | InfixOperator::LessThanOrEqual
            | InfixOperator::GreaterThan
            | InfixOperator::GreaterThanOrEqual => 3,
            InfixOperator::Add | InfixOperator::Subtract => 4,
            InfixOperator::Multiply | InfixOperator::Divide | InfixOperator::Modulo => 5,
            InfixOperator::Power => 6,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            InfixOperator::Or => "||",
            InfixOperator::And => "&&",
            InfixOperator::Equals => "==",
            InfixOperator::NotEquals => "!=",
            InfixOperator::LessThan => "<",
            InfixOperator::LessThanOrEqual => "<=",
            InfixOperator::GreaterThan => ">",
            InfixOperator::GreaterThanOrEqual => ">=",
            InfixOperator::Add => "+",
            InfixOperator::Subtract => "-",
            InfixOperator::Multiply => "*",
            InfixOperator::Divide => "/",
            InfixOperator::Modulo => "%",
            InfixOperator::Power => "^",
        }
    }

    /// The steps an operator may mean, in the order they are tried, with
    /// the list parameter that receives both operands.
    pub fn candidates(self) -> &'static [(&'static str, &'static str)] {
        match self {
            InfixOperator::Add => &[
                ("ArrayConcat", "Arrays"),
                ("Sum", "Terms"),
                ("DoubleSum", "Terms"),
                ("EntityCombine", "Terms"),
                ("StringJoin", "Strings"),
            ],
            InfixOperator::Subtract => &[("Subtract", "Terms"), ("DoubleSubtract", "Terms")],
            InfixOperator::Multiply => &[("Product", "Terms"), ("DoubleProduct", "Terms")],
            InfixOperator::Divide => &[("Divide", "Terms"), ("DoubleDivide", "Terms")],
            InfixOperator::Modulo => &[("Modulo", "Terms")],
            InfixOperator::Power => &[("Power", "Terms"), ("DoublePower", "Terms")],
            InfixOperator::And => &[("And", "Terms")],
            InfixOperator::Or => &[("Or", "Terms")],
            InfixOperator::Equals => &[("Equals", "Terms")],
            InfixOperator::NotEquals => &[("NotEquals", "Terms")],
            InfixOperator::LessThan => &[("LessThan", "Terms")],
            InfixOperator::LessThanOrEqual => &[("LessThanOrEqual", "Terms")],
            InfixOperator::GreaterThan => &[("GreaterThan", "Terms")],
            InfixOperator::GreaterThanOrEqual => &[("GreaterThanOrEqual", "Terms")],
        }
    }

    /// `left op right` as an option over every candidate step.
    pub fn build(self, left: FreezableStep, right: FreezableStep, location: TextLocation) -> FreezableStep {
        let options = self
            .candidates()
            .iter()
            .map(|(step, parameter)| {
                FreezableStep::Compound(
                    FreezableStepData::new(*step, location.clone()).with_property(
                        StepParameterReference::named(*parameter),
                        FreezableStepProperty::StepList {
                            steps: vec![left.clone(), right.clone()],
                            location: location.clone(),
                        },
                    ),
                )
            })
            .collect::<Vec<_>>();
        FreezableStep::Option {
            options: options.into(),
            location,
        }
    }
}
