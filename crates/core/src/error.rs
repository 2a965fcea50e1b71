//! Error codes, located errors, and combined error lists.
//!
//! An [`ErrorCode`] is an error that does not yet know where it happened
//! (the builder form). Attaching an [`ErrorLocation`] produces a
//! [`SingleError`]; an [`SclError`] is a non-empty list of those so that
//! independent checks can report every violation in one pass.

use std::fmt;

use crate::location::{ErrorLocation, TextLocation};

/// Every kind of error SCL can report, with its formatted arguments.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ErrorCode {
    #[error("Variable '{0}' does not exist.")]
    MissingVariable(String),
    #[error("Variable '{variable}' does not have type '{expected}'.")]
    WrongVariableType { variable: String, expected: String },
    #[error("Index was outside the bounds of the array.")]
    IndexOutOfBounds,
    #[error("Attempt to Divide by Zero.")]
    DivideByZero,
    #[error("Arithmetic overflow in '{0}'")]
    Overflow(String),
    #[error("Assertion Failed '{0}'")]
    AssertionFailed(String),
    #[error("Missing Parameter '{parameter}' in '{step}'")]
    MissingParameter { parameter: String, step: String },
    #[error("Duplicate Parameter: '{0}'")]
    DuplicateParameter(String),
    #[error("Unexpected Parameter '{parameter}' in '{step}'")]
    UnexpectedParameter { parameter: String, step: String },
    #[error("The step '{0}' does not exist")]
    StepDoesNotExist(String),
    #[error("'{parameter}' in '{step}' has type '{actual}' but should have type '{expected}'")]
    WrongType {
        step: String,
        parameter: String,
        expected: String,
        actual: String,
    },
    #[error("'{parameter}' in '{step}' should be {expected}")]
    WrongParameterKind {
        step: String,
        parameter: String,
        expected: String,
    },
    #[error("'{property}' with value {value} could not be converted to '{target}'")]
    InvalidCast {
        property: String,
        value: String,
        target: String,
    },
    #[error("Could not parse '{text}' as {target}")]
    CouldNotParse { text: String, target: String },
    #[error("Syntax Error: {0}")]
    SyntaxError(String),
    #[error("Schema violation: Unexpected property '{0}'")]
    SchemaViolationUnexpectedProperty(String),
    #[error("Schema violation: Missing property '{0}'")]
    SchemaViolationMissingProperty(String),
    #[error("Schema violation: Could not convert '{value}' to {target}")]
    SchemaViolationWrongType { value: String, target: String },
    #[error("Schema violation: '{value}' does not match regex '{regex}'")]
    SchemaViolationUnmatchedRegex { value: String, regex: String },
    #[error("Schema violation: Unexpected null value")]
    SchemaViolationUnexpectedNull,
    #[error("Schema violation: Expected a single value but got a list of {0} values")]
    SchemaViolationUnexpectedList(usize),
    #[error("Schema is invalid: enum property has no enum type name")]
    SchemaInvalidMissingEnum,
    #[error("Schema is invalid: enum type '{0}' has no values")]
    SchemaInvalidNoEnumValues(String),
    #[error("Schema is invalid: '{0}' is not a valid regex")]
    SchemaInvalidRegex(String),
    #[error("Schema is invalid: {0}")]
    SchemaInvalid(String),
    #[error("An SCL Sequence should have a final return type of Unit.")]
    SequenceFinalTypeNotUnit,
    #[error("'{0}' is not comparable and so cannot be used for sorting")]
    TypeNotComparable(String),
    #[error("Variable '{variable}' already has type '{existing}' and cannot be bound as '{requested}'")]
    ScopeConflict {
        variable: String,
        existing: String,
        requested: String,
    },
    #[error("Requirement '{requirement}' not met: {reason}")]
    RequirementsNotMet { requirement: String, reason: String },
    #[error("Execution was cancelled")]
    Cancelled,
    #[error("{0}")]
    Unknown(String),
}

impl ErrorCode {
    /// Attach a location, producing a reportable error.
    pub fn with_location(self, location: impl Into<ErrorLocation>) -> SclError {
        SclError::single(SingleError {
            code: self,
            location: location.into(),
        })
    }

    /// Attach the location of the step that raised this error.
    pub fn at_step(self, step_name: &str, text: &TextLocation) -> SclError {
        self.with_location(ErrorLocation::step(step_name, text))
    }

    /// An error with no location; the caller is expected to [`SclError::locate`] it.
    pub fn unlocated(self) -> SclError {
        self.with_location(ErrorLocation::none())
    }
}

/// One error with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleError {
    pub code: ErrorCode,
    pub location: ErrorLocation,
}

impl SingleError {
    pub fn as_string(&self) -> String {
        if self.location.is_none() {
            self.code.to_string()
        } else {
            format!("{} ({})", self.code, self.location)
        }
    }
}

/// A non-empty list of located errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", self.as_string())]
pub struct SclError {
    errors: Vec<SingleError>,
}

impl SclError {
    pub fn single(error: SingleError) -> Self {
        SclError {
            errors: vec![error],
        }
    }

    /// Merge several errors into one. Returns `None` when given nothing.
    pub fn combine(errors: impl IntoIterator<Item = SclError>) -> Option<SclError> {
        let all: Vec<SingleError> = errors.into_iter().flat_map(|e| e.errors).collect();
        if all.is_empty() {
            None
        } else {
            Some(SclError { errors: all })
        }
    }

    /// Ok when `errors` is empty, otherwise all of them combined.
    pub fn check(errors: Vec<SclError>) -> Result<(), SclError> {
        match SclError::combine(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn errors(&self) -> &[SingleError] {
        &self.errors
    }

    pub fn codes(&self) -> impl Iterator<Item = &ErrorCode> {
        self.errors.iter().map(|e| &e.code)
    }

    pub fn is_cancelled(&self) -> bool {
        self.codes().any(|c| matches!(c, ErrorCode::Cancelled))
    }

    /// Fill in the location of every error that does not have one yet.
    pub fn locate(mut self, location: &ErrorLocation) -> Self {
        for e in &mut self.errors {
            if e.location.is_none() {
                e.location = location.clone();
            }
        }
        self
    }

    /// Human readable diagnostic, one line per error.
    pub fn as_string(&self) -> String {
        self.errors
            .iter()
            .map(SingleError::as_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<SingleError> for SclError {
    fn from(error: SingleError) -> Self {
        SclError::single(error)
    }
}

impl fmt::Display for SingleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::TextPosition;

    #[test]
    fn as_string_includes_location_text() {
        let loc = TextLocation::new(
            "Print 123",
            TextPosition::new(1, 0, 0),
            TextPosition::new(1, 8, 8),
        );
        let err = ErrorCode::MissingVariable("x".to_string()).with_location(&loc);
        assert_eq!(
            err.as_string(),
            "Variable 'x' does not exist. (Line: 1, Col: 0, Idx: 0 - Line: 1, Col: 8, Idx: 8 Text: Print 123)"
        );
    }

    #[test]
    fn combine_keeps_every_error() {
        let a = ErrorCode::DivideByZero.unlocated();
        let b = ErrorCode::IndexOutOfBounds.unlocated();
        let combined = SclError::combine(vec![a, b]).unwrap();
        assert_eq!(combined.errors().len(), 2);
        assert!(SclError::combine(Vec::new()).is_none());
    }

    #[test]
    fn locate_only_fills_missing_locations() {
        let loc = TextLocation::new("x", TextPosition::new(2, 1, 5), TextPosition::new(2, 2, 6));
        let located = ErrorCode::DivideByZero.with_location(&loc);
        let unlocated = ErrorCode::IndexOutOfBounds.unlocated();
        let combined = SclError::combine(vec![located, unlocated])
            .unwrap()
            .locate(&ErrorLocation::step("Other", &TextLocation::empty()));
        assert_eq!(combined.errors()[0].location.text.as_ref(), Some(&loc));
        assert_eq!(
            combined.errors()[1].location.step_name.as_deref(),
            Some("Other")
        );
    }
}
