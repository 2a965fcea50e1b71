//! Source positions attached to every parsed node and every error.

use std::fmt;

/// A single point in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct TextPosition {
    /// 1-based line number
    pub line: u32,
    /// 0-based column within the line
    pub column: u32,
    /// 0-based character offset from the start of the text
    pub index: usize,
}

impl TextPosition {
    pub fn new(line: u32, column: u32, index: usize) -> Self {
        TextPosition {
            line,
            column,
            index,
        }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Line: {}, Col: {}, Idx: {}",
            self.line, self.column, self.index
        )
    }
}

/// A span of source text: the covered text plus its start and stop points.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct TextLocation {
    pub text: String,
    pub start: TextPosition,
    pub stop: TextPosition,
}

impl TextLocation {
    pub fn new(text: impl Into<String>, start: TextPosition, stop: TextPosition) -> Self {
        TextLocation {
            text: text.into(),
            start,
            stop,
        }
    }

    /// A location for nodes that were not produced by the parser.
    pub fn empty() -> Self {
        TextLocation::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.start == self.stop
    }
}

impl fmt::Display for TextLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} Text: {}", self.start, self.stop, self.text)
    }
}

/// Where an error happened: the step being frozen or run, and its source span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorLocation {
    pub step_name: Option<String>,
    pub text: Option<TextLocation>,
}

impl ErrorLocation {
    pub fn none() -> Self {
        ErrorLocation::default()
    }

    pub fn step(step_name: impl Into<String>, text: &TextLocation) -> Self {
        ErrorLocation {
            step_name: Some(step_name.into()),
            text: if text.is_empty() {
                None
            } else {
                Some(text.clone())
            },
        }
    }

    pub fn is_none(&self) -> bool {
        self.step_name.is_none() && self.text.is_none()
    }
}

impl From<&TextLocation> for ErrorLocation {
    fn from(text: &TextLocation) -> Self {
        ErrorLocation {
            step_name: None,
            text: Some(text.clone()),
        }
    }
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.text, &self.step_name) {
            (Some(text), _) => write!(f, "{}", text),
            (None, Some(step)) => write!(f, "{}", step),
            (None, None) => write!(f, "No Location"),
        }
    }
}
