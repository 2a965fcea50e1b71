//! SCL parser: tokens to the freezable step tree.
//!
//! Every node carries the source span it was parsed from. Step names and
//! types are not resolved here.

use crate::ast::{
    FreezableLambda, FreezableStep, FreezableStepData, FreezableStepProperty,
    StepParameterReference,
};
use crate::error::{ErrorCode, SclError};
use crate::lexer::{lex, Spanned, Token};
use crate::location::TextLocation;
use crate::types::VariableName;
use crate::value::{SclEnum, SclObject};

mod operators;

pub use operators::InfixOperator;

/// Names of the steps the parser produces for built-in syntax.
pub const SEQUENCE: &str = "Sequence";
pub const ARRAY_NEW: &str = "ArrayNew";
pub const GET_VARIABLE: &str = "GetVariable";
pub const SET_VARIABLE: &str = "SetVariable";

pub fn parse(text: &str) -> Result<FreezableStep, SclError> {
    let tokens = lex(text)?;
    let chars: Vec<char> = text.chars().collect();
    let mut p = Parser::new(&tokens, &chars);
    p.parse_program()
}

/// `[a, b]` outside argument position.
pub fn array_new_step(elements: Vec<FreezableStep>, location: TextLocation) -> FreezableStep {
    FreezableStep::Compound(
        FreezableStepData::new(ARRAY_NEW, location.clone()).with_property(
            StepParameterReference::named("Elements"),
            FreezableStepProperty::StepList {
                steps: elements,
                location,
            },
        ),
    )
}

/// `<name>` outside argument position.
pub fn get_variable_step(name: VariableName, location: TextLocation) -> FreezableStep {
    FreezableStep::Compound(
        FreezableStepData::new(GET_VARIABLE, location.clone()).with_property(
            StepParameterReference::named("Variable"),
            FreezableStepProperty::Variable { name, location },
        ),
    )
}

/// An argument-position form. Arrays, variables and lambdas are kept
/// distinct so step arguments can use them directly.
enum Term {
    Step(FreezableStep),
    Array {
        elements: Vec<FreezableStep>,
        location: TextLocation,
    },
    Variable {
        name: VariableName,
        location: TextLocation,
    },
    Lambda(FreezableLambda),
}

impl Term {
    fn into_step(self) -> Result<FreezableStep, SclError> {
        match self {
            Term::Step(s) => Ok(s),
            Term::Array { elements, location } => Ok(array_new_step(elements, location)),
            Term::Variable { name, location } => Ok(get_variable_step(name, location)),
            Term::Lambda(l) => Err(ErrorCode::SyntaxError(
                "a lambda can only be used as a step argument".to_string(),
            )
            .with_location(&l.location)),
        }
    }

    fn into_property(self) -> FreezableStepProperty {
        match self {
            Term::Step(s) => FreezableStepProperty::Step(Box::new(s)),
            Term::Array { elements, location } => FreezableStepProperty::StepList {
                steps: elements,
                location,
            },
            Term::Variable { name, location } => FreezableStepProperty::Variable { name, location },
            Term::Lambda(l) => FreezableStepProperty::Lambda(l),
        }
    }
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Spanned],
    source: &'a [char],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Spanned], source: &'a [char]) -> Self {
        Parser {
            tokens,
            source,
            pos: 0,
        }
    }

    fn cur(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.cur().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].token
    }

    fn advance(&mut self) -> &Spanned {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), SclError> {
        if *self.peek() == token {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {}, got {}", what, describe(self.peek()))))
        }
    }

    fn err(&self, msg: impl Into<String>) -> SclError {
        let location = self.span_tokens(self.pos, self.pos);
        ErrorCode::SyntaxError(msg.into()).with_location(&location)
    }

    /// Source span from token `start` through the last consumed token.
    fn span(&self, start: usize) -> TextLocation {
        self.span_tokens(start, self.pos.saturating_sub(1).max(start))
    }

    fn span_tokens(&self, first: usize, last: usize) -> TextLocation {
        let last_index = self.tokens.len() - 1;
        let from = &self.tokens[first.min(last_index)];
        let to = &self.tokens[last.min(last_index)];
        let end = (to.stop.index + 1).min(self.source.len());
        let begin = from.start.index.min(end);
        let text: String = self.source[begin..end].iter().collect();
        TextLocation::new(text, from.start, to.stop)
    }

    // ──────────────────────────────────────────────
    // Program structure
    // ──────────────────────────────────────────────

    fn parse_program(&mut self) -> Result<FreezableStep, SclError> {
        if *self.peek() == Token::Dash {
            return self.parse_sequence();
        }
        let step = self.parse_expression()?;
        self.expect(Token::Eof, "end of input")?;
        Ok(step)
    }

    fn parse_sequence(&mut self) -> Result<FreezableStep, SclError> {
        let start = self.pos;
        let mut steps = Vec::new();
        while *self.peek() == Token::Dash {
            self.advance();
            steps.push(self.parse_expression()?);
        }
        self.expect(Token::Eof, "'-' or end of input")?;
        let location = self.span(start);
        let final_step = match steps.pop() {
            Some(s) => s,
            None => return Err(self.err("empty sequence")),
        };
        Ok(FreezableStep::Compound(
            FreezableStepData::new(SEQUENCE, location.clone())
                .with_property(
                    StepParameterReference::named("InitialSteps"),
                    FreezableStepProperty::StepList {
                        steps,
                        location,
                    },
                )
                .with_property(
                    StepParameterReference::named("FinalStep"),
                    FreezableStepProperty::Step(Box::new(final_step)),
                ),
        ))
    }

    fn parse_expression(&mut self) -> Result<FreezableStep, SclError> {
        if let (Token::Variable(name), Token::Assign) = (self.peek(), self.peek_at(1)) {
            let start = self.pos;
            let name = VariableName::new(name.clone());
            let name_location = self.span_tokens(start, start);
            self.advance();
            self.advance();
            let value = self.parse_expression()?;
            return Ok(FreezableStep::Compound(
                FreezableStepData::new(SET_VARIABLE, self.span(start))
                    .with_property(
                        StepParameterReference::named("Variable"),
                        FreezableStepProperty::Variable {
                            name,
                            location: name_location,
                        },
                    )
                    .with_property(
                        StepParameterReference::named("Value"),
                        FreezableStepProperty::Step(Box::new(value)),
                    ),
            ));
        }
        self.parse_binary(1, true)
    }

    /// Operators with precedence of at least `min_precedence`. When
    /// `allow_calls` is false operands are terms only, so an entity value
    /// such as `a: 1 + 2 b: 3` stops before `b`.
    fn parse_binary(&mut self, min_precedence: u8, allow_calls: bool) -> Result<FreezableStep, SclError> {
        let start = self.pos;
        let mut left = self.parse_operand(allow_calls)?;
        while let Some(op) = InfixOperator::from_token(self.peek()) {
            if op.precedence() < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_binary(op.precedence() + 1, allow_calls)?;
            left = op.build(left, right, self.span(start));
        }
        Ok(left)
    }

    fn parse_operand(&mut self, allow_calls: bool) -> Result<FreezableStep, SclError> {
        if allow_calls && self.at_step_call() {
            return self.parse_step_call();
        }
        self.parse_term()?.into_step()
    }

    fn at_step_call(&self) -> bool {
        match self.peek() {
            Token::Word(w) => !is_keyword(w) && *self.peek_at(1) != Token::Dot,
            _ => false,
        }
    }

    // ──────────────────────────────────────────────
    // Step calls
    // ──────────────────────────────────────────────

    fn parse_step_call(&mut self) -> Result<FreezableStep, SclError> {
        let start = self.pos;
        let name = match self.advance().token.clone() {
            Token::Word(w) => w,
            other => return Err(self.err(format!("expected a step name, got {}", describe(&other)))),
        };
        let mut data = FreezableStepData::new(name, TextLocation::empty());
        let mut position = 0;
        let mut named_seen = false;
        loop {
            if let (Token::Word(arg), Token::Colon) = (self.peek(), self.peek_at(1)) {
                let arg_start = self.pos;
                let arg = arg.clone();
                self.advance();
                self.advance();
                let value = self.parse_term()?.into_property();
                let reference = StepParameterReference::Named(arg.clone());
                if data.properties.contains_key(&reference) {
                    return Err(ErrorCode::DuplicateParameter(arg).with_location(&self.span(arg_start)));
                }
                data.properties.insert(reference, value);
                named_seen = true;
                continue;
            }
            if !named_seen && self.starts_term() {
                let value = self.parse_term()?.into_property();
                data.properties
                    .insert(StepParameterReference::Index(position), value);
                position += 1;
                continue;
            }
            break;
        }
        data.location = self.span(start);
        Ok(FreezableStep::Compound(data))
    }

    fn starts_term(&self) -> bool {
        match self.peek() {
            Token::Int(_)
            | Token::Double(_)
            | Token::Str(_)
            | Token::Date(_)
            | Token::Variable(_)
            | Token::LBracket
            | Token::LParen
            | Token::Word(_) => true,
            Token::Minus => self.negative_number_ahead(),
            _ => false,
        }
    }

    /// `-` immediately followed by a number literal.
    fn negative_number_ahead(&self) -> bool {
        let next = &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)];
        matches!(next.token, Token::Int(_) | Token::Double(_))
            && next.start.index == self.cur().stop.index + 1
    }

    // ──────────────────────────────────────────────
    // Terms
    // ──────────────────────────────────────────────

    fn parse_term(&mut self) -> Result<Term, SclError> {
        let start = self.pos;
        let constant = |value: SclObject, p: &Self| {
            Ok(Term::Step(FreezableStep::Constant {
                value,
                location: p.span(start),
            }))
        };
        match self.peek().clone() {
            Token::Int(i) => {
                self.advance();
                constant(SclObject::Int(i), self)
            }
            Token::Double(d) => {
                self.advance();
                constant(SclObject::Double(d), self)
            }
            Token::Str(s) => {
                self.advance();
                constant(SclObject::String(s), self)
            }
            Token::Date(d) => {
                self.advance();
                constant(SclObject::Date(d), self)
            }
            Token::Minus if self.negative_number_ahead() => {
                self.advance();
                match self.advance().token.clone() {
                    Token::Int(i) => constant(SclObject::Int(-i), self),
                    Token::Double(d) => constant(SclObject::Double(-d), self),
                    other => Err(self.err(format!("expected a number, got {}", describe(&other)))),
                }
            }
            Token::Variable(name) => {
                self.advance();
                let name = VariableName::new(name);
                if *self.peek() == Token::Arrow {
                    self.advance();
                    let body = self.parse_expression()?;
                    return Ok(Term::Lambda(FreezableLambda {
                        variable: Some(name),
                        body: Box::new(body),
                        location: self.span(start),
                    }));
                }
                Ok(Term::Variable {
                    name,
                    location: self.span(start),
                })
            }
            Token::LBracket => self.parse_array(),
            Token::LParen => self.parse_paren(),
            Token::Word(w) => {
                self.advance();
                match w.as_str() {
                    "true" => return constant(SclObject::Bool(true), self),
                    "false" => return constant(SclObject::Bool(false), self),
                    "null" => return constant(SclObject::Null, self),
                    _ => {}
                }
                if *self.peek() == Token::Dot {
                    self.advance();
                    let member = match self.advance().token.clone() {
                        Token::Word(m) => m,
                        other => {
                            return Err(self.err(format!(
                                "expected an enum member after '{}.', got {}",
                                w,
                                describe(&other)
                            )))
                        }
                    };
                    return constant(SclObject::Enum(SclEnum::new(w, member)), self);
                }
                Ok(Term::Step(FreezableStep::Compound(FreezableStepData::new(
                    w,
                    self.span(start),
                ))))
            }
            other => Err(self.err(format!("unexpected {}", describe(&other)))),
        }
    }

    fn parse_array(&mut self) -> Result<Term, SclError> {
        let start = self.pos;
        self.expect(Token::LBracket, "'['")?;
        let mut elements = Vec::new();
        while *self.peek() != Token::RBracket {
            elements.push(self.parse_expression()?);
            if *self.peek() == Token::Comma {
                self.advance();
            } else if *self.peek() != Token::RBracket {
                return Err(self.err(format!("expected ',' or ']', got {}", describe(self.peek()))));
            }
        }
        self.advance();
        Ok(Term::Array {
            elements,
            location: self.span(start),
        })
    }

    fn parse_paren(&mut self) -> Result<Term, SclError> {
        let start = self.pos;
        self.expect(Token::LParen, "'('")?;

        let entity_ahead = matches!(
            (self.peek(), self.peek_at(1)),
            (Token::RParen, _) | (Token::Word(_) | Token::Str(_), Token::Colon)
        );
        if entity_ahead {
            let mut properties = Vec::new();
            while *self.peek() != Token::RParen {
                let key = match self.advance().token.clone() {
                    Token::Word(k) | Token::Str(k) => k,
                    other => {
                        return Err(self.err(format!(
                            "expected a property name, got {}",
                            describe(&other)
                        )))
                    }
                };
                self.expect(Token::Colon, "':'")?;
                let value = self.parse_binary(1, false)?;
                properties.push((key, value));
                if *self.peek() == Token::Comma {
                    self.advance();
                }
            }
            self.advance();
            return Ok(Term::Step(FreezableStep::CreateEntity {
                properties,
                location: self.span(start),
            }));
        }

        if let (Token::Variable(_), Token::Arrow) = (self.peek(), self.peek_at(1)) {
            let lambda = self.parse_term()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(lambda);
        }

        let inner = self.parse_expression()?;
        self.expect(Token::RParen, "')'")?;
        Ok(Term::Step(inner))
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(word, "true" | "false" | "null")
}

fn describe(token: &Token) -> String {
    match token {
        Token::Word(w) => format!("'{}'", w),
        Token::Str(s) => format!("string '{}'", s),
        Token::Int(i) => format!("'{}'", i),
        Token::Double(d) => format!("'{}'", d),
        Token::Date(_) => "a date".to_string(),
        Token::Variable(v) => format!("'<{}>'", v),
        Token::Eof => "end of input".to_string(),
        Token::Dash => "'-'".to_string(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compound(step: &FreezableStep) -> &FreezableStepData {
        match step {
            FreezableStep::Compound(d) => d,
            other => panic!("expected a step call, got {:?}", other),
        }
    }

    fn prop<'a>(data: &'a FreezableStepData, name: &str) -> &'a FreezableStepProperty {
        data.properties
            .get(&StepParameterReference::named(name))
            .unwrap_or_else(|| panic!("no property {}", name))
    }

    #[test]
    fn positional_argument() {
        let step = parse("Print 123").unwrap();
        let data = compound(&step);
        assert_eq!(data.step_name, "Print");
        assert_eq!(data.location.text, "Print 123");
        match data.properties.get(&StepParameterReference::Index(0)) {
            Some(FreezableStepProperty::Step(s)) => assert!(matches!(
                **s,
                FreezableStep::Constant {
                    value: SclObject::Int(123),
                    ..
                }
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn named_arguments_match_case_insensitively() {
        let step = parse("Print value: 'x'").unwrap();
        let data = compound(&step);
        assert!(data
            .properties
            .contains_key(&StepParameterReference::named("Value")));
    }

    #[test]
    fn duplicate_named_argument_is_rejected() {
        let err = parse("Print Value: 1 value: 2").unwrap_err();
        assert!(matches!(
            err.codes().next(),
            Some(ErrorCode::DuplicateParameter(name)) if name == "value"
        ));
    }

    #[test]
    fn sequence_builds_initial_and_final_steps() {
        let step = parse("- <x> = 1\n- Print <x>").unwrap();
        let data = compound(&step);
        assert_eq!(data.step_name, SEQUENCE);
        match prop(data, "InitialSteps") {
            FreezableStepProperty::StepList { steps, .. } => {
                assert_eq!(steps.len(), 1);
                assert_eq!(compound(&steps[0]).step_name, SET_VARIABLE);
            }
            other => panic!("unexpected {:?}", other),
        }
        match prop(data, "FinalStep") {
            FreezableStepProperty::Step(s) => assert_eq!(compound(s).step_name, "Print"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn infix_becomes_option_over_candidates() {
        let step = parse("2 * 3.0").unwrap();
        match step {
            FreezableStep::Option { options, location } => {
                assert_eq!(location.text, "2 * 3.0");
                let names: Vec<String> = options.iter().map(FreezableStep::step_name).collect();
                assert_eq!(names, vec!["Product", "DoubleProduct"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let step = parse("1 + 2 * 3").unwrap();
        let FreezableStep::Option { options, .. } = step else {
            panic!("expected an option");
        };
        let sum = compound(&options[1]);
        assert_eq!(sum.step_name, "Sum");
        match prop(sum, "Terms") {
            FreezableStepProperty::StepList { steps, .. } => {
                assert!(matches!(steps[0], FreezableStep::Constant { .. }));
                assert!(matches!(steps[1], FreezableStep::Option { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn array_argument_is_a_step_list() {
        let step = parse("ArrayLength [1, 2, 3]").unwrap();
        match compound(&step).properties.get(&StepParameterReference::Index(0)) {
            Some(FreezableStepProperty::StepList { steps, .. }) => assert_eq!(steps.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
        let standalone = parse("[1, 2]").unwrap();
        assert_eq!(compound(&standalone).step_name, ARRAY_NEW);
    }

    #[test]
    fn lambdas_and_variables() {
        let step = parse("ForEach <list> (<x> => Print <x>)").unwrap();
        let data = compound(&step);
        assert!(matches!(
            data.properties.get(&StepParameterReference::Index(0)),
            Some(FreezableStepProperty::Variable { .. })
        ));
        match data.properties.get(&StepParameterReference::Index(1)) {
            Some(FreezableStepProperty::Lambda(l)) => {
                assert_eq!(l.variable, Some(VariableName::new("x")));
                assert_eq!(compound(&l.body).step_name, "Print");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn entity_literal() {
        let step = parse("Print (a: 1 'b c': 'x', d: (e: true))").unwrap();
        match compound(&step).properties.get(&StepParameterReference::Index(0)) {
            Some(FreezableStepProperty::Step(s)) => match &**s {
                FreezableStep::CreateEntity { properties, .. } => {
                    let keys: Vec<&str> = properties.iter().map(|(k, _)| k.as_str()).collect();
                    assert_eq!(keys, vec!["a", "b c", "d"]);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn enums_and_negative_numbers() {
        let step = parse("Print ErrorBehaviour.Skip").unwrap();
        match compound(&step).properties.get(&StepParameterReference::Index(0)) {
            Some(FreezableStepProperty::Step(s)) => assert!(matches!(
                &**s,
                FreezableStep::Constant { value: SclObject::Enum(e), .. } if e.value == "Skip"
            )),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse("-5").unwrap(),
            FreezableStep::Constant {
                value: SclObject::Int(-5),
                ..
            }
        ));
    }

    #[test]
    fn syntax_errors_carry_locations() {
        let err = parse("Print (1").unwrap_err();
        assert!(matches!(err.codes().next(), Some(ErrorCode::SyntaxError(_))));
        assert!(err.errors()[0].location.text.is_some());
    }
}
