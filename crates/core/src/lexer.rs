use time::PrimitiveDateTime;

use crate::error::{ErrorCode, SclError};
use crate::location::{TextLocation, TextPosition};
use crate::value::date::parse_date;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Step names, enum type/member names, `true`/`false`/`null`
    Word(String),
    /// Quoted string literal (content without quotes, escapes resolved)
    Str(String),
    Int(i64),
    Double(f64),
    Date(PrimitiveDateTime),
    /// `<name>`
    Variable(String),
    /// `-` at the start of a line, introducing a sequence step
    Dash,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Comma,
    Dot,
    Arrow,  // =>
    Assign, // =
    // Infix operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    AndAnd,
    OrOr,
    EqEq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    // End of input
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub start: TextPosition,
    /// Position of the last character of the token (inclusive).
    pub stop: TextPosition,
}

struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    line: u32,
    column: u32,
    /// Only whitespace seen since the last newline.
    line_start: bool,
}

impl<'a> Lexer<'a> {
    fn at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn position(&self) -> TextPosition {
        TextPosition::new(self.line, self.column, self.pos)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.at(0)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
            self.line_start = true;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn err(&self, start: TextPosition, msg: impl Into<String>) -> SclError {
        let stop = self.position();
        let end = self.pos.min(self.chars.len());
        let text: String = self.chars[start.index.min(end)..end].iter().collect();
        ErrorCode::SyntaxError(msg.into()).with_location(&TextLocation::new(text, start, stop))
    }

    fn is_date_ahead(&self) -> bool {
        let shape = "dddd-dd-dd";
        shape.chars().enumerate().all(|(i, s)| match (s, self.at(i)) {
            ('d', Some(c)) => c.is_ascii_digit(),
            ('-', Some('-')) => true,
            _ => false,
        })
    }

    fn lex_date(&mut self, start: TextPosition) -> Result<Token, SclError> {
        let mut text = String::new();
        for _ in 0..10 {
            text.extend(self.bump());
        }
        if self.at(0) == Some('T') && self.at(1).is_some_and(|c| c.is_ascii_digit()) {
            while let Some(c) = self.at(0) {
                if c.is_ascii_digit() || c == ':' || c == '.' || c == 'T' {
                    text.extend(self.bump());
                } else {
                    break;
                }
            }
        }
        parse_date(&text, &[])
            .map(Token::Date)
            .ok_or_else(|| self.err(start, format!("invalid date '{}'", text)))
    }

    fn lex_number(&mut self, start: TextPosition) -> Result<Token, SclError> {
        let mut text = String::new();
        while let Some(c) = self.at(0).filter(char::is_ascii_digit) {
            self.bump();
            text.push(c);
        }
        if self.at(0) == Some('.') && self.at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.extend(self.bump());
            while let Some(c) = self.at(0).filter(char::is_ascii_digit) {
                self.bump();
                text.push(c);
            }
            return text
                .parse::<f64>()
                .map(Token::Double)
                .map_err(|_| self.err(start, format!("invalid number '{}'", text)));
        }
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| self.err(start, format!("integer '{}' is out of range", text)))
    }

    fn lex_single_quoted(&mut self, start: TextPosition) -> Result<Token, SclError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err(start, "unterminated string literal")),
                Some('\'') if self.at(0) == Some('\'') => {
                    self.bump();
                    s.push('\'');
                }
                Some('\'') => return Ok(Token::Str(s)),
                Some(c) => s.push(c),
            }
        }
    }

    fn lex_double_quoted(&mut self, start: TextPosition) -> Result<Token, SclError> {
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.err(start, "unterminated string literal")),
                Some('"') => return Ok(Token::Str(s)),
                Some('\\') => match self.bump() {
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some(other) => {
                        s.push('\\');
                        s.push(other);
                    }
                    None => return Err(self.err(start, "unterminated escape in string")),
                },
                Some(c) => s.push(c),
            }
        }
    }
}

fn two(token: Token, lx: &mut Lexer<'_>) -> Token {
    lx.bump();
    token
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, SclError> {
    let chars: Vec<char> = src.chars().collect();
    let mut lx = Lexer {
        chars: &chars,
        pos: 0,
        line: 1,
        column: 0,
        line_start: true,
    };
    let mut tokens = Vec::new();

    while let Some(c) = lx.at(0) {
        // Line comment
        if c == '#' {
            while lx.at(0).is_some_and(|c| c != '\n') {
                lx.bump();
            }
            continue;
        }

        // Block comment
        if c == '/' && lx.at(1) == Some('*') {
            let start = lx.position();
            lx.bump();
            lx.bump();
            loop {
                match (lx.at(0), lx.at(1)) {
                    (Some('*'), Some('/')) => {
                        lx.bump();
                        lx.bump();
                        break;
                    }
                    (Some(_), _) => {
                        lx.bump();
                    }
                    (None, _) => return Err(lx.err(start, "unterminated block comment")),
                }
            }
            continue;
        }

        // Whitespace
        if c.is_whitespace() {
            lx.bump();
            continue;
        }

        let start = lx.position();
        let at_line_start = lx.line_start;
        lx.line_start = false;

        let token = if c == '-' && at_line_start && lx.at(1).map_or(true, char::is_whitespace) {
            lx.bump();
            Token::Dash
        } else if c.is_ascii_digit() {
            if lx.is_date_ahead() {
                lx.lex_date(start)?
            } else {
                lx.lex_number(start)?
            }
        } else if c == '\'' {
            lx.lex_single_quoted(start)?
        } else if c == '"' {
            lx.lex_double_quoted(start)?
        } else if is_ident_start(c) {
            let mut w = String::new();
            while let Some(c) = lx.at(0).filter(|c| is_ident_char(*c)) {
                lx.bump();
                w.push(c);
            }
            Token::Word(w)
        } else if c == '<' && lx.at(1).is_some_and(is_ident_start) {
            // `<name>` is a variable; otherwise fall back to the operator
            let mut len = 1;
            while lx.at(len).is_some_and(is_ident_char) {
                len += 1;
            }
            if lx.at(len) == Some('>') {
                lx.bump();
                let mut name = String::new();
                for _ in 1..len {
                    name.extend(lx.bump());
                }
                lx.bump();
                Token::Variable(name)
            } else {
                lx.bump();
                Token::Lt
            }
        } else {
            lx.bump();
            let next = lx.at(0);
            match (c, next) {
                ('(', _) => Token::LParen,
                (')', _) => Token::RParen,
                ('[', _) => Token::LBracket,
                (']', _) => Token::RBracket,
                (':', _) => Token::Colon,
                (',', _) => Token::Comma,
                ('.', _) => Token::Dot,
                ('=', Some('>')) => two(Token::Arrow, &mut lx),
                ('=', Some('=')) => two(Token::EqEq, &mut lx),
                ('=', _) => Token::Assign,
                ('!', Some('=')) => two(Token::Neq, &mut lx),
                ('<', Some('=')) => two(Token::Lte, &mut lx),
                ('<', _) => Token::Lt,
                ('>', Some('=')) => two(Token::Gte, &mut lx),
                ('>', _) => Token::Gt,
                ('&', Some('&')) => two(Token::AndAnd, &mut lx),
                ('|', Some('|')) => two(Token::OrOr, &mut lx),
                ('+', _) => Token::Plus,
                ('-', _) => Token::Minus,
                ('*', _) => Token::Star,
                ('/', _) => Token::Slash,
                ('%', _) => Token::Percent,
                ('^', _) => Token::Caret,
                (other, _) => {
                    return Err(lx.err(start, format!("unexpected character '{}'", other)))
                }
            }
        };

        let stop = TextPosition::new(
            lx.line,
            lx.column.saturating_sub(1),
            lx.pos.saturating_sub(1),
        );
        tokens.push(Spanned { token, start, stop });
    }

    let end = lx.position();
    tokens.push(Spanned {
        token: Token::Eof,
        start: end,
        stop: end,
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn step_with_arguments() {
        assert_eq!(
            kinds("Print Value: 'it''s'"),
            vec![
                Token::Word("Print".into()),
                Token::Word("Value".into()),
                Token::Colon,
                Token::Str("it's".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn sequence_dashes_only_at_line_start() {
        assert_eq!(
            kinds("- 3 - 1\n- <x>"),
            vec![
                Token::Dash,
                Token::Int(3),
                Token::Minus,
                Token::Int(1),
                Token::Dash,
                Token::Variable("x".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn operators_and_variables() {
        assert_eq!(
            kinds("<a> <= 2.5 && <b> => <c> != 1"),
            vec![
                Token::Variable("a".into()),
                Token::Lte,
                Token::Double(2.5),
                Token::AndAnd,
                Token::Variable("b".into()),
                Token::Arrow,
                Token::Variable("c".into()),
                Token::Neq,
                Token::Int(1),
                Token::Eof
            ]
        );
        assert_eq!(
            kinds("1 < 2"),
            vec![Token::Int(1), Token::Lt, Token::Int(2), Token::Eof]
        );
    }

    #[test]
    fn dates_and_comments() {
        let tokens = kinds("2020-01-03T04:05:06 # trailing\n/* block */ 7");
        assert!(matches!(tokens[0], Token::Date(_)));
        assert_eq!(tokens[1], Token::Int(7));
    }

    #[test]
    fn double_quoted_escapes() {
        assert_eq!(
            kinds(r#""a\"b\n""#),
            vec![Token::Str("a\"b\n".into()), Token::Eof]
        );
    }

    #[test]
    fn positions_are_tracked() {
        let tokens = lex("Print 123").unwrap();
        assert_eq!(tokens[1].start, TextPosition::new(1, 6, 6));
        assert_eq!(tokens[1].stop, TextPosition::new(1, 8, 8));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(lex("'abc").is_err());
    }
}
