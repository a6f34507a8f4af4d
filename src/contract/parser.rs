// ABOUTME: Tokenizer and recursive-descent parser for contract expressions
// ABOUTME: Accepts comparisons over dotted config paths with and/or/not and Python-style literals

use super::ast::{CompareOp, ConfigPath, Expr};
use super::error::{ContractError, Result};
use crate::parser::ConfigValue;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(Vec<String>),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    None,
    And,
    Or,
    Not,
    In,
    Op(CompareOp),
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> ContractError {
    ContractError::Syntax {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, ch) = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let single = match ch {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '-' => Some(Token::Minus),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push(Spanned { token, position: pos });
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).map(|&(_, c)| c);
        let two_char = match (ch, next) {
            ('=', Some('=')) => Some(CompareOp::Eq),
            ('!', Some('=')) => Some(CompareOp::Ne),
            ('<', Some('=')) => Some(CompareOp::Le),
            ('>', Some('=')) => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = two_char {
            tokens.push(Spanned {
                token: Token::Op(op),
                position: pos,
            });
            i += 2;
            continue;
        }
        match ch {
            '<' => {
                tokens.push(Spanned {
                    token: Token::Op(CompareOp::Lt),
                    position: pos,
                });
                i += 1;
                continue;
            }
            '>' => {
                tokens.push(Spanned {
                    token: Token::Op(CompareOp::Gt),
                    position: pos,
                });
                i += 1;
                continue;
            }
            _ => {}
        }

        if ch == '"' || ch == '\'' {
            let quote = ch;
            let mut value = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(syntax(pos, "unterminated string literal")),
                    Some(&(_, c)) if c == quote => {
                        i += 1;
                        break;
                    }
                    Some(&(_, '\\')) => {
                        match chars.get(i + 1) {
                            Some(&(_, escaped)) => value.push(escaped),
                            None => return Err(syntax(pos, "unterminated string literal")),
                        }
                        i += 2;
                    }
                    Some(&(_, c)) => {
                        value.push(c);
                        i += 1;
                    }
                }
            }
            tokens.push(Spanned {
                token: Token::Str(value),
                position: pos,
            });
            continue;
        }

        if ch.is_ascii_digit() {
            let start = i;
            let mut seen_dot = false;
            let mut seen_exp = false;
            while let Some(&(_, c)) = chars.get(i) {
                if c.is_ascii_digit() {
                    i += 1;
                } else if c == '.' && !seen_dot && !seen_exp {
                    seen_dot = true;
                    i += 1;
                } else if (c == 'e' || c == 'E') && !seen_exp {
                    seen_exp = true;
                    i += 1;
                    if let Some(&(_, sign)) = chars.get(i) {
                        if sign == '+' || sign == '-' {
                            i += 1;
                        }
                    }
                } else {
                    break;
                }
            }
            let is_float = seen_dot || seen_exp;
            let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
            let token = if is_float {
                Token::Float(
                    text.parse()
                        .map_err(|_| syntax(pos, format!("invalid number '{}'", text)))?,
                )
            } else {
                Token::Int(
                    text.parse()
                        .map_err(|_| syntax(pos, format!("invalid number '{}'", text)))?,
                )
            };
            tokens.push(Spanned {
                token,
                position: pos,
            });
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut segments = vec![String::new()];
            while let Some(&(_, c)) = chars.get(i) {
                if c.is_ascii_alphanumeric() || c == '_' {
                    if let Some(last) = segments.last_mut() {
                        last.push(c);
                    }
                    i += 1;
                } else if c == '.' {
                    segments.push(String::new());
                    i += 1;
                } else {
                    break;
                }
            }
            if segments.iter().any(|s| s.is_empty()) {
                return Err(syntax(pos, "empty segment in config path"));
            }

            let token = if segments.len() == 1 {
                match segments[0].as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "True" | "true" => Token::True,
                    "False" | "false" => Token::False,
                    "None" | "null" => Token::None,
                    _ => Token::Ident(segments),
                }
            } else {
                Token::Ident(segments)
            };
            tokens.push(Spanned {
                token,
                position: pos,
            });
            continue;
        }

        return Err(syntax(pos, format!("unexpected character '{}'", ch)));
    }

    Ok(tokens)
}

/// Maximum nesting of parentheses, `not` and list literals.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax(
                self.position(),
                format!("expression nests deeper than {} levels", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|t| &t.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset).map(|t| &t.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|t| t.position)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|t| t.token.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<()> {
        let position = self.position();
        match self.advance() {
            Some(ref token) if *token == expected => Ok(()),
            Some(token) => Err(syntax(position, format!("expected {}, found {:?}", what, token))),
            None => Err(syntax(position, format!("expected {}, found end of input", what))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            self.descend()?;
            let inner = self.parse_not()?;
            self.ascend();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_operand()?;

        let op = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Op(op)), _) => Some(*op),
            (Some(Token::In), _) => Some(CompareOp::In),
            (Some(Token::Not), Some(Token::In)) => Some(CompareOp::NotIn),
            _ => None,
        };

        let Some(op) = op else {
            return Ok(left);
        };

        self.advance();
        if op == CompareOp::NotIn {
            self.advance();
        }

        let right = self.parse_operand()?;

        if let Some(Token::Op(_) | Token::In) = self.peek() {
            return Err(syntax(
                self.position(),
                "chained comparisons are not supported",
            ));
        }

        Ok(Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        let position = self.position();
        match self.advance() {
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen, "')'")?;
                self.ascend();
                Ok(inner)
            }
            Some(Token::Ident(segments)) => {
                if segments.len() < 2 {
                    return Err(syntax(
                        position,
                        format!(
                            "'{}' is not a config path; expected '<task>.<field>'",
                            segments.join(".")
                        ),
                    ));
                }
                let mut segments = segments.into_iter();
                let task = segments.next().unwrap_or_default();
                Ok(Expr::Path(ConfigPath::new(task, segments.collect())))
            }
            Some(_) => {
                self.cursor -= 1;
                self.parse_literal().map(Expr::Literal)
            }
            None => Err(syntax(position, "unexpected end of input")),
        }
    }

    fn parse_literal(&mut self) -> Result<ConfigValue> {
        let position = self.position();
        match self.advance() {
            Some(Token::True) => Ok(ConfigValue::Bool(true)),
            Some(Token::False) => Ok(ConfigValue::Bool(false)),
            Some(Token::None) => Ok(ConfigValue::Null),
            Some(Token::Str(s)) => Ok(ConfigValue::String(s)),
            Some(Token::Int(i)) => Ok(ConfigValue::Int(i)),
            Some(Token::Float(f)) => Ok(ConfigValue::Float(f)),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Int(i)) => Ok(ConfigValue::Int(-i)),
                Some(Token::Float(f)) => Ok(ConfigValue::Float(-f)),
                _ => Err(syntax(position, "'-' must be followed by a number")),
            },
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.advance();
                    return Ok(ConfigValue::List(items));
                }
                self.descend()?;
                loop {
                    items.push(self.parse_literal()?);
                    match self.advance() {
                        Some(Token::Comma) => {
                            if self.peek() == Some(&Token::RBracket) {
                                self.advance();
                                break;
                            }
                        }
                        Some(Token::RBracket) => break,
                        _ => return Err(syntax(self.position(), "expected ',' or ']' in list")),
                    }
                }
                self.ascend();
                Ok(ConfigValue::List(items))
            }
            Some(token) => Err(syntax(position, format!("expected a literal, found {:?}", token))),
            None => Err(syntax(position, "expected a literal, found end of input")),
        }
    }
}

/// Parse a contract expression such as `isr.doFringe == False`.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(syntax(0, "empty expression"));
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_or()?;

    if parser.cursor < parser.tokens.len() {
        let position = parser.position();
        return Err(syntax(
            position,
            format!("unexpected trailing input {:?}", parser.tokens[parser.cursor].token),
        ));
    }

    Ok(expr)
}
