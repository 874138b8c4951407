//! Recursive-descent parser for the signature-policy text form.
//!
//! ```text
//! policy    := principal | gate
//! gate      := ("AND" | "OR") "(" policy ("," policy)* ")"
//!            | "OutOf" "(" INT "," policy ("," policy)* ")"
//! principal := "'" ORG "." ROLE "'"
//! ```
//!
//! Operators are case-insensitive; principals may use single or double quotes.

use super::{Policy, Role};
use crate::protocol::error::{EndorseError, Result};

/// Deepest gate nesting accepted. Evaluation and `Drop` recurse over the
/// tree, so deeper input is rejected before it is built.
pub const MAX_POLICY_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Quoted(String),
    Int(usize),
    LParen,
    RParen,
    Comma,
}

/// Parses a policy expression into a [`Policy`] tree.
///
/// # Errors
///
/// Returns [`EndorseError::MalformedPolicy`] for any syntactically invalid
/// input, including `OutOf` thresholds of zero or above the child count and
/// gates nested more than [`MAX_POLICY_DEPTH`] levels deep.
///
/// # Example
///
/// ```
/// use endorse_common::policy::parse;
///
/// let policy = parse("OR('Org1MSP.member', 'Org2MSP.member')").unwrap();
/// assert_eq!(policy.orgs().len(), 2);
/// ```
pub fn parse(expression: &str) -> Result<Policy> {
    let malformed = |reason: String| EndorseError::MalformedPolicy {
        expression: expression.to_string(),
        reason,
    };

    let tokens = tokenize(expression).map_err(malformed)?;
    if tokens.is_empty() {
        return Err(malformed("empty policy expression".to_string()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let policy = parser.policy().map_err(malformed)?;
    if parser.pos != parser.tokens.len() {
        return Err(malformed(format!(
            "unexpected trailing input at token {}",
            parser.pos
        )));
    }
    Ok(policy)
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(idx, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    value.push(ch);
                }
                if !closed {
                    return Err(format!("unterminated quoted principal starting at {}", idx));
                }
                tokens.push(Token::Quoted(value));
            }
            c if c.is_ascii_digit() => {
                let mut value = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    value.push(d);
                    chars.next();
                }
                let n = value
                    .parse::<usize>()
                    .map_err(|e| format!("invalid integer '{}': {}", value, e))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_ascii_alphabetic() => {
                let mut value = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    value.push(d);
                    chars.next();
                }
                tokens.push(Token::Ident(value));
            }
            other => return Err(format!("unexpected character '{}' at {}", other, idx)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> std::result::Result<(), String> {
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(format!("expected {:?}, found {:?}", expected, t)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn policy(&mut self) -> std::result::Result<Policy, String> {
        match self.next() {
            Some(Token::Quoted(principal)) => principal_from(&principal),
            Some(Token::Ident(op)) => {
                if self.depth >= MAX_POLICY_DEPTH {
                    return Err(format!(
                        "policy nesting exceeds {} levels",
                        MAX_POLICY_DEPTH
                    ));
                }
                self.depth += 1;
                let gate = self.gate(&op);
                self.depth -= 1;
                gate
            }
            Some(other) => Err(format!("expected principal or operator, found {:?}", other)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn gate(&mut self, op: &str) -> std::result::Result<Policy, String> {
        self.expect(Token::LParen)?;
        match op.to_ascii_lowercase().as_str() {
            "and" => Ok(Policy::And(self.children()?)),
            "or" => Ok(Policy::Or(self.children()?)),
            "outof" => {
                let n = match self.next() {
                    Some(Token::Int(n)) => n,
                    other => {
                        return Err(format!("OutOf expects a threshold, found {:?}", other))
                    }
                };
                self.expect(Token::Comma)?;
                let children = self.children()?;
                if n == 0 {
                    return Err("OutOf threshold must be at least 1".to_string());
                }
                if n > children.len() {
                    return Err(format!(
                        "OutOf threshold {} exceeds {} sub-policies",
                        n,
                        children.len()
                    ));
                }
                Ok(Policy::NOfM { n, children })
            }
            _ => Err(format!("unknown operator '{}'", op)),
        }
    }

    /// Parses `policy ("," policy)* ")"`; the opening paren is already consumed.
    fn children(&mut self) -> std::result::Result<Vec<Policy>, String> {
        let mut children = vec![self.policy()?];
        loop {
            match self.next() {
                Some(Token::Comma) => children.push(self.policy()?),
                Some(Token::RParen) => return Ok(children),
                Some(other) => return Err(format!("expected ',' or ')', found {:?}", other)),
                None => return Err("unbalanced parentheses".to_string()),
            }
        }
    }
}

fn principal_from(text: &str) -> std::result::Result<Policy, String> {
    let (org, role) = text
        .rsplit_once('.')
        .ok_or_else(|| format!("principal '{}' must be of the form ORG.ROLE", text))?;
    if org.is_empty() {
        return Err(format!("principal '{}' is missing an organization", text));
    }
    let role = Role::from_name(role).ok_or_else(|| format!("unknown role '{}'", role))?;
    Ok(Policy::Identity {
        org: org.to_string(),
        role,
    })
}
