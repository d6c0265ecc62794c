//! Tokenizer for transform expressions.

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Identifiers and keywords alike; the parser tells them apart.
    Name(String),
    Sym(&'static str),
}

impl Token {
    pub(crate) fn is_sym(&self, sym: &str) -> bool {
        matches!(self, Token::Sym(s) if *s == sym)
    }

    pub(crate) fn is_name(&self, name: &str) -> bool {
        matches!(self, Token::Name(n) if n == name)
    }
}

// Longest first, so `**` wins over `*` and `//` over `/`.
const SYMBOLS: [&str; 22] = [
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">", "(", ")", "[", "]", "{",
    "}", ",", ":", ".",
];

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_ascii_digit() {
            let mut literal = String::new();
            let mut is_float = false;
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_digit() || ch == '_' {
                    if ch != '_' {
                        literal.push(ch);
                    }
                } else if ch == '.' && !is_float {
                    is_float = true;
                    literal.push(ch);
                } else if (ch == 'e' || ch == 'E') && !literal.contains('e') {
                    is_float = true;
                    literal.push('e');
                    chars.next();
                    if let Some(&sign) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            literal.push(sign);
                            chars.next();
                        }
                    }
                    continue;
                } else {
                    break;
                }
                chars.next();
            }
            let token = if is_float {
                literal.parse().map(Token::Float).ok()
            } else {
                literal.parse().map(Token::Int).ok()
            };
            tokens.push(token.ok_or_else(|| {
                ConfigError::expression(format!("invalid number literal '{}'", literal))
            })?);
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut name = String::new();
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                name.push(ch);
                chars.next();
            }
            tokens.push(Token::Name(name));
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                match ch {
                    '\\' => match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some(escaped) => value.push(escaped),
                        None => break,
                    },
                    ch if ch == c => {
                        closed = true;
                        break;
                    }
                    ch => value.push(ch),
                }
            }
            if !closed {
                return Err(ConfigError::expression(format!(
                    "unterminated string literal in '{}'",
                    input
                )));
            }
            tokens.push(Token::Str(value));
            continue;
        }

        let rest: String = chars.clone().take(2).collect();
        match SYMBOLS.iter().find(|sym| rest.starts_with(**sym)) {
            Some(sym) => {
                for _ in 0..sym.len() {
                    chars.next();
                }
                tokens.push(Token::Sym(*sym));
            }
            None => {
                return Err(ConfigError::expression(format!(
                    "unexpected character '{}' in '{}'",
                    c, input
                )));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lambda() {
        let tokens = tokenize("lambda x, y: x ** 2 // y").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Name("lambda".into()),
                Token::Name("x".into()),
                Token::Sym(","),
                Token::Name("y".into()),
                Token::Sym(":"),
                Token::Name("x".into()),
                Token::Sym("**"),
                Token::Int(2),
                Token::Sym("//"),
                Token::Name("y".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_literals() {
        let tokens = tokenize(r#"1.5 2e3 1_000 'a\'b' "c""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Float(1.5),
                Token::Float(2000.0),
                Token::Int(1000),
                Token::Str("a'b".into()),
                Token::Str("c".into()),
            ]
        );
    }

    #[test]
    fn test_tokenize_errors() {
        assert!(tokenize("'open").is_err());
        assert!(tokenize("x $ y").is_err());
    }
}
