//! Recursive-descent parser producing the expression tree.
//!
//! Precedence, loosest first: conditional, `or`, `and`, `not`, comparisons (chained, with
//! `in` / `not in`), `+ -`, `* / // %`, unary `+ -`, `**`, then indexing and calls.

use super::lexer::{Token, tokenize};
use crate::error::{ConfigError, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` keeps every operand so each is evaluated once.
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
    Slice {
        target: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },
    Call(String, Vec<Expr>),
    Comprehension {
        element: Box<Expr>,
        var: String,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
}

/// `lambda a, b: body`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}

/// Deepest bracket, unary or conditional nesting the parser accepts.
const MAX_NESTING: usize = 64;

/// Longest expression source accepted, in characters.
const MAX_SOURCE_LEN: usize = 10_000;

const KEYWORDS: [&str; 11] = [
    "lambda", "and", "or", "not", "in", "if", "else", "for", "True", "False", "None",
];

pub(crate) fn parse_lambda(source: &str) -> Result<Lambda> {
    let mut parser = Parser::new(source)?;
    if !parser.eat_name("lambda") {
        return Err(parser.error("expected 'lambda'"));
    }
    let mut params = Vec::new();
    while !parser.peek_sym(":") {
        match parser.next() {
            Some(Token::Name(name)) if !KEYWORDS.contains(&name.as_str()) => params.push(name),
            _ => return Err(parser.error("expected a parameter name")),
        }
        if !parser.eat_sym(",") {
            break;
        }
    }
    parser.expect_sym(":")?;
    let body = parser.expression()?;
    parser.finish()?;
    Ok(Lambda { params, body })
}

/// Parse a bare expression with no lambda header.
#[cfg(test)]
pub(crate) fn parse_expression(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expression()?;
    parser.finish()?;
    Ok(expr)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Result<Self> {
        if source.chars().count() > MAX_SOURCE_LEN {
            return Err(ConfigError::expression(format!(
                "expression is longer than {} characters",
                MAX_SOURCE_LEN
            )));
        }
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        })
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn error(&self, message: &str) -> ConfigError {
        ConfigError::expression(format!(
            "{} at token {} of '{}'",
            message, self.pos, self.source
        ))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_sym(&self, sym: &str) -> bool {
        self.peek().is_some_and(|t| t.is_sym(sym))
    }

    fn peek_name(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_name(name))
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        let found = self.peek_sym(sym);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_name(&mut self, name: &str) -> bool {
        let found = self.peek_name(name);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_sym(&mut self, sym: &str) -> Result<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", sym)))
        }
    }

    fn finish(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(&format!("unexpected trailing {:?}", token))),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr> {
        let then = self.or_expr()?;
        if !self.eat_name("if") {
            return Ok(then);
        }
        let condition = self.or_expr()?;
        if !self.eat_name("else") {
            return Err(self.error("expected 'else'"));
        }
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_name("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_name("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat_name("not") {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek()? {
            Token::Sym("==") => CompareOp::Eq,
            Token::Sym("!=") => CompareOp::Ne,
            Token::Sym("<") => CompareOp::Lt,
            Token::Sym("<=") => CompareOp::Le,
            Token::Sym(">") => CompareOp::Gt,
            Token::Sym(">=") => CompareOp::Ge,
            Token::Name(n) if n == "in" => CompareOp::In,
            Token::Name(n) if n == "not" => CompareOp::NotIn,
            _ => return None,
        };
        if op == CompareOp::NotIn {
            // a lone `not` here belongs to the caller
            let next_is_in = self.tokens.get(self.pos + 1).is_some_and(|t| t.is_name("in"));
            if !next_is_in {
                return None;
            }
            self.pos += 1;
        }
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr> {
        let mut left = self.term()?;
        loop {
            let op = if self.eat_sym("+") {
                BinaryOp::Add
            } else if self.eat_sym("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = if self.eat_sym("*") {
                BinaryOp::Mul
            } else if self.eat_sym("//") {
                BinaryOp::FloorDiv
            } else if self.eat_sym("/") {
                BinaryOp::Div
            } else if self.eat_sym("%") {
                BinaryOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr> {
        if self.eat_sym("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.nested(Self::factor)?)));
        }
        if self.eat_sym("+") {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.nested(Self::factor)?)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.postfix()?;
        if self.eat_sym("**") {
            // right-associative, and binds tighter than a unary minus on its left
            let exponent = self.nested(Self::factor)?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_sym("[") {
                expr = self.subscript(expr)?;
            } else if self.peek_sym("(") {
                let Expr::Name(ref name) = expr else {
                    return Err(self.error("only named functions can be called"));
                };
                let name = name.clone();
                self.pos += 1;
                let args = self.sequence(")")?;
                expr = Expr::Call(name, args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn subscript(&mut self, target: Expr) -> Result<Expr> {
        let start = if self.peek_sym(":") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        if !self.eat_sym(":") {
            self.expect_sym("]")?;
            let index = start.ok_or_else(|| self.error("empty index"))?;
            return Ok(Expr::Index(Box::new(target), index));
        }
        let stop = if self.peek_sym("]") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect_sym("]")?;
        Ok(Expr::Slice {
            target: Box::new(target),
            start,
            stop,
        })
    }

    /// Comma separated expressions up to `close`, trailing comma allowed.
    fn sequence(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat_sym(close) {
            items.push(self.expression()?);
            if !self.eat_sym(",") {
                self.expect_sym(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn atom(&mut self) -> Result<Expr> {
        let token = self
            .next()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Name(name) => match name.as_str() {
                "True" | "true" => Ok(Expr::Literal(Value::Bool(true))),
                "False" | "false" => Ok(Expr::Literal(Value::Bool(false))),
                "None" | "null" => Ok(Expr::Literal(Value::Null)),
                n if KEYWORDS.contains(&n) => {
                    Err(self.error(&format!("unexpected keyword '{}'", n)))
                }
                _ => Ok(Expr::Name(name)),
            },
            Token::Sym("(") => {
                if self.eat_sym(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.eat_sym(")") {
                    return Ok(first);
                }
                // tuples evaluate to lists
                self.expect_sym(",")?;
                let mut items = vec![first];
                items.extend(self.sequence(")")?);
                Ok(Expr::List(items))
            }
            Token::Sym("[") => self.list_display(),
            Token::Sym("{") => self.map_display(),
            other => Err(self.error(&format!("unexpected {:?}", other))),
        }
    }

    fn list_display(&mut self) -> Result<Expr> {
        if self.eat_sym("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expression()?;
        if self.eat_name("for") {
            let var = match self.next() {
                Some(Token::Name(name)) if !KEYWORDS.contains(&name.as_str()) => name,
                _ => return Err(self.error("expected a loop variable")),
            };
            if !self.eat_name("in") {
                return Err(self.error("expected 'in'"));
            }
            let iter = self.or_expr()?;
            let condition = if self.eat_name("if") {
                Some(Box::new(self.or_expr()?))
            } else {
                None
            };
            self.expect_sym("]")?;
            return Ok(Expr::Comprehension {
                element: Box::new(first),
                var,
                iter: Box::new(iter),
                condition,
            });
        }
        let mut items = vec![first];
        if self.eat_sym(",") {
            items.extend(self.sequence("]")?);
        } else {
            self.expect_sym("]")?;
        }
        Ok(Expr::List(items))
    }

    fn map_display(&mut self) -> Result<Expr> {
        let mut entries = Vec::new();
        while !self.eat_sym("}") {
            let key = self.expression()?;
            self.expect_sym(":")?;
            let value = self.expression()?;
            entries.push((key, value));
            if !self.eat_sym(",") {
                self.expect_sym("}")?;
                break;
            }
        }
        Ok(Expr::Map(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lit(value: Value) -> Expr {
        Expr::Literal(value)
    }

    #[test]
    fn test_parse_lambda_header() {
        let lambda = parse_lambda("lambda x, y: x + y").unwrap();
        assert_eq!(lambda.params, ["x", "y"]);
        assert_eq!(
            lambda.body,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Name("x".into())),
                Box::new(Expr::Name("y".into()))
            )
        );

        let lambda = parse_lambda("lambda: 1").unwrap();
        assert!(lambda.params.is_empty());
        assert!(parse_lambda("x: 1").is_err());
        assert!(parse_lambda("lambda x: 1 2").is_err());
    }

    #[test]
    fn test_precedence() {
        // -2 ** 2 is -(2 ** 2)
        let expr = parse_expression("-2 ** 2").unwrap();
        assert_eq!(
            expr,
            Expr::Unary(
                UnaryOp::Neg,
                Box::new(Expr::Binary(
                    BinaryOp::Pow,
                    Box::new(lit(json!(2))),
                    Box::new(lit(json!(2)))
                ))
            )
        );

        let expr = parse_expression("1 + 2 * 3").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn test_parse_not_in_and_chains() {
        let expr = parse_expression("1 < x <= 3").unwrap();
        let Expr::Compare(_, rest) = expr else {
            panic!("expected a comparison");
        };
        assert_eq!(rest.len(), 2);

        let expr = parse_expression("x not in [1, 2]").unwrap();
        let Expr::Compare(_, rest) = expr else {
            panic!("expected a comparison");
        };
        assert_eq!(rest[0].0, CompareOp::NotIn);
    }

    #[test]
    fn test_parse_displays() {
        assert!(matches!(
            parse_expression("[x * 2 for x in range(3) if x]").unwrap(),
            Expr::Comprehension { .. }
        ));
        assert!(matches!(
            parse_expression("{'a': 1, 'b': 2,}").unwrap(),
            Expr::Map(ref entries) if entries.len() == 2
        ));
        assert!(matches!(
            parse_expression("(1, 2)").unwrap(),
            Expr::List(ref items) if items.len() == 2
        ));
        assert!(matches!(
            parse_expression("xs[1:]").unwrap(),
            Expr::Slice { stop: None, .. }
        ));
        assert!(matches!(
            parse_expression("a if b else c").unwrap(),
            Expr::Conditional { .. }
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("lambda _: {}1{}", "(".repeat(2000), ")".repeat(2000));
        let err = parse_lambda(&deep).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
        assert!(parse_expression(&format!("{}1", "not ".repeat(500))).is_err());
        assert!(parse_expression(&format!("{}1", "-".repeat(500))).is_err());
        assert!(parse_expression(&format!("2{}", " ** 2".repeat(500))).is_err());

        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse_expression(&shallow).unwrap(), lit(json!(1)));
        assert!(parse_expression(&"1 + ".repeat(MAX_SOURCE_LEN)).is_err());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("[1 for]").is_err());
        assert!(parse_expression("a if b").is_err());
        assert!(parse_expression("1(2)").is_err());
    }
}
