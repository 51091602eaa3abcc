//! A small expression language over record fields.
//!
//! ```text
//! {amount} * 2 > {limit} and not {flag}
//! ```
//!
//! Field references are written `{name}` and are resolved against the header
//! of each iteration. Literals: integers, floats, quoted strings, `None`,
//! `True`, `False`. Operators, loosest first: `or`, `and`, `not`,
//! comparisons (`== != < <= > >=`, via the total order), `+ -`, `* / %`,
//! unary `-`.

use std::cmp::Ordering;
use std::fmt;

use reltab_core::error::{Error, Result};
use reltab_core::order::{compare, equal};
use reltab_core::{Header, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    /// Binding power (left, right) for the Pratt loop.
    fn power(self) -> (u8, u8) {
        match self {
            BinOp::Or => (1, 2),
            BinOp::And => (3, 4),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (7, 8),
            BinOp::Add | BinOp::Sub => (9, 10),
            BinOp::Mul | BinOp::Div | BinOp::Rem => (11, 12),
        }
    }
}

const NOT_POWER: u8 = 5;
const NEG_POWER: u8 = 13;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Value),
    Str(String),
    Field(String),
    Ident(String),
    Op(BinOp),
    Not,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
enum Node<F> {
    Lit(Value),
    Field(F),
    Not(Box<Node<F>>),
    Neg(Box<Node<F>>),
    Binary(BinOp, Box<Node<F>>, Box<Node<F>>),
}

/// A parsed expression, not yet bound to a header.
#[derive(Debug, Clone)]
pub struct Expr {
    source: String,
    root: Node<String>,
}

impl Expr {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr(0)?;
        if let Some(tok) = parser.tokens.get(parser.pos) {
            return Err(Error::Expr(format!("unexpected {tok:?} in `{source}`")));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Field names referenced, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        fn walk<'a>(node: &'a Node<String>, out: &mut Vec<&'a str>) {
            match node {
                Node::Lit(_) => {}
                Node::Field(name) => out.push(name),
                Node::Not(n) | Node::Neg(n) => walk(n, out),
                Node::Binary(_, l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Resolve field references to positions in `header`.
    pub fn bind(&self, header: &Header) -> Result<BoundExpr> {
        fn bind_node(node: &Node<String>, header: &Header) -> Result<Node<usize>> {
            Ok(match node {
                Node::Lit(v) => Node::Lit(v.clone()),
                Node::Field(name) => Node::Field(header.index_of(name).ok_or_else(|| {
                    Error::FieldSelection(format!("expression field {{{name}}} not in header"))
                })?),
                Node::Not(n) => Node::Not(Box::new(bind_node(n, header)?)),
                Node::Neg(n) => Node::Neg(Box::new(bind_node(n, header)?)),
                Node::Binary(op, l, r) => Node::Binary(
                    *op,
                    Box::new(bind_node(l, header)?),
                    Box::new(bind_node(r, header)?),
                ),
            })
        }
        Ok(BoundExpr {
            root: bind_node(&self.root, header)?,
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Expr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Expr::parse(s)
    }
}

/// An expression bound to one header.
#[derive(Debug, Clone)]
pub struct BoundExpr {
    root: Node<usize>,
}

impl BoundExpr {
    /// Evaluate against a row; fields past the end of the row read as `missing`.
    pub fn eval(&self, row: &[Value], missing: &Value) -> Result<Value> {
        eval(&self.root, row, missing)
    }
}

fn eval(node: &Node<usize>, row: &[Value], missing: &Value) -> Result<Value> {
    match node {
        Node::Lit(v) => Ok(v.clone()),
        Node::Field(i) => Ok(row.get(*i).unwrap_or(missing).clone()),
        Node::Not(n) => Ok(Value::Bool(!eval(n, row, missing)?.is_truthy())),
        Node::Neg(n) => match eval(n, row, missing)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| Error::Expr("integer overflow in negation".into())),
            Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::Expr(format!("cannot negate {}", other.type_name()))),
        },
        Node::Binary(BinOp::And, l, r) => {
            let lv = eval(l, row, missing)?;
            if lv.is_truthy() {
                eval(r, row, missing)
            } else {
                Ok(lv)
            }
        }
        Node::Binary(BinOp::Or, l, r) => {
            let lv = eval(l, row, missing)?;
            if lv.is_truthy() {
                Ok(lv)
            } else {
                eval(r, row, missing)
            }
        }
        Node::Binary(op, l, r) => {
            let lv = eval(l, row, missing)?;
            let rv = eval(r, row, missing)?;
            apply(*op, &lv, &rv)
        }
    }
}

fn apply(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    let cmp = || compare(a, b);
    Ok(match op {
        BinOp::Eq => Value::Bool(equal(a, b)),
        BinOp::Ne => Value::Bool(!equal(a, b)),
        BinOp::Lt => Value::Bool(cmp() == Ordering::Less),
        BinOp::Le => Value::Bool(cmp() != Ordering::Greater),
        BinOp::Gt => Value::Bool(cmp() == Ordering::Greater),
        BinOp::Ge => Value::Bool(cmp() != Ordering::Less),
        BinOp::Add => match (a, b) {
            (Value::Text(x), Value::Text(y)) => Value::Text(format!("{x}{y}")),
            (Value::List(x), Value::List(y)) => Value::List(x.iter().chain(y).cloned().collect()),
            _ => arith(op, a, b)?,
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arith(op, a, b)?,
        BinOp::And | BinOp::Or => {
            return Err(Error::Expr(format!("{op:?} cannot be applied eagerly")))
        }
    })
}

fn arith(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    let type_err = || {
        Error::Expr(format!(
            "unsupported operand types for {op:?}: {} and {}",
            a.type_name(),
            b.type_name()
        ))
    };
    if !a.is_numeric() || !b.is_numeric() {
        return Err(type_err());
    }
    let overflow = || Error::Expr(format!("integer overflow in {op:?}"));
    match (a.as_i64(), b.as_i64(), is_float(a) || is_float(b)) {
        (Some(x), Some(y), false) => match op {
            BinOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Div if y == 0 => Err(Error::Expr("division by zero".into())),
            BinOp::Div => Ok(Value::Float(x as f64 / y as f64)),
            BinOp::Rem if y == 0 => Err(Error::Expr("modulo by zero".into())),
            BinOp::Rem => {
                // Result takes the sign of the divisor.
                let r = x.checked_rem(y).ok_or_else(overflow)?;
                Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
            }
            _ => Err(type_err()),
        },
        _ => {
            let (x, y) = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(type_err()),
            };
            match op {
                BinOp::Add => Ok(Value::Float(x + y)),
                BinOp::Sub => Ok(Value::Float(x - y)),
                BinOp::Mul => Ok(Value::Float(x * y)),
                BinOp::Div if y == 0.0 => Err(Error::Expr("division by zero".into())),
                BinOp::Div => Ok(Value::Float(x / y)),
                BinOp::Rem if y == 0.0 => Err(Error::Expr("modulo by zero".into())),
                BinOp::Rem => {
                    let r = x % y;
                    Ok(Value::Float(if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }))
                }
                _ => Err(type_err()),
            }
        }
    }
}

fn is_float(v: &Value) -> bool {
    matches!(v, Value::Float(_))
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    let err = |msg: String| Error::Expr(format!("{msg} in `{src}`"));

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            '{' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '}')
                    .ok_or_else(|| err("unterminated field reference".into()))?;
                let name: String = chars[i + 1..i + 1 + end].iter().collect();
                out.push(Token::Field(name));
                i += end + 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated string".into())),
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(&other) => s.push(other),
                                None => return Err(err("dangling escape".into())),
                            }
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                out.push(Token::Str(s));
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == '_'
                        || ((chars[i] == 'e' || chars[i] == 'E') && i > start)
                        || ((chars[i] == '+' || chars[i] == '-')
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().filter(|&&c| c != '_').collect();
                let value = if text.contains(['.', 'e', 'E']) {
                    text.parse::<f64>().map(Value::Float).ok()
                } else {
                    text.parse::<i64>().map(Value::Int).ok()
                };
                out.push(Token::Num(
                    value.ok_or_else(|| err(format!("bad number literal {text:?}")))?,
                ));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                out.push(match word.as_str() {
                    "and" => Token::Op(BinOp::And),
                    "or" => Token::Op(BinOp::Or),
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            _ => {
                let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
                let (op, len) = match two.as_str() {
                    "==" => (BinOp::Eq, 2),
                    "!=" => (BinOp::Ne, 2),
                    "<=" => (BinOp::Le, 2),
                    ">=" => (BinOp::Ge, 2),
                    _ => match c {
                        '<' => (BinOp::Lt, 1),
                        '>' => (BinOp::Gt, 1),
                        '+' => (BinOp::Add, 1),
                        '-' => (BinOp::Sub, 1),
                        '*' => (BinOp::Mul, 1),
                        '/' => (BinOp::Div, 1),
                        '%' => (BinOp::Rem, 1),
                        _ => return Err(err(format!("unexpected character {c:?}"))),
                    },
                };
                out.push(Token::Op(op));
                i += len;
            }
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expr(&mut self, min_power: u8) -> Result<Node<String>> {
        let mut lhs = match self.next() {
            Some(Token::Num(v)) => Node::Lit(v),
            Some(Token::Str(s)) => Node::Lit(Value::Text(s)),
            Some(Token::Field(name)) => Node::Field(name),
            Some(Token::Ident(word)) => Node::Lit(match word.as_str() {
                "None" | "none" => Value::Missing,
                "True" | "true" => Value::Bool(true),
                "False" | "false" => Value::Bool(false),
                _ => {
                    return Err(Error::Expr(format!(
                        "unknown name `{word}` (field references are written {{{word}}})"
                    )))
                }
            }),
            Some(Token::Not) => Node::Not(Box::new(self.expr(NOT_POWER)?)),
            Some(Token::Op(BinOp::Sub)) => Node::Neg(Box::new(self.expr(NEG_POWER)?)),
            Some(Token::Op(BinOp::Add)) => self.expr(NEG_POWER)?,
            Some(Token::LParen) => {
                let inner = self.expr(0)?;
                match self.next() {
                    Some(Token::RParen) => inner,
                    _ => return Err(Error::Expr("expected `)`".into())),
                }
            }
            Some(tok) => return Err(Error::Expr(format!("unexpected {tok:?}"))),
            None => return Err(Error::Expr("unexpected end of expression".into())),
        };

        while let Some(Token::Op(op)) = self.tokens.get(self.pos).cloned() {
            let (lp, rp) = op.power();
            if lp < min_power {
                break;
            }
            self.pos += 1;
            let rhs = self.expr(rp)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }
}

#[cfg(test)]
mod tests {
    use reltab_core::row;

    use super::*;

    fn eval_on(src: &str, header: &[&str], row: &[Value]) -> Result<Value> {
        let header: Header = header.iter().copied().collect();
        Expr::parse(src)?.bind(&header)?.eval(row, &Value::Missing)
    }

    #[test]
    fn arithmetic_and_precedence() {
        let v = eval_on("1 + 2 * 3 - 4 / 2", &[], &[]).unwrap();
        assert!(v.is_same(&Value::Float(5.0)));
        let v = eval_on("(1 + 2) * 3", &[], &[]).unwrap();
        assert!(v.is_same(&Value::Int(9)));
        let v = eval_on("-7 % 3", &[], &[]).unwrap();
        assert!(v.is_same(&Value::Int(2)));
    }

    #[test]
    fn fields_and_comparisons() {
        let row = row!["a", 4];
        let v = eval_on("{foo} == 'a' and {bar} > 3", &["foo", "bar"], &row).unwrap();
        assert!(v.is_same(&Value::Bool(true)));
        let v = eval_on("not {bar} >= 5", &["foo", "bar"], &row).unwrap();
        assert!(v.is_same(&Value::Bool(true)));
    }

    #[test]
    fn short_row_reads_missing() {
        let v = eval_on("{b} == None", &["a", "b"], &row![1]).unwrap();
        assert!(v.is_same(&Value::Bool(true)));
    }

    #[test]
    fn unknown_field_is_a_selection_error() {
        let err = eval_on("{nope} > 1", &["a"], &row![1]).unwrap_err();
        assert!(matches!(err, Error::FieldSelection(_)));
    }

    #[test]
    fn type_errors_surface_at_eval() {
        assert!(matches!(eval_on("{a} + 1", &["a"], &row!["x"]), Err(Error::Expr(_))));
        assert!(matches!(eval_on("1 / 0", &[], &[]), Err(Error::Expr(_))));
    }

    #[test]
    fn parse_errors() {
        assert!(Expr::parse("1 +").is_err());
        assert!(Expr::parse("{a").is_err());
        assert!(Expr::parse("foo > 1").is_err());
        assert!(Expr::parse("(1").is_err());
    }

    #[test]
    fn lists_referenced_fields() {
        let e = Expr::parse("{x} * {y} + {x}").unwrap();
        assert_eq!(e.fields(), vec!["x", "y", "x"]);
    }
}
