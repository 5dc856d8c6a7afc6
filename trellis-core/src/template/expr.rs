//! Template Expressions
//!
//! The language inside `${...}` is deliberately small: property paths,
//! literals, arithmetic, comparison, logical operators and the conditional
//! operator. There are no calls and no assignment, so evaluating a template
//! can read state but never run code.
//!
//! ```text
//! expr        := logical_or ( "?" expr ":" expr )?
//! logical_or  := logical_and ( "||" logical_and )*
//! logical_and := equality ( "&&" equality )*
//! equality    := comparison ( ("==" | "!=" | "===" | "!==") comparison )*
//! comparison  := additive ( ("<" | "<=" | ">" | ">=") additive )*
//! additive    := term ( ("+" | "-") term )*
//! term        := unary ( ("*" | "/" | "%") unary )*
//! unary       := ("!" | "-") unary | postfix
//! postfix     := primary ( "." ident | "[" expr "]" )*
//! primary     := number | string | "true" | "false" | "null" | ident | "(" expr ")"
//! ```

use serde_json::{Number, Value};

use crate::error::TemplateError;
use crate::state::{display_json, json_eq, Field, Reactive, LENGTH};

/// Binary operator codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,

    // Logical, short-circuiting
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

// ----------------------------------------------------------------------------
// Tokens
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "?",
    ":", ".", "[", "]", "(", ")",
];

fn tokenize(source: &str, base: usize) -> Result<Vec<(usize, Token)>, TemplateError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() {
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                // A dot followed by a non-digit is member access on a literal
                if bytes[pos] == b'.' && !bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) {
                    break;
                }
                pos += 1;
            }
            let number = source[start..pos]
                .parse()
                .map_err(|_| syntax(base + start, &source[start..pos]))?;
            tokens.push((base + start, Token::Number(number)));
            continue;
        }

        if c == b'\'' || c == b'"' {
            let (text, end) = read_string(source, pos, base)?;
            tokens.push((base + start, Token::Str(text)));
            pos = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' || c == b'$' {
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
            {
                pos += 1;
            }
            tokens.push((base + start, Token::Ident(source[start..pos].to_string())));
            continue;
        }

        match PUNCTUATION.iter().find(|p| source[pos..].starts_with(**p)) {
            Some(punct) => {
                tokens.push((base + start, Token::Punct(*punct)));
                pos += punct.len();
            }
            None => {
                let found = source[pos..].chars().next().map(String::from).unwrap_or_default();
                return Err(syntax(base + start, &found));
            }
        }
    }

    Ok(tokens)
}

fn read_string(source: &str, start: usize, base: usize) -> Result<(String, usize), TemplateError> {
    let quote = source.as_bytes()[start] as char;
    let mut text = String::new();
    let mut chars = source[start + 1..].char_indices();

    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, 'n')) => text.push('\n'),
                Some((_, 't')) => text.push('\t'),
                Some((_, escaped)) => text.push(escaped),
                None => break,
            },
            c if c == quote => return Ok((text, start + 1 + offset + 1)),
            c => text.push(c),
        }
    }

    Err(TemplateError::Unterminated(base + start))
}

fn syntax(offset: usize, found: &str) -> TemplateError {
    TemplateError::Syntax {
        offset,
        found: if found.is_empty() {
            "end of expression".to_string()
        } else {
            format!("`{found}`")
        },
    }
}

// ----------------------------------------------------------------------------
// Parser
// ----------------------------------------------------------------------------

/// Deepest nesting of parentheses, brackets, conditionals and unary
/// operators accepted in one expression.
const MAX_DEPTH: usize = 64;

/// Most tokens accepted in one expression.
const MAX_TOKENS: usize = 1024;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

/// Parse one expression; `base` is its offset in the template, for errors.
pub(crate) fn parse(source: &str, base: usize) -> Result<Expr, TemplateError> {
    let tokens = tokenize(source, base)?;
    if let Some((offset, token)) = tokens.get(MAX_TOKENS) {
        return Err(syntax(*offset, &describe(token)));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: base + source.len(),
        depth: 0,
    };
    let expr = parser.expr()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((offset, token)) => Err(syntax(*offset, &describe(token))),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => n.to_string(),
        Token::Str(s) => format!("'{s}'"),
        Token::Ident(name) => name.clone(),
        Token::Punct(p) => (*p).to_string(),
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn eat(&mut self, punct: &str) -> bool {
        if matches!(self.peek(), Some(Token::Punct(p)) if *p == punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> Result<(), TemplateError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> TemplateError {
        match self.tokens.get(self.pos) {
            Some((offset, token)) => syntax(*offset, &describe(token)),
            None => syntax(self.end, ""),
        }
    }

    fn nested(
        &mut self,
        inner: fn(&mut Self) -> Result<Expr, TemplateError>,
    ) -> Result<Expr, TemplateError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.unexpected());
        }
        self.depth += 1;
        let result = inner(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Expr, TemplateError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, TemplateError> {
        let condition = self.logical_or()?;
        if !self.eat("?") {
            return Ok(condition);
        }
        let then = self.expr()?;
        self.expect(":")?;
        let otherwise = self.expr()?;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, TemplateError>,
    ) -> Result<Expr, TemplateError> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in ops {
                if self.eat(punct) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn logical_or(&mut self) -> Result<Expr, TemplateError> {
        self.binary_level(&[("||", BinaryOp::Or)], Self::logical_and)
    }

    fn logical_and(&mut self) -> Result<Expr, TemplateError> {
        self.binary_level(&[("&&", BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr, TemplateError> {
        self.binary_level(
            &[
                ("===", BinaryOp::Eq),
                ("!==", BinaryOp::Ne),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr, TemplateError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, TemplateError> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr, TemplateError> {
        self.binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Mod)],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, TemplateError> {
        if self.eat("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.nested(Self::unary)?)));
        }
        if self.eat("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.nested(Self::unary)?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                match self.peek().cloned() {
                    Some(Token::Ident(name)) => {
                        self.pos += 1;
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    _ => return Err(self.unexpected()),
                }
            } else if self.eat("[") {
                let index = self.expr()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, TemplateError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected());
        };
        match token {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Literal(number(n).unwrap_or(Value::Null)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::String(s)))
            }
            Token::Ident(name) => {
                self.pos += 1;
                Ok(match name.as_str() {
                    "true" => Expr::Literal(Value::Bool(true)),
                    "false" => Expr::Literal(Value::Bool(false)),
                    "null" => Expr::Literal(Value::Null),
                    _ => Expr::Ident(name),
                })
            }
            Token::Punct("(") => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct(_) => Err(self.unexpected()),
        }
    }
}

// ----------------------------------------------------------------------------
// Evaluation
// ----------------------------------------------------------------------------

/// Integral results are stored as integers so they print without a fraction.
fn number(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Some(Value::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number)
    }
}

impl Expr {
    /// Evaluate against `scope`. Property reads go through the reactive
    /// accessors, so evaluation inside an effect subscribes to them.
    pub(crate) fn eval(&self, scope: &Reactive) -> Result<Field, TemplateError> {
        match self {
            Self::Literal(value) => Ok(Field::Value(value.clone())),
            Self::Ident(name) => present(scope.get(name), name),
            Self::Member(object, prop) => {
                let object = object.eval(scope)?;
                member(&object, prop).ok_or_else(|| TemplateError::Missing(self.describe()))
            }
            Self::Index(object, index) => {
                let object = object.eval(scope)?;
                let index = index.eval(scope)?.to_string();
                member(&object, &index).ok_or_else(|| TemplateError::Missing(self.describe()))
            }
            Self::Unary(UnaryOp::Not, operand) => {
                Ok(Field::Value(Value::Bool(!operand.eval(scope)?.is_truthy())))
            }
            Self::Unary(UnaryOp::Neg, operand) => {
                let value = to_number(&operand.eval(scope)?, "-")?;
                arithmetic_result(-value)
            }
            Self::Binary(BinaryOp::And, left, right) => {
                let left = left.eval(scope)?;
                if left.is_truthy() {
                    right.eval(scope)
                } else {
                    Ok(left)
                }
            }
            Self::Binary(BinaryOp::Or, left, right) => {
                let left = left.eval(scope)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    right.eval(scope)
                }
            }
            Self::Binary(op, left, right) => {
                let left = left.eval(scope)?;
                let right = right.eval(scope)?;
                binary(*op, &left, &right)
            }
            Self::Conditional(condition, then, otherwise) => {
                if condition.eval(scope)?.is_truthy() {
                    then.eval(scope)
                } else {
                    otherwise.eval(scope)
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => name.clone(),
            Self::Member(object, prop) => format!("{}.{prop}", object.describe()),
            Self::Index(object, _) => format!("{}[..]", object.describe()),
            _ => "expression".to_string(),
        }
    }
}

fn present(field: Field, name: &str) -> Result<Field, TemplateError> {
    if field.is_absent() {
        Err(TemplateError::Missing(name.to_string()))
    } else {
        Ok(field)
    }
}

fn member(object: &Field, prop: &str) -> Option<Field> {
    let field = match object {
        Field::Node(node) => node.get(prop),
        Field::Value(Value::String(s)) if prop == LENGTH => Field::Value(Value::from(s.chars().count())),
        _ => return None,
    };
    (!field.is_absent()).then_some(field)
}

fn to_number(field: &Field, op: &'static str) -> Result<f64, TemplateError> {
    match field {
        Field::Value(Value::Number(n)) => n.as_f64(),
        Field::Value(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Field::Value(Value::Null) => Some(0.0),
        _ => None,
    }
    .ok_or_else(|| TemplateError::Type {
        op,
        operand: describe_field(field),
    })
}

fn describe_field(field: &Field) -> String {
    match field {
        Field::Absent => "nothing".to_string(),
        Field::Value(Value::String(s)) => format!("'{s}'"),
        Field::Value(value) => display_json(value),
        Field::Node(node) if node.is_array() => "an array".to_string(),
        Field::Node(_) => "an object".to_string(),
        Field::Date(_) => "a date".to_string(),
    }
}

fn arithmetic_result(n: f64) -> Result<Field, TemplateError> {
    if !n.is_finite() {
        return Err(TemplateError::NonFinite);
    }
    number(n).map(Field::Value).ok_or(TemplateError::NonFinite)
}

fn binary(op: BinaryOp, left: &Field, right: &Field) -> Result<Field, TemplateError> {
    let symbol = op.symbol();
    let result = match op {
        BinaryOp::Add if is_text(left) || is_text(right) => {
            return Ok(Field::Value(Value::String(format!("{left}{right}"))));
        }
        BinaryOp::Add => to_number(left, symbol)? + to_number(right, symbol)?,
        BinaryOp::Sub => to_number(left, symbol)? - to_number(right, symbol)?,
        BinaryOp::Mul => to_number(left, symbol)? * to_number(right, symbol)?,
        BinaryOp::Div => to_number(left, symbol)? / to_number(right, symbol)?,
        BinaryOp::Mod => to_number(left, symbol)? % to_number(right, symbol)?,
        BinaryOp::Eq => return Ok(Field::Value(Value::Bool(equal(left, right)))),
        BinaryOp::Ne => return Ok(Field::Value(Value::Bool(!equal(left, right)))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            return compare(op, left, right).map(|b| Field::Value(Value::Bool(b)));
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit in eval"),
    };
    arithmetic_result(result)
}

fn is_text(field: &Field) -> bool {
    matches!(field, Field::Value(Value::String(_)) | Field::Date(_))
}

fn equal(left: &Field, right: &Field) -> bool {
    match (left, right) {
        (Field::Value(a), Field::Value(b)) => json_eq(a, b),
        (Field::Node(a), Field::Node(b)) => a == b,
        (Field::Date(a), Field::Date(b)) => a.get_untracked() == b.get_untracked(),
        (Field::Absent, Field::Absent) => true,
        _ => false,
    }
}

fn compare(op: BinaryOp, left: &Field, right: &Field) -> Result<bool, TemplateError> {
    let ordering = match (left, right) {
        (Field::Value(Value::String(a)), Field::Value(Value::String(b))) => a.partial_cmp(b),
        _ => to_number(left, op.symbol())?.partial_cmp(&to_number(right, op.symbol())?),
    };
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    })
}
