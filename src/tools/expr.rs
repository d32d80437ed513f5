//! Arithmetic expression parsing and evaluation
//!
//! A small recursive-descent parser over floating point values. Operator
//! precedence, from loosest to tightest: `+ -`, `* / // %`, unary sign,
//! `** ^` (right associative). Identifiers resolve to caller-supplied
//! variables first, then to the constants `pi`, `e`, `tau` and `inf`.
//! A leading `math.` on any identifier is ignored.

use std::f64::consts;
use thiserror::Error;

const MAX_DEPTH: usize = 128;
/// Bounds the height of flat operator chains, which `MAX_DEPTH` does not see
const MAX_TOKENS: usize = 1024;
const MAX_INPUT_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("expression is empty")]
    Empty,
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("expression is too long")]
    TooLong,
    #[error("name '{0}' is not defined")]
    UnknownName(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("math domain error in {0}")]
    Domain(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Pow,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Num(n) => format_number(*n),
            Token::Ident(name) => name.clone(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::DoubleSlash => "//".into(),
            Token::Percent => "%".into(),
            Token::Pow => "**".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent only when digits follow
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let name = text.strip_prefix("math.").unwrap_or(&text);
                if name.is_empty() || name.contains('.') {
                    return Err(ExprError::UnknownName(text));
                }
                tokens.push(Token::Ident(name.to_string()));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Pow);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ch => return Err(ExprError::UnexpectedChar { ch, pos: i }),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Name(String),
    Neg(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        match self.advance() {
            Some(ref tok) if tok == expected => Ok(()),
            Some(tok) => Err(ExprError::UnexpectedToken(tok.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn enter(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::DoubleSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        self.enter()?;
        let result = match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.unary().map(|e| Expr::Neg(Box::new(e)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        };
        self.depth -= 1;
        result
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            // Right associative, and the exponent may carry a sign: 2 ** -1
            let exponent = self.unary()?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Name(name));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                    return Ok(Expr::Call { name, args });
                }
                loop {
                    self.enter()?;
                    let arg = self.additive();
                    self.depth -= 1;
                    args.push(arg?);
                    match self.advance() {
                        Some(Token::Comma) => {}
                        Some(Token::RParen) => return Ok(Expr::Call { name, args }),
                        Some(tok) => return Err(ExprError::UnexpectedToken(tok.describe())),
                        None => return Err(ExprError::UnexpectedEnd),
                    }
                }
            }
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.additive();
                self.depth -= 1;
                let inner = inner?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(tok) => Err(ExprError::UnexpectedToken(tok.describe())),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Parse an expression into a reusable tree
pub fn parse(src: &str) -> Result<Expr, ExprError> {
    if src.len() > MAX_INPUT_LEN {
        return Err(ExprError::TooLong);
    }
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(ExprError::TooLong);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.additive()?;
    match parser.advance() {
        None => Ok(expr),
        Some(tok) => Err(ExprError::UnexpectedToken(tok.describe())),
    }
}

/// Parse and evaluate without variables
pub fn evaluate(src: &str) -> Result<f64, ExprError> {
    parse(src)?.eval(&[])
}

impl Expr {
    /// Evaluate with the given variable bindings
    pub fn eval(&self, vars: &[(&str, f64)]) -> Result<f64, ExprError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Name(name) => lookup_name(name, vars),
            Expr::Neg(inner) => Ok(-inner.eval(vars)?),
            Expr::Binary { op, lhs, rhs } => {
                apply_binary(*op, lhs.eval(vars)?, rhs.eval(vars)?)
            }
            Expr::Call { name, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(vars))
                    .collect::<Result<Vec<_>, _>>()?;
                call_function(name, &values)
            }
        }
    }

    /// Free names referenced by the expression that are not known constants
    pub fn free_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Name(name) => {
                if constant(name).is_none() && !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_names(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_names(out);
                rhs.collect_names(out);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_names(out);
                }
            }
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(consts::PI),
        "e" => Some(consts::E),
        "tau" => Some(consts::TAU),
        "inf" => Some(f64::INFINITY),
        _ => None,
    }
}

fn lookup_name(name: &str, vars: &[(&str, f64)]) -> Result<f64, ExprError> {
    vars.iter()
        .find(|(var, _)| *var == name)
        .map(|(_, value)| *value)
        .or_else(|| constant(name))
        .ok_or_else(|| ExprError::UnknownName(name.to_string()))
}

fn apply_binary(op: BinOp, a: f64, b: f64) -> Result<f64, ExprError> {
    match op {
        BinOp::Add => Ok(a + b),
        BinOp::Sub => Ok(a - b),
        BinOp::Mul => Ok(a * b),
        BinOp::Div => {
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok(a / b)
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok((a / b).floor())
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            // Result takes the sign of the divisor
            Ok(a - b * (a / b).floor())
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            let result = a.powf(b);
            if result.is_nan() && !a.is_nan() && !b.is_nan() {
                return Err(ExprError::Domain("pow".to_string()));
            }
            Ok(result)
        }
    }
}

fn arity(name: &str, expected: &'static str, got: usize) -> ExprError {
    ExprError::Arity {
        name: name.to_string(),
        expected,
        got,
    }
}

fn unary_fn(name: &str) -> Option<fn(f64) -> f64> {
    let f: fn(f64) -> f64 = match name {
        "sin" => f64::sin,
        "cos" => f64::cos,
        "tan" => f64::tan,
        "asin" => f64::asin,
        "acos" => f64::acos,
        "atan" => f64::atan,
        "sinh" => f64::sinh,
        "cosh" => f64::cosh,
        "tanh" => f64::tanh,
        "sqrt" => f64::sqrt,
        "exp" => f64::exp,
        "log10" => f64::log10,
        "log2" => f64::log2,
        "abs" | "fabs" => f64::abs,
        "floor" => f64::floor,
        "ceil" => f64::ceil,
        "degrees" => f64::to_degrees,
        "radians" => f64::to_radians,
        _ => return None,
    };
    Some(f)
}

fn call_function(name: &str, args: &[f64]) -> Result<f64, ExprError> {
    let result = if let Some(f) = unary_fn(name) {
        let [x] = args else {
            return Err(arity(name, "1", args.len()));
        };
        if matches!(name, "log10" | "log2") && *x <= 0.0 {
            return Err(ExprError::Domain(name.to_string()));
        }
        f(*x)
    } else {
        match name {
            "log" => match args {
                [x] if *x > 0.0 => x.ln(),
                [x, base] if *x > 0.0 && *base > 0.0 && (*base - 1.0).abs() > f64::EPSILON => x.log(*base),
                [_] | [_, _] => return Err(ExprError::Domain(name.to_string())),
                _ => return Err(arity(name, "1 or 2", args.len())),
            },
            "round" => match args {
                [x] => x.round_ties_even(),
                [x, digits] => {
                    let scale = 10f64.powf(digits.trunc());
                    (x * scale).round_ties_even() / scale
                }
                _ => return Err(arity(name, "1 or 2", args.len())),
            },
            "pow" => match args {
                [a, b] => return apply_binary(BinOp::Pow, *a, *b),
                _ => return Err(arity(name, "2", args.len())),
            },
            "atan2" => match args {
                [y, x] => y.atan2(*x),
                _ => return Err(arity(name, "2", args.len())),
            },
            "hypot" => args.iter().map(|v| v * v).sum::<f64>().sqrt(),
            "min" | "max" => {
                if args.is_empty() {
                    return Err(arity(name, "at least 1", 0));
                }
                let pick: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
                args.iter().copied().fold(args[0], pick)
            }
            _ => return Err(ExprError::UnknownFunction(name.to_string())),
        }
    };

    if result.is_nan() && args.iter().all(|a| !a.is_nan()) {
        return Err(ExprError::Domain(name.to_string()));
    }
    Ok(result)
}

/// Render a value the way a calculator would: integral values without a
/// fractional part, everything else in shortest round-trip form.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.0}")
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{value}")
    }
}
