// warden-core/src/domain/checks/mod.rs
//
// Embedded evaluator for the contract's custom check predicates.
// Supported subset: column references, literals, arithmetic, comparison,
// boolean connectives and now(). Evaluated row by row against the loaded
// table; no SQL engine involved, so results are deterministic.
//
// Three-valued logic: a comparison touching NULL yields NULL, and a row
// whose predicate is NULL is not counted as failing (null handling belongs
// to the nullability rules, not to custom checks).

use chrono::{NaiveDateTime, Utc};

use crate::domain::error::DomainError;
use crate::domain::table::{parses_as_timestamp, Table, Value};

// ── AST ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Column(String),
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Now,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    And,
    Or,
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
    Mod,
}

// ── Runtime values ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Eval {
    Null,
    Num(f64),
    Str(String),
    Bool(bool),
    Time(NaiveDateTime),
}

impl Eval {
    fn from_cell(value: &Value) -> Eval {
        match value {
            Value::Null => Eval::Null,
            Value::Int(v) => Eval::Num(*v as f64),
            Value::Float(v) => Eval::Num(*v),
            Value::Bool(b) => Eval::Bool(*b),
            Value::Text(s) => Eval::Str(s.clone()),
            Value::Timestamp(ts) => Eval::Time(*ts),
        }
    }
}

// ── Public surface ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Predicate {
    name: String,
    ast: Expr,
}

impl Predicate {
    pub fn parse(name: &str, condition: &str) -> Result<Self, DomainError> {
        let tokens = tokenize(condition).map_err(|detail| DomainError::InvalidPredicate {
            name: name.to_string(),
            detail,
        })?;
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser.parse_expr().map_err(|detail| DomainError::InvalidPredicate {
            name: name.to_string(),
            detail,
        })?;
        if parser.pos != parser.tokens.len() {
            return Err(DomainError::InvalidPredicate {
                name: name.to_string(),
                detail: "trailing tokens after expression".into(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            ast,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row indices where the predicate evaluates to false.
    /// Referencing a column absent from the table is a predicate error.
    pub fn failing_rows(&self, table: &Table) -> Result<Vec<usize>, DomainError> {
        self.bind_check(&self.ast, table)?;
        let now = Utc::now().naive_utc();
        let mut failing = Vec::new();
        for row in 0..table.rows_loaded {
            match eval(&self.ast, table, row, now) {
                Eval::Bool(false) => failing.push(row),
                _ => {} // true or NULL: not a failure
            }
        }
        Ok(failing)
    }

    fn bind_check(&self, expr: &Expr, table: &Table) -> Result<(), DomainError> {
        match expr {
            Expr::Column(name) => {
                if table.column(name).is_none() {
                    return Err(DomainError::InvalidPredicate {
                        name: self.name.clone(),
                        detail: format!("unknown column '{name}'"),
                    });
                }
                Ok(())
            }
            Expr::Unary(_, inner) => self.bind_check(inner, table),
            Expr::Binary(_, lhs, rhs) => {
                self.bind_check(lhs, table)?;
                self.bind_check(rhs, table)
            }
            _ => Ok(()),
        }
    }
}

// ── Tokenizer ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    Op(BinOp),
    Not,
    Minus,
    Plus,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
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
                tokens.push(Token::Op(BinOp::Mul));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op(BinOp::Div));
                i += 1;
            }
            '%' => {
                tokens.push(Token::Op(BinOp::Mod));
                i += 1;
            }
            '=' => {
                // Accept both `=` and `==`
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                }
                tokens.push(Token::Op(BinOp::Eq));
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(BinOp::Ne));
                    i += 2;
                } else {
                    return Err("unexpected '!'".into());
                }
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push(Token::Op(BinOp::Le));
                    i += 2;
                }
                Some('>') => {
                    tokens.push(Token::Op(BinOp::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(BinOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(BinOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(BinOp::Gt));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated string literal".into());
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let num = raw.parse::<f64>().map_err(|_| format!("bad number '{raw}'"))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.to_ascii_lowercase().as_str() {
                    "and" => tokens.push(Token::Op(BinOp::And)),
                    "or" => tokens.push(Token::Op(BinOp::Or)),
                    "not" => tokens.push(Token::Not),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ── Parser (precedence climbing) ─────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Op(BinOp::Or)) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Token::Op(BinOp::And)) {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if matches!(
                op,
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
            ) {
                self.bump();
                let rhs = self.parse_additive()?;
                return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
            }
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.bump();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if matches!(op, BinOp::Mul | BinOp::Div | BinOp::Mod) {
                self.bump();
                let rhs = self.parse_unary()?;
                lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.bump();
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(word)) => {
                let lower = word.to_ascii_lowercase();
                match lower.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "null" => Ok(Expr::Null),
                    "now" => {
                        if self.peek() == Some(&Token::LParen) {
                            self.bump();
                            if self.bump() != Some(Token::RParen) {
                                return Err("expected ')' after now(".into());
                            }
                            Ok(Expr::Now)
                        } else {
                            Ok(Expr::Column(word))
                        }
                    }
                    _ => Ok(Expr::Column(word)),
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                if self.bump() != Some(Token::RParen) {
                    return Err("expected ')'".into());
                }
                Ok(inner)
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

// ── Evaluation ───────────────────────────────────────────────────────

fn eval(expr: &Expr, table: &Table, row: usize, now: NaiveDateTime) -> Eval {
    match expr {
        Expr::Number(n) => Eval::Num(*n),
        Expr::Str(s) => Eval::Str(s.clone()),
        Expr::Bool(b) => Eval::Bool(*b),
        Expr::Null => Eval::Null,
        Expr::Now => Eval::Time(now),
        Expr::Column(name) => table
            .column(name)
            .and_then(|c| c.values.get(row))
            .map(Eval::from_cell)
            .unwrap_or(Eval::Null),
        Expr::Unary(UnaryOp::Not, inner) => match eval(inner, table, row, now) {
            Eval::Bool(b) => Eval::Bool(!b),
            _ => Eval::Null,
        },
        Expr::Unary(UnaryOp::Neg, inner) => match eval(inner, table, row, now) {
            Eval::Num(n) => Eval::Num(-n),
            _ => Eval::Null,
        },
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, table, row, now);
            match op {
                BinOp::And => match l {
                    Eval::Bool(false) => Eval::Bool(false),
                    Eval::Bool(true) => eval(rhs, table, row, now),
                    _ => Eval::Null,
                },
                BinOp::Or => match l {
                    Eval::Bool(true) => Eval::Bool(true),
                    Eval::Bool(false) => eval(rhs, table, row, now),
                    _ => Eval::Null,
                },
                _ => {
                    let r = eval(rhs, table, row, now);
                    eval_binary(*op, l, r)
                }
            }
        }
    }
}

fn eval_binary(op: BinOp, l: Eval, r: Eval) -> Eval {
    use BinOp::*;
    if matches!(l, Eval::Null) || matches!(r, Eval::Null) {
        return Eval::Null;
    }
    match op {
        Add | Sub | Mul | Div | Mod => match (l, r) {
            (Eval::Num(a), Eval::Num(b)) => match op {
                Add => Eval::Num(a + b),
                Sub => Eval::Num(a - b),
                Mul => Eval::Num(a * b),
                Div => {
                    if b == 0.0 {
                        Eval::Null
                    } else {
                        Eval::Num(a / b)
                    }
                }
                Mod => {
                    if b == 0.0 {
                        Eval::Null
                    } else {
                        Eval::Num(a % b)
                    }
                }
                _ => Eval::Null,
            },
            _ => Eval::Null,
        },
        Eq | Ne | Lt | Le | Gt | Ge => compare(op, l, r),
        And | Or => Eval::Null, // handled by the caller
    }
}

fn compare(op: BinOp, l: Eval, r: Eval) -> Eval {
    let ord = match (&l, &r) {
        (Eval::Num(a), Eval::Num(b)) => a.partial_cmp(b),
        (Eval::Str(a), Eval::Str(b)) => Some(a.cmp(b)),
        (Eval::Bool(a), Eval::Bool(b)) => Some(a.cmp(b)),
        (Eval::Time(a), Eval::Time(b)) => Some(a.cmp(b)),
        // Textual timestamps compare against now() and timestamp columns
        (Eval::Str(a), Eval::Time(b)) => parse_time(a).map(|t| t.cmp(b)),
        (Eval::Time(a), Eval::Str(b)) => parse_time(b).map(|t| a.cmp(&t)),
        _ => None,
    };
    match ord {
        None => Eval::Null,
        Some(ord) => {
            let result = match op {
                BinOp::Eq => ord == std::cmp::Ordering::Equal,
                BinOp::Ne => ord != std::cmp::Ordering::Equal,
                BinOp::Lt => ord == std::cmp::Ordering::Less,
                BinOp::Le => ord != std::cmp::Ordering::Greater,
                BinOp::Gt => ord == std::cmp::Ordering::Greater,
                BinOp::Ge => ord != std::cmp::Ordering::Less,
                _ => return Eval::Null,
            };
            Eval::Bool(result)
        }
    }
}

fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    if !parses_as_timestamp(raw) {
        return None;
    }
    let s = raw.trim();
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
