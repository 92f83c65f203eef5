//! Trigger-argument expression evaluator.
//!
//! A shunting-yard evaluator over two bounded stacks (values, operators),
//! matching `original_source/src/lib/expr.c`: infix arithmetic/relational/
//! logical operators, unary `!`/`-`, parenthesized groups, and function
//! calls of up to four arguments. Identifiers resolve against an [`Env`];
//! `$` resolves to the triggering event's argument (the "meta" value bound
//! by the bind runtime when it expands a rule's substitutions).

use kunquat_core::{ErrorKind, KindedError, Tstamp};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

/// Maximum depth of the value/operator stacks — also the evaluator's
/// effective recursion limit, since nested parens/calls grow these stacks
/// rather than the native call stack.
pub const STACK_DEPTH: usize = 32;
const MAX_FN_ARGS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Tstamp(Tstamp),
    Str(String),
    PatInst(i64, i64),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Tstamp(_) => "tstamp",
            Value::Str(_) => "string",
            Value::PatInst(..) => "pat_inst",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Tstamp(t) => Some(t.beats() as f64 + t.rem() as f64 / kunquat_core::BEAT as f64),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_tstamp(&self) -> Option<Tstamp> {
        match self {
            Value::Tstamp(t) => Some(*t),
            Value::Int(i) => Some(Tstamp::new(*i, 0)),
            _ => None,
        }
    }
}

/// Environment that resolves identifiers referenced in an expression.
pub trait Env {
    fn get(&self, name: &str) -> Option<Value>;
}

/// An `Env` with no bindings, useful for expressions that only use `$`.
pub struct EmptyEnv;

impl Env for EmptyEnv {
    fn get(&self, _name: &str) -> Option<Value> {
        None
    }
}

#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
    pub kind: ErrorKind,
}

impl EvalError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl KindedError for EvalError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

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
    Mod,
    Pow,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 6,
            BinOp::Pow => 7,
        }
    }

    fn is_right_assoc(self) -> bool {
        matches!(self, BinOp::Pow)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Value, // placeholder: real value pushed directly to value stack
    Ident(String),
    Dollar,
    LParen,
    RParen,
    Comma,
    Bin(BinOp),
    Un(UnOp),
    FuncStart(String),
}

struct Tokenizer<'a> {
    chars: Vec<char>,
    pos: usize,
    src: &'a str,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            src,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Returns the next token, and for literals, the resolved `Value`
    /// directly (so the caller can push it straight onto the value stack).
    fn next(&mut self, prev_was_operand: bool) -> EvalResult<Option<(Tok, Option<Value>)>> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        if c == '(' {
            self.pos += 1;
            return Ok(Some((Tok::LParen, None)));
        }
        if c == ')' {
            self.pos += 1;
            return Ok(Some((Tok::RParen, None)));
        }
        if c == ',' {
            self.pos += 1;
            return Ok(Some((Tok::Comma, None)));
        }
        if c == '$' {
            self.pos += 1;
            return Ok(Some((Tok::Dollar, None)));
        }
        if c == '"' {
            let s = self.read_string_literal()?;
            return Ok(Some((Tok::Value, Some(Value::Str(s)))));
        }
        if c == '[' {
            let t = self.read_tstamp_literal()?;
            return Ok(Some((Tok::Value, Some(Value::Tstamp(t)))));
        }
        if c.is_ascii_digit() {
            let v = self.read_number_literal()?;
            return Ok(Some((Tok::Value, Some(v))));
        }
        if c == '!' {
            if self.peek_at(1) == Some('=') {
                self.pos += 2;
                return Ok(Some((Tok::Bin(BinOp::Ne), None)));
            }
            self.pos += 1;
            return Ok(Some((Tok::Un(UnOp::Not), None)));
        }
        if c == '-' {
            self.pos += 1;
            if prev_was_operand {
                return Ok(Some((Tok::Bin(BinOp::Sub), None)));
            }
            return Ok(Some((Tok::Un(UnOp::Neg), None)));
        }
        if c == '+' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::Add), None)));
        }
        if c == '*' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::Mul), None)));
        }
        if c == '/' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::Div), None)));
        }
        if c == '%' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::Mod), None)));
        }
        if c == '^' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::Pow), None)));
        }
        if c == '|' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::Or), None)));
        }
        if c == '&' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::And), None)));
        }
        if c == '=' {
            self.pos += 1;
            return Ok(Some((Tok::Bin(BinOp::Eq), None)));
        }
        if c == '<' {
            self.pos += 1;
            if self.peek() == Some('=') {
                self.pos += 1;
                return Ok(Some((Tok::Bin(BinOp::Le), None)));
            }
            return Ok(Some((Tok::Bin(BinOp::Lt), None)));
        }
        if c == '>' {
            self.pos += 1;
            if self.peek() == Some('=') {
                self.pos += 1;
                return Ok(Some((Tok::Bin(BinOp::Ge), None)));
            }
            return Ok(Some((Tok::Bin(BinOp::Gt), None)));
        }
        if c.is_alphabetic() || c == '_' {
            let start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
                self.pos += 1;
            }
            let ident: String = self.chars[start..self.pos].iter().collect();
            self.skip_ws();
            if self.peek() == Some('(') {
                self.pos += 1;
                return Ok(Some((Tok::FuncStart(ident), None)));
            }
            return Ok(Some((Tok::Ident(ident), None)));
        }

        Err(EvalError::new(
            ErrorKind::Format,
            format!("unexpected character '{c}' in expression"),
        ))
    }

    fn read_string_literal(&mut self) -> EvalResult<String> {
        let rest = &self.src[self.byte_pos()..];
        let mut sr = super::streader::Streader::new(rest);
        let s = sr
            .read_string()
            .map_err(|e| EvalError::new(ErrorKind::Format, e.to_string()))?;
        self.advance_by_bytes(sr_consumed(rest, &sr));
        Ok(s)
    }

    fn read_tstamp_literal(&mut self) -> EvalResult<Tstamp> {
        let rest = &self.src[self.byte_pos()..];
        let mut sr = super::streader::Streader::new(rest);
        let t = sr
            .read_tstamp()
            .map_err(|e| EvalError::new(ErrorKind::Format, e.to_string()))?;
        self.advance_by_bytes(sr_consumed(rest, &sr));
        Ok(t)
    }

    fn read_number_literal(&mut self) -> EvalResult<Value> {
        let rest = &self.src[self.byte_pos()..];
        let mut sr = super::streader::Streader::new(rest);
        let mark = sr.mark();
        if let Ok(i) = sr.read_int() {
            self.advance_by_bytes(sr_consumed(rest, &sr));
            return Ok(Value::Int(i));
        }
        sr.reset(mark);
        let f = sr
            .read_float()
            .map_err(|e| EvalError::new(ErrorKind::Format, e.to_string()))?;
        self.advance_by_bytes(sr_consumed(rest, &sr));
        Ok(Value::Float(f))
    }

    fn byte_pos(&self) -> usize {
        self.chars[..self.pos].iter().collect::<String>().len()
    }

    fn advance_by_bytes(&mut self, consumed_bytes: usize) {
        let consumed_str = &self.src[self.byte_pos()..self.byte_pos() + consumed_bytes];
        self.pos += consumed_str.chars().count();
    }
}

fn sr_consumed(rest: &str, sr: &super::streader::Streader<'_>) -> usize {
    // The Streader doesn't expose its position publicly outside the crate
    // boundary in bytes directly comparable to `rest`, but `(crate)`
    // visibility lets us use it here since this module lives in the same
    // crate.
    let _ = rest;
    sr.position()
}

enum StackOp {
    Bin(BinOp),
    Un(UnOp),
    LParen,
    Func { name: String, argc: usize },
}

/// A seeded expression evaluator. Each [`Evaluator`] owns its own PRNG
/// state so two evaluators built from the same seed evaluate `rand(...)`
/// identically — required for deterministic PADsynth-adjacent tests and
/// for replaying a recorded session.
pub struct Evaluator {
    rng: ChaCha8Rng,
}

impl Evaluator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn eval(&mut self, expr: &str, env: &dyn Env, meta: Option<&Value>) -> EvalResult<Value> {
        let mut tokenizer = Tokenizer::new(expr);
        let mut values: Vec<Value> = Vec::with_capacity(STACK_DEPTH);
        let mut ops: Vec<StackOp> = Vec::with_capacity(STACK_DEPTH);
        let mut prev_was_operand = false;

        loop {
            let next = tokenizer.next(prev_was_operand)?;
            let Some((tok, literal)) = next else { break };

            match tok {
                Tok::Value => {
                    push_value(&mut values, literal.unwrap())?;
                    prev_was_operand = true;
                }
                Tok::Dollar => {
                    let v = meta
                        .cloned()
                        .ok_or_else(|| EvalError::new(ErrorKind::Argument, "'$' has no meta value bound"))?;
                    push_value(&mut values, v)?;
                    prev_was_operand = true;
                }
                Tok::Ident(name) => {
                    let v = env.get(&name).ok_or_else(|| {
                        EvalError::new(ErrorKind::Argument, format!("undefined identifier '{name}'"))
                    })?;
                    push_value(&mut values, v)?;
                    prev_was_operand = true;
                }
                Tok::FuncStart(name) => {
                    push_op(&mut ops, StackOp::Func { name, argc: 1 })?;
                    prev_was_operand = false;
                }
                Tok::LParen => {
                    push_op(&mut ops, StackOp::LParen)?;
                    prev_was_operand = false;
                }
                Tok::Comma => {
                    pop_until_marker(&mut values, &mut ops, self)?;
                    match ops.last_mut() {
                        Some(StackOp::Func { argc, .. }) => {
                            *argc += 1;
                            if *argc > MAX_FN_ARGS {
                                return Err(EvalError::new(
                                    ErrorKind::Argument,
                                    "function call exceeds maximum of 4 arguments",
                                ));
                            }
                        }
                        _ => {
                            return Err(EvalError::new(
                                ErrorKind::Format,
                                "',' outside of a function call",
                            ))
                        }
                    }
                    prev_was_operand = false;
                }
                Tok::RParen => {
                    pop_until_marker(&mut values, &mut ops, self)?;
                    match ops.pop() {
                        Some(StackOp::LParen) => {}
                        Some(StackOp::Func { name, argc }) => {
                            call_function(self, &name, argc, &mut values)?;
                        }
                        _ => return Err(EvalError::new(ErrorKind::Format, "unmatched ')'")),
                    }
                    prev_was_operand = true;
                }
                Tok::Bin(op) => {
                    while let Some(top_prec) = top_bin_precedence(&ops) {
                        let pop_it = if op.is_right_assoc() {
                            top_prec > op.precedence()
                        } else {
                            top_prec >= op.precedence()
                        };
                        if !pop_it {
                            break;
                        }
                        apply_top(&mut values, &mut ops)?;
                    }
                    push_op(&mut ops, StackOp::Bin(op))?;
                    prev_was_operand = false;
                }
                Tok::Un(op) => {
                    push_op(&mut ops, StackOp::Un(op))?;
                    prev_was_operand = false;
                }
            }
        }

        while !ops.is_empty() {
            match ops.last() {
                Some(StackOp::LParen) | Some(StackOp::Func { .. }) => {
                    return Err(EvalError::new(ErrorKind::Format, "unmatched '('"))
                }
                _ => apply_top(&mut values, &mut ops)?,
            }
        }

        if values.len() != 1 {
            return Err(EvalError::new(
                ErrorKind::Format,
                "expression did not reduce to a single value",
            ));
        }
        Ok(values.pop().unwrap())
    }
}

fn push_value(values: &mut Vec<Value>, v: Value) -> EvalResult<()> {
    if values.len() >= STACK_DEPTH {
        return Err(EvalError::new(ErrorKind::Resource, "value stack overflow"));
    }
    values.push(v);
    Ok(())
}

fn push_op(ops: &mut Vec<StackOp>, op: StackOp) -> EvalResult<()> {
    if ops.len() >= STACK_DEPTH {
        return Err(EvalError::new(ErrorKind::Resource, "operator stack overflow"));
    }
    ops.push(op);
    Ok(())
}

fn top_bin_precedence(ops: &[StackOp]) -> Option<u8> {
    match ops.last()? {
        StackOp::Bin(op) => Some(op.precedence()),
        StackOp::Un(_) => Some(8), // unary always binds tighter than any binary op
        _ => None,
    }
}

fn pop_until_marker(values: &mut Vec<Value>, ops: &mut Vec<StackOp>, eval: &mut Evaluator) -> EvalResult<()> {
    loop {
        match ops.last() {
            Some(StackOp::LParen) | Some(StackOp::Func { .. }) | None => return Ok(()),
            _ => apply_top_with(values, ops, eval)?,
        }
    }
}

fn apply_top(values: &mut Vec<Value>, ops: &mut Vec<StackOp>) -> EvalResult<()> {
    let mut dummy = Evaluator {
        rng: ChaCha8Rng::seed_from_u64(0),
    };
    apply_top_with(values, ops, &mut dummy)
}

fn apply_top_with(values: &mut Vec<Value>, ops: &mut Vec<StackOp>, _eval: &mut Evaluator) -> EvalResult<()> {
    match ops.pop() {
        Some(StackOp::Bin(op)) => {
            let b = values.pop().ok_or_else(stack_underflow)?;
            let a = values.pop().ok_or_else(stack_underflow)?;
            values.push(apply_bin(op, a, b)?);
            Ok(())
        }
        Some(StackOp::Un(op)) => {
            let a = values.pop().ok_or_else(stack_underflow)?;
            values.push(apply_un(op, a)?);
            Ok(())
        }
        other => {
            if let Some(o) = other {
                ops.push(o);
            }
            Err(EvalError::new(ErrorKind::Format, "malformed expression"))
        }
    }
}

fn stack_underflow() -> EvalError {
    EvalError::new(ErrorKind::Format, "operator applied with missing operand")
}

/// Numeric domain lattice used to decide how a binary arithmetic/relational
/// op promotes its operands: `Int < Tstamp < Float`.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum Domain {
    Int,
    Tstamp,
    Float,
}

fn domain_of(v: &Value) -> Option<Domain> {
    match v {
        Value::Int(_) => Some(Domain::Int),
        Value::Tstamp(_) => Some(Domain::Tstamp),
        Value::Float(_) => Some(Domain::Float),
        _ => None,
    }
}

fn apply_bin(op: BinOp, a: Value, b: Value) -> EvalResult<Value> {
    match op {
        BinOp::Or | BinOp::And => {
            let (x, y) = (
                a.as_bool()
                    .ok_or_else(|| type_err("logical operator requires bool operands", &a))?,
                b.as_bool()
                    .ok_or_else(|| type_err("logical operator requires bool operands", &b))?,
            );
            Ok(Value::Bool(if op == BinOp::Or { x || y } else { x && y }))
        }
        BinOp::Eq | BinOp::Ne => Ok(Value::Bool(equals(&a, &b)? == (op == BinOp::Eq))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, &a, &b),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
            arithmetic(op, a, b)
        }
    }
}

fn type_err(message: &str, v: &Value) -> EvalError {
    EvalError::new(
        ErrorKind::Argument,
        format!("{message} (found {})", v.type_name()),
    )
}

fn equals(a: &Value, b: &Value) -> EvalResult<bool> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::PatInst(p1, i1), Value::PatInst(p2, i2)) => Ok(p1 == p2 && i1 == i2),
        _ => {
            let da = domain_of(a);
            let db = domain_of(b);
            match (da, db) {
                (Some(_), Some(_)) => numeric_equals(a, b),
                _ => Err(EvalError::new(
                    ErrorKind::Argument,
                    format!(
                        "cannot compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    ),
                )),
            }
        }
    }
}

fn numeric_equals(a: &Value, b: &Value) -> EvalResult<bool> {
    let target = domain_of(a).unwrap().max(domain_of(b).unwrap());
    if target == Domain::Tstamp {
        return Ok(a.as_tstamp().unwrap() == b.as_tstamp().unwrap());
    }
    Ok(a.as_f64().unwrap() == b.as_f64().unwrap())
}

fn compare(op: BinOp, a: &Value, b: &Value) -> EvalResult<Value> {
    let (da, db) = (
        domain_of(a).ok_or_else(|| type_err("relational operator requires numeric operands", a))?,
        domain_of(b).ok_or_else(|| type_err("relational operator requires numeric operands", b))?,
    );
    let target = da.max(db);
    let ordering = if target == Domain::Tstamp {
        a.as_tstamp().unwrap().cmp(&b.as_tstamp().unwrap())
    } else {
        a.as_f64()
            .unwrap()
            .partial_cmp(&b.as_f64().unwrap())
            .ok_or_else(|| EvalError::new(ErrorKind::Argument, "NaN is not ordered"))?
    };
    use std::cmp::Ordering::*;
    let result = match op {
        BinOp::Lt => ordering == Less,
        BinOp::Le => ordering != Greater,
        BinOp::Gt => ordering == Greater,
        BinOp::Ge => ordering != Less,
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinOp, a: Value, b: Value) -> EvalResult<Value> {
    let (da, db) = (
        domain_of(&a).ok_or_else(|| type_err("arithmetic operator requires numeric operands", &a))?,
        domain_of(&b).ok_or_else(|| type_err("arithmetic operator requires numeric operands", &b))?,
    );
    let target = da.max(db);

    if target == Domain::Int {
        let (x, y) = (int_of(&a), int_of(&b));
        return int_arithmetic(op, x, y);
    }

    if target == Domain::Tstamp && matches!(op, BinOp::Add | BinOp::Sub) {
        let (x, y) = (a.as_tstamp().unwrap(), b.as_tstamp().unwrap());
        return Ok(Value::Tstamp(if op == BinOp::Add { x + y } else { x - y }));
    }

    // Float domain, or a Tstamp operand combined with *, /, %, ^ — those
    // have no exact rational meaning here, so fall back to float.
    let (x, y) = (a.as_f64().unwrap(), b.as_f64().unwrap());
    float_arithmetic(op, x, y)
}

fn int_of(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        _ => unreachable!("caller already checked domain"),
    }
}

fn int_arithmetic(op: BinOp, x: i64, y: i64) -> EvalResult<Value> {
    match op {
        BinOp::Add => x
            .checked_add(y)
            .map(Value::Int)
            .ok_or_else(|| EvalError::new(ErrorKind::Resource, "integer overflow")),
        BinOp::Sub => x
            .checked_sub(y)
            .map(Value::Int)
            .ok_or_else(|| EvalError::new(ErrorKind::Resource, "integer overflow")),
        BinOp::Mul => x
            .checked_mul(y)
            .map(Value::Int)
            .ok_or_else(|| EvalError::new(ErrorKind::Resource, "integer overflow")),
        BinOp::Div => {
            if y == 0 {
                return Err(EvalError::new(ErrorKind::Argument, "division by zero"));
            }
            if x % y == 0 {
                Ok(Value::Int(x / y))
            } else {
                Ok(Value::Float(x as f64 / y as f64))
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(EvalError::new(ErrorKind::Argument, "modulo by zero"));
            }
            Ok(Value::Int(x % y))
        }
        BinOp::Pow => {
            if x == 0 && y == 0 {
                return Err(EvalError::new(ErrorKind::Argument, "0^0 is undefined"));
            }
            if y >= 0 {
                match x.checked_pow(y as u32) {
                    Some(v) => Ok(Value::Int(v)),
                    None => Ok(Value::Float((x as f64).powf(y as f64))),
                }
            } else {
                Ok(Value::Float((x as f64).powf(y as f64)))
            }
        }
        _ => unreachable!(),
    }
}

fn float_arithmetic(op: BinOp, x: f64, y: f64) -> EvalResult<Value> {
    match op {
        BinOp::Add => Ok(Value::Float(x + y)),
        BinOp::Sub => Ok(Value::Float(x - y)),
        BinOp::Mul => Ok(Value::Float(x * y)),
        BinOp::Div => {
            if y == 0.0 {
                return Err(EvalError::new(ErrorKind::Argument, "division by zero"));
            }
            Ok(Value::Float(x / y))
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(EvalError::new(ErrorKind::Argument, "modulo by zero"));
            }
            Ok(Value::Float(x % y))
        }
        BinOp::Pow => {
            if x == 0.0 && y == 0.0 {
                return Err(EvalError::new(ErrorKind::Argument, "0^0 is undefined"));
            }
            Ok(Value::Float(x.powf(y)))
        }
        _ => unreachable!(),
    }
}

fn apply_un(op: UnOp, a: Value) -> EvalResult<Value> {
    match op {
        UnOp::Not => {
            let b = a
                .as_bool()
                .ok_or_else(|| type_err("'!' requires a bool operand", &a))?;
            Ok(Value::Bool(!b))
        }
        UnOp::Neg => match a {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Tstamp(t) => Ok(Value::Tstamp(Tstamp::ZERO - t)),
            other => Err(type_err("unary '-' requires a numeric operand", &other)),
        },
    }
}

fn call_function(
    eval: &mut Evaluator,
    name: &str,
    argc: usize,
    values: &mut Vec<Value>,
) -> EvalResult<()> {
    if values.len() < argc {
        return Err(EvalError::new(ErrorKind::Format, "malformed function call"));
    }
    let args: Vec<Value> = values.split_off(values.len() - argc);

    let result = match name {
        "ts" => {
            expect_argc(name, &args, 2)?;
            let beats = expect_int(&args[0])?;
            let rem = expect_int(&args[1])?;
            let rem = i32::try_from(rem)
                .map_err(|_| EvalError::new(ErrorKind::Argument, "ts() rem out of range"))?;
            Tstamp::try_new(beats, rem)
                .map(Value::Tstamp)
                .ok_or_else(|| EvalError::new(ErrorKind::Argument, "ts() rem out of [0, BEAT) range"))?
        }
        "pat" => {
            expect_argc(name, &args, 2)?;
            Value::PatInst(expect_int(&args[0])?, expect_int(&args[1])?)
        }
        "rand" => {
            expect_argc(name, &args, 1)?;
            match &args[0] {
                Value::Int(bound) => {
                    if *bound <= 0 {
                        return Err(EvalError::new(ErrorKind::Argument, "rand() bound must be positive"));
                    }
                    Value::Int(eval.rng.gen_range(0..*bound))
                }
                other => {
                    let bound = other
                        .as_f64()
                        .ok_or_else(|| type_err("rand() requires a numeric bound", other))?;
                    if bound <= 0.0 {
                        return Err(EvalError::new(ErrorKind::Argument, "rand() bound must be positive"));
                    }
                    Value::Float(eval.rng.gen_range(0.0..bound))
                }
            }
        }
        "min" | "max" => {
            expect_argc(name, &args, 2)?;
            let (a, b) = (&args[0], &args[1]);
            let fa = a
                .as_f64()
                .ok_or_else(|| type_err("min/max require numeric operands", a))?;
            let fb = b
                .as_f64()
                .ok_or_else(|| type_err("min/max require numeric operands", b))?;
            let pick_a = if name == "min" { fa <= fb } else { fa >= fb };
            if pick_a { a.clone() } else { b.clone() }
        }
        other => {
            return Err(EvalError::new(
                ErrorKind::Argument,
                format!("unknown function '{other}'"),
            ))
        }
    };
    push_value(values, result)
}

fn expect_argc(name: &str, args: &[Value], n: usize) -> EvalResult<()> {
    if args.len() != n {
        return Err(EvalError::new(
            ErrorKind::Argument,
            format!("{name}() expects {n} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

fn expect_int(v: &Value) -> EvalResult<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(type_err("expected integer argument", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_precedence() {
        let mut e = Evaluator::new(1);
        let v = e.eval("1 + 2 * 3", &EmptyEnv, None).unwrap();
        assert_eq!(v, Value::Int(7));
    }

    #[test]
    fn parentheses_override_precedence() {
        let mut e = Evaluator::new(1);
        let v = e.eval("(1 + 2) * 3", &EmptyEnv, None).unwrap();
        assert_eq!(v, Value::Int(9));
    }

    #[test]
    fn unary_minus_and_not() {
        let mut e = Evaluator::new(1);
        assert_eq!(e.eval("-5 + 2", &EmptyEnv, None).unwrap(), Value::Int(-3));
        assert_eq!(e.eval("!(1 = 2)", &EmptyEnv, None).unwrap(), Value::Bool(true));
    }

    #[test]
    fn integer_division_falls_back_to_float() {
        let mut e = Evaluator::new(1);
        assert_eq!(e.eval("6 / 3", &EmptyEnv, None).unwrap(), Value::Int(2));
        assert_eq!(e.eval("7 / 2", &EmptyEnv, None).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_errors() {
        let mut e = Evaluator::new(1);
        assert!(e.eval("1 / 0", &EmptyEnv, None).is_err());
        assert!(e.eval("0 ^ 0", &EmptyEnv, None).is_err());
    }

    #[test]
    fn ts_function_builds_tstamp() {
        let mut e = Evaluator::new(1);
        let v = e.eval("ts(4, 0)", &EmptyEnv, None).unwrap();
        assert_eq!(v, Value::Tstamp(Tstamp::new(4, 0)));
    }

    #[test]
    fn pat_function_builds_ref() {
        let mut e = Evaluator::new(1);
        let v = e.eval("pat(2, 1)", &EmptyEnv, None).unwrap();
        assert_eq!(v, Value::PatInst(2, 1));
    }

    #[test]
    fn rand_is_deterministic_for_fixed_seed() {
        let mut e1 = Evaluator::new(42);
        let mut e2 = Evaluator::new(42);
        let a = e1.eval("rand(100)", &EmptyEnv, None).unwrap();
        let b = e2.eval("rand(100)", &EmptyEnv, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dollar_resolves_meta_value() {
        let mut e = Evaluator::new(1);
        let meta = Value::Int(9);
        let v = e.eval("$ + 1", &EmptyEnv, Some(&meta)).unwrap();
        assert_eq!(v, Value::Int(10));
    }

    struct OneVarEnv;
    impl Env for OneVarEnv {
        fn get(&self, name: &str) -> Option<Value> {
            if name == "force" {
                Some(Value::Float(0.5))
            } else {
                None
            }
        }
    }

    #[test]
    fn identifiers_resolve_through_env() {
        let mut e = Evaluator::new(1);
        let v = e.eval("force * 2", &OneVarEnv, None).unwrap();
        assert_eq!(v, Value::Float(1.0));
    }

    #[test]
    fn function_arg_limit_is_enforced() {
        let mut e = Evaluator::new(1);
        let err = e.eval("min(1, 2, 3, 4, 5)", &EmptyEnv, None);
        assert!(err.is_err());
    }

    #[test]
    fn tstamp_addition_is_exact() {
        let mut e = Evaluator::new(1);
        let v = e.eval("ts(1, 0) + ts(0, 5)", &EmptyEnv, None).unwrap();
        assert_eq!(v, Value::Tstamp(Tstamp::new(1, 5)));
    }
}
