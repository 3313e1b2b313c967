//! Right-hand sides written as text, e.g. `-omega^2 * x - gamma * v + sin(t)`.
//!
//! An expression is tokenized, parsed into an [`Expr`] tree, then compiled into
//! a flat [`Program`] for a small stack machine. Names are resolved at compile
//! time: state variables (one per derivative order), parameters, and the time
//! variable `t`.

use crate::traits::ScalarField;
use anyhow::{anyhow, bail, Context, Result};
use std::cell::RefCell;
use std::collections::HashMap;

/// Name under which the time variable is visible to expressions.
pub const TIME_VARIABLE: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Abs,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "exp" => Some(Function::Exp),
            "ln" => Some(Function::Ln),
            "sqrt" => Some(Function::Sqrt),
            "abs" => Some(Function::Abs),
            _ => None,
        }
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Exp => x.exp(),
            Function::Ln => x.ln(),
            Function::Sqrt => x.sqrt(),
            Function::Abs => x.abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Symbol(String),
    Negate(Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Call(Function, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // exponent: 1e-3, 2.5E+4
            if let Some(&(_, e)) = chars.peek() {
                if e == 'e' || e == 'E' {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::from("e");
                    if let Some(&(_, sign)) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exponent.push(sign);
                            lookahead.next();
                        }
                    }
                    let mut digits = 0;
                    while let Some(&(_, d)) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            exponent.push(d);
                            lookahead.next();
                            digits += 1;
                        } else {
                            break;
                        }
                    }
                    if digits > 0 {
                        literal.push_str(&exponent);
                        chars = lookahead;
                    }
                }
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| anyhow!("Invalid number literal '{}' at position {}", literal, pos))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else {
            let token = match c {
                '+' => Token::Op(BinaryOp::Add),
                '-' => Token::Op(BinaryOp::Sub),
                '*' => Token::Op(BinaryOp::Mul),
                '/' => Token::Op(BinaryOp::Div),
                '^' => Token::Op(BinaryOp::Pow),
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => bail!("Unexpected character '{}' at position {}", c, pos),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

/// Parses an expression into a syntax tree.
///
/// Precedence, lowest first: `+ -`, `* /`, unary `-`, `^` (right-associative).
/// So `-x^2` is `-(x^2)` and `2^-1` is `0.5`.
pub fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        bail!("Expression is empty");
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_sum()?;
    if let Some(token) = parser.peek() {
        bail!("Unexpected trailing input starting at {:?}", token);
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
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

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut left = self.parse_product()?;
        while let Some(&Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek() {
            self.next();
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(&Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek() {
            self.next();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Op(BinaryOp::Sub)) = self.peek() {
            self.next();
            let operand = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.next();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    let function = Function::lookup(&name)
                        .ok_or_else(|| anyhow!("Unknown function: {}", name))?;
                    self.next();
                    let argument = self.parse_sum()?;
                    self.expect_closing()?;
                    Ok(Expr::Call(function, Box::new(argument)))
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.parse_sum()?;
                self.expect_closing()?;
                Ok(inner)
            }
            Some(token) => bail!("Unexpected token {:?}", token),
            None => bail!("Unexpected end of expression"),
        }
    }

    fn expect_closing(&mut self) -> Result<()> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => bail!("Expected ')'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Const(f64),
    State(usize),
    Param(usize),
    Time,
    Negate,
    Binary(BinaryOp),
    Call(Function),
}

/// A compiled expression: postfix ops plus the deepest stack they reach,
/// used to size the evaluation stack once.
#[derive(Debug, Clone)]
pub struct Program {
    ops: Vec<Op>,
    max_depth: usize,
}

impl Program {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Resolves names to state and parameter slots.
pub struct Compiler {
    states: HashMap<String, usize>,
    params: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(state_names: &[String], param_names: &[String]) -> Result<Self> {
        let mut states = HashMap::new();
        let mut params = HashMap::new();
        for (i, name) in state_names.iter().enumerate() {
            Self::check_name(name, &states, &params)?;
            states.insert(name.clone(), i);
        }
        for (i, name) in param_names.iter().enumerate() {
            Self::check_name(name, &states, &params)?;
            params.insert(name.clone(), i);
        }
        Ok(Self { states, params })
    }

    fn check_name(
        name: &str,
        states: &HashMap<String, usize>,
        params: &HashMap<String, usize>,
    ) -> Result<()> {
        if name == TIME_VARIABLE {
            bail!("'{}' is reserved for time", TIME_VARIABLE);
        }
        if Function::lookup(name).is_some() {
            bail!("'{}' is a function name", name);
        }
        if states.contains_key(name) || params.contains_key(name) {
            bail!("Duplicate name: {}", name);
        }
        Ok(())
    }

    pub fn compile(&self, expr: &Expr) -> Result<Program> {
        let mut ops = Vec::new();
        let mut depth = 0;
        let mut max_depth = 0;
        self.emit(expr, &mut ops, &mut depth, &mut max_depth)?;
        Ok(Program { ops, max_depth })
    }

    fn emit(
        &self,
        expr: &Expr,
        ops: &mut Vec<Op>,
        depth: &mut usize,
        max_depth: &mut usize,
    ) -> Result<()> {
        match expr {
            Expr::Number(value) => {
                ops.push(Op::Const(*value));
                *depth += 1;
            }
            Expr::Symbol(name) => {
                let op = if name == TIME_VARIABLE {
                    Op::Time
                } else if let Some(&idx) = self.states.get(name) {
                    Op::State(idx)
                } else if let Some(&idx) = self.params.get(name) {
                    Op::Param(idx)
                } else {
                    bail!("Unknown variable or parameter: {}", name);
                };
                ops.push(op);
                *depth += 1;
            }
            Expr::Negate(operand) => {
                self.emit(operand, ops, depth, max_depth)?;
                ops.push(Op::Negate);
            }
            Expr::Call(function, argument) => {
                self.emit(argument, ops, depth, max_depth)?;
                ops.push(Op::Call(*function));
            }
            Expr::Binary(left, op, right) => {
                self.emit(left, ops, depth, max_depth)?;
                self.emit(right, ops, depth, max_depth)?;
                ops.push(Op::Binary(*op));
                *depth -= 1;
            }
        }
        *max_depth = (*max_depth).max(*depth);
        Ok(())
    }
}

/// Default state names for an ODE of the given order: `u`, `u1`, `u2`, ...
/// where `uj` is the j-th derivative.
pub fn state_names(order: usize) -> Vec<String> {
    (0..order)
        .map(|j| if j == 0 { "u".to_string() } else { format!("u{}", j) })
        .collect()
}

/// A compiled expression usable as the right-hand side of a companion system.
pub struct ExpressionRhs {
    program: Program,
    params: Vec<f64>,
    order: usize,
    // Reused across evaluations; makes the type !Sync.
    stack: RefCell<Vec<f64>>,
}

impl ExpressionRhs {
    pub fn compile(
        source: &str,
        state_names: &[String],
        param_names: &[String],
        params: Vec<f64>,
    ) -> Result<Self> {
        if state_names.is_empty() {
            bail!("At least one state variable is required");
        }
        if params.len() != param_names.len() {
            bail!(
                "Parameter count mismatch. Expected {}, got {}.",
                param_names.len(),
                params.len()
            );
        }
        let compiler = Compiler::new(state_names, param_names)?;
        let expr = parse(source).with_context(|| format!("Failed to parse '{}'", source))?;
        let program = compiler
            .compile(&expr)
            .with_context(|| format!("Failed to compile '{}'", source))?;
        let stack = RefCell::new(Vec::with_capacity(program.max_depth));
        Ok(Self {
            program,
            params,
            order: state_names.len(),
            stack,
        })
    }

    /// Number of state variables the expression was compiled against.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn eval(&self, state: &[f64], t: f64) -> f64 {
        let mut stack = self.stack.borrow_mut();
        stack.clear();

        for op in &self.program.ops {
            match *op {
                Op::Const(value) => stack.push(value),
                Op::State(idx) => stack.push(state[idx]),
                Op::Param(idx) => stack.push(self.params[idx]),
                Op::Time => stack.push(t),
                Op::Negate => {
                    let a = pop(&mut stack);
                    stack.push(-a);
                }
                Op::Call(function) => {
                    let a = pop(&mut stack);
                    stack.push(function.apply(a));
                }
                Op::Binary(op) => {
                    let b = pop(&mut stack);
                    let a = pop(&mut stack);
                    stack.push(op.apply(a, b));
                }
            }
        }

        pop(&mut stack)
    }
}

fn pop(stack: &mut Vec<f64>) -> f64 {
    stack.pop().unwrap_or(f64::NAN)
}

impl ScalarField<f64> for ExpressionRhs {
    fn evaluate(&self, state: &[f64], t: f64) -> f64 {
        self.eval(state, t)
    }

    fn order(&self) -> Option<usize> {
        Some(self.order)
    }
}
