// Multi-strategy formula parser
//
// Converts a formula string into a symbolic `Expr`. Strategies run in a
// fixed priority order: the LaTeX grammar first (strict: it rejects
// multi-letter identifiers it does not recognize), then the plain infix
// grammar as the lenient baseline. Each attempt runs under its own
// deadline; a deadline hit or parse error aborts only that strategy.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::errors::ParseError;
use crate::expr::ast::{is_greek, Expr, Func};
use crate::expr::normalize::normalize;

/// Which parse strategy produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Latex,
    Plain,
    Failed,
}

/// Outcome of one `parse` call. Constructed fresh per call; immutable.
///
/// `success` is true iff `expression` and `canonical_text` are present and
/// `error` is absent.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub success: bool,
    pub expression: Option<Expr>,
    pub canonical_text: Option<String>,
    pub error: Option<String>,
    pub strategy_used: Strategy,
    pub free_variables: Vec<String>,
}

impl ParseResult {
    fn ok(expr: Expr, strategy: Strategy) -> Self {
        let canonical = expr.canonical_text();
        let free_variables = expr.free_symbols().into_iter().collect();
        Self {
            success: true,
            expression: Some(expr),
            canonical_text: Some(canonical),
            error: None,
            strategy_used: strategy,
            free_variables,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            expression: None,
            canonical_text: None,
            error: Some(error.into()),
            strategy_used: Strategy::Failed,
            free_variables: Vec::new(),
        }
    }
}

/// Cooperative deadline checked inside parser loops.
///
/// This replaces a process-wide alarm: each strategy attempt gets a fresh
/// deadline and a timeout aborts only that attempt.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
}

impl Deadline {
    fn new(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    pub(crate) fn check(&self) -> Result<(), ParseError> {
        if Instant::now() >= self.at {
            Err(ParseError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Stateless formula parser; safe to share across conversations.
#[derive(Debug, Clone)]
pub struct ExpressionParser {
    timeout: Duration,
}

impl ExpressionParser {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Parse a formula string. Never panics and never returns an error to
    /// the caller; failures are reported inside the `ParseResult`.
    pub fn parse(&self, text: &str) -> ParseResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ParseResult::failed("empty input");
        }

        let cleaned = normalize(trimmed);

        let strategies: [(Strategy, fn(&str, &Deadline) -> Result<Expr, ParseError>); 2] =
            [(Strategy::Latex, parse_latex), (Strategy::Plain, parse_plain)];

        for (strategy, run) in strategies {
            let deadline = Deadline::new(self.timeout);
            match run(&cleaned, &deadline) {
                Ok(expr) => return ParseResult::ok(expr, strategy),
                Err(err) => {
                    debug!(?strategy, %err, input = %truncate_input(&cleaned, 80), "parse strategy failed");
                }
            }
        }

        ParseResult::failed(format!(
            "all parse strategies failed for: {}",
            truncate_input(trimmed, 120)
        ))
    }
}

fn truncate_input(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

// ── Tokens shared by both grammars ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    /// Single-letter symbol (LaTeX grammar only)
    Letter(char),
    /// Multi-character identifier (plain grammar) or recognized word
    Ident(String),
    /// Verbatim symbol name from `\mathrm{...}` and friends
    Name(String),
    /// Backslash command without the backslash
    Command(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Underscore,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Pipe,
    Equals,
    Rel(String),
}

/// Function and constant words both lexers recognize without a backslash.
/// Sorted longest-first so greedy matching picks the full name.
const WORDS: &[&str] = &[
    "arcsin", "arccos", "arctan", "log10", "asin", "acos", "atan", "sinh", "cosh", "tanh", "sqrt",
    "log2", "sin", "cos", "tan", "exp", "abs", "ln", "log", "pi",
];

// ── LaTeX grammar ───────────────────────────────────────────────────────

fn lex_latex(input: &str) -> Result<Vec<Tok>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Tok::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Tok::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Tok::Caret);
                i += 1;
            }
            '_' => {
                tokens.push(Tok::Underscore);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Tok::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Tok::RBrace);
                i += 1;
            }
            '[' => {
                tokens.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Tok::RBracket);
                i += 1;
            }
            '|' => {
                tokens.push(Tok::Pipe);
                i += 1;
            }
            '=' => {
                tokens.push(Tok::Equals);
                i += 1;
            }
            '<' | '>' => {
                let mut op = c.to_string();
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    op.push('=');
                    i += 1;
                }
                tokens.push(Tok::Rel(op));
                i += 1;
            }
            '!' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Tok::Rel("!=".to_string()));
                i += 2;
            }
            '\\' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                if i == start {
                    return Err(ParseError::UnexpectedToken("\\".to_string()));
                }
                let name: String = chars[start..i].iter().collect();
                // Text-style wrappers carry a verbatim symbol name, which
                // must not go through the letter-run rules below
                if name == "mathrm" || name == "text" || name == "operatorname" {
                    while i < chars.len() && chars[i] == ' ' {
                        i += 1;
                    }
                    if i >= chars.len() || chars[i] != '{' {
                        return Err(ParseError::UnexpectedToken(name));
                    }
                    i += 1;
                    let word_start = i;
                    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_')
                    {
                        i += 1;
                    }
                    if i >= chars.len() || chars[i] != '}' || i == word_start {
                        return Err(ParseError::UnexpectedToken(name));
                    }
                    let symbol: String = chars[word_start..i].iter().collect();
                    i += 1;
                    tokens.push(Tok::Name(symbol));
                } else {
                    tokens.push(Tok::Command(name));
                }
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidNumber(text.clone()))?;
                tokens.push(Tok::Num(value));
            }
            _ if c.is_ascii_alphabetic() => {
                // Greedy word match first (`sin`, `log10`, `pi`). Runs of
                // one or two unrecognized letters are implicit products of
                // single-letter symbols (`xy`, `2ab`); longer runs are
                // rejected so the plain strategy can claim them as one
                // identifier.
                if let Some(word) = match_word(&chars[i..]) {
                    i += word.len();
                    tokens.push(Tok::Ident(word));
                } else {
                    let start = i;
                    let mut j = i;
                    while j < chars.len()
                        && chars[j].is_ascii_alphabetic()
                        && match_word(&chars[j..]).is_none()
                    {
                        j += 1;
                    }
                    let run = &chars[start..j];
                    if run.len() > 2 {
                        return Err(ParseError::UnknownIdentifier(run.iter().collect()));
                    }
                    for &letter in run {
                        tokens.push(Tok::Letter(letter));
                    }
                    i = j;
                }
            }
            _ => return Err(ParseError::UnexpectedToken(c.to_string())),
        }
    }

    Ok(tokens)
}

fn match_word(rest: &[char]) -> Option<String> {
    for word in WORDS {
        if rest.len() >= word.len() && rest[..word.len()].iter().collect::<String>() == **word {
            return Some((*word).to_string());
        }
    }
    None
}

struct LatexParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    deadline: &'a Deadline,
}

fn parse_latex(input: &str, deadline: &Deadline) -> Result<Expr, ParseError> {
    let tokens = lex_latex(input)?;
    let mut parser = LatexParser {
        tokens,
        pos: 0,
        deadline,
    };
    let expr = parser.relation()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ParseError::UnexpectedToken(format!("{:?}", tok))),
    }
}

impl LatexParser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), ParseError> {
        match self.next() {
            Some(found) if found == *tok => Ok(()),
            Some(found) => Err(ParseError::UnexpectedToken(format!("{:?}", found))),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn relation(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.sum()?;
        match self.peek() {
            Some(Tok::Equals) => {
                self.pos += 1;
                let rhs = self.sum()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some(Tok::Rel(op)) => Err(ParseError::UnsupportedOperator(op.clone())),
            _ => Ok(lhs),
        }
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        loop {
            self.deadline.check()?;
            match self.peek() {
                Some(Tok::Plus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
                }
                Some(Tok::Minus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            self.deadline.check()?;
            match self.peek() {
                Some(Tok::Star) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                Some(Tok::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    lhs = Expr::Div(Box::new(lhs), Box::new(rhs));
                }
                // Implicit multiplication: `2x`, `3\sin(x)`, `(a)(b)`
                Some(Tok::Letter(_))
                | Some(Tok::Ident(_))
                | Some(Tok::Name(_))
                | Some(Tok::Command(_))
                | Some(Tok::LParen)
                | Some(Tok::LBrace) => {
                    let rhs = self.power()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.pos += 1;
                let inner = self.unary()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Tok::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if let Some(Tok::Caret) = self.peek() {
            self.pos += 1;
            let exp = self.unary()?;
            Ok(Expr::Pow(Box::new(base), Box::new(exp)))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        self.deadline.check()?;
        match self.next() {
            Some(Tok::Num(v)) => Ok(Expr::Num(v)),
            Some(Tok::Letter(c)) => {
                if c == 'e' {
                    Ok(Expr::E)
                } else {
                    let name = self.with_subscript(c.to_string())?;
                    Ok(Expr::Sym(name))
                }
            }
            Some(Tok::Ident(word)) => self.word(&word),
            Some(Tok::Name(name)) => Ok(Expr::Sym(name)),
            Some(Tok::Command(name)) => self.command(&name),
            Some(Tok::LParen) => {
                let inner = self.sum()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::LBrace) => {
                let inner = self.sum()?;
                self.expect(&Tok::RBrace)?;
                Ok(inner)
            }
            Some(Tok::LBracket) => {
                let inner = self.sum()?;
                self.expect(&Tok::RBracket)?;
                Ok(inner)
            }
            Some(Tok::Pipe) => {
                let inner = self.sum()?;
                self.expect(&Tok::Pipe)?;
                Ok(Expr::Call(Func::Abs, Box::new(inner)))
            }
            Some(tok) => Err(ParseError::UnexpectedToken(format!("{:?}", tok))),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn word(&mut self, word: &str) -> Result<Expr, ParseError> {
        if word == "pi" {
            return Ok(Expr::Pi);
        }
        match Func::from_name(word) {
            Some(func) => self.function(func),
            None => Err(ParseError::UnknownIdentifier(word.to_string())),
        }
    }

    fn command(&mut self, name: &str) -> Result<Expr, ParseError> {
        match name {
            "frac" => {
                self.expect(&Tok::LBrace)?;
                let numerator = self.sum()?;
                self.expect(&Tok::RBrace)?;
                self.expect(&Tok::LBrace)?;
                let denominator = self.sum()?;
                self.expect(&Tok::RBrace)?;
                Ok(Expr::Div(Box::new(numerator), Box::new(denominator)))
            }
            "sqrt" => {
                let index = if let Some(Tok::LBracket) = self.peek() {
                    self.pos += 1;
                    let idx = self.sum()?;
                    self.expect(&Tok::RBracket)?;
                    Some(idx)
                } else {
                    None
                };
                let arg = self.function_argument()?;
                match index {
                    None => Ok(Expr::Call(Func::Sqrt, Box::new(arg))),
                    Some(n) => Ok(Expr::Pow(
                        Box::new(arg),
                        Box::new(Expr::Div(Box::new(Expr::Num(1.0)), Box::new(n))),
                    )),
                }
            }
            "pi" => Ok(Expr::Pi),
            "log" => {
                let func = match self.peek() {
                    Some(Tok::Underscore) => {
                        self.pos += 1;
                        self.log_base()?
                    }
                    _ => Func::Log10,
                };
                self.function(func)
            }
            "ln" => self.function(Func::Ln),
            _ => {
                if is_greek(name) {
                    let symbol = self.with_subscript(name.to_string())?;
                    return Ok(Expr::Sym(symbol));
                }
                match Func::from_name(name) {
                    Some(func) => self.function(func),
                    None => Err(ParseError::UnknownCommand(name.to_string())),
                }
            }
        }
    }

    fn log_base(&mut self) -> Result<Func, ParseError> {
        let base = match self.next() {
            Some(Tok::Num(v)) => v,
            Some(Tok::LBrace) => {
                let inner = match self.next() {
                    Some(Tok::Num(v)) => v,
                    other => {
                        return Err(ParseError::UnexpectedToken(format!("{:?}", other)));
                    }
                };
                self.expect(&Tok::RBrace)?;
                inner
            }
            other => return Err(ParseError::UnexpectedToken(format!("{:?}", other))),
        };
        if base == 10.0 {
            Ok(Func::Log10)
        } else if base == 2.0 {
            Ok(Func::Log2)
        } else {
            Err(ParseError::UnsupportedOperator(format!("log base {}", base)))
        }
    }

    /// A function application: optional `^{n}` on the function itself
    /// (`\sin^2 x`), then the argument.
    fn function(&mut self, func: Func) -> Result<Expr, ParseError> {
        let exponent = if let Some(Tok::Caret) = self.peek() {
            self.pos += 1;
            Some(self.unary()?)
        } else {
            None
        };
        let arg = self.function_argument()?;
        let call = Expr::Call(func, Box::new(arg));
        match exponent {
            None => Ok(call),
            Some(exp) => Ok(Expr::Pow(Box::new(call), Box::new(exp))),
        }
    }

    /// Function arguments may be parenthesized, braced, or a tight factor
    /// (`\sin x`).
    fn function_argument(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.sum()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(Tok::LBrace) => {
                self.pos += 1;
                let inner = self.sum()?;
                self.expect(&Tok::RBrace)?;
                Ok(inner)
            }
            Some(Tok::Minus) => {
                self.pos += 1;
                let inner = self.function_argument()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            _ => self.power(),
        }
    }

    fn with_subscript(&mut self, base: String) -> Result<String, ParseError> {
        if let Some(Tok::Underscore) = self.peek() {
            self.pos += 1;
            let sub = match self.next() {
                Some(Tok::Num(v)) => crate::expr::ast::format_number(v),
                Some(Tok::Letter(c)) => c.to_string(),
                Some(Tok::LBrace) => {
                    let run = self.subscript_run()?;
                    self.expect(&Tok::RBrace)?;
                    run
                }
                other => return Err(ParseError::UnexpectedToken(format!("{:?}", other))),
            };
            Ok(format!("{}_{}", base, sub))
        } else {
            Ok(base)
        }
    }

    fn subscript_run(&mut self) -> Result<String, ParseError> {
        let mut out = String::new();
        while let Some(tok) = self.peek() {
            match tok {
                Tok::Num(v) => {
                    out.push_str(&crate::expr::ast::format_number(*v));
                    self.pos += 1;
                }
                Tok::Letter(c) => {
                    out.push(*c);
                    self.pos += 1;
                }
                Tok::Ident(word) => {
                    out.push_str(word);
                    self.pos += 1;
                }
                _ => break,
            }
        }
        if out.is_empty() {
            return Err(ParseError::UnexpectedEnd);
        }
        Ok(out)
    }
}

// ── Plain infix grammar ─────────────────────────────────────────────────

fn lex_plain(input: &str) -> Result<Vec<Tok>, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Tok::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Tok::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Tok::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Tok::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Tok::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Tok::RParen);
                i += 1;
            }
            '=' => {
                tokens.push(Tok::Equals);
                i += 1;
            }
            '<' | '>' => {
                let mut op = c.to_string();
                if i + 1 < chars.len() && chars[i + 1] == '=' {
                    op.push('=');
                    i += 1;
                }
                tokens.push(Tok::Rel(op));
                i += 1;
            }
            '!' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Tok::Rel("!=".to_string()));
                i += 2;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation: 2e3, 1.5e-7
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
                    .map_err(|_| ParseError::InvalidNumber(text.clone()))?;
                tokens.push(Tok::Num(value));
            }
            _ if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push(Tok::Ident(name));
            }
            _ => return Err(ParseError::UnexpectedToken(c.to_string())),
        }
    }

    Ok(tokens)
}

struct PlainParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    deadline: &'a Deadline,
}

fn parse_plain(input: &str, deadline: &Deadline) -> Result<Expr, ParseError> {
    let tokens = lex_plain(input)?;
    let mut parser = PlainParser {
        tokens,
        pos: 0,
        deadline,
    };
    let expr = parser.relation()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ParseError::UnexpectedToken(format!("{:?}", tok))),
    }
}

impl PlainParser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), ParseError> {
        match self.next() {
            Some(found) if found == *tok => Ok(()),
            Some(found) => Err(ParseError::UnexpectedToken(format!("{:?}", found))),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn relation(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.sum()?;
        match self.peek() {
            Some(Tok::Equals) => {
                self.pos += 1;
                let rhs = self.sum()?;
                Ok(Expr::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some(Tok::Rel(op)) => Err(ParseError::UnsupportedOperator(op.clone())),
            _ => Ok(lhs),
        }
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.term()?;
        loop {
            self.deadline.check()?;
            match self.peek() {
                Some(Tok::Plus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    lhs = Expr::Add(Box::new(lhs), Box::new(rhs));
                }
                Some(Tok::Minus) => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            self.deadline.check()?;
            match self.peek() {
                Some(Tok::Star) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(rhs));
                }
                Some(Tok::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    lhs = Expr::Div(Box::new(lhs), Box::new(rhs));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Tok::Minus) => {
                self.pos += 1;
                let inner = self.unary()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Some(Tok::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if let Some(Tok::Caret) = self.peek() {
            self.pos += 1;
            let exp = self.unary()?;
            Ok(Expr::Pow(Box::new(base), Box::new(exp)))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        self.deadline.check()?;
        match self.next() {
            Some(Tok::Num(v)) => Ok(Expr::Num(v)),
            Some(Tok::Ident(name)) => {
                if let Some(Tok::LParen) = self.peek() {
                    let func = Func::from_name(&name)
                        .ok_or_else(|| ParseError::UnknownFunction(name.clone()))?;
                    self.pos += 1;
                    let arg = self.sum()?;
                    self.expect(&Tok::RParen)?;
                    Ok(Expr::Call(func, Box::new(arg)))
                } else if name == "pi" {
                    Ok(Expr::Pi)
                } else if name == "e" {
                    Ok(Expr::E)
                } else {
                    Ok(Expr::Sym(name))
                }
            }
            Some(Tok::LParen) => {
                let inner = self.sum()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            Some(tok) => Err(ParseError::UnexpectedToken(format!("{:?}", tok))),
            None => Err(ParseError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parser() -> ExpressionParser {
        ExpressionParser::new(Duration::from_secs(10))
    }

    fn parse_ok(text: &str) -> ParseResult {
        let result = parser().parse(text);
        assert!(result.success, "failed to parse {:?}: {:?}", text, result.error);
        result
    }

    #[test]
    fn test_empty_input_short_circuits() {
        for input in ["", "   ", "\t\n"] {
            let result = parser().parse(input);
            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some("empty input"));
            assert_eq!(result.strategy_used, Strategy::Failed);
        }
    }

    #[test]
    fn test_latex_fraction() {
        let result = parse_ok("\\frac{1}{2}");
        assert_eq!(result.strategy_used, Strategy::Latex);
        assert_eq!(result.canonical_text.as_deref(), Some("\\frac{1}{2}"));
    }

    #[test]
    fn test_latex_implicit_multiplication() {
        let result = parse_ok("2x + 3y");
        assert_eq!(result.strategy_used, Strategy::Latex);
        assert_eq!(result.free_variables, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_latex_polynomial_evaluates() {
        let result = parse_ok("x^{2} + 3x - 7");
        let expr = result.expression.unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), 2.0);
        assert_eq!(expr.eval(&bindings).unwrap(), 3.0);
    }

    #[test]
    fn test_latex_sqrt_with_index() {
        let result = parse_ok("\\sqrt[3]{8}");
        let value = result.expression.unwrap().eval_constant().unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_latex_trig_without_parens() {
        let result = parse_ok("\\sin x + \\cos{y}");
        assert_eq!(result.free_variables, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_latex_sin_squared() {
        let result = parse_ok("\\sin^2 x");
        assert_eq!(result.canonical_text.as_deref(), Some("\\sin(x)^{2}"));
    }

    #[test]
    fn test_latex_greek_and_subscript() {
        let result = parse_ok("\\alpha_1 + x_{12}");
        assert_eq!(
            result.free_variables,
            vec!["alpha_1".to_string(), "x_12".to_string()]
        );
    }

    #[test]
    fn test_latex_absolute_value() {
        let result = parse_ok("|x - 2|");
        let expr = result.expression.unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), -3.0);
        assert_eq!(expr.eval(&bindings).unwrap(), 5.0);
    }

    #[test]
    fn test_plain_fallback_for_multi_letter_symbols() {
        let result = parse_ok("rate * 2 + offset");
        assert_eq!(result.strategy_used, Strategy::Plain);
        assert_eq!(
            result.free_variables,
            vec!["offset".to_string(), "rate".to_string()]
        );
    }

    #[test]
    fn test_latex_mathrm_symbol() {
        let result = parse_ok("\\mathrm{rate} \\cdot 2");
        assert_eq!(result.strategy_used, Strategy::Latex);
        assert_eq!(result.free_variables, vec!["rate".to_string()]);
    }

    #[test]
    fn test_plain_function_call() {
        let result = parse_ok("foo + sqrt(16)");
        assert_eq!(result.strategy_used, Strategy::Plain);
    }

    #[test]
    fn test_plain_scientific_notation() {
        let result = parse_ok("bandwidth * 1.5e3");
        let expr = result.expression.unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("bandwidth".to_string(), 2.0);
        assert_eq!(expr.eval(&bindings).unwrap(), 3000.0);
    }

    #[test]
    fn test_unknown_function_fails_both_strategies() {
        let result = parser().parse("frobnicate(x)");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("all parse strategies failed"));
    }

    #[test]
    fn test_inequalities_are_rejected() {
        let result = parser().parse("x >= 2");
        assert!(!result.success);
    }

    #[test]
    fn test_equation_parses() {
        let result = parse_ok("x^2 = 4");
        assert!(matches!(result.expression, Some(Expr::Eq(_, _))));
    }

    #[test]
    fn test_degree_normalization() {
        let result = parse_ok("90^\\circ");
        let value = result.expression.unwrap().eval_constant().unwrap();
        assert!((value - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_canonical_text() {
        let inputs = [
            "\\frac{x^{2}}{2} + 3x - 7",
            "2/4",
            "\\sqrt{x + 1}",
            "\\sin(x) * \\cos(x)",
            "rate * 2 + offset",
            "\\alpha + |y|",
            "x^2 = 4",
            "e^{-x^{2}}",
            "2 \\pi r",
        ];
        for input in inputs {
            let first = parse_ok(input);
            let canonical = first.canonical_text.clone().unwrap();
            let second = parse_ok(&canonical);
            assert_eq!(
                second.canonical_text.as_deref(),
                Some(canonical.as_str()),
                "canonical text not stable for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_error_mentions_truncated_input() {
        let long_input = "@".repeat(500);
        let result = parser().parse(&long_input);
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.len() < 200);
    }

    #[test]
    fn test_parse_is_stateless() {
        let p = parser();
        let a = p.parse("x + 1");
        let b = p.parse("x + 1");
        assert_eq!(a.canonical_text, b.canonical_text);
    }
}
