// Symbolic expression tree
//
// The canonical text of an expression is its LaTeX rendering; the renderer
// and the LaTeX parse strategy are kept in sync so that canonical text
// always re-parses to the same canonical text.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::errors::EvalError;

/// Built-in functions understood by every parse strategy and the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Log2,
    Sqrt,
    Abs,
}

impl Func {
    /// Look up a function by its plain-text name (`sin`, `log10`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" | "arcsin" => Self::Asin,
            "acos" | "arccos" => Self::Acos,
            "atan" | "arctan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "log" | "log10" => Self::Log10,
            "log2" => Self::Log2,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Log10 => "log10",
            Self::Log2 => "log2",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
        }
    }

    pub fn apply(&self, v: f64) -> f64 {
        match self {
            Self::Sin => v.sin(),
            Self::Cos => v.cos(),
            Self::Tan => v.tan(),
            Self::Asin => v.asin(),
            Self::Acos => v.acos(),
            Self::Atan => v.atan(),
            Self::Sinh => v.sinh(),
            Self::Cosh => v.cosh(),
            Self::Tanh => v.tanh(),
            Self::Exp => v.exp(),
            Self::Ln => v.ln(),
            Self::Log10 => v.log10(),
            Self::Log2 => v.log2(),
            Self::Sqrt => v.sqrt(),
            Self::Abs => v.abs(),
        }
    }
}

/// A parsed symbolic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Sym(String),
    Pi,
    E,
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
    /// An equation `lhs = rhs`; only meaningful to the solver and the
    /// comparison handler.
    Eq(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn num(v: f64) -> Self {
        Self::Num(v)
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Self::Sym(name.into())
    }

    /// Free variables, sorted and deduplicated.
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Num(_) | Self::Pi | Self::E => {}
            Self::Sym(name) => {
                out.insert(name.clone());
            }
            Self::Neg(inner) | Self::Call(_, inner) => inner.collect_symbols(out),
            Self::Add(a, b)
            | Self::Sub(a, b)
            | Self::Mul(a, b)
            | Self::Div(a, b)
            | Self::Pow(a, b)
            | Self::Eq(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
        }
    }

    pub fn contains_symbol(&self, name: &str) -> bool {
        match self {
            Self::Num(_) | Self::Pi | Self::E => false,
            Self::Sym(s) => s == name,
            Self::Neg(inner) | Self::Call(_, inner) => inner.contains_symbol(name),
            Self::Add(a, b)
            | Self::Sub(a, b)
            | Self::Mul(a, b)
            | Self::Div(a, b)
            | Self::Pow(a, b)
            | Self::Eq(a, b) => a.contains_symbol(name) || b.contains_symbol(name),
        }
    }

    /// Numerically evaluate with the given variable bindings.
    ///
    /// Domain problems (log of a negative, 0/0, ...) surface as NaN or
    /// infinity in the result rather than as errors; only unbound symbols
    /// and equations are reported as `EvalError`.
    pub fn eval(&self, bindings: &HashMap<String, f64>) -> Result<f64, EvalError> {
        match self {
            Self::Num(v) => Ok(*v),
            Self::Pi => Ok(std::f64::consts::PI),
            Self::E => Ok(std::f64::consts::E),
            Self::Sym(name) => bindings
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::UnboundSymbol(name.clone())),
            Self::Neg(inner) => Ok(-inner.eval(bindings)?),
            Self::Add(a, b) => Ok(a.eval(bindings)? + b.eval(bindings)?),
            Self::Sub(a, b) => Ok(a.eval(bindings)? - b.eval(bindings)?),
            Self::Mul(a, b) => Ok(a.eval(bindings)? * b.eval(bindings)?),
            Self::Div(a, b) => Ok(a.eval(bindings)? / b.eval(bindings)?),
            Self::Pow(a, b) => Ok(a.eval(bindings)?.powf(b.eval(bindings)?)),
            Self::Call(func, arg) => Ok(func.apply(arg.eval(bindings)?)),
            Self::Eq(_, _) => Err(EvalError::EquationValue),
        }
    }

    /// Evaluate an expression with no free variables.
    pub fn eval_constant(&self) -> Result<f64, EvalError> {
        self.eval(&HashMap::new())
    }

    /// Canonical LaTeX rendering.
    pub fn canonical_text(&self) -> String {
        self.to_string()
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Eq(_, _) => 0,
            Self::Add(_, _) | Self::Sub(_, _) | Self::Neg(_) => 1,
            Self::Num(v) if *v < 0.0 => 1,
            Self::Mul(_, _) => 2,
            Self::Pow(_, _) => 3,
            _ => 4,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        if self.precedence() < min_prec {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{}", format_number(*v)),
            Self::Sym(name) => {
                let (base, sub) = split_subscript(name);
                match sub {
                    Some(sub) if subscript_renderable(base, sub) => {
                        if is_greek(base) {
                            write!(f, "\\{}_{{{}}}", base, sub)
                        } else {
                            write!(f, "{}_{{{}}}", base, sub)
                        }
                    }
                    _ if is_single_letter(name) => write!(f, "{}", name),
                    _ if is_greek(name) => write!(f, "\\{}", name),
                    _ => write!(f, "\\mathrm{{{}}}", name),
                }
            }
            Self::Pi => write!(f, "\\pi"),
            Self::E => write!(f, "e"),
            Self::Neg(inner) => {
                write!(f, "-")?;
                inner.fmt_child(f, 2)
            }
            Self::Add(a, b) => {
                a.fmt_child(f, 1)?;
                write!(f, " + ")?;
                b.fmt_child(f, 2)
            }
            Self::Sub(a, b) => {
                a.fmt_child(f, 1)?;
                write!(f, " - ")?;
                b.fmt_child(f, 2)
            }
            Self::Mul(a, b) => {
                a.fmt_child(f, 2)?;
                write!(f, " \\cdot ")?;
                b.fmt_child(f, 3)
            }
            Self::Div(a, b) => write!(f, "\\frac{{{}}}{{{}}}", a, b),
            Self::Pow(base, exp) => {
                base.fmt_child(f, 4)?;
                write!(f, "^{{{}}}", exp)
            }
            Self::Call(Func::Sqrt, arg) => write!(f, "\\sqrt{{{}}}", arg),
            Self::Call(Func::Abs, arg) => write!(f, "|{}|", arg),
            Self::Call(Func::Log10, arg) => write!(f, "\\log_{{10}}({})", arg),
            Self::Call(Func::Log2, arg) => write!(f, "\\log_{{2}}({})", arg),
            Self::Call(Func::Ln, arg) => write!(f, "\\ln({})", arg),
            Self::Call(func, arg) => write!(f, "\\{}({})", func.name(), arg),
            Self::Eq(a, b) => write!(f, "{} = {}", a, b),
        }
    }
}

const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "omicron", "rho", "sigma", "tau", "upsilon", "phi", "chi", "psi",
    "omega", "Gamma", "Delta", "Theta", "Lambda", "Xi", "Sigma", "Phi", "Psi", "Omega",
];

pub(crate) fn is_greek(name: &str) -> bool {
    GREEK.contains(&name)
}

fn is_single_letter(name: &str) -> bool {
    name.len() == 1 && name.chars().all(|c| c.is_ascii_alphabetic())
}

fn split_subscript(name: &str) -> (&str, Option<&str>) {
    match name.split_once('_') {
        Some((base, sub)) => (base, Some(sub)),
        None => (name, None),
    }
}

/// A subscript renders as `base_{sub}` only when the LaTeX grammar would
/// read it back as the same symbol; anything else falls through to
/// `\mathrm{...}`.
fn subscript_renderable(base: &str, sub: &str) -> bool {
    if !(is_single_letter(base) || is_greek(base)) || sub.is_empty() {
        return false;
    }
    sub.chars().all(|c| c.is_ascii_digit())
        || (sub.len() <= 2 && sub.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Stable numeric formatting: 12 significant digits, trailing zeros
/// trimmed, scientific notation only for extreme magnitudes.
pub fn format_number(v: f64) -> String {
    format_sig(v, 12)
}

/// Format with the given number of significant digits (clamped to 1..=17).
pub fn format_sig(v: f64, digits: usize) -> String {
    let digits = digits.clamp(1, 17);
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return "0".to_string();
    }

    let sci = format!("{:.*e}", digits - 1, v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    // Positional rendering for ordinary magnitudes, scientific otherwise
    if exp >= -4 && exp < 16 {
        let decimals = (digits as i32 - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", decimals, v);
        trim_trailing_zeros(&fixed)
    } else {
        let mantissa = trim_trailing_zeros(mantissa);
        format!("{}e{}", mantissa, exp)
    }
}

fn trim_trailing_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_symbols_sorted_and_deduplicated() {
        let expr = Expr::Add(
            Box::new(Expr::Mul(
                Box::new(Expr::sym("y")),
                Box::new(Expr::sym("x")),
            )),
            Box::new(Expr::sym("x")),
        );
        let symbols: Vec<String> = expr.free_symbols().into_iter().collect();
        assert_eq!(symbols, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_eval_with_bindings() {
        // x^2 + 3x
        let expr = Expr::Add(
            Box::new(Expr::Pow(Box::new(Expr::sym("x")), Box::new(Expr::num(2.0)))),
            Box::new(Expr::Mul(Box::new(Expr::num(3.0)), Box::new(Expr::sym("x")))),
        );
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), 2.0);
        assert_eq!(expr.eval(&bindings).unwrap(), 10.0);
    }

    #[test]
    fn test_eval_unbound_symbol() {
        let expr = Expr::sym("q");
        let err = expr.eval_constant().unwrap_err();
        assert_eq!(err, EvalError::UnboundSymbol("q".to_string()));
    }

    #[test]
    fn test_display_fraction_and_power() {
        let expr = Expr::Div(
            Box::new(Expr::Pow(Box::new(Expr::sym("x")), Box::new(Expr::num(2.0)))),
            Box::new(Expr::num(2.0)),
        );
        assert_eq!(expr.to_string(), "\\frac{x^{2}}{2}");
    }

    #[test]
    fn test_display_parenthesizes_low_precedence_children() {
        // (x + 1) * 2
        let expr = Expr::Mul(
            Box::new(Expr::Add(Box::new(Expr::sym("x")), Box::new(Expr::num(1.0)))),
            Box::new(Expr::num(2.0)),
        );
        assert_eq!(expr.to_string(), "(x + 1) \\cdot 2");
    }

    #[test]
    fn test_display_greek_symbol() {
        let expr = Expr::Add(Box::new(Expr::sym("alpha")), Box::new(Expr::num(1.0)));
        assert_eq!(expr.to_string(), "\\alpha + 1");
    }

    #[test]
    fn test_display_multi_letter_symbol_uses_mathrm() {
        let expr = Expr::sym("rate");
        assert_eq!(expr.to_string(), "\\mathrm{rate}");
    }

    #[test]
    fn test_format_number_trims_zeros() {
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.25), "-2.25");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn test_format_number_rounds_to_twelve_digits() {
        assert_eq!(format_number(1.0 / 3.0), "0.333333333333");
        assert_eq!(format_number(2.0_f64.sqrt()), "1.41421356237");
    }

    #[test]
    fn test_format_number_extreme_magnitudes() {
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(2e20), "2e20");
    }

    #[test]
    fn test_format_sig_precision() {
        assert_eq!(format_sig(std::f64::consts::PI, 4), "3.142");
        assert_eq!(format_sig(1234.5678, 6), "1234.57");
    }
}
