// Symbolic simplification, differentiation, series expansion, and
// numerical quadrature over the expression tree.

use std::collections::HashMap;

use crate::errors::EvalError;
use crate::expr::ast::{Expr, Func};
use crate::expr::solve::poly_coeffs;

/// Recursively simplify: constant folding plus the standard identities.
pub fn simplify(expr: &Expr) -> Expr {
    match expr {
        Expr::Num(_) | Expr::Sym(_) | Expr::Pi | Expr::E => expr.clone(),
        Expr::Neg(inner) => match simplify(inner) {
            Expr::Num(v) => Expr::Num(-v),
            Expr::Neg(e) => *e,
            e => Expr::Neg(Box::new(e)),
        },
        Expr::Add(a, b) => match (simplify(a), simplify(b)) {
            (Expr::Num(x), Expr::Num(y)) => Expr::Num(x + y),
            (Expr::Num(z), e) | (e, Expr::Num(z)) if z == 0.0 => e,
            (e, Expr::Neg(n)) => Expr::Sub(Box::new(e), n),
            (a, b) => Expr::Add(Box::new(a), Box::new(b)),
        },
        Expr::Sub(a, b) => match (simplify(a), simplify(b)) {
            (Expr::Num(x), Expr::Num(y)) => Expr::Num(x - y),
            (e, Expr::Num(z)) if z == 0.0 => e,
            (Expr::Num(z), e) if z == 0.0 => simplify(&Expr::Neg(Box::new(e))),
            (a, b) if a == b => Expr::Num(0.0),
            (a, Expr::Neg(n)) => Expr::Add(Box::new(a), n),
            (a, b) => Expr::Sub(Box::new(a), Box::new(b)),
        },
        Expr::Mul(a, b) => match (simplify(a), simplify(b)) {
            (Expr::Num(x), Expr::Num(y)) => Expr::Num(x * y),
            (Expr::Num(z), _) | (_, Expr::Num(z)) if z == 0.0 => Expr::Num(0.0),
            (Expr::Num(o), e) | (e, Expr::Num(o)) if o == 1.0 => e,
            (Expr::Num(m), e) | (e, Expr::Num(m)) if m == -1.0 => {
                simplify(&Expr::Neg(Box::new(e)))
            }
            // Fold nested numeric factors: x * (y * e) -> (x*y) * e
            (Expr::Num(x), Expr::Mul(l, r)) => match (*l, *r) {
                (Expr::Num(y), e) | (e, Expr::Num(y)) => {
                    Expr::Mul(Box::new(Expr::Num(x * y)), Box::new(e))
                }
                (l, r) => Expr::Mul(
                    Box::new(Expr::Num(x)),
                    Box::new(Expr::Mul(Box::new(l), Box::new(r))),
                ),
            },
            (a, b) => Expr::Mul(Box::new(a), Box::new(b)),
        },
        Expr::Div(a, b) => match (simplify(a), simplify(b)) {
            (Expr::Num(x), Expr::Num(y)) if y != 0.0 => Expr::Num(x / y),
            (Expr::Num(z), e) if z == 0.0 && e != Expr::Num(0.0) => Expr::Num(0.0),
            (e, Expr::Num(o)) if o == 1.0 => e,
            (a, b) if a == b && a != Expr::Num(0.0) => Expr::Num(1.0),
            (a, b) => Expr::Div(Box::new(a), Box::new(b)),
        },
        Expr::Pow(base, exp) => match (simplify(base), simplify(exp)) {
            (Expr::Num(x), Expr::Num(y)) => {
                let v = x.powf(y);
                if v.is_finite() {
                    Expr::Num(v)
                } else {
                    Expr::Pow(Box::new(Expr::Num(x)), Box::new(Expr::Num(y)))
                }
            }
            (b, Expr::Num(o)) if o == 1.0 => b,
            (_, Expr::Num(z)) if z == 0.0 => Expr::Num(1.0),
            (Expr::Num(o), _) if o == 1.0 => Expr::Num(1.0),
            (b, e) => Expr::Pow(Box::new(b), Box::new(e)),
        },
        Expr::Call(func, arg) => match simplify(arg) {
            Expr::Num(v) => {
                let out = func.apply(v);
                if out.is_finite() {
                    Expr::Num(out)
                } else {
                    Expr::Call(*func, Box::new(Expr::Num(v)))
                }
            }
            arg => Expr::Call(*func, Box::new(arg)),
        },
        Expr::Eq(a, b) => Expr::Eq(Box::new(simplify(a)), Box::new(simplify(b))),
    }
}

/// Symbolic derivative with respect to `var`, simplified.
pub fn differentiate(expr: &Expr, var: &str) -> Expr {
    simplify(&derivative(expr, var))
}

fn derivative(expr: &Expr, var: &str) -> Expr {
    let num = Expr::Num;
    match expr {
        Expr::Num(_) | Expr::Pi | Expr::E => num(0.0),
        Expr::Sym(name) => {
            if name == var {
                num(1.0)
            } else {
                num(0.0)
            }
        }
        Expr::Neg(inner) => Expr::Neg(Box::new(derivative(inner, var))),
        Expr::Add(a, b) => Expr::Add(
            Box::new(derivative(a, var)),
            Box::new(derivative(b, var)),
        ),
        Expr::Sub(a, b) => Expr::Sub(
            Box::new(derivative(a, var)),
            Box::new(derivative(b, var)),
        ),
        Expr::Mul(a, b) => {
            // Product rule: a'b + ab'
            let left = Expr::Mul(Box::new(derivative(a, var)), b.clone());
            let right = Expr::Mul(a.clone(), Box::new(derivative(b, var)));
            Expr::Add(Box::new(left), Box::new(right))
        }
        Expr::Div(a, b) => {
            // Quotient rule: (a'b - ab') / b^2
            let numerator = Expr::Sub(
                Box::new(Expr::Mul(Box::new(derivative(a, var)), b.clone())),
                Box::new(Expr::Mul(a.clone(), Box::new(derivative(b, var)))),
            );
            let denominator = Expr::Pow(b.clone(), Box::new(num(2.0)));
            Expr::Div(Box::new(numerator), Box::new(denominator))
        }
        Expr::Pow(base, exp) => {
            let base_has_var = base.contains_symbol(var);
            let exp_has_var = exp.contains_symbol(var);
            if !exp_has_var {
                // v * u^(v-1) * u'
                let power = Expr::Pow(
                    base.clone(),
                    Box::new(Expr::Sub(exp.clone(), Box::new(num(1.0)))),
                );
                Expr::Mul(
                    Box::new(Expr::Mul(exp.clone(), Box::new(power))),
                    Box::new(derivative(base, var)),
                )
            } else if !base_has_var {
                // u^v * ln(u) * v'
                Expr::Mul(
                    Box::new(Expr::Mul(
                        Box::new(expr.clone()),
                        Box::new(Expr::Call(Func::Ln, base.clone())),
                    )),
                    Box::new(derivative(exp, var)),
                )
            } else {
                // u^v * (v' ln u + v u' / u)
                let inner = Expr::Add(
                    Box::new(Expr::Mul(
                        Box::new(derivative(exp, var)),
                        Box::new(Expr::Call(Func::Ln, base.clone())),
                    )),
                    Box::new(Expr::Div(
                        Box::new(Expr::Mul(exp.clone(), Box::new(derivative(base, var)))),
                        base.clone(),
                    )),
                );
                Expr::Mul(Box::new(expr.clone()), Box::new(inner))
            }
        }
        Expr::Call(func, arg) => {
            let outer = match func {
                Func::Sin => Expr::Call(Func::Cos, arg.clone()),
                Func::Cos => Expr::Neg(Box::new(Expr::Call(Func::Sin, arg.clone()))),
                Func::Tan => Expr::Div(
                    Box::new(num(1.0)),
                    Box::new(Expr::Pow(
                        Box::new(Expr::Call(Func::Cos, arg.clone())),
                        Box::new(num(2.0)),
                    )),
                ),
                Func::Asin => Expr::Div(
                    Box::new(num(1.0)),
                    Box::new(Expr::Call(
                        Func::Sqrt,
                        Box::new(Expr::Sub(
                            Box::new(num(1.0)),
                            Box::new(Expr::Pow(arg.clone(), Box::new(num(2.0)))),
                        )),
                    )),
                ),
                Func::Acos => Expr::Neg(Box::new(Expr::Div(
                    Box::new(num(1.0)),
                    Box::new(Expr::Call(
                        Func::Sqrt,
                        Box::new(Expr::Sub(
                            Box::new(num(1.0)),
                            Box::new(Expr::Pow(arg.clone(), Box::new(num(2.0)))),
                        )),
                    )),
                ))),
                Func::Atan => Expr::Div(
                    Box::new(num(1.0)),
                    Box::new(Expr::Add(
                        Box::new(num(1.0)),
                        Box::new(Expr::Pow(arg.clone(), Box::new(num(2.0)))),
                    )),
                ),
                Func::Sinh => Expr::Call(Func::Cosh, arg.clone()),
                Func::Cosh => Expr::Call(Func::Sinh, arg.clone()),
                Func::Tanh => Expr::Sub(
                    Box::new(num(1.0)),
                    Box::new(Expr::Pow(
                        Box::new(Expr::Call(Func::Tanh, arg.clone())),
                        Box::new(num(2.0)),
                    )),
                ),
                Func::Exp => Expr::Call(Func::Exp, arg.clone()),
                Func::Ln => Expr::Div(Box::new(num(1.0)), arg.clone()),
                Func::Log10 => Expr::Div(
                    Box::new(num(1.0)),
                    Box::new(Expr::Mul(
                        arg.clone(),
                        Box::new(Expr::Call(Func::Ln, Box::new(num(10.0)))),
                    )),
                ),
                Func::Log2 => Expr::Div(
                    Box::new(num(1.0)),
                    Box::new(Expr::Mul(
                        arg.clone(),
                        Box::new(Expr::Call(Func::Ln, Box::new(num(2.0)))),
                    )),
                ),
                Func::Sqrt => Expr::Div(
                    Box::new(num(1.0)),
                    Box::new(Expr::Mul(
                        Box::new(num(2.0)),
                        Box::new(Expr::Call(Func::Sqrt, arg.clone())),
                    )),
                ),
                Func::Abs => Expr::Div(arg.clone(), Box::new(Expr::Call(Func::Abs, arg.clone()))),
            };
            Expr::Mul(Box::new(outer), Box::new(derivative(arg, var)))
        }
        Expr::Eq(a, b) => Expr::Eq(
            Box::new(derivative(a, var)),
            Box::new(derivative(b, var)),
        ),
    }
}

/// Taylor expansion of `expr` in `var` around `point`, with `order` terms.
pub fn taylor(expr: &Expr, var: &str, point: f64, order: usize) -> Result<Expr, EvalError> {
    let mut bindings = HashMap::new();
    bindings.insert(var.to_string(), point);

    let mut current = expr.clone();
    let mut factorial = 1.0_f64;
    let mut series: Option<Expr> = None;

    for k in 0..order {
        if k > 0 {
            current = differentiate(&current, var);
            factorial *= k as f64;
        }
        let value = current.eval(&bindings)?;
        if !value.is_finite() {
            return Err(EvalError::Domain(format!(
                "derivative of order {} is not finite at the expansion point",
                k
            )));
        }
        let coeff = value / factorial;
        if coeff == 0.0 {
            continue;
        }

        let offset = if point == 0.0 {
            Expr::sym(var)
        } else {
            Expr::Sub(Box::new(Expr::sym(var)), Box::new(Expr::Num(point)))
        };
        let term = match k {
            0 => Expr::Num(coeff),
            1 => Expr::Mul(Box::new(Expr::Num(coeff)), Box::new(offset)),
            _ => Expr::Mul(
                Box::new(Expr::Num(coeff)),
                Box::new(Expr::Pow(Box::new(offset), Box::new(Expr::Num(k as f64)))),
            ),
        };
        series = Some(match series {
            None => term,
            Some(acc) => Expr::Add(Box::new(acc), Box::new(term)),
        });
    }

    Ok(simplify(&series.unwrap_or(Expr::Num(0.0))))
}

/// Term-wise polynomial antiderivative; `None` when `expr` is not a
/// polynomial in `var`.
pub fn antiderivative(expr: &Expr, var: &str) -> Option<Expr> {
    let coeffs = poly_coeffs(expr, var)?;
    let mut result: Option<Expr> = None;
    for (k, &c) in coeffs.iter().enumerate() {
        if c == 0.0 {
            continue;
        }
        let power = (k + 1) as f64;
        let term = Expr::Mul(
            Box::new(Expr::Num(c / power)),
            Box::new(Expr::Pow(
                Box::new(Expr::sym(var)),
                Box::new(Expr::Num(power)),
            )),
        );
        result = Some(match result {
            None => term,
            Some(acc) => Expr::Add(Box::new(acc), Box::new(term)),
        });
    }
    Some(simplify(&result.unwrap_or(Expr::Num(0.0))))
}

/// Adaptive Simpson quadrature over `[lower, upper]`.
///
/// Returns `(value, error_estimate)`.
pub fn quad(expr: &Expr, var: &str, lower: f64, upper: f64) -> Result<(f64, f64), EvalError> {
    let f = |x: f64| -> Result<f64, EvalError> {
        let mut bindings = HashMap::new();
        bindings.insert(var.to_string(), x);
        expr.eval(&bindings)
    };

    let fa = f(lower)?;
    let fb = f(upper)?;
    let mid = 0.5 * (lower + upper);
    let fm = f(mid)?;
    let whole = simpson(lower, upper, fa, fm, fb);

    let tolerance = 1e-10;
    let (value, error) = adaptive(&f, lower, upper, fa, fm, fb, whole, tolerance, 50)?;
    Ok((value, error))
}

fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

#[allow(clippy::too_many_arguments)]
fn adaptive<F>(
    f: &F,
    a: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
    tolerance: f64,
    depth: u32,
) -> Result<(f64, f64), EvalError>
where
    F: Fn(f64) -> Result<f64, EvalError>,
{
    let mid = 0.5 * (a + b);
    let lm = 0.5 * (a + mid);
    let rm = 0.5 * (mid + b);
    let flm = f(lm)?;
    let frm = f(rm)?;

    let left = simpson(a, mid, fa, flm, fm);
    let right = simpson(mid, b, fm, frm, fb);
    let delta = left + right - whole;

    if depth == 0 || delta.abs() <= 15.0 * tolerance || !delta.is_finite() {
        return Ok((left + right + delta / 15.0, delta.abs() / 15.0));
    }

    let (lv, le) = adaptive(f, a, mid, fa, flm, fm, left, tolerance / 2.0, depth - 1)?;
    let (rv, re) = adaptive(f, mid, b, fm, frm, fb, right, tolerance / 2.0, depth - 1)?;
    Ok((lv + rv, le + re))
}
