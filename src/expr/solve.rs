// Equation solving
//
// Strategy order: symbolic linear isolation (works with symbolic
// coefficients), numeric polynomial roots (linear/quadratic closed form,
// higher degrees via root sweep), then a generic numeric sweep
// (sign-change bisection plus Newton polishing) for non-polynomial
// equations.

use std::collections::HashMap;

use crate::errors::SolveError;
use crate::expr::ast::Expr;
use crate::expr::calculus::{differentiate, simplify};

const ROOT_TOLERANCE: f64 = 1e-9;
const ROOT_DEDUP: f64 = 1e-6;
const SWEEP_RANGE: (f64, f64) = (-20.0, 20.0);
const SWEEP_STEPS: usize = 400;

/// Solve `expr` (an equation, or an expression assumed `= 0`) for `var`.
///
/// When `var` is `None` the first free symbol (alphabetically) is used,
/// falling back to `x`. Returns the variable actually solved for and the
/// solutions as expressions.
pub fn solve(expr: &Expr, var: Option<&str>) -> Result<(String, Vec<Expr>), SolveError> {
    let f = match expr {
        Expr::Eq(lhs, rhs) => simplify(&Expr::Sub(lhs.clone(), rhs.clone())),
        other => simplify(other),
    };

    let var = match var {
        Some(name) => name.to_string(),
        None => f
            .free_symbols()
            .into_iter()
            .next()
            .unwrap_or_else(|| "x".to_string()),
    };

    if !f.contains_symbol(&var) {
        return Err(SolveError::NotSolvable(format!(
            "equation does not contain the variable {}",
            var
        )));
    }

    // Symbolic linear isolation: f = a*var + b  =>  var = -b/a
    if let Some((a, b)) = linear_coeffs(&f, &var) {
        let a = simplify(&a);
        if a != Expr::Num(0.0) {
            let root = simplify(&Expr::Neg(Box::new(Expr::Div(
                Box::new(b),
                Box::new(a),
            ))));
            return Ok((var, vec![root]));
        }
    }

    // Numeric polynomial roots
    if let Some(coeffs) = poly_coeffs(&f, &var) {
        let roots = poly_roots(&coeffs, &f, &var)?;
        return Ok((var, roots.into_iter().map(Expr::Num).collect()));
    }

    // Generic numeric sweep
    let roots = numeric_roots(&f, &var)?;
    Ok((var, roots.into_iter().map(Expr::Num).collect()))
}

/// Extract `(a, b)` such that `expr = a*var + b`, with `a` and `b` free of
/// `var`. Returns `None` when `expr` is not linear in `var`.
pub(crate) fn linear_coeffs(expr: &Expr, var: &str) -> Option<(Expr, Expr)> {
    if !expr.contains_symbol(var) {
        return Some((Expr::Num(0.0), expr.clone()));
    }
    match expr {
        Expr::Sym(name) if name == var => Some((Expr::Num(1.0), Expr::Num(0.0))),
        Expr::Neg(inner) => {
            let (a, b) = linear_coeffs(inner, var)?;
            Some((Expr::Neg(Box::new(a)), Expr::Neg(Box::new(b))))
        }
        Expr::Add(lhs, rhs) => {
            let (la, lb) = linear_coeffs(lhs, var)?;
            let (ra, rb) = linear_coeffs(rhs, var)?;
            Some((
                Expr::Add(Box::new(la), Box::new(ra)),
                Expr::Add(Box::new(lb), Box::new(rb)),
            ))
        }
        Expr::Sub(lhs, rhs) => {
            let (la, lb) = linear_coeffs(lhs, var)?;
            let (ra, rb) = linear_coeffs(rhs, var)?;
            Some((
                Expr::Sub(Box::new(la), Box::new(ra)),
                Expr::Sub(Box::new(lb), Box::new(rb)),
            ))
        }
        Expr::Mul(lhs, rhs) => {
            let (linear, constant) = if lhs.contains_symbol(var) {
                (lhs, rhs)
            } else {
                (rhs, lhs)
            };
            if constant.contains_symbol(var) {
                return None;
            }
            let (a, b) = linear_coeffs(linear, var)?;
            Some((
                Expr::Mul(Box::new(a), constant.clone()),
                Expr::Mul(Box::new(b), constant.clone()),
            ))
        }
        Expr::Div(lhs, rhs) => {
            if rhs.contains_symbol(var) {
                return None;
            }
            let (a, b) = linear_coeffs(lhs, var)?;
            Some((
                Expr::Div(Box::new(a), rhs.clone()),
                Expr::Div(Box::new(b), rhs.clone()),
            ))
        }
        _ => None,
    }
}

/// Extract numeric polynomial coefficients (ascending degree) of `expr` in
/// `var`. Returns `None` when the expression is not a polynomial with
/// numeric coefficients.
pub(crate) fn poly_coeffs(expr: &Expr, var: &str) -> Option<Vec<f64>> {
    if !expr.contains_symbol(var) {
        return expr.eval_constant().ok().map(|v| vec![v]);
    }
    match expr {
        Expr::Sym(name) if name == var => Some(vec![0.0, 1.0]),
        Expr::Neg(inner) => {
            let mut coeffs = poly_coeffs(inner, var)?;
            for c in &mut coeffs {
                *c = -*c;
            }
            Some(coeffs)
        }
        Expr::Add(lhs, rhs) => Some(poly_add(
            &poly_coeffs(lhs, var)?,
            &poly_coeffs(rhs, var)?,
            1.0,
        )),
        Expr::Sub(lhs, rhs) => Some(poly_add(
            &poly_coeffs(lhs, var)?,
            &poly_coeffs(rhs, var)?,
            -1.0,
        )),
        Expr::Mul(lhs, rhs) => Some(poly_mul(
            &poly_coeffs(lhs, var)?,
            &poly_coeffs(rhs, var)?,
        )),
        Expr::Div(lhs, rhs) => {
            if rhs.contains_symbol(var) {
                return None;
            }
            let denominator = rhs.eval_constant().ok()?;
            if denominator == 0.0 {
                return None;
            }
            let mut coeffs = poly_coeffs(lhs, var)?;
            for c in &mut coeffs {
                *c /= denominator;
            }
            Some(coeffs)
        }
        Expr::Pow(base, exp) => {
            let n = exp.eval_constant().ok()?;
            if n.fract() != 0.0 || !(0.0..=30.0).contains(&n) {
                return None;
            }
            let base_coeffs = poly_coeffs(base, var)?;
            let mut result = vec![1.0];
            for _ in 0..n as usize {
                result = poly_mul(&result, &base_coeffs);
            }
            Some(result)
        }
        _ => None,
    }
}

fn poly_add(a: &[f64], b: &[f64], sign: f64) -> Vec<f64> {
    let mut out = vec![0.0; a.len().max(b.len())];
    for (i, &c) in a.iter().enumerate() {
        out[i] += c;
    }
    for (i, &c) in b.iter().enumerate() {
        out[i] += sign * c;
    }
    out
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

fn poly_roots(coeffs: &[f64], f: &Expr, var: &str) -> Result<Vec<f64>, SolveError> {
    let mut coeffs = coeffs.to_vec();
    while coeffs.len() > 1 && coeffs[coeffs.len() - 1].abs() < 1e-12 {
        coeffs.pop();
    }

    match coeffs.len() {
        0 | 1 => Err(SolveError::NotSolvable(
            "equation reduces to a constant".to_string(),
        )),
        2 => Ok(vec![-coeffs[0] / coeffs[1]]),
        3 => {
            let (c, b, a) = (coeffs[0], coeffs[1], coeffs[2]);
            let discriminant = b * b - 4.0 * a * c;
            if discriminant < 0.0 {
                return Err(SolveError::NoRealSolutions);
            }
            let sqrt_d = discriminant.sqrt();
            let mut roots = vec![(-b - sqrt_d) / (2.0 * a), (-b + sqrt_d) / (2.0 * a)];
            roots.sort_by(|x, y| x.total_cmp(y));
            roots.dedup_by(|x, y| (*x - *y).abs() < ROOT_DEDUP);
            Ok(roots)
        }
        _ => numeric_roots(f, var),
    }
}

/// Sign-change bisection sweep over a fixed interval, with Newton polish
/// from a grid of starting points to catch tangent roots.
fn numeric_roots(f: &Expr, var: &str) -> Result<Vec<f64>, SolveError> {
    let eval = |x: f64| -> Result<f64, SolveError> {
        let mut bindings = HashMap::new();
        bindings.insert(var.to_string(), x);
        Ok(f.eval(&bindings)?)
    };

    let (lo, hi) = SWEEP_RANGE;
    let step = (hi - lo) / SWEEP_STEPS as f64;
    let mut roots: Vec<f64> = Vec::new();

    let mut prev_x = lo;
    let mut prev_y = eval(lo)?;
    for i in 1..=SWEEP_STEPS {
        let x = lo + step * i as f64;
        let y = eval(x)?;
        if prev_y == 0.0 {
            roots.push(prev_x);
        } else if prev_y.is_finite() && y.is_finite() && prev_y * y < 0.0 {
            if let Ok(root) = bisect(f, var, prev_x, x) {
                roots.push(root);
            }
        }
        prev_x = x;
        prev_y = y;
    }

    // Newton polish from coarse grid starts, for roots that touch zero
    // without a sign change
    let derivative = differentiate(f, var);
    for i in 0..=20 {
        let x0 = lo + (hi - lo) * i as f64 / 20.0;
        if let Ok(root) = newton_inner(f, &derivative, var, x0) {
            if (lo..=hi).contains(&root) {
                roots.push(root);
            }
        }
    }

    roots.sort_by(|a, b| a.total_cmp(b));
    roots.dedup_by(|a, b| (*a - *b).abs() < ROOT_DEDUP);
    roots = roots
        .into_iter()
        .filter(|&r| eval(r).map(|v| v.abs() < 1e-6).unwrap_or(false))
        .collect();

    if roots.is_empty() {
        Err(SolveError::NotSolvable(format!(
            "no real roots found in [{}, {}]",
            lo, hi
        )))
    } else {
        Ok(roots)
    }
}

/// Newton's method from `x0`.
pub fn newton(f: &Expr, var: &str, x0: f64) -> Result<f64, SolveError> {
    let derivative = differentiate(f, var);
    newton_inner(f, &derivative, var, x0)
}

fn newton_inner(f: &Expr, derivative: &Expr, var: &str, x0: f64) -> Result<f64, SolveError> {
    let mut bindings = HashMap::new();
    let mut x = x0;

    for _ in 0..100 {
        bindings.insert(var.to_string(), x);
        let y = f.eval(&bindings)?;
        if y.abs() < ROOT_TOLERANCE {
            return Ok(x);
        }
        let slope = derivative.eval(&bindings)?;
        if !slope.is_finite() || slope.abs() < 1e-300 {
            break;
        }
        let next = x - y / slope;
        if !next.is_finite() {
            break;
        }
        if (next - x).abs() < 1e-15 {
            x = next;
            break;
        }
        x = next;
    }

    bindings.insert(var.to_string(), x);
    if f.eval(&bindings)?.abs() < ROOT_TOLERANCE {
        Ok(x)
    } else {
        Err(SolveError::NotSolvable(format!(
            "Newton iteration did not converge from x0 = {}",
            x0
        )))
    }
}

/// Bisection on `[a, b]`; requires a sign change.
pub fn bisect(f: &Expr, var: &str, a: f64, b: f64) -> Result<f64, SolveError> {
    let mut bindings = HashMap::new();
    let mut eval = |x: f64| -> Result<f64, SolveError> {
        bindings.insert(var.to_string(), x);
        Ok(f.eval(&bindings)?)
    };

    let (mut lo, mut hi) = if a < b { (a, b) } else { (b, a) };
    let mut flo = eval(lo)?;
    let fhi = eval(hi)?;

    if flo == 0.0 {
        return Ok(lo);
    }
    if fhi == 0.0 {
        return Ok(hi);
    }
    if flo * fhi > 0.0 {
        return Err(SolveError::NotSolvable(format!(
            "no sign change on [{}, {}]",
            lo, hi
        )));
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        let fmid = eval(mid)?;
        if fmid == 0.0 || (hi - lo) < 1e-14 {
            return Ok(mid);
        }
        if flo * fmid < 0.0 {
            hi = mid;
        } else {
            lo = mid;
            flo = fmid;
        }
    }

    Ok(0.5 * (lo + hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::ExpressionParser;
    use std::time::Duration;

    fn parse(text: &str) -> Expr {
        ExpressionParser::new(Duration::from_secs(10))
            .parse(text)
            .expression
            .expect("parse failed")
    }

    #[test]
    fn test_solve_linear() {
        let (var, roots) = solve(&parse("2x + 6 = 0"), None).unwrap();
        assert_eq!(var, "x");
        assert_eq!(roots, vec![Expr::Num(-3.0)]);
    }

    #[test]
    fn test_solve_linear_both_sides() {
        let (_, roots) = solve(&parse("3x - 7 = 2x + 5"), Some("x")).unwrap();
        assert_eq!(roots, vec![Expr::Num(12.0)]);
    }

    #[test]
    fn test_solve_linear_symbolic_coefficients() {
        let (_, roots) = solve(&parse("a x + b = 0"), Some("x")).unwrap();
        assert_eq!(roots.len(), 1);
        let text = roots[0].canonical_text();
        assert!(text.contains("\\frac"), "expected symbolic root, got {}", text);
    }

    #[test]
    fn test_solve_quadratic() {
        let (_, roots) = solve(&parse("x^2 - 4 = 0"), None).unwrap();
        assert_eq!(roots, vec![Expr::Num(-2.0), Expr::Num(2.0)]);
    }

    #[test]
    fn test_solve_quadratic_no_real_roots() {
        let err = solve(&parse("x^2 + 1 = 0"), None).unwrap_err();
        assert_eq!(err, SolveError::NoRealSolutions);
    }

    #[test]
    fn test_solve_cubic_numerically() {
        let (_, roots) = solve(&parse("x^3 - 6x^2 + 11x - 6 = 0"), None).unwrap();
        let values: Vec<f64> = roots
            .iter()
            .map(|r| r.eval_constant().unwrap())
            .collect();
        assert_eq!(values.len(), 3);
        for (got, want) in values.iter().zip([1.0, 2.0, 3.0]) {
            assert!((got - want).abs() < 1e-6, "got {:?}", values);
        }
    }

    #[test]
    fn test_solve_transcendental() {
        let (_, roots) = solve(&parse("\\cos(x) = 0"), None).unwrap();
        let values: Vec<f64> = roots
            .iter()
            .map(|r| r.eval_constant().unwrap())
            .collect();
        assert!(values
            .iter()
            .any(|v| (v - std::f64::consts::FRAC_PI_2).abs() < 1e-6));
    }

    #[test]
    fn test_solve_missing_variable() {
        assert!(solve(&parse("2 + 2"), Some("x")).is_err());
    }

    #[test]
    fn test_newton_sqrt_two() {
        let root = newton(&parse("x^2 - 2"), "x", 1.0).unwrap();
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-8);
    }

    #[test]
    fn test_bisect_requires_sign_change() {
        assert!(bisect(&parse("x^2 + 1"), "x", -1.0, 1.0).is_err());
        let root = bisect(&parse("x^3 - 8"), "x", 0.0, 10.0).unwrap();
        assert!((root - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_poly_coeffs_extraction() {
        let coeffs = poly_coeffs(&parse("x^2 + 3x - 7"), "x").unwrap();
        assert_eq!(coeffs, vec![-7.0, 3.0, 1.0]);
    }

    #[test]
    fn test_poly_coeffs_rejects_trig() {
        assert!(poly_coeffs(&parse("\\sin(x)"), "x").is_none());
    }
}
