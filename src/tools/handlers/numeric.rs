// Numeric tools: evaluation, root finding, quadrature.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use crate::expr::calculus::quad;
use crate::expr::solve::{bisect, newton};
use crate::expr::{format_number, format_sig, Expr, ExpressionParser};
use crate::tools::handlers::{parse_required, Handled};
use crate::tools::types::{
    optional_f64, optional_number_list, optional_str, optional_usize, required_f64, required_str,
};

pub(crate) fn evaluate(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let precision = optional_usize(args, "precision").unwrap_or(12).clamp(1, 17);

    let mut bindings = HashMap::new();
    if let Some(substitutions) = args.get("substitutions").and_then(Value::as_object) {
        for (name, value) in substitutions {
            let value = value
                .as_f64()
                .with_context(|| format!("substitution for {} must be numeric", name))?;
            bindings.insert(name.clone(), value);
        }
    }

    let (expr, _) = parse_required(parser, text)?;
    let value = expr.eval(&bindings)?;
    if !value.is_finite() {
        bail!("expression did not evaluate to a finite value");
    }

    let rendered = format_sig(value, precision);
    Ok((format!("${}$", rendered), Some(json!(value))))
}

pub(crate) fn numerical_solve(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let variable = optional_str(args, "variable").unwrap_or("x");
    let method = optional_str(args, "method").unwrap_or("newton");

    let (expr, _) = parse_required(parser, text)?;
    let f = match expr {
        Expr::Eq(lhs, rhs) => Expr::Sub(lhs, rhs),
        other => other,
    };

    match method {
        "bisect" => {
            let bracket = optional_number_list(args, "bracket")
                .context("bisect requires a bracket [a, b]")?;
            if bracket.len() != 2 {
                bail!("bracket must contain exactly two numbers");
            }
            let root = bisect(&f, variable, bracket[0], bracket[1])?;
            let display = format!(
                "${} \\approx {}$  (bisect on [{}, {}])",
                variable,
                format_number(root),
                format_number(bracket[0]),
                format_number(bracket[1])
            );
            Ok((display, Some(json!(root))))
        }
        "newton" => {
            let x0 = optional_f64(args, "x0").unwrap_or(1.0);
            let root = newton(&f, variable, x0)?;
            let display = format!(
                "${} \\approx {}$  (Newton, x0={})",
                variable,
                format_number(root),
                format_number(x0)
            );
            Ok((display, Some(json!(root))))
        }
        other => bail!("unknown method: {} (expected newton or bisect)", other),
    }
}

pub(crate) fn numerical_integrate(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let variable = optional_str(args, "variable").unwrap_or("x");
    let lower = required_f64(args, "lower")?;
    let upper = required_f64(args, "upper")?;

    let (expr, _) = parse_required(parser, text)?;
    let (value, error) = quad(&expr, variable, lower, upper)?;
    if !value.is_finite() {
        bail!("integrand evaluated to a non-finite value on the interval");
    }

    let display = format!(
        "$\\int_{{{}}}^{{{}}} \\ldots \\, d{} \\approx {}$  (error \u{2264} {:.2e})",
        format_number(lower),
        format_number(upper),
        variable,
        format_number(value),
        error
    );
    Ok((display, Some(json!({ "value": value, "error": error }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parser() -> ExpressionParser {
        ExpressionParser::new(Duration::from_secs(10))
    }

    #[test]
    fn test_evaluate_constant() {
        let (display, raw) = evaluate(&parser(), &json!({"expression": "2^10"})).unwrap();
        assert_eq!(display, "$1024$");
        assert_eq!(raw.unwrap().as_f64().unwrap(), 1024.0);
    }

    #[test]
    fn test_evaluate_with_substitutions() {
        let (display, _) = evaluate(
            &parser(),
            &json!({"expression": "x^2 + y", "substitutions": {"x": 3.0, "y": 1.0}}),
        )
        .unwrap();
        assert_eq!(display, "$10$");
    }

    #[test]
    fn test_evaluate_precision() {
        let (display, _) = evaluate(
            &parser(),
            &json!({"expression": "pi", "precision": 4}),
        )
        .unwrap();
        assert_eq!(display, "$3.142$");
    }

    #[test]
    fn test_evaluate_unbound_symbol_fails() {
        let err = evaluate(&parser(), &json!({"expression": "x + 1"})).unwrap_err();
        assert!(err.to_string().contains("free variables"));
    }

    #[test]
    fn test_evaluate_division_by_zero_fails() {
        assert!(evaluate(&parser(), &json!({"expression": "1/0"})).is_err());
    }

    #[test]
    fn test_numerical_solve_newton() {
        let (display, raw) = numerical_solve(
            &parser(),
            &json!({"expression": "x^2 - 2", "x0": 1.0}),
        )
        .unwrap();
        assert!(display.contains("Newton"));
        let root = raw.unwrap().as_f64().unwrap();
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-8);
    }

    #[test]
    fn test_numerical_solve_bisect() {
        let (_, raw) = numerical_solve(
            &parser(),
            &json!({"expression": "x^3 - 8", "method": "bisect", "bracket": [0.0, 10.0]}),
        )
        .unwrap();
        let root = raw.unwrap().as_f64().unwrap();
        assert!((root - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_numerical_solve_equation_form() {
        let (_, raw) = numerical_solve(
            &parser(),
            &json!({"expression": "\\cos(x) = x", "x0": 0.5}),
        )
        .unwrap();
        let root = raw.unwrap().as_f64().unwrap();
        assert!((root.cos() - root).abs() < 1e-8);
    }

    #[test]
    fn test_numerical_integrate() {
        let (_, raw) = numerical_integrate(
            &parser(),
            &json!({"expression": "\\sin(x)", "lower": 0.0, "upper": std::f64::consts::PI}),
        )
        .unwrap();
        let value = raw.unwrap()["value"].as_f64().unwrap();
        assert!((value - 2.0).abs() < 1e-8);
    }

    #[test]
    fn test_numerical_integrate_requires_bounds() {
        assert!(numerical_integrate(&parser(), &json!({"expression": "x"})).is_err());
    }
}
