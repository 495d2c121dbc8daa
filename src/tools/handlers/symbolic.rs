// Symbolic tools: parse, simplify, solve, differentiate, integrate,
// series expansion.

use anyhow::{bail, Result};
use serde_json::{json, Value};

use crate::expr::calculus::{antiderivative, differentiate, quad, simplify, taylor};
use crate::expr::solve::solve;
use crate::expr::{format_number, ExpressionParser};
use crate::tools::handlers::{parse_required, Handled};
use crate::tools::types::{optional_f64, optional_str, optional_usize, required_str};

pub(crate) fn parse_expression(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let (_, result) = parse_required(parser, text)?;
    let canonical = result.canonical_text.clone().unwrap_or_default();
    let display = format!(
        "Canonical: ${}$\nFree variables: [{}]",
        canonical,
        result.free_variables.join(", ")
    );
    let raw = json!({
        "canonical": canonical,
        "free_variables": result.free_variables,
    });
    Ok((display, Some(raw)))
}

pub(crate) fn simplify_expression(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let (expr, _) = parse_required(parser, text)?;
    let simplified = simplify(&expr);
    let canonical = simplified.canonical_text();
    Ok((format!("${}$", canonical), Some(json!({ "canonical": canonical }))))
}

pub(crate) fn solve_equation(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let variable = optional_str(args, "variable");
    let (expr, _) = parse_required(parser, text)?;

    let (var, roots) = solve(&expr, variable)?;
    if roots.is_empty() {
        return Ok(("No solutions found.".to_string(), None));
    }
    let rendered: Vec<String> = roots.iter().map(|r| r.canonical_text()).collect();
    let raw = json!({ "variable": var, "solutions": rendered });
    Ok((format!("${} = {}$", var, rendered.join(", ")), Some(raw)))
}

pub(crate) fn differentiate_expression(
    parser: &ExpressionParser,
    args: &Value,
) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let variable = optional_str(args, "variable").unwrap_or("x");
    let order = optional_usize(args, "order").unwrap_or(1);
    if order == 0 || order > 10 {
        bail!("order must be between 1 and 10");
    }

    let (expr, _) = parse_required(parser, text)?;
    let mut derivative = expr;
    for _ in 0..order {
        derivative = differentiate(&derivative, variable);
    }
    let canonical = derivative.canonical_text();
    Ok((format!("${}$", canonical), Some(json!({ "canonical": canonical }))))
}

pub(crate) fn integrate_expression(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let variable = optional_str(args, "variable").unwrap_or("x");
    let lower = optional_f64(args, "lower");
    let upper = optional_f64(args, "upper");

    let (expr, _) = parse_required(parser, text)?;

    match (lower, upper) {
        (Some(lower), Some(upper)) => {
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
        (None, None) => {
            let Some(integral) = antiderivative(&expr, variable) else {
                bail!(
                    "no closed-form antiderivative found; provide lower and upper \
                     bounds for numerical integration"
                );
            };
            let canonical = integral.canonical_text();
            Ok((
                format!("${} + C$", canonical),
                Some(json!({ "canonical": canonical })),
            ))
        }
        _ => bail!("provide both lower and upper bounds, or neither"),
    }
}

pub(crate) fn series_expand(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text = required_str(args, "expression")?;
    let variable = optional_str(args, "variable").unwrap_or("x");
    let point = optional_f64(args, "point").unwrap_or(0.0);
    let order = optional_usize(args, "order").unwrap_or(6);
    if order == 0 || order > 20 {
        bail!("order must be between 1 and 20");
    }

    let (expr, _) = parse_required(parser, text)?;
    let series = taylor(&expr, variable, point, order)?;
    let canonical = series.canonical_text();
    let display = format!("${} + O({}^{{{}}})$", canonical, variable, order);
    Ok((display, Some(json!({ "canonical": canonical, "order": order }))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parser() -> ExpressionParser {
        ExpressionParser::new(Duration::from_secs(10))
    }

    #[test]
    fn test_parse_expression_reports_free_variables() {
        let (display, raw) =
            parse_expression(&parser(), &json!({"expression": "x^2 + y"})).unwrap();
        assert!(display.contains("Free variables: [x, y]"));
        assert!(raw.is_some());
    }

    #[test]
    fn test_simplify_folds() {
        let (display, _) = simplify_expression(&parser(), &json!({"expression": "2/4"})).unwrap();
        assert_eq!(display, "$0.5$");
    }

    #[test]
    fn test_solve_renders_roots() {
        let (display, _) =
            solve_equation(&parser(), &json!({"expression": "x^2 - 4 = 0"})).unwrap();
        assert_eq!(display, "$x = -2, 2$");
    }

    #[test]
    fn test_differentiate_second_order() {
        let (display, _) = differentiate_expression(
            &parser(),
            &json!({"expression": "x^3", "order": 2}),
        )
        .unwrap();
        assert!(display.contains("6"));
    }

    #[test]
    fn test_integrate_definite() {
        let (display, raw) = integrate_expression(
            &parser(),
            &json!({"expression": "x^2", "lower": 0.0, "upper": 3.0}),
        )
        .unwrap();
        assert!(display.contains("\\approx 9"));
        let value = raw.unwrap()["value"].as_f64().unwrap();
        assert!((value - 9.0).abs() < 1e-8);
    }

    #[test]
    fn test_integrate_indefinite_polynomial() {
        let (display, _) =
            integrate_expression(&parser(), &json!({"expression": "2x"})).unwrap();
        assert!(display.contains("x^{2}"));
        assert!(display.contains("+ C"));
    }

    #[test]
    fn test_integrate_indefinite_non_polynomial_fails() {
        let err = integrate_expression(&parser(), &json!({"expression": "\\sin(x)"}))
            .unwrap_err();
        assert!(err.to_string().contains("antiderivative"));
    }

    #[test]
    fn test_series_expand_sine() {
        let (display, _) = series_expand(
            &parser(),
            &json!({"expression": "\\sin(x)", "order": 6}),
        )
        .unwrap();
        assert!(display.contains("O(x^{6})"));
    }

    #[test]
    fn test_missing_parameter_is_an_error() {
        assert!(parse_expression(&parser(), &json!({})).is_err());
    }
}
