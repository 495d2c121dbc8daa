// Function plotting: samples expressions over a range and returns
// chart-ready JSON series (the frontend renders them; nothing is
// rasterized here).

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::expr::ExpressionParser;
use crate::tools::handlers::Handled;
use crate::tools::types::{optional_number_list, optional_str, optional_usize, string_list};

const MAX_POINTS: usize = 2000;

pub(crate) fn plot_function(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let expressions = string_list(args, "expressions")?;
    if expressions.is_empty() {
        bail!("expressions must not be empty");
    }
    let variable = optional_str(args, "variable").unwrap_or("x");
    let title = optional_str(args, "title");
    let num_points = optional_usize(args, "num_points").unwrap_or(200).clamp(2, MAX_POINTS);

    let range = optional_number_list(args, "x_range").unwrap_or_else(|| vec![-10.0, 10.0]);
    if range.len() != 2 || range[0] >= range[1] {
        bail!("x_range must be [xmin, xmax] with xmin < xmax");
    }
    let (xmin, xmax) = (range[0], range[1]);

    let step = (xmax - xmin) / (num_points - 1) as f64;
    let xs: Vec<f64> = (0..num_points).map(|i| xmin + step * i as f64).collect();

    let mut series = Vec::new();
    for text in &expressions {
        let parsed = parser.parse(text);
        let Some(expr) = parsed.expression else {
            debug!(expression = %text, "skipping unparseable plot expression");
            continue;
        };
        let name = parsed.canonical_text.unwrap_or_else(|| text.clone());

        let mut bindings = HashMap::new();
        let ys: Vec<Value> = xs
            .iter()
            .map(|&x| {
                bindings.insert(variable.to_string(), x);
                match expr.eval(&bindings) {
                    Ok(y) if y.is_finite() => json!(y),
                    _ => Value::Null,
                }
            })
            .collect();

        series.push(json!({
            "x": xs,
            "y": ys,
            "type": "scatter",
            "mode": "lines",
            "name": name,
        }));
    }

    if series.is_empty() {
        bail!("none of the expressions could be parsed");
    }

    let chart = json!({
        "data": series,
        "layout": {
            "title": title,
            "xaxis": { "title": variable },
            "yaxis": { "title": "y" },
        }
    });
    let display = format!(
        "Sampled {} function(s) over [{}, {}] at {} points.",
        chart["data"].as_array().map(Vec::len).unwrap_or(0),
        xmin,
        xmax,
        num_points
    );
    Ok((display, Some(chart)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn parser() -> ExpressionParser {
        ExpressionParser::new(Duration::from_secs(10))
    }

    #[test]
    fn test_plot_single_function() {
        let (display, raw) = plot_function(
            &parser(),
            &json!({"expressions": ["x^2"], "x_range": [0.0, 2.0], "num_points": 5}),
        )
        .unwrap();
        assert!(display.contains("1 function(s)"));
        let chart = raw.unwrap();
        let ys = chart["data"][0]["y"].as_array().unwrap();
        assert_eq!(ys.len(), 5);
        assert_eq!(ys[4].as_f64().unwrap(), 4.0);
    }

    #[test]
    fn test_plot_masks_non_finite_points() {
        let (_, raw) = plot_function(
            &parser(),
            &json!({"expressions": ["1/x"], "x_range": [-1.0, 1.0], "num_points": 3}),
        )
        .unwrap();
        let ys = raw.unwrap()["data"][0]["y"].clone();
        // Middle sample is x = 0, where 1/x is not finite
        assert!(ys[1].is_null());
    }

    #[test]
    fn test_plot_skips_unparseable_expressions() {
        let (display, _) = plot_function(
            &parser(),
            &json!({"expressions": ["x^2", "@@@"], "num_points": 4}),
        )
        .unwrap();
        assert!(display.contains("1 function(s)"));
    }

    #[test]
    fn test_plot_all_unparseable_is_an_error() {
        assert!(plot_function(&parser(), &json!({"expressions": ["@@@"]})).is_err());
    }

    #[test]
    fn test_plot_invalid_range() {
        assert!(plot_function(
            &parser(),
            &json!({"expressions": ["x"], "x_range": [3.0, 1.0]})
        )
        .is_err());
    }
}
