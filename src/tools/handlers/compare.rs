// Answer equivalence checking.
//
// Check order is load-bearing: symbolic difference first, then numeric
// cross-evaluation at fixed-seed sample points, then direct numeric
// comparison, and only as a last resort (both sides unparseable) stripped
// string equality. Structurally different but mathematically equal
// answers are the common case here, so string comparison must never win
// early.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use crate::expr::calculus::simplify;
use crate::expr::normalize::{find_boxed_answer, normalize};
use crate::expr::{Expr, ExpressionParser};
use crate::tools::handlers::Handled;
use crate::tools::types::required_str;

const SAMPLE_POINTS: usize = 20;
const SAMPLE_SEED: u64 = 42;
const SAMPLE_RANGE: (f64, f64) = (-10.0, 10.0);
const RELATIVE_TOLERANCE: f64 = 1e-9;
const ABSOLUTE_TOLERANCE: f64 = 1e-12;

pub(crate) fn compare_answers(parser: &ExpressionParser, args: &Value) -> Result<Handled> {
    let text_a = required_str(args, "answer_a")?;
    let text_b = required_str(args, "answer_b")?;

    let a = parser.parse(&unbox(text_a));
    let b = parser.parse(&unbox(text_b));

    let (Some(expr_a), Some(expr_b)) = (a.expression, b.expression) else {
        // Neither symbolic nor numeric checks are possible
        let equal = stripped(text_a) == stripped(text_b);
        return Ok(verdict(equal, "string"));
    };

    // Equations compare as their residuals
    let expr_a = residual(expr_a);
    let expr_b = residual(expr_b);

    // 1. Symbolic: difference simplifies to zero
    let difference = simplify(&Expr::Sub(
        Box::new(expr_a.clone()),
        Box::new(expr_b.clone()),
    ));
    if difference == Expr::Num(0.0) {
        return Ok(verdict(true, "symbolic"));
    }

    let free: BTreeSet<String> = expr_a
        .free_symbols()
        .union(&expr_b.free_symbols())
        .cloned()
        .collect();

    if !free.is_empty() {
        // 2. Numeric cross-evaluation at reproducible sample points
        if let Some(equal) = sampled_equality(&expr_a, &expr_b, &free) {
            let label = format!("numeric, {} sample points", SAMPLE_POINTS);
            return Ok(verdict(equal, &label));
        }
    } else {
        // 3. Direct numeric comparison
        if let (Ok(va), Ok(vb)) = (expr_a.eval_constant(), expr_b.eval_constant()) {
            return Ok(verdict(close(va, vb), "numeric"));
        }
    }

    // Evaluation failed somewhere: structural equality is all that is left
    Ok(verdict(expr_a == expr_b, "structural"))
}

fn unbox(text: &str) -> String {
    find_boxed_answer(text).unwrap_or_else(|| text.to_string())
}

fn stripped(text: &str) -> String {
    normalize(text).replace(' ', "")
}

fn residual(expr: Expr) -> Expr {
    match expr {
        Expr::Eq(lhs, rhs) => Expr::Sub(lhs, rhs),
        other => other,
    }
}

fn sampled_equality(a: &Expr, b: &Expr, free: &BTreeSet<String>) -> Option<bool> {
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    let mut bindings = HashMap::new();

    for _ in 0..SAMPLE_POINTS {
        for name in free {
            bindings.insert(
                name.clone(),
                rng.gen_range(SAMPLE_RANGE.0..SAMPLE_RANGE.1),
            );
        }
        let va = a.eval(&bindings).ok()?;
        let vb = b.eval(&bindings).ok()?;
        if !close(va, vb) {
            return Some(false);
        }
    }
    Some(true)
}

/// NaN on both sides counts as agreement (both expressions are outside
/// their domain at that point).
fn close(a: f64, b: f64) -> bool {
    if a.is_nan() && b.is_nan() {
        return true;
    }
    (a - b).abs() <= ABSOLUTE_TOLERANCE + RELATIVE_TOLERANCE * b.abs()
}

fn verdict(equal: bool, method: &str) -> Handled {
    let display = if equal {
        format!("Equivalent ({})", method)
    } else {
        format!("Not equivalent ({})", method)
    };
    (display, Some(json!({ "equivalent": equal, "method": method })))
}
