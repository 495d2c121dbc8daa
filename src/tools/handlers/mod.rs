// Tool handlers
//
// Each handler parses and validates its arguments, performs the
// computation, and returns display text plus an optional raw value. Errors
// are plain `anyhow` results; the dispatcher converts them into failure
// envelopes.

pub(crate) mod compare;
pub(crate) mod knowledge;
pub(crate) mod matrix;
pub(crate) mod numeric;
pub(crate) mod plot;
pub(crate) mod script;
pub(crate) mod stats;
pub(crate) mod symbolic;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::expr::{Expr, ExpressionParser, ParseResult};

/// Display text plus optional raw structured value.
pub(crate) type Handled = (String, Option<Value>);

/// Parse an expression argument, converting a parse failure into a handler
/// error.
pub(crate) fn parse_required(
    parser: &ExpressionParser,
    text: &str,
) -> Result<(Expr, ParseResult)> {
    let result = parser.parse(text);
    match result.expression.clone() {
        Some(expr) => Ok((expr, result)),
        None => bail!(result
            .error
            .unwrap_or_else(|| "parse failed".to_string())),
    }
}
