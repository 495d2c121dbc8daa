// Error types for the expression engine and tool layer
//
// Parse and evaluation failures are recoverable: they are converted into
// structured result envelopes at the parser/dispatcher boundary and never
// propagate past it. Only provider transport failures (anyhow, with
// context) escape the tool-call loop to its caller.

use thiserror::Error;

/// Failure of a single parse-strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("parse timed out")]
    Timeout,

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unknown command: \\{0}")]
    UnknownCommand(String),

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("relational operator {0} is not supported")]
    UnsupportedOperator(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Failure to numerically evaluate an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("expression contains free variables: {0}")]
    UnboundSymbol(String),

    #[error("cannot evaluate an equation as a number")]
    EquationValue,

    #[error("{0}")]
    Domain(String),
}

/// Failure inside the equation solver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("equation is not solvable symbolically or numerically: {0}")]
    NotSolvable(String),

    #[error("no real solutions")]
    NoRealSolutions,

    #[error(transparent)]
    Eval(#[from] EvalError),
}
