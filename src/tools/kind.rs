// Closed enumeration of tool kinds
//
// Dispatch is an exhaustive match over this enum; an unknown tool name can
// only fail at the name-decoding edge. The schema catalog is static and
// built once at startup.

use serde_json::json;

use crate::tools::types::{ToolDefinition, ToolInputSchema};

/// Every tool the dispatcher can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ParseExpression,
    Simplify,
    Solve,
    Differentiate,
    Integrate,
    SeriesExpand,
    Evaluate,
    MatrixOps,
    NumericalSolve,
    NumericalIntegrate,
    Statistics,
    PlotFunction,
    KnowledgeQuery,
    ExecScript,
    CompareAnswers,
}

impl ToolKind {
    pub const ALL: &'static [ToolKind] = &[
        ToolKind::ParseExpression,
        ToolKind::Simplify,
        ToolKind::Solve,
        ToolKind::Differentiate,
        ToolKind::Integrate,
        ToolKind::SeriesExpand,
        ToolKind::Evaluate,
        ToolKind::MatrixOps,
        ToolKind::NumericalSolve,
        ToolKind::NumericalIntegrate,
        ToolKind::Statistics,
        ToolKind::PlotFunction,
        ToolKind::KnowledgeQuery,
        ToolKind::ExecScript,
        ToolKind::CompareAnswers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ParseExpression => "parse_expression",
            Self::Simplify => "simplify",
            Self::Solve => "solve",
            Self::Differentiate => "differentiate",
            Self::Integrate => "integrate",
            Self::SeriesExpand => "series_expand",
            Self::Evaluate => "evaluate",
            Self::MatrixOps => "matrix_ops",
            Self::NumericalSolve => "numerical_solve",
            Self::NumericalIntegrate => "numerical_integrate",
            Self::Statistics => "statistics_compute",
            Self::PlotFunction => "plot_function",
            Self::KnowledgeQuery => "knowledge_query",
            Self::ExecScript => "exec_script",
            Self::CompareAnswers => "compare_answers",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ParseExpression => {
                "Parse a math expression (LaTeX or plain) into canonical form. \
                 Returns canonical LaTeX and the free variables."
            }
            Self::Simplify => "Simplify a math expression.",
            Self::Solve => {
                "Solve an equation for a variable. Provide the equation with = \
                 (an expression without = is treated as expression = 0)."
            }
            Self::Differentiate => "Compute the derivative of an expression.",
            Self::Integrate => {
                "Integrate an expression. With bounds, computes the definite \
                 integral numerically; without bounds, finds a polynomial \
                 antiderivative when one exists."
            }
            Self::SeriesExpand => {
                "Compute the Taylor series expansion of an expression around a point."
            }
            Self::Evaluate => {
                "Numerically evaluate an expression, optionally substituting \
                 variable values."
            }
            Self::MatrixOps => {
                "Matrix / linear-algebra operations. Supported: determinant, \
                 inverse, transpose, trace, rank, norm, solve_linear, eigenvalues, rref."
            }
            Self::NumericalSolve => {
                "Find a numerical root of an equation (assumed = 0) using \
                 Newton's method or bisection."
            }
            Self::NumericalIntegrate => {
                "Fast numerical definite integration via adaptive quadrature."
            }
            Self::Statistics => {
                "Descriptive statistics on a dataset: mean, median, std, variance, \
                 percentiles, skewness, kurtosis, and more."
            }
            Self::PlotFunction => {
                "Sample one or more functions over a range and return chart-ready \
                 JSON series."
            }
            Self::KnowledgeQuery => {
                "Query an external knowledge engine for a math or science question. \
                 Returns a short answer."
            }
            Self::ExecScript => {
                "Execute a JavaScript snippet in a restricted sandbox. Pre-bound \
                 helpers: print, stats, range, linspace, zeros, sum, factorial, \
                 gcd, binomial, plus the standard Math object. Returns captured output."
            }
            Self::CompareAnswers => {
                "Check whether two math answers are equivalent (symbolic and \
                 numeric checks, not just string equality)."
            }
        }
    }

    pub fn input_schema(&self) -> ToolInputSchema {
        match self {
            Self::ParseExpression | Self::Simplify => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "The expression to parse"}
                }),
                &["expression"],
            ),
            Self::Solve => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "Equation to solve (use = for equality)"},
                    "variable": {"type": "string", "description": "Variable to solve for (default: auto-detect)"}
                }),
                &["expression"],
            ),
            Self::Differentiate => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "Expression to differentiate"},
                    "variable": {"type": "string", "description": "Differentiation variable (default: x)"},
                    "order": {"type": "integer", "description": "Order of derivative (default: 1)"}
                }),
                &["expression"],
            ),
            Self::Integrate => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "Expression to integrate"},
                    "variable": {"type": "string", "description": "Integration variable (default: x)"},
                    "lower": {"type": "number", "description": "Lower bound (omit for indefinite)"},
                    "upper": {"type": "number", "description": "Upper bound (omit for indefinite)"}
                }),
                &["expression"],
            ),
            Self::SeriesExpand => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "Expression to expand"},
                    "variable": {"type": "string", "description": "Expansion variable (default: x)"},
                    "point": {"type": "number", "description": "Expansion point (default: 0)"},
                    "order": {"type": "integer", "description": "Number of terms (default: 6)"}
                }),
                &["expression"],
            ),
            Self::Evaluate => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "Expression to evaluate"},
                    "substitutions": {
                        "type": "object",
                        "description": "Mapping of variable names to numeric values, e.g. {\"x\": 3.14}"
                    },
                    "precision": {
                        "type": "integer",
                        "description": "Significant digits in the result (default: 12; max: 17)"
                    }
                }),
                &["expression"],
            ),
            Self::MatrixOps => ToolInputSchema::new(
                json!({
                    "matrix": {
                        "type": "array",
                        "description": "The matrix as a list of rows, e.g. [[1,2],[3,4]]",
                        "items": {"type": "array", "items": {"type": "number"}}
                    },
                    "operation": {
                        "type": "string",
                        "description": "One of: determinant, inverse, transpose, trace, rank, norm, solve_linear, eigenvalues, rref"
                    },
                    "rhs": {
                        "type": "array",
                        "description": "Right-hand side vector for solve_linear, e.g. [1, 2]",
                        "items": {"type": "number"}
                    }
                }),
                &["matrix", "operation"],
            ),
            Self::NumericalSolve => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "Expression (set = 0)"},
                    "variable": {"type": "string", "description": "Variable name (default: x)"},
                    "x0": {"type": "number", "description": "Initial guess for Newton's method (default: 1.0)"},
                    "method": {"type": "string", "description": "Solver method: newton or bisect (default: newton)"},
                    "bracket": {
                        "type": "array",
                        "description": "Bracket [a, b] for bisect where f(a)*f(b) < 0",
                        "items": {"type": "number"}
                    }
                }),
                &["expression"],
            ),
            Self::NumericalIntegrate => ToolInputSchema::new(
                json!({
                    "expression": {"type": "string", "description": "Integrand"},
                    "variable": {"type": "string", "description": "Integration variable (default: x)"},
                    "lower": {"type": "number", "description": "Lower bound"},
                    "upper": {"type": "number", "description": "Upper bound"}
                }),
                &["expression", "lower", "upper"],
            ),
            Self::Statistics => ToolInputSchema::new(
                json!({
                    "data": {
                        "type": "array",
                        "description": "1-D array of numeric values",
                        "items": {"type": "number"}
                    },
                    "operations": {
                        "type": "array",
                        "description": "Stats to compute (default: describe). Options: mean, median, std, var, min, max, sum, skew, kurtosis, percentile_25, percentile_75, iqr, zscore, describe",
                        "items": {"type": "string"}
                    }
                }),
                &["data"],
            ),
            Self::PlotFunction => ToolInputSchema::new(
                json!({
                    "expressions": {
                        "type": "array",
                        "description": "Expressions to plot",
                        "items": {"type": "string"}
                    },
                    "variable": {"type": "string", "description": "Independent variable (default: x)"},
                    "x_range": {
                        "type": "array",
                        "description": "Plot range [xmin, xmax] (default: [-10, 10])",
                        "items": {"type": "number"}
                    },
                    "num_points": {"type": "integer", "description": "Number of sample points (default: 200)"},
                    "title": {"type": "string", "description": "Plot title"}
                }),
                &["expressions"],
            ),
            Self::KnowledgeQuery => ToolInputSchema::new(
                json!({
                    "query": {"type": "string", "description": "Natural-language or math query"}
                }),
                &["query"],
            ),
            Self::ExecScript => ToolInputSchema::new(
                json!({
                    "code": {"type": "string", "description": "JavaScript code to execute"}
                }),
                &["code"],
            ),
            Self::CompareAnswers => ToolInputSchema::new(
                json!({
                    "answer_a": {"type": "string", "description": "First answer"},
                    "answer_b": {"type": "string", "description": "Second answer"}
                }),
                &["answer_a", "answer_b"],
            ),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    /// The full tool catalog exposed to the provider.
    pub fn definitions() -> Vec<ToolDefinition> {
        Self::ALL.iter().map(ToolKind::definition).collect()
    }
}
