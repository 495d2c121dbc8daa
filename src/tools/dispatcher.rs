// Tool dispatch
//
// The toolbox owns the services handlers need (parser, sandbox, HTTP
// client) and exposes one entry point: `dispatch`. Every handler failure
// is converted into a failure envelope here; nothing propagates to the
// caller.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};

use crate::config::Settings;
use crate::expr::ExpressionParser;
use crate::sandbox::ScriptSandbox;
use crate::tools::handlers::{
    compare, knowledge, matrix, numeric, plot, script, stats, symbolic, Handled,
};
use crate::tools::kind::ToolKind;
use crate::tools::types::{ToolDefinition, ToolOutcome};

/// Stateless tool dispatcher; safe to share across conversations.
pub struct Toolbox {
    parser: ExpressionParser,
    sandbox: ScriptSandbox,
    http: reqwest::Client,
    settings: Settings,
}

impl Toolbox {
    pub fn new(settings: Settings) -> Result<Self> {
        let parser = ExpressionParser::new(settings.parse_timeout);
        let sandbox = ScriptSandbox::new(settings.sandbox_timeout, settings.sandbox_max_output);
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            parser,
            sandbox,
            http,
            settings,
        })
    }

    /// The static tool catalog exposed to the provider.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::definitions()
    }

    pub fn parser(&self) -> &ExpressionParser {
        &self.parser
    }

    /// Execute one tool call. Always returns an envelope; unknown names
    /// and handler failures become structured errors.
    #[instrument(skip(self, arguments), fields(tool = %name))]
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> ToolOutcome {
        let Some(kind) = ToolKind::from_name(name) else {
            warn!("unknown tool requested");
            return ToolOutcome::failure(name, format!("unknown tool: {}", name));
        };

        match self.invoke(kind, arguments).await {
            Ok((display_text, raw_value)) => {
                debug!("tool call succeeded");
                ToolOutcome::success(kind.name(), display_text, raw_value)
            }
            Err(err) => {
                error!(%err, "tool call failed");
                ToolOutcome::failure(kind.name(), err.to_string())
            }
        }
    }

    async fn invoke(&self, kind: ToolKind, args: &Value) -> Result<Handled> {
        match kind {
            ToolKind::ParseExpression => symbolic::parse_expression(&self.parser, args),
            ToolKind::Simplify => symbolic::simplify_expression(&self.parser, args),
            ToolKind::Solve => symbolic::solve_equation(&self.parser, args),
            ToolKind::Differentiate => symbolic::differentiate_expression(&self.parser, args),
            ToolKind::Integrate => symbolic::integrate_expression(&self.parser, args),
            ToolKind::SeriesExpand => symbolic::series_expand(&self.parser, args),
            ToolKind::Evaluate => numeric::evaluate(&self.parser, args),
            ToolKind::MatrixOps => matrix::matrix_ops(args),
            ToolKind::NumericalSolve => numeric::numerical_solve(&self.parser, args),
            ToolKind::NumericalIntegrate => numeric::numerical_integrate(&self.parser, args),
            ToolKind::Statistics => stats::statistics_compute(args),
            ToolKind::PlotFunction => plot::plot_function(&self.parser, args),
            ToolKind::KnowledgeQuery => {
                knowledge::knowledge_query(&self.http, &self.settings, args).await
            }
            ToolKind::ExecScript => script::exec_script(&self.sandbox, args).await,
            ToolKind::CompareAnswers => compare::compare_answers(&self.parser, args),
        }
    }
}
