//! Tools: check_health, check_db_size, check_log_space, check_blocking_sessions,
//! check_index_fragmentation, change_password

use crate::catalog::QueryParams;
use crate::database::CurrentConnection;
use crate::diagnostics::{Diagnostic, DiagnosticOutcome, DiagnosticRunner, NO_ROWS_MARKER};
use crate::error::{Result, ToolError};
use crate::protocol::{CallToolResult, Tool};
use crate::tools::registry::ToolHandler;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::instrument;

/// One diagnostic exposed as a tool against the current connection.
pub struct DiagnosticTool {
    diagnostic: Diagnostic,
    runner: Arc<DiagnosticRunner>,
    current: CurrentConnection,
}

impl DiagnosticTool {
    pub fn new(diagnostic: Diagnostic, runner: Arc<DiagnosticRunner>, current: CurrentConnection) -> Self {
        Self {
            diagnostic,
            runner,
            current,
        }
    }

    pub fn tool_name(diagnostic: Diagnostic) -> &'static str {
        match diagnostic {
            Diagnostic::HealthCheck => "check_health",
            Diagnostic::DbSize => "check_db_size",
            Diagnostic::LogSpace => "check_log_space",
            Diagnostic::BlockingSessions => "check_blocking_sessions",
            Diagnostic::IndexFragmentation => "check_index_fragmentation",
            Diagnostic::ChangePassword => "change_password",
        }
    }

    fn description(&self) -> &'static str {
        match self.diagnostic {
            Diagnostic::HealthCheck => "Report server version, uptime and basic health of the current connection.",
            Diagnostic::DbSize => "Report data and log file sizes of a database.",
            Diagnostic::LogSpace => "Report transaction log size and usage for every database.",
            Diagnostic::BlockingSessions => "List sessions that are blocked and who blocks them.",
            Diagnostic::IndexFragmentation => "List fragmented indexes of a database.",
            Diagnostic::ChangePassword => "Change the password of a server login.",
        }
    }

    fn params(&self, arguments: &Value) -> Result<QueryParams> {
        let mut params = QueryParams::new();
        for name in self.diagnostic.parameter_names() {
            let value = arguments
                .get(*name)
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument `{}`", name)))?;
            params.insert((*name).to_string(), value.to_string());
        }
        Ok(params)
    }
}

/// Rows as JSON, the no-result marker as text, and a failed diagnostic as `[]`.
pub fn render(outcome: &DiagnosticOutcome) -> CallToolResult {
    match outcome {
        DiagnosticOutcome::Executed => CallToolResult::text(NO_ROWS_MARKER),
        other => CallToolResult::json(&other.to_json()),
    }
}

#[async_trait]
impl ToolHandler for DiagnosticTool {
    fn definition(&self) -> Tool {
        let properties: Map<String, Value> = self
            .diagnostic
            .parameter_names()
            .iter()
            .map(|name| ((*name).to_string(), json!({"type": "string"})))
            .collect();

        Tool {
            name: Self::tool_name(self.diagnostic).into(),
            description: Some(self.description().into()),
            input_schema: json!({
                "type": "object",
                "properties": properties,
                "required": self.diagnostic.parameter_names(),
            }),
        }
    }

    #[instrument(skip_all, fields(tool = "diagnostic"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let params = self.params(&arguments)?;
        let connection = self.current.get()?;
        let outcome = self.runner.run(&connection, self.diagnostic, &params).await;
        Ok(render(&outcome))
    }
}
