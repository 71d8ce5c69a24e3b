//! Tools: get_sn_users, get_sn_roles, get_sn_incidents

use crate::credentials::CredentialStore;
use crate::error::Result;
use crate::protocol::{CallToolResult, Tool};
use crate::ticketing::{TicketingClient, TicketingTable};
use crate::tools::registry::{ToolHandler, parse_args};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct TicketingArgs {
    pub uuid: String,
}

pub struct TicketingTool {
    table: TicketingTable,
    store: Arc<CredentialStore>,
    client: Arc<TicketingClient>,
}

impl TicketingTool {
    pub fn new(table: TicketingTable, store: Arc<CredentialStore>, client: Arc<TicketingClient>) -> Self {
        Self { table, store, client }
    }

    pub fn tool_name(table: TicketingTable) -> &'static str {
        match table {
            TicketingTable::Users => "get_sn_users",
            TicketingTable::Roles => "get_sn_roles",
            TicketingTable::Incidents => "get_sn_incidents",
        }
    }
}

#[async_trait]
impl ToolHandler for TicketingTool {
    fn definition(&self) -> Tool {
        let subject = match self.table {
            TicketingTable::Users => "users",
            TicketingTable::Roles => "user roles",
            TicketingTable::Incidents => "incidents",
        };
        crate::define_tool!(
            name: Self::tool_name(self.table),
            description: format!("Fetch {} from ServiceNow using stored credentials.", subject),
            schema: {
                "type": "object",
                "properties": {
                    "uuid": {"type": "string", "description": "uuid returned by store_sn_credentials"}
                },
                "required": ["uuid"]
            }
        )
    }

    #[instrument(skip_all, fields(tool = "ticketing"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: TicketingArgs = parse_args(arguments)?;
        let credentials = self.store.require_servicenow(&args.uuid)?;

        Ok(match self.client.fetch(&credentials, self.table).await {
            Some(body) => CallToolResult::json(&body),
            None => CallToolResult::error(format!(
                "Could not fetch {} from {}",
                self.table, credentials.instance_url
            )),
        })
    }
}
