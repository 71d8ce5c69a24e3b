//! ServiceNow table API client.
//!
//! Issues authenticated GETs against `{instance_url}/api/now/table/{table}`
//! and passes the parsed JSON body through. Like the diagnostics, every
//! failure is logged and becomes `None`.

use crate::config::TicketingConfig;
use crate::credentials::ServiceNowCredentials;
use crate::error::TicketingError;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketingTable {
    Users,
    Roles,
    Incidents,
}

impl TicketingTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "sys_user",
            Self::Roles => "sys_user_role",
            Self::Incidents => "incident",
        }
    }
}

impl fmt::Display for TicketingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct TicketingClient {
    http: Client,
    result_limit: u32,
}

impl TicketingClient {
    pub fn new(config: &TicketingConfig) -> Result<Self, TicketingError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            result_limit: config.result_limit,
        })
    }

    pub fn table_url(instance_url: &str, table: TicketingTable) -> String {
        format!(
            "{}/api/now/table/{}",
            instance_url.trim_end_matches('/'),
            table.as_str()
        )
    }

    /// Fetches up to the configured number of records from `table`.
    #[instrument(skip(self, credentials), fields(table = table.as_str()))]
    pub async fn fetch(&self, credentials: &ServiceNowCredentials, table: TicketingTable) -> Option<Value> {
        match self.try_fetch(credentials, table).await {
            Ok(body) => Some(body),
            Err(e) => {
                error!(
                    instance = %credentials.instance_url,
                    "Error getting {} records: {}",
                    table,
                    e
                );
                None
            }
        }
    }

    async fn try_fetch(
        &self,
        credentials: &ServiceNowCredentials,
        table: TicketingTable,
    ) -> Result<Value, TicketingError> {
        let url = Self::table_url(&credentials.instance_url, table);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .header(ACCEPT, "application/json")
            .query(&[("sysparm_limit", self.result_limit.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TicketingError::Status(status.as_u16()));
        }

        Ok(response.json::<Value>().await?)
    }

    pub async fn users(&self, credentials: &ServiceNowCredentials) -> Option<Value> {
        self.fetch(credentials, TicketingTable::Users).await
    }

    pub async fn roles(&self, credentials: &ServiceNowCredentials) -> Option<Value> {
        self.fetch(credentials, TicketingTable::Roles).await
    }

    pub async fn incidents(&self, credentials: &ServiceNowCredentials) -> Option<Value> {
        self.fetch(credentials, TicketingTable::Incidents).await
    }
}
