//! Tools: store_db_credentials, store_sn_credentials, delete_credentials, list_vaults

use crate::credentials::{
    CredentialCategory, CredentialStore, DbCredentials, NOT_IMPLEMENTED, ServiceNowCredentials, Vault,
    VaultOutcome,
};
use crate::error::{Result, ToolError};
use crate::protocol::{CallToolResult, Tool};
use crate::tools::registry::{ToolHandler, parse_args};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct StoreDbArgs {
    pub name: String,
    #[serde(flatten)]
    pub credentials: DbCredentials,
    #[serde(default)]
    pub vault: bool,
}

pub struct StoreDbCredentialsTool {
    store: Arc<CredentialStore>,
    vault: Vault,
}

impl StoreDbCredentialsTool {
    pub fn new(store: Arc<CredentialStore>, vault: Vault) -> Self {
        Self { store, vault }
    }
}

#[async_trait]
impl ToolHandler for StoreDbCredentialsTool {
    fn definition(&self) -> Tool {
        crate::define_tool!(
            name: "store_db_credentials",
            description: "Store database credentials and return the uuid that identifies them. \
                Supported db_type values: mariadb, mssql, mysql, oracle, postgresql, sqlite.",
            schema: {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Label for this credential"},
                    "db_type": {"type": "string", "description": "Database vendor tag"},
                    "database": {"type": "string", "description": "Database name, or file path for sqlite"},
                    "host": {"type": "string"},
                    "port": {"type": "integer"},
                    "username": {"type": "string"},
                    "password": {"type": "string"},
                    "vault": {"type": "boolean", "description": "Store in the external vault instead of the local file"}
                },
                "required": ["name", "db_type", "database", "host", "port", "username", "password"]
            }
        )
    }

    #[instrument(skip(self, arguments), fields(tool = "store_db_credentials"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: StoreDbArgs = parse_args(arguments)?;

        if args.vault {
            let value = serde_json::to_value(&args.credentials)?;
            return Ok(CallToolResult::text(
                self.vault.store(CredentialCategory::Db, &args.name, &value).to_string(),
            ));
        }

        let uuid = self.store.store_db(&args.name, &args.credentials)?;
        Ok(CallToolResult::text(uuid))
    }
}

#[derive(Debug, Deserialize)]
pub struct StoreServiceNowArgs {
    pub name: String,
    #[serde(flatten)]
    pub credentials: ServiceNowCredentials,
    #[serde(default)]
    pub vault: bool,
}

pub struct StoreServiceNowCredentialsTool {
    store: Arc<CredentialStore>,
    vault: Vault,
}

impl StoreServiceNowCredentialsTool {
    pub fn new(store: Arc<CredentialStore>, vault: Vault) -> Self {
        Self { store, vault }
    }
}

#[async_trait]
impl ToolHandler for StoreServiceNowCredentialsTool {
    fn definition(&self) -> Tool {
        crate::define_tool!(
            name: "store_sn_credentials",
            description: "Store ServiceNow credentials and return the uuid that identifies them.",
            schema: {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Label for this credential"},
                    "instance_url": {"type": "string", "description": "e.g. https://dev12345.service-now.com"},
                    "username": {"type": "string"},
                    "password": {"type": "string"},
                    "vault": {"type": "boolean"}
                },
                "required": ["name", "instance_url", "username", "password"]
            }
        )
    }

    #[instrument(skip(self, arguments), fields(tool = "store_sn_credentials"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: StoreServiceNowArgs = parse_args(arguments)?;

        if args.vault {
            let value = serde_json::to_value(&args.credentials)?;
            return Ok(CallToolResult::text(
                self.vault
                    .store(CredentialCategory::ServiceNow, &args.name, &value)
                    .to_string(),
            ));
        }

        let uuid = self.store.store_servicenow(&args.name, &args.credentials)?;
        Ok(CallToolResult::text(uuid))
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteArgs {
    pub uuid: String,
    #[serde(rename = "type")]
    pub category: String,
}

pub struct DeleteCredentialsTool {
    store: Arc<CredentialStore>,
}

impl DeleteCredentialsTool {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for DeleteCredentialsTool {
    fn definition(&self) -> Tool {
        crate::define_tool!(
            name: "delete_credentials",
            description: "Delete stored credentials by uuid and type.",
            schema: {
                "type": "object",
                "properties": {
                    "uuid": {"type": "string"},
                    "type": {"type": "string", "enum": ["db", "servicenow"]}
                },
                "required": ["uuid", "type"]
            }
        )
    }

    #[instrument(skip(self, arguments), fields(tool = "delete_credentials"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: DeleteArgs = parse_args(arguments)?;
        let category = CredentialCategory::parse(&args.category).ok_or_else(|| {
            ToolError::InvalidArguments(format!("Unknown credential type: {}", args.category))
        })?;

        if self.store.delete(&args.uuid, category)? {
            Ok(CallToolResult::text(format!(
                "Deleted {} credentials {}",
                category, args.uuid
            )))
        } else {
            Ok(CallToolResult::error(format!(
                "Credential with uuid={} and type={} not found",
                args.uuid, category
            )))
        }
    }
}

pub struct ListVaultsTool {
    vault: Vault,
}

impl ListVaultsTool {
    pub fn new(vault: Vault) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl ToolHandler for ListVaultsTool {
    fn definition(&self) -> Tool {
        crate::define_tool!(
            name: "list_vaults",
            description: "List the external secret vaults available for credential storage.",
            schema: {"type": "object", "properties": {}}
        )
    }

    #[instrument(skip(self, _arguments), fields(tool = "list_vaults"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        Ok(match self.vault.list() {
            VaultOutcome::Ready(vaults) => CallToolResult::json(&vaults),
            VaultOutcome::Unimplemented => CallToolResult::text(NOT_IMPLEMENTED),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CredentialsConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(CredentialsConfig {
            db_path: dir.path().join("db.jsonl"),
            servicenow_path: dir.path().join("sn.jsonl"),
        }))
    }

    fn db_args() -> Value {
        json!({
            "name": "orders",
            "db_type": "mssql",
            "database": "Orders",
            "host": "sql01",
            "port": "1433",
            "username": "sa",
            "password": "pw"
        })
    }

    #[tokio::test]
    async fn test_store_db_returns_retrievable_uuid() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tool = StoreDbCredentialsTool::new(Arc::clone(&store), Vault::new());

        let result = tool.execute(db_args()).await.unwrap();
        let uuid = result.joined_text();

        let creds = store.require_db(&uuid).unwrap();
        assert_eq!(creds.port, 1433);
        assert_eq!(creds.key(), "mssql_sql01_Orders");
    }

    #[tokio::test]
    async fn test_vault_flag_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let tool = StoreDbCredentialsTool::new(Arc::clone(&store), Vault::new());

        let mut args = db_args();
        args["vault"] = json!(true);
        let result = tool.execute(args).await.unwrap();

        assert_eq!(result.joined_text(), "Vault functionality is not implemented yet.");
        assert!(store.records(CredentialCategory::Db).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_sn_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let save = StoreServiceNowCredentialsTool::new(Arc::clone(&store), Vault::new());
        let delete = DeleteCredentialsTool::new(Arc::clone(&store));

        let uuid = save
            .execute(json!({
                "name": "dev",
                "instance_url": "https://dev.service-now.com",
                "username": "admin",
                "password": "pw"
            }))
            .await
            .unwrap()
            .joined_text();

        let wrong_type = delete
            .execute(json!({"uuid": uuid, "type": "db"}))
            .await
            .unwrap();
        assert!(wrong_type.is_error());

        let deleted = delete
            .execute(json!({"uuid": uuid, "type": "servicenow"}))
            .await
            .unwrap();
        assert!(!deleted.is_error());
        assert!(store.retrieve_servicenow(&uuid).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_rejects_unknown_type() {
        let dir = TempDir::new().unwrap();
        let tool = DeleteCredentialsTool::new(store(&dir));
        let err = tool
            .execute(json!({"uuid": "x", "type": "ldap"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ldap"));
    }

    #[tokio::test]
    async fn test_missing_field_is_invalid_arguments() {
        let dir = TempDir::new().unwrap();
        let tool = StoreDbCredentialsTool::new(store(&dir), Vault::new());
        let err = tool.execute(json!({"name": "x"})).await.unwrap_err();
        assert!(err.to_string().starts_with("Tool error: Invalid arguments"));
    }

    #[tokio::test]
    async fn test_list_vaults_reports_unimplemented() {
        let result = ListVaultsTool::new(Vault::new())
            .execute(Value::Null)
            .await
            .unwrap();
        assert_eq!(result.joined_text(), "Vault functionality is not implemented yet.");
    }
}
