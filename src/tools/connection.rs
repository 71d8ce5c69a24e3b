//! Tools: set_current_connection, close_connection, connection_info

use crate::credentials::CredentialStore;
use crate::database::CurrentConnection;
use crate::error::Result;
use crate::protocol::{CallToolResult, Tool};
use crate::tools::registry::{ToolHandler, parse_args};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct SetConnectionArgs {
    pub uuid: String,
}

pub struct SetCurrentConnectionTool {
    store: Arc<CredentialStore>,
    current: CurrentConnection,
}

impl SetCurrentConnectionTool {
    pub fn new(store: Arc<CredentialStore>, current: CurrentConnection) -> Self {
        Self { store, current }
    }
}

#[async_trait]
impl ToolHandler for SetCurrentConnectionTool {
    fn definition(&self) -> Tool {
        crate::define_tool!(
            name: "set_current_connection",
            description: "Select the stored database credentials that diagnostics run against. \
                Closes any previous connection. The session opens on first use and closes \
                again after a period of inactivity.",
            schema: {
                "type": "object",
                "properties": {
                    "uuid": {"type": "string", "description": "uuid returned by store_db_credentials"}
                },
                "required": ["uuid"]
            }
        )
    }

    #[instrument(skip(self, arguments), fields(tool = "set_current_connection"))]
    async fn execute(&self, arguments: Value) -> Result<CallToolResult> {
        let args: SetConnectionArgs = parse_args(arguments)?;
        let credentials = self.store.require_db(&args.uuid)?;
        let connection = self.current.open(credentials.descriptor()?).await?;

        Ok(CallToolResult::json(&serde_json::json!({
            "status": "ready",
            "connection": connection.metadata().await
        })))
    }
}

pub struct CloseConnectionTool {
    current: CurrentConnection,
}

impl CloseConnectionTool {
    pub fn new(current: CurrentConnection) -> Self {
        Self { current }
    }
}

#[async_trait]
impl ToolHandler for CloseConnectionTool {
    fn definition(&self) -> Tool {
        crate::define_tool!(
            name: "close_connection",
            description: "Close the current database connection.",
            schema: {"type": "object", "properties": {}}
        )
    }

    #[instrument(skip(self, _arguments), fields(tool = "close_connection"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        match self.current.close().await {
            Some(metadata) => Ok(CallToolResult::json(&serde_json::json!({
                "status": "closed",
                "previous_connection": metadata
            }))),
            None => Ok(CallToolResult::text("No current connection to close.")),
        }
    }
}

pub struct ConnectionInfoTool {
    current: CurrentConnection,
}

impl ConnectionInfoTool {
    pub fn new(current: CurrentConnection) -> Self {
        Self { current }
    }
}

#[async_trait]
impl ToolHandler for ConnectionInfoTool {
    fn definition(&self) -> Tool {
        crate::define_tool!(
            name: "connection_info",
            description: "Describe the current database connection. The password is never shown.",
            schema: {"type": "object", "properties": {}}
        )
    }

    #[instrument(skip(self, _arguments), fields(tool = "connection_info"))]
    async fn execute(&self, _arguments: Value) -> Result<CallToolResult> {
        let connection = self.current.get()?;
        Ok(CallToolResult::json(&connection.metadata().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionSettings, CredentialsConfig};
    use crate::credentials::DbCredentials;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> (Arc<CredentialStore>, CurrentConnection) {
        let store = Arc::new(CredentialStore::new(CredentialsConfig {
            db_path: dir.path().join("db.jsonl"),
            servicenow_path: dir.path().join("sn.jsonl"),
        }));
        (store, CurrentConnection::new(ConnectionSettings::default()))
    }

    #[cfg(feature = "sqlite")]
    fn sqlite_credentials(dir: &TempDir) -> DbCredentials {
        DbCredentials {
            db_type: "sqlite".into(),
            database: dir.path().join("app.db").display().to_string(),
            host: "localhost".into(),
            port: 0,
            username: "app".into(),
            password: "hunter2".into(),
        }
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_set_current_connection_is_lazy_and_redacted() {
        let dir = TempDir::new().unwrap();
        let (store, current) = fixture(&dir);
        let uuid = store.store_db("local", &sqlite_credentials(&dir)).unwrap();

        let result = SetCurrentConnectionTool::new(Arc::clone(&store), current.clone())
            .execute(json!({"uuid": uuid}))
            .await
            .unwrap();

        let text = result.joined_text();
        assert!(!text.contains("hunter2"));
        assert!(current.is_set());
        assert!(!current.get().unwrap().is_open().await);

        let info = ConnectionInfoTool::new(current.clone())
            .execute(Value::Null)
            .await
            .unwrap();
        let info: Value = serde_json::from_str(&info.joined_text()).unwrap();
        assert_eq!(info["vendor"], "sqlite");
        assert_eq!(info["open"], false);
    }

    #[tokio::test]
    async fn test_unknown_uuid_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (store, current) = fixture(&dir);

        let err = SetCurrentConnectionTool::new(store, current.clone())
            .execute(json!({"uuid": "missing"}))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("uuid=missing"));
        assert!(!current.is_set());
    }

    #[tokio::test]
    async fn test_info_and_close_without_connection() {
        let dir = TempDir::new().unwrap();
        let (_, current) = fixture(&dir);

        let err = ConnectionInfoTool::new(current.clone())
            .execute(Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("set_current_connection"));

        let closed = CloseConnectionTool::new(current).execute(Value::Null).await.unwrap();
        assert_eq!(closed.joined_text(), "No current connection to close.");
    }
}
