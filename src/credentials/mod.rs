//! Credential store.
//!
//! Each category lives in its own newline-delimited JSON file:
//!
//! ```text
//! {"uuid":"…","name":"prod","type":"db","key":"mssql_sql01_master","value":{…}}
//! ```
//!
//! Writes append one line; deletes rewrite the whole file without the matching
//! record and keep unparseable lines verbatim. Parsed records are cached per
//! category until the next write or an explicit [`CredentialStore::invalidate`].
//!
//! Writers inside this process are serialized. Two processes sharing a file
//! can still lose an update when one deletes while the other appends.

pub mod vault;

pub use vault::{NOT_IMPLEMENTED, Vault, VaultOutcome};

use crate::config::CredentialsConfig;
use crate::database::{ConnectionDescriptor, build_descriptor};
use crate::error::{CredentialError, CredentialResult, DbResult};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialCategory {
    #[serde(rename = "db")]
    Db,
    #[serde(rename = "servicenow")]
    ServiceNow,
}

impl CredentialCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "db" | "database" => Some(Self::Db),
            "servicenow" | "sn" | "ticketing" => Some(Self::ServiceNow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Db => "db",
            Self::ServiceNow => "servicenow",
        }
    }
}

impl fmt::Display for CredentialCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value map of a `db` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCredentials {
    #[serde(alias = "vendor")]
    pub db_type: String,
    pub database: String,
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_text")]
    pub port: u16,
    #[serde(alias = "user")]
    pub username: String,
    pub password: String,
}

impl DbCredentials {
    /// Dedup key `{db_type}_{host}_{database}`; not enforced unique.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.db_type, self.host, self.database)
    }

    pub fn descriptor(&self) -> DbResult<ConnectionDescriptor> {
        build_descriptor(
            &self.db_type,
            &self.host,
            self.port,
            &self.database,
            &self.username,
            &self.password,
        )
    }
}

/// Value map of a `servicenow` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNowCredentials {
    pub instance_url: String,
    #[serde(alias = "user")]
    pub username: String,
    pub password: String,
}

impl ServiceNowCredentials {
    pub fn key(&self) -> String {
        format!("sn_{}", self.username)
    }
}

fn port_from_number_or_text<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(n) => Ok(n),
        Port::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// One persisted line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub uuid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub category: CredentialCategory,
    pub key: String,
    pub value: serde_json::Value,
}

pub struct CredentialStore {
    config: CredentialsConfig,
    cache: RwLock<HashMap<CredentialCategory, Arc<Vec<CredentialRecord>>>>,
    /// Bumped by every invalidation; a load that started before the bump is not cached.
    generation: AtomicU64,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(config: CredentialsConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self, category: CredentialCategory) -> &Path {
        match category {
            CredentialCategory::Db => &self.config.db_path,
            CredentialCategory::ServiceNow => &self.config.servicenow_path,
        }
    }

    /// Appends a record and returns its freshly generated id.
    pub fn store(
        &self,
        category: CredentialCategory,
        name: &str,
        key: String,
        value: serde_json::Value,
    ) -> CredentialResult<String> {
        let record = CredentialRecord {
            uuid: Uuid::new_v4().to_string(),
            name: name.to_string(),
            category,
            key,
            value,
        };
        let line = serde_json::to_string(&record)?;

        {
            let _guard = self.write_lock.lock();
            let path = self.path(category);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", line)?;
        }
        self.invalidate();

        info!(category = %category, key = %record.key, "Stored credentials {}", record.uuid);
        Ok(record.uuid)
    }

    pub fn store_db(&self, name: &str, credentials: &DbCredentials) -> CredentialResult<String> {
        self.store(
            CredentialCategory::Db,
            name,
            credentials.key(),
            serde_json::to_value(credentials)?,
        )
    }

    pub fn store_servicenow(
        &self,
        name: &str,
        credentials: &ServiceNowCredentials,
    ) -> CredentialResult<String> {
        self.store(
            CredentialCategory::ServiceNow,
            name,
            credentials.key(),
            serde_json::to_value(credentials)?,
        )
    }

    /// Value of the first record matching `id` and `category`, or `None`.
    pub fn retrieve(
        &self,
        id: &str,
        category: CredentialCategory,
    ) -> CredentialResult<Option<serde_json::Value>> {
        let records = self.records(category)?;
        let found = records
            .iter()
            .find(|r| r.uuid == id && r.category == category)
            .map(|r| r.value.clone());
        if found.is_none() {
            warn!("Credential with uuid={} and type={} not found", id, category);
        }
        Ok(found)
    }

    pub fn retrieve_db(&self, id: &str) -> CredentialResult<Option<DbCredentials>> {
        self.retrieve_as(id, CredentialCategory::Db)
    }

    pub fn retrieve_servicenow(&self, id: &str) -> CredentialResult<Option<ServiceNowCredentials>> {
        self.retrieve_as(id, CredentialCategory::ServiceNow)
    }

    /// Like [`retrieve`](Self::retrieve) but a miss is [`CredentialError::NotFound`].
    pub fn require_db(&self, id: &str) -> CredentialResult<DbCredentials> {
        self.retrieve_db(id)?.ok_or_else(|| not_found(id, CredentialCategory::Db))
    }

    pub fn require_servicenow(&self, id: &str) -> CredentialResult<ServiceNowCredentials> {
        self.retrieve_servicenow(id)?
            .ok_or_else(|| not_found(id, CredentialCategory::ServiceNow))
    }

    fn retrieve_as<T: serde::de::DeserializeOwned>(
        &self,
        id: &str,
        category: CredentialCategory,
    ) -> CredentialResult<Option<T>> {
        self.retrieve(id, category)?
            .map(|value| {
                serde_json::from_value(value).map_err(|e| {
                    CredentialError::UnexpectedValue(format!("{} record {}: {}", category, id, e))
                })
            })
            .transpose()
    }

    /// Rewrites the category file without the record `id`.
    ///
    /// Returns whether a record was removed. A missing file removes nothing.
    pub fn delete(&self, id: &str, category: CredentialCategory) -> CredentialResult<bool> {
        let removed = {
            let _guard = self.write_lock.lock();
            let path = self.path(category);
            let contents = match fs::read_to_string(path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(e.into()),
            };

            let mut kept = String::with_capacity(contents.len());
            let mut removed = false;
            for line in contents.lines() {
                let matches = serde_json::from_str::<CredentialRecord>(line)
                    .is_ok_and(|r| r.uuid == id);
                if matches {
                    removed = true;
                } else {
                    kept.push_str(line);
                    kept.push('\n');
                }
            }

            if removed {
                fs::write(path, kept)?;
            }
            removed
        };

        if removed {
            self.invalidate();
            info!(category = %category, "Deleted credentials {}", id);
        } else {
            warn!("Credential with uuid={} and type={} not found for deletion", id, category);
        }
        Ok(removed)
    }

    /// Drops every cached category; the next read goes back to disk.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        cache.clear();
    }

    /// Parsed records of one category, read from disk on a cache miss.
    pub fn records(&self, category: CredentialCategory) -> CredentialResult<Arc<Vec<CredentialRecord>>> {
        if let Some(records) = self.cache.read().get(&category) {
            return Ok(Arc::clone(records));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let records = Arc::new(self.load(category)?);
        self.cache_if_current(category, generation, Arc::clone(&records));
        Ok(records)
    }

    /// Caches `records` unless a write invalidated the cache since `generation`.
    fn cache_if_current(
        &self,
        category: CredentialCategory,
        generation: u64,
        records: Arc<Vec<CredentialRecord>>,
    ) {
        let mut cache = self.cache.write();
        if self.generation.load(Ordering::SeqCst) == generation {
            cache.insert(category, records);
        } else {
            debug!(category = %category, "Discarding records loaded before a write");
        }
    }

    fn load(&self, category: CredentialCategory) -> CredentialResult<Vec<CredentialRecord>> {
        let path = self.path(category);
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Credential file {} does not exist yet", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CredentialRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let err = CredentialError::MalformedRecord {
                        line: index + 1,
                        reason: e.to_string(),
                    };
                    warn!(file = %path.display(), "Skipping record: {}", err);
                }
            }
        }
        Ok(records)
    }
}

fn not_found(id: &str, category: CredentialCategory) -> CredentialError {
    CredentialError::NotFound {
        id: id.to_string(),
        category: category.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Vendor;
    use tempfile::TempDir;

    fn store() -> (TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = CredentialsConfig {
            db_path: dir.path().join("db.jsonl"),
            servicenow_path: dir.path().join("sn.jsonl"),
        };
        (dir, CredentialStore::new(config))
    }

    fn postgres_credentials() -> DbCredentials {
        DbCredentials {
            db_type: "postgresql".into(),
            database: "d".into(),
            host: "h".into(),
            port: 5432,
            username: "u".into(),
            password: "p".into(),
        }
    }

    #[test]
    fn test_store_then_retrieve_returns_same_value() {
        let (_dir, store) = store();
        let creds = postgres_credentials();
        let id = store.store_db("local", &creds).unwrap();

        let value = store.retrieve(&id, CredentialCategory::Db).unwrap().unwrap();
        assert_eq!(value, serde_json::to_value(&creds).unwrap());
        assert_eq!(store.retrieve_db(&id).unwrap(), Some(creds));
    }

    #[test]
    fn test_stored_postgres_credentials_build_descriptor() {
        let (_dir, store) = store();
        let id = store.store_db("local", &postgres_credentials()).unwrap();

        let descriptor = store.require_db(&id).unwrap().descriptor().unwrap();
        assert_eq!(descriptor.vendor, Vendor::Postgresql);
        assert_eq!(descriptor.host, "h");
        assert_eq!(descriptor.port, 5432);
        assert_eq!(descriptor.database, "d");
        assert_eq!(descriptor.username, "u");
        assert_eq!(descriptor.to_uri().unwrap(), "postgresql://u:p@h:5432/d");
    }

    #[test]
    fn test_record_line_format() {
        let (dir, store) = store();
        let id = store.store_db("local", &postgres_credentials()).unwrap();

        let contents = fs::read_to_string(dir.path().join("db.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 1);
        let line: serde_json::Value = serde_json::from_str(contents.trim_end()).unwrap();
        assert_eq!(line["uuid"], id.as_str());
        assert_eq!(line["type"], "db");
        assert_eq!(line["key"], "postgresql_h_d");
        assert_eq!(line["value"]["db_type"], "postgresql");
    }

    #[test]
    fn test_categories_are_separate() {
        let (_dir, store) = store();
        let sn = ServiceNowCredentials {
            instance_url: "https://dev.service-now.com".into(),
            username: "admin".into(),
            password: "pw".into(),
        };
        let id = store.store_servicenow("dev", &sn).unwrap();

        assert!(store.retrieve(&id, CredentialCategory::Db).unwrap().is_none());
        assert_eq!(store.retrieve_servicenow(&id).unwrap(), Some(sn.clone()));
        assert_eq!(sn.key(), "sn_admin");
    }

    #[test]
    fn test_delete_then_retrieve_is_empty() {
        let (_dir, store) = store();
        let keep = store.store_db("keep", &postgres_credentials()).unwrap();
        let gone = store.store_db("gone", &postgres_credentials()).unwrap();

        assert!(store.delete(&gone, CredentialCategory::Db).unwrap());
        assert!(store.retrieve(&gone, CredentialCategory::Db).unwrap().is_none());
        assert!(store.retrieve(&keep, CredentialCategory::Db).unwrap().is_some());
        assert!(!store.delete(&gone, CredentialCategory::Db).unwrap());
    }

    #[test]
    fn test_missing_file_reads_empty_and_deletes_nothing() {
        let (_dir, store) = store();
        assert!(store.retrieve("nope", CredentialCategory::Db).unwrap().is_none());
        assert!(!store.delete("nope", CredentialCategory::Db).unwrap());
        assert!(matches!(
            store.require_db("nope"),
            Err(CredentialError::NotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_lines_skipped_on_read_and_kept_on_delete() {
        let (dir, store) = store();
        let path = dir.path().join("db.jsonl");
        let id = store.store_db("local", &postgres_credentials()).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();
        drop(file);
        store.invalidate();

        assert_eq!(store.records(CredentialCategory::Db).unwrap().len(), 1);
        assert!(store.retrieve(&id, CredentialCategory::Db).unwrap().is_some());

        assert!(store.delete(&id, CredentialCategory::Db).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json\n\n");
    }

    #[test]
    fn test_load_overtaken_by_write_is_not_cached() {
        let (_dir, store) = store();
        let generation = store.generation.load(Ordering::SeqCst);
        let before_write = store.load(CredentialCategory::Db).unwrap();

        let id = store.store_db("local", &postgres_credentials()).unwrap();
        store.cache_if_current(CredentialCategory::Db, generation, Arc::new(before_write));

        assert!(store.retrieve_db(&id).unwrap().is_some());
    }

    #[test]
    fn test_cache_serves_reads_until_invalidated() {
        let (dir, store) = store();
        assert!(store.records(CredentialCategory::Db).unwrap().is_empty());

        let record = CredentialRecord {
            uuid: "external".into(),
            name: "written elsewhere".into(),
            category: CredentialCategory::Db,
            key: "k".into(),
            value: serde_json::to_value(postgres_credentials()).unwrap(),
        };
        fs::write(
            dir.path().join("db.jsonl"),
            format!("{}\n", serde_json::to_string(&record).unwrap()),
        )
        .unwrap();

        assert!(store.retrieve("external", CredentialCategory::Db).unwrap().is_none());
        store.invalidate();
        assert!(store.retrieve("external", CredentialCategory::Db).unwrap().is_some());
    }

    #[test]
    fn test_legacy_field_names_are_accepted() {
        let value = serde_json::json!({
            "vendor": "mssql",
            "database": "master",
            "host": "sql01",
            "port": "1433",
            "user": "sa",
            "password": "pw"
        });
        let creds: DbCredentials = serde_json::from_value(value).unwrap();
        assert_eq!(creds.db_type, "mssql");
        assert_eq!(creds.port, 1433);
        assert_eq!(creds.username, "sa");
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(CredentialCategory::parse("db"), Some(CredentialCategory::Db));
        assert_eq!(
            CredentialCategory::parse("servicenow"),
            Some(CredentialCategory::ServiceNow)
        );
        assert_eq!(CredentialCategory::parse("vault"), None);
    }
}
