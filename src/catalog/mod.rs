//! Query catalog.
//!
//! Named SQL templates loaded once from a directory of `*.sql` files. The file
//! stem is the template name. Templates reference parameters as `:name`; at
//! execution time [`QueryTemplate::bind`] rewrites those into the backend's
//! positional syntax.

use crate::database::traits::PlaceholderStyle;
use crate::error::{CatalogError, DatabaseError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Named parameter values supplied with one execution.
pub type QueryParams = BTreeMap<String, String>;

/// Quoted literals, quoted identifiers, line comments and `::` casts are matched
/// so they can be skipped; only the last alternative captures a placeholder.
static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"'[^']*'|"[^"]*"|--[^\n]*|::|:([A-Za-z_][A-Za-z0-9_]*)"#)
        .expect("Invalid regex: named placeholder pattern")
});

/// A statement ready for a backend: positional SQL plus values in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundQuery {
    pub sql: String,
    pub params: Vec<String>,
}

/// One named SQL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    name: String,
    text: String,
}

impl QueryTemplate {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder names in first-use order, without duplicates.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for caps in PLACEHOLDER_REGEX.captures_iter(&self.text) {
            if let Some(name) = caps.get(1)
                && !names.contains(&name.as_str())
            {
                names.push(name.as_str());
            }
        }
        names
    }

    /// Rewrites `:name` placeholders for `style` and collects their values.
    ///
    /// Numbered styles reuse one slot per distinct name; `?` takes one value
    /// per occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::MissingParameter`] for the first placeholder
    /// that has no value in `params`.
    pub fn bind(&self, style: PlaceholderStyle, params: &QueryParams) -> DbResult<BoundQuery> {
        let mut sql = String::with_capacity(self.text.len());
        let mut values: Vec<String> = Vec::new();
        let mut slots: Vec<(&str, usize)> = Vec::new();
        let mut copied_up_to = 0;

        for caps in PLACEHOLDER_REGEX.captures_iter(&self.text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let name = name.as_str();
            let value = params
                .get(name)
                .ok_or_else(|| DatabaseError::MissingParameter(name.to_string()))?;

            sql.push_str(&self.text[copied_up_to..whole.start()]);
            copied_up_to = whole.end();

            let slot = match style {
                PlaceholderStyle::Question => {
                    values.push(value.clone());
                    sql.push('?');
                    continue;
                }
                PlaceholderStyle::Dollar | PlaceholderStyle::AtP => {
                    match slots.iter().find(|(existing, _)| *existing == name) {
                        Some((_, slot)) => *slot,
                        None => {
                            values.push(value.clone());
                            slots.push((name, values.len()));
                            values.len()
                        }
                    }
                }
            };

            if style == PlaceholderStyle::Dollar {
                sql.push_str(&format!("${}", slot));
            } else {
                sql.push_str(&format!("@P{}", slot));
            }
        }
        sql.push_str(&self.text[copied_up_to..]);

        Ok(BoundQuery { sql, params: values })
    }
}

/// All templates, loaded once.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    templates: HashMap<String, QueryTemplate>,
}

impl QueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every `*.sql` file directly under `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let io_error = |source| CatalogError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut catalog = Self::new();
        for entry in fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("sql") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;
            debug!(template = name, "Loaded query template");
            catalog.insert(QueryTemplate::new(name, text));
        }

        info!(
            "Loaded {} query templates from {}",
            catalog.len(),
            dir.display()
        );
        Ok(catalog)
    }

    /// Adds or replaces a template.
    pub fn insert(&mut self, template: QueryTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn lookup(&self, name: &str) -> Result<&QueryTemplate, CatalogError> {
        self.templates
            .get(name)
            .ok_or_else(|| CatalogError::TemplateNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_bind_dollar_reuses_slot_for_repeated_name() {
        let template = QueryTemplate::new(
            "t",
            "SELECT * FROM t WHERE a = :db_name OR b = :db_name AND c = :other",
        );
        let bound = template
            .bind(
                PlaceholderStyle::Dollar,
                &params(&[("db_name", "Orders"), ("other", "x")]),
            )
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM t WHERE a = $1 OR b = $1 AND c = $2");
        assert_eq!(bound.params, vec!["Orders", "x"]);
    }

    #[test]
    fn test_bind_sql_server_style() {
        let template = QueryTemplate::new("db_size", "SELECT 1 WHERE database_id = DB_ID(:db_name);");
        let bound = template
            .bind(PlaceholderStyle::AtP, &params(&[("db_name", "Orders")]))
            .unwrap();
        assert_eq!(bound.sql, "SELECT 1 WHERE database_id = DB_ID(@P1);");
        assert_eq!(bound.params, vec!["Orders"]);
    }

    #[test]
    fn test_bind_question_repeats_values() {
        let template = QueryTemplate::new("t", "SELECT :a, :b, :a");
        let bound = template
            .bind(PlaceholderStyle::Question, &params(&[("a", "1"), ("b", "2")]))
            .unwrap();
        assert_eq!(bound.sql, "SELECT ?, ?, ?");
        assert_eq!(bound.params, vec!["1", "2", "1"]);
    }

    #[test]
    fn test_literals_comments_and_casts_are_untouched() {
        let text = "-- lookup :ignored\nSELECT ':not_a_param', \"col:x\", id::text FROM t WHERE n = :n";
        let template = QueryTemplate::new("t", text);
        let bound = template
            .bind(PlaceholderStyle::Dollar, &params(&[("n", "7")]))
            .unwrap();
        assert_eq!(
            bound.sql,
            "-- lookup :ignored\nSELECT ':not_a_param', \"col:x\", id::text FROM t WHERE n = $1"
        );
        assert_eq!(template.parameter_names(), vec!["n"]);
    }

    #[test]
    fn test_missing_parameter_is_named() {
        let template = QueryTemplate::new("change_pwd", "ALTER LOGIN :login_name WITH PASSWORD = :new_password");
        let err = template
            .bind(PlaceholderStyle::AtP, &params(&[("login_name", "app")]))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::MissingParameter(ref name) if name == "new_password"));
    }

    #[test]
    fn test_template_without_placeholders_binds_verbatim() {
        let template = QueryTemplate::new("log_space", "DBCC SQLPERF(LOGSPACE);");
        let bound = template.bind(PlaceholderStyle::AtP, &QueryParams::new()).unwrap();
        assert_eq!(bound.sql, "DBCC SQLPERF(LOGSPACE);");
        assert!(bound.params.is_empty());
    }

    #[test]
    fn test_load_uses_file_stem_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("health_check.sql"), "SELECT 1 AS ok;").unwrap();
        fs::write(dir.path().join("db_size.sql"), "SELECT :db_name;").unwrap();
        fs::write(dir.path().join("README.md"), "not a template").unwrap();

        let catalog = QueryCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.names(), vec!["db_size", "health_check"]);
        assert_eq!(catalog.lookup("health_check").unwrap().text(), "SELECT 1 AS ok;");
        assert!(matches!(
            catalog.lookup("README"),
            Err(CatalogError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = QueryCatalog::load(dir.path().join("absent"));
        assert!(matches!(result, Err(CatalogError::Io { .. })));
    }
}
