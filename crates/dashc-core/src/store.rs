//! Dashboard persistence on the local filesystem
//!
//! Layout: `<root>/<doc>/<page>.json`, one record per page. A page is only
//! written after it compiles; the record keeps the source next to the
//! generated module so a viewer can load without recompiling.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::compiler::Compiler;
use crate::config::{Config, DataConfig};
use crate::{Error, Result};

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("store name pattern is valid"));

/// A saved page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRecord {
    pub source: String,
    pub compiled: String,
    pub warnings: Vec<String>,
    /// RFC 3339, UTC
    pub last_modified: String,
}

/// Outcome of `save`, shaped for the editor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    pub success: bool,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DashboardStore {
    root: PathBuf,
    compiler: Compiler,
    query_file: String,
}

impl DashboardStore {
    pub fn new(root: impl Into<PathBuf>, compiler: Compiler) -> Self {
        DashboardStore {
            root: root.into(),
            compiler,
            query_file: DataConfig::default().query_file,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        DashboardStore::new(config.store.root.clone(), Compiler::from_config(config))
            .with_query_file(&config.data.query_file)
    }

    /// Name of the query file kept in each document directory
    pub fn with_query_file(mut self, name: &str) -> Self {
        self.query_file = name.to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a document's pages and query file
    pub fn document_dir(&self, doc: &str) -> Result<PathBuf> {
        check_name("document", doc)?;
        Ok(self.root.join(doc))
    }

    fn page_path(&self, doc: &str, page: &str) -> Result<PathBuf> {
        check_name("page", page)?;
        Ok(self.document_dir(doc)?.join(format!("{}.json", page)))
    }

    /// Compile `source` and, if it compiles, persist it
    ///
    /// A compile failure is reported in the `SaveResult`, not as `Err`;
    /// `Err` means the names were invalid or the write failed.
    pub fn save(&self, doc: &str, page: &str, source: &str) -> Result<SaveResult> {
        let path = self.page_path(doc, page)?;
        let artifact = self.compiler.compile(source, &format!("{}.dash", page));
        let (true, Some(compiled)) = (artifact.success, artifact.code) else {
            return Ok(SaveResult {
                success: false,
                warnings: artifact.warnings,
                message: None,
                error: artifact.error,
            });
        };

        let record = DashboardRecord {
            source: source.to_string(),
            compiled,
            warnings: artifact.warnings.clone(),
            last_modified: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_string_pretty(&record)?)?;
        std::fs::rename(&staging, &path)?;
        tracing::info!(doc, page, path = %path.display(), "saved dashboard");

        Ok(SaveResult {
            success: true,
            warnings: artifact.warnings,
            message: Some(format!("Saved {}/{}", doc, page)),
            error: None,
        })
    }

    pub fn load(&self, doc: &str, page: &str) -> Result<DashboardRecord> {
        let path = self.page_path(doc, page)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Storage("Dashboard not found".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "unreadable dashboard record");
            Error::Storage("Failed to parse dashboard data".to_string())
        })
    }

    /// Raw text of a document's query file
    pub fn load_queries(&self, doc: &str) -> Result<String> {
        let path = self.document_dir(doc)?.join(&self.query_file);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::Storage(format!("Query file not found for {}", doc)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Document name → sorted page names
    pub fn list(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut documents = BTreeMap::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(documents),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(doc) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !NAME.is_match(&doc) {
                continue;
            }
            let mut pages = Vec::new();
            for page in std::fs::read_dir(entry.path())? {
                let path = page?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if NAME.is_match(stem) {
                        pages.push(stem.to_string());
                    }
                }
            }
            pages.sort();
            documents.insert(doc, pages);
        }
        Ok(documents)
    }
}

fn check_name(what: &str, name: &str) -> Result<()> {
    if NAME.is_match(name) {
        Ok(())
    } else {
        Err(Error::Storage(format!(
            "Invalid {} name '{}': use letters, digits, '-' and '_'",
            what, name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<Toggle name="showChart" value="true" />
<Chart source="salesData" visible="{inputs.showChart}" />"#;

    fn store() -> (tempfile::TempDir, DashboardStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DashboardStore::new(dir.path().join("dashboards"), Compiler::default());
        (dir, store)
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let saved = store.save("sales", "Overview", PAGE).unwrap();
        assert!(saved.success, "{:?}", saved.error);
        assert_eq!(saved.message.as_deref(), Some("Saved sales/Overview"));

        let record = store.load("sales", "Overview").unwrap();
        assert_eq!(record.source, PAGE);
        assert!(record.compiled.contains("module \"Overview.dash\""));
        assert!(chrono::DateTime::parse_from_rfc3339(&record.last_modified).is_ok());
        assert!(store.root().join("sales/Overview.json").is_file());
        assert!(!store.root().join("sales/Overview.json.tmp").exists());
    }

    #[test]
    fn test_failed_compile_writes_nothing() {
        let (_dir, store) = store();
        let saved = store.save("sales", "Overview", "<Foo />").unwrap();
        assert!(!saved.success);
        assert!(saved.error.unwrap().contains("Unknown component: Foo"));
        assert!(!store.root().join("sales").exists());
    }

    #[test]
    fn test_load_missing() {
        let (_dir, store) = store();
        let err = store.load("sales", "Overview").unwrap_err();
        assert_eq!(err.author_message(), "Dashboard not found");
        assert_eq!(err.category(), "StorageError");
    }

    #[test]
    fn test_corrupt_record() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.root().join("sales")).unwrap();
        std::fs::write(store.root().join("sales/Overview.json"), "{").unwrap();
        let err = store.load("sales", "Overview").unwrap_err();
        assert_eq!(err.author_message(), "Failed to parse dashboard data");
    }

    #[test]
    fn test_names_cannot_escape_root() {
        let (_dir, store) = store();
        for (doc, page) in [("..", "x"), ("a/b", "x"), ("sales", "../x"), ("", "x")] {
            assert!(store.save(doc, page, PAGE).is_err(), "{}/{}", doc, page);
            assert!(store.load(doc, page).is_err());
        }
    }

    #[test]
    fn test_list() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
        store.save("sales", "Overview", PAGE).unwrap();
        store.save("sales", "Detail", PAGE).unwrap();
        store.save("ops", "Overview", PAGE).unwrap();
        std::fs::write(store.root().join("sales/Overview.sql"), "-- q\nSELECT 1").unwrap();

        let listing = store.list().unwrap();
        assert_eq!(listing.keys().collect::<Vec<_>>(), vec!["ops", "sales"]);
        assert_eq!(listing["sales"], vec!["Detail", "Overview"]);
    }

    #[test]
    fn test_load_queries_from_document_dir() {
        let (_dir, store) = store();
        assert!(matches!(store.load_queries("sales"), Err(Error::Storage(_))));
        std::fs::create_dir_all(store.root().join("sales")).unwrap();
        std::fs::write(store.root().join("sales/Overview.sql"), "-- q\nSELECT 1").unwrap();
        let queries = crate::datasource::parse_queries(&store.load_queries("sales").unwrap());
        assert_eq!(queries["q"], "SELECT 1");
        assert!(store.load_queries("../sales").is_err());
    }

    #[test]
    fn test_query_file_name_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.root = dir.path().to_path_buf();
        config.data.query_file = "Queries.sql".to_string();
        let store = DashboardStore::from_config(&config);
        std::fs::create_dir_all(dir.path().join("ops")).unwrap();
        std::fs::write(dir.path().join("ops/Queries.sql"), "-- a\nSELECT 2").unwrap();
        assert_eq!(store.load_queries("ops").unwrap(), "-- a\nSELECT 2");
    }

    #[test]
    fn test_save_result_serialization() {
        let (_dir, store) = store();
        let saved = store.save("sales", "Overview", PAGE).unwrap();
        let value = serde_json::to_value(&saved).unwrap();
        assert_eq!(value["success"], serde_json::json!(true));
        assert!(value.get("error").is_none());
    }
}
