//! Data sources: named row sets for display widgets
//!
//! A chart names its data with `source="salesData"`. Names resolve first
//! against static sources, then against the document's query file, whose
//! queries run through a host-supplied `QueryBackend`. Results are cached
//! per `doc:source` key until invalidated, and concurrent requests for an
//! uncached key share one in-flight fetch.
//!
//! Query files mark each query with a `--name` line:
//!
//! ```text
//! -- salesData
//! SELECT month AS name, SUM(revenue) AS value
//! FROM sales GROUP BY month
//!
//! -- regionData
//! SELECT region AS name, COUNT(*) AS value FROM sales GROUP BY region
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{Error, Result};

/// Rows as handed to widgets: objects keyed by column name
pub type Rows = Arc<Vec<Value>>;

/// Extract named queries from query-file text
///
/// A line starting with `--` and some text opens a query named by that text;
/// the non-blank, non-comment lines that follow form its body. Queries with
/// an empty body are dropped.
pub fn parse_queries(text: &str) -> BTreeMap<String, String> {
    let mut queries = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("--") {
            let name = rest.trim();
            if name.is_empty() {
                continue;
            }
            if let Some((name, body)) = current.take() {
                insert_query(&mut queries, name, &body);
            }
            current = Some((name.to_string(), Vec::new()));
        } else if !trimmed.is_empty() {
            if let Some((_, body)) = current.as_mut() {
                body.push(line);
            }
        }
    }
    if let Some((name, body)) = current {
        insert_query(&mut queries, name, &body);
    }
    queries
}

fn insert_query(queries: &mut BTreeMap<String, String>, name: String, body: &[&str]) {
    let body = body.join("\n");
    let body = body.trim();
    if !body.is_empty() {
        queries.insert(name, body.to_string());
    }
}

// ── Backend ───────────────────────────────────────────────

/// Tabular query result as returned by the query proxy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub results: Vec<Vec<Value>>,
}

impl ResultSet {
    /// Label/value rows from the first two columns
    ///
    /// `()` is stripped from the value column name, so `count_star()`
    /// becomes `count_star`.
    pub fn into_rows(self) -> Result<Vec<Value>> {
        let [label, value, ..] = self.columns.as_slice() else {
            return Err(Error::DataSource(format!(
                "Result set needs at least two columns, got {}",
                self.columns.len()
            )));
        };
        let value = value.replace("()", "");
        Ok(self
            .results
            .into_iter()
            .map(|row| {
                let mut cells = row.into_iter();
                let mut object = serde_json::Map::new();
                object.insert(label.clone(), cells.next().unwrap_or(Value::Null));
                object.insert(value.clone(), cells.next().unwrap_or(Value::Null));
                Value::Object(object)
            })
            .collect())
    }
}

/// Host side of data access: query files and query execution
pub trait QueryBackend: Send + Sync {
    /// Query-file text for a document
    fn load_queries<'a>(&'a self, doc: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Run one query
    fn execute<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<ResultSet>>;
}

// ── Static sources ────────────────────────────────────────

fn labelled(rows: &[(&str, u32)]) -> Rows {
    Arc::new(
        rows.iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect(),
    )
}

/// Built-in sample row sets available to every document
pub fn sample_sources() -> BTreeMap<String, Rows> {
    [
        (
            "salesData",
            labelled(&[
                ("Jan", 820),
                ("Feb", 932),
                ("Mar", 901),
                ("Apr", 934),
                ("May", 1200),
                ("Jun", 1100),
            ]),
        ),
        (
            "productData",
            labelled(&[
                ("Product A", 120),
                ("Product B", 200),
                ("Product C", 150),
                ("Product D", 80),
                ("Product E", 90),
            ]),
        ),
        (
            "growthData",
            labelled(&[("Q1", 150), ("Q2", 280), ("Q3", 220), ("Q4", 320)]),
        ),
        (
            "marketData",
            labelled(&[("Desktop", 1048), ("Mobile", 735), ("Tablet", 580), ("Other", 484)]),
        ),
        (
            "regionData",
            labelled(&[
                ("North America", 450),
                ("Europe", 380),
                ("Asia Pacific", 290),
                ("Latin America", 120),
            ]),
        ),
    ]
    .into_iter()
    .map(|(name, rows)| (name.to_string(), rows))
    .collect()
}

// ── Cache ─────────────────────────────────────────────────

type PendingFetch = Shared<BoxFuture<'static, Rows>>;

#[derive(Default)]
struct CacheState {
    /// Id handed to the next fetch; a settling fetch only touches its own entry
    next_fetch: u64,
    cache: HashMap<String, Rows>,
    pending: HashMap<String, (u64, PendingFetch)>,
}

/// Deduplicating, caching resolver for named data sources
pub struct DataSourceCache {
    backend: Arc<dyn QueryBackend>,
    static_sources: BTreeMap<String, Rows>,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for DataSourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceCache")
            .field("static_sources", &self.static_sources.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl DataSourceCache {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        DataSourceCache {
            backend,
            static_sources: BTreeMap::new(),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_static_sources(mut self, sources: BTreeMap<String, Rows>) -> Self {
        self.static_sources = sources;
        self
    }

    /// Static source names, sorted
    pub fn available_sources(&self) -> Vec<&str> {
        self.static_sources.keys().map(String::as_str).collect()
    }

    fn cache_key(source: &str, doc: Option<&str>) -> String {
        match doc {
            Some(doc) => format!("{}:{}", doc, source),
            None => source.to_string(),
        }
    }

    /// Rows for a named source
    ///
    /// Never fails: a missing query or a backend error resolves to an
    /// empty row set, which is cached like any other result.
    pub async fn get(&self, source: &str, doc: Option<&str>) -> Rows {
        if let Some(rows) = self.static_sources.get(source) {
            return Arc::clone(rows);
        }

        let key = Self::cache_key(source, doc);
        let (fetch_id, fetch) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(rows) = state.cache.get(&key) {
                tracing::debug!(key = %key, "data source cache hit");
                return Arc::clone(rows);
            }
            match state.pending.get(&key) {
                Some((id, fetch)) => {
                    tracing::debug!(key = %key, "joining pending data source fetch");
                    (*id, fetch.clone())
                }
                None => {
                    let fetch = fetch_rows(
                        Arc::clone(&self.backend),
                        source.to_string(),
                        doc.map(str::to_string),
                    )
                    .boxed()
                    .shared();
                    let id = state.next_fetch;
                    state.next_fetch += 1;
                    state.pending.insert(key.clone(), (id, fetch.clone()));
                    (id, fetch)
                }
            }
        };

        let rows = fetch.await;

        // An invalidated fetch no longer owns the pending slot: serve it, never cache it
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.pending.get(&key).is_some_and(|(id, _)| *id == fetch_id) {
            state.pending.remove(&key);
            state.cache.insert(key, Arc::clone(&rows));
        }
        rows
    }

    /// Drop cached and pending entries for one document, or for all
    pub fn invalidate(&self, doc: Option<&str>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match doc {
            Some(doc) => {
                let prefix = format!("{}:", doc);
                state.cache.retain(|key, _| !key.starts_with(&prefix));
                state.pending.retain(|key, _| !key.starts_with(&prefix));
            }
            None => {
                state.cache.clear();
                state.pending.clear();
            }
        }
        tracing::debug!(doc = doc.unwrap_or("*"), "invalidated data source cache");
    }

    pub fn cached_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache
            .len()
    }

    /// Fetches still in flight
    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

async fn fetch_rows(backend: Arc<dyn QueryBackend>, source: String, doc: Option<String>) -> Rows {
    let Some(doc) = doc else {
        return Rows::default();
    };
    let text = match backend.load_queries(&doc).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(doc = %doc, error = %e, "failed to load query file");
            return Rows::default();
        }
    };
    let queries = parse_queries(&text);
    let Some(query) = queries.get(&source) else {
        tracing::debug!(doc = %doc, source = %source, "no query for data source");
        return Rows::default();
    };
    match backend.execute(query).await.and_then(ResultSet::into_rows) {
        Ok(rows) => {
            tracing::debug!(doc = %doc, source = %source, rows = rows.len(), "fetched data source");
            Arc::new(rows)
        }
        Err(e) => {
            tracing::warn!(doc = %doc, source = %source, error = %e, "data source query failed");
            Rows::default()
        }
    }
}
