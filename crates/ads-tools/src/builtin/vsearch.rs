// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use ads_config::VectorContextConfig;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `docs/spec/*.md` files walked by the preflight indexer (spec.md §4.O).
const SPEC_DOC_NAMES: &[&str] = &["design.md", "requirements.md", "implementation.md", "task.md"];
const ADR_DIR: &str = "docs/adr";
const SPEC_DIR: &str = "docs/spec";

/// The two trigger phrases that stand in for "use the last thing I actually
/// asked for" rather than a literal query (spec.md §4.O).
const CONTINUE_TRIGGERS: &[&str] = &["continue", "继续"];

/// A single row the History Store bridge hands back to the indexer.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: i64,
    pub role: String,
    pub text: String,
}

/// Bridges the Vector Auto-Context indexer/query path to the History Store
/// and Vector KV cursor table without `ads-tools` depending on `ads-store`
/// directly — the same shape as [`crate::AgentInvoker`].
#[async_trait]
pub trait VectorIndexStore: Send + Sync {
    /// Last-indexed content hash for `key` in the `docs` namespace, if any.
    async fn indexed_content_hash(&self, key: &str) -> Option<String>;
    /// Record that `key` was indexed at `content_hash`.
    async fn mark_indexed(&self, key: &str, content_hash: &str);
    /// The `(namespace="history", session)` row-id cursor of the last scan.
    async fn history_cursor(&self, session_id: &str) -> i64;
    async fn advance_history_cursor(&self, session_id: &str, last_id: i64);
    /// All session ids with at least one history row.
    async fn history_sessions(&self) -> Vec<String>;
    /// Oldest-first rows for `session_id` with `id > after_id`.
    async fn history_rows_after(&self, session_id: &str, after_id: i64) -> Vec<HistoryRow>;
    /// The most recent user-authored message in `session_id`, for rewriting
    /// a "continue"/"继续" query into what it actually refers to.
    async fn last_meaningful_user_message(&self, session_id: &str) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct VsearchResponse {
    #[serde(default)]
    results: Vec<VsearchHit>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct VsearchHit {
    path: String,
    #[serde(default)]
    line: Option<u64>,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(default)]
    results: Vec<VsearchHit>,
}

struct CacheEntry {
    at: Instant,
    content: String,
}

/// Vector Auto-Context (spec.md §4.O): a preflight indexer that walks the
/// workspace's spec/ADR docs and new history rows into chunks, and a query
/// path that turns a natural-language question (with "continue"/"继续"
/// rewritten to the last real user message, and stale doc hits dropped)
/// into a retrieved-context string. Silently skipped — not an error — when
/// no endpoint is configured, since this is an optional enrichment.
pub struct VsearchTool {
    workspace_root: PathBuf,
    config: VectorContextConfig,
    store: Option<Arc<dyn VectorIndexStore>>,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl VsearchTool {
    pub fn new(workspace_root: PathBuf, config: VectorContextConfig, store: Option<Arc<dyn VectorIndexStore>>) -> Self {
        let config = VectorContextConfig {
            endpoint: config.endpoint.clone().or_else(|| std::env::var("ADS_VSEARCH_ENDPOINT").ok()),
            ..config
        };
        Self {
            workspace_root,
            config,
            store,
            client: reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().unwrap_or_default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, query: &str) -> Option<String> {
        let guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(query).and_then(|entry| {
            if entry.at.elapsed() < Duration::from_millis(self.config.min_interval_ms) {
                Some(entry.content.clone())
            } else {
                None
            }
        })
    }

    fn store_cache(&self, query: &str, content: &str) {
        let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(query.to_string(), CacheEntry { at: Instant::now(), content: content.to_string() });
    }

    /// Resolve `raw_query`, rewriting a bare "continue"/"继续" into the last
    /// real user message for `session_id` when the bridge has one.
    async fn resolve_query(&self, raw_query: &str, session_id: Option<&str>) -> String {
        let trimmed = raw_query.trim();
        if CONTINUE_TRIGGERS.contains(&trimmed) {
            if let (Some(store), Some(session_id)) = (&self.store, session_id) {
                if let Some(last) = store.last_meaningful_user_message(session_id).await {
                    return last;
                }
            }
        }
        let max = self.config.max_query_chars;
        if raw_query.chars().count() > max {
            raw_query.chars().take(max).collect()
        } else {
            raw_query.to_string()
        }
    }

    /// Run the preflight indexer (doc walk + incremental history scan) and
    /// query the index service, dropping hits for doc files whose on-disk
    /// content has changed since they were indexed.
    async fn query(&self, endpoint: &str, query: &str) -> Result<Vec<VsearchHit>, String> {
        self.index_docs(endpoint).await;
        self.index_history(endpoint).await;

        let resp = self
            .client
            .post(format!("{endpoint}/query"))
            .json(&json!({ "query": query, "top_k": DEFAULT_TOP_K }))
            .send()
            .await
            .map_err(|e| format!("vsearch request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("vsearch service returned {}", resp.status()));
        }
        let parsed: VsearchResponse =
            resp.json().await.map_err(|e| format!("vsearch response was not valid JSON: {e}"))?;

        let hits = self.rerank(endpoint, query, parsed.results).await;
        Ok(self.drop_stale_doc_hits(hits).await)
    }

    /// Optional `/rerank` pass — falls back to the original order on any
    /// failure rather than failing the whole query.
    async fn rerank(&self, endpoint: &str, query: &str, hits: Vec<VsearchHit>) -> Vec<VsearchHit> {
        if hits.is_empty() {
            return hits;
        }
        let result = self
            .client
            .post(format!("{endpoint}/rerank"))
            .json(&json!({ "query": query, "results": hits }))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<RerankResponse>().await {
                Ok(reranked) if !reranked.results.is_empty() => reranked.results,
                _ => hits,
            },
            _ => hits,
        }
    }

    /// Drop hits under `docs/**` whose current on-disk content hash no
    /// longer matches what the indexer last recorded — the file changed
    /// since indexing and the snippet may no longer be accurate.
    async fn drop_stale_doc_hits(&self, hits: Vec<VsearchHit>) -> Vec<VsearchHit> {
        let Some(store) = &self.store else {
            return hits;
        };
        let mut kept = Vec::with_capacity(hits.len());
        for hit in hits {
            if !hit.path.starts_with("docs/") {
                kept.push(hit);
                continue;
            }
            let abs = self.workspace_root.join(&hit.path);
            let Ok(text) = std::fs::read_to_string(&abs) else {
                continue; // file is gone entirely
            };
            let current_hash = hex_sha256(text.as_bytes());
            match store.indexed_content_hash(&hit.path).await {
                Some(indexed) if indexed == current_hash => kept.push(hit),
                _ => debug!(path = %hit.path, "dropping stale vsearch hit: file changed since indexing"),
            }
        }
        kept
    }

    /// Chunk and post every configured spec/ADR doc whose content hash has
    /// changed since the last indexing pass.
    async fn index_docs(&self, endpoint: &str) {
        let Some(store) = &self.store else { return };
        for path in self.doc_paths() {
            let Ok(text) = std::fs::read_to_string(&self.workspace_root.join(&path)) else { continue };
            let content_hash = hex_sha256(text.as_bytes());
            if store.indexed_content_hash(&path).await.as_deref() == Some(content_hash.as_str()) {
                continue;
            }
            let chunks = chunk_text(&text, self.config.chunk_max_chars, self.config.chunk_overlap_chars);
            for (i, chunk) in chunks.iter().enumerate() {
                let _ = self
                    .client
                    .post(format!("{endpoint}/index"))
                    .json(&json!({
                        "source_type": "doc",
                        "path": path,
                        "chunk_index": i,
                        "text": chunk,
                    }))
                    .send()
                    .await;
            }
            store.mark_indexed(&path, &content_hash).await;
        }
    }

    /// Relative paths of every configured spec doc + ADR that exists on disk.
    fn doc_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for name in SPEC_DOC_NAMES {
            let rel = format!("{SPEC_DIR}/{name}");
            if self.workspace_root.join(&rel).is_file() {
                paths.push(rel);
            }
        }
        let adr_dir = self.workspace_root.join(ADR_DIR);
        if let Ok(entries) = std::fs::read_dir(&adr_dir) {
            let mut adrs: Vec<String> = entries
                .flatten()
                .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("md"))
                .filter_map(|e| e.path().file_name().map(|n| format!("{ADR_DIR}/{}", n.to_string_lossy())))
                .collect();
            adrs.sort();
            paths.extend(adrs);
        }
        paths
    }

    /// Scan every session's new history rows since the last cursor, chunk
    /// and post each one, then advance the cursor past what was just sent.
    async fn index_history(&self, endpoint: &str) {
        let Some(store) = &self.store else { return };
        for session_id in store.history_sessions().await {
            let cursor = store.history_cursor(&session_id).await;
            let rows = store.history_rows_after(&session_id, cursor).await;
            if rows.is_empty() {
                continue;
            }
            let mut max_id = cursor;
            for row in &rows {
                max_id = max_id.max(row.id);
                let chunks = chunk_text(&row.text, self.config.chunk_max_chars, self.config.chunk_overlap_chars);
                for (i, chunk) in chunks.iter().enumerate() {
                    let _ = self
                        .client
                        .post(format!("{endpoint}/index"))
                        .json(&json!({
                            "source_type": "history",
                            "session_id": session_id,
                            "row_id": row.id,
                            "role": row.role,
                            "chunk_index": i,
                            "text": chunk,
                        }))
                        .send()
                        .await;
                }
            }
            store.advance_history_cursor(&session_id, max_id).await;
        }
    }

    /// Implicit auto-context injection point: run the same indexed query a
    /// caller would get from the explicit tool, formatted as a context
    /// block, or `None` when disabled/empty/unavailable.
    pub async fn auto_context(&self, session_id: &str, user_text: &str) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let endpoint = self.config.endpoint.clone()?;
        let query = self.resolve_query(user_text, Some(session_id)).await;
        if query.trim().is_empty() {
            return None;
        }
        if let Some(cached) = self.cached(&query) {
            return non_empty(cached);
        }
        let hits = self.query(&endpoint, &query).await.ok()?;
        let content = format_hits(&hits);
        self.store_cache(&query, &content);
        non_empty(content)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn format_hits(hits: &[VsearchHit]) -> String {
    hits.iter()
        .map(|h| match h.line {
            Some(l) => format!("{}:{l} ({:.3})\n{}", h.path, h.score, h.snippet),
            None => format!("{} ({:.3})\n{}", h.path, h.score, h.snippet),
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Split `text` into `max_chars`-sized chunks with `overlap_chars` of
/// repeated tail, `overlap_chars` clamped to `max_chars / 4` (spec.md §4.O).
/// `max_chars == 0` is treated as "don't chunk" and returns the whole text
/// as a single chunk.
pub fn chunk_text(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if max_chars == 0 || chars.len() <= max_chars {
        return if chars.is_empty() { Vec::new() } else { vec![text.to_string()] };
    }
    let overlap = overlap_chars.min(max_chars / 4);
    let step = max_chars.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

const DEFAULT_TOP_K: usize = 10;

#[async_trait]
impl Tool for VsearchTool {
    fn name(&self) -> &str {
        "vsearch"
    }

    fn description(&self) -> &str {
        "Vector Auto-Context: semantic search over the workspace's indexed embeddings. \
         Payload is a plain query string. Silently returns '(vsearch disabled)' when no \
         index endpoint is configured, rather than failing the turn. Use grep/search for \
         exact-string lookups; reserve vsearch for conceptual queries."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "string",
            "description": "Natural-language query"
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let raw_query = match call.args.as_str() {
            Some(q) => q.to_string(),
            None => match call.args.get("query").and_then(|v| v.as_str()) {
                Some(q) => q.to_string(),
                None => return ToolOutput::err(&call.id, "input error: empty query"),
            },
        };
        if raw_query.trim().is_empty() {
            return ToolOutput::err(&call.id, "input error: empty query");
        }

        let endpoint = match &self.config.endpoint {
            Some(e) => e.clone(),
            None => return ToolOutput::ok(&call.id, "(vsearch disabled)"),
        };

        let query = self.resolve_query(&raw_query, None).await;

        if let Some(content) = self.cached(&query) {
            return ToolOutput::ok(&call.id, content);
        }

        debug!(query = %query, endpoint = %endpoint, "vsearch tool");

        let hits = match self.query(&endpoint, &query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "vsearch query failed");
                return ToolOutput::err(&call.id, e);
            }
        };

        if hits.is_empty() {
            return ToolOutput::ok(&call.id, "(no matches)");
        }
        let content = format_hits(&hits);
        self.store_cache(&query, &content);
        ToolOutput::ok(&call.id, content)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::tool::{Tool, ToolCall};

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "v1".into(), name: "vsearch".into(), args }
    }

    fn tool(endpoint: Option<&str>) -> VsearchTool {
        let config = VectorContextConfig { endpoint: endpoint.map(str::to_string), ..VectorContextConfig::default() };
        VsearchTool::new(PathBuf::from("."), config, None)
    }

    #[tokio::test]
    async fn empty_query_is_input_error() {
        let out = tool(None).execute(&call(json!(""))).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn disabled_without_endpoint_is_not_an_error() {
        std::env::remove_var("ADS_VSEARCH_ENDPOINT");
        let out = tool(None).execute(&call(json!("retry logic"))).await;
        assert!(!out.is_error);
        assert_eq!(out.content, "(vsearch disabled)");
    }

    #[tokio::test]
    async fn string_payload_is_accepted_as_query() {
        let out = tool(None).execute(&call(json!("how do we do retries"))).await;
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn cached_result_is_served_within_min_interval_ms() {
        let t = tool(Some("http://127.0.0.1:1"));
        t.store_cache("q", "cached hits");
        assert_eq!(t.cached("q"), Some("cached hits".to_string()));
    }

    #[tokio::test]
    async fn cached_result_expires_after_min_interval_ms() {
        let config = VectorContextConfig { min_interval_ms: 0, ..VectorContextConfig::default() };
        let t = VsearchTool::new(PathBuf::from("."), config, None);
        t.store_cache("q", "cached hits");
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(t.cached("q"), None);
    }

    #[tokio::test]
    async fn connection_failure_surfaces_as_tool_error_not_panic() {
        let t = tool(Some("http://127.0.0.1:1"));
        let out = t.execute(&call(json!("q"))).await;
        assert!(out.is_error);
    }

    #[test]
    fn chunk_text_splits_with_overlap_clamped_to_quarter_of_max() {
        let text = "a".repeat(100);
        let chunks = chunk_text(&text, 40, 30); // overlap clamped to 10
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
    }

    #[test]
    fn chunk_text_returns_single_chunk_when_under_max() {
        let chunks = chunk_text("short text", 1000, 100);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn chunk_text_empty_input_yields_no_chunks() {
        assert_eq!(chunk_text("", 10, 2), Vec::<String>::new());
    }

    struct FakeStore {
        hashes: AsyncMutex<HashMap<String, String>>,
        last_user_message: Option<String>,
    }

    #[async_trait]
    impl VectorIndexStore for FakeStore {
        async fn indexed_content_hash(&self, key: &str) -> Option<String> {
            self.hashes.lock().await.get(key).cloned()
        }
        async fn mark_indexed(&self, key: &str, content_hash: &str) {
            self.hashes.lock().await.insert(key.to_string(), content_hash.to_string());
        }
        async fn history_cursor(&self, _session_id: &str) -> i64 {
            0
        }
        async fn advance_history_cursor(&self, _session_id: &str, _last_id: i64) {}
        async fn history_sessions(&self) -> Vec<String> {
            Vec::new()
        }
        async fn history_rows_after(&self, _session_id: &str, _after_id: i64) -> Vec<HistoryRow> {
            Vec::new()
        }
        async fn last_meaningful_user_message(&self, _session_id: &str) -> Option<String> {
            self.last_user_message.clone()
        }
    }

    #[tokio::test]
    async fn continue_trigger_rewrites_to_last_user_message() {
        let store = Arc::new(FakeStore {
            hashes: AsyncMutex::new(HashMap::new()),
            last_user_message: Some("what is the retry policy".to_string()),
        });
        let config = VectorContextConfig::default();
        let t = VsearchTool::new(PathBuf::from("."), config, Some(store));
        let resolved = t.resolve_query("continue", Some("session-1")).await;
        assert_eq!(resolved, "what is the retry policy");
    }

    #[tokio::test]
    async fn chinese_continue_trigger_is_recognized() {
        let store =
            Arc::new(FakeStore { hashes: AsyncMutex::new(HashMap::new()), last_user_message: Some("真正的问题".to_string()) });
        let t = VsearchTool::new(PathBuf::from("."), VectorContextConfig::default(), Some(store));
        let resolved = t.resolve_query("继续", Some("session-1")).await;
        assert_eq!(resolved, "真正的问题");
    }

    #[tokio::test]
    async fn auto_context_is_none_when_disabled() {
        let t = tool(Some("http://127.0.0.1:1"));
        assert_eq!(t.auto_context("s1", "anything").await, None);
    }

    #[tokio::test]
    async fn doc_paths_finds_known_spec_files_and_adrs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs/spec")).unwrap();
        std::fs::create_dir_all(dir.path().join("docs/adr")).unwrap();
        std::fs::write(dir.path().join("docs/spec/design.md"), "design").unwrap();
        std::fs::write(dir.path().join("docs/adr/0001-pick-db.md"), "adr").unwrap();
        let t = VsearchTool::new(dir.path().to_path_buf(), VectorContextConfig::default(), None);
        let paths = t.doc_paths();
        assert_eq!(paths, vec!["docs/spec/design.md".to_string(), "docs/adr/0001-pick-db.md".to_string()]);
    }
}
