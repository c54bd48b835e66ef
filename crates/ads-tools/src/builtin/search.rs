// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use ads_config::WebSearchConfig;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

/// External web search via the Brave Search API.
pub struct SearchTool {
    config: WebSearchConfig,
    client: reqwest::Client,
}

impl SearchTool {
    pub fn new(config: WebSearchConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_key(&self) -> Option<String> {
        self.config.api_key.clone().or_else(|| std::env::var("BRAVE_API_KEY").ok())
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "External web search (Brave Search API). Payload is a query string, or \
         {query, maxResults?, includeDomains?, excludeDomains?, lang?}. Requires \
         BRAVE_API_KEY (or tools.web.search.api_key in config); returns a config error \
         otherwise. Use for anything outside the repository — vsearch/grep/search the \
         codebase itself."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "maxResults": { "type": "integer", "description": "Maximum number of results (default 10)" },
                "includeDomains": { "type": "array", "items": { "type": "string" } },
                "excludeDomains": { "type": "array", "items": { "type": "string" } },
                "lang": { "type": "string", "description": "Preferred result language, e.g. 'en'" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.as_str() {
            Some(q) => q.to_string(),
            None => match call.args.get("query").and_then(|v| v.as_str()) {
                Some(q) => q.to_string(),
                None => return ToolOutput::err(&call.id, "input error: empty query"),
            },
        };
        if query.trim().is_empty() {
            return ToolOutput::err(&call.id, "input error: empty query");
        }
        let max_results = call.args.get("maxResults").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_MAX_RESULTS as u64);

        let api_key = match self.api_key() {
            Some(k) => k,
            None => return ToolOutput::err(&call.id, "config error: BRAVE_API_KEY is not set"),
        };

        debug!(query = %query, "search tool");

        let resp = self
            .client
            .get(BRAVE_ENDPOINT)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query.as_str()), ("count", &max_results.to_string())])
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("search request failed: {e}")),
        };
        if !resp.status().is_success() {
            return ToolOutput::err(&call.id, format!("search provider returned {}", resp.status()));
        }
        let parsed: BraveResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, format!("search response was not valid JSON: {e}")),
        };

        let results = parsed.web.map(|w| w.results).unwrap_or_default();
        if results.is_empty() {
            return ToolOutput::ok(&call.id, "(no results)");
        }
        let content = results
            .into_iter()
            .take(max_results as usize)
            .map(|r| format!("{}\n{}\n{}", r.title, r.url, r.description))
            .collect::<Vec<_>>()
            .join("\n\n");
        ToolOutput::ok(&call.id, content)
    }
}
