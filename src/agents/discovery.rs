use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::errors::GuardError;
use crate::models::AgentRunResult;
use crate::resilience::ResilientCaller;
use crate::services::{SourceHttpClient, TargetService};
use super::Agent;
use tracing::{debug, info, warn};

/// Where discovery lists come from.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, GuardError>;
}

#[async_trait]
impl SourceFetcher for SourceHttpClient {
    async fn fetch(&self, url: &str) -> Result<String, GuardError> {
        self.get_text(url).await
    }
}

/// A candidate indexer definition, in the receiving service's own format.
pub type Candidate = Map<String, Value>;

/// Parse one discovery document.
///
/// Accepts a JSON array of definitions or base URLs, a JSON object whose
/// array values hold definitions, or newline-separated base URLs where
/// blank lines and `#` comments are ignored.
pub fn parse_candidates(body: &str) -> Vec<Candidate> {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(base_url_candidate)
            .collect();
    };

    match parsed {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(obj) => Some(obj),
                Value::String(url) => Some(base_url_candidate(&url)),
                _ => None,
            })
            .collect(),
        Value::Object(obj) => obj
            .into_iter()
            .filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .flatten()
            .filter_map(|item| match item {
                Value::Object(obj) => Some(obj),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn base_url_candidate(url: &str) -> Candidate {
    let mut candidate = Map::new();
    candidate.insert("baseUrl".into(), Value::String(url.to_string()));
    candidate
}

/// Identity used for de-duplication and logging: the name if present,
/// otherwise the base URL.
pub fn candidate_label(candidate: &Candidate) -> Option<String> {
    ["name", "baseUrl"]
        .iter()
        .find_map(|key| candidate.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

/// Collects candidate indexers from external lists and, when a receiving
/// service is configured, adds the ones it does not already have.
pub struct DiscoveryAgent {
    name: String,
    sources: Vec<String>,
    fetcher: Arc<dyn SourceFetcher>,
    caller: Arc<ResilientCaller>,
    sink: Option<Arc<dyn TargetService>>,
}

impl DiscoveryAgent {
    pub fn new(
        name: &str,
        sources: Vec<String>,
        fetcher: Arc<dyn SourceFetcher>,
        caller: Arc<ResilientCaller>,
    ) -> Self {
        Self {
            name: name.to_string(),
            sources,
            fetcher,
            caller,
            sink: None,
        }
    }

    /// Add discovered indexers to `service`. Without a sink the agent only
    /// reports what it found.
    pub fn with_sink(mut self, service: Arc<dyn TargetService>) -> Self {
        self.sink = Some(service);
        self
    }

    async fn collect(&self) -> (Vec<Candidate>, Vec<String>) {
        let fetched = futures::future::join_all(self.sources.iter().map(|url| async move {
            let body = self
                .caller
                .call_unguarded("fetch_discovery_source", || self.fetcher.fetch(url))
                .await;
            (url, body)
        }))
        .await;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        let mut errors = Vec::new();
        for (url, body) in fetched {
            match body {
                Ok(body) => {
                    let parsed = parse_candidates(&body);
                    info!(agent = %self.name, source = %url, candidates = parsed.len(), "Discovery source read");
                    for candidate in parsed {
                        match candidate_label(&candidate) {
                            Some(label) if seen.insert(label.clone()) => candidates.push(candidate),
                            Some(_) => {}
                            None => debug!(source = %url, "Candidate without name or baseUrl ignored"),
                        }
                    }
                }
                Err(e) => {
                    warn!(agent = %self.name, source = %url, error = %e, "Discovery source failed");
                    errors.push(format!("{}: {}", url, e));
                }
            }
        }
        (candidates, errors)
    }

    /// Add every candidate the sink does not already know by name or base URL.
    /// Adds are not retried since a repeated create can duplicate an indexer.
    async fn add_new(
        &self,
        sink: &dyn TargetService,
        candidates: &[Candidate],
    ) -> Result<(Vec<String>, usize, Vec<String>), GuardError> {
        let existing = self
            .caller
            .call_unguarded("list_targets", || sink.list_targets())
            .await?;
        let mut known: HashSet<String> = HashSet::new();
        for target in &existing {
            if !target.name.trim().is_empty() {
                known.insert(target.name.trim().to_lowercase());
            }
            if let Some(url) = target.extra.get("baseUrl").and_then(Value::as_str) {
                known.insert(url.trim().to_lowercase());
            }
        }

        let mut added = Vec::new();
        let mut skipped = 0;
        let mut failures = Vec::new();
        for candidate in candidates {
            let label = candidate_label(candidate).unwrap_or_default();
            let url = candidate
                .get("baseUrl")
                .and_then(Value::as_str)
                .map(|u| u.trim().to_lowercase());
            if known.contains(&label) || url.is_some_and(|u| known.contains(&u)) {
                skipped += 1;
                continue;
            }
            match sink.add_target(&Value::Object(candidate.clone())).await {
                Ok(target) => {
                    info!(
                        agent = %self.name,
                        service = sink.name(),
                        target_id = target.id,
                        candidate = %label,
                        "Discovered indexer added"
                    );
                    added.push(label);
                }
                Err(e) => {
                    warn!(agent = %self.name, service = sink.name(), candidate = %label, error = %e, "Failed to add discovered indexer");
                    failures.push(format!("{}: {}", label, e));
                }
            }
        }
        Ok((added, skipped, failures))
    }
}

#[async_trait]
impl Agent for DiscoveryAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<AgentRunResult, GuardError> {
        let started_at = Utc::now();
        info!(agent = %self.name, sources = self.sources.len(), "Starting discovery cycle");
        let (candidates, mut source_errors) = self.collect().await;

        let mut metadata: HashMap<String, Value> = HashMap::new();
        metadata.insert("sources".into(), json!(self.sources.len()));
        metadata.insert("candidates".into(), json!(candidates.len()));

        let mut add_failures = Vec::new();
        if let Some(sink) = &self.sink {
            match self.add_new(sink.as_ref(), &candidates).await {
                Ok((added, skipped, failures)) => {
                    metadata.insert("added".into(), json!(added));
                    metadata.insert("skipped_existing".into(), json!(skipped));
                    add_failures = failures;
                }
                Err(e) => source_errors.push(format!("{}: {}", sink.name(), e)),
            }
        }

        info!(
            agent = %self.name,
            candidates = candidates.len(),
            source_errors = source_errors.len(),
            add_failures = add_failures.len(),
            "Discovery cycle complete"
        );
        let success = source_errors.is_empty() && add_failures.is_empty();
        if !source_errors.is_empty() {
            metadata.insert("source_errors".into(), json!(source_errors));
        }
        if !add_failures.is_empty() {
            metadata.insert("add_failures".into(), json!(add_failures));
        }

        Ok(AgentRunResult::new(&self.name, started_at, success, Vec::new(), metadata))
    }
}
