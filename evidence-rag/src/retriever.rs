use std::sync::Arc;
use std::time::Duration;

use crate::clients::{LiteratureFetch, LiteratureSearch};
use crate::config::RetrievalSettings;
use crate::models::{EvidenceSet, LiteratureRecord, MAX_EVIDENCE_RECORDS, SearchQuery};
use crate::parser::parse_records;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Searches, deduplicates, fetches and parses literature for a set of queries.
///
/// Retrieval is best-effort and never returns an error: a failing search
/// contributes no identifiers, and a failing fetch yields an empty set.
/// Each external call is attempted exactly once.
pub struct LiteratureRetriever {
    search: Arc<dyn LiteratureSearch>,
    fetch: Arc<dyn LiteratureFetch>,
    settings: RetrievalSettings,
}

impl LiteratureRetriever {
    pub fn new(
        search: Arc<dyn LiteratureSearch>,
        fetch: Arc<dyn LiteratureFetch>,
        mut settings: RetrievalSettings,
    ) -> Self {
        // Never fetch more than an evidence set can hold.
        settings.max_records = settings.max_records.min(MAX_EVIDENCE_RECORDS);
        Self {
            search,
            fetch,
            settings,
        }
    }

    pub async fn retrieve(&self, queries: &[SearchQuery]) -> EvidenceSet {
        let batches = self.search_all(queries).await;
        let identifiers = dedupe_identifiers(batches, self.settings.max_records);
        info!(identifiers = ?identifiers, "Deduplicated literature identifiers");

        if identifiers.is_empty() {
            warn!("No literature identifiers found for any query, skipping fetch");
            return EvidenceSet::new();
        }

        match self.fetch_records(&identifiers).await {
            Ok(records) => {
                let evidence = EvidenceSet::from_records(records);
                info!(
                    requested = identifiers.len(),
                    parsed = evidence.len(),
                    "Literature records retrieved"
                );
                evidence
            }
            Err(e) => {
                error!("Literature fetch failed: {}", e);
                EvidenceSet::new()
            }
        }
    }

    /// Runs one search per query concurrently and returns the results in
    /// query order. Dropping the future aborts searches still in flight.
    async fn search_all(&self, queries: &[SearchQuery]) -> Vec<Vec<String>> {
        let queries: Vec<SearchQuery> = queries
            .iter()
            .take(self.settings.max_queries)
            .cloned()
            .collect();
        let mut batches = vec![Vec::new(); queries.len()];

        let mut tasks = JoinSet::new();
        for (index, query) in queries.into_iter().enumerate() {
            let search = Arc::clone(&self.search);
            let max_results = self.settings.ids_per_query;
            let timeout = self.settings.search_timeout;
            tasks.spawn(async move {
                let identifiers = search_one(search.as_ref(), &query, max_results, timeout).await;
                (index, identifiers)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, identifiers)) => batches[index] = identifiers,
                Err(e) => warn!("Literature search task did not complete: {}", e),
            }
        }
        batches
    }

    async fn fetch_records(
        &self,
        identifiers: &[String],
    ) -> anyhow::Result<Vec<LiteratureRecord>> {
        let raw = tokio::time::timeout(self.settings.fetch_timeout, self.fetch.fetch(identifiers))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "fetch timed out after {}s",
                    self.settings.fetch_timeout.as_secs_f32()
                )
            })??;

        Ok(order_by_identifiers(parse_records(&raw), identifiers))
    }
}

async fn search_one(
    search: &dyn LiteratureSearch,
    query: &str,
    max_results: usize,
    timeout: Duration,
) -> Vec<String> {
    match tokio::time::timeout(timeout, search.search(query, max_results)).await {
        Ok(Ok(mut identifiers)) => {
            identifiers.truncate(max_results);
            info!(query = %query, found = identifiers.len(), "Literature search completed");
            identifiers
        }
        Ok(Err(e)) => {
            warn!(query = %query, "Literature search failed, continuing without it: {}", e);
            Vec::new()
        }
        Err(_) => {
            warn!(
                query = %query,
                "Literature search timed out after {}s, continuing without it",
                timeout.as_secs_f32()
            );
            Vec::new()
        }
    }
}

/// Concatenates per-query identifiers, keeps the first occurrence of each
/// and caps the result.
pub fn dedupe_identifiers(batches: Vec<Vec<String>>, cap: usize) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for identifier in batches.into_iter().flatten() {
        if unique.len() >= cap {
            break;
        }
        let identifier = identifier.trim().to_string();
        if identifier.is_empty() || unique.contains(&identifier) {
            continue;
        }
        unique.push(identifier);
    }
    unique
}

/// Reorders parsed records to follow the requested identifier order; records
/// whose identifier was not requested keep their document order at the end.
fn order_by_identifiers(
    records: Vec<LiteratureRecord>,
    identifiers: &[String],
) -> Vec<LiteratureRecord> {
    let mut indexed: Vec<(usize, LiteratureRecord)> = records
        .into_iter()
        .map(|record| {
            let rank = identifiers
                .iter()
                .position(|id| *id == record.identifier)
                .unwrap_or(identifiers.len());
            (rank, record)
        })
        .collect();
    // Stable sort keeps document order among equal ranks.
    indexed.sort_by_key(|(rank, _)| *rank);
    indexed.into_iter().map(|(_, record)| record).collect()
}
