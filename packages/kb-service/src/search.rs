use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, KbService, Result};
use kb_domain::{document::RankedDocument, similarity, timestamp};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
	pub query: String,
	/// Zero or negative asks for nothing and yields no results.
	pub top_k: Option<i64>,
	pub threshold: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
	pub query: String,
	pub results: Vec<RankedDocument>,
	pub total_results: usize,
}
impl SearchResponse {
	fn new(query: String, results: Vec<RankedDocument>) -> Self {
		Self { query, total_results: results.len(), results }
	}
}

impl KbService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		self.search_at(req, OffsetDateTime::now_utc()).await
	}

	/// Runs a search as if the current time were `now`.
	///
	/// Only a blank query or a non-finite threshold fails. Embedding failures and store outages
	/// degrade to an empty result list.
	pub async fn search_at(&self, req: SearchRequest, now: OffsetDateTime) -> Result<SearchResponse> {
		let query = req.query.trim().to_string();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
		}

		let threshold = req.threshold.unwrap_or(self.cfg.search.default_threshold);

		if !threshold.is_finite() {
			return Err(Error::InvalidRequest {
				message: "threshold must be a finite number.".to_string(),
			});
		}

		let top_k = req.top_k.unwrap_or(i64::from(self.cfg.search.default_top_k));
		let Ok(top_k) = usize::try_from(top_k) else {
			return Ok(SearchResponse::new(query, Vec::new()));
		};

		if top_k == 0 {
			return Ok(SearchResponse::new(query, Vec::new()));
		}

		let snapshot = self.snapshots.ensure_fresh(now).await;

		if snapshot.is_empty() {
			tracing::debug!(query_len = query.len(), "Search skipped. Snapshot has no documents.");

			return Ok(SearchResponse::new(query, Vec::new()));
		}

		let cache_key = self.cfg.cache.responses.cache_search_results.then(|| {
			search_cache_key(&query, top_k, threshold, snapshot.captured_at())
		});

		if let Some(key) = cache_key.as_deref()
			&& let Some(cached) = self.responses.get_at(key, now)
		{
			match serde_json::from_str::<SearchResponse>(&cached) {
				// Keys are case-insensitive, so echo this caller's query rather than the cached one.
				Ok(response) => return Ok(SearchResponse { query, ..response }),
				Err(err) => {
					tracing::warn!(error = %err, "Discarding unreadable cached search response.");
				},
			}
		}

		let query_embedding = match self.embed_one(&query).await {
			Ok(embedding) => embedding,
			Err(err) => {
				tracing::error!(error = %err, "Query embedding failed. Returning no results.");

				return Ok(SearchResponse::new(query, Vec::new()));
			},
		};
		let results = similarity::rank(&query_embedding, &snapshot, top_k, threshold);

		tracing::info!(
			documents = snapshot.len(),
			results = results.len(),
			top_k,
			threshold,
			"Search completed."
		);

		let response = SearchResponse::new(query, results);

		if let Some(key) = cache_key.as_deref()
			&& !response.results.is_empty()
		{
			match serde_json::to_string(&response) {
				Ok(serialized) => self.responses.set_at(key, serialized, None, now),
				Err(err) => tracing::warn!(error = %err, "Failed to serialize search response."),
			}
		}

		Ok(response)
	}
}

/// Search results are keyed by the snapshot they were ranked against, so a refreshed snapshot
/// never serves results computed from an older one.
fn search_cache_key(
	query: &str,
	top_k: usize,
	threshold: f32,
	captured_at: OffsetDateTime,
) -> String {
	let captured_at = timestamp::format(captured_at)
		.unwrap_or_else(|_| captured_at.unix_timestamp_nanos().to_string());

	format!("search\u{1f}{captured_at}\u{1f}{top_k}\u{1f}{threshold}\u{1f}{query}")
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	#[test]
	fn cache_key_varies_with_snapshot_and_parameters() {
		let t0 = datetime!(2024-01-01 00:00:00 UTC);
		let t1 = datetime!(2024-01-01 00:05:00 UTC);
		let base = search_cache_key("rust", 5, 0.7, t0);

		assert_ne!(base, search_cache_key("rust", 5, 0.7, t1));
		assert_ne!(base, search_cache_key("rust", 3, 0.7, t0));
		assert_ne!(base, search_cache_key("rust", 5, 0.5, t0));
		assert_eq!(base, search_cache_key("rust", 5, 0.7, t0));
	}
}
