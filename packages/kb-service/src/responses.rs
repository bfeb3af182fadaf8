use serde::{Deserialize, Serialize};

use crate::{Error, KbService, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheResponseRequest {
	pub query: String,
	pub response: String,
	#[serde(default)]
	pub ttl_seconds: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
	pub query: String,
	pub cached: bool,
	pub response: Option<String>,
}

impl KbService {
	pub fn cached_response(&self, query: &str) -> Result<CachedResponse> {
		let query = require_query(query)?;
		let response = self.responses.get(query);

		Ok(CachedResponse { query: query.to_string(), cached: response.is_some(), response })
	}

	pub fn cache_response(&self, req: CacheResponseRequest) -> Result<()> {
		let query = require_query(&req.query)?;

		self.responses.set(query, req.response, req.ttl_seconds);

		Ok(())
	}
}

fn require_query(query: &str) -> Result<&str> {
	if query.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
	}

	Ok(query)
}
