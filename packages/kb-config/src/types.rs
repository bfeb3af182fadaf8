use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub search: Search,
	pub cache: Cache,
	pub rate_limit: RateLimit,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub documents: Documents,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Documents {
	/// Logical collection the service reads and writes.
	pub collection: String,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	#[serde(default = "default_top_k")]
	pub default_top_k: u32,
	#[serde(default = "default_threshold")]
	pub default_threshold: f32,
}

#[derive(Debug, Deserialize)]
pub struct Cache {
	pub documents: DocumentCache,
	pub responses: ResponseCache,
}

#[derive(Debug, Deserialize)]
pub struct DocumentCache {
	#[serde(default = "default_document_ttl_seconds")]
	pub ttl_seconds: u64,
	/// Upper bound on a single upstream fetch. A timed out fetch counts as a failed refresh.
	#[serde(default = "default_fetch_timeout_ms")]
	pub fetch_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ResponseCache {
	#[serde(default = "default_response_ttl_seconds")]
	pub default_ttl_seconds: u64,
	#[serde(default)]
	pub cache_search_results: bool,
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub per_minute: u32,
	pub per_hour: u32,
	#[serde(default = "default_exempt_paths")]
	pub exempt_paths: Vec<String>,
	/// Optional. Bounds the number of client keys tracked at once.
	pub max_tracked_clients: Option<usize>,
}

fn default_top_k() -> u32 {
	5
}

fn default_threshold() -> f32 {
	0.7
}

fn default_document_ttl_seconds() -> u64 {
	300
}

fn default_fetch_timeout_ms() -> u64 {
	10_000
}

fn default_response_ttl_seconds() -> u64 {
	300
}

fn default_cleanup_interval_seconds() -> u64 {
	60
}

fn default_true() -> bool {
	true
}

fn default_exempt_paths() -> Vec<String> {
	["/health", "/", "/docs", "/openapi.json"].into_iter().map(String::from).collect()
}
