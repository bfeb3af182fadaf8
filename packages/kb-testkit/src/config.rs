use serde_json::Map;

use kb_config::{
	Cache, Config, DocumentCache, Documents, EmbeddingProviderConfig, Postgres, Providers,
	RateLimit, ResponseCache, Search, Service, Storage,
};

/// A complete configuration for tests. Nothing in it points at a reachable server except `dsn`.
pub fn test_config(dsn: String, collection: String, dimensions: u32) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			admin_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		storage: Storage {
			postgres: Postgres { dsn, pool_max_conns: 2 },
			documents: Documents { collection },
		},
		providers: Providers { embedding: dummy_embedding_provider(dimensions) },
		search: Search { default_top_k: 5, default_threshold: 0.7 },
		cache: Cache {
			documents: DocumentCache { ttl_seconds: 300, fetch_timeout_ms: 2_000 },
			responses: ResponseCache {
				default_ttl_seconds: 300,
				cache_search_results: false,
				cleanup_interval_seconds: 60,
			},
		},
		rate_limit: RateLimit {
			enabled: true,
			per_minute: 60,
			per_hour: 1_000,
			exempt_paths: vec![
				"/health".to_string(),
				"/".to_string(),
				"/docs".to_string(),
				"/openapi.json".to_string(),
			],
			max_tracked_clients: None,
		},
	}
}

pub fn dummy_embedding_provider(dimensions: u32) -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base: "http://127.0.0.1:1".to_string(),
		api_key: "test-key".to_string(),
		path: "/embeddings".to_string(),
		model: "test-embedding".to_string(),
		dimensions,
		timeout_ms: 1_000,
		default_headers: Map::new(),
	}
}
