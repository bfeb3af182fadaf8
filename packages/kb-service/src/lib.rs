pub mod admin;
pub mod documents;
pub mod error;
pub mod rate_limit;
pub mod response_cache;
pub mod responses;
pub mod search;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::{Map, Value};

pub use admin::{CleanupReport, RefreshReport};
pub use documents::{
	AddDocumentRequest, DocumentListResponse, DocumentResponse, UpdateDocumentRequest,
};
use kb_config::{Config, EmbeddingProviderConfig};
use kb_domain::document::RawDocument;
use kb_providers::embedding;
use kb_storage::db::Db;
pub use rate_limit::{RateDecision, RateLimitPolicy, RateLimitStats, RateLimiter, RateWindow};
pub use response_cache::{CacheStats, ResponseCache};
pub use responses::{CacheResponseRequest, CachedResponse};
pub use search::{SearchRequest, SearchResponse};
pub use snapshot::{SnapshotCoordinator, SnapshotInfo};
pub use store::PgDocumentStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable record storage behind the snapshot cache.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	/// Every record in the collection, in a stable order.
	fn fetch_all<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<Vec<RawDocument>>>;

	fn insert<'a>(
		&'a self,
		collection: &'a str,
		document_id: &'a str,
		fields: Map<String, Value>,
	) -> BoxFuture<'a, Result<()>>;

	/// Merges `patch` into an existing record. Fails with [`Error::NotFound`] when the record is
	/// missing.
	fn update<'a>(
		&'a self,
		collection: &'a str,
		document_id: &'a str,
		patch: Map<String, Value>,
	) -> BoxFuture<'a, Result<()>>;

	/// Returns `false` when nothing was deleted.
	fn delete<'a>(&'a self, collection: &'a str, document_id: &'a str)
	-> BoxFuture<'a, Result<bool>>;

	fn get<'a>(
		&'a self,
		collection: &'a str,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<Option<RawDocument>>>;

	/// A newest-first page plus the collection's total record count.
	fn list<'a>(
		&'a self,
		collection: &'a str,
		limit: u32,
		offset: u32,
	) -> BoxFuture<'a, Result<(Vec<RawDocument>, u64)>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
}
impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>) -> Self {
		Self { embedding }
	}
}
impl Default for Providers {
	fn default() -> Self {
		Self { embedding: Arc::new(DefaultProviders) }
	}
}

pub struct KbService {
	pub cfg: Config,
	pub store: Arc<dyn DocumentStore>,
	pub providers: Providers,
	pub snapshots: SnapshotCoordinator,
	pub responses: ResponseCache,
}
impl KbService {
	pub fn new(cfg: Config, db: Db) -> Self {
		Self::with_providers(cfg, Arc::new(PgDocumentStore::new(db)), Providers::default())
	}

	pub fn with_providers(cfg: Config, store: Arc<dyn DocumentStore>, providers: Providers) -> Self {
		let snapshots = SnapshotCoordinator::new(
			store.clone(),
			cfg.storage.documents.collection.clone(),
			&cfg.cache.documents,
		);
		let responses = ResponseCache::new(cfg.cache.responses.default_ttl_seconds);

		Self { cfg, store, providers, snapshots, responses }
	}

	pub(crate) fn collection(&self) -> &str {
		&self.cfg.storage.documents.collection
	}

	pub(crate) async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let vectors = self.providers.embedding.embed(cfg, &[text.to_string()]).await?;
		let Some(vector) = vectors.into_iter().next() else {
			return Err(Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			});
		};

		if vector.len() != cfg.dimensions as usize {
			return Err(Error::Provider {
				message: "Embedding vector dimension mismatch.".to_string(),
			});
		}

		Ok(vector)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
