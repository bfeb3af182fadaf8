//! Time-bounded, single-flight cache of a collection's documents.
//!
//! Readers always receive a whole [`SnapshotHandle`]. A refresh builds a new snapshot off to the
//! side and swaps it in under a short write lock, so nobody observes a half-built collection.
//! Concurrent callers that find the cache stale queue on one refresh lock; whoever arrives after
//! a refresh finished adopts that result instead of fetching again, unless a write invalidated
//! the cache after that refresh began its fetch.

use std::{
	sync::{
		Arc, RwLock,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration as StdDuration,
};

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::{DocumentStore, Error};
use kb_domain::document::{CachedDocument, DocumentSnapshot, RawDocument, SnapshotHandle};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SnapshotInfo {
	pub cached_documents: usize,
	#[serde(with = "kb_domain::timestamp::option")]
	pub captured_at: Option<OffsetDateTime>,
	pub cache_age_seconds: Option<i64>,
	pub cache_ttl_seconds: u64,
	pub cache_fresh: bool,
}

struct Installed {
	snapshot: Option<SnapshotHandle>,
	// Freshness clock. Invalidation rewinds it to the epoch while the snapshot itself stays put.
	fresh_as_of: OffsetDateTime,
	// Invalidation count observed before the fetch behind the last refresh outcome.
	synced_invalidations: u64,
}

pub struct SnapshotCoordinator {
	store: Arc<dyn DocumentStore>,
	collection: String,
	ttl: Duration,
	fetch_timeout: StdDuration,
	installed: RwLock<Installed>,
	refresh_lock: Mutex<()>,
	generation: AtomicU64,
	invalidations: AtomicU64,
}
impl SnapshotCoordinator {
	pub fn new(
		store: Arc<dyn DocumentStore>,
		collection: String,
		cfg: &kb_config::DocumentCache,
	) -> Self {
		Self {
			store,
			collection,
			ttl: Duration::seconds(cfg.ttl_seconds.min(i64::MAX as u64) as i64),
			fetch_timeout: StdDuration::from_millis(cfg.fetch_timeout_ms),
			installed: RwLock::new(Installed {
				snapshot: None,
				fresh_as_of: OffsetDateTime::UNIX_EPOCH,
				synced_invalidations: 0,
			}),
			refresh_lock: Mutex::new(()),
			generation: AtomicU64::new(0),
			invalidations: AtomicU64::new(0),
		}
	}

	/// Returns a snapshot no older than the TTL as of `now`, refreshing from the store when
	/// needed. Never fails: a broken store yields the previous snapshot or an empty one.
	pub async fn ensure_fresh(&self, now: OffsetDateTime) -> SnapshotHandle {
		let observed = self.generation.load(Ordering::Acquire);

		if let Some(snapshot) = self.fresh_snapshot(now) {
			return snapshot;
		}

		let _guard = self.refresh_lock.lock().await;

		if self.generation.load(Ordering::Acquire) != observed
			&& let Some(snapshot) = self.joinable_snapshot()
		{
			tracing::debug!(collection = %self.collection, "Joined an in-flight snapshot refresh.");

			return snapshot;
		}
		if let Some(snapshot) = self.fresh_snapshot(now) {
			return snapshot;
		}

		self.refresh_locked(now).await
	}

	/// Refreshes immediately, regardless of freshness.
	pub async fn refresh(&self, now: OffsetDateTime) -> SnapshotHandle {
		let _guard = self.refresh_lock.lock().await;

		self.refresh_locked(now).await
	}

	/// Marks the current snapshot stale. The snapshot stays readable until the next refresh
	/// replaces it.
	pub fn invalidate(&self) {
		let mut installed = self.installed.write().unwrap_or_else(|err| err.into_inner());

		self.invalidations.fetch_add(1, Ordering::AcqRel);

		installed.fresh_as_of = OffsetDateTime::UNIX_EPOCH;

		tracing::debug!(collection = %self.collection, "Document snapshot invalidated.");
	}

	/// The installed snapshot, fresh or not.
	pub fn current(&self) -> Option<SnapshotHandle> {
		self.installed.read().unwrap_or_else(|err| err.into_inner()).snapshot.clone()
	}

	pub fn info(&self, now: OffsetDateTime) -> SnapshotInfo {
		let installed = self.installed.read().unwrap_or_else(|err| err.into_inner());
		let captured_at = installed
			.snapshot
			.as_ref()
			.map(|snapshot| snapshot.captured_at())
			.filter(|captured_at| *captured_at != OffsetDateTime::UNIX_EPOCH);

		SnapshotInfo {
			cached_documents: installed.snapshot.as_ref().map(|snapshot| snapshot.len()).unwrap_or(0),
			captured_at,
			cache_age_seconds: captured_at.map(|captured_at| (now - captured_at).whole_seconds()),
			cache_ttl_seconds: self.ttl.whole_seconds().max(0) as u64,
			cache_fresh: !self.is_stale(&installed, now),
		}
	}

	fn fresh_snapshot(&self, now: OffsetDateTime) -> Option<SnapshotHandle> {
		let installed = self.installed.read().unwrap_or_else(|err| err.into_inner());

		if self.is_stale(&installed, now) { None } else { installed.snapshot.clone() }
	}

	// The last refresh outcome, provided no invalidation arrived after its fetch started.
	fn joinable_snapshot(&self) -> Option<SnapshotHandle> {
		let installed = self.installed.read().unwrap_or_else(|err| err.into_inner());

		if installed.synced_invalidations != self.invalidations.load(Ordering::Acquire) {
			return None;
		}

		installed.snapshot.clone()
	}

	fn is_stale(&self, installed: &Installed, now: OffsetDateTime) -> bool {
		installed.snapshot.is_none() || now - installed.fresh_as_of > self.ttl
	}

	// Caller must hold `refresh_lock`.
	async fn refresh_locked(&self, now: OffsetDateTime) -> SnapshotHandle {
		let fetch_mark = self.invalidations.load(Ordering::Acquire);
		let fetched =
			match tokio::time::timeout(self.fetch_timeout, self.store.fetch_all(&self.collection))
				.await
			{
				Ok(Ok(records)) => Ok(records),
				Ok(Err(err)) => Err(Error::UpstreamFetch { message: err.to_string() }),
				Err(_) => Err(Error::UpstreamFetch {
					message: format!(
						"Fetch did not complete within {} ms.",
						self.fetch_timeout.as_millis()
					),
				}),
			};
		let snapshot = match fetched {
			Ok(records) => self.install(build_documents(records), now, fetch_mark),
			Err(err) => self.fail_soft(&err, fetch_mark),
		};

		self.generation.fetch_add(1, Ordering::AcqRel);

		snapshot
	}

	fn install(
		&self,
		documents: Vec<CachedDocument>,
		now: OffsetDateTime,
		fetch_mark: u64,
	) -> SnapshotHandle {
		let mut installed = self.installed.write().unwrap_or_else(|err| err.into_inner());
		let captured_at = match installed.snapshot.as_ref() {
			Some(previous) => now.max(previous.captured_at()),
			None => now,
		};
		let snapshot = Arc::new(DocumentSnapshot::new(documents, captured_at));

		installed.snapshot = Some(snapshot.clone());
		installed.synced_invalidations = fetch_mark;

		// If a write landed during the fetch, the records may predate it. Freshness then stays at
		// the epoch and the next caller fetches again.
		if self.invalidations.load(Ordering::Acquire) == fetch_mark {
			installed.fresh_as_of = captured_at;
		} else {
			tracing::debug!(
				collection = %self.collection,
				"Snapshot invalidated during refresh. Leaving it stale."
			);
		}

		tracing::info!(
			collection = %self.collection,
			documents = snapshot.len(),
			"Document snapshot refreshed."
		);

		snapshot
	}

	fn fail_soft(&self, err: &Error, fetch_mark: u64) -> SnapshotHandle {
		let mut installed = self.installed.write().unwrap_or_else(|err| err.into_inner());

		installed.synced_invalidations = fetch_mark;

		if let Some(previous) = installed.snapshot.as_ref() {
			tracing::error!(
				collection = %self.collection,
				error = %err,
				documents = previous.len(),
				"Document snapshot refresh failed. Serving the previous snapshot."
			);

			return previous.clone();
		}

		tracing::error!(
			collection = %self.collection,
			error = %err,
			"Document snapshot refresh failed with no previous snapshot. Serving an empty one."
		);

		// Freshness stays at the epoch so the next caller retries the store.
		let empty = Arc::new(DocumentSnapshot::empty(OffsetDateTime::UNIX_EPOCH));

		installed.snapshot = Some(empty.clone());

		empty
	}
}

fn build_documents(records: Vec<RawDocument>) -> Vec<CachedDocument> {
	let mut documents = Vec::with_capacity(records.len());

	for raw in &records {
		match CachedDocument::from_raw(raw) {
			Ok(document) => documents.push(document),
			Err(err) => {
				tracing::warn!(document_id = %raw.id, error = %err, "Skipping document.");
			},
		}
	}

	documents
}
