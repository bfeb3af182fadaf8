use serde::Serialize;
use time::OffsetDateTime;

use crate::{CacheStats, KbService, SnapshotInfo};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RefreshReport {
	pub refreshed_documents: usize,
	pub info: SnapshotInfo,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CleanupReport {
	pub removed_entries: usize,
	pub stats: CacheStats,
}

impl KbService {
	pub fn snapshot_info(&self) -> SnapshotInfo {
		self.snapshots.info(OffsetDateTime::now_utc())
	}

	/// Rebuilds the document snapshot now, ignoring its TTL.
	pub async fn refresh_snapshot(&self) -> RefreshReport {
		let now = OffsetDateTime::now_utc();
		let snapshot = self.snapshots.refresh(now).await;

		RefreshReport { refreshed_documents: snapshot.len(), info: self.snapshots.info(now) }
	}

	pub fn response_cache_stats(&self) -> CacheStats {
		self.responses.stats()
	}

	pub fn clear_response_cache(&self) -> CacheStats {
		self.responses.clear();

		self.responses.stats()
	}

	pub fn cleanup_response_cache(&self) -> CleanupReport {
		let removed_entries = self.responses.clear_expired();

		CleanupReport { removed_entries, stats: self.responses.stats() }
	}
}
