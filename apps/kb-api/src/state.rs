use std::sync::Arc;

use kb_service::{KbService, RateLimitPolicy, RateLimiter};
use kb_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<KbService>,
	pub rate_limiter: Arc<RateLimiter>,
}
impl AppState {
	pub async fn new(config: kb_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		Ok(Self::from_service(KbService::new(config, db)))
	}

	/// Wraps an already built service. The rate limiter takes its policy from the service config.
	pub fn from_service(service: KbService) -> Self {
		let rate_limiter = RateLimiter::new(RateLimitPolicy::from(&service.cfg.rate_limit));

		Self { service: Arc::new(service), rate_limiter: Arc::new(rate_limiter) }
	}
}
