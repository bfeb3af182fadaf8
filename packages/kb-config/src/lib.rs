mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, DocumentCache, Documents, EmbeddingProviderConfig, Postgres, Providers,
	RateLimit, ResponseCache, Search, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.documents.collection", &cfg.storage.documents.collection),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "Provider embedding api_key must be non-empty.".to_string(),
		});
	}
	if cfg.search.default_top_k == 0 {
		return Err(Error::Validation {
			message: "search.default_top_k must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.default_threshold.is_finite() {
		return Err(Error::Validation {
			message: "search.default_threshold must be a finite number.".to_string(),
		});
	}
	if !(-1.0..=1.0).contains(&cfg.search.default_threshold) {
		return Err(Error::Validation {
			message: "search.default_threshold must be in the range -1.0-1.0.".to_string(),
		});
	}
	if cfg.cache.documents.ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.documents.ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.documents.fetch_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "cache.documents.fetch_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.responses.default_ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.responses.default_ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.responses.cleanup_interval_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.responses.cleanup_interval_seconds must be greater than zero."
				.to_string(),
		});
	}
	if cfg.rate_limit.per_minute == 0 {
		return Err(Error::Validation {
			message: "rate_limit.per_minute must be greater than zero.".to_string(),
		});
	}
	if cfg.rate_limit.per_hour == 0 {
		return Err(Error::Validation {
			message: "rate_limit.per_hour must be greater than zero.".to_string(),
		});
	}

	if let Some(max) = cfg.rate_limit.max_tracked_clients
		&& max == 0
	{
		return Err(Error::Validation {
			message: "rate_limit.max_tracked_clients must be greater than zero.".to_string(),
		});
	}

	for path in &cfg.rate_limit.exempt_paths {
		if !path.starts_with('/') {
			return Err(Error::Validation {
				message: format!("rate_limit.exempt_paths entry {path:?} must start with '/'."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.storage.documents.collection = cfg.storage.documents.collection.trim().to_string();
	cfg.providers.embedding.api_base =
		cfg.providers.embedding.api_base.trim_end_matches('/').to_string();

	cfg.rate_limit.exempt_paths.retain(|path| !path.trim().is_empty());

	for path in &mut cfg.rate_limit.exempt_paths {
		*path = path.trim().to_string();
	}
}
