//! Test fixtures: configuration builders and throwaway Postgres databases.
//!
//! Database-backed tests are `#[ignore]`d and read the server address from `KB_PG_DSN`.

mod config;
mod error;

pub use config::{dummy_embedding_provider, test_config};
pub use error::{Error, Result};

use std::{env, str::FromStr};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

/// A uniquely named database, dropped again by [`TestDatabase::cleanup`].
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse KB_PG_DSN: {err}.")))?;
		let admin_options = base_options.clone().database("postgres");
		let mut admin_conn = PgConnection::connect_with(&admin_options).await?;
		let name = format!("kb_test_{}", Uuid::new_v4().simple());

		admin_conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;
		admin_conn.close().await?;

		let dsn = base_options.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn collection_name(&self, prefix: &str) -> String {
		format!("{prefix}_{}", self.name)
	}

	pub async fn cleanup(self) -> Result<()> {
		let mut conn = PgConnection::connect_with(&self.admin_options).await?;

		conn.execute(format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, self.name).as_str())
			.await?;

		Ok(())
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("KB_PG_DSN").ok()
}
