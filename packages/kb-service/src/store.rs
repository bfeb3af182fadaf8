//! Postgres-backed [`DocumentStore`].

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{BoxFuture, DocumentStore, Result};
use kb_domain::{
	document::RawDocument,
	fields::{CREATED_AT_FIELD, FALLBACK_TEXT_FIELD, UPDATED_AT_FIELD},
	timestamp,
};
use kb_storage::{db::Db, documents, models::DocumentRecord};

pub struct PgDocumentStore {
	db: Db,
}
impl PgDocumentStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub fn db(&self) -> &Db {
		&self.db
	}
}

impl DocumentStore for PgDocumentStore {
	fn fetch_all<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<Vec<RawDocument>>> {
		Box::pin(async move {
			let records = documents::fetch_all(&self.db.pool, collection).await?;

			Ok(records.into_iter().map(raw_document).collect())
		})
	}

	fn insert<'a>(
		&'a self,
		collection: &'a str,
		document_id: &'a str,
		fields: Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let fields = Value::Object(fields);

			documents::upsert_document(
				&self.db.pool,
				collection,
				document_id,
				&fields,
				OffsetDateTime::now_utc(),
			)
			.await?;

			Ok(())
		})
	}

	fn update<'a>(
		&'a self,
		collection: &'a str,
		document_id: &'a str,
		patch: Map<String, Value>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let patch = Value::Object(patch);

			documents::merge_document(
				&self.db.pool,
				collection,
				document_id,
				&patch,
				OffsetDateTime::now_utc(),
			)
			.await?;

			Ok(())
		})
	}

	fn delete<'a>(
		&'a self,
		collection: &'a str,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let deleted = documents::delete_document(&self.db.pool, collection, document_id).await?;

			Ok(deleted)
		})
	}

	fn get<'a>(
		&'a self,
		collection: &'a str,
		document_id: &'a str,
	) -> BoxFuture<'a, Result<Option<RawDocument>>> {
		Box::pin(async move {
			let record = documents::get_document(&self.db.pool, collection, document_id).await?;

			Ok(record.map(raw_document))
		})
	}

	fn list<'a>(
		&'a self,
		collection: &'a str,
		limit: u32,
		offset: u32,
	) -> BoxFuture<'a, Result<(Vec<RawDocument>, u64)>> {
		Box::pin(async move {
			let records =
				documents::list_documents(&self.db.pool, collection, limit.into(), offset.into())
					.await?;
			let total = documents::count_documents(&self.db.pool, collection).await?;

			Ok((records.into_iter().map(raw_document).collect(), total.max(0) as u64))
		})
	}
}

/// Converts a stored row into the untyped shape the cache consumes. Non-object payloads land
/// under the fallback text field, and row timestamps fill in when the payload has none.
fn raw_document(record: DocumentRecord) -> RawDocument {
	let mut fields = match record.fields {
		Value::Object(map) => map,
		other => {
			let mut map = Map::new();

			map.insert(FALLBACK_TEXT_FIELD.to_string(), other);

			map
		},
	};

	for (field, value) in
		[(CREATED_AT_FIELD, record.created_at), (UPDATED_AT_FIELD, record.updated_at)]
	{
		if fields.contains_key(field) {
			continue;
		}
		if let Ok(formatted) = timestamp::format(value) {
			fields.insert(field.to_string(), Value::String(formatted));
		}
	}

	RawDocument { id: record.document_id, fields }
}
