//! Queries over `kb_documents`. Field maps are stored as-is in a JSONB column so records
//! written by other tools keep whatever schema they arrived with.

use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;

use crate::{Error, Result, models::DocumentRecord};

const SELECT_COLUMNS: &str = "collection, document_id, fields, created_at, updated_at";

/// Every record in `collection`, oldest first. Ties on `created_at` fall back to the id so
/// repeated fetches return the same order.
pub async fn fetch_all<'e, E>(executor: E, collection: &str) -> Result<Vec<DocumentRecord>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {SELECT_COLUMNS} FROM kb_documents WHERE collection = $1 ORDER BY created_at ASC, document_id ASC"
	);
	let rows = sqlx::query_as::<_, DocumentRecord>(&sql).bind(collection).fetch_all(executor).await?;

	Ok(rows)
}

/// Writes a full record, replacing any record already stored under the same id.
pub async fn upsert_document<'e, E>(
	executor: E,
	collection: &str,
	document_id: &str,
	fields: &Value,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	ensure_object(fields)?;

	sqlx::query(
		"\
INSERT INTO kb_documents (collection, document_id, fields, created_at, updated_at)
VALUES ($1, $2, $3, $4, $4)
ON CONFLICT (collection, document_id) DO UPDATE
SET fields = EXCLUDED.fields, updated_at = EXCLUDED.updated_at",
	)
	.bind(collection)
	.bind(document_id)
	.bind(fields)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

/// Merges `patch` into the stored field map. Keys in `patch` win.
pub async fn merge_document<'e, E>(
	executor: E,
	collection: &str,
	document_id: &str,
	patch: &Value,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	ensure_object(patch)?;

	let result = sqlx::query(
		"\
UPDATE kb_documents
SET fields = fields || $3, updated_at = $4
WHERE collection = $1 AND document_id = $2",
	)
	.bind(collection)
	.bind(document_id)
	.bind(patch)
	.bind(now)
	.execute(executor)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("Document {document_id} does not exist.")));
	}

	Ok(())
}

pub async fn delete_document<'e, E>(executor: E, collection: &str, document_id: &str) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM kb_documents WHERE collection = $1 AND document_id = $2")
		.bind(collection)
		.bind(document_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn get_document<'e, E>(
	executor: E,
	collection: &str,
	document_id: &str,
) -> Result<Option<DocumentRecord>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT {SELECT_COLUMNS} FROM kb_documents WHERE collection = $1 AND document_id = $2"
	);
	let row = sqlx::query_as::<_, DocumentRecord>(&sql)
		.bind(collection)
		.bind(document_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

/// A page of records, newest first.
pub async fn list_documents<'e, E>(
	executor: E,
	collection: &str,
	limit: i64,
	offset: i64,
) -> Result<Vec<DocumentRecord>>
where
	E: PgExecutor<'e>,
{
	if limit < 0 || offset < 0 {
		return Err(Error::InvalidArgument("limit and offset must be zero or greater.".to_string()));
	}

	let sql = format!(
		"\
SELECT {SELECT_COLUMNS}
FROM kb_documents
WHERE collection = $1
ORDER BY created_at DESC, document_id ASC
LIMIT $2 OFFSET $3"
	);
	let rows = sqlx::query_as::<_, DocumentRecord>(&sql)
		.bind(collection)
		.bind(limit)
		.bind(offset)
		.fetch_all(executor)
		.await?;

	Ok(rows)
}

pub async fn count_documents<'e, E>(executor: E, collection: &str) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM kb_documents WHERE collection = $1")
		.bind(collection)
		.fetch_one(executor)
		.await?;

	Ok(count)
}

fn ensure_object(fields: &Value) -> Result<()> {
	if fields.is_object() {
		Ok(())
	} else {
		Err(Error::InvalidArgument("Document fields must be a JSON object.".to_string()))
	}
}
