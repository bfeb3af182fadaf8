//! Document writes and reads. Every successful write invalidates the snapshot, so the next search
//! observes it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, KbService, Result};
use kb_domain::{
	document::RawDocument,
	fields::{self, CREATED_AT_FIELD, METADATA_FIELD, UPDATED_AT_FIELD},
	timestamp,
};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 500;

const TEXT_FIELD: &str = "text";
const EMBEDDING_FIELD: &str = "embedding";
const ID_FIELD: &str = "id";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddDocumentRequest {
	pub text: String,
	#[serde(default)]
	pub metadata: Option<Map<String, Value>>,
	#[serde(default)]
	pub document_id: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateDocumentRequest {
	#[serde(default)]
	pub text: Option<String>,
	#[serde(default)]
	pub metadata: Option<Map<String, Value>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentResponse {
	pub document_id: String,
	pub success: bool,
	pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentListResponse {
	pub documents: Vec<Map<String, Value>>,
	pub total_count: u64,
	pub limit: u32,
	pub offset: u32,
}

impl KbService {
	pub async fn add_document(&self, req: AddDocumentRequest) -> Result<DocumentResponse> {
		const OPERATION: &str = "add";

		let text = req.text.trim();

		if text.is_empty() {
			return Err(Error::InvalidRequest { message: "text must not be empty.".to_string() });
		}

		let document_id = match req.document_id.as_deref().map(str::trim) {
			Some("") => {
				return Err(Error::InvalidRequest {
					message: "document_id must not be blank when given.".to_string(),
				});
			},
			Some(id) => id.to_string(),
			None => Uuid::new_v4().to_string(),
		};
		let embedding = self
			.embed_one(text)
			.await
			.map_err(|err| Error::document_operation(OPERATION, err))?;
		let now = now_field()?;
		let mut fields = Map::new();

		fields.insert(TEXT_FIELD.to_string(), Value::String(text.to_string()));
		fields.insert(EMBEDDING_FIELD.to_string(), embedding_value(embedding));
		fields.insert(METADATA_FIELD.to_string(), Value::Object(req.metadata.unwrap_or_default()));
		fields.insert(CREATED_AT_FIELD.to_string(), now.clone());
		fields.insert(UPDATED_AT_FIELD.to_string(), now);

		self.store
			.insert(self.collection(), &document_id, fields)
			.await
			.map_err(|err| Error::document_operation(OPERATION, err))?;
		self.snapshots.invalidate();

		tracing::info!(document_id = %document_id, "Document added.");

		Ok(DocumentResponse {
			document_id,
			success: true,
			message: "Document added successfully.".to_string(),
		})
	}

	/// Applies a partial update. New text is re-embedded; metadata replaces the stored metadata.
	pub async fn update_document(
		&self,
		document_id: &str,
		req: UpdateDocumentRequest,
	) -> Result<DocumentResponse> {
		const OPERATION: &str = "update";

		let document_id = require_id(document_id)?;

		if req.text.is_none() && req.metadata.is_none() {
			return Err(Error::InvalidRequest {
				message: "At least one of text or metadata is required.".to_string(),
			});
		}

		let mut patch = Map::new();

		if let Some(text) = req.text.as_deref().map(str::trim) {
			if text.is_empty() {
				return Err(Error::InvalidRequest {
					message: "text must not be empty when given.".to_string(),
				});
			}

			let embedding = self
				.embed_one(text)
				.await
				.map_err(|err| Error::document_operation(OPERATION, err))?;

			patch.insert(TEXT_FIELD.to_string(), Value::String(text.to_string()));
			patch.insert(EMBEDDING_FIELD.to_string(), embedding_value(embedding));
		}
		if let Some(metadata) = req.metadata {
			patch.insert(METADATA_FIELD.to_string(), Value::Object(metadata));
		}

		patch.insert(UPDATED_AT_FIELD.to_string(), now_field()?);

		self.store
			.update(self.collection(), document_id, patch)
			.await
			.map_err(|err| Error::document_operation(OPERATION, err))?;
		self.snapshots.invalidate();

		tracing::info!(document_id = %document_id, "Document updated.");

		Ok(DocumentResponse {
			document_id: document_id.to_string(),
			success: true,
			message: "Document updated successfully.".to_string(),
		})
	}

	pub async fn delete_document(&self, document_id: &str) -> Result<DocumentResponse> {
		let document_id = require_id(document_id)?;
		let deleted = self
			.store
			.delete(self.collection(), document_id)
			.await
			.map_err(|err| Error::document_operation("delete", err))?;

		if !deleted {
			return Err(Error::NotFound { message: format!("Document {document_id} not found.") });
		}

		self.snapshots.invalidate();

		tracing::info!(document_id = %document_id, "Document deleted.");

		Ok(DocumentResponse {
			document_id: document_id.to_string(),
			success: true,
			message: "Document deleted successfully.".to_string(),
		})
	}

	/// Reads straight from the store, bypassing the snapshot. Embedding fields are stripped.
	pub async fn get_document(&self, document_id: &str) -> Result<Map<String, Value>> {
		let document_id = require_id(document_id)?;
		let raw = self
			.store
			.get(self.collection(), document_id)
			.await
			.map_err(|err| Error::document_operation("get", err))?
			.ok_or_else(|| Error::NotFound {
				message: format!("Document {document_id} not found."),
			})?;

		Ok(public_fields(raw))
	}

	/// A newest-first page of documents without their embeddings.
	pub async fn list_documents(
		&self,
		limit: Option<u32>,
		offset: Option<u32>,
	) -> Result<DocumentListResponse> {
		let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
		let offset = offset.unwrap_or(0);

		if limit == 0 || limit > MAX_LIST_LIMIT {
			return Err(Error::InvalidRequest {
				message: format!("limit must be between 1 and {MAX_LIST_LIMIT}."),
			});
		}

		let (documents, total_count) = self
			.store
			.list(self.collection(), limit, offset)
			.await
			.map_err(|err| Error::document_operation("list", err))?;

		Ok(DocumentListResponse {
			documents: documents.into_iter().map(public_fields).collect(),
			total_count,
			limit,
			offset,
		})
	}
}

fn require_id(document_id: &str) -> Result<&str> {
	let trimmed = document_id.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidRequest { message: "document_id is required.".to_string() });
	}

	Ok(trimmed)
}

fn now_field() -> Result<Value> {
	let formatted = timestamp::format(OffsetDateTime::now_utc())
		.map_err(|err| Error::Storage { message: format!("Failed to format timestamp: {err}") })?;

	Ok(Value::String(formatted))
}

fn embedding_value(embedding: Vec<f32>) -> Value {
	Value::Array(embedding.into_iter().map(Value::from).collect())
}

fn public_fields(raw: RawDocument) -> Map<String, Value> {
	let RawDocument { id, mut fields } = raw;

	fields::strip_embeddings(&mut fields);
	fields.insert(ID_FIELD.to_string(), Value::String(id));

	fields
}
