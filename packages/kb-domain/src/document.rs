use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::{
	fields::{self, CREATED_AT_FIELD, FieldError, UPDATED_AT_FIELD},
	timestamp,
};

/// A record as the document store returns it: an id and an untyped field map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
	pub id: String,
	pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CachedDocument {
	pub id: String,
	pub text: String,
	pub embedding: Vec<f32>,
	pub metadata: Map<String, Value>,
	pub created_at: Option<OffsetDateTime>,
	pub updated_at: Option<OffsetDateTime>,
}
impl CachedDocument {
	pub fn from_raw(raw: &RawDocument) -> Result<Self, FieldError> {
		let embedding = fields::extract_embedding(&raw.fields)?;

		Ok(Self {
			id: raw.id.clone(),
			text: fields::extract_text(&raw.fields),
			embedding,
			metadata: fields::extract_metadata(&raw.fields),
			created_at: raw.fields.get(CREATED_AT_FIELD).and_then(timestamp::from_field),
			updated_at: raw.fields.get(UPDATED_AT_FIELD).and_then(timestamp::from_field),
		})
	}
}

/// Point-in-time copy of a collection. Never mutated once built.
#[derive(Debug)]
pub struct DocumentSnapshot {
	documents: Vec<CachedDocument>,
	captured_at: OffsetDateTime,
}
impl DocumentSnapshot {
	pub fn new(documents: Vec<CachedDocument>, captured_at: OffsetDateTime) -> Self {
		Self { documents, captured_at }
	}

	pub fn empty(captured_at: OffsetDateTime) -> Self {
		Self::new(Vec::new(), captured_at)
	}

	pub fn documents(&self) -> &[CachedDocument] {
		&self.documents
	}

	pub fn captured_at(&self) -> OffsetDateTime {
		self.captured_at
	}

	pub fn len(&self) -> usize {
		self.documents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.documents.is_empty()
	}
}

pub type SnapshotHandle = Arc<DocumentSnapshot>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedDocument {
	pub id: String,
	pub text: String,
	pub metadata: Map<String, Value>,
	pub similarity: f32,
	#[serde(default, with = "crate::timestamp::option")]
	pub created_at: Option<OffsetDateTime>,
	#[serde(default, with = "crate::timestamp::option")]
	pub updated_at: Option<OffsetDateTime>,
}
impl RankedDocument {
	pub fn from_cached(document: &CachedDocument, similarity: f32) -> Self {
		Self {
			id: document.id.clone(),
			text: document.text.clone(),
			metadata: document.metadata.clone(),
			similarity,
			created_at: document.created_at,
			updated_at: document.updated_at,
		}
	}
}
