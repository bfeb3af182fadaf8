//! Field probing over untyped document records.
//!
//! Stored records come from more than one writer, so the embedding and the text live under
//! one of several field names. Each lookup walks a fixed priority list and takes the first
//! field that carries a value.

use serde_json::{Map, Value};

pub const EMBEDDING_FIELDS: [&str; 3] = ["embedding", "embeddings", "vector"];
pub const TEXT_FIELDS: [&str; 4] = ["text", "content", "chunk", "document"];
pub const FALLBACK_TEXT_FIELD: &str = "data";
pub const METADATA_FIELD: &str = "metadata";
pub const CREATED_AT_FIELD: &str = "created_at";
pub const UPDATED_AT_FIELD: &str = "updated_at";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
	#[error("No embedding field is present.")]
	MissingEmbedding,
	#[error("Field {field} is not an array of numbers.")]
	InvalidEmbedding { field: &'static str },
}

/// Returns the first candidate whose value is present, together with the matched key.
///
/// Null, empty strings, empty arrays, and empty objects count as absent.
pub fn probe_field<'a>(
	fields: &'a Map<String, Value>,
	candidates: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
	candidates
		.iter()
		.find_map(|key| fields.get(*key).filter(|value| is_present(value)).map(|value| (*key, value)))
}

pub fn extract_embedding(fields: &Map<String, Value>) -> Result<Vec<f32>, FieldError> {
	let (field, value) = probe_field(fields, &EMBEDDING_FIELDS).ok_or(FieldError::MissingEmbedding)?;
	let items = value.as_array().ok_or(FieldError::InvalidEmbedding { field })?;
	let mut embedding = Vec::with_capacity(items.len());

	for item in items {
		let number = item.as_f64().ok_or(FieldError::InvalidEmbedding { field })?;

		embedding.push(number as f32);
	}

	Ok(embedding)
}

pub fn extract_text(fields: &Map<String, Value>) -> String {
	if let Some((_, value)) = probe_field(fields, &TEXT_FIELDS) {
		return stringify(value);
	}

	fields.get(FALLBACK_TEXT_FIELD).map(stringify).unwrap_or_default()
}

pub fn extract_metadata(fields: &Map<String, Value>) -> Map<String, Value> {
	fields.get(METADATA_FIELD).and_then(Value::as_object).cloned().unwrap_or_default()
}

/// Drops every embedding field, for responses that should not carry raw vectors.
pub fn strip_embeddings(fields: &mut Map<String, Value>) {
	for key in EMBEDDING_FIELDS {
		fields.remove(key);
	}
}

fn is_present(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::String(text) => !text.is_empty(),
		Value::Array(items) => !items.is_empty(),
		Value::Object(map) => !map.is_empty(),
		Value::Bool(_) | Value::Number(_) => true,
	}
}

fn stringify(value: &Value) -> String {
	match value {
		Value::String(text) => text.clone(),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}
