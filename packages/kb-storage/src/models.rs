use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRecord {
	pub collection: String,
	pub document_id: String,
	pub fields: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
