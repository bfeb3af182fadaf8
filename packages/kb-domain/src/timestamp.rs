//! RFC 3339 timestamps as they appear in stored field maps and API payloads.

use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub fn format(value: OffsetDateTime) -> Result<String, time::error::Format> {
	value.format(&Rfc3339)
}

/// Reads a timestamp out of an untyped field value.
///
/// Strings are parsed as RFC 3339 and numbers as Unix seconds. Anything else, including a
/// malformed string, is treated as unset.
pub fn from_field(value: &Value) -> Option<OffsetDateTime> {
	match value {
		Value::String(raw) => OffsetDateTime::parse(raw, &Rfc3339).ok(),
		Value::Number(number) => number
			.as_i64()
			.or_else(|| number.as_f64().map(|secs| secs.trunc() as i64))
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
		_ => None,
	}
}

pub mod option {
	use serde::{Deserialize as _, Deserializer, Serializer};
	use time::{OffsetDateTime, format_description::well_known::Rfc3339};

	pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(value) => {
				let formatted = super::format(*value).map_err(serde::ser::Error::custom)?;

				serializer.serialize_str(&formatted)
			},
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
	where
		D: Deserializer<'de>,
	{
		match Option::<String>::deserialize(deserializer)? {
			Some(raw) =>
				OffsetDateTime::parse(&raw, &Rfc3339).map(Some).map_err(serde::de::Error::custom),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use time::macros::datetime;

	use super::*;

	#[test]
	fn reads_rfc3339_and_unix_seconds() {
		let expected = datetime!(2024-05-01 12:00:00 UTC);

		assert_eq!(from_field(&json!("2024-05-01T12:00:00Z")), Some(expected));
		assert_eq!(from_field(&json!(expected.unix_timestamp())), Some(expected));
	}

	#[test]
	fn malformed_values_are_unset() {
		assert_eq!(from_field(&json!("yesterday")), None);
		assert_eq!(from_field(&json!(null)), None);
		assert_eq!(from_field(&json!({ "seconds": 1 })), None);
	}
}
