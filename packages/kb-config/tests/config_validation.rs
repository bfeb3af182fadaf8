use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use kb_config::Config;

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let mut table = root.as_table_mut().expect("Template config must be a table.");

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("kb_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_error(payload: String) -> String {
	let path = write_temp_config(payload);
	let result = kb_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result.expect_err("Expected config validation error.").to_string()
}

#[test]
fn sample_config_loads() {
	let path = write_temp_config(SAMPLE_CONFIG_TEMPLATE_TOML.to_string());
	let result = kb_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Sample config must load.");

	assert_eq!(cfg.cache.documents.ttl_seconds, 300);
	assert_eq!(cfg.rate_limit.per_minute, 60);
	assert_eq!(cfg.rate_limit.per_hour, 1_000);
	assert_eq!(cfg.providers.embedding.api_base, "https://api.openai.com");
	assert!(cfg.rate_limit.exempt_paths.iter().any(|path| path == "/health"));
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.");
	let table = root.as_table_mut().expect("Template config must be a table.");
	let rate_limit = table
		.get_mut("rate_limit")
		.and_then(Value::as_table_mut)
		.expect("Template config must include [rate_limit].");

	rate_limit.remove("exempt_paths");
	rate_limit.remove("enabled");

	let cache = table
		.get_mut("cache")
		.and_then(Value::as_table_mut)
		.and_then(|cache| cache.get_mut("documents"))
		.and_then(Value::as_table_mut)
		.expect("Template config must include [cache.documents].");

	cache.remove("fetch_timeout_ms");

	let cfg: Config = toml::from_str(&toml::to_string(&root).expect("Failed to render config."))
		.expect("Failed to parse config.");

	assert!(cfg.rate_limit.enabled);
	assert_eq!(cfg.rate_limit.exempt_paths, vec!["/health", "/", "/docs", "/openapi.json"]);
	assert_eq!(cfg.cache.documents.fetch_timeout_ms, 10_000);
	assert_eq!(cfg.rate_limit.max_tracked_clients, None);
}

#[test]
fn document_ttl_must_be_positive() {
	let message = load_error(sample_toml_with("cache.documents", "ttl_seconds", Value::Integer(0)));

	assert!(
		message.contains("cache.documents.ttl_seconds must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn rate_limits_must_be_positive() {
	let message = load_error(sample_toml_with("rate_limit", "per_minute", Value::Integer(0)));

	assert!(
		message.contains("rate_limit.per_minute must be greater than zero."),
		"Unexpected error message: {message}"
	);

	let message = load_error(sample_toml_with("rate_limit", "per_hour", Value::Integer(0)));

	assert!(
		message.contains("rate_limit.per_hour must be greater than zero."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn threshold_must_be_within_cosine_range() {
	let message = load_error(sample_toml_with("search", "default_threshold", Value::Float(1.5)));

	assert!(
		message.contains("search.default_threshold must be in the range -1.0-1.0."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn embedding_api_key_must_be_non_empty() {
	let message =
		load_error(sample_toml_with("providers.embedding", "api_key", Value::String("  ".into())));

	assert!(
		message.contains("Provider embedding api_key must be non-empty."),
		"Unexpected error message: {message}"
	);
}

#[test]
fn exempt_paths_must_be_absolute() {
	let message = load_error(sample_toml_with(
		"rate_limit",
		"exempt_paths",
		Value::Array(vec![Value::String("health".into())]),
	));

	assert!(message.contains("must start with '/'."), "Unexpected error message: {message}");
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("kb_config_test_missing_file.toml");
	let err = kb_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, kb_config::Error::ReadConfig { .. }));
}
