use axum::{Json, Router, routing::post};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;

use kb_config::EmbeddingProviderConfig;

fn provider_config(api_base: String, dimensions: u32) -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "test".to_string(),
		api_base,
		api_key: "secret".to_string(),
		path: "/v1/embeddings".to_string(),
		model: "test-embedding".to_string(),
		dimensions,
		timeout_ms: 5_000,
		default_headers: Map::new(),
	}
}

async fn spawn_embedding_server() -> String {
	async fn handler(Json(body): Json<Value>) -> Json<Value> {
		let inputs = body.get("input").and_then(Value::as_array).cloned().unwrap_or_default();
		let data: Vec<Value> = inputs
			.iter()
			.enumerate()
			.rev()
			.map(|(index, input)| {
				let len = input.as_str().map(str::len).unwrap_or_default() as f64;

				json!({ "index": index, "embedding": [len, 1.0] })
			})
			.collect();

		Json(json!({ "data": data }))
	}

	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind listener.");
	let addr = listener.local_addr().expect("Failed to read listener address.");
	let app = Router::new().route("/v1/embeddings", post(handler));

	tokio::spawn(async move {
		axum::serve(listener, app).await.expect("Embedding server failed.");
	});

	format!("http://{addr}")
}

#[test]
fn builds_bearer_auth_header() {
	let headers =
		kb_providers::auth_headers("secret", &Map::new()).expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn rejects_non_string_default_headers() {
	let mut headers = Map::new();

	headers.insert("X-Team".to_string(), json!(7));

	assert!(kb_providers::auth_headers("secret", &headers).is_err());
}

#[tokio::test]
async fn embeds_texts_in_input_order() {
	let api_base = spawn_embedding_server().await;
	let cfg = provider_config(api_base, 2);
	let texts = vec!["a".to_string(), "abc".to_string()];
	let vectors = kb_providers::embedding::embed(&cfg, &texts).await.expect("Embedding failed.");

	assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0]]);
}

#[tokio::test]
async fn rejects_dimension_mismatch() {
	let api_base = spawn_embedding_server().await;
	let cfg = provider_config(api_base, 3);
	let texts = vec!["a".to_string()];
	let err = kb_providers::embedding::embed(&cfg, &texts)
		.await
		.expect_err("Expected a dimension mismatch.");

	assert!(matches!(err, kb_providers::Error::InvalidResponse { .. }), "Unexpected error: {err}");
}
