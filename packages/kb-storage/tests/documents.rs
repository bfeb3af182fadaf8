use serde_json::json;
use time::{Duration, OffsetDateTime};

use kb_config::Postgres;
use kb_storage::{Error, db::Db, documents};
use kb_testkit::TestDatabase;

async fn connect(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set KB_PG_DSN to run."]
async fn schema_bootstrap_is_idempotent() {
	let Some(base_dsn) = kb_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstrap_is_idempotent; set KB_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;

	db.ensure_schema().await.expect("Second bootstrap failed.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'kb_documents'",
	)
	.fetch_one(&db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to clean up test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set KB_PG_DSN to run."]
async fn document_lifecycle_round_trips_fields() {
	let Some(base_dsn) = kb_testkit::env_dsn() else {
		eprintln!("Skipping document_lifecycle_round_trips_fields; set KB_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = connect(&test_db).await;
	let collection = test_db.collection_name("docs");
	let other = test_db.collection_name("other");
	let t0 = OffsetDateTime::now_utc();

	documents::upsert_document(
		&db.pool,
		&collection,
		"a",
		&json!({ "text": "alpha", "embedding": [1.0, 0.0] }),
		t0,
	)
	.await
	.expect("Failed to insert a.");
	documents::upsert_document(
		&db.pool,
		&collection,
		"b",
		&json!({ "content": "beta", "vector": [0.0, 1.0] }),
		t0 + Duration::seconds(1),
	)
	.await
	.expect("Failed to insert b.");
	documents::upsert_document(&db.pool, &other, "c", &json!({ "text": "gamma" }), t0)
		.await
		.expect("Failed to insert c.");

	let all = documents::fetch_all(&db.pool, &collection).await.expect("Failed to fetch.");
	let ids: Vec<&str> = all.iter().map(|record| record.document_id.as_str()).collect();

	assert_eq!(ids, vec!["a", "b"]);

	documents::merge_document(
		&db.pool,
		&collection,
		"a",
		&json!({ "metadata": { "tag": "x" } }),
		t0 + Duration::seconds(2),
	)
	.await
	.expect("Failed to merge a.");

	let a = documents::get_document(&db.pool, &collection, "a")
		.await
		.expect("Failed to get a.")
		.expect("Document a must exist.");

	assert_eq!(a.fields["text"], json!("alpha"));
	assert_eq!(a.fields["metadata"], json!({ "tag": "x" }));

	let page = documents::list_documents(&db.pool, &collection, 1, 0).await.expect("List failed.");

	assert_eq!(page.len(), 1);
	assert_eq!(page[0].document_id, "b");
	assert_eq!(documents::count_documents(&db.pool, &collection).await.expect("Count failed."), 2);

	let missing = documents::merge_document(&db.pool, &collection, "zzz", &json!({}), t0).await;

	assert!(matches!(missing, Err(Error::NotFound(_))));
	assert!(documents::delete_document(&db.pool, &collection, "a").await.expect("Delete failed."));
	assert!(!documents::delete_document(&db.pool, &collection, "a").await.expect("Delete failed."));

	db.pool.close().await;
	test_db.cleanup().await.expect("Failed to clean up test database.");
}
