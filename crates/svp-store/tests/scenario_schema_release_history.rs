//! Schema document lifecycle against a live Postgres.
//!
//! GREEN when:
//! - first insert reports `inserted`, find returns the same schema;
//! - re-inserting the identical schema reports `no_change`;
//! - inserting a different schema reports `updated` and archives the old
//!   active as release #1;
//! - delete with history reverts to the previous release;
//! - delete without history removes the document.
//!
//! Skips (passes vacuously) when SVP_TEST_DATABASE_URL is not set.

use svp_schemas::{InsertSchemaRequest, SchemaWriteStatus};
use svp_testkit::{bigger_schema, sample_schema, test_doc_store, unique_import_name};

fn request(import_name: &str, schema: serde_json::Value) -> InsertSchemaRequest {
    InsertSchemaRequest {
        import_name: import_name.to_string(),
        active_schema: schema,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn schema_upload_roundtrip_and_revert() {
    let Some(store) = test_doc_store().await else {
        eprintln!("skipping: SVP_TEST_DATABASE_URL not set");
        return;
    };
    let import_name = unique_import_name("schema-roundtrip");

    // First insert.
    let inserted = store
        .insert_one_schema(&request(&import_name, sample_schema()))
        .await
        .unwrap();
    assert_eq!(inserted.status, SchemaWriteStatus::Inserted);

    let found = store.find_jsonschema(&import_name).await.unwrap();
    let document = found.schema.expect("document must exist after insert");
    assert_eq!(document.active_schema, sample_schema());
    assert!(document.schemas_releases.is_empty());

    // Identical insert: no change.
    let unchanged = store
        .insert_one_schema(&request(&import_name, sample_schema()))
        .await
        .unwrap();
    assert_eq!(unchanged.status, SchemaWriteStatus::NoChange);

    // Different schema: update + archive the old active.
    let updated = store
        .insert_one_schema(&request(&import_name, bigger_schema()))
        .await
        .unwrap();
    assert_eq!(updated.status, SchemaWriteStatus::Updated);

    let document = store
        .find_jsonschema(&import_name)
        .await
        .unwrap()
        .schema
        .unwrap();
    assert_eq!(document.active_schema, bigger_schema());
    assert_eq!(document.schemas_releases.len(), 1);
    assert_eq!(document.schemas_releases[0].schema, sample_schema());

    // Delete with history reverts to the archived schema.
    let reverted = store.delete_one_jsonschema(&import_name).await.unwrap();
    assert_eq!(reverted.status, SchemaWriteStatus::Reverted);

    let document = store
        .find_jsonschema(&import_name)
        .await
        .unwrap()
        .schema
        .unwrap();
    assert_eq!(document.active_schema, sample_schema());
    assert!(document.schemas_releases.is_empty());

    // Delete with an empty history removes the document outright.
    let deleted = store.delete_one_jsonschema(&import_name).await.unwrap();
    assert_eq!(deleted.status, SchemaWriteStatus::Deleted);

    let found = store.find_jsonschema(&import_name).await.unwrap();
    assert!(found.schema.is_none());
    assert_eq!(found.status, SchemaWriteStatus::NotFound);
}

#[tokio::test]
async fn deleting_unknown_schema_reports_not_found() {
    let Some(store) = test_doc_store().await else {
        eprintln!("skipping: SVP_TEST_DATABASE_URL not set");
        return;
    };

    let response = store
        .delete_one_jsonschema(&unique_import_name("missing"))
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.status, SchemaWriteStatus::NotFound);
}
