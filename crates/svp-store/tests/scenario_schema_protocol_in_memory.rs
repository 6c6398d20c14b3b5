//! Schema release protocol over the in-memory collection fake.
//!
//! These run unconditionally (no backend required) and pin the same
//! protocol the live Postgres scenario exercises. GREEN when:
//! - first insert reports `inserted`, find returns the schema;
//! - re-inserting the identical schema reports `no_change`;
//! - inserting a larger schema reports `updated` and archives the old
//!   active as the single release;
//! - delete with history reverts to that release;
//! - delete with an empty history removes the document;
//! - update on a missing import name is an error, delete-all on a missing
//!   import name reports failure.

use svp_schemas::{InsertSchemaRequest, SchemaWriteStatus};
use svp_store::SchemaService;
use svp_testkit::{bigger_schema, sample_schema, InMemorySchemaCollection};

fn request(import_name: &str, schema: serde_json::Value) -> InsertSchemaRequest {
    InsertSchemaRequest {
        import_name: import_name.to_string(),
        active_schema: schema,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn schema_roundtrip_updates_and_reverts() {
    let collection = InMemorySchemaCollection::new();
    let service = SchemaService::new(&collection);

    // First insert.
    let inserted = service
        .insert_one_schema(&request("u1", sample_schema()))
        .await
        .unwrap();
    assert_eq!(inserted.status, SchemaWriteStatus::Inserted);
    assert_eq!(
        service.count_all_documents().await.unwrap().amount,
        1
    );

    let found = service.find_jsonschema("u1").await.unwrap();
    let document = found.schema.expect("document must exist after insert");
    assert_eq!(document.active_schema, sample_schema());
    assert!(document.schemas_releases.is_empty());

    // Identical insert: no change.
    let unchanged = service
        .insert_one_schema(&request("u1", sample_schema()))
        .await
        .unwrap();
    assert_eq!(unchanged.status, SchemaWriteStatus::NoChange);

    // Different schema: update + archive the old active.
    let updated = service
        .insert_one_schema(&request("u1", bigger_schema()))
        .await
        .unwrap();
    assert_eq!(updated.status, SchemaWriteStatus::Updated);

    let document = service
        .find_jsonschema("u1")
        .await
        .unwrap()
        .schema
        .unwrap();
    assert_eq!(document.active_schema, bigger_schema());
    assert_eq!(document.schemas_releases.len(), 1);
    assert_eq!(document.schemas_releases[0].schema, sample_schema());

    // Delete with history reverts to the archived schema.
    let reverted = service.delete_one_jsonschema("u1").await.unwrap();
    assert_eq!(reverted.status, SchemaWriteStatus::Reverted);

    let document = service
        .find_jsonschema("u1")
        .await
        .unwrap()
        .schema
        .unwrap();
    assert_eq!(document.active_schema, sample_schema());
    assert!(document.schemas_releases.is_empty());

    // Delete with an empty history removes the document outright.
    let deleted = service.delete_one_jsonschema("u1").await.unwrap();
    assert_eq!(deleted.status, SchemaWriteStatus::Deleted);

    let found = service.find_jsonschema("u1").await.unwrap();
    assert!(found.schema.is_none());
    assert_eq!(found.status, SchemaWriteStatus::NotFound);
}

#[tokio::test]
async fn update_requires_an_existing_document() {
    let collection = InMemorySchemaCollection::new();
    let service = SchemaService::new(&collection);

    let response = service
        .update_one_jsonschema(&request("missing", sample_schema()))
        .await
        .unwrap();
    assert_eq!(response.status, SchemaWriteStatus::Error);

    // After an insert the same call goes through the normal update path.
    service
        .insert_one_schema(&request("missing", sample_schema()))
        .await
        .unwrap();
    let response = service
        .update_one_jsonschema(&request("missing", bigger_schema()))
        .await
        .unwrap();
    assert_eq!(response.status, SchemaWriteStatus::Updated);
}

#[tokio::test]
async fn delete_import_name_reports_missing_documents() {
    let collection = InMemorySchemaCollection::new();
    let service = SchemaService::new(&collection);

    let response = service.delete_import_name("ghost").await.unwrap();
    assert!(!response.success);
    assert_eq!(response.status, SchemaWriteStatus::Error);

    service
        .insert_one_schema(&request("ghost", sample_schema()))
        .await
        .unwrap();
    let response = service.delete_import_name("ghost").await.unwrap();
    assert!(response.success);
    assert_eq!(response.status, SchemaWriteStatus::Deleted);
}

#[tokio::test]
async fn deleting_unknown_schema_reports_not_found() {
    let collection = InMemorySchemaCollection::new();
    let service = SchemaService::new(&collection);

    let response = service.delete_one_jsonschema("nope").await.unwrap();
    assert!(!response.success);
    assert_eq!(response.status, SchemaWriteStatus::NotFound);
}
