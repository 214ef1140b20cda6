use std::sync::Arc;

use fle::{
    ConfigurationError, EncryptedCollection, EncryptionPolicy, FleError, KeyNameStrategy,
    MemoryStore, MemoryTransit, PolicyOptions, Schema,
};
use serde_json::{json, Map, Value};

fn schema() -> Schema {
    Schema::from_definition(&json!({
        "firstName": {"type": "String", "required": true},
        "lastName": {"type": "String", "required": true},
        "address": {"type": "String"},
        "address2": {"type": "String"},
        "email": {"type": "String"},
        "objectOfStrings": {
            "string1": {"type": "String"},
            "string2": {"type": "String"},
            "string3": {"type": "String"}
        },
        "emptyString": {"type": "String"},
        "bool": {"type": "Boolean"},
        "num": {"type": "Number"},
        "date": {"type": "Date"},
        "arr": [{"type": "String"}],
        "mix": {"type": "Mixed"},
        "buf": {"type": "Buffer"},
        "idx": {"type": "String", "index": true}
    }))
    .unwrap()
}

fn identity(first_name: &str) -> Value {
    json!({
        "firstName": first_name,
        "lastName": "Mustermann",
        "address": "Karlstr. 1",
        "email": "test@test.de",
        "bool": true,
        "num": 42,
        "emptyString": "",
        "objectOfStrings": {
            "string1": "content1",
            "string2": "content2",
            "string3": "content3"
        },
        "date": "2014-05-19T16:39:07.536Z",
        "arr": ["alpha", "bravo"],
        "mix": {"str": "A string", "bool2": false},
        "idx": "10000000"
    })
}

struct Fixture {
    transit: Arc<MemoryTransit>,
    store: Arc<MemoryStore>,
    identities: EncryptedCollection<MemoryStore>,
}

fn fixture(options: PolicyOptions) -> Fixture {
    let transit = Arc::new(MemoryTransit::new());
    let store = Arc::new(MemoryStore::new());
    let encryptor = EncryptionPolicy::new(&schema(), options)
        .unwrap()
        .bind(transit.clone(), "identities");
    let identities = EncryptedCollection::new(store.clone(), encryptor, "identities");
    Fixture {
        transit,
        store,
        identities,
    }
}

fn convergent() -> PolicyOptions {
    PolicyOptions {
        key_creation_convergent_encryption: Some(true),
        ..Default::default()
    }
}

fn is_ciphertext(v: &Value) -> bool {
    v.as_str().is_some_and(|s| s.starts_with("vault:v1:"))
}

#[tokio::test]
async fn create_stores_ciphertext_and_returns_plaintext() {
    let f = fixture(PolicyOptions::default());
    let created = f.identities.create(identity("Max")).await.unwrap();
    assert_eq!(created["firstName"], "Max");
    assert_eq!(created["objectOfStrings"]["string3"], "content3");

    let raw = &f.store.raw("identities").await[0];
    assert!(is_ciphertext(&raw["firstName"]));
    assert!(is_ciphertext(&raw["objectOfStrings"]["string1"]));
    assert_eq!(raw["emptyString"], "");
    assert_eq!(raw["idx"], "10000000");
    assert_eq!(raw["num"], 42);
    assert_eq!(raw["arr"], json!(["alpha", "bravo"]));
    assert_eq!(raw["_id"], created["_id"]);
}

#[tokio::test]
async fn convergent_search_returns_exactly_the_matching_documents() {
    let f = fixture(convergent());
    f.identities.create(identity("Max")).await.unwrap();
    f.identities.create(identity("Max")).await.unwrap();
    f.identities.create(identity("Moritz")).await.unwrap();

    let found = f.identities.find(json!({"firstName": "Max"})).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|d| d["firstName"] == "Max"));

    let one = f
        .identities
        .find_one(json!({"firstName": "Moritz"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one["lastName"], "Mustermann");
    assert_eq!(f.transit.is_convergent("identities").await, Some(true));
}

#[tokio::test]
async fn search_through_combinators() {
    let f = fixture(convergent());
    f.identities.create(identity("Max")).await.unwrap();

    let filter = json!({
        "$or": [
            {"objectOfStrings.string1": "no match"},
            {"$and": [{"firstName": {"$in": ["Moritz", "Max"]}}, {"num": 42}]}
        ]
    });
    let found = f.identities.find(filter).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["objectOfStrings"]["string1"], "content1");
}

#[tokio::test]
async fn non_convergent_search_matches_nothing() {
    let f = fixture(PolicyOptions::default());
    f.identities.create(identity("Max")).await.unwrap();

    assert!(f.identities.find(json!({"firstName": "Max"})).await.unwrap().is_empty());
    assert_eq!(f.identities.count(json!({"firstName": "Max"})).await.unwrap(), 0);
    assert_eq!(f.identities.count(json!({})).await.unwrap(), 1);
}

#[tokio::test]
async fn per_document_keys_round_trip() {
    let f = fixture(PolicyOptions {
        key_name: KeyNameStrategy::PerDocument,
        ..Default::default()
    });
    let mut doc = identity("Max");
    doc["_id"] = json!("5c9a1f");
    let created = f.identities.create(doc).await.unwrap();
    assert_eq!(created["firstName"], "Max");
    assert_eq!(f.transit.history().await[0].0, "identities-5c9a1f");

    let found = f.identities.find(json!({"_id": "5c9a1f"})).await.unwrap();
    assert_eq!(found[0]["email"], "test@test.de");

    let err = f
        .identities
        .find(json!({"firstName": "Max"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FleError::Configuration(ConfigurationError::UnsearchableKeyName { .. })
    ));
}

#[tokio::test]
async fn per_document_keys_get_an_id_assigned_before_encryption() {
    let f = fixture(PolicyOptions {
        key_name: KeyNameStrategy::PerDocument,
        ..Default::default()
    });
    let created = f.identities.create(identity("Max")).await.unwrap();
    let id = created["_id"].as_str().unwrap();
    assert_eq!(f.transit.history().await[0].0, format!("identities-{id}"));
}

#[tokio::test]
async fn decrypt_of_encrypt_is_identity() {
    let transit = Arc::new(MemoryTransit::new());
    let encryptor = EncryptionPolicy::new(&schema(), PolicyOptions::default())
        .unwrap()
        .bind(transit.clone(), "identities");

    let original = identity("Max");
    let mut doc = original.clone();
    encryptor.encrypt(&mut doc).await.unwrap();
    assert_ne!(doc, original);
    encryptor.decrypt(&mut doc).await.unwrap();
    assert_eq!(doc, original);
    assert_eq!(transit.calls(), 2);
}

#[tokio::test]
async fn explicit_field_list_limits_encryption() {
    let f = fixture(PolicyOptions {
        encrypted_fields: Some(vec!["firstName".into(), "objectOfStrings.string1".into()]),
        ..Default::default()
    });
    f.identities.create(identity("Max")).await.unwrap();
    let raw = &f.store.raw("identities").await[0];
    assert!(is_ciphertext(&raw["firstName"]));
    assert!(is_ciphertext(&raw["objectOfStrings"]["string1"]));
    assert_eq!(raw["lastName"], "Mustermann");
    assert_eq!(raw["objectOfStrings"]["string2"], "content2");
}

#[test]
fn unknown_field_is_rejected_with_its_path() {
    let err = EncryptionPolicy::new(
        &schema(),
        PolicyOptions {
            encrypted_fields: Some(vec!["objectOfStrings.isNotDefined".into()]),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("objectOfStrings.isNotDefined"));
}

#[test]
fn non_string_field_is_rejected_with_path_and_type() {
    let err = EncryptionPolicy::new(
        &schema(),
        PolicyOptions {
            encrypted_fields: Some(vec!["firstName".into(), "num".into()]),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("num is a Number"), "{err}");
}

#[test]
fn per_document_search_is_rejected_at_construction() {
    let err = EncryptionPolicy::new(
        &schema(),
        PolicyOptions {
            key_name: KeyNameStrategy::PerDocument,
            searchable_fields: vec!["firstName".into()],
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, ConfigurationError::PerDocumentSearch { .. }));
}

#[tokio::test]
async fn key_service_failure_aborts_the_save() {
    let f = fixture(PolicyOptions::default());
    f.transit.set_failing(true);
    let err = f.identities.create(identity("Max")).await.unwrap_err();
    assert!(matches!(err, FleError::KeyService(_)));
    assert!(f.store.raw("identities").await.is_empty());
}

#[tokio::test]
async fn decrypt_post_save_off_returns_ciphertext() {
    let f = fixture(PolicyOptions {
        decrypt_post_save: false,
        ..Default::default()
    });
    let created = f.identities.create(identity("Max")).await.unwrap();
    assert!(is_ciphertext(&created["firstName"]));

    let found = f.identities.find(json!({"_id": created["_id"].clone()})).await.unwrap();
    assert_eq!(found[0]["firstName"], "Max");
}

#[tokio::test]
async fn save_replaces_by_id() {
    let f = fixture(convergent());
    let mut created = f.identities.create(identity("Max")).await.unwrap();
    created["firstName"] = json!("Moritz");
    f.identities.save(created).await.unwrap();

    assert_eq!(f.identities.count(json!({})).await.unwrap(), 1);
    assert_eq!(f.identities.count(json!({"firstName": "Moritz"})).await.unwrap(), 1);
    assert!(is_ciphertext(&f.store.raw("identities").await[0]["firstName"]));
}

#[tokio::test]
async fn update_and_delete_by_encrypted_field() {
    let f = fixture(convergent());
    f.identities.create(identity("Max")).await.unwrap();
    f.identities.create(identity("Max")).await.unwrap();

    let mut set = Map::new();
    set.insert("email".into(), json!("new@test.de"));
    let updated = f
        .identities
        .update_many(json!({"firstName": "Max"}), set)
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let raw = f.store.raw("identities").await;
    assert!(raw.iter().all(|d| is_ciphertext(&d["email"])));
    let found = f.identities.find(json!({"email": "new@test.de"})).await.unwrap();
    assert_eq!(found.len(), 2);

    assert_eq!(f.identities.delete_many(json!({"firstName": "Max"})).await.unwrap(), 2);
    assert!(f.store.raw("identities").await.is_empty());
}

#[tokio::test]
async fn update_encrypts_strings_inside_assigned_subdocuments() {
    let f = fixture(convergent());
    f.identities
        .create(json!({"_id": "1", "firstName": "Max", "objectOfStrings": {"string1": "a"}}))
        .await
        .unwrap();

    let mut set = Map::new();
    set.insert("objectOfStrings".into(), json!({"string1": "TOP-SECRET", "string3": "open"}));
    let updated = f.identities.update_many(json!({"_id": "1"}), set).await.unwrap();
    assert_eq!(updated, 1);

    let raw = &f.store.raw("identities").await[0];
    assert!(is_ciphertext(&raw["objectOfStrings"]["string1"]));
    assert!(!raw.to_string().contains("TOP-SECRET"));

    let found = f
        .identities
        .find_one(json!({"objectOfStrings.string1": "TOP-SECRET"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found["objectOfStrings"]["string1"], "TOP-SECRET");
    assert_eq!(found["firstName"], "Max");
}

#[tokio::test]
async fn literal_key_name_is_used_verbatim() {
    let f = fixture(PolicyOptions {
        key_name: KeyNameStrategy::Literal("shared-key".into()),
        ..Default::default()
    });
    f.identities.create(identity("Max")).await.unwrap();
    assert_eq!(f.transit.history().await[0].0, "shared-key");
}
