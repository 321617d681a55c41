use fsstore::{Document, EntitySetSchema, EntityType, FieldDef, FieldType, Provider, ProviderConfig, SchemaView, StorageMode};
use serde_json::json;

fn templates_schema(mode: StorageMode) -> EntitySetSchema {
    EntitySetSchema::new(
        "templates",
        mode,
        EntityType::new(
            "Template",
            vec![
                FieldDef::new("name", FieldType::String).key().public_key(),
                FieldDef::new("content", FieldType::String).document("html"),
            ],
        ),
    )
}

async fn provider(dir: &std::path::Path, mode: StorageMode) -> std::sync::Arc<Provider> {
    let mut schema_view = SchemaView::new();
    schema_view.register_entity_set(templates_schema(mode));
    let config = ProviderConfig::new(dir).with_watch_enabled(false);
    Provider::init(config, schema_view).await.unwrap()
}

#[tokio::test]
async fn directory_mode_insert_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();

    let mut doc = Document::from_fields(json!({"name": "welcome"}).as_object().unwrap().clone());
    doc.set_property("content", fsstore::PropertyValue::Text("<h1>hi</h1>".to_string()));
    templates.insert(doc).await.unwrap();

    assert!(dir.path().join("templates/welcome/config.json").exists());
    assert!(dir.path().join("templates/welcome/content.html").exists());

    let found = templates.get("welcome").unwrap();
    assert_eq!(found.get_property("content").unwrap().as_text(), Some("<h1>hi</h1>"));
}

#[tokio::test]
async fn duplicate_public_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();

    let doc = Document::from_fields(json!({"name": "welcome"}).as_object().unwrap().clone());
    templates.insert(doc.clone()).await.unwrap();
    let result = templates.insert(doc).await;
    assert!(matches!(result, Err(fsstore::Error::DuplicateKey(_))));
}

#[tokio::test]
async fn update_renaming_public_key_moves_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();

    let doc = Document::from_fields(json!({"name": "draft"}).as_object().unwrap().clone());
    templates.insert(doc).await.unwrap();

    let query = json!({"name": "draft"}).as_object().unwrap().clone();
    let patch = json!({"$set": {"name": "published"}}).as_object().unwrap().clone();
    let updated = templates.update(query, patch, false).await.unwrap();

    assert_eq!(updated.len(), 1);
    assert!(!dir.path().join("templates/draft").exists());
    assert!(dir.path().join("templates/published").exists());
}

#[tokio::test]
async fn remove_deletes_the_document_directory() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();

    let doc = Document::from_fields(json!({"name": "draft"}).as_object().unwrap().clone());
    templates.insert(doc).await.unwrap();

    let removed = templates.remove(json!({"name": "draft"}).as_object().unwrap().clone()).await.unwrap();
    assert_eq!(removed, 1);
    assert!(!dir.path().join("templates/draft").exists());
    assert!(templates.get("draft").is_none());
}

#[tokio::test]
async fn upsert_inserts_when_no_document_matches() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();

    let query = json!({"name": "new-doc"}).as_object().unwrap().clone();
    let patch = json!({}).as_object().unwrap().clone();
    let result = templates.update(query, patch, true).await.unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].get_str("name"), Some("new-doc"));
}

#[tokio::test]
async fn flat_mode_roundtrips_through_a_fresh_provider() {
    let dir = tempfile::tempdir().unwrap();
    {
        let provider = provider(dir.path(), StorageMode::Flat).await;
        let templates = provider.collection("templates").unwrap();
        let doc = Document::from_fields(json!({"name": "welcome"}).as_object().unwrap().clone());
        templates.insert(doc).await.unwrap();
    }

    let provider = provider(dir.path(), StorageMode::Flat).await;
    let templates = provider.collection("templates").unwrap();
    assert!(templates.get("welcome").is_some());
}

#[tokio::test]
async fn reload_picks_up_a_document_written_externally() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();
    assert!(templates.get("external").is_none());

    let doc_dir = dir.path().join("templates/external");
    tokio::fs::create_dir_all(&doc_dir).await.unwrap();
    tokio::fs::write(doc_dir.join("config.json"), r#"{"name":"external","$entitySet":"templates"}"#)
        .await
        .unwrap();

    provider.reload("templates").await.unwrap();
    assert!(templates.get("external").is_some());
}

#[tokio::test]
async fn init_finalizes_a_committed_staging_dir_and_discards_an_uncommitted_one() {
    let dir = tempfile::tempdir().unwrap();
    let set_dir = dir.path().join("templates");
    tokio::fs::create_dir_all(&set_dir).await.unwrap();

    // A commit that crashed after the marker was written: init must finish it.
    let committed = set_dir.join("~c~c");
    tokio::fs::create_dir_all(&committed).await.unwrap();
    tokio::fs::write(committed.join("config.json"), r#"{"name":"c","$entitySet":"templates"}"#)
        .await
        .unwrap();
    tokio::fs::File::create(committed.join(".commit")).await.unwrap();

    // A commit that crashed before the marker was written: init must delete it.
    let uncommitted = set_dir.join("~~a");
    tokio::fs::create_dir_all(&uncommitted).await.unwrap();
    tokio::fs::write(uncommitted.join("config.json"), r#"{"name":"a","$entitySet":"templates"}"#)
        .await
        .unwrap();

    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();

    assert!(templates.get("c").is_some());
    assert!(!set_dir.join("~c~c").exists());
    assert!(set_dir.join("c").exists());

    assert!(templates.get("a").is_none());
    assert!(!set_dir.join("~~a").exists());
}

#[tokio::test]
async fn unregistered_entity_set_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    assert!(provider.collection("not-registered").is_err());
}

#[tokio::test]
async fn invalid_public_key_is_rejected_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Directory).await;
    let templates = provider.collection("templates").unwrap();

    let doc = Document::from_fields(json!({"name": "a/b"}).as_object().unwrap().clone());
    let result = templates.insert(doc).await;
    assert!(matches!(result, Err(fsstore::Error::InvalidName(_))));
    assert!(!dir.path().join("templates").read_dir().unwrap().any(|_| true));
}

#[tokio::test]
async fn extension_resolver_overrides_the_schema_default() {
    let dir = tempfile::tempdir().unwrap();

    let mut schema_view = SchemaView::new();
    schema_view.register_entity_set(templates_schema(StorageMode::Directory));
    schema_view.register_extension_resolver(std::sync::Arc::new(|_doc, property, _schema| {
        (property == "content").then(|| "txt".to_string())
    }));
    let config = ProviderConfig::new(dir.path()).with_watch_enabled(false);
    let provider = Provider::init(config, schema_view).await.unwrap();
    let templates = provider.collection("templates").unwrap();

    let mut doc = Document::from_fields(json!({"name": "test"}).as_object().unwrap().clone());
    doc.set_property("content", fsstore::PropertyValue::Text("foo".to_string()));
    templates.insert(doc).await.unwrap();

    assert!(dir.path().join("templates/test/content.txt").exists());
    assert!(!dir.path().join("templates/test/content.html").exists());
    let content = std::fs::read_to_string(dir.path().join("templates/test/content.txt")).unwrap();
    assert_eq!(content, "foo");
}

#[tokio::test]
async fn flat_mode_appends_one_line_per_mutation_with_a_tombstone_on_remove() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider(dir.path(), StorageMode::Flat).await;
    let settings = provider.collection("templates").unwrap();

    let doc = Document::from_fields(json!({"name": "a", "value": "1"}).as_object().unwrap().clone());
    settings.insert(doc).await.unwrap();

    let query = json!({"name": "a"}).as_object().unwrap().clone();
    let patch = json!({"$set": {"value": "2"}}).as_object().unwrap().clone();
    settings.update(query.clone(), patch, false).await.unwrap();

    settings.remove(query).await.unwrap();

    let path = dir.path().join("templates");
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains(r#""value":"2""#));
    assert!(lines[2].contains(r#""$$deleted":true"#));
}

#[tokio::test]
async fn external_write_within_threshold_is_suppressed_but_becomes_visible_past_it() {
    let dir = tempfile::tempdir().unwrap();

    let mut schema_view = SchemaView::new();
    schema_view.register_entity_set(templates_schema(StorageMode::Directory));
    let config = ProviderConfig::new(dir.path())
        .with_watch_enabled(true)
        .with_self_write_skip_threshold_ms(1);
    let provider = Provider::init(config, schema_view).await.unwrap();
    let templates = provider.collection("templates").unwrap();

    let doc = Document::from_fields(json!({"name": "test"}).as_object().unwrap().clone());
    templates.insert(doc).await.unwrap();

    // Give the self-write suppression window (1ms) time to expire before the
    // external edit lands, so the watcher treats it as a genuine external
    // change rather than bouncing the provider's own write.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    tokio::fs::write(
        dir.path().join("templates/test/config.json"),
        r#"{"name":"test","extra":"from-outside","$entitySet":"templates"}"#,
    )
    .await
    .unwrap();

    // Give the watcher's debounce window time to fire and the reload to run
    // through the write queue.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let reloaded = templates.get("test").unwrap();
    assert_eq!(reloaded.get_str("extra"), Some("from-outside"));
}

#[tokio::test]
async fn external_edit_is_published_to_sync_subscribers_as_a_reload() {
    let dir = tempfile::tempdir().unwrap();

    let mut schema_view = SchemaView::new();
    schema_view.register_entity_set(templates_schema(StorageMode::Directory));
    let config = ProviderConfig::new(dir.path())
        .with_watch_enabled(true)
        .with_self_write_skip_threshold_ms(1);
    let provider = Provider::init(config, schema_view).await.unwrap();
    let templates = provider.collection("templates").unwrap();
    let mut subscriber = provider.sync();

    let doc = Document::from_fields(json!({"name": "test"}).as_object().unwrap().clone());
    templates.insert(doc).await.unwrap();

    // Drain the insert's own upsert envelope before triggering the external
    // edit the assertion below cares about.
    let _ = subscriber.recv().await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    tokio::fs::write(
        dir.path().join("templates/test/config.json"),
        r#"{"name":"test","extra":"from-outside","$entitySet":"templates"}"#,
    )
    .await
    .unwrap();

    let envelope = tokio::time::timeout(std::time::Duration::from_secs(2), subscriber.recv())
        .await
        .expect("expected a reload envelope after the external edit")
        .unwrap();

    assert_eq!(envelope.action, fsstore::SyncAction::Reload);
    assert_eq!(envelope.entity_set, "templates");
    assert!(envelope.document.is_none());
}
