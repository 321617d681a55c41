//! Minimal end-to-end walkthrough: register a `templates` entity set,
//! insert a document with one document-property field, then read it back.
//! Run with `cargo run --bin fsstore-demo -- /tmp/fsstore-demo`.

use std::env;

use fsstore::{Document, EntitySetSchema, EntityType, FieldDef, FieldType, Provider, ProviderConfig, SchemaView, StorageMode};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let data_directory = env::args().nth(1).unwrap_or_else(|| "./fsstore-demo-data".to_string());

    let mut schema_view = SchemaView::new();
    schema_view.register_entity_set(EntitySetSchema::new(
        "templates",
        StorageMode::Directory,
        EntityType::new(
            "Template",
            vec![
                FieldDef::new("name", FieldType::String).key().public_key(),
                FieldDef::new("content", FieldType::String).document("html"),
            ],
        ),
    ));

    let config = ProviderConfig::new(data_directory).with_watch_enabled(false);
    let provider = Provider::init(config, schema_view).await?;
    let templates = provider.collection("templates")?;

    let mut doc = Document::from_fields(json!({"name": "welcome"}).as_object().unwrap().clone());
    doc.set_property("content", fsstore::PropertyValue::Text("<h1>Hello</h1>".to_string()));
    let inserted = templates.insert(doc).await?;
    println!("inserted: {inserted}");

    let found = templates.get("welcome");
    println!("read back: {:?}", found.is_some());

    Ok(())
}
