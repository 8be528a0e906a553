//! Fixture files loaded from disk into the in-memory engine.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use data_scope::config::Config;
use data_scope::fixture::{FixtureError, FixtureRunner, JsonFixture};
use data_scope::mock::MockDataService;
use data_scope::scope::{DataLayer, RequestInfo};

fn write(dir: &Path, name: &str, body: serde_json::Value) {
    fs::write(dir.join(name), serde_json::to_string_pretty(&body).unwrap()).unwrap();
}

fn config() -> Config {
    Config::from_yaml(
        r#"
data:
  adapters: [memory]
  request_scope: true
  managers:
    content:
      adapter: memory
      documents: [Author, Article]
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_directory_loads_in_order_with_references() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "a_articles.fixture.json",
        json!({
            "order": 2,
            "model": "Article",
            "documents": [{"id": 100, "title": "Hello", "author": "@ref:ada"}]
        }),
    );
    write(
        dir.path(),
        "b_authors.fixture.json",
        json!({
            "order": 1,
            "model": "Author",
            "documents": [{"_reference": "ada", "id": 7, "name": "Ada"}]
        }),
    );
    write(dir.path(), "notes.json", json!({"ignored": true}));

    let config = config();
    let service = Arc::new(MockDataService::new(&config.data));
    let backend = Arc::clone(service.backend());
    let layer = DataLayer::boot(config, service).unwrap();

    let mut seen = Vec::new();
    let loaded = FixtureRunner::new(layer.for_request(RequestInfo::new("CLI", "fixtures")))
        .run_dir(dir.path(), |fixture| seen.push(fixture.model_name().to_string()))
        .await
        .unwrap();

    assert_eq!(loaded, 2);
    assert_eq!(seen, vec!["Author", "Article"]);
    assert_eq!(
        backend.documents("Author").await,
        vec![json!({"id": 7, "name": "Ada"})]
    );
    assert_eq!(
        backend.documents("Article").await,
        vec![json!({"id": 100, "title": "Hello", "author": 7})]
    );
}

#[test]
fn test_invalid_fixture_file_is_reported_with_path() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.fixture.json"), "{ not json").unwrap();

    let err = JsonFixture::discover(dir.path()).unwrap_err();

    match err {
        FixtureError::Parse { path, .. } => {
            assert!(path.ends_with("broken.fixture.json"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fixture_for_unmapped_model_fails() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "x.fixture.json",
        json!({"model": "Comment", "documents": [{"id": 1}]}),
    );

    let config = config();
    let service = Arc::new(MockDataService::new(&config.data));
    let err = FixtureRunner::new(service)
        .run_dir(dir.path(), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, FixtureError::Data(_)));
}
