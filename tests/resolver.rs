use std::{cell::Cell, error::Error, fs, rc::Rc};

use json_validator::{HttpClient, IngestError, Options, Validator};
use serde_json::json;

struct StaticClient {
    body: &'static str,
    hits: Rc<Cell<usize>>,
}

impl HttpClient for StaticClient {
    fn get(&self, _url: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.hits.set(self.hits.get() + 1);
        Ok(self.body.to_owned())
    }
}

struct FailClient;

impl HttpClient for FailClient {
    fn get(&self, url: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        Err(format!("unexpected fetch of {url}").into())
    }
}

#[test]
fn test_bare_word_ref_means_definitions() {
    let mut validator = Validator::new();
    validator
        .set_schema(json!({
            "type": "object",
            "properties": {"p": {"$ref": "Name"}},
            "definitions": {"Name": {"type": "string"}}
        }))
        .unwrap();
    let errors = validator.validate(&json!({"p": 5}));
    assert_eq!(errors[0].to_string(), "/p: Expected string - got integer.");
}

#[test]
fn test_fragment_ref() {
    let mut validator = Validator::new();
    validator
        .set_schema(json!({
            "type": "object",
            "properties": {"p": {"$ref": "#/definitions/Name"}},
            "definitions": {"Name": {"type": "integer", "minimum": 10}}
        }))
        .unwrap();
    let errors = validator.validate(&json!({"p": 3}));
    assert_eq!(errors[0].to_string(), "/p: 3 < minimum(10)");
}

#[test]
fn test_cross_document_file_ref() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.json"), r#"{"type": "integer"}"#).unwrap();
    fs::write(
        dir.path().join("a.json"),
        r#"{"type": "object", "properties": {"x": {"$ref": "b.json"}}}"#,
    )
    .unwrap();

    let mut validator = Validator::new();
    validator
        .set_schema(dir.path().join("a.json").to_str().unwrap())
        .unwrap();
    let errors = validator.validate(&json!({"x": "s"}));
    assert_eq!(errors[0].to_string(), "/x: Expected integer - got string.");
    assert!(validator.validate(&json!({"x": 7})).is_empty());
}

#[test]
fn test_ref_to_missing_location() {
    let mut validator = Validator::new();
    let err = validator
        .set_schema(json!({"$ref": "#/definitions/Nope"}))
        .unwrap_err();
    assert!(matches!(err, IngestError::Resolve { .. }), "{err:?}");
}

#[test]
fn test_pure_ref_cycle_is_rejected() {
    let mut validator = Validator::new();
    let err = validator.set_schema(json!({"$ref": "#"})).unwrap_err();
    assert!(matches!(err, IngestError::Resolve { .. }), "{err:?}");
}

#[test]
fn test_reingestion_is_idempotent() {
    let schema = json!({
        "type": "object",
        "properties": {"p": {"$ref": "#/definitions/N"}},
        "definitions": {"N": {"type": "string"}}
    });
    let data = json!({"p": 1});

    let mut validator = Validator::new();
    validator.set_schema(schema.clone()).unwrap();
    let first = validator.validate(&data);
    validator.set_schema(schema).unwrap();
    let second = validator.validate(&data);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[test]
fn test_yaml_schema_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.yaml");
    fs::write(&path, "type: object\nrequired:\n- a\n").unwrap();

    let mut validator = Validator::new();
    validator.set_schema(path.to_str().unwrap()).unwrap();
    let errors = validator.validate(&json!({}));
    assert_eq!(errors[0].to_string(), "/a: Missing property.");
}

#[test]
fn test_missing_yaml_backend_is_fatal_only_for_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = dir.path().join("schema.yaml");
    fs::write(&yaml, "type: object\n").unwrap();
    let json_path = dir.path().join("schema.json");
    fs::write(&json_path, r#"{"type": "object"}"#).unwrap();

    let mut validator = Validator::new();
    validator.set_yaml_backend(None);
    let err = validator.set_schema(yaml.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, IngestError::YamlBackendMissing), "{err:?}");
    assert!(validator.set_schema(json_path.to_str().unwrap()).is_ok());
}

#[test]
fn test_remote_documents_are_cached_in_memory() {
    let hits = Rc::new(Cell::new(0));
    let mut validator = Validator::new();
    validator.set_http_client(Box::new(StaticClient {
        body: r#"{"type": "integer"}"#,
        hits: Rc::clone(&hits),
    }));

    validator.set_schema("http://schemas.test/int.json").unwrap();
    validator.set_schema("http://schemas.test/int.json").unwrap();
    // port and fragment are stripped from the cache key
    validator
        .set_schema("http://schemas.test:8080/int.json#")
        .unwrap();
    assert_eq!(hits.get(), 1);
    assert_eq!(
        validator.validate(&json!("x"))[0].to_string(),
        "/: Expected integer - got string."
    );
}

#[test]
fn test_disk_cache_round_trip() {
    let cache = tempfile::tempdir().unwrap();
    let mut options = Options::default();
    options.cache_dir = Some(cache.path().to_path_buf());

    let hits = Rc::new(Cell::new(0));
    let mut validator = Validator::with_options(options.clone());
    validator.set_http_client(Box::new(StaticClient {
        body: r#"{"type": "integer"}"#,
        hits: Rc::clone(&hits),
    }));
    validator.set_schema("http://schemas.test/int.json").unwrap();
    assert_eq!(hits.get(), 1);
    assert_eq!(fs::read_dir(cache.path()).unwrap().count(), 1);

    // a fresh validator reads the cached body without any fetch
    let mut validator = Validator::with_options(options);
    validator.set_http_client(Box::new(FailClient));
    validator.set_schema("http://schemas.test/int.json").unwrap();
    assert!(validator.validate(&json!(3)).is_empty());
}

#[test]
fn test_embedded_draft4_metaschema() {
    let mut validator = Validator::new();
    validator
        .set_schema("data://json_validator/draft4.json")
        .unwrap();
    assert!(validator
        .validate(&json!({"type": "object", "required": ["a"]}))
        .is_empty());
    assert!(!validator.validate(&json!({"type": 12})).is_empty());
}

#[test]
fn test_unknown_embedded_resource() {
    let mut validator = Validator::new();
    let err = validator.set_schema("data://nope/missing.json").unwrap_err();
    assert!(matches!(err, IngestError::Load(_)), "{err:?}");
}

#[test]
fn test_registered_embedded_resource() {
    let mut validator = Validator::new();
    validator.register_embedded("myapp", "user.json", r#"{"type": "object"}"#);
    validator.set_schema("data://myapp/user.json").unwrap();
    assert!(validator.validate(&json!({})).is_empty());
}

#[test]
fn test_schema_getter_returns_raw_document() {
    let schema = json!({"id": "http://x#", "type": "object"});
    let mut validator = Validator::new();
    assert!(validator.schema().is_none());
    validator.set_schema(schema.clone()).unwrap();
    assert_eq!(validator.schema(), Some(&schema));
}

#[test]
fn test_resolved_schema_has_no_unresolved_refs() {
    // a chain of refs across definitions, ending in a cycle
    let mut validator = Validator::new();
    validator
        .set_schema(json!({
            "type": "object",
            "properties": {
                "left": {"$ref": "#/definitions/node"},
                "right": {"$ref": "node"}
            },
            "definitions": {
                "node": {
                    "type": "object",
                    "properties": {"next": {"$ref": "#/definitions/node"}}
                }
            }
        }))
        .unwrap();
    assert!(validator
        .validate(&json!({"left": {"next": {}}, "right": {"next": {"next": {}}}}))
        .is_empty());
    let errors = validator.validate(&json!({"left": {"next": 5}}));
    assert_eq!(
        errors[0].to_string(),
        "/left/next: Expected object - got integer."
    );
}

#[test]
fn test_ref_with_escaped_pointer_tokens() {
    let mut validator = Validator::new();
    validator
        .set_schema(json!({
            "type": "object",
            "properties": {"p": {"$ref": "#/definitions/a~1b"}},
            "definitions": {"a/b": {"type": "boolean"}}
        }))
        .unwrap();
    let errors = validator.validate(&json!({"p": "x"}));
    assert_eq!(errors[0].to_string(), "/p: Expected boolean - got string.");
}
