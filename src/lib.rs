//! Validate data against JSON Schema draft-04.
//!
//! A schema may be a native [`serde_json::Value`] tree or anything the
//! loader can reach: a file path, an `http(s)://` url (fetched through
//! an injectable [`HttpClient`] and cached on disk), or an embedded
//! `data://Module/name` resource. All `$ref`s, including cross-document
//! and cyclic ones, are resolved at ingestion; validation itself does
//! no I/O.
//!
//! ```
//! use serde_json::json;
//! use json_validator::Validator;
//!
//! let mut validator = Validator::new();
//! validator
//!     .set_schema(json!({
//!         "type": "object",
//!         "required": ["name"],
//!         "properties": {"name": {"type": "string"}}
//!     }))
//!     .unwrap();
//! let errors = validator.validate(&json!({"name": 42}));
//! assert_eq!(errors[0].to_string(), "/name: Expected string - got integer.");
//! ```

mod error;
mod formats;
mod loader;
mod resolver;
mod schema;
mod util;
mod validator;

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde_json::Value;

pub use crate::error::{IngestError, LoadError, LoadErrorKind, ValidationError};
pub use crate::formats::{
    validate_byte, validate_date, validate_date_time, validate_email, validate_hostname,
    validate_int32, validate_int64, validate_ipv4, validate_ipv6, validate_number, validate_uri,
    FormatCheck,
};
pub use crate::loader::{HttpClient, UrlLoader, YamlBackend};

use crate::loader::Loader;
use crate::resolver::Resolver;
use crate::schema::{SchemaIndex, Schemas};
use crate::validator::Context;

/// Runtime configuration. [`Options::from_env`] additionally honors
/// `JSON_VALIDATOR_CACHE_DIR`, `JSON_VALIDATOR_COERCE_VALUES`,
/// `JSON_VALIDATOR_DEBUG` and `JSON_VALIDATOR_WARN_ON_MISSING_FORMAT`.
#[derive(Debug, Clone)]
pub struct Options {
    /// Accept numeric strings for number schemas and numbers for string
    /// schemas, rewriting the data in place. Off by default because it
    /// mutates caller data (through [`Validator::validate_mut`]).
    pub coerce: bool,
    /// Directory for the content-addressed copy of remote schemas.
    pub cache_dir: Option<PathBuf>,
    /// Sent with every remote schema fetch by the default http client.
    pub user_agent: String,
    /// Emit a warning when a schema names a format with no registered
    /// predicate.
    pub warn_on_missing_format: bool,
    /// Verbose diagnostics; load errors keep the raw response body.
    pub debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            coerce: false,
            cache_dir: None,
            user_agent: concat!("json-validator/", env!("CARGO_PKG_VERSION")).to_owned(),
            warn_on_missing_format: false,
            debug: false,
        }
    }
}

impl Options {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Ok(dir) = env::var("JSON_VALIDATOR_CACHE_DIR") {
            if !dir.is_empty() {
                options.cache_dir = Some(PathBuf::from(dir));
            }
        }
        options.coerce = env_flag("JSON_VALIDATOR_COERCE_VALUES");
        options.debug = env_flag("JSON_VALIDATOR_DEBUG");
        options.warn_on_missing_format = env_flag("JSON_VALIDATOR_WARN_ON_MISSING_FORMAT");
        options
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map_or(false, |v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Where a schema comes from: a url/path handled by the loader, or a
/// native tree.
pub enum SchemaSource<'a> {
    Url(&'a str),
    Document(Value),
}

impl<'a> From<&'a str> for SchemaSource<'a> {
    fn from(url: &'a str) -> Self {
        SchemaSource::Url(url)
    }
}

impl From<Value> for SchemaSource<'static> {
    fn from(doc: Value) -> Self {
        SchemaSource::Document(doc)
    }
}

impl<'a> From<&'a Value> for SchemaSource<'static> {
    fn from(doc: &'a Value) -> Self {
        SchemaSource::Document(doc.clone())
    }
}

/// A draft-04 validator holding one ingested schema.
///
/// Not thread-safe by design; share nothing or use one instance per
/// thread. Ingestion (`set_schema`) is the only operation that may
/// block on I/O.
pub struct Validator {
    options: Options,
    formats: HashMap<String, FormatCheck>,
    loader: Loader,
    schemas: Schemas,
    refs: HashMap<String, SchemaIndex>,
    root: Option<SchemaIndex>,
    root_doc: Option<usize>,
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator").finish_non_exhaustive()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    /// A validator configured from [`Options::from_env`].
    pub fn new() -> Self {
        Self::with_options(Options::from_env())
    }

    pub fn with_options(options: Options) -> Self {
        let formats = formats::FORMATS
            .iter()
            .map(|(name, check)| ((*name).to_owned(), *check))
            .collect();
        let loader = Loader::new(&options);
        Self {
            options,
            formats,
            loader,
            schemas: Schemas::default(),
            refs: HashMap::new(),
            root: None,
            root_doc: None,
        }
    }

    pub fn configure(&mut self, options: Options) -> &mut Self {
        self.loader.configure(&options);
        self.options = options;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Registers (or replaces) a format predicate.
    pub fn register_format(&mut self, name: &str, check: FormatCheck) -> &mut Self {
        self.formats.insert(name.to_owned(), check);
        self
    }

    /// Registers a loader that takes over a url scheme.
    pub fn register_loader(&mut self, scheme: &str, loader: Box<dyn UrlLoader>) -> &mut Self {
        self.loader.register_scheme(scheme, loader);
        self
    }

    /// Registers a `data://module/name` resource body.
    pub fn register_embedded(
        &mut self,
        module: &str,
        name: &str,
        body: impl Into<String>,
    ) -> &mut Self {
        self.loader.register_embedded(module, name, body);
        self
    }

    /// Replaces the http client used for remote schemas.
    pub fn set_http_client(&mut self, client: Box<dyn HttpClient>) -> &mut Self {
        self.loader.set_http_client(client);
        self
    }

    /// Replaces the yaml backend; `None` makes yaml documents fail
    /// with [`IngestError::YamlBackendMissing`].
    pub fn set_yaml_backend(&mut self, backend: Option<YamlBackend>) -> &mut Self {
        self.loader.set_yaml_backend(backend);
        self
    }

    /// Ingests a schema: loads the document if needed, then resolves
    /// every `$ref` into the schema arena.
    pub fn set_schema<'a, S: Into<SchemaSource<'a>>>(
        &mut self,
        source: S,
    ) -> Result<&mut Self, IngestError> {
        let doc_idx = match source.into() {
            SchemaSource::Url(url) => self.loader.load(url).map_err(IngestError::from)?,
            SchemaSource::Document(doc) => {
                self.loader.add_document(doc).map_err(IngestError::from)?
            }
        };
        let idx = Resolver {
            loader: &mut self.loader,
            schemas: &mut self.schemas,
            refs: &mut self.refs,
        }
        .resolve(doc_idx)?;
        self.root = Some(idx);
        self.root_doc = Some(doc_idx);
        Ok(self)
    }

    /// The current raw schema document, if one was ingested. The
    /// resolved form lives in an internal arena: a cyclic schema has
    /// no finite tree rendition.
    pub fn schema(&self) -> Option<&Value> {
        self.root_doc.map(|i| &self.loader.doc(i).doc)
    }

    /// Validates `data`, returning every violation in data traversal
    /// order. Empty means valid. Coercion and schema defaults are
    /// applied to a private copy and never touch `data`.
    ///
    /// # Panics
    ///
    /// Panics if no schema was ingested.
    pub fn validate(&self, data: &Value) -> Vec<ValidationError> {
        let mut copy = data.clone();
        self.validate_mut(&mut copy)
    }

    /// Like [`Validator::validate`], but coerced values and injected
    /// defaults land in `data`. This is the explicit opt-in for the
    /// mutating behavior behind [`Options::coerce`].
    ///
    /// # Panics
    ///
    /// Panics if no schema was ingested.
    pub fn validate_mut(&self, data: &mut Value) -> Vec<ValidationError> {
        let Some(root) = self.root else {
            panic!("validate called before a schema was ingested");
        };
        self.run(data, root)
    }

    /// Validates against an ad-hoc schema instead of the ingested one.
    /// The schema is compiled into the same arena, memoized by content,
    /// so repeated calls with an identical schema compile once.
    pub fn validate_with(
        &mut self,
        data: &Value,
        schema: &Value,
    ) -> Result<Vec<ValidationError>, IngestError> {
        let doc_idx = self
            .loader
            .add_document(schema.clone())
            .map_err(IngestError::from)?;
        let idx = Resolver {
            loader: &mut self.loader,
            schemas: &mut self.schemas,
            refs: &mut self.refs,
        }
        .resolve(doc_idx)?;
        let mut copy = data.clone();
        Ok(self.run(&mut copy, idx))
    }

    fn run(&self, data: &mut Value, root: SchemaIndex) -> Vec<ValidationError> {
        let cx = Context {
            schemas: &self.schemas,
            formats: &self.formats,
            coerce: self.options.coerce,
            warn_on_missing_format: self.options.warn_on_missing_format,
        };
        validator::validate(&cx, data, root)
    }
}
