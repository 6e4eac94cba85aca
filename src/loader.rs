use std::{collections::HashMap, error::Error, fs, path::Path, path::PathBuf};

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{LoadError, LoadErrorKind};
use crate::util::canonical;
use crate::Options;

/// Fetches raw bodies over HTTP. Injected so embedders control
/// redirects, TLS and proxies; the default is a plain ureq agent.
pub trait HttpClient {
    fn get(&self, url: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}

pub(crate) struct UreqClient {
    agent: ureq::Agent,
    user_agent: String,
}

impl UreqClient {
    pub(crate) fn new(user_agent: String) -> Self {
        Self {
            agent: ureq::agent(),
            user_agent,
        }
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
        let response = self
            .agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()?;
        Ok(response.into_string()?)
    }
}

/// Loads the raw body for one url scheme. Registered loaders take
/// precedence over the built-in file/http/data handling.
pub trait UrlLoader {
    fn load(&self, url: &str) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// Parses a body that the sniffer decided is not JSON.
pub type YamlBackend = fn(&str) -> Result<Value, String>;

fn yaml_backend(body: &str) -> Result<Value, String> {
    serde_yaml::from_str(body).map_err(|e| e.to_string())
}

/// A parsed schema document plus its namespaces. `url` is the
/// canonical location it was requested from; `id` is the namespace the
/// document declares for itself (equal to `url` when it declares
/// none).
pub(crate) struct Document {
    pub(crate) url: Url,
    pub(crate) id: Url,
    pub(crate) doc: Value,
}

pub(crate) const GENERATED_BASE: &str = "http://generated.json.validator.url";

pub(crate) struct Loader {
    schemes: HashMap<String, Box<dyn UrlLoader>>,
    http: Box<dyn HttpClient>,
    custom_http: bool,
    embedded: HashMap<(String, String), String>,
    yaml: Option<YamlBackend>,
    cache_dir: Option<PathBuf>,
    debug: bool,

    docs: Vec<Document>,
    by_url: HashMap<Url, usize>,
    by_id: HashMap<Url, usize>,
}

impl Loader {
    pub(crate) fn new(options: &Options) -> Self {
        let mut embedded = HashMap::new();
        embedded.insert(
            ("json_validator".to_owned(), "draft4.json".to_owned()),
            include_str!("metaschemas/draft4.json").to_owned(),
        );
        Self {
            schemes: HashMap::new(),
            http: Box::new(UreqClient::new(options.user_agent.clone())),
            custom_http: false,
            embedded,
            yaml: Some(yaml_backend),
            cache_dir: options.cache_dir.clone(),
            debug: options.debug,
            docs: Vec::new(),
            by_url: HashMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub(crate) fn configure(&mut self, options: &Options) {
        self.cache_dir = options.cache_dir.clone();
        self.debug = options.debug;
        if !self.custom_http {
            self.http = Box::new(UreqClient::new(options.user_agent.clone()));
        }
    }

    pub(crate) fn set_http_client(&mut self, client: Box<dyn HttpClient>) {
        self.http = client;
        self.custom_http = true;
    }

    pub(crate) fn register_scheme(&mut self, scheme: &str, loader: Box<dyn UrlLoader>) {
        self.schemes.insert(scheme.to_owned(), loader);
    }

    pub(crate) fn register_embedded(&mut self, module: &str, name: &str, body: impl Into<String>) {
        self.embedded
            .insert((module.to_owned(), name.to_owned()), body.into());
    }

    pub(crate) fn set_yaml_backend(&mut self, backend: Option<YamlBackend>) {
        self.yaml = backend;
    }

    pub(crate) fn doc(&self, idx: usize) -> &Document {
        &self.docs[idx]
    }

    /// Loads (or returns the cached copy of) the document at `url`.
    /// Both the canonical namespace and the document's declared id hit
    /// the cache without I/O.
    pub(crate) fn load(&mut self, url: &str) -> Result<usize, LoadError> {
        let canon = canonical_url(url)?;
        if let Some(&i) = self.by_url.get(&canon) {
            debug!(url = %canon, "document cache hit");
            return Ok(i);
        }
        if let Some(&i) = self.by_id.get(&canon) {
            debug!(url = %canon, "document cache hit by declared id");
            return Ok(i);
        }

        let body = self.fetch(&canon).map_err(|kind| LoadError {
            url: canon.as_str().to_owned(),
            kind,
        })?;
        let doc = self.parse(&body).map_err(|kind| LoadError {
            url: canon.as_str().to_owned(),
            kind,
        })?;
        Ok(self.insert(canon, doc))
    }

    /// Registers a native schema tree. The namespace is the document's
    /// declared `id`, or a synthetic content-addressed one so that
    /// ingesting the same tree twice lands on the same document.
    pub(crate) fn add_document(&mut self, doc: Value) -> Result<usize, LoadError> {
        let ns = match declared_id(&doc) {
            Some(id) => id,
            None => {
                let generated = format!("{GENERATED_BASE}/{:x}", md5::compute(canonical(&doc)));
                Url::parse(&generated).map_err(|e| LoadError {
                    url: generated.clone(),
                    kind: LoadErrorKind::Url(e),
                })?
            }
        };
        if let Some(&i) = self.by_url.get(&ns) {
            return Ok(i);
        }
        Ok(self.insert(ns, doc))
    }

    fn insert(&mut self, url: Url, doc: Value) -> usize {
        let id = declared_id(&doc).unwrap_or_else(|| url.clone());
        let i = self.docs.len();
        self.docs.push(Document {
            url: url.clone(),
            id: id.clone(),
            doc,
        });
        self.by_url.insert(url, i);
        self.by_id.entry(id).or_insert(i);
        i
    }

    fn fetch(&self, url: &Url) -> Result<String, LoadErrorKind> {
        if let Some(loader) = self.schemes.get(url.scheme()) {
            return loader
                .load(url.as_str())
                .map_err(|e| LoadErrorKind::Fetch(e.to_string()));
        }
        match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|_| LoadErrorKind::InvalidFilePath)?;
                fs::read_to_string(path).map_err(LoadErrorKind::Io)
            }
            "http" | "https" => self.fetch_http(url),
            "data" => {
                let module = url.host_str().unwrap_or_default();
                let name = url.path().trim_start_matches('/');
                match self.embedded.get(&(module.to_owned(), name.to_owned())) {
                    Some(body) => Ok(body.clone()),
                    None => Err(LoadErrorKind::UnknownResource {
                        module: module.to_owned(),
                        name: name.to_owned(),
                    }),
                }
            }
            scheme => Err(LoadErrorKind::UnsupportedScheme(scheme.to_owned())),
        }
    }

    fn fetch_http(&self, url: &Url) -> Result<String, LoadErrorKind> {
        let name = format!("{:x}", md5::compute(url.as_str().as_bytes()));
        if let Some(dir) = &self.cache_dir {
            if let Ok(body) = fs::read_to_string(dir.join(&name)) {
                debug!(url = %url, file = %name, "schema cache hit");
                return Ok(body);
            }
        }
        debug!(url = %url, "fetching remote schema");
        let body = self
            .http
            .get(url.as_str())
            .map_err(|e| LoadErrorKind::Fetch(e.to_string()))?;
        if let Some(dir) = &self.cache_dir {
            // writes are opportunistic; an unwritable directory is fine
            if let Err(e) = fs::write(dir.join(&name), &body) {
                debug!(url = %url, error = %e, "schema cache write failed");
            }
        }
        Ok(body)
    }

    /// JSON when the first non-whitespace byte opens an object,
    /// otherwise whatever the yaml backend makes of it.
    fn parse(&self, body: &str) -> Result<Value, LoadErrorKind> {
        let looks_json = body.chars().find(|c| !c.is_whitespace()) == Some('{');
        if looks_json {
            serde_json::from_str(body).map_err(|e| LoadErrorKind::Parse {
                detail: e.to_string(),
                body: self.debug.then(|| body.to_owned()),
            })
        } else {
            let Some(yaml) = self.yaml else {
                return Err(LoadErrorKind::YamlBackendMissing);
            };
            yaml(body).map_err(|detail| LoadErrorKind::Parse {
                detail,
                body: self.debug.then(|| body.to_owned()),
            })
        }
    }
}

fn declared_id(doc: &Value) -> Option<Url> {
    let id = doc.get("id")?.as_str()?;
    let mut url = Url::parse(id).ok()?;
    url.set_fragment(None);
    let _ = url.set_port(None);
    Some(url)
}

fn starts_with_windows_drive(p: &str) -> bool {
    p.chars().next().filter(char::is_ascii_uppercase).is_some() && p[1..].starts_with(":\\")
}

fn to_url(s: &str) -> Result<Url, LoadError> {
    // note: windows drive letter is treated as url scheme by url parser
    if std::env::consts::OS == "windows" && starts_with_windows_drive(s) {
        return Url::from_file_path(s).map_err(|_| LoadError {
            url: s.to_owned(),
            kind: LoadErrorKind::InvalidFilePath,
        });
    }
    match Url::parse(s) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let path = Path::new(s).canonicalize().map_err(|e| LoadError {
                url: s.to_owned(),
                kind: LoadErrorKind::Io(e),
            })?;
            Url::from_file_path(path).map_err(|_| LoadError {
                url: s.to_owned(),
                kind: LoadErrorKind::InvalidFilePath,
            })
        }
        Err(e) => Err(LoadError {
            url: s.to_owned(),
            kind: LoadErrorKind::Url(e),
        }),
    }
}

/// Cache keys drop the fragment and port, so `http://x:8080/s#/a` and
/// `http://x/s` name the same document.
pub(crate) fn canonical_url(s: &str) -> Result<Url, LoadError> {
    let (base, _) = crate::util::split(s);
    let mut url = to_url(base)?;
    url.set_fragment(None);
    let _ = url.set_port(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_url_strips_fragment_and_port() {
        let url = canonical_url("http://example.com:8080/s.json#/definitions/a").unwrap();
        assert_eq!(url.as_str(), "http://example.com/s.json");
    }

    #[test]
    fn test_parse_sniffing() {
        let loader = Loader::new(&Options::default());
        let json = loader.parse(r#"  {"type": "object"}"#).unwrap();
        assert_eq!(json["type"], "object");
        let yaml = loader.parse("type: object\nrequired:\n- a\n").unwrap();
        assert_eq!(yaml["required"][0], "a");
    }

    #[test]
    fn test_yaml_backend_missing() {
        let mut loader = Loader::new(&Options::default());
        loader.set_yaml_backend(None);
        assert!(matches!(
            loader.parse("type: object"),
            Err(LoadErrorKind::YamlBackendMissing)
        ));
        // json bodies never touch the backend
        assert!(loader.parse(r#"{"type": "object"}"#).is_ok());
    }

    #[test]
    fn test_embedded_draft4() {
        let mut loader = Loader::new(&Options::default());
        let i = loader.load("data://json_validator/draft4.json").unwrap();
        let doc = &loader.doc(i).doc;
        assert_eq!(doc["id"], "http://json-schema.org/draft-04/schema#");
        // declared id is registered alongside the data url
        let j = loader.load("http://json-schema.org/draft-04/schema#").unwrap();
        assert_eq!(i, j);
    }
}
