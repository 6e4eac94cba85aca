use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::IngestError;
use crate::loader::Loader;
use crate::schema::{
    Additional, CollectionFormat, Items, Schema, SchemaIndex, Schemas, Type,
};
use crate::util::{escape, split, unescape};

/// Compiles raw schema documents into the arena, replacing every
/// `$ref` with the index of its target. The memo table is keyed by
/// absolute `url#pointer` location; a slot is reserved there before
/// the node is compiled, so a reference cycle lands on the reserved
/// index instead of recursing forever.
pub(crate) struct Resolver<'a> {
    pub(crate) loader: &'a mut Loader,
    pub(crate) schemas: &'a mut Schemas,
    pub(crate) refs: &'a mut HashMap<String, SchemaIndex>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn resolve(&mut self, doc_idx: usize) -> Result<SchemaIndex, IngestError> {
        let loc = format!("{}#", self.loader.doc(doc_idx).url);
        self.schema_at(&loc, &mut Vec::new())
    }

    fn schema_at(
        &mut self,
        loc: &str,
        ref_chain: &mut Vec<String>,
    ) -> Result<SchemaIndex, IngestError> {
        if let Some(idx) = self.refs.get(loc) {
            return Ok(*idx);
        }

        let (base, ptr) = split(loc);
        let doc_idx = self.loader.load(base).map_err(IngestError::from)?;
        let node = lookup(&self.loader.doc(doc_idx).doc, ptr)
            .ok_or_else(|| self.no_such_location(loc, base))?;
        let Value::Object(obj) = node else {
            return Err(self.resolve_err(loc, base, "schema is not an object"));
        };

        // a node carrying $ref compiles as its target; sibling keys are
        // ignored and the target's id never leaks into this position
        if let Some(Value::String(reference)) = obj.get("$ref") {
            let reference = reference.clone();
            if ref_chain.iter().any(|l| l == loc) {
                return Err(self.resolve_err(loc, base, "circular $ref chain"));
            }
            ref_chain.push(loc.to_owned());
            let target = normalize_ref(&reference, base)
                .map_err(|reason| self.resolve_err(&reference, base, &reason))?;
            debug!(reference = %reference, target = %target, "resolving $ref");
            let idx = self.schema_at(&target, ref_chain)?;
            ref_chain.pop();
            self.refs.insert(loc.to_owned(), idx);
            return Ok(idx);
        }

        let obj = obj.clone();
        let idx = self.schemas.insert(loc.to_owned());
        self.refs.insert(loc.to_owned(), idx);
        let sch = self.compile(&obj, loc, base, idx)?;
        self.schemas.set(idx, sch);
        Ok(idx)
    }

    fn compile(
        &mut self,
        obj: &Map<String, Value>,
        loc: &str,
        base: &str,
        idx: SchemaIndex,
    ) -> Result<Schema, IngestError> {
        let mut s = Schema::new(idx, loc.to_owned());
        let mut child = |r: &mut Self, ptr: String| {
            let loc = format!("{loc}{ptr}");
            r.schema_at(&loc, &mut Vec::new())
        };

        match obj.get("type") {
            Some(Value::String(t)) => s.types.push(Type::from_name(t)),
            Some(Value::Array(list)) => {
                for t in list {
                    if let Value::String(t) = t {
                        s.types.push(Type::from_name(t));
                    }
                }
            }
            _ => {}
        }

        if let Some(Value::Array(list)) = obj.get("enum") {
            s.enum_ = list.clone();
        }

        for (key, target) in [("allOf", &mut s.all_of), ("anyOf", &mut s.any_of), ("oneOf", &mut s.one_of)] {
            if let Some(Value::Array(list)) = obj.get(key) {
                for i in 0..list.len() {
                    target.push(child(self, format!("/{key}/{i}"))?);
                }
            }
        }
        if obj.get("not").is_some() {
            s.not = Some(child(self, "/not".to_owned())?);
        }

        if let Some(Value::Object(props)) = obj.get("properties") {
            for name in props.keys() {
                let sub = child(self, format!("/properties/{}", escape(name)))?;
                s.properties.push((name.clone(), sub));
            }
        }
        if let Some(Value::Object(props)) = obj.get("patternProperties") {
            for name in props.keys() {
                let regex = regex::Regex::new(name)
                    .map_err(|e| self.resolve_err(loc, base, &format!("invalid pattern {name:?}: {e}")))?;
                let sub = child(self, format!("/patternProperties/{}", escape(name)))?;
                s.pattern_properties.push((regex, sub));
            }
        }
        match obj.get("additionalProperties") {
            Some(Value::Bool(allowed)) => {
                s.additional_properties = Some(Additional::Bool(*allowed));
            }
            Some(Value::Object(_)) => {
                let sub = child(self, "/additionalProperties".to_owned())?;
                s.additional_properties = Some(Additional::SchemaRef(sub));
            }
            _ => {}
        }
        match obj.get("required") {
            // draft-3 marked the property schema itself as required
            Some(Value::Bool(flag)) => s.required_flag = *flag,
            Some(Value::Number(n)) => s.required_flag = n.as_f64() != Some(0.0),
            Some(Value::Array(list)) => {
                for name in list {
                    if let Value::String(name) = name {
                        s.required.push(name.clone());
                    }
                }
            }
            _ => {}
        }
        s.min_properties = as_usize(obj.get("minProperties"));
        s.max_properties = as_usize(obj.get("maxProperties"));
        s.default = obj.get("default").cloned();

        match obj.get("items") {
            Some(Value::Object(_)) => {
                s.items = Some(Items::SchemaRef(child(self, "/items".to_owned())?));
            }
            Some(Value::Array(list)) => {
                let mut subs = Vec::with_capacity(list.len());
                for i in 0..list.len() {
                    subs.push(child(self, format!("/items/{i}"))?);
                }
                s.items = Some(Items::SchemaRefs(subs));
            }
            _ => {}
        }
        match obj.get("additionalItems") {
            Some(Value::Bool(allowed)) => s.additional_items = Some(Additional::Bool(*allowed)),
            Some(Value::Object(_)) => {
                let sub = child(self, "/additionalItems".to_owned())?;
                s.additional_items = Some(Additional::SchemaRef(sub));
            }
            _ => {}
        }
        if let Some(Value::String(name)) = obj.get("collectionFormat") {
            s.collection_format = CollectionFormat::from_name(name);
        }
        s.min_items = as_usize(obj.get("minItems"));
        s.max_items = as_usize(obj.get("maxItems"));
        s.unique_items = matches!(obj.get("uniqueItems"), Some(Value::Bool(true)));

        s.min_length = as_usize(obj.get("minLength"));
        s.max_length = as_usize(obj.get("maxLength"));
        if let Some(Value::String(pattern)) = obj.get("pattern") {
            let regex = regex::Regex::new(pattern)
                .map_err(|e| self.resolve_err(loc, base, &format!("invalid pattern {pattern:?}: {e}")))?;
            s.pattern = Some(regex);
        }

        if let Some(Value::Number(n)) = obj.get("minimum") {
            s.minimum = Some(n.clone());
        }
        if let Some(Value::Number(n)) = obj.get("maximum") {
            s.maximum = Some(n.clone());
        }
        s.exclusive_minimum = matches!(obj.get("exclusiveMinimum"), Some(Value::Bool(true)));
        s.exclusive_maximum = matches!(obj.get("exclusiveMaximum"), Some(Value::Bool(true)));
        if let Some(Value::Number(n)) = obj.get("multipleOf") {
            s.multiple_of = Some(n.clone());
        }

        if let Some(Value::String(format)) = obj.get("format") {
            s.format = Some(format.clone());
        }

        Ok(s)
    }

    fn resolve_err(&self, reference: &str, namespace: &str, reason: &str) -> IngestError {
        IngestError::Resolve {
            reference: reference.to_owned(),
            namespace: namespace.to_owned(),
            reason: reason.to_owned(),
        }
    }

    fn no_such_location(&self, loc: &str, namespace: &str) -> IngestError {
        self.resolve_err(loc, namespace, "no value at this location")
    }
}

/// Rewrites a `$ref` string into an absolute `url#pointer` location:
/// bare words shorthand `#/definitions/<word>`, fragments attach to the
/// current namespace, anything else joins it as a url.
fn normalize_ref(reference: &str, base: &str) -> Result<String, String> {
    let bare_word = !reference.is_empty()
        && reference.chars().all(|c| c.is_alphanumeric() || c == '_');
    let reference = if bare_word {
        format!("#/definitions/{reference}")
    } else {
        reference.to_owned()
    };

    if let Some(fragment) = reference.strip_prefix('#') {
        let fragment = decode_fragment(fragment)?;
        return Ok(format!("{base}#{fragment}"));
    }

    let base_url = Url::parse(base).map_err(|e| e.to_string())?;
    let mut joined = base_url.join(&reference).map_err(|e| e.to_string())?;
    let fragment = decode_fragment(joined.fragment().unwrap_or_default())?;
    joined.set_fragment(None);
    let _ = joined.set_port(None);
    Ok(format!("{joined}#{fragment}"))
}

fn as_usize(v: Option<&Value>) -> Option<usize> {
    v.and_then(Value::as_u64).map(|n| n as usize)
}

fn decode_fragment(fragment: &str) -> Result<String, String> {
    percent_encoding::percent_decode_str(fragment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| format!("invalid fragment encoding: {e}"))
}

fn lookup<'v>(doc: &'v Value, ptr: &str) -> Option<&'v Value> {
    let mut v = doc;
    if ptr.is_empty() {
        return Some(v);
    }
    if !ptr.starts_with('/') {
        return None;
    }
    for token in ptr.split('/').skip(1) {
        let token = unescape(token).ok()?;
        match v {
            Value::Object(obj) => v = obj.get(token.as_ref())?,
            Value::Array(arr) => v = arr.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }
    Some(v)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_normalize_ref() {
        let base = "http://x/root.json";
        assert_eq!(
            normalize_ref("Name", base).unwrap(),
            "http://x/root.json#/definitions/Name"
        );
        assert_eq!(
            normalize_ref("#/definitions/a", base).unwrap(),
            "http://x/root.json#/definitions/a"
        );
        assert_eq!(
            normalize_ref("other.json#/a", base).unwrap(),
            "http://x/other.json#/a"
        );
        assert_eq!(
            normalize_ref("http://y:8080/s.json", base).unwrap(),
            "http://y/s.json#"
        );
        assert_eq!(normalize_ref("#", base).unwrap(), "http://x/root.json#");
    }

    #[test]
    fn test_lookup() {
        let doc = json!({"a": {"b/c": [10, 20]}, "~": true});
        assert_eq!(lookup(&doc, "/a/b~1c/1"), Some(&json!(20)));
        assert_eq!(lookup(&doc, "/~0"), Some(&json!(true)));
        assert_eq!(lookup(&doc, ""), Some(&doc));
        assert_eq!(lookup(&doc, "/missing"), None);
        assert_eq!(lookup(&doc, "no-slash"), None);
    }
}
