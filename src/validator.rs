use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use tracing::warn;

use crate::error::ValidationError;
use crate::formats::FormatCheck;
use crate::schema::{Additional, Items, Schema, SchemaIndex, Schemas, Type};
use crate::util::{digest, escape};

pub(crate) struct Context<'a> {
    pub(crate) schemas: &'a Schemas,
    pub(crate) formats: &'a HashMap<String, FormatCheck>,
    pub(crate) coerce: bool,
    pub(crate) warn_on_missing_format: bool,
}

/// Walks `v` against the compiled schema, collecting errors in data
/// traversal order. The value is mutable so that coercion and property
/// defaults can land in it; callers wanting purity pass a clone.
pub(crate) fn validate(cx: &Context, v: &mut Value, root: SchemaIndex) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut buf = String::new();
    let scope = Scope {
        sch: root,
        vid: 0,
        parent: None,
    };
    validate_node(cx, v, JsonPointer::new(&mut buf), &scope, &mut errors);
    errors
}

fn validate_node(
    cx: &Context,
    v: &mut Value,
    mut vloc: JsonPointer,
    scope: &Scope,
    errors: &mut Vec<ValidationError>,
) {
    // a schema cycle revisiting the same value terminates quietly
    if scope.check_cycle() {
        return;
    }
    let s = cx.schemas.get(scope.sch);

    // the effective type comes from the first of type / allOf / anyOf /
    // oneOf; a schema with properties alone implies object
    if !s.types.is_empty() {
        if let [t] = s.types.as_slice() {
            validate_as(cx, t, v, &mut vloc, s, scope, errors);
        } else {
            let mut buckets = Vec::new();
            let mut matched = false;
            for t in &s.types {
                let mut scratch = v.clone();
                let mut bucket = Vec::new();
                validate_as(cx, t, &mut scratch, &mut vloc, s, scope, &mut bucket);
                if bucket.is_empty() {
                    *v = scratch;
                    matched = true;
                    break;
                }
                buckets.push(bucket);
            }
            if !matched {
                errors.extend(merge_alternatives(buckets));
            }
        }
    } else if !s.all_of.is_empty() {
        let mut failed = Vec::new();
        for sub in &s.all_of {
            let child = Scope::child(*sub, scope.vid, scope);
            let mut bucket = Vec::new();
            validate_node(cx, v, vloc.copy(), &child, &mut bucket);
            if !bucket.is_empty() {
                failed.push(bucket);
            }
        }
        if !failed.is_empty() {
            errors.extend(merge_alternatives(failed));
        }
    } else if !s.any_of.is_empty() {
        let mut failed = Vec::new();
        let mut matched = false;
        for sub in &s.any_of {
            let child = Scope::child(*sub, scope.vid, scope);
            let mut scratch = v.clone();
            let mut bucket = Vec::new();
            validate_node(cx, &mut scratch, vloc.copy(), &child, &mut bucket);
            if bucket.is_empty() {
                *v = scratch;
                matched = true;
                break;
            }
            failed.push(bucket);
        }
        if !matched {
            errors.extend(merge_alternatives(failed));
        }
    } else if !s.one_of.is_empty() {
        let mut failed = Vec::new();
        let mut matched: Option<Value> = None;
        let mut multiple = false;
        for sub in &s.one_of {
            let child = Scope::child(*sub, scope.vid, scope);
            let mut scratch = v.clone();
            let mut bucket = Vec::new();
            validate_node(cx, &mut scratch, vloc.copy(), &child, &mut bucket);
            if bucket.is_empty() {
                if matched.is_some() {
                    multiple = true;
                } else {
                    matched = Some(scratch);
                }
            } else {
                failed.push(bucket);
            }
        }
        if multiple {
            errors.push(err(&vloc, "Expected only one to match."));
        } else if let Some(scratch) = matched {
            *v = scratch;
        } else {
            errors.extend(merge_alternatives(failed));
        }
    } else if !s.properties.is_empty() {
        validate_as(cx, &Type::Object, v, &mut vloc, s, scope, errors);
    }

    if !s.enum_.is_empty() {
        let got = digest(v);
        if !s.enum_.iter().any(|e| digest(e) == got) {
            let list = s
                .enum_
                .iter()
                .map(crate::util::canonical)
                .collect::<Vec<_>>()
                .join(", ");
            errors.push(err(&vloc, format!("Not in enum list: {list}.")));
        }
    }

    if let Some(not) = s.not {
        let child = Scope::child(not, scope.vid, scope);
        let mut scratch = v.clone();
        let mut bucket = Vec::new();
        validate_node(cx, &mut scratch, vloc.copy(), &child, &mut bucket);
        if bucket.is_empty() {
            errors.push(err(&vloc, "Should not match."));
        }
    }
}

fn validate_as(
    cx: &Context,
    t: &Type,
    v: &mut Value,
    vloc: &mut JsonPointer,
    s: &Schema,
    scope: &Scope,
    errors: &mut Vec<ValidationError>,
) {
    match t {
        Type::Null => {
            if !v.is_null() {
                errors.push(type_mismatch(vloc, "null", v));
            }
        }
        Type::Boolean => {
            if !v.is_boolean() {
                errors.push(type_mismatch(vloc, "boolean", v));
            }
        }
        Type::Integer => num_validate(cx, v, vloc, s, errors, true),
        Type::Number => num_validate(cx, v, vloc, s, errors, false),
        Type::String => str_validate(cx, v, vloc, s, errors),
        Type::Array => arr_validate(cx, v, vloc, s, scope, errors),
        Type::Object => obj_validate(cx, v, vloc, s, scope, errors),
        Type::Any | Type::File => {}
        Type::Unknown(name) => {
            errors.push(err(vloc, format!("Cannot validate type '{name}'")));
        }
    }
}

fn num_validate(
    cx: &Context,
    v: &mut Value,
    vloc: &JsonPointer,
    s: &Schema,
    errors: &mut Vec<ValidationError>,
    want_integer: bool,
) {
    let expected = if want_integer { "integer" } else { "number" };
    let num = match &*v {
        Value::Number(n) => Some(n.clone()),
        Value::String(str) if cx.coerce => str.parse::<Number>().ok(),
        _ => None,
    };
    let Some(num) = num else {
        errors.push(type_mismatch(vloc, expected, v));
        return;
    };
    if !v.is_number() {
        *v = Value::Number(num.clone());
    }

    let before = errors.len();
    format_check(cx, v, s, vloc, errors);

    if let Some(min) = &s.minimum {
        if let (Some(minf), Some(numf)) = (min.as_f64(), num.as_f64()) {
            if s.exclusive_minimum {
                if numf <= minf {
                    errors.push(err(vloc, format!("{num} <= minimum({min})")));
                }
            } else if numf < minf {
                errors.push(err(vloc, format!("{num} < minimum({min})")));
            }
        }
    }
    if let Some(max) = &s.maximum {
        if let (Some(maxf), Some(numf)) = (max.as_f64(), num.as_f64()) {
            if s.exclusive_maximum {
                if numf >= maxf {
                    errors.push(err(vloc, format!("{num} >= maximum({max})")));
                }
            } else if numf > maxf {
                errors.push(err(vloc, format!("{num} > maximum({max})")));
            }
        }
    }
    if let Some(mul) = &s.multiple_of {
        if let (Some(mulf), Some(numf)) = (mul.as_f64(), num.as_f64()) {
            if (numf / mulf).fract() != 0.0 {
                errors.push(err(vloc, format!("Not multiple of {mul}.")));
            }
        }
    }

    if want_integer && errors.len() == before && !(num.is_i64() || num.is_u64()) {
        errors.push(err(vloc, "Expected integer - got number."));
    }
}

fn str_validate(
    cx: &Context,
    v: &mut Value,
    vloc: &JsonPointer,
    s: &Schema,
    errors: &mut Vec<ValidationError>,
) {
    let string = match &*v {
        Value::String(str) => Some(str.clone()),
        Value::Number(n) if cx.coerce => Some(n.to_string()),
        _ => None,
    };
    let Some(string) = string else {
        errors.push(type_mismatch(vloc, "string", v));
        return;
    };
    if !v.is_string() {
        *v = Value::String(string.clone());
    }

    format_check(cx, v, s, vloc, errors);

    let mut len = None;
    if let Some(min) = s.min_length {
        let len = len.get_or_insert_with(|| string.chars().count());
        if *len < min {
            errors.push(err(vloc, format!("String is too short: {len}/{min}.")));
        }
    }
    if let Some(max) = s.max_length {
        let len = len.get_or_insert_with(|| string.chars().count());
        if *len > max {
            errors.push(err(vloc, format!("String is too long: {len}/{max}.")));
        }
    }
    if let Some(regex) = &s.pattern {
        if !regex.is_match(&string) {
            errors.push(err(vloc, format!("String does not match '{}'", regex.as_str())));
        }
    }
}

fn arr_validate(
    cx: &Context,
    v: &mut Value,
    vloc: &mut JsonPointer,
    s: &Schema,
    scope: &Scope,
    errors: &mut Vec<ValidationError>,
) {
    // a string collapses into an array when the item schema declares a
    // swagger collection format
    if let Some(Items::SchemaRef(item)) = &s.items {
        if let Some(cf) = cx.schemas.get(*item).collection_format {
            let parts = match &*v {
                Value::String(str) => Some(
                    str.split(cf.separator())
                        .map(|p| Value::String(p.to_owned()))
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            };
            if let Some(parts) = parts {
                *v = Value::Array(parts);
            }
        }
    }

    let Value::Array(arr) = v else {
        errors.push(type_mismatch(vloc, "array", v));
        return;
    };
    let len = arr.len();

    if let Some(min) = s.min_items {
        if len < min {
            errors.push(err(vloc, format!("Not enough items: {len}/{min}.")));
        }
    }
    if let Some(max) = s.max_items {
        if len > max {
            errors.push(err(vloc, format!("Too many items: {len}/{max}.")));
        }
    }
    if s.unique_items {
        let mut seen = HashSet::new();
        for item in arr.iter() {
            if !seen.insert(digest(item).0) {
                errors.push(err(vloc, "Unique items required."));
                break;
            }
        }
    }

    match &s.items {
        Some(Items::SchemaRef(sch)) => {
            for (i, item) in arr.iter_mut().enumerate() {
                let child = Scope::child(*sch, scope.vid + 1, scope);
                validate_node(cx, item, vloc.item(i), &child, errors);
            }
        }
        Some(Items::SchemaRefs(list)) => {
            for (i, item) in arr.iter_mut().enumerate() {
                let sch = if let Some(sch) = list.get(i) {
                    Some(*sch)
                } else {
                    match &s.additional_items {
                        // the positional list stretches by repeating its
                        // last schema
                        None | Some(Additional::Bool(true)) => list.last().copied(),
                        Some(Additional::Bool(false)) => {
                            errors.push(err(
                                vloc,
                                format!("Too many items: {len}/{}.", list.len()),
                            ));
                            break;
                        }
                        Some(Additional::SchemaRef(sch)) => Some(*sch),
                    }
                };
                if let Some(sch) = sch {
                    let child = Scope::child(sch, scope.vid + 1, scope);
                    validate_node(cx, item, vloc.item(i), &child, errors);
                }
            }
        }
        None => {}
    }
}

fn obj_validate(
    cx: &Context,
    v: &mut Value,
    vloc: &mut JsonPointer,
    s: &Schema,
    scope: &Scope,
    errors: &mut Vec<ValidationError>,
) {
    let Value::Object(obj) = v else {
        errors.push(type_mismatch(vloc, "object", v));
        return;
    };

    if let Some(min) = s.min_properties {
        if obj.len() < min {
            errors.push(err(vloc, format!("Not enough properties: {}/{min}.", obj.len())));
        }
    }
    if let Some(max) = s.max_properties {
        if obj.len() > max {
            errors.push(err(vloc, format!("Too many properties: {}/{max}.", obj.len())));
        }
    }

    for name in &s.required {
        if !obj.contains_key(name) {
            errors.push(err(&vloc.prop(name), "Missing property."));
        }
    }

    // the keys not yet consumed by properties or patternProperties;
    // additionalProperties sees only what is left
    let mut rest: HashSet<String> = obj.keys().cloned().collect();

    for (name, sub) in &s.properties {
        let child_schema = cx.schemas.get(*sub);
        if let Some(pvalue) = obj.get_mut(name) {
            rest.remove(name);
            let child = Scope::child(*sub, scope.vid + 1, scope);
            validate_node(cx, pvalue, vloc.prop(name), &child, errors);
        } else if let Some(default) = &child_schema.default {
            obj.insert(name.clone(), default.clone());
        } else if child_schema.required_flag {
            errors.push(err(&vloc.prop(name), "Missing property."));
        }
    }

    for (regex, sub) in &s.pattern_properties {
        let matching: Vec<String> = obj
            .keys()
            .filter(|k| regex.is_match(k))
            .cloned()
            .collect();
        for name in matching {
            rest.remove(&name);
            if let Some(pvalue) = obj.get_mut(&name) {
                let child = Scope::child(*sub, scope.vid + 1, scope);
                validate_node(cx, pvalue, vloc.prop(&name), &child, errors);
            }
        }
    }

    match &s.additional_properties {
        Some(Additional::SchemaRef(sub)) => {
            let leftover: Vec<String> = obj
                .keys()
                .filter(|k| rest.contains(k.as_str()))
                .cloned()
                .collect();
            for name in leftover {
                if let Some(pvalue) = obj.get_mut(&name) {
                    let child = Scope::child(*sub, scope.vid + 1, scope);
                    validate_node(cx, pvalue, vloc.prop(&name), &child, errors);
                }
            }
        }
        Some(Additional::Bool(false)) => {
            let leftover: Vec<&str> = obj
                .keys()
                .map(String::as_str)
                .filter(|k| {
                    rest.contains(*k) && !matches!(*k, "description" | "id" | "title")
                })
                .collect();
            if !leftover.is_empty() {
                errors.push(err(
                    vloc,
                    format!("Properties not allowed: {}.", leftover.join(", ")),
                ));
            }
        }
        _ => {}
    }
}

fn format_check(
    cx: &Context,
    v: &Value,
    s: &Schema,
    vloc: &JsonPointer,
    errors: &mut Vec<ValidationError>,
) {
    let Some(name) = &s.format else {
        return;
    };
    match cx.formats.get(name) {
        Some(check) => {
            if !check(v) {
                errors.push(err(vloc, format!("Does not match {name} format.")));
            }
        }
        None => {
            if cx.warn_on_missing_format {
                warn!(format = name.as_str(), "no validator for format");
            }
        }
    }
}

fn type_mismatch(vloc: &JsonPointer, want: &str, got: &Value) -> ValidationError {
    err(vloc, format!("Expected {want} - got {}.", Type::of(got)))
}

fn err(vloc: &JsonPointer, message: impl Into<String>) -> ValidationError {
    ValidationError::new(vloc.as_str(), message)
}

static EXPECTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Expected (.+) - got (.+)\.$").expect("static regex"));

/// Regroups the errors of failed alternatives: by path, deduplicated by
/// message, with plain type mismatches coalesced into one
/// `Expected a, b - got c.` line and anything else prefixed by the
/// index of the alternative it came from.
fn merge_alternatives(buckets: Vec<Vec<ValidationError>>) -> Vec<ValidationError> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<(usize, ValidationError)>> = HashMap::new();
    for (i, bucket) in buckets.into_iter().enumerate() {
        for e in bucket {
            let group = grouped.entry(e.path.clone()).or_default();
            if group.is_empty() {
                order.push(e.path.clone());
            }
            if !group.iter().any(|(_, seen)| seen.message == e.message) {
                group.push((i, e));
            }
        }
    }

    let mut merged = Vec::new();
    for path in order {
        let Some(group) = grouped.remove(&path) else {
            continue;
        };
        let captures: Vec<_> = group
            .iter()
            .filter_map(|(_, e)| EXPECTED.captures(&e.message))
            .collect();
        if captures.len() == group.len() {
            let mut wants = String::new();
            for (i, c) in captures.iter().enumerate() {
                if i > 0 {
                    wants.push_str(", ");
                }
                wants.push_str(&c[1]);
            }
            let got = &captures[0][2];
            let message = format!("Expected {wants} - got {got}.");
            merged.push(ValidationError::at(path, message));
        } else {
            for (i, e) in group {
                merged.push(ValidationError::at(path.clone(), format!("[{i}] {}", e.message)));
            }
        }
    }
    merged
}

// Scope --

struct Scope<'a> {
    sch: SchemaIndex,
    /// unique id of the value being validated; two scopes validating
    /// the same value share a vid
    vid: usize,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn child(sch: SchemaIndex, vid: usize, parent: &'a Scope) -> Self {
        Self {
            sch,
            vid,
            parent: Some(parent),
        }
    }

    fn check_cycle(&self) -> bool {
        let mut scope = self.parent;
        while let Some(scp) = scope {
            if scp.vid != self.vid {
                break;
            }
            if scp.sch == self.sch {
                return true;
            }
            scope = scp.parent;
        }
        false
    }
}

// JsonPointer --

struct JsonPointer<'a> {
    str: &'a mut String,
    len: usize,
}

impl<'a> JsonPointer<'a> {
    fn new(str: &'a mut String) -> Self {
        let len = str.len();
        Self { str, len }
    }

    fn as_str(&self) -> &str {
        &self.str[..self.len]
    }

    fn copy(&mut self) -> JsonPointer {
        JsonPointer {
            str: self.str,
            len: self.len,
        }
    }

    fn prop(&mut self, name: &str) -> JsonPointer {
        self.str.truncate(self.len);
        self.str.push('/');
        self.str.push_str(&escape(name));
        JsonPointer::new(self.str)
    }

    fn item(&mut self, i: usize) -> JsonPointer {
        self.str.truncate(self.len);
        self.str.push('/');
        let _ = write!(self.str, "{i}");
        JsonPointer::new(self.str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_pointer() {
        let mut buf = String::new();
        let mut root = JsonPointer::new(&mut buf);
        assert_eq!(root.as_str(), "");
        {
            let mut child = root.prop("a/b");
            assert_eq!(child.as_str(), "/a~1b");
            let grand = child.item(3);
            assert_eq!(grand.as_str(), "/a~1b/3");
        }
        assert_eq!(root.prop("plain").as_str(), "/plain");
    }

    #[test]
    fn test_merge_alternatives_coalesces_type_mismatches() {
        let buckets = vec![
            vec![ValidationError::at("/".into(), "Expected string - got boolean.".into())],
            vec![ValidationError::at("/".into(), "Expected integer - got boolean.".into())],
        ];
        let merged = merge_alternatives(buckets);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].message, "Expected string, integer - got boolean.");
    }

    #[test]
    fn test_merge_alternatives_prefixes_mixed_messages() {
        let buckets = vec![
            vec![ValidationError::at("/".into(), "String is too short: 2/5.".into())],
            vec![ValidationError::at("/".into(), "Expected integer - got string.".into())],
        ];
        let merged = merge_alternatives(buckets);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].message, "[0] String is too short: 2/5.");
        assert_eq!(merged[1].message, "[1] Expected integer - got string.");
    }

    #[test]
    fn test_merge_alternatives_dedupes_messages() {
        let buckets = vec![
            vec![ValidationError::at("/x".into(), "Missing property.".into())],
            vec![ValidationError::at("/x".into(), "Missing property.".into())],
        ];
        let merged = merge_alternatives(buckets);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].message, "[0] Missing property.");
    }
}
