use std::fmt::{self, Display};

use regex::Regex;
use serde_json::{Number, Value};

/// Handle into [`Schemas`]. Cyclic references are two handles naming
/// the same slot, so the compiled tree needs no `$ref` indirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaIndex(pub(crate) usize);

/// Arena of compiled schemas. Slots are reserved before their contents
/// are compiled, which is what lets self-referential schemas close
/// onto an existing index instead of recursing forever.
#[derive(Default)]
pub(crate) struct Schemas {
    list: Vec<Schema>,
}

impl Schemas {
    pub(crate) fn insert(&mut self, loc: String) -> SchemaIndex {
        let idx = SchemaIndex(self.list.len());
        self.list.push(Schema::new(idx, loc));
        idx
    }

    pub(crate) fn get(&self, idx: SchemaIndex) -> &Schema {
        &self.list[idx.0]
    }

    pub(crate) fn set(&mut self, idx: SchemaIndex, sch: Schema) {
        debug_assert_eq!(idx, sch.idx);
        self.list[idx.0] = sch;
    }
}

pub(crate) enum Items {
    SchemaRef(SchemaIndex),
    SchemaRefs(Vec<SchemaIndex>),
}

pub(crate) enum Additional {
    Bool(bool),
    SchemaRef(SchemaIndex),
}

/// Swagger collection formats: how a string collapses into an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionFormat {
    Csv,
    Ssv,
    Tsv,
    Pipes,
}

impl CollectionFormat {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "csv" => Some(Self::Csv),
            "ssv" => Some(Self::Ssv),
            "tsv" => Some(Self::Tsv),
            "pipes" => Some(Self::Pipes),
            _ => None,
        }
    }

    pub(crate) fn separator(self) -> char {
        match self {
            Self::Csv => ',',
            Self::Ssv => ' ',
            Self::Tsv => '\t',
            Self::Pipes => '|',
        }
    }
}

/// One compiled schema node. Unrecognized keywords are dropped at
/// compile time; `id` belongs to the source document and is never
/// carried into a compiled node.
pub(crate) struct Schema {
    pub(crate) idx: SchemaIndex,
    /// Absolute `url#pointer` of the source node, for diagnostics.
    pub(crate) loc: String,

    pub(crate) types: Vec<Type>,
    pub(crate) enum_: Vec<Value>,

    pub(crate) all_of: Vec<SchemaIndex>,
    pub(crate) any_of: Vec<SchemaIndex>,
    pub(crate) one_of: Vec<SchemaIndex>,
    pub(crate) not: Option<SchemaIndex>,

    pub(crate) properties: Vec<(String, SchemaIndex)>,
    pub(crate) pattern_properties: Vec<(Regex, SchemaIndex)>,
    pub(crate) additional_properties: Option<Additional>,
    pub(crate) required: Vec<String>,
    /// Draft-3 style `required: true` on the property schema itself.
    pub(crate) required_flag: bool,
    pub(crate) min_properties: Option<usize>,
    pub(crate) max_properties: Option<usize>,
    pub(crate) default: Option<Value>,

    pub(crate) items: Option<Items>,
    pub(crate) additional_items: Option<Additional>,
    pub(crate) collection_format: Option<CollectionFormat>,
    pub(crate) min_items: Option<usize>,
    pub(crate) max_items: Option<usize>,
    pub(crate) unique_items: bool,

    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) pattern: Option<Regex>,

    pub(crate) minimum: Option<Number>,
    pub(crate) maximum: Option<Number>,
    pub(crate) exclusive_minimum: bool,
    pub(crate) exclusive_maximum: bool,
    pub(crate) multiple_of: Option<Number>,

    pub(crate) format: Option<String>,
}

impl Schema {
    pub(crate) fn new(idx: SchemaIndex, loc: String) -> Self {
        Self {
            idx,
            loc,
            types: Vec::new(),
            enum_: Vec::new(),
            all_of: Vec::new(),
            any_of: Vec::new(),
            one_of: Vec::new(),
            not: None,
            properties: Vec::new(),
            pattern_properties: Vec::new(),
            additional_properties: None,
            required: Vec::new(),
            required_flag: false,
            min_properties: None,
            max_properties: None,
            default: None,
            items: None,
            additional_items: None,
            collection_format: None,
            min_items: None,
            max_items: None,
            unique_items: false,
            min_length: None,
            max_length: None,
            pattern: None,
            minimum: None,
            maximum: None,
            exclusive_minimum: false,
            exclusive_maximum: false,
            multiple_of: None,
            format: None,
        }
    }
}

/// JSON type names as they appear in `type` and in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Type {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
    Any,
    File,
    Unknown(String),
}

impl Type {
    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "null" => Type::Null,
            "boolean" => Type::Boolean,
            "integer" => Type::Integer,
            "number" => Type::Number,
            "string" => Type::String,
            "array" => Type::Array,
            "object" => Type::Object,
            "any" => Type::Any,
            "file" => Type::File,
            other => Type::Unknown(other.to_owned()),
        }
    }

    /// The runtime kind of a value. Numbers report `integer` when they
    /// carry an integral flavor, which is what lets `uniqueItems` and
    /// `enum` keep `1` and `1.0` apart.
    pub(crate) fn of(v: &Value) -> Self {
        match v {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Boolean,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    Type::Integer
                } else {
                    Type::Number
                }
            }
            Value::String(_) => Type::String,
            Value::Array(_) => Type::Array,
            Value::Object(_) => Type::Object,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Null => "null",
            Type::Boolean => "boolean",
            Type::Integer => "integer",
            Type::Number => "number",
            Type::String => "string",
            Type::Array => "array",
            Type::Object => "object",
            Type::Any => "any",
            Type::File => "file",
            Type::Unknown(other) => other,
        };
        f.write_str(name)
    }
}
