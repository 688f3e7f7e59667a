//! Tool descriptors and the schema builder.
//!
//! A [`ToolDescriptor`] is what the completion call sees for one tool:
//! a name, a description and a normalized JSON schema for its arguments.
//! [`build`] produces one from either a raw schema object or a typed
//! [`ObjectSpec`], dropping excluded/defaulted fields, stripping
//! presentation-only keys and, in strict mode, closing every object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

use crate::error::SchemaError;

/// Keys that describe presentation, not structure.
const PRESENTATION_KEYS: &[&str] = &["default", "format", "examples", "minimum", "maximum"];

/// Keys whose value is a map of name → sub-schema.
const SCHEMA_MAP_KEYS: &[&str] = &["properties", "$defs", "definitions", "patternProperties"];

/// Keys whose value is literal data and must never be rewritten.
const LITERAL_KEYS: &[&str] = &["enum", "const", "required"];

/// A tool as exposed to one completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name within the effective tool set of one completion call
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// Normalized JSON schema sent to the model
    pub parameters: Value,

    /// Whether the schema is strict (closed objects, all properties required)
    #[serde(default)]
    pub strict: bool,

    /// Structural schema used to validate incoming arguments.
    /// Same as `parameters` minus the strict rewrite, so optional fields stay optional.
    #[serde(skip)]
    pub(crate) validation: Value,

    /// Values filled in after the model responds
    #[serde(skip)]
    pub defaults: Map<String, Value>,
}

impl ToolDescriptor {
    /// Validate raw arguments against this descriptor's declared structure.
    pub fn validate(&self, arguments: &Value) -> Result<(), String> {
        crate::validation::validate_arguments(&self.validation, arguments, self.strict)
    }

    /// Merge the descriptor's defaults into validated arguments.
    /// Values supplied by the model win.
    pub fn apply_defaults(&self, arguments: Value) -> Value {
        if self.defaults.is_empty() {
            return arguments;
        }
        let mut map = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in &self.defaults {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(map)
    }
}

/// A parameter description: either a raw schema or a typed structure.
#[derive(Debug, Clone)]
pub enum ParameterSpec {
    Raw(Value),
    Typed(ObjectSpec),
}

impl ParameterSpec {
    fn into_schema(self) -> Value {
        match self {
            ParameterSpec::Raw(value) => value,
            ParameterSpec::Typed(spec) => spec.to_schema(),
        }
    }
}

impl From<ObjectSpec> for ParameterSpec {
    fn from(spec: ObjectSpec) -> Self {
        ParameterSpec::Typed(spec)
    }
}

impl From<Value> for ParameterSpec {
    fn from(value: Value) -> Self {
        ParameterSpec::Raw(value)
    }
}

/// A declarative object structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSpec {
    pub fields: Vec<FieldSpec>,
}

/// One named field of an [`ObjectSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub description: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
}

/// The shape of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Enum(Vec<String>),
    Array(Box<FieldKind>),
    Object(ObjectSpec),
    /// Free-form object with no declared properties
    Map,
    /// No constraint
    Any,
}

impl ObjectSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field (builder style).
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn to_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.to_schema());
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

impl FieldSpec {
    /// A required field of the given kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            required: true,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn to_schema(&self) -> Value {
        let mut schema = self.kind.to_schema();
        if let (Some(description), Value::Object(map)) = (&self.description, &mut schema) {
            map.insert("description".into(), Value::String(description.clone()));
        }
        schema
    }
}

impl FieldKind {
    fn to_schema(&self) -> Value {
        match self {
            FieldKind::String => json!({"type": "string"}),
            FieldKind::Integer => json!({"type": "integer"}),
            FieldKind::Number => json!({"type": "number"}),
            FieldKind::Boolean => json!({"type": "boolean"}),
            FieldKind::Enum(values) => json!({"type": "string", "enum": values}),
            FieldKind::Array(items) => json!({"type": "array", "items": items.to_schema()}),
            FieldKind::Object(spec) => spec.to_schema(),
            FieldKind::Map => json!({"type": "object"}),
            FieldKind::Any => json!({}),
        }
    }
}

/// Build a normalized descriptor.
///
/// Fields named in `exclude` or present as keys of `defaults` are removed
/// from the schema. In strict mode every object forbids additional
/// properties and lists all of its properties as required.
pub fn build(
    name: impl Into<String>,
    description: impl Into<String>,
    spec: impl Into<ParameterSpec>,
    strict: bool,
    exclude: &[&str],
    defaults: Map<String, Value>,
) -> Result<ToolDescriptor, SchemaError> {
    let name = name.into();
    let mut schema = match spec.into().into_schema() {
        Value::Object(map) if map.is_empty() => return Err(SchemaError::Empty(name)),
        Value::Null => return Err(SchemaError::Empty(name)),
        Value::Object(map) => map,
        _ => return Err(SchemaError::NotAnObject(name)),
    };

    match schema.get("type") {
        None => {
            schema.insert("type".into(), Value::String("object".into()));
        }
        Some(Value::String(t)) if t == "object" => {}
        Some(_) => return Err(SchemaError::NotAnObject(name)),
    }

    let dropped: HashSet<&str> = exclude
        .iter()
        .copied()
        .chain(defaults.keys().map(String::as_str))
        .collect();
    remove_fields(&mut schema, &dropped);

    let mut schema = Value::Object(schema);
    strip_presentation(&mut schema);
    let validation = schema.clone();
    if strict {
        close_objects(&mut schema);
    }

    Ok(ToolDescriptor {
        name,
        description: description.into(),
        parameters: schema,
        strict,
        validation,
        defaults,
    })
}

fn remove_fields(schema: &mut Map<String, Value>, dropped: &HashSet<&str>) {
    if dropped.is_empty() {
        return;
    }
    let properties = schema
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(properties) = properties {
        properties.retain(|key, _| !dropped.contains(key.as_str()));
    }
    if let Some(Value::Array(required)) = schema.get_mut("required") {
        required.retain(|v| v.as_str().is_none_or(|key| !dropped.contains(key)));
    }
}

/// Apply `f` to every sub-schema reachable from `schema`, never touching
/// property names or literal data.
fn for_each_subschema(schema: &mut Value, f: &mut impl FnMut(&mut Value)) {
    match schema {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if LITERAL_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if SCHEMA_MAP_KEYS.contains(&key.as_str()) {
                    if let Value::Object(named) = child {
                        named.values_mut().for_each(|sub| f(sub));
                    }
                } else {
                    f(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(f),
        _ => {}
    }
}

fn strip_presentation(schema: &mut Value) {
    if let Value::Object(map) = schema {
        for key in PRESENTATION_KEYS {
            map.remove(*key);
        }
    }
    for_each_subschema(schema, &mut strip_presentation);
}

fn close_objects(schema: &mut Value) {
    if let Value::Object(map) = schema {
        let is_object = map.get("type").and_then(Value::as_str) == Some("object");
        if let Some(Value::Object(properties)) = map.get("properties") {
            let required: Vec<Value> = properties.keys().cloned().map(Value::String).collect();
            map.insert("required".into(), Value::Array(required));
            map.insert("additionalProperties".into(), Value::Bool(false));
        } else if is_object && !map.contains_key("additionalProperties") {
            map.insert("additionalProperties".into(), Value::Bool(false));
        }
    }
    for_each_subschema(schema, &mut close_objects);
}

/// Convert a capability's declared input schema into a typed [`ObjectSpec`].
///
/// `$ref` pointers into `$defs` (or `definitions`) are resolved inline;
/// unresolvable and cyclic references are rejected.
pub fn object_spec_from_input_schema(tool: &str, schema: &Value) -> Result<ObjectSpec, SchemaError> {
    let resolver = RefResolver { tool, root: schema };
    let mut stack = Vec::new();
    match resolver.kind_of(schema, &mut stack)? {
        FieldKind::Object(spec) => Ok(spec),
        FieldKind::Map | FieldKind::Any => Ok(ObjectSpec::new()),
        _ => Err(SchemaError::NotAnObject(tool.to_string())),
    }
}

struct RefResolver<'a> {
    tool: &'a str,
    root: &'a Value,
}

impl<'a> RefResolver<'a> {
    fn lookup(&self, reference: &str) -> Result<&'a Value, SchemaError> {
        let unresolved = || SchemaError::UnresolvedRef {
            tool: self.tool.to_string(),
            reference: reference.to_string(),
        };
        let path = reference.strip_prefix("#/").ok_or_else(unresolved)?;
        let mut current = self.root;
        for segment in path.split('/') {
            current = current.get(segment).ok_or_else(unresolved)?;
        }
        Ok(current)
    }

    fn kind_of(&self, schema: &'a Value, stack: &mut Vec<String>) -> Result<FieldKind, SchemaError> {
        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            if stack.iter().any(|r| r == reference) {
                return Err(SchemaError::RefCycle {
                    tool: self.tool.to_string(),
                    reference: reference.to_string(),
                });
            }
            let target = self.lookup(reference)?;
            stack.push(reference.to_string());
            let kind = self.kind_of(target, stack);
            stack.pop();
            return kind;
        }

        if let Some(values) = schema.get("enum").and_then(Value::as_array) {
            let strings: Vec<String> = values.iter().filter_map(|v| v.as_str().map(String::from)).collect();
            if strings.len() == values.len() {
                return Ok(FieldKind::Enum(strings));
            }
        }

        for combinator in ["anyOf", "oneOf"] {
            if let Some(variants) = schema.get(combinator).and_then(Value::as_array) {
                let non_null: Vec<&Value> = variants.iter().filter(|v| !is_null_schema(v)).collect();
                return match non_null.as_slice() {
                    [single] => self.kind_of(*single, stack),
                    _ => Ok(FieldKind::Any),
                };
            }
        }
        if let Some([single]) = schema.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            return self.kind_of(single, stack);
        }

        let type_name = match schema.get("type") {
            Some(Value::String(t)) => Some(t.as_str()),
            Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
            _ => None,
        };

        let kind = match type_name {
            Some("string") => FieldKind::String,
            Some("integer") => FieldKind::Integer,
            Some("number") => FieldKind::Number,
            Some("boolean") => FieldKind::Boolean,
            Some("array") => {
                let items = match schema.get("items") {
                    Some(items) => self.kind_of(items, stack)?,
                    None => FieldKind::Any,
                };
                FieldKind::Array(Box::new(items))
            }
            Some("object") | None if schema.get("properties").is_some() => {
                FieldKind::Object(self.object_of(schema, stack)?)
            }
            Some("object") => FieldKind::Map,
            _ => FieldKind::Any,
        };
        Ok(kind)
    }

    fn object_of(&self, schema: &'a Value, stack: &mut Vec<String>) -> Result<ObjectSpec, SchemaError> {
        let required: HashSet<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut spec = ObjectSpec::new();
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                let kind = self.kind_of(property, stack)?;
                spec.fields.push(FieldSpec {
                    name: name.clone(),
                    description: property
                        .get("description")
                        .and_then(Value::as_str)
                        .map(String::from),
                    kind,
                    required: required.contains(name.as_str()) && !is_nullable(property),
                });
            }
        }
        Ok(spec)
    }
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

fn is_nullable(schema: &Value) -> bool {
    let in_type = schema
        .get("type")
        .and_then(Value::as_array)
        .is_some_and(|types| types.iter().any(|t| t.as_str() == Some("null")));
    let in_union = ["anyOf", "oneOf"].iter().any(|key| {
        schema
            .get(*key)
            .and_then(Value::as_array)
            .is_some_and(|variants| variants.iter().any(is_null_schema))
    });
    in_type || in_union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {"type": "string", "description": "City name", "examples": ["Paris"]},
                "days": {"type": "integer", "minimum": 1, "maximum": 14, "default": 3},
                "units": {"type": "string", "format": "unit", "enum": ["metric", "imperial"]},
                "api_key": {"type": "string"}
            },
            "required": ["city", "api_key"]
        })
    }

    #[test]
    fn strict_makes_every_property_required() {
        let schema = json!({
            "type": "object",
            "properties": {
                "x": {"type": "string"},
                "inner": {
                    "type": "object",
                    "properties": {"y": {"type": "number"}}
                }
            }
        });
        let desc = build("t", "test", schema, true, &[], Map::new()).unwrap();
        let params = &desc.parameters;
        assert_eq!(params["additionalProperties"], json!(false));
        let required = params["required"].as_array().unwrap();
        assert!(required.contains(&json!("x")));
        assert!(required.contains(&json!("inner")));
        let inner = &params["properties"]["inner"];
        assert_eq!(inner["additionalProperties"], json!(false));
        assert_eq!(inner["required"], json!(["y"]));
    }

    #[test]
    fn strict_closes_defs_and_array_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "stops": {"type": "array", "items": {"$ref": "#/$defs/Stop"}}
            },
            "$defs": {
                "Stop": {
                    "type": "object",
                    "properties": {"name": {"type": "string"}, "eta": {"type": "string"}},
                    "required": ["name"]
                }
            }
        });
        let desc = build("route", "plan", schema, true, &[], Map::new()).unwrap();
        let stop = &desc.parameters["$defs"]["Stop"];
        assert_eq!(stop["additionalProperties"], json!(false));
        assert_eq!(stop["required"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn non_strict_leaves_required_alone() {
        let desc = build("weather", "w", weather_schema(), false, &[], Map::new()).unwrap();
        assert_eq!(desc.parameters["required"], json!(["city", "api_key"]));
        assert!(desc.parameters.get("additionalProperties").is_none());
        assert!(!desc.strict);
    }

    #[test]
    fn presentation_keys_are_stripped_recursively() {
        let desc = build("weather", "w", weather_schema(), true, &[], Map::new()).unwrap();
        let props = &desc.parameters["properties"];
        assert!(props["city"].get("examples").is_none());
        assert_eq!(props["city"]["description"], json!("City name"));
        assert!(props["days"].get("minimum").is_none());
        assert!(props["days"].get("maximum").is_none());
        assert!(props["days"].get("default").is_none());
        assert!(props["units"].get("format").is_none());
        assert_eq!(props["units"]["enum"], json!(["metric", "imperial"]));
    }

    #[test]
    fn property_named_like_presentation_key_survives() {
        let schema = json!({
            "type": "object",
            "properties": {"default": {"type": "boolean"}, "format": {"type": "string"}}
        });
        let desc = build("fmt", "f", schema, true, &[], Map::new()).unwrap();
        assert!(desc.parameters["properties"].get("default").is_some());
        assert!(desc.parameters["properties"].get("format").is_some());
    }

    #[test]
    fn excluded_and_defaulted_fields_are_removed() {
        let mut defaults = Map::new();
        defaults.insert("units".into(), json!("metric"));
        let desc = build("weather", "w", weather_schema(), true, &["api_key"], defaults).unwrap();
        let props = desc.parameters["properties"].as_object().unwrap();
        assert!(props.contains_key("city"));
        assert!(props.contains_key("days"));
        assert!(!props.contains_key("units"));
        assert!(!props.contains_key("api_key"));
        assert!(!desc.parameters["required"].as_array().unwrap().contains(&json!("api_key")));
    }

    #[test]
    fn defaults_are_merged_without_overriding() {
        let mut defaults = Map::new();
        defaults.insert("units".into(), json!("metric"));
        defaults.insert("days".into(), json!(3));
        let desc = build("weather", "w", weather_schema(), false, &[], defaults).unwrap();
        let merged = desc.apply_defaults(json!({"city": "Oslo", "days": 7}));
        assert_eq!(merged["units"], json!("metric"));
        assert_eq!(merged["days"], json!(7));
    }

    #[test]
    fn empty_spec_is_a_schema_error() {
        let err = build("nothing", "n", json!({}), true, &[], Map::new()).unwrap_err();
        assert_eq!(err, SchemaError::Empty("nothing".into()));
        let err = build("nothing", "n", Value::Null, true, &[], Map::new()).unwrap_err();
        assert_eq!(err, SchemaError::Empty("nothing".into()));
    }

    #[test]
    fn non_object_spec_is_rejected() {
        let err = build("bad", "b", json!({"type": "string"}), true, &[], Map::new()).unwrap_err();
        assert!(matches!(err, SchemaError::NotAnObject(_)));
    }

    #[test]
    fn typed_spec_builds_the_same_shape() {
        let spec = ObjectSpec::new()
            .field(FieldSpec::string("text").describe("Message to send"))
            .field(FieldSpec::new("count", FieldKind::Integer).optional());
        let desc = build("agent", "a", spec, true, &[], Map::new()).unwrap();
        assert_eq!(desc.parameters["properties"]["text"]["type"], json!("string"));
        let required = desc.parameters["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert!(required.contains(&json!("count")));
        assert_eq!(desc.parameters["additionalProperties"], json!(false));
    }

    #[test]
    fn input_schema_resolves_refs_and_types() {
        let schema = json!({
            "type": "object",
            "properties": {
                "repo": {"$ref": "#/$defs/Repo"},
                "labels": {"type": "array", "items": {"type": "string"}},
                "limit": {"anyOf": [{"type": "integer"}, {"type": "null"}]},
                "draft": {"type": "boolean"},
                "score": {"type": ["number", "null"]},
                "extra": {"type": "object"}
            },
            "required": ["repo", "limit"],
            "$defs": {
                "Repo": {
                    "type": "object",
                    "properties": {"owner": {"type": "string"}, "name": {"type": "string"}},
                    "required": ["owner", "name"]
                }
            }
        });
        let spec = object_spec_from_input_schema("issues", &schema).unwrap();
        let field = |n: &str| spec.fields.iter().find(|f| f.name == n).unwrap().clone();

        let repo = field("repo");
        assert!(repo.required);
        match repo.kind {
            FieldKind::Object(inner) => assert_eq!(inner.fields.len(), 2),
            other => panic!("expected object, got {other:?}"),
        }
        assert_eq!(field("labels").kind, FieldKind::Array(Box::new(FieldKind::String)));
        let limit = field("limit");
        assert_eq!(limit.kind, FieldKind::Integer);
        assert!(!limit.required);
        assert_eq!(field("score").kind, FieldKind::Number);
        assert_eq!(field("draft").kind, FieldKind::Boolean);
        assert_eq!(field("extra").kind, FieldKind::Map);
    }

    #[test]
    fn input_schema_rejects_missing_ref() {
        let schema = json!({
            "type": "object",
            "properties": {"x": {"$ref": "#/$defs/Missing"}}
        });
        let err = object_spec_from_input_schema("t", &schema).unwrap_err();
        assert!(matches!(err, SchemaError::UnresolvedRef { .. }));
    }

    #[test]
    fn input_schema_rejects_ref_cycle() {
        let schema = json!({
            "type": "object",
            "properties": {"node": {"$ref": "#/$defs/Node"}},
            "$defs": {
                "Node": {"type": "object", "properties": {"next": {"$ref": "#/$defs/Node"}}}
            }
        });
        let err = object_spec_from_input_schema("t", &schema).unwrap_err();
        assert!(matches!(err, SchemaError::RefCycle { .. }));
    }

    #[test]
    fn input_schema_without_properties_is_parameterless() {
        let spec = object_spec_from_input_schema("ping", &json!({"type": "object"})).unwrap();
        assert!(spec.fields.is_empty());
        let desc = build("ping", "p", spec, true, &[], Map::new()).unwrap();
        assert_eq!(desc.parameters["properties"], json!({}));
    }
}
