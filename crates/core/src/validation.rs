//! Argument validation against a tool's structural schema.
//!
//! Covers the subset of JSON schema the builder emits: object/array
//! nesting, `required`, primitive types, `enum`, `anyOf`/`oneOf` and local
//! `$ref`s. Anything else is accepted.

use serde_json::Value;

/// Validate `arguments` against `schema`.
///
/// When `closed` is true, properties the schema does not declare are
/// rejected (strict tools). Optional properties may be omitted or `null`.
pub fn validate_arguments(schema: &Value, arguments: &Value, closed: bool) -> Result<(), String> {
    Validator { root: schema, closed }.check(schema, arguments, "arguments", 0)
}

const MAX_REF_DEPTH: usize = 32;

struct Validator<'a> {
    root: &'a Value,
    closed: bool,
}

impl<'a> Validator<'a> {
    fn check(&self, schema: &'a Value, value: &Value, path: &str, depth: usize) -> Result<(), String> {
        if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
            if depth >= MAX_REF_DEPTH {
                return Err(format!("{path}: schema reference '{reference}' nests too deeply"));
            }
            let target = self
                .resolve(reference)
                .ok_or_else(|| format!("{path}: unresolvable schema reference '{reference}'"))?;
            return self.check(target, value, path, depth + 1);
        }

        if let Some(allowed) = schema.get("enum").and_then(Value::as_array)
            && !allowed.contains(value)
        {
            return Err(format!("{path}: {value} is not one of {}", Value::Array(allowed.clone())));
        }

        for combinator in ["anyOf", "oneOf"] {
            if let Some(variants) = schema.get(combinator).and_then(Value::as_array) {
                if variants.iter().any(|v| self.check(v, value, path, depth).is_ok()) {
                    return Ok(());
                }
                return Err(format!("{path}: does not match any allowed shape"));
            }
        }

        match schema.get("type") {
            Some(Value::String(expected)) => self.check_type(schema, expected, value, path, depth),
            Some(Value::Array(types)) => {
                let matched = types
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|t| self.check_type(schema, t, value, path, depth).is_ok());
                if matched {
                    Ok(())
                } else {
                    Err(format!("{path}: expected one of {}, got {}", Value::Array(types.clone()), kind_of(value)))
                }
            }
            _ if schema.get("properties").is_some() => self.check_object(schema, value, path, depth),
            _ => Ok(()),
        }
    }

    fn check_type(
        &self,
        schema: &'a Value,
        expected: &str,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<(), String> {
        let ok = match expected {
            "object" => return self.check_object(schema, value, path, depth),
            "array" => return self.check_array(schema, value, path, depth),
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{path}: expected {expected}, got {}", kind_of(value)))
        }
    }

    fn check_object(&self, schema: &'a Value, value: &Value, path: &str, depth: usize) -> Result<(), String> {
        let Value::Object(object) = value else {
            return Err(format!("{path}: expected object, got {}", kind_of(value)));
        };
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if object.get(name).is_none_or(Value::is_null) {
                    return Err(format!("{path}: missing required field '{name}'"));
                }
            }
        }

        let closed = self.closed || schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (name, field) in object {
            let field_path = format!("{path}.{name}");
            match properties.and_then(|p| p.get(name)) {
                Some(_) if field.is_null() => {}
                Some(field_schema) => self.check(field_schema, field, &field_path, depth)?,
                None if closed && properties.is_some_and(|p| !p.is_empty()) => {
                    return Err(format!("{path}: unexpected field '{name}'"));
                }
                None => {}
            }
        }
        Ok(())
    }

    fn check_array(&self, schema: &'a Value, value: &Value, path: &str, depth: usize) -> Result<(), String> {
        let Value::Array(items) = value else {
            return Err(format!("{path}: expected array, got {}", kind_of(value)));
        };
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                self.check(item_schema, item, &format!("{path}[{i}]"), depth)?;
            }
        }
        Ok(())
    }

    fn resolve(&self, reference: &str) -> Option<&'a Value> {
        let path = reference.strip_prefix("#/")?;
        path.split('/').try_fold(self.root, |node, segment| node.get(segment))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
