use jsonschema::Validator;
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};

/// Maximum number of validation errors folded into one message.
const MAX_REPORTED_ERRORS: usize = 4;

pub(crate) fn validate_params(method: &str, params: &Value, validator: &Validator) -> Result<()> {
    let messages: Vec<String> = validator
        .iter_errors(params)
        .take(MAX_REPORTED_ERRORS)
        .map(|err| err.to_string())
        .collect();

    if messages.is_empty() {
        return Ok(());
    }
    Err(SchemaError::ValidationFailed {
        method: method.to_string(),
        message: messages.join("; "),
    })
}

/// Keywords whose value is a map of name -> subschema.
const SUBSCHEMA_MAPS: [&str; 4] = ["properties", "patternProperties", "$defs", "definitions"];
/// Keywords whose value is a single subschema.
const SUBSCHEMA_SINGLE: [&str; 6] = ["items", "additionalProperties", "not", "if", "then", "else"];
/// Keywords whose value is a list of subschemas.
const SUBSCHEMA_LISTS: [&str; 4] = ["prefixItems", "allOf", "anyOf", "oneOf"];

/// Close every object schema in `schema` against undeclared properties.
///
/// An explicit `additionalProperties` is left as written.
pub(crate) fn close_object_schemas(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            if describes_object(map) && !map.contains_key("additionalProperties") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for key in SUBSCHEMA_MAPS {
                if let Some(Value::Object(children)) = map.get_mut(key) {
                    children.values_mut().for_each(close_object_schemas);
                }
            }
            for key in SUBSCHEMA_SINGLE {
                if let Some(child) = map.get_mut(key) {
                    close_object_schemas(child);
                }
            }
            for key in SUBSCHEMA_LISTS {
                if let Some(Value::Array(children)) = map.get_mut(key) {
                    children.iter_mut().for_each(close_object_schemas);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_object_schemas),
        _ => {}
    }
}

fn describes_object(map: &Map<String, Value>) -> bool {
    match map.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => ["properties", "required", "patternProperties"]
            .iter()
            .any(|keyword| map.contains_key(*keyword)),
    }
}
