//! JSON Schema derivation and validation for prompt inputs and outputs.
//!
//! Schemas are generated from the Rust types with `schemars`; validation
//! covers the subset those schemas use: `type`, `properties`, `required`,
//! `additionalProperties: false`, `items`, `enum`, `const`, string and array
//! length bounds, numeric bounds, `$ref` into `$defs`, and
//! `anyOf`/`oneOf`/`allOf`.

use schemars::JsonSchema;
use serde_json::{Map, Value};

/// Derive the JSON Schema of `T`.
pub fn schema_for<T: JsonSchema>() -> Value {
    schemars::schema_for!(T).as_value().clone()
}

/// Validate `instance` against `schema`, collecting every violation.
///
/// Each message is prefixed with a JSON path (`$.field[0]`).
pub fn validate(instance: &Value, schema: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    check(schema, schema, instance, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn resolve_ref<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let pointer = reference.strip_prefix('#')?;
    root.pointer(pointer)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        other => type_name(value) == other,
    }
}

fn check(root: &Value, schema: &Value, instance: &Value, path: &str, errors: &mut Vec<String>) {
    let schema = match schema {
        Value::Bool(true) => return,
        Value::Bool(false) => {
            errors.push(format!("{path}: no value is allowed here"));
            return;
        }
        Value::Object(map) => map,
        _ => return,
    };

    if let Some(reference) = schema.get("$ref").and_then(Value::as_str) {
        match resolve_ref(root, reference) {
            Some(target) => check(root, target, instance, path, errors),
            None => errors.push(format!("{path}: unresolvable schema reference {reference}")),
        }
    }

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(instance, t)) {
            errors.push(format!(
                "{path}: expected {}, got {}",
                allowed.join(" or "),
                type_name(instance)
            ));
            return;
        }
    }

    if let Some(options) = schema.get("enum").and_then(Value::as_array) {
        if !options.contains(instance) {
            errors.push(format!("{path}: {instance} is not one of {}", Value::Array(options.clone())));
        }
    }
    if let Some(expected) = schema.get("const") {
        if expected != instance {
            errors.push(format!("{path}: expected constant {expected}"));
        }
    }

    check_combinators(root, schema, instance, path, errors);

    match instance {
        Value::String(s) => {
            let len = u64::try_from(s.chars().count()).unwrap_or(u64::MAX);
            if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
                if len < min {
                    errors.push(format!("{path}: must be at least {min} characters"));
                }
            }
            if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
                if len > max {
                    errors.push(format!("{path}: must be at most {max} characters"));
                }
            }
        }
        Value::Number(n) => {
            let value = n.as_f64().unwrap_or_default();
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if value < min {
                    errors.push(format!("{path}: must be >= {min}"));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if value > max {
                    errors.push(format!("{path}: must be <= {max}"));
                }
            }
        }
        Value::Array(items) => {
            let len = u64::try_from(items.len()).unwrap_or(u64::MAX);
            if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
                if len < min {
                    errors.push(format!("{path}: must contain at least {min} items"));
                }
            }
            if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
                if len > max {
                    errors.push(format!("{path}: must contain at most {max} items"));
                }
            }
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(root, item_schema, item, &format!("{path}[{i}]"), errors);
                }
            }
        }
        Value::Object(fields) => check_object(root, schema, fields, path, errors),
        _ => {}
    }
}

fn check_combinators(
    root: &Value,
    schema: &Map<String, Value>,
    instance: &Value,
    path: &str,
    errors: &mut Vec<String>,
) {
    let passes = |branch: &Value| {
        let mut scratch = Vec::new();
        check(root, branch, instance, path, &mut scratch);
        scratch.is_empty()
    };

    if let Some(branches) = schema.get("allOf").and_then(Value::as_array) {
        for branch in branches {
            check(root, branch, instance, path, errors);
        }
    }
    if let Some(branches) = schema.get("anyOf").and_then(Value::as_array) {
        if !branches.iter().any(passes) {
            errors.push(format!("{path}: does not match any allowed schema"));
        }
    }
    if let Some(branches) = schema.get("oneOf").and_then(Value::as_array) {
        let matched = branches.iter().filter(|b| passes(b)).count();
        if matched != 1 {
            errors.push(format!(
                "{path}: must match exactly one allowed schema (matched {matched})"
            ));
        }
    }
}

fn check_object(
    root: &Value,
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                errors.push(format!("{path}: missing required field `{name}`"));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    if let Some(properties) = properties {
        for (name, value) in fields {
            if let Some(prop_schema) = properties.get(name) {
                check(root, prop_schema, value, &format!("{path}.{name}"), errors);
            }
        }
    }

    if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
        for name in fields.keys() {
            if !properties.is_some_and(|p| p.contains_key(name)) {
                errors.push(format!("{path}: unexpected field `{name}`"));
            }
        }
    }
}

/// Schema dialect expected by a provider's structured-output parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDialect {
    /// OpenAPI 3.0 subset used by Gemini `responseSchema`: no references,
    /// upper-case type names, `nullable` instead of `null` types.
    OpenApi,
    /// Plain JSON Schema with references inlined (OpenAI, Claude prompts).
    JsonSchema,
}

/// Produce a self-contained copy of `schema` for sending to a provider.
///
/// References are inlined, meta keywords (`$schema`, `$defs`, `title`) are
/// removed, and in the OpenAPI dialect optional values are expressed with
/// `nullable`.
pub fn provider_schema(schema: &Value, dialect: SchemaDialect) -> Value {
    convert(schema, schema, dialect, 0)
}

const MAX_INLINE_DEPTH: usize = 32;

/// Keywords Gemini accepts beyond `type`, `properties` and `items`.
const OPENAPI_KEYWORDS: &[&str] = &[
    "description",
    "enum",
    "required",
    "nullable",
    "minItems",
    "maxItems",
];

fn convert(root: &Value, schema: &Value, dialect: SchemaDialect, depth: usize) -> Value {
    let Some(map) = schema.as_object() else {
        return Value::Object(Map::new());
    };
    if depth > MAX_INLINE_DEPTH {
        return Value::Object(Map::new());
    }

    if let Some(target) = map
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| resolve_ref(root, r))
    {
        let mut inlined = convert(root, target, dialect, depth + 1);
        if let (Some(desc), Value::Object(obj)) = (map.get("description"), &mut inlined) {
            obj.insert("description".into(), desc.clone());
        }
        return inlined;
    }

    // Option<T> of a complex type: anyOf [T, {type: null}]
    for key in ["anyOf", "oneOf"] {
        if let Some(branches) = map.get(key).and_then(Value::as_array) {
            let non_null: Vec<&Value> = branches
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) != Some("null"))
                .collect();
            let nullable = non_null.len() < branches.len();

            // Documented unit enums become oneOf [{const: ..}, ..]
            let consts: Option<Vec<Value>> = non_null
                .iter()
                .map(|b| b.get("const").cloned().or_else(|| single_enum(b)))
                .collect();

            let mut out = match (consts, non_null.as_slice()) {
                (Some(values), _) if !values.is_empty() => {
                    let mut obj = Map::new();
                    obj.insert("type".into(), type_value("string", dialect));
                    obj.insert("enum".into(), Value::Array(values));
                    Value::Object(obj)
                }
                (_, [single]) => convert(root, single, dialect, depth + 1),
                _ => continue,
            };
            if let Value::Object(obj) = &mut out {
                if let Some(desc) = map.get("description") {
                    obj.insert("description".into(), desc.clone());
                }
                if nullable {
                    mark_nullable(obj, dialect);
                }
            }
            return out;
        }
    }

    let mut out = Map::new();
    for (key, value) in map {
        match key.as_str() {
            "$schema" | "$defs" | "definitions" | "title" | "$ref" | "anyOf" | "oneOf" => {}
            "additionalProperties" if dialect == SchemaDialect::OpenApi => {}
            "const" => {
                out.insert("enum".into(), Value::Array(vec![value.clone()]));
            }
            "type" => match value {
                Value::String(t) => {
                    out.insert("type".into(), type_value(t, dialect));
                }
                Value::Array(types) => {
                    let concrete: Vec<&str> = types
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|t| *t != "null")
                        .collect();
                    let nullable = concrete.len() < types.len();
                    if let Some(first) = concrete.first() {
                        out.insert("type".into(), type_value(first, dialect));
                    }
                    if nullable {
                        mark_nullable(&mut out, dialect);
                    }
                }
                _ => {}
            },
            "properties" => {
                let props: Map<String, Value> = value
                    .as_object()
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, s)| (name.clone(), convert(root, s, dialect, depth + 1)))
                            .collect()
                    })
                    .unwrap_or_default();
                out.insert("properties".into(), Value::Object(props));
            }
            "items" => {
                out.insert("items".into(), convert(root, value, dialect, depth + 1));
            }
            other if dialect == SchemaDialect::OpenApi && !OPENAPI_KEYWORDS.contains(&other) => {}
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}

fn single_enum(branch: &Value) -> Option<Value> {
    match branch.get("enum").and_then(Value::as_array) {
        Some(values) if values.len() == 1 => values.first().cloned(),
        _ => None,
    }
}

fn type_value(t: &str, dialect: SchemaDialect) -> Value {
    match dialect {
        SchemaDialect::OpenApi => Value::String(t.to_uppercase()),
        SchemaDialect::JsonSchema => Value::String(t.to_string()),
    }
}

fn mark_nullable(obj: &mut Map<String, Value>, dialect: SchemaDialect) {
    match dialect {
        SchemaDialect::OpenApi => {
            obj.insert("nullable".into(), Value::Bool(true));
        }
        SchemaDialect::JsonSchema => {
            if let Some(Value::String(t)) = obj.get("type").cloned() {
                obj.insert(
                    "type".into(),
                    Value::Array(vec![Value::String(t), Value::String("null".into())]),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Step {
        step_name: String,
        passed: bool,
    }

    #[derive(Serialize, Deserialize, JsonSchema)]
    enum Outcome {
        Passed,
        #[serde(rename = "Bug Detected")]
        BugDetected,
    }

    #[derive(Serialize, Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct Report {
        #[schemars(length(min = 1))]
        goal: String,
        #[schemars(length(min = 1))]
        steps: Vec<Step>,
        outcome: Outcome,
        #[serde(default)]
        note: Option<String>,
    }

    fn valid_report() -> Value {
        json!({
            "goal": "Test login",
            "steps": [{"stepName": "Open", "passed": true}],
            "outcome": "Bug Detected"
        })
    }

    #[test]
    fn test_valid_instance_passes() {
        let schema = schema_for::<Report>();
        assert!(validate(&valid_report(), &schema).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let schema = schema_for::<Report>();
        let mut instance = valid_report();
        instance.as_object_mut().unwrap().remove("outcome");
        let errors = validate(&instance, &schema).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("missing required field `outcome`")));
    }

    #[test]
    fn test_wrong_primitive_type_in_nested_ref() {
        let schema = schema_for::<Report>();
        let mut instance = valid_report();
        instance["steps"][0]["passed"] = json!("yes");
        let errors = validate(&instance, &schema).unwrap_err();
        assert!(
            errors.iter().any(|e| e.starts_with("$.steps[0].passed")),
            "got {errors:?}"
        );
    }

    #[test]
    fn test_enum_and_length_bounds() {
        let schema = schema_for::<Report>();
        let mut instance = valid_report();
        instance["outcome"] = json!("Maybe");
        instance["goal"] = json!("");
        instance["steps"] = json!([]);
        let errors = validate(&instance, &schema).unwrap_err();
        assert_eq!(errors.len(), 3, "got {errors:?}");
    }

    #[test]
    fn test_optional_field_accepts_null() {
        let schema = schema_for::<Report>();
        let mut instance = valid_report();
        instance["note"] = Value::Null;
        assert!(validate(&instance, &schema).is_ok());
    }

    #[test]
    fn test_additional_properties_false() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}},
            "additionalProperties": false
        });
        let errors = validate(&json!({"a": 1, "b": 2}), &schema).unwrap_err();
        assert_eq!(errors, vec!["$: unexpected field `b`".to_string()]);
        assert!(validate(&json!({"a": 1}), &schema).is_ok());
    }

    #[test]
    fn test_openapi_dialect_is_self_contained() {
        let schema = provider_schema(&schema_for::<Report>(), SchemaDialect::OpenApi);
        let text = schema.to_string();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("$defs"));
        assert!(!text.contains("$schema"));
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(schema["properties"]["steps"]["items"]["type"], "OBJECT");
        assert_eq!(schema["properties"]["outcome"]["type"], "STRING");
        assert_eq!(
            schema["properties"]["outcome"]["enum"],
            json!(["Passed", "Bug Detected"])
        );
        assert_eq!(schema["properties"]["note"]["nullable"], true);
    }

    #[test]
    fn test_json_schema_dialect_keeps_lowercase_types() {
        let schema = provider_schema(&schema_for::<Report>(), SchemaDialect::JsonSchema);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["note"]["type"], json!(["string", "null"]));
        assert!(validate(&valid_report(), &schema).is_ok());
    }
}
