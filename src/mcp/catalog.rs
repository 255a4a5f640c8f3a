use crate::dropbox::{AuthMode, Endpoint, Pagination, Style};
use crate::errors::McpError;
use crate::utils::suggest::suggest;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Definition as exposed through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One row of `tool_catalog.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    /// True when the Dropbox route takes no argument at all (a literal `null` body).
    #[serde(skip)]
    pub takes_no_arg: bool,
}

impl CatalogEntry {
    pub fn definition(&self) -> ToolDef {
        ToolDef {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: strip_hidden_fields(&self.input_schema),
        }
    }
}

/// Fields consumed by the tool layer and never forwarded to Dropbox as part of the argument.
pub const TRANSPORT_FIELDS: &[&str] = &[
    "trace_id",
    "select_user",
    "path_root",
    "content",
    "content_base64",
    "as_text",
    "max_bytes",
    "fetch_all",
];

const HIDDEN_FIELDS: &[&str] = &["trace_id"];

static TOOL_CATALOG: Lazy<Vec<CatalogEntry>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    let entries: Vec<CatalogEntry> =
        serde_json::from_str(raw).expect("tool_catalog.json must be valid JSON");
    entries.into_iter().map(augment).collect()
});

static TOOL_MAP: Lazy<HashMap<String, CatalogEntry>> = Lazy::new(|| {
    TOOL_CATALOG
        .iter()
        .cloned()
        .map(|tool| (tool.name.clone(), tool))
        .collect()
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for tool in TOOL_CATALOG.iter() {
        if let Ok(schema) = JSONSchema::compile(&tool.input_schema) {
            map.insert(tool.name.clone(), schema);
        }
    }
    map
});

pub fn tool_catalog() -> &'static Vec<CatalogEntry> {
    &TOOL_CATALOG
}

pub fn tool_by_name(name: &str) -> Option<&'static CatalogEntry> {
    TOOL_MAP.get(name)
}

/// Names of catalog entries whose schema does not compile. Empty for a healthy catalog.
pub fn schema_compile_failures() -> Vec<String> {
    TOOL_CATALOG
        .iter()
        .filter(|tool| !TOOL_VALIDATORS.contains_key(&tool.name))
        .map(|tool| tool.name.clone())
        .collect()
}

fn augment(mut entry: CatalogEntry) -> CatalogEntry {
    entry.takes_no_arg = entry
        .input_schema
        .get("properties")
        .and_then(|v| v.as_object())
        .map_or(true, |props| props.is_empty());

    let mut extra: Vec<(&str, Value)> = vec![(
        "trace_id",
        serde_json::json!({"type": "string", "description": "Correlation id echoed in meta."}),
    )];
    if let Some(endpoint) = entry.endpoint.as_ref() {
        if endpoint.auth == AuthMode::User {
            extra.push((
                "select_user",
                serde_json::json!({
                    "type": "string",
                    "description": "Team member id to act as (team tokens only)."
                }),
            ));
            extra.push((
                "path_root",
                serde_json::json!({
                    "type": ["string", "object"],
                    "description": "Namespace id to resolve paths against, \"home\", or a Dropbox-API-Path-Root object."
                }),
            ));
        }
        match endpoint.style {
            Style::Upload => {
                extra.push((
                    "content",
                    serde_json::json!({"type": "string", "description": "File body as UTF-8 text."}),
                ));
                extra.push((
                    "content_base64",
                    serde_json::json!({"type": "string", "description": "File body as base64."}),
                ));
            }
            Style::Download => {
                extra.push((
                    "as_text",
                    serde_json::json!({
                        "type": "boolean",
                        "description": "Return the body as text even if it is not valid UTF-8."
                    }),
                ));
                extra.push((
                    "max_bytes",
                    serde_json::json!({
                        "type": "integer",
                        "minimum": 1,
                        "description": "Return at most this many bytes of the body."
                    }),
                ));
            }
            Style::Rpc => {}
        }
    }
    if entry.pagination.is_some() {
        extra.push((
            "fetch_all",
            serde_json::json!({
                "type": "boolean",
                "description": "Follow the cursor and merge every page (capped by DROPBOX_MAX_PAGES)."
            }),
        ));
    }

    if let Value::Object(schema) = &mut entry.input_schema {
        let props = schema
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(props) = props {
            for (key, value) in extra {
                props.entry(key.to_string()).or_insert(value);
            }
        }
    }
    entry
}

pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), McpError> {
    let Some(tool) = tool_by_name(tool_name) else {
        return Ok(());
    };
    let Some(schema) = TOOL_VALIDATORS.get(tool_name) else {
        return Ok(());
    };
    if let Err(errors) = schema.validate(args) {
        let message = format_schema_errors(tool_name, args, errors, &tool.input_schema);
        return Err(McpError::invalid_params(message));
    }
    Ok(())
}

fn format_schema_errors(
    tool_name: &str,
    args: &Value,
    errors: jsonschema::ErrorIterator,
    schema: &Value,
) -> String {
    let mut rendered = Vec::new();
    let mut did_you_means = Vec::new();

    for err in errors.take(10) {
        let instance_path = if err.instance_path.to_string().is_empty() {
            "(root)".to_string()
        } else {
            err.instance_path.to_string()
        };
        match &err.kind {
            jsonschema::error::ValidationErrorKind::AdditionalProperties { unexpected } => {
                for unknown in unexpected {
                    rendered.push(format!("{}: unknown field '{}'", instance_path, unknown));
                    let Some(parent) = schema_parent_at(schema, &err.schema_path.to_string())
                    else {
                        continue;
                    };
                    let props: Vec<String> = parent
                        .get("properties")
                        .and_then(|v| v.as_object())
                        .map(|map| map.keys().cloned().collect())
                        .unwrap_or_default();
                    let suggestions = suggest(unknown, &props, 3);
                    if !suggestions.is_empty() {
                        did_you_means.push(format!(
                            "field '{}': {}",
                            unknown,
                            suggestions.join(", ")
                        ));
                    }
                }
            }
            jsonschema::error::ValidationErrorKind::Enum { options } => {
                let allowed: Vec<String> = options
                    .as_array()
                    .map(|arr| {
                        arr.iter()
                            .map(|v| {
                                v.as_str()
                                    .map(|s| s.to_string())
                                    .unwrap_or_else(|| v.to_string())
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                rendered.push(format!(
                    "{}: expected one of {}",
                    instance_path,
                    allowed.join(", ")
                ));
                let received = instance_at(args, &err.instance_path.to_string());
                let suggestions = suggest(received.as_str().unwrap_or(""), &allowed, 3);
                if !suggestions.is_empty() {
                    did_you_means.push(format!("{}: {}", instance_path, suggestions.join(", ")));
                }
            }
            jsonschema::error::ValidationErrorKind::Required { property } => {
                let prop = property
                    .as_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| property.to_string());
                rendered.push(format!(
                    "{}: missing required field '{}'",
                    instance_path, prop
                ));
            }
            jsonschema::error::ValidationErrorKind::Type { kind } => {
                rendered.push(format!(
                    "{}: expected {}",
                    instance_path,
                    format_type_kind(kind)
                ));
            }
            _ => {
                rendered.push(format!("{}: {}", instance_path, err));
            }
        }
    }

    let mut lines = vec![format!("Invalid arguments for {}", tool_name)];
    lines.extend(rendered.iter().map(|line| format!("- {}", line)));
    if !did_you_means.is_empty() {
        lines.push(format!("Did you mean: {}", did_you_means.join(" | ")));
    }
    lines.push(format!("Hint: tools/list shows the input schema of {}", tool_name));
    lines.join("\n")
}

fn format_type_kind(kind: &jsonschema::error::TypeKind) -> String {
    match kind {
        jsonschema::error::TypeKind::Single(primitive) => primitive.to_string(),
        jsonschema::error::TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            if list.is_empty() {
                "unknown".to_string()
            } else {
                list.join(" | ")
            }
        }
    }
}

fn schema_node_at<'a>(schema: &'a Value, schema_path: &str) -> Option<&'a Value> {
    let mut current = schema;
    for segment in schema_path.split('/').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(obj) => obj.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// The schema object that declared the failing keyword.
fn schema_parent_at<'a>(schema: &'a Value, schema_path: &str) -> Option<&'a Value> {
    let owner = schema_path
        .trim_end_matches('/')
        .rsplit_once('/')
        .map(|(head, _)| head)
        .unwrap_or("");
    schema_node_at(schema, owner)
}

fn instance_at(root: &Value, instance_path: &str) -> Value {
    let mut current = root;
    for segment in instance_path.split('/').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(obj) => obj.get(segment).unwrap_or(&Value::Null),
            Value::Array(arr) => segment
                .parse::<usize>()
                .ok()
                .and_then(|idx| arr.get(idx))
                .unwrap_or(&Value::Null),
            _ => &Value::Null,
        };
    }
    current.clone()
}

fn strip_hidden_fields(schema: &Value) -> Value {
    let mut out = schema.clone();
    if let Some(props) = out.get_mut("properties").and_then(|v| v.as_object_mut()) {
        for key in HIDDEN_FIELDS {
            props.remove(*key);
        }
    }
    out
}

pub fn normalize_json_schema_for_openai(schema: &Value) -> Value {
    match schema {
        Value::Array(items) => {
            Value::Array(items.iter().map(normalize_json_schema_for_openai).collect())
        }
        Value::Object(map) => {
            let mut out = map.clone();
            if let Some(props) = out.get("properties").and_then(|v| v.as_object()) {
                let normalized: Map<String, Value> = props
                    .iter()
                    .map(|(key, value)| (key.clone(), normalize_json_schema_for_openai(value)))
                    .collect();
                out.insert("properties".to_string(), Value::Object(normalized));
            }
            if let Some(items) = out.get("items") {
                out.insert("items".to_string(), normalize_json_schema_for_openai(items));
            }
            if let Some(types) = out.get("type").and_then(|v| v.as_array()).cloned() {
                let description = out.remove("description");
                let any_of: Vec<Value> = types
                    .iter()
                    .filter_map(|t| t.as_str())
                    .map(|t| match t {
                        "array" => serde_json::json!({"type": "array", "items": {}}),
                        "object" => serde_json::json!({"type": "object"}),
                        other => serde_json::json!({"type": other}),
                    })
                    .collect();
                let mut shared = Map::new();
                shared.insert("anyOf".to_string(), Value::Array(any_of));
                if let Some(description) = description {
                    shared.insert("description".to_string(), description);
                }
                return Value::Object(shared);
            }
            if out.get("type").and_then(|v| v.as_str()) == Some("array")
                && !out.contains_key("items")
            {
                out.insert("items".to_string(), Value::Object(Map::new()));
            }
            Value::Object(out)
        }
        _ => schema.clone(),
    }
}

pub fn list_tools() -> Vec<ToolDef> {
    TOOL_CATALOG.iter().map(CatalogEntry::definition).collect()
}

/// Definitions in the OpenAI function-calling shape.
pub fn list_tools_for_openai() -> Vec<Value> {
    TOOL_CATALOG
        .iter()
        .map(|tool| {
            let def = tool.definition();
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": def.name,
                    "description": def.description,
                    "parameters": normalize_json_schema_for_openai(&def.input_schema),
                }
            })
        })
        .collect()
}
