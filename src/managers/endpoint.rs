use crate::constants::{limits::MAX_UPLOAD_BYTES, network::LONGPOLL_GRACE_MS};
use crate::dropbox::content_hash::content_hash;
use crate::dropbox::{CallOptions, Download, DropboxClient, Endpoint, Pagination, Style};
use crate::errors::ToolError;
use crate::mcp::catalog::{CatalogEntry, TRANSPORT_FIELDS};
use crate::services::config::Host;
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use crate::utils::dropbox_path::{
    normalize_link_path_fields, normalize_path_fields, LINK_RELATIVE_ROUTES,
};
use base64::Engine;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Transport settings pulled out of the caller's arguments.
struct Transport {
    options: CallOptions,
    fetch_all: bool,
    as_text: bool,
    max_bytes: Option<usize>,
}

/// Handler for one catalog entry bound to a Dropbox route.
#[derive(Clone)]
pub struct EndpointTool {
    logger: Logger,
    name: String,
    endpoint: Endpoint,
    pagination: Option<Pagination>,
    takes_no_arg: bool,
    client: Arc<DropboxClient>,
    validation: Validation,
}

impl EndpointTool {
    /// `None` when the entry has no endpoint (composite and local tools).
    pub fn from_entry(
        entry: &CatalogEntry,
        client: Arc<DropboxClient>,
        validation: Validation,
        logger: &Logger,
    ) -> Option<Self> {
        let endpoint = entry.endpoint.clone()?;
        Some(Self {
            logger: logger.child(&entry.name),
            name: entry.name.clone(),
            endpoint,
            pagination: entry.pagination.clone(),
            takes_no_arg: entry.takes_no_arg,
            client,
            validation,
        })
    }

    fn split_transport(&self, args: &Value) -> Result<(Value, Transport), ToolError> {
        let v = &self.validation;
        let transport = Transport {
            options: CallOptions {
                select_user: v.ensure_optional_string(args.get("select_user"), "select_user", true)?,
                select_admin: None,
                path_root: args.get("path_root").filter(|p| !p.is_null()).cloned(),
                timeout_ms: self.longpoll_timeout_ms(args),
            },
            fetch_all: v
                .ensure_optional_bool(args.get("fetch_all"), "fetch_all")?
                .unwrap_or(false),
            as_text: v
                .ensure_optional_bool(args.get("as_text"), "as_text")?
                .unwrap_or(false),
            max_bytes: v
                .ensure_limit(args.get("max_bytes"), "max_bytes", 1, u64::MAX)?
                .map(|n| n as usize),
        };

        let mut arg: Map<String, Value> = match args {
            Value::Object(map) => map
                .iter()
                .filter(|(key, _)| !TRANSPORT_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            Value::Null => Map::new(),
            _ => return Err(ToolError::invalid_params("Tool arguments must be an object")),
        };
        arg.retain(|_, value| !value.is_null());

        let mut arg = if arg.is_empty() && self.takes_no_arg {
            Value::Null
        } else {
            Value::Object(arg)
        };
        if LINK_RELATIVE_ROUTES.contains(&self.endpoint.route.as_str()) {
            normalize_link_path_fields(&mut arg)?;
        } else {
            normalize_path_fields(&mut arg)?;
        }
        Ok((arg, transport))
    }

    /// Longpoll requests stay open for the caller's `timeout` plus jitter; without one the
    /// catalog timeout applies.
    fn longpoll_timeout_ms(&self, args: &Value) -> Option<u64> {
        if self.endpoint.host != Host::Notify {
            return None;
        }
        let secs = args.get("timeout").and_then(Value::as_u64)?;
        Some(secs.saturating_mul(1000).saturating_add(LONGPOLL_GRACE_MS))
    }

    async fn call_rpc(&self, arg: &Value, transport: &Transport) -> Result<Value, ToolError> {
        match (&self.pagination, transport.fetch_all) {
            (Some(pagination), true) => self.fetch_all(pagination, arg, &transport.options).await,
            _ => self.client.rpc(&self.endpoint, arg, &transport.options).await,
        }
    }

    async fn fetch_all(
        &self,
        pagination: &Pagination,
        arg: &Value,
        options: &CallOptions,
    ) -> Result<Value, ToolError> {
        let max_pages = self.client.config().max_pages.max(1);
        let continue_endpoint = self.endpoint.sibling(&pagination.continue_route);

        let mut page = self.client.rpc(&self.endpoint, arg, options).await?;
        let mut items = take_items(&mut page, &pagination.items_field);
        let mut pages = 1;

        while has_more(&page, pagination) && pages < max_pages {
            let cursor = page
                .get(&pagination.cursor_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    ToolError::internal(format!(
                        "{} reported more results without a cursor",
                        self.endpoint.route
                    ))
                })?
                .to_string();
            page = self
                .client
                .rpc(
                    &continue_endpoint,
                    &serde_json::json!({ "cursor": cursor }),
                    options,
                )
                .await?;
            items.extend(take_items(&mut page, &pagination.items_field));
            pages += 1;
        }

        let truncated = has_more(&page, pagination);
        if truncated {
            self.logger.info(
                "stopped paging at the page cap",
                Some(&serde_json::json!({ "pages": pages })),
            );
        }
        let mut merged = match page {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.insert(pagination.items_field.clone(), Value::Array(items));
        merged.insert("pages".to_string(), Value::from(pages));
        merged.insert("truncated".to_string(), Value::Bool(truncated));
        Ok(Value::Object(merged))
    }

    async fn call_upload(
        &self,
        args: &Value,
        arg: &Value,
        transport: &Transport,
    ) -> Result<Value, ToolError> {
        let bytes = self.validation.ensure_content(args)?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ToolError::invalid_params(format!(
                "Upload of {} bytes exceeds the single-request limit of {} bytes",
                bytes.len(),
                MAX_UPLOAD_BYTES
            ))
            .with_code("UPLOAD_TOO_LARGE")
            .with_hint("Use upload_session_start, upload_session_append and upload_session_finish"));
        }
        let local_hash = content_hash(&bytes);
        let size = bytes.len() as u64;
        let mut result = self
            .client
            .upload(&self.endpoint, arg, bytes, &transport.options)
            .await?;

        // Only a whole-file upload can be compared against the committed file's hash.
        let whole_file = result.get("size").and_then(|v| v.as_u64()) == Some(size);
        let remote_hash = result
            .get("content_hash")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if let (true, Some(remote), Value::Object(map)) = (whole_file, remote_hash, &mut result) {
            let verified = remote == local_hash;
            if !verified {
                self.logger.warn(
                    "uploaded content hash differs from the local hash",
                    Some(&serde_json::json!({ "tool": self.name })),
                );
            }
            map.insert("content_hash_verified".to_string(), Value::Bool(verified));
        }
        Ok(result)
    }

    async fn call_download(&self, arg: &Value, transport: &Transport) -> Result<Value, ToolError> {
        let download = self
            .client
            .download(&self.endpoint, arg, &transport.options, transport.max_bytes)
            .await?;
        Ok(render_download(download, transport.as_text))
    }
}

fn take_items(page: &mut Value, field: &str) -> Vec<Value> {
    match page.get_mut(field).map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn has_more(page: &Value, pagination: &Pagination) -> bool {
    page.get(&pagination.has_more_field)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// `{metadata, content | content_base64, bytes, truncated}`. Bodies that are UTF-8 (allowing a
/// character cut by truncation) come back as text.
pub(crate) fn render_download(download: Download, as_text: bool) -> Value {
    let len = download.bytes.len();
    let text = match std::str::from_utf8(&download.bytes) {
        Ok(text) => Some(text.to_string()),
        Err(err) if download.truncated && err.error_len().is_none() => {
            Some(String::from_utf8_lossy(&download.bytes[..err.valid_up_to()]).into_owned())
        }
        Err(_) if as_text => Some(String::from_utf8_lossy(&download.bytes).into_owned()),
        Err(_) => None,
    };
    let mut out = serde_json::json!({
        "metadata": download.metadata,
        "bytes": len,
        "truncated": download.truncated,
    });
    if let Some(content_type) = download.content_type {
        out["content_type"] = Value::String(content_type);
    }
    match text {
        Some(text) => out["content"] = Value::String(text),
        None => {
            out["content_base64"] =
                Value::String(base64::engine::general_purpose::STANDARD.encode(&download.bytes))
        }
    }
    out
}

#[async_trait::async_trait]
impl ToolHandler for EndpointTool {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        let (arg, transport) = self.split_transport(&args)?;
        self.logger
            .debug(&self.endpoint.route, Some(&serde_json::json!({ "arg": arg })));
        match self.endpoint.style {
            Style::Rpc => self.call_rpc(&arg, &transport).await,
            Style::Upload => self.call_upload(&args, &arg, &transport).await,
            Style::Download => self.call_download(&arg, &transport).await,
        }
    }
}
