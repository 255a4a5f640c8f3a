use crate::dropbox::{CallOptions, DropboxClient, Endpoint};
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::tool_executor::ToolHandler;
use crate::services::validation::Validation;
use crate::utils::dropbox_path::is_root;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const COMPOSITE_TOOLS: &[&str] = &[
    "list_folders",
    "list_received_files",
    "search",
    "members_remove",
];

/// Tools that chain a lookup call in front of the main request.
#[derive(Clone)]
pub struct CompositeManager {
    logger: Logger,
    client: Arc<DropboxClient>,
    validation: Validation,
}

impl CompositeManager {
    pub fn new(logger: Logger, client: Arc<DropboxClient>, validation: Validation) -> Self {
        Self {
            logger: logger.child("composite"),
            client,
            validation,
        }
    }

    pub async fn handle_tool(&self, tool: &str, args: Value) -> Result<Value, ToolError> {
        match tool {
            "list_folders" => self.list_folders(&args).await,
            "list_received_files" => self.list_received_files(&args).await,
            "search" => self.search(&args).await,
            "members_remove" => self.members_remove(&args).await,
            _ => Err(ToolError::internal(format!("No composite tool named {}", tool))),
        }
    }

    /// Confirms `path` is a folder and returns its metadata.
    async fn require_folder(&self, path: &str) -> Result<Value, ToolError> {
        let metadata = self
            .client
            .rpc(
                &Endpoint::rpc("files/get_metadata"),
                &serde_json::json!({ "path": path }),
                &CallOptions::default(),
            )
            .await?;
        let tag = metadata.get(".tag").and_then(|v| v.as_str()).unwrap_or("");
        if tag != "folder" {
            return Err(ToolError::invalid_params(format!(
                "{} is a {}, not a folder",
                path,
                if tag.is_empty() { "non-folder entry" } else { tag }
            ))
            .with_code("NOT_A_FOLDER")
            .with_details(serde_json::json!({ "path": path, "tag": tag })));
        }
        Ok(metadata)
    }

    async fn list_folders(&self, args: &Value) -> Result<Value, ToolError> {
        let path = self.validation.ensure_path(args.get("path"), "path")?;
        if !is_root(&path) {
            self.require_folder(&path).await?;
        }

        let mut arg = Map::new();
        arg.insert("path".to_string(), Value::String(path));
        copy_fields(args, &mut arg, &["recursive", "include_deleted", "limit"]);
        let listing = self
            .client
            .rpc(
                &Endpoint::rpc("files/list_folder"),
                &Value::Object(arg),
                &CallOptions::default(),
            )
            .await?;

        let folders: Vec<Value> = listing
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.get(".tag").and_then(|v| v.as_str()) == Some("folder"))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(serde_json::json!({
            "entries": folders,
            "cursor": listing.get("cursor").cloned().unwrap_or(Value::Null),
            "has_more": listing.get("has_more").cloned().unwrap_or(Value::Bool(false)),
        }))
    }

    async fn list_received_files(&self, args: &Value) -> Result<Value, ToolError> {
        let account = self
            .client
            .rpc(
                &Endpoint::rpc("users/get_current_account"),
                &Value::Null,
                &CallOptions::default(),
            )
            .await?;
        let account_id = account.get("account_id").cloned().unwrap_or(Value::Null);
        self.logger.debug(
            "listing received files",
            Some(&serde_json::json!({ "account_id": account_id })),
        );

        let mut arg = Map::new();
        copy_fields(args, &mut arg, &["limit", "actions"]);
        let received = self
            .client
            .rpc(
                &Endpoint::rpc("sharing/list_received_files"),
                &Value::Object(arg),
                &CallOptions::default(),
            )
            .await?;
        Ok(serde_json::json!({
            "account_id": account_id,
            "entries": received.get("entries").cloned().unwrap_or_else(|| Value::Array(Vec::new())),
            "cursor": received.get("cursor").cloned().unwrap_or(Value::Null),
        }))
    }

    async fn search(&self, args: &Value) -> Result<Value, ToolError> {
        let query = self.validation.ensure_string(
            args.get("query").unwrap_or(&Value::Null),
            "query",
            true,
        )?;
        let path = self.validation.ensure_path(args.get("path"), "path")?;
        let scope = if is_root(&path) {
            None
        } else {
            let folder = self.require_folder(&path).await?;
            Some(
                folder
                    .get("path_lower")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or(path),
            )
        };

        let mut options = Map::new();
        if let Some(scope) = scope.as_ref() {
            options.insert("path".to_string(), Value::String(scope.clone()));
        }
        copy_fields(
            args,
            &mut options,
            &[
                "max_results",
                "file_status",
                "filename_only",
                "file_extensions",
                "file_categories",
            ],
        );
        let mut arg = serde_json::json!({ "query": query });
        if !options.is_empty() {
            arg["options"] = Value::Object(options);
        }

        let found = self
            .client
            .rpc(
                &Endpoint::rpc("files/search_v2"),
                &arg,
                &CallOptions::default(),
            )
            .await?;
        Ok(serde_json::json!({
            "matches": found.get("matches").cloned().unwrap_or_else(|| Value::Array(Vec::new())),
            "has_more": found.get("has_more").cloned().unwrap_or(Value::Bool(false)),
            "cursor": found.get("cursor").cloned().unwrap_or(Value::Null),
            "scope": scope,
        }))
    }

    async fn members_remove(&self, args: &Value) -> Result<Value, ToolError> {
        let v = &self.validation;
        let email = v.ensure_email(args.get("email").unwrap_or(&Value::Null), "email")?;
        let transfer_dest = args
            .get("transfer_dest_email")
            .filter(|x| !x.is_null())
            .map(|x| v.ensure_email(x, "transfer_dest_email"))
            .transpose()?;
        let transfer_admin = args
            .get("transfer_admin_email")
            .filter(|x| !x.is_null())
            .map(|x| v.ensure_email(x, "transfer_admin_email"))
            .transpose()?;

        let mut emails = vec![email.clone()];
        emails.extend(transfer_dest.iter().cloned());
        emails.extend(transfer_admin.iter().cloned());
        let ids = self.resolve_member_ids(&emails).await?;

        let member_id = |email: &str| -> Result<Value, ToolError> {
            ids.iter()
                .find(|(e, _)| e.eq_ignore_ascii_case(email))
                .map(|(_, id)| {
                    serde_json::json!({".tag": "team_member_id", "team_member_id": id})
                })
                .ok_or_else(|| member_not_found(email))
        };

        let mut arg = Map::new();
        arg.insert("user".to_string(), member_id(&email)?);
        if let Some(dest) = transfer_dest.as_deref() {
            arg.insert("transfer_dest_id".to_string(), member_id(dest)?);
        }
        if let Some(admin) = transfer_admin.as_deref() {
            arg.insert("transfer_admin_id".to_string(), member_id(admin)?);
        }
        copy_fields(
            args,
            &mut arg,
            &["wipe_data", "keep_account", "retain_team_shares"],
        );

        let removed = self
            .client
            .rpc(
                &Endpoint::team("team/members/remove"),
                &Value::Object(arg),
                &CallOptions::default(),
            )
            .await?;
        let team_member_id = ids
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(&email))
            .map(|(_, id)| id.clone());
        Ok(serde_json::json!({
            "email": email,
            "team_member_id": team_member_id,
            "result": removed,
        }))
    }

    /// Looks every email up in one `get_info_v2` call. Unknown emails fail the whole call.
    async fn resolve_member_ids(&self, emails: &[String]) -> Result<Vec<(String, String)>, ToolError> {
        let selectors: Vec<Value> = emails
            .iter()
            .map(|email| serde_json::json!({".tag": "email", "email": email}))
            .collect();
        let info = self
            .client
            .rpc(
                &Endpoint::team("team/members/get_info_v2"),
                &serde_json::json!({ "members": selectors }),
                &CallOptions::default(),
            )
            .await?;
        let results = info
            .get("members_info")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut ids = Vec::new();
        for (email, item) in emails.iter().zip(results.iter()) {
            let id = item
                .get("member_info")
                .unwrap_or(item)
                .get("profile")
                .and_then(|p| p.get("team_member_id"))
                .and_then(|v| v.as_str());
            match id {
                Some(id) => ids.push((email.clone(), id.to_string())),
                None => return Err(member_not_found(email)),
            }
        }
        if ids.len() < emails.len() {
            return Err(member_not_found(&emails[ids.len()]));
        }
        Ok(ids)
    }
}

fn member_not_found(email: &str) -> ToolError {
    ToolError::not_found(format!("No team member with email {}", email))
        .with_code("MEMBER_NOT_FOUND")
        .with_hint("Check the address with members_list or members_get_info")
}

fn copy_fields(from: &Value, into: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if let Some(value) = from.get(*key).filter(|v| !v.is_null()) {
            into.insert((*key).to_string(), value.clone());
        }
    }
}

/// `ToolHandler` view of one composite tool.
#[derive(Clone)]
pub struct CompositeTool {
    name: String,
    manager: Arc<CompositeManager>,
}

impl CompositeTool {
    pub fn new(name: &str, manager: Arc<CompositeManager>) -> Self {
        Self {
            name: name.to_string(),
            manager,
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for CompositeTool {
    async fn handle(&self, args: Value) -> Result<Value, ToolError> {
        self.manager.handle_tool(&self.name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn copy_fields_skips_missing_and_null() {
        let mut out = Map::new();
        copy_fields(
            &json!({"limit": 5, "recursive": null, "other": 1}),
            &mut out,
            &["limit", "recursive", "include_deleted"],
        );
        assert_eq!(Value::Object(out), json!({"limit": 5}));
    }

    #[test]
    fn member_not_found_is_not_found_kind() {
        let err = member_not_found("x@example.com");
        assert_eq!(err.code, "MEMBER_NOT_FOUND");
        assert_eq!(err.kind, crate::errors::ToolErrorKind::NotFound);
    }
}
