use dropbox_tools::dropbox::{AuthMode, Style};
use dropbox_tools::mcp::catalog::{list_tools, list_tools_for_openai, tool_by_name, tool_catalog};
use dropbox_tools::services::config::Host;

#[test]
fn every_tool_is_described() {
    for tool in list_tools() {
        assert!(!tool.description.trim().is_empty(), "{} has no description", tool.name);
        assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
        assert_eq!(tool.input_schema["additionalProperties"], false, "{}", tool.name);
    }
}

#[test]
fn file_transfer_tools_use_the_content_host() {
    for entry in tool_catalog() {
        let Some(endpoint) = entry.endpoint.as_ref() else {
            continue;
        };
        if matches!(endpoint.style, Style::Upload | Style::Download) {
            assert_eq!(endpoint.host, Host::Content, "{}", entry.name);
        }
    }
    let download = tool_by_name("download").unwrap().endpoint.as_ref().unwrap();
    assert_eq!(download.style, Style::Download);
    let upload = tool_by_name("upload").unwrap().endpoint.as_ref().unwrap();
    assert_eq!(upload.style, Style::Upload);
}

#[test]
fn longpoll_is_unauthenticated_on_the_notify_host() {
    let endpoint = tool_by_name("list_folder_longpoll")
        .unwrap()
        .endpoint
        .as_ref()
        .unwrap();
    assert_eq!(endpoint.host, Host::Notify);
    assert_eq!(endpoint.auth, AuthMode::None);
    let props = tool_by_name("list_folder_longpoll").unwrap().input_schema["properties"]
        .as_object()
        .unwrap();
    assert!(!props.contains_key("select_user"));
}

#[test]
fn team_tools_do_not_offer_select_user() {
    let entry = tool_by_name("members_list").unwrap();
    assert_eq!(entry.endpoint.as_ref().unwrap().auth, AuthMode::Team);
    assert!(entry.input_schema["properties"].get("select_user").is_none());
    assert!(entry.input_schema["properties"].get("fetch_all").is_some());
}

#[test]
fn openai_listing_uses_function_shape() {
    let tools = list_tools_for_openai();
    assert_eq!(tools.len(), tool_catalog().len());
    for tool in &tools {
        assert_eq!(tool["type"], "function");
        let params = &tool["function"]["parameters"];
        assert_eq!(params["type"], "object");
        assert!(params["properties"].get("trace_id").is_none());
    }
}
