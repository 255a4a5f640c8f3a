mod common;

use common::{app_with, call_ok, config_for, fake_app, start, FakeDropbox};
use serde_json::json;

#[tokio::test]
async fn fetch_all_follows_the_cursor() {
    let (fake, app) = fake_app().await;
    fake.json(
        "/2/files/list_folder",
        200,
        json!({"entries": [{"name": "a"}, {"name": "b"}], "cursor": "c1", "has_more": true}),
    );
    fake.json(
        "/2/files/list_folder/continue",
        200,
        json!({"entries": [{"name": "c"}], "cursor": "c2", "has_more": true}),
    );
    fake.json(
        "/2/files/list_folder/continue",
        200,
        json!({"entries": [{"name": "d"}], "cursor": "c3", "has_more": false}),
    );

    let result = call_ok(
        &app,
        "list_folder",
        json!({"path": "/Docs", "fetch_all": true}),
    )
    .await;
    let names: Vec<&str> = result["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    assert_eq!(result["pages"], 3);
    assert_eq!(result["truncated"], false);
    assert_eq!(result["cursor"], "c3");

    let continues = fake.requests_to("/2/files/list_folder/continue");
    assert_eq!(continues.len(), 2);
    assert_eq!(continues[0].json(), json!({"cursor": "c1"}));
    assert_eq!(continues[1].json(), json!({"cursor": "c2"}));
    assert_eq!(
        fake.requests_to("/2/files/list_folder")[0].json(),
        json!({"path": "/Docs"})
    );
}

#[tokio::test]
async fn page_cap_marks_result_truncated() {
    let fake = FakeDropbox::new();
    let base = start(&fake).await;
    let mut config = config_for(&base);
    config.max_pages = 2;
    let app = app_with(config);

    fake.json(
        "/2/team/members/list_v2",
        200,
        json!({"members": [{"id": 1}], "cursor": "m1", "has_more": true}),
    );
    fake.json(
        "/2/team/members/list/continue_v2",
        200,
        json!({"members": [{"id": 2}], "cursor": "m2", "has_more": true}),
    );

    let result = call_ok(&app, "members_list", json!({"limit": 1, "fetch_all": true})).await;
    assert_eq!(result["members"], json!([{"id": 1}, {"id": 2}]));
    assert_eq!(result["pages"], 2);
    assert_eq!(result["truncated"], true);
    assert_eq!(result["cursor"], "m2");
    assert_eq!(fake.requests_to("/2/team/members/list/continue_v2").len(), 1);
}

#[tokio::test]
async fn without_fetch_all_only_one_page_is_read() {
    let (fake, app) = fake_app().await;
    fake.json(
        "/2/files/list_folder",
        200,
        json!({"entries": [{"name": "a"}], "cursor": "c1", "has_more": true}),
    );
    let result = call_ok(&app, "list_folder", json!({"path": ""})).await;
    assert_eq!(result["has_more"], true);
    assert!(result.get("pages").is_none());
    assert!(fake.requests_to("/2/files/list_folder/continue").is_empty());
}
