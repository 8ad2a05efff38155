use patchsync_connection::testing::fixtures;
use patchsync_connection::{
    BindingConnection, Connection, ConnectionError, ConnectionResult, DiffResponse, FileChange,
    HttpConnection, MockNode, Patch, PatchStatus, ValidateOptions,
};
use std::collections::BTreeSet;

const RID: &str = "rad:z3gqcJUoA1n9HaHKufZs5FCSGazv5";

fn seeded_node() -> MockNode {
    let node = MockNode::new()
        .with_node_id("z6MkNode")
        .with_current_project(RID);
    node.insert_project(fixtures::project(RID, "heartwood"));
    node.upsert_patch(RID, fixtures::simple_patch("aa11", "draft", PatchStatus::Draft, 10));
    node.upsert_patch(RID, fixtures::simple_patch("bb22", "open", PatchStatus::Open, 20));
    node.upsert_patch(
        RID,
        fixtures::simple_patch("cc33", "archived", PatchStatus::Archived, 30),
    );
    node.upsert_patch(RID, fixtures::simple_patch("dd44", "merged", PatchStatus::Merged, 40));
    node
}

fn http_over(node: &MockNode) -> HttpConnection<MockNode, MockNode> {
    HttpConnection::new(node.clone(), node.clone(), "/work/heartwood")
}

fn ids(results: Vec<ConnectionResult<Vec<Patch>>>) -> BTreeSet<String> {
    results
        .into_iter()
        .filter_map(Result::ok)
        .flatten()
        .map(|patch| patch.id)
        .collect()
}

#[tokio::test(flavor = "current_thread")]
async fn http_fetch_all_patches_issues_one_request_per_status() {
    let node = seeded_node();
    let connection = http_over(&node);

    let results = connection.fetch_all_patches(&RID.to_string()).await;
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(
        ids(results),
        ["aa11", "bb22", "cc33", "dd44"]
            .into_iter()
            .map(str::to_string)
            .collect()
    );

    for status in PatchStatus::ALL {
        assert_eq!(
            node.request_count(&format!("state={status}&perPage=500")),
            1,
            "{status} should be requested exactly once"
        );
    }
}

#[tokio::test(flavor = "current_thread")]
async fn http_partial_failure_keeps_other_statuses() {
    let node = seeded_node();
    node.fail_requests_containing("state=archived");
    let connection = http_over(&node);

    let results = connection.fetch_all_patches(&RID.to_string()).await;
    assert_eq!(results.len(), 4);
    assert_eq!(results.iter().filter(|result| result.is_err()).count(), 1);
    let fetched = ids(results);
    assert!(!fetched.contains("cc33"));
    assert_eq!(fetched.len(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn binding_fetch_all_patches_is_a_single_result() {
    let node = seeded_node();
    let connection = BindingConnection::new(node.clone(), "/work/heartwood");

    let results = connection.fetch_all_patches(&RID.to_string()).await;
    assert_eq!(results.len(), 1);
    assert_eq!(ids(results).len(), 4);
    assert_eq!(node.request_count("binding patches"), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn adapters_agree_on_projects_and_patches() {
    let node = seeded_node();
    let http = http_over(&node);
    let binding = BindingConnection::new(node.clone(), "/work/heartwood");
    let rid = RID.to_string();

    assert_eq!(
        http.current_project_id().await.expect("http should resolve"),
        binding
            .current_project_id()
            .await
            .expect("binding should resolve")
    );
    assert_eq!(
        http.project(&rid).await.expect("http project"),
        binding.project(&rid).await.expect("binding project")
    );
    assert_eq!(
        http.projects().await.expect("http projects"),
        binding.projects().await.expect("binding projects")
    );
    assert_eq!(
        http.fetch_patch(&rid, "bb22").await.expect("http patch"),
        binding.fetch_patch(&rid, "bb22").await.expect("binding patch")
    );
}

#[tokio::test(flavor = "current_thread")]
async fn missing_patch_is_not_found_on_both_adapters() {
    let node = seeded_node();
    let rid = RID.to_string();

    let error = http_over(&node)
        .fetch_patch(&rid, "ffff")
        .await
        .expect_err("unknown patch should fail");
    assert!(matches!(
        error,
        ConnectionError::NotFound {
            resource: "patch",
            ..
        }
    ));

    let error = BindingConnection::new(node, "/work/heartwood")
        .fetch_patch(&rid, "ffff")
        .await
        .expect_err("unknown patch should fail");
    assert!(matches!(
        error,
        ConnectionError::NotFound {
            resource: "patch",
            ..
        }
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn unresolvable_workspace_is_resolution_error() {
    let node = seeded_node();
    node.set_current_project(None);

    let error = http_over(&node)
        .current_project_id()
        .await
        .expect_err("workspace should not resolve");
    assert!(matches!(error, ConnectionError::Resolution(_)));

    let error = BindingConnection::new(node, "/work/heartwood")
        .current_project_id()
        .await
        .expect_err("workspace should not resolve");
    assert!(matches!(error, ConnectionError::Resolution(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn validate_reports_reachability_without_failing() {
    let node = seeded_node();
    let options = ValidateOptions {
        minimize_user_notifications: true,
    };
    assert!(http_over(&node).validate(options).await);
    assert!(
        BindingConnection::new(node.clone(), "/work/heartwood")
            .validate(options)
            .await
    );

    node.set_unreachable(true);
    assert!(!http_over(&node).validate(options).await);
    assert!(
        !BindingConnection::new(node, "/work/heartwood")
            .validate(options)
            .await
    );
}

#[tokio::test(flavor = "current_thread")]
async fn diff_is_served_for_revision_range() {
    let node = seeded_node();
    let diff: DiffResponse = serde_json::from_value(serde_json::json!({
        "diff": {
            "files": [
                { "state": "added", "path": "src/new.rs", "new": { "oid": "n1", "mode": "blob" } }
            ],
            "stats": { "filesChanged": 1, "insertions": 3, "deletions": 0 }
        },
        "files": { "n1": { "binary": false, "content": "fn main() {}\n" } }
    }))
    .expect("diff fixture should decode");
    node.insert_diff(RID, "base1", "head1", diff);

    let fetched = http_over(&node)
        .fetch_diff(&RID.to_string(), "base1", "head1")
        .await
        .expect("diff should be served");
    assert_eq!(fetched.diff.stats.insertions, 3);
    assert!(matches!(&fetched.diff.files[0], FileChange::Added { path, .. } if path == "src/new.rs"));
    assert_eq!(fetched.blob_content("n1"), Some("fn main() {}\n"));
    assert_eq!(node.request_count("/diff/base1/head1"), 1);
}
